//! Cloud DNS provider error types

use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by the Cloud DNS challenge provider
#[derive(Error, Debug)]
pub enum DnsError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Could not determine authoritative zone for {fqdn}: {message}")]
    ZoneApexNotFound { fqdn: String, message: String },

    #[error("No matching Google Cloud managed zone found for domain {0}")]
    ZoneNotFound(String),

    #[error("Multiple managed zones match {dns_name}: {}", .zones.join(", "))]
    AmbiguousZone { dns_name: String, zones: Vec<String> },

    #[error("Google Cloud API call failed: {0}")]
    ApiError(String),

    #[error("Change {change_id} still pending after {}s", .elapsed.as_secs())]
    TimedOut { change_id: String, elapsed: Duration },

    #[error("Wait for change {0} was cancelled")]
    Cancelled(String),

    #[error("Failed to delete {failed} of {total} TXT record sets: {}", join_errors(.errors))]
    CleanupFailed {
        failed: usize,
        total: usize,
        errors: Vec<DnsError>,
    },
}

fn join_errors(errors: &[DnsError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
