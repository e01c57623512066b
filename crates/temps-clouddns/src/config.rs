//! Provider configuration
//!
//! [`CloudDnsConfig`] is the explicit configuration consumed by
//! [`CloudDnsProvider::new`](crate::CloudDnsProvider::new). Reading the
//! process environment is confined to [`CloudDnsConfig::from_env`].

use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::api::GCP_DNS_API_BASE;
use crate::errors::DnsError;
use crate::zone::ZoneSelection;

/// Environment variable holding the Google Cloud project identifier
pub const PROJECT_ENV: &str = "GCE_PROJECT";

/// Environment variable holding a path to a service account key file
pub const SERVICE_ACCOUNT_FILE_ENV: &str = "GCE_SERVICE_ACCOUNT_FILE";

/// Interval between change status polls in `present`
pub const DEFAULT_CHANGE_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Upper bound on waiting for a change to leave `pending`
pub const DEFAULT_CHANGE_TIMEOUT: Duration = Duration::from_secs(180);

/// Per-request HTTP timeout
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudDnsConfig {
    /// Google Cloud project that owns the managed zones
    pub project: String,

    /// Raw service account key JSON. Takes precedence over `service_account_file`.
    #[serde(skip)]
    pub service_account_key: Option<Vec<u8>>,

    /// Path to a service account key JSON file
    pub service_account_file: Option<PathBuf>,

    /// Cloud DNS API base URL
    pub api_base_url: String,

    /// Policy for several managed zones sharing the apex name
    pub zone_selection: ZoneSelection,

    /// Recursive nameservers for zone apex discovery; empty uses the system resolver
    pub recursive_nameservers: Vec<IpAddr>,

    #[serde(with = "duration_secs")]
    pub change_poll_interval: Duration,

    #[serde(with = "duration_secs")]
    pub change_timeout: Duration,

    #[serde(with = "duration_secs")]
    pub http_timeout: Duration,
}

impl Default for CloudDnsConfig {
    fn default() -> Self {
        Self {
            project: String::new(),
            service_account_key: None,
            service_account_file: None,
            api_base_url: GCP_DNS_API_BASE.to_string(),
            zone_selection: ZoneSelection::default(),
            recursive_nameservers: vec![],
            change_poll_interval: DEFAULT_CHANGE_POLL_INTERVAL,
            change_timeout: DEFAULT_CHANGE_TIMEOUT,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }
}

impl CloudDnsConfig {
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            ..Default::default()
        }
    }

    pub fn with_service_account_key(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.service_account_key = Some(key.into());
        self
    }

    /// Build from `GCE_PROJECT` and `GCE_SERVICE_ACCOUNT_FILE`
    pub fn from_env() -> Result<Self, DnsError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, DnsError> {
        let project = lookup(PROJECT_ENV).unwrap_or_default();
        if project.trim().is_empty() {
            return Err(DnsError::Configuration(format!(
                "Google Cloud project name missing ({} is not set)",
                PROJECT_ENV
            )));
        }

        let service_account_file = lookup(SERVICE_ACCOUNT_FILE_ENV)
            .filter(|path| !path.trim().is_empty())
            .map(PathBuf::from);

        Ok(Self {
            project,
            service_account_file,
            ..Default::default()
        })
    }

    pub fn validate(&self) -> Result<(), DnsError> {
        if self.project.trim().is_empty() {
            return Err(DnsError::Configuration(
                "Google Cloud project name missing".to_string(),
            ));
        }
        if self.change_poll_interval.is_zero() {
            return Err(DnsError::Configuration(
                "change_poll_interval must be greater than zero".to_string(),
            ));
        }
        if self.change_timeout.is_zero() {
            return Err(DnsError::Configuration(
                "change_timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// The service account key bytes, reading `service_account_file` if needed
    pub async fn load_service_account_key(&self) -> Result<Option<Vec<u8>>, DnsError> {
        if let Some(ref key) = self.service_account_key {
            return Ok(Some(key.clone()));
        }

        match self.service_account_file {
            Some(ref path) => tokio::fs::read(path).await.map(Some).map_err(|e| {
                DnsError::Configuration(format!(
                    "Unable to read Service Account file {}: {}",
                    path.display(),
                    e
                ))
            }),
            None => Ok(None),
        }
    }
}

impl std::fmt::Debug for CloudDnsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudDnsConfig")
            .field("project", &self.project)
            .field(
                "service_account_key",
                &self.service_account_key.as_ref().map(|_| "***"),
            )
            .field("service_account_file", &self.service_account_file)
            .field("api_base_url", &self.api_base_url)
            .field("zone_selection", &self.zone_selection)
            .field("recursive_nameservers", &self.recursive_nameservers)
            .field("change_poll_interval", &self.change_poll_interval)
            .field("change_timeout", &self.change_timeout)
            .field("http_timeout", &self.http_timeout)
            .finish()
    }
}

/// Durations as (possibly fractional) seconds
mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
