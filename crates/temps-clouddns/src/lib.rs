//! Google Cloud DNS challenge provider for Temps
//!
//! This crate solves ACME DNS-01 challenges by publishing TXT records in
//! Google Cloud DNS managed zones.
//!
//! # Features
//!
//! - **Present / CleanUp**: create, replace and delete `_acme-challenge` TXT records
//! - **Change tracking**: waits until Cloud DNS reports a change as applied,
//!   bounded by a deadline and cancellable
//! - **Zone discovery**: finds the authoritative apex via SOA lookups and picks
//!   the matching managed zone with a configurable policy
//! - **Credentials**: service account keys or Application Default Credentials
//!   (gcloud user credentials, GCE metadata server)
//!
//! # Usage
//!
//! ```ignore
//! use temps_clouddns::CloudDnsProvider;
//!
//! // GCE_PROJECT and optionally GCE_SERVICE_ACCOUNT_FILE
//! let provider = CloudDnsProvider::from_env().await?;
//!
//! provider.present("example.com", token, key_authorization).await?;
//! // ... let the ACME server validate ...
//! provider.cleanup("example.com", token, key_authorization).await?;
//! ```

pub mod api;
pub mod auth;
pub mod challenge;
pub mod config;
pub mod errors;
pub mod providers;
pub mod zone;

// Re-export main types
pub use challenge::{challenge_value, Dns01Record};
pub use config::CloudDnsConfig;
pub use errors::DnsError;
pub use providers::{ChallengeProvider, CloudDnsProvider, POLLING_INTERVAL, PROPAGATION_TIMEOUT};
pub use zone::{RecursiveZoneResolver, ZoneApexResolver, ZoneSelection};
