//! DNS-01 challenge providers
//!
//! This module contains the challenge provider trait and the Google Cloud DNS
//! implementation, along with the credential file formats it accepts.

pub mod credentials;
pub mod gcp;
pub mod traits;

// Re-export commonly used types
pub use credentials::{AuthorizedUserCredentials, CredentialsFile, ServiceAccountKey};
pub use gcp::{CloudDnsProvider, POLLING_INTERVAL, PROPAGATION_TIMEOUT};
pub use traits::ChallengeProvider;
