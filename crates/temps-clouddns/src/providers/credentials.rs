//! Google credential files
//!
//! Google issues two JSON credential formats that this crate understands:
//! service account keys (downloaded from the GCP Console) and authorized user
//! files (written by `gcloud auth application-default login`). Both carry a
//! `type` discriminator.

use serde::Deserialize;

use crate::errors::DnsError;

/// Default OAuth2 token endpoint
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URL.to_string()
}

/// Service account key file
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    /// Service account email, used as the JWT issuer
    pub client_email: String,

    /// PEM encoded RSA private key
    pub private_key: String,

    #[serde(default)]
    pub private_key_id: Option<String>,

    #[serde(default)]
    pub project_id: Option<String>,

    #[serde(default)]
    pub client_id: Option<String>,

    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

/// Authorized user file produced by gcloud
#[derive(Clone, Deserialize)]
pub struct AuthorizedUserCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,

    #[serde(default)]
    pub quota_project_id: Option<String>,

    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

/// Any credential file, discriminated by its `type` field
#[derive(Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CredentialsFile {
    ServiceAccount(ServiceAccountKey),
    AuthorizedUser(AuthorizedUserCredentials),
}

impl CredentialsFile {
    pub fn from_json(json: &[u8]) -> Result<Self, DnsError> {
        serde_json::from_slice(json).map_err(|e| {
            DnsError::Configuration(format!("Unable to parse Google credentials file: {}", e))
        })
    }
}

impl ServiceAccountKey {
    /// Parse a service account key, rejecting other credential types
    pub fn from_json(json: &[u8]) -> Result<Self, DnsError> {
        match CredentialsFile::from_json(json).map_err(|e| {
            DnsError::Configuration(format!(
                "Unable to load JWT config from Google Service Account file: {}",
                e
            ))
        })? {
            CredentialsFile::ServiceAccount(key) => Ok(key),
            CredentialsFile::AuthorizedUser(_) => Err(DnsError::Configuration(
                "Expected a service_account key, got authorized_user credentials".to_string(),
            )),
        }
    }
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key", &"***")
            .field("private_key_id", &self.private_key_id)
            .field("project_id", &self.project_id)
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

impl std::fmt::Debug for AuthorizedUserCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizedUserCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .field("refresh_token", &"***")
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

impl std::fmt::Debug for CredentialsFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CredentialsFile::ServiceAccount(key) => key.fmt(f),
            CredentialsFile::AuthorizedUser(user) => user.fmt(f),
        }
    }
}
