//! Application Default Credentials discovery
//!
//! Lookup order:
//! 1. the file named by `GOOGLE_APPLICATION_CREDENTIALS`
//! 2. gcloud's well-known `application_default_credentials.json`
//! 3. the GCE metadata server

use std::path::{Path, PathBuf};
use std::sync::Arc;

use reqwest::Client;
use tracing::{debug, info};

use super::{
    AuthorizedUserTokenSource, MetadataTokenSource, ServiceAccountTokenSource, TokenSource,
    DEFAULT_METADATA_HOST, METADATA_HOST_ENV,
};
use crate::errors::DnsError;
use crate::providers::credentials::CredentialsFile;

pub const CREDENTIALS_ENV: &str = "GOOGLE_APPLICATION_CREDENTIALS";
const CLOUDSDK_CONFIG_ENV: &str = "CLOUDSDK_CONFIG";
const WELL_KNOWN_FILE: &str = "application_default_credentials.json";

/// Where to look for ambient credentials
#[derive(Debug, Clone)]
pub struct DefaultCredentials {
    /// Explicit credentials file (`GOOGLE_APPLICATION_CREDENTIALS`)
    pub credentials_file: Option<PathBuf>,
    /// gcloud's application default credentials file
    pub well_known_file: Option<PathBuf>,
    /// Metadata server base URL; `None` skips the probe
    pub metadata_url: Option<String>,
}

impl DefaultCredentials {
    /// Resolve locations from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let gcloud_dir = non_empty(CLOUDSDK_CONFIG_ENV)
            .map(PathBuf::from)
            .or_else(|| {
                if cfg!(windows) {
                    non_empty("APPDATA").map(|dir| Path::new(&dir).join("gcloud"))
                } else {
                    non_empty("HOME").map(|dir| Path::new(&dir).join(".config").join("gcloud"))
                }
            });

        let metadata_host =
            non_empty(METADATA_HOST_ENV).unwrap_or_else(|| DEFAULT_METADATA_HOST.to_string());

        Self {
            credentials_file: non_empty(CREDENTIALS_ENV).map(PathBuf::from),
            well_known_file: gcloud_dir.map(|dir| dir.join(WELL_KNOWN_FILE)),
            metadata_url: Some(format!("http://{}", metadata_host)),
        }
    }

    /// Walk the chain and return the first usable token source
    pub async fn find_token_source(
        &self,
        client: &Client,
        scope: &str,
    ) -> Result<Arc<dyn TokenSource>, DnsError> {
        if let Some(ref path) = self.credentials_file {
            debug!("Loading credentials from {} ({})", path.display(), CREDENTIALS_ENV);
            let json = tokio::fs::read(path).await.map_err(|e| {
                DnsError::Authentication(format!(
                    "Error getting credentials using {} environment variable: {}: {}",
                    CREDENTIALS_ENV,
                    path.display(),
                    e
                ))
            })?;
            return token_source_from_json(client, &json, scope);
        }

        if let Some(ref path) = self.well_known_file {
            if tokio::fs::try_exists(path).await.unwrap_or(false) {
                debug!("Loading gcloud application default credentials from {}", path.display());
                let json = tokio::fs::read(path).await.map_err(|e| {
                    DnsError::Authentication(format!(
                        "Error reading credentials file {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                return token_source_from_json(client, &json, scope);
            }
        }

        if let Some(ref url) = self.metadata_url {
            if MetadataTokenSource::probe(client, url).await {
                info!("Using GCE metadata server credentials");
                return Ok(Arc::new(MetadataTokenSource::new(
                    client.clone(),
                    url.clone(),
                    scope,
                )));
            }
        }

        Err(DnsError::Authentication(
            "Could not find default credentials. See https://cloud.google.com/docs/authentication/external/set-up-adc".to_string(),
        ))
    }
}

/// Build a token source from any supported credentials file
pub(crate) fn token_source_from_json(
    client: &Client,
    json: &[u8],
    scope: &str,
) -> Result<Arc<dyn TokenSource>, DnsError> {
    let credentials = CredentialsFile::from_json(json)
        .map_err(|e| DnsError::Authentication(e.to_string()))?;

    match credentials {
        CredentialsFile::ServiceAccount(key) => {
            let source = ServiceAccountTokenSource::new(client.clone(), key, scope)
                .map_err(|e| DnsError::Authentication(e.to_string()))?;
            info!("Using service account {}", source.client_email());
            Ok(Arc::new(source))
        }
        CredentialsFile::AuthorizedUser(user) => {
            info!("Using authorized user credentials");
            Ok(Arc::new(AuthorizedUserTokenSource::new(client.clone(), user)))
        }
    }
}
