//! GCE metadata server credentials
//!
//! Compute Engine, GKE, Cloud Run and friends expose the attached service
//! account's tokens over a link-local HTTP endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use super::{AccessToken, TokenResponse, TokenSource};
use crate::errors::DnsError;

/// Environment variable overriding the metadata server host
pub const METADATA_HOST_ENV: &str = "GCE_METADATA_HOST";

/// Link-local address of the metadata server
pub const DEFAULT_METADATA_HOST: &str = "169.254.169.254";

const METADATA_FLAVOR_HEADER: &str = "Metadata-Flavor";
const METADATA_FLAVOR: &str = "Google";

/// How long to wait for the metadata server before concluding we are not on GCP
const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Fetches tokens for the default service account from the metadata server
pub struct MetadataTokenSource {
    client: Client,
    base_url: String,
    scope: String,
}

impl MetadataTokenSource {
    /// `base_url` is scheme and host, e.g. `http://169.254.169.254`
    pub fn new(client: Client, base_url: impl Into<String>, scope: &str) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            scope: scope.to_string(),
        }
    }

    /// Whether a metadata server answers at `base_url`
    pub async fn probe(client: &Client, base_url: &str) -> bool {
        let url = format!("{}/computeMetadata/v1/", base_url.trim_end_matches('/'));

        match client
            .get(&url)
            .header(METADATA_FLAVOR_HEADER, METADATA_FLAVOR)
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response
                .headers()
                .get(METADATA_FLAVOR_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(|v| v == METADATA_FLAVOR)
                .unwrap_or(false),
            Err(e) => {
                debug!("Metadata server probe at {} failed: {}", url, e);
                false
            }
        }
    }
}

#[async_trait]
impl TokenSource for MetadataTokenSource {
    fn name(&self) -> &'static str {
        "metadata"
    }

    async fn token(&self) -> Result<AccessToken, DnsError> {
        let url = format!(
            "{}/computeMetadata/v1/instance/service-accounts/default/token",
            self.base_url
        );

        let response = self
            .client
            .get(&url)
            .query(&[("scopes", self.scope.as_str())])
            .header(METADATA_FLAVOR_HEADER, METADATA_FLAVOR)
            .send()
            .await
            .map_err(|e| DnsError::ApiError(format!("Metadata token request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error = response.text().await.unwrap_or_default();
            return Err(DnsError::Authentication(format!(
                "Metadata server refused token request ({}): {}",
                status, error
            )));
        }

        let token_response: TokenResponse = response.json().await.map_err(|e| {
            DnsError::ApiError(format!("Failed to parse metadata token response: {}", e))
        })?;

        Ok(token_response.into_access_token())
    }
}
