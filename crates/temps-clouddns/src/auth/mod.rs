//! OAuth2 access tokens for the Cloud DNS API
//!
//! Every API request carries a bearer token obtained from a [`TokenSource`].
//! Sources exist for each way Google hands out credentials:
//!
//! - [`ServiceAccountTokenSource`]: RS256 JWT bearer grant from a service account key
//! - [`AuthorizedUserTokenSource`]: refresh token grant from gcloud user credentials
//! - [`MetadataTokenSource`]: the GCE metadata server
//! - [`StaticTokenSource`]: a fixed token managed by the caller
//!
//! [`DefaultCredentials`] walks the Application Default Credentials chain and
//! picks the first source that is available. [`CachedTokenSource`] keeps a
//! token until shortly before it expires.

mod adc;
mod metadata;
mod service_account;
mod user;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::debug;

use crate::errors::DnsError;

pub use adc::DefaultCredentials;
pub use metadata::{MetadataTokenSource, DEFAULT_METADATA_HOST, METADATA_HOST_ENV};
pub use service_account::ServiceAccountTokenSource;
pub use user::AuthorizedUserTokenSource;

/// OAuth2 scope granting read-write access to Cloud DNS
pub const CLOUD_DNS_READWRITE_SCOPE: &str =
    "https://www.googleapis.com/auth/ndev.clouddns.readwrite";

/// Tokens are refreshed this long before they expire
const REFRESH_MARGIN_SECS: i64 = 60;

/// A bearer token and its expiry
#[derive(Clone)]
pub struct AccessToken {
    pub token: String,
    /// `None` for tokens that never expire from our point of view
    pub expires_at: Option<DateTime<Utc>>,
}

impl AccessToken {
    pub fn new(token: impl Into<String>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            token: token.into(),
            expires_at,
        }
    }

    /// Whether the token is still usable at `now`, keeping a refresh margin
    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => now + Duration::seconds(REFRESH_MARGIN_SECS) < expires_at,
            None => true,
        }
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"***")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Something that can produce OAuth2 access tokens
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Fetch a token. Implementations are not expected to cache.
    async fn token(&self) -> Result<AccessToken, DnsError>;
}

/// A token handed in by the caller
pub struct StaticTokenSource {
    token: String,
}

impl StaticTokenSource {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenSource for StaticTokenSource {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn token(&self) -> Result<AccessToken, DnsError> {
        Ok(AccessToken::new(self.token.clone(), None))
    }
}

/// Caches tokens from an inner source until they are about to expire
pub struct CachedTokenSource {
    inner: Arc<dyn TokenSource>,
    cached: RwLock<Option<AccessToken>>,
}

impl CachedTokenSource {
    pub fn new(inner: Arc<dyn TokenSource>) -> Self {
        Self {
            inner,
            cached: RwLock::new(None),
        }
    }
}

#[async_trait]
impl TokenSource for CachedTokenSource {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn token(&self) -> Result<AccessToken, DnsError> {
        {
            let cached = self.cached.read().await;
            if let Some(ref token) = *cached {
                if token.is_fresh_at(Utc::now()) {
                    return Ok(token.clone());
                }
            }
        }

        let mut cached = self.cached.write().await;
        // Another task may have refreshed while we waited for the lock
        if let Some(ref token) = *cached {
            if token.is_fresh_at(Utc::now()) {
                return Ok(token.clone());
            }
        }

        debug!("Fetching new access token from {} source", self.inner.name());
        let token = self.inner.token().await?;
        *cached = Some(token.clone());
        Ok(token)
    }
}

/// Token endpoint response, shared by the OAuth2 grants and the metadata server
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

impl TokenResponse {
    fn into_access_token(self) -> AccessToken {
        let expires_at = self
            .expires_in
            .map(|secs| Utc::now() + Duration::seconds(secs));
        AccessToken::new(self.access_token, expires_at)
    }
}

/// POST a form-encoded grant to an OAuth2 token endpoint
async fn exchange_token(
    client: &Client,
    token_url: &str,
    form: &[(&str, &str)],
) -> Result<AccessToken, DnsError> {
    let response = client
        .post(token_url)
        .form(form)
        .send()
        .await
        .map_err(|e| DnsError::ApiError(format!("Token request failed: {}", e)))?;

    if !response.status().is_success() {
        let status = response.status();
        let error = response.text().await.unwrap_or_default();
        return Err(DnsError::Authentication(format!(
            "Failed to get access token ({}): {}",
            status, error
        )));
    }

    let token_response: TokenResponse = response
        .json()
        .await
        .map_err(|e| DnsError::ApiError(format!("Failed to parse token response: {}", e)))?;

    Ok(token_response.into_access_token())
}
