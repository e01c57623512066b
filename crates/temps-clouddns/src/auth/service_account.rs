//! Service account authentication (RFC 7523 JWT bearer grant)

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use reqwest::Client;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::signature::{SignatureEncoding, Signer};
use rsa::RsaPrivateKey;
use sha2::Sha256;

use super::{exchange_token, AccessToken, TokenSource};
use crate::errors::DnsError;
use crate::providers::credentials::ServiceAccountKey;

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Assertions are valid for one hour, the maximum Google accepts
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// Exchanges self-signed JWT assertions for access tokens
pub struct ServiceAccountTokenSource {
    client: Client,
    key: ServiceAccountKey,
    signing_key: SigningKey<Sha256>,
    scope: String,
}

impl ServiceAccountTokenSource {
    /// Build a token source, validating the key material up front
    pub fn new(client: Client, key: ServiceAccountKey, scope: &str) -> Result<Self, DnsError> {
        let private_key = parse_private_key(&key.private_key)?;

        Ok(Self {
            client,
            key,
            signing_key: SigningKey::<Sha256>::new(private_key),
            scope: scope.to_string(),
        })
    }

    pub fn client_email(&self) -> &str {
        &self.key.client_email
    }

    /// Create the signed JWT assertion for token request
    fn create_jwt(&self, now: i64) -> Result<String, DnsError> {
        let mut header = serde_json::json!({
            "alg": "RS256",
            "typ": "JWT"
        });
        if let Some(ref kid) = self.key.private_key_id {
            header["kid"] = serde_json::Value::String(kid.clone());
        }

        let claims = serde_json::json!({
            "iss": self.key.client_email,
            "scope": self.scope,
            "aud": self.key.token_uri,
            "iat": now,
            "exp": now + ASSERTION_LIFETIME_SECS
        });

        let header_b64 = URL_SAFE_NO_PAD.encode(header.to_string().as_bytes());
        let claims_b64 = URL_SAFE_NO_PAD.encode(claims.to_string().as_bytes());
        let message = format!("{}.{}", header_b64, claims_b64);

        let signature = self
            .signing_key
            .try_sign(message.as_bytes())
            .map_err(|e| DnsError::Authentication(format!("Failed to sign JWT: {}", e)))?;

        Ok(format!(
            "{}.{}",
            message,
            URL_SAFE_NO_PAD.encode(signature.to_bytes())
        ))
    }
}

#[async_trait]
impl TokenSource for ServiceAccountTokenSource {
    fn name(&self) -> &'static str {
        "service_account"
    }

    async fn token(&self) -> Result<AccessToken, DnsError> {
        let jwt = self.create_jwt(chrono::Utc::now().timestamp())?;

        exchange_token(
            &self.client,
            &self.key.token_uri,
            &[("grant_type", JWT_BEARER_GRANT), ("assertion", &jwt)],
        )
        .await
    }
}

/// Google issues PKCS#8 keys; PKCS#1 is accepted for hand-converted keys
fn parse_private_key(pem: &str) -> Result<RsaPrivateKey, DnsError> {
    RsaPrivateKey::from_pkcs8_pem(pem)
        .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
        .map_err(|e| DnsError::Configuration(format!("Invalid private key: {}", e)))
}
