//! Authorized user credentials (`gcloud auth application-default login`)

use async_trait::async_trait;
use reqwest::Client;

use super::{exchange_token, AccessToken, TokenSource};
use crate::errors::DnsError;
use crate::providers::credentials::AuthorizedUserCredentials;

/// Trades a long-lived refresh token for access tokens
pub struct AuthorizedUserTokenSource {
    client: Client,
    credentials: AuthorizedUserCredentials,
}

impl AuthorizedUserTokenSource {
    pub fn new(client: Client, credentials: AuthorizedUserCredentials) -> Self {
        Self {
            client,
            credentials,
        }
    }
}

#[async_trait]
impl TokenSource for AuthorizedUserTokenSource {
    fn name(&self) -> &'static str {
        "authorized_user"
    }

    async fn token(&self) -> Result<AccessToken, DnsError> {
        exchange_token(
            &self.client,
            &self.credentials.token_uri,
            &[
                ("grant_type", "refresh_token"),
                ("client_id", &self.credentials.client_id),
                ("client_secret", &self.credentials.client_secret),
                ("refresh_token", &self.credentials.refresh_token),
            ],
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_refresh_token_grant() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=refresh-me"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ya29.user",
                "expires_in": 3599,
                "scope": "https://www.googleapis.com/auth/cloud-platform",
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let credentials = AuthorizedUserCredentials {
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            refresh_token: "refresh-me".to_string(),
            quota_project_id: None,
            token_uri: format!("{}/token", mock_server.uri()),
        };

        let source = AuthorizedUserTokenSource::new(Client::new(), credentials);
        let token = source.token().await.unwrap();

        assert_eq!(token.token, "ya29.user");
    }
}
