//! Google Cloud DNS v1 REST client
//!
//! Covers the four operation groups the challenge provider needs: managed
//! zone listing, resource record set listing, change creation and change
//! status retrieval.

use std::sync::Arc;

use reqwest::{Client, Method};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;

use crate::auth::TokenSource;
use crate::errors::DnsError;

pub const GCP_DNS_API_BASE: &str = "https://dns.googleapis.com/dns/v1";

/// Change status reported while Cloud DNS is still applying a change
pub const CHANGE_STATUS_PENDING: &str = "pending";

/// Managed zone visibility
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneVisibility {
    #[default]
    Public,
    Private,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedZone {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub dns_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub visibility: ZoneVisibility,
    #[serde(default)]
    pub name_servers: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ResourceRecordSet {
    pub name: String,
    #[serde(rename = "type")]
    pub record_type: String,
    #[serde(default)]
    pub ttl: u32,
    #[serde(default)]
    pub rrdatas: Vec<String>,
    /// Fields not modelled here (`kind`, `routingPolicy`, `signatureRrdatas`, ...),
    /// kept so a listed record set can be deleted exactly as returned
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// An atomic set of additions and deletions applied to a zone
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Change {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additions: Vec<ResourceRecordSet>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deletions: Vec<ResourceRecordSet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
}

impl Change {
    pub fn is_pending(&self) -> bool {
        self.status.as_deref() == Some(CHANGE_STATUS_PENDING)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManagedZonesResponse {
    #[serde(default)]
    managed_zones: Vec<ManagedZone>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourceRecordSetsResponse {
    #[serde(default)]
    rrsets: Vec<ResourceRecordSet>,
    #[serde(default)]
    next_page_token: Option<String>,
}

/// Server-side filter for record set listing
#[derive(Debug, Clone, Default)]
pub struct RecordSetFilter {
    pub name: Option<String>,
    pub record_type: Option<String>,
}

impl RecordSetFilter {
    pub fn txt(name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            record_type: Some("TXT".to_string()),
        }
    }
}

/// Authenticated Cloud DNS client
pub struct CloudDnsClient {
    client: Client,
    base_url: String,
    tokens: Arc<dyn TokenSource>,
}

impl CloudDnsClient {
    pub fn new(client: Client, base_url: &str, tokens: Arc<dyn TokenSource>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            tokens,
        }
    }

    /// Make an authenticated request to the Cloud DNS API
    async fn api_request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&impl Serialize>,
    ) -> Result<T, DnsError> {
        let token = self.tokens.token().await?;
        let url = format!("{}{}", self.base_url, path);

        debug!("GCP DNS API request: {} {}", method, path);

        let mut request = self
            .client
            .request(method, &url)
            .bearer_auth(&token.token)
            .query(query);

        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| DnsError::ApiError(format!("API request failed: {}", e)))?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(DnsError::ApiError(format!(
                "GCP API returned status {}: {}",
                status, error_body
            )));
        }

        let response_text = response
            .text()
            .await
            .map_err(|e| DnsError::ApiError(format!("Failed to read response: {}", e)))?;

        serde_json::from_str(&response_text).map_err(|e| {
            DnsError::ApiError(format!(
                "Failed to parse response: {} - Body: {}",
                e, response_text
            ))
        })
    }

    /// List managed zones whose DNS name equals `dns_name` (FQDN form)
    pub async fn list_managed_zones(
        &self,
        project: &str,
        dns_name: &str,
    ) -> Result<Vec<ManagedZone>, DnsError> {
        let path = format!("/projects/{}/managedZones", project);
        let mut zones = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query = vec![("dnsName", dns_name)];
            if let Some(ref token) = page_token {
                query.push(("pageToken", token.as_str()));
            }

            let response: ManagedZonesResponse = self
                .api_request(Method::GET, &path, &query, None::<&()>)
                .await?;
            zones.extend(response.managed_zones);

            match response.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => return Ok(zones),
            }
        }
    }

    /// List record sets in a zone, optionally filtered by name and type
    pub async fn list_record_sets(
        &self,
        project: &str,
        zone: &str,
        filter: &RecordSetFilter,
    ) -> Result<Vec<ResourceRecordSet>, DnsError> {
        let path = format!("/projects/{}/managedZones/{}/rrsets", project, zone);
        let mut record_sets = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query = Vec::new();
            if let Some(ref name) = filter.name {
                query.push(("name", name.as_str()));
            }
            if let Some(ref record_type) = filter.record_type {
                query.push(("type", record_type.as_str()));
            }
            if let Some(ref token) = page_token {
                query.push(("pageToken", token.as_str()));
            }

            let response: ResourceRecordSetsResponse = self
                .api_request(Method::GET, &path, &query, None::<&()>)
                .await?;
            record_sets.extend(response.rrsets);

            match response.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => return Ok(record_sets),
            }
        }
    }

    /// Submit a change to a zone
    pub async fn create_change(
        &self,
        project: &str,
        zone: &str,
        change: &Change,
    ) -> Result<Change, DnsError> {
        let path = format!("/projects/{}/managedZones/{}/changes", project, zone);
        self.api_request(Method::POST, &path, &[], Some(change))
            .await
    }

    /// Fetch the current state of a change
    pub async fn get_change(
        &self,
        project: &str,
        zone: &str,
        change_id: &str,
    ) -> Result<Change, DnsError> {
        let path = format!(
            "/projects/{}/managedZones/{}/changes/{}",
            project, zone, change_id
        );
        self.api_request(Method::GET, &path, &[], None::<&()>)
            .await
    }
}


#[cfg(test)]
mod integration_tests {
    use super::*;
    use crate::auth::StaticTokenSource;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn create_mock_client(mock_server: &MockServer) -> CloudDnsClient {
        CloudDnsClient::new(
            Client::new(),
            &mock_server.uri(),
            Arc::new(StaticTokenSource::new("test-access-token")),
        )
    }

    #[tokio::test]
    async fn test_list_managed_zones_by_dns_name() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/projects/test-project/managedZones"))
            .and(query_param("dnsName", "example.com."))
            .and(header("Authorization", "Bearer test-access-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "managedZones": [
                    {
                        "id": "123456789",
                        "name": "example-zone",
                        "dnsName": "example.com.",
                        "description": "Test zone",
                        "nameServers": ["ns-cloud-a1.googledomains.com."]
                    }
                ]
            })))
            .mount(&mock_server)
            .await;

        let client = create_mock_client(&mock_server);
        let zones = client
            .list_managed_zones("test-project", "example.com.")
            .await
            .unwrap();

        assert_eq!(zones.len(), 1);
        assert_eq!(zones[0].name, "example-zone");
        assert_eq!(zones[0].dns_name, "example.com.");
        assert_eq!(zones[0].name_servers.len(), 1);
    }

    #[tokio::test]
    async fn test_list_record_sets_follows_pages() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/projects/test-project/managedZones/example-zone/rrsets"))
            .and(query_param("pageToken", "page-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "rrsets": [
                    {"name": "_acme-challenge.example.com.", "type": "TXT", "ttl": 120, "rrdatas": ["\"abc\""]}
                ]
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/projects/test-project/managedZones/example-zone/rrsets"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "rrsets": [
                    {"name": "example.com.", "type": "SOA", "ttl": 21600, "rrdatas": ["ns. admin. 1 21600 3600 259200 300"]}
                ],
                "nextPageToken": "page-2"
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_mock_client(&mock_server);
        let record_sets = client
            .list_record_sets("test-project", "example-zone", &RecordSetFilter::default())
            .await
            .unwrap();

        assert_eq!(record_sets.len(), 2);
        assert_eq!(record_sets[0].record_type, "SOA");
        assert_eq!(record_sets[1].record_type, "TXT");
    }

    #[tokio::test]
    async fn test_list_record_sets_with_filter() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/projects/test-project/managedZones/example-zone/rrsets"))
            .and(query_param("name", "_acme-challenge.example.com."))
            .and(query_param("type", "TXT"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "rrsets": []
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_mock_client(&mock_server);
        let record_sets = client
            .list_record_sets(
                "test-project",
                "example-zone",
                &RecordSetFilter::txt("_acme-challenge.example.com."),
            )
            .await
            .unwrap();

        assert!(record_sets.is_empty());
    }

    #[tokio::test]
    async fn test_create_and_get_change() {
        let mock_server = MockServer::start().await;

        let change = Change {
            deletions: vec![ResourceRecordSet {
                name: "_acme-challenge.example.com.".to_string(),
                record_type: "TXT".to_string(),
                ttl: 120,
                rrdatas: vec!["\"old\"".to_string()],
                ..Default::default()
            }],
            ..Default::default()
        };

        Mock::given(method("POST"))
            .and(path("/projects/test-project/managedZones/example-zone/changes"))
            .and(body_json(serde_json::json!({
                "deletions": [{
                    "name": "_acme-challenge.example.com.",
                    "type": "TXT",
                    "ttl": 120,
                    "rrdatas": ["\"old\""]
                }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "17",
                "status": "pending"
            })))
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path(
                "/projects/test-project/managedZones/example-zone/changes/17",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "17",
                "status": "done"
            })))
            .mount(&mock_server)
            .await;

        let client = create_mock_client(&mock_server);
        let created = client
            .create_change("test-project", "example-zone", &change)
            .await
            .unwrap();
        assert_eq!(created.id.as_deref(), Some("17"));
        assert!(created.is_pending());

        let fetched = client
            .get_change("test-project", "example-zone", "17")
            .await
            .unwrap();
        assert!(!fetched.is_pending());
    }

    #[tokio::test]
    async fn test_api_error_carries_status_and_body() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/projects/test-project/managedZones"))
            .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
                "error": {
                    "code": 403,
                    "message": "Forbidden"
                }
            })))
            .mount(&mock_server)
            .await;

        let client = create_mock_client(&mock_server);
        let err = client
            .list_managed_zones("test-project", "example.com.")
            .await
            .unwrap_err();

        match err {
            DnsError::ApiError(message) => {
                assert!(message.contains("403"));
                assert!(message.contains("Forbidden"));
            }
            other => panic!("Expected ApiError, got {}", other),
        }
    }

    #[tokio::test]
    async fn test_unreachable_api_is_api_error() {
        // Nothing listens on a port whose listener was just closed
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let client = CloudDnsClient::new(
            Client::new(),
            &base_url,
            Arc::new(StaticTokenSource::new("test-access-token")),
        );
        let err = client
            .get_change("test-project", "example-zone", "1")
            .await
            .unwrap_err();
        assert!(matches!(err, DnsError::ApiError(ref m) if m.contains("API request failed")));
    }

    #[tokio::test]
    async fn test_undecodable_body_is_api_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
            .mount(&mock_server)
            .await;

        let client = create_mock_client(&mock_server);
        let err = client
            .get_change("test-project", "example-zone", "1")
            .await
            .unwrap_err();
        assert!(matches!(err, DnsError::ApiError(ref m) if m.contains("Failed to parse response")));
    }
}
