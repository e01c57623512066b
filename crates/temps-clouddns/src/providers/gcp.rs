//! Google Cloud DNS challenge provider
//!
//! Publishes and removes DNS-01 TXT records in Cloud DNS managed zones.
//!
//! Required IAM Roles:
//! - roles/dns.admin (DNS Administrator)
//!
//! Authentication uses either an explicit service account JSON key or
//! Application Default Credentials.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::credentials::ServiceAccountKey;
use super::traits::ChallengeProvider;
use crate::api::{Change, CloudDnsClient, RecordSetFilter, ResourceRecordSet};
use crate::auth::{
    CachedTokenSource, DefaultCredentials, ServiceAccountTokenSource, TokenSource,
    CLOUD_DNS_READWRITE_SCOPE,
};
use crate::challenge::{to_fqdn, Dns01Record};
use crate::config::CloudDnsConfig;
use crate::errors::DnsError;
use crate::zone::{RecursiveZoneResolver, ZoneApexResolver, ZoneSelection};

/// Propagation timeout advised to ACME clients
pub const PROPAGATION_TIMEOUT: Duration = Duration::from_secs(180);

/// Propagation polling interval advised to ACME clients
pub const POLLING_INTERVAL: Duration = Duration::from_secs(5);

/// Google Cloud DNS challenge provider
pub struct CloudDnsProvider {
    project: String,
    client: CloudDnsClient,
    zone_resolver: Arc<dyn ZoneApexResolver>,
    zone_selection: ZoneSelection,
    change_poll_interval: Duration,
    change_timeout: Duration,
}

impl CloudDnsProvider {
    /// Configure from `GCE_PROJECT` and `GCE_SERVICE_ACCOUNT_FILE`
    pub async fn from_env() -> Result<Self, DnsError> {
        Self::new(CloudDnsConfig::from_env()?).await
    }

    /// Configure for `project`, authenticating with the given service account
    /// key JSON or, when `None`, Application Default Credentials.
    pub async fn with_credentials(
        project: &str,
        service_account_key: Option<&[u8]>,
    ) -> Result<Self, DnsError> {
        let mut config = CloudDnsConfig::new(project);
        config.service_account_key = service_account_key.map(<[u8]>::to_vec);
        Self::new(config).await
    }

    /// Build from an explicit configuration.
    ///
    /// Authenticates with the configured service account key (inline or from
    /// `service_account_file`), falling back to Application Default Credentials
    /// discovered from the process environment.
    pub async fn new(config: CloudDnsConfig) -> Result<Self, DnsError> {
        Self::with_default_credentials(config, &DefaultCredentials::from_env()).await
    }

    /// Like [`new`](Self::new) but with explicit ambient credential locations
    pub async fn with_default_credentials(
        config: CloudDnsConfig,
        default_credentials: &DefaultCredentials,
    ) -> Result<Self, DnsError> {
        config.validate()?;
        let http = build_http_client(config.http_timeout)?;

        let tokens: Arc<dyn TokenSource> = match config.load_service_account_key().await? {
            Some(json) => {
                let key = ServiceAccountKey::from_json(&json)?;
                let source =
                    ServiceAccountTokenSource::new(http.clone(), key, CLOUD_DNS_READWRITE_SCOPE)?;
                info!("Using service account {}", source.client_email());
                Arc::new(source)
            }
            None => {
                default_credentials
                    .find_token_source(&http, CLOUD_DNS_READWRITE_SCOPE)
                    .await?
            }
        };

        let zone_resolver = Arc::new(RecursiveZoneResolver::new(&config.recursive_nameservers));
        Ok(Self::from_parts(config, http, tokens, zone_resolver))
    }

    /// Build around an existing token source and zone apex resolver
    pub fn with_token_source(
        config: CloudDnsConfig,
        tokens: Arc<dyn TokenSource>,
        zone_resolver: Arc<dyn ZoneApexResolver>,
    ) -> Result<Self, DnsError> {
        config.validate()?;
        let http = build_http_client(config.http_timeout)?;
        Ok(Self::from_parts(config, http, tokens, zone_resolver))
    }

    fn from_parts(
        config: CloudDnsConfig,
        http: Client,
        tokens: Arc<dyn TokenSource>,
        zone_resolver: Arc<dyn ZoneApexResolver>,
    ) -> Self {
        let tokens: Arc<dyn TokenSource> = Arc::new(CachedTokenSource::new(tokens));

        Self {
            client: CloudDnsClient::new(http, &config.api_base_url, tokens),
            project: config.project,
            zone_resolver,
            zone_selection: config.zone_selection,
            change_poll_interval: config.change_poll_interval,
            change_timeout: config.change_timeout,
        }
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    /// Create or replace the challenge TXT record and wait until Cloud DNS
    /// reports the change as applied.
    pub async fn present(
        &self,
        domain: &str,
        token: &str,
        key_authorization: &str,
    ) -> Result<(), DnsError> {
        self.present_with_cancel(domain, token, key_authorization, &CancellationToken::new())
            .await
    }

    /// [`present`](Self::present), abandoning the change wait when `cancel` fires
    pub async fn present_with_cancel(
        &self,
        domain: &str,
        _token: &str,
        key_authorization: &str,
        cancel: &CancellationToken,
    ) -> Result<(), DnsError> {
        let record = Dns01Record::new(domain, key_authorization);
        let zone = self.hosted_zone(domain).await?;

        let existing = self
            .client
            .list_record_sets(&self.project, &zone, &RecordSetFilter::txt(&record.fqdn))
            .await?;

        let change = Change {
            additions: vec![ResourceRecordSet {
                name: record.fqdn.clone(),
                record_type: "TXT".to_string(),
                ttl: record.ttl,
                rrdatas: vec![record.value.clone()],
                ..Default::default()
            }],
            deletions: existing,
            ..Default::default()
        };

        debug!(
            zone = %zone,
            fqdn = %record.fqdn,
            replaced = change.deletions.len(),
            "Submitting DNS-01 TXT record change"
        );

        let submitted = self
            .client
            .create_change(&self.project, &zone, &change)
            .await?;
        let applied = self.wait_for_change(&zone, submitted, cancel).await?;

        info!(
            zone = %zone,
            fqdn = %record.fqdn,
            change_id = applied.id.as_deref().unwrap_or_default(),
            "Created DNS-01 TXT record"
        );
        Ok(())
    }

    /// Delete every TXT record set at the challenge name.
    ///
    /// Each record set is deleted in its own change and every deletion is
    /// attempted; failures are reported together afterwards.
    pub async fn cleanup(
        &self,
        domain: &str,
        _token: &str,
        key_authorization: &str,
    ) -> Result<(), DnsError> {
        let record = Dns01Record::new(domain, key_authorization);
        let zone = self.hosted_zone(domain).await?;

        let records = self.find_txt_records(&zone, &record.fqdn).await?;
        if records.is_empty() {
            debug!("No TXT records at {} to clean up", record.fqdn);
            return Ok(());
        }

        let total = records.len();
        let mut errors = Vec::new();
        for record_set in records {
            let change = Change {
                deletions: vec![record_set],
                ..Default::default()
            };
            if let Err(e) = self
                .client
                .create_change(&self.project, &zone, &change)
                .await
            {
                warn!(zone = %zone, fqdn = %record.fqdn, "Failed to delete TXT record set: {}", e);
                errors.push(e);
            }
        }

        if errors.is_empty() {
            info!(zone = %zone, fqdn = %record.fqdn, count = total, "Deleted DNS-01 TXT records");
            Ok(())
        } else {
            Err(DnsError::CleanupFailed {
                failed: errors.len(),
                total,
                errors,
            })
        }
    }

    /// `(timeout, interval)` for propagation checks
    pub fn timeout(&self) -> (Duration, Duration) {
        (PROPAGATION_TIMEOUT, POLLING_INTERVAL)
    }

    /// Name of the managed zone hosting `domain`
    async fn hosted_zone(&self, domain: &str) -> Result<String, DnsError> {
        let fqdn = to_fqdn(domain.strip_prefix("*.").unwrap_or(domain));
        let apex = self.zone_resolver.find_zone_apex(&fqdn).await?;

        let zones = self.client.list_managed_zones(&self.project, &apex).await?;
        let zone = self.zone_selection.select(&apex, &zones)?;

        debug!("Using managed zone {} for {}", zone.name, fqdn);
        Ok(zone.name.clone())
    }

    /// TXT record sets named `fqdn`, from an unfiltered listing of the zone
    async fn find_txt_records(
        &self,
        zone: &str,
        fqdn: &str,
    ) -> Result<Vec<ResourceRecordSet>, DnsError> {
        let record_sets = self
            .client
            .list_record_sets(&self.project, zone, &RecordSetFilter::default())
            .await?;

        Ok(record_sets
            .into_iter()
            .filter(|r| r.record_type == "TXT" && r.name.eq_ignore_ascii_case(fqdn))
            .collect())
    }

    /// Poll a submitted change until it leaves `pending`.
    ///
    /// Sleeps and status requests are both cut short at `change_timeout`.
    async fn wait_for_change(
        &self,
        zone: &str,
        mut change: Change,
        cancel: &CancellationToken,
    ) -> Result<Change, DnsError> {
        let started = Instant::now();
        let deadline = started + self.change_timeout;

        while change.is_pending() {
            let change_id = change.id.clone().ok_or_else(|| {
                DnsError::ApiError("pending change returned without an id".to_string())
            })?;

            let wake = deadline.min(Instant::now() + self.change_poll_interval);
            tokio::select! {
                _ = cancel.cancelled() => return Err(DnsError::Cancelled(change_id)),
                _ = tokio::time::sleep_until(wake) => {}
            }

            if Instant::now() >= deadline {
                return Err(DnsError::TimedOut {
                    change_id,
                    elapsed: started.elapsed(),
                });
            }

            debug!("Polling status of change {} in zone {}", change_id, zone);
            let poll = tokio::time::timeout_at(
                deadline,
                self.client.get_change(&self.project, zone, &change_id),
            );
            change = tokio::select! {
                _ = cancel.cancelled() => return Err(DnsError::Cancelled(change_id)),
                result = poll => match result {
                    Ok(fetched) => fetched?,
                    Err(_) => {
                        return Err(DnsError::TimedOut {
                            change_id,
                            elapsed: started.elapsed(),
                        })
                    }
                },
            };
        }

        Ok(change)
    }
}

#[async_trait]
impl ChallengeProvider for CloudDnsProvider {
    async fn present(
        &self,
        domain: &str,
        token: &str,
        key_authorization: &str,
    ) -> Result<(), DnsError> {
        CloudDnsProvider::present(self, domain, token, key_authorization).await
    }

    async fn cleanup(
        &self,
        domain: &str,
        token: &str,
        key_authorization: &str,
    ) -> Result<(), DnsError> {
        CloudDnsProvider::cleanup(self, domain, token, key_authorization).await
    }

    fn timeout(&self) -> (Duration, Duration) {
        CloudDnsProvider::timeout(self)
    }
}

fn build_http_client(timeout: Duration) -> Result<Client, DnsError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| DnsError::Connection(format!("Unable to create Google Cloud DNS client: {}", e)))
}
