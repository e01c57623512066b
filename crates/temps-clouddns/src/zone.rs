//! Zone resolution
//!
//! Finding the managed zone for a challenge is a two step affair. First the
//! authoritative zone apex is discovered from public DNS by walking up the
//! name's labels until one owns an SOA record. Then Cloud DNS is asked for
//! managed zones with that exact DNS name, and a [`ZoneSelection`] policy picks
//! one when several match (for instance a public and a private zone for the
//! same domain).

use std::future::Future;
use std::net::IpAddr;

use async_trait::async_trait;
use hickory_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};
use hickory_resolver::error::{ResolveError, ResolveErrorKind};
use hickory_resolver::lookup::Lookup;
use hickory_resolver::proto::rr::RecordType;
use hickory_resolver::TokioAsyncResolver;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::api::{ManagedZone, ZoneVisibility};
use crate::challenge::{to_fqdn, un_fqdn};
use crate::errors::DnsError;

/// Discovers the authoritative zone apex of a name
#[async_trait]
pub trait ZoneApexResolver: Send + Sync {
    /// Returns the apex in FQDN form, e.g. `example.com.` for `www.example.com.`
    async fn find_zone_apex(&self, fqdn: &str) -> Result<String, DnsError>;
}

/// Walks the label hierarchy with SOA queries against recursive nameservers
pub struct RecursiveZoneResolver {
    resolver: TokioAsyncResolver,
}

impl RecursiveZoneResolver {
    /// Use the given nameservers, or the system configuration when empty
    pub fn new(nameservers: &[IpAddr]) -> Self {
        let config = if nameservers.is_empty() {
            match hickory_resolver::system_conf::read_system_conf() {
                Ok((config, _)) => config,
                Err(e) => {
                    warn!(
                        "Unable to read system resolver configuration, using Google DNS: {}",
                        e
                    );
                    ResolverConfig::google()
                }
            }
        } else {
            ResolverConfig::from_parts(
                None,
                vec![],
                NameServerConfigGroup::from_ips_clear(nameservers, 53, true),
            )
        };

        let mut options = ResolverOpts::default();
        options.try_tcp_on_error = true;
        options.use_hosts_file = false;
        // Zone cuts can move; always ask upstream
        options.cache_size = 0;

        Self {
            resolver: TokioAsyncResolver::tokio(config, options),
        }
    }

    async fn owns_soa(&self, name: &str) -> Result<bool, DnsError> {
        soa_owned_by(name, self.resolver.lookup(name, RecordType::SOA).await)
    }
}

#[async_trait]
impl ZoneApexResolver for RecursiveZoneResolver {
    async fn find_zone_apex(&self, fqdn: &str) -> Result<String, DnsError> {
        let fqdn = to_fqdn(fqdn);
        walk_to_apex(&fqdn, |name| self.owns_soa(name)).await
    }
}

/// Classify an SOA lookup for `name`.
///
/// `name` is an apex only when the answer holds an SOA owned by `name` itself;
/// an SOA reached through a CNAME belongs to another zone. An empty answer
/// means "not this label", any other failure aborts the walk.
fn soa_owned_by(name: &str, result: Result<Lookup, ResolveError>) -> Result<bool, DnsError> {
    match result {
        Ok(lookup) => Ok(lookup.record_iter().any(|record| {
            record.record_type() == RecordType::SOA
                && un_fqdn(&record.name().to_string()).eq_ignore_ascii_case(un_fqdn(name))
        })),
        Err(e) => match e.kind() {
            ResolveErrorKind::NoRecordsFound { .. } => Ok(false),
            _ => Err(DnsError::ZoneApexNotFound {
                fqdn: name.to_string(),
                message: e.to_string(),
            }),
        },
    }
}

/// Walk from `fqdn` towards the root, returning the first label `owns_soa` accepts
async fn walk_to_apex<'a, F, Fut>(fqdn: &'a str, mut owns_soa: F) -> Result<String, DnsError>
where
    F: FnMut(&'a str) -> Fut,
    Fut: Future<Output = Result<bool, DnsError>>,
{
    for candidate in candidate_zones(fqdn) {
        trace!("Querying SOA for {}", candidate);
        if owns_soa(candidate).await? {
            debug!("Authoritative zone for {} is {}", fqdn, candidate);
            return Ok(candidate.to_string());
        }
    }

    Err(DnsError::ZoneApexNotFound {
        fqdn: fqdn.to_string(),
        message: "no SOA record found for any parent domain".to_string(),
    })
}

/// `a.b.example.com.` yields `a.b.example.com.`, `b.example.com.`, `example.com.`, `com.`
fn candidate_zones(fqdn: &str) -> impl Iterator<Item = &str> {
    let mut rest = Some(fqdn);
    std::iter::from_fn(move || {
        let current = rest?;
        rest = current
            .split_once('.')
            .map(|(_, parent)| parent)
            .filter(|parent| !parent.is_empty());
        Some(current)
    })
}

/// How to pick a managed zone when several share the apex DNS name
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneSelection {
    /// Exactly one zone must match; several is an error
    #[default]
    Unique,
    /// Whichever zone the API lists first
    First,
    /// The public zone when both visibilities exist
    PreferPublic,
    /// The private zone when both visibilities exist
    PreferPrivate,
}

impl ZoneSelection {
    /// Pick one of `zones`, all of which match `dns_name`
    pub fn select<'a>(
        &self,
        dns_name: &str,
        zones: &'a [ManagedZone],
    ) -> Result<&'a ManagedZone, DnsError> {
        let first = zones
            .first()
            .ok_or_else(|| DnsError::ZoneNotFound(dns_name.to_string()))?;

        if zones.len() == 1 {
            return Ok(first);
        }

        let preferred = match self {
            ZoneSelection::First => return Ok(first),
            ZoneSelection::Unique => None,
            ZoneSelection::PreferPublic => Some(ZoneVisibility::Public),
            ZoneSelection::PreferPrivate => Some(ZoneVisibility::Private),
        };

        let candidates: Vec<&ManagedZone> = match preferred {
            Some(visibility) => {
                let matching: Vec<&ManagedZone> =
                    zones.iter().filter(|z| z.visibility == visibility).collect();
                if matching.is_empty() {
                    zones.iter().collect()
                } else {
                    matching
                }
            }
            None => zones.iter().collect(),
        };

        match candidates.as_slice() {
            [only] => Ok(*only),
            _ => Err(DnsError::AmbiguousZone {
                dns_name: dns_name.to_string(),
                zones: candidates.iter().map(|z| z.name.clone()).collect(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hickory_resolver::proto::op::{Query, ResponseCode};
    use hickory_resolver::proto::rr::rdata::{CNAME, SOA};
    use hickory_resolver::proto::rr::{Name, RData, Record};
    use std::sync::Arc;

    fn zone(name: &str, visibility: ZoneVisibility) -> ManagedZone {
        ManagedZone {
            id: None,
            name: name.to_string(),
            dns_name: "example.com.".to_string(),
            description: None,
            visibility,
            name_servers: vec![],
        }
    }

    #[test]
    fn test_candidate_zones() {
        let candidates: Vec<&str> = candidate_zones("_acme-challenge.www.example.com.").collect();
        assert_eq!(
            candidates,
            vec![
                "_acme-challenge.www.example.com.",
                "www.example.com.",
                "example.com.",
                "com."
            ]
        );

        let candidates: Vec<&str> = candidate_zones("com.").collect();
        assert_eq!(candidates, vec!["com."]);
    }

    fn name(s: &str) -> Name {
        Name::from_ascii(s).unwrap()
    }

    fn soa_record(owner: &str) -> Record {
        let soa = SOA::new(
            name("ns-cloud-a1.googledomains.com."),
            name("cloud-dns-hostmaster.google.com."),
            1,
            21600,
            3600,
            259200,
            300,
        );
        Record::from_rdata(name(owner), 300, RData::SOA(soa))
    }

    fn soa_answer(queried: &str, records: Vec<Record>) -> Result<Lookup, ResolveError> {
        Ok(Lookup::new_with_max_ttl(
            Query::query(name(queried), RecordType::SOA),
            Arc::from(records),
        ))
    }

    fn no_records(queried: &str) -> Result<Lookup, ResolveError> {
        Err(ResolveErrorKind::NoRecordsFound {
            query: Box::new(Query::query(name(queried), RecordType::SOA)),
            soa: None,
            negative_ttl: None,
            response_code: ResponseCode::NoError,
            trusted: true,
        }
        .into())
    }

    #[test]
    fn test_soa_owned_by_apex() {
        let answer = soa_answer("example.com.", vec![soa_record("example.com.")]);
        assert!(soa_owned_by("example.com.", answer).unwrap());

        let answer = soa_answer("Example.COM.", vec![soa_record("example.com.")]);
        assert!(soa_owned_by("Example.COM.", answer).unwrap());
    }

    #[test]
    fn test_soa_through_cname_belongs_to_target_zone() {
        let cname = Record::from_rdata(
            name("_acme-challenge.example.com."),
            300,
            RData::CNAME(CNAME(name("_acme-challenge.example.net."))),
        );
        let answer = soa_answer(
            "_acme-challenge.example.com.",
            vec![cname, soa_record("example.net.")],
        );

        assert!(!soa_owned_by("_acme-challenge.example.com.", answer).unwrap());
    }

    #[test]
    fn test_no_records_is_not_this_label() {
        assert!(!soa_owned_by("www.example.com.", no_records("www.example.com.")).unwrap());
    }

    #[test]
    fn test_resolver_failure_is_zone_apex_not_found() {
        let err = soa_owned_by("www.example.com.", Err(ResolveErrorKind::Timeout.into()))
            .unwrap_err();
        assert!(matches!(err, DnsError::ZoneApexNotFound { ref fqdn, .. } if fqdn == "www.example.com."));
    }

    #[tokio::test]
    async fn test_walk_stops_at_first_soa_owner() {
        let mut asked = Vec::new();
        let apex = walk_to_apex("_acme-challenge.www.example.com.", |candidate| {
            asked.push(candidate.to_string());
            let answer = match candidate {
                "example.com." => soa_answer(candidate, vec![soa_record("example.com.")]),
                other => no_records(other),
            };
            async move { soa_owned_by(candidate, answer) }
        })
        .await
        .unwrap();

        assert_eq!(apex, "example.com.");
        assert_eq!(
            asked,
            vec!["_acme-challenge.www.example.com.", "www.example.com.", "example.com."]
        );
    }

    #[tokio::test]
    async fn test_walk_without_apex_or_with_failure() {
        let err = walk_to_apex("www.example.invalid.", |candidate| async move {
            soa_owned_by(candidate, no_records(candidate))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, DnsError::ZoneApexNotFound { ref fqdn, .. } if fqdn == "www.example.invalid."));

        let err = walk_to_apex("www.example.com.", |candidate| async move {
            soa_owned_by(candidate, Err(ResolveErrorKind::Timeout.into()))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, DnsError::ZoneApexNotFound { ref fqdn, .. } if fqdn == "www.example.com."));
    }

    #[test]
    fn test_no_zones_is_zone_not_found() {
        for policy in [
            ZoneSelection::Unique,
            ZoneSelection::First,
            ZoneSelection::PreferPublic,
            ZoneSelection::PreferPrivate,
        ] {
            let err = policy.select("example.com.", &[]).unwrap_err();
            assert!(matches!(err, DnsError::ZoneNotFound(ref d) if d == "example.com."));
        }
    }

    #[test]
    fn test_single_zone_is_selected_by_every_policy() {
        let zones = vec![zone("example-zone", ZoneVisibility::Private)];
        assert_eq!(
            ZoneSelection::PreferPublic
                .select("example.com.", &zones)
                .unwrap()
                .name,
            "example-zone"
        );
        assert_eq!(
            ZoneSelection::Unique
                .select("example.com.", &zones)
                .unwrap()
                .name,
            "example-zone"
        );
    }

    #[test]
    fn test_unique_rejects_ambiguity() {
        let zones = vec![
            zone("public-zone", ZoneVisibility::Public),
            zone("private-zone", ZoneVisibility::Private),
        ];

        match ZoneSelection::Unique.select("example.com.", &zones) {
            Err(DnsError::AmbiguousZone { dns_name, zones }) => {
                assert_eq!(dns_name, "example.com.");
                assert_eq!(zones, vec!["public-zone", "private-zone"]);
            }
            other => panic!("Expected AmbiguousZone, got {:?}", other),
        }
    }

    #[test]
    fn test_first_and_visibility_preferences() {
        let zones = vec![
            zone("private-zone", ZoneVisibility::Private),
            zone("public-zone", ZoneVisibility::Public),
        ];

        assert_eq!(
            ZoneSelection::First.select("example.com.", &zones).unwrap().name,
            "private-zone"
        );
        assert_eq!(
            ZoneSelection::PreferPublic
                .select("example.com.", &zones)
                .unwrap()
                .name,
            "public-zone"
        );
        assert_eq!(
            ZoneSelection::PreferPrivate
                .select("example.com.", &zones)
                .unwrap()
                .name,
            "private-zone"
        );
    }

    #[test]
    fn test_preference_still_ambiguous_between_same_visibility() {
        let zones = vec![
            zone("public-a", ZoneVisibility::Public),
            zone("public-b", ZoneVisibility::Public),
            zone("private", ZoneVisibility::Private),
        ];

        let err = ZoneSelection::PreferPublic
            .select("example.com.", &zones)
            .unwrap_err();
        match err {
            DnsError::AmbiguousZone { zones, .. } => assert_eq!(zones, vec!["public-a", "public-b"]),
            other => panic!("Expected AmbiguousZone, got {}", other),
        }
    }

    #[test]
    fn test_zone_selection_serde() {
        let policy: ZoneSelection = serde_json::from_str("\"prefer_public\"").unwrap();
        assert_eq!(policy, ZoneSelection::PreferPublic);
        assert_eq!(ZoneSelection::default(), ZoneSelection::Unique);
    }
}
