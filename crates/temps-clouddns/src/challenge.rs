//! DNS-01 challenge record derivation
//!
//! Computes the TXT record an ACME server expects for a DNS-01 challenge:
//! the record lives at `_acme-challenge.<domain>.` and holds the base64url
//! encoded SHA-256 digest of the key authorization.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sha2::{Digest, Sha256};

/// Label prepended to the domain to form the challenge record name
pub const ACME_CHALLENGE_LABEL: &str = "_acme-challenge";

/// TTL (seconds) for challenge records
pub const DNS01_TTL: u32 = 120;

/// The TXT record that satisfies a DNS-01 challenge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dns01Record {
    /// Fully qualified record name, trailing dot included
    pub fqdn: String,
    /// TXT record value
    pub value: String,
    /// Record TTL in seconds
    pub ttl: u32,
}

impl Dns01Record {
    /// Derive the challenge record for `domain` from the ACME key authorization.
    ///
    /// Wildcard domains (`*.example.com`) are validated on their base name.
    pub fn new(domain: &str, key_authorization: &str) -> Self {
        let base = un_fqdn(domain.strip_prefix("*.").unwrap_or(domain));

        Self {
            fqdn: format!("{}.{}.", ACME_CHALLENGE_LABEL, base),
            value: challenge_value(key_authorization),
            ttl: DNS01_TTL,
        }
    }
}

/// base64url(SHA-256(key_authorization)) without padding
pub fn challenge_value(key_authorization: &str) -> String {
    let digest = Sha256::digest(key_authorization.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

/// Add a trailing dot if missing
pub fn to_fqdn(name: &str) -> String {
    if name.ends_with('.') {
        name.to_string()
    } else {
        format!("{}.", name)
    }
}

/// Strip the trailing dot, if any
pub fn un_fqdn(name: &str) -> &str {
    name.strip_suffix('.').unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_challenge_record_for_apex_domain() {
        let record = Dns01Record::new("example.com", "token.thumbprint");

        assert_eq!(record.fqdn, "_acme-challenge.example.com.");
        assert_eq!(record.ttl, 120);
        assert_eq!(record.value, challenge_value("token.thumbprint"));
    }

    #[test]
    fn test_challenge_record_for_wildcard_and_fqdn_input() {
        assert_eq!(
            Dns01Record::new("*.example.com", "k").fqdn,
            "_acme-challenge.example.com."
        );
        assert_eq!(
            Dns01Record::new("www.example.com.", "k").fqdn,
            "_acme-challenge.www.example.com."
        );
    }

    #[test]
    fn test_challenge_value_is_base64url_sha256() {
        // SHA-256("abc") = ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad
        assert_eq!(
            challenge_value("abc"),
            "ungWv48Bz-pBQUDeXa4iI7ADYaOWF3qctBD_YfIAFa0"
        );
    }

    #[test]
    fn test_fqdn_helpers() {
        assert_eq!(to_fqdn("example.com"), "example.com.");
        assert_eq!(to_fqdn("example.com."), "example.com.");
        assert_eq!(un_fqdn("example.com."), "example.com");
        assert_eq!(un_fqdn("example.com"), "example.com");
    }
}
