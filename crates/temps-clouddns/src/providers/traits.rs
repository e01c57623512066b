//! Challenge provider trait definitions
//!
//! The contract between an ACME client and a DNS backend for DNS-01: publish
//! the challenge record, remove it afterwards, and advise how long to wait for
//! propagation.

use std::time::Duration;

use async_trait::async_trait;

use crate::errors::DnsError;

/// A DNS backend able to solve DNS-01 challenges
#[async_trait]
pub trait ChallengeProvider: Send + Sync {
    /// Publish the TXT record for `domain`. Returns once the backend has applied it.
    async fn present(
        &self,
        domain: &str,
        token: &str,
        key_authorization: &str,
    ) -> Result<(), DnsError>;

    /// Remove the TXT record published by [`present`](Self::present)
    async fn cleanup(
        &self,
        domain: &str,
        token: &str,
        key_authorization: &str,
    ) -> Result<(), DnsError>;

    /// `(timeout, interval)` the caller should use when checking propagation
    fn timeout(&self) -> (Duration, Duration);
}
