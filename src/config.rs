//! # Configuration
//!
//! Runtime options shared by the resolver, the authorization gate and the
//! mutation orchestrator.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::identifier::{LogAddress, Network};

/// Default upper bound on the age of a signed request.
pub const MAX_REQUEST_AGE: Duration = Duration::from_secs(30);

/// Default time to wait for the log to confirm a submitted operation.
pub const SUBMISSION_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of log messages requested per page.
pub const PAGE_SIZE: usize = 100;

/// Options for the resolution engine and authorization gate.
///
/// Deserializes from camelCase JSON with durations given in milliseconds.
/// Missing fields take their defaults.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Network new identifiers are registered on.
    pub network: Network,

    /// Log address (topic) new identifiers are registered against.
    pub log_address: LogAddress,

    /// Upper bound on a signed request's validity window, whatever duration
    /// the request itself claims.
    #[serde(rename = "maxRequestAgeMs", with = "millis")]
    pub max_request_age: Duration,

    /// How long to wait for the log to confirm a submission.
    #[serde(rename = "submissionTimeoutMs", with = "millis")]
    pub submission_timeout: Duration,

    /// How long a resolved snapshot may be served from cache. Zero disables
    /// caching.
    #[serde(rename = "cacheTtlMs", with = "millis")]
    pub cache_ttl: Duration,

    /// Messages requested per log read.
    pub page_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            network: Network::Testnet,
            log_address: LogAddress::default(),
            max_request_age: MAX_REQUEST_AGE,
            submission_timeout: SUBMISSION_TIMEOUT,
            cache_ttl: Duration::ZERO,
            page_size: PAGE_SIZE,
        }
    }
}

impl Config {
    /// Set the network new identifiers are registered on.
    #[must_use]
    pub const fn network(mut self, network: Network) -> Self {
        self.network = network;
        self
    }

    /// Set the log address new identifiers are registered against.
    #[must_use]
    pub const fn log_address(mut self, address: LogAddress) -> Self {
        self.log_address = address;
        self
    }

    /// Set the maximum request age.
    #[must_use]
    pub const fn max_request_age(mut self, age: Duration) -> Self {
        self.max_request_age = age;
        self
    }

    /// Set the submission confirmation timeout.
    #[must_use]
    pub const fn submission_timeout(mut self, timeout: Duration) -> Self {
        self.submission_timeout = timeout;
        self
    }

    /// Set the snapshot cache lifetime.
    #[must_use]
    pub const fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Set the log read page size. A size of zero is treated as one.
    #[must_use]
    pub fn page_size(mut self, size: usize) -> Self {
        self.page_size = size.max(1);
        self
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::cast_possible_truncation)]
    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
