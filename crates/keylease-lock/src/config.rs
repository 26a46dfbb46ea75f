//! Lock configuration
//!
//! `LockConfig` is the deserializable form bound under `etcd.config`;
//! `LockOptions` carries the two timing knobs the lock itself needs.

use std::time::Duration;

use keylease_client::ConnectConfig;
use serde::{Deserialize, Deserializer, Serialize};

/// Default lease TTL when the caller asks for the default hold or an indefinite one
pub const DEFAULT_LEASE_TTL_SECS: u64 = 30;

/// Upper bound on waiting for the lock bind
pub const DEFAULT_ACQUIRE_TIMEOUT_MS: u64 = 1000;

pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5000;

/// Largest lease TTL etcd accepts
pub const MAX_LEASE_TTL_SECS: u64 = 9_000_000_000;

/// Timing options for [`crate::DistributedLock`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LockOptions {
    pub default_ttl: Duration,
    pub acquire_timeout: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(DEFAULT_LEASE_TTL_SECS),
            acquire_timeout: Duration::from_millis(DEFAULT_ACQUIRE_TIMEOUT_MS),
        }
    }
}

impl LockOptions {
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }
}

/// Lock feature configuration, bound from the `etcd.config` section.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct LockConfig {
    /// Whether the distributed lock is enabled at all
    pub enabled: bool,
    /// etcd endpoints; accepts a list or a comma separated string
    #[serde(deserialize_with = "deserialize_endpoints")]
    pub endpoints: Vec<String>,
    pub default_ttl_secs: u64,
    pub acquire_timeout_ms: u64,
    pub connect_timeout_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoints: Vec::new(),
            default_ttl_secs: DEFAULT_LEASE_TTL_SECS,
            acquire_timeout_ms: DEFAULT_ACQUIRE_TIMEOUT_MS,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
        }
    }
}

impl LockConfig {
    /// Enabled config pointing at the given endpoints.
    pub fn new(endpoints: Vec<String>) -> Self {
        Self {
            enabled: true,
            endpoints,
            ..Default::default()
        }
    }

    pub fn options(&self) -> LockOptions {
        LockOptions {
            // a lease shorter than one second cannot be renewed at TTL/3
            default_ttl: Duration::from_secs(self.default_ttl_secs.max(1)),
            acquire_timeout: Duration::from_millis(self.acquire_timeout_ms),
        }
    }

    pub fn connect_config(&self) -> ConnectConfig {
        ConnectConfig::new(self.endpoints.clone())
            .with_connect_timeout(Duration::from_millis(self.connect_timeout_ms))
    }
}

/// Split a comma separated endpoint string, dropping blanks.
pub fn parse_endpoints(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn deserialize_endpoints<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Endpoints {
        Joined(String),
        List(Vec<String>),
    }

    Ok(match Endpoints::deserialize(deserializer)? {
        Endpoints::Joined(raw) => parse_endpoints(&raw),
        Endpoints::List(list) => list
            .iter()
            .flat_map(|item| parse_endpoints(item))
            .collect(),
    })
}
