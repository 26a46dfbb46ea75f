//! Hold modes and lock handles

use std::time::Duration;

use keylease_client::LeaseId;

/// How long an acquired lock should be held.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Hold {
    /// Lease TTL of this many seconds, never renewed automatically
    Seconds(u64),
    /// Lease TTL of the configured default, never renewed automatically
    Default,
    /// Lease TTL of the configured default, renewed in the background
    /// until the lock is released
    Indefinite,
}

impl Hold {
    /// Map a signed hold duration: positive is a fixed hold, zero the
    /// default, negative indefinite.
    pub fn from_secs(secs: i64) -> Self {
        match secs {
            s if s > 0 => Hold::Seconds(s as u64),
            0 => Hold::Default,
            _ => Hold::Indefinite,
        }
    }

    /// Lease TTL to request for this hold.
    pub fn lease_ttl(self, default_ttl: Duration) -> Duration {
        match self {
            Hold::Seconds(secs) => Duration::from_secs(secs),
            Hold::Default | Hold::Indefinite => default_ttl,
        }
    }

    pub fn is_indefinite(self) -> bool {
        matches!(self, Hold::Indefinite)
    }
}

impl From<i64> for Hold {
    fn from(secs: i64) -> Self {
        Hold::from_secs(secs)
    }
}

/// Proof of a held lock, returned by acquire and presented to release.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LockHandle {
    key: String,
    lease: LeaseId,
    lock_key: Vec<u8>,
}

impl LockHandle {
    pub(crate) fn new(key: String, lease: LeaseId, lock_key: Vec<u8>) -> Self {
        Self {
            key,
            lease,
            lock_key,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn lease_id(&self) -> LeaseId {
        self.lease
    }

    pub(crate) fn lock_key(&self) -> &[u8] {
        &self.lock_key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hold_from_secs() {
        assert_eq!(Hold::from_secs(15), Hold::Seconds(15));
        assert_eq!(Hold::from_secs(0), Hold::Default);
        assert_eq!(Hold::from_secs(-1), Hold::Indefinite);
        assert_eq!(Hold::from(i64::MIN), Hold::Indefinite);
    }

    #[test]
    fn test_lease_ttl() {
        let default = Duration::from_secs(30);
        assert_eq!(Hold::Seconds(5).lease_ttl(default), Duration::from_secs(5));
        assert_eq!(Hold::Default.lease_ttl(default), default);
        assert_eq!(Hold::Indefinite.lease_ttl(default), default);
        assert!(Hold::Indefinite.is_indefinite());
        assert!(!Hold::Default.is_indefinite());
    }
}
