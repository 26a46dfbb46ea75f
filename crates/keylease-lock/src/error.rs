//! Lock error types

use std::time::Duration;

use keylease_client::{ClientError, LeaseId};

/// Error returned by [`crate::DistributedLock`] operations
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("coordination service unreachable: {0}")]
    Connectivity(#[source] ClientError),

    #[error("lock '{key}' not acquired within {timeout:?}")]
    AcquisitionTimeout {
        key: String,
        lease: LeaseId,
        timeout: Duration,
    },

    #[error("keep-alive for lease {lease} failed: {source}")]
    Renewal {
        lease: LeaseId,
        #[source]
        source: ClientError,
    },

    #[error("failed to release lock '{key}': {source}")]
    Release {
        key: String,
        #[source]
        source: ClientError,
    },

    #[error("invalid lock key: {0}")]
    InvalidKey(String),

    #[error("hold of {requested:?} exceeds the maximum lease TTL of {max:?}")]
    HoldTooLong { requested: Duration, max: Duration },

    #[error("lease {0} already has a renewal task")]
    RenewalConflict(LeaseId),

    #[error("coordination service error: {0}")]
    Client(#[source] ClientError),
}

impl LockError {
    /// The lock is held by someone else; callers usually treat this as
    /// "resource busy, try later".
    pub fn is_contention(&self) -> bool {
        matches!(self, LockError::AcquisitionTimeout { .. })
    }
}

impl From<ClientError> for LockError {
    fn from(err: ClientError) -> Self {
        if err.is_connectivity() {
            LockError::Connectivity(err)
        } else {
            LockError::Client(err)
        }
    }
}

pub type Result<T> = std::result::Result<T, LockError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LockError::AcquisitionTimeout {
            key: "job-42".to_string(),
            lease: LeaseId::new(7),
            timeout: Duration::from_millis(1000),
        };
        assert_eq!(err.to_string(), "lock 'job-42' not acquired within 1s");
        assert!(err.is_contention());

        let err = LockError::InvalidKey("empty".to_string());
        assert_eq!(err.to_string(), "invalid lock key: empty");
        assert!(!err.is_contention());
    }

    #[test]
    fn test_from_client_error() {
        let err: LockError = ClientError::Unavailable("down".to_string()).into();
        assert!(matches!(err, LockError::Connectivity(_)));

        let err: LockError = ClientError::LeaseNotFound(LeaseId::new(1)).into();
        assert!(matches!(err, LockError::Client(_)));
    }
}
