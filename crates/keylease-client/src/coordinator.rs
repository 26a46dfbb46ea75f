//! Coordination service trait

use async_trait::async_trait;

use crate::error::Result;
use crate::lease::LeaseId;

/// Lease and lock primitives of a strongly-consistent coordination service.
///
/// Implementations are shared across tasks behind an `Arc` and must be safe
/// to call concurrently.
#[async_trait]
pub trait Coordinator: Send + Sync {
    /// Grant a new lease with the given time-to-live.
    async fn lease_grant(&self, ttl_secs: i64) -> Result<LeaseId>;

    /// Send a single keep-alive for `lease` and return the TTL the service
    /// reset it to. Fails with `LeaseNotFound` once the lease is gone.
    async fn lease_keep_alive_once(&self, lease: LeaseId) -> Result<i64>;

    /// Revoke `lease`, deleting every key bound to it. Revoking a lease that
    /// already expired or was revoked succeeds.
    async fn lease_revoke(&self, lease: LeaseId) -> Result<()>;

    /// Remaining TTL of `lease` in seconds, or `None` if it does not exist.
    async fn lease_time_to_live(&self, lease: LeaseId) -> Result<Option<i64>>;

    /// Wait until the lock `name` is held by `lease` and return the ownership
    /// key. Callers bound the wait with their own deadline.
    async fn lock(&self, name: &[u8], lease: LeaseId) -> Result<Vec<u8>>;

    /// Delete an ownership key returned by [`Coordinator::lock`]. Deleting a
    /// key that no longer exists succeeds.
    async fn unlock(&self, lock_key: &[u8]) -> Result<()>;
}
