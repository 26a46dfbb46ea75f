//! Rollback scope for a granted lease
//!
//! Between the lease grant and a fully locked state, the lease belongs to the
//! scope. `commit` hands it to the caller; every other exit revokes it,
//! including the acquire future being dropped mid-flight.

use keylease_client::LeaseId;
use tracing::warn;

use crate::lock::DistributedLock;

pub(crate) struct LeaseScope<'a> {
    lock: &'a DistributedLock,
    lease: LeaseId,
    armed: bool,
}

impl<'a> LeaseScope<'a> {
    pub(crate) fn new(lock: &'a DistributedLock, lease: LeaseId) -> Self {
        Self {
            lock,
            lease,
            armed: true,
        }
    }

    /// Keep the lease; the caller now owns it.
    pub(crate) fn commit(mut self) -> LeaseId {
        self.armed = false;
        self.lease
    }

    /// Revoke the lease, logging instead of propagating a revoke failure.
    pub(crate) async fn rollback(mut self) {
        self.armed = false;
        self.lock.revoke_quietly(self.lease).await;
    }
}

impl Drop for LeaseScope<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let lease = self.lease;
        self.lock.stop_renewal(lease);

        let client = self.lock.client();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Err(e) = client.lease_revoke(lease).await {
                        warn!(lease = %lease, error = %e, "Revoke of abandoned lease failed, it will expire after its TTL");
                    }
                });
            }
            Err(_) => {
                warn!(lease = %lease, "No runtime to revoke abandoned lease, it will expire after its TTL");
            }
        }
    }
}
