//! Lease-bound distributed lock
//!
//! Acquire grants a lease, binds the lock on the key to it within a fixed
//! timeout and, for indefinite holds, keeps the lease alive in the
//! background. Release unlocks and revokes. If the holder dies, the lease
//! expires and the service frees the key on its own.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use keylease_client::{Coordinator, EtcdCoordinator, LeaseId, lock_key};
use tracing::{debug, error, info, warn};

use crate::config::{LockConfig, LockOptions, MAX_LEASE_TTL_SECS};
use crate::error::{LockError, Result};
use crate::model::{Hold, LockHandle};
use crate::renewal::RenewalTask;
use crate::scope::LeaseScope;

/// Distributed mutual-exclusion lock over a coordination service.
///
/// The client handle is shared by every operation; renewal tasks are owned
/// by this instance and stop when it is dropped.
pub struct DistributedLock {
    client: Arc<dyn Coordinator>,
    options: LockOptions,
    renewals: DashMap<LeaseId, RenewalTask>,
}

impl DistributedLock {
    /// Connect to the etcd endpoints in `config`.
    pub async fn connect(config: &LockConfig) -> Result<Self> {
        let coordinator = EtcdCoordinator::connect(&config.connect_config())
            .await
            .map_err(|e| {
                error!(endpoints = ?config.endpoints, error = %e, "Failed to connect to etcd");
                LockError::Connectivity(e)
            })?;
        Ok(Self::with_client(Arc::new(coordinator), config.options()))
    }

    /// Connect if the feature is enabled, `None` otherwise.
    pub async fn from_config(config: &LockConfig) -> Result<Option<Self>> {
        if !config.enabled {
            info!("Distributed lock disabled by configuration");
            return Ok(None);
        }
        Self::connect(config).await.map(Some)
    }

    /// Wrap a pre-configured client handle.
    pub fn with_client(client: Arc<dyn Coordinator>, options: LockOptions) -> Self {
        Self {
            client,
            options,
            renewals: DashMap::new(),
        }
    }

    pub fn client(&self) -> Arc<dyn Coordinator> {
        self.client.clone()
    }

    pub fn options(&self) -> LockOptions {
        self.options
    }

    /// Acquire `key`. `hold_secs` > 0 holds for at most that many seconds,
    /// 0 uses the default TTL, < 0 holds until released.
    pub async fn acquire(&self, key: &str, hold_secs: i64) -> Result<LockHandle> {
        self.acquire_with(key, Hold::from_secs(hold_secs)).await
    }

    pub async fn acquire_with(&self, key: &str, hold: Hold) -> Result<LockHandle> {
        if key.is_empty() {
            return Err(LockError::InvalidKey("lock key must not be empty".to_string()));
        }

        let ttl = hold.lease_ttl(self.options.default_ttl);
        if ttl.as_secs() > MAX_LEASE_TTL_SECS {
            return Err(LockError::HoldTooLong {
                requested: ttl,
                max: Duration::from_secs(MAX_LEASE_TTL_SECS),
            });
        }
        let lease = match self.client.lease_grant(ttl.as_secs() as i64).await {
            Ok(lease) => lease,
            Err(e) => {
                error!(key = %key, error = %e, "Lease grant failed");
                record_acquire("error");
                return Err(e.into());
            }
        };
        let scope = LeaseScope::new(self, lease);

        let bind = tokio::time::timeout(
            self.options.acquire_timeout,
            self.client.lock(key.as_bytes(), lease),
        )
        .await;

        let lock_key = match bind {
            Ok(Ok(lock_key)) => lock_key,
            Ok(Err(e)) => {
                error!(key = %key, lease = %lease, error = %e, "Lock bind failed");
                scope.rollback().await;
                record_acquire("error");
                return Err(e.into());
            }
            Err(_) => {
                info!(key = %key, lease = %lease, "Lock is held elsewhere");
                scope.rollback().await;
                record_acquire("contended");
                return Err(LockError::AcquisitionTimeout {
                    key: key.to_string(),
                    lease,
                    timeout: self.options.acquire_timeout,
                });
            }
        };

        if hold.is_indefinite()
            && let Err(e) = self.start_renewal(lease, ttl)
        {
            error!(key = %key, lease = %lease, error = %e, "Could not start lease renewal");
            scope.rollback().await;
            record_acquire("error");
            return Err(e);
        }

        let lease = scope.commit();
        record_acquire("acquired");
        debug!(key = %key, lease = %lease, ttl = ?ttl, hold = ?hold, "Lock acquired");

        Ok(LockHandle::new(key.to_string(), lease, lock_key))
    }

    /// Release `key` held by `lease`.
    ///
    /// A failed unlock leaves the lease alone: the lock may still be held or
    /// may have expired, and the caller decides whether to retry.
    pub async fn release(&self, key: &str, lease: LeaseId) -> Result<()> {
        let lock_key = lock_key(key.as_bytes(), lease);
        self.release_key(key, lease, &lock_key).await
    }

    pub async fn release_handle(&self, handle: &LockHandle) -> Result<()> {
        self.release_key(handle.key(), handle.lease_id(), handle.lock_key())
            .await
    }

    async fn release_key(&self, key: &str, lease: LeaseId, lock_key: &[u8]) -> Result<()> {
        if let Err(e) = self.client.unlock(lock_key).await {
            error!(key = %key, lease = %lease, error = %e, "Unlock failed, lease left in place");
            return Err(LockError::Release {
                key: key.to_string(),
                source: e,
            });
        }

        self.stop_renewal(lease);

        if let Err(e) = self.client.lease_revoke(lease).await {
            warn!(key = %key, lease = %lease, error = %e, "Unlocked but lease revoke failed");
            return Err(LockError::Release {
                key: key.to_string(),
                source: e,
            });
        }

        metrics::counter!("keylease_release_total").increment(1);
        debug!(key = %key, lease = %lease, "Lock released");
        Ok(())
    }

    /// Send one keep-alive for a fixed-duration hold and return the TTL the
    /// service reset the lease to.
    pub async fn keep_alive(&self, handle: &LockHandle) -> Result<Duration> {
        let lease = handle.lease_id();
        let ttl = self
            .client
            .lease_keep_alive_once(lease)
            .await
            .map_err(|source| LockError::Renewal { lease, source })?;
        Ok(Duration::from_secs(ttl.max(0) as u64))
    }

    /// Stop any renewal task for `lease` and revoke it, logging a failed
    /// revoke instead of returning it.
    pub async fn revoke_quietly(&self, lease: LeaseId) {
        self.stop_renewal(lease);
        if let Err(e) = self.client.lease_revoke(lease).await {
            warn!(lease = %lease, error = %e, "Lease revoke failed, it will expire after its TTL");
        }
    }

    /// Whether a renewal task is currently keeping `lease` alive. A task
    /// that ended on its own (lease lost) is dropped from the registry.
    pub fn is_renewing(&self, lease: LeaseId) -> bool {
        match self.renewals.get(&lease).map(|task| task.is_running()) {
            Some(true) => true,
            Some(false) => {
                self.renewals.remove_if(&lease, |_, task| !task.is_running());
                self.publish_renewal_gauge();
                false
            }
            None => false,
        }
    }

    /// Stop renewing `lease` without releasing the lock; the lease then
    /// expires after its TTL. Returns false if no task existed.
    pub fn stop_renewal(&self, lease: LeaseId) -> bool {
        let Some((_, task)) = self.renewals.remove(&lease) else {
            return false;
        };
        task.stop();
        self.publish_renewal_gauge();
        true
    }

    /// Stop every renewal task owned by this instance.
    pub fn shutdown(&self) {
        let leases: Vec<LeaseId> = self.renewals.iter().map(|entry| *entry.key()).collect();
        for lease in &leases {
            self.stop_renewal(*lease);
        }
        if !leases.is_empty() {
            info!(count = leases.len(), "Stopped lease renewal tasks");
        }
    }

    fn start_renewal(&self, lease: LeaseId, ttl: Duration) -> Result<()> {
        match self.renewals.entry(lease) {
            Entry::Occupied(_) => Err(LockError::RenewalConflict(lease)),
            Entry::Vacant(slot) => {
                slot.insert(RenewalTask::start(self.client.clone(), lease, ttl));
                self.publish_renewal_gauge();
                Ok(())
            }
        }
    }

    fn publish_renewal_gauge(&self) {
        self.renewals.retain(|_, task| task.is_running());
        metrics::gauge!("keylease_renewal_tasks").set(self.renewals.len() as f64);
    }
}

fn record_acquire(outcome: &'static str) {
    metrics::counter!("keylease_acquire_total", "outcome" => outcome).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use keylease_client::MemoryCoordinator;

    fn memory_lock() -> (Arc<MemoryCoordinator>, DistributedLock) {
        let coordinator = Arc::new(MemoryCoordinator::new());
        let lock = DistributedLock::with_client(coordinator.clone(), LockOptions::default());
        (coordinator, lock)
    }

    #[tokio::test]
    async fn test_empty_key_is_rejected() {
        let (coordinator, lock) = memory_lock();
        let err = lock.acquire("", 0).await.unwrap_err();
        assert!(matches!(err, LockError::InvalidKey(_)));
        assert_eq!(coordinator.lease_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversized_hold_is_rejected() {
        let (coordinator, lock) = memory_lock();

        let err = lock.acquire("res", i64::MAX).await.unwrap_err();
        assert!(matches!(err, LockError::HoldTooLong { .. }));

        let err = lock
            .acquire_with("res", Hold::Seconds(u64::MAX))
            .await
            .unwrap_err();
        assert!(matches!(err, LockError::HoldTooLong { .. }));
        assert_eq!(coordinator.lease_count(), 0);

        let max = MAX_LEASE_TTL_SECS as i64;
        let handle = lock.acquire("res", max).await.unwrap();
        assert_eq!(
            coordinator.lease_time_to_live(handle.lease_id()).await.unwrap(),
            Some(max)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_hold_uses_requested_ttl() {
        let (coordinator, lock) = memory_lock();
        let handle = lock.acquire("res", 5).await.unwrap();
        assert_eq!(
            coordinator.lease_time_to_live(handle.lease_id()).await.unwrap(),
            Some(5)
        );
        assert!(!lock.is_renewing(handle.lease_id()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_hold_uses_default_ttl() {
        let (coordinator, lock) = memory_lock();
        let handle = lock.acquire("res", 0).await.unwrap();
        assert_eq!(
            coordinator.lease_time_to_live(handle.lease_id()).await.unwrap(),
            Some(30)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_indefinite_hold_starts_one_renewal() {
        let (_coordinator, lock) = memory_lock();
        let handle = lock.acquire("res", -1).await.unwrap();
        assert!(lock.is_renewing(handle.lease_id()));
        assert_eq!(lock.renewals.len(), 1);

        lock.release_handle(&handle).await.unwrap();
        assert!(!lock.is_renewing(handle.lease_id()));
        assert!(lock.renewals.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lost_lease_leaves_renewal_registry() {
        let (coordinator, lock) = memory_lock();
        let lost = lock.acquire("lost", -1).await.unwrap();
        let kept = lock.acquire("kept", -1).await.unwrap();

        // The lease disappears behind the lock's back
        coordinator.lease_revoke(lost.lease_id()).await.unwrap();
        tokio::time::sleep(Duration::from_secs(11)).await;

        assert!(!lock.is_renewing(lost.lease_id()));
        assert!(lock.is_renewing(kept.lease_id()));
        assert_eq!(lock.renewals.len(), 1);
        assert!(!lock.stop_renewal(lost.lease_id()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_renewal_conflict_is_rejected() {
        let (coordinator, lock) = memory_lock();
        let lease = coordinator.lease_grant(30).await.unwrap();
        lock.start_renewal(lease, Duration::from_secs(30)).unwrap();
        assert!(matches!(
            lock.start_renewal(lease, Duration::from_secs(30)),
            Err(LockError::RenewalConflict(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_keep_alive_extends_fixed_hold() {
        let (coordinator, lock) = memory_lock();
        let handle = lock.acquire("res", 5).await.unwrap();

        tokio::time::sleep(Duration::from_secs(4)).await;
        let ttl = lock.keep_alive(&handle).await.unwrap();
        assert_eq!(ttl, Duration::from_secs(5));

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(coordinator.holder(b"res"), Some(handle.lease_id()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_keep_alive_after_expiry_fails() {
        let (_coordinator, lock) = memory_lock();
        let handle = lock.acquire("res", 2).await.unwrap();

        tokio::time::sleep(Duration::from_secs(3)).await;
        let err = lock.keep_alive(&handle).await.unwrap_err();
        assert!(matches!(err, LockError::Renewal { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_all_renewals() {
        let (_coordinator, lock) = memory_lock();
        let a = lock.acquire("a", -1).await.unwrap();
        let b = lock.acquire("b", -1).await.unwrap();

        lock.shutdown();
        assert!(!lock.is_renewing(a.lease_id()));
        assert!(!lock.is_renewing(b.lease_id()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_revoke_quietly_swallows_errors() {
        let (coordinator, lock) = memory_lock();
        let handle = lock.acquire("res", -1).await.unwrap();

        coordinator.set_available(false);
        lock.revoke_quietly(handle.lease_id()).await;
        assert!(!lock.is_renewing(handle.lease_id()));
    }
}
