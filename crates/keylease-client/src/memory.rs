//! In-process coordinator
//!
//! Mirrors the etcd lease and lock semantics the lock component relies on:
//! - leases expire on the tokio clock unless kept alive
//! - every contender for a lock owns the key `<name>/<lease hex>`, bound to
//!   its lease, and the contender with the lowest creation revision holds it
//! - a contender that stops waiting stays queued until its lease is revoked
//!   or expires, exactly like a lock call abandoned on etcd
//!
//! Used by the test suites and by the demo binary's `--memory` mode.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;

use crate::coordinator::Coordinator;
use crate::error::{ClientError, Result};
use crate::lease::{LeaseId, lock_key};

struct LeaseEntry {
    ttl: i64,
    deadline: Instant,
}

struct OwnerEntry {
    name: Vec<u8>,
    lease: LeaseId,
    revision: u64,
}

#[derive(Default)]
struct State {
    next_lease: i64,
    revision: u64,
    leases: HashMap<LeaseId, LeaseEntry>,
    owners: BTreeMap<Vec<u8>, OwnerEntry>,
}

impl State {
    /// Drop expired leases and every ownership key bound to them.
    /// Returns true if anything was removed.
    fn purge_expired(&mut self, now: Instant) -> bool {
        let before = self.leases.len();
        self.leases.retain(|_, lease| lease.deadline > now);
        if self.leases.len() == before {
            return false;
        }
        let leases = &self.leases;
        self.owners.retain(|_, owner| leases.contains_key(&owner.lease));
        true
    }

    fn remove_lease(&mut self, lease: LeaseId) -> bool {
        let existed = self.leases.remove(&lease).is_some();
        self.owners.retain(|_, owner| owner.lease != lease);
        existed
    }
}

fn lease_deadline(ttl_secs: i64) -> Result<Instant> {
    Instant::now()
        .checked_add(Duration::from_secs(ttl_secs as u64))
        .ok_or_else(|| {
            ClientError::Other(anyhow::anyhow!("lease TTL {}s is out of range", ttl_secs))
        })
}

/// Coordinator keeping leases and locks in process memory.
pub struct MemoryCoordinator {
    state: Mutex<State>,
    changed: Notify,
    available: AtomicBool,
    keep_alive_failing: AtomicBool,
}

impl Default for MemoryCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCoordinator {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                next_lease: 1,
                ..Default::default()
            }),
            changed: Notify::new(),
            available: AtomicBool::new(true),
            keep_alive_failing: AtomicBool::new(false),
        }
    }

    /// Simulate the service becoming unreachable (`false`) or coming back.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Make every keep-alive fail while leaving other calls untouched.
    pub fn set_keep_alive_failing(&self, failing: bool) {
        self.keep_alive_failing.store(failing, Ordering::SeqCst);
    }

    /// Number of live leases.
    pub fn lease_count(&self) -> usize {
        let mut state = self.state.lock();
        state.purge_expired(Instant::now());
        state.leases.len()
    }

    /// Lease currently holding `name`, if any.
    pub fn holder(&self, name: &[u8]) -> Option<LeaseId> {
        let mut state = self.state.lock();
        state.purge_expired(Instant::now());
        state
            .owners
            .values()
            .filter(|owner| owner.name == name)
            .min_by_key(|owner| owner.revision)
            .map(|owner| owner.lease)
    }

    fn check_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ClientError::Unavailable(
                "in-memory coordinator is offline".to_string(),
            ))
        }
    }

    fn purge_and_notify(&self, state: &mut State) {
        if state.purge_expired(Instant::now()) {
            self.changed.notify_waiters();
        }
    }
}

#[async_trait]
impl Coordinator for MemoryCoordinator {
    async fn lease_grant(&self, ttl_secs: i64) -> Result<LeaseId> {
        self.check_available()?;
        if ttl_secs <= 0 {
            return Err(ClientError::Other(anyhow::anyhow!(
                "lease TTL must be positive, got {}",
                ttl_secs
            )));
        }

        let deadline = lease_deadline(ttl_secs)?;
        let mut state = self.state.lock();
        let lease = LeaseId::new(state.next_lease);
        state.next_lease += 1;
        state.leases.insert(
            lease,
            LeaseEntry {
                ttl: ttl_secs,
                deadline,
            },
        );
        debug!(lease = %lease, ttl = ttl_secs, "Lease granted");
        Ok(lease)
    }

    async fn lease_keep_alive_once(&self, lease: LeaseId) -> Result<i64> {
        self.check_available()?;
        if self.keep_alive_failing.load(Ordering::SeqCst) {
            return Err(ClientError::Unavailable("keep-alive rejected".to_string()));
        }

        let mut state = self.state.lock();
        self.purge_and_notify(&mut state);
        let entry = state
            .leases
            .get_mut(&lease)
            .ok_or(ClientError::LeaseNotFound(lease))?;
        entry.deadline = lease_deadline(entry.ttl)?;
        Ok(entry.ttl)
    }

    async fn lease_revoke(&self, lease: LeaseId) -> Result<()> {
        self.check_available()?;
        let mut state = self.state.lock();
        self.purge_and_notify(&mut state);
        if state.remove_lease(lease) {
            debug!(lease = %lease, "Lease revoked");
        }
        self.changed.notify_waiters();
        Ok(())
    }

    async fn lease_time_to_live(&self, lease: LeaseId) -> Result<Option<i64>> {
        self.check_available()?;
        let mut state = self.state.lock();
        self.purge_and_notify(&mut state);
        let now = Instant::now();
        Ok(state
            .leases
            .get(&lease)
            .map(|entry| entry.deadline.saturating_duration_since(now).as_secs() as i64))
    }

    async fn lock(&self, name: &[u8], lease: LeaseId) -> Result<Vec<u8>> {
        self.check_available()?;
        let key = lock_key(name, lease);

        {
            let mut state = self.state.lock();
            self.purge_and_notify(&mut state);
            if !state.leases.contains_key(&lease) {
                return Err(ClientError::LeaseNotFound(lease));
            }
            if !state.owners.contains_key(&key) {
                state.revision += 1;
                let revision = state.revision;
                state.owners.insert(
                    key.clone(),
                    OwnerEntry {
                        name: name.to_vec(),
                        lease,
                        revision,
                    },
                );
            }
        }

        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let wake_at = {
                let mut state = self.state.lock();
                self.purge_and_notify(&mut state);

                // Our key vanishes when our own lease is revoked or expires.
                let Some(mine) = state.owners.get(&key) else {
                    return Err(ClientError::LeaseNotFound(lease));
                };
                let my_revision = mine.revision;

                let blocker = state
                    .owners
                    .values()
                    .filter(|owner| owner.name == name && owner.revision < my_revision)
                    .filter_map(|owner| state.leases.get(&owner.lease).map(|l| l.deadline))
                    .min();
                let Some(blocker) = blocker else {
                    return Ok(key);
                };
                match state.leases.get(&lease) {
                    Some(own) => blocker.min(own.deadline),
                    None => blocker,
                }
            };

            tokio::select! {
                _ = notified => {}
                _ = tokio::time::sleep_until(wake_at) => {}
            }
        }
    }

    async fn unlock(&self, lock_key: &[u8]) -> Result<()> {
        self.check_available()?;
        let mut state = self.state.lock();
        self.purge_and_notify(&mut state);
        state.owners.remove(lock_key);
        self.changed.notify_waiters();
        Ok(())
    }
}
