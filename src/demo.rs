//! Contention demo: several workers race for the same key.
//!
//! Each worker tries once. A winner holds the lock (renewed in the background)
//! for the configured time and then releases it, so with a short hold later
//! workers can still get in before their acquisition timeout.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use keylease_lock::{DistributedLock, Hold};
use tracing::{error, info, warn};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DemoSettings {
    pub key: String,
    pub workers: usize,
    pub hold: Duration,
}

/// Outcome counts across all workers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DemoReport {
    pub acquired: usize,
    pub contended: usize,
    pub failed: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum WorkerOutcome {
    Acquired,
    Contended,
    Failed,
}

pub async fn run(lock: Arc<DistributedLock>, settings: &DemoSettings) -> DemoReport {
    let workers = (0..settings.workers).map(|worker| {
        let lock = lock.clone();
        let key = settings.key.clone();
        let hold = settings.hold;
        tokio::spawn(async move { run_worker(&lock, worker, &key, hold).await })
    });

    let mut report = DemoReport::default();
    for outcome in join_all(workers).await {
        match outcome {
            Ok(WorkerOutcome::Acquired) => report.acquired += 1,
            Ok(WorkerOutcome::Contended) => report.contended += 1,
            Ok(WorkerOutcome::Failed) => report.failed += 1,
            Err(e) => {
                error!(error = %e, "Worker task failed");
                report.failed += 1;
            }
        }
    }
    report
}

async fn run_worker(
    lock: &DistributedLock,
    worker: usize,
    key: &str,
    hold: Duration,
) -> WorkerOutcome {
    let handle = match lock.acquire_with(key, Hold::Indefinite).await {
        Ok(handle) => handle,
        Err(e) if e.is_contention() => {
            info!(worker, key, "Lock is held by another worker");
            return WorkerOutcome::Contended;
        }
        Err(e) => {
            error!(worker, key, error = %e, "Acquire failed");
            return WorkerOutcome::Failed;
        }
    };

    info!(worker, key, lease = %handle.lease_id(), "Acquired lock");
    tokio::time::sleep(hold).await;

    if let Err(e) = lock.release_handle(&handle).await {
        warn!(worker, key, error = %e, "Release failed, the lease will expire on its own");
    } else {
        info!(worker, key, "Released lock");
    }
    WorkerOutcome::Acquired
}
