//! Background lease renewal
//!
//! A `RenewalTask` keeps one lease alive for as long as an indefinitely held
//! lock is owned. It ticks every TTL/3 so that at least two keep-alives land
//! inside any TTL window even if one is lost.

use std::sync::Arc;
use std::time::Duration;

use keylease_client::{ClientError, Coordinator, LeaseId};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, error, info, warn};

const MIN_RENEWAL_PERIOD: Duration = Duration::from_millis(100);

/// Keep-alive cadence for a lease of the given TTL.
pub fn renewal_period(ttl: Duration) -> Duration {
    (ttl / 3).max(MIN_RENEWAL_PERIOD)
}

/// Periodic keep-alive job owned by the lock that started it.
///
/// Stopping is idempotent and also happens on drop, so a task never outlives
/// its owner.
pub struct RenewalTask {
    lease: LeaseId,
    period: Duration,
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl RenewalTask {
    /// Spawn the renewal loop. The first keep-alive is sent one period from now.
    pub fn start(client: Arc<dyn Coordinator>, lease: LeaseId, ttl: Duration) -> Self {
        let period = renewal_period(ttl);
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(run(client, lease, period, stop_rx));

        debug!(lease = %lease, period = ?period, "Renewal task started");

        Self {
            lease,
            period,
            stop_tx,
            handle,
        }
    }

    pub fn lease(&self) -> LeaseId {
        self.lease
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
    }

    /// False once stopped or once the lease was found gone.
    pub fn is_running(&self) -> bool {
        !*self.stop_tx.borrow() && !self.handle.is_finished()
    }
}

impl Drop for RenewalTask {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run(
    client: Arc<dyn Coordinator>,
    lease: LeaseId,
    period: Duration,
    mut stop_rx: watch::Receiver<bool>,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // A stalled call must not swallow the next tick.
                match tokio::time::timeout(period, client.lease_keep_alive_once(lease)).await {
                    Ok(Ok(ttl)) => {
                        debug!(lease = %lease, ttl, "Lease renewed");
                    }
                    Ok(Err(ClientError::LeaseNotFound(_))) => {
                        error!(lease = %lease, "Lease no longer exists, lock lost; stopping renewal");
                        break;
                    }
                    Ok(Err(e)) => {
                        warn!(lease = %lease, error = %e, "Lease renewal failed, retrying next period");
                    }
                    Err(_) => {
                        warn!(lease = %lease, timeout = ?period, "Lease renewal timed out, retrying next period");
                    }
                }
            }
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
            }
        }
    }

    info!(lease = %lease, "Renewal task stopped");
}
