//! Entry point for the keylease contention demo.

use std::sync::Arc;

use clap::Parser;
use keylease::config::{Cli, Configuration};
use keylease::demo;
use keylease::startup;
use keylease_lock::{DistributedLock, MemoryCoordinator};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let configuration = Configuration::load(&cli)?;
    let _logging_guard = startup::init_logging(&configuration.logging_config()?)?;

    let lock_config = configuration.lock_config()?;

    let lock = if cli.memory {
        info!("Using the in-process coordinator");
        DistributedLock::with_client(Arc::new(MemoryCoordinator::new()), lock_config.options())
    } else {
        match DistributedLock::from_config(&lock_config).await? {
            Some(lock) => {
                info!(endpoints = ?lock_config.endpoints, "Connected to etcd");
                lock
            }
            None => {
                warn!("Distributed lock is disabled; pass --endpoints, set etcd.config.enabled or use --memory");
                return Ok(());
            }
        }
    };
    let lock = Arc::new(lock);

    let settings = cli.demo_settings();
    info!(
        key = %settings.key,
        workers = settings.workers,
        hold = ?settings.hold,
        "Starting contention demo"
    );

    let report = demo::run(lock.clone(), &settings).await;
    lock.shutdown();

    info!(
        acquired = report.acquired,
        contended = report.contended,
        failed = report.failed,
        "Contention demo finished"
    );
    Ok(())
}
