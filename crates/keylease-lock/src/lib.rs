//! Keylease Lock - lease-bound distributed mutual exclusion
//!
//! This crate provides:
//! - `DistributedLock`: acquire/release over etcd leases and locks
//! - Fixed, default and indefinite holds (`Hold`)
//! - Background lease renewal for indefinite holds (`RenewalTask`)
//! - Lease rollback on every acquisition path that does not end locked
//! - `LockConfig`, bound from the `etcd.config` section

mod scope;

pub mod config;
pub mod error;
pub mod lock;
pub mod model;
pub mod renewal;

pub use config::{LockConfig, LockOptions, parse_endpoints};
pub use error::{LockError, Result};
pub use lock::DistributedLock;
pub use model::{Hold, LockHandle};
pub use renewal::RenewalTask;

// Re-export the client boundary so callers need a single dependency
pub use keylease_client::{Coordinator, EtcdCoordinator, LeaseId, MemoryCoordinator};
