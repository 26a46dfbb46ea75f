//! Keylease Client - coordination service boundary
//!
//! This crate provides:
//! - The `Coordinator` trait: lease grant/keep-alive/revoke and lock/unlock
//! - `EtcdCoordinator`, backed by an etcd v3 cluster
//! - `MemoryCoordinator`, an in-process implementation with the same semantics
//! - `LeaseId` and the ownership-key naming shared by both backends

pub mod coordinator;
pub mod error;
pub mod etcd;
pub mod lease;
pub mod memory;

pub use coordinator::Coordinator;
pub use error::{ClientError, Result};
pub use etcd::{ConnectConfig, EtcdCoordinator};
pub use lease::{LeaseId, lock_key};
pub use memory::MemoryCoordinator;
