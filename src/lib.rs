//! Keylease - lease-bound distributed lock on etcd
//!
//! The root package wires the lock crates to a runnable process:
//! - `config`: layered configuration (defaults, `conf/application.yml`, env, CLI)
//! - `startup`: logging initialization
//! - `demo`: workers racing for one key, used by the `keylease` binary

pub mod config;
pub mod demo;
pub mod startup;

pub use keylease_lock as lock;
