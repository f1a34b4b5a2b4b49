//! Tranca Client - Reentrant lease-based distributed lock client
//!
//! This crate provides:
//! - `LockClient`: process-wide context (backend handle, client identity,
//!   renewal registry, lock-loss channel)
//! - `RLock`: per-key lock handle with `try_lock` / `unlock`
//! - Typed wrappers around the three atomic protocol scripts
//! - The watchdog task that keeps implicitly-leased locks alive
//!
//! A lock acquired without an explicit lease uses the default watchdog
//! lease and is renewed in the background until the last local holder
//! unlocks. Acquiring with an explicit lease skips renewal entirely; the
//! lock then lapses on its own if never unlocked.

pub mod client;
pub mod error;
pub mod lock;

mod entry;
mod registry;
mod scripts;
mod watchdog;

pub use client::LockClient;
pub use error::{LockError, Result};
pub use lock::RLock;

// Re-exports for callers tuning waits against the default lease.
pub use tranca_common::constants::DEFAULT_WATCHDOG_LEASE;
pub use tranca_common::model::LockLossEvent;
