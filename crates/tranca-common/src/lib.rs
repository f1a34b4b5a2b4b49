//! Tranca Common - Protocol constants and shared types
//!
//! This crate provides the pieces shared by the backend contract and the
//! lock client:
//! - Script reply sentinels for the acquire/release/renew protocol
//! - Default watchdog lease and renewal interval
//! - Wake channel naming and the wake payload
//! - Lock-loss event model

pub mod constants;
pub mod model;

pub use constants::*;
pub use model::LockLossEvent;
