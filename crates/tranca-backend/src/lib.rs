//! Tranca Backend - Backend contract and in-process backend
//!
//! This crate provides:
//! - `LockBackend`: the black-box store contract the lock client runs
//!   against (atomic scripted eval, publish, subscribe)
//! - `ScriptId` / `ScriptArg`: the scripted-operation identifiers and
//!   their argument encoding
//! - `Subscription`: cancelable blocking receive on a wake channel
//! - `MemoryBackend`: an in-process implementation for tests and
//!   single-process embedding

pub mod contract;
pub mod error;
pub mod memory;
pub mod script;

pub use contract::{LockBackend, Subscription};
pub use error::{BackendError, Result};
pub use memory::MemoryBackend;
pub use script::{ScriptArg, ScriptId};
