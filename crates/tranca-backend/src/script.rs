//! Scripted-operation identifiers and argument encoding.
//!
//! Each script runs as a single atomic unit per key on the backend; the
//! reply is always a single integer decoded against the sentinels in
//! `tranca_common::constants`.
//!
//! Argument layout (positional, part of the protocol):
//! - `Acquire`:  keys `[key]`,               args `[lease_ms, owner_token]`
//! - `Release`:  keys `[key, wake_channel]`, args `[owner_token, renew_ms, wake_message]`
//! - `Renew`:    keys `[key]`,               args `[lease_ms, owner_token]`

use crate::error::{BackendError, Result};

/// Identifier of one of the three atomic protocol scripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScriptId {
    Acquire,
    Release,
    Renew,
}

impl ScriptId {
    pub fn as_str(self) -> &'static str {
        match self {
            ScriptId::Acquire => "acquire",
            ScriptId::Release => "release",
            ScriptId::Renew => "renew",
        }
    }
}

impl std::fmt::Display for ScriptId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A positional script argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptArg {
    Int(i64),
    Text(String),
}

impl ScriptArg {
    /// Decode this argument as an integer, reporting which script and
    /// position was malformed otherwise.
    pub fn as_int(&self, script: ScriptId, position: usize) -> Result<i64> {
        match self {
            ScriptArg::Int(v) => Ok(*v),
            ScriptArg::Text(_) => Err(BackendError::ScriptFailed {
                script: script.as_str(),
                reason: format!("argument {} is not an integer", position),
            }),
        }
    }

    /// Decode this argument as text.
    pub fn as_text(&self, script: ScriptId, position: usize) -> Result<&str> {
        match self {
            ScriptArg::Text(v) => Ok(v),
            ScriptArg::Int(_) => Err(BackendError::ScriptFailed {
                script: script.as_str(),
                reason: format!("argument {} is not text", position),
            }),
        }
    }
}

impl From<i64> for ScriptArg {
    fn from(value: i64) -> Self {
        ScriptArg::Int(value)
    }
}

impl From<u64> for ScriptArg {
    fn from(value: u64) -> Self {
        ScriptArg::Int(value as i64)
    }
}

impl From<String> for ScriptArg {
    fn from(value: String) -> Self {
        ScriptArg::Text(value)
    }
}

impl From<&str> for ScriptArg {
    fn from(value: &str) -> Self {
        ScriptArg::Text(value.to_string())
    }
}
