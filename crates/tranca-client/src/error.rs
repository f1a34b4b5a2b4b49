//! Client error types.

use tranca_backend::BackendError;

/// Error type for lock operations.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// Failure communicating with or executing a script on the backend.
    /// Never retried by the client.
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    /// The caller's wait budget ran out before the lock became available.
    #[error("get lock failed: wait time running out (key '{key}', waited {waited_ms} ms)")]
    AcquireTimeout { key: String, waited_ms: u64 },

    /// `unlock` was called by a context that does not hold the lock:
    /// a double-unlock, or the lease already lapsed and the lock moved on.
    #[error("lock '{key}' is not held by this context")]
    NotHeld { key: String },
}

pub type Result<T> = std::result::Result<T, LockError>;
