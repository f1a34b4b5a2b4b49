//! Backend error types.

/// Error type for backend operations. Backend failures are never retried
/// by the lock client; they surface immediately to the caller.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("script {script} failed: {reason}")]
    ScriptFailed {
        script: &'static str,
        reason: String,
    },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, BackendError>;
