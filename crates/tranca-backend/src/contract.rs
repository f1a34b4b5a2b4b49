//! The backend contract the lock client runs against.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::script::{ScriptArg, ScriptId};

/// Black-box store contract: an atomic scripted eval per protocol step
/// plus pub/sub for waiter wake-ups.
///
/// Implementations must guarantee all-or-nothing execution of `eval` per
/// key; the backend is the sole arbiter of cross-process exclusion.
/// Connection management and transport details stay behind this trait.
#[async_trait]
pub trait LockBackend: Send + Sync + 'static {
    /// Execute one of the named atomic scripts and return its integer
    /// reply. See `ScriptId` for the per-script key/argument layout.
    async fn eval(&self, script: ScriptId, keys: &[&str], args: &[ScriptArg]) -> Result<i64>;

    /// Publish a message to every current subscriber of `channel`.
    async fn publish(&self, channel: &str, message: i64) -> Result<()>;

    /// Subscribe to `channel`. The returned handle receives messages
    /// published after this call; dropping it tears the subscription down.
    async fn subscribe(&self, channel: &str) -> Result<Subscription>;
}

/// Cancelable blocking receive on a wake channel.
///
/// Waiters bound the receive with `tokio::time::timeout`; an elapsed
/// deadline is the expected "lease may have lapsed, retry" signal rather
/// than an error. Dropping the handle unsubscribes.
pub struct Subscription {
    rx: mpsc::Receiver<i64>,
}

impl Subscription {
    pub fn new(rx: mpsc::Receiver<i64>) -> Self {
        Self { rx }
    }

    /// Receive the next message, or `None` once the backend closes the
    /// channel from its side.
    pub async fn recv(&mut self) -> Option<i64> {
        self.rx.recv().await
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}
