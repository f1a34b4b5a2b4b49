//! Process-wide lock client context.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::broadcast;
use uuid::Uuid;

use tranca_backend::LockBackend;
use tranca_common::model::LockLossEvent;

use crate::lock::RLock;
use crate::registry::RenewalRegistry;

/// Buffered lock-loss events per subscriber; losses are rare, a lagging
/// subscriber only misses older events.
const LOSS_CHANNEL_CAPACITY: usize = 16;

/// State shared by every handle derived from one `LockClient`.
pub(crate) struct ClientShared {
    pub(crate) backend: Arc<dyn LockBackend>,
    /// Process identity half of every owner token.
    pub(crate) client_id: String,
    pub(crate) registry: RenewalRegistry,
    pub(crate) loss_tx: broadcast::Sender<LockLossEvent>,
    next_context: AtomicU64,
}

impl ClientShared {
    pub(crate) fn next_context_id(&self) -> u64 {
        self.next_context.fetch_add(1, Ordering::Relaxed)
    }
}

/// Process-wide context for distributed locks: the backend handle, a
/// unique client identity, the renewal registry (at most one watchdog
/// task per key per process), and the lock-loss notification channel.
pub struct LockClient {
    shared: Arc<ClientShared>,
}

impl LockClient {
    pub fn new(backend: Arc<dyn LockBackend>) -> Self {
        let (loss_tx, _) = broadcast::channel(LOSS_CHANNEL_CAPACITY);
        Self {
            shared: Arc::new(ClientShared {
                backend,
                client_id: Uuid::new_v4().to_string(),
                registry: RenewalRegistry::new(),
                loss_tx,
                next_context: AtomicU64::new(1),
            }),
        }
    }

    /// Derive a lock handle for `key`. Each handle is a distinct local
    /// execution context: `try_lock` twice on one handle is reentrant,
    /// two handles for the same key contend with each other.
    pub fn get_lock(&self, key: impl Into<String>) -> RLock {
        let context_id = self.shared.next_context_id();
        RLock::new(self.shared.clone(), key.into(), context_id)
    }

    /// Identity token shared by all handles of this client.
    pub fn client_id(&self) -> &str {
        &self.shared.client_id
    }

    /// Subscribe to lock-loss notifications. The watchdog publishes here
    /// when a lease it was renewing is no longer owned by this process,
    /// so long-running holders can fence off their work.
    pub fn subscribe_lock_loss(&self) -> broadcast::Receiver<LockLossEvent> {
        self.loss_tx().subscribe()
    }

    fn loss_tx(&self) -> &broadcast::Sender<LockLossEvent> {
        &self.shared.loss_tx
    }
}
