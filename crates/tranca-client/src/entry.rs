//! Per-key, per-process renewal bookkeeping.

use std::collections::HashMap;

use tokio::sync::mpsc;

/// Identifier of a local execution context. Allocated per `RLock` handle;
/// the handle is the logical caller for reentrancy purposes.
pub(crate) type ContextId = u64;

/// Tracks which local contexts currently justify keeping the watchdog
/// running for one key, with a reenter count per context. This is local
/// interest bookkeeping, not the backend's reentrancy count.
pub(crate) struct Entry {
    holders: HashMap<ContextId, u32>,
    /// Token renewals are issued with: always the token of the context
    /// that first created this Entry. The backend record holds a single
    /// owner token, so only that token passes the renew ownership check.
    owner_token: String,
    /// Held so the watchdog stops as soon as the Entry is dropped.
    _stop_tx: mpsc::Sender<()>,
}

impl Entry {
    pub fn new(context: ContextId, owner_token: String, stop_tx: mpsc::Sender<()>) -> Self {
        let mut holders = HashMap::new();
        holders.insert(context, 1);
        Self {
            holders,
            owner_token,
            _stop_tx: stop_tx,
        }
    }

    pub fn add_context(&mut self, context: ContextId) {
        *self.holders.entry(context).or_insert(0) += 1;
    }

    pub fn remove_context(&mut self, context: ContextId) {
        if let Some(count) = self.holders.get_mut(&context) {
            *count -= 1;
            if *count == 0 {
                self.holders.remove(&context);
            }
        }
    }

    /// True once no local context needs the watchdog anymore.
    pub fn is_idle(&self) -> bool {
        self.holders.is_empty()
    }

    pub fn owner_token(&self) -> &str {
        &self.owner_token
    }
}
