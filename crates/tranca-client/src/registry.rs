//! Concurrency-safe key -> `Entry` registry.
//!
//! All renewal bookkeeping is funneled through `register` / `deregister`
//! so at most one watchdog task exists per key per process. The registry
//! is owned by the client context; there is no ambient global state.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry as MapEntry;
use tokio::sync::mpsc;

use crate::entry::{ContextId, Entry};

#[derive(Clone)]
pub(crate) struct RenewalRegistry {
    entries: Arc<DashMap<String, Entry>>,
}

impl RenewalRegistry {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
        }
    }

    /// Register `context` as a holder of `key`. On the first registration
    /// for the key, `spawn_watchdog` is invoked (under the entry lock, so
    /// exactly once) with the stop receiver the new task must select on.
    /// The Entry pins `owner_token` as the renewal token for its lifetime.
    pub fn register<F>(&self, key: &str, context: ContextId, owner_token: &str, spawn_watchdog: F)
    where
        F: FnOnce(mpsc::Receiver<()>),
    {
        match self.entries.entry(key.to_string()) {
            MapEntry::Occupied(mut occupied) => {
                occupied.get_mut().add_context(context);
            }
            MapEntry::Vacant(vacant) => {
                let (stop_tx, stop_rx) = mpsc::channel(1);
                vacant.insert(Entry::new(context, owner_token.to_string(), stop_tx));
                spawn_watchdog(stop_rx);
            }
        }
    }

    /// Drop one reenter of `context` on `key`. Removing the last context
    /// removes the Entry, which drops the stop sender and cancels the
    /// watchdog promptly instead of leaving it to discover the removal on
    /// its next tick.
    pub fn deregister(&self, key: &str, context: ContextId) {
        if let MapEntry::Occupied(mut occupied) = self.entries.entry(key.to_string()) {
            occupied.get_mut().remove_context(context);
            if occupied.get().is_idle() {
                occupied.remove();
            }
        }
    }

    /// Force-clear the Entry for `key`; used by the watchdog when renewal
    /// reports the lease lost. Only removes an Entry still pinned to
    /// `owner_token`: a stale watchdog racing a late LOST tick must not
    /// tear down an unrelated Entry a new local holder registered since.
    /// Returns the renewal token if the Entry was removed.
    pub fn force_remove(&self, key: &str, owner_token: &str) -> Option<String> {
        self.entries
            .remove_if(key, |_, entry| entry.owner_token() == owner_token)
            .map(|(_, entry)| entry.owner_token().to_string())
    }

    #[cfg(test)]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }
}
