//! Per-key lock handle.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, timeout};
use tracing::debug;

use tranca_backend::Subscription;
use tranca_common::constants::{DEFAULT_WATCHDOG_LEASE, WAKE_MESSAGE, wake_channel};

use crate::client::ClientShared;
use crate::entry::ContextId;
use crate::error::{LockError, Result};
use crate::scripts::{self, AcquireStatus, ReleaseStatus};
use crate::watchdog;

/// Reentrant distributed lock handle for one key.
///
/// The handle itself is the local execution context: `try_lock` called
/// twice on the same handle increments the reentrancy count instead of
/// blocking, and must be matched by the same number of `unlock` calls.
/// Handles are deliberately not `Clone`; a clone would alias the context
/// identity and break the acquire/unlock pairing.
pub struct RLock {
    shared: Arc<ClientShared>,
    key: String,
    context_id: ContextId,
}

impl RLock {
    pub(crate) fn new(shared: Arc<ClientShared>, key: String, context_id: ContextId) -> Self {
        Self {
            shared,
            key,
            context_id,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Owner token this handle acquires and releases with:
    /// `<client-id>:<context-id>`.
    pub fn owner_token(&self) -> String {
        format!("{}:{}", self.shared.client_id, self.context_id)
    }

    /// Acquire the lock, waiting up to `wait` for it to become available.
    ///
    /// With `lease = None` the lock uses the default watchdog lease and
    /// is renewed in the background until unlocked. With an explicit
    /// lease there is no renewal; the lock lapses on its own after
    /// `lease` unless unlocked or reacquired first.
    ///
    /// On contention the handle subscribes to the key's wake channel and
    /// blocks until a release is published or the holder's remaining TTL
    /// elapses, then retries; whichever waiter's retry reaches the
    /// backend first wins, there is no FIFO ordering among waiters.
    pub async fn try_lock(&self, wait: Duration, lease: Option<Duration>) -> Result<()> {
        let started = Instant::now();
        let effective_lease = lease.unwrap_or(DEFAULT_WATCHDOG_LEASE);
        let use_watchdog = lease.is_none();
        let owner = self.owner_token();
        let channel = wake_channel(&self.key);
        // Created lazily on first contention, reused across retries, and
        // torn down by Drop on every exit path.
        let mut subscription: Option<Subscription> = None;

        loop {
            let ttl_hint = match scripts::acquire(
                self.shared.backend.as_ref(),
                &self.key,
                &owner,
                effective_lease,
            )
            .await?
            {
                AcquireStatus::Acquired => {
                    if use_watchdog {
                        self.register_renewal(&owner, effective_lease);
                    }
                    debug!(key = %self.key, owner = %owner, "Lock acquired");
                    metrics::counter!("tranca.lock.acquired").increment(1);
                    return Ok(());
                }
                AcquireStatus::HeldFor(ttl) => ttl,
            };

            let budget = wait.saturating_sub(started.elapsed());
            if budget.is_zero() {
                return Err(self.acquire_timeout(started));
            }

            let sub = match &mut subscription {
                Some(sub) => sub,
                none => none.insert(self.shared.backend.subscribe(&channel).await?),
            };

            // Wake on a published release, or give up at the holder's
            // remaining TTL in case its lease lapses without an unlock.
            // An elapsed deadline is the expected retry signal.
            match timeout(ttl_hint.min(budget), sub.recv()).await {
                Ok(Some(_)) => {}
                Ok(None) => {
                    // Backend closed the channel; resubscribe next round.
                    subscription = None;
                }
                Err(_) => {}
            }

            if wait.saturating_sub(started.elapsed()).is_zero() {
                return Err(self.acquire_timeout(started));
            }
            // A wake may be spurious (another waiter won the retry race);
            // losing just consumes budget and loops.
        }
    }

    /// Release one hold of the lock.
    ///
    /// The final release deletes the backend record and wakes every
    /// waiter; earlier releases only decrement the reentrancy count.
    /// Returns `LockError::NotHeld` when this context does not hold the
    /// lock (double-unlock, or the lease lapsed and the lock moved on).
    /// The local renewal registration is dropped in every case.
    pub async fn unlock(&self) -> Result<()> {
        let owner = self.owner_token();
        let channel = wake_channel(&self.key);
        let status = scripts::release(
            self.shared.backend.as_ref(),
            &self.key,
            &channel,
            &owner,
            DEFAULT_WATCHDOG_LEASE,
            WAKE_MESSAGE,
        )
        .await;

        // Deregister whatever Release said; a NotHeld context must not
        // keep the watchdog alive either.
        self.shared.registry.deregister(&self.key, self.context_id);

        match status? {
            ReleaseStatus::Released => {
                debug!(key = %self.key, owner = %owner, "Lock released");
                metrics::counter!("tranca.lock.released").increment(1);
                Ok(())
            }
            ReleaseStatus::Partial => {
                debug!(key = %self.key, owner = %owner, "Lock hold decremented, still held");
                Ok(())
            }
            ReleaseStatus::NotHeld => Err(LockError::NotHeld {
                key: self.key.clone(),
            }),
        }
    }

    fn register_renewal(&self, owner: &str, lease: Duration) {
        let shared = self.shared.clone();
        let key = self.key.clone();
        self.shared
            .registry
            .register(&self.key, self.context_id, owner, move |stop_rx| {
                watchdog::spawn(shared, &key, owner, lease, stop_rx);
            });
    }

    fn acquire_timeout(&self, started: Instant) -> LockError {
        metrics::counter!("tranca.lock.acquire_timeouts").increment(1);
        LockError::AcquireTimeout {
            key: self.key.clone(),
            waited_ms: started.elapsed().as_millis() as u64,
        }
    }
}
