//! In-process backend implementation.
//!
//! `MemoryBackend` interprets the three protocol scripts against a
//! concurrent record table, giving the same single-key atomicity a
//! scripted store provides (each eval holds the record's map entry for
//! its whole duration). Intended for tests and single-process embedding.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::mpsc;
use tokio::time::{Instant, interval};
use tracing::debug;

use tranca_common::constants::{
    ACQUIRE_SUCCESS, RELEASE_NOT_HELD, RELEASE_PARTIAL, RELEASE_RELEASED, RENEW_LOST,
    RENEW_RENEWED,
};

use crate::contract::{LockBackend, Subscription};
use crate::error::{BackendError, Result};
use crate::script::{ScriptArg, ScriptId};

/// Per-subscriber buffer; a full buffer already carries a pending wake,
/// so further wake messages are redundant.
const SUBSCRIBER_BUFFER: usize = 4;

/// A live lock record: one owner token, its reentrancy count, and a
/// single expiry covering the whole record.
struct LockRecord {
    owner: String,
    count: u32,
    expires_at: Instant,
}

impl LockRecord {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// In-process `LockBackend` backed by `DashMap`.
pub struct MemoryBackend {
    records: Arc<DashMap<String, LockRecord>>,
    channels: Arc<DashMap<String, Vec<mpsc::Sender<i64>>>>,
    _sweeper_handle: Option<tokio::task::JoinHandle<()>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            records: Arc::new(DashMap::new()),
            channels: Arc::new(DashMap::new()),
            _sweeper_handle: None,
        }
    }

    /// Start with a background sweeper that drops records whose lease has
    /// lapsed. Expiry is also checked lazily on every eval, so the
    /// sweeper only bounds memory; it never publishes wake messages
    /// because waiters arm their own deadline against natural expiry.
    pub fn with_sweeper(self, sweep_interval: Duration) -> Self {
        let records = self.records.clone();

        let handle = tokio::spawn(async move {
            let mut interval = interval(sweep_interval);
            loop {
                interval.tick().await;
                let expired: Vec<String> = records
                    .iter()
                    .filter(|entry| entry.value().is_expired())
                    .map(|entry| entry.key().clone())
                    .collect();

                for key in &expired {
                    records.remove(key);
                }

                metrics::gauge!("tranca.backend.live_locks").set(records.len() as f64);

                if !expired.is_empty() {
                    debug!(count = expired.len(), "Swept expired lock records");
                }
            }
        });

        Self {
            records: self.records,
            channels: self.channels,
            _sweeper_handle: Some(handle),
        }
    }

    fn run_acquire(&self, keys: &[&str], args: &[ScriptArg]) -> Result<i64> {
        let key = script_key(ScriptId::Acquire, keys, 0)?;
        let lease_ms = script_arg(ScriptId::Acquire, args, 0)?.as_int(ScriptId::Acquire, 0)?;
        let owner = script_arg(ScriptId::Acquire, args, 1)?.as_text(ScriptId::Acquire, 1)?;
        let lease = Duration::from_millis(lease_ms.max(0) as u64);
        let now = Instant::now();

        match self.records.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let record = occupied.get_mut();
                if record.is_expired() {
                    // Lapsed lease: the record is gone as far as the
                    // protocol is concerned, create it fresh.
                    *record = LockRecord {
                        owner: owner.to_string(),
                        count: 1,
                        expires_at: now + lease,
                    };
                    return Ok(ACQUIRE_SUCCESS);
                }
                if record.owner == owner {
                    // Reentrant acquire by the same owner token.
                    record.count += 1;
                    record.expires_at = now + lease;
                    return Ok(ACQUIRE_SUCCESS);
                }
                // Held by a different owner: reply with its remaining TTL.
                Ok(record.expires_at.saturating_duration_since(now).as_millis() as i64)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(LockRecord {
                    owner: owner.to_string(),
                    count: 1,
                    expires_at: now + lease,
                });
                Ok(ACQUIRE_SUCCESS)
            }
        }
    }

    fn run_release(&self, keys: &[&str], args: &[ScriptArg]) -> Result<i64> {
        let key = script_key(ScriptId::Release, keys, 0)?;
        let channel = script_key(ScriptId::Release, keys, 1)?;
        let owner = script_arg(ScriptId::Release, args, 0)?.as_text(ScriptId::Release, 0)?;
        let renew_ms = script_arg(ScriptId::Release, args, 1)?.as_int(ScriptId::Release, 1)?;
        let message = script_arg(ScriptId::Release, args, 2)?.as_int(ScriptId::Release, 2)?;

        let mut released = false;
        let reply = match self.records.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let record = occupied.get_mut();
                if record.is_expired() {
                    occupied.remove();
                    RELEASE_NOT_HELD
                } else if record.owner != owner {
                    RELEASE_NOT_HELD
                } else {
                    record.count -= 1;
                    if record.count > 0 {
                        record.expires_at =
                            Instant::now() + Duration::from_millis(renew_ms.max(0) as u64);
                        RELEASE_PARTIAL
                    } else {
                        occupied.remove();
                        released = true;
                        RELEASE_RELEASED
                    }
                }
            }
            Entry::Vacant(_) => RELEASE_NOT_HELD,
        };

        // Publish outside the map entry so subscribers never observe the
        // wake before the record is gone.
        if released {
            self.publish_now(channel, message);
        }
        Ok(reply)
    }

    fn run_renew(&self, keys: &[&str], args: &[ScriptArg]) -> Result<i64> {
        let key = script_key(ScriptId::Renew, keys, 0)?;
        let lease_ms = script_arg(ScriptId::Renew, args, 0)?.as_int(ScriptId::Renew, 0)?;
        let owner = script_arg(ScriptId::Renew, args, 1)?.as_text(ScriptId::Renew, 1)?;

        match self.records.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let record = occupied.get_mut();
                if record.is_expired() {
                    occupied.remove();
                    Ok(RENEW_LOST)
                } else if record.owner != owner {
                    Ok(RENEW_LOST)
                } else {
                    record.expires_at =
                        Instant::now() + Duration::from_millis(lease_ms.max(0) as u64);
                    Ok(RENEW_RENEWED)
                }
            }
            Entry::Vacant(_) => Ok(RENEW_LOST),
        }
    }

    fn publish_now(&self, channel: &str, message: i64) {
        if let Some(mut subscribers) = self.channels.get_mut(channel) {
            subscribers.retain(|tx| !tx.is_closed());
            for tx in subscribers.iter() {
                // A full buffer already holds a pending wake.
                let _ = tx.try_send(message);
            }
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LockBackend for MemoryBackend {
    async fn eval(&self, script: ScriptId, keys: &[&str], args: &[ScriptArg]) -> Result<i64> {
        match script {
            ScriptId::Acquire => self.run_acquire(keys, args),
            ScriptId::Release => self.run_release(keys, args),
            ScriptId::Renew => self.run_renew(keys, args),
        }
    }

    async fn publish(&self, channel: &str, message: i64) -> Result<()> {
        self.publish_now(channel, message);
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        self.channels.entry(channel.to_string()).or_default().push(tx);
        Ok(Subscription::new(rx))
    }
}

fn script_key<'a>(script: ScriptId, keys: &[&'a str], position: usize) -> Result<&'a str> {
    keys.get(position)
        .copied()
        .ok_or_else(|| BackendError::ScriptFailed {
            script: script.as_str(),
            reason: format!("missing key {}", position),
        })
}

fn script_arg<'a>(script: ScriptId, args: &'a [ScriptArg], position: usize) -> Result<&'a ScriptArg> {
    args.get(position).ok_or_else(|| BackendError::ScriptFailed {
        script: script.as_str(),
        reason: format!("missing argument {}", position),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tranca_common::constants::wake_channel;

    async fn acquire(backend: &MemoryBackend, key: &str, owner: &str, lease_ms: u64) -> i64 {
        backend
            .eval(
                ScriptId::Acquire,
                &[key],
                &[lease_ms.into(), owner.into()],
            )
            .await
            .unwrap()
    }

    async fn release(backend: &MemoryBackend, key: &str, owner: &str) -> i64 {
        let channel = wake_channel(key);
        backend
            .eval(
                ScriptId::Release,
                &[key, &channel],
                &[owner.into(), 30_000u64.into(), 1i64.into()],
            )
            .await
            .unwrap()
    }

    async fn renew(backend: &MemoryBackend, key: &str, owner: &str, lease_ms: u64) -> i64 {
        backend
            .eval(ScriptId::Renew, &[key], &[lease_ms.into(), owner.into()])
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_acquire_fresh_key() {
        let backend = MemoryBackend::new();
        assert_eq!(acquire(&backend, "foo", "a:1", 30_000).await, ACQUIRE_SUCCESS);
    }

    #[tokio::test]
    async fn test_acquire_contended_returns_ttl_hint() {
        let backend = MemoryBackend::new();
        acquire(&backend, "foo", "a:1", 30_000).await;

        let hint = acquire(&backend, "foo", "b:1", 30_000).await;
        assert!(hint >= 0);
        assert!(hint <= 30_000);
    }

    #[tokio::test]
    async fn test_reentrant_acquire_and_partial_release() {
        let backend = MemoryBackend::new();
        assert_eq!(acquire(&backend, "foo", "a:1", 30_000).await, ACQUIRE_SUCCESS);
        assert_eq!(acquire(&backend, "foo", "a:1", 30_000).await, ACQUIRE_SUCCESS);

        assert_eq!(release(&backend, "foo", "a:1").await, RELEASE_PARTIAL);
        // Still held against a competitor.
        assert!(acquire(&backend, "foo", "b:1", 30_000).await >= 0);

        assert_eq!(release(&backend, "foo", "a:1").await, RELEASE_RELEASED);
        assert_eq!(acquire(&backend, "foo", "b:1", 30_000).await, ACQUIRE_SUCCESS);
    }

    #[tokio::test]
    async fn test_release_by_non_owner() {
        let backend = MemoryBackend::new();
        acquire(&backend, "foo", "a:1", 30_000).await;
        assert_eq!(release(&backend, "foo", "b:1").await, RELEASE_NOT_HELD);
        assert_eq!(release(&backend, "absent", "a:1").await, RELEASE_NOT_HELD);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lease_expiry_frees_key() {
        let backend = MemoryBackend::new();
        acquire(&backend, "foo", "a:1", 3_000).await;

        tokio::time::sleep(Duration::from_millis(3_001)).await;
        assert_eq!(acquire(&backend, "foo", "b:1", 30_000).await, ACQUIRE_SUCCESS);
    }

    #[tokio::test(start_paused = true)]
    async fn test_renew_extends_lease() {
        let backend = MemoryBackend::new();
        acquire(&backend, "foo", "a:1", 3_000).await;

        tokio::time::sleep(Duration::from_millis(2_000)).await;
        assert_eq!(renew(&backend, "foo", "a:1", 3_000).await, RENEW_RENEWED);

        tokio::time::sleep(Duration::from_millis(2_000)).await;
        // Without the renewal the lease would have lapsed at t=3s.
        assert!(acquire(&backend, "foo", "b:1", 30_000).await >= 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_renew_after_expiry_is_lost() {
        let backend = MemoryBackend::new();
        acquire(&backend, "foo", "a:1", 1_000).await;

        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert_eq!(renew(&backend, "foo", "a:1", 30_000).await, RENEW_LOST);
        assert_eq!(renew(&backend, "absent", "a:1", 30_000).await, RENEW_LOST);
    }

    #[tokio::test]
    async fn test_release_publishes_wake() {
        let backend = MemoryBackend::new();
        let channel = wake_channel("foo");
        let mut sub = backend.subscribe(&channel).await.unwrap();

        acquire(&backend, "foo", "a:1", 30_000).await;
        assert_eq!(release(&backend, "foo", "a:1").await, RELEASE_RELEASED);

        assert_eq!(sub.recv().await, Some(1));
    }

    #[tokio::test]
    async fn test_partial_release_does_not_publish() {
        let backend = MemoryBackend::new();
        let channel = wake_channel("foo");
        let mut sub = backend.subscribe(&channel).await.unwrap();

        acquire(&backend, "foo", "a:1", 30_000).await;
        acquire(&backend, "foo", "a:1", 30_000).await;
        assert_eq!(release(&backend, "foo", "a:1").await, RELEASE_PARTIAL);

        let got = tokio::time::timeout(Duration::from_millis(50), sub.recv()).await;
        assert!(got.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_drops_expired_records() {
        let backend = MemoryBackend::new().with_sweeper(Duration::from_millis(500));
        acquire(&backend, "foo", "a:1", 1_000).await;

        tokio::time::sleep(Duration::from_millis(2_000)).await;
        assert!(backend.records.get("foo").is_none());
    }

    #[tokio::test]
    async fn test_malformed_script_call() {
        let backend = MemoryBackend::new();
        let err = backend
            .eval(ScriptId::Acquire, &["foo"], &["not-an-int".into(), "a:1".into()])
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::ScriptFailed { .. }));

        let err = backend
            .eval(ScriptId::Release, &["foo"], &[])
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::ScriptFailed { .. }));
    }
}
