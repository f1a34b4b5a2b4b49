//! Typed wrappers around the three atomic protocol scripts.
//!
//! Each wrapper is a single round trip: it encodes the positional
//! key/argument layout, runs `LockBackend::eval`, and decodes the integer
//! reply into a status enum. An undecodable reply is a backend fault, not
//! a protocol state.

use std::time::Duration;

use tranca_backend::{BackendError, LockBackend, ScriptId};
use tranca_common::constants::{
    ACQUIRE_SUCCESS, RELEASE_NOT_HELD, RELEASE_PARTIAL, RELEASE_RELEASED, RENEW_LOST,
    RENEW_RENEWED,
};

type Result<T> = std::result::Result<T, BackendError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AcquireStatus {
    /// Lock created or reentrantly incremented; expiry reset.
    Acquired,
    /// Held by a different owner; retry after roughly this long.
    HeldFor(Duration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReleaseStatus {
    /// The owner token is not a holder of this key.
    NotHeld,
    /// Count decremented but still positive; expiry reset.
    Partial,
    /// Count reached zero; record deleted and wake published.
    Released,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RenewStatus {
    Renewed,
    /// The lease is no longer attributable to this owner token.
    Lost,
}

pub(crate) async fn acquire(
    backend: &dyn LockBackend,
    key: &str,
    owner: &str,
    lease: Duration,
) -> Result<AcquireStatus> {
    let reply = backend
        .eval(
            ScriptId::Acquire,
            &[key],
            &[(lease.as_millis() as u64).into(), owner.into()],
        )
        .await?;
    if reply <= ACQUIRE_SUCCESS {
        Ok(AcquireStatus::Acquired)
    } else {
        Ok(AcquireStatus::HeldFor(Duration::from_millis(reply as u64)))
    }
}

pub(crate) async fn release(
    backend: &dyn LockBackend,
    key: &str,
    channel: &str,
    owner: &str,
    renewed_lease: Duration,
    message: i64,
) -> Result<ReleaseStatus> {
    let reply = backend
        .eval(
            ScriptId::Release,
            &[key, channel],
            &[
                owner.into(),
                (renewed_lease.as_millis() as u64).into(),
                message.into(),
            ],
        )
        .await?;
    match reply {
        RELEASE_NOT_HELD => Ok(ReleaseStatus::NotHeld),
        RELEASE_PARTIAL => Ok(ReleaseStatus::Partial),
        RELEASE_RELEASED => Ok(ReleaseStatus::Released),
        other => Err(unexpected_reply(ScriptId::Release, other)),
    }
}

pub(crate) async fn renew(
    backend: &dyn LockBackend,
    key: &str,
    owner: &str,
    lease: Duration,
) -> Result<RenewStatus> {
    let reply = backend
        .eval(
            ScriptId::Renew,
            &[key],
            &[(lease.as_millis() as u64).into(), owner.into()],
        )
        .await?;
    match reply {
        RENEW_RENEWED => Ok(RenewStatus::Renewed),
        RENEW_LOST => Ok(RenewStatus::Lost),
        other => Err(unexpected_reply(ScriptId::Renew, other)),
    }
}

fn unexpected_reply(script: ScriptId, reply: i64) -> BackendError {
    BackendError::ScriptFailed {
        script: script.as_str(),
        reason: format!("unexpected reply {}", reply),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;

    use async_trait::async_trait;
    use tranca_backend::{ScriptArg, Subscription};

    /// Backend stub replaying canned replies, recording each eval.
    struct StubBackend {
        replies: Mutex<Vec<i64>>,
        calls: Mutex<Vec<(ScriptId, Vec<String>, Vec<ScriptArg>)>>,
    }

    impl StubBackend {
        fn new(replies: Vec<i64>) -> Self {
            Self {
                replies: Mutex::new(replies),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LockBackend for StubBackend {
        async fn eval(
            &self,
            script: ScriptId,
            keys: &[&str],
            args: &[ScriptArg],
        ) -> std::result::Result<i64, BackendError> {
            self.calls.lock().unwrap().push((
                script,
                keys.iter().map(|k| k.to_string()).collect(),
                args.to_vec(),
            ));
            Ok(self.replies.lock().unwrap().remove(0))
        }

        async fn publish(
            &self,
            _channel: &str,
            _message: i64,
        ) -> std::result::Result<(), BackendError> {
            Ok(())
        }

        async fn subscribe(
            &self,
            _channel: &str,
        ) -> std::result::Result<Subscription, BackendError> {
            let (_tx, rx) = tokio::sync::mpsc::channel(1);
            Ok(Subscription::new(rx))
        }
    }

    #[tokio::test]
    async fn test_acquire_decodes_success_and_ttl_hint() {
        let backend = StubBackend::new(vec![-1, 1_500]);

        let status = acquire(&backend, "foo", "a:1", Duration::from_millis(30_000))
            .await
            .unwrap();
        assert_eq!(status, AcquireStatus::Acquired);

        let status = acquire(&backend, "foo", "b:1", Duration::from_millis(30_000))
            .await
            .unwrap();
        assert_eq!(
            status,
            AcquireStatus::HeldFor(Duration::from_millis(1_500))
        );

        let calls = backend.calls.lock().unwrap();
        assert_eq!(calls[0].0, ScriptId::Acquire);
        assert_eq!(calls[0].1, vec!["foo"]);
        assert_eq!(
            calls[0].2,
            vec![ScriptArg::Int(30_000), ScriptArg::Text("a:1".to_string())]
        );
    }

    #[tokio::test]
    async fn test_release_decodes_all_statuses() {
        let backend = StubBackend::new(vec![0, 1, 2]);
        let lease = Duration::from_millis(30_000);

        for expected in [
            ReleaseStatus::NotHeld,
            ReleaseStatus::Partial,
            ReleaseStatus::Released,
        ] {
            let status = release(&backend, "foo", "publish-lock-channel:foo", "a:1", lease, 1)
                .await
                .unwrap();
            assert_eq!(status, expected);
        }

        let calls = backend.calls.lock().unwrap();
        assert_eq!(calls[0].1, vec!["foo", "publish-lock-channel:foo"]);
    }

    #[tokio::test]
    async fn test_renew_decodes_and_rejects_garbage() {
        let backend = StubBackend::new(vec![1, 0, 42]);
        let lease = Duration::from_millis(30_000);

        assert_eq!(
            renew(&backend, "foo", "a:1", lease).await.unwrap(),
            RenewStatus::Renewed
        );
        assert_eq!(
            renew(&backend, "foo", "a:1", lease).await.unwrap(),
            RenewStatus::Lost
        );
        assert!(matches!(
            renew(&backend, "foo", "a:1", lease).await.unwrap_err(),
            BackendError::ScriptFailed { .. }
        ));
    }
}
