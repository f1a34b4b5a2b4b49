//! Watchdog renewal task.
//!
//! One task per actively-held, implicitly-leased key per process. The
//! task renews at a third of the lease and stops when the last local
//! holder deregisters (stop channel closes) or when the backend reports
//! the lease lost.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{debug, error, warn};

use tranca_common::constants::renewal_interval;
use tranca_common::model::LockLossEvent;

use crate::client::ClientShared;
use crate::scripts::{self, RenewStatus};

pub(crate) struct Watchdog {
    shared: Arc<ClientShared>,
    key: String,
    /// Renewal token: the owner token of the context that first created
    /// the key's Entry.
    owner: String,
    lease: Duration,
}

impl Watchdog {
    pub fn new(
        shared: Arc<ClientShared>,
        key: String,
        owner: String,
        lease: Duration,
    ) -> Self {
        Self {
            shared,
            key,
            owner,
            lease,
        }
    }

    pub async fn run(self, mut stop_rx: mpsc::Receiver<()>) {
        let mut ticker = interval(renewal_interval(self.lease));
        // The first tick of `interval` fires immediately; renewing right
        // after acquisition is harmless.
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match scripts::renew(
                        self.shared.backend.as_ref(),
                        &self.key,
                        &self.owner,
                        self.lease,
                    )
                    .await
                    {
                        Ok(RenewStatus::Renewed) => {
                            debug!(key = %self.key, owner = %self.owner, "Lease renewed");
                            metrics::counter!("tranca.watchdog.renewals").increment(1);
                        }
                        Ok(RenewStatus::Lost) => {
                            warn!(key = %self.key, owner = %self.owner, "Lease no longer owned, stopping renewal");
                            self.report_loss();
                            break;
                        }
                        Err(e) => {
                            error!(key = %self.key, owner = %self.owner, error = %e, "Lease renewal failed, stopping renewal");
                            self.report_loss();
                            break;
                        }
                    }
                }
                // Resolves (with None) as soon as the Entry is removed.
                _ = stop_rx.recv() => {
                    debug!(key = %self.key, "Renewal task stopped, no local holders left");
                    break;
                }
            }
        }
    }

    fn report_loss(&self) {
        self.shared.registry.force_remove(&self.key, &self.owner);
        metrics::counter!("tranca.watchdog.losses").increment(1);
        // No subscriber listening is fine; the event is advisory.
        let _ = self.shared.loss_tx.send(LockLossEvent {
            key: self.key.clone(),
            owner: self.owner.clone(),
        });
    }
}

/// Spawn helper shared by `RLock::try_lock` registrations.
pub(crate) fn spawn(
    shared: Arc<ClientShared>,
    key: &str,
    owner: &str,
    lease: Duration,
    stop_rx: mpsc::Receiver<()>,
) {
    let watchdog = Watchdog::new(shared, key.to_string(), owner.to_string(), lease);
    tokio::spawn(watchdog.run(stop_rx));
}
