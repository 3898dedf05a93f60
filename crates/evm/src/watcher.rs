//! Polling watcher over the anchor-registry events.
//!
//! Subscribes to `AnchorCreated`, `ProofExecuted`, and
//! `ProofVerificationFailed`, buffering at most [`EVENT_BUFFER`] undelivered
//! events. Poll failures back off exponentially; handlers see events in
//! subscription order per event type.

use crate::contract::{hash32, AnchorRegistry};
use alloy::providers::Provider;
use alloy::transports::http::{Client, Http};
use crosslink_types::Hash32;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Maximum undelivered events held by the watcher.
pub const EVENT_BUFFER: usize = 500;

/// A decoded anchor-registry event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnchorEvent {
    Created {
        bundle_id: Hash32,
        merkle_root: Hash32,
        source_block_height: u64,
    },
    ProofExecuted {
        bundle_id: Hash32,
        merkle_root: Hash32,
    },
    VerificationFailed {
        bundle_id: Hash32,
        reason: String,
    },
}

/// Watches the registry's event stream by polling `eth_getLogs`.
pub struct EventWatcher<P> {
    contract: AnchorRegistry::AnchorRegistryInstance<Http<Client>, P>,
    poll_interval: Duration,
    next_block: u64,
}

impl<P: Provider<Http<Client>> + Clone + 'static> EventWatcher<P> {
    pub fn new(
        contract: AnchorRegistry::AnchorRegistryInstance<Http<Client>, P>,
        poll_interval_secs: u64,
        start_block: u64,
    ) -> Self {
        EventWatcher {
            contract,
            poll_interval: Duration::from_secs(poll_interval_secs),
            next_block: start_block,
        }
    }

    /// Spawns the polling task. Events arrive on the returned channel until
    /// shutdown flips or the receiver is dropped.
    pub fn spawn(
        mut self,
        mut shutdown: watch::Receiver<bool>,
    ) -> (JoinHandle<()>, mpsc::Receiver<AnchorEvent>) {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let handle = tokio::spawn(async move {
            let mut backoff: u32 = 0;
            loop {
                tokio::select! {
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            debug!(target: "evm-watcher", "shutting down");
                            return;
                        }
                    }
                    _ = sleep(self.poll_interval) => {}
                }

                match self.poll_once().await {
                    Ok(events) => {
                        backoff = 0;
                        for event in events {
                            if tx.send(event).await.is_err() {
                                // Receiver dropped; nothing left to notify.
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        backoff = (backoff + 1).min(6);
                        let delay = Duration::from_secs(1u64 << backoff);
                        warn!(target: "evm-watcher", error = %e, ?delay, "log poll failed; backing off");
                        sleep(delay).await;
                    }
                }
            }
        });
        (handle, rx)
    }

    /// Fetches one window of logs. Per event type, matches are appended in
    /// block order, so consumers observe subscription order per type.
    async fn poll_once(&mut self) -> Result<Vec<AnchorEvent>, String> {
        let latest = self
            .contract
            .provider()
            .get_block_number()
            .await
            .map_err(|e| e.to_string())?;
        if latest < self.next_block {
            return Ok(Vec::new());
        }
        let from = self.next_block;
        let mut events = Vec::new();

        let created = self
            .contract
            .AnchorCreated_filter()
            .from_block(from)
            .to_block(latest)
            .query()
            .await
            .map_err(|e| e.to_string())?;
        for (ev, _log) in created {
            events.push(AnchorEvent::Created {
                bundle_id: hash32(&ev.bundleId),
                merkle_root: hash32(&ev.merkleRoot),
                source_block_height: ev.sourceBlockHeight,
            });
        }

        let executed = self
            .contract
            .ProofExecuted_filter()
            .from_block(from)
            .to_block(latest)
            .query()
            .await
            .map_err(|e| e.to_string())?;
        for (ev, _log) in executed {
            events.push(AnchorEvent::ProofExecuted {
                bundle_id: hash32(&ev.bundleId),
                merkle_root: hash32(&ev.merkleRoot),
            });
        }

        let failed = self
            .contract
            .ProofVerificationFailed_filter()
            .from_block(from)
            .to_block(latest)
            .query()
            .await
            .map_err(|e| e.to_string())?;
        for (ev, _log) in failed {
            events.push(AnchorEvent::VerificationFailed {
                bundle_id: hash32(&ev.bundleId),
                reason: ev.reason,
            });
        }

        self.next_block = latest + 1;
        Ok(events)
    }
}
