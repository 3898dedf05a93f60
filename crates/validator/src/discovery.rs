//! Intent discovery.
//!
//! Follows the consensus layer, persists the observed application state, and
//! scans source-ledger blocks from the durable `intent:last_block` cursor,
//! handing observed intents to the orchestrator. The cursor advances only
//! after the orchestrator has accepted the handoff, so a crash between the
//! two replays the block instead of dropping it.

use crosslink_api::intent::{DiscoveredIntent, IntentSource};
use crosslink_api::source::SourceLedger;
use crosslink_storage::LedgerStore;
use crosslink_types::ledger::ConsensusAppState;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Polls the source ledger for new intents.
pub struct IntentDiscovery {
    source: Arc<dyn IntentSource>,
    consensus: Arc<dyn SourceLedger>,
    store: LedgerStore,
    poll_interval: Duration,
}

impl IntentDiscovery {
    pub fn new(
        source: Arc<dyn IntentSource>,
        consensus: Arc<dyn SourceLedger>,
        store: LedgerStore,
        poll_interval: Duration,
    ) -> Self {
        IntentDiscovery {
            source,
            consensus,
            store,
            poll_interval,
        }
    }

    /// Spawns the polling task, feeding `intake` until shutdown.
    pub fn spawn(
        self,
        intake: mpsc::Sender<DiscoveredIntent>,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            debug!(target: "discovery", "shutting down");
                            return;
                        }
                    }
                    _ = sleep(self.poll_interval) => {}
                }

                let status = match self.consensus.consensus_status().await {
                    Ok(s) => s,
                    Err(e) => {
                        warn!(target: "discovery", error = %e, "consensus status unavailable");
                        continue;
                    }
                };
                // This task is the store's single writer for the observed
                // consensus state; the write lands before any intent from
                // the corresponding height is handed off.
                if let Err(e) = self.store.save_abci_state(&ConsensusAppState {
                    last_block_height: status.latest_height,
                    last_block_app_hash: status.latest_app_hash,
                }) {
                    warn!(target: "discovery", error = %e, "consensus state write failed");
                    continue;
                }

                let latest = status.latest_height;
                // First run starts at the chain tip; history is not replayed.
                let cursor = match self.store.intent_cursor() {
                    Ok(Some(h)) => h,
                    Ok(None) => {
                        if let Err(e) = self.store.save_intent_cursor(latest) {
                            warn!(target: "discovery", error = %e, "cursor init failed");
                        }
                        continue;
                    }
                    Err(e) => {
                        warn!(target: "discovery", error = %e, "cursor read failed");
                        continue;
                    }
                };

                for height in (cursor + 1)..=latest {
                    if *shutdown.borrow() {
                        return;
                    }
                    let intents = match self.source.intents_in_block(height).await {
                        Ok(list) => list,
                        Err(e) => {
                            warn!(target: "discovery", height, error = %e, "block scan failed");
                            break;
                        }
                    };
                    let count = intents.len();
                    let mut accepted = true;
                    for intent in intents {
                        if intake.send(intent).await.is_err() {
                            // Orchestrator is gone; stop without advancing.
                            accepted = false;
                            break;
                        }
                    }
                    if !accepted {
                        return;
                    }
                    if let Err(e) = self.store.save_intent_cursor(height) {
                        warn!(target: "discovery", height, error = %e, "cursor save failed");
                        break;
                    }
                    if count > 0 {
                        info!(target: "discovery", height, count, "intents discovered");
                    }
                }
            }
        })
    }
}
