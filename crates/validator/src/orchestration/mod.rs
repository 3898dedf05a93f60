//! The proof-cycle orchestrator.
//!
//! One cooperative task per in-flight transaction, fed from the intent
//! intake channel. A separate batch driver consumes closed batches, runs the
//! attestation round once per batch, and broadcasts the outcome to every
//! waiting cycle. Cancellation is the shared watch channel, honored at every
//! suspension point; a cancelled cycle persists a `SUSPENDED` marker and
//! exits without advancing state.

mod cycle;
mod proof_index;

pub use cycle::run_cycle;
pub use proof_index::ProofIndex;

use crosslink_api::intent::DiscoveredIntent;
use crosslink_api::source::SourceLedger;
use crosslink_api::target::TargetChain;
use crosslink_engine::{AttestationCollector, BatchEngine};
use crosslink_storage::LedgerStore;
use crosslink_types::batch::{AttestationBundle, BatchState};
use crosslink_types::Hash32;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// The result of one batch's attestation round, fanned out to its cycles.
#[derive(Debug, Clone)]
pub struct AttestationOutcome {
    pub batch_id: Uuid,
    /// Source height the round was anchored at.
    pub block_height: u64,
    /// `None` when the round ended below threshold.
    pub bundle: Option<Arc<AttestationBundle>>,
}

/// Shared dependencies of every proof cycle.
pub struct CycleContext {
    pub source: Arc<dyn SourceLedger>,
    pub target: Arc<dyn TargetChain>,
    pub store: LedgerStore,
    pub batcher: Arc<BatchEngine>,
    pub collector: Arc<AttestationCollector>,
    pub attn_tx: broadcast::Sender<AttestationOutcome>,
    /// Label of the source chain carried inside commitments.
    pub source_chain_label: String,
    /// This validator's public key, attributed as governance authority.
    pub validator_public_key: Vec<u8>,
    /// Built proofs, indexed for the control surface.
    pub proofs: Arc<ProofIndex>,
    pub confirmations_required: u64,
    pub writeback_enabled: bool,
}

impl CycleContext {
    /// A broadcast channel sized for the attestation fan-out.
    pub fn attestation_channel() -> broadcast::Sender<AttestationOutcome> {
        broadcast::channel(64).0
    }
}

/// Drives proof cycles for discovered intents.
pub struct Orchestrator {
    ctx: Arc<CycleContext>,
}

impl Orchestrator {
    pub fn new(ctx: Arc<CycleContext>) -> Self {
        Orchestrator { ctx }
    }

    /// Spawns the batch driver: one attestation round per closed batch, with
    /// the outcome broadcast to the batch's cycles.
    pub fn spawn_batch_driver(&self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let ctx = Arc::clone(&self.ctx);
        let mut closed_rx = ctx.batcher.subscribe_closed();
        tokio::spawn(async move {
            loop {
                let batch = tokio::select! {
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            debug!(target: "proof-cycle", "batch driver shutting down");
                            return;
                        }
                        continue;
                    }
                    recv = closed_rx.recv() => match recv {
                        Ok(batch) => batch,
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!(target: "proof-cycle", lagged = n, "batch driver lagged");
                            continue;
                        }
                        Err(broadcast::error::RecvError::Closed) => return,
                    },
                };

                let block_height = match ctx.source.consensus_status().await {
                    Ok(status) => status.latest_height,
                    Err(e) => {
                        warn!(target: "proof-cycle", error = %e, "consensus status unavailable; using zero height");
                        0
                    }
                };

                let outcome = match ctx.collector.collect(&batch, block_height).await {
                    Ok(bundle) => AttestationOutcome {
                        batch_id: batch.batch_id,
                        block_height,
                        bundle: Some(Arc::new(bundle)),
                    },
                    Err(e) => {
                        error!(
                            target: "proof-cycle",
                            batch = %batch.batch_id,
                            error = %e,
                            "attestation round failed"
                        );
                        ctx.batcher.mark_batch(&batch.batch_id, BatchState::Failed);
                        AttestationOutcome {
                            batch_id: batch.batch_id,
                            block_height,
                            bundle: None,
                        }
                    }
                };
                // Nothing to do if every cycle already gave up.
                let _ = ctx.attn_tx.send(outcome);
            }
        })
    }

    /// Consumes the intake channel, spawning one cycle task per intent.
    /// Returns when the channel closes or shutdown flips.
    pub async fn run(
        &self,
        mut intake: mpsc::Receiver<DiscoveredIntent>,
        shutdown: watch::Receiver<bool>,
    ) {
        let mut cycles: JoinSet<(Hash32, Result<(), crosslink_types::error::CycleError>)> =
            JoinSet::new();
        let mut shutdown_rx = shutdown.clone();
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!(target: "proof-cycle", in_flight = cycles.len(), "orchestrator shutting down");
                        break;
                    }
                }
                Some(finished) = cycles.join_next(), if !cycles.is_empty() => {
                    match finished {
                        Ok((tx, Ok(()))) => debug!(target: "proof-cycle", tx = %tx, "cycle finished"),
                        Ok((tx, Err(e))) => warn!(target: "proof-cycle", tx = %tx, error = %e, "cycle failed"),
                        Err(e) => error!(target: "proof-cycle", error = %e, "cycle task panicked"),
                    }
                }
                received = intake.recv() => {
                    let Some(intent) = received else { break };
                    let ctx = Arc::clone(&self.ctx);
                    let task_shutdown = shutdown.clone();
                    let tx = intent.tx_hash;
                    cycles.spawn(async move {
                        let result = cycle::run_cycle(ctx, intent, task_shutdown).await.map(|_| ());
                        (tx, result)
                    });
                }
            }
        }
        // Let in-flight cycles reach their next suspension point and persist
        // their markers.
        while cycles.join_next().await.is_some() {}
    }
}
