//! One transaction's proof cycle.
//!
//! The stage sequence is: chained proof, governance witness, batch
//! assignment, attestation threshold, the three-step target-chain sequence,
//! confirmation, write-back. Every stage transition persists a durable
//! marker keyed by the transaction hash, so a replay after a crash or a
//! cancellation resumes idempotently: the bundle id is a pure function of
//! the intent, and the target chain is consulted before any step is re-sent.

use super::{AttestationOutcome, CycleContext};
use crate::writeback;
use crosslink_api::intent::DiscoveredIntent;
use crosslink_api::target::{BlsProofData, Commitments, ComprehensiveProof};
use crosslink_engine::commitments::{
    anchor_merkle_root, bundle_id, cross_chain_commitment, operation_commitment,
};
use crosslink_engine::{ConfirmOutcome, ConfirmationTracker};
use crosslink_proof::governance::{governance_root, none_witness, GovernanceProofGenerator};
use crosslink_proof::{verify_chained, ChainedProofBuilder};
use crosslink_types::batch::{Anchor, BatchMode};
use crosslink_types::error::{CycleError, ProofError, TargetError};
use crosslink_types::ledger::{CycleMarker, CycleState};
use crosslink_types::proof::{ChainedProof, GovernanceProof, ProofInput};
use crosslink_types::Hash32;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::{broadcast, watch};
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Transient-failure retry budget per stage.
const RETRY_BUDGET: usize = 3;
/// Validity horizon stamped on comprehensive proofs.
const PROOF_TTL_SECS: u64 = 3600;

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn mark(
    ctx: &CycleContext,
    tx_hash: &Hash32,
    state: CycleState,
    reason: Option<String>,
    bundle: Option<Hash32>,
) -> Result<(), CycleError> {
    ctx.store.save_cycle_marker(
        tx_hash,
        &CycleMarker {
            state,
            reason,
            bundle_id: bundle,
            updated_at: unix_now(),
        },
    )?;
    Ok(())
}

fn cancelled(shutdown: &watch::Receiver<bool>) -> bool {
    *shutdown.borrow()
}

/// Retries `op` on transient failures with exponential backoff.
async fn with_retries<T, E, Fut>(
    stage: &'static str,
    is_transient: impl Fn(&E) -> bool,
    mut op: impl FnMut() -> Fut,
) -> Result<T, CycleError>
where
    Fut: Future<Output = Result<T, E>>,
    CycleError: From<E>,
{
    let mut attempt = 0usize;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if is_transient(&e) && attempt < RETRY_BUDGET => {
                attempt += 1;
                let delay = Duration::from_secs(1u64 << attempt.min(5));
                warn!(target: "proof-cycle", stage, attempt, ?delay, "transient failure; backing off");
                sleep(delay).await;
            }
            Err(e) if is_transient(&e) => {
                let cause = CycleError::from(e).to_string();
                return Err(CycleError::RetriesExhausted { stage, cause });
            }
            Err(e) => return Err(CycleError::from(e)),
        }
    }
}

fn state_label(state: CycleState) -> &'static str {
    match state {
        CycleState::WritebackDone => "writeback_done",
        CycleState::LocalVerified => "local_verified",
        CycleState::Suspended => "suspended",
        CycleState::Failed => "failed",
        _ => "in_progress",
    }
}

/// Drives one intent to a terminal (or suspended) state. Returns the state
/// the cycle ended in.
pub async fn run_cycle(
    ctx: Arc<CycleContext>,
    intent: DiscoveredIntent,
    shutdown: watch::Receiver<bool>,
) -> Result<CycleState, CycleError> {
    crosslink_telemetry::cycle_metrics().inc_cycles_started();
    let started = std::time::Instant::now();
    let result = drive(ctx, intent, shutdown).await;
    match &result {
        Ok(state) => crosslink_telemetry::cycle_metrics().inc_cycles_completed(state_label(*state)),
        Err(_) => crosslink_telemetry::cycle_metrics().inc_cycles_completed("failed"),
    }
    crosslink_telemetry::cycle_metrics().observe_cycle_duration(started.elapsed().as_secs_f64());
    result
}

async fn drive(
    ctx: Arc<CycleContext>,
    intent: DiscoveredIntent,
    shutdown: watch::Receiver<bool>,
) -> Result<CycleState, CycleError> {
    let tx_hash = intent.tx_hash;

    // Terminal markers make replays a no-op; anything else restarts the
    // cycle from the top, relying on bundle-id determinism for idempotence.
    if let Some(marker) = ctx.store.cycle_marker(&tx_hash)? {
        if marker.state.is_terminal() {
            debug!(target: "proof-cycle", tx = %tx_hash, state = ?marker.state, "already terminal");
            return Ok(marker.state);
        }
    }
    mark(&ctx, &tx_hash, CycleState::Discovered, None, None)?;
    info!(target: "proof-cycle", tx = %tx_hash, intent = %intent.intent_id, "cycle started");

    // --- chained proof ---
    if cancelled(&shutdown) {
        return suspend(&ctx, &tx_hash).await;
    }
    let builder = ChainedProofBuilder::new(Arc::clone(&ctx.source));
    let input = ProofInput {
        account: intent.account.clone(),
        tx_hash,
        bvn: intent.bvn.clone(),
    };
    let proof = match with_retries("chained-proof", |e: &ProofError| e.is_transient(), || {
        builder.build(input.clone())
    })
    .await
    {
        Ok(proof) => proof,
        Err(e) => {
            mark(
                &ctx,
                &tx_hash,
                CycleState::Failed,
                Some(e.to_string()),
                None,
            )?;
            return Err(e);
        }
    };
    let trust = verify_chained(&proof)?;
    ctx.proofs.insert(proof.clone());
    mark(&ctx, &tx_hash, CycleState::ChainedProofOk, None, None)?;
    debug!(target: "proof-cycle", tx = %tx_hash, ?trust, "chained proof verified");

    // --- governance witness ---
    if cancelled(&shutdown) {
        return suspend(&ctx, &tx_hash).await;
    }
    let witness = if intent.governance_class {
        let generator = GovernanceProofGenerator::new(Arc::clone(&ctx.source));
        // Degrade-allowed: a missing key book continues at level none.
        let witness = generator
            .build(&intent.account, &ctx.validator_public_key, 1)
            .await
            .unwrap_or_else(|e| {
                warn!(target: "proof-cycle", tx = %tx_hash, error = %e, "governance witness degraded to none");
                none_witness()
            });
        mark(&ctx, &tx_hash, CycleState::GovProofOk, None, None)?;
        witness
    } else {
        mark(&ctx, &tx_hash, CycleState::GovProofSkip, None, None)?;
        none_witness()
    };

    // --- batching ---
    if cancelled(&shutdown) {
        return suspend(&ctx, &tx_hash).await;
    }
    let mode = if intent.urgent {
        BatchMode::OnDemand
    } else {
        BatchMode::OnCadence
    };
    // Subscribe before submitting so the close broadcast cannot be missed.
    let mut closed_rx = ctx.batcher.subscribe_closed();
    let mut attn_rx = ctx.attn_tx.subscribe();
    let batch_id = ctx
        .batcher
        .submit(tx_hash, intent.account.clone(), mode)?;
    mark(&ctx, &tx_hash, CycleState::BatchAssigned, None, None)?;

    let mut shutdown_rx = shutdown.clone();
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if cancelled(&shutdown_rx) {
                    return suspend(&ctx, &tx_hash).await;
                }
            }
            recv = closed_rx.recv() => match recv {
                Ok(batch) if batch.batch_id == batch_id => break,
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => {
                    return suspend(&ctx, &tx_hash).await;
                }
            },
        }
    }
    mark(&ctx, &tx_hash, CycleState::BatchClosed, None, None)?;

    // --- attestation threshold ---
    let outcome: AttestationOutcome = loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if cancelled(&shutdown_rx) {
                    return suspend(&ctx, &tx_hash).await;
                }
            }
            recv = attn_rx.recv() => match recv {
                Ok(outcome) if outcome.batch_id == batch_id => break outcome,
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => {
                    return suspend(&ctx, &tx_hash).await;
                }
            },
        }
    };
    let Some(attestation) = outcome.bundle else {
        let reason = "attestation round below threshold".to_string();
        mark(&ctx, &tx_hash, CycleState::Failed, Some(reason.clone()), None)?;
        return Err(CycleError::Attestation(
            crosslink_types::error::AttestationError::ThresholdNotMet {
                signed: 0,
                total: ctx.collector.total_power(),
                required: crosslink_types::batch::attestation_threshold(
                    ctx.collector.total_power(),
                ),
            },
        ));
    };
    mark(&ctx, &tx_hash, CycleState::AttestationsThresholdMet, None, None)?;

    // --- anchor assembly ---
    let op = operation_commitment(&intent);
    let cc = cross_chain_commitment(&proof);
    let gov_root = if intent.governance_class {
        governance_root(&witness)
    } else {
        Hash32::ZERO
    };
    let merkle_root = anchor_merkle_root(&op, &cc, &gov_root);
    let bundle = bundle_id(&intent.intent_id, intent.source_block_height, &tx_hash);
    let anchor = Anchor {
        bundle_id: bundle,
        operation_commitment: op,
        cross_chain_commitment: cc,
        governance_root: gov_root,
        merkle_root,
        source_block_height: intent.source_block_height,
        target_chain: ctx.target.chain_label().to_string(),
        tx_hash: None,
        confirmations: 0,
    };

    run_target_sequence(
        &ctx,
        &intent,
        &proof,
        &witness,
        &attestation,
        &anchor,
        shutdown,
    )
    .await
}

async fn suspend(ctx: &CycleContext, tx_hash: &Hash32) -> Result<CycleState, CycleError> {
    mark(ctx, tx_hash, CycleState::Suspended, None, None)?;
    info!(target: "proof-cycle", tx = %tx_hash, "cycle suspended");
    Ok(CycleState::Suspended)
}

/// The three-step target-chain sequence, confirmation, and write-back.
#[allow(clippy::too_many_arguments)]
async fn run_target_sequence(
    ctx: &CycleContext,
    intent: &DiscoveredIntent,
    proof: &ChainedProof,
    witness: &GovernanceProof,
    attestation: &crosslink_types::batch::AttestationBundle,
    anchor: &Anchor,
    shutdown: watch::Receiver<bool>,
) -> Result<CycleState, CycleError> {
    let tx_hash = intent.tx_hash;
    let bundle = anchor.bundle_id;

    // Step 1: create the anchor, unless the bundle already exists.
    let status = with_retries("anchor-status", |e: &TargetError| e.is_transient(), || {
        ctx.target.anchor_status(&bundle)
    })
    .await?;
    if status.exists {
        debug!(target: "proof-cycle", bundle = %bundle, "anchor already exists; step 1 skipped");
    } else {
        match with_retries("create-anchor", |e: &TargetError| e.is_transient(), || {
            ctx.target.create_anchor(anchor)
        })
        .await
        {
            Ok(target_tx) => {
                debug!(target: "proof-cycle", bundle = %bundle, tx = %target_tx, "anchor created");
            }
            Err(e) => {
                mark(
                    ctx,
                    &tx_hash,
                    CycleState::Failed,
                    Some(e.to_string()),
                    Some(bundle),
                )?;
                return Err(e);
            }
        }
    }
    mark(ctx, &tx_hash, CycleState::AnchorCreated, None, Some(bundle))?;
    crosslink_telemetry::cycle_metrics().inc_anchors_created();

    if *shutdown.borrow() {
        return suspend(ctx, &tx_hash).await;
    }

    // Step 2: execute the comprehensive proof. The empty-path encoding is
    // the trivial inclusion: leaf == root.
    if status.proof_executed {
        debug!(target: "proof-cycle", bundle = %bundle, "proof already executed; step 2 skipped");
    } else {
        let comprehensive = ComprehensiveProof {
            transaction_hash: tx_hash,
            merkle_root: anchor.merkle_root,
            proof_hashes: Vec::new(),
            leaf_hash: anchor.merkle_root,
            governance_proof: witness.clone(),
            bls_proof: BlsProofData {
                aggregate_signature: attestation.aggregate_signature.clone(),
                total_voting_power: attestation.total_voting_power,
                signed_voting_power: attestation.signed_voting_power,
                threshold_met: attestation.threshold_met,
                message_hash: attestation.message_hash,
            },
            commitments: Commitments {
                operation_commitment: anchor.operation_commitment,
                cross_chain_commitment: anchor.cross_chain_commitment,
                governance_root: anchor.governance_root,
                source_chain: ctx.source_chain_label.clone(),
                source_block_height: anchor.source_block_height,
                target_chain: anchor.target_chain.clone(),
                source_tx_hash: tx_hash,
            },
            expiration_time: unix_now() + PROOF_TTL_SECS,
            metadata: Vec::new(),
        };

        if let Err(e) = with_retries("execute-proof", |e: &TargetError| e.is_transient(), || {
            ctx.target.execute_comprehensive_proof(&bundle, &comprehensive)
        })
        .await
        {
            // Step-2 failure with a passing local verify is LOCAL_VERIFIED:
            // the proof is sound, the target chain would not take it.
            if verify_chained(proof).is_ok() {
                warn!(
                    target: "proof-cycle",
                    bundle = %bundle,
                    error = %e,
                    "on-chain proof execution failed but the proof verifies locally"
                );
                mark(
                    ctx,
                    &tx_hash,
                    CycleState::LocalVerified,
                    Some(e.to_string()),
                    Some(bundle),
                )?;
                return Ok(CycleState::LocalVerified);
            }
            mark(
                ctx,
                &tx_hash,
                CycleState::Failed,
                Some(e.to_string()),
                Some(bundle),
            )?;
            return Err(e);
        }
    }
    mark(ctx, &tx_hash, CycleState::ProofExecuted, None, Some(bundle))?;

    if *shutdown.borrow() {
        return suspend(ctx, &tx_hash).await;
    }

    // Step 3: execute the intent payload. A revert is terminal; the bundle
    // id stays in the marker for manual recovery. An already-executed
    // governance step (a resumed cycle) is never sent twice.
    let gov_tx = if status.governance_executed {
        debug!(target: "proof-cycle", bundle = %bundle, "governance already executed; step 3 skipped");
        None
    } else {
        match with_retries("execute-governance", |e: &TargetError| e.is_transient(), || {
            ctx.target.execute_with_governance(
                &bundle,
                &intent.target_address,
                intent.value,
                &intent.calldata,
            )
        })
        .await
        {
            Ok(tx) => Some(tx),
            Err(e) => {
                mark(
                    ctx,
                    &tx_hash,
                    CycleState::Failed,
                    Some(e.to_string()),
                    Some(bundle),
                )?;
                return Err(e);
            }
        }
    };
    mark(ctx, &tx_hash, CycleState::GovExecuted, None, Some(bundle))?;
    if let Some(tx) = &gov_tx {
        info!(target: "proof-cycle", bundle = %bundle, tx = %tx, "governance step executed");
    }

    // --- confirmation ---
    // A skipped step 3 has no fresh transaction to watch: the execution was
    // mined in an earlier run, so the required depth is credited.
    let confirmations = match &gov_tx {
        None => ctx.confirmations_required,
        Some(tx) => {
            let tracker =
                ConfirmationTracker::new(Arc::clone(&ctx.target), ctx.confirmations_required);
            let mut confirm_shutdown = shutdown.clone();
            match tracker.wait_final(tx, &mut confirm_shutdown).await? {
                ConfirmOutcome::Finalized(n) => n,
                ConfirmOutcome::Cancelled => return suspend(ctx, &tx_hash).await,
                ConfirmOutcome::TimedOut => {
                    let e = CycleError::ConfirmationTimeout(bundle);
                    mark(
                        ctx,
                        &tx_hash,
                        CycleState::Failed,
                        Some(e.to_string()),
                        Some(bundle),
                    )?;
                    return Err(e);
                }
            }
        }
    };
    mark(ctx, &tx_hash, CycleState::Confirmed, None, Some(bundle))?;
    crosslink_telemetry::cycle_metrics().inc_anchors_confirmed();

    // --- write-back ---
    if ctx.writeback_enabled {
        // A resumed cycle without a fresh step-3 transaction records the
        // bundle id as the anchor reference.
        let target_tx = gov_tx.unwrap_or(bundle);
        writeback::record_confirmed_anchor(
            &ctx.store,
            anchor,
            &target_tx,
            confirmations,
            proof.layer3.dn_consensus_height,
            unix_now(),
        )?;
    }
    mark(ctx, &tx_hash, CycleState::WritebackDone, None, Some(bundle))?;
    info!(target: "proof-cycle", tx = %tx_hash, bundle = %bundle, confirmations, "cycle complete");
    Ok(CycleState::WritebackDone)
}
