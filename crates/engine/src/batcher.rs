//! The two-lane batch engine.
//!
//! Transactions ride either the on-cadence lane (fixed interval W, with a
//! grace window before an alert is raised) or the on-demand lane (small cap,
//! short max wait). Closing a batch computes the Merkle tree over its
//! transactions and assigns every member its inclusion path.

use crate::commitments;
use crosslink_proof::merkle::{tx_leaf, MerkleTree};
use crosslink_telemetry::cycle_metrics;
use crosslink_types::batch::{Batch, BatchMode, BatchState, TxRef};
use crosslink_types::config::BatchingConfig;
use crosslink_types::error::BatchError;
use crosslink_types::Hash32;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

struct Lanes {
    cadence: Batch,
    demand: Batch,
    /// Closed batches kept for status queries.
    history: HashMap<Uuid, Batch>,
    /// Lanes already alerted on, so the alert fires once per batch.
    alerted: Option<Uuid>,
}

/// The batching engine. One instance per process; closed batches fan out on
/// a broadcast channel.
pub struct BatchEngine {
    config: BatchingConfig,
    lanes: Mutex<Lanes>,
    closed_tx: broadcast::Sender<Batch>,
}

impl BatchEngine {
    pub fn new(config: BatchingConfig) -> Self {
        let now = unix_now();
        let (closed_tx, _) = broadcast::channel(64);
        BatchEngine {
            config,
            lanes: Mutex::new(Lanes {
                cadence: Batch::open(BatchMode::OnCadence, now),
                demand: Batch::open(BatchMode::OnDemand, now),
                history: HashMap::new(),
                alerted: None,
            }),
            closed_tx,
        }
    }

    /// Subscribes to closed batches.
    pub fn subscribe_closed(&self) -> broadcast::Receiver<Batch> {
        self.closed_tx.subscribe()
    }

    /// Adds a transaction to a lane. Returns the batch id it joined. Filling
    /// the on-demand lane to its cap closes that batch immediately.
    pub fn submit(
        &self,
        tx_hash: Hash32,
        account_url: String,
        mode: BatchMode,
    ) -> Result<Uuid, BatchError> {
        let mut lanes = self.lanes.lock().map_err(|_| BatchError::LaneClosed)?;
        let cap = self.config.on_demand_cap;
        let batch = match mode {
            BatchMode::OnCadence => &mut lanes.cadence,
            BatchMode::OnDemand => &mut lanes.demand,
        };
        if batch.state != BatchState::Open {
            return Err(BatchError::NotOpen(batch.batch_id));
        }
        batch.txs.push(TxRef {
            tx_hash,
            account_url,
            leaf_index: 0,
            merkle_path: Vec::new(),
            proof_class: mode,
        });
        let id = batch.batch_id;
        debug!(target: "batch-engine", batch = %id, tx = %tx_hash, ?mode, "transaction batched");

        if mode == BatchMode::OnDemand && batch.txs.len() >= cap {
            drop(lanes);
            self.close_lane(BatchMode::OnDemand)?;
        }
        Ok(id)
    }

    /// Open batches, for the control surface.
    pub fn open_batches(&self) -> Vec<Batch> {
        match self.lanes.lock() {
            Ok(lanes) => vec![lanes.cadence.clone(), lanes.demand.clone()],
            Err(_) => Vec::new(),
        }
    }

    /// A batch by id, open or closed.
    pub fn batch(&self, id: &Uuid) -> Option<Batch> {
        let lanes = self.lanes.lock().ok()?;
        if lanes.cadence.batch_id == *id {
            return Some(lanes.cadence.clone());
        }
        if lanes.demand.batch_id == *id {
            return Some(lanes.demand.clone());
        }
        lanes.history.get(id).cloned()
    }

    /// Records a post-closure state transition for a batch.
    pub fn mark_batch(&self, id: &Uuid, state: BatchState) {
        if let Ok(mut lanes) = self.lanes.lock() {
            if let Some(batch) = lanes.history.get_mut(id) {
                batch.state = state;
            }
        }
    }

    /// Closes the lane's current batch, computes its tree, and broadcasts
    /// it. An empty lane yields `Ok(None)` and a fresh window.
    pub fn close_lane(&self, mode: BatchMode) -> Result<Option<Batch>, BatchError> {
        let now = unix_now();
        let mut lanes = self.lanes.lock().map_err(|_| BatchError::LaneClosed)?;
        let slot = match mode {
            BatchMode::OnCadence => &mut lanes.cadence,
            BatchMode::OnDemand => &mut lanes.demand,
        };
        if slot.txs.is_empty() {
            // Nothing to anchor this window; roll it forward.
            slot.started_at = now;
            return Ok(None);
        }

        let mut batch = std::mem::replace(slot, Batch::open(mode, now));
        batch.state = BatchState::Closing;

        let leaves: Vec<Hash32> = batch
            .txs
            .iter()
            .map(|t| tx_leaf(&t.tx_hash, &t.account_url))
            .collect();
        let tree = MerkleTree::build(&leaves).ok_or(BatchError::Empty)?;
        for (i, tx) in batch.txs.iter_mut().enumerate() {
            tx.leaf_index = i;
            tx.merkle_path = tree.path(i).unwrap_or_default();
        }
        batch.merkle_root = Some(tree.root());
        batch.closed_at = Some(now);
        batch.state = BatchState::Closed;
        lanes.alerted = None;

        info!(
            target: "batch-engine",
            batch = %batch.batch_id,
            ?mode,
            txs = batch.txs.len(),
            root = %tree.root(),
            "batch closed"
        );
        cycle_metrics().inc_batches_closed(match mode {
            BatchMode::OnCadence => "cadence",
            BatchMode::OnDemand => "demand",
        });
        lanes.history.insert(batch.batch_id, batch.clone());
        // Receivers may lag; the history map stays authoritative.
        let _ = self.closed_tx.send(batch.clone());
        Ok(Some(batch))
    }

    /// The cadence lane's alert check: a batch still open past
    /// `W + grace` trips the alert once.
    pub fn cadence_alert(&self, now: u64) -> Option<Uuid> {
        let mut lanes = self.lanes.lock().ok()?;
        let batch = &lanes.cadence;
        let deadline = batch
            .started_at
            .saturating_add(self.config.cadence_secs)
            .saturating_add(self.config.grace_secs);
        if !batch.txs.is_empty() && now > deadline && lanes.alerted != Some(batch.batch_id) {
            let id = batch.batch_id;
            lanes.alerted = Some(id);
            return Some(id);
        }
        None
    }

    /// The lane timer. Ticks once a second, closing the cadence lane every
    /// W seconds and the demand lane when its max wait elapses.
    pub fn run(
        self: std::sync::Arc<Self>,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut tick = interval(Duration::from_secs(1));
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            debug!(target: "batch-engine", "lane timer shutting down");
                            return;
                        }
                    }
                    _ = tick.tick() => {}
                }
                let now = unix_now();

                let (cadence_due, demand_due) = {
                    let Ok(lanes) = self.lanes.lock() else { return };
                    (
                        now.saturating_sub(lanes.cadence.started_at) >= self.config.cadence_secs,
                        !lanes.demand.txs.is_empty()
                            && now.saturating_sub(lanes.demand.started_at)
                                >= self.config.on_demand_max_wait_secs,
                    )
                };

                if let Some(id) = self.cadence_alert(now) {
                    cycle_metrics().inc_batch_alerts();
                    error!(
                        target: "batch-engine",
                        batch = %id,
                        "cadence batch is past its grace window"
                    );
                }
                if cadence_due {
                    if let Err(e) = self.close_lane(BatchMode::OnCadence) {
                        warn!(target: "batch-engine", error = %e, "cadence close failed");
                    }
                }
                if demand_due {
                    if let Err(e) = self.close_lane(BatchMode::OnDemand) {
                        warn!(target: "batch-engine", error = %e, "on-demand close failed");
                    }
                }
            }
        })
    }
}

/// Commitment inputs derived from a closed batch.
pub fn batch_message(batch: &Batch, block_height: u64) -> Option<Hash32> {
    let root = batch.merkle_root?;
    Some(commitments::attestation_message(
        &batch.batch_id,
        &root,
        batch.txs.len() as u64,
        block_height,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crosslink_proof::merkle::verify_path;

    fn engine() -> BatchEngine {
        BatchEngine::new(BatchingConfig::default())
    }

    fn h(n: u8) -> Hash32 {
        Hash32([n; 32])
    }

    #[test]
    fn close_assigns_paths_that_verify() {
        let e = engine();
        for i in 0..4u8 {
            e.submit(h(i), format!("acc://a{}.acme", i), BatchMode::OnCadence)
                .unwrap();
        }
        let batch = e.close_lane(BatchMode::OnCadence).unwrap().unwrap();
        let root = batch.merkle_root.unwrap();
        assert_eq!(batch.state, BatchState::Closed);
        for tx in &batch.txs {
            let leaf = tx_leaf(&tx.tx_hash, &tx.account_url);
            assert!(verify_path(&leaf, tx.leaf_index, &tx.merkle_path, &root));
        }
    }

    #[test]
    fn single_transaction_batch_closes() {
        let e = engine();
        e.submit(h(1), "acc://solo.acme".into(), BatchMode::OnCadence)
            .unwrap();
        let batch = e.close_lane(BatchMode::OnCadence).unwrap().unwrap();
        assert_eq!(batch.txs.len(), 1);
        let root = batch.merkle_root.unwrap();
        assert_eq!(root, tx_leaf(&h(1), "acc://solo.acme"));
    }

    #[test]
    fn empty_lane_close_is_a_rollover() {
        let e = engine();
        assert!(e.close_lane(BatchMode::OnCadence).unwrap().is_none());
    }

    #[test]
    fn demand_cap_closes_immediately() {
        let e = engine();
        let mut rx = e.subscribe_closed();
        for i in 0..5u8 {
            e.submit(h(i), format!("acc://d{}.acme", i), BatchMode::OnDemand)
                .unwrap();
        }
        let batch = rx.try_recv().unwrap();
        assert_eq!(batch.mode, BatchMode::OnDemand);
        assert_eq!(batch.txs.len(), 5);
        // The lane reopened empty.
        let open = e.open_batches();
        let demand = open.iter().find(|b| b.mode == BatchMode::OnDemand).unwrap();
        assert!(demand.txs.is_empty());
    }

    #[test]
    fn cadence_alert_fires_once_past_grace() {
        let e = BatchEngine::new(BatchingConfig {
            cadence_secs: 10,
            grace_secs: 5,
            ..BatchingConfig::default()
        });
        e.submit(h(1), "acc://late.acme".into(), BatchMode::OnCadence)
            .unwrap();
        let started = e.open_batches()[0].started_at;
        assert_eq!(e.cadence_alert(started + 10), None);
        assert_eq!(e.cadence_alert(started + 15), None);
        assert!(e.cadence_alert(started + 16).is_some());
        // Alert is edge-triggered.
        assert_eq!(e.cadence_alert(started + 17), None);
    }

    #[test]
    fn closed_batches_are_queryable_by_id() {
        let e = engine();
        e.submit(h(2), "acc://q.acme".into(), BatchMode::OnCadence)
            .unwrap();
        let batch = e.close_lane(BatchMode::OnCadence).unwrap().unwrap();
        let found = e.batch(&batch.batch_id).unwrap();
        assert_eq!(found.state, BatchState::Closed);
        e.mark_batch(&batch.batch_id, BatchState::Anchored);
        assert_eq!(e.batch(&batch.batch_id).unwrap().state, BatchState::Anchored);
    }
}
