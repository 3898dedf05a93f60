//! Batch, anchor, and attestation entities.

use crate::hash::Hash32;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which lane a batch (or a transaction) rides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchMode {
    /// Fixed-interval lane.
    OnCadence,
    /// Small, short-wait lane for urgent transactions.
    OnDemand,
}

/// Lifecycle of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchState {
    Open,
    Closing,
    Closed,
    Anchored,
    Confirmed,
    Failed,
}

/// A transaction's membership in a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxRef {
    pub tx_hash: Hash32,
    pub account_url: String,
    /// Position of this transaction's leaf in the batch tree.
    pub leaf_index: usize,
    /// Sibling hashes from the leaf up to the root.
    pub merkle_path: Vec<Hash32>,
    pub proof_class: BatchMode,
}

/// A group of observed transactions awaiting anchoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    pub batch_id: Uuid,
    pub mode: BatchMode,
    pub txs: Vec<TxRef>,
    /// Unix seconds.
    pub started_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merkle_root: Option<Hash32>,
    pub state: BatchState,
}

impl Batch {
    /// A fresh, empty batch on the given lane.
    pub fn open(mode: BatchMode, now: u64) -> Self {
        Batch {
            batch_id: Uuid::new_v4(),
            mode,
            txs: Vec::new(),
            started_at: now,
            closed_at: None,
            merkle_root: None,
            state: BatchState::Open,
        }
    }
}

/// The record anchored onto a target chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anchor {
    /// Derived: `H("v3" ∥ intent_id ∥ be64(source_height) ∥ tx_hash)`.
    pub bundle_id: Hash32,
    pub operation_commitment: Hash32,
    pub cross_chain_commitment: Hash32,
    pub governance_root: Hash32,
    /// `H(operation ∥ cross_chain ∥ governance)`; the target chain re-derives
    /// this exact value.
    pub merkle_root: Hash32,
    pub source_block_height: u64,
    pub target_chain: String,
    /// Hash of the anchoring transaction on the target chain, once sent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<Hash32>,
    pub confirmations: u64,
}

/// A single validator's signature over a closed batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attestation {
    pub batch_id: Uuid,
    pub validator_id: String,
    pub merkle_root: Hash32,
    /// Compressed G1, 48 bytes.
    #[serde(with = "hex::serde")]
    pub signature: Vec<u8>,
    /// Compressed G2, 96 bytes.
    #[serde(with = "hex::serde")]
    pub public_key: Vec<u8>,
    pub tx_count: u64,
    pub block_height: u64,
    /// Unix seconds.
    pub timestamp: u64,
}

/// The aggregated result of a successful attestation round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationBundle {
    pub batch_id: Uuid,
    pub merkle_root: Hash32,
    /// Aggregate signature over the canonical batch message.
    #[serde(with = "hex::serde")]
    pub aggregate_signature: Vec<u8>,
    /// Aggregate of the signers' public keys.
    #[serde(with = "hex::serde")]
    pub aggregate_public_key: Vec<u8>,
    /// The canonical message every signer signed.
    pub message_hash: Hash32,
    pub total_voting_power: u64,
    pub signed_voting_power: u64,
    pub threshold_met: bool,
    /// Validator ids that contributed, in arrival order.
    pub signers: Vec<String>,
}

/// Weighted threshold: `⌈2N/3⌉` of total voting power.
pub fn attestation_threshold(total_power: u64) -> u64 {
    // Ceiling division without overflow for any realistic power sum.
    (2 * total_power).div_ceil(3)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_is_two_thirds_ceiling() {
        assert_eq!(attestation_threshold(100), 67);
        assert_eq!(attestation_threshold(3), 2);
        assert_eq!(attestation_threshold(1), 1);
        assert_eq!(attestation_threshold(0), 0);
        assert_eq!(attestation_threshold(99), 66);
    }
}
