//! Records persisted by the ledger store.
//!
//! Every type here derives the canonical SCALE codec; see [`crate::codec`].

use crate::hash::Hash32;
use parity_scale_codec::{Decode, Encode};
use serde::{Deserialize, Serialize};

/// Metadata for one system-ledger block.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode, Serialize, Deserialize)]
pub struct SystemLedgerBlockMeta {
    pub height: u64,
    pub hash: Hash32,
    /// Unix seconds.
    pub time: u64,
    /// Reference to the source-chain anchor this block carries, if any.
    pub source_anchor_ref: Option<Hash32>,
}

/// Global system-ledger metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Encode, Decode, Serialize, Deserialize)]
pub struct SystemLedgerMeta {
    pub block_count: u64,
    pub latest_height: u64,
}

/// Global anchor-ledger metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Encode, Decode, Serialize, Deserialize)]
pub struct AnchorLedgerMeta {
    pub target_count: u64,
    pub anchors_delivered: u64,
}

/// Per-target anchoring progress.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode, Serialize, Deserialize)]
pub struct AnchorTargetState {
    pub target_url: String,
    pub received: u64,
    pub delivered: u64,
    pub last_anchor_height: u64,
    pub last_anchor_tx_id: Option<Hash32>,
    /// Unix seconds.
    pub last_anchor_time: u64,
}

/// The consensus application state. Written durably inside the same commit
/// in which it becomes true.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode, Serialize, Deserialize)]
pub struct ConsensusAppState {
    pub last_block_height: u64,
    pub last_block_app_hash: Hash32,
}

/// Orchestrator proof-cycle states. Persisted as part of [`CycleMarker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CycleState {
    Discovered,
    ChainedProofOk,
    GovProofOk,
    GovProofSkip,
    BatchAssigned,
    BatchClosed,
    AttestationsThresholdMet,
    AnchorCreated,
    ProofExecuted,
    GovExecuted,
    Confirmed,
    WritebackDone,
    /// Step-2 failure with a passing local verify. Terminal, not failed.
    LocalVerified,
    /// The cycle was cancelled at a suspension point and can be resumed.
    Suspended,
    Failed,
}

impl CycleState {
    /// Terminal states never advance without operator action.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CycleState::WritebackDone
                | CycleState::LocalVerified
                | CycleState::Failed
        )
    }
}

/// The durable marker for one transaction's proof cycle.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode, Serialize, Deserialize)]
pub struct CycleMarker {
    pub state: CycleState,
    /// Reason code when `state` is `Failed` or `LocalVerified`.
    pub reason: Option<String>,
    pub bundle_id: Option<Hash32>,
    /// Unix seconds.
    pub updated_at: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;

    #[test]
    fn consensus_app_state_roundtrip() {
        let st = ConsensusAppState {
            last_block_height: 42,
            last_block_app_hash: Hash32([7u8; 32]),
        };
        let bytes = codec::to_bytes_canonical(&st).unwrap();
        let back: ConsensusAppState = codec::from_bytes_canonical(&bytes).unwrap();
        assert_eq!(back, st);
    }

    #[test]
    fn terminal_states() {
        assert!(CycleState::WritebackDone.is_terminal());
        assert!(CycleState::LocalVerified.is_terminal());
        assert!(CycleState::Failed.is_terminal());
        assert!(!CycleState::Suspended.is_terminal());
        assert!(!CycleState::Discovered.is_terminal());
    }
}
