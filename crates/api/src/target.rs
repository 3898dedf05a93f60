//! Target-chain calls.

use async_trait::async_trait;
use crosslink_types::batch::Anchor;
use crosslink_types::error::TargetError;
use crosslink_types::proof::GovernanceProof;
use crosslink_types::Hash32;
use serde::{Deserialize, Serialize};

/// The BLS attestation material carried inside a comprehensive proof.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlsProofData {
    #[serde(with = "hex::serde")]
    pub aggregate_signature: Vec<u8>,
    pub total_voting_power: u64,
    pub signed_voting_power: u64,
    pub threshold_met: bool,
    pub message_hash: Hash32,
}

/// The commitment triplet plus its provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Commitments {
    pub operation_commitment: Hash32,
    pub cross_chain_commitment: Hash32,
    pub governance_root: Hash32,
    pub source_chain: String,
    pub source_block_height: u64,
    pub target_chain: String,
    pub source_tx_hash: Hash32,
}

/// The full proof record the target chain verifies in step 2.
///
/// `merkle_root` must equal `H(op ∥ cc ∥ gov)` under the exact encoding the
/// target chain uses at anchor creation. An empty `proof_hashes` is valid
/// only when `leaf_hash == merkle_root`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComprehensiveProof {
    pub transaction_hash: Hash32,
    pub merkle_root: Hash32,
    pub proof_hashes: Vec<Hash32>,
    pub leaf_hash: Hash32,
    pub governance_proof: GovernanceProof,
    pub bls_proof: BlsProofData,
    pub commitments: Commitments,
    /// Unix seconds after which the target chain refuses the proof.
    pub expiration_time: u64,
    #[serde(with = "hex::serde")]
    pub metadata: Vec<u8>,
}

/// The target chain's view of one bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AnchorStatus {
    pub exists: bool,
    pub proof_executed: bool,
    pub governance_executed: bool,
}

/// The three-step anchoring surface plus the reads the trackers need.
#[async_trait]
pub trait TargetChain: Send + Sync {
    /// Step 1: records the anchor. Returns the target-chain transaction hash.
    async fn create_anchor(&self, anchor: &Anchor) -> Result<Hash32, TargetError>;

    /// Step 2: submits the comprehensive proof for on-chain verification.
    async fn execute_comprehensive_proof(
        &self,
        bundle_id: &Hash32,
        proof: &ComprehensiveProof,
    ) -> Result<Hash32, TargetError>;

    /// Step 3: executes the intent payload. Reverts unless step 2 marked the
    /// anchor proof-executed.
    async fn execute_with_governance(
        &self,
        bundle_id: &Hash32,
        target: &[u8; 20],
        value: u128,
        calldata: &[u8],
    ) -> Result<Hash32, TargetError>;

    /// Whether the bundle exists and whether its proof has executed.
    async fn anchor_status(&self, bundle_id: &Hash32) -> Result<AnchorStatus, TargetError>;

    /// Confirmations accumulated by a target-chain transaction.
    async fn confirmations(&self, tx_hash: &Hash32) -> Result<u64, TargetError>;

    /// Label used in anchor records and metrics.
    fn chain_label(&self) -> &str;
}
