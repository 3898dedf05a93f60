//! Intent discovery over the source ledger.

use async_trait::async_trait;
use crosslink_types::error::SourceError;
use crosslink_types::Hash32;

/// A transaction observed on the source chain that requests anchoring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredIntent {
    /// Stable intent identifier; part of the bundle-id preimage.
    pub intent_id: String,
    /// The account the transaction executed under.
    pub account: String,
    pub tx_hash: Hash32,
    /// The partition the account lives on.
    pub bvn: String,
    /// The source-chain block the transaction was recorded at.
    pub source_block_height: u64,
    /// False for the explicit non-governance class; skips the governance
    /// proof stage.
    pub governance_class: bool,
    /// Call target for the governance execution step.
    pub target_address: [u8; 20],
    pub value: u128,
    pub calldata: Vec<u8>,
    /// True to ride the on-demand lane.
    pub urgent: bool,
}

/// Feed of observed intents, scanned block by block.
#[async_trait]
pub trait IntentSource: Send + Sync {
    /// The newest source-chain block height.
    async fn latest_height(&self) -> Result<u64, SourceError>;

    /// Intents recorded in one source-chain block.
    async fn intents_in_block(&self, height: u64) -> Result<Vec<DiscoveredIntent>, SourceError>;
}
