//! Source-ledger queries.
//!
//! The response records form a closed set: a query answer that does not match
//! one of these shapes is an error at the client boundary, never a fallback.

use async_trait::async_trait;
use crosslink_types::error::SourceError;
use crosslink_types::proof::Receipt;
use crosslink_types::Hash32;

/// A chain-entry record for a transaction on a partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainEntry {
    /// The account URL the entry was found under.
    pub account: String,
    /// Index of the entry on the account's transaction chain.
    pub tx_chain_index: u64,
    /// The partition minor-block the entry was recorded in.
    pub minor_block_index: u64,
    /// Inclusion receipt, present when requested and available.
    pub receipt: Option<Receipt>,
}

/// One candidate record returned by an anchor search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnchorCandidate {
    /// Chain name the record came from (e.g. `anchor(0)-bpt`, `root`).
    pub name: String,
    /// Account scope of the record (e.g. `acc://dn.acme/anchors`).
    pub scope: String,
    /// Index of the record on its chain.
    pub chain_index: u64,
    /// Minor block the record was written at.
    pub minor_block_index: u64,
    /// The receipt from the searched anchor into this record's root.
    pub receipt: Receipt,
    /// The recording partition's state-tree anchor, when the record carries
    /// one.
    pub state_tree_anchor: Option<Hash32>,
}

impl AnchorCandidate {
    /// True when the record's chain is a state-tree (`bpt`) chain.
    pub fn is_bpt(&self) -> bool {
        self.name.contains("bpt")
    }

    /// True when the record's chain is a root anchor chain.
    pub fn is_root(&self) -> bool {
        self.name.contains("root")
    }
}

/// A consensus commit: the `(height, app_hash)` pair the proof binds to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsensusCommit {
    pub height: u64,
    pub app_hash: Hash32,
}

/// The consensus layer's current view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsensusStatus {
    pub latest_height: u64,
    pub latest_app_hash: Hash32,
    pub catching_up: bool,
}

/// A key page inside an account's key book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPage {
    /// Page index inside the book.
    pub index: u64,
    /// Signatures required to act under this page.
    pub accept_threshold: u64,
    /// Hashes of the keys registered on the page.
    pub key_hashes: Vec<Hash32>,
    /// Monotonic page version; bumps on every key operation.
    pub version: u64,
}

/// An account's key book: its governing pages in page order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyBook {
    pub url: String,
    pub pages: Vec<KeyPage>,
}

/// Queries the proof pipeline makes against the source ledger.
#[async_trait]
pub trait SourceLedger: Send + Sync {
    /// Fetches the chain-entry record for a transaction on a partition.
    async fn chain_entry(
        &self,
        partition: &str,
        account: &str,
        tx_hash: &Hash32,
        include_receipt: bool,
    ) -> Result<Option<ChainEntry>, SourceError>;

    /// Searches the directory partition's anchor chains for records anchoring
    /// `target_anchor`. May return multiple candidates.
    async fn anchor_search(
        &self,
        target_anchor: &Hash32,
        include_receipt: bool,
        for_any: bool,
    ) -> Result<Vec<AnchorCandidate>, SourceError>;

    /// Current consensus-layer status.
    async fn consensus_status(&self) -> Result<ConsensusStatus, SourceError>;

    /// The consensus commit at a height.
    async fn consensus_commit(&self, height: u64) -> Result<ConsensusCommit, SourceError>;

    /// The key book governing an account, when it has one.
    async fn key_book(&self, account: &str) -> Result<Option<KeyBook>, SourceError>;
}
