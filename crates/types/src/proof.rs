//! Chained proof objects.
//!
//! A `ChainedProof` carries three stitched layers: the partition receipt for
//! the transaction (`Layer1`), the directory receipt anchoring the partition
//! (`Layer2`), and the directory's own anchor bound to the consensus app-hash
//! (`Layer3`).

use crate::hash::Hash32;
use parity_scale_codec::{Decode, Encode};
use serde::{Deserialize, Serialize};

/// The immutable input that names a transaction to be proven.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofInput {
    /// Scoped account identifier (`acc://...`).
    pub account: String,
    /// The transaction hash; also the expected receipt leaf.
    pub tx_hash: Hash32,
    /// The partition the account lives on (e.g. `BVN1`).
    pub bvn: String,
}

/// One Merkle sibling: the hash and which side it folds in from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptStep {
    /// The sibling hash.
    pub hash: Hash32,
    /// True when the sibling is the right operand of the fold.
    pub right: bool,
}

/// A Merkle path from `start` to `anchor`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    /// The leaf the path starts from.
    pub start: Hash32,
    /// The root the path must re-fold to.
    pub anchor: Hash32,
    /// The partition-local block index the anchor was taken at.
    pub local_block: u64,
    /// Ordered sibling steps.
    pub entries: Vec<ReceiptStep>,
}

/// The partition layer: the transaction's receipt into the partition's root
/// anchor chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layer1 {
    /// Index of the entry on the account's transaction chain.
    pub tx_chain_index: u64,
    /// The partition minor-block the entry was recorded in.
    pub bvn_minor_block_index: u64,
    /// The partition's root-chain anchor the receipt folds to.
    pub bvn_root_chain_anchor: Hash32,
    /// The receipt leaf; equals the transaction hash.
    pub leaf: Hash32,
    /// The partition receipt. `receipt.start == leaf`,
    /// `receipt.anchor == bvn_root_chain_anchor`.
    pub receipt: Receipt,
}

/// The directory layer: the directory's receipt over the partition anchor.
///
/// Stitching invariant: `root_receipt.start == Layer1.bvn_root_chain_anchor`
/// byte for byte.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layer2 {
    /// Index of the anchor entry on the directory chain.
    pub dn_index: u64,
    /// The directory minor-block the anchor was recorded in.
    pub dn_minor_block_index: u64,
    /// The directory root-chain anchor.
    pub dn_root_chain_anchor: Hash32,
    /// The partition's state-tree anchor as recorded by the directory.
    pub bvn_state_tree_anchor: Hash32,
    /// Receipt from the partition anchor into the directory root chain.
    pub root_receipt: Receipt,
    /// Receipt into the directory's state tree.
    pub bpt_receipt: Receipt,
    /// Set when candidate selection could not bind any stitching record to
    /// the consensus app-hash and retained the stitching set anyway.
    pub degraded: bool,
}

/// The consensus layer: the directory's own anchor bound to the BFT
/// app-hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layer3 {
    /// Index of the self-anchor entry on the directory root chain.
    pub dn_root_chain_index: u64,
    /// Equals `Layer2.dn_minor_block_index`.
    pub dn_anchor_minor_block_index: u64,
    /// Consensus height binding: `dn_anchor_minor_block_index + 1`.
    pub dn_consensus_height: u64,
    /// The minor block the directory recorded its self-anchor at.
    pub dn_self_anchor_recorded_at_minor_block_index: u64,
    /// The directory's state-tree anchor.
    pub dn_state_tree_anchor: Hash32,
    /// Receipt from the directory anchor into its root chain.
    pub root_receipt: Receipt,
    /// Receipt into the directory state tree.
    pub bpt_receipt: Receipt,
}

/// A complete, terminal chained proof.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainedProof {
    pub input: ProofInput,
    pub layer1: Layer1,
    pub layer2: Layer2,
    pub layer3: Layer3,
    /// Optional opaque artifacts attached by the builder (raw source-ledger
    /// records kept for audit).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<serde_json::Value>,
}

/// How far a verified proof reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrustLevel {
    /// Only the partition layer verified.
    Partition,
    /// Partition and directory layers verified.
    DirectoryAnchored,
    /// All three layers verified and bound to the consensus app-hash.
    ConsensusFinal,
}

/// Governance authority level attached to a proof.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorityLevel {
    /// No governance class; the governance root is zero.
    None,
    /// Authority delegated through a key book reference.
    Delegated,
    /// Direct key-page authority.
    Direct,
}

impl AuthorityLevel {
    /// Wire encoding used by the target chain (u8).
    pub fn as_u8(self) -> u8 {
        match self {
            AuthorityLevel::None => 0,
            AuthorityLevel::Delegated => 1,
            AuthorityLevel::Direct => 2,
        }
    }
}

/// The governance witness attached to a proof bundle.
///
/// The governance root is the canonical hash of this record.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode, Serialize, Deserialize)]
pub struct GovernanceProof {
    /// The key book that governs the account.
    pub key_book_url: String,
    /// Merkle root over the key-page state hashes.
    pub key_book_root: Hash32,
    /// One state hash per key page, in page order.
    pub key_page_proofs: Vec<Hash32>,
    /// 20-byte authority identifier derived from the signing key.
    pub authority_address: [u8; 20],
    pub authority_level: AuthorityLevel,
    pub required_sigs: u64,
    pub provided_sigs: u64,
    pub threshold_met: bool,
    pub nonce: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trust_levels_are_ordered() {
        assert!(TrustLevel::Partition < TrustLevel::DirectoryAnchored);
        assert!(TrustLevel::DirectoryAnchored < TrustLevel::ConsensusFinal);
    }

    #[test]
    fn authority_level_wire_values() {
        assert_eq!(AuthorityLevel::None.as_u8(), 0);
        assert_eq!(AuthorityLevel::Delegated.as_u8(), 1);
        assert_eq!(AuthorityLevel::Direct.as_u8(), 2);
    }
}
