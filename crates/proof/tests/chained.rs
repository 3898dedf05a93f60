//! End-to-end proof construction and verification against a mock source
//! ledger.

use async_trait::async_trait;
use crosslink_api::source::{
    AnchorCandidate, ChainEntry, ConsensusCommit, ConsensusStatus, KeyBook, SourceLedger,
};
use crosslink_crypto::hash::{sha256, sha256_pair};
use crosslink_proof::receipt;
use crosslink_proof::verify::{verify_chained, verify_consensus_binding};
use crosslink_proof::ChainedProofBuilder;
use crosslink_types::error::{ProofError, SourceError};
use crosslink_types::proof::{ProofInput, Receipt, ReceiptStep, TrustLevel};
use crosslink_types::Hash32;
use std::collections::HashMap;
use std::sync::Arc;

const ACCOUNT: &str = "acc://alice.acme/tokens";
const SCOPE: &str = "acc://dn.acme/anchors";

/// Builds a receipt from `start` through the given siblings and returns it
/// with the folded anchor filled in.
fn receipt_through(start: Hash32, siblings: &[(Hash32, bool)], local_block: u64) -> Receipt {
    let mut r = Receipt {
        start,
        anchor: Hash32::ZERO,
        local_block,
        entries: siblings
            .iter()
            .map(|(hash, right)| ReceiptStep {
                hash: *hash,
                right: *right,
            })
            .collect(),
    };
    r.anchor = receipt::fold(&r);
    r
}

struct MockSource {
    entry: Option<ChainEntry>,
    /// anchor_search keyed by the searched anchor.
    anchors: HashMap<Hash32, Vec<AnchorCandidate>>,
    /// consensus commits keyed by height.
    commits: HashMap<u64, Hash32>,
}

#[async_trait]
impl SourceLedger for MockSource {
    async fn chain_entry(
        &self,
        _partition: &str,
        _account: &str,
        _tx_hash: &Hash32,
        _include_receipt: bool,
    ) -> Result<Option<ChainEntry>, SourceError> {
        Ok(self.entry.clone())
    }

    async fn anchor_search(
        &self,
        target_anchor: &Hash32,
        _include_receipt: bool,
        _for_any: bool,
    ) -> Result<Vec<AnchorCandidate>, SourceError> {
        Ok(self.anchors.get(target_anchor).cloned().unwrap_or_default())
    }

    async fn consensus_status(&self) -> Result<ConsensusStatus, SourceError> {
        Ok(ConsensusStatus {
            latest_height: self.commits.keys().copied().max().unwrap_or(0),
            latest_app_hash: Hash32::ZERO,
            catching_up: false,
        })
    }

    async fn consensus_commit(&self, height: u64) -> Result<ConsensusCommit, SourceError> {
        match self.commits.get(&height) {
            Some(app_hash) => Ok(ConsensusCommit {
                height,
                app_hash: *app_hash,
            }),
            None => Err(SourceError::Status { status: 404 }),
        }
    }

    async fn key_book(&self, _account: &str) -> Result<Option<KeyBook>, SourceError> {
        Ok(None)
    }
}

/// A fully consistent world: L1 receipt into X, one directory record
/// stitching X into Y, the directory's self-anchor stitching Y into Z, with
/// the consensus commits matching at every binding.
fn happy_world() -> (MockSource, ProofInput) {
    let tx_hash = sha256(b"tx-1");

    // L1: tx -> X at partition block 40.
    let l1_receipt = receipt_through(tx_hash, &[(sha256(b"s1"), true), (sha256(b"s2"), false)], 40);
    let x = l1_receipt.anchor;
    let entry = ChainEntry {
        account: ACCOUNT.to_string(),
        tx_chain_index: 7,
        minor_block_index: 40,
        receipt: Some(l1_receipt),
    };

    // L2: X -> Y recorded at directory minor block 100.
    let l2_receipt = receipt_through(x, &[(sha256(b"d1"), true)], 100);
    let y = l2_receipt.anchor;
    let l2_candidate = AnchorCandidate {
        name: "anchor(0)-bpt".to_string(),
        scope: SCOPE.to_string(),
        chain_index: 3,
        minor_block_index: 100,
        receipt: l2_receipt,
        state_tree_anchor: Some(sha256(b"bvn-bpt")),
    };

    // A decoy that does not stitch.
    let decoy = AnchorCandidate {
        name: "root".to_string(),
        scope: SCOPE.to_string(),
        chain_index: 4,
        minor_block_index: 100,
        receipt: receipt_through(sha256(b"unrelated"), &[(sha256(b"d9"), true)], 100),
        state_tree_anchor: None,
    };

    // L3: the directory's self-anchor over Y, recorded at minor block 101.
    let l3_receipt = receipt_through(y, &[(sha256(b"e1"), false)], 101);
    let l3_candidate = AnchorCandidate {
        name: "anchor(1)-bpt".to_string(),
        scope: SCOPE.to_string(),
        chain_index: 9,
        minor_block_index: 101,
        receipt: l3_receipt,
        state_tree_anchor: Some(sha256(b"dn-bpt")),
    };

    let mut anchors = HashMap::new();
    anchors.insert(x, vec![decoy, l2_candidate]);
    anchors.insert(y, vec![l3_candidate]);

    let mut commits = HashMap::new();
    // Candidate selection binds at receipt.local_block; the layer-3 check
    // reads the commit at dn_minor_block + 1 and expects Y there.
    commits.insert(100, y);
    commits.insert(101, y);

    let source = MockSource {
        entry: Some(entry),
        anchors,
        commits,
    };
    let input = ProofInput {
        account: ACCOUNT.to_string(),
        tx_hash,
        bvn: "BVN1".to_string(),
    };
    (source, input)
}

#[tokio::test]
async fn builds_and_verifies_consensus_final() {
    let (source, input) = happy_world();
    let builder = ChainedProofBuilder::new(Arc::new(source));
    let proof = builder.build(input).await.unwrap();

    assert!(!proof.layer2.degraded);
    assert_eq!(proof.layer3.dn_consensus_height, 101);
    assert_eq!(verify_chained(&proof).unwrap(), TrustLevel::ConsensusFinal);

    let commit = ConsensusCommit {
        height: 101,
        app_hash: proof.layer2.dn_root_chain_anchor,
    };
    verify_consensus_binding(&proof, &commit).unwrap();
}

#[tokio::test]
async fn selection_skips_non_stitching_candidates() {
    let (source, input) = happy_world();
    let builder = ChainedProofBuilder::new(Arc::new(source));
    let proof = builder.build(input).await.unwrap();
    // The decoy had chain_index 4; the stitching record has 3.
    assert_eq!(proof.layer2.dn_index, 3);
}

#[tokio::test]
async fn missing_entry_is_l1_not_found() {
    let (mut source, input) = happy_world();
    source.entry = None;
    let builder = ChainedProofBuilder::new(Arc::new(source));
    let err = builder.build(input).await.unwrap_err();
    assert!(matches!(err, ProofError::EntryNotFound { .. }));
}

#[tokio::test]
async fn missing_receipt_is_l1_receipt_missing() {
    let (mut source, input) = happy_world();
    if let Some(entry) = source.entry.as_mut() {
        entry.receipt = None;
    }
    let builder = ChainedProofBuilder::new(Arc::new(source));
    let err = builder.build(input).await.unwrap_err();
    assert!(matches!(err, ProofError::ReceiptMissing { .. }));
}

#[tokio::test]
async fn no_stitching_candidate_fails_layer2() {
    let (mut source, input) = happy_world();
    // Remove the stitching record, keep only the decoy.
    let x = source
        .entry
        .as_ref()
        .and_then(|e| e.receipt.as_ref())
        .map(|r| r.anchor)
        .unwrap();
    source.anchors.get_mut(&x).unwrap().retain(|c| c.chain_index == 4);
    let builder = ChainedProofBuilder::new(Arc::new(source));
    let err = builder.build(input).await.unwrap_err();
    assert!(matches!(err, ProofError::NoStitchingCandidate { .. }));
}

#[tokio::test]
async fn unbound_app_hash_degrades_but_builds() {
    let (mut source, input) = happy_world();
    // Break the app-hash binding used by candidate selection at block 100,
    // keeping the layer-3 commit at 101 intact.
    source.commits.insert(100, sha256(b"somebody else's state"));
    let builder = ChainedProofBuilder::new(Arc::new(source));
    let proof = builder.build(input).await.unwrap();
    assert!(proof.layer2.degraded);
    assert_eq!(
        verify_chained(&proof).unwrap(),
        TrustLevel::DirectoryAnchored
    );
}

#[tokio::test]
async fn tampered_stitching_fails_verification() {
    let (source, input) = happy_world();
    let builder = ChainedProofBuilder::new(Arc::new(source));
    let mut proof = builder.build(input).await.unwrap();
    proof.layer2.root_receipt.start.0[0] ^= 0x01;
    let err = verify_chained(&proof).unwrap_err();
    // Folding breaks first; either way the proof is rejected.
    assert!(matches!(
        err,
        ProofError::ReceiptIntegrity { .. } | ProofError::StitchMismatch { .. }
    ));
}

#[tokio::test]
async fn all_zero_anchor_is_rejected() {
    let (source, input) = happy_world();
    let builder = ChainedProofBuilder::new(Arc::new(source));
    let mut proof = builder.build(input).await.unwrap();
    proof.layer2.dn_root_chain_anchor = Hash32::ZERO;
    let err = verify_chained(&proof).unwrap_err();
    assert!(matches!(
        err,
        ProofError::ZeroAnchor { .. } | ProofError::ReceiptIntegrity { .. }
    ));
}

#[tokio::test]
async fn binding_mismatch_is_app_hash_error() {
    let (source, input) = happy_world();
    let builder = ChainedProofBuilder::new(Arc::new(source));
    let proof = builder.build(input).await.unwrap();
    let commit = ConsensusCommit {
        height: 101,
        app_hash: sha256(b"wrong"),
    };
    assert!(matches!(
        verify_consensus_binding(&proof, &commit),
        Err(ProofError::AppHashMismatch { .. })
    ));
}
