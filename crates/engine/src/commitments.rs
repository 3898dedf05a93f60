//! Commitment and identifier derivations.
//!
//! These preimages are wire artifacts shared with the target chain and with
//! peer validators; changing any concatenation order is a consensus break.

use crosslink_api::intent::DiscoveredIntent;
use crosslink_crypto::hash::{sha256, sha256_concat};
use crosslink_types::hash::be64;
use crosslink_types::proof::ChainedProof;
use crosslink_types::Hash32;
use parity_scale_codec::Encode;
use uuid::Uuid;

/// `H("v3" ∥ intent_id ∥ be64(source_height) ∥ tx_hash)`.
///
/// Deterministic in its inputs; replaying the orchestrator with the same
/// intent yields the same bundle id, which is what makes the on-chain steps
/// idempotent.
pub fn bundle_id(intent_id: &str, source_block_height: u64, tx_hash: &Hash32) -> Hash32 {
    sha256_concat(&[
        b"v3",
        intent_id.as_bytes(),
        &be64(source_block_height),
        tx_hash.as_bytes(),
    ])
}

/// The anchor Merkle root the target chain re-derives:
/// `H(operation ∥ cross_chain ∥ governance)`.
pub fn anchor_merkle_root(operation: &Hash32, cross_chain: &Hash32, governance: &Hash32) -> Hash32 {
    sha256_concat(&[
        operation.as_bytes(),
        cross_chain.as_bytes(),
        governance.as_bytes(),
    ])
}

/// Hash of the canonical operation description.
pub fn operation_commitment(intent: &DiscoveredIntent) -> Hash32 {
    let encoded = (
        &intent.intent_id,
        &intent.account,
        intent.tx_hash.as_bytes(),
        intent.source_block_height,
        &intent.target_address,
        intent.value,
        sha256(&intent.calldata).as_bytes(),
    )
        .encode();
    sha256(&encoded)
}

/// The cross-chain commitment: the state-tree root of the referenced source
/// state, taken from the directory layer of the chained proof.
pub fn cross_chain_commitment(proof: &ChainedProof) -> Hash32 {
    proof.layer3.dn_state_tree_anchor
}

/// The canonical attestation message every cohort member signs:
/// `H(batch_id ∥ merkle_root ∥ be64(tx_count) ∥ be64(block_height))`.
pub fn attestation_message(
    batch_id: &Uuid,
    merkle_root: &Hash32,
    tx_count: u64,
    block_height: u64,
) -> Hash32 {
    sha256_concat(&[
        batch_id.as_bytes(),
        merkle_root.as_bytes(),
        &be64(tx_count),
        &be64(block_height),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intent() -> DiscoveredIntent {
        DiscoveredIntent {
            intent_id: "intent-7".into(),
            account: "acc://alice.acme/tokens".into(),
            tx_hash: Hash32([1u8; 32]),
            bvn: "BVN1".into(),
            source_block_height: 42,
            governance_class: true,
            target_address: [2u8; 20],
            value: 0,
            calldata: vec![1, 2, 3],
            urgent: false,
        }
    }

    #[test]
    fn bundle_id_is_deterministic() {
        let a = bundle_id("intent-7", 42, &Hash32([1u8; 32]));
        let b = bundle_id("intent-7", 42, &Hash32([1u8; 32]));
        assert_eq!(a, b);
    }

    #[test]
    fn bundle_id_binds_every_input() {
        let base = bundle_id("intent-7", 42, &Hash32([1u8; 32]));
        assert_ne!(bundle_id("intent-8", 42, &Hash32([1u8; 32])), base);
        assert_ne!(bundle_id("intent-7", 43, &Hash32([1u8; 32])), base);
        assert_ne!(bundle_id("intent-7", 42, &Hash32([2u8; 32])), base);
    }

    #[test]
    fn anchor_root_matches_plain_concatenation() {
        // merkleRoot = SHA-256(op ∥ cc ∥ gov), byte for byte.
        let op = Hash32([0x11; 32]);
        let cc = Hash32([0x22; 32]);
        let gov = Hash32([0x33; 32]);
        let mut buf = Vec::with_capacity(96);
        buf.extend_from_slice(op.as_bytes());
        buf.extend_from_slice(cc.as_bytes());
        buf.extend_from_slice(gov.as_bytes());
        assert_eq!(anchor_merkle_root(&op, &cc, &gov), sha256(&buf));
    }

    #[test]
    fn operation_commitment_tracks_calldata() {
        let a = operation_commitment(&intent());
        let mut changed = intent();
        changed.calldata = vec![9];
        assert_ne!(operation_commitment(&changed), a);
    }

    #[test]
    fn attestation_message_layout() {
        let id = Uuid::nil();
        let root = Hash32([5u8; 32]);
        let m = attestation_message(&id, &root, 3, 77);
        let mut buf = Vec::new();
        buf.extend_from_slice(id.as_bytes());
        buf.extend_from_slice(root.as_bytes());
        buf.extend_from_slice(&3u64.to_be_bytes());
        buf.extend_from_slice(&77u64.to_be_bytes());
        assert_eq!(m, sha256(&buf));
    }
}
