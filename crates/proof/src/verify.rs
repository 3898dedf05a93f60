//! Pure verification of chained proofs.
//!
//! Verification never touches the network and never mutates state. Any
//! invariant violation is a typed error; the trust level reports how far the
//! proof reaches when every check passes.

use crate::receipt;
use crosslink_api::source::ConsensusCommit;
use crosslink_types::error::{ProofError, ProofLayer};
use crosslink_types::proof::{ChainedProof, Layer1, Layer2, Layer3, TrustLevel};

/// Verifies layer 1 in isolation.
pub fn verify_layer1(layer1: &Layer1) -> Result<(), ProofError> {
    if layer1.receipt.start != layer1.leaf {
        return Err(ProofError::LeafMismatch {
            expected: layer1.leaf,
            got: layer1.receipt.start,
        });
    }
    receipt::verify(&layer1.receipt, ProofLayer::Layer1, "verify")?;
    if layer1.bvn_root_chain_anchor.is_zero() {
        return Err(ProofError::ZeroAnchor {
            layer: ProofLayer::Layer1,
            stage: "verify",
        });
    }
    if layer1.receipt.anchor != layer1.bvn_root_chain_anchor {
        return Err(ProofError::ReceiptIntegrity {
            layer: ProofLayer::Layer1,
            stage: "anchor-field",
            expected: layer1.bvn_root_chain_anchor,
            got: layer1.receipt.anchor,
        });
    }
    Ok(())
}

/// Verifies layer 2 and its stitching edge onto layer 1.
pub fn verify_layer2(layer1: &Layer1, layer2: &Layer2) -> Result<(), ProofError> {
    receipt::verify(&layer2.root_receipt, ProofLayer::Layer2, "root-receipt")?;
    receipt::verify(&layer2.bpt_receipt, ProofLayer::Layer2, "bpt-receipt")?;
    if layer2.root_receipt.start != layer1.bvn_root_chain_anchor {
        return Err(ProofError::StitchMismatch {
            expected: layer1.bvn_root_chain_anchor,
            got: layer2.root_receipt.start,
        });
    }
    if layer2.dn_root_chain_anchor.is_zero() {
        return Err(ProofError::ZeroAnchor {
            layer: ProofLayer::Layer2,
            stage: "verify",
        });
    }
    if layer2.root_receipt.anchor != layer2.dn_root_chain_anchor {
        return Err(ProofError::ReceiptIntegrity {
            layer: ProofLayer::Layer2,
            stage: "anchor-field",
            expected: layer2.dn_root_chain_anchor,
            got: layer2.root_receipt.anchor,
        });
    }
    Ok(())
}

/// Verifies layer 3 and its binding onto layer 2.
pub fn verify_layer3(layer2: &Layer2, layer3: &Layer3) -> Result<(), ProofError> {
    receipt::verify(&layer3.root_receipt, ProofLayer::Layer3, "root-receipt")?;
    receipt::verify(&layer3.bpt_receipt, ProofLayer::Layer3, "bpt-receipt")?;
    if layer3.dn_anchor_minor_block_index != layer2.dn_minor_block_index {
        return Err(ProofError::HeightBinding {
            expected: layer2.dn_minor_block_index,
            got: layer3.dn_anchor_minor_block_index,
        });
    }
    let expected_height = layer2.dn_minor_block_index + 1;
    if layer3.dn_consensus_height != expected_height {
        return Err(ProofError::HeightBinding {
            expected: expected_height,
            got: layer3.dn_consensus_height,
        });
    }
    if layer3.root_receipt.start != layer2.dn_root_chain_anchor {
        return Err(ProofError::StitchMismatch {
            expected: layer2.dn_root_chain_anchor,
            got: layer3.root_receipt.start,
        });
    }
    if layer3.dn_state_tree_anchor.is_zero() {
        return Err(ProofError::ZeroAnchor {
            layer: ProofLayer::Layer3,
            stage: "verify",
        });
    }
    Ok(())
}

/// Structural checks that do not belong to a single layer.
fn verify_structure(proof: &ChainedProof) -> Result<(), ProofError> {
    if proof.layer1.leaf != proof.input.tx_hash {
        return Err(ProofError::LeafMismatch {
            expected: proof.input.tx_hash,
            got: proof.layer1.leaf,
        });
    }
    if !proof.input.account.starts_with("acc://") {
        return Err(ProofError::ScopeMismatch {
            want: "acc://",
            got: proof.input.account.clone(),
        });
    }
    Ok(())
}

/// Verifies a complete chained proof and reports its trust level.
///
/// A degraded layer 2 caps the level at `DirectoryAnchored` even when layer 3
/// verifies: without the app-hash binding the consensus claim is not
/// independently checkable.
pub fn verify_chained(proof: &ChainedProof) -> Result<TrustLevel, ProofError> {
    verify_structure(proof)?;
    verify_layer1(&proof.layer1)?;
    verify_layer2(&proof.layer1, &proof.layer2)?;
    verify_layer3(&proof.layer2, &proof.layer3)?;
    if proof.layer2.degraded {
        return Ok(TrustLevel::DirectoryAnchored);
    }
    Ok(TrustLevel::ConsensusFinal)
}

/// Re-checks the consensus binding against a commit fetched independently.
pub fn verify_consensus_binding(
    proof: &ChainedProof,
    commit: &ConsensusCommit,
) -> Result<(), ProofError> {
    if commit.height != proof.layer3.dn_consensus_height {
        return Err(ProofError::HeightBinding {
            expected: proof.layer3.dn_consensus_height,
            got: commit.height,
        });
    }
    if commit.app_hash != proof.layer2.dn_root_chain_anchor {
        return Err(ProofError::AppHashMismatch {
            height: commit.height,
            expected: proof.layer2.dn_root_chain_anchor,
            got: commit.app_hash,
        });
    }
    Ok(())
}
