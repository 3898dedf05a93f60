//! The chained proof builder.
//!
//! Builds the three layers in order, querying the source ledger through the
//! [`SourceLedger`] seam. Every layer is integrity-checked as it is built;
//! the verifier in [`crate::verify`] re-checks the finished object
//! independently.

use crate::receipt;
use crosslink_api::source::{AnchorCandidate, SourceLedger};
use crosslink_types::error::{ProofError, ProofLayer};
use crosslink_types::proof::{ChainedProof, Layer1, Layer2, Layer3, ProofInput};
use crosslink_types::Hash32;
use std::sync::Arc;
use tracing::{debug, warn};

/// Account scope every directory anchor record must live under.
pub const DN_ANCHOR_SCOPE: &str = "acc://dn.acme/anchors";

/// Builds `ChainedProof`s against a source ledger.
pub struct ChainedProofBuilder<S: SourceLedger + ?Sized> {
    source: Arc<S>,
}

impl<S: SourceLedger + ?Sized> ChainedProofBuilder<S> {
    pub fn new(source: Arc<S>) -> Self {
        ChainedProofBuilder { source }
    }

    /// Builds all three layers for an input.
    pub async fn build(&self, input: ProofInput) -> Result<ChainedProof, ProofError> {
        let layer1 = self.build_layer1(&input).await?;
        let layer2 = self.build_layer2(&layer1).await?;
        let layer3 = self.build_layer3(&layer2).await?;
        Ok(ChainedProof {
            input,
            layer1,
            layer2,
            layer3,
            artifacts: None,
        })
    }

    /// Layer 1: the transaction's receipt on its partition.
    pub async fn build_layer1(&self, input: &ProofInput) -> Result<Layer1, ProofError> {
        let entry = self
            .source
            .chain_entry(&input.bvn, &input.account, &input.tx_hash, true)
            .await?
            .ok_or_else(|| ProofError::EntryNotFound {
                account: input.account.clone(),
                tx_hash: input.tx_hash,
            })?;

        let receipt = entry.receipt.ok_or_else(|| ProofError::ReceiptMissing {
            account: input.account.clone(),
        })?;

        if receipt.start != input.tx_hash {
            return Err(ProofError::LeafMismatch {
                expected: input.tx_hash,
                got: receipt.start,
            });
        }
        receipt::verify(&receipt, ProofLayer::Layer1, "chain-entry")?;
        if receipt.anchor.is_zero() {
            return Err(ProofError::ZeroAnchor {
                layer: ProofLayer::Layer1,
                stage: "chain-entry",
            });
        }

        debug!(
            target: "proof-cycle",
            tx = %input.tx_hash,
            anchor = %receipt.anchor,
            "layer 1 built"
        );
        Ok(Layer1 {
            tx_chain_index: entry.tx_chain_index,
            bvn_minor_block_index: entry.minor_block_index,
            bvn_root_chain_anchor: receipt.anchor,
            leaf: input.tx_hash,
            receipt,
        })
    }

    /// Layer 2: the directory record anchoring the partition anchor.
    pub async fn build_layer2(&self, layer1: &Layer1) -> Result<Layer2, ProofError> {
        let candidates = self
            .source
            .anchor_search(&layer1.bvn_root_chain_anchor, true, true)
            .await?;

        let (selected, bpt, degraded) = self
            .select_candidate(&candidates, &layer1.bvn_root_chain_anchor)
            .await?;

        if selected.receipt.anchor.is_zero() {
            return Err(ProofError::ZeroAnchor {
                layer: ProofLayer::Layer2,
                stage: "anchor-search",
            });
        }
        if !selected.scope.starts_with(DN_ANCHOR_SCOPE) {
            return Err(ProofError::ScopeMismatch {
                want: DN_ANCHOR_SCOPE,
                got: selected.scope.clone(),
            });
        }
        receipt::verify(&selected.receipt, ProofLayer::Layer2, "root-receipt")?;
        receipt::verify(&bpt.receipt, ProofLayer::Layer2, "bpt-receipt")?;

        Ok(Layer2 {
            dn_index: selected.chain_index,
            dn_minor_block_index: selected.minor_block_index,
            dn_root_chain_anchor: selected.receipt.anchor,
            bvn_state_tree_anchor: bpt.state_tree_anchor.unwrap_or(bpt.receipt.anchor),
            root_receipt: selected.receipt.clone(),
            bpt_receipt: bpt.receipt.clone(),
            degraded,
        })
    }

    /// Layer 3: the directory's own anchor, bound to the consensus app-hash.
    pub async fn build_layer3(&self, layer2: &Layer2) -> Result<Layer3, ProofError> {
        let dn_anchor_minor_block_index = layer2.dn_minor_block_index;
        let dn_consensus_height = dn_anchor_minor_block_index + 1;

        // The app-hash for block N surfaces in the commit at N+1.
        let commit = self.source.consensus_commit(dn_consensus_height).await?;
        if commit.app_hash != layer2.dn_root_chain_anchor {
            return Err(ProofError::AppHashMismatch {
                height: dn_consensus_height,
                expected: layer2.dn_root_chain_anchor,
                got: commit.app_hash,
            });
        }

        let candidates = self
            .source
            .anchor_search(&layer2.dn_root_chain_anchor, true, true)
            .await?;
        let (selected, bpt, _) = self
            .select_candidate(&candidates, &layer2.dn_root_chain_anchor)
            .await?;

        if selected.receipt.anchor.is_zero() {
            return Err(ProofError::ZeroAnchor {
                layer: ProofLayer::Layer3,
                stage: "self-anchor",
            });
        }
        receipt::verify(&selected.receipt, ProofLayer::Layer3, "root-receipt")?;
        receipt::verify(&bpt.receipt, ProofLayer::Layer3, "bpt-receipt")?;

        Ok(Layer3 {
            dn_root_chain_index: selected.chain_index,
            dn_anchor_minor_block_index,
            dn_consensus_height,
            dn_self_anchor_recorded_at_minor_block_index: selected.minor_block_index,
            dn_state_tree_anchor: bpt.state_tree_anchor.unwrap_or(bpt.receipt.anchor),
            root_receipt: selected.receipt.clone(),
            bpt_receipt: bpt.receipt.clone(),
        })
    }

    /// Deterministic candidate selection.
    ///
    /// 1. Discard candidates that do not stitch (`receipt.start != anchor`).
    /// 2. Among stitchable candidates, discard those whose `receipt.anchor`
    ///    does not match the consensus app-hash at `receipt.local_block` —
    ///    unless no candidate passes, in which case the stitching set is
    ///    retained and the layer is flagged degraded.
    /// 3. Prefer `bpt` records, else `root`, else any.
    async fn select_candidate<'a>(
        &self,
        candidates: &'a [AnchorCandidate],
        anchor: &Hash32,
    ) -> Result<(&'a AnchorCandidate, &'a AnchorCandidate, bool), ProofError> {
        let stitching: Vec<&AnchorCandidate> = candidates
            .iter()
            .filter(|c| c.receipt.start == *anchor)
            .collect();
        if stitching.is_empty() {
            return Err(ProofError::NoStitchingCandidate { anchor: *anchor });
        }

        let mut bound: Vec<&AnchorCandidate> = Vec::new();
        for &c in &stitching {
            match self.source.consensus_commit(c.receipt.local_block).await {
                Ok(commit) if commit.app_hash == c.receipt.anchor => bound.push(c),
                Ok(_) => {}
                Err(e) if e.is_transient() => return Err(ProofError::Source(e)),
                Err(_) => {}
            }
        }

        let degraded = bound.is_empty();
        let pool = if degraded { &stitching } else { &bound };
        if degraded {
            warn!(
                target: "proof-cycle",
                anchor = %anchor,
                candidates = stitching.len(),
                "no anchor candidate binds to the consensus app-hash; retaining stitching set"
            );
        }

        let selected = pool
            .iter()
            .find(|c| c.is_bpt())
            .or_else(|| pool.iter().find(|c| c.is_root()))
            .or_else(|| pool.first())
            .copied()
            .ok_or(ProofError::NoStitchingCandidate { anchor: *anchor })?;
        let bpt = pool.iter().find(|c| c.is_bpt()).copied().unwrap_or(selected);
        Ok((selected, bpt, degraded))
    }
}
