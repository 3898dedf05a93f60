//! In-memory index of built proofs for the control surface.
//!
//! Proofs are re-buildable from the source ledger at any time; this index
//! only serves the gateway's by-tx and by-account queries without another
//! round trip.

use crosslink_types::proof::ChainedProof;
use crosslink_types::Hash32;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

#[derive(Default)]
struct Inner {
    by_tx: HashMap<Hash32, Arc<ChainedProof>>,
    by_account: HashMap<String, Vec<Hash32>>,
}

/// Read-mostly index of chained proofs.
#[derive(Default)]
pub struct ProofIndex {
    inner: RwLock<Inner>,
}

impl ProofIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, proof: ChainedProof) {
        let tx = proof.input.tx_hash;
        let account = proof.input.account.clone();
        let Ok(mut inner) = self.inner.write() else {
            return;
        };
        if inner.by_tx.insert(tx, Arc::new(proof)).is_none() {
            inner.by_account.entry(account).or_default().push(tx);
        }
    }

    pub fn by_tx(&self, tx_hash: &Hash32) -> Option<Arc<ChainedProof>> {
        self.inner.read().ok()?.by_tx.get(tx_hash).cloned()
    }

    pub fn by_account(&self, account: &str) -> Vec<Arc<ChainedProof>> {
        let Ok(inner) = self.inner.read() else {
            return Vec::new();
        };
        inner
            .by_account
            .get(account)
            .into_iter()
            .flatten()
            .filter_map(|tx| inner.by_tx.get(tx).cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crosslink_types::proof::*;

    fn proof(tx: Hash32, account: &str) -> ChainedProof {
        let receipt = Receipt {
            start: tx,
            anchor: tx,
            local_block: 0,
            entries: vec![],
        };
        let layer1 = Layer1 {
            tx_chain_index: 0,
            bvn_minor_block_index: 0,
            bvn_root_chain_anchor: tx,
            leaf: tx,
            receipt: receipt.clone(),
        };
        let layer2 = Layer2 {
            dn_index: 0,
            dn_minor_block_index: 0,
            dn_root_chain_anchor: tx,
            bvn_state_tree_anchor: tx,
            root_receipt: receipt.clone(),
            bpt_receipt: receipt.clone(),
            degraded: false,
        };
        let layer3 = Layer3 {
            dn_root_chain_index: 0,
            dn_anchor_minor_block_index: 0,
            dn_consensus_height: 1,
            dn_self_anchor_recorded_at_minor_block_index: 0,
            dn_state_tree_anchor: tx,
            root_receipt: receipt.clone(),
            bpt_receipt: receipt,
        };
        ChainedProof {
            input: ProofInput {
                account: account.into(),
                tx_hash: tx,
                bvn: "BVN1".into(),
            },
            layer1,
            layer2,
            layer3,
            artifacts: None,
        }
    }

    #[test]
    fn indexes_by_tx_and_account() {
        let index = ProofIndex::new();
        index.insert(proof(Hash32([1u8; 32]), "acc://a.acme"));
        index.insert(proof(Hash32([2u8; 32]), "acc://a.acme"));
        index.insert(proof(Hash32([1u8; 32]), "acc://a.acme")); // replay

        assert!(index.by_tx(&Hash32([1u8; 32])).is_some());
        assert!(index.by_tx(&Hash32([3u8; 32])).is_none());
        assert_eq!(index.by_account("acc://a.acme").len(), 2);
        assert!(index.by_account("acc://b.acme").is_empty());
    }
}
