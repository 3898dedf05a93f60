//! Binary SHA-256 Merkle tree with duplicate-last-leaf padding.
//!
//! Batch leaves are `H(txHash ∥ '|' ∥ accountURL)`. An empty inclusion path
//! is valid only for the trivial tree where the leaf is the root.

use crosslink_crypto::hash::{sha256_concat, sha256_pair};
use crosslink_types::Hash32;

/// The leaf for a batched transaction.
pub fn tx_leaf(tx_hash: &Hash32, account_url: &str) -> Hash32 {
    sha256_concat(&[tx_hash.as_bytes(), b"|", account_url.as_bytes()])
}

/// A fully built tree, bottom level first.
#[derive(Debug, Clone)]
pub struct MerkleTree {
    levels: Vec<Vec<Hash32>>,
}

impl MerkleTree {
    /// Builds a tree over the leaves. Returns `None` for an empty slice.
    pub fn build(leaves: &[Hash32]) -> Option<Self> {
        if leaves.is_empty() {
            return None;
        }
        let mut levels = vec![leaves.to_vec()];
        while levels
            .last()
            .map(|level| level.len() > 1)
            .unwrap_or(false)
        {
            let prev = levels.last()?;
            let mut next = Vec::with_capacity(prev.len().div_ceil(2));
            for pair in prev.chunks(2) {
                let left = pair.first()?;
                // Odd level: duplicate the last leaf.
                let right = pair.get(1).unwrap_or(left);
                next.push(sha256_pair(left, right));
            }
            levels.push(next);
        }
        Some(MerkleTree { levels })
    }

    /// The tree root.
    pub fn root(&self) -> Hash32 {
        self.levels
            .last()
            .and_then(|l| l.first())
            .copied()
            .unwrap_or(Hash32::ZERO)
    }

    /// Number of leaves.
    pub fn leaf_count(&self) -> usize {
        self.levels.first().map(|l| l.len()).unwrap_or(0)
    }

    /// The sibling path for a leaf, bottom-up. `None` for an out-of-range
    /// index. A single-leaf tree yields the empty path.
    pub fn path(&self, leaf_index: usize) -> Option<Vec<Hash32>> {
        if leaf_index >= self.leaf_count() {
            return None;
        }
        let mut path = Vec::new();
        let mut idx = leaf_index;
        for level in &self.levels[..self.levels.len().saturating_sub(1)] {
            let sibling_idx = if idx % 2 == 0 { idx + 1 } else { idx - 1 };
            // Duplicate-last padding: the final odd node is its own sibling.
            let sibling = level.get(sibling_idx).or_else(|| level.get(idx))?;
            path.push(*sibling);
            idx /= 2;
        }
        Some(path)
    }
}

/// Verifies an inclusion path. The empty path is accepted only when the leaf
/// equals the root.
pub fn verify_path(leaf: &Hash32, leaf_index: usize, path: &[Hash32], root: &Hash32) -> bool {
    let mut acc = *leaf;
    let mut idx = leaf_index;
    for sibling in path {
        acc = if idx % 2 == 0 {
            sha256_pair(&acc, sibling)
        } else {
            sha256_pair(sibling, &acc)
        };
        idx /= 2;
    }
    acc == *root
}
