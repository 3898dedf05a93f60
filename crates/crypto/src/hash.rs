//! SHA-256 helpers.
//!
//! Every digest in the proof pipeline is SHA-256; these helpers keep the
//! concatenation order explicit at call sites.

use crosslink_types::Hash32;
use sha2::{Digest, Sha256};

/// `SHA-256(data)`.
pub fn sha256(data: &[u8]) -> Hash32 {
    let mut hasher = Sha256::new();
    hasher.update(data);
    Hash32(hasher.finalize().into())
}

/// `SHA-256(parts[0] ∥ parts[1] ∥ …)`.
pub fn sha256_concat(parts: &[&[u8]]) -> Hash32 {
    let mut hasher = Sha256::new();
    for p in parts {
        hasher.update(p);
    }
    Hash32(hasher.finalize().into())
}

/// One Merkle fold: `H(left ∥ right)`.
pub fn sha256_pair(left: &Hash32, right: &Hash32) -> Hash32 {
    sha256_concat(&[left.as_bytes(), right.as_bytes()])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concat_matches_single_buffer() {
        let joined = sha256(b"abcdef");
        let parts = sha256_concat(&[b"abc", b"def"]);
        assert_eq!(joined, parts);
    }

    #[test]
    fn known_vector() {
        // SHA-256("abc")
        let h = sha256(b"abc");
        assert_eq!(
            h.to_hex(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
