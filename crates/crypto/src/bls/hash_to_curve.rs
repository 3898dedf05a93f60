//! Deterministic hash-to-G1.
//!
//! The map seeds `SHA256(DST ∥ msg)` and derives candidate compressed
//! encodings by rehash-and-counter until one decodes to a curve point; the
//! cofactor is then cleared and the result checked to be on-curve,
//! non-infinity, and torsion-free. If no candidate survives inside the
//! budget, the map fails hard — a constant fallback point would make
//! signatures on it trivially forgeable.

use bls12_381::{G1Affine, G1Projective};
use crosslink_types::error::CryptoError;
use sha2::{Digest, Sha256};

/// Domain-separation prefix folded into the seed.
const HASH_TO_G1_DST: &[u8] = b"BLS_SIG_BLS12381G1_XMD:SHA-256_SSWU_RO_";

/// Candidate budget before the map gives up.
const MAX_CANDIDATES: u32 = 1000;

fn seed_for(msg: &[u8]) -> [u8; 32] {
    let mut h = Sha256::new();
    h.update(HASH_TO_G1_DST);
    h.update(msg);
    h.finalize().into()
}

fn candidate_bytes(seed: &[u8; 32], counter: u32) -> [u8; 48] {
    let mut h1 = Sha256::new();
    h1.update(seed);
    h1.update(counter.to_be_bytes());
    h1.update([0x01]);
    let a: [u8; 32] = h1.finalize().into();

    let mut h2 = Sha256::new();
    h2.update(seed);
    h2.update(counter.to_be_bytes());
    h2.update([0x02]);
    let b: [u8; 32] = h2.finalize().into();

    let mut out = [0u8; 48];
    out[..32].copy_from_slice(&a);
    out[32..].copy_from_slice(&b[..16]);
    // Compression flag set, infinity and sort flags cleared, top x bits
    // masked so the encoding has a chance of naming a field element.
    out[0] = (out[0] & 0x1f) | 0x80;
    out
}

/// Maps a message to a point in the prime-order G1 subgroup.
pub fn hash_to_g1(msg: &[u8]) -> Result<G1Affine, CryptoError> {
    let seed = seed_for(msg);
    for counter in 0..MAX_CANDIDATES {
        let bytes = candidate_bytes(&seed, counter);
        let decoded: Option<G1Affine> =
            G1Affine::from_compressed_unchecked(&bytes).into();
        let Some(point) = decoded else {
            continue;
        };
        let cleared = G1Affine::from(G1Projective::from(point).clear_cofactor());
        if bool::from(cleared.is_identity()) {
            continue;
        }
        if !bool::from(cleared.is_on_curve()) || !bool::from(cleared.is_torsion_free()) {
            continue;
        }
        return Ok(cleared);
    }
    Err(CryptoError::HashToCurveExhausted(MAX_CANDIDATES))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_for_same_message() {
        let a = hash_to_g1(b"ping").unwrap();
        let b = hash_to_g1(b"ping").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_messages_map_to_distinct_points() {
        let a = hash_to_g1(b"ping").unwrap();
        let b = hash_to_g1(b"pong").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn output_is_subgroup_clean() {
        let p = hash_to_g1(b"subgroup check").unwrap();
        assert!(bool::from(p.is_on_curve()));
        assert!(bool::from(p.is_torsion_free()));
        assert!(!bool::from(p.is_identity()));
    }

    #[test]
    fn never_the_generator() {
        // The unsafe legacy fallback returned the generator; the map must not.
        for msg in [&b"a"[..], b"b", b"c", b"batch-42", b""] {
            assert_ne!(hash_to_g1(msg).unwrap(), G1Affine::generator());
        }
    }
}
