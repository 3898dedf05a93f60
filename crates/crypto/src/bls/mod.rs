//! BLS12-381 signatures.
//!
//! Signatures live in G1 (48-byte compressed), public keys in G2 (96-byte
//! encoding), private keys are scalars (32 bytes). Verification is the
//! pairing identity `e(sig, G2) == e(H(msg), pk)`, evaluated as a single
//! multi-Miller loop over `[(sig, G2), (H(msg), -pk)]`.

use bls12_381::{
    multi_miller_loop, G1Affine, G1Projective, G2Affine, G2Prepared, G2Projective, Gt, Scalar,
};
use crosslink_types::error::CryptoError;
use ff::Field;
#[allow(unused_imports)]
use group::Group;
use once_cell::sync::Lazy;
use sha2::{Digest, Sha512};
use std::fmt;
use zeroize::Zeroizing;

mod hash_to_curve;

pub use hash_to_curve::hash_to_g1;

/// Private key length in bytes.
pub const PRIVATE_KEY_LEN: usize = 32;
/// Public key (G2) length in bytes.
pub const PUBLIC_KEY_LEN: usize = 96;
/// Signature (G1) length in bytes.
pub const SIGNATURE_LEN: usize = 48;

/// Minimum seed length for deterministic key derivation.
pub const MIN_SEED_LEN: usize = 32;

// The prepared G2 generator used by every pairing check. Derived once per
// process; first access guarantees completion before any caller proceeds.
static G2_GENERATOR_PREPARED: Lazy<G2Prepared> =
    Lazy::new(|| G2Prepared::from(G2Affine::generator()));

/// Domain-separation tags. The spellings are wire artifacts and participate
/// in the hash-to-curve input bit for bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainTag {
    Attestation,
    Proposal,
    Sync,
    ResultAttestation,
}

impl DomainTag {
    /// The ASCII tag, no terminator.
    pub fn as_bytes(self) -> &'static [u8] {
        match self {
            DomainTag::Attestation => b"ATTESTATION_V1",
            DomainTag::Proposal => b"PROPOSAL_V1",
            DomainTag::Sync => b"SYNC_V1",
            DomainTag::ResultAttestation => b"RESULT_ATTESTATION_V1",
        }
    }
}

/// A scalar in the BLS12-381 scalar field. Owned by exactly one
/// [`crate::KeyManager`]; leaves the process only through [`Self::to_bytes`].
#[derive(Clone, PartialEq, Eq)]
pub struct PrivateKey {
    scalar: Scalar,
}

/// A point in the prime-order G2 subgroup.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PublicKey {
    point: G2Affine,
}

/// A point in the prime-order G1 subgroup.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    point: G1Affine,
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey(..)")
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = hex::encode(self.to_bytes());
        write!(f, "PublicKey({}..)", &hex[..16])
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = hex::encode(self.to_bytes());
        write!(f, "Signature({}..)", &hex[..16])
    }
}

fn scalar_from_seed_material(seed: &[u8]) -> Scalar {
    // Widen through SHA-512 and reduce; bump a counter in the negligible
    // case the reduction lands on zero.
    for counter in 0u8..=u8::MAX {
        let mut h = Sha512::new();
        h.update(seed);
        h.update([counter]);
        let wide: [u8; 64] = h.finalize().into();
        let scalar = Scalar::from_bytes_wide(&wide);
        if !bool::from(scalar.is_zero()) {
            return scalar;
        }
    }
    // Unreachable for any real hash function; the loop above would need 256
    // consecutive zero reductions.
    Scalar::one()
}

/// Generates a fresh keypair from the OS RNG.
pub fn generate_keypair() -> Result<(PrivateKey, PublicKey), CryptoError> {
    use rand::RngCore;
    let mut ikm = Zeroizing::new([0u8; 32]);
    rand::rngs::OsRng
        .try_fill_bytes(ikm.as_mut())
        .map_err(|e| CryptoError::KeyIo(format!("os rng: {}", e)))?;
    keypair_from_seed(ikm.as_ref())
}

/// Derives a keypair deterministically from a seed of at least 32 bytes.
pub fn keypair_from_seed(seed: &[u8]) -> Result<(PrivateKey, PublicKey), CryptoError> {
    if seed.len() < MIN_SEED_LEN {
        return Err(CryptoError::SeedTooShort(seed.len()));
    }
    let private = PrivateKey {
        scalar: scalar_from_seed_material(seed),
    };
    let public = private.public_key();
    Ok((private, public))
}

impl PrivateKey {
    /// The matching public key: `scalar · G2`.
    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            point: G2Affine::from(G2Projective::generator() * self.scalar),
        }
    }

    /// Signs a raw message: `scalar · H(msg)`.
    pub fn sign(&self, msg: &[u8]) -> Result<Signature, CryptoError> {
        let h = hash_to_g1(msg)?;
        Ok(Signature {
            point: G1Affine::from(G1Projective::from(h) * self.scalar),
        })
    }

    /// Signs `domain ∥ msg`.
    pub fn sign_with_domain(&self, domain: DomainTag, msg: &[u8]) -> Result<Signature, CryptoError> {
        let mut preimage = Vec::with_capacity(domain.as_bytes().len() + msg.len());
        preimage.extend_from_slice(domain.as_bytes());
        preimage.extend_from_slice(msg);
        self.sign(&preimage)
    }

    /// Serializes to 32 bytes. The buffer zeroizes on drop.
    pub fn to_bytes(&self) -> Zeroizing<[u8; PRIVATE_KEY_LEN]> {
        Zeroizing::new(self.scalar.to_bytes())
    }

    /// Restores a key from its canonical 32-byte encoding.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; PRIVATE_KEY_LEN] =
            bytes.try_into().map_err(|_| CryptoError::InvalidLength {
                expected: PRIVATE_KEY_LEN,
                got: bytes.len(),
            })?;
        let scalar: Option<Scalar> = Scalar::from_bytes(&arr).into();
        let scalar = scalar.ok_or(CryptoError::InvalidScalar)?;
        if bool::from(scalar.is_zero()) {
            return Err(CryptoError::InvalidScalar);
        }
        Ok(PrivateKey { scalar })
    }
}

impl PublicKey {
    /// Serializes to the 96-byte G2 encoding.
    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_LEN] {
        self.point.to_compressed()
    }

    /// Decodes and subgroup-checks a 96-byte public key.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        validate_public_key_subgroup(bytes)?;
        let arr: [u8; PUBLIC_KEY_LEN] =
            bytes.try_into().map_err(|_| CryptoError::InvalidLength {
                expected: PUBLIC_KEY_LEN,
                got: bytes.len(),
            })?;
        let point: Option<G2Affine> = G2Affine::from_compressed(&arr).into();
        point
            .map(|point| PublicKey { point })
            .ok_or(CryptoError::InvalidPointEncoding)
    }

    /// Verifies a raw-message signature.
    pub fn verify(&self, signature: &Signature, msg: &[u8]) -> bool {
        let Ok(h) = hash_to_g1(msg) else {
            return false;
        };
        if bool::from(signature.point.is_identity()) || bool::from(self.point.is_identity()) {
            return false;
        }
        pairing_check(&signature.point, &h, &self.point)
    }

    /// Verifies a domain-separated signature.
    pub fn verify_with_domain(&self, domain: DomainTag, signature: &Signature, msg: &[u8]) -> bool {
        let mut preimage = Vec::with_capacity(domain.as_bytes().len() + msg.len());
        preimage.extend_from_slice(domain.as_bytes());
        preimage.extend_from_slice(msg);
        self.verify(signature, &preimage)
    }
}

impl Signature {
    /// Serializes to the 48-byte compressed G1 encoding.
    pub fn to_bytes(&self) -> [u8; SIGNATURE_LEN] {
        self.point.to_compressed()
    }

    /// Decodes and subgroup-checks a 48-byte signature.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        validate_signature_subgroup(bytes)?;
        let arr: [u8; SIGNATURE_LEN] =
            bytes.try_into().map_err(|_| CryptoError::InvalidLength {
                expected: SIGNATURE_LEN,
                got: bytes.len(),
            })?;
        let point: Option<G1Affine> = G1Affine::from_compressed(&arr).into();
        point
            .map(|point| Signature { point })
            .ok_or(CryptoError::InvalidPointEncoding)
    }
}

// e(sig, G2) == e(H(msg), pk), as one Miller loop:
// e(sig, G2) · e(H(msg), -pk) == 1.
fn pairing_check(sig: &G1Affine, msg_point: &G1Affine, pk: &G2Affine) -> bool {
    let neg_pk = G2Prepared::from(-*pk);
    let acc = multi_miller_loop(&[(sig, &G2_GENERATOR_PREPARED), (msg_point, &neg_pk)]);
    acc.final_exponentiation() == Gt::identity()
}

/// Point-adds signatures. Rejects the empty list.
pub fn aggregate_signatures(signatures: &[Signature]) -> Result<Signature, CryptoError> {
    if signatures.is_empty() {
        return Err(CryptoError::EmptyAggregation);
    }
    let mut acc = G1Projective::identity();
    for s in signatures {
        acc += G1Projective::from(s.point);
    }
    Ok(Signature {
        point: G1Affine::from(acc),
    })
}

/// Point-adds public keys. Rejects the empty list.
pub fn aggregate_public_keys(keys: &[PublicKey]) -> Result<PublicKey, CryptoError> {
    if keys.is_empty() {
        return Err(CryptoError::EmptyAggregation);
    }
    let mut acc = G2Projective::identity();
    for k in keys {
        acc += G2Projective::from(k.point);
    }
    Ok(PublicKey {
        point: G2Affine::from(acc),
    })
}

/// Verifies an aggregate signature by all `keys` over the same message.
pub fn verify_aggregate(signature: &Signature, keys: &[PublicKey], msg: &[u8]) -> bool {
    let Ok(agg) = aggregate_public_keys(keys) else {
        return false;
    };
    agg.verify(signature, msg)
}

/// Domain-separated variant of [`verify_aggregate`].
pub fn verify_aggregate_with_domain(
    signature: &Signature,
    keys: &[PublicKey],
    domain: DomainTag,
    msg: &[u8],
) -> bool {
    let Ok(agg) = aggregate_public_keys(keys) else {
        return false;
    };
    agg.verify_with_domain(domain, signature, msg)
}

/// Checks a 96-byte encoding names a non-identity point in the prime-order
/// G2 subgroup.
pub fn validate_public_key_subgroup(bytes: &[u8]) -> Result<(), CryptoError> {
    let arr: [u8; PUBLIC_KEY_LEN] = bytes.try_into().map_err(|_| CryptoError::InvalidLength {
        expected: PUBLIC_KEY_LEN,
        got: bytes.len(),
    })?;
    let point: Option<G2Affine> = G2Affine::from_compressed_unchecked(&arr).into();
    let point = point.ok_or(CryptoError::InvalidPointEncoding)?;
    if bool::from(point.is_identity()) {
        return Err(CryptoError::InfinityPoint);
    }
    if !bool::from(point.is_on_curve()) {
        return Err(CryptoError::InvalidPointEncoding);
    }
    if !bool::from(point.is_torsion_free()) {
        return Err(CryptoError::WrongSubgroup);
    }
    Ok(())
}

/// Checks a 48-byte encoding names a non-identity point in the prime-order
/// G1 subgroup.
pub fn validate_signature_subgroup(bytes: &[u8]) -> Result<(), CryptoError> {
    let arr: [u8; SIGNATURE_LEN] = bytes.try_into().map_err(|_| CryptoError::InvalidLength {
        expected: SIGNATURE_LEN,
        got: bytes.len(),
    })?;
    let point: Option<G1Affine> = G1Affine::from_compressed_unchecked(&arr).into();
    let point = point.ok_or(CryptoError::InvalidPointEncoding)?;
    if bool::from(point.is_identity()) {
        return Err(CryptoError::InfinityPoint);
    }
    if !bool::from(point.is_on_curve()) {
        return Err(CryptoError::InvalidPointEncoding);
    }
    if !bool::from(point.is_torsion_free()) {
        return Err(CryptoError::WrongSubgroup);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed(last: u8) -> [u8; 32] {
        let mut s = [0u8; 32];
        s[31] = last;
        s
    }

    #[test]
    fn sign_verify_round_trip() {
        let (sk, pk) = keypair_from_seed(&seed(1)).unwrap();
        let sig = sk.sign(b"ping").unwrap();
        assert!(pk.verify(&sig, b"ping"));
        assert!(!pk.verify(&sig, b"pong"));
    }

    #[test]
    fn wrong_key_rejects() {
        let (sk, _) = keypair_from_seed(&seed(1)).unwrap();
        let (_, other_pk) = keypair_from_seed(&seed(2)).unwrap();
        let sig = sk.sign(b"ping").unwrap();
        assert!(!other_pk.verify(&sig, b"ping"));
    }

    #[test]
    fn seed_derivation_is_deterministic() {
        let (a_sk, a_pk) = keypair_from_seed(&seed(1)).unwrap();
        let (b_sk, b_pk) = keypair_from_seed(&seed(1)).unwrap();
        assert_eq!(a_pk, b_pk);
        assert_eq!(
            a_sk.sign(b"m").unwrap().to_bytes(),
            b_sk.sign(b"m").unwrap().to_bytes()
        );
    }

    #[test]
    fn seed_length_boundary() {
        assert!(matches!(
            keypair_from_seed(&[0u8; 31]),
            Err(CryptoError::SeedTooShort(31))
        ));
        assert!(keypair_from_seed(&[0u8; 32]).is_ok());
        assert!(keypair_from_seed(&[0u8; 33]).is_ok());
    }

    #[test]
    fn aggregate_three_signers() {
        let msg = b"batch-42";
        let pairs: Vec<_> = (1u8..=3)
            .map(|i| keypair_from_seed(&seed(i)).unwrap())
            .collect();
        let sigs: Vec<_> = pairs.iter().map(|(sk, _)| sk.sign(msg).unwrap()).collect();
        let pks: Vec<_> = pairs.iter().map(|(_, pk)| *pk).collect();

        let agg = aggregate_signatures(&sigs).unwrap();
        assert!(verify_aggregate(&agg, &pks, msg));
        assert!(!verify_aggregate(&agg, &pks, b"batch-43"));
    }

    #[test]
    fn empty_aggregation_rejected() {
        assert!(matches!(
            aggregate_signatures(&[]),
            Err(CryptoError::EmptyAggregation)
        ));
        assert!(matches!(
            aggregate_public_keys(&[]),
            Err(CryptoError::EmptyAggregation)
        ));
    }

    #[test]
    fn serialization_round_trip() {
        let (sk, pk) = keypair_from_seed(&seed(7)).unwrap();
        let sig = sk.sign(b"round trip").unwrap();

        let sk2 = PrivateKey::from_bytes(sk.to_bytes().as_ref()).unwrap();
        assert_eq!(sk2.to_bytes(), sk.to_bytes());

        let pk2 = PublicKey::from_bytes(&pk.to_bytes()).unwrap();
        assert_eq!(pk2.to_bytes(), pk.to_bytes());

        let sig2 = Signature::from_bytes(&sig.to_bytes()).unwrap();
        assert_eq!(sig2.to_bytes(), sig.to_bytes());
        assert!(pk2.verify(&sig2, b"round trip"));
    }

    #[test]
    fn sizes_are_fixed() {
        let (sk, pk) = keypair_from_seed(&seed(9)).unwrap();
        assert_eq!(sk.to_bytes().len(), 32);
        assert_eq!(pk.to_bytes().len(), 96);
        assert_eq!(sk.sign(b"x").unwrap().to_bytes().len(), 48);
    }

    #[test]
    fn subgroup_check_rejects_identity() {
        // Compressed identity: compression and infinity flags, zero body.
        let mut g2_identity = [0u8; 96];
        g2_identity[0] = 0xc0;
        assert!(matches!(
            validate_public_key_subgroup(&g2_identity),
            Err(CryptoError::InfinityPoint)
        ));

        let mut g1_identity = [0u8; 48];
        g1_identity[0] = 0xc0;
        assert!(matches!(
            validate_signature_subgroup(&g1_identity),
            Err(CryptoError::InfinityPoint)
        ));
    }

    #[test]
    fn subgroup_check_rejects_garbage_and_sizes() {
        assert!(matches!(
            validate_public_key_subgroup(&[0u8; 95]),
            Err(CryptoError::InvalidLength { expected: 96, .. })
        ));
        assert!(matches!(
            validate_signature_subgroup(&[0u8; 47]),
            Err(CryptoError::InvalidLength { expected: 48, .. })
        ));
        // All-0xff is not a valid encoding of any point.
        assert!(validate_public_key_subgroup(&[0xffu8; 96]).is_err());
        assert!(validate_signature_subgroup(&[0xffu8; 48]).is_err());
    }

    #[test]
    fn domain_separation_is_strict() {
        let (sk, pk) = keypair_from_seed(&seed(4)).unwrap();
        let sig = sk.sign_with_domain(DomainTag::Attestation, b"msg").unwrap();
        assert!(pk.verify_with_domain(DomainTag::Attestation, &sig, b"msg"));
        assert!(!pk.verify_with_domain(DomainTag::Proposal, &sig, b"msg"));
        assert!(!pk.verify(&sig, b"msg"));
    }

    #[test]
    fn domain_tags_are_bit_exact() {
        assert_eq!(DomainTag::Attestation.as_bytes(), b"ATTESTATION_V1");
        assert_eq!(DomainTag::Proposal.as_bytes(), b"PROPOSAL_V1");
        assert_eq!(DomainTag::Sync.as_bytes(), b"SYNC_V1");
        assert_eq!(
            DomainTag::ResultAttestation.as_bytes(),
            b"RESULT_ATTESTATION_V1"
        );
    }
}
