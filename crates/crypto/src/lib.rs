//! # Crosslink Crypto
//!
//! The BLS12-381 signature subsystem: key lifecycle, hash-to-curve, signing
//! with domain separation, aggregation, and subgroup-safe verification.
//! Panics are disallowed in non-test code to promote robust error handling.
#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::indexing_slicing
    )
)]

/// BLS12-381 keys, signatures, aggregation, verification.
pub mod bls;
/// SHA-256 helpers shared across the proof pipeline.
pub mod hash;
/// File-backed custody of the validator's BLS key.
pub mod key_manager;

pub use bls::{DomainTag, PrivateKey, PublicKey, Signature};
pub use key_manager::KeyManager;
