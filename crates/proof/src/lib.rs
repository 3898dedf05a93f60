//! # Crosslink Proof
//!
//! Construction and verification of chained inclusion proofs: the partition
//! receipt for a transaction (L1), the directory receipt anchoring the
//! partition (L2), and the directory's own anchor bound to the consensus
//! app-hash (L3). Verification is pure and fail-closed.
#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::indexing_slicing
    )
)]

/// The chained proof builder.
pub mod builder;
/// Governance witness assembly.
pub mod governance;
/// Binary SHA-256 Merkle tree with duplicate-last padding.
pub mod merkle;
/// Receipt folding and integrity checks.
pub mod receipt;
/// Pure verification of chained proofs.
pub mod verify;

pub use builder::ChainedProofBuilder;
pub use governance::GovernanceProofGenerator;
pub use verify::verify_chained;
