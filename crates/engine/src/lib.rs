//! # Crosslink Engine
//!
//! The batching and anchoring engine: lane management, commitment
//! derivation, BLS attestation collection, and confirmation tracking.
#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::indexing_slicing
    )
)]

/// Weighted-threshold BLS attestation collection.
pub mod attestation;
/// The two-lane batch engine.
pub mod batcher;
/// Commitment and identifier derivations.
pub mod commitments;
/// Target-chain confirmation tracking.
pub mod confirm;
/// HTTP attestation peers.
pub mod peers;

pub use attestation::AttestationCollector;
pub use batcher::BatchEngine;
pub use confirm::{ConfirmOutcome, ConfirmationTracker};
