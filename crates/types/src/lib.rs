//! # Crosslink Types
//!
//! Core data structures for the Crosslink validator: proof objects, batch and
//! anchor entities, ledger-store records, the canonical codec, and the error
//! types shared by every other crate.
//!
//! This crate has minimal dependencies to remain stable.
#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::indexing_slicing
    )
)]

/// Batch, anchor, and attestation entities.
pub mod batch;
/// The canonical, deterministic binary codec for persisted records.
pub mod codec;
/// Node configuration structures.
pub mod config;
/// Core error types and the `ErrorCode` trait.
pub mod error;
/// The `Hash32` strict-hex digest newtype.
pub mod hash;
/// Byte-exact key layout for the ledger store.
pub mod keys;
/// Ledger-store record types.
pub mod ledger;
/// Chained proof objects: receipts and the three proof layers.
pub mod proof;

pub use hash::Hash32;

#[cfg(test)]
mod tests {
    // Canary test to verify test discovery is working.
    #[test]
    fn test_types_canary() {}
}
