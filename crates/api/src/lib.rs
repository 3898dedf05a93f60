//! # Crosslink API
//!
//! Core traits and interfaces for the Crosslink validator. This crate defines
//! the stable contract between the proof pipeline, the engines, and the
//! outside world, so every component can be exercised against mocks.
#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::todo,
        clippy::unimplemented,
        clippy::indexing_slicing
    )
)]

/// Intent discovery over the source ledger.
pub mod intent;
/// Peer-validator attestation exchange.
pub mod peers;
/// Source-ledger queries and the closed record shapes they return.
pub mod source;
/// The key-value storage seam.
pub mod storage;
/// Target-chain calls and the comprehensive proof record.
pub mod target;

/// A curated set of the most commonly used traits and types.
pub mod prelude {
    pub use crate::intent::{DiscoveredIntent, IntentSource};
    pub use crate::peers::{AttestationPeer, AttestationRequest, AttestationResponse};
    pub use crate::source::{AnchorCandidate, ChainEntry, ConsensusCommit, SourceLedger};
    pub use crate::storage::KvStore;
    pub use crate::target::{AnchorStatus, ComprehensiveProof, TargetChain};
}
