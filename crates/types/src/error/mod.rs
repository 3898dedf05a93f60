//! Core error types for the Crosslink validator.

use crate::hash::Hash32;
use thiserror::Error;

/// A trait for assigning a stable, machine-readable string code to an error.
pub trait ErrorCode {
    /// Returns the unique, stable string identifier for this error variant.
    fn code(&self) -> &'static str;
}

/// Errors from cryptographic operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Key or signature material had the wrong length.
    #[error("invalid length: expected {expected}, got {got}")]
    InvalidLength {
        /// The expected length in bytes.
        expected: usize,
        /// The actual length in bytes.
        got: usize,
    },
    /// A seed shorter than the 32-byte minimum was supplied.
    #[error("seed too short: need at least 32 bytes, got {0}")]
    SeedTooShort(usize),
    /// The bytes did not decode to a curve point.
    #[error("invalid point encoding")]
    InvalidPointEncoding,
    /// The point decoded but is the identity element.
    #[error("point is the identity element")]
    InfinityPoint,
    /// The point is on the curve but outside the prime-order subgroup.
    #[error("point is not in the prime-order subgroup")]
    WrongSubgroup,
    /// The signature failed the pairing check.
    #[error("signature verification failed")]
    VerificationFailed,
    /// An aggregation was requested over an empty list.
    #[error("cannot aggregate an empty list")]
    EmptyAggregation,
    /// Hash-to-curve exhausted its candidate budget without finding a valid
    /// subgroup point. Surfaced as a hard error, never a constant point.
    #[error("hash-to-curve exhausted after {0} candidates")]
    HashToCurveExhausted(u32),
    /// The scalar encoding was non-canonical.
    #[error("invalid scalar encoding")]
    InvalidScalar,
    /// Key material could not be read or written.
    #[error("key io error: {0}")]
    KeyIo(String),
}

impl ErrorCode for CryptoError {
    fn code(&self) -> &'static str {
        match self {
            Self::InvalidLength { .. } => "INVALID_INPUT",
            Self::SeedTooShort(_) => "INVALID_INPUT",
            Self::InvalidPointEncoding => "INVALID_INPUT",
            Self::InfinityPoint => "CRYPTO_FAIL",
            Self::WrongSubgroup => "CRYPTO_FAIL",
            Self::VerificationFailed => "CRYPTO_FAIL",
            Self::EmptyAggregation => "INVALID_INPUT",
            Self::HashToCurveExhausted(_) => "CRYPTO_FAIL",
            Self::InvalidScalar => "INVALID_INPUT",
            Self::KeyIo(_) => "CRYPTO_KEY_IO",
        }
    }
}

/// Which proof layer an error occurred in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProofLayer {
    Layer1,
    Layer2,
    Layer3,
}

impl std::fmt::Display for ProofLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProofLayer::Layer1 => f.write_str("L1"),
            ProofLayer::Layer2 => f.write_str("L2"),
            ProofLayer::Layer3 => f.write_str("L3"),
        }
    }
}

/// Errors from chained-proof construction and verification.
///
/// The pipeline fails closed: any invariant violation carries the layer and
/// stage it was detected in.
#[derive(Debug, Error)]
pub enum ProofError {
    /// No chain entry exists for the transaction.
    #[error("no chain entry for {account} tx {tx_hash}")]
    EntryNotFound { account: String, tx_hash: Hash32 },
    /// The chain entry exists but carries no receipt.
    #[error("chain entry for {account} carries no receipt")]
    ReceiptMissing { account: String },
    /// The receipt start does not equal the transaction leaf.
    #[error("receipt start {got} does not match leaf {expected}")]
    LeafMismatch { expected: Hash32, got: Hash32 },
    /// Re-folding the receipt did not reproduce its anchor.
    #[error("{layer}/{stage}: re-folded receipt yields {got}, anchor is {expected}")]
    ReceiptIntegrity {
        layer: ProofLayer,
        stage: &'static str,
        expected: Hash32,
        got: Hash32,
    },
    /// A directory receipt does not stitch to the partition anchor.
    #[error("directory receipt starts at {got}, partition anchor is {expected}")]
    StitchMismatch { expected: Hash32, got: Hash32 },
    /// No anchor-search candidate stitches to the partition anchor.
    #[error("no anchor candidate stitches to {anchor}")]
    NoStitchingCandidate { anchor: Hash32 },
    /// An anchor field was all zeroes.
    #[error("{layer}/{stage}: anchor is all zeroes")]
    ZeroAnchor {
        layer: ProofLayer,
        stage: &'static str,
    },
    /// The consensus app-hash at the bound height does not match.
    #[error("app hash at height {height} is {got}, expected {expected}")]
    AppHashMismatch {
        height: u64,
        expected: Hash32,
        got: Hash32,
    },
    /// The consensus height binding `L3.height == L2.minor_block + 1` failed.
    #[error("consensus height binding violated: expected {expected}, got {got}")]
    HeightBinding { expected: u64, got: u64 },
    /// An anchor record was outside the expected account scope.
    #[error("anchor scope {got:?} is outside {want}")]
    ScopeMismatch { want: &'static str, got: String },
    /// The underlying source-ledger query failed.
    #[error(transparent)]
    Source(#[from] SourceError),
}

impl ErrorCode for ProofError {
    fn code(&self) -> &'static str {
        match self {
            Self::EntryNotFound { .. } => "L1_NOT_FOUND",
            Self::ReceiptMissing { .. } => "L1_RECEIPT_MISSING",
            Self::LeafMismatch { .. } => "L1_LEAF_MISMATCH",
            Self::ReceiptIntegrity {
                layer: ProofLayer::Layer1,
                ..
            } => "L1_INTEGRITY",
            Self::ReceiptIntegrity { .. } => "PROOF_INVARIANT",
            Self::StitchMismatch { .. } => "PROOF_INVARIANT",
            Self::NoStitchingCandidate { .. } => "PROOF_INVARIANT",
            Self::ZeroAnchor { .. } => "PROOF_INVARIANT",
            Self::AppHashMismatch { .. } => "PROOF_INVARIANT",
            Self::HeightBinding { .. } => "PROOF_INVARIANT",
            Self::ScopeMismatch { .. } => "INVALID_INPUT",
            Self::Source(e) => e.code(),
        }
    }
}

impl ProofError {
    /// True when a retry may help (the failure came from the network rather
    /// than from the proof material itself).
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Source(e) if e.is_transient())
    }
}

/// Errors from the source-ledger client.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Transport-level failure (connect, send, read).
    #[error("source transport error: {0}")]
    Transport(String),
    /// The query did not complete inside its deadline.
    #[error("source query timed out after {0}s")]
    Timeout(u64),
    /// The ledger answered with a non-success status after retries.
    #[error("source returned HTTP {status}")]
    Status { status: u16 },
    /// The response body did not decode.
    #[error("source response decode failed: {0}")]
    Decode(String),
    /// The response record had a shape outside the closed set we accept.
    #[error("unknown record shape: {0}")]
    UnknownRecordShape(String),
    /// A hash field in the response was not canonical 64-char lowercase hex.
    #[error("non-canonical hash in response: {0}")]
    BadHash(String),
}

impl SourceError {
    /// Transport failures, timeouts and 5xx are retriable.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout(_) => true,
            Self::Status { status } => *status == 429 || *status >= 500,
            Self::Decode(_) | Self::UnknownRecordShape(_) | Self::BadHash(_) => false,
        }
    }
}

impl ErrorCode for SourceError {
    fn code(&self) -> &'static str {
        match self {
            Self::Transport(_) => "SOURCE_TRANSPORT",
            Self::Timeout(_) => "SOURCE_TIMEOUT",
            Self::Status { .. } => "SOURCE_STATUS",
            Self::Decode(_) => "INVALID_INPUT",
            Self::UnknownRecordShape(_) => "INVALID_INPUT",
            Self::BadHash(_) => "INVALID_INPUT",
        }
    }
}

/// Errors from the target-chain client.
#[derive(Debug, Error)]
pub enum TargetError {
    /// RPC-level failure; retriable.
    #[error("target rpc error: {0}")]
    Rpc(String),
    /// The transaction reverted on chain. Terminal for the step that sent it.
    #[error("target transaction reverted: {0}")]
    Reverted(String),
    /// A sent transaction never surfaced a receipt inside the window.
    #[error("no receipt for target transaction {0}")]
    ReceiptMissing(Hash32),
    /// Local encoding of call data failed.
    #[error("target call encoding failed: {0}")]
    Encode(String),
}

impl TargetError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Rpc(_) | Self::ReceiptMissing(_))
    }
}

impl ErrorCode for TargetError {
    fn code(&self) -> &'static str {
        match self {
            Self::Rpc(_) => "TARGET_RPC",
            Self::Reverted(_) => "TARGET_REVERTED",
            Self::ReceiptMissing(_) => "TARGET_RECEIPT_MISSING",
            Self::Encode(_) => "INVALID_INPUT",
        }
    }
}

/// Errors from the durable ledger store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A generic error from the underlying key-value backend.
    #[error("store backend error: {0}")]
    Backend(String),
    /// A record failed to encode.
    #[error("store encode error: {0}")]
    Encode(String),
    /// A record failed to decode.
    #[error("store decode error: {0}")]
    Decode(String),
    /// The requested key was not present. First-class, never a nil return.
    #[error("not found")]
    NotFound,
}

impl ErrorCode for StoreError {
    fn code(&self) -> &'static str {
        match self {
            Self::Backend(_) => "STORE_BACKEND",
            Self::Encode(_) => "STORE_ENCODE",
            Self::Decode(_) => "STORE_DECODE",
            Self::NotFound => "NOT_FOUND",
        }
    }
}

/// Errors from batching.
#[derive(Debug, Error)]
pub enum BatchError {
    /// The batch is no longer accepting transactions.
    #[error("batch {0} is not open")]
    NotOpen(uuid::Uuid),
    /// The referenced batch does not exist.
    #[error("unknown batch {0}")]
    UnknownBatch(uuid::Uuid),
    /// An empty batch cannot be closed.
    #[error("cannot close an empty batch")]
    Empty,
    /// The batching engine is shutting down.
    #[error("batch lane is shut down")]
    LaneClosed,
}

impl ErrorCode for BatchError {
    fn code(&self) -> &'static str {
        match self {
            Self::NotOpen(_) => "BATCH_NOT_OPEN",
            Self::UnknownBatch(_) => "NOT_FOUND",
            Self::Empty => "INVALID_INPUT",
            Self::LaneClosed => "BATCH_LANE_CLOSED",
        }
    }
}

/// Errors from attestation collection.
#[derive(Debug, Error)]
pub enum AttestationError {
    /// The round ended below the weighted threshold.
    #[error("threshold not met: signed {signed} of {total}, need {required}")]
    ThresholdNotMet {
        signed: u64,
        total: u64,
        required: u64,
    },
    /// A peer responded with an invalid signature.
    #[error("invalid attestation from {validator_id}: {reason}")]
    InvalidAttestation {
        validator_id: String,
        reason: String,
    },
    /// A peer request failed outright.
    #[error("peer {validator_id} unreachable: {reason}")]
    PeerUnreachable {
        validator_id: String,
        reason: String,
    },
    /// Aggregation of the collected material failed.
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

impl ErrorCode for AttestationError {
    fn code(&self) -> &'static str {
        match self {
            Self::ThresholdNotMet { .. } => "ATTESTATION_THRESHOLD",
            Self::InvalidAttestation { .. } => "CRYPTO_FAIL",
            Self::PeerUnreachable { .. } => "ATTESTATION_PEER_UNREACHABLE",
            Self::Crypto(e) => e.code(),
        }
    }
}

/// Errors from the proof-cycle orchestrator.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error(transparent)]
    Proof(#[from] ProofError),
    #[error(transparent)]
    Attestation(#[from] AttestationError),
    #[error(transparent)]
    Target(#[from] TargetError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Batch(#[from] BatchError),
    /// The retry budget for a transient failure is spent.
    #[error("retry budget exhausted at stage {stage}: {cause}")]
    RetriesExhausted { stage: &'static str, cause: String },
    /// The anchor never reached the confirmation count inside the window.
    #[error("confirmation window elapsed for bundle {0}")]
    ConfirmationTimeout(Hash32),
}

impl ErrorCode for CycleError {
    fn code(&self) -> &'static str {
        match self {
            Self::Proof(e) => e.code(),
            Self::Attestation(e) => e.code(),
            Self::Target(e) => e.code(),
            Self::Store(e) => e.code(),
            Self::Batch(e) => e.code(),
            Self::RetriesExhausted { .. } => "RETRIES_EXHAUSTED",
            Self::ConfirmationTimeout(_) => "CONFIRMATION_TIMEOUT",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(SourceError::Transport("refused".into()).is_transient());
        assert!(SourceError::Status { status: 503 }.is_transient());
        assert!(SourceError::Status { status: 429 }.is_transient());
        assert!(!SourceError::Status { status: 404 }.is_transient());
        assert!(!SourceError::UnknownRecordShape("x".into()).is_transient());
        assert!(TargetError::Rpc("eof".into()).is_transient());
        assert!(!TargetError::Reverted("gov step".into()).is_transient());
    }

    #[test]
    fn codes_follow_taxonomy() {
        let e = ProofError::StitchMismatch {
            expected: Hash32::ZERO,
            got: Hash32::ZERO,
        };
        assert_eq!(e.code(), "PROOF_INVARIANT");
        assert_eq!(CryptoError::VerificationFailed.code(), "CRYPTO_FAIL");
        assert_eq!(CryptoError::SeedTooShort(31).code(), "INVALID_INPUT");
        assert_eq!(StoreError::NotFound.code(), "NOT_FOUND");
        assert_eq!(CryptoError::HashToCurveExhausted(1000).code(), "CRYPTO_FAIL");
    }
}
