//! # Crosslink Storage
//!
//! The durable, single-writer ledger store: a redb-backed key-value adapter
//! plus the typed record layer with its byte-exact key layout.
#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::indexing_slicing
    )
)]

/// Key-value backends: redb for production, an in-memory map for tests.
pub mod kv;
/// The typed ledger-store layer.
pub mod ledger;

pub use kv::{MemoryKv, RedbKv};
pub use ledger::LedgerStore;
