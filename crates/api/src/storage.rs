//! The key-value storage seam.

use crosslink_types::error::StoreError;

/// A minimal byte-oriented key-value store.
///
/// The ledger store layers its typed, byte-exact key layout on top of this.
/// Implementations must be safe for concurrent readers; writes come from a
/// single owner (the consensus-commit path).
pub trait KvStore: Send + Sync {
    /// Reads a value. `Ok(None)` means the key has never been written.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// Writes a value, replacing any previous one.
    fn set(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError>;
}
