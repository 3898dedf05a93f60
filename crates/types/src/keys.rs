//! Byte-exact key layout for the ledger store.
//!
//! Keys are stable wire artifacts; changing any of them orphans existing
//! databases.

use crate::hash::{be64, Hash32};

/// Global system-ledger metadata.
pub const SYSLEDGER_META: &[u8] = b"sysledger:meta";
/// Latest system-ledger block.
pub const SYSLEDGER_LATEST_BLOCK: &[u8] = b"sysledger:latest_block";
/// Global anchor-ledger metadata.
pub const ANCHORLEDGER_META: &[u8] = b"anchorledger:meta";
/// Intent-discovery cursor (be64 height).
pub const INTENT_LAST_BLOCK: &[u8] = b"intent:last_block";
/// Consensus application state.
pub const ABCI_STATE: &[u8] = b"abci:state";

/// `sysledger:block:<be64(height)>`
pub fn sysledger_block(height: u64) -> Vec<u8> {
    let mut k = Vec::with_capacity(16 + 8);
    k.extend_from_slice(b"sysledger:block:");
    k.extend_from_slice(&be64(height));
    k
}

/// `anchorledger:target:<targetURL>`
pub fn anchorledger_target(target_url: &str) -> Vec<u8> {
    let mut k = Vec::with_capacity(20 + target_url.len());
    k.extend_from_slice(b"anchorledger:target:");
    k.extend_from_slice(target_url.as_bytes());
    k
}

/// `cycle:tx:<hex(tx_hash)>` — orchestrator cycle markers.
pub fn cycle_tx(tx_hash: &Hash32) -> Vec<u8> {
    let mut k = Vec::with_capacity(9 + 64);
    k.extend_from_slice(b"cycle:tx:");
    k.extend_from_slice(tx_hash.to_hex().as_bytes());
    k
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_key_is_byte_exact() {
        let k = sysledger_block(1);
        assert_eq!(&k[..16], b"sysledger:block:");
        assert_eq!(&k[16..], &[0, 0, 0, 0, 0, 0, 0, 1]);
    }

    #[test]
    fn target_key_embeds_url() {
        let k = anchorledger_target("eip155:1");
        assert_eq!(k, b"anchorledger:target:eip155:1".to_vec());
    }

    #[test]
    fn cycle_key_uses_hex() {
        let k = cycle_tx(&Hash32([0xff; 32]));
        assert_eq!(&k[..9], b"cycle:tx:");
        assert_eq!(&k[9..], "ff".repeat(32).as_bytes());
    }
}
