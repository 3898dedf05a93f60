//! The typed ledger-store layer.
//!
//! A `LedgerStore` wraps a [`KvStore`] with the byte-exact key layout and
//! the canonical codec. The store is a single-writer resource: mutation
//! happens only from the consensus-commit path, readers take immutable
//! snapshots of decoded records. Missing metadata is a first-class
//! [`StoreError::NotFound`], never a nil return.

use crosslink_api::storage::KvStore;
use crosslink_types::codec;
use crosslink_types::error::StoreError;
use crosslink_types::hash::be64;
use crosslink_types::keys;
use crosslink_types::ledger::{
    AnchorLedgerMeta, AnchorTargetState, ConsensusAppState, CycleMarker, SystemLedgerBlockMeta,
    SystemLedgerMeta,
};
use crosslink_types::Hash32;
use parity_scale_codec::{Decode, Encode};
use std::sync::Arc;
use tracing::debug;

/// Typed view over the key-value store.
#[derive(Clone)]
pub struct LedgerStore {
    kv: Arc<dyn KvStore>,
}

impl LedgerStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        LedgerStore { kv }
    }

    fn put<T: Encode>(&self, key: &[u8], value: &T) -> Result<(), StoreError> {
        let bytes = codec::to_bytes_canonical(value).map_err(StoreError::Encode)?;
        self.kv.set(key, &bytes)
    }

    fn read<T: Decode>(&self, key: &[u8]) -> Result<T, StoreError> {
        let bytes = self.kv.get(key)?.ok_or(StoreError::NotFound)?;
        codec::from_bytes_canonical(&bytes).map_err(StoreError::Decode)
    }

    fn read_opt<T: Decode>(&self, key: &[u8]) -> Result<Option<T>, StoreError> {
        match self.kv.get(key)? {
            Some(bytes) => codec::from_bytes_canonical(&bytes)
                .map(Some)
                .map_err(StoreError::Decode),
            None => Ok(None),
        }
    }

    // --- system ledger ---

    pub fn system_meta(&self) -> Result<SystemLedgerMeta, StoreError> {
        self.read(keys::SYSLEDGER_META)
    }

    pub fn save_system_meta(&self, meta: &SystemLedgerMeta) -> Result<(), StoreError> {
        self.put(keys::SYSLEDGER_META, meta)
    }

    pub fn latest_block(&self) -> Result<SystemLedgerBlockMeta, StoreError> {
        self.read(keys::SYSLEDGER_LATEST_BLOCK)
    }

    pub fn block_by_height(&self, height: u64) -> Result<SystemLedgerBlockMeta, StoreError> {
        self.read(&keys::sysledger_block(height))
    }

    /// Writes a block record and rolls the latest pointer and meta forward.
    pub fn save_block(&self, block: &SystemLedgerBlockMeta) -> Result<(), StoreError> {
        self.put(&keys::sysledger_block(block.height), block)?;
        self.put(keys::SYSLEDGER_LATEST_BLOCK, block)?;
        let mut meta = self.read_opt::<SystemLedgerMeta>(keys::SYSLEDGER_META)?.unwrap_or_default();
        meta.block_count += 1;
        meta.latest_height = block.height;
        self.put(keys::SYSLEDGER_META, &meta)?;
        debug!(target: "storage", height = block.height, "system ledger block saved");
        Ok(())
    }

    // --- anchor ledger ---

    pub fn anchor_meta(&self) -> Result<AnchorLedgerMeta, StoreError> {
        self.read(keys::ANCHORLEDGER_META)
    }

    pub fn anchor_target(&self, target_url: &str) -> Result<AnchorTargetState, StoreError> {
        self.read(&keys::anchorledger_target(target_url))
    }

    /// Writes a target state and keeps the anchor-ledger meta consistent.
    pub fn save_anchor_target(&self, state: &AnchorTargetState) -> Result<(), StoreError> {
        let known = self
            .read_opt::<AnchorTargetState>(&keys::anchorledger_target(&state.target_url))?
            .is_some();
        self.put(&keys::anchorledger_target(&state.target_url), state)?;
        let mut meta = self
            .read_opt::<AnchorLedgerMeta>(keys::ANCHORLEDGER_META)?
            .unwrap_or_default();
        if !known {
            meta.target_count += 1;
        }
        meta.anchors_delivered = meta.anchors_delivered.max(state.delivered);
        self.put(keys::ANCHORLEDGER_META, &meta)
    }

    // --- intent cursor ---

    pub fn intent_cursor(&self) -> Result<Option<u64>, StoreError> {
        match self.kv.get(keys::INTENT_LAST_BLOCK)? {
            Some(bytes) => {
                let arr: [u8; 8] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| StoreError::Decode("intent cursor is not be64".into()))?;
                Ok(Some(u64::from_be_bytes(arr)))
            }
            None => Ok(None),
        }
    }

    pub fn save_intent_cursor(&self, height: u64) -> Result<(), StoreError> {
        self.kv.set(keys::INTENT_LAST_BLOCK, &be64(height))
    }

    // --- consensus app state ---

    /// Reads the consensus application state.
    pub fn abci_state(&self) -> Result<ConsensusAppState, StoreError> {
        self.read(keys::ABCI_STATE)
    }

    /// Persists the consensus application state.
    ///
    /// Must be called from inside the consensus commit; its durability is a
    /// precondition for acknowledging the commit upstream.
    pub fn save_abci_state(&self, state: &ConsensusAppState) -> Result<(), StoreError> {
        self.put(keys::ABCI_STATE, state)
    }

    // --- cycle markers ---

    pub fn cycle_marker(&self, tx_hash: &Hash32) -> Result<Option<CycleMarker>, StoreError> {
        self.read_opt(&keys::cycle_tx(tx_hash))
    }

    pub fn save_cycle_marker(
        &self,
        tx_hash: &Hash32,
        marker: &CycleMarker,
    ) -> Result<(), StoreError> {
        self.put(&keys::cycle_tx(tx_hash), marker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKv;
    use crosslink_types::ledger::CycleState;

    fn store() -> LedgerStore {
        LedgerStore::new(Arc::new(MemoryKv::new()))
    }

    #[test]
    fn missing_meta_is_not_found() {
        let s = store();
        assert!(matches!(s.system_meta(), Err(StoreError::NotFound)));
        assert!(matches!(s.anchor_meta(), Err(StoreError::NotFound)));
        assert!(matches!(s.abci_state(), Err(StoreError::NotFound)));
        assert!(matches!(s.latest_block(), Err(StoreError::NotFound)));
    }

    #[test]
    fn abci_state_round_trip() {
        let s = store();
        let st = ConsensusAppState {
            last_block_height: 10,
            last_block_app_hash: Hash32([9u8; 32]),
        };
        s.save_abci_state(&st).unwrap();
        assert_eq!(s.abci_state().unwrap(), st);
    }

    #[test]
    fn block_save_rolls_latest_and_meta() {
        let s = store();
        for h in 1..=3u64 {
            s.save_block(&SystemLedgerBlockMeta {
                height: h,
                hash: Hash32([h as u8; 32]),
                time: 1_700_000_000 + h,
                source_anchor_ref: None,
            })
            .unwrap();
        }
        assert_eq!(s.latest_block().unwrap().height, 3);
        assert_eq!(s.block_by_height(2).unwrap().hash, Hash32([2u8; 32]));
        let meta = s.system_meta().unwrap();
        assert_eq!(meta.block_count, 3);
        assert_eq!(meta.latest_height, 3);
    }

    #[test]
    fn intent_cursor_is_be64() {
        let s = store();
        assert_eq!(s.intent_cursor().unwrap(), None);
        s.save_intent_cursor(0x0102030405060708).unwrap();
        assert_eq!(s.intent_cursor().unwrap(), Some(0x0102030405060708));
    }

    #[test]
    fn anchor_target_counts_distinct_targets_once() {
        let s = store();
        let mut st = AnchorTargetState {
            target_url: "eip155:1".into(),
            received: 1,
            delivered: 0,
            last_anchor_height: 0,
            last_anchor_tx_id: None,
            last_anchor_time: 0,
        };
        s.save_anchor_target(&st).unwrap();
        st.delivered = 1;
        s.save_anchor_target(&st).unwrap();
        let meta = s.anchor_meta().unwrap();
        assert_eq!(meta.target_count, 1);
        assert_eq!(meta.anchors_delivered, 1);
    }

    #[test]
    fn cycle_marker_round_trip() {
        let s = store();
        let tx = Hash32([3u8; 32]);
        assert_eq!(s.cycle_marker(&tx).unwrap(), None);
        let marker = CycleMarker {
            state: CycleState::Suspended,
            reason: None,
            bundle_id: Some(Hash32([4u8; 32])),
            updated_at: 1_700_000_000,
        };
        s.save_cycle_marker(&tx, &marker).unwrap();
        assert_eq!(s.cycle_marker(&tx).unwrap(), Some(marker));
    }
}
