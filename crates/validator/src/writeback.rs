//! Post-confirmation ledger write-back.

use crosslink_storage::LedgerStore;
use crosslink_types::batch::Anchor;
use crosslink_types::error::StoreError;
use crosslink_types::ledger::{AnchorTargetState, SystemLedgerBlockMeta};
use crosslink_types::Hash32;
use tracing::info;

/// Records a confirmed anchor in the anchor and system ledgers.
pub fn record_confirmed_anchor(
    store: &LedgerStore,
    anchor: &Anchor,
    target_tx: &Hash32,
    confirmations: u64,
    consensus_height: u64,
    now: u64,
) -> Result<(), StoreError> {
    let previous = match store.anchor_target(&anchor.target_chain) {
        Ok(state) => Some(state),
        Err(StoreError::NotFound) => None,
        Err(e) => return Err(e),
    };
    let (received, delivered) = previous
        .map(|p| (p.received + 1, p.delivered + 1))
        .unwrap_or((1, 1));

    store.save_anchor_target(&AnchorTargetState {
        target_url: anchor.target_chain.clone(),
        received,
        delivered,
        last_anchor_height: anchor.source_block_height,
        last_anchor_tx_id: Some(*target_tx),
        last_anchor_time: now,
    })?;

    store.save_block(&SystemLedgerBlockMeta {
        height: consensus_height,
        hash: anchor.merkle_root,
        time: now,
        source_anchor_ref: Some(anchor.bundle_id),
    })?;

    info!(
        target: "storage",
        bundle = %anchor.bundle_id,
        target = %anchor.target_chain,
        confirmations,
        "anchor written back"
    );
    Ok(())
}
