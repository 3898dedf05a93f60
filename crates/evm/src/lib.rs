//! # Crosslink EVM
//!
//! The target-chain client: the three-step anchoring surface against the
//! anchor-registry contract, plus the receipt/confirmation reads and the
//! on-chain event watcher.
#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::indexing_slicing
    )
)]

mod contract;
/// Polling watcher over the anchor-registry events.
pub mod watcher;

use alloy::network::EthereumWallet;
use alloy::primitives::{Address, Bytes, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::signers::local::PrivateKeySigner;
use alloy::transports::http::{Client, Http};
use async_trait::async_trait;
use contract::AnchorRegistry;
use crosslink_api::target::{AnchorStatus, ComprehensiveProof, TargetChain};
use crosslink_types::batch::Anchor;
use crosslink_types::config::TargetChainConfig;
use crosslink_types::error::TargetError;
use crosslink_types::Hash32;
use tracing::{debug, info};

pub use watcher::{AnchorEvent, EventWatcher};

fn map_contract_err(e: alloy::contract::Error) -> TargetError {
    let text = e.to_string();
    if text.contains("revert") {
        TargetError::Reverted(text)
    } else {
        TargetError::Rpc(text)
    }
}

fn map_transport_err<E: std::fmt::Display>(e: E) -> TargetError {
    TargetError::Rpc(e.to_string())
}

/// The anchor-registry client over an HTTP provider.
pub struct EvmTargetChain<P> {
    contract: AnchorRegistry::AnchorRegistryInstance<Http<Client>, P>,
    provider: P,
    label: String,
}

/// Connects a signing provider to the configured registry contract.
pub fn connect(
    config: &TargetChainConfig,
) -> Result<EvmTargetChain<impl Provider<Http<Client>> + Clone + 'static>, TargetError> {
    let signer: PrivateKeySigner = config
        .signer_key
        .trim_start_matches("0x")
        .parse()
        .map_err(|e| TargetError::Encode(format!("signer key: {}", e)))?;
    let wallet = EthereumWallet::from(signer);
    let url = config
        .rpc_url
        .parse()
        .map_err(|e| TargetError::Encode(format!("rpc url: {}", e)))?;
    let address: Address = config
        .contract
        .parse()
        .map_err(|e| TargetError::Encode(format!("contract address: {}", e)))?;

    let provider = ProviderBuilder::new()
        .with_recommended_fillers()
        .wallet(wallet)
        .on_http(url);
    let contract = AnchorRegistry::new(address, provider.clone());
    info!(
        target: "evm",
        contract = %address,
        chain_id = config.chain_id,
        "connected to anchor registry"
    );
    Ok(EvmTargetChain {
        contract,
        provider,
        label: config.label.clone(),
    })
}

impl<P: Provider<Http<Client>> + Clone + 'static> EvmTargetChain<P> {
    /// A watcher over this contract's events.
    pub fn watcher(&self, poll_interval_secs: u64, start_block: u64) -> EventWatcher<P> {
        EventWatcher::new(self.contract.clone(), poll_interval_secs, start_block)
    }

    /// The chain head, used to seat the event watcher at startup.
    pub async fn latest_block(&self) -> Result<u64, TargetError> {
        self.provider
            .get_block_number()
            .await
            .map_err(map_transport_err)
    }
}

#[async_trait]
impl<P: Provider<Http<Client>> + Clone + 'static> TargetChain for EvmTargetChain<P> {
    async fn create_anchor(&self, anchor: &Anchor) -> Result<Hash32, TargetError> {
        let call = self.contract.createAnchor(
            contract::b256(&anchor.bundle_id),
            contract::b256(&anchor.operation_commitment),
            contract::b256(&anchor.cross_chain_commitment),
            contract::b256(&anchor.governance_root),
            anchor.source_block_height,
        );
        let pending = call.send().await.map_err(map_contract_err)?;
        let tx = pending.watch().await.map_err(map_transport_err)?;
        debug!(target: "evm", bundle = %anchor.bundle_id, tx = %tx, "anchor created");
        Ok(contract::hash32(&tx))
    }

    async fn execute_comprehensive_proof(
        &self,
        bundle_id: &Hash32,
        proof: &ComprehensiveProof,
    ) -> Result<Hash32, TargetError> {
        let call = self
            .contract
            .executeComprehensiveProof(contract::b256(bundle_id), contract::proof_to_sol(proof));
        let pending = call.send().await.map_err(map_contract_err)?;
        let tx = pending.watch().await.map_err(map_transport_err)?;
        debug!(target: "evm", bundle = %bundle_id, tx = %tx, "comprehensive proof executed");
        Ok(contract::hash32(&tx))
    }

    async fn execute_with_governance(
        &self,
        bundle_id: &Hash32,
        target: &[u8; 20],
        value: u128,
        calldata: &[u8],
    ) -> Result<Hash32, TargetError> {
        let call = self.contract.executeWithGovernance(
            contract::b256(bundle_id),
            Address::from(*target),
            U256::from(value),
            Bytes::copy_from_slice(calldata),
        );
        let pending = call.send().await.map_err(map_contract_err)?;
        let tx = pending.watch().await.map_err(map_transport_err)?;
        debug!(target: "evm", bundle = %bundle_id, tx = %tx, "governance step executed");
        Ok(contract::hash32(&tx))
    }

    async fn anchor_status(&self, bundle_id: &Hash32) -> Result<AnchorStatus, TargetError> {
        let exists = self
            .contract
            .anchorExists(contract::b256(bundle_id))
            .call()
            .await
            .map_err(map_contract_err)?
            ._0;
        if !exists {
            return Ok(AnchorStatus::default());
        }
        let proof_executed = self
            .contract
            .proofExecuted(contract::b256(bundle_id))
            .call()
            .await
            .map_err(map_contract_err)?
            ._0;
        let governance_executed = self
            .contract
            .governanceExecuted(contract::b256(bundle_id))
            .call()
            .await
            .map_err(map_contract_err)?
            ._0;
        Ok(AnchorStatus {
            exists,
            proof_executed,
            governance_executed,
        })
    }

    async fn confirmations(&self, tx_hash: &Hash32) -> Result<u64, TargetError> {
        let receipt = self
            .provider
            .get_transaction_receipt(contract::b256(tx_hash))
            .await
            .map_err(map_transport_err)?;
        let Some(receipt) = receipt else {
            return Ok(0);
        };
        let Some(block) = receipt.block_number else {
            return Ok(0);
        };
        let latest = self
            .provider
            .get_block_number()
            .await
            .map_err(map_transport_err)?;
        Ok(latest.saturating_sub(block) + 1)
    }

    fn chain_label(&self) -> &str {
        &self.label
    }
}
