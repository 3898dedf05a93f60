//! Node configuration.
//!
//! Loaded from a TOML file with environment overrides applied by the node
//! binary. Defaults follow the operational values in the deployment runbook:
//! 12 confirmations, 15-minute cadence, 5-transaction on-demand cap.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Target-chain connection and signing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetChainConfig {
    /// JSON-RPC endpoint.
    pub rpc_url: String,
    pub chain_id: u64,
    /// Hex-encoded signing key for anchoring transactions.
    pub signer_key: String,
    /// Address of the anchor registry contract.
    pub contract: String,
    /// Label used in anchor records and metrics (e.g. `eip155:1`).
    #[serde(default = "default_target_label")]
    pub label: String,
}

fn default_target_label() -> String {
    "eip155:1".to_string()
}

/// Source-chain endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceChainConfig {
    /// The directory partition's API endpoint.
    pub directory_url: String,
    /// Per-partition API endpoints, keyed by partition label (e.g. `BVN1`).
    #[serde(default)]
    pub partitions: BTreeMap<String, String>,
    /// The BFT consensus layer's RPC endpoint.
    pub consensus_url: String,
    /// Per-query timeout in seconds.
    #[serde(default = "default_source_timeout")]
    pub query_timeout_secs: u64,
    /// Label used in commitments and metrics.
    #[serde(default = "default_source_label")]
    pub label: String,
}

fn default_source_timeout() -> u64 {
    30
}

fn default_source_label() -> String {
    "acme".to_string()
}

/// One attestation peer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerConfig {
    pub validator_id: String,
    pub endpoint: String,
    /// Voting weight. Threshold is `⌈2N/3⌉` of the weight sum.
    pub weight: u64,
}

/// Attestation round settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttestationConfig {
    pub peers: Vec<PeerConfig>,
    /// This validator's own voting weight.
    #[serde(default = "default_own_weight")]
    pub own_weight: u64,
    /// Per-peer request timeout in seconds.
    #[serde(default = "default_peer_timeout")]
    pub peer_timeout_secs: u64,
    /// Whole-round timeout in seconds.
    #[serde(default = "default_round_timeout")]
    pub round_timeout_secs: u64,
}

fn default_peer_timeout() -> u64 {
    30
}

fn default_own_weight() -> u64 {
    1
}

fn default_round_timeout() -> u64 {
    300
}

/// Batching lanes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchingConfig {
    /// On-cadence interval W in seconds.
    #[serde(default = "default_cadence")]
    pub cadence_secs: u64,
    /// Grace past the cadence before an alert is raised, in seconds.
    #[serde(default = "default_grace")]
    pub grace_secs: u64,
    /// Maximum transactions in an on-demand batch.
    #[serde(default = "default_on_demand_cap")]
    pub on_demand_cap: usize,
    /// Maximum wait before an on-demand batch closes, in seconds.
    #[serde(default = "default_on_demand_wait")]
    pub on_demand_max_wait_secs: u64,
}

fn default_cadence() -> u64 {
    900
}

fn default_grace() -> u64 {
    300
}

fn default_on_demand_cap() -> usize {
    5
}

fn default_on_demand_wait() -> u64 {
    30
}

impl Default for BatchingConfig {
    fn default() -> Self {
        BatchingConfig {
            cadence_secs: default_cadence(),
            grace_secs: default_grace(),
            on_demand_cap: default_on_demand_cap(),
            on_demand_max_wait_secs: default_on_demand_wait(),
        }
    }
}

/// HTTP control-surface settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_listen")]
    pub listen_addr: String,
    #[serde(default = "default_rps")]
    pub rps: u32,
    #[serde(default = "default_burst")]
    pub burst: u32,
    #[serde(default = "default_body_limit")]
    pub body_limit_kb: usize,
    #[serde(default)]
    pub trusted_proxies: Vec<String>,
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_rps() -> u32 {
    50
}

fn default_burst() -> u32 {
    100
}

fn default_body_limit() -> usize {
    256
}

impl Default for GatewayConfig {
    fn default() -> Self {
        GatewayConfig {
            listen_addr: default_listen(),
            rps: default_rps(),
            burst: default_burst(),
            body_limit_kb: default_body_limit(),
            trusted_proxies: Vec::new(),
        }
    }
}

/// Top-level node configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub target_chain: TargetChainConfig,
    pub source_chain: SourceChainConfig,
    pub attestation: AttestationConfig,
    #[serde(default)]
    pub batching: BatchingConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    /// Directory holding the validator's BLS key material.
    pub keys_dir: PathBuf,
    /// Path of the ledger-store database file.
    pub store_path: PathBuf,
    /// Confirmations required before an anchor is final.
    #[serde(default = "default_confirmations")]
    pub confirmations: u64,
    /// This validator's id as presented to peers.
    pub validator_id: String,
    /// Enables the post-confirmation ledger write-back.
    #[serde(default)]
    pub writeback_enabled: bool,
}

fn default_confirmations() -> u64 {
    12
}

impl NodeConfig {
    /// Parses a TOML document into a config, without environment overrides.
    pub fn from_toml(text: &str) -> Result<Self, String> {
        toml::from_str(text).map_err(|e| format!("config parse failed: {}", e))
    }
}
