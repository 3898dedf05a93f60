//! Configuration loading: TOML file plus environment overrides.

use anyhow::Context;
use crosslink_types::config::NodeConfig;
use std::path::Path;

/// Reads the config file and applies environment overrides.
pub fn load(path: &Path) -> anyhow::Result<NodeConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let mut cfg = NodeConfig::from_toml(&text).map_err(anyhow::Error::msg)?;
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

/// Secrets and per-deployment endpoints can come from the environment so
/// the config file stays checked-in safe.
fn apply_env_overrides(cfg: &mut NodeConfig) {
    if let Ok(v) = std::env::var("CROSSLINK_TARGET_RPC_URL") {
        cfg.target_chain.rpc_url = v;
    }
    if let Ok(v) = std::env::var("CROSSLINK_TARGET_SIGNER_KEY") {
        cfg.target_chain.signer_key = v;
    }
    if let Ok(v) = std::env::var("CROSSLINK_SOURCE_DIRECTORY_URL") {
        cfg.source_chain.directory_url = v;
    }
    if let Ok(v) = std::env::var("CROSSLINK_CONSENSUS_URL") {
        cfg.source_chain.consensus_url = v;
    }
    if let Ok(v) = std::env::var("CROSSLINK_CONFIRMATIONS") {
        if let Ok(n) = v.parse() {
            cfg.confirmations = n;
        }
    }
    if let Ok(v) = std::env::var("CROSSLINK_WRITEBACK_ENABLED") {
        cfg.writeback_enabled = matches!(v.as_str(), "1" | "true" | "yes");
    }
}
