//! The Crosslink validator node.
//!
//! Wires the proof pipeline together: ledger store, key manager, source and
//! target clients, batching lanes, attestation cohort, orchestrator, event
//! watcher, and the HTTP control surface. A single watch channel carries
//! shutdown to every task.

mod config;
mod probe;

use anyhow::Context;
use clap::Parser;
use crosslink_api::intent::IntentSource;
use crosslink_api::peers::AttestationPeer;
use crosslink_crypto::KeyManager;
use crosslink_engine::peers::HttpPeer;
use crosslink_engine::{AttestationCollector, BatchEngine};
use crosslink_gateway::health::HealthRegistry;
use crosslink_gateway::GatewayContext;
use crosslink_source::SourceClient;
use crosslink_storage::{LedgerStore, RedbKv};
use crosslink_validator::discovery::IntentDiscovery;
use crosslink_validator::orchestration::ProofIndex;
use crosslink_validator::{CycleContext, Orchestrator};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "crosslink", about = "Independent validator anchoring a sharded ledger onto EVM chains")]
struct Cli {
    /// Path of the TOML configuration file.
    #[arg(long, env = "CROSSLINK_CONFIG", default_value = "crosslink.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    crosslink_telemetry::init::init_tracing()?;
    crosslink_telemetry::prometheus::install();
    crosslink_telemetry::sinks::install(
        &crosslink_telemetry::prometheus::PrometheusSink,
        &crosslink_telemetry::prometheus::PrometheusSink,
    );

    let cli = Cli::parse();
    let cfg = config::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    info!(validator = %cfg.validator_id, "starting crosslink validator");

    // Durable state and keys.
    let kv = RedbKv::open(&cfg.store_path)
        .with_context(|| format!("opening store {}", cfg.store_path.display()))?;
    let store = LedgerStore::new(Arc::new(kv));
    let key_manager = Arc::new(KeyManager::load_or_generate(&cfg.keys_dir)?);

    // Chain clients.
    let source = Arc::new(SourceClient::new(&cfg.source_chain));
    let evm = crosslink_evm::connect(&cfg.target_chain)?;
    let watcher_start = match evm.latest_block().await {
        Ok(n) => n,
        Err(e) => {
            warn!(error = %e, "target chain head unavailable at startup; watching from 0");
            0
        }
    };
    let watcher = evm.watcher(15, watcher_start);
    let target = Arc::new(evm);

    // Attestation cohort.
    let peer_timeout = Duration::from_secs(cfg.attestation.peer_timeout_secs);
    let peers: Vec<Arc<dyn AttestationPeer>> = cfg
        .attestation
        .peers
        .iter()
        .map(|p| Arc::new(HttpPeer::new(p, peer_timeout)) as Arc<dyn AttestationPeer>)
        .collect();
    let collector = Arc::new(AttestationCollector::new(
        Arc::clone(&key_manager),
        cfg.validator_id.clone(),
        cfg.attestation.own_weight,
        peers,
        peer_timeout,
        Duration::from_secs(cfg.attestation.round_timeout_secs),
    ));

    let batcher = Arc::new(BatchEngine::new(cfg.batching.clone()));
    let proofs = Arc::new(ProofIndex::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let ctx = Arc::new(CycleContext {
        source: source.clone(),
        target: target.clone(),
        store: store.clone(),
        batcher: Arc::clone(&batcher),
        collector,
        attn_tx: CycleContext::attestation_channel(),
        source_chain_label: cfg.source_chain.label.clone(),
        validator_public_key: key_manager.public_key().to_bytes().to_vec(),
        proofs: Arc::clone(&proofs),
        confirmations_required: cfg.confirmations,
        writeback_enabled: cfg.writeback_enabled,
    });

    // Background tasks.
    let orchestrator = Orchestrator::new(Arc::clone(&ctx));
    let _driver = orchestrator.spawn_batch_driver(shutdown_rx.clone());
    let _lanes = Arc::clone(&batcher).run(shutdown_rx.clone());

    let (intake_tx, intake_rx) = mpsc::channel(256);
    let intent_source: Arc<dyn IntentSource> = source.clone();
    let _discovery = IntentDiscovery::new(
        intent_source,
        source.clone(),
        store.clone(),
        Duration::from_secs(5),
    )
    .spawn(intake_tx, shutdown_rx.clone());

    let (_watcher_task, mut events) = watcher.spawn(shutdown_rx.clone());
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                crosslink_evm::AnchorEvent::VerificationFailed { bundle_id, reason } => {
                    error!(target: "evm-watcher", bundle = %bundle_id, reason, "on-chain proof verification failed");
                }
                other => info!(target: "evm-watcher", ?other, "anchor event"),
            }
        }
    });

    let health = Arc::new(HealthRegistry::new());
    let _probe = probe::spawn_health_probe(
        Arc::clone(&health),
        source.clone(),
        target.clone(),
        store.clone(),
        shutdown_rx.clone(),
    );

    let gateway_ctx = Arc::new(GatewayContext {
        batcher,
        store,
        key_manager,
        proofs,
        health,
        validator_id: cfg.validator_id.clone(),
    });
    let gateway_cfg = cfg.gateway.clone();
    let gateway_shutdown = shutdown_rx.clone();
    let gateway = tokio::spawn(async move {
        if let Err(e) = crosslink_gateway::run_server(gateway_cfg, gateway_ctx, gateway_shutdown).await
        {
            error!(target: "gateway", error = %e, "gateway exited");
        }
    });

    // Run the orchestrator until SIGINT.
    tokio::select! {
        _ = orchestrator.run(intake_rx, shutdown_rx.clone()) => {
            warn!("orchestrator intake closed");
        }
        _ = signal::ctrl_c() => {
            info!("interrupt received; shutting down");
        }
    }

    let _ = shutdown_tx.send(true);
    let _ = tokio::time::timeout(Duration::from_secs(5), gateway).await;
    info!("shutdown complete");
    Ok(())
}
