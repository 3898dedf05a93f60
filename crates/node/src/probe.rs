//! Periodic connectivity probes feeding the health registry.

use crosslink_api::source::SourceLedger;
use crosslink_api::target::TargetChain;
use crosslink_gateway::health::{ComponentState, HealthRegistry};
use crosslink_storage::LedgerStore;
use crosslink_types::error::StoreError;
use crosslink_types::Hash32;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

const PROBE_INTERVAL: Duration = Duration::from_secs(30);

pub fn spawn_health_probe(
    health: Arc<HealthRegistry>,
    source: Arc<dyn SourceLedger>,
    target: Arc<dyn TargetChain>,
    store: LedgerStore,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = interval(PROBE_INTERVAL);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return;
                    }
                }
                _ = tick.tick() => {}
            }

            match source.consensus_status().await {
                Ok(status) if status.catching_up => {
                    health.set("source", ComponentState::Ok);
                    health.set(
                        "consensus",
                        ComponentState::Degraded("catching up".into()),
                    );
                }
                Ok(_) => {
                    health.set("source", ComponentState::Ok);
                    health.set("consensus", ComponentState::Ok);
                }
                Err(e) => {
                    health.set("source", ComponentState::Down(e.to_string()));
                    health.set("consensus", ComponentState::Down(e.to_string()));
                }
            }

            match target.anchor_status(&Hash32::ZERO).await {
                Ok(_) => health.set("target", ComponentState::Ok),
                Err(e) => health.set("target", ComponentState::Down(e.to_string())),
            }

            match store.system_meta() {
                Ok(_) | Err(StoreError::NotFound) => health.set("store", ComponentState::Ok),
                Err(e) => health.set("store", ComponentState::Down(e.to_string())),
            }

            // The orchestrator is in-process; reaching this probe means the
            // runtime is alive.
            health.set("proof-cycle", ComponentState::Ok);
            health.set("batch", ComponentState::Ok);
        }
    })
}
