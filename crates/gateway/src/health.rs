//! Component health aggregation.
//!
//! Core components (source, target, consensus) gate the overall status:
//! any of them down is a hard error. Non-critical components (store, batch,
//! proof-cycle) only degrade it.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::RwLock;

/// Components whose failure takes the service down.
const CRITICAL: &[&str] = &["source", "target", "consensus"];

/// One component's reported state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "detail")]
pub enum ComponentState {
    Ok,
    Degraded(String),
    Down(String),
}

/// The aggregate service level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthLevel {
    Ok,
    Degraded,
    Error,
}

/// Registry the probes and components report into.
#[derive(Default)]
pub struct HealthRegistry {
    components: RwLock<BTreeMap<String, ComponentState>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, component: &str, state: ComponentState) {
        if let Ok(mut map) = self.components.write() {
            map.insert(component.to_string(), state);
        }
    }

    /// The aggregate level plus the per-component detail.
    pub fn aggregate(&self) -> (HealthLevel, BTreeMap<String, ComponentState>) {
        let map = match self.components.read() {
            Ok(map) => map.clone(),
            Err(_) => return (HealthLevel::Error, BTreeMap::new()),
        };

        let mut level = HealthLevel::Ok;
        for (name, state) in &map {
            let critical = CRITICAL.contains(&name.as_str());
            match state {
                ComponentState::Ok => {}
                ComponentState::Down(_) if critical => return (HealthLevel::Error, map.clone()),
                ComponentState::Down(_) | ComponentState::Degraded(_) => {
                    level = HealthLevel::Degraded;
                }
            }
        }
        (level, map)
    }
}
