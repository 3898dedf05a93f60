//! Abstract metrics sinks.
//!
//! Components report through these traits; the process installs a concrete
//! backend once at startup. The default is a no-op, so library code and
//! tests never need metrics wiring.

use once_cell::sync::OnceCell;

/// Proof-cycle instrumentation.
pub trait CycleMetricsSink: Send + Sync {
    fn inc_cycles_started(&self) {}
    fn inc_cycles_completed(&self, _terminal_state: &str) {}
    fn observe_cycle_duration(&self, _seconds: f64) {}
    fn inc_batches_closed(&self, _mode: &str) {}
    fn inc_batch_alerts(&self) {}
    fn inc_attestation_rounds(&self, _outcome: &str) {}
    fn inc_anchors_created(&self) {}
    fn inc_anchors_confirmed(&self) {}
}

/// Control-surface instrumentation.
pub trait RpcMetricsSink: Send + Sync {
    fn inc_requests_total(&self, _route: &str, _status_code: u16) {}
    fn observe_request_duration(&self, _route: &str, _seconds: f64) {}
}

struct NoopSink;

impl CycleMetricsSink for NoopSink {}
impl RpcMetricsSink for NoopSink {}

static CYCLE_SINK: OnceCell<&'static dyn CycleMetricsSink> = OnceCell::new();
static RPC_SINK: OnceCell<&'static dyn RpcMetricsSink> = OnceCell::new();

/// Installs the process-wide sinks. Later calls are ignored.
pub fn install(cycle: &'static dyn CycleMetricsSink, rpc: &'static dyn RpcMetricsSink) {
    let _ = CYCLE_SINK.set(cycle);
    let _ = RPC_SINK.set(rpc);
}

/// The proof-cycle sink (no-op until installed).
pub fn cycle_metrics() -> &'static dyn CycleMetricsSink {
    *CYCLE_SINK.get_or_init(|| &NoopSink)
}

/// The control-surface sink (no-op until installed).
pub fn rpc_metrics() -> &'static dyn RpcMetricsSink {
    *RPC_SINK.get_or_init(|| &NoopSink)
}
