//! The Prometheus implementation of the metrics sinks.

use crate::sinks::{CycleMetricsSink, RpcMetricsSink};
use once_cell::sync::OnceCell;
use prometheus::{
    exponential_buckets, register_histogram, register_histogram_vec, register_int_counter,
    register_int_counter_vec, Histogram, HistogramVec, IntCounter, IntCounterVec,
};

static CYCLES_STARTED_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static CYCLES_COMPLETED_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static CYCLE_DURATION_SECONDS: OnceCell<Histogram> = OnceCell::new();
static BATCHES_CLOSED_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static BATCH_ALERTS_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static ATTESTATION_ROUNDS_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static ANCHORS_CREATED_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static ANCHORS_CONFIRMED_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static RPC_REQUESTS_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static RPC_REQUEST_DURATION_SECONDS: OnceCell<HistogramVec> = OnceCell::new();

/// Registers every collector. Must run before the sinks are first used;
/// panicking here is intentional because it indicates broken startup
/// wiring, not a runtime condition.
pub fn install() {
    let _ = CYCLES_STARTED_TOTAL.set(
        register_int_counter!(
            "crosslink_cycles_started_total",
            "Proof cycles started"
        )
        .expect("register"),
    );
    let _ = CYCLES_COMPLETED_TOTAL.set(
        register_int_counter_vec!(
            "crosslink_cycles_completed_total",
            "Proof cycles reaching a terminal state",
            &["state"]
        )
        .expect("register"),
    );
    let _ = CYCLE_DURATION_SECONDS.set(
        register_histogram!(
            "crosslink_cycle_duration_seconds",
            "Wall-clock duration of completed proof cycles",
            exponential_buckets(0.5, 2.0, 12).expect("buckets")
        )
        .expect("register"),
    );
    let _ = BATCHES_CLOSED_TOTAL.set(
        register_int_counter_vec!(
            "crosslink_batches_closed_total",
            "Batches closed, by lane",
            &["mode"]
        )
        .expect("register"),
    );
    let _ = BATCH_ALERTS_TOTAL.set(
        register_int_counter!(
            "crosslink_batch_alerts_total",
            "Cadence batches that exceeded their grace window"
        )
        .expect("register"),
    );
    let _ = ATTESTATION_ROUNDS_TOTAL.set(
        register_int_counter_vec!(
            "crosslink_attestation_rounds_total",
            "Attestation rounds, by outcome",
            &["outcome"]
        )
        .expect("register"),
    );
    let _ = ANCHORS_CREATED_TOTAL.set(
        register_int_counter!("crosslink_anchors_created_total", "Anchors created on target chains")
            .expect("register"),
    );
    let _ = ANCHORS_CONFIRMED_TOTAL.set(
        register_int_counter!(
            "crosslink_anchors_confirmed_total",
            "Anchors that reached finality"
        )
        .expect("register"),
    );
    let _ = RPC_REQUESTS_TOTAL.set(
        register_int_counter_vec!(
            "crosslink_gateway_requests_total",
            "Gateway requests, by route and status",
            &["route", "status"]
        )
        .expect("register"),
    );
    let _ = RPC_REQUEST_DURATION_SECONDS.set(
        register_histogram_vec!(
            "crosslink_gateway_request_duration_seconds",
            "Gateway request latency",
            &["route"],
            exponential_buckets(0.001, 2.0, 15).expect("buckets")
        )
        .expect("register"),
    );
}

macro_rules! get_metric {
    ($metric:ident) => {
        $metric
            .get()
            .expect("telemetry::prometheus::install() must be called at startup")
    };
}

/// The Prometheus-backed sink.
#[derive(Debug, Clone, Copy)]
pub struct PrometheusSink;

impl CycleMetricsSink for PrometheusSink {
    fn inc_cycles_started(&self) {
        get_metric!(CYCLES_STARTED_TOTAL).inc();
    }
    fn inc_cycles_completed(&self, terminal_state: &str) {
        get_metric!(CYCLES_COMPLETED_TOTAL)
            .with_label_values(&[terminal_state])
            .inc();
    }
    fn observe_cycle_duration(&self, seconds: f64) {
        get_metric!(CYCLE_DURATION_SECONDS).observe(seconds);
    }
    fn inc_batches_closed(&self, mode: &str) {
        get_metric!(BATCHES_CLOSED_TOTAL)
            .with_label_values(&[mode])
            .inc();
    }
    fn inc_batch_alerts(&self) {
        get_metric!(BATCH_ALERTS_TOTAL).inc();
    }
    fn inc_attestation_rounds(&self, outcome: &str) {
        get_metric!(ATTESTATION_ROUNDS_TOTAL)
            .with_label_values(&[outcome])
            .inc();
    }
    fn inc_anchors_created(&self) {
        get_metric!(ANCHORS_CREATED_TOTAL).inc();
    }
    fn inc_anchors_confirmed(&self) {
        get_metric!(ANCHORS_CONFIRMED_TOTAL).inc();
    }
}

impl RpcMetricsSink for PrometheusSink {
    fn inc_requests_total(&self, route: &str, status_code: u16) {
        get_metric!(RPC_REQUESTS_TOTAL)
            .with_label_values(&[route, &status_code.to_string()])
            .inc();
    }
    fn observe_request_duration(&self, route: &str, seconds: f64) {
        get_metric!(RPC_REQUEST_DURATION_SECONDS)
            .with_label_values(&[route])
            .observe(seconds);
    }
}
