//! # Crosslink Telemetry
//!
//! Observability infrastructure: structured logging initialization and the
//! Prometheus metrics sinks that decouple instrumentation from the backend.
#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::indexing_slicing
    )
)]

/// The initialization routine for global structured logging.
pub mod init;
/// The concrete implementation of the metrics sinks using `prometheus`.
pub mod prometheus;
/// Abstract traits that define the contract for metrics reporting.
pub mod sinks;

pub use sinks::{cycle_metrics, rpc_metrics};
