//! Telemetry
//!
//! Metrics for refresh episodes and replays. Log events go through the
//! `tracing` macros at the call sites.

pub mod metrics;

pub use metrics::{
    create_in_memory_metrics, no_op_metrics, AuthMetrics, InMemoryMetrics, MetricEntry,
    MetricLabels, NoOpMetrics,
};
