//! Observability: in-memory dispatch telemetry and sink abstractions.
//!
//! This module never affects dispatch semantics; hooks cannot observe it.

pub(crate) mod metrics;
pub(crate) mod sink;

pub use metrics::{EntityCounters, EventOps, EventReport};
pub use sink::{MetricsEvent, MetricsSink, metrics_report, metrics_reset_all, with_sink_override};
