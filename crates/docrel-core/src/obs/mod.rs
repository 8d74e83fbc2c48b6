//! Observability: runtime counters and the sink boundary they flow through.
//!
//! Engine code never touches the counters directly; it records
//! [`MetricsEvent`]s and the sink decides where they go.

pub(crate) mod metrics;
pub(crate) mod sink;


// re-exports
pub use metrics::{CatalogCounters, EventReport, JobCounters, StatementCounters};
pub use sink::{
    JobFinish, MetricsEvent, MetricsSink, install_metrics_sink, metrics_report, metrics_reset_all,
};
