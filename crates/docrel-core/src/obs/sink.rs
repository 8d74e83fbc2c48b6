//! Metrics sink boundary.
//!
//! All instrumentation flows through `MetricsEvent` and `record`. Events
//! always land in the process-wide counters; an installed external sink
//! additionally receives every event.

use crate::obs::metrics;
use parking_lot::RwLock;
use std::sync::Arc;

static EXTERNAL_SINK: RwLock<Option<Arc<dyn MetricsSink>>> = RwLock::new(None);

///
/// JobFinish
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum JobFinish {
    Committed,
    Aborted,
}

///
/// MetricsEvent
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[remain::sorted]
pub enum MetricsEvent {
    CatalogPublished {
        databases: u64,
        collections: u64,
        doc_parts: u64,
        fields: u64,
        scalar_tables: u64,
    },
    CatalogRetracted {
        entries: u64,
    },
    CommitConflict,
    CommitRetry,
    JobFinished {
        finish: JobFinish,
    },
    JobSubmitted,
    StatementExecuted {
        ddl: bool,
    },
}

///
/// MetricsSink
///

pub trait MetricsSink: Send + Sync {
    fn record(&self, event: MetricsEvent);
}

pub(crate) fn record(event: MetricsEvent) {
    metrics::with_state_mut(|state| state.apply(event));

    if let Some(sink) = EXTERNAL_SINK.read().as_ref() {
        sink.record(event);
    }
}

/// Forward every future event to `sink` as well, replacing any sink
/// installed before. `None` uninstalls.
pub fn install_metrics_sink(sink: Option<Arc<dyn MetricsSink>>) {
    *EXTERNAL_SINK.write() = sink;
}

/// Snapshot the current counters.
#[must_use]
pub fn metrics_report() -> metrics::EventReport {
    metrics::report()
}

/// Reset all counters.
pub fn metrics_reset_all() {
    metrics::reset_all();
}
