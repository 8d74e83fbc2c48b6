use crate::obs::sink::{JobFinish, MetricsEvent};
use parking_lot::Mutex;
use serde::Serialize;
use std::{
    sync::LazyLock,
    time::{SystemTime, UNIX_EPOCH},
};

///
/// EventState
///
/// Ephemeral, process-wide counters. Reset with `metrics_reset_all`.
///

#[derive(Clone, Debug, Default)]
pub(crate) struct EventState {
    pub(crate) jobs: JobCounters,
    pub(crate) catalog: CatalogCounters,
    pub(crate) statements: StatementCounters,
    pub(crate) since_ms: u64,
}

impl EventState {
    fn fresh() -> Self {
        Self {
            since_ms: now_millis(),
            ..Self::default()
        }
    }

    /// Fold one event into the counters.
    pub(crate) fn apply(&mut self, event: MetricsEvent) {
        match event {
            MetricsEvent::CatalogPublished {
                databases,
                collections,
                doc_parts,
                fields,
                scalar_tables,
            } => {
                let c = &mut self.catalog;
                c.commits = c.commits.saturating_add(1);
                c.databases = c.databases.saturating_add(databases);
                c.collections = c.collections.saturating_add(collections);
                c.doc_parts = c.doc_parts.saturating_add(doc_parts);
                c.fields = c.fields.saturating_add(fields);
                c.scalar_tables = c.scalar_tables.saturating_add(scalar_tables);
            }

            MetricsEvent::CatalogRetracted { entries } => {
                self.catalog.retractions = self.catalog.retractions.saturating_add(1);
                self.catalog.retracted_entries =
                    self.catalog.retracted_entries.saturating_add(entries);
            }

            MetricsEvent::CommitConflict => {
                self.jobs.conflicts = self.jobs.conflicts.saturating_add(1);
            }

            MetricsEvent::CommitRetry => {
                self.jobs.retries = self.jobs.retries.saturating_add(1);
            }

            MetricsEvent::JobFinished { finish } => match finish {
                JobFinish::Committed => {
                    self.jobs.committed = self.jobs.committed.saturating_add(1);
                }
                JobFinish::Aborted => {
                    self.jobs.aborted = self.jobs.aborted.saturating_add(1);
                }
            },

            MetricsEvent::JobSubmitted => {
                self.jobs.submitted = self.jobs.submitted.saturating_add(1);
            }

            MetricsEvent::StatementExecuted { ddl } => {
                if ddl {
                    self.statements.ddl = self.statements.ddl.saturating_add(1);
                } else {
                    self.statements.dml = self.statements.dml.saturating_add(1);
                }
            }
        }
    }

    pub(crate) fn report(&self) -> EventReport {
        EventReport {
            jobs: self.jobs.clone(),
            catalog: self.catalog.clone(),
            statements: self.statements.clone(),
            since_ms: self.since_ms,
        }
    }
}

///
/// JobCounters
///

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct JobCounters {
    pub submitted: u64,
    pub committed: u64,
    pub aborted: u64,
    pub conflicts: u64,
    pub retries: u64,
}

///
/// CatalogCounters
///

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct CatalogCounters {
    pub commits: u64,
    pub retractions: u64,
    pub retracted_entries: u64,

    // allocations published
    pub databases: u64,
    pub collections: u64,
    pub doc_parts: u64,
    pub fields: u64,
    pub scalar_tables: u64,
}

///
/// StatementCounters
///

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct StatementCounters {
    pub ddl: u64,
    pub dml: u64,
}

///
/// EventReport
/// Point-in-time copy of the counters.
///

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct EventReport {
    pub jobs: JobCounters,
    pub catalog: CatalogCounters,
    pub statements: StatementCounters,
    pub since_ms: u64,
}

static EVENT_STATE: LazyLock<Mutex<EventState>> = LazyLock::new(|| Mutex::new(EventState::fresh()));

pub(crate) fn with_state_mut<R>(f: impl FnOnce(&mut EventState) -> R) -> R {
    f(&mut EVENT_STATE.lock())
}

pub(crate) fn report() -> EventReport {
    EVENT_STATE.lock().report()
}

pub(crate) fn reset_all() {
    *EVENT_STATE.lock() = EventState::fresh();
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
}
