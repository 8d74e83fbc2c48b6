use crate::{error::InternalError, value::Document};
use derive_more::Display;
use parking_lot::Mutex;
use std::{
    fmt,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Receiver, Sender, TryRecvError},
    },
};
use tracing::warn;

/// Result reported for every job, exactly once.
pub type JobOutcome = Result<JobOutput, InternalError>;

///
/// JobId
///

#[derive(Clone, Copy, Debug, Display, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[display("job-{_0}")]
pub struct JobId(u64);

impl JobId {
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

///
/// JobOp
///
/// What a job does. Every variant runs in one backend transaction.
///

#[derive(Clone, Debug, PartialEq)]
pub enum JobOp {
    Insert {
        database: String,
        collection: String,
        documents: Vec<Document>,
    },
    CreateCollection {
        database: String,
        collection: String,
    },
    DropCollection {
        database: String,
        collection: String,
    },
    DropDatabase {
        database: String,
    },
    /// One view per doc part of the collection.
    CreatePathViews {
        database: String,
        collection: String,
    },
    DropPathViews {
        database: String,
        collection: String,
    },
}

impl JobOp {
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Insert { .. } => "insert",
            Self::CreateCollection { .. } => "create_collection",
            Self::DropCollection { .. } => "drop_collection",
            Self::DropDatabase { .. } => "drop_database",
            Self::CreatePathViews { .. } => "create_path_views",
            Self::DropPathViews { .. } => "drop_path_views",
        }
    }

    #[must_use]
    pub fn database(&self) -> &str {
        match self {
            Self::Insert { database, .. }
            | Self::CreateCollection { database, .. }
            | Self::DropCollection { database, .. }
            | Self::DropDatabase { database }
            | Self::CreatePathViews { database, .. }
            | Self::DropPathViews { database, .. } => database,
        }
    }

    #[must_use]
    pub fn collection(&self) -> Option<&str> {
        match self {
            Self::Insert { collection, .. }
            | Self::CreateCollection { collection, .. }
            | Self::DropCollection { collection, .. }
            | Self::CreatePathViews { collection, .. }
            | Self::DropPathViews { collection, .. } => Some(collection),
            Self::DropDatabase { .. } => None,
        }
    }
}

///
/// JobOutput
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum JobOutput {
    Inserted {
        documents: usize,
        catalog_version: u64,
    },
    CollectionCreated {
        /// False when the collection already existed.
        created: bool,
        catalog_version: u64,
    },
    /// Catalog entries removed by a collection or database drop.
    Dropped { entries: usize },
    ViewsCreated { views: usize },
    ViewsDropped { views: usize },
}

impl JobOutput {
    /// The headline count of the job: documents inserted, entries dropped
    /// or views touched.
    #[must_use]
    pub fn count(&self) -> usize {
        match self {
            Self::Inserted { documents, .. } => *documents,
            Self::CollectionCreated { created, .. } => usize::from(*created),
            Self::Dropped { entries } => *entries,
            Self::ViewsCreated { views } | Self::ViewsDropped { views } => *views,
        }
    }
}

///
/// JobState
///

#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum JobState {
    Queued,
    Running,
    Committed,
    Aborted,
}

impl JobState {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Committed | Self::Aborted)
    }

    /// Checked transition: `Queued → Running → {Committed, Aborted}`.
    pub fn advance(self, next: Self) -> Result<Self, InternalError> {
        match (self, next) {
            (Self::Queued, Self::Running)
            | (Self::Running, Self::Committed | Self::Aborted) => Ok(next),
            _ => Err(InternalError::executor_invariant(format!(
                "illegal job transition {self} -> {next}"
            ))),
        }
    }
}

///
/// AbortPolicy
///
/// Cooperative abort signal, polled between statements.
///

pub trait AbortPolicy: Send + Sync {
    fn should_abort(&self) -> bool;
}

impl<F> AbortPolicy for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn should_abort(&self) -> bool {
        self()
    }
}

///
/// AbortHandle
/// Shared flag; clones abort together.
///

#[derive(Clone, Debug, Default)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl AbortPolicy for AbortHandle {
    fn should_abort(&self) -> bool {
        self.is_aborted()
    }
}

///
/// ReportSink
///
/// Completion callback, invoked once per job after its terminal transition.
///

pub trait ReportSink: Send + Sync {
    fn on_complete(&self, id: JobId, outcome: &JobOutcome);
}

impl<F> ReportSink for F
where
    F: Fn(JobId, &JobOutcome) + Send + Sync,
{
    fn on_complete(&self, id: JobId, outcome: &JobOutcome) {
        self(id, outcome);
    }
}

///
/// Job
///

pub struct Job {
    op: JobOp,
    abort: Option<Arc<dyn AbortPolicy>>,
    report: Option<Arc<dyn ReportSink>>,
}

impl Job {
    #[must_use]
    pub fn new(op: JobOp) -> Self {
        Self {
            op,
            abort: None,
            report: None,
        }
    }

    #[must_use]
    pub fn insert(
        database: impl Into<String>,
        collection: impl Into<String>,
        documents: Vec<Document>,
    ) -> Self {
        Self::new(JobOp::Insert {
            database: database.into(),
            collection: collection.into(),
            documents,
        })
    }

    #[must_use]
    pub fn with_abort(mut self, abort: impl AbortPolicy + 'static) -> Self {
        self.abort = Some(Arc::new(abort));
        self
    }

    #[must_use]
    pub fn with_report(mut self, report: impl ReportSink + 'static) -> Self {
        self.report = Some(Arc::new(report));
        self
    }

    #[must_use]
    pub const fn op(&self) -> &JobOp {
        &self.op
    }

    pub(crate) fn should_abort(&self) -> bool {
        self.abort.as_ref().is_some_and(|abort| abort.should_abort())
    }

    pub(crate) fn report(&self) -> Option<&dyn ReportSink> {
        self.report.as_deref()
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("op", &self.op.kind())
            .field("abort", &self.abort.is_some())
            .field("report", &self.report.is_some())
            .finish()
    }
}

///
/// Ticket
///
/// Worker side of a submitted job. Consumed by `finish`, so the terminal
/// transition and both notifications happen at most once.
///

pub(crate) struct Ticket {
    id: JobId,
    state: Arc<Mutex<JobState>>,
    tx: Sender<JobOutcome>,
}

impl Ticket {
    pub(crate) const fn id(&self) -> JobId {
        self.id
    }

    pub(crate) fn start(&self) -> Result<(), InternalError> {
        self.transition(JobState::Running)
    }

    pub(crate) fn finish(self, outcome: JobOutcome, report: Option<&dyn ReportSink>) {
        let terminal = if outcome.is_ok() {
            JobState::Committed
        } else {
            JobState::Aborted
        };
        if let Err(err) = self.transition(terminal) {
            warn!(job = %self.id, error = %err, "job state out of step");
        }

        if let Some(report) = report {
            let reported = catch_unwind(AssertUnwindSafe(|| report.on_complete(self.id, &outcome)));
            if reported.is_err() {
                warn!(job = %self.id, "report callback panicked");
            }
        }

        // The handle may already be gone.
        let _ = self.tx.send(outcome);
    }

    fn transition(&self, next: JobState) -> Result<(), InternalError> {
        let mut state = self.state.lock();
        *state = state.advance(next)?;

        Ok(())
    }
}

///
/// JobHandle
///
/// Caller side of a submitted job. The outcome is delivered once: after
/// `try_wait` has returned it, later calls return `None`.
///

#[derive(Debug)]
pub struct JobHandle {
    id: JobId,
    state: Arc<Mutex<JobState>>,
    rx: Receiver<JobOutcome>,
}

impl JobHandle {
    #[must_use]
    pub const fn id(&self) -> JobId {
        self.id
    }

    #[must_use]
    pub fn state(&self) -> JobState {
        *self.state.lock()
    }

    /// Block until the job reaches a terminal state.
    pub fn wait(self) -> JobOutcome {
        self.rx.recv().unwrap_or_else(|_| {
            Err(InternalError::executor_internal(format!(
                "{} was dropped before completion",
                self.id
            )))
        })
    }

    /// The outcome, if the job has finished and it was not taken before.
    #[must_use]
    pub fn try_wait(&self) -> Option<JobOutcome> {
        match self.rx.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }
}

/// Paired ends for a freshly submitted job, in state `Queued`.
pub(crate) fn ticket(id: JobId) -> (Ticket, JobHandle) {
    let state = Arc::new(Mutex::new(JobState::Queued));
    let (tx, rx) = mpsc::channel();

    (
        Ticket {
            id,
            state: Arc::clone(&state),
            tx,
        },
        JobHandle { id, state, rx },
    )
}
