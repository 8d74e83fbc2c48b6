//! Module: executor
//! Responsibility: run jobs on a fixed pool of workers, one backend
//! transaction per job, and report every outcome exactly once.
//! Does not own: deciding what to allocate (`schema`) or publishing
//! allocations (`catalog`).
//!
//! Each worker thread owns one connection and one queue. Jobs on the same
//! worker run in submission order; jobs on different workers interleave and
//! meet only inside the catalog commit.

mod ids;
mod job;
mod runner;

#[cfg(test)]
mod tests;

use crate::{
    catalog::Catalog,
    connection::{Connection, ConnectionFactory},
    error::InternalError,
    obs::sink::{JobFinish, MetricsEvent, record},
};
use docrel_config::EngineConfig;
use std::{
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{
        Arc,
        atomic::{AtomicU64, AtomicUsize, Ordering},
        mpsc::{self, Receiver, Sender},
    },
    thread::{self, JoinHandle},
};
use tracing::{debug, info, warn};

// re-exports
pub use ids::RowIds;
pub use job::{
    AbortHandle, AbortPolicy, Job, JobHandle, JobId, JobOp, JobOutcome, JobOutput, JobState,
    ReportSink,
};
pub use runner::JobRunner;

///
/// Task
///

struct Task {
    ticket: job::Ticket,
    job: Job,
}

///
/// Worker
///

struct Worker {
    tx: Option<Sender<Task>>,
    thread: Option<JoinHandle<()>>,
}

///
/// Executor
///
/// Fixed worker pool. Dropping the executor drains every queue and joins
/// the workers.
///

pub struct Executor {
    workers: Vec<Worker>,
    runner: Arc<JobRunner>,
    next_worker: AtomicUsize,
    next_id: AtomicU64,
}

impl Executor {
    /// Open one connection per configured worker and start the pool.
    pub fn start(
        config: &EngineConfig,
        catalog: Arc<Catalog>,
        factory: &dyn ConnectionFactory,
    ) -> Result<Self, InternalError> {
        let runner = Arc::new(JobRunner::new(
            catalog,
            Arc::new(RowIds::new()),
            config.max_commit_retries,
        ));

        Self::with_runner(config.workers, runner, factory)
    }

    /// Start `workers` threads sharing `runner`.
    pub fn with_runner(
        workers: usize,
        runner: Arc<JobRunner>,
        factory: &dyn ConnectionFactory,
    ) -> Result<Self, InternalError> {
        let count = workers.max(1);

        // Connect everything up front so a bad backend fails here.
        let mut connections = Vec::with_capacity(count);
        for _ in 0..count {
            connections.push(factory.connect()?);
        }

        let mut pool = Vec::with_capacity(count);
        for (index, conn) in connections.into_iter().enumerate() {
            let (tx, rx) = mpsc::channel::<Task>();
            let runner = Arc::clone(&runner);
            let thread = thread::Builder::new()
                .name(format!("docrel-worker-{index}"))
                .spawn(move || run_worker(index, rx, conn, &runner))
                .map_err(|err| {
                    InternalError::executor_internal(format!(
                        "worker {index} failed to start: {err}"
                    ))
                })?;

            pool.push(Worker {
                tx: Some(tx),
                thread: Some(thread),
            });
        }
        info!(workers = count, "executor started");

        Ok(Self {
            workers: pool,
            runner,
            next_worker: AtomicUsize::new(0),
            next_id: AtomicU64::new(1),
        })
    }

    #[must_use]
    pub fn workers(&self) -> usize {
        self.workers.len()
    }

    #[must_use]
    pub fn runner(&self) -> &Arc<JobRunner> {
        &self.runner
    }

    /// Queue `job` on the next worker in round-robin order.
    pub fn submit(&self, job: Job) -> Result<JobHandle, InternalError> {
        let worker = self.next_worker.fetch_add(1, Ordering::Relaxed) % self.workers.len();

        self.submit_to(worker, job)
    }

    /// Queue `job` on a specific worker. Jobs on one worker run in order.
    pub fn submit_to(&self, worker: usize, job: Job) -> Result<JobHandle, InternalError> {
        let tx = self
            .workers
            .get(worker)
            .and_then(|w| w.tx.as_ref())
            .ok_or_else(|| {
                InternalError::executor_internal(format!("worker {worker} is not running"))
            })?;

        let id = JobId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (ticket, handle) = job::ticket(id);
        debug!(job = %id, worker, op = job.op().kind(), "job submitted");

        tx.send(Task { ticket, job }).map_err(|_| {
            InternalError::executor_internal(format!("worker {worker} stopped before {id}"))
        })?;
        record(MetricsEvent::JobSubmitted);

        Ok(handle)
    }

    /// Stop accepting jobs, finish the queued ones, and join every worker.
    pub fn shutdown(&mut self) {
        for worker in &mut self.workers {
            worker.tx = None;
        }

        for (index, worker) in self.workers.iter_mut().enumerate() {
            if let Some(thread) = worker.thread.take()
                && thread.join().is_err()
            {
                warn!(worker = index, "worker thread panicked");
            }
        }
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(index: usize, rx: Receiver<Task>, mut conn: Box<dyn Connection>, runner: &JobRunner) {
    debug!(worker = index, "worker started");

    while let Ok(Task { ticket, job }) = rx.recv() {
        let id = ticket.id();
        let outcome = ticket.start().and_then(|()| {
            catch_unwind(AssertUnwindSafe(|| runner.run(conn.as_mut(), id, &job))).unwrap_or_else(
                |_| {
                    Err(InternalError::executor_internal(format!(
                        "{id} panicked on worker {index}"
                    )))
                },
            )
        });

        let finish = if outcome.is_ok() {
            JobFinish::Committed
        } else {
            JobFinish::Aborted
        };
        record(MetricsEvent::JobFinished { finish });
        ticket.finish(outcome, job.report());
    }

    debug!(worker = index, "worker stopped");
}
