use crate::{
    catalog::{Catalog, CatalogConflictError, CatalogSnapshot, WorkingCopy},
    connection::{Connection, ConnectionError, ExecOutcome, ResultSet, Statement},
    convert::{ConverterRegistry, SqlLiteral},
    error::{ErrorClass, InternalError},
    executor::{
        RowIds,
        job::{Job, JobId, JobOp, JobOutcome, JobOutput},
    },
    obs::sink::{MetricsEvent, record},
    schema::{WritePlan, plan_batch},
    value::Document,
};
use std::sync::Arc;
use tracing::{debug, trace, warn};

///
/// Transaction
///
/// Open backend transaction. Rolls back on drop unless `commit` consumed it.
///

struct Transaction<'c> {
    conn: &'c mut dyn Connection,
    open: bool,
}

impl<'c> Transaction<'c> {
    fn begin(conn: &'c mut dyn Connection) -> Result<Self, ConnectionError> {
        conn.begin_transaction()?;

        Ok(Self { conn, open: true })
    }

    fn execute(&mut self, statement: &Statement) -> Result<ExecOutcome, ConnectionError> {
        self.conn.execute(statement)
    }

    fn commit(mut self) -> Result<(), InternalError> {
        self.open = false;
        self.conn.commit()?;

        Ok(())
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.open {
            return;
        }

        match self.conn.rollback() {
            Ok(()) => debug!("transaction rolled back"),
            Err(err) => warn!(error = %err, "transaction rollback failed"),
        }
    }
}

///
/// JobRunner
///
/// Runs one job to completion on a connection it borrows for the duration.
/// Catalog conflicts are retried by re-planning against the fresh snapshot;
/// every other failure ends the job.
///

pub struct JobRunner {
    catalog: Arc<Catalog>,
    registry: &'static ConverterRegistry,
    ids: Arc<RowIds>,
    max_commit_retries: u32,
}

impl JobRunner {
    #[must_use]
    pub fn new(catalog: Arc<Catalog>, ids: Arc<RowIds>, max_commit_retries: u32) -> Self {
        Self {
            catalog,
            registry: ConverterRegistry::global(),
            ids,
            max_commit_retries,
        }
    }

    /// Use `registry` instead of the standard converters.
    #[must_use]
    pub const fn with_registry(mut self, registry: &'static ConverterRegistry) -> Self {
        self.registry = registry;
        self
    }

    #[must_use]
    pub const fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    #[must_use]
    pub const fn ids(&self) -> &Arc<RowIds> {
        &self.ids
    }

    pub fn run(&self, conn: &mut dyn Connection, id: JobId, job: &Job) -> JobOutcome {
        debug!(job = %id, op = job.op().kind(), "job running");

        let outcome = match job.op() {
            JobOp::Insert {
                database,
                collection,
                documents,
            } => self
                .with_retries(id, || {
                    self.write(conn, id, job, database, collection, documents)
                })
                .map(|(catalog_version, _)| JobOutput::Inserted {
                    documents: documents.len(),
                    catalog_version,
                }),

            JobOp::CreateCollection {
                database,
                collection,
            } => self
                .with_retries(id, || self.write(conn, id, job, database, collection, &[]))
                .map(|(catalog_version, created)| JobOutput::CollectionCreated {
                    created,
                    catalog_version,
                }),

            JobOp::DropCollection {
                database,
                collection,
            } => self
                .with_retries(id, || {
                    self.drop_scope(conn, id, job, database, Some(collection.as_str()))
                })
                .map(|entries| JobOutput::Dropped { entries }),

            JobOp::DropDatabase { database } => self
                .with_retries(id, || self.drop_scope(conn, id, job, database, None))
                .map(|entries| JobOutput::Dropped { entries }),

            JobOp::CreatePathViews {
                database,
                collection,
            } => {
                let plan = WritePlan::create_path_views(
                    &self.catalog.settled_snapshot(),
                    database,
                    collection,
                );
                run_plain(conn, id, job, &plan).map(|_| JobOutput::ViewsCreated {
                    views: plan.statements().len(),
                })
            }

            JobOp::DropPathViews {
                database,
                collection,
            } => {
                let plan = WritePlan::drop_path_views(
                    &self.catalog.settled_snapshot(),
                    database,
                    collection,
                );
                run_plain(conn, id, job, &plan).map(|dropped| JobOutput::ViewsDropped {
                    views: usize::try_from(dropped).unwrap_or(usize::MAX),
                })
            }
        };

        match &outcome {
            Ok(output) => debug!(job = %id, ?output, "job committed"),
            Err(err) => warn!(job = %id, error = %err, "job aborted"),
        }

        outcome
    }

    fn with_retries<T>(
        &self,
        id: JobId,
        mut attempt: impl FnMut() -> Result<T, InternalError>,
    ) -> Result<T, InternalError> {
        let mut retries = 0;
        loop {
            match attempt() {
                Err(err) if err.is_conflict() && retries < self.max_commit_retries => {
                    retries += 1;
                    record(MetricsEvent::CommitRetry);
                    warn!(job = %id, retries, error = %err, "catalog conflict, re-planning");
                }
                other => return other,
            }
        }
    }

    /// Plan, allocate and store `documents` in one transaction. Returns the
    /// catalog version the job committed against and whether the
    /// collection was new.
    fn write(
        &self,
        conn: &mut dyn Connection,
        id: JobId,
        job: &Job,
        database: &str,
        collection: &str,
        documents: &[Document],
    ) -> Result<(u64, bool), InternalError> {
        let snapshot = self.catalog.settled_snapshot();
        let diff = plan_batch(documents, database, collection, &snapshot);
        let mut working = WorkingCopy::new(Arc::clone(&snapshot), self.catalog.policy());
        diff.apply(&mut working)?;
        let moved = |err: InternalError| self.scope_moved(id, err, database, collection, &snapshot);

        let mut txn = Transaction::begin(conn)?;
        self.seed_ids(&mut txn, id, &snapshot, database, collection).map_err(moved)?;
        let plan = WritePlan::build(documents, &working, &diff, self.registry, &self.ids)?;
        trace!(
            job = %id,
            pending = diff.pending_count(),
            statements = plan.statements().len(),
            "write planned"
        );

        // A commit published since the snapshot shows up before any DDL runs.
        self.catalog.check(&working)?;
        execute_all(&mut txn, id, job, plan.statements()).map_err(moved)?;

        let pending = self.catalog.begin_commit(working)?;
        if let Err(err) = txn.commit() {
            if let Err(retract_err) = pending.retract() {
                warn!(job = %id, error = %retract_err, "retract after failed commit failed");
            }
            return Err(moved(err));
        }
        let receipt = pending.settle();

        Ok((receipt.version(), diff.needs_collection()))
    }

    /// Raise the id sequences of every stored doc part of the collection
    /// above the ids its table already holds. Each doc part is read once
    /// per process.
    fn seed_ids(
        &self,
        txn: &mut Transaction<'_>,
        id: JobId,
        snapshot: &CatalogSnapshot,
        database: &str,
        collection: &str,
    ) -> Result<(), InternalError> {
        let Some(schema) = snapshot.resolve_database(database) else {
            return Ok(());
        };

        for part in snapshot.doc_parts(database, collection) {
            if self.ids.is_tracked(database, collection, &part.table_ref) {
                continue;
            }

            let statement = Statement::SelectAll {
                schema: schema.identifier.clone(),
                table: part.identifier.clone(),
            };
            let ExecOutcome::Rows(rows) = txn.execute(&statement)? else {
                return Err(InternalError::executor_invariant(format!(
                    "{statement} returned no result set"
                )));
            };

            let id_column = if part.table_ref.is_root() { "did" } else { "rid" };
            let stored = max_id(&rows, id_column);
            self.ids.seed(database, collection, &part.table_ref, stored);
            debug!(job = %id, table = %part.identifier, stored, "row ids seeded");
        }

        Ok(())
    }

    /// A backend failure on a scope that moved since `planned` (dropped, or
    /// being dropped) becomes a conflict, so the job re-plans once the drop
    /// settled.
    fn scope_moved(
        &self,
        id: JobId,
        err: InternalError,
        database: &str,
        collection: &str,
        planned: &CatalogSnapshot,
    ) -> InternalError {
        if err.class != ErrorClass::Connection
            || !self.catalog.scope_changed(database, collection, planned)
        {
            return err;
        }

        warn!(job = %id, database, collection, error = %err, "scope moved under the job");
        record(MetricsEvent::CommitConflict);
        CatalogConflictError::SnapshotChanged {
            planned: planned.version(),
            current: self.catalog.version(),
        }
        .into()
    }

    /// Drop the physical structures, then the catalog scope they were
    /// planned from. Planners wait on the drop fence meanwhile.
    fn drop_scope(
        &self,
        conn: &mut dyn Connection,
        id: JobId,
        job: &Job,
        database: &str,
        collection: Option<&str>,
    ) -> Result<usize, InternalError> {
        let snapshot = self.catalog.settled_snapshot();
        let plan = match collection {
            Some(collection) => WritePlan::drop_collection(&snapshot, database, collection),
            None => WritePlan::drop_database(&snapshot, database),
        };

        let _fence = self.catalog.fence_drop(database, collection);
        let mut txn = Transaction::begin(conn)?;
        execute_all(&mut txn, id, job, plan.statements())?;
        txn.commit()?;

        let entries = match collection {
            Some(collection) => self
                .catalog
                .drop_collection_at(database, collection, &snapshot)?,
            None => self.catalog.drop_database_at(database, &snapshot)?,
        };
        self.ids.reset_scope(database, collection);

        Ok(entries)
    }
}

/// Run a plan that touches no catalog state.
fn run_plain(
    conn: &mut dyn Connection,
    id: JobId,
    job: &Job,
    plan: &WritePlan,
) -> Result<u64, InternalError> {
    let mut txn = Transaction::begin(conn)?;
    let affected = execute_all(&mut txn, id, job, plan.statements())?;
    txn.commit()?;

    Ok(affected)
}

/// Highest id stored in `column`, or 0 for an empty table.
fn max_id(rows: &ResultSet, column: &str) -> i64 {
    rows.column(column)
        .filter_map(|value| match value {
            SqlLiteral::Bigint(id) => Some(*id),
            _ => None,
        })
        .max()
        .unwrap_or(0)
}

/// Execute in order, polling the abort policy before each statement and
/// once more before the caller commits. Returns the rows affected.
fn execute_all(
    txn: &mut Transaction<'_>,
    id: JobId,
    job: &Job,
    statements: &[Statement],
) -> Result<u64, InternalError> {
    let mut affected = 0_u64;
    for (executed, statement) in statements.iter().enumerate() {
        poll_abort(id, job, executed)?;

        let outcome = txn.execute(statement)?;
        record(MetricsEvent::StatementExecuted {
            ddl: statement.is_ddl(),
        });
        trace!(job = %id, %statement, "statement executed");

        if let ExecOutcome::RowsAffected(rows) = outcome {
            affected = affected.saturating_add(rows);
        }
    }
    poll_abort(id, job, statements.len())?;

    Ok(affected)
}

fn poll_abort(id: JobId, job: &Job, executed: usize) -> Result<(), InternalError> {
    if job.should_abort() {
        warn!(job = %id, executed, "job aborted by caller");
        return Err(InternalError::aborted(format!(
            "{id} aborted after {executed} statements"
        )));
    }

    Ok(())
}
