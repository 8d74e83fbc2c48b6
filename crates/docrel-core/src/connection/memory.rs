//! In-process transactional backend.
//!
//! Each transaction works on a private copy of the committed state; commit
//! replays the transaction's statements onto the state current at commit
//! time, so a statement that became invalid meanwhile fails the commit and
//! nothing is applied.

use crate::{
    connection::{
        ColumnDef, Connection, ConnectionError, ConnectionFactory, ExecOutcome, ResultSet,
        Statement, ViewColumn,
    },
    convert::SqlLiteral,
};
use parking_lot::Mutex;
use std::{collections::BTreeMap, sync::Arc};

///
/// MemoryTable
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MemoryTable {
    pub columns: Vec<ColumnDef>,
    pub rows: Vec<Vec<SqlLiteral>>,
}

impl MemoryTable {
    fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    fn result_set(&self) -> ResultSet {
        ResultSet {
            columns: self.columns.iter().map(|c| c.name.clone()).collect(),
            rows: self.rows.clone(),
        }
    }
}

#[derive(Clone, Debug)]
struct MemoryView {
    table: String,
    columns: Vec<ViewColumn>,
}

#[derive(Clone, Debug, Default)]
struct MemorySchema {
    tables: BTreeMap<String, MemoryTable>,
    views: BTreeMap<String, MemoryView>,
}

impl MemorySchema {
    fn name_taken(&self, name: &str) -> bool {
        self.tables.contains_key(name) || self.views.contains_key(name)
    }
}

#[derive(Clone, Debug, Default)]
struct MemoryState {
    schemas: BTreeMap<String, MemorySchema>,
}

impl MemoryState {
    fn schema(&self, statement: &Statement) -> Result<&MemorySchema, ConnectionError> {
        self.schemas
            .get(statement.schema())
            .ok_or_else(|| ConnectionError::rejected(statement, "schema does not exist"))
    }

    fn schema_mut(&mut self, statement: &Statement) -> Result<&mut MemorySchema, ConnectionError> {
        self.schemas
            .get_mut(statement.schema())
            .ok_or_else(|| ConnectionError::rejected(statement, "schema does not exist"))
    }

    #[expect(clippy::too_many_lines)]
    fn apply(&mut self, statement: &Statement) -> Result<ExecOutcome, ConnectionError> {
        match statement {
            Statement::CreateSchema { schema } => {
                if self.schemas.contains_key(schema) {
                    return Err(ConnectionError::rejected(statement, "schema exists"));
                }
                self.schemas.insert(schema.clone(), MemorySchema::default());

                Ok(ExecOutcome::RowsAffected(0))
            }

            Statement::DropSchema { schema } => {
                let dropped = self.schemas.remove(schema).is_some();

                Ok(ExecOutcome::RowsAffected(u64::from(dropped)))
            }

            Statement::CreateDocPartTable { table, columns, .. }
            | Statement::CreateScalarTable { table, columns, .. } => {
                let target = self.schema_mut(statement)?;
                if target.name_taken(table) {
                    return Err(ConnectionError::rejected(statement, "relation exists"));
                }
                for (i, column) in columns.iter().enumerate() {
                    if columns[..i].iter().any(|c| c.name == column.name) {
                        return Err(ConnectionError::rejected(
                            statement,
                            format!("duplicate column {}", column.name),
                        ));
                    }
                }
                target.tables.insert(
                    table.clone(),
                    MemoryTable {
                        columns: columns.clone(),
                        rows: Vec::new(),
                    },
                );

                Ok(ExecOutcome::RowsAffected(0))
            }

            Statement::AddColumn { table, column, .. } => {
                let target = self
                    .schema_mut(statement)?
                    .tables
                    .get_mut(table)
                    .ok_or_else(|| ConnectionError::rejected(statement, "table does not exist"))?;
                if target.column_index(&column.name).is_some() {
                    return Err(ConnectionError::rejected(statement, "column exists"));
                }
                target.columns.push(column.clone());
                for row in &mut target.rows {
                    row.push(SqlLiteral::Null);
                }

                Ok(ExecOutcome::RowsAffected(0))
            }

            Statement::DropTable { table, .. } => {
                let dropped = self
                    .schemas
                    .get_mut(statement.schema())
                    .is_some_and(|target| {
                        target.views.retain(|_, view| &view.table != table);
                        target.tables.remove(table).is_some()
                    });

                Ok(ExecOutcome::RowsAffected(u64::from(dropped)))
            }

            Statement::Insert {
                table,
                columns,
                values,
                ..
            } => {
                let target = self
                    .schema_mut(statement)?
                    .tables
                    .get_mut(table)
                    .ok_or_else(|| ConnectionError::rejected(statement, "table does not exist"))?;
                if columns.len() != values.len() {
                    return Err(ConnectionError::rejected(
                        statement,
                        "column and value counts differ",
                    ));
                }

                let mut row = vec![SqlLiteral::Null; target.columns.len()];
                for (name, value) in columns.iter().zip(values) {
                    let index = target.column_index(name).ok_or_else(|| {
                        ConnectionError::rejected(statement, format!("no column {name}"))
                    })?;
                    let sql_type = target.columns[index].sql_type;
                    if !value.is_null() && value.kind() != sql_type {
                        return Err(ConnectionError::rejected(
                            statement,
                            format!("{} literal for {sql_type} column {name}", value.kind()),
                        ));
                    }
                    row[index] = value.clone();
                }
                target.rows.push(row);

                Ok(ExecOutcome::RowsAffected(1))
            }

            Statement::CreateView {
                view,
                table,
                columns,
                ..
            } => {
                let target = self.schema_mut(statement)?;
                if target.name_taken(view) {
                    return Err(ConnectionError::rejected(statement, "relation exists"));
                }
                let source = target
                    .tables
                    .get(table)
                    .ok_or_else(|| ConnectionError::rejected(statement, "table does not exist"))?;
                if let Some(missing) = columns
                    .iter()
                    .find(|c| source.column_index(&c.column).is_none())
                {
                    return Err(ConnectionError::rejected(
                        statement,
                        format!("no column {}", missing.column),
                    ));
                }
                target.views.insert(
                    view.clone(),
                    MemoryView {
                        table: table.clone(),
                        columns: columns.clone(),
                    },
                );

                Ok(ExecOutcome::RowsAffected(0))
            }

            Statement::DropView { view, .. } => {
                let dropped = self
                    .schemas
                    .get_mut(statement.schema())
                    .is_some_and(|target| target.views.remove(view).is_some());

                Ok(ExecOutcome::RowsAffected(u64::from(dropped)))
            }

            Statement::SelectAll { table, .. } => {
                let target = self.schema(statement)?;
                if let Some(source) = target.tables.get(table) {
                    return Ok(ExecOutcome::Rows(source.result_set()));
                }

                let view = target.views.get(table).ok_or_else(|| {
                    ConnectionError::rejected(statement, "relation does not exist")
                })?;
                let source = target
                    .tables
                    .get(&view.table)
                    .ok_or_else(|| ConnectionError::rejected(statement, "view source vanished"))?;
                let indexes: Vec<usize> = view
                    .columns
                    .iter()
                    .filter_map(|c| source.column_index(&c.column))
                    .collect();

                Ok(ExecOutcome::Rows(ResultSet {
                    columns: view.columns.iter().map(|c| c.alias.clone()).collect(),
                    rows: source
                        .rows
                        .iter()
                        .map(|row| indexes.iter().map(|i| row[*i].clone()).collect())
                        .collect(),
                }))
            }
        }
    }
}

///
/// Faults
/// Failure injection shared by every connection of a backend.
///

#[derive(Debug, Default)]
struct Faults {
    offline: bool,
    failing_commits: usize,
    fail_execute_at: Option<u64>,
    executed: u64,
}

///
/// MemoryBackend
///
/// Shared committed state plus failure injection. Cheap to clone; clones
/// share state.
///

#[derive(Clone, Debug, Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<MemoryState>>,
    faults: Arc<Mutex<Faults>>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn connection(&self) -> MemoryConnection {
        MemoryConnection {
            backend: self.clone(),
            txn: None,
        }
    }

    ///
    /// FAILURE INJECTION
    ///

    /// Fail the next `count` commits on any connection.
    pub fn fail_next_commits(&self, count: usize) {
        self.faults.lock().failing_commits = count;
    }

    /// Fail the `nth` execute call from now (1-based) on any connection.
    pub fn fail_execute_at(&self, nth: u64) {
        let mut faults = self.faults.lock();
        faults.fail_execute_at = Some(faults.executed + nth);
    }

    /// While offline every connection call fails with `Closed`.
    pub fn set_offline(&self, offline: bool) {
        self.faults.lock().offline = offline;
    }

    /// Execute calls seen so far across all connections.
    #[must_use]
    pub fn executed(&self) -> u64 {
        self.faults.lock().executed
    }

    ///
    /// INSPECTION (committed state)
    ///

    #[must_use]
    pub fn has_schema(&self, schema: &str) -> bool {
        self.state.lock().schemas.contains_key(schema)
    }

    #[must_use]
    pub fn table(&self, schema: &str, table: &str) -> Option<MemoryTable> {
        self.state
            .lock()
            .schemas
            .get(schema)
            .and_then(|s| s.tables.get(table))
            .cloned()
    }

    #[must_use]
    pub fn tables(&self, schema: &str) -> Vec<String> {
        self.state
            .lock()
            .schemas
            .get(schema)
            .map(|s| s.tables.keys().cloned().collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn views(&self, schema: &str) -> Vec<String> {
        self.state
            .lock()
            .schemas
            .get(schema)
            .map(|s| s.views.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn check_online(&self) -> Result<(), ConnectionError> {
        if self.faults.lock().offline {
            return Err(ConnectionError::Closed);
        }

        Ok(())
    }

    fn before_execute(&self) -> Result<(), ConnectionError> {
        let mut faults = self.faults.lock();
        if faults.offline {
            return Err(ConnectionError::Closed);
        }
        faults.executed += 1;
        if faults.fail_execute_at == Some(faults.executed) {
            faults.fail_execute_at = None;
            return Err(ConnectionError::Backend {
                message: format!("injected failure at execute #{}", faults.executed),
            });
        }

        Ok(())
    }

    fn before_commit(&self) -> Result<(), ConnectionError> {
        let mut faults = self.faults.lock();
        if faults.offline {
            return Err(ConnectionError::Closed);
        }
        if faults.failing_commits > 0 {
            faults.failing_commits -= 1;
            return Err(ConnectionError::Backend {
                message: "injected commit failure".to_string(),
            });
        }

        Ok(())
    }
}

impl ConnectionFactory for MemoryBackend {
    fn connect(&self) -> Result<Box<dyn Connection>, ConnectionError> {
        self.check_online()?;

        Ok(Box::new(self.connection()))
    }
}

///
/// MemoryConnection
///

#[derive(Debug)]
pub struct MemoryConnection {
    backend: MemoryBackend,
    txn: Option<Transaction>,
}

#[derive(Debug)]
struct Transaction {
    working: MemoryState,
    log: Vec<Statement>,
}

impl MemoryConnection {
    #[must_use]
    pub const fn in_transaction(&self) -> bool {
        self.txn.is_some()
    }
}

impl Connection for MemoryConnection {
    fn begin_transaction(&mut self) -> Result<(), ConnectionError> {
        self.backend.check_online()?;
        if self.txn.is_some() {
            return Err(ConnectionError::invalid_state("transaction already open"));
        }

        self.txn = Some(Transaction {
            working: self.backend.state.lock().clone(),
            log: Vec::new(),
        });

        Ok(())
    }

    fn execute(&mut self, statement: &Statement) -> Result<ExecOutcome, ConnectionError> {
        self.backend.before_execute()?;
        let txn = self
            .txn
            .as_mut()
            .ok_or_else(|| ConnectionError::invalid_state("no open transaction"))?;

        let outcome = txn.working.apply(statement)?;
        if !matches!(statement, Statement::SelectAll { .. }) {
            txn.log.push(statement.clone());
        }

        Ok(outcome)
    }

    fn commit(&mut self) -> Result<(), ConnectionError> {
        let txn = self
            .txn
            .take()
            .ok_or_else(|| ConnectionError::invalid_state("no open transaction"))?;
        self.backend.before_commit()?;

        let mut state = self.backend.state.lock();
        let mut next = state.clone();
        for statement in &txn.log {
            next.apply(statement)?;
        }
        *state = next;

        Ok(())
    }

    fn rollback(&mut self) -> Result<(), ConnectionError> {
        self.txn = None;

        Ok(())
    }
}
