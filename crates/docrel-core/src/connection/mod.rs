//! Module: connection
//! Responsibility: the statement model handed to the relational backend and
//! the transactional connection contract the executor drives.
//! Does not own: SQL dialect details or connection pooling.

mod memory;
mod statement;

#[cfg(test)]
mod tests;

use thiserror::Error as ThisError;

// re-exports
pub use memory::{MemoryBackend, MemoryConnection, MemoryTable};
pub use statement::{ColumnDef, ExecOutcome, ResultSet, Statement, ViewColumn};

///
/// ConnectionError
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
#[remain::sorted]
pub enum ConnectionError {
    #[error("backend failure: {message}")]
    Backend { message: String },

    #[error("connection is closed")]
    Closed,

    #[error("invalid transaction state: {reason}")]
    InvalidState { reason: String },

    #[error("statement rejected ({statement}): {reason}")]
    Rejected { statement: String, reason: String },
}

impl ConnectionError {
    pub(crate) fn rejected(statement: &Statement, reason: impl Into<String>) -> Self {
        Self::Rejected {
            statement: statement.kind().to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_state(reason: impl Into<String>) -> Self {
        Self::InvalidState {
            reason: reason.into(),
        }
    }
}

///
/// Connection
///
/// One backend session. At most one transaction is open at a time;
/// timeouts surface as ordinary errors.
///

pub trait Connection: Send {
    fn begin_transaction(&mut self) -> Result<(), ConnectionError>;

    fn execute(&mut self, statement: &Statement) -> Result<ExecOutcome, ConnectionError>;

    fn commit(&mut self) -> Result<(), ConnectionError>;

    fn rollback(&mut self) -> Result<(), ConnectionError>;
}

///
/// ConnectionFactory
/// Hands each executor worker the connection it owns for its lifetime.
///

pub trait ConnectionFactory: Send + Sync {
    fn connect(&self) -> Result<Box<dyn Connection>, ConnectionError>;
}
