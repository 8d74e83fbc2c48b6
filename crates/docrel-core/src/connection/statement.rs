use crate::convert::SqlLiteral;
use std::fmt::{self, Display};

///
/// ColumnDef
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub sql_type: &'static str,
}

impl ColumnDef {
    #[must_use]
    pub fn new(name: impl Into<String>, sql_type: &'static str) -> Self {
        Self {
            name: name.into(),
            sql_type,
        }
    }
}

///
/// ViewColumn
/// Physical column exposed under a readable alias.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ViewColumn {
    pub column: String,
    pub alias: String,
}

///
/// Statement
///
/// Backend-neutral DDL/DML primitive. Identifiers are physical names taken
/// from the catalog; values are pre-encoded literals.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Statement {
    CreateSchema {
        schema: String,
    },
    /// Drops the schema and everything in it, when it exists.
    DropSchema {
        schema: String,
    },
    CreateDocPartTable {
        schema: String,
        table: String,
        columns: Vec<ColumnDef>,
    },
    CreateScalarTable {
        schema: String,
        table: String,
        columns: Vec<ColumnDef>,
    },
    AddColumn {
        schema: String,
        table: String,
        column: ColumnDef,
    },
    /// Drops the table and the views over it, when it exists.
    DropTable {
        schema: String,
        table: String,
    },
    Insert {
        schema: String,
        table: String,
        columns: Vec<String>,
        values: Vec<SqlLiteral>,
    },
    CreateView {
        schema: String,
        view: String,
        table: String,
        columns: Vec<ViewColumn>,
    },
    /// Drops the view when it exists.
    DropView {
        schema: String,
        view: String,
    },
    SelectAll {
        schema: String,
        table: String,
    },
}

impl Statement {
    /// Stable label used in diagnostics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::CreateSchema { .. } => "create schema",
            Self::DropSchema { .. } => "drop schema",
            Self::CreateDocPartTable { .. } => "create doc part table",
            Self::CreateScalarTable { .. } => "create scalar table",
            Self::AddColumn { .. } => "add column",
            Self::DropTable { .. } => "drop table",
            Self::Insert { .. } => "insert",
            Self::CreateView { .. } => "create view",
            Self::DropView { .. } => "drop view",
            Self::SelectAll { .. } => "select",
        }
    }

    #[must_use]
    pub const fn is_ddl(&self) -> bool {
        !matches!(self, Self::Insert { .. } | Self::SelectAll { .. })
    }

    #[must_use]
    pub fn schema(&self) -> &str {
        match self {
            Self::CreateSchema { schema }
            | Self::DropSchema { schema }
            | Self::CreateDocPartTable { schema, .. }
            | Self::CreateScalarTable { schema, .. }
            | Self::AddColumn { schema, .. }
            | Self::DropTable { schema, .. }
            | Self::Insert { schema, .. }
            | Self::CreateView { schema, .. }
            | Self::DropView { schema, .. }
            | Self::SelectAll { schema, .. } => schema,
        }
    }
}

fn write_columns(f: &mut fmt::Formatter<'_>, columns: &[ColumnDef]) -> fmt::Result {
    for (i, column) in columns.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "\"{}\" {}", column.name, column.sql_type)?;
    }

    Ok(())
}

/// Approximate SQL rendering, for logs.
impl Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateSchema { schema } => write!(f, "CREATE SCHEMA \"{schema}\""),
            Self::DropSchema { schema } => write!(f, "DROP SCHEMA IF EXISTS \"{schema}\" CASCADE"),
            Self::CreateDocPartTable {
                schema,
                table,
                columns,
            }
            | Self::CreateScalarTable {
                schema,
                table,
                columns,
            } => {
                write!(f, "CREATE TABLE \"{schema}\".\"{table}\" (")?;
                write_columns(f, columns)?;
                f.write_str(")")
            }
            Self::AddColumn {
                schema,
                table,
                column,
            } => write!(
                f,
                "ALTER TABLE \"{schema}\".\"{table}\" ADD COLUMN \"{}\" {}",
                column.name, column.sql_type
            ),
            Self::DropTable { schema, table } => {
                write!(f, "DROP TABLE IF EXISTS \"{schema}\".\"{table}\"")
            }
            Self::Insert {
                schema,
                table,
                columns,
                ..
            } => write!(
                f,
                "INSERT INTO \"{schema}\".\"{table}\" ({}) VALUES (…)",
                columns.join(", ")
            ),
            Self::CreateView {
                schema,
                view,
                table,
                columns,
            } => {
                write!(f, "CREATE VIEW \"{schema}\".\"{view}\" AS SELECT ")?;
                for (i, c) in columns.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "\"{}\" AS \"{}\"", c.column, c.alias)?;
                }
                write!(f, " FROM \"{schema}\".\"{table}\"")
            }
            Self::DropView { schema, view } => {
                write!(f, "DROP VIEW IF EXISTS \"{schema}\".\"{view}\"")
            }
            Self::SelectAll { schema, table } => {
                write!(f, "SELECT * FROM \"{schema}\".\"{table}\"")
            }
        }
    }
}

///
/// ResultSet
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<SqlLiteral>>,
}

impl ResultSet {
    /// Position of `column` in each row.
    #[must_use]
    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// Values of one column across all rows.
    pub fn column<'a>(&'a self, column: &str) -> impl Iterator<Item = &'a SqlLiteral> + 'a {
        let index = self.column_index(column);
        self.rows
            .iter()
            .filter_map(move |row| index.and_then(|i| row.get(i)))
    }
}

///
/// ExecOutcome
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ExecOutcome {
    RowsAffected(u64),
    Rows(ResultSet),
}

impl ExecOutcome {
    #[must_use]
    pub fn into_rows(self) -> Option<ResultSet> {
        match self {
            Self::Rows(rows) => Some(rows),
            Self::RowsAffected(_) => None,
        }
    }
}
