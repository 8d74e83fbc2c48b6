use crate::{
    FieldType,
    catalog::{CatalogSnapshot, TableRef, WorkingCopy},
    connection::{ColumnDef, Statement, ViewColumn},
    convert::{ConverterRegistry, SqlLiteral},
    error::InternalError,
    executor::RowIds,
    schema::{
        SchemaDiff,
        walk::{Cell, WalkedDoc, Walker},
    },
    value::{DocValue, Document},
};

/// System columns of a collection's root table.
pub const ROOT_COLUMNS: [(&str, &str); 1] = [("did", "bigint")];

/// System columns of every nested doc-part table.
pub const DOC_PART_COLUMNS: [(&str, &str); 4] = [
    ("did", "bigint"),
    ("rid", "bigint"),
    ("pid", "bigint"),
    ("seq", "integer"),
];

/// Columns of a scalar side-table; `v` holds the run literal.
pub const SCALAR_COLUMNS: [(&str, &str); 4] = [
    ("did", "bigint"),
    ("pid", "bigint"),
    ("seq", "integer"),
    ("v", "json"),
];

fn column_defs(columns: &[(&str, &'static str)]) -> Vec<ColumnDef> {
    columns
        .iter()
        .map(|(name, sql_type)| ColumnDef::new(*name, sql_type))
        .collect()
}

/// View name exposing the doc-part table `table`.
#[must_use]
pub fn path_view_name(table: &str) -> String {
    format!("{table}_view")
}

fn missing(what: impl std::fmt::Display) -> InternalError {
    InternalError::schema_invariant(format!("{what} is not allocated in the working copy"))
}

fn index_literal(index: usize) -> Result<SqlLiteral, InternalError> {
    i32::try_from(index)
        .map(SqlLiteral::Integer)
        .map_err(|_| {
            InternalError::schema_invariant(format!("array index {index} exceeds integer range"))
        })
}

///
/// Names
/// Physical-name lookups against one collection of a working copy.
///

struct Names<'a> {
    working: &'a WorkingCopy,
    database: &'a str,
    collection: &'a str,
}

impl Names<'_> {
    fn schema(&self) -> Result<String, InternalError> {
        self.working
            .resolve_database(self.database)
            .map(|d| d.identifier.clone())
            .ok_or_else(|| missing(format!("database {}", self.database)))
    }

    fn doc_part(&self, table_ref: &TableRef) -> Result<String, InternalError> {
        self.working
            .resolve_doc_part(self.database, self.collection, table_ref)
            .map(|d| d.identifier.clone())
            .ok_or_else(|| missing(format!("doc part {table_ref}")))
    }

    fn field(&self, field_ref: &TableRef, field_type: FieldType) -> Result<String, InternalError> {
        self.working
            .resolve_field(self.database, self.collection, field_ref, field_type)
            .map(|f| f.identifier.clone())
            .ok_or_else(|| missing(format!("{field_type} field {field_ref}")))
    }

    fn scalar(&self, array_ref: &TableRef, field_type: FieldType) -> Result<String, InternalError> {
        self.working
            .resolve_scalar(self.database, self.collection, array_ref, field_type)
            .map(|s| s.identifier.clone())
            .ok_or_else(|| missing(format!("{field_type} side-table {array_ref}")))
    }
}

///
/// WritePlan
///
/// Ordered statements for one job: DDL for every pending allocation first,
/// then one insert per doc-part row and per scalar run.
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct WritePlan {
    statements: Vec<Statement>,
    documents: usize,
}

impl WritePlan {
    /// Render the statements that create the pending allocations of `diff`
    /// and insert `documents`.
    ///
    /// `working` must already hold the allocations of `diff`; `documents`
    /// must be the batch `diff` was planned from.
    pub fn build(
        documents: &[Document],
        working: &WorkingCopy,
        diff: &SchemaDiff,
        registry: &ConverterRegistry,
        ids: &RowIds,
    ) -> Result<Self, InternalError> {
        let names = Names {
            working,
            database: diff.database(),
            collection: diff.collection(),
        };
        let mut plan = Self::default();
        plan.push_ddl(&names, diff, registry)?;

        let mut walker = Walker::new(working.base(), diff.database(), diff.collection());
        for document in documents {
            let walked = walker.walk(document);
            plan.push_document(&names, &walked, registry, ids)?;
        }
        plan.documents = documents.len();

        Ok(plan)
    }

    /// Views over every doc part of a collection, one per table.
    #[must_use]
    pub fn create_path_views(snapshot: &CatalogSnapshot, database: &str, collection: &str) -> Self {
        let Some(schema) = snapshot.resolve_database(database) else {
            return Self::default();
        };

        let statements = snapshot
            .doc_parts(database, collection)
            .map(|part| {
                let system: &[(&str, &str)] = if part.table_ref.is_root() {
                    &ROOT_COLUMNS
                } else {
                    &DOC_PART_COLUMNS
                };
                let mut columns: Vec<ViewColumn> = system
                    .iter()
                    .map(|(name, _)| ViewColumn {
                        column: (*name).to_string(),
                        alias: (*name).to_string(),
                    })
                    .collect();
                columns.extend(
                    snapshot
                        .columns_of(database, collection, &part.table_ref)
                        .map(|field| ViewColumn {
                            column: field.identifier.clone(),
                            alias: format!("{}:{}", field.table_ref, field.field_type.label()),
                        }),
                );

                Statement::CreateView {
                    schema: schema.identifier.clone(),
                    view: path_view_name(&part.identifier),
                    table: part.identifier.clone(),
                    columns,
                }
            })
            .collect();

        Self {
            statements,
            documents: 0,
        }
    }

    /// Drop the views `create_path_views` would create.
    #[must_use]
    pub fn drop_path_views(snapshot: &CatalogSnapshot, database: &str, collection: &str) -> Self {
        let Some(schema) = snapshot.resolve_database(database) else {
            return Self::default();
        };

        let statements = snapshot
            .doc_parts(database, collection)
            .map(|part| Statement::DropView {
                schema: schema.identifier.clone(),
                view: path_view_name(&part.identifier),
            })
            .collect();

        Self {
            statements,
            documents: 0,
        }
    }

    /// Drop every table of a collection, side-tables and children first.
    #[must_use]
    pub fn drop_collection(snapshot: &CatalogSnapshot, database: &str, collection: &str) -> Self {
        let Some(schema) = snapshot.resolve_database(database) else {
            return Self::default();
        };

        let mut statements: Vec<Statement> = snapshot
            .scalar_tables(database, collection)
            .map(|s| Statement::DropTable {
                schema: schema.identifier.clone(),
                table: s.identifier.clone(),
            })
            .collect();
        let parts: Vec<_> = snapshot.doc_parts(database, collection).collect();
        statements.extend(parts.iter().rev().map(|part| Statement::DropTable {
            schema: schema.identifier.clone(),
            table: part.identifier.clone(),
        }));

        Self {
            statements,
            documents: 0,
        }
    }

    /// Drop the schema of a database and everything in it.
    #[must_use]
    pub fn drop_database(snapshot: &CatalogSnapshot, database: &str) -> Self {
        let statements = snapshot
            .resolve_database(database)
            .map(|schema| Statement::DropSchema {
                schema: schema.identifier.clone(),
            })
            .into_iter()
            .collect();

        Self {
            statements,
            documents: 0,
        }
    }

    ///
    /// ACCESSORS
    ///

    #[must_use]
    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    #[must_use]
    pub fn into_statements(self) -> Vec<Statement> {
        self.statements
    }

    /// Documents this plan inserts.
    #[must_use]
    pub const fn documents(&self) -> usize {
        self.documents
    }

    #[must_use]
    pub fn ddl_count(&self) -> usize {
        self.statements.iter().filter(|s| s.is_ddl()).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    ///
    /// RENDERING
    ///

    fn push_ddl(
        &mut self,
        names: &Names<'_>,
        diff: &SchemaDiff,
        registry: &ConverterRegistry,
    ) -> Result<(), InternalError> {
        let schema = names.schema()?;
        if diff.needs_database() {
            self.statements.push(Statement::CreateSchema {
                schema: schema.clone(),
            });
        }

        for table_ref in diff.pending_doc_parts() {
            let system: &[(&str, &'static str)] = if table_ref.is_root() {
                &ROOT_COLUMNS
            } else {
                &DOC_PART_COLUMNS
            };
            self.statements.push(Statement::CreateDocPartTable {
                schema: schema.clone(),
                table: names.doc_part(table_ref)?,
                columns: column_defs(system),
            });
        }

        for (field_ref, field_type) in diff.pending_fields() {
            let owner = field_ref
                .parent()
                .ok_or_else(|| missing(format!("owner of {field_ref}")))?;
            let sql_type = if field_type.is_scalar() {
                registry.get(field_type)?.sql_type()
            } else {
                field_type.sql_type()
            };
            self.statements.push(Statement::AddColumn {
                schema: schema.clone(),
                table: names.doc_part(&owner)?,
                column: ColumnDef::new(names.field(field_ref, field_type)?, sql_type),
            });
        }

        for (array_ref, field_type) in diff.pending_scalars() {
            self.statements.push(Statement::CreateScalarTable {
                schema: schema.clone(),
                table: names.scalar(array_ref, field_type)?,
                columns: column_defs(&SCALAR_COLUMNS),
            });
        }

        Ok(())
    }

    fn push_document(
        &mut self,
        names: &Names<'_>,
        walked: &WalkedDoc<'_>,
        registry: &ConverterRegistry,
        ids: &RowIds,
    ) -> Result<(), InternalError> {
        let schema = names.schema()?;
        let did = ids.next_document(names.database, names.collection);

        // Row 0 is the root; its id is the document id.
        let mut row_ids = Vec::with_capacity(walked.rows.len());
        for row in &walked.rows {
            let id = match row.owner {
                None => did,
                Some(_) => ids.next_row(names.database, names.collection, &row.table_ref),
            };
            row_ids.push(id);
        }

        for (row, rid) in walked.rows.iter().zip(&row_ids) {
            let mut columns = vec!["did".to_string()];
            let mut values = vec![SqlLiteral::Bigint(did)];
            if let Some(owner) = row.owner {
                columns.extend(["rid", "pid", "seq"].map(str::to_string));
                values.push(SqlLiteral::Bigint(*rid));
                values.push(SqlLiteral::Bigint(row_ids[owner]));
                values.push(row.seq.map_or(Ok(SqlLiteral::Null), index_literal)?);
            }

            for cell in &row.cells {
                columns.push(names.field(&cell.field_ref, cell.field_type)?);
                values.push(encode_cell(registry, cell.field_type, cell.value)?);
            }

            self.statements.push(Statement::Insert {
                schema: schema.clone(),
                table: names.doc_part(&row.table_ref)?,
                columns,
                values,
            });
        }

        for run in &walked.runs {
            let elements: Vec<Option<DocValue>> =
                run.elements.iter().map(|e| e.cloned()).collect();
            let literal = registry.array(run.field_type)?.encode(&elements)?;

            self.statements.push(Statement::Insert {
                schema: schema.clone(),
                table: names.scalar(&run.array_ref, run.field_type)?,
                columns: SCALAR_COLUMNS.map(|(name, _)| name.to_string()).to_vec(),
                values: vec![
                    SqlLiteral::Bigint(did),
                    SqlLiteral::Bigint(row_ids[run.owner]),
                    index_literal(run.start)?,
                    literal,
                ],
            });
        }

        Ok(())
    }
}

/// Literal for one doc-part cell. A null typed under a concrete scalar type
/// is stored as SQL `NULL` in that type's column.
fn encode_cell(
    registry: &ConverterRegistry,
    field_type: FieldType,
    cell: Cell<'_>,
) -> Result<SqlLiteral, InternalError> {
    match cell {
        Cell::Present => Ok(SqlLiteral::Boolean(true)),
        Cell::Count(n) => i32::try_from(n).map(SqlLiteral::Integer).map_err(|_| {
            InternalError::schema_invariant(format!("array length {n} exceeds integer range"))
        }),
        Cell::Value(DocValue::Null) if field_type != FieldType::Null => Ok(SqlLiteral::Null),
        Cell::Value(value) => Ok(registry.get(field_type)?.encode(value)?),
    }
}
