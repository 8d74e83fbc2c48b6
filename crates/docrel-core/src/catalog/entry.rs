use crate::{FieldType, catalog::TableRef};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

///
/// MetaDatabase
/// Database name → schema identifier.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct MetaDatabase {
    pub name: String,
    pub identifier: String,
}

///
/// MetaCollection
/// Collection name → identifier prefix for its tables.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct MetaCollection {
    pub database: String,
    pub name: String,
    pub identifier: String,
}

///
/// MetaDocPart
/// One table holding the rows found at `table_ref`.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct MetaDocPart {
    pub database: String,
    pub collection: String,
    pub table_ref: TableRef,
    pub identifier: String,
}

///
/// MetaField
///
/// Column for the values of one FieldType at `table_ref`.
/// The column lives on the doc-part table of `table_ref.parent()`.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct MetaField {
    pub database: String,
    pub collection: String,
    pub table_ref: TableRef,
    pub field_type: FieldType,
    pub identifier: String,
}

///
/// MetaScalarField
///
/// Side-table for homogeneous runs of `field_type` elements of the array
/// at `table_ref`.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct MetaScalarField {
    pub database: String,
    pub collection: String,
    pub table_ref: TableRef,
    pub field_type: FieldType,
    pub identifier: String,
}

///
/// CatalogEntry
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum CatalogEntry {
    Database(MetaDatabase),
    Collection(MetaCollection),
    DocPart(MetaDocPart),
    Field(MetaField),
    Scalar(MetaScalarField),
}

impl CatalogEntry {
    #[must_use]
    pub fn key(&self) -> CatalogKey {
        match self {
            Self::Database(e) => CatalogKey::database(&e.name),
            Self::Collection(e) => CatalogKey::collection(&e.database, &e.name),
            Self::DocPart(e) => CatalogKey::doc_part(&e.database, &e.collection, &e.table_ref),
            Self::Field(e) => {
                CatalogKey::field(&e.database, &e.collection, &e.table_ref, e.field_type)
            }
            Self::Scalar(e) => {
                CatalogKey::scalar(&e.database, &e.collection, &e.table_ref, e.field_type)
            }
        }
    }

    /// Namespace the identifier must be unique in.
    ///
    /// `None` for a field at the root path, which has no owning table.
    #[must_use]
    pub fn namespace(&self) -> Option<Namespace> {
        match self {
            Self::Database(_) => Some(Namespace::Schemas),
            Self::Collection(e) => Some(Namespace::Collections {
                database: e.database.clone(),
            }),
            Self::DocPart(MetaDocPart { database, .. })
            | Self::Scalar(MetaScalarField { database, .. }) => Some(Namespace::Tables {
                database: database.clone(),
            }),
            Self::Field(e) => Some(Namespace::Columns {
                database: e.database.clone(),
                collection: e.collection.clone(),
                table_ref: e.table_ref.parent()?,
            }),
        }
    }

    #[must_use]
    pub fn identifier(&self) -> &str {
        match self {
            Self::Database(e) => &e.identifier,
            Self::Collection(e) => &e.identifier,
            Self::DocPart(e) => &e.identifier,
            Self::Field(e) => &e.identifier,
            Self::Scalar(e) => &e.identifier,
        }
    }

    #[must_use]
    pub fn database(&self) -> &str {
        match self {
            Self::Database(e) => &e.name,
            Self::Collection(e) => &e.database,
            Self::DocPart(e) => &e.database,
            Self::Field(e) => &e.database,
            Self::Scalar(e) => &e.database,
        }
    }

    /// Owning collection; `None` for database entries.
    #[must_use]
    pub fn collection(&self) -> Option<&str> {
        match self {
            Self::Database(_) => None,
            Self::Collection(e) => Some(&e.name),
            Self::DocPart(e) => Some(&e.collection),
            Self::Field(e) => Some(&e.collection),
            Self::Scalar(e) => Some(&e.collection),
        }
    }

    #[must_use]
    pub const fn kind(&self) -> EntryKind {
        match self {
            Self::Database(_) => EntryKind::Database,
            Self::Collection(_) => EntryKind::Collection,
            Self::DocPart(_) => EntryKind::DocPart,
            Self::Field(_) => EntryKind::Field,
            Self::Scalar(_) => EntryKind::Scalar,
        }
    }
}

///
/// EntryKind
///

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum EntryKind {
    Database,
    Collection,
    DocPart,
    Field,
    Scalar,
}

impl EntryKind {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Database => "database",
            Self::Collection => "collection",
            Self::DocPart => "doc part",
            Self::Field => "field",
            Self::Scalar => "scalar side-table",
        }
    }
}

///
/// CatalogKey
///
/// Logical identity of one entry. `table_ref` and `field_type` are present
/// only for the kinds that carry them.
///

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct CatalogKey {
    pub kind: EntryKind,
    pub database: String,
    pub collection: Option<String>,
    pub table_ref: Option<TableRef>,
    pub field_type: Option<FieldType>,
}

impl CatalogKey {
    #[must_use]
    pub fn database(database: &str) -> Self {
        Self {
            kind: EntryKind::Database,
            database: database.to_string(),
            collection: None,
            table_ref: None,
            field_type: None,
        }
    }

    #[must_use]
    pub fn collection(database: &str, collection: &str) -> Self {
        Self {
            kind: EntryKind::Collection,
            collection: Some(collection.to_string()),
            ..Self::database(database)
        }
    }

    #[must_use]
    pub fn doc_part(database: &str, collection: &str, table_ref: &TableRef) -> Self {
        Self {
            kind: EntryKind::DocPart,
            table_ref: Some(table_ref.clone()),
            ..Self::collection(database, collection)
        }
    }

    #[must_use]
    pub fn field(
        database: &str,
        collection: &str,
        table_ref: &TableRef,
        field_type: FieldType,
    ) -> Self {
        Self {
            kind: EntryKind::Field,
            field_type: Some(field_type),
            ..Self::doc_part(database, collection, table_ref)
        }
    }

    #[must_use]
    pub fn scalar(
        database: &str,
        collection: &str,
        table_ref: &TableRef,
        field_type: FieldType,
    ) -> Self {
        Self {
            kind: EntryKind::Scalar,
            ..Self::field(database, collection, table_ref, field_type)
        }
    }

    /// True when the key lies inside `database` (and `collection`, if given).
    #[must_use]
    pub fn in_scope(&self, database: &str, collection: Option<&str>) -> bool {
        self.database == database
            && collection.is_none_or(|c| self.collection.as_deref() == Some(c))
    }
}

impl Display for CatalogKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind.label(), self.database)?;
        if let Some(collection) = &self.collection {
            write!(f, ".{collection}")?;
        }
        if let Some(table_ref) = &self.table_ref {
            write!(f, " at {table_ref}")?;
        }
        if let Some(field_type) = self.field_type {
            write!(f, " ({field_type})")?;
        }

        Ok(())
    }
}

///
/// Namespace
///
/// Scope in which physical identifiers must be unique: schemas globally,
/// collection prefixes and tables per database, columns per doc-part table.
///

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Namespace {
    Schemas,
    Collections {
        database: String,
    },
    Tables {
        database: String,
    },
    Columns {
        database: String,
        collection: String,
        table_ref: TableRef,
    },
}

impl Namespace {
    /// True when the namespace disappears with `database`/`collection`.
    #[must_use]
    pub fn in_scope(&self, scope_database: &str, scope_collection: Option<&str>) -> bool {
        match self {
            Self::Schemas => false,
            Self::Collections { database } | Self::Tables { database } => {
                scope_collection.is_none() && database == scope_database
            }
            Self::Columns {
                database,
                collection,
                ..
            } => {
                database == scope_database
                    && scope_collection.is_none_or(|c| collection == c)
            }
        }
    }
}

impl Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Schemas => f.write_str("schemas"),
            Self::Collections { database } => write!(f, "collections of {database}"),
            Self::Tables { database } => write!(f, "tables of {database}"),
            Self::Columns {
                database,
                collection,
                table_ref,
            } => write!(f, "columns of {database}.{collection} at {table_ref}"),
        }
    }
}
