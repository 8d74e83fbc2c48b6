use crate::{
    FieldType,
    catalog::{CatalogSnapshot, TableRef, WorkingCopy},
    error::InternalError,
    schema::walk::WalkedDoc,
};
use std::collections::BTreeMap;

///
/// Resolution
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Resolution {
    /// Never observed; needs an allocation.
    Pending,
    /// Already mapped to this physical identifier.
    Resolved(String),
}

impl Resolution {
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    #[must_use]
    pub fn identifier(&self) -> Option<&str> {
        match self {
            Self::Pending => None,
            Self::Resolved(identifier) => Some(identifier),
        }
    }
}

///
/// SchemaDiff
///
/// Everything a batch of documents touches in one collection, split into
/// pending allocations and already-resolved identifiers.
/// `is_empty` ignores resolved entries.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SchemaDiff {
    database: String,
    collection: String,
    base_version: u64,
    new_database: bool,
    new_collection: bool,
    doc_parts: BTreeMap<TableRef, Resolution>,
    fields: BTreeMap<(TableRef, FieldType), Resolution>,
    scalars: BTreeMap<(TableRef, FieldType), Resolution>,
}

impl SchemaDiff {
    pub(crate) fn new(snapshot: &CatalogSnapshot, database: &str, collection: &str) -> Self {
        let mut diff = Self {
            database: database.to_string(),
            collection: collection.to_string(),
            base_version: snapshot.version(),
            new_database: snapshot.resolve_database(database).is_none(),
            new_collection: snapshot.resolve_collection(database, collection).is_none(),
            doc_parts: BTreeMap::new(),
            fields: BTreeMap::new(),
            scalars: BTreeMap::new(),
        };
        diff.note_doc_part(snapshot, &TableRef::root());

        diff
    }

    /// Fold one walked document into the diff.
    pub(crate) fn absorb(&mut self, snapshot: &CatalogSnapshot, walked: &WalkedDoc<'_>) {
        for row in &walked.rows {
            self.note_doc_part(snapshot, &row.table_ref);
            for cell in &row.cells {
                if self
                    .fields
                    .contains_key(&(cell.field_ref.clone(), cell.field_type))
                {
                    continue;
                }
                let resolution = snapshot
                    .resolve_field(
                        &self.database,
                        &self.collection,
                        &cell.field_ref,
                        cell.field_type,
                    )
                    .map_or(Resolution::Pending, |f| {
                        Resolution::Resolved(f.identifier.clone())
                    });
                self.fields
                    .insert((cell.field_ref.clone(), cell.field_type), resolution);
            }
        }

        for run in &walked.runs {
            let key = (run.array_ref.clone(), run.field_type);
            if self.scalars.contains_key(&key) {
                continue;
            }
            let resolution = snapshot
                .resolve_scalar(
                    &self.database,
                    &self.collection,
                    &run.array_ref,
                    run.field_type,
                )
                .map_or(Resolution::Pending, |s| {
                    Resolution::Resolved(s.identifier.clone())
                });
            self.scalars.insert(key, resolution);
        }
    }

    fn note_doc_part(&mut self, snapshot: &CatalogSnapshot, table_ref: &TableRef) {
        if self.doc_parts.contains_key(table_ref) {
            return;
        }
        let resolution = snapshot
            .resolve_doc_part(&self.database, &self.collection, table_ref)
            .map_or(Resolution::Pending, |d| {
                Resolution::Resolved(d.identifier.clone())
            });
        self.doc_parts.insert(table_ref.clone(), resolution);
    }

    ///
    /// ACCESSORS
    ///

    #[must_use]
    pub fn database(&self) -> &str {
        &self.database
    }

    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Version of the snapshot this diff was planned against.
    #[must_use]
    pub const fn base_version(&self) -> u64 {
        self.base_version
    }

    #[must_use]
    pub const fn needs_database(&self) -> bool {
        self.new_database
    }

    #[must_use]
    pub const fn needs_collection(&self) -> bool {
        self.new_collection
    }

    /// True when nothing needs allocating.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending_count() == 0
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        usize::from(self.new_database)
            + usize::from(self.new_collection)
            + self.doc_parts.values().filter(|r| r.is_pending()).count()
            + self.fields.values().filter(|r| r.is_pending()).count()
            + self.scalars.values().filter(|r| r.is_pending()).count()
    }

    /// Doc parts to create, parents first.
    pub fn pending_doc_parts(&self) -> impl Iterator<Item = &TableRef> {
        self.doc_parts
            .iter()
            .filter(|(_, r)| r.is_pending())
            .map(|(table_ref, _)| table_ref)
    }

    pub fn pending_fields(&self) -> impl Iterator<Item = (&TableRef, FieldType)> {
        self.fields
            .iter()
            .filter(|(_, r)| r.is_pending())
            .map(|((table_ref, ft), _)| (table_ref, *ft))
    }

    pub fn pending_scalars(&self) -> impl Iterator<Item = (&TableRef, FieldType)> {
        self.scalars
            .iter()
            .filter(|(_, r)| r.is_pending())
            .map(|((table_ref, ft), _)| (table_ref, *ft))
    }

    pub fn resolved_doc_parts(&self) -> impl Iterator<Item = (&TableRef, &str)> {
        self.doc_parts
            .iter()
            .filter_map(|(table_ref, r)| Some((table_ref, r.identifier()?)))
    }

    pub fn resolved_fields(&self) -> impl Iterator<Item = (&TableRef, FieldType, &str)> {
        self.fields
            .iter()
            .filter_map(|((table_ref, ft), r)| Some((table_ref, *ft, r.identifier()?)))
    }

    pub fn resolved_scalars(&self) -> impl Iterator<Item = (&TableRef, FieldType, &str)> {
        self.scalars
            .iter()
            .filter_map(|((table_ref, ft), r)| Some((table_ref, *ft, r.identifier()?)))
    }

    /// Resolution for one field, if the batch touches it.
    #[must_use]
    pub fn field(&self, table_ref: &TableRef, field_type: FieldType) -> Option<&Resolution> {
        self.fields.get(&(table_ref.clone(), field_type))
    }

    #[must_use]
    pub fn scalar(&self, table_ref: &TableRef, field_type: FieldType) -> Option<&Resolution> {
        self.scalars.get(&(table_ref.clone(), field_type))
    }

    ///
    /// APPLY
    ///

    /// Stage every pending allocation in `working`, owners before the
    /// entries they own.
    pub fn apply(&self, working: &mut WorkingCopy) -> Result<(), InternalError> {
        working.allocate_collection(&self.database, &self.collection);

        for table_ref in self.pending_doc_parts() {
            working.allocate_doc_part(&self.database, &self.collection, table_ref)?;
        }
        for (field_ref, field_type) in self.pending_fields() {
            working.allocate_field(&self.database, &self.collection, field_ref, field_type)?;
        }
        for (array_ref, field_type) in self.pending_scalars() {
            working.allocate_scalar(&self.database, &self.collection, array_ref, field_type)?;
        }

        Ok(())
    }
}
