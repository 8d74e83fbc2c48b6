use crate::{
    FieldType,
    catalog::{
        CatalogEntry, CatalogKey, CatalogSnapshot, MetaCollection, MetaDatabase, MetaDocPart,
        MetaField, MetaScalarField, Namespace, SchemaInvariantError, TableRef,
        ident::{self, IdentifierPolicy, RESERVED_COLUMNS},
    },
};
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

///
/// WorkingCopy
///
/// Private, mutable overlay over the snapshot current at job start.
/// Allocations are staged here and merged into the catalog only by
/// `Catalog::commit` or `Catalog::begin_commit`. Every `allocate_*` call is
/// idempotent: it returns the identifier already known to the overlay when
/// the key exists.
///

#[derive(Clone, Debug)]
pub struct WorkingCopy {
    base: Arc<CatalogSnapshot>,
    policy: IdentifierPolicy,
    staged: BTreeMap<CatalogKey, CatalogEntry>,
    staged_identifiers: BTreeSet<(Namespace, String)>,
    required: BTreeSet<(String, String)>,
}

impl WorkingCopy {
    #[must_use]
    pub fn new(base: Arc<CatalogSnapshot>, policy: IdentifierPolicy) -> Self {
        Self {
            base,
            policy,
            staged: BTreeMap::new(),
            staged_identifiers: BTreeSet::new(),
            required: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn base(&self) -> &Arc<CatalogSnapshot> {
        &self.base
    }

    #[must_use]
    pub fn base_version(&self) -> u64 {
        self.base.version()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.staged.len()
    }

    /// Staged entries in key order.
    pub fn staged(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.staged.values()
    }

    /// Collections this working copy writes into, staged or not.
    pub fn required(&self) -> impl Iterator<Item = (&str, &str)> {
        self.required
            .iter()
            .map(|(db, collection)| (db.as_str(), collection.as_str()))
    }

    pub(crate) fn into_staged(
        self,
    ) -> (Arc<CatalogSnapshot>, Vec<CatalogEntry>, Vec<(String, String)>) {
        (
            self.base,
            self.staged.into_values().collect(),
            self.required.into_iter().collect(),
        )
    }

    /// Record that the job writes into `collection`, so the commit fails if
    /// the collection is dropped meanwhile.
    pub fn require_collection(&mut self, database: &str, collection: &str) {
        self.required
            .insert((database.to_string(), collection.to_string()));
    }

    ///
    /// RESOLVE
    ///

    fn lookup(&self, key: &CatalogKey) -> Option<&CatalogEntry> {
        self.staged.get(key).or_else(|| self.base.get(key))
    }

    #[must_use]
    pub fn resolve_database(&self, database: &str) -> Option<&MetaDatabase> {
        match self.lookup(&CatalogKey::database(database))? {
            CatalogEntry::Database(e) => Some(e),
            _ => None,
        }
    }

    #[must_use]
    pub fn resolve_collection(&self, database: &str, collection: &str) -> Option<&MetaCollection> {
        match self.lookup(&CatalogKey::collection(database, collection))? {
            CatalogEntry::Collection(e) => Some(e),
            _ => None,
        }
    }

    #[must_use]
    pub fn resolve_doc_part(
        &self,
        database: &str,
        collection: &str,
        table_ref: &TableRef,
    ) -> Option<&MetaDocPart> {
        match self.lookup(&CatalogKey::doc_part(database, collection, table_ref))? {
            CatalogEntry::DocPart(e) => Some(e),
            _ => None,
        }
    }

    #[must_use]
    pub fn resolve_field(
        &self,
        database: &str,
        collection: &str,
        table_ref: &TableRef,
        field_type: FieldType,
    ) -> Option<&MetaField> {
        match self.lookup(&CatalogKey::field(database, collection, table_ref, field_type))? {
            CatalogEntry::Field(e) => Some(e),
            _ => None,
        }
    }

    #[must_use]
    pub fn resolve_scalar(
        &self,
        database: &str,
        collection: &str,
        table_ref: &TableRef,
        field_type: FieldType,
    ) -> Option<&MetaScalarField> {
        match self.lookup(&CatalogKey::scalar(database, collection, table_ref, field_type))? {
            CatalogEntry::Scalar(e) => Some(e),
            _ => None,
        }
    }

    ///
    /// ALLOCATE
    ///

    pub fn allocate_database(&mut self, database: &str) -> String {
        if let Some(existing) = self.resolve_database(database) {
            return existing.identifier.clone();
        }

        let identifier = self.derive(&Namespace::Schemas, &ident::sanitize(database), "");
        self.stage(CatalogEntry::Database(MetaDatabase {
            name: database.to_string(),
            identifier: identifier.clone(),
        }));

        identifier
    }

    /// Allocate the collection and, when new, its database.
    pub fn allocate_collection(&mut self, database: &str, collection: &str) -> String {
        self.require_collection(database, collection);
        if let Some(existing) = self.resolve_collection(database, collection) {
            return existing.identifier.clone();
        }

        self.allocate_database(database);
        let namespace = Namespace::Collections {
            database: database.to_string(),
        };
        let identifier = self.derive(&namespace, &ident::sanitize(collection), "");
        self.stage(CatalogEntry::Collection(MetaCollection {
            database: database.to_string(),
            name: collection.to_string(),
            identifier: identifier.clone(),
        }));

        identifier
    }

    /// Allocate the doc-part table at `table_ref`.
    ///
    /// The collection and every ancestor doc part must already be known;
    /// parts are allocated parents first.
    pub fn allocate_doc_part(
        &mut self,
        database: &str,
        collection: &str,
        table_ref: &TableRef,
    ) -> Result<String, SchemaInvariantError> {
        if let Some(existing) = self.resolve_doc_part(database, collection, table_ref) {
            return Ok(existing.identifier.clone());
        }

        let prefix = self
            .resolve_collection(database, collection)
            .map(|c| c.identifier.clone())
            .ok_or_else(|| SchemaInvariantError::MissingCollection {
                database: database.to_string(),
                collection: collection.to_string(),
            })?;
        if let Some(parent) = table_ref.parent() {
            self.require_doc_part(database, collection, &parent, table_ref)?;
        }

        let namespace = Namespace::Tables {
            database: database.to_string(),
        };
        let identifier = self.derive(&namespace, &ident::table_stem(&prefix, table_ref), "");
        self.stage(CatalogEntry::DocPart(MetaDocPart {
            database: database.to_string(),
            collection: collection.to_string(),
            table_ref: table_ref.clone(),
            identifier: identifier.clone(),
        }));

        Ok(identifier)
    }

    /// Allocate the column for `field_type` values at `field_ref`.
    pub fn allocate_field(
        &mut self,
        database: &str,
        collection: &str,
        field_ref: &TableRef,
        field_type: FieldType,
    ) -> Result<String, SchemaInvariantError> {
        if let Some(existing) = self.resolve_field(database, collection, field_ref, field_type) {
            return Ok(existing.identifier.clone());
        }

        let owner = field_ref
            .parent()
            .ok_or(SchemaInvariantError::RootField { field_type })?;
        self.require_doc_part(database, collection, &owner, field_ref)?;

        let namespace = Namespace::Columns {
            database: database.to_string(),
            collection: collection.to_string(),
            table_ref: owner,
        };
        let identifier = self.derive(
            &namespace,
            &ident::column_stem(field_ref),
            &ident::type_tail(field_type),
        );
        self.stage(CatalogEntry::Field(MetaField {
            database: database.to_string(),
            collection: collection.to_string(),
            table_ref: field_ref.clone(),
            field_type,
            identifier: identifier.clone(),
        }));

        Ok(identifier)
    }

    /// Allocate the side-table for `field_type` runs of the array at
    /// `array_ref`.
    pub fn allocate_scalar(
        &mut self,
        database: &str,
        collection: &str,
        array_ref: &TableRef,
        field_type: FieldType,
    ) -> Result<String, SchemaInvariantError> {
        if let Some(existing) = self.resolve_scalar(database, collection, array_ref, field_type) {
            return Ok(existing.identifier.clone());
        }

        let owner = array_ref
            .parent()
            .ok_or(SchemaInvariantError::RootField { field_type })?;
        self.require_doc_part(database, collection, &owner, array_ref)?;
        let prefix = self
            .resolve_collection(database, collection)
            .map(|c| c.identifier.clone())
            .ok_or_else(|| SchemaInvariantError::MissingCollection {
                database: database.to_string(),
                collection: collection.to_string(),
            })?;

        let namespace = Namespace::Tables {
            database: database.to_string(),
        };
        let identifier = self.derive(
            &namespace,
            &ident::table_stem(&prefix, array_ref),
            &ident::type_tail(field_type),
        );
        self.stage(CatalogEntry::Scalar(MetaScalarField {
            database: database.to_string(),
            collection: collection.to_string(),
            table_ref: array_ref.clone(),
            field_type,
            identifier: identifier.clone(),
        }));

        Ok(identifier)
    }

    ///
    /// INTERNAL
    ///

    fn require_doc_part(
        &self,
        database: &str,
        collection: &str,
        owner: &TableRef,
        table_ref: &TableRef,
    ) -> Result<(), SchemaInvariantError> {
        if self.resolve_doc_part(database, collection, owner).is_some() {
            return Ok(());
        }

        Err(SchemaInvariantError::Orphan {
            database: database.to_string(),
            collection: collection.to_string(),
            table_ref: table_ref.clone(),
        })
    }

    fn derive(&self, namespace: &Namespace, stem: &str, tail: &str) -> String {
        let reserved = matches!(namespace, Namespace::Columns { .. });

        self.policy.derive(stem, tail, |candidate| {
            (reserved && RESERVED_COLUMNS.contains(&candidate))
                || self.base.is_taken(namespace, candidate)
                || self
                    .staged_identifiers
                    .contains(&(namespace.clone(), candidate.to_string()))
        })
    }

    fn stage(&mut self, entry: CatalogEntry) {
        if let Some(namespace) = entry.namespace() {
            self.staged_identifiers
                .insert((namespace, entry.identifier().to_string()));
        }
        self.staged.insert(entry.key(), entry);
    }
}
