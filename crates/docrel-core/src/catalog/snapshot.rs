use crate::{
    ALL_FIELD_TYPES, FieldType,
    catalog::{
        CatalogEntry, CatalogKey, EntryKind, MetaCollection, MetaDatabase, MetaDocPart, MetaField,
        MetaScalarField, Namespace, TableRef,
    },
};
use std::collections::{BTreeMap, BTreeSet};

///
/// CatalogSnapshot
///
/// Immutable, versioned view of every catalog entry. Readers hold an
/// `Arc<CatalogSnapshot>`; commits publish a new one.
///
/// `identifiers` indexes live identifiers per namespace. `retired` holds
/// identifiers that were published once and must never be handed out again.
///

#[derive(Clone, Debug, Default)]
pub struct CatalogSnapshot {
    version: u64,
    entries: BTreeMap<CatalogKey, CatalogEntry>,
    identifiers: BTreeMap<Namespace, BTreeSet<String>>,
    retired: BTreeMap<Namespace, BTreeSet<String>>,
}

impl CatalogSnapshot {
    pub(crate) fn from_entries(
        version: u64,
        entries: impl IntoIterator<Item = CatalogEntry>,
    ) -> Self {
        let mut snapshot = Self {
            version,
            ..Self::default()
        };
        for entry in entries {
            snapshot.insert(entry);
        }

        snapshot
    }

    #[must_use]
    pub const fn version(&self) -> u64 {
        self.version
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.values()
    }

    #[must_use]
    pub fn get(&self, key: &CatalogKey) -> Option<&CatalogEntry> {
        self.entries.get(key)
    }

    #[must_use]
    pub fn contains(&self, key: &CatalogKey) -> bool {
        self.entries.contains_key(key)
    }

    ///
    /// RESOLVE
    ///

    #[must_use]
    pub fn resolve_database(&self, database: &str) -> Option<&MetaDatabase> {
        match self.get(&CatalogKey::database(database))? {
            CatalogEntry::Database(e) => Some(e),
            _ => None,
        }
    }

    #[must_use]
    pub fn resolve_collection(&self, database: &str, collection: &str) -> Option<&MetaCollection> {
        match self.get(&CatalogKey::collection(database, collection))? {
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
        match self.get(&CatalogKey::doc_part(database, collection, table_ref))? {
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
        match self.get(&CatalogKey::field(database, collection, table_ref, field_type))? {
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
        match self.get(&CatalogKey::scalar(database, collection, table_ref, field_type))? {
            CatalogEntry::Scalar(e) => Some(e),
            _ => None,
        }
    }

    /// Scalar FieldTypes with a column at `table_ref`, in FieldType order.
    pub fn field_types<'a>(
        &'a self,
        database: &'a str,
        collection: &'a str,
        table_ref: &'a TableRef,
    ) -> impl Iterator<Item = FieldType> + 'a {
        ALL_FIELD_TYPES.into_iter().filter(move |ft| {
            ft.is_scalar()
                && self
                    .resolve_field(database, collection, table_ref, *ft)
                    .is_some()
        })
    }

    /// FieldTypes with a side-table for the array at `table_ref`.
    pub fn scalar_types<'a>(
        &'a self,
        database: &'a str,
        collection: &'a str,
        table_ref: &'a TableRef,
    ) -> impl Iterator<Item = FieldType> + 'a {
        ALL_FIELD_TYPES.into_iter().filter(move |ft| {
            self.resolve_scalar(database, collection, table_ref, *ft)
                .is_some()
        })
    }

    ///
    /// LISTING
    ///

    pub fn databases(&self) -> impl Iterator<Item = &MetaDatabase> {
        self.entries.values().filter_map(|entry| match entry {
            CatalogEntry::Database(e) => Some(e),
            _ => None,
        })
    }

    pub fn collections<'a>(
        &'a self,
        database: &'a str,
    ) -> impl Iterator<Item = &'a MetaCollection> {
        self.entries.values().filter_map(move |entry| match entry {
            CatalogEntry::Collection(e) if e.database == database => Some(e),
            _ => None,
        })
    }

    /// Doc parts of a collection, parents before children.
    pub fn doc_parts<'a>(
        &'a self,
        database: &'a str,
        collection: &'a str,
    ) -> impl Iterator<Item = &'a MetaDocPart> {
        self.entries.values().filter_map(move |entry| match entry {
            CatalogEntry::DocPart(e) if e.database == database && e.collection == collection => {
                Some(e)
            }
            _ => None,
        })
    }

    /// Columns stored on the doc-part table at `doc_part`.
    pub fn columns_of<'a>(
        &'a self,
        database: &'a str,
        collection: &'a str,
        doc_part: &'a TableRef,
    ) -> impl Iterator<Item = &'a MetaField> {
        self.entries.values().filter_map(move |entry| match entry {
            CatalogEntry::Field(e)
                if e.database == database
                    && e.collection == collection
                    && e.table_ref.parent().as_ref() == Some(doc_part) =>
            {
                Some(e)
            }
            _ => None,
        })
    }

    /// Side-tables of a collection.
    pub fn scalar_tables<'a>(
        &'a self,
        database: &'a str,
        collection: &'a str,
    ) -> impl Iterator<Item = &'a MetaScalarField> {
        self.entries.values().filter_map(move |entry| match entry {
            CatalogEntry::Scalar(e) if e.database == database && e.collection == collection => {
                Some(e)
            }
            _ => None,
        })
    }

    ///
    /// IDENTIFIERS
    ///

    /// Live in `namespace` right now.
    #[must_use]
    pub fn is_live(&self, namespace: &Namespace, identifier: &str) -> bool {
        self.identifiers
            .get(namespace)
            .is_some_and(|set| set.contains(identifier))
    }

    #[must_use]
    pub fn is_retired(&self, namespace: &Namespace, identifier: &str) -> bool {
        self.retired
            .get(namespace)
            .is_some_and(|set| set.contains(identifier))
    }

    /// Unavailable for a new allocation in `namespace`.
    #[must_use]
    pub fn is_taken(&self, namespace: &Namespace, identifier: &str) -> bool {
        self.is_live(namespace, identifier) || self.is_retired(namespace, identifier)
    }

    ///
    /// MUTATION (commit path only)
    ///

    pub(crate) const fn set_version(&mut self, version: u64) {
        self.version = version;
    }

    pub(crate) fn insert(&mut self, entry: CatalogEntry) {
        if let Some(namespace) = entry.namespace() {
            self.identifiers
                .entry(namespace)
                .or_default()
                .insert(entry.identifier().to_string());
        }
        self.entries.insert(entry.key(), entry);
    }

    /// Remove one entry; its identifier moves to the retired set.
    pub(crate) fn retire(&mut self, key: &CatalogKey) -> Option<CatalogEntry> {
        let entry = self.entries.remove(key)?;
        if let Some(namespace) = entry.namespace() {
            if let Some(set) = self.identifiers.get_mut(&namespace) {
                set.remove(entry.identifier());
            }
            self.retired
                .entry(namespace)
                .or_default()
                .insert(entry.identifier().to_string());
        }

        Some(entry)
    }

    /// Remove every entry at or below the scope, freeing its namespaces.
    /// Returns the removed entries.
    pub(crate) fn remove_scope(
        &mut self,
        database: &str,
        collection: Option<&str>,
    ) -> Vec<CatalogEntry> {
        let keys: Vec<CatalogKey> = self
            .entries
            .keys()
            .filter(|key| key.in_scope(database, collection))
            .cloned()
            .collect();

        let removed: Vec<CatalogEntry> = keys
            .iter()
            .filter_map(|key| self.entries.remove(key))
            .collect();

        for entry in &removed {
            if let Some(namespace) = entry.namespace()
                && let Some(set) = self.identifiers.get_mut(&namespace)
            {
                set.remove(entry.identifier());
            }
        }
        self.identifiers
            .retain(|namespace, set| !set.is_empty() && !namespace.in_scope(database, collection));
        self.retired
            .retain(|namespace, _| !namespace.in_scope(database, collection));

        removed
    }

    /// Keys of the entries that cannot outlive `entry`: everything inside a
    /// database or collection, and the doc parts, columns and side-tables
    /// below a doc part.
    #[must_use]
    pub fn dependents_of(&self, entry: &CatalogEntry) -> Vec<CatalogKey> {
        let keys = self.entries.keys();
        match entry {
            CatalogEntry::Database(e) => keys
                .filter(|key| key.in_scope(&e.name, None))
                .cloned()
                .collect(),
            CatalogEntry::Collection(e) => keys
                .filter(|key| key.in_scope(&e.database, Some(&e.name)))
                .cloned()
                .collect(),
            CatalogEntry::DocPart(e) => keys
                .filter(|key| {
                    key.in_scope(&e.database, Some(&e.collection))
                        && key
                            .table_ref
                            .as_ref()
                            .is_some_and(|table_ref| table_ref.is_descendant_of(&e.table_ref))
                })
                .cloned()
                .collect(),
            CatalogEntry::Field(_) | CatalogEntry::Scalar(_) => Vec::new(),
        }
    }

    /// Keys of every entry at or below the scope, in key order.
    #[must_use]
    pub fn scope_keys(&self, database: &str, collection: Option<&str>) -> Vec<&CatalogKey> {
        self.entries
            .keys()
            .filter(|key| key.in_scope(database, collection))
            .collect()
    }

    /// Count of entries of `kind`.
    #[must_use]
    pub fn count(&self, kind: EntryKind) -> usize {
        self.entries.keys().filter(|key| key.kind == kind).count()
    }
}
