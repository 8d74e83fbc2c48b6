//! Module: catalog
//! Responsibility: the authoritative mapping from logical document paths to
//! physical schemas, tables and columns, plus its persistence.
//! Does not own: physical DDL execution or the decision of what to allocate.
//!
//! Readers take an immutable [`CatalogSnapshot`]. Writers stage allocations
//! in a [`WorkingCopy`] and merge them through [`Catalog::commit`], the only
//! serialized section in the engine. Writers whose physical structures are
//! committed afterwards use [`Catalog::begin_commit`] and settle or retract
//! the [`PendingCommit`] it returns; planners read
//! [`Catalog::settled_snapshot`]. A physical drop holds a [`DropFence`]
//! until its catalog scope is gone, so planners never resolve tables that
//! are being dropped.

mod entry;
mod ident;
mod snapshot;
mod store;
mod table_ref;
mod working;


use crate::{
    error::InternalError,
    obs::sink::{MetricsEvent, record},
};
use parking_lot::{Condvar, Mutex, RwLock};
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};
use thiserror::Error as ThisError;
use tracing::{debug, info, warn};

// re-exports
pub use entry::{
    CatalogEntry, CatalogKey, EntryKind, MetaCollection, MetaDatabase, MetaDocPart, MetaField,
    MetaScalarField, Namespace,
};
pub use ident::{IdentifierPolicy, RESERVED_COLUMNS, sanitize};
pub use snapshot::CatalogSnapshot;
pub use store::{MemoryMetaStore, MetaStore, StoreError, encode_key, scope_prefix};
pub use table_ref::{TableRef, TableRefStep};
pub use working::WorkingCopy;

///
/// CatalogConflictError
///
/// A concurrent commit won a race this working copy depended on.
/// Recovered by re-planning against the current snapshot.
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
#[remain::sorted]
pub enum CatalogConflictError {
    #[error("collection {database}.{collection} was dropped concurrently")]
    CollectionDropped {
        database: String,
        collection: String,
    },

    #[error("database {database} was dropped concurrently")]
    DatabaseDropped { database: String },

    #[error("identifier '{identifier}' is already taken in {namespace}")]
    IdentifierTaken {
        namespace: String,
        identifier: String,
    },

    #[error("{key} was committed concurrently")]
    KeyExists { key: String },

    #[error("scope changed between catalog versions {planned} and {current}")]
    SnapshotChanged { planned: u64, current: u64 },
}

///
/// SchemaInvariantError
///
/// Catalog structure violation. Never retried; indicates a planning bug or
/// a corrupt store.
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
#[remain::sorted]
pub enum SchemaInvariantError {
    #[error("identifier '{identifier}' staged twice in {namespace}")]
    DuplicateIdentifier {
        namespace: String,
        identifier: String,
    },

    #[error("collection {database}.{collection} is not in the catalog")]
    MissingCollection {
        database: String,
        collection: String,
    },

    #[error("database {database} is not in the catalog")]
    MissingDatabase { database: String },

    #[error("{database}.{collection} at {table_ref} has no owning doc part")]
    Orphan {
        database: String,
        collection: String,
        table_ref: TableRef,
    },

    #[error("a {field_type} value at the collection root has no owning table")]
    RootField {
        field_type: crate::FieldType,
    },
}

///
/// CommitReceipt
///
/// Entries published by one commit. Hand it back to [`Catalog::retract`]
/// if the physical transaction fails afterwards.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommitReceipt {
    version: u64,
    entries: Vec<CatalogEntry>,
}

impl CommitReceipt {
    /// Snapshot version the entries were published in.
    #[must_use]
    pub const fn version(&self) -> u64 {
        self.version
    }

    #[must_use]
    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

///
/// Catalog
///

pub struct Catalog {
    store: Arc<dyn MetaStore>,
    policy: IdentifierPolicy,
    current: RwLock<Arc<CatalogSnapshot>>,
    commit_lock: Mutex<()>,
    unsettled: Mutex<Settlement>,
    settled: Condvar,
}

///
/// Settlement
/// Published commits still waiting for their physical counterpart, and
/// scopes whose physical structures are being dropped.
///

#[derive(Debug, Default)]
struct Settlement {
    versions: BTreeSet<u64>,
    drops: BTreeMap<(String, Option<String>), usize>,
}

impl Settlement {
    fn is_settled(&self, version: u64) -> bool {
        self.drops.is_empty() && self.versions.first().is_none_or(|&oldest| oldest > version)
    }

    fn is_fenced(&self, database: &str, collection: &str) -> bool {
        self.drops.keys().any(|(db, coll)| {
            db == database && coll.as_deref().is_none_or(|c| c == collection)
        })
    }
}

impl Catalog {
    /// Rebuild the catalog from every entry in `store`.
    pub fn load(
        store: Arc<dyn MetaStore>,
        policy: IdentifierPolicy,
    ) -> Result<Self, InternalError> {
        let mut entries = Vec::new();
        for (key, bytes) in store.scan("")? {
            entries.push(store::decode_entry(&key, &bytes)?);
        }

        check_invariants(&CatalogSnapshot::default(), &entries)?;
        let snapshot = CatalogSnapshot::from_entries(0, entries);
        debug!(entries = snapshot.len(), "catalog loaded");

        Ok(Self::with_snapshot(store, policy, snapshot))
    }

    /// Empty catalog over a fresh in-memory store.
    #[must_use]
    pub fn in_memory(policy: IdentifierPolicy) -> Self {
        Self::with_snapshot(
            Arc::new(MemoryMetaStore::new()),
            policy,
            CatalogSnapshot::default(),
        )
    }

    fn with_snapshot(
        store: Arc<dyn MetaStore>,
        policy: IdentifierPolicy,
        snapshot: CatalogSnapshot,
    ) -> Self {
        Self {
            store,
            policy,
            current: RwLock::new(Arc::new(snapshot)),
            commit_lock: Mutex::new(()),
            unsettled: Mutex::new(Settlement::default()),
            settled: Condvar::new(),
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> Arc<CatalogSnapshot> {
        Arc::clone(&self.current.read())
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        self.current.read().version()
    }

    #[must_use]
    pub const fn policy(&self) -> IdentifierPolicy {
        self.policy
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn MetaStore> {
        &self.store
    }

    /// Working copy over the current snapshot.
    #[must_use]
    pub fn working_copy(&self) -> WorkingCopy {
        WorkingCopy::new(self.snapshot(), self.policy)
    }

    /// Identifier of the column for `(table_ref, field_type)`, if ever observed.
    #[must_use]
    pub fn resolve_field(
        &self,
        database: &str,
        collection: &str,
        table_ref: &TableRef,
        field_type: crate::FieldType,
    ) -> Option<String> {
        self.snapshot()
            .resolve_field(database, collection, table_ref, field_type)
            .map(|field| field.identifier.clone())
    }

    ///
    /// COMMIT
    ///

    /// Merge a working copy into the authoritative snapshot.
    ///
    /// Fails with a conflict when a concurrent commit already published a
    /// staged key or identifier, or dropped a scope the working copy writes
    /// into. Nothing is published on failure.
    pub fn commit(&self, working: WorkingCopy) -> Result<CommitReceipt, InternalError> {
        self.begin_commit(working).map(PendingCommit::settle)
    }

    /// Publish a working copy whose physical structures are still being
    /// committed.
    ///
    /// The entries are visible in [`Catalog::snapshot`] at once, but
    /// [`Catalog::settled_snapshot`] waits until the returned guard is
    /// settled or retracted. Dropping the guard retracts.
    pub fn begin_commit(&self, working: WorkingCopy) -> Result<PendingCommit<'_>, InternalError> {
        let _serial = self.commit_lock.lock();
        let current = self.snapshot();
        let (base, staged, required) = working.into_staged();

        check_conflicts(&current, &staged, &required).inspect_err(|err| {
            warn!(
                base = base.version(),
                current = current.version(),
                error = %err,
                "catalog commit conflict"
            );
            record(MetricsEvent::CommitConflict);
        })?;
        check_invariants(&current, &staged)?;

        if staged.is_empty() {
            return Ok(PendingCommit::new(
                self,
                CommitReceipt {
                    version: current.version(),
                    entries: staged,
                },
            ));
        }

        let mut guard = PersistGuard::new(self.store.as_ref());
        for entry in &staged {
            guard.put(entry)?;
        }

        let mut next = (*current).clone();
        for entry in &staged {
            next.insert(entry.clone());
        }
        let version = current.version() + 1;
        next.set_version(version);

        // Registered before publication so no reader sees the version settled.
        self.unsettled.lock().versions.insert(version);
        *self.current.write() = Arc::new(next);
        guard.finish();

        record(publication_event(&staged));
        info!(
            version,
            base = base.version(),
            entries = staged.len(),
            "catalog published"
        );

        Ok(PendingCommit::new(
            self,
            CommitReceipt {
                version,
                entries: staged,
            },
        ))
    }

    /// Conflict check of a working copy against the current snapshot,
    /// without committing it.
    pub fn check(&self, working: &WorkingCopy) -> Result<(), InternalError> {
        let _serial = self.commit_lock.lock();
        let staged: Vec<CatalogEntry> = working.staged().cloned().collect();
        let required: Vec<(String, String)> = working
            .required()
            .map(|(db, coll)| (db.to_string(), coll.to_string()))
            .collect();

        check_conflicts(&self.snapshot(), &staged, &required)?;

        Ok(())
    }

    /// The current snapshot once every commit it contains is settled and
    /// no drop is in flight.
    ///
    /// Planning against it guarantees that every identifier it resolves
    /// names a physically committed structure.
    #[must_use]
    pub fn settled_snapshot(&self) -> Arc<CatalogSnapshot> {
        let mut unsettled = self.unsettled.lock();
        loop {
            let snapshot = self.snapshot();
            if unsettled.is_settled(snapshot.version()) {
                return snapshot;
            }
            self.settled.wait(&mut unsettled);
        }
    }

    fn mark_settled(&self, version: u64) {
        if self.unsettled.lock().versions.remove(&version) {
            self.settled.notify_all();
        }
    }

    /// Hold planners off while the physical structures of a scope are
    /// dropped. Take it after planning the drop and release it once the
    /// catalog scope is removed (or the drop failed).
    pub fn fence_drop(&self, database: &str, collection: Option<&str>) -> DropFence<'_> {
        let scope = (database.to_string(), collection.map(str::to_string));
        *self.unsettled.lock().drops.entry(scope.clone()).or_insert(0) += 1;

        DropFence {
            catalog: self,
            scope,
        }
    }

    /// Whether a collection's scope moved since `planned`: a drop covering
    /// it is in flight, or its entries differ.
    #[must_use]
    pub fn scope_changed(
        &self,
        database: &str,
        collection: &str,
        planned: &CatalogSnapshot,
    ) -> bool {
        if self.unsettled.lock().is_fenced(database, collection) {
            return true;
        }

        let current = self.snapshot();
        planned.scope_keys(database, Some(collection))
            != current.scope_keys(database, Some(collection))
    }

    fn release_fence(&self, scope: &(String, Option<String>)) {
        let mut unsettled = self.unsettled.lock();
        if let Some(count) = unsettled.drops.get_mut(scope) {
            *count -= 1;
            if *count == 0 {
                unsettled.drops.remove(scope);
            }
        }
        self.settled.notify_all();
    }

    /// Withdraw the entries of a receipt, along with anything committed on
    /// top of them since. Their identifiers stay retired.
    pub fn retract(&self, receipt: &CommitReceipt) -> Result<(), InternalError> {
        if receipt.is_empty() {
            return Ok(());
        }

        let result = {
            let _serial = self.commit_lock.lock();
            self.retract_locked(receipt)
        };
        self.mark_settled(receipt.version());

        result
    }

    fn retract_locked(&self, receipt: &CommitReceipt) -> Result<(), InternalError> {
        let current = self.snapshot();

        let mut keys = BTreeSet::new();
        for entry in receipt.entries() {
            keys.insert(entry.key());
            keys.extend(current.dependents_of(entry));
        }

        let mut next = (*current).clone();
        let mut retired = 0_u64;
        let mut first_err = None;
        for key in &keys {
            if next.retire(key).is_some() {
                retired += 1;
            }
            if let Err(err) = self.store.delete(&store::encode_key(key)) {
                first_err.get_or_insert(err);
            }
        }
        let version = current.version() + 1;
        next.set_version(version);
        *self.current.write() = Arc::new(next);

        record(MetricsEvent::CatalogRetracted { entries: retired });
        warn!(
            version,
            receipt = receipt.version(),
            retired,
            "catalog commit retracted"
        );

        first_err.map_or(Ok(()), |err| Err(err.into()))
    }

    ///
    /// DROP
    ///

    /// Remove every entry of a collection. Returns the number removed.
    pub fn drop_collection(
        &self,
        database: &str,
        collection: &str,
    ) -> Result<usize, InternalError> {
        self.drop_scope(database, Some(collection), None)
    }

    /// Remove every entry of a database. Returns the number removed.
    pub fn drop_database(&self, database: &str) -> Result<usize, InternalError> {
        self.drop_scope(database, None, None)
    }

    /// [`Catalog::drop_collection`], provided the collection still holds
    /// exactly the entries it held in `planned`.
    ///
    /// Entries allocated after `planned` may name structures the caller
    /// never dropped; those fail the drop with a conflict instead.
    pub fn drop_collection_at(
        &self,
        database: &str,
        collection: &str,
        planned: &CatalogSnapshot,
    ) -> Result<usize, InternalError> {
        self.drop_scope(database, Some(collection), Some(planned))
    }

    /// [`Catalog::drop_database`] with the same check as
    /// [`Catalog::drop_collection_at`].
    pub fn drop_database_at(
        &self,
        database: &str,
        planned: &CatalogSnapshot,
    ) -> Result<usize, InternalError> {
        self.drop_scope(database, None, Some(planned))
    }

    fn drop_scope(
        &self,
        database: &str,
        collection: Option<&str>,
        planned: Option<&CatalogSnapshot>,
    ) -> Result<usize, InternalError> {
        let _serial = self.commit_lock.lock();
        let current = self.snapshot();
        if let Some(planned) = planned
            && planned.scope_keys(database, collection) != current.scope_keys(database, collection)
        {
            record(MetricsEvent::CommitConflict);
            return Err(CatalogConflictError::SnapshotChanged {
                planned: planned.version(),
                current: current.version(),
            }
            .into());
        }

        self.store
            .delete_prefix(&scope_prefix(database, collection))?;

        let mut next = (*current).clone();
        let removed = next.remove_scope(database, collection);
        if removed.is_empty() {
            return Ok(0);
        }

        let version = current.version() + 1;
        next.set_version(version);
        *self.current.write() = Arc::new(next);
        info!(
            version,
            database,
            collection = collection.unwrap_or("*"),
            removed = removed.len(),
            "catalog scope dropped"
        );

        Ok(removed.len())
    }
}

///
/// PendingCommit
///
/// A published commit waiting for its physical counterpart. `settle` once
/// the backend committed; `retract` (or drop) when it did not.
///

#[must_use = "a pending commit is retracted when dropped"]
pub struct PendingCommit<'a> {
    catalog: &'a Catalog,
    receipt: CommitReceipt,
    resolved: bool,
}

impl<'a> PendingCommit<'a> {
    const fn new(catalog: &'a Catalog, receipt: CommitReceipt) -> Self {
        Self {
            catalog,
            receipt,
            resolved: false,
        }
    }

    #[must_use]
    pub const fn receipt(&self) -> &CommitReceipt {
        &self.receipt
    }

    /// The physical structures are committed; release waiting planners.
    pub fn settle(mut self) -> CommitReceipt {
        self.resolved = true;
        // An empty receipt carries the version of someone else's commit.
        if !self.receipt.is_empty() {
            self.catalog.mark_settled(self.receipt.version());
        }

        self.receipt.clone()
    }

    /// Withdraw the published entries. Their identifiers stay retired.
    pub fn retract(mut self) -> Result<(), InternalError> {
        self.resolved = true;

        self.catalog.retract(&self.receipt)
    }
}

///
/// DropFence
///
/// Held while a scope's physical structures are dropped; see
/// [`Catalog::fence_drop`]. Released on drop.
///

#[must_use = "the fence is released when dropped"]
pub struct DropFence<'a> {
    catalog: &'a Catalog,
    scope: (String, Option<String>),
}

impl Drop for DropFence<'_> {
    fn drop(&mut self) {
        self.catalog.release_fence(&self.scope);
    }
}

impl Drop for PendingCommit<'_> {
    fn drop(&mut self) {
        if self.resolved {
            return;
        }

        if let Err(err) = self.catalog.retract(&self.receipt) {
            warn!(
                receipt = self.receipt.version(),
                error = %err,
                "retracting an abandoned commit failed"
            );
        }
    }
}

///
/// PersistGuard
///
/// Writes staged entries to the store and deletes them again unless
/// `finish` is reached.
///

struct PersistGuard<'a> {
    store: &'a dyn MetaStore,
    written: Vec<String>,
    finished: bool,
}

impl<'a> PersistGuard<'a> {
    const fn new(store: &'a dyn MetaStore) -> Self {
        Self {
            store,
            written: Vec::new(),
            finished: false,
        }
    }

    fn put(&mut self, entry: &CatalogEntry) -> Result<(), StoreError> {
        let key = encode_key(&entry.key());
        let bytes = store::encode_entry(&key, entry)?;
        if !self.store.put_if_absent(&key, bytes)? {
            return Err(StoreError::Corrupt {
                key,
                reason: "present in the store but not in the catalog".to_string(),
            });
        }
        self.written.push(key);

        Ok(())
    }

    const fn finish(&mut self) {
        self.finished = true;
    }
}

impl Drop for PersistGuard<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }

        while let Some(key) = self.written.pop() {
            if let Err(err) = self.store.delete(&key) {
                warn!(key, error = %err, "catalog persist rollback failed");
            }
        }
    }
}

///
/// CHECKS
///

fn publication_event(entries: &[CatalogEntry]) -> MetricsEvent {
    let count = |kind: EntryKind| {
        let n = entries.iter().filter(|e| e.kind() == kind).count();
        u64::try_from(n).unwrap_or(u64::MAX)
    };

    MetricsEvent::CatalogPublished {
        databases: count(EntryKind::Database),
        collections: count(EntryKind::Collection),
        doc_parts: count(EntryKind::DocPart),
        fields: count(EntryKind::Field),
        scalar_tables: count(EntryKind::Scalar),
    }
}

fn has_entry(
    current: &CatalogSnapshot,
    staged: &BTreeMap<CatalogKey, &CatalogEntry>,
    key: &CatalogKey,
) -> bool {
    current.contains(key) || staged.contains_key(key)
}

fn check_scope(
    current: &CatalogSnapshot,
    staged: &BTreeMap<CatalogKey, &CatalogEntry>,
    database: &str,
    collection: Option<&str>,
) -> Result<(), CatalogConflictError> {
    if !has_entry(current, staged, &CatalogKey::database(database)) {
        return Err(CatalogConflictError::DatabaseDropped {
            database: database.to_string(),
        });
    }
    if let Some(collection) = collection
        && !has_entry(current, staged, &CatalogKey::collection(database, collection))
    {
        return Err(CatalogConflictError::CollectionDropped {
            database: database.to_string(),
            collection: collection.to_string(),
        });
    }

    Ok(())
}

fn check_conflicts(
    current: &CatalogSnapshot,
    staged: &[CatalogEntry],
    required: &[(String, String)],
) -> Result<(), CatalogConflictError> {
    let by_key: BTreeMap<CatalogKey, &CatalogEntry> =
        staged.iter().map(|entry| (entry.key(), entry)).collect();

    for (key, entry) in &by_key {
        if current.contains(key) {
            return Err(CatalogConflictError::KeyExists {
                key: key.to_string(),
            });
        }
        if let Some(namespace) = entry.namespace()
            && current.is_taken(&namespace, entry.identifier())
        {
            return Err(CatalogConflictError::IdentifierTaken {
                namespace: namespace.to_string(),
                identifier: entry.identifier().to_string(),
            });
        }
        if !matches!(entry, CatalogEntry::Database(_)) {
            check_scope(current, &by_key, entry.database(), entry.collection())?;
        }
    }

    for (database, collection) in required {
        check_scope(current, &by_key, database, Some(collection))?;
    }

    Ok(())
}

fn check_invariants(
    current: &CatalogSnapshot,
    staged: &[CatalogEntry],
) -> Result<(), SchemaInvariantError> {
    let by_key: BTreeMap<CatalogKey, &CatalogEntry> =
        staged.iter().map(|entry| (entry.key(), entry)).collect();

    let mut identifiers = BTreeSet::new();
    for entry in staged {
        check_owner(current, &by_key, entry)?;

        if let Some(namespace) = entry.namespace()
            && !identifiers.insert((namespace.clone(), entry.identifier().to_string()))
        {
            return Err(SchemaInvariantError::DuplicateIdentifier {
                namespace: namespace.to_string(),
                identifier: entry.identifier().to_string(),
            });
        }
    }

    Ok(())
}

/// Every entry needs its owner: collections their database, root doc parts
/// their collection, everything else the doc part one level up.
fn check_owner(
    current: &CatalogSnapshot,
    staged: &BTreeMap<CatalogKey, &CatalogEntry>,
    entry: &CatalogEntry,
) -> Result<(), SchemaInvariantError> {
    let orphan = |database: &str, collection: &str, table_ref: &TableRef| {
        SchemaInvariantError::Orphan {
            database: database.to_string(),
            collection: collection.to_string(),
            table_ref: table_ref.clone(),
        }
    };

    match entry {
        CatalogEntry::Database(_) => Ok(()),
        CatalogEntry::Collection(e) => {
            if has_entry(current, staged, &CatalogKey::database(&e.database)) {
                Ok(())
            } else {
                Err(SchemaInvariantError::MissingDatabase {
                    database: e.database.clone(),
                })
            }
        }
        CatalogEntry::DocPart(e) => match e.table_ref.parent() {
            None if has_entry(
                current,
                staged,
                &CatalogKey::collection(&e.database, &e.collection),
            ) =>
            {
                Ok(())
            }
            None => Err(SchemaInvariantError::MissingCollection {
                database: e.database.clone(),
                collection: e.collection.clone(),
            }),
            Some(parent) => {
                let key = CatalogKey::doc_part(&e.database, &e.collection, &parent);
                if has_entry(current, staged, &key) {
                    Ok(())
                } else {
                    Err(orphan(&e.database, &e.collection, &e.table_ref))
                }
            }
        },
        CatalogEntry::Field(MetaField {
            database,
            collection,
            table_ref,
            ..
        })
        | CatalogEntry::Scalar(MetaScalarField {
            database,
            collection,
            table_ref,
            ..
        }) => {
            let owned = table_ref.parent().is_some_and(|parent| {
                has_entry(
                    current,
                    staged,
                    &CatalogKey::doc_part(database, collection, &parent),
                )
            });
            if owned {
                Ok(())
            } else {
                Err(orphan(database, collection, table_ref))
            }
        }
    }
}
