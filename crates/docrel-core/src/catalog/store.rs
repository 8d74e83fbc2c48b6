//! Catalog persistence boundary.
//!
//! Keys are `/`-separated, escaped and scope-first
//! (`database/collection/kind/table-ref/type`), so dropping a scope is one
//! prefix delete. Values are CBOR-encoded [`CatalogEntry`]s.

use crate::{
    MAX_META_ENTRY_BYTES,
    catalog::{CatalogEntry, CatalogKey, EntryKind, TableRef, TableRefStep},
    serialize::{deserialize, serialize},
};
use parking_lot::RwLock;
use std::{
    collections::BTreeMap,
    fmt::Write as _,
    sync::atomic::{AtomicBool, Ordering},
};
use thiserror::Error as ThisError;

///
/// StoreError
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
#[remain::sorted]
pub enum StoreError {
    #[error("metadata store failure: {message}")]
    Backend { message: String },

    #[error("corrupt catalog entry '{key}': {reason}")]
    Corrupt { key: String, reason: String },

    #[error("cannot encode catalog entry '{key}': {reason}")]
    Encode { key: String, reason: String },
}

///
/// MetaStore
///
/// Transactional key-value collaborator holding the authoritative catalog.
///

pub trait MetaStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Store `value` unless `key` is present. Returns whether it was stored.
    fn put_if_absent(&self, key: &str, value: Vec<u8>) -> Result<bool, StoreError>;

    /// All pairs whose key starts with `prefix`, in key order.
    fn scan(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StoreError>;

    /// Remove one key. Returns whether it was present.
    fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Remove every key starting with `prefix`. Returns the count removed.
    fn delete_prefix(&self, prefix: &str) -> Result<usize, StoreError>;
}

///
/// MemoryMetaStore
///

#[derive(Debug, Default)]
pub struct MemoryMetaStore {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
    fail_writes: AtomicBool,
}

impl MemoryMetaStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail with a backend error.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend {
                message: "writes disabled".to_string(),
            });
        }

        Ok(())
    }
}

impl MetaStore for MemoryMetaStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn put_if_absent(&self, key: &str, value: Vec<u8>) -> Result<bool, StoreError> {
        self.check_writable()?;

        let mut entries = self.entries.write();
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(key.to_string(), value);

        Ok(true)
    }

    fn scan(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StoreError> {
        Ok(self
            .entries
            .read()
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }

    fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.check_writable()?;

        Ok(self.entries.write().remove(key).is_some())
    }

    fn delete_prefix(&self, prefix: &str) -> Result<usize, StoreError> {
        self.check_writable()?;

        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));

        Ok(before - entries.len())
    }
}

///
/// KEYS
///

fn escape_into(out: &mut String, raw: &str) {
    for c in raw.chars() {
        match c {
            '%' | '/' | '.' | '$' => {
                let _ = write!(out, "%{:02X}", u32::from(c));
            }
            c => out.push(c),
        }
    }
}

fn encode_table_ref(out: &mut String, table_ref: &TableRef) {
    out.push('$');
    for step in table_ref.steps() {
        out.push('.');
        match step {
            TableRefStep::Field(name) => escape_into(out, name),
            TableRefStep::Element => out.push_str(TableRefStep::ELEMENT_MARK),
        }
    }
}

/// Prefix covering every key of a database, or of one collection in it.
#[must_use]
pub fn scope_prefix(database: &str, collection: Option<&str>) -> String {
    let mut out = String::new();
    escape_into(&mut out, database);
    out.push('/');
    if let Some(collection) = collection {
        escape_into(&mut out, collection);
        out.push('/');
    }

    out
}

/// Store key of one catalog entry.
#[must_use]
pub fn encode_key(key: &CatalogKey) -> String {
    let mut out = scope_prefix(&key.database, key.collection.as_deref());

    let tag = match key.kind {
        EntryKind::Database => "$db",
        EntryKind::Collection => "$co",
        EntryKind::DocPart => "dp",
        EntryKind::Field => "fd",
        EntryKind::Scalar => "sc",
    };
    out.push_str(tag);

    if let Some(table_ref) = &key.table_ref {
        out.push('/');
        encode_table_ref(&mut out, table_ref);
    }
    if let Some(field_type) = key.field_type {
        out.push('/');
        out.push(field_type.suffix());
    }

    out
}

pub(crate) fn encode_entry(key: &str, entry: &CatalogEntry) -> Result<Vec<u8>, StoreError> {
    serialize(entry, MAX_META_ENTRY_BYTES).map_err(|err| StoreError::Encode {
        key: key.to_string(),
        reason: err.to_string(),
    })
}

/// Decode a stored entry and check it lives under the key it claims.
pub(crate) fn decode_entry(key: &str, bytes: &[u8]) -> Result<CatalogEntry, StoreError> {
    let entry: CatalogEntry =
        deserialize(bytes, MAX_META_ENTRY_BYTES).map_err(|err| StoreError::Corrupt {
            key: key.to_string(),
            reason: err.to_string(),
        })?;

    let expected = encode_key(&entry.key());
    if expected != key {
        return Err(StoreError::Corrupt {
            key: key.to_string(),
            reason: format!("entry belongs under '{expected}'"),
        });
    }

    Ok(entry)
}
