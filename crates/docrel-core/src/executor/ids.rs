use crate::catalog::TableRef;
use parking_lot::Mutex;
use std::collections::BTreeMap;

// (database, collection, doc part); `None` is the root, whose row id is
// the document id.
type CounterKey = (String, String, Option<TableRef>);

fn counter_key(database: &str, collection: &str, table_ref: &TableRef) -> CounterKey {
    (
        database.to_string(),
        collection.to_string(),
        (!table_ref.is_root()).then(|| table_ref.clone()),
    )
}

///
/// RowIds
///
/// Monotonic id allocation shared by every worker: one `did` sequence per
/// collection and one `rid` sequence per doc part.
///
/// A sequence starts at 1 for a table created by this process. A table that
/// already holds rows must be `seed`ed from its highest stored id before the
/// first allocation; `is_tracked` tells the two apart.
///

#[derive(Debug, Default)]
pub struct RowIds {
    counters: Mutex<BTreeMap<CounterKey, i64>>,
}

impl RowIds {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_document(&self, database: &str, collection: &str) -> i64 {
        self.bump(counter_key(database, collection, &TableRef::root()))
    }

    pub fn next_row(&self, database: &str, collection: &str, table_ref: &TableRef) -> i64 {
        self.bump(counter_key(database, collection, table_ref))
    }

    /// Whether the sequence of a doc part has been used or seeded.
    #[must_use]
    pub fn is_tracked(&self, database: &str, collection: &str, table_ref: &TableRef) -> bool {
        self.counters
            .lock()
            .contains_key(&counter_key(database, collection, table_ref))
    }

    /// Raise the sequence of a doc part so the next id exceeds `stored`.
    /// Never lowers a sequence.
    pub fn seed(&self, database: &str, collection: &str, table_ref: &TableRef, stored: i64) {
        let mut counters = self.counters.lock();
        let next = counters
            .entry(counter_key(database, collection, table_ref))
            .or_insert(0);
        *next = (*next).max(stored);
    }

    /// Forget every sequence of a dropped collection, or of every
    /// collection of a dropped database when `collection` is `None`.
    pub fn reset_scope(&self, database: &str, collection: Option<&str>) {
        self.counters.lock().retain(|(db, coll, _), _| {
            db != database || collection.is_some_and(|c| c != coll)
        });
    }

    fn bump(&self, key: CounterKey) -> i64 {
        let mut counters = self.counters.lock();
        let next = counters.entry(key).or_insert(0);
        *next += 1;

        *next
    }
}
