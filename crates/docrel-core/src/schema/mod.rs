//! Module: schema
//! Responsibility: schema evolution. Decides which doc parts, columns and
//! side-tables a batch of documents needs, and renders the statements that
//! create them and store the documents.
//! Does not own: identifier derivation (catalog) or execution (executor).
//!
//! Planning is pure and may run on any thread; only the commit of the
//! resulting working copy is serialized.

mod diff;
mod walk;
mod write;


use crate::{catalog::CatalogSnapshot, value::Document};

// re-exports
pub use diff::{Resolution, SchemaDiff};
pub use write::{DOC_PART_COLUMNS, ROOT_COLUMNS, SCALAR_COLUMNS, WritePlan, path_view_name};

/// Diff one document against `snapshot`.
#[must_use]
pub fn plan(
    document: &Document,
    database: &str,
    collection: &str,
    snapshot: &CatalogSnapshot,
) -> SchemaDiff {
    plan_batch(std::slice::from_ref(document), database, collection, snapshot)
}

/// Diff a batch of documents against `snapshot`.
///
/// The root doc part is always part of the diff, so an empty batch plans
/// the collection itself.
#[must_use]
pub fn plan_batch(
    documents: &[Document],
    database: &str,
    collection: &str,
    snapshot: &CatalogSnapshot,
) -> SchemaDiff {
    let mut diff = SchemaDiff::new(snapshot, database, collection);
    let mut walker = walk::Walker::new(snapshot, database, collection);
    for document in documents {
        let walked = walker.walk(document);
        diff.absorb(snapshot, &walked);
    }

    diff
}
