//! Core runtime for docrel: the document value domain, converters between
//! documents and relational literals, the metadata catalog, schema evolution,
//! and the transactional job executor.
#![warn(unreachable_pub)]

pub mod catalog;
pub mod connection;
pub mod convert;
pub mod error;
pub mod executor;
pub mod obs;
pub mod schema;
pub mod serialize;
pub mod value;

// test
#[cfg(test)]
pub(crate) mod test_support;

pub use docrel_primitives::{ALL_FIELD_TYPES, FieldType};

///
/// CONSTANTS
///

/// Maximum encoded size of one persisted catalog entry.
pub const MAX_META_ENTRY_BYTES: usize = 64 * 1024;

///
/// Prelude
///
/// Prelude contains only domain vocabulary.
/// No errors, executors, stores, or helpers are re-exported here.
///

pub mod prelude {
    pub use crate::{
        FieldType,
        catalog::{TableRef, TableRefStep},
        value::{DocValue, Document, Double, ObjectId},
    };
}
