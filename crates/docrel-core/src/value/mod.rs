//! Document value domain.
//!
//! `DocValue` is the closed sum type over every storage kind a document can
//! carry. Each variant maps to exactly one [`FieldType`]; converters and the
//! schema walker match on it exhaustively.

mod document;
mod scalar;

#[cfg(test)]
mod tests;

use crate::FieldType;
use time::{Date, OffsetDateTime, Time, UtcOffset};

// re-exports
pub use document::{Document, DocumentError};
pub use scalar::{Double, OBJECT_ID_BYTES, ObjectId};

///
/// DocValue
///
/// Null      → the field is present with no value; distinct from absence.
/// Document  → nested object, becomes a row in a child document-part table.
/// Array     → ordered elements, decomposed by element kind.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DocValue {
    Binary(Vec<u8>),
    Boolean(bool),
    Date(Date),
    Double(Double),
    Instant(OffsetDateTime),
    Integer(i32),
    Long(i64),
    Null,
    ObjectId(ObjectId),
    String(String),
    Time(Time),
    Document(Document),
    Array(Vec<Self>),
}

impl DocValue {
    /// Storage kind of this value.
    #[must_use]
    pub const fn field_type(&self) -> FieldType {
        match self {
            Self::Binary(_) => FieldType::Binary,
            Self::Boolean(_) => FieldType::Boolean,
            Self::Date(_) => FieldType::Date,
            Self::Double(_) => FieldType::Double,
            Self::Instant(_) => FieldType::Instant,
            Self::Integer(_) => FieldType::Integer,
            Self::Long(_) => FieldType::Long,
            Self::Null => FieldType::Null,
            Self::ObjectId(_) => FieldType::ObjectId,
            Self::String(_) => FieldType::String,
            Self::Time(_) => FieldType::Time,
            Self::Document(_) => FieldType::Document,
            Self::Array(_) => FieldType::Array,
        }
    }

    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub const fn is_container(&self) -> bool {
        matches!(self, Self::Document(_) | Self::Array(_))
    }

    /// Build an instant, normalizing the offset to UTC so equality and
    /// encoding never depend on the caller's zone.
    #[must_use]
    pub fn instant(at: OffsetDateTime) -> Self {
        Self::Instant(at.to_offset(UtcOffset::UTC))
    }

    #[must_use]
    pub fn double(value: f64) -> Self {
        Self::Double(Double::new(value))
    }

    #[must_use]
    pub fn string(value: impl Into<String>) -> Self {
        Self::String(value.into())
    }

    #[must_use]
    pub const fn as_document(&self) -> Option<&Document> {
        match self {
            Self::Document(doc) => Some(doc),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_array(&self) -> Option<&[Self]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }
}

impl From<bool> for DocValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<i32> for DocValue {
    fn from(value: i32) -> Self {
        Self::Integer(value)
    }
}

impl From<i64> for DocValue {
    fn from(value: i64) -> Self {
        Self::Long(value)
    }
}

impl From<f64> for DocValue {
    fn from(value: f64) -> Self {
        Self::double(value)
    }
}

impl From<&str> for DocValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for DocValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Document> for DocValue {
    fn from(value: Document) -> Self {
        Self::Document(value)
    }
}

impl From<ObjectId> for DocValue {
    fn from(value: ObjectId) -> Self {
        Self::ObjectId(value)
    }
}

impl<T: Into<Self>> From<Vec<T>> for DocValue {
    fn from(values: Vec<T>) -> Self {
        Self::Array(values.into_iter().map(Into::into).collect())
    }
}
