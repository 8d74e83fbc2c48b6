//! Closed storage-kind tag set shared by the document and relational layers.

#[macro_use]
mod macros;

use serde::{Deserialize, Serialize};
use std::fmt;

///
/// FieldType
///
/// Storage kind of one document value.
///
/// Declaration order is the canonical total order: catalog iteration and
/// identifier derivation walk types in this order, so it must not change.
///

#[derive(
    Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
#[repr(u8)]
pub enum FieldType {
    Binary = 1,
    Boolean = 2,
    Date = 3,
    Double = 4,
    Instant = 5,
    Integer = 6,
    Long = 7,
    Null = 8,
    ObjectId = 9,
    String = 10,
    Time = 11,
    Document = 12,
    Array = 13,
}

impl FieldType {
    /// Return the full metadata descriptor for one field type.
    #[must_use]
    pub const fn metadata(self) -> FieldTypeMetadata {
        field_type_registry!(metadata_from_registry, self)
    }

    /// Stable byte tag used in persisted catalog keys.
    #[must_use]
    pub const fn tag(self) -> u8 {
        self.metadata().tag
    }

    /// Resolve a field type from its stable byte tag.
    #[must_use]
    pub const fn from_tag(tag: u8) -> Option<Self> {
        field_type_registry!(from_tag_from_registry, tag)
    }

    /// One-character suffix appended to derived physical identifiers.
    #[must_use]
    pub const fn suffix(self) -> char {
        self.metadata().suffix
    }

    /// Resolve a field type from its identifier suffix.
    #[must_use]
    pub const fn from_suffix(suffix: char) -> Option<Self> {
        field_type_registry!(from_suffix_from_registry, suffix)
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        self.metadata().label
    }

    /// Relational column type used when this type is materialized.
    #[must_use]
    pub const fn sql_type(self) -> &'static str {
        self.metadata().sql_type
    }

    /// Containers (`Document`, `Array`) only ever appear as marker columns.
    #[must_use]
    pub const fn is_container(self) -> bool {
        matches!(self.metadata().class, FieldTypeClass::Container)
    }

    #[must_use]
    pub const fn is_scalar(self) -> bool {
        !self.is_container()
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

///
/// FieldTypeMetadata
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FieldTypeMetadata {
    pub tag: u8,
    pub suffix: char,
    pub label: &'static str,
    pub sql_type: &'static str,
    pub class: FieldTypeClass,
}

///
/// FieldTypeClass
///

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum FieldTypeClass {
    Scalar,
    Container,
}

/// Ordered list of all field types in registry order.
pub const ALL_FIELD_TYPES: [FieldType; 13] = field_type_registry!(all_types_from_registry);

///
/// TESTS
///
