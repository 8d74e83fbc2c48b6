//! Module: convert
//! Responsibility: bidirectional mapping between document values and
//! backend-storable literals, one converter per scalar field type.
//! Does not own: statement rendering or schema decisions.
//!
//! Converters are pure. Decoding never coerces: a literal of the wrong
//! shape for the requested field type is a [`ConversionError`].

mod array;
mod literal;
mod scalar;


use crate::{FieldType, value::DocValue};
use serde_json::Value as JsonValue;
use std::{collections::BTreeMap, sync::OnceLock};
use thiserror::Error as ThisError;

// re-exports
pub use array::ArrayConverter;
pub use literal::SqlLiteral;

///
/// ConversionError
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
#[remain::sorted]
pub enum ConversionError {
    #[error("malformed {field_type} literal: {reason}")]
    Malformed {
        field_type: FieldType,
        reason: String,
    },

    #[error("no converter registered for field type {field_type}")]
    NoConverter { field_type: FieldType },

    #[error("converter for {expected} cannot handle a {found} value")]
    TypeMismatch {
        expected: FieldType,
        found: FieldType,
    },
}

impl ConversionError {
    pub(crate) fn malformed(field_type: FieldType, reason: impl Into<String>) -> Self {
        Self::Malformed {
            field_type,
            reason: reason.into(),
        }
    }

    pub(crate) const fn mismatch(expected: FieldType, found: &DocValue) -> Self {
        Self::TypeMismatch {
            expected,
            found: found.field_type(),
        }
    }

    pub(crate) fn unexpected_literal(field_type: FieldType, literal: &SqlLiteral) -> Self {
        Self::malformed(
            field_type,
            format!(
                "expected a {} literal, found {}",
                field_type.sql_type(),
                literal.kind()
            ),
        )
    }

    pub(crate) fn unexpected_json(field_type: FieldType, json: &JsonValue) -> Self {
        Self::malformed(field_type, format!("unexpected array element {json}"))
    }
}

///
/// ValueConverter
///
/// Converter for one scalar field type.
///
/// Law: for every value `v` of `field_type()`,
/// `decode(encode(v)) == v` and `from_json(to_json(v)) == v`.
///

pub trait ValueConverter: Send + Sync {
    fn field_type(&self) -> FieldType;

    /// Relational column type used in DDL for this field type.
    fn sql_type(&self) -> &'static str {
        self.field_type().sql_type()
    }

    fn encode(&self, value: &DocValue) -> Result<SqlLiteral, ConversionError>;

    fn decode(&self, literal: &SqlLiteral) -> Result<DocValue, ConversionError>;

    /// Encode one array element.
    fn to_json(&self, value: &DocValue) -> Result<JsonValue, ConversionError>;

    /// Decode one non-null array element.
    fn from_json(&self, json: &JsonValue) -> Result<DocValue, ConversionError>;

    /// Reject values of any other field type.
    fn check_type(&self, value: &DocValue) -> Result<(), ConversionError> {
        if value.field_type() == self.field_type() {
            Ok(())
        } else {
            Err(ConversionError::mismatch(self.field_type(), value))
        }
    }
}

///
/// ConverterRegistry
///
/// FieldType → converter mapping consulted by schema evolution (column
/// types) and by data marshaling (literal rendering and decoding).
///

pub struct ConverterRegistry {
    converters: BTreeMap<FieldType, Box<dyn ValueConverter>>,
}

impl ConverterRegistry {
    /// Registry with the built-in converter for every scalar field type.
    #[must_use]
    pub fn standard() -> Self {
        let mut registry = Self {
            converters: BTreeMap::new(),
        };
        for converter in scalar::standard_converters() {
            registry.register(converter);
        }

        registry
    }

    /// Shared process-wide standard registry.
    pub fn global() -> &'static Self {
        static REGISTRY: OnceLock<ConverterRegistry> = OnceLock::new();

        REGISTRY.get_or_init(Self::standard)
    }

    /// Install or replace the converter for its field type.
    pub fn register(&mut self, converter: Box<dyn ValueConverter>) {
        self.converters.insert(converter.field_type(), converter);
    }

    pub fn get(&self, field_type: FieldType) -> Result<&dyn ValueConverter, ConversionError> {
        self.converters
            .get(&field_type)
            .map(AsRef::as_ref)
            .ok_or(ConversionError::NoConverter { field_type })
    }

    /// Encode a scalar value with the converter of its own field type.
    pub fn encode(&self, value: &DocValue) -> Result<SqlLiteral, ConversionError> {
        self.get(value.field_type())?.encode(value)
    }

    pub fn decode(
        &self,
        field_type: FieldType,
        literal: &SqlLiteral,
    ) -> Result<DocValue, ConversionError> {
        self.get(field_type)?.decode(literal)
    }

    /// Array converter for homogeneous sequences of `element` values.
    pub fn array(&self, element: FieldType) -> Result<ArrayConverter<'_>, ConversionError> {
        Ok(ArrayConverter::new(self.get(element)?))
    }

    pub fn field_types(&self) -> impl Iterator<Item = FieldType> + '_ {
        self.converters.keys().copied()
    }
}

impl Default for ConverterRegistry {
    fn default() -> Self {
        Self::standard()
    }
}
