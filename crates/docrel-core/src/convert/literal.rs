use crate::value::Double;
use time::{Date, OffsetDateTime, Time};

///
/// SqlLiteral
///
/// Backend-storable literal handed to the statement layer.
/// `Json` carries array literals rendered by the array converter.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SqlLiteral {
    Null,
    Boolean(bool),
    Integer(i32),
    Bigint(i64),
    Double(Double),
    Text(String),
    Bytea(Vec<u8>),
    Date(Date),
    Time(Time),
    Timestamptz(OffsetDateTime),
    Json(String),
}

impl SqlLiteral {
    /// Stable label used in diagnostics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Boolean(_) => "boolean",
            Self::Integer(_) => "integer",
            Self::Bigint(_) => "bigint",
            Self::Double(_) => "double precision",
            Self::Text(_) => "varchar",
            Self::Bytea(_) => "bytea",
            Self::Date(_) => "date",
            Self::Time(_) => "time",
            Self::Timestamptz(_) => "timestamptz",
            Self::Json(_) => "json",
        }
    }

    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(i64::from(*v)),
            Self::Bigint(v) => Some(*v),
            _ => None,
        }
    }
}
