use crate::{
    catalog::{CatalogConflictError, SchemaInvariantError, StoreError},
    connection::ConnectionError,
    convert::ConversionError,
    value::DocumentError,
};
use docrel_config::ConfigError;
use std::fmt;
use thiserror::Error as ThisError;

///
/// InternalError
///
/// Structured runtime error with a stable internal classification.
/// Every job outcome and every fallible engine entrypoint reports this type;
/// the typed leaf error, when one exists, travels in `detail`.
///

#[derive(Clone, Debug, ThisError)]
#[error("{message}")]
pub struct InternalError {
    pub class: ErrorClass,
    pub origin: ErrorOrigin,
    pub message: String,

    /// Optional structured error detail.
    /// The variant (if present) must correspond to `origin`.
    pub detail: Option<ErrorDetail>,
}

impl InternalError {
    pub fn new(class: ErrorClass, origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self {
            class,
            origin,
            message: message.into(),
            detail: None,
        }
    }

    /// Construct an executor-origin invariant violation.
    pub(crate) fn executor_invariant(message: impl Into<String>) -> Self {
        Self::new(
            ErrorClass::InvariantViolation,
            ErrorOrigin::Executor,
            message.into(),
        )
    }

    /// Construct a schema-origin invariant violation.
    pub(crate) fn schema_invariant(message: impl Into<String>) -> Self {
        Self::new(
            ErrorClass::InvariantViolation,
            ErrorOrigin::Schema,
            message.into(),
        )
    }

    /// Construct an executor-origin internal error.
    pub(crate) fn executor_internal(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Internal, ErrorOrigin::Executor, message.into())
    }

    /// Construct the error reported for a cooperatively aborted job.
    pub(crate) fn aborted(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Aborted, ErrorOrigin::Executor, message.into())
    }

    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self.class, ErrorClass::Conflict)
    }

    #[must_use]
    pub const fn is_aborted(&self) -> bool {
        matches!(self.class, ErrorClass::Aborted)
    }

    /// Return the conflict detail when this error is a catalog race.
    #[must_use]
    pub const fn as_conflict(&self) -> Option<&CatalogConflictError> {
        match &self.detail {
            Some(ErrorDetail::Conflict(err)) => Some(err),
            _ => None,
        }
    }

    #[must_use]
    pub fn display_with_class(&self) -> String {
        format!("{}:{}: {}", self.origin, self.class, self.message)
    }
}

///
/// ErrorDetail
///
/// Structured, origin-specific error detail carried by [`InternalError`].
///

#[derive(Clone, Debug, ThisError)]
#[remain::sorted]
pub enum ErrorDetail {
    #[error("{0}")]
    Config(String),
    #[error("{0}")]
    Conflict(CatalogConflictError),
    #[error("{0}")]
    Connection(ConnectionError),
    #[error("{0}")]
    Conversion(ConversionError),
    #[error("{0}")]
    Document(DocumentError),
    #[error("{0}")]
    Invariant(SchemaInvariantError),
    #[error("{0}")]
    Store(StoreError),
}

impl From<ConversionError> for InternalError {
    fn from(err: ConversionError) -> Self {
        Self {
            class: ErrorClass::Conversion,
            origin: ErrorOrigin::Converter,
            message: err.to_string(),
            detail: Some(ErrorDetail::Conversion(err)),
        }
    }
}

impl From<CatalogConflictError> for InternalError {
    fn from(err: CatalogConflictError) -> Self {
        Self {
            class: ErrorClass::Conflict,
            origin: ErrorOrigin::Catalog,
            message: err.to_string(),
            detail: Some(ErrorDetail::Conflict(err)),
        }
    }
}

impl From<SchemaInvariantError> for InternalError {
    fn from(err: SchemaInvariantError) -> Self {
        Self {
            class: ErrorClass::InvariantViolation,
            origin: ErrorOrigin::Catalog,
            message: err.to_string(),
            detail: Some(ErrorDetail::Invariant(err)),
        }
    }
}

impl From<ConnectionError> for InternalError {
    fn from(err: ConnectionError) -> Self {
        Self {
            class: ErrorClass::Connection,
            origin: ErrorOrigin::Connection,
            message: err.to_string(),
            detail: Some(ErrorDetail::Connection(err)),
        }
    }
}

impl From<StoreError> for InternalError {
    fn from(err: StoreError) -> Self {
        let class = match &err {
            StoreError::Corrupt { .. } => ErrorClass::Corruption,
            StoreError::Backend { .. } | StoreError::Encode { .. } => ErrorClass::Internal,
        };

        Self {
            class,
            origin: ErrorOrigin::Store,
            message: err.to_string(),
            detail: Some(ErrorDetail::Store(err)),
        }
    }
}

impl From<DocumentError> for InternalError {
    fn from(err: DocumentError) -> Self {
        Self {
            class: ErrorClass::Unsupported,
            origin: ErrorOrigin::Value,
            message: err.to_string(),
            detail: Some(ErrorDetail::Document(err)),
        }
    }
}

impl From<ConfigError> for InternalError {
    fn from(err: ConfigError) -> Self {
        let message = err.to_string();

        Self {
            class: ErrorClass::Unsupported,
            origin: ErrorOrigin::Config,
            message: message.clone(),
            detail: Some(ErrorDetail::Config(message)),
        }
    }
}

///
/// ErrorClass
/// Internal error taxonomy for runtime classification.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorClass {
    Aborted,
    Conflict,
    Connection,
    Conversion,
    Corruption,
    Internal,
    InvariantViolation,
    Unsupported,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Aborted => "aborted",
            Self::Conflict => "conflict",
            Self::Connection => "connection",
            Self::Conversion => "conversion",
            Self::Corruption => "corruption",
            Self::Internal => "internal",
            Self::InvariantViolation => "invariant_violation",
            Self::Unsupported => "unsupported",
        };
        write!(f, "{label}")
    }
}

///
/// ErrorOrigin
/// Internal origin taxonomy for runtime classification.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorOrigin {
    Catalog,
    Config,
    Connection,
    Converter,
    Executor,
    Schema,
    Store,
    Value,
}

impl fmt::Display for ErrorOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Catalog => "catalog",
            Self::Config => "config",
            Self::Connection => "connection",
            Self::Converter => "converter",
            Self::Executor => "executor",
            Self::Schema => "schema",
            Self::Store => "store",
            Self::Value => "value",
        };
        write!(f, "{label}")
    }
}
