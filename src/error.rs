//! Unified error handling for the trek-import library.
//!
//! Import failures come in three grades:
//! - [`ImportError::Global`] aborts the whole run before anything is persisted
//! - [`ImportError::Row`] rejects a single row; the stream continues
//! - [`ImportError::Value`] drops a single field; the row survives

use std::fmt;

/// Unified error type for import operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportError {
    /// A required reference record is missing before any row is processed.
    /// Fatal: the run aborts and nothing is persisted or resolved.
    Global { message: String },
    /// A single row failed validation and is rejected.
    Row { message: String },
    /// A single field value could not be transformed; the field is dropped.
    Value { field: String, message: String },
}

impl ImportError {
    /// Fatal configuration error.
    pub fn global(message: impl Into<String>) -> Self {
        ImportError::Global {
            message: message.into(),
        }
    }

    /// Row-level data error.
    pub fn row(message: impl Into<String>) -> Self {
        ImportError::Row {
            message: message.into(),
        }
    }

    /// Field-level value error.
    pub fn value(field: impl Into<String>, message: impl Into<String>) -> Self {
        ImportError::Value {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ImportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportError::Global { message } => {
                write!(f, "Import aborted: {}", message)
            }
            ImportError::Row { message } => {
                write!(f, "Row rejected: {}", message)
            }
            ImportError::Value { field, message } => {
                write!(f, "Bad value for field '{}': {}", field, message)
            }
        }
    }
}

impl std::error::Error for ImportError {}

/// Result type alias for import operations.
pub type Result<T> = std::result::Result<T, ImportError>;
