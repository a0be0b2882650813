//! Error types for the `.npy` point reader.
//!
//! Every failure carries the source path so a user can tell which file broke,
//! and schema failures carry the offending field name when there is one.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::reader::ReaderState;

/// Convenience alias used throughout the crate.
pub type Result<T, E = NpyError> = std::result::Result<T, E>;

/// Coarse classification of an [`NpyError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unreadable or malformed file, or a top-level object that is not a structured array.
    Format,
    /// Bad rank, zero rows, unsupported field type or ambiguous name mapping.
    Schema,
    /// The strided iteration handle could not be built.
    Iterator,
    /// An API call made out of state-machine order.
    Use,
}

/// Errors raised while loading, resolving or streaming a `.npy` file.
#[derive(Error, Debug)]
pub enum NpyError {
    #[error("unable to read '{}': {source}", path.display())]
    Io { path: PathBuf, source: io::Error },

    #[error("invalid .npy file '{}': {reason}", path.display())]
    Format { path: PathBuf, reason: String },

    #[error("{}", schema_message(path, field.as_deref(), reason))]
    Schema {
        path: PathBuf,
        field: Option<String>,
        reason: String,
    },

    #[error("unable to create iterator from array in '{}': {reason}", path.display())]
    Iterator { path: PathBuf, reason: String },

    #[error("{operation}() called while reader is {state}")]
    Use {
        operation: &'static str,
        state: ReaderState,
    },
}

fn schema_message(path: &std::path::Path, field: Option<&str>, reason: &str) -> String {
    match field {
        Some(field) => format!(
            "schema error in '{}', field '{field}': {reason}",
            path.display()
        ),
        None => format!("schema error in '{}': {reason}", path.display()),
    }
}

impl NpyError {
    pub(crate) fn format(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Format {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn schema(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Schema {
            path: path.into(),
            field: None,
            reason: reason.into(),
        }
    }

    pub(crate) fn field(
        path: impl Into<PathBuf>,
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Schema {
            path: path.into(),
            field: Some(field.into()),
            reason: reason.into(),
        }
    }

    pub(crate) fn iterator(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Iterator {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io { .. } | Self::Format { .. } => ErrorKind::Format,
            Self::Schema { .. } => ErrorKind::Schema,
            Self::Iterator { .. } => ErrorKind::Iterator,
            Self::Use { .. } => ErrorKind::Use,
        }
    }

    /// The field a schema error refers to, if any.
    #[must_use]
    pub fn field_name(&self) -> Option<&str> {
        match self {
            Self::Schema { field, .. } => field.as_deref(),
            _ => None,
        }
    }
}
