//! Error types for Vista tables, views and the manager.

use crate::types::DataType;
use crate::value::Value;
use core::fmt;
use core::time::Duration;
use thiserror::Error;

/// Result type alias for Vista operations.
pub type Result<T> = core::result::Result<T, Error>;

/// A single cell rejected by column type validation.
#[derive(Clone, Debug, PartialEq)]
pub struct CellMismatch {
    /// Position of the record within the call.
    pub row: usize,
    /// Column the value was addressed to.
    pub column: String,
    /// Declared column type.
    pub expected: DataType,
    /// Type of the offending value.
    pub got: Option<DataType>,
}

impl fmt::Display for CellMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.got {
            Some(got) => write!(
                f,
                "row {} column {}: expected {}, got {}",
                self.row, self.column, self.expected, got
            ),
            None => write!(
                f,
                "row {} column {}: expected {}, got null",
                self.row, self.column, self.expected
            ),
        }
    }
}

/// Error types for table, view and manager operations.
///
/// Every error is scoped to the call that produced it; no variant leaves a
/// table or view partially mutated.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or incompatible schema, table options or input data.
    #[error("Schema error: {message}")]
    Schema { message: String },

    /// One or more values do not conform to their declared column type.
    #[error("Type mismatch: {}", join_cells(.cells))]
    TypeMismatch { cells: Vec<CellMismatch> },

    /// A handle, row, or index value does not exist.
    #[error("{kind} not found: {key}")]
    NotFound { kind: &'static str, key: String },

    /// A handle is already live in the manager.
    #[error("Handle already in use: {handle}")]
    DuplicateHandle { handle: String },

    /// An index column value is already taken by a live row.
    #[error("Duplicate value {value:?} for index column {column}")]
    DuplicateIndex { column: String, value: Value },

    /// Invalid view configuration.
    #[error("Invalid view config: {message}")]
    Config { message: String },

    /// A caller-bounded wait expired.
    #[error("Timed out after {waited:?} waiting for {what}")]
    Timeout { what: String, waited: Duration },
}

fn join_cells(cells: &[CellMismatch]) -> String {
    cells
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl Error {
    /// Creates a schema error.
    pub fn schema(message: impl Into<String>) -> Self {
        Error::Schema {
            message: message.into(),
        }
    }

    /// Creates a type mismatch error from the offending cells.
    pub fn type_mismatch(cells: Vec<CellMismatch>) -> Self {
        Error::TypeMismatch { cells }
    }

    /// Creates a not found error.
    pub fn not_found(kind: &'static str, key: impl fmt::Display) -> Self {
        Error::NotFound {
            kind,
            key: key.to_string(),
        }
    }

    /// Creates a duplicate handle error.
    pub fn duplicate_handle(handle: impl Into<String>) -> Self {
        Error::DuplicateHandle {
            handle: handle.into(),
        }
    }

    /// Creates a duplicate index value error.
    pub fn duplicate_index(column: impl Into<String>, value: Value) -> Self {
        Error::DuplicateIndex {
            column: column.into(),
            value,
        }
    }

    /// Creates a view config error.
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
        }
    }

    /// Creates a timeout error.
    pub fn timeout(what: impl Into<String>, waited: Duration) -> Self {
        Error::Timeout {
            what: what.into(),
            waited,
        }
    }

    /// Returns true for `NotFound`.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}
