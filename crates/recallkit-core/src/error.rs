//! Analysis error types.
//!
//! Every fallible engine call returns [`AnalysisError`]. Undefined measures
//! (a bucket or transition with nothing possible) are not errors; they are
//! reported as `None` in the result tables.

use thiserror::Error;

/// Errors raised while validating, scoring, or analyzing recall data.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// A required column is absent from the input rows.
    #[error("required column '{0}' is missing")]
    MissingColumn(String),

    /// Parallel input collections have different lengths.
    #[error("{what}: expected {expected} entries, found {found}")]
    ShapeMismatch {
        what: String,
        expected: usize,
        found: usize,
    },

    /// A phase name other than `study` or `recall`.
    #[error("invalid phase '{0}': expected \"study\" or \"recall\"")]
    InvalidPhase(String),

    /// A key that no record in the table provides.
    #[error("unknown key '{0}'")]
    InvalidKey(String),

    /// Positions within a list and phase are not `1..N`.
    #[error("positions for subject {subject} list {list} ({phase}) are not dense 1..{count}")]
    InvalidPositions {
        subject: String,
        list: u32,
        phase: String,
        count: usize,
    },

    /// A cell holds a value of the wrong type for its column.
    #[error("invalid value in column '{column}': {message}")]
    InvalidValue { column: String, message: String },

    /// A distance matrix row has the wrong number of columns.
    #[error("distance matrix must be square: row {row} has {found} columns, expected {expected}")]
    NonSquareMatrix {
        row: usize,
        found: usize,
        expected: usize,
    },

    /// An item index does not address the distance matrix.
    #[error("item index {index} is outside the {size}x{size} distance matrix")]
    IndexOutOfRange { index: i64, size: usize },

    /// Bin edges are too few or not strictly increasing.
    #[error("bin edges must contain at least two strictly increasing values")]
    InvalidEdges,
}

impl AnalysisError {
    pub(crate) fn invalid_value(column: &str, message: impl Into<String>) -> Self {
        AnalysisError::InvalidValue {
            column: column.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn shape(what: impl Into<String>, expected: usize, found: usize) -> Self {
        AnalysisError::ShapeMismatch {
            what: what.into(),
            expected,
            found,
        }
    }
}

/// Result alias used throughout the engines.
pub type Result<T> = std::result::Result<T, AnalysisError>;
