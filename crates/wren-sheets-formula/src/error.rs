//! Formula error types

use thiserror::Error;

/// Result type for formula operations
pub type FormulaResult<T> = std::result::Result<T, FormulaError>;

/// Errors that can occur during formula evaluation
///
/// Spreadsheet-visible failures (`#VALUE!`, `#REF!`, …) are *values*, not
/// errors: they travel through evaluation as
/// [`Value::Error`](crate::evaluator::Value). This enum covers the
/// conditions the host has to handle out-of-band: malformed token streams,
/// unmapped function ids, and reference cycles.
#[derive(Debug, Error, PartialEq)]
pub enum FormulaError {
    /// Token stream is not a well-formed expression
    #[error("Malformed expression: {0}")]
    Malformed(String),

    /// Function id has no mapped implementation
    ///
    /// Distinct from a `#NAME?` cell error so the host can choose to log it
    /// as a load-time warning instead.
    #[error("Function not supported: id {iftab} ({name})")]
    UnsupportedFunction {
        /// The BIFF function id
        iftab: u16,
        /// The function name, if the id is in the name table
        name: String,
    },

    /// Wrong number of arguments
    #[error("Wrong number of arguments for {function}: expected {expected}, got {actual}")]
    ArgumentCount {
        function: &'static str,
        expected: &'static str,
        actual: usize,
    },

    /// Circular reference detected during recalculation
    #[error("Circular reference detected")]
    CircularReference,

    /// Reference that cannot be resolved to a location
    #[error("Invalid reference: {0}")]
    InvalidReference(String),
}
