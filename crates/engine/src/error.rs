//! Query-time errors.
//!
//! These are per request: they are reported to the caller and never touch
//! the loaded snapshot or other in-flight queries.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// The seed id is not in the loaded song table
    #[error("Unknown seed song: {id}")]
    UnknownSeed { id: String },

    /// A recommendation count of zero was requested
    #[error("Recommendation count must be positive, got {count}")]
    InvalidCount { count: usize },
}

/// Convenience type alias for query Results
pub type Result<T> = std::result::Result<T, QueryError>;
