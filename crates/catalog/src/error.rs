//! Error types for the catalog crate.
//!
//! Reading a catalog can fail at two levels: the file as a whole (I/O, CSV
//! framing, a required column that is not there at all) or a single record
//! whose values cannot be interpreted. Only the second kind is subject to the
//! malformed-record policy applied during preparation.

use thiserror::Error;

/// Errors that can occur while reading and validating a song catalog
#[derive(Error, Debug)]
pub enum CatalogError {
    /// File could not be found or opened
    #[error("Failed to open catalog: {path}")]
    FileNotFound { path: String },

    /// I/O error occurred while reading the catalog
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// The CSV reader rejected the file (bad quoting, ragged rows, ...)
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// The header row lacks a column every record needs
    #[error("Catalog is missing required column '{column}'")]
    MissingColumn { column: String },

    /// A single record has a missing or unusable value
    ///
    /// `line` is the 1-based line in the source (the header is line 1), `id`
    /// is whatever the record's id cell contained, possibly empty.
    #[error("Malformed record at line {line} (id '{id}'): {field}: {reason}")]
    MalformedRecord {
        line: usize,
        id: String,
        field: String,
        reason: String,
    },
}

impl CatalogError {
    /// True for errors that concern one record rather than the whole source.
    pub fn is_record_level(&self) -> bool {
        matches!(self, CatalogError::MalformedRecord { .. })
    }
}

/// Convenience type alias for Results in this crate
pub type Result<T> = std::result::Result<T, CatalogError>;
