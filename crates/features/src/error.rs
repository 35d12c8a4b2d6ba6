//! Error types for feature preparation and artifact persistence.
//!
//! Preparation errors are fatal to the run that raised them: nothing is
//! published. Load errors are fatal to the loader: a mismatched artifact set
//! is never served.

use catalog::CatalogError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FeatureError {
    /// A record has a missing or unusable value and the policy is to fail
    #[error("Malformed record at line {line} (id '{id}'): {field}: {reason}")]
    MalformedRecord {
        line: usize,
        id: String,
        field: String,
        reason: String,
    },

    /// Nothing usable remained after validation
    #[error("Catalog has no usable records ({rejected} rejected)")]
    EmptyCatalog { rejected: usize },

    /// The three persisted artifacts do not describe the same dataset
    #[error("Artifact mismatch in {}: {reason}", dir.display())]
    ArtifactMismatch { dir: PathBuf, reason: String },

    /// Scaling produced a value distances cannot use
    #[error("Feature '{field}' of song '{id}' is not finite after scaling")]
    NonFiniteFeature { id: String, field: String },

    /// Rows handed to the matrix or index have inconsistent widths
    #[error("Dimension mismatch: expected {expected} values per row, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    /// File-level catalog failure (missing file, CSV framing, missing column)
    #[error("Catalog error: {0}")]
    Catalog(CatalogError),

    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode or decode {}: {source}", path.display())]
    Encoding {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl From<CatalogError> for FeatureError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::MalformedRecord {
                line,
                id,
                field,
                reason,
            } => FeatureError::MalformedRecord {
                line,
                id,
                field,
                reason,
            },
            other => FeatureError::Catalog(other),
        }
    }
}

impl FeatureError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        FeatureError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn mismatch(dir: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        FeatureError::ArtifactMismatch {
            dir: dir.into(),
            reason: reason.into(),
        }
    }
}

/// Convenience type alias for Results in this crate
pub type Result<T> = std::result::Result<T, FeatureError>;
