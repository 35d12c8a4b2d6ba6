//! Feature preparation for song similarity.
//!
//! This crate provides:
//! - [`Scaler`] for per-attribute normalization
//! - [`FeatureMatrix`], the row-aligned normalized vectors
//! - [`NeighborIndex`] (KD-tree or exhaustive scan) for k-nearest-neighbor search
//! - [`prepare`] to turn a raw catalog into the artifact triple
//! - [`artifacts`] to publish and load that triple as one unit
//!
//! ## Architecture
//! Preparation runs offline in stages:
//! 1. Raw rows are validated into song records
//! 2. Numeric attributes are normalized into the feature matrix
//! 3. The neighbor index is fitted over the matrix
//! 4. Table, matrix and index are stamped together and published
//!
//! ## Example Usage
//! ```ignore
//! use features::{artifacts, prepare_catalog, PrepareConfig};
//!
//! let prepared = prepare_catalog(Path::new("data/data.csv"), &PrepareConfig::default())?;
//! artifacts::publish(&prepared, Path::new("data/artifacts"))?;
//!
//! let loaded = artifacts::load(Path::new("data/artifacts"))?;
//! assert_eq!(loaded.stamp(), prepared.stamp());
//! ```

pub mod artifacts;
pub mod config;
pub mod error;
pub mod index;
pub mod matrix;
pub mod prepare;
pub mod scaler;

// Re-export main types
pub use artifacts::{ArtifactHeader, PreparedArtifacts};
pub use config::{IndexAlgorithm, MalformedPolicy, Metric, Normalization, PrepareConfig};
pub use error::{FeatureError, Result};
pub use index::{NearestNeighbors, Neighbor, NeighborIndex};
pub use matrix::FeatureMatrix;
pub use prepare::{prepare, prepare_catalog, prepare_records};
pub use scaler::{ColumnScale, Scaler};
