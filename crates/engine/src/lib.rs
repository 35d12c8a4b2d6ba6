//! Online recommendation queries over prepared song artifacts.
//!
//! This crate provides:
//! - [`PreparedDataset`], one loaded table/matrix/index set
//! - [`SnapshotHandle`] for swapping datasets under live traffic
//! - [`Recommender`], the query facade
//!
//! ## Example Usage
//! ```ignore
//! use engine::Recommender;
//!
//! let recommender = Recommender::from_dir(Path::new("data/artifacts"))?;
//! for rec in recommender.recommend("4BJqT0PrAfrxzMOxytFOIz", 10)? {
//!     println!("{} {:.3}", rec.id, rec.similarity_score);
//! }
//! ```

pub mod config;
pub mod dataset;
pub mod error;
pub mod recommender;
pub mod snapshot;

pub use config::{DEFAULT_RECOMMENDATIONS, QueryConfig, ScoreTransform};
pub use dataset::{PreparedDataset, Recommendation};
pub use error::{QueryError, Result};
pub use recommender::Recommender;
pub use snapshot::SnapshotHandle;
