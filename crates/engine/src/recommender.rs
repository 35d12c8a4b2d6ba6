//! # Recommender
//!
//! Query-side entry point. Owns the live [`PreparedDataset`] behind a
//! [`SnapshotHandle`] and answers "songs like this one" against whatever
//! snapshot is current when the call starts.
//!
//! Cloning is cheap; clones share the same snapshot, so a reload through
//! one clone is seen by all of them.

use crate::config::QueryConfig;
use crate::dataset::{PreparedDataset, Recommendation};
use crate::error::Result;
use crate::snapshot::SnapshotHandle;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument};

#[derive(Debug, Clone)]
pub struct Recommender {
    snapshot: Arc<SnapshotHandle>,
    config: QueryConfig,
}

impl Recommender {
    pub fn new(dataset: PreparedDataset) -> Self {
        Self {
            snapshot: Arc::new(SnapshotHandle::new(dataset)),
            config: QueryConfig::default(),
        }
    }

    /// Load a published artifact directory and serve from it.
    #[instrument]
    pub fn from_dir(dir: &Path) -> features::Result<Self> {
        let start = Instant::now();
        let dataset = PreparedDataset::load(dir)?;
        info!(
            rows = dataset.len(),
            stamp = dataset.stamp(),
            "Loaded dataset in {:.2?}",
            start.elapsed()
        );
        Ok(Self::new(dataset))
    }

    pub fn with_config(mut self, config: QueryConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    /// The dataset currently being served.
    pub fn snapshot(&self) -> Arc<PreparedDataset> {
        self.snapshot.current()
    }

    /// Up to `n` songs most similar to `seed_id`; see [`PreparedDataset::recommend`].
    pub fn recommend(&self, seed_id: &str, n: usize) -> Result<Vec<Recommendation>> {
        let dataset = self.snapshot.current();
        dataset.recommend(seed_id, n, &self.config)
    }

    /// [`Self::recommend`] with the configured default count.
    pub fn recommend_default(&self, seed_id: &str) -> Result<Vec<Recommendation>> {
        self.recommend(seed_id, self.config.default_count)
    }

    /// Load `dir` and, only if it loads and verifies, make it live.
    ///
    /// On failure the current dataset keeps serving and the error is returned.
    #[instrument(skip(self))]
    pub fn reload(&self, dir: &Path) -> features::Result<()> {
        let dataset = PreparedDataset::load(dir)?;
        self.replace(dataset);
        Ok(())
    }

    /// Swap in an already built dataset.
    pub fn replace(&self, dataset: PreparedDataset) {
        let rows = dataset.len();
        let stamp = dataset.stamp().to_string();
        let previous = self.snapshot.replace(dataset);
        info!(
            previous = previous.stamp(),
            current = %stamp,
            rows,
            "Swapped in new dataset"
        );
    }
}
