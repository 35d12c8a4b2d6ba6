//! A loaded, immutable dataset and the nearest-neighbor query over it.

use crate::config::QueryConfig;
use crate::error::{QueryError, Result};
use catalog::{SongId, SongTable};
use features::{ArtifactHeader, FeatureMatrix, NearestNeighbors, NeighborIndex, PreparedArtifacts};
use serde::Serialize;
use std::path::Path;
use tracing::{debug, instrument, warn};

/// One recommended song.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub id: SongId,
    /// Higher means more similar to the seed
    pub similarity_score: f64,
    pub year: i32,
    pub popularity_scaled: u32,
    /// Raw feature-space distance to the seed
    #[serde(skip)]
    pub distance: f64,
}

/// Table, matrix and index from one preparation run.
///
/// Never mutated after construction; a refresh builds a new dataset and
/// swaps it in whole (see [`crate::SnapshotHandle`]).
#[derive(Debug)]
pub struct PreparedDataset {
    header: ArtifactHeader,
    table: SongTable,
    matrix: FeatureMatrix,
    index: NeighborIndex,
}

impl From<PreparedArtifacts> for PreparedDataset {
    fn from(artifacts: PreparedArtifacts) -> Self {
        Self {
            header: artifacts.header,
            table: artifacts.table,
            matrix: artifacts.matrix,
            index: artifacts.index,
        }
    }
}

impl PreparedDataset {
    /// Load and verify a published artifact directory.
    pub fn load(dir: &Path) -> features::Result<Self> {
        features::artifacts::load(dir).map(Self::from)
    }

    pub fn header(&self) -> &ArtifactHeader {
        &self.header
    }

    pub fn stamp(&self) -> &str {
        &self.header.stamp
    }

    pub fn table(&self) -> &SongTable {
        &self.table
    }

    pub fn matrix(&self) -> &FeatureMatrix {
        &self.matrix
    }

    pub fn index(&self) -> &NeighborIndex {
        &self.index
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Up to `n` songs most similar to `seed_id`, most similar first.
    ///
    /// The seed itself is never returned. With unique ids the result holds
    /// exactly `min(n, len - 1)` songs. Equal distances are ordered by table
    /// row.
    #[instrument(skip(self, config))]
    pub fn recommend(&self, seed_id: &str, n: usize, config: &QueryConfig) -> Result<Vec<Recommendation>> {
        if n == 0 {
            return Err(QueryError::InvalidCount { count: n });
        }

        let seed_rows = self.table.rows_for(seed_id);
        let (Some(&seed_row), Some(query)) = (
            seed_rows.first(),
            seed_rows.first().and_then(|&row| self.matrix.row(row)),
        ) else {
            return Err(QueryError::UnknownSeed {
                id: seed_id.to_string(),
            });
        };
        if seed_rows.len() > 1 {
            warn!(
                seed_id,
                rows = ?seed_rows,
                "Seed id appears on multiple rows; querying from row {}",
                seed_row
            );
        }

        // Room for the seed and any duplicate rows of it, which are dropped
        let k = n.saturating_add(seed_rows.len()).min(self.index.len());
        let neighbors = self.index.search(query, k);

        let recommendations: Vec<Recommendation> = neighbors
            .into_iter()
            .filter_map(|neighbor| {
                let song = self.table.row(neighbor.row)?;
                if song.id == seed_id {
                    return None;
                }
                Some(Recommendation {
                    id: song.id.clone(),
                    similarity_score: config.score.score(neighbor.distance),
                    year: song.year,
                    popularity_scaled: song.popularity.saturating_mul(config.popularity_scale),
                    distance: neighbor.distance,
                })
            })
            .take(n)
            .collect();

        debug!(
            seed_id,
            requested = n,
            returned = recommendations.len(),
            "Computed recommendations"
        );
        Ok(recommendations)
    }
}
