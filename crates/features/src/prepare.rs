//! Offline feature preparation.
//!
//! ## Algorithm
//! 1. Validate every raw row (in parallel, order preserved)
//! 2. Apply the malformed-record policy; duplicate ids count as malformed
//! 3. Fit the scaler on the surviving rows and transform them
//! 4. Fit the neighbor index over the normalized matrix
//! 5. Stamp the result
//!
//! The run either returns a complete [`PreparedArtifacts`] or an error;
//! nothing is written to disk here.

use crate::artifacts::PreparedArtifacts;
use crate::config::{MalformedPolicy, PrepareConfig};
use crate::error::{FeatureError, Result};
use crate::index::NeighborIndex;
use crate::matrix::FeatureMatrix;
use crate::scaler::Scaler;
use catalog::{CatalogError, FEATURE_DIM, FEATURE_NAMES, RawSong, SongRecord, SongTable, parse_catalog, validate};
use rayon::prelude::*;
use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;
use tracing::{info, instrument, warn};

/// Parse a catalog file and prepare it.
pub fn prepare_catalog(path: &Path, config: &PrepareConfig) -> Result<PreparedArtifacts> {
    let raw = parse_catalog(path)?;
    prepare(raw, config)
}

/// Build the artifact triple from raw catalog rows.
#[instrument(skip(raw, config), fields(records = raw.len(), policy = %config.malformed_policy))]
pub fn prepare(raw: Vec<RawSong>, config: &PrepareConfig) -> Result<PreparedArtifacts> {
    let start = Instant::now();

    let validated: Vec<catalog::Result<SongRecord>> = raw.par_iter().map(validate).collect();

    let mut first_seen: HashMap<String, usize> = HashMap::with_capacity(raw.len());
    let mut songs = Vec::with_capacity(raw.len());
    let mut rejected = 0usize;

    for (row, outcome) in raw.iter().zip(validated) {
        let outcome = outcome.and_then(|song| match first_seen.get(&song.id) {
            Some(&first_line) => Err(CatalogError::MalformedRecord {
                line: row.line,
                id: song.id,
                field: "id".to_string(),
                reason: format!("duplicate id, first seen at line {first_line}"),
            }),
            None => Ok(song),
        });

        match outcome {
            Ok(song) => {
                first_seen.insert(song.id.clone(), row.line);
                songs.push(song);
            }
            Err(err) => match config.malformed_policy {
                MalformedPolicy::Fail => return Err(err.into()),
                MalformedPolicy::Drop => {
                    warn!("Dropping record: {}", err);
                    rejected += 1;
                }
            },
        }
    }

    if songs.is_empty() {
        return Err(FeatureError::EmptyCatalog { rejected });
    }

    let artifacts = prepare_records(songs, config)?;

    info!(
        rows = artifacts.rows(),
        rejected,
        stamp = %artifacts.stamp(),
        elapsed = ?start.elapsed(),
        "Prepared feature space"
    );
    Ok(artifacts)
}

/// Build the artifact triple from already validated songs, in the given
/// order. Ids are expected to be unique.
pub fn prepare_records(songs: Vec<SongRecord>, config: &PrepareConfig) -> Result<PreparedArtifacts> {
    if songs.is_empty() {
        return Err(FeatureError::EmptyCatalog { rejected: 0 });
    }

    let raw_vectors: Vec<[f64; FEATURE_DIM]> = songs.iter().map(|s| s.attributes.to_array()).collect();
    let scaler = Scaler::fit(&raw_vectors, FEATURE_DIM, config.normalization);
    let scaled: Vec<Vec<f64>> = raw_vectors.par_iter().map(|v| scaler.transform(v)).collect();

    for (song, row) in songs.iter().zip(&scaled) {
        if let Some(col) = row.iter().position(|v| !v.is_finite()) {
            return Err(FeatureError::NonFiniteFeature {
                id: song.id.clone(),
                field: FEATURE_NAMES[col].to_string(),
            });
        }
    }

    let matrix = FeatureMatrix::from_rows(&scaled, FEATURE_DIM)?;
    let index = NeighborIndex::build(&matrix, config.algorithm, config.metric)?;
    let table = SongTable::new(songs);

    Ok(PreparedArtifacts::new(table, scaler, matrix, index))
}
