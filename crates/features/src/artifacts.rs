//! Persisted artifact triple: song table, feature matrix, neighbor index.
//!
//! The three files are written and read as one unit. Each carries the same
//! [`ArtifactHeader`]; the stamp inside it is a SHA-256 over the table
//! contents, the matrix bits and the preparation settings, so a table from
//! one run can never be served with a matrix or index from another.
//!
//! Layout of an artifact directory:
//!
//! ```text
//! songs.json     { header, body: [SongRecord, ...] }
//! features.json  { header, body: { scaler, matrix } }
//! index.json     { header, body: { algorithm, ... } }
//! ```

use crate::error::{FeatureError, Result};
use crate::index::{NearestNeighbors, NeighborIndex};
use crate::matrix::FeatureMatrix;
use crate::scaler::{ColumnScale, Scaler};
use catalog::{FEATURE_SET_VERSION, SongTable};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

/// Bump when the on-disk layout changes.
pub const FORMAT_VERSION: u32 = 1;

pub const SONGS_FILE: &str = "songs.json";
pub const FEATURES_FILE: &str = "features.json";
pub const INDEX_FILE: &str = "index.json";

/// Identity of one prepared dataset, repeated in every artifact file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactHeader {
    pub format_version: u32,
    pub feature_set: String,
    /// Hex SHA-256 binding table, matrix and index settings together
    pub stamp: String,
    pub rows: usize,
    pub dim: usize,
}

/// The full output of one preparation run.
#[derive(Debug, Clone)]
pub struct PreparedArtifacts {
    pub header: ArtifactHeader,
    pub table: SongTable,
    pub scaler: Scaler,
    pub matrix: FeatureMatrix,
    pub index: NeighborIndex,
}

impl PreparedArtifacts {
    /// Assemble and stamp a new artifact set.
    pub fn new(table: SongTable, scaler: Scaler, matrix: FeatureMatrix, index: NeighborIndex) -> Self {
        let header = ArtifactHeader {
            format_version: FORMAT_VERSION,
            feature_set: FEATURE_SET_VERSION.to_string(),
            stamp: compute_stamp(&table, &scaler, &matrix, &index),
            rows: table.len(),
            dim: matrix.dim(),
        };
        Self {
            header,
            table,
            scaler,
            matrix,
            index,
        }
    }

    pub fn rows(&self) -> usize {
        self.header.rows
    }

    pub fn stamp(&self) -> &str {
        &self.header.stamp
    }

    /// Check that every part agrees with the header and with each other.
    /// `dir` only labels the error.
    pub fn verify(&self, dir: &Path) -> Result<()> {
        let header = &self.header;
        if header.format_version != FORMAT_VERSION {
            return Err(FeatureError::mismatch(
                dir,
                format!(
                    "format version {} (expected {})",
                    header.format_version, FORMAT_VERSION
                ),
            ));
        }
        if header.feature_set != FEATURE_SET_VERSION {
            return Err(FeatureError::mismatch(
                dir,
                format!(
                    "feature set '{}' (expected '{}')",
                    header.feature_set, FEATURE_SET_VERSION
                ),
            ));
        }
        if self.table.len() != header.rows {
            return Err(FeatureError::mismatch(
                dir,
                format!("table has {} rows, header says {}", self.table.len(), header.rows),
            ));
        }
        if !self.matrix.is_consistent()
            || self.matrix.rows() != header.rows
            || self.matrix.dim() != header.dim
        {
            return Err(FeatureError::mismatch(
                dir,
                format!(
                    "matrix is {}x{}, header says {}x{}",
                    self.matrix.rows(),
                    self.matrix.dim(),
                    header.rows,
                    header.dim
                ),
            ));
        }
        if self.scaler.dim() != header.dim {
            return Err(FeatureError::mismatch(
                dir,
                format!("scaler has {} columns, header says {}", self.scaler.dim(), header.dim),
            ));
        }
        if !self.index.matches(&self.matrix) {
            return Err(FeatureError::mismatch(
                dir,
                format!(
                    "index holds {} points of width {} that differ from the matrix",
                    self.index.len(),
                    self.index.dim()
                ),
            ));
        }
        let stamp = compute_stamp(&self.table, &self.scaler, &self.matrix, &self.index);
        if stamp != header.stamp {
            return Err(FeatureError::mismatch(
                dir,
                format!("content stamp {} does not match recorded {}", stamp, header.stamp),
            ));
        }
        Ok(())
    }
}

/// Hash everything a query result depends on.
pub fn compute_stamp(table: &SongTable, scaler: &Scaler, matrix: &FeatureMatrix, index: &NeighborIndex) -> String {
    let mut hasher = Sha256::new();
    hasher.update(FORMAT_VERSION.to_le_bytes());
    hasher.update(FEATURE_SET_VERSION.as_bytes());
    hasher.update([0]);
    hasher.update(scaler.normalization.to_string().as_bytes());
    hasher.update([0]);
    hasher.update((scaler.columns.len() as u64).to_le_bytes());
    for column in &scaler.columns {
        let (tag, a, b) = match *column {
            ColumnScale::MinMax { min, max } => (1u8, min, max),
            ColumnScale::ZScore { mean, std } => (2u8, mean, std),
        };
        hasher.update([tag]);
        hasher.update(a.to_le_bytes());
        hasher.update(b.to_le_bytes());
    }
    hasher.update(index.algorithm().to_string().as_bytes());
    hasher.update([0]);
    hasher.update(index.metric().to_string().as_bytes());
    hasher.update([0]);

    hasher.update((table.len() as u64).to_le_bytes());
    for song in table.songs() {
        hasher.update(song.id.as_bytes());
        hasher.update([0x1f]);
        hasher.update(song.name.as_bytes());
        hasher.update([0x1f]);
        for artist in &song.artists {
            hasher.update(artist.as_bytes());
            hasher.update([0x1e]);
        }
        hasher.update(song.year.to_le_bytes());
        hasher.update(song.popularity.to_le_bytes());
    }

    hasher.update((matrix.rows() as u64).to_le_bytes());
    hasher.update((matrix.dim() as u64).to_le_bytes());
    for value in matrix.as_slice() {
        hasher.update(value.to_le_bytes());
    }

    format!("{:x}", hasher.finalize())
}

// =============================================================================
// File formats
// =============================================================================

#[derive(Serialize, Deserialize)]
struct ArtifactFile<T> {
    header: ArtifactHeader,
    body: T,
}

#[derive(Serialize)]
struct FeaturesBodyRef<'a> {
    scaler: &'a Scaler,
    matrix: &'a FeatureMatrix,
}

#[derive(Deserialize)]
struct FeaturesBody {
    scaler: Scaler,
    matrix: FeatureMatrix,
}

// =============================================================================
// Publish
// =============================================================================

/// Write the artifact set to `dir`, replacing whatever was there.
///
/// Files are written into a staging directory beside `dir` and only moved
/// into place once all three are complete and synced. If anything fails the
/// staging directory is removed and `dir` keeps its previous contents.
///
/// The old set is moved aside to `.<name>.previous-<pid>` for the instant
/// between the two renames. A process killed there leaves no `dir`; the next
/// `publish` or [`load`] of `dir` moves the backup back first.
#[instrument(skip(artifacts), fields(dir = %dir.display(), rows = artifacts.rows()))]
pub fn publish(artifacts: &PreparedArtifacts, dir: &Path) -> Result<()> {
    artifacts.verify(dir)?;

    let (parent, name) = locate(dir)?;
    fs::create_dir_all(&parent).map_err(|e| FeatureError::io(&parent, e))?;
    recover_interrupted(dir)?;

    let pid = std::process::id();
    let staging = parent.join(format!(".{name}.staging-{pid}"));
    let backup = parent.join(format!(".{name}.previous-{pid}"));

    if staging.exists() {
        fs::remove_dir_all(&staging).map_err(|e| FeatureError::io(&staging, e))?;
    }
    fs::create_dir(&staging).map_err(|e| FeatureError::io(&staging, e))?;

    if let Err(err) = write_all(artifacts, &staging) {
        discard(&staging);
        return Err(err);
    }

    let had_previous = dir.exists();
    if had_previous {
        if backup.exists() {
            discard(&backup);
        }
        if let Err(e) = fs::rename(dir, &backup) {
            discard(&staging);
            return Err(FeatureError::io(dir, e));
        }
    }

    if let Err(e) = fs::rename(&staging, dir) {
        if had_previous {
            if let Err(restore) = fs::rename(&backup, dir) {
                warn!("Failed to restore previous artifacts from {}: {}", backup.display(), restore);
            }
        }
        discard(&staging);
        return Err(FeatureError::io(dir, e));
    }

    if had_previous {
        discard(&backup);
    }

    info!(stamp = %artifacts.stamp(), "Published artifacts");
    Ok(())
}

fn write_all(artifacts: &PreparedArtifacts, dir: &Path) -> Result<()> {
    let header = &artifacts.header;
    write_json(
        &dir.join(SONGS_FILE),
        &ArtifactFile {
            header: header.clone(),
            body: &artifacts.table,
        },
    )?;
    write_json(
        &dir.join(FEATURES_FILE),
        &ArtifactFile {
            header: header.clone(),
            body: FeaturesBodyRef {
                scaler: &artifacts.scaler,
                matrix: &artifacts.matrix,
            },
        },
    )?;
    write_json(
        &dir.join(INDEX_FILE),
        &ArtifactFile {
            header: header.clone(),
            body: &artifacts.index,
        },
    )?;
    Ok(())
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let file = File::create(path).map_err(|e| FeatureError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, value).map_err(|source| FeatureError::Encoding {
        path: path.to_path_buf(),
        source,
    })?;
    writer.flush().map_err(|e| FeatureError::io(path, e))?;
    writer.get_ref().sync_all().map_err(|e| FeatureError::io(path, e))?;
    debug!("Wrote {}", path.display());
    Ok(())
}

/// Split `dir` into its parent (`.` when relative and bare) and file name.
fn locate(dir: &Path) -> Result<(PathBuf, String)> {
    let name = dir
        .file_name()
        .ok_or_else(|| {
            FeatureError::io(
                dir,
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "artifact directory needs a name"),
            )
        })?
        .to_string_lossy()
        .into_owned();
    let parent = match dir.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok((parent, name))
}

/// Put back a set left at `.<name>.previous-*` by a publish that died between
/// its renames. Does nothing while `dir` exists. The newest backup wins.
fn recover_interrupted(dir: &Path) -> Result<()> {
    if dir.exists() {
        return Ok(());
    }
    let Ok((parent, name)) = locate(dir) else {
        return Ok(());
    };
    let Ok(entries) = fs::read_dir(&parent) else {
        return Ok(());
    };
    let prefix = format!(".{name}.previous-");
    let newest = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().starts_with(&prefix))
        .filter_map(|entry| {
            let modified = entry.metadata().and_then(|m| m.modified()).ok()?;
            Some((modified, entry.path()))
        })
        .max();

    if let Some((_, backup)) = newest {
        warn!("Restoring artifacts from {} left by an interrupted publish", backup.display());
        fs::rename(&backup, dir).map_err(|e| FeatureError::io(dir, e))?;
    }
    Ok(())
}

fn discard(dir: &Path) {
    if let Err(e) = fs::remove_dir_all(dir) {
        warn!("Failed to remove {}: {}", dir.display(), e);
    }
}

// =============================================================================
// Load
// =============================================================================

/// Read and cross-check an artifact set.
///
/// Fails with [`FeatureError::ArtifactMismatch`] when the three files do not
/// carry the same header, when a body disagrees with its header, or when the
/// recomputed stamp differs from the recorded one.
#[instrument(fields(dir = %dir.display()))]
pub fn load(dir: &Path) -> Result<PreparedArtifacts> {
    recover_interrupted(dir)?;
    let songs: ArtifactFile<SongTable> = read_json(&dir.join(SONGS_FILE))?;
    let features: ArtifactFile<FeaturesBody> = read_json(&dir.join(FEATURES_FILE))?;
    let index: ArtifactFile<NeighborIndex> = read_json(&dir.join(INDEX_FILE))?;

    for (file, header) in [(FEATURES_FILE, &features.header), (INDEX_FILE, &index.header)] {
        if let Some(diff) = header_diff(&songs.header, header) {
            return Err(FeatureError::mismatch(
                dir,
                format!("{SONGS_FILE} and {file} disagree on {diff}"),
            ));
        }
    }

    let artifacts = PreparedArtifacts {
        header: songs.header,
        table: songs.body,
        scaler: features.body.scaler,
        matrix: features.body.matrix,
        index: index.body,
    };
    artifacts.verify(dir)?;

    info!(
        rows = artifacts.rows(),
        stamp = %artifacts.stamp(),
        "Loaded artifacts"
    );
    Ok(artifacts)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).map_err(|e| FeatureError::io(path, e))?;
    serde_json::from_reader(BufReader::new(file)).map_err(|source| FeatureError::Encoding {
        path: path.to_path_buf(),
        source,
    })
}

fn header_diff(a: &ArtifactHeader, b: &ArtifactHeader) -> Option<String> {
    if a.stamp != b.stamp {
        Some(format!("stamp ({} vs {})", a.stamp, b.stamp))
    } else if a.rows != b.rows {
        Some(format!("row count ({} vs {})", a.rows, b.rows))
    } else if a.dim != b.dim {
        Some(format!("dimension ({} vs {})", a.dim, b.dim))
    } else if a.feature_set != b.feature_set {
        Some(format!("feature set ({} vs {})", a.feature_set, b.feature_set))
    } else if a.format_version != b.format_version {
        Some(format!("format version ({} vs {})", a.format_version, b.format_version))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{IndexAlgorithm, Metric, Normalization};
    use catalog::{AudioAttributes, FEATURE_DIM, SongRecord};

    fn small_set() -> PreparedArtifacts {
        let songs: Vec<SongRecord> = (0..4)
            .map(|i| SongRecord {
                id: format!("s{i}"),
                name: format!("Song {i}"),
                artists: vec!["Band".to_string()],
                year: 1990 + i,
                popularity: 10 * i as u32,
                attributes: AudioAttributes::from_array([i as f64; FEATURE_DIM]),
            })
            .collect();
        let raw: Vec<[f64; FEATURE_DIM]> = songs.iter().map(|s| s.attributes.to_array()).collect();
        let scaler = Scaler::fit(&raw, FEATURE_DIM, Normalization::MinMax);
        let scaled: Vec<Vec<f64>> = raw.iter().map(|r| scaler.transform(r)).collect();
        let matrix = FeatureMatrix::from_rows(&scaled, FEATURE_DIM).unwrap();
        let index = NeighborIndex::build(&matrix, IndexAlgorithm::KdTree, Metric::Euclidean).unwrap();
        PreparedArtifacts::new(SongTable::new(songs), scaler, matrix, index)
    }

    #[test]
    fn test_stamp_is_stable_and_content_sensitive() {
        let a = small_set();
        let b = small_set();
        assert_eq!(a.stamp(), b.stamp());
        assert_eq!(a.stamp().len(), 64);

        let mut songs = a.table.songs().to_vec();
        songs[2].popularity += 1;
        let changed = compute_stamp(&SongTable::new(songs), &a.scaler, &a.matrix, &a.index);
        assert_ne!(changed, a.stamp());
    }

    #[test]
    fn test_publish_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("artifacts");
        let artifacts = small_set();

        publish(&artifacts, &target).unwrap();
        let loaded = load(&target).unwrap();

        assert_eq!(loaded.header, artifacts.header);
        assert_eq!(loaded.matrix, artifacts.matrix);
        assert_eq!(loaded.table.songs(), artifacts.table.songs());
    }

    #[test]
    fn test_publish_replaces_previous_set() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("artifacts");
        publish(&small_set(), &target).unwrap();

        let mut replacement = small_set();
        let songs = replacement.table.songs()[..3].to_vec();
        let raw: Vec<[f64; FEATURE_DIM]> = songs.iter().map(|s| s.attributes.to_array()).collect();
        let scaled: Vec<Vec<f64>> = raw.iter().map(|r| replacement.scaler.transform(r)).collect();
        let matrix = FeatureMatrix::from_rows(&scaled, FEATURE_DIM).unwrap();
        let index = NeighborIndex::build(&matrix, IndexAlgorithm::Brute, Metric::Euclidean).unwrap();
        replacement = PreparedArtifacts::new(SongTable::new(songs), replacement.scaler, matrix, index);
        publish(&replacement, &target).unwrap();

        let loaded = load(&target).unwrap();
        assert_eq!(loaded.rows(), 3);
        assert_eq!(loaded.index.algorithm(), IndexAlgorithm::Brute);

        // No staging or backup directories left behind
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name() != "artifacts")
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_mixed_files_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first");
        let second = dir.path().join("second");

        let a = small_set();
        let mut songs = a.table.songs().to_vec();
        songs[0].name = "Renamed".to_string();
        let b = PreparedArtifacts::new(SongTable::new(songs), a.scaler.clone(), a.matrix.clone(), a.index.clone());

        publish(&a, &first).unwrap();
        publish(&b, &second).unwrap();

        // Stale table next to a newer matrix and index
        fs::copy(second.join(SONGS_FILE), first.join(SONGS_FILE)).unwrap();
        let err = load(&first).unwrap_err();
        assert!(matches!(err, FeatureError::ArtifactMismatch { .. }), "{err}");
    }

    #[test]
    fn test_tampered_body_is_rejected() {
        let artifacts = small_set();
        let mut tampered = artifacts.clone();
        let mut songs = tampered.table.songs().to_vec();
        songs.pop();
        tampered.table = SongTable::new(songs);

        let err = tampered.verify(Path::new("mem")).unwrap_err();
        assert!(matches!(err, FeatureError::ArtifactMismatch { .. }));
    }

    #[test]
    fn test_scaler_parameters_are_stamped() {
        let artifacts = small_set();
        let mut rescaled = artifacts.clone();
        rescaled.scaler.columns[0] = ColumnScale::MinMax { min: 0.0, max: 6.0 };

        let stamp = compute_stamp(&rescaled.table, &rescaled.scaler, &rescaled.matrix, &rescaled.index);
        assert_ne!(stamp, artifacts.stamp());

        let err = rescaled.verify(Path::new("mem")).unwrap_err();
        assert!(matches!(err, FeatureError::ArtifactMismatch { .. }), "{err}");

        let dir = tempfile::tempdir().unwrap();
        assert!(publish(&rescaled, &dir.path().join("artifacts")).is_err());
    }

    #[test]
    fn test_set_moved_aside_by_killed_publish_is_restored() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("artifacts");
        let artifacts = small_set();
        let leftovers = || {
            fs::read_dir(dir.path())
                .unwrap()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_name() != "artifacts")
                .count()
        };

        // State after the first rename of a publish that never finished
        publish(&artifacts, &target).unwrap();
        fs::rename(&target, dir.path().join(".artifacts.previous-4242")).unwrap();

        let loaded = load(&target).unwrap();
        assert_eq!(loaded.stamp(), artifacts.stamp());
        assert!(target.is_dir());
        assert_eq!(leftovers(), 0);

        // A later publish recovers first, then replaces as usual
        fs::rename(&target, dir.path().join(".artifacts.previous-4243")).unwrap();
        publish(&artifacts, &target).unwrap();
        assert_eq!(load(&target).unwrap().stamp(), artifacts.stamp());
        assert_eq!(leftovers(), 0);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load(dir.path()).unwrap_err();
        assert!(matches!(err, FeatureError::Io { .. }));
    }
}
