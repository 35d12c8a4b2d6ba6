//! Core domain types for the song catalog.
//!
//! A catalog row starts life as a [`RawSong`] (untyped text straight from the
//! source) and becomes a [`SongRecord`] once validation has turned every
//! field into its real type.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// =============================================================================
// Type Aliases
// =============================================================================

/// Unique identifier for a song (the upstream track id, e.g. a Spotify id)
pub type SongId = String;

// =============================================================================
// Feature Set
// =============================================================================

/// Version tag of the attribute selection below. Bump it whenever the list or
/// its order changes; it is baked into every artifact stamp.
pub const FEATURE_SET_VERSION: &str = "audio-v1";

/// Number of numeric attributes that make up a feature vector
pub const FEATURE_DIM: usize = 12;

/// Attribute columns consumed by feature preparation, in vector order.
pub const FEATURE_NAMES: [&str; FEATURE_DIM] = [
    "acousticness",
    "danceability",
    "duration_ms",
    "energy",
    "instrumentalness",
    "key",
    "liveness",
    "loudness",
    "mode",
    "speechiness",
    "tempo",
    "valence",
];

/// Non-attribute columns every catalog must carry.
pub const IDENTITY_COLUMNS: [&str; 5] = ["id", "name", "artists", "year", "popularity"];

/// Upper bound of the popularity scale used by the catalog source.
pub const MAX_POPULARITY: u32 = 100;

// =============================================================================
// Song Types
// =============================================================================

/// Numeric audio attributes of one song, one field per entry of
/// [`FEATURE_NAMES`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AudioAttributes {
    pub acousticness: f64,
    pub danceability: f64,
    pub duration_ms: f64,
    pub energy: f64,
    pub instrumentalness: f64,
    pub key: f64,
    pub liveness: f64,
    pub loudness: f64,
    pub mode: f64,
    pub speechiness: f64,
    pub tempo: f64,
    pub valence: f64,
}

impl AudioAttributes {
    /// Build from values given in [`FEATURE_NAMES`] order.
    pub fn from_array(values: [f64; FEATURE_DIM]) -> Self {
        let [
            acousticness,
            danceability,
            duration_ms,
            energy,
            instrumentalness,
            key,
            liveness,
            loudness,
            mode,
            speechiness,
            tempo,
            valence,
        ] = values;
        Self {
            acousticness,
            danceability,
            duration_ms,
            energy,
            instrumentalness,
            key,
            liveness,
            loudness,
            mode,
            speechiness,
            tempo,
            valence,
        }
    }

    /// Values in [`FEATURE_NAMES`] order.
    pub fn to_array(&self) -> [f64; FEATURE_DIM] {
        [
            self.acousticness,
            self.danceability,
            self.duration_ms,
            self.energy,
            self.instrumentalness,
            self.key,
            self.liveness,
            self.loudness,
            self.mode,
            self.speechiness,
            self.tempo,
            self.valence,
        ]
    }
}

/// A validated song. Immutable once it is part of a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SongRecord {
    pub id: SongId,
    pub name: String,
    /// Credited artists in billing order
    pub artists: Vec<String>,
    pub year: i32,
    /// Popularity on the source's 0-100 scale
    pub popularity: u32,
    pub attributes: AudioAttributes,
}

impl SongRecord {
    /// First credited artist, if any.
    pub fn primary_artist(&self) -> Option<&str> {
        self.artists.first().map(String::as_str)
    }

    /// "Name by Artist" label used when listing songs.
    pub fn display_label(&self) -> String {
        match self.primary_artist() {
            Some(artist) => format!("{} by {}", self.name, artist),
            None => self.name.clone(),
        }
    }
}

/// One unparsed catalog row.
#[derive(Debug, Clone, Default)]
pub struct RawSong {
    /// 1-based source line (the header occupies line 1)
    pub line: usize,
    pub fields: HashMap<String, String>,
}

impl RawSong {
    pub fn new(line: usize) -> Self {
        Self {
            line,
            fields: HashMap::new(),
        }
    }

    /// Build a row from column/value pairs. Handy for programmatic catalogs.
    pub fn from_pairs<K, V>(line: usize, pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            line,
            fields: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Set (or overwrite) one column, builder style.
    pub fn with_field(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(column.into(), value.into());
        self
    }

    /// Drop a column entirely, builder style.
    pub fn without_field(mut self, column: &str) -> Self {
        self.fields.remove(column);
        self
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields.get(column).map(String::as_str)
    }

    /// The id cell, trimmed, or "" when absent.
    pub fn id(&self) -> &str {
        self.get("id").map(str::trim).unwrap_or("")
    }
}
