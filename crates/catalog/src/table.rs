//! The ordered song table.
//!
//! Row order is significant: row *i* of the table is row *i* of the feature
//! matrix and point *i* of the neighbor index. The table is never reordered
//! after construction.

use crate::types::{SongId, SongRecord};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use tracing::warn;

/// Ordered, immutable collection of songs with an id lookup.
#[derive(Debug, Clone)]
pub struct SongTable {
    songs: Vec<SongRecord>,
    /// First row of every id
    by_id: HashMap<SongId, usize>,
    /// Ids appearing on more than one row, with all their rows
    duplicates: HashMap<SongId, Vec<usize>>,
}

impl SongTable {
    /// Build a table, indexing ids. Duplicate ids are kept, logged, and
    /// resolve to their first row.
    pub fn new(songs: Vec<SongRecord>) -> Self {
        let mut by_id: HashMap<SongId, usize> = HashMap::with_capacity(songs.len());
        let mut duplicates: HashMap<SongId, Vec<usize>> = HashMap::new();

        for (row, song) in songs.iter().enumerate() {
            match by_id.get(&song.id) {
                Some(&first) => {
                    duplicates
                        .entry(song.id.clone())
                        .or_insert_with(|| vec![first])
                        .push(row);
                }
                None => {
                    by_id.insert(song.id.clone(), row);
                }
            }
        }

        for (id, rows) in &duplicates {
            warn!(song_id = %id, ?rows, "Song id appears on multiple rows; using the first");
        }

        Self {
            songs,
            by_id,
            duplicates,
        }
    }

    /// Look up a song and its row by id.
    pub fn get(&self, id: &str) -> Option<(usize, &SongRecord)> {
        self.by_id.get(id).map(|&row| (row, &self.songs[row]))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    /// Row lookup
    pub fn row(&self, row: usize) -> Option<&SongRecord> {
        self.songs.get(row)
    }

    /// Every row carrying `id`. Empty if unknown; more than one only for
    /// duplicated ids.
    pub fn rows_for(&self, id: &str) -> Vec<usize> {
        if let Some(rows) = self.duplicates.get(id) {
            return rows.clone();
        }
        self.by_id.get(id).map(|&row| vec![row]).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.songs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.songs.is_empty()
    }

    pub fn songs(&self) -> &[SongRecord] {
        &self.songs
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.songs.iter().map(|s| s.id.as_str())
    }

    /// Duplicated ids, sorted for stable output.
    pub fn duplicate_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.duplicates.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Case-insensitive substring search over song names and artists.
    ///
    /// Exact name matches come first, then name matches, then artist
    /// matches; within a group higher popularity wins and row order breaks
    /// remaining ties.
    pub fn search(&self, query: &str, limit: usize) -> Vec<(usize, &SongRecord)> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }

        let mut matches: Vec<(u8, usize, &SongRecord)> = self
            .songs
            .iter()
            .enumerate()
            .filter_map(|(row, song)| {
                let name = song.name.to_lowercase();
                let rank = if name == needle {
                    0
                } else if name.contains(&needle) {
                    1
                } else if song
                    .artists
                    .iter()
                    .any(|a| a.to_lowercase().contains(&needle))
                {
                    2
                } else {
                    return None;
                };
                Some((rank, row, song))
            })
            .collect();

        matches.sort_by(|a, b| {
            a.0.cmp(&b.0)
                .then_with(|| b.2.popularity.cmp(&a.2.popularity))
                .then_with(|| a.1.cmp(&b.1))
        });

        matches
            .into_iter()
            .take(limit)
            .map(|(_, row, song)| (row, song))
            .collect()
    }
}

// Persisted as the plain row list; the lookup maps are rebuilt on load.
impl Serialize for SongTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.songs.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SongTable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Vec::<SongRecord>::deserialize(deserializer).map(SongTable::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AudioAttributes, FEATURE_DIM};

    fn song(id: &str, name: &str, artist: &str, popularity: u32) -> SongRecord {
        SongRecord {
            id: id.to_string(),
            name: name.to_string(),
            artists: vec![artist.to_string()],
            year: 2000,
            popularity,
            attributes: AudioAttributes::from_array([0.0; FEATURE_DIM]),
        }
    }

    #[test]
    fn test_lookup_by_id() {
        let table = SongTable::new(vec![
            song("a", "Blue", "X", 1),
            song("b", "Red", "Y", 2),
        ]);

        assert_eq!(table.len(), 2);
        let (row, record) = table.get("b").unwrap();
        assert_eq!(row, 1);
        assert_eq!(record.name, "Red");
        assert!(table.get("zzz").is_none());
        assert!(table.duplicate_ids().is_empty());
    }

    #[test]
    fn test_duplicate_ids_resolve_to_first_row() {
        let table = SongTable::new(vec![
            song("a", "First", "X", 1),
            song("b", "Other", "Y", 2),
            song("a", "Second", "Z", 3),
        ]);

        let (row, record) = table.get("a").unwrap();
        assert_eq!(row, 0);
        assert_eq!(record.name, "First");
        assert_eq!(table.duplicate_ids(), vec!["a"]);
        assert_eq!(table.rows_for("a"), vec![0, 2]);
        assert_eq!(table.rows_for("b"), vec![1]);
        assert!(table.rows_for("nope").is_empty());
    }

    #[test]
    fn test_search_ranking() {
        let table = SongTable::new(vec![
            song("1", "Blue Monday", "New Order", 60),
            song("2", "Blue", "Joni Mitchell", 40),
            song("3", "Kind of Blue Intro", "Miles Davis", 80),
            song("4", "So What", "The Blue Notes", 90),
            song("5", "Unrelated", "Nobody", 99),
        ]);

        let ids: Vec<&str> = table
            .search("BLUE", 10)
            .into_iter()
            .map(|(_, s)| s.id.as_str())
            .collect();
        assert_eq!(ids, vec!["2", "3", "1", "4"]);

        assert_eq!(table.search("blue", 1).len(), 1);
        assert!(table.search("   ", 10).is_empty());
    }

    #[test]
    fn test_serde_round_trip_rebuilds_index() {
        let table = SongTable::new(vec![song("a", "A", "X", 1), song("b", "B", "Y", 2)]);
        let json = serde_json::to_string(&table).unwrap();
        let restored: SongTable = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.songs(), table.songs());
        assert_eq!(restored.get("b").map(|(row, _)| row), Some(1));
    }
}
