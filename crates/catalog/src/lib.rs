//! # Catalog Crate
//!
//! Reading and validating the raw song catalog.
//!
//! ## Main Components
//!
//! - **types**: Song records, audio attributes and the fixed feature set
//! - **parser**: CSV catalog parsing and artist-list parsing
//! - **validate**: Raw rows to typed [`SongRecord`]s
//! - **table**: The ordered [`SongTable`] with id lookup and search
//! - **error**: Error types for catalog loading
//!
//! ## Example Usage
//!
//! ```ignore
//! use catalog::{parse_catalog, validate, SongTable};
//! use std::path::Path;
//!
//! let rows = parse_catalog(Path::new("data/data.csv"))?;
//! let songs = rows.iter().map(validate).collect::<Result<Vec<_>, _>>()?;
//! let table = SongTable::new(songs);
//!
//! let (row, song) = table.get("4BJqT0PrAfrxzMOxytFOIz").unwrap();
//! println!("row {row}: {}", song.display_label());
//! ```

// Public modules
pub mod error;
pub mod parser;
pub mod table;
pub mod types;
pub mod validate;

// Re-export commonly used types for convenience
pub use error::{CatalogError, Result};
pub use parser::{parse_artists, parse_catalog, parse_catalog_reader};
pub use table::SongTable;
pub use types::{
    AudioAttributes, FEATURE_DIM, FEATURE_NAMES, FEATURE_SET_VERSION, IDENTITY_COLUMNS,
    MAX_POPULARITY, RawSong, SongId, SongRecord,
};
pub use validate::validate;

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_row(line: usize, id: &str) -> RawSong {
        let mut raw = RawSong::from_pairs(
            line,
            [
                ("id", id),
                ("name", "Test Song"),
                ("artists", "['Test Artist']"),
                ("year", "2001"),
                ("popularity", "42"),
            ],
        );
        for column in FEATURE_NAMES {
            raw = raw.with_field(column, "0.25");
        }
        raw
    }

    #[test]
    fn test_empty_table() {
        let table = SongTable::new(Vec::new());
        assert!(table.is_empty());
        assert!(table.get("anything").is_none());
        assert!(table.row(0).is_none());
    }

    #[test]
    fn test_rows_to_table() {
        let rows = vec![raw_row(2, "a"), raw_row(3, "b")];
        let songs = rows.iter().map(validate).collect::<Result<Vec<_>>>().unwrap();
        let table = SongTable::new(songs);

        assert_eq!(table.len(), 2);
        assert_eq!(table.ids().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(table.row(1).unwrap().popularity, 42);
    }
}
