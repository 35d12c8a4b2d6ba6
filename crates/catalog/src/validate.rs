//! Turn raw catalog rows into typed song records.
//!
//! Validation never guesses: a missing, blank or non-numeric value is a
//! [`CatalogError::MalformedRecord`]. Whether that aborts the run or just
//! drops the row is decided by the caller.

use crate::error::{CatalogError, Result};
use crate::parser::parse_artists;
use crate::types::{AudioAttributes, FEATURE_DIM, FEATURE_NAMES, MAX_POPULARITY, RawSong, SongRecord};

/// Validate one raw row.
pub fn validate(raw: &RawSong) -> Result<SongRecord> {
    let id = raw.id();
    if id.is_empty() {
        return Err(malformed(raw, "id", "missing song id"));
    }

    let name = raw
        .get("name")
        .ok_or_else(|| malformed(raw, "name", "missing value"))?
        .trim()
        .to_string();

    let artists_text = raw
        .get("artists")
        .ok_or_else(|| malformed(raw, "artists", "missing value"))?;
    let artists = parse_artists(artists_text).map_err(|reason| malformed(raw, "artists", &reason))?;

    let year: i32 = required(raw, "year")?
        .parse()
        .map_err(|e| malformed(raw, "year", &format!("not an integer: {e}")))?;

    let popularity: u32 = required(raw, "popularity")?
        .parse()
        .map_err(|e| malformed(raw, "popularity", &format!("not an integer: {e}")))?;
    if popularity > MAX_POPULARITY {
        return Err(malformed(
            raw,
            "popularity",
            &format!("{popularity} is outside 0-{MAX_POPULARITY}"),
        ));
    }

    let mut values = [0.0; FEATURE_DIM];
    for (slot, column) in values.iter_mut().zip(FEATURE_NAMES) {
        let text = required(raw, column)?;
        let value: f64 = text
            .parse()
            .map_err(|_| malformed(raw, column, &format!("'{text}' is not numeric")))?;
        if !value.is_finite() {
            return Err(malformed(raw, column, &format!("'{text}' is not finite")));
        }
        *slot = value;
    }

    Ok(SongRecord {
        id: id.to_string(),
        name,
        artists,
        year,
        popularity,
        attributes: AudioAttributes::from_array(values),
    })
}

/// A present, non-blank value for `column`.
fn required<'a>(raw: &'a RawSong, column: &str) -> Result<&'a str> {
    match raw.get(column).map(str::trim) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(malformed(raw, column, "missing value")),
    }
}

fn malformed(raw: &RawSong, field: &str, reason: &str) -> CatalogError {
    CatalogError::MalformedRecord {
        line: raw.line,
        id: raw.id().to_string(),
        field: field.to_string(),
        reason: reason.to_string(),
    }
}
