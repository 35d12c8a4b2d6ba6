//! Parser for song catalog files.
//!
//! The catalog is a CSV file with a header row. Column order does not matter,
//! extra columns are ignored, but every name in [`IDENTITY_COLUMNS`] and
//! [`FEATURE_NAMES`] must be present.
//!
//! The `artists` column usually holds a serialized list such as
//! `['Frank Sinatra', "Guns N' Roses"]`. It is parsed into a real
//! `Vec<String>` here, once, so nothing downstream ever re-reads that text.

use crate::error::{CatalogError, Result};
use crate::types::{FEATURE_NAMES, IDENTITY_COLUMNS, RawSong};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, instrument};

/// Parse a catalog CSV file into raw rows.
#[instrument(fields(path = %path.display()))]
pub fn parse_catalog(path: &Path) -> Result<Vec<RawSong>> {
    let file = File::open(path).map_err(|_| CatalogError::FileNotFound {
        path: path.display().to_string(),
    })?;
    let songs = parse_catalog_reader(file)?;
    debug!("Parsed {} catalog rows", songs.len());
    Ok(songs)
}

/// Parse catalog CSV from any reader.
pub fn parse_catalog_reader<R: Read>(reader: R) -> Result<Vec<RawSong>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::Headers)
        .from_reader(reader);

    let headers: Vec<String> = csv_reader
        .headers()?
        .iter()
        .map(|h| h.to_string())
        .collect();

    for column in IDENTITY_COLUMNS.iter().chain(FEATURE_NAMES.iter()) {
        if !headers.iter().any(|h| h == column) {
            return Err(CatalogError::MissingColumn {
                column: column.to_string(),
            });
        }
    }

    let mut songs = Vec::new();
    for (idx, record) in csv_reader.records().enumerate() {
        let record = record?;
        let line = record
            .position()
            .map(|p| p.line() as usize)
            .unwrap_or(idx + 2);

        // Skip blank lines
        if record.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }

        let mut raw = RawSong::new(line);
        for (column, value) in headers.iter().zip(record.iter()) {
            raw.fields.insert(column.clone(), value.to_string());
        }
        songs.push(raw);
    }

    Ok(songs)
}

/// Parse the `artists` cell into an ordered list of names.
///
/// Accepted forms:
/// - JSON array: `["A", "B"]`
/// - list literal with either quote style: `['A', "B's"]`
/// - a bare name: `A`
///
/// The error is a human readable reason; the caller attaches line/id context.
pub fn parse_artists(text: &str) -> std::result::Result<Vec<String>, String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err("empty artist list".to_string());
    }

    if !trimmed.starts_with('[') {
        return Ok(vec![trimmed.to_string()]);
    }

    let artists = match serde_json::from_str::<Vec<String>>(trimmed) {
        Ok(list) => list,
        Err(_) => parse_list_literal(trimmed)?,
    };

    if artists.is_empty() {
        return Err("empty artist list".to_string());
    }
    Ok(artists)
}

/// Parse `['a', "b", ...]` where each item is a quoted string.
fn parse_list_literal(text: &str) -> std::result::Result<Vec<String>, String> {
    let inner = text
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| format!("unterminated list: {text}"))?;

    let mut items = Vec::new();
    let mut chars = inner.chars().peekable();

    loop {
        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        let quote = match chars.next() {
            None => break,
            Some(q @ ('\'' | '"')) => q,
            Some(other) => return Err(format!("expected quoted name, found '{other}'")),
        };

        let mut item = String::new();
        let mut closed = false;
        while let Some(c) = chars.next() {
            match c {
                '\\' => match chars.next() {
                    Some(escaped) => item.push(escaped),
                    None => return Err("dangling escape".to_string()),
                },
                c if c == quote => {
                    closed = true;
                    break;
                }
                c => item.push(c),
            }
        }
        if !closed {
            return Err(format!("unterminated quoted name: {item}"));
        }
        items.push(item);

        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        match chars.next() {
            None => break,
            Some(',') => continue,
            Some(other) => return Err(format!("expected ',' between names, found '{other}'")),
        }
    }

    Ok(items)
}
