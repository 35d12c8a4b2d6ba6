//! Integration tests for preparation and artifact persistence.
//!
//! These run the offline pipeline end to end: CSV catalog on disk, prepare,
//! publish, load back.

use catalog::{FEATURE_NAMES, IDENTITY_COLUMNS};
use features::{
    FeatureError, MalformedPolicy, NearestNeighbors, PrepareConfig, artifacts, prepare_catalog,
};
use std::path::Path;

/// (id, name, artists cell, year, popularity, attribute level)
type Row<'a> = (&'a str, &'a str, &'a str, i32, u32, f64);

fn write_catalog(path: &Path, rows: &[Row<'_>]) {
    let mut writer = csv::Writer::from_path(path).unwrap();
    let mut header: Vec<&str> = IDENTITY_COLUMNS.to_vec();
    header.extend(FEATURE_NAMES.iter());
    writer.write_record(&header).unwrap();

    for &(id, name, artists, year, popularity, level) in rows {
        let mut record = vec![
            id.to_string(),
            name.to_string(),
            artists.to_string(),
            year.to_string(),
            popularity.to_string(),
        ];
        for i in 0..FEATURE_NAMES.len() {
            record.push(format!("{}", level + i as f64 * 0.01));
        }
        writer.write_record(&record).unwrap();
    }
    writer.flush().unwrap();
}

fn sample_rows() -> Vec<Row<'static>> {
    vec![
        ("4BJqT0PrAfrxzMOxytFOIz", "Piano Concerto No. 3", "['Sergei Rachmaninoff', 'James Levine']", 1921, 4, 0.10),
        ("7xPhfUan2yNtyFG0cUWkt8", "Clancy Lowered the Boom", "['Dennis Day']", 1921, 5, 0.90),
        ("1o6I8BglA6ylDMrIELygv1", "Gati Bali", "['KHP Kridhamardawa']", 1921, 0, 0.12),
        ("3ftBPsC5vPBKxYSee08FDH", "Danny Boy", "[\"Frank Parker\"]", 1921, 0, 0.50),
        ("4d6HGyGT8e121BsdKmw9v6", "When Irish Eyes Are Smiling", "['Phil Regan']", 1921, 0, 0.55),
    ]
}

#[test]
fn test_alignment_survives_publish_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let catalog_path = dir.path().join("data.csv");
    let out = dir.path().join("artifacts");
    write_catalog(&catalog_path, &sample_rows());

    let prepared = prepare_catalog(&catalog_path, &PrepareConfig::default()).unwrap();
    artifacts::publish(&prepared, &out).unwrap();
    let loaded = artifacts::load(&out).unwrap();

    // Round-trip a known id through table, matrix and index
    let (row, song) = loaded.table.get("3ftBPsC5vPBKxYSee08FDH").unwrap();
    assert_eq!(song.name, "Danny Boy");
    assert_eq!(song.artists, vec!["Frank Parker"]);
    assert_eq!(loaded.matrix.row(row), prepared.matrix.row(row));
    assert_eq!(loaded.index.point(row), loaded.matrix.row(row));

    let hits = loaded.index.search(loaded.matrix.row(row).unwrap(), 1);
    assert_eq!(hits[0].row, row);
    assert_eq!(loaded.table.row(hits[0].row).unwrap().id, "3ftBPsC5vPBKxYSee08FDH");

    let first = loaded.table.get("4BJqT0PrAfrxzMOxytFOIz").unwrap().1;
    assert_eq!(first.artists, vec!["Sergei Rachmaninoff", "James Levine"]);
}

#[test]
fn test_missing_attribute_publishes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let good_path = dir.path().join("good.csv");
    let bad_path = dir.path().join("bad.csv");
    let out = dir.path().join("artifacts");

    write_catalog(&good_path, &sample_rows());
    let published = prepare_catalog(&good_path, &PrepareConfig::default()).unwrap();
    artifacts::publish(&published, &out).unwrap();

    // Blank out one required attribute cell
    write_catalog(&bad_path, &sample_rows());
    let text = std::fs::read_to_string(&bad_path).unwrap();
    let mut lines: Vec<String> = text.lines().map(str::to_string).collect();
    let mut cells: Vec<String> = lines[3].split(',').map(str::to_string).collect();
    let last = cells.len() - 1;
    cells[last] = String::new();
    lines[3] = cells.join(",");
    std::fs::write(&bad_path, lines.join("\n")).unwrap();

    let err = prepare_catalog(&bad_path, &PrepareConfig::default()).unwrap_err();
    assert!(matches!(
        err,
        FeatureError::MalformedRecord { line: 4, ref field, .. } if field == "valence"
    ));

    // The previously published set is untouched
    let loaded = artifacts::load(&out).unwrap();
    assert_eq!(loaded.stamp(), published.stamp());
}

#[test]
fn test_drop_policy_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.csv");
    let mut rows = sample_rows();
    rows.push(("", "No Id", "['Nobody']", 1921, 0, 0.3));
    write_catalog(&path, &rows);

    let config = PrepareConfig::default().with_malformed_policy(MalformedPolicy::Drop);
    let prepared = prepare_catalog(&path, &config).unwrap();
    assert_eq!(prepared.rows(), 5);

    let strict = prepare_catalog(&path, &PrepareConfig::default());
    assert!(matches!(strict, Err(FeatureError::MalformedRecord { .. })));
}

#[test]
fn test_missing_column_is_a_catalog_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.csv");
    std::fs::write(&path, "id,name,artists,year,popularity\nx,y,z,2000,1\n").unwrap();

    let err = prepare_catalog(&path, &PrepareConfig::default()).unwrap_err();
    assert!(matches!(err, FeatureError::Catalog(_)));
}
