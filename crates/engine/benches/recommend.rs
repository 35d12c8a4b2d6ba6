//! Benchmarks for recommendation queries
//!
//! Run with: cargo bench --package engine
//!
//! Uses a synthetic catalog so no data files are needed.

use catalog::{AudioAttributes, FEATURE_DIM, SongRecord};
use criterion::{Criterion, black_box, criterion_group, criterion_main};
use engine::{PreparedDataset, Recommender};
use features::{IndexAlgorithm, PrepareConfig, prepare_records};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const CATALOG_SIZE: usize = 20_000;

fn synthetic_catalog() -> Vec<SongRecord> {
    let mut rng = StdRng::seed_from_u64(42);
    (0..CATALOG_SIZE)
        .map(|i| {
            let mut values = [0.0; FEATURE_DIM];
            for v in values.iter_mut() {
                *v = rng.random_range(0.0..1.0);
            }
            SongRecord {
                id: format!("song-{i}"),
                name: format!("Song {i}"),
                artists: vec![format!("Artist {}", i % 500)],
                year: 1950 + (i % 70) as i32,
                popularity: rng.random_range(0..=100),
                attributes: AudioAttributes::from_array(values),
            }
        })
        .collect()
}

fn recommender(algorithm: IndexAlgorithm) -> Recommender {
    let config = PrepareConfig::default().with_algorithm(algorithm);
    let artifacts = prepare_records(synthetic_catalog(), &config).expect("Failed to prepare catalog");
    Recommender::new(PreparedDataset::from(artifacts))
}

fn bench_recommend_kdtree(c: &mut Criterion) {
    let rec = recommender(IndexAlgorithm::KdTree);

    c.bench_function("recommend_kdtree_20", |b| {
        b.iter(|| {
            let recs = rec.recommend(black_box("song-1234"), black_box(20)).unwrap();
            black_box(recs)
        })
    });
}

fn bench_recommend_brute(c: &mut Criterion) {
    let rec = recommender(IndexAlgorithm::Brute);

    c.bench_function("recommend_brute_20", |b| {
        b.iter(|| {
            let recs = rec.recommend(black_box("song-1234"), black_box(20)).unwrap();
            black_box(recs)
        })
    });
}

fn bench_prepare(c: &mut Criterion) {
    let songs = synthetic_catalog();
    let config = PrepareConfig::default();

    let mut group = c.benchmark_group("prepare");
    group.sample_size(10);
    group.bench_function("prepare_records_20k", |b| {
        b.iter(|| {
            let artifacts = prepare_records(black_box(songs.clone()), &config).unwrap();
            black_box(artifacts)
        })
    });
    group.finish();
}

criterion_group!(benches, bench_recommend_kdtree, bench_recommend_brute, bench_prepare);
criterion_main!(benches);
