use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use colored::Colorize;
use engine::{QueryConfig, Recommendation, Recommender, ScoreTransform};
use features::{
    IndexAlgorithm, MalformedPolicy, Metric, NearestNeighbors, Normalization, PrepareConfig,
    artifacts, prepare_catalog,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

/// SongRecs - Song Similarity Recommender
#[derive(Parser)]
#[command(name = "song-recs")]
#[command(about = "Recommend songs that sound like a seed song", long_about = None)]
struct Cli {
    /// Directory holding the published artifact set
    #[arg(short, long, default_value = "data/artifacts")]
    artifacts: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build and publish artifacts from a raw catalog CSV
    Prepare {
        /// Catalog CSV to read
        #[arg(long)]
        catalog: PathBuf,

        /// Where to publish; defaults to --artifacts
        #[arg(long)]
        out: Option<PathBuf>,

        /// JSON file with preparation settings
        #[arg(long)]
        config: Option<PathBuf>,

        /// Skip malformed records instead of failing
        #[arg(long)]
        drop_malformed: bool,

        /// minmax or zscore
        #[arg(long)]
        normalization: Option<Normalization>,

        /// kdtree or brute
        #[arg(long)]
        algorithm: Option<IndexAlgorithm>,

        /// euclidean or manhattan
        #[arg(long)]
        metric: Option<Metric>,
    },

    /// Get songs similar to a seed song
    Recommend {
        /// Seed song id
        #[arg(long)]
        id: String,

        /// Number of recommendations to return
        #[arg(long, default_value = "20")]
        limit: usize,

        /// inverse (1/(1+d)) or complement (1-d)
        #[arg(long, default_value = "inverse")]
        score: ScoreTransform,
    },

    /// Search songs by name or artist
    Search {
        /// Text to look for (case-insensitive)
        #[arg(long)]
        query: String,

        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Show what the published artifact set contains
    Inspect,

    /// Run benchmark to test query performance
    Benchmark {
        /// Number of requests to make
        #[arg(long, default_value = "100")]
        requests: usize,

        /// Number of concurrent requests
        #[arg(long, default_value = "10")]
        concurrent: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Prepare {
            catalog,
            out,
            config,
            drop_malformed,
            normalization,
            algorithm,
            metric,
        } => {
            let mut prepare_config = match config {
                Some(path) => read_prepare_config(&path)?,
                None => PrepareConfig::default(),
            };
            if drop_malformed {
                prepare_config.malformed_policy = MalformedPolicy::Drop;
            }
            if let Some(normalization) = normalization {
                prepare_config.normalization = normalization;
            }
            if let Some(algorithm) = algorithm {
                prepare_config.algorithm = algorithm;
            }
            if let Some(metric) = metric {
                prepare_config.metric = metric;
            }
            let out = out.unwrap_or(cli.artifacts);
            handle_prepare(&catalog, &out, &prepare_config)?
        }
        Commands::Recommend { id, limit, score } => {
            let recommender = load_recommender(&cli.artifacts)?
                .with_config(QueryConfig::default().with_score(score));
            handle_recommend(&recommender, &id, limit)?
        }
        Commands::Search { query, limit } => {
            let recommender = load_recommender(&cli.artifacts)?;
            handle_search(&recommender, &query, limit)
        }
        Commands::Inspect => {
            let recommender = load_recommender(&cli.artifacts)?;
            handle_inspect(&recommender)
        }
        Commands::Benchmark {
            requests,
            concurrent,
        } => {
            let recommender = load_recommender(&cli.artifacts)?;
            handle_benchmark(recommender, requests, concurrent).await?
        }
    }

    Ok(())
}

fn read_prepare_config(path: &Path) -> Result<PrepareConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid config {}", path.display()))
}

fn load_recommender(dir: &Path) -> Result<Recommender> {
    println!("Loading artifacts from {}...", dir.display());
    let start = Instant::now();
    let recommender = Recommender::from_dir(dir)
        .with_context(|| format!("Failed to load artifacts from {}", dir.display()))?;
    println!(
        "{} Loaded {} songs in {:?}",
        "✓".green(),
        recommender.snapshot().len(),
        start.elapsed()
    );
    Ok(recommender)
}

/// Handle the 'prepare' command
fn handle_prepare(catalog: &Path, out: &Path, config: &PrepareConfig) -> Result<()> {
    println!(
        "Preparing {} ({}, {}, {}, on malformed: {})...",
        catalog.display(),
        config.normalization,
        config.algorithm,
        config.metric,
        config.malformed_policy
    );
    let start = Instant::now();
    let prepared = prepare_catalog(catalog, config)
        .with_context(|| format!("Failed to prepare {}", catalog.display()))?;
    artifacts::publish(&prepared, out)
        .with_context(|| format!("Failed to publish artifacts to {}", out.display()))?;

    println!(
        "{} Published {} songs to {} in {:?}",
        "✓".green(),
        prepared.rows(),
        out.display(),
        start.elapsed()
    );
    println!("{}Stamp: {}", "• ".cyan(), prepared.stamp());
    Ok(())
}

/// Handle the 'recommend' command
fn handle_recommend(recommender: &Recommender, id: &str, limit: usize) -> Result<()> {
    let snapshot = recommender.snapshot();
    let (_, seed) = snapshot
        .table()
        .get(id)
        .ok_or_else(|| anyhow!("Song {} not found", id))?;
    println!("{}", format!("Songs like {}:", seed.display_label()).bold().blue());

    let recommendations = recommender.recommend(id, limit)?;
    print_recommendations(recommender, &recommendations);
    Ok(())
}

/// Handle the 'search' command
fn handle_search(recommender: &Recommender, query: &str, limit: usize) {
    let snapshot = recommender.snapshot();
    let matches = snapshot.table().search(query, limit);

    println!("{}", format!("Search results for '{}':", query).bold().blue());
    if matches.is_empty() {
        println!("  (no matches)");
    }
    for (_, song) in matches {
        println!(
            "{}: {} [{}] {} popularity {}",
            song.id.green(),
            song.name,
            song.artists.join(", "),
            song.year,
            song.popularity
        );
    }
}

/// Handle the 'inspect' command
fn handle_inspect(recommender: &Recommender) {
    let snapshot = recommender.snapshot();
    let header = snapshot.header();

    println!("{}", "Artifact set:".bold().blue());
    println!("{}Stamp: {}", "• ".green(), header.stamp);
    println!("{}Format version: {}", "• ".green(), header.format_version);
    println!("{}Feature set: {}", "• ".green(), header.feature_set);
    println!("{}Songs: {}", "• ".green(), header.rows);
    println!("{}Dimensions: {}", "• ".green(), header.dim);
    println!(
        "{}Index: {} ({})",
        "• ".green(),
        snapshot.index().algorithm(),
        snapshot.index().metric()
    );

    let duplicates = snapshot.table().duplicate_ids();
    if duplicates.is_empty() {
        println!("{}Duplicate ids: none", "• ".cyan());
    } else {
        println!(
            "{}Duplicate ids: {}",
            "• ".yellow(),
            duplicates.join(", ").yellow()
        );
    }
}

/// Handle the 'benchmark' command
async fn handle_benchmark(recommender: Recommender, requests: usize, concurrent: usize) -> Result<()> {
    if requests == 0 {
        bail!("Benchmark needs at least one request");
    }
    let snapshot = recommender.snapshot();
    if snapshot.is_empty() {
        bail!("No songs loaded");
    }

    // Random seeds drawn from the loaded table
    let seeds: Vec<String> = (0..requests)
        .filter_map(|_| {
            let row = rand::random_range(0..snapshot.len());
            snapshot.table().row(row).map(|song| song.id.clone())
        })
        .collect();
    drop(snapshot);

    let permits = Arc::new(Semaphore::new(concurrent.max(1)));
    let wall = Instant::now();
    let mut handles = vec![];
    for seed in seeds {
        let recommender = recommender.clone();
        let permits = permits.clone();
        let handle = tokio::spawn(async move {
            let _permit = permits.acquire_owned().await?;
            tokio::task::spawn_blocking(move || {
                let start = Instant::now();
                recommender.recommend_default(&seed)?;
                Ok::<_, anyhow::Error>(start.elapsed())
            })
            .await?
        });
        handles.push(handle);
    }

    let mut timings: Vec<Duration> = vec![];
    for handle in handles {
        timings.push(handle.await??);
    }
    let wall_time = wall.elapsed();

    let total: Duration = timings.iter().sum();
    let avg_latency = total / timings.len() as u32;
    timings.sort();
    let percentile = |p: f64| timings[((timings.len() as f64 * p) as usize).min(timings.len() - 1)];
    let throughput = timings.len() as f64 / wall_time.as_secs_f64();

    println!("{}", "Benchmark results:".bold().blue());
    println!("Requests: {} ({} concurrent)", timings.len(), concurrent.max(1));
    println!("Total time: {:?}", wall_time);
    println!("Average latency: {:?}", avg_latency);
    println!("P50 latency: {:?}", percentile(0.50));
    println!("P95 latency: {:?}", percentile(0.95));
    println!("P99 latency: {:?}", percentile(0.99));
    println!("Throughput: {:.2} requests/second", throughput);

    Ok(())
}

/// Format and print recommendations, resolving display names from the table
fn print_recommendations(recommender: &Recommender, recommendations: &[Recommendation]) {
    let snapshot = recommender.snapshot();
    for (i, rec) in recommendations.iter().enumerate() {
        let label = snapshot
            .table()
            .get(&rec.id)
            .map(|(_, song)| song.display_label())
            .unwrap_or_else(|| rec.id.clone());
        println!(
            "{}. {} ({}) [{}] - Score: {:.3}, Popularity: {}",
            (i + 1).to_string().green(),
            label,
            rec.year,
            rec.id,
            rec.similarity_score,
            rec.popularity_scaled
        );
    }
}
