//! facerec - Benchmark and clustering tool for face recognition strategies.

mod config;
mod runner;

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use facerec_recognition::{EngineConfig, RecognitionEngine, Strategy, dbscan};
use facerec_spatial::SpatialStore;
use tracing_subscriber::EnvFilter;

/// Benchmark and clustering tool for face recognition strategies.
///
/// Datasets are JSON lines of precomputed embeddings:
///   {"label": "alice", "embedding": [0.12, -0.03, ...]}
#[derive(Parser, Debug)]
#[command(name = "facerec")]
#[command(about = "Face recognition benchmark and clustering tool")]
#[command(version)]
struct Cli {
    /// Engine config file (YAML or JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Embedding dimension (overrides the config file)
    #[arg(long, global = true)]
    dim: Option<usize>,

    /// Verbose output
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Register a training split and measure recognition errors on the rest
    Bench(BenchArgs),
    /// Group embeddings with DBSCAN and print cluster sizes
    Cluster(ClusterArgs),
}

#[derive(Args, Debug)]
struct BenchArgs {
    /// Dataset file (JSON lines)
    #[arg(long)]
    dataset: PathBuf,

    /// Share of each label's samples used for training
    #[arg(long, default_value_t = 0.8)]
    split: f64,

    /// cosine, l2, l2norm, tree, svm or knn
    #[arg(long, default_value = "cosine")]
    strategy: Strategy,

    /// Similarity/distance threshold, or neighbor count for tree
    #[arg(long, default_value_t = 0.7)]
    threshold: f64,

    /// Persist the spatial index in this redb file instead of memory
    #[arg(long)]
    store: Option<PathBuf>,

    /// Directory for trained classifier models
    #[arg(long)]
    model_dir: Option<PathBuf>,

    /// Output JSON report to file
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ClusterArgs {
    /// Dataset file (JSON lines); labels are ignored
    #[arg(long)]
    dataset: PathBuf,

    /// Neighborhood radius as cosine distance (overrides the config file)
    #[arg(long)]
    eps: Option<f32>,

    /// Core-point size (overrides the config file)
    #[arg(long)]
    min_samples: Option<usize>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    let mut cfg = config::load_engine_config(cli.config.as_deref())?;
    if let Some(dim) = cli.dim {
        cfg.dim = dim;
    }

    match cli.command {
        Commands::Bench(args) => bench(cfg, args),
        Commands::Cluster(args) => cluster(cfg, args),
    }
}

fn bench(mut cfg: EngineConfig, args: BenchArgs) -> Result<()> {
    if !(0.0..=1.0).contains(&args.split) {
        anyhow::bail!("--split must be within [0, 1], got {}", args.split);
    }
    let samples = config::load_dataset(&args.dataset)?;
    let Some(first) = samples.first() else {
        anyhow::bail!("dataset {} is empty", args.dataset.display());
    };
    if cfg.dim == 0 {
        cfg.dim = first.embedding.len();
    }
    if args.model_dir.is_some() {
        cfg.model_dir = args.model_dir.clone();
    }
    let cfg = cfg.with_defaults();

    let engine = match &args.store {
        Some(path) => {
            let store = SpatialStore::open(path, cfg.dim)
                .with_context(|| format!("open store {}", path.display()))?;
            RecognitionEngine::new(cfg, Box::new(store))?
        }
        None => RecognitionEngine::with_memory_index(cfg),
    };

    let (train, test) = config::split(samples, args.split);
    let report = runner::run(&engine, &train, &test, args.strategy, args.threshold)?;
    runner::print_summary(&report);

    if let Some(path) = &args.output {
        runner::save_report(&report, path)?;
        println!("Report saved to {}", path.display());
    }
    engine.persist()?;
    Ok(())
}

fn cluster(cfg: EngineConfig, args: ClusterArgs) -> Result<()> {
    let samples = config::load_dataset(&args.dataset)?;
    let embeddings: Vec<Vec<f32>> = samples.into_iter().map(|s| s.embedding).collect();

    let cfg = cfg.with_defaults();
    let eps = args.eps.unwrap_or(cfg.cluster_eps);
    let min_samples = args.min_samples.unwrap_or(cfg.cluster_min_samples);
    let labels = dbscan::cluster(&embeddings, eps, min_samples);

    let mut sizes: BTreeMap<i32, usize> = BTreeMap::new();
    for &l in &labels {
        *sizes.entry(l).or_default() += 1;
    }

    println!(
        "{} faces, {} clusters (eps {}, min_samples {})",
        labels.len(),
        dbscan::cluster_count(&labels),
        eps,
        min_samples
    );
    for (label, size) in &sizes {
        if *label == dbscan::NOISE {
            println!("  {:<10} {:>8}", "noise", size);
        } else {
            println!("  {:<10} {:>8}", format!("#{label}"), size);
        }
    }
    Ok(())
}
