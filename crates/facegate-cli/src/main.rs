use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facegate_core::{
    AuthContext, AuthorizeReport, BackendStatus, CollectionStats, IdentityStore,
    VerificationEngine,
};
use facegate_index::SqliteIndex;
use facegate_vision::ArcFaceProvider;
use serde::Serialize;
use std::path::{Path, PathBuf};

mod config;
mod ingest;
mod scan;
mod worker;

use config::Config;

type Engine = VerificationEngine<ArcFaceProvider, SqliteIndex>;

#[derive(Parser)]
#[command(name = "facegate", about = "Face-embedding identity verification")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll one photo under an identity label
    Enroll {
        image: PathBuf,
        #[arg(short, long)]
        label: String,
        /// Target the authorized collection
        #[arg(long)]
        authorized: bool,
    },
    /// Find who a photo belongs to (1:N)
    Identify {
        image: PathBuf,
        /// Minimum cosine similarity; defaults to the stored or configured threshold
        #[arg(short, long)]
        threshold: Option<f32>,
        #[arg(long)]
        authorized: bool,
    },
    /// Decide whether two photos show the same person (1:1)
    Verify { image_a: PathBuf, image_b: PathBuf },
    /// Record counts and backend status
    Stats,
    /// Enroll every photo under a directory, labelled by subdirectory or file name
    Ingest { dir: PathBuf },
    /// Replace the authorized user's photos and calibrate their threshold
    Authorize {
        dir: PathBuf,
        #[arg(short, long)]
        label: Option<String>,
    },
    /// Recompute the authorized threshold from a photo directory
    Calibrate { dir: PathBuf },
    /// Watch a directory and identify new photos against the authorized user
    Scan {
        dir: PathBuf,
        /// Also try photos already in the directory
        #[arg(long)]
        existing: bool,
    },
    /// Delete a collection
    Clear {
        #[arg(long)]
        authorized: bool,
    },
}

#[derive(Serialize)]
struct CalibrateOutput<'a> {
    identity_label: &'a str,
    threshold: f32,
    adaptive: bool,
    used: usize,
    skipped: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    enrolled: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    failed: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();
    tracing::debug!(data_dir = %config.data_dir.display(), ?config, "configuration loaded");

    match cli.command {
        Commands::Enroll {
            image,
            label,
            authorized,
        } => {
            let mut engine = open_engine(&config)?;
            let response = engine.enroll(&image, &label, config.collection(authorized));
            engine.close()?;
            print_json(&response)?;
        }
        Commands::Identify {
            image,
            threshold,
            authorized,
        } => {
            let threshold = threshold.or_else(|| {
                authorized.then(|| AuthContext::load_or_default(&config.context_path()).threshold)
            });
            let mut engine = open_engine(&config)?;
            let response = engine.identify(&image, config.collection(authorized), threshold);
            engine.close()?;
            print_json(&response)?;
        }
        Commands::Verify { image_a, image_b } => {
            let mut engine = open_engine(&config)?;
            let response = engine.verify(&image_a, &image_b);
            engine.close()?;
            print_json(&response)?;
        }
        Commands::Stats => {
            print_json(&stats(&config))?;
        }
        Commands::Ingest { dir } => {
            let items = ingest::labelled_images(&dir)
                .with_context(|| format!("cannot read photo directory {}", dir.display()))?;
            tracing::info!(dir = %dir.display(), images = items.len(), "ingesting");
            let mut engine = open_engine(&config)?;
            let summary = engine.enroll_batch(
                items.iter().map(|(path, label)| (path.as_path(), label.as_str())),
                &config.main_collection,
            );
            engine.close()?;
            print_json(&summary)?;
        }
        Commands::Authorize { dir, label } => {
            let photos = photos_in(&dir)?;
            let context_path = config.context_path();
            let mut context = AuthContext::load_or_default(&context_path);
            if let Some(label) = label {
                context.identity_label = label;
            }

            let mut engine = open_engine(&config)?;
            let outcome =
                engine.authorize(&photos, &context.identity_label, &config.auth_collection);
            engine.close()?;
            let AuthorizeReport {
                summary,
                calibration: report,
            } = outcome?;

            context.apply(&report.calibration);
            context.save(&context_path)?;
            print_json(&CalibrateOutput {
                identity_label: &context.identity_label,
                threshold: context.threshold,
                adaptive: report.calibration.is_adaptive(),
                used: report.used.len(),
                skipped: report.skipped.len(),
                enrolled: Some(summary.enrolled),
                failed: Some(summary.failed),
            })?;
        }
        Commands::Calibrate { dir } => {
            let photos = photos_in(&dir)?;
            let context_path = config.context_path();
            let mut context = AuthContext::load_or_default(&context_path);

            let mut engine = open_engine(&config)?;
            let report = engine.calibrate(&photos);
            engine.close()?;

            context.apply(&report.calibration);
            context.save(&context_path)?;
            print_json(&CalibrateOutput {
                identity_label: &context.identity_label,
                threshold: context.threshold,
                adaptive: report.calibration.is_adaptive(),
                used: report.used.len(),
                skipped: report.skipped.len(),
                enrolled: None,
                failed: None,
            })?;
        }
        Commands::Scan { dir, existing } => {
            let context = AuthContext::load_or_default(&config.context_path());
            let engine = open_engine(&config)?;
            let handle = worker::spawn_worker(engine)?;
            let options = scan::ScanOptions {
                collection: config.auth_collection.clone(),
                threshold: Some(context.threshold),
                cooldown: config.scan_cooldown(),
                include_existing: existing,
            };

            tokio::select! {
                hit = scan::run_scan(&handle, &dir, &options) => {
                    let hit = hit?;
                    tracing::info!(label = %context.identity_label, image = %hit.image.display(), "authorized user recognised");
                    print_json(&hit.response)?;
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("scan interrupted");
                }
            }
            handle.close().await?;
        }
        Commands::Clear { authorized } => {
            let collection = config.collection(authorized);
            let mut store = open_store(&config)?;
            let existed = store.clear_collection(collection)?;
            store.close()?;
            print_json(&serde_json::json!({ "collection": collection, "deleted": existed }))?;
        }
    }

    Ok(())
}

fn open_store(config: &Config) -> Result<IdentityStore<SqliteIndex>> {
    let index = SqliteIndex::open(&config.index_path)
        .with_context(|| format!("cannot open index {}", config.index_path.display()))?;
    Ok(IdentityStore::new(index, config.embedding_dim, config.policy()))
}

/// Load the models, then take the index lock and make sure both collections
/// exist.
fn open_engine(config: &Config) -> Result<Engine> {
    let provider = ArcFaceProvider::load(&config.model_dir, config.verify_threshold)
        .with_context(|| format!("cannot load face models from {}", config.model_dir.display()))?;
    let store = open_store(config)?;
    let engine = VerificationEngine::open(
        provider,
        store,
        &[config.main_collection.as_str(), config.auth_collection.as_str()],
    )?;
    Ok(engine)
}

/// Stats for both collections. An index that cannot be opened reports offline.
fn stats(config: &Config) -> Vec<CollectionStats> {
    let collections = [config.main_collection.as_str(), config.auth_collection.as_str()];
    match SqliteIndex::open(&config.index_path) {
        Ok(index) => {
            let store = IdentityStore::new(index, config.embedding_dim, config.policy());
            collections
                .iter()
                .map(|c| store.collection_stats(c))
                .collect()
        }
        Err(err) => {
            tracing::warn!(path = %config.index_path.display(), error = %err, "index offline");
            collections
                .iter()
                .map(|c| CollectionStats {
                    collection: c.to_string(),
                    record_count: 0,
                    status: BackendStatus::Offline,
                    error: Some(err.to_string()),
                })
                .collect()
        }
    }
}

fn photos_in(dir: &Path) -> Result<Vec<PathBuf>> {
    let photos = ingest::list_images(dir)
        .with_context(|| format!("cannot read photo directory {}", dir.display()))?;
    anyhow::ensure!(!photos.is_empty(), "no photos found in {}", dir.display());
    Ok(photos)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
