use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use transit_sync::datasets::DatasetVersionTracker;
use transit_sync::sources::{naptan, NocTables};
use transit_sync::{
    collect_stats, Archiver, Config, EventLogNotifier, ImportPipeline, ObjectStore, RunContext,
    SqliteStore,
};

/// Transit Sync - canonical transit reference data and journey archival.
#[derive(Parser, Debug)]
#[command(name = "transit-sync")]
#[command(about = "Sync transit reference data and archive real-time journeys", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(long, global = true, env = "TRANSIT_SYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Override the database path from configuration
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Abort a run that takes longer than this many seconds
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Import operators and operator groups from a Traveline NOC export directory
    ImportNoc {
        dir: PathBuf,

        #[arg(long, default_value = "traveline-noc")]
        dataset: String,

        /// Import even when the generation date has been seen before
        #[arg(long)]
        force: bool,
    },

    /// Import stops from a NaPTAN StopPoints CSV
    ImportStops {
        csv: PathBuf,

        #[arg(long, default_value = "naptan")]
        dataset: String,
    },

    /// Archive real-time journeys older than the retention window
    Archive {
        /// Run repeatedly, this many seconds apart
        #[arg(long)]
        repeat_every_secs: Option<u64>,
    },

    /// Print collection counts as JSON
    Stats,
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = Config::load(args.config.as_deref()).context("failed to load configuration")?;
    if let Some(database) = args.database {
        config.database_path = database;
    }

    let store = SqliteStore::open(&config.database_path)
        .with_context(|| format!("failed to open {}", config.database_path.display()))?;

    // Each run gets its own deadline
    let timeout = args.timeout_secs.map(Duration::from_secs);
    let run_context = || match timeout {
        Some(timeout) => RunContext::with_timeout(timeout),
        None => RunContext::new(),
    };

    match args.command {
        Command::ImportNoc { dir, dataset, force } => {
            run_import_noc(&config, &store, run_context(), &dir, &dataset, force)
        }
        Command::ImportStops { csv, dataset } => run_import_stops(&config, &store, run_context(), &csv, &dataset),
        Command::Archive { repeat_every_secs } => match repeat_every_secs {
            Some(secs) => {
                let interval = Duration::from_secs(secs.max(1));
                loop {
                    let started = Instant::now();
                    if let Err(e) = run_archive(&config, &store, run_context()) {
                        warn!(error = %format!("{:#}", e), "archive run failed");
                    }
                    let remaining = interval.saturating_sub(started.elapsed());
                    info!(next_run_in_secs = remaining.as_secs(), "waiting for next archive run");
                    std::thread::sleep(remaining);
                }
            }
            None => run_archive(&config, &store, run_context()),
        },
        Command::Stats => run_stats(&config, &store),
    }
}

fn run_import_noc(
    config: &Config,
    store: &SqliteStore,
    ctx: RunContext,
    dir: &std::path::Path,
    dataset: &str,
    force: bool,
) -> Result<()> {
    let tables = NocTables::load_from_dir(dir)
        .with_context(|| format!("failed to load NOC tables from {}", dir.display()))?;

    let tracker = DatasetVersionTracker::new(store);
    let version = if tables.generation_date.is_empty() {
        None
    } else {
        Some(tables.generation_date.as_str())
    };
    if let Some(version) = version {
        if !force && !tracker.is_changed(dataset, "NOC", version)? {
            println!("✓ {} already imported at {}", dataset, version);
            return Ok(());
        }
    }

    let notifier = EventLogNotifier::new(store);
    let summary = ImportPipeline::new(store, &notifier)
        .with_parallelism(config.effective_parallelism())
        .with_retry(config.retry_policy())
        .with_context(ctx)
        .import_noc(&tables, dataset)
        .context("NOC import failed")?;

    if let Some(version) = version {
        tracker.record(dataset, "NOC", version)?;
    }

    println!(
        "✓ Operators: {} inserted, {} updated",
        summary.operators.inserts, summary.operators.updates
    );
    println!(
        "✓ Operator groups: {} inserted, {} updated",
        summary.operator_groups.inserts, summary.operator_groups.updates
    );
    Ok(())
}

fn run_import_stops(
    config: &Config,
    store: &SqliteStore,
    ctx: RunContext,
    csv: &std::path::Path,
    dataset: &str,
) -> Result<()> {
    let stops = naptan::load_stop_points(csv)
        .with_context(|| format!("failed to load stop points from {}", csv.display()))?;

    let notifier = EventLogNotifier::new(store);
    let report = ImportPipeline::new(store, &notifier)
        .with_parallelism(config.effective_parallelism())
        .with_retry(config.retry_policy())
        .with_context(ctx)
        .import_stops(&stops, &naptan::datasource(dataset))
        .context("stop import failed")?;

    println!(
        "✓ Stops: {} inserted, {} updated, {} unchanged",
        report.inserts, report.updates, report.noops
    );
    Ok(())
}

fn run_archive(config: &Config, store: &SqliteStore, ctx: RunContext) -> Result<()> {
    let object_store = build_object_store(config)?;

    let mut archiver = Archiver::new(store, config.archive_options())
        .with_retry(config.retry_policy())
        .with_context(ctx);
    if let Some(object_store) = object_store.as_deref() {
        archiver = archiver.with_object_store(object_store);
    }

    let report = archiver.perform().context("archive run failed")?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[cfg(feature = "s3")]
fn build_object_store(config: &Config) -> Result<Option<Box<dyn ObjectStore>>> {
    if !config.archive_cloud_upload {
        return Ok(None);
    }
    let s3 = transit_sync::object_store::S3ObjectStore::from_env()
        .context("failed to configure S3 client")?;
    Ok(Some(Box::new(s3)))
}

#[cfg(not(feature = "s3"))]
fn build_object_store(config: &Config) -> Result<Option<Box<dyn ObjectStore>>> {
    if !config.archive_cloud_upload {
        return Ok(None);
    }
    Ok(Some(Box::new(transit_sync::LocalDirObjectStore::new(
        config.object_store_root.clone(),
    ))))
}

fn run_stats(config: &Config, store: &SqliteStore) -> Result<()> {
    let stats = collect_stats(store, Utc::now(), config.active_window())?;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}
