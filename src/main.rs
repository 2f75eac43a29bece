//! CLI entry point for the timeshard tool.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use time::OffsetDateTime;
use timeshard_core::{
    CacheCoordinator, CachePolicy, CacheStore, CalendarDate, Database, DatasetId, HttpTransport,
    PartitionFetcher, QueryEngine, RetryPolicy, resolve,
};
use tracing::{debug, info, warn};
use url::Url;

mod cli;

use cli::{Args, Command};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Determine log level based on verbose/quiet flags
    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (warn)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "warn",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "CLI arguments parsed");

    let engine = build_engine(&args.cache, &args.generation).await?;

    match args.command {
        Command::Query {
            dataset,
            manifest,
            from,
            to,
            pretty,
        } => run_query(&engine, &dataset, &manifest, &from, &to, pretty).await,
        Command::Refresh {
            dataset,
            manifest,
            window_days,
        } => run_refresh(&engine, &dataset, &manifest, window_days).await,
    }
}

/// Builds the engine over a file-backed cache, purging stale generations
/// before the first request.
async fn build_engine(cache_path: &Path, generation: &str) -> Result<Arc<QueryEngine>> {
    let db = Database::new(cache_path)
        .await
        .with_context(|| format!("opening cache database {}", cache_path.display()))?;

    let coordinator = Arc::new(CacheCoordinator::new(
        Arc::new(HttpTransport::new()),
        CacheStore::new(db, generation),
        RetryPolicy::default(),
    ));
    let purged = coordinator.purge_stale_generations().await?;
    if purged > 0 {
        info!(purged, "purged cache entries from older generations");
    }

    Ok(Arc::new(QueryEngine::new(coordinator)))
}

async fn run_query(
    engine: &QueryEngine,
    dataset: &str,
    manifest: &str,
    from: &str,
    to: &str,
    pretty: bool,
) -> Result<()> {
    let dataset = DatasetId::new(dataset)?;
    let manifest_url = Url::parse(manifest).with_context(|| format!("invalid manifest URL: {manifest}"))?;
    let start = CalendarDate::parse(from)?;
    let end = CalendarDate::parse(to)?;

    engine
        .register_dataset(dataset.clone(), manifest_url)
        .await
        .context("registering dataset")?;

    let result = engine.query_range(&dataset, start, end).await?;

    if result.offline {
        warn!("serving cached data; the network is unavailable");
    }

    let output = if pretty {
        serde_json::to_string_pretty(&result)?
    } else {
        serde_json::to_string(&result)?
    };
    println!("{output}");

    Ok(())
}

async fn run_refresh(
    engine: &QueryEngine,
    dataset: &str,
    manifest: &str,
    window_days: u32,
) -> Result<()> {
    let dataset = DatasetId::new(dataset)?;
    let manifest_url = Url::parse(manifest).with_context(|| format!("invalid manifest URL: {manifest}"))?;

    engine
        .register_dataset(dataset.clone(), manifest_url.clone())
        .await
        .context("refreshing manifest")?;

    let snapshot = engine.manifest(&dataset)?;
    let today = CalendarDate::from_timestamp(OffsetDateTime::now_utc());
    let resolution = resolve(
        &snapshot,
        today.minus_days(window_days),
        today.plus_days(1),
    )?;

    if resolution.is_empty() {
        println!("Nothing to warm: the recent window has no partitions.");
        return Ok(());
    }

    let bar = ProgressBar::new(resolution.partitions.len() as u64);
    bar.set_style(
        ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    // Warm through a fetcher sharing the engine's cache path: closed
    // partitions come from cache, the open partition is re-fetched.
    let fetcher = PartitionFetcher::new(engine.cache());
    let mut warmed = 0usize;
    let mut failed = 0usize;
    for partition in &resolution.partitions {
        bar.set_message(partition.id.to_string());
        let policy = if partition.end >= snapshot.end {
            CachePolicy::NetworkFirst
        } else {
            CachePolicy::CacheFirst
        };
        match fetcher.fetch(partition, &manifest_url, policy).await {
            Ok(batch) => {
                debug!(partition = %partition.id, records = batch.records.len(), "warmed");
                warmed += 1;
            }
            Err(failure) => {
                warn!(partition = %failure.partition, error = %failure.error, "warm failed");
                failed += 1;
            }
        }
        bar.inc(1);
    }
    bar.finish_and_clear();

    println!("Warmed {warmed} partition(s), {failed} failed.");
    Ok(())
}
