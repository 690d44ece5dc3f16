use anyhow::{Context, Result};
use console::{style, Emoji};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;

use super::{build_embedder, open_store};
use crate::config::Config;
use crate::search::{
    default_sleeper, load_jsonl, sample, BatchObserver, CommitResult, Indexer, IngestionSummary,
};

static INDEXING: Emoji<'_, '_> = Emoji("📊 ", "");
static SUCCESS: Emoji<'_, '_> = Emoji("✅ ", "");
static WARNING: Emoji<'_, '_> = Emoji("⚠️  ", "");
static ERROR: Emoji<'_, '_> = Emoji("❌ ", "");
static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "");

pub struct IngestOptions {
    pub path: PathBuf,
    pub limit: Option<usize>,
    pub shuffle: bool,
    pub force: bool,
    pub json: bool,
}

pub async fn run_ingest(config: &Config, options: IngestOptions) -> Result<()> {
    let corpus = load_jsonl(&options.path)
        .with_context(|| format!("failed to read {}", options.path.display()))?;
    let records = sample(
        corpus.records,
        options.limit.or(config.ingestion.limit),
        options.shuffle || config.ingestion.shuffle,
        config.ingestion.shuffle_seed,
    );

    let embedder = build_embedder(config)?;
    if !options.json {
        println!("{}Checking embedding provider...", INFO);
    }
    embedder
        .health_check()
        .await
        .context("embedding provider is not ready")?;

    let pb = if options.json {
        ProgressBar::hidden()
    } else {
        ProgressBar::new_spinner()
    };
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    pb.set_message(format!("{}Ingesting {} records...", INDEXING, records.len()));
    pb.enable_steady_tick(std::time::Duration::from_millis(100));

    let progress = pb.clone();
    let observer: BatchObserver = Arc::new(move |result: &CommitResult| {
        progress.inc(1);
        progress.set_message(format!(
            "{}Batch {} done ({} written, {} failed)",
            INDEXING,
            result.batch_index,
            result.inserted_ids.len(),
            result.failed_ids.len()
        ));
    });

    let store = open_store(config);
    let indexer = Indexer::new(Arc::clone(&store), embedder, config, default_sleeper())
        .with_observer(observer);
    let outcome = indexer.ingest(records, options.force).await;
    pb.finish_and_clear();
    let summary = outcome.context("ingestion aborted")?;

    if options.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    print_summary(&summary, corpus.malformed_lines);

    let stats = store.stats().await?;
    println!("\n{}Index Statistics:", INFO);
    println!("  Total reviews:   {}", stats.total_records);
    println!("  Total chunks:    {}", stats.total_chunks);
    println!("  Index size:      {} KB", stats.index_size_bytes / 1024);

    Ok(())
}

fn print_summary(summary: &IngestionSummary, malformed_lines: usize) {
    if summary.failed == 0 {
        println!("\n{}Ingestion complete!\n", SUCCESS);
    } else {
        println!("\n{}Ingestion finished with failures\n", WARNING);
    }

    println!("  Records read:    {}", style(summary.records_seen).green());
    println!("  Chunks total:    {}", style(summary.chunks_total).cyan());
    println!("  Inserted:        {}", style(summary.inserted).green());
    println!("  Unchanged:       {}", style(summary.unchanged).dim());
    if summary.pruned > 0 {
        println!("  Pruned:          {}", style(summary.pruned).dim());
    }
    if summary.failed > 0 {
        println!("  Failed:          {}", style(summary.failed).red());
    }
    let skipped = summary.records_skipped + malformed_lines;
    if skipped > 0 {
        println!("  Skipped:         {} (malformed)", style(skipped).yellow());
    }
    if summary.duplicate_records > 0 {
        println!("  Duplicates:      {}", style(summary.duplicate_records).yellow());
    }

    if !summary.errors.is_empty() {
        println!("\n{}Errors ({}):", ERROR, summary.errors.len());
        for error in summary.errors.iter().take(10) {
            println!("  - {}", style(error).red());
        }
        if summary.errors.len() > 10 {
            println!("  ... and {} more", summary.errors.len() - 10);
        }
    }
}

pub async fn run_status(config: &Config) -> Result<()> {
    let store_path = &config.store.path;

    if !store_path.exists() {
        println!("{}No index found at {}", INFO, store_path.display());
        println!("Run `reviewrag ingest <file>` to build the index.");
        return Ok(());
    }

    let store = open_store(config);
    store.load().await?;

    let stats = store.stats().await?;

    println!("\n{}Index Status: {}\n", INFO, store_path.display());
    println!("  Total reviews:   {}", style(stats.total_records).green());
    println!("  Total chunks:    {}", style(stats.total_chunks).cyan());
    if let Some(dimensions) = stats.dimensions {
        println!("  Dimensions:      {}", dimensions);
    }
    println!(
        "  Index size:      {} KB",
        style(stats.index_size_bytes / 1024).yellow()
    );
    if let Some(updated) = stats.last_updated {
        println!(
            "  Last updated:    {}",
            style(updated.format("%Y-%m-%d %H:%M:%S")).dim()
        );
    }

    Ok(())
}

pub async fn run_clear(config: &Config) -> Result<()> {
    if !config.store.path.exists() {
        println!("{}No index found.", INFO);
        return Ok(());
    }

    let store = open_store(config);
    store.load().await?;
    store.clear().await?;

    println!("{}Index cleared successfully.", SUCCESS);

    Ok(())
}
