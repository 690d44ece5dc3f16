use anyhow::{Context, Result};
use clap::Parser;

use reviewrag::cli::{self, Args, Command, IngestOptions, SearchOptions};
use reviewrag::logging::init_logging;
use reviewrag::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load(args.config.as_deref()).context("failed to load configuration")?;
    let level = args.log_level.as_deref().unwrap_or(&config.logging.level);
    init_logging(level);

    match args.command {
        Command::Ingest {
            path,
            limit,
            shuffle,
            force,
            json,
        } => {
            cli::run_ingest(
                &config,
                IngestOptions {
                    path,
                    limit,
                    shuffle,
                    force,
                    json,
                },
            )
            .await
        }
        Command::Search {
            query,
            top_k,
            min_rating,
            category,
            verified,
            json,
        } => {
            cli::run_search(
                &config,
                &query,
                SearchOptions {
                    top_k,
                    min_rating,
                    category,
                    verified,
                    json,
                },
            )
            .await
        }
        Command::Ask {
            query,
            top_k,
            dry_run,
        } => cli::run_ask(&config, &query, top_k, dry_run).await,
        Command::Status => cli::run_status(&config).await,
        Command::Clear => cli::run_clear(&config).await,
    }
}
