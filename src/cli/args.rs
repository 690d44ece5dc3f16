use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "reviewrag")]
#[command(about = "Retrieval over product reviews: ingest a corpus, then search or ask")]
#[command(version)]
pub struct Args {
    /// Path to the TOML config file (default: ./reviewrag.toml if present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level for reviewrag targets (overridden by RUST_LOG)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Chunk, embed and store reviews from a JSONL file
    Ingest {
        /// Merged review JSONL, one record per line
        path: PathBuf,

        /// Only ingest this many records (after shuffling, if enabled)
        #[arg(short, long)]
        limit: Option<usize>,

        /// Shuffle records before applying the limit
        #[arg(long)]
        shuffle: bool,

        /// Re-embed chunks even if their content is unchanged
        #[arg(short, long)]
        force: bool,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Retrieve ranked review passages for a query
    Search {
        query: String,

        /// Number of results (defaults to retrieval.top_k)
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Only reviews rated at least this
        #[arg(long)]
        min_rating: Option<f32>,

        /// Only reviews in this category (case-insensitive)
        #[arg(long)]
        category: Option<String>,

        /// Only verified purchases
        #[arg(long)]
        verified: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Answer a question from retrieved reviews using the configured LLM
    Ask {
        query: String,

        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Print the prompt instead of calling the LLM
        #[arg(long)]
        dry_run: bool,
    },

    /// Show index statistics
    Status,

    /// Remove the index
    Clear,
}
