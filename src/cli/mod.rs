mod args;
mod ask;
mod index;
mod search;

pub use args::{Args, Command};
pub use ask::run_ask;
pub use index::{run_clear, run_ingest, run_status, IngestOptions};
pub use search::{run_search, SearchOptions};

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::config::Config;
use crate::search::{
    create_embedder, create_reranker, default_sleeper, Embedder, JsonStore, QueryPipeline, Reranker,
    VectorStore,
};

fn open_store(config: &Config) -> Arc<dyn VectorStore> {
    Arc::new(JsonStore::new(config.store.path.clone()))
}

fn build_embedder(config: &Config) -> Result<Arc<dyn Embedder>> {
    let embedder =
        create_embedder(&config.embedding).context("failed to set up embedding provider")?;
    Ok(Arc::from(embedder))
}

/// Loads the index and wires the query pipeline from config.
async fn build_pipeline(config: &Config) -> Result<QueryPipeline> {
    if !config.store.path.exists() {
        anyhow::bail!(
            "No index found at {}. Run `reviewrag ingest <file>` first.",
            config.store.path.display()
        );
    }

    let store = open_store(config);
    store.load().await.context("failed to load index")?;

    let reranker: Arc<dyn Reranker> = Arc::from(create_reranker(&config.retrieval)?);
    Ok(QueryPipeline::new(
        store,
        build_embedder(config)?,
        reranker,
        config,
        default_sleeper(),
    ))
}
