use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::embedder::{Embedder, EmbeddingClient};
use super::hybrid::HybridRetriever;
use super::mmr;
use super::rerank::Reranker;
use super::retry::{RetryPolicy, Sleeper};
use super::store::{MetadataFilter, RankedResult, VectorStore};
use crate::config::{Config, RetrievalConfig, MAX_TIMEOUT_SECS};
use crate::error::{RagError, Result};

/// Shared budget for one query. Each stage gets the smaller of the stage
/// limit and whatever is left of the request.
#[derive(Debug, Clone, Copy)]
struct Deadline {
    expires: Instant,
    stage_limit: Duration,
}

impl Deadline {
    fn start(request: Duration, stage_limit: Duration) -> Self {
        let now = Instant::now();
        let request = request.min(Duration::from_secs(MAX_TIMEOUT_SECS));
        Self {
            expires: now.checked_add(request).unwrap_or(now),
            stage_limit,
        }
    }

    async fn bound<T, F>(&self, stage: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let remaining = self.expires.saturating_duration_since(Instant::now());
        let limit = remaining.min(self.stage_limit);
        match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(stage, limit_ms = limit.as_millis() as u64, "query stage timed out");
                Err(RagError::DeadlineExceeded { stage })
            }
        }
    }
}

/// Query -> embed -> hybrid retrieve -> MMR -> rerank.
pub struct QueryPipeline {
    embedder: EmbeddingClient,
    retriever: HybridRetriever,
    reranker: Arc<dyn Reranker>,
    retrieval: RetrievalConfig,
    request_timeout: Duration,
    stage_timeout: Duration,
}

impl QueryPipeline {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        reranker: Arc<dyn Reranker>,
        config: &Config,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        let retrieval = config.retrieval.clone();
        Self {
            embedder: EmbeddingClient::new(
                embedder,
                RetryPolicy::from_config(&config.ingestion),
                sleeper,
            ),
            retriever: HybridRetriever::new(store, retrieval.fusion_weight),
            reranker,
            request_timeout: retrieval.request_timeout(),
            stage_timeout: retrieval.stage_timeout(),
            retrieval,
        }
    }

    pub fn with_timeouts(mut self, request: Duration, stage: Duration) -> Self {
        self.request_timeout = request;
        self.stage_timeout = stage;
        self
    }

    /// Ranked context for `query`, at most `top_k` long (configured default
    /// when `None`). Failures are returned as errors, never as an empty set.
    pub async fn run(
        &self,
        query: &str,
        top_k: Option<usize>,
        filter: Option<MetadataFilter>,
    ) -> Result<Vec<RankedResult>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(RagError::Malformed("query is empty".to_string()));
        }

        let top_k = top_k.unwrap_or(self.retrieval.top_k);
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let k_candidates = self.retrieval.candidates_for(top_k);
        let deadline = Deadline::start(self.request_timeout, self.stage_timeout);

        let query_vector = deadline.bound("embed", self.embedder.embed(query)).await?;

        let candidates = deadline
            .bound(
                "retrieve",
                self.retriever.search(&query_vector, query, k_candidates, filter),
            )
            .await?;
        debug!(candidates = candidates.len(), k_candidates, "hybrid retrieval done");

        let diversified = mmr::select(candidates, top_k, self.retrieval.mmr_lambda);

        let mut ranked = self.reranker.rerank(diversified, query);
        ranked.truncate(top_k);

        info!(
            query,
            results = ranked.len(),
            top_k,
            reranker = self.reranker.name(),
            "query complete"
        );
        Ok(ranked)
    }
}
