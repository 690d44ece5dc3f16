use std::sync::Arc;
use tracing::debug;

use super::Embedder;
use crate::error::{RagError, Result};
use crate::search::retry::{RetryPolicy, Sleeper};

/// Batching + retry wrapper around a provider.
///
/// Requests are split into provider-sized sub-batches; each sub-batch is
/// retried as a whole on transient failure. Responses are checked for
/// count and dimensionality so a misconfigured model fails fast.
#[derive(Clone)]
pub struct EmbeddingClient {
    embedder: Arc<dyn Embedder>,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl EmbeddingClient {
    pub fn new(embedder: Arc<dyn Embedder>, policy: RetryPolicy, sleeper: Arc<dyn Sleeper>) -> Self {
        Self {
            embedder,
            policy,
            sleeper,
        }
    }

    pub fn dimensions(&self) -> usize {
        self.embedder.dimensions()
    }

    pub async fn health_check(&self) -> Result<()> {
        self.embedder.health_check().await
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| RagError::Permanent("No embedding returned".to_string()))
    }

    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let batch_size = self.embedder.max_batch_size().max(1);
        let mut vectors = Vec::with_capacity(texts.len());

        for (i, sub_batch) in texts.chunks(batch_size).enumerate() {
            debug!(sub_batch = i, size = sub_batch.len(), "embedding sub-batch");
            let embedded = self
                .policy
                .run(self.sleeper.as_ref(), "embed", |_| {
                    self.embedder.embed_batch(sub_batch)
                })
                .await?;
            self.check_shape(sub_batch.len(), &embedded)?;
            vectors.extend(embedded);
        }

        Ok(vectors)
    }

    fn check_shape(&self, expected: usize, vectors: &[Vec<f32>]) -> Result<()> {
        if vectors.len() != expected {
            return Err(RagError::Permanent(format!(
                "provider returned {} embeddings for {} inputs",
                vectors.len(),
                expected
            )));
        }
        let dims = self.embedder.dimensions();
        if let Some(bad) = vectors.iter().find(|v| v.len() != dims) {
            return Err(RagError::Permanent(format!(
                "embedding has {} dimensions, expected {}",
                bad.len(),
                dims
            )));
        }
        Ok(())
    }
}
