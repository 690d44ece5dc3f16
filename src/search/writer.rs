//! Commits embedded chunks to the vector store one bounded batch at a time.

use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use super::retry::{RetryPolicy, Sleeper};
use super::store::{Chunk, EmbeddedChunk, VectorStore};
use crate::error::RagError;

/// Batch lifecycle:
/// `Pending -> Embedding -> WriteAttempted -> {Committed | Retrying -> WriteAttempted | Failed}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BatchState {
    Pending,
    Embedding,
    WriteAttempted,
    Retrying,
    Committed,
    Failed,
}

/// An ordered group of chunks owned by one commit attempt. Chunks are
/// embedded in place before the batch reaches the writer.
#[derive(Debug, Clone)]
pub struct IngestionBatch {
    pub index: usize,
    pub chunks: Vec<Chunk>,
    pub embedded: Vec<EmbeddedChunk>,
    pub state: BatchState,
    pub retries: u32,
}

impl IngestionBatch {
    pub fn new(index: usize, chunks: Vec<Chunk>) -> Self {
        Self {
            index,
            chunks,
            embedded: Vec::new(),
            state: BatchState::Pending,
            retries: 0,
        }
    }

    pub fn from_embedded(index: usize, embedded: Vec<EmbeddedChunk>) -> Self {
        Self {
            index,
            chunks: embedded.iter().map(|e| e.chunk.clone()).collect(),
            embedded,
            state: BatchState::Pending,
            retries: 0,
        }
    }

    pub fn ids(&self) -> Vec<String> {
        self.chunks.iter().map(|c| c.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub(crate) fn transition(&mut self, next: BatchState) {
        tracing::trace!(batch = self.index, from = ?self.state, to = ?next, "batch state");
        self.state = next;
    }
}

/// Outcome of one batch. Partial success is representable: some ids may be
/// inserted while others failed.
#[derive(Debug, Default)]
pub struct CommitResult {
    pub batch_index: usize,
    pub inserted_ids: Vec<String>,
    pub failed_ids: Vec<String>,
    pub attempts: u32,
    /// Last error seen, if the batch did not fully commit
    pub error: Option<RagError>,
}

impl CommitResult {
    pub fn is_complete(&self) -> bool {
        self.failed_ids.is_empty()
    }

    /// Whether the failure must abort the run rather than just be counted.
    pub fn is_fatal(&self) -> bool {
        self.error.as_ref().map_or(false, RagError::is_fatal)
    }

    pub(crate) fn failed(batch: &IngestionBatch, error: RagError) -> Self {
        Self {
            batch_index: batch.index,
            inserted_ids: Vec::new(),
            failed_ids: batch.ids(),
            attempts: 0,
            error: Some(error),
        }
    }
}

pub struct BatchWriter {
    store: Arc<dyn VectorStore>,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl BatchWriter {
    pub fn new(store: Arc<dyn VectorStore>, policy: RetryPolicy, sleeper: Arc<dyn Sleeper>) -> Self {
        Self {
            store,
            policy,
            sleeper,
        }
    }

    /// Write a batch, retrying transient store errors with backoff. Ids the
    /// store acknowledged are never re-sent; only the remainder is retried.
    /// Non-transient errors fail the batch immediately.
    pub async fn commit(&self, batch: &mut IngestionBatch) -> CommitResult {
        let mut result = CommitResult {
            batch_index: batch.index,
            ..Default::default()
        };
        let mut pending: Vec<EmbeddedChunk> = batch.embedded.clone();

        loop {
            batch.transition(BatchState::WriteAttempted);
            result.attempts += 1;

            let error = match self.store.upsert(&pending).await {
                Ok(ack) => {
                    result.inserted_ids.extend(ack.written.iter().cloned());
                    pending.retain(|item| !ack.written.iter().any(|id| id == item.id()));
                    if pending.is_empty() {
                        batch.transition(BatchState::Committed);
                        result.error = None;
                        info!(
                            batch = batch.index,
                            inserted = result.inserted_ids.len(),
                            attempts = result.attempts,
                            "batch committed"
                        );
                        return result;
                    }
                    RagError::Transient(format!(
                        "store acknowledged {} of {} items",
                        ack.written.len(),
                        ack.written.len() + pending.len()
                    ))
                }
                Err(err) => err,
            };

            if !error.is_transient() {
                warn!(batch = batch.index, error = %error, "non-transient store error, failing batch");
                return self.fail(batch, result, pending, error);
            }
            if batch.retries >= self.policy.max_retries {
                warn!(
                    batch = batch.index,
                    attempts = result.attempts,
                    error = %error,
                    "retry budget exhausted, failing batch"
                );
                let exhausted = RagError::Exhausted {
                    operation: format!("commit batch {}", batch.index),
                    attempts: result.attempts,
                    last: error.to_string(),
                };
                return self.fail(batch, result, pending, exhausted);
            }

            batch.transition(BatchState::Retrying);
            batch.retries += 1;
            let delay = self.policy.delay_for(batch.retries);
            warn!(
                batch = batch.index,
                retry = batch.retries,
                max_retries = self.policy.max_retries,
                delay_secs = delay.as_secs_f64(),
                error = %error,
                "batch write failed, retrying"
            );
            // No lock is held here; the store releases its own on return
            self.sleeper.sleep(delay).await;
        }
    }

    fn fail(
        &self,
        batch: &mut IngestionBatch,
        mut result: CommitResult,
        pending: Vec<EmbeddedChunk>,
        error: RagError,
    ) -> CommitResult {
        batch.transition(BatchState::Failed);
        result.failed_ids = pending.iter().map(|item| item.chunk.id.clone()).collect();
        result.error = Some(error);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::search::retry::RecordingSleeper;
    use crate::search::store::{
        ChunkMetadata, IndexStats, StoreMatch, StoreQuery, UpsertAck,
    };
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    enum Script {
        Transient,
        Permanent,
        /// Acknowledge only the first n items
        Partial(usize),
    }

    #[derive(Default)]
    struct ScriptedStore {
        script: Mutex<Vec<Script>>,
        calls: Mutex<Vec<usize>>,
    }

    impl ScriptedStore {
        fn new(script: Vec<Script>) -> Self {
            Self {
                script: Mutex::new(script),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<usize> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl VectorStore for ScriptedStore {
        async fn upsert(&self, items: &[EmbeddedChunk]) -> Result<UpsertAck> {
            self.calls.lock().unwrap().push(items.len());
            let next = {
                let mut script = self.script.lock().unwrap();
                if script.is_empty() {
                    None
                } else {
                    Some(script.remove(0))
                }
            };
            let written = |n: usize| UpsertAck {
                written: items.iter().take(n).map(|i| i.chunk.id.clone()).collect(),
            };
            match next {
                Some(Script::Transient) => Err(RagError::Transient("throttled".into())),
                Some(Script::Permanent) => Err(RagError::Permanent("schema mismatch".into())),
                Some(Script::Partial(n)) => Ok(written(n)),
                None => Ok(written(items.len())),
            }
        }

        async fn query(&self, _query: &StoreQuery) -> Result<Vec<StoreMatch>> {
            Ok(Vec::new())
        }

        async fn content_hashes(&self, _ids: &[String]) -> Result<HashMap<String, String>> {
            Ok(HashMap::new())
        }

        async fn prune_record(&self, _record_id: &str, _keep_chunks: usize) -> Result<usize> {
            Ok(0)
        }

        async fn persist(&self) -> Result<()> {
            Ok(())
        }

        async fn load(&self) -> Result<()> {
            Ok(())
        }

        async fn stats(&self) -> Result<IndexStats> {
            Ok(IndexStats::default())
        }

        async fn clear(&self) -> Result<()> {
            Ok(())
        }
    }

    fn batch(n: usize) -> IngestionBatch {
        let embedded = (0..n)
            .map(|i| EmbeddedChunk {
                chunk: Chunk {
                    id: format!("rec{}:0", i),
                    record_id: format!("rec{}", i),
                    index: 0,
                    text: format!("review {}", i),
                    start_char: 0,
                    end_char: 8,
                    hash: "abc123".to_string(),
                },
                vector: vec![1.0, 0.0],
                metadata: ChunkMetadata::default(),
                updated_at: Utc::now(),
            })
            .collect();
        IngestionBatch::from_embedded(0, embedded)
    }

    fn writer(store: Arc<ScriptedStore>, max_retries: u32, sleeper: Arc<RecordingSleeper>) -> BatchWriter {
        BatchWriter::new(
            store,
            RetryPolicy {
                max_retries,
                initial_delay: Duration::from_secs(1),
                multiplier: 2.0,
                max_delay: Duration::from_secs(30),
            },
            sleeper,
        )
    }

    #[tokio::test]
    async fn test_commits_after_transient_failures() {
        let store = Arc::new(ScriptedStore::new(vec![
            Script::Transient,
            Script::Transient,
            Script::Transient,
        ]));
        let sleeper = Arc::new(RecordingSleeper::default());
        let mut b = batch(3);

        let result = writer(store.clone(), 5, sleeper.clone()).commit(&mut b).await;

        assert!(result.is_complete());
        assert_eq!(result.inserted_ids.len(), 3);
        assert_eq!(result.attempts, 4);
        assert_eq!(b.state, BatchState::Committed);
        assert_eq!(b.retries, 3);
        assert_eq!(
            sleeper.delays(),
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4)
            ]
        );
    }

    #[tokio::test]
    async fn test_permanent_error_makes_exactly_one_attempt() {
        let store = Arc::new(ScriptedStore::new(vec![Script::Permanent]));
        let sleeper = Arc::new(RecordingSleeper::default());
        let mut b = batch(2);

        let result = writer(store.clone(), 5, sleeper.clone()).commit(&mut b).await;

        assert_eq!(store.calls().len(), 1);
        assert_eq!(result.attempts, 1);
        assert_eq!(result.failed_ids.len(), 2);
        assert!(result.is_fatal());
        assert_eq!(b.state, BatchState::Failed);
        assert_eq!(b.retries, 0);
        assert!(sleeper.delays().is_empty());
    }

    #[tokio::test]
    async fn test_exhausted_budget_fails_batch() {
        let store = Arc::new(ScriptedStore::new(
            (0..10).map(|_| Script::Transient).collect(),
        ));
        let sleeper = Arc::new(RecordingSleeper::default());
        let mut b = batch(2);

        let result = writer(store.clone(), 2, sleeper).commit(&mut b).await;

        assert_eq!(store.calls().len(), 3);
        assert_eq!(result.failed_ids.len(), 2);
        assert!(!result.is_fatal());
        assert!(matches!(result.error, Some(RagError::Exhausted { attempts: 3, .. })));
        assert_eq!(b.state, BatchState::Failed);
    }

    #[tokio::test]
    async fn test_partial_write_retries_only_the_remainder() {
        let store = Arc::new(ScriptedStore::new(vec![Script::Partial(2)]));
        let sleeper = Arc::new(RecordingSleeper::default());
        let mut b = batch(5);

        let result = writer(store.clone(), 3, sleeper).commit(&mut b).await;

        assert!(result.is_complete());
        assert_eq!(store.calls(), vec![5, 3]);
        assert_eq!(result.inserted_ids.len(), 5);
    }

    #[tokio::test]
    async fn test_partial_success_is_reported() {
        let store = Arc::new(ScriptedStore::new(vec![Script::Partial(1), Script::Permanent]));
        let sleeper = Arc::new(RecordingSleeper::default());
        let mut b = batch(3);

        let result = writer(store, 3, sleeper).commit(&mut b).await;

        assert_eq!(result.inserted_ids, vec!["rec0:0".to_string()]);
        assert_eq!(
            result.failed_ids,
            vec!["rec1:0".to_string(), "rec2:0".to_string()]
        );
        assert_eq!(b.state, BatchState::Failed);
    }
}
