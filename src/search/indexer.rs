use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{RagError, Result};
use crate::types::ReviewRecord;

use super::chunker::Chunker;
use super::embedder::{Embedder, EmbeddingClient};
use super::retry::{RetryPolicy, Sleeper};
use super::store::{Chunk, ChunkMetadata, EmbeddedChunk, VectorStore};
use super::writer::{BatchState, BatchWriter, CommitResult, IngestionBatch};

/// Called once per finished batch, in completion order.
pub type BatchObserver = Arc<dyn Fn(&CommitResult) + Send + Sync>;

/// Cumulative accounting for one ingestion run. A run with failed batches
/// still produces a summary; only permanent errors abort it.
#[derive(Debug, Default, Clone, Serialize)]
pub struct IngestionSummary {
    pub records_seen: usize,
    pub records_skipped: usize,
    pub duplicate_records: usize,
    pub chunks_total: usize,
    pub unchanged: usize,
    pub attempted: usize,
    pub inserted: usize,
    pub failed: usize,
    /// Stale trailing chunks removed because a record now chunks shorter
    pub pruned: usize,
    pub batches_committed: usize,
    pub batches_failed: usize,
    pub failed_ids: Vec<String>,
    pub errors: Vec<String>,
}

impl IngestionSummary {
    fn record(&mut self, result: &CommitResult) {
        self.inserted += result.inserted_ids.len();
        self.failed += result.failed_ids.len();
        self.failed_ids.extend(result.failed_ids.iter().cloned());
        if result.is_complete() {
            self.batches_committed += 1;
        } else {
            self.batches_failed += 1;
        }
        if let Some(err) = &result.error {
            self.errors.push(format!("batch {}: {}", result.batch_index, err));
        }
    }
}

struct Prepared {
    chunks: Vec<Chunk>,
    metadata: HashMap<String, ChunkMetadata>,
    chunk_counts: HashMap<String, usize>,
}

/// Chunk -> embed -> write over a whole corpus.
pub struct Indexer {
    store: Arc<dyn VectorStore>,
    embedder: EmbeddingClient,
    writer: BatchWriter,
    chunker: Chunker,
    batch_size: usize,
    concurrency: usize,
    observer: Option<BatchObserver>,
}

impl Indexer {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        config: &Config,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        let policy = RetryPolicy::from_config(&config.ingestion);
        Self {
            embedder: EmbeddingClient::new(embedder, policy, Arc::clone(&sleeper)),
            writer: BatchWriter::new(Arc::clone(&store), policy, sleeper),
            store,
            chunker: Chunker::from_config(&config.chunking),
            batch_size: config.ingestion.batch_size.max(1),
            concurrency: config.ingestion.concurrency.max(1),
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: BatchObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Ingest `records`. Chunks already stored with the same content hash
    /// are skipped unless `force` is set; writes are upserts by chunk id.
    pub async fn ingest(&self, records: Vec<ReviewRecord>, force: bool) -> Result<IngestionSummary> {
        let mut summary = IngestionSummary {
            records_seen: records.len(),
            ..Default::default()
        };

        self.store.load().await?;

        let Prepared {
            chunks,
            metadata,
            chunk_counts,
        } = self.prepare(&records, &mut summary);
        summary.chunks_total = chunks.len();

        let chunks = if force {
            chunks
        } else {
            self.skip_unchanged(chunks, &mut summary).await?
        };
        summary.attempted = chunks.len();

        let batches = self.partition(chunks);
        info!(
            records = summary.records_seen,
            chunks = summary.chunks_total,
            unchanged = summary.unchanged,
            batches = batches.len(),
            batch_size = self.batch_size,
            concurrency = self.concurrency,
            "starting ingestion"
        );

        let mut fatal: Option<RagError> = None;
        {
            let mut results = stream::iter(batches)
                .map(|batch| self.process_batch(batch, &metadata))
                .buffer_unordered(self.concurrency);

            while let Some(mut result) = results.next().await {
                summary.record(&result);
                if let Some(observer) = &self.observer {
                    observer(&result);
                }
                if result.is_fatal() {
                    error!(
                        batch = result.batch_index,
                        "permanent failure, aborting ingestion"
                    );
                    fatal = result.error.take();
                    break;
                }
                info!(
                    inserted = summary.inserted,
                    failed = summary.failed,
                    total = summary.attempted,
                    "ingestion progress"
                );
            }
        }

        if fatal.is_none() {
            self.prune_stale(&chunk_counts, &mut summary).await?;
        }

        // Whatever committed stays committed, even on abort
        self.store.persist().await?;

        if let Some(err) = fatal {
            return Err(err);
        }

        info!(
            inserted = summary.inserted,
            failed = summary.failed,
            unchanged = summary.unchanged,
            skipped = summary.records_skipped,
            "ingestion finished"
        );
        Ok(summary)
    }

    /// Chunk every record, skipping malformed ones and duplicate record ids.
    fn prepare(&self, records: &[ReviewRecord], summary: &mut IngestionSummary) -> Prepared {
        let mut chunks = Vec::new();
        let mut metadata = HashMap::new();
        let mut chunk_counts = HashMap::new();
        let mut seen = HashSet::new();

        for record in records {
            let record_chunks = match self.chunker.chunk(record) {
                Ok(c) => c,
                Err(e) => {
                    summary.records_skipped += 1;
                    warn!(error = %e, "skipping malformed record");
                    continue;
                }
            };

            let record_id = record.record_id();
            if !seen.insert(record_id.clone()) {
                summary.duplicate_records += 1;
                warn!(record_id = %record_id, "duplicate record, keeping first occurrence");
                continue;
            }

            chunk_counts.insert(record_id.clone(), record_chunks.len());
            metadata.insert(record_id, metadata_for(record));
            chunks.extend(record_chunks);
        }

        Prepared {
            chunks,
            metadata,
            chunk_counts,
        }
    }

    /// Drop stored chunks past the new end of each fully written record.
    /// Records with a failed chunk keep their old tail until a later run.
    async fn prune_stale(
        &self,
        chunk_counts: &HashMap<String, usize>,
        summary: &mut IngestionSummary,
    ) -> Result<()> {
        let failed: HashSet<&str> = summary
            .failed_ids
            .iter()
            .filter_map(|id| id.rsplit_once(':').map(|(record_id, _)| record_id))
            .collect();

        let mut pruned = 0;
        for (record_id, &count) in chunk_counts {
            if failed.contains(record_id.as_str()) {
                continue;
            }
            pruned += self.store.prune_record(record_id, count).await?;
        }

        if pruned > 0 {
            info!(pruned, "removed stale chunks");
        }
        summary.pruned = pruned;
        Ok(())
    }

    async fn skip_unchanged(
        &self,
        chunks: Vec<Chunk>,
        summary: &mut IngestionSummary,
    ) -> Result<Vec<Chunk>> {
        let ids: Vec<String> = chunks.iter().map(|c| c.id.clone()).collect();
        let existing = self.store.content_hashes(&ids).await?;

        let before = chunks.len();
        let remaining: Vec<Chunk> = chunks
            .into_iter()
            .filter(|c| existing.get(&c.id) != Some(&c.hash))
            .collect();
        summary.unchanged = before - remaining.len();
        Ok(remaining)
    }

    /// Disjoint, ordered batches so no two in-flight writes share an id.
    fn partition(&self, chunks: Vec<Chunk>) -> Vec<IngestionBatch> {
        let mut batches = Vec::new();
        let mut current = Vec::with_capacity(self.batch_size);
        for chunk in chunks {
            current.push(chunk);
            if current.len() == self.batch_size {
                let full = std::mem::replace(&mut current, Vec::with_capacity(self.batch_size));
                batches.push(IngestionBatch::new(batches.len(), full));
            }
        }
        if !current.is_empty() {
            batches.push(IngestionBatch::new(batches.len(), current));
        }
        batches
    }

    async fn process_batch(
        &self,
        mut batch: IngestionBatch,
        metadata: &HashMap<String, ChunkMetadata>,
    ) -> CommitResult {
        batch.transition(BatchState::Embedding);
        let texts: Vec<String> = batch.chunks.iter().map(|c| c.text.clone()).collect();

        let vectors = match self.embedder.embed_batch(&texts).await {
            Ok(vectors) => vectors,
            Err(e) => {
                warn!(batch = batch.index, error = %e, "embedding failed for batch");
                batch.transition(BatchState::Failed);
                return CommitResult::failed(&batch, e);
            }
        };

        let now = Utc::now();
        batch.embedded = batch
            .chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| EmbeddedChunk {
                chunk: chunk.clone(),
                vector,
                metadata: metadata.get(&chunk.record_id).cloned().unwrap_or_default(),
                updated_at: now,
            })
            .collect();

        self.writer.commit(&mut batch).await
    }
}

fn metadata_for(record: &ReviewRecord) -> ChunkMetadata {
    ChunkMetadata {
        product_id: record.product_id.clone().unwrap_or_default(),
        product_name: record.product_name.clone(),
        category: record.category.clone(),
        store: record.store.clone(),
        price: record.price(),
        rating: record.rating,
        avg_rating: record.avg_rating,
        rating_count: record.rating_count,
        verified_purchase: record.verified_purchase,
        helpful_vote: record.helpful_vote,
        user_id: record.user_id.clone(),
        timestamp: record.timestamp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::embedder::HashingEmbedder;
    use crate::search::retry::RecordingSleeper;
    use crate::search::store::JsonStore;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn config(batch_size: usize) -> Config {
        let mut config = Config::default();
        config.ingestion.batch_size = batch_size;
        config.ingestion.concurrency = 2;
        config.chunking.chunk_size = 200;
        config.chunking.chunk_overlap = 20;
        config
    }

    fn record(product: &str, user: &str, text: &str) -> ReviewRecord {
        ReviewRecord {
            product_id: Some(product.to_string()),
            product_name: format!("Product {}", product),
            user_id: user.to_string(),
            text: text.to_string(),
            rating: 4.0,
            timestamp: 10,
            ..Default::default()
        }
    }

    fn indexer(store: Arc<JsonStore>, batch_size: usize) -> Indexer {
        Indexer::new(
            store,
            Arc::new(HashingEmbedder::new(32, 4)),
            &config(batch_size),
            Arc::new(RecordingSleeper::default()),
        )
    }

    #[test]
    fn test_partition_is_disjoint_and_bounded() {
        let store = Arc::new(JsonStore::new(PathBuf::from("/tmp/unused-index.json")));
        let indexer = indexer(store, 3);
        let chunks = indexer.chunker.chunk_text("rec", &"word ".repeat(400));
        let total = chunks.len();

        let batches = indexer.partition(chunks);
        assert!(batches.iter().all(|b| b.len() <= 3 && !b.is_empty()));
        assert_eq!(batches.iter().map(|b| b.len()).sum::<usize>(), total);

        let ids: HashSet<String> = batches.iter().flat_map(|b| b.ids()).collect();
        assert_eq!(ids.len(), total);
    }

    #[tokio::test]
    async fn test_ingest_counts_and_skips_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JsonStore::new(dir.path().join("index.json")));
        let observed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&observed);
        let indexer = indexer(Arc::clone(&store), 2).with_observer(Arc::new(move |_: &CommitResult| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let records = vec![
            record("A", "u1", "Battery lasts two days."),
            record("B", "u2", "Screen is bright."),
            record("C", "u3", "   "),
            record("A", "u1", "Battery lasts two days."),
        ];
        let summary = indexer.ingest(records, false).await.unwrap();

        assert_eq!(summary.records_seen, 4);
        assert_eq!(summary.records_skipped, 1);
        assert_eq!(summary.duplicate_records, 1);
        assert_eq!(summary.chunks_total, 2);
        assert_eq!(summary.inserted, 2);
        assert_eq!(summary.failed, 0);
        assert_eq!(observed.load(Ordering::SeqCst), 1);
        assert!(dir.path().join("index.json").exists());
    }

    #[tokio::test]
    async fn test_reingest_skips_unchanged_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JsonStore::new(dir.path().join("index.json")));
        let indexer = indexer(Arc::clone(&store), 10);
        let records = vec![
            record("A", "u1", "Battery lasts two days."),
            record("B", "u2", "Screen is bright."),
        ];

        indexer.ingest(records.clone(), false).await.unwrap();
        let second = indexer.ingest(records.clone(), false).await.unwrap();
        assert_eq!(second.unchanged, 2);
        assert_eq!(second.attempted, 0);

        let forced = indexer.ingest(records, true).await.unwrap();
        assert_eq!(forced.inserted, 2);
        assert_eq!(store.stats().await.unwrap().total_chunks, 2);
    }

    #[tokio::test]
    async fn test_same_author_and_time_with_different_text_are_both_kept() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JsonStore::new(dir.path().join("index.json")));
        let records = vec![
            record("A", "u1", "Battery lasts two days."),
            record("A", "u1", "Charger stopped working."),
        ];

        let summary = indexer(Arc::clone(&store), 10)
            .ingest(records, false)
            .await
            .unwrap();

        assert_eq!(summary.duplicate_records, 0);
        assert_eq!(summary.inserted, 2);
        assert_eq!(store.stats().await.unwrap().total_records, 2);
    }

    #[tokio::test]
    async fn test_rechunking_shorter_removes_stale_tail() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JsonStore::new(dir.path().join("index.json")));
        let records = vec![
            record("A", "u1", &"battery lasts ".repeat(40)),
            record("B", "u2", "Screen is bright."),
        ];

        let first = indexer(Arc::clone(&store), 10)
            .ingest(records.clone(), false)
            .await
            .unwrap();
        assert!(first.chunks_total > 2);
        assert_eq!(first.pruned, 0);

        let mut wide = config(10);
        wide.chunking.chunk_size = 1000;
        let rechunked = Indexer::new(
            Arc::clone(&store) as Arc<dyn VectorStore>,
            Arc::new(HashingEmbedder::new(32, 4)),
            &wide,
            Arc::new(RecordingSleeper::default()),
        )
        .ingest(records, false)
        .await
        .unwrap();

        assert_eq!(rechunked.chunks_total, 2);
        assert_eq!(rechunked.pruned, first.chunks_total - 2);
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_chunks, 2);
        assert_eq!(stats.total_records, 2);
    }
}
