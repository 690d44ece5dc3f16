use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use reviewrag::search::rerank::HeuristicReranker;
use reviewrag::search::{
    Embedder, HashingEmbedder, Indexer, JsonStore, QueryPipeline, RecordingSleeper, VectorStore,
};
use reviewrag::{Config, RagError, ReviewRecord, Result};

const DIMS: usize = 64;

fn config() -> Config {
    let mut config = Config::default();
    config.embedding.provider = "hashing".to_string();
    config.embedding.dimensions = DIMS;
    config.ingestion.batch_size = 2;
    config.ingestion.max_retries = 3;
    config.retrieval.top_k = 2;
    config
}

fn review(product: &str, name: &str, user: &str, text: &str, rating: f32) -> ReviewRecord {
    ReviewRecord {
        product_id: Some(product.to_string()),
        product_name: name.to_string(),
        user_id: user.to_string(),
        text: text.to_string(),
        rating,
        category: "Electronics".to_string(),
        timestamp: 1_700_000_000,
        ..Default::default()
    }
}

fn corpus() -> Vec<ReviewRecord> {
    vec![
        review(
            "B01SPEAKER",
            "Trail Speaker",
            "U1",
            "The battery life is fantastic, easily two days of music.",
            5.0,
        ),
        review(
            "B02HEADSET",
            "Studio Headset",
            "U2",
            "Comfortable ear cups and a clear microphone.",
            4.0,
        ),
        review(
            "B02HEADSET",
            "Studio Headset",
            "U3",
            "The cable frayed after a month of use.",
            2.0,
        ),
    ]
}

fn store_in(dir: &tempfile::TempDir) -> Arc<dyn VectorStore> {
    Arc::new(JsonStore::new(dir.path().join("index.json")))
}

#[tokio::test]
async fn ingest_then_query_returns_top_k_with_battery_review_first() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);
    let config = config();
    let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(DIMS, 8));

    let indexer = Indexer::new(
        Arc::clone(&store),
        Arc::clone(&embedder),
        &config,
        Arc::new(RecordingSleeper::default()),
    );
    let summary = indexer.ingest(corpus(), false).await.unwrap();
    assert_eq!(summary.chunks_total, 3);
    assert_eq!(summary.inserted, 3);
    assert_eq!(summary.failed, 0);

    let pipeline = QueryPipeline::new(
        store,
        embedder,
        Arc::new(HeuristicReranker::default()),
        &config,
        Arc::new(RecordingSleeper::default()),
    );
    let results = pipeline.run("battery life", None, None).await.unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].candidate.metadata.product_id, "B01SPEAKER");
}

#[tokio::test]
async fn reingesting_the_same_corpus_adds_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);
    let config = config();
    let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(DIMS, 8));
    let indexer = Indexer::new(
        Arc::clone(&store),
        embedder,
        &config,
        Arc::new(RecordingSleeper::default()),
    );

    indexer.ingest(corpus(), false).await.unwrap();
    let again = indexer.ingest(corpus(), false).await.unwrap();
    assert_eq!(again.unchanged, 3);
    assert_eq!(again.inserted, 0);

    let forced = indexer.ingest(corpus(), true).await.unwrap();
    assert_eq!(forced.inserted, 3);

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.total_chunks, 3);
    assert_eq!(stats.total_records, 3);
}

struct DownEmbedder {
    calls: AtomicUsize,
}

#[async_trait]
impl Embedder for DownEmbedder {
    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(RagError::Transient("connection refused".to_string()))
    }

    fn dimensions(&self) -> usize {
        DIMS
    }

    fn max_batch_size(&self) -> usize {
        8
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn embedding_outage_yields_summary_with_everything_failed() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);
    let config = config();
    let embedder = Arc::new(DownEmbedder {
        calls: AtomicUsize::new(0),
    });
    let sleeper = Arc::new(RecordingSleeper::default());

    let indexer = Indexer::new(
        Arc::clone(&store),
        Arc::clone(&embedder) as Arc<dyn Embedder>,
        &config,
        Arc::clone(&sleeper) as _,
    );
    let summary = indexer.ingest(corpus(), false).await.unwrap();

    assert_eq!(summary.inserted, 0);
    assert_eq!(summary.failed, summary.attempted);
    assert_eq!(summary.failed, 3);
    assert_eq!(summary.batches_failed, 2);
    // Two batches, each tried max_retries + 1 times
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 8);
    assert_eq!(sleeper.delays().len(), 6);
    assert_eq!(store.stats().await.unwrap().total_chunks, 0);
}

struct WrongDimensionEmbedder;

#[async_trait]
impl Embedder for WrongDimensionEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![1.0; 3]).collect())
    }

    fn dimensions(&self) -> usize {
        DIMS
    }

    fn max_batch_size(&self) -> usize {
        8
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn dimensionality_mismatch_aborts_ingestion() {
    let dir = tempfile::tempdir().unwrap();
    let indexer = Indexer::new(
        store_in(&dir),
        Arc::new(WrongDimensionEmbedder),
        &config(),
        Arc::new(RecordingSleeper::default()),
    );

    let err = indexer.ingest(corpus(), false).await.unwrap_err();
    assert!(matches!(err, RagError::Permanent(_)));
}

#[tokio::test]
async fn malformed_records_are_skipped_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);
    let mut records = corpus();
    records.push(ReviewRecord {
        product_id: None,
        text: "orphan review".to_string(),
        ..Default::default()
    });
    records.push(review("B03", "Empty", "U9", "   ", 3.0));

    let indexer = Indexer::new(
        Arc::clone(&store),
        Arc::new(HashingEmbedder::new(DIMS, 8)),
        &config(),
        Arc::new(RecordingSleeper::default()),
    );
    let summary = indexer.ingest(records, false).await.unwrap();

    assert_eq!(summary.records_seen, 5);
    assert_eq!(summary.records_skipped, 2);
    assert_eq!(summary.inserted, 3);

    assert_eq!(store.stats().await.unwrap().total_chunks, 3);
}
