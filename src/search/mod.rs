pub mod chunker;
pub mod corpus;
pub mod embedder;
pub mod hybrid;
pub mod indexer;
pub mod mmr;
pub mod rerank;
pub mod retry;
pub mod searcher;
pub mod store;
pub mod writer;

pub use chunker::Chunker;
pub use corpus::{load_jsonl, sample, Corpus};
pub use embedder::{create_embedder, Embedder, EmbeddingClient, HashingEmbedder};
pub use hybrid::HybridRetriever;
pub use indexer::{BatchObserver, Indexer, IngestionSummary};
pub use rerank::{create_reranker, Reranker};
pub use retry::{default_sleeper, RecordingSleeper, RetryPolicy, Sleeper, TokioSleeper};
pub use searcher::QueryPipeline;
pub use store::{
    CandidateResult, Chunk, ChunkMetadata, EmbeddedChunk, IndexStats, JsonStore, MetadataFilter,
    RankedResult, VectorStore,
};
pub use writer::{BatchState, BatchWriter, CommitResult, IngestionBatch};
