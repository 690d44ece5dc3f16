use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{RagError, Result};

pub const DEFAULT_CONFIG_FILE: &str = "reviewrag.toml";

/// Upper bound for any single backoff delay.
pub const MAX_BACKOFF_SECONDS: f64 = 3600.0;
pub const MAX_BACKOFF_MULTIPLIER: f64 = 10.0;
/// Upper bound for request, stage and provider timeouts.
pub const MAX_TIMEOUT_SECS: u64 = 86_400;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub embedding: EmbeddingConfig,
    pub chunking: ChunkingConfig,
    pub ingestion: IngestionConfig,
    pub retrieval: RetrievalConfig,
    pub store: StoreConfig,
    pub generation: GenerationConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// `ollama`, `openai` or `hashing` (offline, deterministic)
    pub provider: String,
    pub model: String,
    pub endpoint: Option<String>,
    pub dimensions: usize,
    pub max_batch_size: usize,
    pub timeout_secs: u64,
    pub api_key_env: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            model: "nomic-embed-text".to_string(),
            endpoint: None,
            dimensions: 768,
            max_batch_size: 32,
            timeout_secs: 60,
            api_key_env: "OPENAI_API_KEY".to_string(),
        }
    }
}

/// Sizes are in characters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    pub batch_size: usize,
    pub max_retries: u32,
    pub backoff_initial_seconds: f64,
    pub backoff_multiplier: f64,
    pub backoff_max_seconds: f64,
    /// Batches embedded and committed in flight at once
    pub concurrency: usize,
    pub limit: Option<usize>,
    pub shuffle: bool,
    pub shuffle_seed: Option<u64>,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            max_retries: 5,
            backoff_initial_seconds: 1.0,
            backoff_multiplier: 2.0,
            backoff_max_seconds: 30.0,
            concurrency: 4,
            limit: None,
            shuffle: false,
            shuffle_seed: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub oversample_factor: usize,
    pub mmr_lambda: f32,
    /// Weight of the vector score in the fused score; lexical gets the rest
    pub fusion_weight: f32,
    /// `heuristic` or `none`
    pub reranker: String,
    pub request_timeout_secs: u64,
    pub stage_timeout_secs: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 4,
            oversample_factor: 4,
            mmr_lambda: 0.5,
            fusion_weight: 0.7,
            reranker: "heuristic".to_string(),
            request_timeout_secs: 30,
            stage_timeout_secs: 15,
        }
    }
}

impl RetrievalConfig {
    pub fn candidates_for(&self, top_k: usize) -> usize {
        top_k.saturating_mul(self.oversample_factor.max(1)).max(top_k)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.stage_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(".reviewrag/index.json"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub provider: String,
    pub model: String,
    pub endpoint: Option<String>,
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            model: "llama3.1".to_string(),
            endpoint: None,
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load an explicit config file, or `reviewrag.toml` if present, else defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => Self::from_file(DEFAULT_CONFIG_FILE),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let chunking = &self.chunking;
        if chunking.chunk_size == 0 {
            return Err(invalid("chunking.chunk_size must be positive"));
        }
        if chunking.chunk_overlap >= chunking.chunk_size {
            return Err(invalid(format!(
                "chunking.chunk_overlap ({}) must be smaller than chunk_size ({})",
                chunking.chunk_overlap, chunking.chunk_size
            )));
        }

        if self.embedding.max_batch_size == 0 {
            return Err(invalid("embedding.max_batch_size must be positive"));
        }
        if self.embedding.dimensions == 0 {
            return Err(invalid("embedding.dimensions must be positive"));
        }

        let ingestion = &self.ingestion;
        if ingestion.batch_size == 0 {
            return Err(invalid("ingestion.batch_size must be positive"));
        }
        if ingestion.concurrency == 0 {
            return Err(invalid("ingestion.concurrency must be positive"));
        }
        for (name, value) in [
            ("backoff_initial_seconds", ingestion.backoff_initial_seconds),
            ("backoff_max_seconds", ingestion.backoff_max_seconds),
        ] {
            if !(value > 0.0 && value <= MAX_BACKOFF_SECONDS) {
                return Err(invalid(format!(
                    "ingestion.{} must be within (0, {}], got {}",
                    name, MAX_BACKOFF_SECONDS, value
                )));
            }
        }
        if !(1.0..=MAX_BACKOFF_MULTIPLIER).contains(&ingestion.backoff_multiplier) {
            return Err(invalid(format!(
                "ingestion.backoff_multiplier must be within [1, {}], got {}",
                MAX_BACKOFF_MULTIPLIER, ingestion.backoff_multiplier
            )));
        }

        let retrieval = &self.retrieval;
        if retrieval.top_k == 0 {
            return Err(invalid("retrieval.top_k must be positive"));
        }
        if retrieval.oversample_factor == 0 {
            return Err(invalid("retrieval.oversample_factor must be at least 1"));
        }
        if !(0.0..=1.0).contains(&retrieval.mmr_lambda) {
            return Err(invalid("retrieval.mmr_lambda must be within [0, 1]"));
        }
        if !(0.0..=1.0).contains(&retrieval.fusion_weight) {
            return Err(invalid("retrieval.fusion_weight must be within [0, 1]"));
        }
        if !matches!(retrieval.reranker.as_str(), "heuristic" | "none") {
            return Err(invalid(format!(
                "unknown reranker '{}' (expected 'heuristic' or 'none')",
                retrieval.reranker
            )));
        }

        for (name, value) in [
            ("retrieval.request_timeout_secs", retrieval.request_timeout_secs),
            ("retrieval.stage_timeout_secs", retrieval.stage_timeout_secs),
            ("embedding.timeout_secs", self.embedding.timeout_secs),
            ("generation.timeout_secs", self.generation.timeout_secs),
        ] {
            if !(1..=MAX_TIMEOUT_SECS).contains(&value) {
                return Err(invalid(format!(
                    "{} must be within [1, {}], got {}",
                    name, MAX_TIMEOUT_SECS, value
                )));
            }
        }

        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> RagError {
    RagError::Config(message.into())
}
