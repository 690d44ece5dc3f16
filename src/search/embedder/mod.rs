mod client;
mod hashing;
mod ollama;
mod openai;

pub use client::EmbeddingClient;
pub use hashing::HashingEmbedder;
pub use ollama::OllamaEmbedder;
pub use openai::OpenAiEmbedder;

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::config::EmbeddingConfig;
use crate::error::{RagError, Result};

/// A text -> vector provider. Adapters report rate limits and timeouts as
/// `RagError::Transient` and everything the caller cannot fix by waiting
/// as `RagError::Permanent`.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
    fn dimensions(&self) -> usize;
    /// Largest batch the provider accepts in one request.
    fn max_batch_size(&self) -> usize;
    async fn health_check(&self) -> Result<()>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RagError::Permanent("No embedding returned".to_string()))
    }
}

pub fn create_embedder(config: &EmbeddingConfig) -> Result<Box<dyn Embedder>> {
    match config.provider.as_str() {
        "ollama" => {
            let endpoint = config
                .endpoint
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string());
            Ok(Box::new(OllamaEmbedder::new(&endpoint, config)?))
        }
        "openai" => {
            let api_key = std::env::var(&config.api_key_env).map_err(|_| {
                RagError::Config(format!("environment variable {} is not set", config.api_key_env))
            })?;
            let endpoint = config
                .endpoint
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string());
            Ok(Box::new(OpenAiEmbedder::new(&api_key, &endpoint, config)?))
        }
        "hashing" => Ok(Box::new(HashingEmbedder::new(
            config.dimensions,
            config.max_batch_size,
        ))),
        other => Err(RagError::Config(format!(
            "Invalid embedding provider: {}",
            other
        ))),
    }
}

/// 429 and 5xx are worth retrying; any other failure status is not.
pub(crate) fn classify_status(provider: &str, status: StatusCode, body: &str) -> RagError {
    let message = format!("{} error ({}): {}", provider, status, body);
    if status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
    {
        RagError::Transient(message)
    } else {
        RagError::Permanent(message)
    }
}

pub(crate) fn classify_request(provider: &str, err: reqwest::Error) -> RagError {
    if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
        RagError::Transient(format!("{} request failed: {}", provider, err))
    } else {
        RagError::Permanent(format!("{} request failed: {}", provider, err))
    }
}
