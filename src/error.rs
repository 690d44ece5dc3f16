use thiserror::Error;

#[derive(Error, Debug)]
pub enum RagError {
    /// Unparseable or empty source record. Skipped, never retried.
    #[error("Malformed record: {0}")]
    Malformed(String),

    /// Timeout, rate limit, 5xx. Safe to retry.
    #[error("Transient failure: {0}")]
    Transient(String),

    /// Auth, schema mismatch, invalid dimensionality, invalid input.
    #[error("Permanent failure: {0}")]
    Permanent(String),

    #[error("{operation} failed after {attempts} attempts: {last}")]
    Exhausted {
        operation: String,
        attempts: u32,
        last: String,
    },

    #[error("Deadline exceeded during {stage}")]
    DeadlineExceeded { stage: &'static str },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RagError {
    pub fn is_transient(&self) -> bool {
        matches!(self, RagError::Transient(_))
    }

    /// Errors that must abort the invoking orchestration rather than be
    /// accounted as a failed unit.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RagError::Permanent(_) | RagError::Config(_) | RagError::Io(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, RagError>;
