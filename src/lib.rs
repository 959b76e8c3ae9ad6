use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("{0}")]
    NotFound(String),

    #[error("Embedding service error: {0}")]
    EmbeddingService(String),

    #[error("Rate limit hit: {0}")]
    RateLimit(String),

    #[error("Max retries reached after {attempts} attempts. Try again later.")]
    RetryExhausted { attempts: u32 },

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Index error: {0}")]
    Index(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod access;
pub mod audit;
pub mod auth;
pub mod chunking;
pub mod commands;
pub mod config;
pub mod database;
pub mod generation;
pub mod index;
pub mod loader;
pub mod ollama;
pub mod pipeline;

#[cfg(test)]
pub(crate) mod testing;
