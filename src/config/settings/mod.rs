
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::chunking::ChunkingConfig;
use crate::generation::RetryPolicy;
use crate::pipeline::FailurePolicy;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OllamaConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    /// Model used for both index construction and query embedding
    pub embedding_model: String,
    /// Chat model used for answer generation
    pub generation_model: String,
    pub batch_size: u32,
    pub timeout_seconds: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            protocol: "http".to_string(),
            host: "localhost".to_string(),
            port: 11434,
            embedding_model: "nomic-embed-text:latest".to_string(),
            generation_model: "llama3.2:latest".to_string(),
            batch_size: 16,
            timeout_seconds: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Number of nearest chunks retrieved per question, before filtering
    pub top_k: usize,
    /// Maximum characters of chunk content written to the batch output
    pub content_preview_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            content_preview_chars: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GenerationConfig {
    /// Attempts made against a rate-limited generation service
    pub max_retries: u32,
    /// Backoff time unit; the wait before retry `n` is `2^(n-1)` units
    pub backoff_unit_ms: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            backoff_unit_ms: 1000,
        }
    }
}

impl GenerationConfig {
    #[inline]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries,
            Duration::from_millis(self.backoff_unit_ms),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct IndexConfig {
    /// Rebuild a persisted index whose chunk fingerprint no longer matches
    pub verify_fingerprint: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            verify_fingerprint: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BatchConfig {
    pub failure_policy: FailurePolicy,
    pub corpus_dir: Option<PathBuf>,
    pub queries_file: Option<PathBuf>,
    pub output_file: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid port: {0} (must be between 1 and 65535)")]
    InvalidPort(u16),
    #[error("Invalid batch size: {0} (must be between 1 and 1000)")]
    InvalidBatchSize(u32),
    #[error("Invalid model name: {0:?} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid protocol: {0} (must be 'http' or 'https')")]
    InvalidProtocol(String),
    #[error("Invalid request timeout: {0} (must be between 1 and 3600 seconds)")]
    InvalidTimeout(u64),
    #[error("Invalid chunk size: {0} (must be between 1 and 10000)")]
    InvalidChunkSize(usize),
    #[error("Chunk overlap ({0}) must be smaller than chunk size ({1})")]
    OverlapTooLarge(usize, usize),
    #[error("Invalid top_k: {0} (must be between 1 and 100)")]
    InvalidTopK(usize),
    #[error("Invalid max retries: {0} (must be between 1 and 16)")]
    InvalidMaxRetries(u32),
    #[error("Invalid backoff unit: {0}ms (must be at most 60000)")]
    InvalidBackoffUnit(u64),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Default for Config {
    #[inline]
    fn default() -> Self {
        Self::with_base_dir(Self::config_dir().unwrap_or_default())
    }
}

impl Config {
    /// Default configuration rooted at `base_dir`
    #[inline]
    pub fn with_base_dir<P: AsRef<Path>>(base_dir: P) -> Self {
        Self {
            ollama: OllamaConfig::default(),
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            generation: GenerationConfig::default(),
            index: IndexConfig::default(),
            batch: BatchConfig::default(),
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    /// Get the default configuration directory (`~/.rolerag`)
    #[inline]
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::home_dir()
            .map(|home| home.join(".rolerag"))
            .or_else(|| dirs::data_dir().map(|data| data.join("rolerag")))
            .ok_or(ConfigError::DirectoryError)
    }

    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join("config.toml");

        if !config_path.exists() {
            return Ok(Self::with_base_dir(config_dir));
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.base_dir = config_dir.as_ref().to_path_buf();

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        let config_dir = self.get_base_dir();

        fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        let config_path = self.config_file_path();
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    /// Get the base directory for the application
    #[inline]
    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ollama.validate()?;
        self.validate_chunking()?;
        self.validate_retrieval()?;
        self.validate_generation()?;
        Ok(())
    }

    fn validate_chunking(&self) -> Result<(), ConfigError> {
        let chunking = &self.chunking;

        if !(1..=10_000).contains(&chunking.chunk_size) {
            return Err(ConfigError::InvalidChunkSize(chunking.chunk_size));
        }

        if chunking.chunk_overlap >= chunking.chunk_size {
            return Err(ConfigError::OverlapTooLarge(
                chunking.chunk_overlap,
                chunking.chunk_size,
            ));
        }

        Ok(())
    }

    fn validate_retrieval(&self) -> Result<(), ConfigError> {
        if !(1..=100).contains(&self.retrieval.top_k) {
            return Err(ConfigError::InvalidTopK(self.retrieval.top_k));
        }
        Ok(())
    }

    fn validate_generation(&self) -> Result<(), ConfigError> {
        if !(1..=16).contains(&self.generation.max_retries) {
            return Err(ConfigError::InvalidMaxRetries(
                self.generation.max_retries,
            ));
        }

        if self.generation.backoff_unit_ms > 60_000 {
            return Err(ConfigError::InvalidBackoffUnit(
                self.generation.backoff_unit_ms,
            ));
        }

        Ok(())
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.get_base_dir().join("config.toml")
    }

    /// Get the path for the SQLite database
    #[inline]
    pub fn database_path(&self) -> PathBuf {
        self.get_base_dir().join("metadata.db")
    }

    /// Get the directory holding the persisted vector index
    #[inline]
    pub fn index_path(&self) -> PathBuf {
        self.get_base_dir().join("index")
    }

    #[inline]
    pub fn corpus_dir(&self) -> PathBuf {
        self.batch
            .corpus_dir
            .clone()
            .unwrap_or_else(|| self.get_base_dir().join("data"))
    }

    #[inline]
    pub fn queries_file(&self) -> PathBuf {
        self.batch
            .queries_file
            .clone()
            .unwrap_or_else(|| self.corpus_dir().join("queries.json"))
    }

    #[inline]
    pub fn output_file(&self) -> PathBuf {
        self.batch
            .output_file
            .clone()
            .unwrap_or_else(|| self.corpus_dir().join("results.json"))
    }
}

impl OllamaConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.protocol != "http" && self.protocol != "https" {
            return Err(ConfigError::InvalidProtocol(self.protocol.clone()));
        }

        self.ollama_url()?;

        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }

        if self.embedding_model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.embedding_model.clone()));
        }

        if self.generation_model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.generation_model.clone()));
        }

        if self.batch_size == 0 || self.batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(self.batch_size));
        }

        if !(1..=3600).contains(&self.timeout_seconds) {
            return Err(ConfigError::InvalidTimeout(self.timeout_seconds));
        }

        Ok(())
    }

    pub fn ollama_url(&self) -> Result<Url, ConfigError> {
        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))
    }
}
