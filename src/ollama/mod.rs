#[cfg(test)]
mod tests;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::OllamaConfig;
use crate::generation::{GenerationError, GenerationService};
use crate::index::EmbeddingService;
use crate::{RagError, Result};

/// HTTP status Ollama (and proxies in front of it) use for throttling
const TOO_MANY_REQUESTS: u16 = 429;

/// Blocking client for a local Ollama server, serving both embeddings and chat
#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: Url,
    embedding_model: String,
    generation_model: String,
    batch_size: u32,
    agent: ureq::Agent,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub size: Option<u64>,
    pub digest: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    models: Vec<ModelInfo>,
}

fn agent_with_timeout(timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .build()
        .into()
}

impl OllamaClient {
    #[inline]
    pub fn new(config: &OllamaConfig) -> Result<Self> {
        let base_url = config
            .ollama_url()
            .map_err(|e| RagError::Config(e.to_string()))?;

        Ok(Self {
            base_url,
            embedding_model: config.embedding_model.clone(),
            generation_model: config.generation_model.clone(),
            batch_size: config.batch_size.max(1),
            agent: agent_with_timeout(Duration::from_secs(config.timeout_seconds)),
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = agent_with_timeout(timeout);
        self
    }

    #[inline]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    #[inline]
    pub fn generation_model(&self) -> &str {
        &self.generation_model
    }

    /// Verify the server answers and both configured models are pulled
    #[inline]
    pub fn health_check(&self) -> Result<()> {
        debug!("Performing health check for Ollama at {}", self.base_url);

        let models = self.list_models()?;
        let available: Vec<&str> = models.iter().map(|m| m.name.as_str()).collect();

        for model in [&self.embedding_model, &self.generation_model] {
            if !available.contains(&model.as_str()) {
                warn!(
                    "Model {} not found. Available models: {:?}",
                    model, available
                );
                return Err(RagError::Config(format!(
                    "Model '{}' is not available. Available models: {:?}",
                    model, available
                )));
            }
        }

        info!(
            "Health check passed for Ollama at {} ({}, {})",
            self.base_url, self.embedding_model, self.generation_model
        );
        Ok(())
    }

    #[inline]
    pub fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let url = self.endpoint("/api/tags")?;
        debug!("Fetching available models from {}", url);

        let text = self
            .agent
            .get(url.as_str())
            .call()
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .map_err(|e| RagError::EmbeddingService(format!("Failed to reach Ollama: {}", e)))?;

        let response: ModelsResponse = serde_json::from_str(&text)
            .context("Failed to parse models response")?;
        debug!("Found {} models", response.models.len());
        Ok(response.models)
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| RagError::Config(format!("Failed to build URL for {}: {}", path, e)))
    }

    fn embed_single_batch(&self, url: &Url, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbedRequest {
            model: &self.embedding_model,
            input: texts,
        };
        let body = serde_json::to_string(&request).context("Failed to serialize embed request")?;

        let text = self
            .agent
            .post(url.as_str())
            .header("Content-Type", "application/json")
            .send(&body)
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .map_err(|e| match e {
                ureq::Error::StatusCode(status) => {
                    RagError::EmbeddingService(format!("HTTP {} from {}", status, url))
                }
                other => RagError::EmbeddingService(format!("Request failed: {}", other)),
            })?;

        let response: EmbedResponse = serde_json::from_str(&text).map_err(|e| {
            RagError::EmbeddingService(format!("Failed to parse embedding response: {}", e))
        })?;

        if response.embeddings.len() != texts.len() {
            return Err(RagError::EmbeddingService(format!(
                "Mismatch between request and response counts: {} vs {}",
                texts.len(),
                response.embeddings.len()
            )));
        }

        Ok(response.embeddings)
    }
}

impl EmbeddingService for OllamaClient {
    #[inline]
    fn model_id(&self) -> &str {
        &self.embedding_model
    }

    #[inline]
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])?
            .pop()
            .ok_or_else(|| RagError::EmbeddingService("Empty embedding response".to_string()))
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = self.endpoint("/api/embed")?;
        debug!("Embedding {} texts with {}", texts.len(), self.embedding_model);

        let mut embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size as usize) {
            embeddings.extend(self.embed_single_batch(&url, batch)?);
        }

        let dimension = embeddings.first().map_or(0, Vec::len);
        if dimension == 0 || embeddings.iter().any(|e| e.len() != dimension) {
            return Err(RagError::EmbeddingService(
                "Embedding dimensions are empty or inconsistent".to_string(),
            ));
        }

        Ok(embeddings)
    }
}

impl GenerationService for OllamaClient {
    fn complete(
        &self,
        system_instruction: &str,
        prompt: &str,
    ) -> std::result::Result<String, GenerationError> {
        let url = self
            .endpoint("/api/chat")
            .map_err(|e| GenerationError::Service(e.to_string()))?;

        let request = ChatRequest {
            model: &self.generation_model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_instruction,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            stream: false,
        };
        let body = serde_json::to_string(&request)
            .map_err(|e| GenerationError::Service(format!("Failed to serialize chat request: {}", e)))?;

        debug!("Requesting completion from {}", self.generation_model);
        let text = self
            .agent
            .post(url.as_str())
            .header("Content-Type", "application/json")
            .send(&body)
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .map_err(|e| match e {
                ureq::Error::StatusCode(TOO_MANY_REQUESTS) => {
                    GenerationError::RateLimited(format!("HTTP 429 from {}", url))
                }
                ureq::Error::StatusCode(status) => {
                    GenerationError::Service(format!("HTTP {} from {}", status, url))
                }
                other => GenerationError::Service(format!("Request failed: {}", other)),
            })?;

        let response: ChatResponse = serde_json::from_str(&text).map_err(|e| {
            GenerationError::Service(format!("Failed to parse chat response: {}", e))
        })?;

        Ok(response.message.content.trim().to_string())
    }
}
