
pub mod retry;

use thiserror::Error;
use tracing::{debug, info};

use crate::Result;
use crate::index::RetrievedChunk;
pub use retry::{AttemptOutcome, RetryPolicy, RetryState};

pub const SYSTEM_INSTRUCTION: &str =
    "You are an AI assistant that answers questions based on provided context.";

/// Failure reported by a generation backend
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GenerationError {
    /// The service is throttling requests; worth retrying later
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("{0}")]
    Service(String),
}

/// Text completion backend
pub trait GenerationService: Send + Sync {
    fn complete(
        &self,
        system_instruction: &str,
        prompt: &str,
    ) -> std::result::Result<String, GenerationError>;
}

/// Join chunk contents, in the order given, into one context block
#[inline]
pub fn build_context(chunks: &[RetrievedChunk]) -> String {
    chunks
        .iter()
        .map(|retrieved| retrieved.chunk.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[inline]
pub fn build_prompt(context: &str, question: &str) -> String {
    format!("Context:\n{context}\n\nQuestion: {question}\n\nAnswer:")
}

/// Composes prompts from filtered chunks and calls the generation service
/// under a [`RetryPolicy`]
pub struct AnswerGenerator<'a> {
    service: &'a dyn GenerationService,
    policy: RetryPolicy,
}

impl<'a> AnswerGenerator<'a> {
    #[inline]
    pub fn new(service: &'a dyn GenerationService, policy: RetryPolicy) -> Self {
        Self { service, policy }
    }

    #[inline]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn generate(&self, question: &str, chunks: &[RetrievedChunk]) -> Result<String> {
        let context = build_context(chunks);
        let prompt = build_prompt(&context, question);

        if chunks.is_empty() {
            info!("No permitted context for question, generating without context");
        }
        debug!(
            "Generating answer with {} context chunks ({} chars)",
            chunks.len(),
            context.len()
        );

        self.policy
            .run(|_attempt| self.service.complete(SYSTEM_INSTRUCTION, &prompt))
            .await
    }
}
