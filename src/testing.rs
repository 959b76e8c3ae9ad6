// Deterministic stand-ins for the embedding and generation services

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::Result;
use crate::access::{PermissionStore, PermittedCategories};
use crate::audit::{AccessLogEntry, AuditLog};
use crate::chunking::Chunk;
use crate::generation::{GenerationError, GenerationService};
use crate::index::EmbeddingService;

/// Embeds text as keyword counts over a fixed vocabulary
pub(crate) struct KeywordEmbedder {
    model: String,
    vocabulary: Vec<&'static str>,
    calls: AtomicUsize,
}

impl KeywordEmbedder {
    pub(crate) fn new(vocabulary: &[&'static str]) -> Self {
        Self::with_model("keyword-test", vocabulary)
    }

    pub(crate) fn with_model(model: &str, vocabulary: &[&'static str]) -> Self {
        Self {
            model: model.to_string(),
            vocabulary: vocabulary.to_vec(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of texts embedded so far
    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl EmbeddingService for KeywordEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let lowered = text.to_lowercase();
        Ok(self
            .vocabulary
            .iter()
            .map(|word| lowered.matches(word).count() as f32)
            .collect())
    }
}

/// Replays a fixed script of generation outcomes and records every prompt
pub(crate) struct ScriptedGenerator {
    script: Mutex<VecDeque<std::result::Result<String, GenerationError>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub(crate) fn new(script: Vec<std::result::Result<String, GenerationError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Always answers with `answer`
    pub(crate) fn answering(answer: &str) -> Self {
        Self::new(vec![Ok(answer.to_string()); 64])
    }

    pub(crate) fn always_rate_limited() -> Self {
        Self::new(vec![Err(GenerationError::RateLimited("429".to_string())); 64])
    }

    pub(crate) fn calls(&self) -> usize {
        self.prompts.lock().expect("prompt log lock").len()
    }

    pub(crate) fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("prompt log lock").clone()
    }
}

impl GenerationService for ScriptedGenerator {
    fn complete(
        &self,
        _system_instruction: &str,
        prompt: &str,
    ) -> std::result::Result<String, GenerationError> {
        self.prompts
            .lock()
            .expect("prompt log lock")
            .push(prompt.to_string());
        self.script
            .lock()
            .expect("script lock")
            .pop_front()
            .unwrap_or_else(|| Err(GenerationError::Service("script exhausted".to_string())))
    }
}

pub(crate) fn chunk(source: &str, content: &str, category: Option<&str>) -> Chunk {
    Chunk {
        content: content.to_string(),
        overlap_with_predecessor: String::new(),
        source_path: source.to_string(),
        page: None,
        document_id: None,
        category: category.map(str::to_string),
        chunk_index: 0,
    }
}

/// Permissions keyed by role id; absent roles have none
pub(crate) struct RolePermissions(HashMap<i64, PermittedCategories>);

impl RolePermissions {
    pub(crate) fn new(roles: &[(i64, &[&str])]) -> Self {
        Self(
            roles
                .iter()
                .map(|(role_id, categories)| (*role_id, categories.iter().copied().collect()))
                .collect(),
        )
    }
}

#[async_trait]
impl PermissionStore for RolePermissions {
    async fn permitted_categories(&self, role_id: i64) -> Result<PermittedCategories> {
        Ok(self.0.get(&role_id).cloned().unwrap_or_default())
    }
}

/// Keeps every audit entry in memory
#[derive(Default)]
pub(crate) struct RecordingAudit(Mutex<Vec<AccessLogEntry>>);

impl RecordingAudit {
    pub(crate) fn entries(&self) -> Vec<AccessLogEntry> {
        self.0.lock().expect("audit lock").clone()
    }
}

#[async_trait]
impl AuditLog for RecordingAudit {
    async fn record(&self, entry: AccessLogEntry) -> Result<()> {
        self.0.lock().expect("audit lock").push(entry);
        Ok(())
    }
}
