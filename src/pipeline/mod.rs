
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::{debug, error, info, warn};

use crate::access::{self, PermissionStore};
use crate::audit::{AccessLogEntry, AccessStatus, AuditLog};
use crate::auth::AuthenticatedUser;
use crate::chunking::{Chunk, ChunkingConfig, split_documents};
use crate::config::RetrievalConfig;
use crate::generation::AnswerGenerator;
use crate::index::{EmbeddingService, RetrievedChunk, VectorIndex};
use crate::loader::{DocumentCatalog, attach_catalog, load_documents};
use crate::{RagError, Result};

/// What a batch does when one of its queries fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailurePolicy {
    /// Stop the whole batch and report the error
    #[default]
    #[serde(rename = "abort")]
    AbortBatch,
    /// Record the failure, leave the query out of the output and continue
    #[serde(rename = "skip")]
    SkipQuery,
}

/// Caller-chosen query identifier, echoed verbatim in the output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryId {
    Number(i64),
    Text(String),
}

impl fmt::Display for QueryId {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryId::Number(n) => write!(f, "{}", n),
            QueryId::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub query_id: QueryId,
    pub question: String,
}

/// A surfaced chunk as written to the batch output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkPreview {
    pub source: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub query_id: QueryId,
    pub question: String,
    pub retrieved_chunks: Vec<ChunkPreview>,
    pub answer: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedQuery {
    pub query_id: QueryId,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Answers in input order
    pub records: Vec<AnswerRecord>,
    pub skipped: Vec<SkippedQuery>,
}

/// Load, tag and chunk every document under `corpus_dir`
pub async fn ingest(
    corpus_dir: &Path,
    catalog: &dyn DocumentCatalog,
    chunking: &ChunkingConfig,
) -> Result<Vec<Chunk>> {
    let mut documents = load_documents(corpus_dir)?;
    if documents.is_empty() {
        return Ok(Vec::new());
    }

    let entries = catalog.entries().await?;
    attach_catalog(&mut documents, &entries);

    let chunks = split_documents(&documents, chunking);
    info!(
        "Split {} documents into {} chunks",
        documents.len(),
        chunks.len()
    );
    Ok(chunks)
}

/// Read a JSON array of queries. A `null` document is an empty batch.
#[inline]
pub fn load_queries(path: &Path) -> Result<Vec<Query>> {
    if !path.is_file() {
        return Err(RagError::NotFound(format!(
            "Query file not found: {}",
            path.display()
        )));
    }

    let text = fs::read_to_string(path)?;
    let queries: Option<Vec<Query>> = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse queries from {}", path.display()))?;

    let queries = queries.unwrap_or_default();
    debug!("Loaded {} queries from {}", queries.len(), path.display());
    Ok(queries)
}

/// Write the batch output as pretty-printed JSON
#[inline]
pub fn write_results(path: &Path, records: &[AnswerRecord]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(records).context("Failed to serialize results")?;
    fs::write(path, json)?;
    info!("Wrote {} answer records to {}", records.len(), path.display());
    Ok(())
}

/// Per-query retrieve, filter, generate and audit over a prebuilt index
pub struct Pipeline<'a> {
    index: &'a VectorIndex,
    embedder: &'a dyn EmbeddingService,
    generator: AnswerGenerator<'a>,
    permissions: &'a dyn PermissionStore,
    audit: &'a dyn AuditLog,
    retrieval: RetrievalConfig,
    failure_policy: FailurePolicy,
}

impl<'a> Pipeline<'a> {
    #[inline]
    pub fn new(
        index: &'a VectorIndex,
        embedder: &'a dyn EmbeddingService,
        generator: AnswerGenerator<'a>,
        permissions: &'a dyn PermissionStore,
        audit: &'a dyn AuditLog,
        retrieval: RetrievalConfig,
    ) -> Self {
        Self {
            index,
            embedder,
            generator,
            permissions,
            audit,
            retrieval,
            failure_policy: FailurePolicy::default(),
        }
    }

    #[inline]
    pub fn with_failure_policy(mut self, failure_policy: FailurePolicy) -> Self {
        self.failure_policy = failure_policy;
        self
    }

    /// Answer one query on behalf of `user`
    pub async fn answer(&self, user: AuthenticatedUser, query: &Query) -> Result<AnswerRecord> {
        let retrieved = self
            .index
            .query(self.embedder, &query.question, self.retrieval.top_k)?;
        let permitted = access::filter(self.permissions, user.role_id, retrieved).await?;

        let answer = self.generator.generate(&query.question, &permitted).await?;

        self.log_access(user, &permitted).await?;

        Ok(AnswerRecord {
            query_id: query.query_id.clone(),
            question: query.question.clone(),
            retrieved_chunks: permitted
                .iter()
                .map(|hit| self.preview(hit))
                .collect(),
            answer,
        })
    }

    async fn log_access(&self, user: AuthenticatedUser, permitted: &[RetrievedChunk]) -> Result<()> {
        for hit in permitted {
            self.audit
                .record(AccessLogEntry::now(
                    user.user_id,
                    hit.chunk.document_id,
                    AccessStatus::Granted,
                ))
                .await?;
        }
        debug!("Logged {} granted accesses", permitted.len());
        Ok(())
    }

    fn preview(&self, hit: &RetrievedChunk) -> ChunkPreview {
        ChunkPreview {
            source: hit.chunk.source_path.clone(),
            content: hit
                .chunk
                .content
                .chars()
                .take(self.retrieval.content_preview_chars)
                .collect(),
        }
    }

    /// Answer `queries` in order, one at a time
    pub async fn run_batch(
        &self,
        user: AuthenticatedUser,
        queries: &[Query],
    ) -> Result<BatchOutcome> {
        let mut outcome = BatchOutcome::default();
        info!(
            "Processing {} queries for user {}",
            queries.len(),
            user.user_id
        );

        for query in queries {
            match self.answer(user, query).await {
                Ok(record) => outcome.records.push(record),
                Err(e) => match self.failure_policy {
                    FailurePolicy::AbortBatch => {
                        error!("Query {} failed, aborting batch: {}", query.query_id, e);
                        return Err(e);
                    }
                    FailurePolicy::SkipQuery => {
                        warn!("Query {} failed, skipping: {}", query.query_id, e);
                        outcome.skipped.push(SkippedQuery {
                            query_id: query.query_id.clone(),
                            error: e.to_string(),
                        });
                    }
                },
            }
        }

        info!(
            "Batch complete: {} answered, {} skipped",
            outcome.records.len(),
            outcome.skipped.len()
        );
        Ok(outcome)
    }
}
