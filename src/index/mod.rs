#[cfg(test)]
mod tests;

use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::chunking::Chunk;
use crate::config::IndexConfig;
use crate::database::lancedb::IndexStore;
use crate::{RagError, Result};

/// Chunks embedded per progress step during index construction
const EMBED_STEP: usize = 64;

/// Text embedding backend.
///
/// The same model must serve index construction and querying; `model_id` is
/// recorded in the persisted index so a model change forces a rebuild.
pub trait EmbeddingService: Send + Sync {
    fn model_id(&self) -> &str;

    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|text| self.embed(text)).collect()
    }
}

/// A chunk together with its embedding and its position in the corpus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedChunk {
    pub ordinal: u32,
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// A chunk surfaced by a similarity query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub ordinal: u32,
    pub chunk: Chunk,
    /// Squared Euclidean distance to the query; smaller is closer
    pub distance: f32,
}

/// Chunks ranked closest first
pub type RetrievalResult = Vec<RetrievedChunk>;

/// In-memory exact nearest-neighbour index over embedded chunks
#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    entries: Vec<IndexedChunk>,
    dimension: usize,
    embedding_model: String,
    fingerprint: String,
}

impl VectorIndex {
    /// Embed every chunk and index it in the given order
    pub fn build(chunks: Vec<Chunk>, embedder: &dyn EmbeddingService) -> Result<Self> {
        let fingerprint = fingerprint(&chunks, embedder.model_id());
        info!(
            "Building vector index for {} chunks with {}",
            chunks.len(),
            embedder.model_id()
        );

        let bar = if console::user_attended_stderr() {
            ProgressBar::new(chunks.len() as u64).with_style(
                ProgressStyle::with_template("{spinner} [{pos}/{len}] Embedding chunks")
                    .expect("style template is valid"),
            )
        } else {
            ProgressBar::hidden()
        };

        let mut vectors = Vec::with_capacity(chunks.len());
        for step in chunks.chunks(EMBED_STEP) {
            let texts: Vec<String> = step.iter().map(|c| c.content.clone()).collect();
            let embedded = embedder.embed_batch(&texts)?;
            if embedded.len() != texts.len() {
                return Err(RagError::EmbeddingService(format!(
                    "Expected {} embeddings, received {}",
                    texts.len(),
                    embedded.len()
                )));
            }
            vectors.extend(embedded);
            bar.inc(step.len() as u64);
        }
        bar.finish_and_clear();

        let entries = chunks
            .into_iter()
            .zip(vectors)
            .zip(0u32..)
            .map(|((chunk, vector), ordinal)| IndexedChunk {
                ordinal,
                chunk,
                vector,
            })
            .collect();

        Self::from_parts(entries, embedder.model_id().to_string(), fingerprint)
    }

    /// Assemble an index from already-embedded entries, validating their shape
    pub fn from_parts(
        mut entries: Vec<IndexedChunk>,
        embedding_model: String,
        fingerprint: String,
    ) -> Result<Self> {
        entries.sort_by_key(|entry| entry.ordinal);

        let dimension = entries.first().map_or(0, |entry| entry.vector.len());
        if let Some(bad) = entries.iter().find(|e| e.vector.len() != dimension) {
            return Err(RagError::Index(format!(
                "Chunk {} has {} dimensions, expected {}",
                bad.ordinal,
                bad.vector.len(),
                dimension
            )));
        }
        if entries.iter().any(|e| e.vector.is_empty()) {
            return Err(RagError::Index("Chunk embedding is empty".to_string()));
        }

        debug!(
            "Vector index ready: {} chunks, {} dimensions",
            entries.len(),
            dimension
        );

        Ok(Self {
            entries,
            dimension,
            embedding_model,
            fingerprint,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    #[inline]
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    #[inline]
    pub fn entries(&self) -> &[IndexedChunk] {
        &self.entries
    }

    /// The `top_k` chunks nearest to `query_vector`, closest first.
    ///
    /// Equal distances keep original chunk order.
    pub fn search(&self, query_vector: &[f32], top_k: usize) -> Result<RetrievalResult> {
        if self.entries.is_empty() {
            return Ok(Vec::new());
        }

        if query_vector.len() != self.dimension {
            return Err(RagError::Index(format!(
                "Query vector has {} dimensions, index has {}",
                query_vector.len(),
                self.dimension
            )));
        }

        let mut scored: Vec<(f32, &IndexedChunk)> = self
            .entries
            .iter()
            .map(|entry| (squared_distance(query_vector, &entry.vector), entry))
            .collect();
        scored.sort_by(|(a_dist, a), (b_dist, b)| {
            a_dist.total_cmp(b_dist).then(a.ordinal.cmp(&b.ordinal))
        });

        Ok(scored
            .into_iter()
            .take(top_k)
            .map(|(distance, entry)| RetrievedChunk {
                ordinal: entry.ordinal,
                chunk: entry.chunk.clone(),
                distance,
            })
            .collect())
    }

    /// Embed `question` and return its `top_k` nearest chunks
    #[inline]
    pub fn query(
        &self,
        embedder: &dyn EmbeddingService,
        question: &str,
        top_k: usize,
    ) -> Result<RetrievalResult> {
        if embedder.model_id() != self.embedding_model {
            warn!(
                "Query model {} differs from index model {}",
                embedder.model_id(),
                self.embedding_model
            );
        }

        let query_vector = embedder.embed(question)?;
        let hits = self.search(&query_vector, top_k)?;
        debug!("Retrieved {} chunks for question", hits.len());
        Ok(hits)
    }
}

fn squared_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let diff = x - y;
            diff * diff
        })
        .sum()
}

/// Content hash of a chunk set and the model that embeds it
#[inline]
pub fn fingerprint(chunks: &[Chunk], embedding_model: &str) -> String {
    fn field(hasher: &mut Sha256, value: &[u8]) {
        hasher.update((value.len() as u64).to_le_bytes());
        hasher.update(value);
    }

    let mut hasher = Sha256::new();
    field(&mut hasher, embedding_model.as_bytes());
    hasher.update((chunks.len() as u64).to_le_bytes());

    for chunk in chunks {
        field(&mut hasher, chunk.source_path.as_bytes());
        field(&mut hasher, chunk.content.as_bytes());
        field(&mut hasher, chunk.overlap_with_predecessor.as_bytes());
        field(
            &mut hasher,
            chunk.category.as_deref().unwrap_or_default().as_bytes(),
        );
        hasher.update([u8::from(chunk.category.is_some())]);
        hasher.update(chunk.page.map_or(-1, i64::from).to_le_bytes());
        hasher.update(chunk.document_id.unwrap_or(-1).to_le_bytes());
        hasher.update((chunk.chunk_index as u64).to_le_bytes());
    }

    format!("{:x}", hasher.finalize())
}

/// Load the index persisted at `path`, or build and persist a new one.
///
/// With `verify_fingerprint` set, a persisted index built from a different
/// chunk set or embedding model is discarded and rebuilt. Without it, any
/// persisted index is reused as-is.
pub async fn build_or_load(
    chunks: Vec<Chunk>,
    path: &Path,
    embedder: &dyn EmbeddingService,
    config: &IndexConfig,
) -> Result<VectorIndex> {
    let store = IndexStore::open(path).await?;

    if let Some(persisted) = store.load().await? {
        if !config.verify_fingerprint {
            info!(
                "Reusing persisted index at {} ({} chunks) without fingerprint check",
                path.display(),
                persisted.len()
            );
            return Ok(persisted);
        }

        let expected = fingerprint(&chunks, embedder.model_id());
        if persisted.fingerprint() == expected {
            info!(
                "Loaded persisted index at {} ({} chunks)",
                path.display(),
                persisted.len()
            );
            return Ok(persisted);
        }

        warn!(
            "Persisted index at {} does not match the current corpus, rebuilding",
            path.display()
        );
    }

    let index = VectorIndex::build(chunks, embedder)?;
    store.save(&index).await?;
    info!(
        "Persisted index with {} chunks to {}",
        index.len(),
        path.display()
    );
    Ok(index)
}
