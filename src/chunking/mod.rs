#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::loader::RawDocument;

/// Separators tried, in order, when choosing where a chunk ends
const BREAK_SEPARATORS: [&str; 3] = ["\n\n", "\n", " "];

/// A bounded text segment, the unit of retrieval
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// The chunk text, at most `chunk_size` characters
    pub content: String,
    /// Leading text shared with the previous chunk of the same document
    pub overlap_with_predecessor: String,
    pub source_path: String,
    pub page: Option<u32>,
    pub document_id: Option<i64>,
    pub category: Option<String>,
    /// Position of this chunk within its source document
    pub chunk_index: usize,
}

/// Configuration for document chunking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk length in characters
    pub chunk_size: usize,
    /// Characters shared between adjacent chunks
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 100,
        }
    }
}

/// Split documents into overlapping chunks.
///
/// Pure and deterministic. Requires `chunk_size > chunk_overlap`, which
/// [`crate::config::Config::validate`] guarantees for loaded configurations.
#[inline]
pub fn split_documents(documents: &[RawDocument], config: &ChunkingConfig) -> Vec<Chunk> {
    let mut chunks = Vec::new();

    for document in documents {
        let source_path = document.source_path.display().to_string();
        let mut chunk_index = 0;
        let mut dropped_previous = false;

        for (content, overlap) in
            split_text(&document.text, config.chunk_size, config.chunk_overlap)
        {
            // Whitespace-only pieces carry nothing to retrieve
            if content.trim().is_empty() {
                dropped_previous = true;
                continue;
            }

            chunks.push(Chunk {
                content,
                overlap_with_predecessor: if dropped_previous {
                    String::new()
                } else {
                    overlap
                },
                source_path: source_path.clone(),
                page: document.metadata.page,
                document_id: document.metadata.document_id,
                category: document.metadata.category.clone(),
                chunk_index,
            });
            chunk_index += 1;
            dropped_previous = false;
        }
    }

    debug!(
        "Split {} documents into {} chunks (size {}, overlap {})",
        documents.len(),
        chunks.len(),
        config.chunk_size,
        config.chunk_overlap
    );

    chunks
}

/// Split text into `(content, overlap_with_predecessor)` pairs.
///
/// Every chunk after the first starts exactly `overlap` characters before the
/// end of its predecessor. Chunk ends prefer paragraph, line, then word
/// boundaries, falling back to a hard cut at `size` characters.
#[expect(
    clippy::string_slice,
    reason = "all offsets are taken from char_indices"
)]
pub(crate) fn split_text(text: &str, size: usize, overlap: usize) -> Vec<(String, String)> {
    if text.trim().is_empty() || size == 0 || overlap >= size {
        return Vec::new();
    }

    // Byte offset of every char boundary, including the end of the text
    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(offset, _)| offset)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_count = bounds.len() - 1;

    let mut pieces = Vec::new();
    let mut start = 0;
    loop {
        let hard_end = (start + size).min(char_count);
        let end = if hard_end == char_count {
            char_count
        } else {
            find_break(text, &bounds, start + overlap + 1, hard_end).unwrap_or(hard_end)
        };

        let content = text[bounds[start]..bounds[end]].to_string();
        let shared = if pieces.is_empty() {
            String::new()
        } else {
            text[bounds[start]..bounds[start + overlap]].to_string()
        };
        pieces.push((content, shared));

        if end == char_count {
            break;
        }
        start = end - overlap;
    }

    pieces
}

/// Latest separator end in `[min_end, max_end]` (char positions), by separator priority
#[expect(
    clippy::string_slice,
    reason = "all offsets are taken from char_indices"
)]
fn find_break(text: &str, bounds: &[usize], min_end: usize, max_end: usize) -> Option<usize> {
    if min_end > max_end {
        return None;
    }

    let window_start = bounds[min_end.saturating_sub(1)];
    let window = &text[window_start..bounds[max_end]];

    BREAK_SEPARATORS.iter().find_map(|separator| {
        window
            .rfind(separator)
            .map(|position| window_start + position + separator.len())
            .and_then(|byte_end| bounds.binary_search(&byte_end).ok())
            .filter(|&end| end >= min_end && end <= max_end)
    })
}
