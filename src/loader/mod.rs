
pub mod extractor;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::{RagError, Result};
pub use extractor::DocumentKind;

/// A unit of raw text pulled from a single source file (or a single page of one)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawDocument {
    pub source_path: PathBuf,
    pub text: String,
    pub metadata: DocumentMetadata,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// Zero-based page number for paginated sources
    pub page: Option<u32>,
    /// Identifier of the registered document, if the file is in the catalog
    pub document_id: Option<i64>,
    /// Access category of the registered document
    pub category: Option<String>,
}

impl RawDocument {
    #[inline]
    pub fn new(source_path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        Self {
            source_path: source_path.into(),
            text: text.into(),
            metadata: DocumentMetadata::default(),
        }
    }

    #[inline]
    pub fn with_page(mut self, page: u32) -> Self {
        self.metadata.page = Some(page);
        self
    }

    #[inline]
    pub fn file_name(&self) -> Option<&str> {
        self.source_path.file_name().and_then(|name| name.to_str())
    }
}

/// Load every recognised document in `directory`.
///
/// Entries are visited in file-name order. Files whose extension has no
/// extractor are skipped; subdirectories are not descended into.
#[inline]
pub fn load_documents<P: AsRef<Path>>(directory: P) -> Result<Vec<RawDocument>> {
    let directory = directory.as_ref();
    if !directory.is_dir() {
        return Err(RagError::NotFound(format!(
            "Directory not found: {}",
            directory.display()
        )));
    }

    let mut entries = fs::read_dir(directory)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    entries.sort();

    let mut documents = Vec::new();
    for path in entries {
        if !path.is_file() {
            continue;
        }

        let Some(kind) = DocumentKind::from_path(&path) else {
            debug!("Skipping unsupported file: {}", path.display());
            continue;
        };

        let extracted = kind.extract(&path)?;
        debug!(
            "Extracted {} document(s) from {}",
            extracted.len(),
            path.display()
        );
        documents.extend(extracted);
    }

    info!(
        "Loaded {} documents from {}",
        documents.len(),
        directory.display()
    );
    Ok(documents)
}

/// A registered corpus file with its access category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub document_id: i64,
    pub file_path: String,
    pub category: String,
}

/// Source of document registrations (id and category per corpus file)
#[async_trait]
pub trait DocumentCatalog: Send + Sync {
    async fn entries(&self) -> Result<Vec<CatalogEntry>>;
}

/// Tag documents with the id and category of their catalog registration.
///
/// A registration whose path is a suffix of the document path wins, the
/// longest one first. Otherwise a registration with the same file name is
/// used when it is the only one. Documents with no registration, or several
/// same-named ones, are left untagged.
#[inline]
pub fn attach_catalog(documents: &mut [RawDocument], entries: &[CatalogEntry]) {
    let mut tagged = 0;
    for document in documents.iter_mut() {
        let Some(entry) = match_entry(document, entries) else {
            continue;
        };
        document.metadata.document_id = Some(entry.document_id);
        document.metadata.category = Some(entry.category.clone());
        tagged += 1;
    }

    debug!(
        "Attached catalog metadata to {}/{} documents",
        tagged,
        documents.len()
    );
}

fn match_entry<'a>(
    document: &RawDocument,
    entries: &'a [CatalogEntry],
) -> Option<&'a CatalogEntry> {
    let by_path = entries
        .iter()
        .filter(|entry| !entry.file_path.is_empty())
        .filter(|entry| document.source_path.ends_with(&entry.file_path))
        .max_by_key(|entry| Path::new(&entry.file_path).components().count());
    if by_path.is_some() {
        return by_path;
    }

    let file_name = document.file_name()?;
    let mut same_name = entries.iter().filter(|entry| {
        Path::new(&entry.file_path)
            .file_name()
            .is_some_and(|name| name == file_name)
    });
    let first = same_name.next()?;
    let others: Vec<&str> = same_name.map(|entry| entry.file_path.as_str()).collect();
    if others.is_empty() {
        return Some(first);
    }

    warn!(
        "{} matches several registrations ({}, {}), leaving it uncategorised",
        document.source_path.display(),
        first.file_path,
        others.join(", ")
    );
    None
}
