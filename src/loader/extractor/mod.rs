
use std::fs;
use std::path::Path;
use std::process::Command;
use tracing::{debug, warn};

use super::RawDocument;
use crate::{RagError, Result};

/// Page separator emitted by `pdftotext`
const PAGE_BREAK: char = '\u{c}';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    PlainText,
    Pdf,
}

impl DocumentKind {
    /// Pick an extractor from the file extension (case-insensitive)
    #[inline]
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "txt" => Some(Self::PlainText),
            "pdf" => Some(Self::Pdf),
            _ => None,
        }
    }

    #[inline]
    pub fn extract(self, path: &Path) -> Result<Vec<RawDocument>> {
        match self {
            Self::PlainText => extract_text(path),
            Self::Pdf => extract_pdf(path),
        }
    }
}

fn extract_text(path: &Path) -> Result<Vec<RawDocument>> {
    let bytes = fs::read(path)?;
    let text = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => {
            warn!(
                "{} is not valid UTF-8, replacing invalid sequences",
                path.display()
            );
            String::from_utf8_lossy(e.as_bytes()).into_owned()
        }
    };

    Ok(vec![RawDocument::new(path, text)])
}

fn extract_pdf(path: &Path) -> Result<Vec<RawDocument>> {
    debug!("Extracting PDF text from {} using pdftotext", path.display());

    let output = Command::new("pdftotext")
        .args(["-enc", "UTF-8"])
        .arg(path)
        .arg("-")
        .output()
        .map_err(|e| {
            RagError::Extraction(format!(
                "Failed to run pdftotext on {}: {} (is poppler installed?)",
                path.display(),
                e
            ))
        })?;

    if !output.status.success() {
        return Err(RagError::Extraction(format!(
            "pdftotext failed on {}: {}",
            path.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let text = String::from_utf8_lossy(&output.stdout);
    Ok(split_pages(path, &text))
}

/// One document per page, numbered from zero
pub(crate) fn split_pages(path: &Path, text: &str) -> Vec<RawDocument> {
    let mut pages: Vec<&str> = text.split(PAGE_BREAK).collect();
    // pdftotext terminates the last page with a page break as well
    if pages.len() > 1 && pages.last().is_some_and(|page| page.trim().is_empty()) {
        pages.pop();
    }

    pages
        .into_iter()
        .zip(0u32..)
        .map(|(page_text, page)| RawDocument::new(path, page_text).with_page(page))
        .collect()
}
