//! Document loading for the index build.
//!
//! Walks the documents directory and turns every supported file into plain
//! UTF-8 text. Supported: `.txt` (read as UTF-8) and `.pdf` (text layer via
//! `pdf-extract`). Other files are ignored. A file that fails to extract is
//! logged and skipped so one bad PDF does not abort a build.

use anyhow::{bail, Result};
use std::path::Path;
use walkdir::WalkDir;

/// A loaded document, identified by its path relative to the documents
/// directory (with `/` separators).
#[derive(Debug, Clone, PartialEq)]
pub struct SourceDocument {
    pub source: String,
    pub text: String,
}

#[derive(Debug)]
pub enum ExtractError {
    UnsupportedExtension(String),
    Pdf(String),
    Text(String),
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::UnsupportedExtension(ext) => write!(f, "unsupported file type: {}", ext),
            ExtractError::Pdf(e) => write!(f, "PDF extraction failed: {}", e),
            ExtractError::Text(e) => write!(f, "text file could not be read: {}", e),
        }
    }
}

impl std::error::Error for ExtractError {}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

pub fn is_supported(path: &Path) -> bool {
    matches!(extension(path).as_deref(), Some("txt") | Some("pdf"))
}

/// Extract the text of one file, dispatching on its extension.
pub fn extract_file(path: &Path) -> Result<String, ExtractError> {
    match extension(path).as_deref() {
        Some("txt") => std::fs::read_to_string(path).map_err(|e| ExtractError::Text(e.to_string())),
        Some("pdf") => {
            let bytes = std::fs::read(path).map_err(|e| ExtractError::Pdf(e.to_string()))?;
            extract_pdf(&bytes)
        }
        other => Err(ExtractError::UnsupportedExtension(
            other.unwrap_or("<none>").to_string(),
        )),
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

/// Load every supported document under `root`, sorted by source.
pub fn load_documents(root: &Path) -> Result<Vec<SourceDocument>> {
    if !root.is_dir() {
        bail!("Documents directory does not exist: {}", root.display());
    }

    let mut documents = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() || !is_supported(entry.path()) {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let source = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        match extract_file(path) {
            Ok(text) => documents.push(SourceDocument { source, text }),
            Err(e) => log::warn!("skipping {}: {}", source, e),
        }
    }
    Ok(documents)
}
