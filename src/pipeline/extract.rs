//! PDF text extraction via lopdf.
//!
//! lopdf parses synchronously, so the load runs on the blocking pool. The
//! [`UploadedPdf`] is moved into that task and dropped there, which deletes
//! the temp file whether the parse succeeded, failed or panicked.

use crate::config::SplitterConfig;
use crate::error::ExtractError;
use crate::output::ExtractedDocument;
use crate::pipeline::input::UploadedPdf;
use crate::pipeline::split::split_text;
use lopdf::Document;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Raw text and page count read from one PDF, before splitting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawText {
    pub text: String,
    pub page_count: usize,
}

/// Extract, split and rejoin the text of an upload, consuming it.
pub async fn extract_document(
    upload: UploadedPdf,
    splitter: &SplitterConfig,
) -> Result<ExtractedDocument, ExtractError> {
    let raw = tokio::task::spawn_blocking(move || {
        let result = read_pdf(upload.path());
        drop(upload);
        result
    })
    .await
    .map_err(|e| ExtractError::Task(e.to_string()))??;

    Ok(chunk_document(raw, splitter))
}

/// Extract, split and rejoin the text of a PDF on disk, leaving the file alone.
pub async fn extract_path(
    path: &Path,
    splitter: &SplitterConfig,
) -> Result<ExtractedDocument, ExtractError> {
    let path: PathBuf = path.to_path_buf();
    let raw = tokio::task::spawn_blocking(move || read_pdf(&path))
        .await
        .map_err(|e| ExtractError::Task(e.to_string()))??;

    Ok(chunk_document(raw, splitter))
}

/// Load a PDF and read the text of every page in order.
///
/// A page whose content stream cannot be decoded is skipped with a warning;
/// only a document where every page fails is an error.
pub fn read_pdf(path: &Path) -> Result<RawText, ExtractError> {
    let doc = Document::load(path).map_err(|e| ExtractError::Load(e.to_string()))?;

    let pages: Vec<u32> = doc.get_pages().keys().copied().collect();
    if pages.is_empty() {
        return Err(ExtractError::NoPages);
    }

    let mut texts = Vec::with_capacity(pages.len());
    let mut last_err = None;
    for &page in &pages {
        match doc.extract_text(&[page]) {
            Ok(t) => texts.push(t),
            Err(e) => {
                warn!("Page {}: text extraction failed: {}", page, e);
                last_err = Some(e.to_string());
            }
        }
    }

    if texts.is_empty() {
        return Err(ExtractError::Text(
            last_err.unwrap_or_else(|| "no readable pages".to_string()),
        ));
    }

    debug!(
        "Read {} of {} pages from {}",
        texts.len(),
        pages.len(),
        path.display()
    );

    Ok(RawText {
        text: texts.join("\n"),
        page_count: pages.len(),
    })
}

fn chunk_document(raw: RawText, splitter: &SplitterConfig) -> ExtractedDocument {
    let chunks = split_text(&raw.text, splitter);
    debug!(
        "Split {} chars into {} chunks",
        raw.text.chars().count(),
        chunks.len()
    );
    ExtractedDocument {
        chunk_count: chunks.len(),
        text: chunks.join("\n"),
        page_count: raw.page_count,
    }
}
