//! Error types for the pdf2broll library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Pdf2BrollError`]: **Fatal** for one request: the story cannot be
//!   produced at all (no file, not a PDF, extraction failed, every segment
//!   failed). Returned as `Err(Pdf2BrollError)` from
//!   [`crate::StoryPipeline::run`] and friends.
//!
//! * [`SegmentError`]: **Non-fatal**: one segment's image could not be
//!   generated, but the others are fine. Stored inside
//!   [`crate::output::AssetResult`] so callers see partial success instead of
//!   losing four good images to one bad call.
//!
//! [`ProviderError`] and [`ExtractError`] carry the underlying cause of a
//! provider call or a PDF load. They are attached as `source()` and logged,
//! but never shown verbatim to HTTP clients for extraction failures.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the pdf2broll library.
///
/// Segment-level failures use [`SegmentError`] and are stored in
/// [`crate::output::AssetResult`] rather than propagated here.
#[derive(Debug, Error)]
pub enum Pdf2BrollError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The request carried no `file` field (or an empty one).
    #[error("No file part")]
    MissingFile,

    /// The submitted file name does not end in `.pdf`.
    #[error("File is not a PDF")]
    NotAPdf { file_name: String },

    /// The upload exceeded the configured byte cap while streaming.
    #[error("Upload exceeds the {limit} byte limit")]
    UploadTooLarge { limit: usize },

    /// The multipart body could not be parsed.
    #[error("Malformed upload: {0}")]
    InvalidUpload(String),

    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    // ── Extraction errors ─────────────────────────────────────────────────
    /// Loading or reading the PDF failed. The message stays generic; the
    /// cause is available through `source()` and in the logs.
    #[error("Failed to extract text from PDF")]
    ExtractionFailed {
        #[source]
        source: ExtractError,
    },

    // ── Storage errors ────────────────────────────────────────────────────
    /// The per-request story directory could not be created.
    #[error("Failed to create story directory '{path}': {source}")]
    StoryDirFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A segment text file could not be written.
    #[error("Failed to write segment file '{path}': {source}")]
    SegmentWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Provider errors ───────────────────────────────────────────────────
    /// No image provider could be resolved (missing token etc.).
    #[error("Image provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Every segment was attempted and no image came back.
    #[error("No images were generated ({total} segments attempted). First error: {first_error}")]
    NoAssetsGenerated { total: usize, first_error: String },

    /// The request was cancelled (client disconnect, Ctrl-C) before finishing.
    #[error("Story generation was cancelled")]
    Cancelled,

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Pdf2BrollError {
    /// True for errors caused by what the client sent, as opposed to a
    /// processing failure on our side. The HTTP layer maps these to 400.
    pub fn is_bad_input(&self) -> bool {
        matches!(
            self,
            Pdf2BrollError::MissingFile
                | Pdf2BrollError::NotAPdf { .. }
                | Pdf2BrollError::UploadTooLarge { .. }
                | Pdf2BrollError::InvalidUpload(_)
                | Pdf2BrollError::FileNotFound { .. }
                | Pdf2BrollError::PermissionDenied { .. }
        )
    }
}

/// Underlying cause of an extraction failure.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The scoped temp file could not be created or written.
    #[error("temp file I/O: {0}")]
    Io(#[from] std::io::Error),

    /// lopdf rejected the document.
    #[error("PDF load failed: {0}")]
    Load(String),

    /// The document parsed but text extraction failed.
    #[error("text extraction failed: {0}")]
    Text(String),

    /// The document has no pages.
    #[error("PDF has no pages")]
    NoPages,

    /// The blocking extraction task panicked or was cancelled.
    #[error("extraction task failed: {0}")]
    Task(String),
}

/// Failure reported by an [`crate::provider::ImageProvider`].
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum ProviderError {
    /// 401/403 from the provider; retrying will not help.
    #[error("authentication rejected by '{provider}': {detail}")]
    Auth { provider: String, detail: String },

    /// 429 from the provider.
    #[error("rate limited by '{provider}'")]
    RateLimited { provider: String },

    /// Any other non-success status.
    #[error("HTTP {status} from '{provider}': {body}")]
    Http {
        provider: String,
        status: u16,
        body: String,
    },

    /// Connection, TLS or body-read failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The provider answered 2xx but the payload was unusable.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// A non-fatal error for a single segment.
///
/// Stored alongside [`crate::output::AssetResult`] when a segment fails.
/// The story continues unless ALL segments fail.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum SegmentError {
    /// Provider call failed after retries.
    #[error("Segment {segment}: image generation failed after {retries} retries: {detail}")]
    GenerationFailed {
        segment: usize,
        retries: u32,
        detail: String,
    },

    /// Provider call timed out.
    #[error("Segment {segment}: image generation timed out after {secs}s")]
    Timeout { segment: usize, secs: u64 },

    /// The batch was cancelled before this segment finished.
    #[error("Segment {segment}: cancelled")]
    Cancelled { segment: usize },

    /// The image came back but could not be written to the story directory.
    #[error("Segment {segment}: failed to write image: {detail}")]
    WriteFailed { segment: usize, detail: String },
}

impl SegmentError {
    /// The 1-based segment index this error belongs to.
    pub fn segment(&self) -> usize {
        match self {
            SegmentError::GenerationFailed { segment, .. }
            | SegmentError::Timeout { segment, .. }
            | SegmentError::Cancelled { segment }
            | SegmentError::WriteFailed { segment, .. } => *segment,
        }
    }
}
