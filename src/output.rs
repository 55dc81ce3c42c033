//! Result types returned by the story pipeline.

use crate::error::SegmentError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Text pulled out of an uploaded PDF.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedDocument {
    /// Splitter chunks joined with `\n`.
    pub text: String,
    /// Number of pages in the source document.
    pub page_count: usize,
    /// Number of chunks the splitter produced.
    pub chunk_count: usize,
}

/// One slice of the extracted text, persisted as `story-{index}.txt`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorySegment {
    /// 1-based ordinal, contiguous across the kept segments.
    pub index: usize,
    pub text: String,
    pub path: PathBuf,
}

/// Outcome of generating one segment's image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetResult {
    /// Ordinal of the [`StorySegment`] this asset illustrates.
    pub index: usize,
    /// Where the image was written; `None` when `error` is set.
    pub path: Option<PathBuf>,
    /// Size of the written image in bytes.
    pub bytes: usize,
    pub duration_ms: u64,
    pub retries: u32,
    pub error: Option<SegmentError>,
}

impl AssetResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.path.is_some()
    }
}

/// Timing and counts for one story.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoryStats {
    pub segments: usize,
    pub generated: usize,
    pub failed: usize,
    pub upload_bytes: u64,
    pub extract_duration_ms: u64,
    pub generation_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Everything produced for one upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoryOutput {
    /// Unique id; also the story directory's name.
    pub id: Uuid,
    /// Page count of the source PDF.
    pub page_count: usize,
    pub story_dir: PathBuf,
    pub segments: Vec<StorySegment>,
    /// One entry per segment, sorted by index.
    pub assets: Vec<AssetResult>,
    pub stats: StoryStats,
}

impl StoryOutput {
    /// Paths of the images that were actually written, in segment order.
    pub fn generated_images(&self) -> Vec<PathBuf> {
        self.assets.iter().filter_map(|a| a.path.clone()).collect()
    }

    /// Errors of the segments that failed, in segment order.
    pub fn failures(&self) -> Vec<&SegmentError> {
        self.assets.iter().filter_map(|a| a.error.as_ref()).collect()
    }
}

/// Result of a dry run: extraction and segmentation without a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentInspection {
    pub document: ExtractedDocument,
    /// Segments as they would be written, in order.
    pub segments: Vec<String>,
}
