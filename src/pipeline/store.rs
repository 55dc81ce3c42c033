//! Per-request story directory.
//!
//! Every upload gets `{stories_dir}/{uuid}`, holding `story-{n}.txt` for each
//! segment and `b-roll-{n}.{ext}` for each generated image. Directories are
//! never cleaned up by the library.

use crate::error::Pdf2BrollError;
use crate::output::StorySegment;
use image::ImageFormat;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

/// A freshly created, uniquely named story directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoryDir {
    pub id: Uuid,
    pub path: PathBuf,
}

impl StoryDir {
    /// Create `root/{uuid}`. The root is created if missing; the leaf must
    /// not exist yet.
    pub async fn create(root: &Path) -> Result<Self, Pdf2BrollError> {
        Self::create_with_id(root, Uuid::new_v4()).await
    }

    pub(crate) async fn create_with_id(root: &Path, id: Uuid) -> Result<Self, Pdf2BrollError> {
        tokio::fs::create_dir_all(root)
            .await
            .map_err(|e| Pdf2BrollError::StoryDirFailed {
                path: root.to_path_buf(),
                source: e,
            })?;

        let path = root.join(id.to_string());
        tokio::fs::create_dir(&path)
            .await
            .map_err(|e| Pdf2BrollError::StoryDirFailed {
                path: path.clone(),
                source: e,
            })?;

        debug!("Created story directory {}", path.display());
        Ok(Self { id, path })
    }

    /// Write each segment to `story-{n}.txt`, numbering from 1.
    pub async fn write_segments(
        &self,
        segments: &[String],
    ) -> Result<Vec<StorySegment>, Pdf2BrollError> {
        let mut written = Vec::with_capacity(segments.len());
        for (i, text) in segments.iter().enumerate() {
            let index = i + 1;
            let path = self.path.join(format!("story-{index}.txt"));
            tokio::fs::write(&path, text)
                .await
                .map_err(|e| Pdf2BrollError::SegmentWriteFailed {
                    path: path.clone(),
                    source: e,
                })?;
            written.push(StorySegment {
                index,
                text: text.clone(),
                path,
            });
        }
        Ok(written)
    }

    /// Write one generated image as `b-roll-{index}.{ext}`.
    pub async fn write_asset(&self, index: usize, bytes: &[u8]) -> std::io::Result<PathBuf> {
        let path = self
            .path
            .join(format!("b-roll-{index}.{}", image_extension(bytes)));
        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }
}

/// File extension for an image payload, sniffed from its magic bytes.
/// Unknown payloads are saved as `png`.
pub fn image_extension(bytes: &[u8]) -> &'static str {
    match image::guess_format(bytes) {
        Ok(ImageFormat::Png) => "png",
        Ok(ImageFormat::Jpeg) => "jpg",
        Ok(other) => other.extensions_str().first().copied().unwrap_or("png"),
        Err(_) => "png",
    }
}
