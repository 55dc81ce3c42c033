//! The story pipeline: one PDF in, one story directory out.
//!
//! [`StoryPipeline`] owns the validated config and the resolved image
//! provider. Build it once at process start and share it; every call to
//! [`StoryPipeline::run`] is independent and touches no shared mutable state.

use crate::config::{FailurePolicy, PipelineConfig};
use crate::error::{Pdf2BrollError, SegmentError};
use crate::output::{AssetResult, DocumentInspection, StoryOutput, StorySegment, StoryStats};
use crate::pipeline::input::{self, UploadedPdf};
use crate::pipeline::store::StoryDir;
use crate::pipeline::{extract, imagegen, segment};
use crate::provider::{resolve_provider, ImageProvider};
use futures::stream::{self, StreamExt};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Upload-to-b-roll handler.
///
/// # Example
/// ```rust,no_run
/// use pdf2broll::{PipelineConfig, StoryPipeline};
/// use std::path::Path;
/// use tokio_util::sync::CancellationToken;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// // Provider auto-detected from HUGGING_FACE_TOKEN / OPENAI_API_KEY
/// let pipeline = StoryPipeline::new(PipelineConfig::default())?;
/// let story = pipeline
///     .run_file(Path::new("story.pdf"), &CancellationToken::new())
///     .await?;
/// for path in story.generated_images() {
///     println!("{}", path.display());
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct StoryPipeline {
    config: Arc<PipelineConfig>,
    provider: Arc<dyn ImageProvider>,
}

impl std::fmt::Debug for StoryPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoryPipeline")
            .field("config", &self.config)
            .field("provider", &self.provider.name())
            .finish()
    }
}

impl StoryPipeline {
    /// Resolve the image provider and freeze the config.
    pub fn new(config: PipelineConfig) -> Result<Self, Pdf2BrollError> {
        let provider = resolve_provider(&config)?;
        info!("Image provider: {}", provider.name());
        Ok(Self {
            config: Arc::new(config),
            provider,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Run the pipeline on an in-memory upload.
    pub async fn run_bytes(
        &self,
        file_name: &str,
        bytes: &[u8],
        cancel: &CancellationToken,
    ) -> Result<StoryOutput, Pdf2BrollError> {
        let upload = UploadedPdf::from_bytes(file_name, bytes, &self.config).await?;
        self.run(upload, cancel).await
    }

    /// Run the pipeline on a PDF on disk. The file itself is left untouched.
    pub async fn run_file(
        &self,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Result<StoryOutput, Pdf2BrollError> {
        let upload = UploadedPdf::from_path(path, &self.config).await?;
        self.run(upload, cancel).await
    }

    /// Turn a spooled upload into a story directory.
    ///
    /// # Errors
    /// Returns `Err(Pdf2BrollError)` only for fatal errors:
    /// - text extraction failed
    /// - the story directory or a segment file could not be written
    /// - `cancel` fired
    /// - no image at all was generated
    ///
    /// Individual segment failures are reported in [`StoryOutput::assets`].
    pub async fn run(
        &self,
        upload: UploadedPdf,
        cancel: &CancellationToken,
    ) -> Result<StoryOutput, Pdf2BrollError> {
        let total_start = Instant::now();
        let config = &self.config;
        let file_name = upload.file_name().to_string();
        let upload_bytes = upload.len();
        info!("Processing '{}' ({} bytes)", file_name, upload_bytes);

        // ── Step 1: Extract and chunk text ───────────────────────────────
        let extract_start = Instant::now();
        let document = extract::extract_document(upload, &config.splitter)
            .await
            .map_err(|e| {
                warn!("Extraction failed for '{}': {}", file_name, e);
                Pdf2BrollError::ExtractionFailed { source: e }
            })?;
        let extract_duration_ms = extract_start.elapsed().as_millis() as u64;
        info!(
            "Extracted {} pages, {} chunks in {}ms",
            document.page_count, document.chunk_count, extract_duration_ms
        );

        if cancel.is_cancelled() {
            return Err(Pdf2BrollError::Cancelled);
        }

        // ── Step 2: Segment and persist text ─────────────────────────────
        let parts = segment::partition(&document.text, &config.segmentation);
        let story_dir = StoryDir::create(&config.stories_dir).await?;
        let segments = story_dir.write_segments(&parts).await?;
        info!(
            "Story {}: {} segments in {}",
            story_dir.id,
            segments.len(),
            story_dir.path.display()
        );

        // ── Step 3: Generate one image per segment ───────────────────────
        let total = segments.len();
        if let Some(ref cb) = config.progress_callback {
            cb.on_story_start(total);
        }

        let gen_start = Instant::now();
        let assets = self.generate_assets(&story_dir, &segments, cancel).await;
        let generation_duration_ms = gen_start.elapsed().as_millis() as u64;

        let generated = assets.iter().filter(|a| a.is_success()).count();
        if let Some(ref cb) = config.progress_callback {
            cb.on_story_complete(total, generated);
        }

        if cancel.is_cancelled() {
            warn!(
                "Story {} cancelled after {} images",
                story_dir.id, generated
            );
            return Err(Pdf2BrollError::Cancelled);
        }

        // ── Step 4: Assemble output ──────────────────────────────────────
        if generated == 0 {
            let first_error = assets
                .iter()
                .find_map(|a| a.error.as_ref())
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no text segments to illustrate".to_string());
            warn!(
                "Story {}: no images generated: {}",
                story_dir.id, first_error
            );
            return Err(Pdf2BrollError::NoAssetsGenerated { total, first_error });
        }

        let stats = StoryStats {
            segments: total,
            generated,
            failed: total - generated,
            upload_bytes,
            extract_duration_ms,
            generation_duration_ms,
            total_duration_ms: total_start.elapsed().as_millis() as u64,
        };

        info!(
            "Story {} complete: {}/{} images, {}ms total",
            story_dir.id, generated, total, stats.total_duration_ms
        );

        Ok(StoryOutput {
            id: story_dir.id,
            page_count: document.page_count,
            story_dir: story_dir.path,
            segments,
            assets,
            stats,
        })
    }

    /// Fan out one provider call per segment, bounded by `concurrency`, and
    /// wait for all of them.
    async fn generate_assets(
        &self,
        dir: &StoryDir,
        segments: &[StorySegment],
        cancel: &CancellationToken,
    ) -> Vec<AssetResult> {
        let config = self.config.as_ref();
        let total = segments.len();
        let batch = cancel.child_token();

        let futures: Vec<_> = segments
            .iter()
            .map(|segment| {
                let batch = batch.clone();
                let provider = Arc::clone(&self.provider);
                let fut: std::pin::Pin<
                    Box<dyn std::future::Future<Output = AssetResult> + Send + '_>,
                > = Box::pin(async move {
                    let start = Instant::now();
                    if let Some(ref cb) = config.progress_callback {
                        cb.on_asset_start(segment.index, total);
                    }

                    let outcome =
                        match imagegen::generate_image(&provider, segment, config, &batch).await {
                            Ok(image) => match dir.write_asset(segment.index, &image.bytes).await {
                                Ok(path) => Ok((path, image)),
                                Err(e) => Err(SegmentError::WriteFailed {
                                    segment: segment.index,
                                    detail: e.to_string(),
                                }),
                            },
                            Err(e) => Err(e),
                        };

                    let duration_ms = start.elapsed().as_millis() as u64;
                    let result = match outcome {
                        Ok((path, image)) => {
                            debug!("Segment {}: wrote {}", segment.index, path.display());
                            AssetResult {
                                index: segment.index,
                                path: Some(path),
                                bytes: image.bytes.len(),
                                duration_ms,
                                retries: image.retries,
                                error: None,
                            }
                        }
                        Err(e) => {
                            let retries = match e {
                                SegmentError::GenerationFailed { retries, .. } => retries,
                                _ => 0,
                            };
                            AssetResult {
                                index: segment.index,
                                path: None,
                                bytes: 0,
                                duration_ms,
                                retries,
                                error: Some(e),
                            }
                        }
                    };

                    if let Some(ref e) = result.error {
                        if config.failure_policy == FailurePolicy::AbortRemaining
                            && !batch.is_cancelled()
                        {
                            warn!(
                                "Segment {} failed; aborting remaining segments",
                                e.segment()
                            );
                            batch.cancel();
                        }
                    }

                    if let Some(ref cb) = config.progress_callback {
                        match &result.error {
                            None => cb.on_asset_complete(segment.index, total, result.bytes),
                            Some(e) => cb.on_asset_error(segment.index, total, &e.to_string()),
                        }
                    }
                    result
                });
                fut
            })
            .collect();
        let mut results: Vec<AssetResult> = stream::iter(futures)
            .buffer_unordered(config.concurrency)
            .collect()
            .await;

        results.sort_by_key(|a| a.index);
        results
    }
}

/// Extract and segment a local PDF without calling any provider or writing
/// a story directory.
pub async fn inspect(
    path: &Path,
    config: &PipelineConfig,
) -> Result<DocumentInspection, Pdf2BrollError> {
    drop(input::open_local(path).await?);
    let document = extract::extract_path(path, &config.splitter)
        .await
        .map_err(|e| {
            warn!("Extraction failed for '{}': {}", path.display(), e);
            Pdf2BrollError::ExtractionFailed { source: e }
        })?;
    let segments = segment::partition(&document.text, &config.segmentation);
    Ok(DocumentInspection { document, segments })
}
