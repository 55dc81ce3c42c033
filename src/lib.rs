//! # pdf2broll
//!
//! Turn an uploaded PDF story into a directory of illustrative "b-roll"
//! images, one per story segment.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF upload
//!  │
//!  ├─ 1. Input     validate the name, stream bytes into a scoped temp file
//!  ├─ 2. Extract   page count and text via lopdf (spawn_blocking)
//!  ├─ 3. Split     recursive ". \n" chunking, chunks rejoined with "\n"
//!  ├─ 4. Segment   five newline-bounded parts → stories/{uuid}/story-{n}.txt
//!  ├─ 5. Generate  concurrent image calls with timeout and cancellation
//!  └─ 6. Store     stories/{uuid}/b-roll-{n}.png
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf2broll::{PipelineConfig, StoryPipeline};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from HUGGING_FACE_TOKEN / OPENAI_API_KEY
//!     let pipeline = StoryPipeline::new(PipelineConfig::default())?;
//!     let bytes = std::fs::read("story.pdf")?;
//!     let story = pipeline
//!         .run_bytes("story.pdf", &bytes, &CancellationToken::new())
//!         .await?;
//!     eprintln!("{} pages, {} images in {}",
//!         story.page_count,
//!         story.stats.generated,
//!         story.story_dir.display());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2broll` binary (clap + anyhow + tracing-subscriber + indicatif + dotenvy) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! pdf2broll = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod generate;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod provider;
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    FailurePolicy, ImageParameters, PipelineConfig, PipelineConfigBuilder, SegmentationPolicy,
    ServerConfig, SplitterConfig,
};
pub use error::{ExtractError, Pdf2BrollError, ProviderError, SegmentError};
pub use generate::{inspect, StoryPipeline};
pub use output::{
    AssetResult, DocumentInspection, ExtractedDocument, StoryOutput, StorySegment, StoryStats,
};
pub use progress::{ProgressCallback, StoryProgressCallback};
pub use provider::{HuggingFaceProvider, ImageProvider, ImageRequest, OpenAiImageProvider};
