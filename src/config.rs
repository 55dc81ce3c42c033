//! Configuration types for story generation.
//!
//! All pipeline behaviour is controlled through [`PipelineConfig`], built via
//! its [`PipelineConfigBuilder`]. The config is constructed once at process
//! start and handed to [`crate::StoryPipeline::new`]; nothing in the library
//! reads provider credentials or directories at module load.
//!
//! [`ServerConfig`] holds the few knobs that only matter to the HTTP service.

use crate::error::Pdf2BrollError;
use crate::progress::ProgressCallback;
use crate::provider::ImageProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Configuration for turning one PDF into a story directory.
///
/// Built via [`PipelineConfig::builder()`] or using
/// [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use pdf2broll::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .concurrency(3)
///     .api_timeout_secs(60)
///     .stories_dir("out/stories")
///     .build()
///     .unwrap();
/// assert_eq!(config.segmentation.segment_count, 5);
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Segmentation policy. Default: 5 newline-bounded, ceiling-divided parts.
    pub segmentation: SegmentationPolicy,

    /// Recursive splitter settings used right after extraction.
    pub splitter: SplitterConfig,

    /// Fixed generation parameters sent with every image request.
    pub image: ImageParameters,

    /// Prompt template; `{text}` is replaced by the segment text.
    /// If None, uses [`crate::prompts::DEFAULT_IMAGE_PROMPT`].
    pub prompt_template: Option<String>,

    /// Number of concurrent image-generation calls. Default: 5.
    ///
    /// With the default fan-out of five this issues every call at once.
    /// Lower it if the provider answers with `429`.
    pub concurrency: usize,

    /// Per-call timeout in seconds. Default: 120.
    ///
    /// Diffusion endpoints on shared inference hardware routinely take
    /// 20–60 s per 1024×1024 image and longer while a cold model loads.
    pub api_timeout_secs: u64,

    /// Retry attempts per segment on provider failure. Default: 0.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (doubles per attempt). Default: 500.
    pub retry_backoff_ms: u64,

    /// What to do with the rest of the batch when one segment fails.
    pub failure_policy: FailurePolicy,

    /// Root under which one `{uuid}` directory per story is created.
    /// Default: `stories`.
    pub stories_dir: PathBuf,

    /// Directory holding the scoped temp copy of each upload.
    /// Default: `extracted_texts`.
    pub scratch_dir: PathBuf,

    /// Maximum accepted upload size in bytes. Default: 50 MiB.
    pub max_upload_bytes: usize,

    /// Provider name (`huggingface`, `openai`). If None along with
    /// `provider`, the provider is auto-detected from the environment.
    pub provider_name: Option<String>,

    /// Model identifier passed to the provider, e.g. `dall-e-3`.
    pub model: Option<String>,

    /// Endpoint override, e.g. a self-hosted inference URL.
    pub endpoint: Option<String>,

    /// Pre-constructed provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn ImageProvider>>,

    /// Optional per-segment progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            segmentation: SegmentationPolicy::default(),
            splitter: SplitterConfig::default(),
            image: ImageParameters::default(),
            prompt_template: None,
            concurrency: 5,
            api_timeout_secs: 120,
            max_retries: 0,
            retry_backoff_ms: 500,
            failure_policy: FailurePolicy::default(),
            stories_dir: PathBuf::from("stories"),
            scratch_dir: PathBuf::from("extracted_texts"),
            max_upload_bytes: 50 * 1024 * 1024,
            provider_name: None,
            model: None,
            endpoint: None,
            provider: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("segmentation", &self.segmentation)
            .field("splitter", &self.splitter)
            .field("image", &self.image)
            .field("concurrency", &self.concurrency)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("failure_policy", &self.failure_policy)
            .field("stories_dir", &self.stories_dir)
            .field("scratch_dir", &self.scratch_dir)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("provider_name", &self.provider_name)
            .field("model", &self.model)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn ImageProvider>"))
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`PipelineConfig`].
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl fmt::Debug for PipelineConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl PipelineConfigBuilder {
    pub fn segment_count(mut self, n: usize) -> Self {
        self.config.segmentation.segment_count = n;
        self
    }

    pub fn splitter(mut self, splitter: SplitterConfig) -> Self {
        self.config.splitter = splitter;
        self
    }

    pub fn image(mut self, params: ImageParameters) -> Self {
        self.config.image = params;
        self
    }

    pub fn prompt_template(mut self, template: impl Into<String>) -> Self {
        self.config.prompt_template = Some(template.into());
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs.max(1);
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.config.failure_policy = policy;
        self
    }

    pub fn stories_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.stories_dir = dir.into();
        self
    }

    pub fn scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.scratch_dir = dir.into();
        self
    }

    pub fn max_upload_bytes(mut self, n: usize) -> Self {
        self.config.max_upload_bytes = n;
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.endpoint = Some(url.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn ImageProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, Pdf2BrollError> {
        let c = &self.config;
        if c.segmentation.segment_count == 0 {
            return Err(Pdf2BrollError::InvalidConfig(
                "Segment count must be ≥ 1".into(),
            ));
        }
        if c.concurrency == 0 {
            return Err(Pdf2BrollError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if c.max_upload_bytes == 0 {
            return Err(Pdf2BrollError::InvalidConfig(
                "Upload limit must be ≥ 1 byte".into(),
            ));
        }
        if c.splitter.separator.is_empty() {
            return Err(Pdf2BrollError::InvalidConfig(
                "Splitter separator must not be empty".into(),
            ));
        }
        if c.splitter.chunk_overlap >= c.splitter.chunk_size {
            return Err(Pdf2BrollError::InvalidConfig(format!(
                "Chunk overlap ({}) must be smaller than chunk size ({})",
                c.splitter.chunk_overlap, c.splitter.chunk_size
            )));
        }
        if let Some(ref t) = c.prompt_template {
            if !t.contains("{text}") {
                return Err(Pdf2BrollError::InvalidConfig(
                    "Prompt template must contain a {text} placeholder".into(),
                ));
            }
        }
        Ok(self.config)
    }
}

// ── Policies and parameters ──────────────────────────────────────────────

/// How extracted text is partitioned into story segments.
///
/// Lines are taken as runs separated by one or more newlines; each segment
/// receives `ceil(lines / segment_count)` consecutive lines. Trailing
/// segments may come out empty for short documents and are dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentationPolicy {
    /// Fixed fan-out. Default: 5.
    pub segment_count: usize,
}

impl Default for SegmentationPolicy {
    fn default() -> Self {
        Self { segment_count: 5 }
    }
}

/// Settings for the recursive character splitter run after extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitterConfig {
    /// Single separator. Default: `". \n"`.
    pub separator: String,
    /// Target chunk length in characters. Default: 1000.
    pub chunk_size: usize,
    /// Characters carried over between neighbouring chunks. Default: 200.
    pub chunk_overlap: usize,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            separator: ". \n".to_string(),
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

/// Generation parameters sent with every image request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageParameters {
    pub negative_prompt: String,
    pub num_inference_steps: u32,
    pub guidance_scale: f32,
    pub width: u32,
    pub height: u32,
}

impl Default for ImageParameters {
    fn default() -> Self {
        Self {
            negative_prompt: crate::prompts::DEFAULT_NEGATIVE_PROMPT.to_string(),
            num_inference_steps: 50,
            guidance_scale: 7.5,
            width: 1024,
            height: 1024,
        }
    }
}

/// Behaviour of the per-segment fan-out when one call fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FailurePolicy {
    /// Record the failure on that segment and let the others finish. (default)
    #[default]
    Isolate,
    /// Cancel the calls still in flight as soon as one segment fails.
    AbortRemaining,
}

// ── Server ───────────────────────────────────────────────────────────────

/// Settings for the HTTP upload service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address to bind. Default: `0.0.0.0:8001`.
    pub bind: String,
    /// Allowed CORS origin; `*` allows any. Default: `http://localhost:3000`.
    pub cors_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8001".to_string(),
            cors_origin: "http://localhost:3000".to_string(),
        }
    }
}
