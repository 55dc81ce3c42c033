//! Image-generation providers.
//!
//! The pipeline talks to an [`ImageProvider`] and never to an HTTP client
//! directly, so tests can swap in a mock and callers can bring their own
//! backend through [`crate::config::PipelineConfigBuilder::provider`].
//!
//! Two HTTP backends ship with the crate:
//!
//! * [`HuggingFaceProvider`]: the serverless inference API. The response
//!   body is the raw image.
//! * [`OpenAiImageProvider`]: `/v1/images/generations` with
//!   `response_format = b64_json`.

use crate::config::{ImageParameters, PipelineConfig};
use crate::error::{Pdf2BrollError, ProviderError};
use async_trait::async_trait;
use base64::Engine;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Base URL of the Hugging Face inference API; the model id is appended.
pub const HUGGING_FACE_MODELS_URL: &str = "https://api-inference.huggingface.co/models";

/// Default Stable Diffusion XL inference endpoint.
pub const HUGGING_FACE_ENDPOINT: &str =
    "https://api-inference.huggingface.co/models/stabilityai/stable-diffusion-xl-base-1.0";

/// OpenAI image generation endpoint.
pub const OPENAI_ENDPOINT: &str = "https://api.openai.com/v1/images/generations";

/// Model used by [`OpenAiImageProvider`] when none is configured.
pub const OPENAI_DEFAULT_MODEL: &str = "dall-e-3";

/// Error bodies are cut to this many chars before they reach logs or clients.
const MAX_ERROR_BODY: usize = 512;

/// One image request: the rendered prompt plus fixed generation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRequest {
    pub prompt: String,
    pub parameters: ImageParameters,
}

/// A backend that turns a prompt into encoded image bytes.
#[async_trait]
pub trait ImageProvider: Send + Sync {
    /// Short name used in logs and error messages.
    fn name(&self) -> &str;

    /// Generate one image. The returned bytes are written to disk as-is.
    async fn generate(&self, request: &ImageRequest) -> Result<Vec<u8>, ProviderError>;
}

// ── Hugging Face ─────────────────────────────────────────────────────────

/// Hugging Face inference API client.
#[derive(Debug, Clone)]
pub struct HuggingFaceProvider {
    client: reqwest::Client,
    endpoint: String,
    token: String,
}

impl HuggingFaceProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: HUGGING_FACE_ENDPOINT.to_string(),
            token: token.into(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Target a hosted model by id, e.g. `stabilityai/sdxl-turbo`.
    pub fn with_model(self, model: &str) -> Self {
        let url = format!(
            "{}/{}",
            HUGGING_FACE_MODELS_URL,
            model.trim().trim_matches('/')
        );
        self.with_endpoint(url)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn into_shared(self) -> Arc<dyn ImageProvider> {
        Arc::new(self)
    }

    /// JSON body in the shape the inference API expects.
    pub fn request_body(request: &ImageRequest) -> serde_json::Value {
        let p = &request.parameters;
        serde_json::json!({
            "inputs": request.prompt,
            "parameters": {
                "negative_prompt": p.negative_prompt,
                "num_inference_steps": p.num_inference_steps,
                "guidance_scale": p.guidance_scale,
                "width": p.width,
                "height": p.height,
            }
        })
    }
}

#[async_trait]
impl ImageProvider for HuggingFaceProvider {
    fn name(&self) -> &str {
        "huggingface"
    }

    async fn generate(&self, request: &ImageRequest) -> Result<Vec<u8>, ProviderError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .json(&Self::request_body(request))
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(status_error(self.name(), status, &body));
        }

        // A 200 with a JSON body is an error payload, not an image.
        let is_json = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/json"));
        if is_json {
            let body = resp.text().await.unwrap_or_default();
            return Err(ProviderError::InvalidResponse(truncate(&body)));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        debug!("huggingface: {} bytes", bytes.len());
        Ok(bytes.to_vec())
    }
}

// ── OpenAI ───────────────────────────────────────────────────────────────

/// OpenAI images API client.
#[derive(Debug, Clone)]
pub struct OpenAiImageProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiImageResponse {
    data: Vec<OpenAiImageData>,
}

#[derive(Debug, Deserialize)]
struct OpenAiImageData {
    b64_json: Option<String>,
}

impl OpenAiImageProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: OPENAI_ENDPOINT.to_string(),
            api_key: api_key.into(),
            model: OPENAI_DEFAULT_MODEL.to_string(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// OpenAI has no negative prompt or step count; only size is carried.
    pub fn request_body(&self, request: &ImageRequest) -> serde_json::Value {
        let p = &request.parameters;
        serde_json::json!({
            "model": self.model,
            "prompt": request.prompt,
            "n": 1,
            "size": format!("{}x{}", p.width, p.height),
            "response_format": "b64_json",
        })
    }

    fn decode(body: &str) -> Result<Vec<u8>, ProviderError> {
        let parsed: OpenAiImageResponse = serde_json::from_str(body)
            .map_err(|e| ProviderError::InvalidResponse(format!("bad JSON: {e}")))?;
        let b64 = parsed
            .data
            .into_iter()
            .next()
            .and_then(|d| d.b64_json)
            .ok_or_else(|| ProviderError::InvalidResponse("no b64_json in response".into()))?;
        base64::engine::general_purpose::STANDARD
            .decode(b64.as_bytes())
            .map_err(|e| ProviderError::InvalidResponse(format!("bad base64: {e}")))
    }
}

#[async_trait]
impl ImageProvider for OpenAiImageProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate(&self, request: &ImageRequest) -> Result<Vec<u8>, ProviderError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(request))
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(status_error(self.name(), status, &body));
        }
        Self::decode(&body)
    }
}

// ── Shared helpers ───────────────────────────────────────────────────────

fn status_error(provider: &str, status: StatusCode, body: &str) -> ProviderError {
    match status.as_u16() {
        401 | 403 => ProviderError::Auth {
            provider: provider.to_string(),
            detail: truncate(body),
        },
        429 => ProviderError::RateLimited {
            provider: provider.to_string(),
        },
        code => ProviderError::Http {
            provider: provider.to_string(),
            status: code,
            body: truncate(body),
        },
    }
}

fn truncate(body: &str) -> String {
    let body = body.trim();
    if body.chars().count() <= MAX_ERROR_BODY {
        body.to_string()
    } else {
        let cut: String = body.chars().take(MAX_ERROR_BODY).collect();
        format!("{cut}…")
    }
}

// ── Resolution ───────────────────────────────────────────────────────────

/// Resolve the image provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Named provider** (`config.provider_name`): `huggingface` (alias
///    `hf`) or `openai`, with its key read from the environment.
/// 3. **`HUGGING_FACE_TOKEN`** set: Hugging Face.
/// 4. **`OPENAI_API_KEY`** set: OpenAI.
///
/// `config.endpoint` and `config.model` apply to whichever HTTP backend is
/// picked in steps 2–4.
pub fn resolve_provider(config: &PipelineConfig) -> Result<Arc<dyn ImageProvider>, Pdf2BrollError> {
    resolve_with(config, |key| std::env::var(key).ok())
}

fn resolve_with(
    config: &PipelineConfig,
    env: impl Fn(&str) -> Option<String>,
) -> Result<Arc<dyn ImageProvider>, Pdf2BrollError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());

    if let Some(ref name) = config.provider_name {
        return match name.to_ascii_lowercase().as_str() {
            "huggingface" | "hf" => {
                let token = env("HUGGING_FACE_TOKEN").ok_or_else(|| {
                    Pdf2BrollError::ProviderNotConfigured {
                        provider: name.clone(),
                        hint: "Set HUGGING_FACE_TOKEN to a Hugging Face access token.".into(),
                    }
                })?;
                Ok(huggingface(token, config).into_shared())
            }
            "openai" => {
                let key = env("OPENAI_API_KEY").ok_or_else(|| {
                    Pdf2BrollError::ProviderNotConfigured {
                        provider: name.clone(),
                        hint: "Set OPENAI_API_KEY.".into(),
                    }
                })?;
                Ok(openai(key, config))
            }
            other => Err(Pdf2BrollError::ProviderNotConfigured {
                provider: other.to_string(),
                hint: "Supported providers: huggingface, openai.".into(),
            }),
        };
    }

    if let Some(token) = env("HUGGING_FACE_TOKEN") {
        return Ok(huggingface(token, config).into_shared());
    }
    if let Some(key) = env("OPENAI_API_KEY") {
        return Ok(openai(key, config));
    }

    Err(Pdf2BrollError::ProviderNotConfigured {
        provider: "auto".to_string(),
        hint: "No image provider could be auto-detected from environment.\n\
               Set HUGGING_FACE_TOKEN or OPENAI_API_KEY, or pass --provider."
            .to_string(),
    })
}

/// An explicit endpoint wins over a model id.
fn huggingface(token: String, config: &PipelineConfig) -> HuggingFaceProvider {
    let p = HuggingFaceProvider::new(token);
    match (&config.endpoint, &config.model) {
        (Some(url), _) => p.with_endpoint(url.clone()),
        (None, Some(model)) => p.with_model(model),
        (None, None) => p,
    }
}

fn openai(key: String, config: &PipelineConfig) -> Arc<dyn ImageProvider> {
    let mut p = OpenAiImageProvider::new(key);
    if let Some(ref url) = config.endpoint {
        p = p.with_endpoint(url.clone());
    }
    if let Some(ref model) = config.model {
        p = p.with_model(model.clone());
    }
    Arc::new(p)
}
