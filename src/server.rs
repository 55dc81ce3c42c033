//! HTTP upload service.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/upload` | Multipart upload, field `file`; runs the story pipeline |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! Bad input answers `400 { "error": "<reason>" }`. Any processing failure
//! answers `500 { "error": "Failed to process the PDF", "details": "..." }`.
//! Extraction failures keep `details` generic; the cause is only logged.
//!
//! # Cancellation
//!
//! Each request owns a [`CancellationToken`] behind a drop guard. If the
//! client disconnects, axum drops the handler future, the guard fires and
//! any provider call still in flight is abandoned.

use crate::config::{PipelineConfig, ServerConfig};
use crate::error::Pdf2BrollError;
use crate::generate::StoryPipeline;
use crate::output::StoryOutput;
use crate::pipeline::input::{UploadSink, UploadedPdf};
use axum::{
    extract::{
        multipart::{Multipart, MultipartRejection},
        DefaultBodyLimit, State,
    },
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Success message returned with every completed story.
pub const SUCCESS_MESSAGE: &str =
    "PDF processed, story split, and high-quality images generated successfully.";

/// Top-level error string for every 500.
pub const PROCESSING_FAILED: &str = "Failed to process the PDF";

#[derive(Clone)]
struct AppState {
    pipeline: Arc<StoryPipeline>,
}

/// Build the router. Exposed separately from [`serve`] so tests can drive
/// it without a socket.
pub fn router(pipeline: Arc<StoryPipeline>, config: &ServerConfig) -> Router {
    Router::new()
        .route("/upload", post(handle_upload))
        .route("/health", get(handle_health))
        // The upload cap is enforced while streaming into the temp file.
        .layer(DefaultBodyLimit::disable())
        .layer(cors_layer(&config.cors_origin))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { pipeline })
}

/// Bind and serve until Ctrl-C.
pub async fn serve(pipeline: Arc<StoryPipeline>, config: &ServerConfig) -> std::io::Result<()> {
    let app = router(pipeline, config);
    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Cannot listen for Ctrl-C ({}); graceful shutdown disabled", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received, draining connections");
}

fn cors_layer(origin: &str) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);
    if origin == "*" {
        return base.allow_origin(Any);
    }
    match HeaderValue::from_str(origin) {
        Ok(value) => base.allow_origin(value),
        Err(e) => {
            warn!("Ignoring invalid CORS origin '{}': {}", origin, e);
            base
        }
    }
}

// ============ Responses ============

/// Body of a successful `POST /upload`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub message: String,
    pub extracted_text_id: Uuid,
    #[serde(rename = "number_of_pages")]
    pub number_of_pages: usize,
    /// Story id; the directory name under the stories root.
    pub story_dir: String,
    pub generated_images: Vec<String>,
    pub failed_segments: Vec<FailedSegment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedSegment {
    pub index: usize,
    pub error: String,
}

impl From<&StoryOutput> for UploadResponse {
    fn from(story: &StoryOutput) -> Self {
        Self {
            message: SUCCESS_MESSAGE.to_string(),
            extracted_text_id: story.id,
            number_of_pages: story.page_count,
            story_dir: story.id.to_string(),
            generated_images: story
                .generated_images()
                .iter()
                .map(|p| p.display().to_string())
                .collect(),
            failed_segments: story
                .failures()
                .into_iter()
                .map(|e| FailedSegment {
                    index: e.segment(),
                    error: e.to_string(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Error type that converts into an Axum HTTP response.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl From<Pdf2BrollError> for ApiError {
    fn from(e: Pdf2BrollError) -> Self {
        if e.is_bad_input() {
            warn!("Rejected upload: {}", e);
            return Self {
                status: StatusCode::BAD_REQUEST,
                body: ErrorBody {
                    error: e.to_string(),
                    details: None,
                },
            };
        }

        error!("Upload failed: {}", e);
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: ErrorBody {
                error: PROCESSING_FAILED.to_string(),
                details: Some(e.to_string()),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

// ============ Handlers ============

async fn handle_upload(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut multipart =
        multipart.map_err(|e| Pdf2BrollError::InvalidUpload(e.body_text()))?;

    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let upload = receive_upload(&mut multipart, state.pipeline.config()).await?;
    let story = state.pipeline.run(upload, &cancel).await?;
    Ok(Json(UploadResponse::from(&story)))
}

/// Stream the `file` field into a scoped temp file. Other fields are skipped.
async fn receive_upload(
    multipart: &mut Multipart,
    config: &PipelineConfig,
) -> Result<UploadedPdf, Pdf2BrollError> {
    let invalid = |e: axum::extract::multipart::MultipartError| {
        Pdf2BrollError::InvalidUpload(e.body_text())
    };

    while let Some(mut field) = multipart.next_field().await.map_err(invalid)? {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let mut sink = UploadSink::create(&file_name, config).await?;
        while let Some(chunk) = field.chunk().await.map_err(invalid)? {
            sink.write_chunk(&chunk).await?;
        }
        return sink.finish().await;
    }

    Err(Pdf2BrollError::MissingFile)
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
    version: &'static str,
}

async fn handle_health() -> Json<Health> {
    Json(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
