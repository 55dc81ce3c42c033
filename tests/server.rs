//! HTTP contract tests: the router is driven in-process with
//! `tower::ServiceExt::oneshot`, no socket involved.

mod common;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use common::{file_count, init_tracing, single_story_files, tale_pdf, MockProvider};
use pdf2broll::server::{router, ErrorBody, UploadResponse, PROCESSING_FAILED, SUCCESS_MESSAGE};
use pdf2broll::{PipelineConfig, ServerConfig, StoryPipeline};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

const BOUNDARY: &str = "pdf2brollTestBoundary";

fn app(dir: &Path, provider: Arc<MockProvider>, max_upload_bytes: usize) -> Router {
    init_tracing();
    let config = PipelineConfig::builder()
        .stories_dir(dir.join("stories"))
        .scratch_dir(dir.join("scratch"))
        .provider(provider)
        .max_upload_bytes(max_upload_bytes)
        .build()
        .unwrap();
    let pipeline = StoryPipeline::new(config).unwrap();
    router(Arc::new(pipeline), &ServerConfig::default())
}

/// One multipart part: (field name, optional file name, bytes).
fn multipart_body(parts: &[(&str, Option<&str>, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, file_name, data) in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match file_name {
            Some(f) => body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{name}\"; filename=\"{f}\"\r\n\
                     Content-Type: application/pdf\r\n\r\n"
                )
                .as_bytes(),
            ),
            None => body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
            ),
        }
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn upload_request(body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn send(app: Router, req: Request<Body>) -> (StatusCode, Vec<u8>) {
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, bytes.to_vec())
}

#[tokio::test]
async fn upload_generates_story() {
    let tmp = tempfile::tempdir().unwrap();
    let mock = Arc::new(MockProvider::ok());
    let app = app(tmp.path(), mock.clone(), 1024 * 1024);

    let pdf = tale_pdf();
    let body = multipart_body(&[("file", Some("tale.pdf"), pdf.as_slice())]);
    let (status, bytes) = send(app, upload_request(body)).await;

    assert_eq!(status, StatusCode::OK, "{}", String::from_utf8_lossy(&bytes));
    let resp: UploadResponse = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(resp.message, SUCCESS_MESSAGE);
    assert_eq!(resp.number_of_pages, 2);
    assert_eq!(resp.generated_images.len(), mock.calls());
    assert_eq!(resp.generated_images.len(), 5);
    assert!(resp.failed_segments.is_empty());
    assert_eq!(resp.story_dir, resp.extracted_text_id.to_string());

    let story_dir = tmp.path().join("stories").join(&resp.story_dir);
    assert!(story_dir.join("story-1.txt").exists());
    for image in &resp.generated_images {
        assert!(Path::new(image).starts_with(&story_dir));
        assert!(Path::new(image).exists());
    }
    assert_eq!(file_count(&tmp.path().join("scratch")), 0);
}

#[tokio::test]
async fn json_keys_match_the_client_contract() {
    let tmp = tempfile::tempdir().unwrap();
    let app = app(tmp.path(), Arc::new(MockProvider::ok()), 1024 * 1024);

    let pdf = tale_pdf();
    let body = multipart_body(&[("file", Some("tale.pdf"), pdf.as_slice())]);
    let (status, bytes) = send(app, upload_request(body)).await;
    assert_eq!(status, StatusCode::OK);

    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    for key in [
        "message",
        "extractedTextId",
        "number_of_pages",
        "storyDir",
        "generatedImages",
        "failedSegments",
    ] {
        assert!(json.get(key).is_some(), "missing {key} in {json}");
    }
}

#[tokio::test]
async fn partial_failure_is_reported_but_succeeds() {
    let tmp = tempfile::tempdir().unwrap();
    let mock = Arc::new(MockProvider::failing_on("storm"));
    let app = app(tmp.path(), mock.clone(), 1024 * 1024);

    let pdf = tale_pdf();
    let body = multipart_body(&[("file", Some("tale.pdf"), pdf.as_slice())]);
    let (status, bytes) = send(app, upload_request(body)).await;

    assert_eq!(status, StatusCode::OK);
    let resp: UploadResponse = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(resp.generated_images.len(), 4);
    assert_eq!(resp.failed_segments.len(), 1);
    assert!(resp.failed_segments[0].error.contains("503"));
}

#[tokio::test]
async fn non_pdf_is_400_and_writes_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    let mock = Arc::new(MockProvider::ok());
    let app = app(tmp.path(), mock.clone(), 1024 * 1024);

    let body = multipart_body(&[("file", Some("notes.txt"), b"hello".as_slice())]);
    let (status, bytes) = send(app, upload_request(body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let err: ErrorBody = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(err.error, "File is not a PDF");
    assert!(!tmp.path().join("stories").exists());
    assert!(!tmp.path().join("scratch").exists());
    assert_eq!(mock.calls(), 0);
}

#[tokio::test]
async fn missing_file_field_is_400() {
    let tmp = tempfile::tempdir().unwrap();
    let app = app(tmp.path(), Arc::new(MockProvider::ok()), 1024 * 1024);

    let body = multipart_body(&[("title", None, b"A tale".as_slice())]);
    let (status, bytes) = send(app, upload_request(body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let err: ErrorBody = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(err.error, "No file part");
}

#[tokio::test]
async fn non_multipart_request_is_400() {
    let tmp = tempfile::tempdir().unwrap();
    let app = app(tmp.path(), Arc::new(MockProvider::ok()), 1024 * 1024);

    let req = Request::builder()
        .method(Method::POST)
        .uri("/upload")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))
        .unwrap();
    let (status, bytes) = send(app, req).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let err: ErrorBody = serde_json::from_slice(&bytes).unwrap();
    assert!(err.error.starts_with("Malformed upload"), "got {}", err.error);
}

#[tokio::test]
async fn oversize_upload_is_400() {
    let tmp = tempfile::tempdir().unwrap();
    let app = app(tmp.path(), Arc::new(MockProvider::ok()), 64);

    let pdf = tale_pdf();
    let body = multipart_body(&[("file", Some("tale.pdf"), pdf.as_slice())]);
    let (status, bytes) = send(app, upload_request(body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let err: ErrorBody = serde_json::from_slice(&bytes).unwrap();
    assert!(err.error.contains("64 byte limit"), "got {}", err.error);
    assert_eq!(file_count(&tmp.path().join("scratch")), 0);
}

#[tokio::test]
async fn unreadable_pdf_is_500_with_generic_details() {
    let tmp = tempfile::tempdir().unwrap();
    let app = app(tmp.path(), Arc::new(MockProvider::ok()), 1024 * 1024);

    let body = multipart_body(&[("file", Some("broken.pdf"), b"%PDF-1.7 not really".as_slice())]);
    let (status, bytes) = send(app, upload_request(body)).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let err: ErrorBody = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(err.error, PROCESSING_FAILED);
    assert_eq!(err.details.as_deref(), Some("Failed to extract text from PDF"));
}

#[tokio::test]
async fn all_segments_failing_is_500() {
    let tmp = tempfile::tempdir().unwrap();
    let mock = Arc::new(MockProvider::broken());
    let app = app(tmp.path(), mock.clone(), 1024 * 1024);

    let pdf = tale_pdf();
    let body = multipart_body(&[("file", Some("tale.pdf"), pdf.as_slice())]);
    let (status, bytes) = send(app, upload_request(body)).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let err: ErrorBody = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(err.error, PROCESSING_FAILED);
    let details = err.details.unwrap();
    assert!(details.contains("No images were generated"), "got {details}");
    assert_eq!(mock.calls(), 5);

    let files = single_story_files(&tmp.path().join("stories"));
    assert_eq!(files.len(), 5);
    assert!(files.iter().all(|f| f.starts_with("story-")), "got {files:?}");
    assert!(!files.iter().any(|f| f.starts_with("b-roll-")));
}

#[tokio::test]
async fn dropped_request_abandons_in_flight_calls() {
    let tmp = tempfile::tempdir().unwrap();
    let mock = Arc::new(MockProvider::slow(Duration::from_secs(60)));
    let app = app(tmp.path(), mock.clone(), 1024 * 1024);

    let pdf = tale_pdf();
    let body = multipart_body(&[("file", Some("tale.pdf"), pdf.as_slice())]);
    let request = tokio::spawn(send(app, upload_request(body)));

    tokio::time::timeout(Duration::from_secs(10), async {
        while mock.calls() < 5 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("provider calls never started");

    // Client goes away: the handler future is dropped mid-generation.
    request.abort();
    assert!(request.await.unwrap_err().is_cancelled());

    assert_eq!(mock.abandoned(), 5);
    let files = single_story_files(&tmp.path().join("stories"));
    assert!(!files.iter().any(|f| f.starts_with("b-roll-")), "got {files:?}");
}

#[tokio::test]
async fn health_reports_version() {
    let tmp = tempfile::tempdir().unwrap();
    let app = app(tmp.path(), Arc::new(MockProvider::ok()), 1024);

    let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, bytes) = send(app, req).await;

    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn cors_allows_the_configured_origin_only() {
    let tmp = tempfile::tempdir().unwrap();

    let preflight = |origin: &str| {
        Request::builder()
            .method(Method::OPTIONS)
            .uri("/upload")
            .header(header::ORIGIN, origin)
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .body(Body::empty())
            .unwrap()
    };

    let allowed = app(tmp.path(), Arc::new(MockProvider::ok()), 1024)
        .oneshot(preflight("http://localhost:3000"))
        .await
        .unwrap();
    assert_eq!(
        allowed.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        "http://localhost:3000"
    );

    let denied = app(tmp.path(), Arc::new(MockProvider::ok()), 1024)
        .oneshot(preflight("http://evil.example"))
        .await
        .unwrap();
    assert!(denied
        .headers()
        .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        .is_none());
}
