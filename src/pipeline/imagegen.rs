//! Image generation for one story segment.
//!
//! This module turns a segment into an [`ImageRequest`] and drives the
//! provider call. Prompt wording lives in [`crate::prompts`]; this file owns
//! timeout, retry and cancellation.
//!
//! ## Retry Strategy
//!
//! Retries are off by default (`max_retries = 0`). When enabled, the wait
//! before attempt `n` is `retry_backoff_ms * 2^(n-1)`: with a 500 ms base and
//! 3 retries that is 500 ms → 1 s → 2 s. Authentication failures are never
//! retried.

use crate::config::PipelineConfig;
use crate::error::{ProviderError, SegmentError};
use crate::output::StorySegment;
use crate::prompts::image_prompt;
use crate::provider::{ImageProvider, ImageRequest};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Bytes returned by the provider plus the number of retries it took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub retries: u32,
}

enum AttemptFailure {
    Provider(ProviderError),
    Timeout,
}

/// Build the request for one segment from the configured template and
/// parameters.
pub fn build_request(segment_text: &str, config: &PipelineConfig) -> ImageRequest {
    ImageRequest {
        prompt: image_prompt(config.prompt_template.as_deref(), segment_text),
        parameters: config.image.clone(),
    }
}

/// Generate the image for `segment`.
///
/// Every attempt runs under `api_timeout_secs`; the whole sequence, backoff
/// sleeps included, stops as soon as `cancel` fires.
pub async fn generate_image(
    provider: &Arc<dyn ImageProvider>,
    segment: &StorySegment,
    config: &PipelineConfig,
    cancel: &CancellationToken,
) -> Result<GeneratedImage, SegmentError> {
    let start = Instant::now();
    let request = build_request(&segment.text, config);
    let call_timeout = Duration::from_secs(config.api_timeout_secs);
    let mut last_failure: Option<AttemptFailure> = None;
    let mut attempts_made = 0u32;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let backoff = config.retry_backoff_ms * 2u64.pow(attempt - 1);
            warn!(
                "Segment {}: retry {}/{} after {}ms",
                segment.index, attempt, config.max_retries, backoff
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(SegmentError::Cancelled { segment: segment.index });
                }
                _ = sleep(Duration::from_millis(backoff)) => {}
            }
        }

        attempts_made = attempt;
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(SegmentError::Cancelled { segment: segment.index });
            }
            r = timeout(call_timeout, provider.generate(&request)) => r,
        };

        match outcome {
            Ok(Ok(bytes)) if !bytes.is_empty() => {
                debug!(
                    "Segment {}: {} bytes from {} in {:?}",
                    segment.index,
                    bytes.len(),
                    provider.name(),
                    start.elapsed()
                );
                return Ok(GeneratedImage {
                    bytes,
                    retries: attempt,
                });
            }
            Ok(Ok(_)) => {
                warn!("Segment {}: attempt {} returned no bytes", segment.index, attempt + 1);
                last_failure = Some(AttemptFailure::Provider(ProviderError::InvalidResponse(
                    "empty image body".into(),
                )));
            }
            Ok(Err(e)) => {
                warn!("Segment {}: attempt {} failed: {}", segment.index, attempt + 1, e);
                let fatal = matches!(e, ProviderError::Auth { .. });
                last_failure = Some(AttemptFailure::Provider(e));
                if fatal {
                    break;
                }
            }
            Err(_) => {
                warn!(
                    "Segment {}: attempt {} timed out after {}s",
                    segment.index,
                    attempt + 1,
                    config.api_timeout_secs
                );
                last_failure = Some(AttemptFailure::Timeout);
            }
        }
    }

    Err(match last_failure {
        Some(AttemptFailure::Timeout) => SegmentError::Timeout {
            segment: segment.index,
            secs: config.api_timeout_secs,
        },
        Some(AttemptFailure::Provider(e)) => SegmentError::GenerationFailed {
            segment: segment.index,
            retries: attempts_made,
            detail: e.to_string(),
        },
        None => SegmentError::GenerationFailed {
            segment: segment.index,
            retries: attempts_made,
            detail: "Unknown error".to_string(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Scripted {
        calls: AtomicUsize,
        succeed_on: Option<usize>,
        error: ProviderError,
    }

    impl Scripted {
        fn failing(error: ProviderError) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                succeed_on: None,
                error,
            }
        }
    }

    #[async_trait]
    impl ImageProvider for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }
        async fn generate(&self, _request: &ImageRequest) -> Result<Vec<u8>, ProviderError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if Some(n) == self.succeed_on {
                Ok(b"\x89PNG\r\n\x1a\n".to_vec())
            } else {
                Err(self.error.clone())
            }
        }
    }

    struct Stalled;

    #[async_trait]
    impl ImageProvider for Stalled {
        fn name(&self) -> &str {
            "stalled"
        }
        async fn generate(&self, _request: &ImageRequest) -> Result<Vec<u8>, ProviderError> {
            sleep(Duration::from_secs(3600)).await;
            Ok(vec![1])
        }
    }

    fn segment() -> StorySegment {
        StorySegment {
            index: 2,
            text: "The storm rolled in.".into(),
            path: PathBuf::from("story-2.txt"),
        }
    }

    fn http_503() -> ProviderError {
        ProviderError::Http {
            provider: "scripted".into(),
            status: 503,
            body: "loading".into(),
        }
    }

    #[test]
    fn request_uses_template_and_parameters() {
        let config = PipelineConfig::builder()
            .prompt_template("Watercolour of: {text}")
            .build()
            .unwrap();
        let req = build_request("  a quiet harbour  ", &config);
        assert_eq!(req.prompt, "Watercolour of: a quiet harbour");
        assert_eq!(req.parameters.num_inference_steps, 50);
    }

    #[tokio::test]
    async fn no_retry_by_default() {
        let scripted = Arc::new(Scripted::failing(http_503()));
        let provider: Arc<dyn ImageProvider> = scripted.clone();
        let config = PipelineConfig::default();

        let err = generate_image(&provider, &segment(), &config, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(scripted.calls.load(Ordering::SeqCst), 1);
        match err {
            SegmentError::GenerationFailed { segment, retries, detail } => {
                assert_eq!(segment, 2);
                assert_eq!(retries, 0);
                assert!(detail.contains("503"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn retries_k_plus_one_calls() {
        let scripted = Arc::new(Scripted::failing(http_503()));
        let provider: Arc<dyn ImageProvider> = scripted.clone();
        let config = PipelineConfig::builder()
            .max_retries(3)
            .retry_backoff_ms(1)
            .build()
            .unwrap();

        let err = generate_image(&provider, &segment(), &config, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(scripted.calls.load(Ordering::SeqCst), 4);
        assert!(matches!(err, SegmentError::GenerationFailed { retries: 3, .. }));
    }

    #[tokio::test]
    async fn succeeds_after_a_retry() {
        let scripted = Arc::new(Scripted {
            calls: AtomicUsize::new(0),
            succeed_on: Some(2),
            error: http_503(),
        });
        let provider: Arc<dyn ImageProvider> = scripted.clone();
        let config = PipelineConfig::builder()
            .max_retries(2)
            .retry_backoff_ms(1)
            .build()
            .unwrap();

        let image = generate_image(&provider, &segment(), &config, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(image.retries, 1);
        assert!(image.bytes.starts_with(b"\x89PNG"));
    }

    #[tokio::test]
    async fn auth_failure_is_not_retried() {
        let scripted = Arc::new(Scripted::failing(ProviderError::Auth {
            provider: "scripted".into(),
            detail: "invalid token".into(),
        }));
        let provider: Arc<dyn ImageProvider> = scripted.clone();
        let config = PipelineConfig::builder()
            .max_retries(5)
            .retry_backoff_ms(1)
            .build()
            .unwrap();

        generate_image(&provider, &segment(), &config, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(scripted.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn slow_call_times_out() {
        let provider: Arc<dyn ImageProvider> = Arc::new(Stalled);
        let config = PipelineConfig::builder().api_timeout_secs(1).build().unwrap();

        let err = generate_image(&provider, &segment(), &config, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SegmentError::Timeout { segment: 2, secs: 1 }));
    }

    #[tokio::test]
    async fn cancellation_stops_the_call() {
        let provider: Arc<dyn ImageProvider> = Arc::new(Stalled);
        let config = PipelineConfig::default();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = generate_image(&provider, &segment(), &config, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, SegmentError::Cancelled { segment: 2 }));
    }
}
