//! Shared fixtures: lopdf-built PDFs and in-process image providers.
#![allow(dead_code)]

use async_trait::async_trait;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use pdf2broll::{ImageProvider, ImageRequest, PipelineConfig, ProviderError};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

pub const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR\0\0\0\x01\0\0\0\x01";

/// Ten short lines; enough for the default five segments.
pub const TALE: &[&str] = &[
    "A fox lived at the edge of the wood",
    "Every morning she watched the river",
    "One day a heron landed on the bank",
    "The heron spoke of lands beyond the hills",
    "The fox decided to follow the river",
    "A storm broke over the valley that night",
    "She sheltered beneath an old oak",
    "At dawn the water ran gold and calm",
    "The heron was waiting on a stone",
    "Together they walked into the morning",
];

/// Build a PDF with one page per entry, one text object per line.
pub fn pdf_with_pages(pages: &[&[&str]]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for lines in pages {
        let mut operations = Vec::new();
        for (i, line) in lines.iter().enumerate() {
            let y = 760 - 18 * i as i64;
            operations.push(Operation::new("BT", vec![]));
            operations.push(Operation::new("Tf", vec!["F1".into(), 12.into()]));
            operations.push(Operation::new("Td", vec![50.into(), y.into()]));
            operations.push(Operation::new("Tj", vec![Object::string_literal(*line)]));
            operations.push(Operation::new("ET", vec![]));
        }
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf).unwrap();
    buf
}

/// The ten-line tale split over two pages.
pub fn tale_pdf() -> Vec<u8> {
    pdf_with_pages(&[&TALE[..5], &TALE[5..]])
}

/// Route library logs through the test harness; `RUST_LOG=pdf2broll=debug`
/// shows them for a failing test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Config rooted in a temp dir with the given provider.
pub fn config_in(dir: &Path, provider: std::sync::Arc<dyn ImageProvider>) -> PipelineConfig {
    init_tracing();
    PipelineConfig::builder()
        .stories_dir(dir.join("stories"))
        .scratch_dir(dir.join("scratch"))
        .provider(provider)
        .build()
        .unwrap()
}

/// Number of leftover files in a directory (0 if it does not exist).
pub fn file_count(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}

/// File names inside the only story directory under `stories`, sorted.
pub fn single_story_files(stories: &Path) -> Vec<String> {
    let dirs: Vec<_> = std::fs::read_dir(stories)
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(dirs.len(), 1, "expected one story dir, found {dirs:?}");
    let mut names: Vec<String> = std::fs::read_dir(&dirs[0])
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

// ── Providers ────────────────────────────────────────────────────────────

/// Returns a PNG for every prompt, except prompts containing `fail_on`.
#[derive(Default)]
pub struct MockProvider {
    pub calls: AtomicUsize,
    /// Calls whose future was dropped before producing a result.
    pub abandoned: AtomicUsize,
    pub prompts: Mutex<Vec<String>>,
    pub fail_on: Option<String>,
    pub delay: Option<Duration>,
}

impl MockProvider {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn failing_on(marker: &str) -> Self {
        Self {
            fail_on: Some(marker.to_string()),
            ..Self::default()
        }
    }

    /// Fails every call.
    pub fn broken() -> Self {
        Self::failing_on("")
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn abandoned(&self) -> usize {
        self.abandoned.load(Ordering::SeqCst)
    }
}

/// Counts a call as abandoned unless it is disarmed first.
struct InFlight<'a> {
    abandoned: &'a AtomicUsize,
    done: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.abandoned.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl ImageProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(&self, request: &ImageRequest) -> Result<Vec<u8>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(request.prompt.clone());
        let mut in_flight = InFlight {
            abandoned: &self.abandoned,
            done: false,
        };
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        in_flight.done = true;
        match self.fail_on {
            Some(ref marker) if request.prompt.contains(marker.as_str()) => {
                Err(ProviderError::Http {
                    provider: "mock".into(),
                    status: 503,
                    body: "Model is currently loading".into(),
                })
            }
            _ => Ok(PNG_BYTES.to_vec()),
        }
    }
}
