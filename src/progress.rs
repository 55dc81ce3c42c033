//! Progress-callback trait for per-segment generation events.
//!
//! Inject an [`Arc<dyn StoryProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to receive
//! events as the pipeline generates each segment's image. The CLI uses this
//! to drive its progress bar; the HTTP service runs without one.
//!
//! # Example
//!
//! ```rust
//! use pdf2broll::{PipelineConfig, StoryProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl StoryProgressCallback for CountingCallback {
//!     fn on_asset_complete(&self, segment: usize, total: usize, bytes: usize) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("segment {segment}/{total}: {bytes} bytes");
//!     }
//! }
//!
//! let config = PipelineConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { completed: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the pipeline as it generates each segment's image.
///
/// Segments are processed concurrently, so `on_asset_*` may be called from
/// several tasks at once. All methods default to no-ops.
pub trait StoryProgressCallback: Send + Sync {
    /// Called once the segments are written and before any provider call.
    fn on_story_start(&self, total_segments: usize) {
        let _ = total_segments;
    }

    /// Called just before the first provider request for a segment.
    fn on_asset_start(&self, segment: usize, total_segments: usize) {
        let _ = (segment, total_segments);
    }

    /// Called when a segment's image has been written.
    fn on_asset_complete(&self, segment: usize, total_segments: usize, bytes: usize) {
        let _ = (segment, total_segments, bytes);
    }

    /// Called when a segment fails for good.
    fn on_asset_error(&self, segment: usize, total_segments: usize, error: &str) {
        let _ = (segment, total_segments, error);
    }

    /// Called once after every segment has been attempted.
    fn on_story_complete(&self, total_segments: usize, success_count: usize) {
        let _ = (total_segments, success_count);
    }
}

/// Type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn StoryProgressCallback>;
