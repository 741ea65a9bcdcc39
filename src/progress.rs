//! Progress-callback trait for per-page extraction events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to receive
//! events as pages are recognised. Rasterisation happens up front, so the
//! page events cover the recognition stage, which dominates wall-clock time.
//!
//! # Example
//!
//! ```rust
//! use voterroll_extract::{ExtractionProgressCallback, ExtractionConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     lines: AtomicUsize,
//! }
//!
//! impl ExtractionProgressCallback for CountingCallback {
//!     fn on_page_complete(&self, _page_num: usize, _total_pages: usize, line_count: usize) {
//!         self.lines.fetch_add(line_count, Ordering::SeqCst);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { lines: AtomicUsize::new(0) });
//!
//! let config = ExtractionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ExtractionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the extraction pipeline as it processes each page.
///
/// Pages are recognised concurrently, so `on_page_start`,
/// `on_page_complete` and `on_page_error` may be called from different
/// threads in any order. Implementations guard shared state themselves.
/// All methods default to no-ops.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called once after rasterisation, before any page is recognised.
    ///
    /// # Arguments
    /// * `total_pages`: number of pages that will be recognised
    fn on_extraction_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called just before a page is handed to the recognizer.
    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Called when a page is recognised.
    ///
    /// # Arguments
    /// * `page_num`: 1-indexed page number
    /// * `total_pages`: total pages being recognised
    /// * `line_count`: non-empty text lines the engine produced
    fn on_page_complete(&self, page_num: usize, total_pages: usize, line_count: usize) {
        let _ = (page_num, total_pages, line_count);
    }

    /// Called when a page fails to render or recognise.
    fn on_page_error(&self, page_num: usize, total_pages: usize, error: &str) {
        let _ = (page_num, total_pages, error);
    }

    /// Called once after segmentation and validation.
    ///
    /// # Arguments
    /// * `total_pages`: pages attempted
    /// * `record_count`: voter records accepted
    fn on_extraction_complete(&self, total_pages: usize, record_count: usize) {
        let _ = (total_pages, record_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;
