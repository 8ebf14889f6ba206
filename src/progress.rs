//! Progress-callback trait for per-page extraction events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to observe
//! pages as they are sent to the model and come back.
//!
//! # Example
//!
//! ```rust
//! use kyc_ocr_extract::{ExtractionConfig, ExtractionProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct Counter(AtomicUsize);
//!
//! impl ExtractionProgressCallback for Counter {
//!     fn on_page_complete(&self, _page_num: usize, _total: usize, produced_fragment: bool) {
//!         if produced_fragment {
//!             self.0.fetch_add(1, Ordering::SeqCst);
//!         }
//!     }
//! }
//!
//! let config = ExtractionConfig::builder()
//!     .progress_callback(Arc::new(Counter(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the pipeline as it processes each page.
///
/// Pages run concurrently, so `on_page_*` may be called from several tasks
/// at once and in any page order. All methods default to no-ops.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called once, after the page images are known and before any model call.
    fn on_extraction_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called just before the first model request for a page.
    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Called when a page produced a usable answer.
    ///
    /// `produced_fragment` is false for blank pages (empty model answer).
    fn on_page_complete(&self, page_num: usize, total_pages: usize, produced_fragment: bool) {
        let _ = (page_num, total_pages, produced_fragment);
    }

    /// Called when a page failed and will not contribute to the merge.
    fn on_page_error(&self, page_num: usize, total_pages: usize, error: &str) {
        let _ = (page_num, total_pages, error);
    }

    /// Called once after every page has been attempted, before merging.
    ///
    /// `success_count` counts pages that contributed a fragment.
    fn on_extraction_complete(&self, total_pages: usize, success_count: usize) {
        let _ = (total_pages, success_count);
    }
}

/// Used when no callback is configured.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// The type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;
