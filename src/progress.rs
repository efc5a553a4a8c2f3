//! Progress-callback trait for per-run pipeline events.
//!
//! Attach an [`Arc<dyn PipelineProgress>`] to a
//! [`crate::service::DocumentService`] to receive events as a document moves
//! through rasterisation and extraction. The CLI uses it to drive a terminal
//! progress bar; the HTTP server leaves it at [`NoopProgress`].
//!
//! # Example
//!
//! ```rust
//! use edgequake_doc2text::PipelineProgress;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct CountingProgress {
//!     extracted: AtomicUsize,
//! }
//!
//! impl PipelineProgress for CountingProgress {
//!     fn on_page_extracted(&self, page_num: usize, text_len: usize) {
//!         self.extracted.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("Page {} done ({} bytes)", page_num, text_len);
//!     }
//! }
//! ```

use std::sync::Arc;

/// Called by the pipeline as it works through a document.
///
/// All methods default to no-ops. Extraction runs concurrently, so
/// `on_page_extracted` may be called from several tasks at once and in any
/// page order.
pub trait PipelineProgress: Send + Sync {
    /// Called once per run, before the PDF is rasterised.
    fn on_run_start(&self, name: &str) {
        let _ = name;
    }

    /// Called after each page image has been produced.
    fn on_page_rendered(&self, page_num: usize) {
        let _ = page_num;
    }

    /// Called once before the first page is handed to the extractor.
    ///
    /// Pages are rendered while earlier ones are still being extracted, so the
    /// page count is not known yet; `concurrency` is the ceiling on calls in
    /// flight.
    fn on_extraction_start(&self, concurrency: usize) {
        let _ = concurrency;
    }

    /// Called when text for a page has come back.
    fn on_page_extracted(&self, page_num: usize, text_len: usize) {
        let _ = (page_num, text_len);
    }

    /// Called once after the text has been assembled.
    fn on_run_complete(&self, total_pages: usize) {
        let _ = total_pages;
    }
}

/// Ignores every event.
pub struct NoopProgress;

impl PipelineProgress for NoopProgress {}

/// The shared form stored by the service.
pub type ProgressCallback = Arc<dyn PipelineProgress>;
