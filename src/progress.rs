//! Progress-callback trait for per-page extraction events.
//!
//! Inject an [`Arc<dyn ExtractionProgress>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`]. Pages are
//! extracted concurrently, so page events can arrive in any order and from
//! interleaved futures; implementations guard shared state with atomics or
//! a `Mutex`.

use crate::output::CleanupReport;
use std::sync::Arc;

/// Called by the pipeline as it moves through a document.
///
/// Every method has a no-op default.
pub trait ExtractionProgress: Send + Sync {
    /// Pages have been rasterized; `total_pages` extractions are about to start.
    fn on_document_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// The remote call for `page_index` (0-based) is about to be issued.
    fn on_page_start(&self, page_index: usize, total_pages: usize) {
        let _ = (page_index, total_pages);
    }

    /// A page produced `chars` characters of Markdown.
    fn on_page_complete(&self, page_index: usize, total_pages: usize, chars: usize) {
        let _ = (page_index, total_pages, chars);
    }

    /// A page degraded to an empty result.
    fn on_page_error(&self, page_index: usize, total_pages: usize, error: &str) {
        let _ = (page_index, total_pages, error);
    }

    /// Every page has been attempted.
    fn on_document_complete(&self, total_pages: usize, succeeded: usize) {
        let _ = (total_pages, succeeded);
    }

    /// Scratch images and directories have been released.
    fn on_cleanup(&self, report: &CleanupReport) {
        let _ = report;
    }
}

/// The type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgress>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        completes: AtomicUsize,
        errors: AtomicUsize,
    }

    impl ExtractionProgress for Counting {
        fn on_page_complete(&self, _page: usize, _total: usize, _chars: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_page_error(&self, _page: usize, _total: usize, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Silent;

    impl ExtractionProgress for Silent {}

    #[test]
    fn default_methods_accept_every_event() {
        let cb: ProgressCallback = Arc::new(Silent);
        cb.on_document_start(2);
        cb.on_page_start(0, 2);
        cb.on_page_complete(0, 2, 10);
        cb.on_page_error(1, 2, "boom");
        cb.on_document_complete(2, 1);
        cb.on_cleanup(&CleanupReport::default());
    }

    #[test]
    fn overridden_methods_receive_events() {
        let c = Counting::default();
        c.on_page_complete(0, 3, 5);
        c.on_page_complete(1, 3, 5);
        c.on_page_error(2, 3, "timeout");
        assert_eq!(c.completes.load(Ordering::SeqCst), 2);
        assert_eq!(c.errors.load(Ordering::SeqCst), 1);
    }
}
