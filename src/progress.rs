//! Progress-callback trait for per-page extraction events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to receive
//! real-time events as the pipeline processes each page.
//!
//! # Why callbacks instead of channels?
//!
//! The callback approach is the least-invasive integration point: callers
//! can forward events to a Tokio broadcast channel, a WebSocket, a database
//! record, or a terminal progress bar — without the library knowing
//! anything about how the host application communicates. The trait is
//! `Send + Sync` so it works correctly when pages are processed
//! concurrently.

use std::sync::Arc;

/// Called by the extraction pipeline as it processes each page.
///
/// Pages run concurrently, so `on_page_*` methods may be called from
/// different threads at the same time; implementations must protect shared
/// mutable state. All methods have default no-op implementations so
/// callers only override what they care about.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called once before any page is processed.
    fn on_extraction_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called just before a page's detectors are invoked.
    fn on_page_start(&self, page_index: usize, total_pages: usize) {
        let _ = (page_index, total_pages);
    }

    /// Called when a page completes with full detector coverage.
    fn on_page_complete(&self, page_index: usize, total_pages: usize, blocks: usize) {
        let _ = (page_index, total_pages, blocks);
    }

    /// Called when a page completes but a detector failed or timed out.
    fn on_page_degraded(&self, page_index: usize, total_pages: usize, blocks: usize, why: &str) {
        let _ = (page_index, total_pages, blocks, why);
    }

    /// Called when a page fails outright (malformed geometry).
    fn on_page_error(&self, page_index: usize, total_pages: usize, error: &str) {
        let _ = (page_index, total_pages, error);
    }

    /// Called once after all pages have been attempted.
    fn on_extraction_complete(&self, total_pages: usize, success_count: usize) {
        let _ = (total_pages, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct TrackingCallback {
        completes: AtomicUsize,
        degradeds: AtomicUsize,
        errors: AtomicUsize,
    }

    impl ExtractionProgressCallback for TrackingCallback {
        fn on_page_complete(&self, _page: usize, _total: usize, _blocks: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_page_degraded(&self, _page: usize, _total: usize, _blocks: usize, _why: &str) {
            self.degradeds.fetch_add(1, Ordering::SeqCst);
        }

        fn on_page_error(&self, _page: usize, _total: usize, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_extraction_start(3);
        cb.on_page_start(0, 3);
        cb.on_page_complete(0, 3, 5);
        cb.on_page_degraded(1, 3, 2, "semantic timeout");
        cb.on_page_error(2, 3, "malformed");
        cb.on_extraction_complete(3, 1);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let t = TrackingCallback {
            completes: AtomicUsize::new(0),
            degradeds: AtomicUsize::new(0),
            errors: AtomicUsize::new(0),
        };
        t.on_page_complete(0, 3, 4);
        t.on_page_degraded(1, 3, 1, "timeout");
        t.on_page_error(2, 3, "bad geometry");
        assert_eq!(t.completes.load(Ordering::SeqCst), 1);
        assert_eq!(t.degradeds.load(Ordering::SeqCst), 1);
        assert_eq!(t.errors.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_extraction_start(10);
        cb.on_page_complete(1, 10, 3);
    }
}
