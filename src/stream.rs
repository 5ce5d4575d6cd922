//! Streaming extraction API: emit pages as they complete.
//!
//! ## Why stream?
//!
//! Large batches take a while — detector calls dominate per-page latency.
//! A stream-based API lets callers display partial results immediately,
//! persist pages incrementally, and — the property the batch contract
//! requires — retain already-completed pages when the batch is cancelled:
//! dropping the stream abandons only the pages still in flight, and
//! everything yielded before that point remains valid. Partial-batch
//! success is a terminal state, not a failure.
//!
//! Pages are emitted in completion order, not page order; sort by
//! `report.page_index` if order matters.

use crate::config::ExtractionConfig;
use crate::detector::Detectors;
use crate::extract::process_page;
use crate::output::PageReport;
use crate::pipeline::input::PageInput;
use futures::stream::{self, StreamExt};
use std::pin::Pin;
use tokio_stream::Stream;
use tracing::info;

/// One completed page, as yielded by [`extract_stream`].
pub struct PageResult {
    pub report: PageReport,
    pub blocks: Vec<crate::block::Block>,
    pub elements: Vec<crate::block::FlattenedElement>,
}

/// A boxed stream of per-page results.
pub type PageResultStream = Pin<Box<dyn Stream<Item = PageResult> + Send>>;

/// Extract a batch of pages, streaming each page's result as it is ready.
///
/// Failed and degraded pages are yielded like successful ones — inspect
/// `result.report.status`. Dropping the stream cancels the remaining
/// pages without invalidating those already yielded.
pub fn extract_stream(
    pages: Vec<PageInput>,
    detectors: &Detectors,
    config: &ExtractionConfig,
) -> PageResultStream {
    let total = pages.len();
    info!("Starting streaming extraction of {total} pages");

    let detectors = detectors.clone();
    let config = config.clone();
    let workers = config.workers;

    let s = stream::iter(pages.into_iter().map(move |page| {
        let detectors = detectors.clone();
        let config = config.clone();
        async move {
            let outcome = process_page(Ok(page), &detectors, &config, total).await;
            PageResult {
                report: outcome.report,
                blocks: outcome.blocks,
                elements: outcome.elements,
            }
        }
    }))
    .buffer_unordered(workers);

    Box::pin(s)
}
