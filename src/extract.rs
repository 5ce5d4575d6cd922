//! Eager (full-batch) extraction entry points.
//!
//! ## Why eager vs. streaming?
//!
//! This module provides the simpler API: wait for all pages, then return.
//! It collects every page's blocks into memory and assembles the final
//! [`ExtractionOutput`] before returning. Use
//! [`crate::stream::extract_stream`] instead when you want pages
//! progressively, or when a batch may be cancelled and already-completed
//! pages must survive.
//!
//! ## Per-page pipeline
//!
//! Pages are independent and run concurrently up to `config.workers`.
//! Within one page, the two detector calls have no data dependency and run
//! under `tokio::join!`, each racing a `tokio::time::timeout`. A detector
//! failure or timeout degrades the page to its remaining sources — the
//! semantic detector is typically a network call and must never stall the
//! batch. Only unparseable vector geometry fails a page.

use crate::config::ExtractionConfig;
use crate::detector::{Detection, Detectors, PageView};
use crate::error::{DetectorKind, ExtractError, PageError};
use crate::output::{ExtractionOutput, ExtractionStats, PageReport, PageStatus, PageWarning};
use crate::pipeline::input::{load_pages, PageInput};
use crate::pipeline::semantic::payload_to_detections;
use crate::pipeline::{assemble, fuse, overlay, parse, reinforce};
use futures::stream::{self, StreamExt};
use image::DynamicImage;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Everything produced for one page, including what the eager API drops.
pub(crate) struct PageOutcome {
    pub report: PageReport,
    pub blocks: Vec<crate::block::Block>,
    pub elements: Vec<crate::block::FlattenedElement>,
    /// Retained only when overlays are enabled.
    pub image: Option<DynamicImage>,
    pub px_per_pt: f32,
    pub geometric_detections: usize,
    pub semantic_detections: usize,
}

/// Extract layout blocks from a batch of pages.
///
/// This is the primary entry point for the library.
///
/// # Returns
/// `Ok(ExtractionOutput)` even when some pages failed or degraded —
/// check `output.pages` and `output.stats`.
///
/// # Errors
/// Returns `Err(ExtractError)` only for fatal conditions (invalid
/// configuration was already rejected by the builder; here: internal
/// failures).
pub async fn extract(
    pages: Vec<PageInput>,
    detectors: &Detectors,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, ExtractError> {
    let start = Instant::now();
    let inputs: Vec<Result<PageInput, PageError>> = pages.into_iter().map(Ok).collect();
    let outcomes = run_pages(inputs, detectors, config).await;
    Ok(aggregate(outcomes, start.elapsed().as_millis() as u64))
}

/// Extract from an analysis directory and write results next to it.
///
/// Loads `page_<n>.json` / `page_<n>.png` pairs from `input_dir`, runs
/// extraction, writes `blocks.json` + `elements.json` (and overlays when
/// enabled) into `output_dir`.
pub async fn extract_to_dir(
    input_dir: impl AsRef<Path>,
    output_dir: impl AsRef<Path>,
    detectors: &Detectors,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, ExtractError> {
    let start = Instant::now();
    let input_dir = input_dir.as_ref();
    let output_dir = output_dir.as_ref();
    info!("Starting extraction from {}", input_dir.display());

    let inputs = load_pages(input_dir)?;
    let outcomes = run_pages(inputs, detectors, config).await;

    std::fs::create_dir_all(output_dir).map_err(|e| ExtractError::OutputWriteFailed {
        path: output_dir.to_path_buf(),
        source: e,
    })?;

    if config.render_overlays {
        for outcome in &outcomes {
            if let Some(ref image) = outcome.image {
                overlay::write_overlay(
                    output_dir,
                    outcome.report.page_index,
                    image,
                    &outcome.blocks,
                    outcome.px_per_pt,
                )?;
            }
        }
    }

    let output = aggregate(outcomes, start.elapsed().as_millis() as u64);
    output.write_output(output_dir)?;
    info!(
        "Extraction complete: {}/{} pages, {} blocks → {}",
        output.stats.succeeded_pages + output.stats.degraded_pages,
        output.stats.total_pages,
        output.stats.total_blocks,
        output_dir.display()
    );
    Ok(output)
}

/// Synchronous wrapper around [`extract`].
///
/// Creates a temporary tokio runtime internally.
pub fn extract_sync(
    pages: Vec<PageInput>,
    detectors: &Detectors,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, ExtractError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ExtractError::Internal(format!("Failed to create tokio runtime: {e}")))?
        .block_on(extract(pages, detectors, config))
}

// ── Internal pipeline ────────────────────────────────────────────────────

/// Run all pages concurrently and return outcomes sorted by page index.
pub(crate) async fn run_pages(
    inputs: Vec<Result<PageInput, PageError>>,
    detectors: &Detectors,
    config: &ExtractionConfig,
) -> Vec<PageOutcome> {
    let total = inputs.len();
    if let Some(ref cb) = config.progress_callback {
        cb.on_extraction_start(total);
    }

    let mut outcomes: Vec<PageOutcome> = stream::iter(inputs.into_iter().map(|input| {
        let detectors = detectors.clone();
        let config = config.clone();
        async move { process_page(input, &detectors, &config, total).await }
    }))
    .buffer_unordered(config.workers)
    .collect()
    .await;

    outcomes.sort_by_key(|o| o.report.page_index);

    if let Some(ref cb) = config.progress_callback {
        let succeeded = outcomes
            .iter()
            .filter(|o| o.report.status != PageStatus::Failed)
            .count();
        cb.on_extraction_complete(total, succeeded);
    }
    outcomes
}

/// Process a single page end-to-end. Never returns an error: every
/// failure mode is folded into the page's report.
pub(crate) async fn process_page(
    input: Result<PageInput, PageError>,
    detectors: &Detectors,
    config: &ExtractionConfig,
    total: usize,
) -> PageOutcome {
    let start = Instant::now();

    let page = match input {
        Ok(p) => p,
        Err(e) => return failed_outcome(e, start, config, total),
    };
    let index = page.index;

    if let Some(ref cb) = config.progress_callback {
        cb.on_page_start(index, total);
    }

    // ── Parse vector primitives ──────────────────────────────────────────
    let parsed = match parse::parse_page(index, &page.content) {
        Ok(p) => p,
        Err(e) => return failed_outcome(e, start, config, total),
    };
    let mut primitives = parsed.primitives;

    // ── Raster line reinforcement ────────────────────────────────────────
    let rstats = reinforce::reinforce(&mut primitives, &page.image, parsed.width, config);
    debug!(
        "Page {index}: {} primitives ({} recovered, {} reclassified)",
        primitives.len(),
        rstats.recovered,
        rstats.reclassified
    );

    let px_per_pt = page.image.width() as f32 / parsed.width;
    let derived_dpi = px_per_pt * 72.0;
    if (derived_dpi - config.dpi as f32).abs() > config.dpi as f32 * 0.1 {
        warn!(
            "Page {index}: raster is ~{derived_dpi:.0} DPI but config declares {}; \
             check the input pairing",
            config.dpi
        );
    }

    let view = PageView {
        index,
        image: &page.image,
        width_pt: parsed.width,
        height_pt: parsed.height,
        px_per_pt,
    };

    // ── Detectors (concurrent, individually timed out) ──────────────────
    let timeout = Duration::from_secs(config.detector_timeout_secs);

    let geo_fut = async {
        match (&detectors.geometric, config.detectors.geometric_enabled()) {
            (Some(d), true) => Some(tokio::time::timeout(timeout, d.detect(&view)).await),
            _ => None,
        }
    };
    let sem_fut = async {
        match (&detectors.semantic, config.detectors.semantic_enabled()) {
            (Some(d), true) => Some(tokio::time::timeout(timeout, d.analyze(&view)).await),
            _ => None,
        }
    };
    let (geo_result, sem_result) = tokio::join!(geo_fut, sem_fut);

    let mut detections: Vec<Detection> = Vec::new();
    let mut page_error: Option<PageError> = None;
    let mut geometric_count = 0usize;
    let mut semantic_count = 0usize;

    match geo_result {
        None => {}
        Some(Err(_)) => {
            page_error = Some(PageError::DetectorTimeout {
                page: index,
                detector: DetectorKind::Geometric,
                secs: config.detector_timeout_secs,
            });
        }
        Some(Ok(Err(e))) => {
            page_error = Some(PageError::DetectorUnavailable {
                page: index,
                detector: DetectorKind::Geometric,
                detail: e.to_string(),
            });
        }
        Some(Ok(Ok(dets))) => {
            geometric_count = dets.len();
            detections.extend(dets);
        }
    }

    match sem_result {
        None => {}
        Some(Err(_)) => {
            page_error.get_or_insert(PageError::DetectorTimeout {
                page: index,
                detector: DetectorKind::Semantic,
                secs: config.detector_timeout_secs,
            });
        }
        Some(Ok(Err(e))) => {
            page_error.get_or_insert(PageError::DetectorUnavailable {
                page: index,
                detector: DetectorKind::Semantic,
                detail: e.to_string(),
            });
        }
        Some(Ok(Ok(payload))) => {
            let claims = payload_to_detections(&payload, parsed.width, parsed.height);
            semantic_count = claims.len();
            detections.extend(claims);
        }
    }

    if let Some(ref e) = page_error {
        warn!("Page {index}: degraded — {e}");
    }

    // ── Fusion and assembly ─────────────────────────────────────────────
    let fused = fuse::fuse(&primitives, detections, parsed.width, parsed.height, config);
    let assembled = assemble::assemble(index, fused.candidates);

    let mut warnings = Vec::new();
    if assembled.blocks.is_empty() {
        warnings.push(PageWarning::EmptyResult);
        info!("Page {index}: empty block set (valid result)");
    }

    let status = if page_error.is_some() {
        PageStatus::Degraded
    } else {
        PageStatus::Success
    };

    if let Some(ref cb) = config.progress_callback {
        match (&status, &page_error) {
            (PageStatus::Degraded, Some(e)) => {
                cb.on_page_degraded(index, total, assembled.blocks.len(), &e.to_string())
            }
            _ => cb.on_page_complete(index, total, assembled.blocks.len()),
        }
    }

    PageOutcome {
        report: PageReport {
            page_index: index,
            status,
            warnings,
            error: page_error,
            blocks_emitted: assembled.blocks.len(),
            grounding_discards: fused.stats.grounding_discards,
            duration_ms: start.elapsed().as_millis() as u64,
        },
        blocks: assembled.blocks,
        elements: assembled.elements,
        image: config.render_overlays.then_some(page.image),
        px_per_pt,
        geometric_detections: geometric_count,
        semantic_detections: semantic_count,
    }
}

fn failed_outcome(
    error: PageError,
    start: Instant,
    config: &ExtractionConfig,
    total: usize,
) -> PageOutcome {
    let page_index = match &error {
        PageError::MalformedPage { page, .. }
        | PageError::DetectorTimeout { page, .. }
        | PageError::DetectorUnavailable { page, .. } => *page,
    };
    warn!("Page {page_index}: failed — {error}");
    if let Some(ref cb) = config.progress_callback {
        cb.on_page_error(page_index, total, &error.to_string());
    }
    PageOutcome {
        report: PageReport {
            page_index,
            status: PageStatus::Failed,
            warnings: Vec::new(),
            error: Some(error),
            blocks_emitted: 0,
            grounding_discards: 0,
            duration_ms: start.elapsed().as_millis() as u64,
        },
        blocks: Vec::new(),
        elements: Vec::new(),
        image: None,
        px_per_pt: 1.0,
        geometric_detections: 0,
        semantic_detections: 0,
    }
}

/// Fold page outcomes into the batch output.
pub(crate) fn aggregate(outcomes: Vec<PageOutcome>, total_duration_ms: u64) -> ExtractionOutput {
    let mut stats = ExtractionStats {
        total_pages: outcomes.len(),
        total_duration_ms,
        ..Default::default()
    };
    let mut pages = Vec::with_capacity(outcomes.len());
    let mut blocks = Vec::new();
    let mut elements = Vec::new();

    for o in outcomes {
        match o.report.status {
            PageStatus::Success => stats.succeeded_pages += 1,
            PageStatus::Degraded => stats.degraded_pages += 1,
            PageStatus::Failed => stats.failed_pages += 1,
        }
        stats.geometric_detections += o.geometric_detections;
        stats.semantic_detections += o.semantic_detections;
        stats.grounding_discards += o.report.grounding_discards;
        blocks.extend(o.blocks);
        elements.extend(o.elements);
        pages.push(o.report);
    }
    stats.total_blocks = blocks.len();
    stats.total_elements = elements.len();

    ExtractionOutput {
        pages,
        blocks,
        elements,
        stats,
    }
}
