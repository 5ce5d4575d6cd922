//! Error types for the pagefuse library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ExtractError`] — **Fatal**: the extraction cannot proceed at all
//!   (invalid configuration, unreadable input directory, nothing to
//!   process). Returned as `Err(ExtractError)` from the top-level
//!   `extract*` functions.
//!
//! * [`PageError`] — **Non-fatal**: a single page failed or degraded
//!   (unparseable vector geometry, a detector timed out) but all other
//!   pages are fine. Stored inside [`crate::output::PageReport`] so
//!   callers can inspect partial success rather than losing the whole
//!   batch to one bad page.
//!
//! Detector implementations return [`DetectorError`]; the orchestrator
//! maps those into `PageError` together with the timeout it imposes.
//!
//! Two outcomes deliberately have **no** error type: a semantic claim with
//! no matching primitive is a normal discard (counted and traced, see
//! `pipeline::fuse`), and a page that yields zero blocks is a valid result
//! surfaced as [`crate::output::PageWarning::EmptyResult`].

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the pagefuse library.
///
/// Page-level failures use [`PageError`] and are stored in
/// [`crate::output::PageReport`] rather than propagated here.
#[derive(Debug, Error)]
pub enum ExtractError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The analysis directory does not exist or cannot be listed.
    #[error("Analysis directory not found or unreadable: '{path}'\nExpected page_<n>.json / page_<n>.png pairs produced by the rasterizer.")]
    InputUnreadable { path: PathBuf },

    /// The input contained no page JSON/PNG pairs at all.
    #[error("No pages found in '{path}'\nNothing matches page_<n>.json with a sibling page_<n>.png.")]
    NoPages { path: PathBuf },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single page.
///
/// Stored in [`crate::output::PageReport`]. A `MalformedPage` marks the
/// page as failed; detector errors mark it degraded — the page still emits
/// blocks from the sources that remain.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// The page's vector geometry could not be parsed into primitives.
    #[error("Page {page}: malformed vector geometry: {detail}")]
    MalformedPage { page: usize, detail: String },

    /// A detector call exceeded its timeout.
    #[error("Page {page}: {detector} detector timed out after {secs}s")]
    DetectorTimeout {
        page: usize,
        detector: DetectorKind,
        secs: u64,
    },

    /// A detector reported itself unavailable or returned unusable output.
    #[error("Page {page}: {detector} detector unavailable: {detail}")]
    DetectorUnavailable {
        page: usize,
        detector: DetectorKind,
        detail: String,
    },
}

/// Which of the two detector roles an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum DetectorKind {
    Geometric,
    Semantic,
}

impl std::fmt::Display for DetectorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DetectorKind::Geometric => write!(f, "geometric"),
            DetectorKind::Semantic => write!(f, "semantic"),
        }
    }
}

/// Errors a detector implementation may return.
///
/// Kept separate from [`PageError`] so implementations stay ignorant of
/// page numbering and batch policy; the orchestrator adds that context.
#[derive(Debug, Error)]
pub enum DetectorError {
    /// The backing model/service is not reachable or not configured.
    #[error("detector unavailable: {0}")]
    Unavailable(String),

    /// The detector produced output that could not be parsed.
    #[error("malformed detector output: {0}")]
    MalformedOutput(String),

    /// The detector ran but failed.
    #[error("detector failed: {0}")]
    Failed(String),
}
