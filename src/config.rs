//! Configuration types for layout extraction.
//!
//! All extraction behaviour is controlled through [`ExtractionConfig`],
//! built via its [`ExtractionConfigBuilder`]. Keeping every knob in one
//! struct makes it trivial to share configs across pages, serialise them
//! for logging, and diff two runs to understand why their outputs differ.
//!
//! Every threshold the fusion engine consults lives here. The defaults
//! were calibrated against sample planner pages, not derived from first
//! principles — treat them as starting points to tune against a labelled
//! sample, never as constants to rely on.
//!
//! # Design choice: builder over constructor
//! A twenty-field constructor is unreadable and breaks on every new field.
//! The builder pattern lets callers set only what they care about and rely
//! on well-documented defaults for the rest.

use crate::error::ExtractError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which detectors contribute to fusion.
///
/// All three modes run the full fusion pipeline; a disabled detector is
/// simply an empty detection source. This is a real configuration choice,
/// not a degraded mode: semantic-only is useful when no region model is
/// deployed, geometric-only when no VLM budget exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DetectorSelection {
    GeometricOnly,
    SemanticOnly,
    #[default]
    Both,
}

impl DetectorSelection {
    pub fn geometric_enabled(&self) -> bool {
        matches!(self, Self::GeometricOnly | Self::Both)
    }

    pub fn semantic_enabled(&self) -> bool {
        matches!(self, Self::SemanticOnly | Self::Both)
    }
}

/// Configuration for a layout extraction run.
///
/// Built via [`ExtractionConfig::builder()`] or using
/// [`ExtractionConfig::default()`].
///
/// # Example
/// ```rust
/// use pagefuse::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .tile_size(512)
///     .workers(8)
///     .top_margin_fraction(0.25)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// DPI the rasterizer used for the page PNGs. Range: 36–600. Default: 300.
    ///
    /// This is not a rendering knob — rasterization happens upstream — but
    /// the engine needs it to convert between image pixels and page points
    /// (`dpi / 72` pixels per point). A wrong value here shifts every
    /// detector box relative to the primitives and destroys grounding.
    pub dpi: u32,

    /// Which detectors to run. Default: both.
    pub detectors: DetectorSelection,

    /// Tile edge length in pixels for the geometric pass. Default: 640.
    ///
    /// Small elements (checkbox cells, thin rules) vanish when a full page
    /// is squeezed to inference resolution; tiling trades throughput for
    /// recall on them. 640 px tiles at 300 DPI cover roughly 1.5 inches of
    /// page, enough context for the classifier without losing small boxes.
    pub tile_size: u32,

    /// Overlap between adjacent tiles in pixels. Default: 64.
    ///
    /// An object straddling a tile boundary must appear whole in at least
    /// one tile, so the overlap should exceed the largest small-object
    /// dimension you care about. Duplicates produced by the overlap are
    /// collapsed by the cross-tile merge.
    pub tile_overlap: u32,

    /// Edge length tiles are resized to before classification. Default: 640.
    pub inference_size: u32,

    /// IoU at or above which two detections from the tiled pass are
    /// considered the same object and merged. Default: 0.5.
    pub merge_iou: f32,

    /// IoU at or above which a geometric and a semantic detection are
    /// considered the same object during fusion. Default: 0.6.
    pub dedup_iou: f32,

    /// IoU a semantic claim's approximate box must reach against a real
    /// primitive to be grounded. Below this the claim is discarded as a
    /// hallucination. Default: 0.5.
    pub grounding_iou: f32,

    /// IoU at or above which two same-type blocks are duplicates and the
    /// weaker is rejected. Default: 0.8.
    pub duplicate_iou: f32,

    /// Fraction of page height treated as the top margin band. Default: 0.20.
    ///
    /// Headers and titles legitimately live here; checkbox and input-field
    /// claims in this band are discarded unless the geometric detector
    /// corroborates them, because vision models over-propose fields near
    /// page tops.
    pub top_margin_fraction: f32,

    /// Aspect ratio beyond which a rectangle is reclassified as a line.
    /// Default: 20.0.
    ///
    /// Vector tools commonly draw rules as filled thin rectangles; a 360 ×
    /// 1.5 pt rectangle is a line for every purpose this engine has.
    pub line_aspect_ratio: f32,

    /// Pixel distance within which a raster edge is considered already
    /// covered by an existing vector primitive. Default: 6.
    pub reinforce_tolerance_px: u32,

    /// Minimum dark-run length for raster line recovery, as a fraction of
    /// the page dimension being scanned. Default: 0.5.
    pub reinforce_min_run_fraction: f32,

    /// Grayscale value (0–255) at or below which a pixel counts as dark
    /// during raster line recovery. Default: 96.
    pub dark_threshold: u8,

    /// Horizontal tolerance in points when aligning semantic column-header
    /// texts to inferred grid column boundaries. Default: 18.0.
    pub header_align_tolerance_pt: f32,

    /// Geometric detections below this confidence are dropped before
    /// fusion. Default: 0.25.
    ///
    /// Confidence is a tie-breaker, not a trust signal — grounding does the
    /// real filtering — but feeding fusion sub-0.25 noise wastes work and
    /// inflates the dedup n².
    pub min_confidence: f32,

    /// Number of pages processed concurrently. Default: 4.
    ///
    /// Detector calls dominate per-page latency and pages share no state,
    /// so page-level parallelism is nearly free. Raise this when the
    /// detectors are remote services; lower it when they compete for a
    /// local GPU.
    pub workers: usize,

    /// Per-detector-call timeout in seconds. Default: 45.
    ///
    /// The semantic detector is typically network-bound and must not stall
    /// the batch: on timeout the page proceeds with the remaining sources
    /// and is reported as degraded.
    pub detector_timeout_secs: u64,

    /// Render one QA overlay PNG per page. Default: true.
    pub render_overlays: bool,

    /// Optional per-page progress callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            dpi: 300,
            detectors: DetectorSelection::default(),
            tile_size: 640,
            tile_overlap: 64,
            inference_size: 640,
            merge_iou: 0.5,
            dedup_iou: 0.6,
            grounding_iou: 0.5,
            duplicate_iou: 0.8,
            top_margin_fraction: 0.20,
            line_aspect_ratio: 20.0,
            reinforce_tolerance_px: 6,
            reinforce_min_run_fraction: 0.5,
            dark_threshold: 96,
            header_align_tolerance_pt: 18.0,
            min_confidence: 0.25,
            workers: 4,
            detector_timeout_secs: 45,
            render_overlays: true,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("dpi", &self.dpi)
            .field("detectors", &self.detectors)
            .field("tile_size", &self.tile_size)
            .field("tile_overlap", &self.tile_overlap)
            .field("inference_size", &self.inference_size)
            .field("merge_iou", &self.merge_iou)
            .field("dedup_iou", &self.dedup_iou)
            .field("grounding_iou", &self.grounding_iou)
            .field("duplicate_iou", &self.duplicate_iou)
            .field("top_margin_fraction", &self.top_margin_fraction)
            .field("line_aspect_ratio", &self.line_aspect_ratio)
            .field("min_confidence", &self.min_confidence)
            .field("workers", &self.workers)
            .field("detector_timeout_secs", &self.detector_timeout_secs)
            .field("render_overlays", &self.render_overlays)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn callback>"),
            )
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Pixels per page point at the configured DPI.
    pub fn px_per_pt(&self) -> f32 {
        self.dpi as f32 / 72.0
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(36, 600);
        self
    }

    pub fn detectors(mut self, selection: DetectorSelection) -> Self {
        self.config.detectors = selection;
        self
    }

    pub fn tile_size(mut self, px: u32) -> Self {
        self.config.tile_size = px.max(64);
        self
    }

    pub fn tile_overlap(mut self, px: u32) -> Self {
        self.config.tile_overlap = px;
        self
    }

    pub fn inference_size(mut self, px: u32) -> Self {
        self.config.inference_size = px.max(64);
        self
    }

    pub fn merge_iou(mut self, v: f32) -> Self {
        self.config.merge_iou = v;
        self
    }

    pub fn dedup_iou(mut self, v: f32) -> Self {
        self.config.dedup_iou = v;
        self
    }

    pub fn grounding_iou(mut self, v: f32) -> Self {
        self.config.grounding_iou = v;
        self
    }

    pub fn duplicate_iou(mut self, v: f32) -> Self {
        self.config.duplicate_iou = v;
        self
    }

    pub fn top_margin_fraction(mut self, v: f32) -> Self {
        self.config.top_margin_fraction = v;
        self
    }

    pub fn line_aspect_ratio(mut self, v: f32) -> Self {
        self.config.line_aspect_ratio = v.max(1.0);
        self
    }

    pub fn reinforce_tolerance_px(mut self, px: u32) -> Self {
        self.config.reinforce_tolerance_px = px;
        self
    }

    pub fn reinforce_min_run_fraction(mut self, v: f32) -> Self {
        self.config.reinforce_min_run_fraction = v.clamp(0.05, 1.0);
        self
    }

    pub fn dark_threshold(mut self, v: u8) -> Self {
        self.config.dark_threshold = v;
        self
    }

    pub fn header_align_tolerance_pt(mut self, v: f32) -> Self {
        self.config.header_align_tolerance_pt = v.max(0.0);
        self
    }

    pub fn min_confidence(mut self, v: f32) -> Self {
        self.config.min_confidence = v.clamp(0.0, 1.0);
        self
    }

    pub fn workers(mut self, n: usize) -> Self {
        self.config.workers = n.max(1);
        self
    }

    pub fn detector_timeout_secs(mut self, secs: u64) -> Self {
        self.config.detector_timeout_secs = secs.max(1);
        self
    }

    pub fn render_overlays(mut self, v: bool) -> Self {
        self.config.render_overlays = v;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating cross-field constraints.
    ///
    /// Single-field ranges are clamped by the setters; only relationships
    /// between fields (and thresholds that must stay in (0, 1]) can still
    /// be wrong here.
    pub fn build(self) -> Result<ExtractionConfig, ExtractError> {
        let c = &self.config;

        if c.tile_overlap * 2 >= c.tile_size {
            return Err(ExtractError::InvalidConfig(format!(
                "tile_overlap ({}) must be < tile_size / 2 ({})",
                c.tile_overlap,
                c.tile_size / 2
            )));
        }

        for (name, v) in [
            ("merge_iou", c.merge_iou),
            ("dedup_iou", c.dedup_iou),
            ("grounding_iou", c.grounding_iou),
            ("duplicate_iou", c.duplicate_iou),
        ] {
            if !(v > 0.0 && v <= 1.0) {
                return Err(ExtractError::InvalidConfig(format!(
                    "{name} must be in (0, 1], got {v}"
                )));
            }
        }

        if !(c.top_margin_fraction > 0.0 && c.top_margin_fraction < 1.0) {
            return Err(ExtractError::InvalidConfig(format!(
                "top_margin_fraction must be in (0, 1), got {}",
                c.top_margin_fraction
            )));
        }

        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_build() {
        let config = ExtractionConfig::builder().build().unwrap();
        assert_eq!(config.dpi, 300);
        assert_eq!(config.workers, 4);
        assert!(config.detectors.geometric_enabled());
        assert!(config.detectors.semantic_enabled());
    }

    #[test]
    fn setters_clamp() {
        let config = ExtractionConfig::builder()
            .dpi(10_000)
            .workers(0)
            .line_aspect_ratio(0.1)
            .build()
            .unwrap();
        assert_eq!(config.dpi, 600);
        assert_eq!(config.workers, 1);
        assert_eq!(config.line_aspect_ratio, 1.0);
    }

    #[test]
    fn overlap_must_fit_tile() {
        let err = ExtractionConfig::builder()
            .tile_size(128)
            .tile_overlap(64)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("tile_overlap"));
    }

    #[test]
    fn iou_thresholds_validated() {
        let err = ExtractionConfig::builder()
            .grounding_iou(0.0)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("grounding_iou"));

        let err = ExtractionConfig::builder()
            .dedup_iou(1.5)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("dedup_iou"));
    }

    #[test]
    fn margin_fraction_validated() {
        let err = ExtractionConfig::builder()
            .top_margin_fraction(1.0)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("top_margin_fraction"));
    }

    #[test]
    fn px_per_pt_matches_dpi() {
        let config = ExtractionConfig::builder().dpi(300).build().unwrap();
        assert!((config.px_per_pt() - 300.0 / 72.0).abs() < 1e-6);
    }

    #[test]
    fn selection_modes() {
        assert!(DetectorSelection::GeometricOnly.geometric_enabled());
        assert!(!DetectorSelection::GeometricOnly.semantic_enabled());
        assert!(!DetectorSelection::SemanticOnly.geometric_enabled());
        assert!(DetectorSelection::SemanticOnly.semantic_enabled());
    }
}
