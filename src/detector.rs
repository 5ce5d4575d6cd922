//! Detector interfaces and the detection data model.
//!
//! Everything a detector says is provisional: a [`Detection`] carries
//! either a confidence score (geometric source) or a structured claim
//! (semantic source) as a tagged payload, and the fusion engine is the
//! only component allowed to branch on that payload. Nothing downstream
//! of fusion ever sees a `Detection` — only grounded
//! [`crate::block::Block`]s survive.
//!
//! ## Swappability
//!
//! Both detector roles are `async` traits so the engine never depends on
//! a concrete implementation: a local ONNX model, a remote VLM endpoint,
//! and the replay implementations below (which read detector output
//! recorded as JSON next to the page files) are interchangeable. The
//! replay detectors are what the CLI uses — the engine consumes detector
//! outputs as data, regardless of which process produced them.

use crate::error::DetectorError;
use crate::geometry::BBox;
use crate::pipeline::semantic::SemanticPayload;
use async_trait::async_trait;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ── Page view ────────────────────────────────────────────────────────────

/// A page as detectors see it: raster pixels plus the point-space frame
/// needed to express results in page coordinates.
pub struct PageView<'a> {
    /// 0-based page index within the batch.
    pub index: usize,
    /// The rendered page raster.
    pub image: &'a DynamicImage,
    /// Page width in points.
    pub width_pt: f32,
    /// Page height in points.
    pub height_pt: f32,
    /// Raster scale: pixels per point.
    pub px_per_pt: f32,
}

// ── Detection model ──────────────────────────────────────────────────────

/// Which detector proposed a detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionSource {
    Geometric,
    Semantic,
}

/// Class vocabulary across both detectors.
///
/// The geometric detector emits the first four; semantic claims map onto
/// the last four. One enum keeps the cross-detector compatibility check in
/// fusion a plain `match` instead of a string comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionClass {
    Table,
    #[serde(alias = "text_region")]
    TextBlock,
    Title,
    Cell,
    LabeledInput,
    GridHeaders,
    CheckboxGroup,
    HeaderTitle,
}

/// A semantic detector's structured sub-claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "claim", rename_all = "snake_case")]
pub enum SemanticClaim {
    /// A labelled input field ("Name: ____").
    LabeledInput { label: String },
    /// Ordered column headers for a grid. `column_centers` carries the
    /// x-centre of each header's approximate box in page points when the
    /// detector supplied per-column geometry; empty otherwise.
    GridHeaders {
        columns: Vec<String>,
        #[serde(default)]
        column_centers: Vec<f32>,
    },
    /// A cluster of checkbox cells.
    CheckboxGroup,
    /// The page's header title text.
    HeaderTitle { text: String },
}

/// Source-specific payload: confidence for trusted-geometry detections,
/// a structured claim for semantic ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum DetectionPayload {
    Geometric { confidence: f32 },
    Semantic { claim: SemanticClaim },
}

/// A candidate region proposed by one detector, in page points.
///
/// `bbox` is `None` only for semantic claims that carry no geometry at all
/// (a bare header-title string); fusion grounds those against text runs
/// instead of boxes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class: DetectionClass,
    pub bbox: Option<BBox>,
    #[serde(flatten)]
    pub payload: DetectionPayload,
}

impl Detection {
    pub fn geometric(class: DetectionClass, bbox: BBox, confidence: f32) -> Self {
        Self {
            class,
            bbox: Some(bbox),
            payload: DetectionPayload::Geometric { confidence },
        }
    }

    pub fn semantic(class: DetectionClass, bbox: Option<BBox>, claim: SemanticClaim) -> Self {
        Self {
            class,
            bbox,
            payload: DetectionPayload::Semantic { claim },
        }
    }

    pub fn source(&self) -> DetectionSource {
        match self.payload {
            DetectionPayload::Geometric { .. } => DetectionSource::Geometric,
            DetectionPayload::Semantic { .. } => DetectionSource::Semantic,
        }
    }

    /// Confidence for ordering; semantic claims rank below any scored
    /// geometric detection because their geometry is untrusted.
    pub fn confidence(&self) -> f32 {
        match &self.payload {
            DetectionPayload::Geometric { confidence } => *confidence,
            DetectionPayload::Semantic { .. } => 0.0,
        }
    }

    pub fn claim(&self) -> Option<&SemanticClaim> {
        match &self.payload {
            DetectionPayload::Semantic { claim } => Some(claim),
            DetectionPayload::Geometric { .. } => None,
        }
    }
}

// ── Region classifier (per tile) ─────────────────────────────────────────

/// Classes a region classifier may emit for one tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionClass {
    Table,
    #[serde(alias = "text_region")]
    TextBlock,
    Title,
    Cell,
}

impl From<RegionClass> for DetectionClass {
    fn from(c: RegionClass) -> Self {
        match c {
            RegionClass::Table => DetectionClass::Table,
            RegionClass::TextBlock => DetectionClass::TextBlock,
            RegionClass::Title => DetectionClass::Title,
            RegionClass::Cell => DetectionClass::Cell,
        }
    }
}

/// A raw proposal from a region classifier, in pixel coordinates of the
/// image it was given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionProposal {
    pub class: RegionClass,
    pub bbox: BBox,
    pub confidence: f32,
}

/// A per-image region classifier: the model behind the tiled geometric
/// pass. Receives one tile already resized to the configured inference
/// size and returns proposals in that image's pixel space. Implementations
/// never see tile offsets — the tiling wrapper owns all coordinate
/// bookkeeping.
#[async_trait]
pub trait RegionClassifier: Send + Sync {
    async fn classify(&self, image: &DynamicImage) -> Result<Vec<RegionProposal>, DetectorError>;
}

// ── Page-level detector roles ────────────────────────────────────────────

/// The geometric detector role: one page raster in, page-point detections
/// out. [`crate::pipeline::tile::TiledRegionDetector`] adapts any
/// [`RegionClassifier`] into this role.
#[async_trait]
pub trait GeometricDetector: Send + Sync {
    async fn detect(&self, page: &PageView<'_>) -> Result<Vec<Detection>, DetectorError>;
}

/// The semantic detector role: whole page in, structured payload out.
/// Payload geometry is approximate by contract and must be grounded before
/// use.
#[async_trait]
pub trait SemanticDetector: Send + Sync {
    async fn analyze(&self, page: &PageView<'_>) -> Result<SemanticPayload, DetectorError>;
}

/// The detector pair handed to the extraction pipeline.
///
/// `None` slots are simply absent sources — combined with
/// [`crate::config::DetectorSelection`] this lets callers run
/// geometric-only, semantic-only, or primitives-only extractions without
/// a null-object implementation.
#[derive(Clone, Default)]
pub struct Detectors {
    pub geometric: Option<std::sync::Arc<dyn GeometricDetector>>,
    pub semantic: Option<std::sync::Arc<dyn SemanticDetector>>,
}

impl Detectors {
    pub fn new(
        geometric: Option<std::sync::Arc<dyn GeometricDetector>>,
        semantic: Option<std::sync::Arc<dyn SemanticDetector>>,
    ) -> Self {
        Self {
            geometric,
            semantic,
        }
    }

    /// Replay both roles from recorded JSON in `dir`.
    pub fn replay_from_dir(dir: impl AsRef<std::path::Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            geometric: Some(std::sync::Arc::new(ReplayGeometricDetector::new(dir))),
            semantic: Some(std::sync::Arc::new(ReplaySemanticDetector::new(dir))),
        }
    }
}

// ── Replay detectors ─────────────────────────────────────────────────────

/// On-disk form of recorded geometric detections: `regions_page_<n>.json`.
#[derive(Debug, Serialize, Deserialize)]
struct RecordedRegions {
    regions: Vec<RecordedRegion>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RecordedRegion {
    class: RegionClass,
    bbox: BBox,
    #[serde(default, alias = "conf")]
    confidence: f32,
}

/// Geometric detector that replays detections recorded as JSON in the
/// analysis directory, already in page points. A missing file means the
/// recording pass skipped the page: zero detections, not an error.
pub struct ReplayGeometricDetector {
    dir: PathBuf,
}

impl ReplayGeometricDetector {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl GeometricDetector for ReplayGeometricDetector {
    async fn detect(&self, page: &PageView<'_>) -> Result<Vec<Detection>, DetectorError> {
        let path = self.dir.join(format!("regions_page_{}.json", page.index + 1));
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(DetectorError::Unavailable(format!("{}: {e}", path.display()))),
        };
        let recorded: RecordedRegions = serde_json::from_str(&text)
            .map_err(|e| DetectorError::MalformedOutput(format!("{}: {e}", path.display())))?;
        Ok(recorded
            .regions
            .into_iter()
            .filter(|r| r.bbox.is_valid())
            .map(|r| Detection::geometric(r.class.into(), r.bbox, r.confidence))
            .collect())
    }
}

/// Semantic detector that replays a recorded payload from
/// `semantic_page_<n>.json`. A missing file is reported as unavailable so
/// the page is correctly marked degraded rather than silently treated as
/// "the model saw nothing".
pub struct ReplaySemanticDetector {
    dir: PathBuf,
}

impl ReplaySemanticDetector {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl SemanticDetector for ReplaySemanticDetector {
    async fn analyze(&self, page: &PageView<'_>) -> Result<SemanticPayload, DetectorError> {
        let path = self.dir.join(format!("semantic_page_{}.json", page.index + 1));
        let text = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| DetectorError::Unavailable(format!("{}: {e}", path.display())))?;
        crate::pipeline::semantic::parse_semantic_payload(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detection_source_follows_payload() {
        let g = Detection::geometric(DetectionClass::Table, BBox::new(0.0, 0.0, 10.0, 10.0), 0.9);
        assert_eq!(g.source(), DetectionSource::Geometric);
        assert_eq!(g.confidence(), 0.9);
        assert!(g.claim().is_none());

        let s = Detection::semantic(
            DetectionClass::HeaderTitle,
            None,
            SemanticClaim::HeaderTitle {
                text: "Weekly Planner".into(),
            },
        );
        assert_eq!(s.source(), DetectionSource::Semantic);
        assert_eq!(s.confidence(), 0.0);
        assert!(s.claim().is_some());
    }

    #[test]
    fn recorded_regions_accept_text_region_alias() {
        let json = r#"{"regions":[
            {"class":"table","bbox":{"x":10.0,"y":10.0,"width":100.0,"height":80.0},"confidence":0.8},
            {"class":"text_region","bbox":{"x":10.0,"y":120.0,"width":100.0,"height":20.0},"conf":0.5}
        ]}"#;
        let recorded: RecordedRegions = serde_json::from_str(json).unwrap();
        assert_eq!(recorded.regions.len(), 2);
        assert_eq!(recorded.regions[1].class, RegionClass::TextBlock);
        assert_eq!(recorded.regions[1].confidence, 0.5);
    }

    #[tokio::test]
    async fn replay_geometric_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let det = ReplayGeometricDetector::new(dir.path());
        let img = DynamicImage::new_rgb8(100, 100);
        let page = PageView {
            index: 0,
            image: &img,
            width_pt: 432.0,
            height_pt: 648.0,
            px_per_pt: 300.0 / 72.0,
        };
        let detections = det.detect(&page).await.unwrap();
        assert!(detections.is_empty());
    }

    #[tokio::test]
    async fn replay_geometric_reads_and_filters() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("regions_page_1.json"),
            r#"{"regions":[
                {"class":"table","bbox":{"x":34.0,"y":34.0,"width":364.0,"height":504.0},"confidence":0.8},
                {"class":"cell","bbox":{"x":0.0,"y":0.0,"width":0.0,"height":10.0},"confidence":0.9}
            ]}"#,
        )
        .unwrap();
        let det = ReplayGeometricDetector::new(dir.path());
        let img = DynamicImage::new_rgb8(100, 100);
        let page = PageView {
            index: 0,
            image: &img,
            width_pt: 432.0,
            height_pt: 648.0,
            px_per_pt: 300.0 / 72.0,
        };
        let detections = det.detect(&page).await.unwrap();
        // Degenerate bbox filtered out.
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].class, DetectionClass::Table);
    }

    #[tokio::test]
    async fn replay_semantic_missing_file_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let det = ReplaySemanticDetector::new(dir.path());
        let img = DynamicImage::new_rgb8(100, 100);
        let page = PageView {
            index: 0,
            image: &img,
            width_pt: 432.0,
            height_pt: 648.0,
            px_per_pt: 300.0 / 72.0,
        };
        let err = det.analyze(&page).await.unwrap_err();
        assert!(matches!(err, DetectorError::Unavailable(_)));
    }
}
