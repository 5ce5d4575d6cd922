//! End-to-end pipeline tests with mock detectors.
//!
//! These run the full extraction pipeline — parse, reinforce, detect,
//! fuse, assemble — against synthetic pages and scripted detector
//! implementations. No model, network, or fixture files involved; the
//! detector traits make the engine fully drivable from a test.

use async_trait::async_trait;
use image::{DynamicImage, Rgb, RgbImage};
use pagefuse::{
    extract, BlockAttrs, BlockKind, Detection, DetectionClass, DetectorError, Detectors,
    ExtractionConfig, GeometricDetector, PageInput, PageStatus, PageView, PageWarning,
    SemanticClaim, SemanticDetector, SemanticPayload,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

// ── Test helpers ─────────────────────────────────────────────────────────────

const PAGE_W: f32 = 432.0;
const PAGE_H: f32 = 648.0;

/// A 432x648 px raster: 1 px per pt, so test geometry needs no scaling.
fn blank_raster() -> RgbImage {
    RgbImage::from_pixel(PAGE_W as u32, PAGE_H as u32, Rgb([255, 255, 255]))
}

fn page_content(elements: serde_json::Value) -> serde_json::Value {
    json!({
        "page_index": 0,
        "width": PAGE_W,
        "height": PAGE_H,
        "coord_system": "top-left",
        "elements": elements,
    })
}

fn config() -> ExtractionConfig {
    // dpi 72 matches the 1 px/pt rasters above.
    ExtractionConfig::builder()
        .dpi(72)
        .render_overlays(false)
        .build()
        .unwrap()
}

/// Geometric detector returning a fixed set of detections.
struct FixedGeometric(Vec<Detection>);

#[async_trait]
impl GeometricDetector for FixedGeometric {
    async fn detect(&self, _page: &PageView<'_>) -> Result<Vec<Detection>, DetectorError> {
        Ok(self.0.clone())
    }
}

/// Semantic detector returning a fixed payload.
struct FixedSemantic(SemanticPayload);

#[async_trait]
impl SemanticDetector for FixedSemantic {
    async fn analyze(&self, _page: &PageView<'_>) -> Result<SemanticPayload, DetectorError> {
        Ok(self.0.clone())
    }
}

/// Semantic detector that never answers within any sane timeout.
struct HangingSemantic;

#[async_trait]
impl SemanticDetector for HangingSemantic {
    async fn analyze(&self, _page: &PageView<'_>) -> Result<SemanticPayload, DetectorError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(SemanticPayload::default())
    }
}

fn geometric(dets: Vec<Detection>) -> Arc<dyn GeometricDetector> {
    Arc::new(FixedGeometric(dets))
}

fn semantic_json(value: serde_json::Value) -> Arc<dyn SemanticDetector> {
    let payload: SemanticPayload = serde_json::from_value(value).unwrap();
    Arc::new(FixedSemantic(payload))
}

/// The acceptance page: a bordered table rectangle with ten interior
/// rules drawn only into the raster, plus a wide title text run.
fn table_page() -> PageInput {
    let mut raster = blank_raster();
    for i in 1..=10 {
        let y = (36.0 + i as f32 * (500.0 / 11.0)).round() as u32;
        for x in 36..396 {
            raster.put_pixel(x, y, Rgb([0, 0, 0]));
        }
    }
    let content = page_content(json!([
        {"type": "text", "x": 100.0, "y": 40.0, "width": 230.0, "height": 40.0,
         "properties": {"text": "WEEKLY PLANNER", "fontSize": 36.0}},
        {"type": "rectangle", "x": 36.0, "y": 36.0, "width": 360.0, "height": 500.0,
         "properties": {"fill": "transparent", "stroke": "#CCCCCC", "strokeWidth": 0.5}},
    ]));
    PageInput::new(0, DynamicImage::ImageRgb8(raster), content)
}

fn table_detection() -> Detection {
    Detection::geometric(
        DetectionClass::Table,
        pagefuse::BBox::new(34.0, 34.0, 364.0, 504.0),
        0.8,
    )
}

fn weekday_headers() -> serde_json::Value {
    json!({
        "grid_headers": [{
            "columns": ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"],
            "box": {"x": 8.5, "y": 5.0, "width": 83.0, "height": 72.0}
        }]
    })
}

// ── The concrete acceptance scenario ─────────────────────────────────────────

#[tokio::test]
async fn table_scenario_yields_one_grid_with_headers() {
    let detectors = Detectors::new(
        Some(geometric(vec![table_detection()])),
        Some(semantic_json(weekday_headers())),
    );
    let output = extract(vec![table_page()], &detectors, &config())
        .await
        .unwrap();

    assert_eq!(output.stats.failed_pages, 0);
    let grids: Vec<_> = output
        .blocks
        .iter()
        .filter(|b| b.kind == BlockKind::Grid)
        .collect();
    assert_eq!(grids.len(), 1, "exactly one grid block");

    let grid = grids[0];
    // Snapped to the vector rectangle, not the detector's box.
    assert!((grid.bbox.x - 36.0).abs() < 0.01);
    assert!((grid.bbox.w - 360.0).abs() < 0.01);
    match &grid.attrs {
        BlockAttrs::Grid { rows, cols, headers } => {
            assert_eq!(*rows, 11, "ten reinforced rules bound eleven rows");
            assert_eq!(*cols, 7);
            assert_eq!(headers.len(), 7);
            assert_eq!(headers[0], "Mon");
            assert_eq!(headers[6], "Sun");
        }
        other => panic!("wrong attrs: {other:?}"),
    }
    // Grounded in the rectangle and the recovered lines.
    assert!(grid.provenance.primitives.len() >= 11);
}

// ── Grounding properties ─────────────────────────────────────────────────────

#[tokio::test]
async fn ungrounded_semantic_claim_is_never_emitted() {
    // A checkbox-group claim floating over empty space.
    let detectors = Detectors::new(
        None,
        Some(semantic_json(json!({
            "checkbox_groups": [{"box": {"x": 60.0, "y": 60.0, "width": 25.0, "height": 5.0}}]
        }))),
    );
    let page = PageInput::new(
        0,
        DynamicImage::ImageRgb8(blank_raster()),
        page_content(json!([])),
    );
    let output = extract(vec![page], &detectors, &config()).await.unwrap();

    assert!(output.blocks.is_empty());
    assert_eq!(output.stats.grounding_discards, 1);
    assert_eq!(output.pages[0].warnings, vec![PageWarning::EmptyResult]);
    assert_eq!(output.pages[0].status, PageStatus::Success);
}

#[tokio::test]
async fn every_emitted_block_has_primitive_provenance() {
    let detectors = Detectors::new(
        Some(geometric(vec![table_detection()])),
        Some(semantic_json(json!({
            "header_title": "WEEKLY PLANNER",
            "labeled_fields": [
                {"label": "Name", "box": {"x": 10.0, "y": 90.0, "width": 40.0, "height": 3.0}}
            ]
        }))),
    );
    let output = extract(vec![table_page()], &detectors, &config())
        .await
        .unwrap();

    assert!(!output.blocks.is_empty());
    for block in &output.blocks {
        assert!(
            !block.provenance.primitives.is_empty(),
            "block {} has no grounding primitives",
            block.id
        );
    }
}

// ── Top-margin pruning ───────────────────────────────────────────────────────

#[tokio::test]
async fn margin_band_checkbox_claim_pruned_kept_lower_down() {
    // Two identical checkbox rows: one at 5% page height, one at 50%.
    // Both have backing rectangles; only the lower claim survives.
    let hi_y = PAGE_H * 0.05;
    let lo_y = PAGE_H * 0.5;
    let mut elements = Vec::new();
    for (y0, _) in [(hi_y, "hi"), (lo_y, "lo")] {
        elements.push(json!({"type": "rectangle", "x": 45.0, "y": y0 - 4.0,
            "width": 340.0, "height": 26.0, "properties": {"fill": "transparent"}}));
        for i in 0..7 {
            elements.push(json!({"type": "rectangle", "x": 50.0 + i as f32 * 50.0, "y": y0,
                "width": 18.0, "height": 18.0, "properties": {"fill": "transparent"}}));
        }
    }
    let page = PageInput::new(
        0,
        DynamicImage::ImageRgb8(blank_raster()),
        page_content(serde_json::Value::Array(elements)),
    );

    let claim_box = |y: f32| {
        json!({"x": 45.0 / PAGE_W * 100.0, "y": (y - 4.0) / PAGE_H * 100.0,
               "width": 340.0 / PAGE_W * 100.0, "height": 26.0 / PAGE_H * 100.0})
    };
    let detectors = Detectors::new(
        None,
        Some(semantic_json(json!({
            "checkbox_groups": [{"box": claim_box(hi_y)}, {"box": claim_box(lo_y)}]
        }))),
    );

    let output = extract(vec![page], &detectors, &config()).await.unwrap();
    let lists: Vec<_> = output
        .blocks
        .iter()
        .filter(|b| b.kind == BlockKind::CheckboxList)
        .collect();
    assert_eq!(lists.len(), 1, "only the mid-page claim survives");
    assert!(lists[0].bbox.y > PAGE_H * 0.4);
    match &lists[0].attrs {
        BlockAttrs::CheckboxList { cells } => assert_eq!(cells.len(), 7),
        other => panic!("wrong attrs: {other:?}"),
    }
}

// ── Degraded mode ────────────────────────────────────────────────────────────

#[tokio::test]
async fn semantic_timeout_degrades_but_still_yields_geometric_blocks() {
    let detectors = Detectors::new(
        Some(geometric(vec![table_detection()])),
        Some(Arc::new(HangingSemantic)),
    );
    let config = ExtractionConfig::builder()
        .dpi(72)
        .render_overlays(false)
        .detector_timeout_secs(1)
        .build()
        .unwrap();

    let output = extract(vec![table_page()], &detectors, &config)
        .await
        .unwrap();

    assert_eq!(output.pages[0].status, PageStatus::Degraded);
    assert!(matches!(
        output.pages[0].error,
        Some(pagefuse::PageError::DetectorTimeout { .. })
    ));

    // Grid and header blocks still come from geometric + primitives.
    assert!(output.blocks.iter().any(|b| b.kind == BlockKind::Grid));
    assert!(output.blocks.iter().any(|b| b.kind == BlockKind::Header));
    let grid = output
        .blocks
        .iter()
        .find(|b| b.kind == BlockKind::Grid)
        .unwrap();
    match &grid.attrs {
        BlockAttrs::Grid { rows, headers, .. } => {
            assert_eq!(*rows, 11);
            assert!(headers.is_empty(), "headers needed the semantic detector");
        }
        other => panic!("wrong attrs: {other:?}"),
    }
}

#[tokio::test]
async fn failing_semantic_detector_is_degraded_not_failed() {
    struct BrokenSemantic;
    #[async_trait]
    impl SemanticDetector for BrokenSemantic {
        async fn analyze(&self, _page: &PageView<'_>) -> Result<SemanticPayload, DetectorError> {
            Err(DetectorError::MalformedOutput("model returned prose".into()))
        }
    }

    let detectors = Detectors::new(
        Some(geometric(vec![table_detection()])),
        Some(Arc::new(BrokenSemantic)),
    );
    let output = extract(vec![table_page()], &detectors, &config())
        .await
        .unwrap();
    assert_eq!(output.pages[0].status, PageStatus::Degraded);
    assert!(output.blocks.iter().any(|b| b.kind == BlockKind::Grid));
}

// ── Per-page isolation ───────────────────────────────────────────────────────

#[tokio::test]
async fn malformed_page_fails_alone() {
    let good = table_page();
    let bad = PageInput::new(
        1,
        DynamicImage::ImageRgb8(blank_raster()),
        page_content(json!([
            {"type": "wedge", "x": 0.0, "y": 0.0, "width": 10.0, "height": 10.0}
        ])),
    );

    let detectors = Detectors::new(Some(geometric(vec![table_detection()])), None);
    let output = extract(vec![good, bad], &detectors, &config())
        .await
        .unwrap();

    assert_eq!(output.stats.total_pages, 2);
    assert_eq!(output.stats.failed_pages, 1);
    assert_eq!(output.pages[1].status, PageStatus::Failed);
    // The failed page contributes nothing; the good page is unaffected.
    assert!(output.blocks.iter().all(|b| b.page_index == 0));
    assert!(output.blocks.iter().any(|b| b.kind == BlockKind::Grid));
}

// ── Idempotence ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn repeated_runs_are_byte_identical() {
    let detectors = Detectors::new(
        Some(geometric(vec![table_detection()])),
        Some(semantic_json(weekday_headers())),
    );
    let cfg = config();

    let a = extract(vec![table_page()], &detectors, &cfg).await.unwrap();
    let b = extract(vec![table_page()], &detectors, &cfg).await.unwrap();

    assert_eq!(
        serde_json::to_string(&a.blocks).unwrap(),
        serde_json::to_string(&b.blocks).unwrap()
    );
    assert_eq!(
        serde_json::to_string(&a.elements).unwrap(),
        serde_json::to_string(&b.elements).unwrap()
    );
    let ids: Vec<&str> = a.blocks.iter().map(|b| b.id.as_str()).collect();
    let ids_b: Vec<&str> = b.blocks.iter().map(|b| b.id.as_str()).collect();
    assert_eq!(ids, ids_b);
}

// ── Detector selection ───────────────────────────────────────────────────────

#[tokio::test]
async fn geometric_only_selection_ignores_semantic_detector() {
    let detectors = Detectors::new(
        Some(geometric(vec![table_detection()])),
        Some(semantic_json(weekday_headers())),
    );
    let config = ExtractionConfig::builder()
        .dpi(72)
        .render_overlays(false)
        .detectors(pagefuse::DetectorSelection::GeometricOnly)
        .build()
        .unwrap();

    let output = extract(vec![table_page()], &detectors, &config)
        .await
        .unwrap();
    assert_eq!(output.stats.semantic_detections, 0);
    let grid = output
        .blocks
        .iter()
        .find(|b| b.kind == BlockKind::Grid)
        .unwrap();
    match &grid.attrs {
        BlockAttrs::Grid { headers, .. } => assert!(headers.is_empty()),
        other => panic!("wrong attrs: {other:?}"),
    }
}

// ── Cross-detector fusion ────────────────────────────────────────────────────

#[tokio::test]
async fn labeled_input_claim_merges_and_header_title_grounds() {
    // Page with a title text, an input rectangle, and a claim whose
    // approximate box is deliberately off by a margin.
    let content = page_content(json!([
        {"type": "text", "x": 100.0, "y": 40.0, "width": 230.0, "height": 40.0,
         "properties": {"text": "READING LOG", "fontSize": 36.0}},
        {"type": "rectangle", "x": 120.0, "y": 400.0, "width": 250.0, "height": 22.0,
         "properties": {"fill": "transparent"}},
    ]));
    let page = PageInput::new(0, DynamicImage::ImageRgb8(blank_raster()), content);

    let detectors = Detectors::new(
        None,
        Some(semantic_json(json!({
            "header_title": "Reading Log",
            "labeled_fields": [{
                "label": "Title",
                "box": {"x": 118.0 / PAGE_W * 100.0, "y": 396.0 / PAGE_H * 100.0,
                        "width": 258.0 / PAGE_W * 100.0, "height": 30.0 / PAGE_H * 100.0}
            }]
        }))),
    );

    let output = extract(vec![page], &detectors, &config()).await.unwrap();

    let header = output
        .blocks
        .iter()
        .find(|b| b.kind == BlockKind::Header)
        .expect("header grounded by text match");
    assert!((header.bbox.y - 40.0).abs() < 0.01);

    let input = output
        .blocks
        .iter()
        .find(|b| b.kind == BlockKind::LabeledInput)
        .expect("labeled input grounded");
    // Snapped to the rectangle primitive's exact box.
    assert!((input.bbox.x - 120.0).abs() < 0.01);
    assert!((input.bbox.w - 250.0).abs() < 0.01);
    match &input.attrs {
        BlockAttrs::LabeledInput { label, .. } => assert_eq!(label, "Title"),
        other => panic!("wrong attrs: {other:?}"),
    }
}

#[tokio::test]
async fn semantic_claim_attached_to_overlapping_geometric_detection() {
    let page = table_page();
    let detectors = Detectors::new(
        Some(geometric(vec![table_detection()])),
        Some(semantic_json(weekday_headers())),
    );
    let output = extract(vec![page], &detectors, &config()).await.unwrap();

    let grid = output
        .blocks
        .iter()
        .find(|b| b.kind == BlockKind::Grid)
        .unwrap();
    // Both sources contributed.
    assert!(grid
        .provenance
        .sources
        .contains(&pagefuse::DetectionSource::Geometric));
    assert!(grid
        .provenance
        .sources
        .contains(&pagefuse::DetectionSource::Semantic));
}

// ── Detection model sanity used by the mocks ─────────────────────────────────

#[test]
fn detection_claim_shapes_serialise() {
    let det = Detection::semantic(
        DetectionClass::GridHeaders,
        None,
        SemanticClaim::GridHeaders {
            columns: vec!["Mon".into()],
            column_centers: vec![],
        },
    );
    let json = serde_json::to_string(&det).unwrap();
    assert!(json.contains("\"source\":\"semantic\""));
}
