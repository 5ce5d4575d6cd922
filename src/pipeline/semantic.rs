//! Semantic detector payload: schema, recovery parsing, and conversion
//! into detections.
//!
//! ## The payload contract
//!
//! Vision-language models describe layout in loose structured output:
//! labelled input fields, grid column headers, checkbox groups, and an
//! optional page header title, with geometry given as *percent of page
//! dimensions* ("about here"). That geometry is never trusted — the
//! fusion engine replaces it with a grounded primitive's box or discards
//! the claim.
//!
//! ## Recovery parsing
//!
//! Models wrap JSON in markdown fences and prepend prose no matter how
//! firmly the prompt forbids it. [`parse_semantic_payload`] strips an
//! outer fence, falls back to the outermost `{…}` span, and only then
//! gives up — the same cheap determinism-over-prompting stance the rest
//! of the pipeline takes.

use crate::detector::{Detection, DetectionClass, SemanticClaim};
use crate::error::DetectorError;
use crate::geometry::BBox;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// An approximate box in percent of page dimensions (0–100).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PctBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl PctBox {
    /// Convert to page points, clamping into the page.
    pub fn to_page(&self, page_w: f32, page_h: f32) -> Option<BBox> {
        if ![self.x, self.y, self.width, self.height]
            .iter()
            .all(|v| v.is_finite())
        {
            return None;
        }
        let x = (self.x.clamp(0.0, 100.0) / 100.0) * page_w;
        let y = (self.y.clamp(0.0, 100.0) / 100.0) * page_h;
        let w = (self.width.clamp(0.0, 100.0) / 100.0) * page_w;
        let h = (self.height.clamp(0.0, 100.0) / 100.0) * page_h;
        let bbox = BBox::new(x, y, w.min(page_w - x), h.min(page_h - y));
        bbox.is_valid().then_some(bbox)
    }
}

/// A claimed labelled input field ("Name: ____").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledFieldClaim {
    pub label: String,
    #[serde(default, rename = "box")]
    pub bbox: Option<PctBox>,
}

/// Claimed grid column headers, in reading order. `column_boxes`, when
/// present and matching `columns` in length, gives each header its own
/// approximate box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridHeadersClaim {
    pub columns: Vec<String>,
    #[serde(default, rename = "box")]
    pub bbox: Option<PctBox>,
    #[serde(default)]
    pub column_boxes: Vec<PctBox>,
}

/// A claimed checkbox group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckboxGroupClaim {
    #[serde(default, rename = "box")]
    pub bbox: Option<PctBox>,
}

/// Everything a semantic detector may claim about one page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SemanticPayload {
    #[serde(default)]
    pub header_title: Option<String>,
    #[serde(default)]
    pub labeled_fields: Vec<LabeledFieldClaim>,
    #[serde(default)]
    pub grid_headers: Vec<GridHeadersClaim>,
    #[serde(default)]
    pub checkbox_groups: Vec<CheckboxGroupClaim>,
}

impl SemanticPayload {
    pub fn is_empty(&self) -> bool {
        self.header_title.is_none()
            && self.labeled_fields.is_empty()
            && self.grid_headers.is_empty()
            && self.checkbox_groups.is_empty()
    }
}

// ── Recovery parsing ─────────────────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:json)?\s*\n(.*)\n```\s*$").unwrap());

/// Parse a semantic payload from raw model output.
///
/// Accepts plain JSON, fenced JSON, or JSON embedded in prose. Returns
/// [`DetectorError::MalformedOutput`] when no parseable object exists.
pub fn parse_semantic_payload(text: &str) -> Result<SemanticPayload, DetectorError> {
    let trimmed = text.trim();
    let candidate = match RE_OUTER_FENCES.captures(trimmed) {
        Some(caps) => caps[1].to_string(),
        None => trimmed.to_string(),
    };

    if let Ok(payload) = serde_json::from_str::<SemanticPayload>(&candidate) {
        return Ok(payload);
    }

    // Fall back to the outermost object span: models pad JSON with prose.
    if let (Some(start), Some(end)) = (candidate.find('{'), candidate.rfind('}')) {
        if start < end {
            if let Ok(payload) = serde_json::from_str::<SemanticPayload>(&candidate[start..=end]) {
                return Ok(payload);
            }
        }
    }

    Err(DetectorError::MalformedOutput(format!(
        "no semantic payload JSON found in {} bytes of output",
        text.len()
    )))
}

// ── Claim conversion ─────────────────────────────────────────────────────

/// Convert a payload into detections in page points.
///
/// Claims that cannot possibly be grounded are dropped here with a debug
/// log: a labelled field or checkbox group with no box has no geometry to
/// validate, and emitting it ungroundable would only inflate the fusion
/// engine's discard counters. The box-less header title survives because
/// fusion grounds it by text match against text-run primitives.
pub fn payload_to_detections(
    payload: &SemanticPayload,
    page_w: f32,
    page_h: f32,
) -> Vec<Detection> {
    let mut detections = Vec::new();

    if let Some(title) = payload
        .header_title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
    {
        detections.push(Detection::semantic(
            DetectionClass::HeaderTitle,
            None,
            SemanticClaim::HeaderTitle {
                text: title.to_string(),
            },
        ));
    }

    for field in &payload.labeled_fields {
        let label = field.label.trim();
        if label.is_empty() {
            continue;
        }
        match field.bbox.and_then(|b| b.to_page(page_w, page_h)) {
            Some(bbox) => detections.push(Detection::semantic(
                DetectionClass::LabeledInput,
                Some(bbox),
                SemanticClaim::LabeledInput {
                    label: label.to_string(),
                },
            )),
            None => debug!("Dropping box-less labeled field claim '{label}'"),
        }
    }

    for headers in &payload.grid_headers {
        let columns: Vec<String> = headers
            .columns
            .iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
        if columns.is_empty() {
            continue;
        }
        let bbox = headers.bbox.and_then(|b| b.to_page(page_w, page_h));
        // Per-column centres are only meaningful when there is exactly one
        // box per surviving column.
        let column_centers: Vec<f32> = if headers.column_boxes.len() == columns.len() {
            headers
                .column_boxes
                .iter()
                .filter_map(|b| b.to_page(page_w, page_h))
                .map(|b| b.center().0)
                .collect()
        } else {
            Vec::new()
        };
        let column_centers = if column_centers.len() == columns.len() {
            column_centers
        } else {
            Vec::new()
        };
        detections.push(Detection::semantic(
            DetectionClass::GridHeaders,
            bbox,
            SemanticClaim::GridHeaders {
                columns,
                column_centers,
            },
        ));
    }

    for group in &payload.checkbox_groups {
        match group.bbox.and_then(|b| b.to_page(page_w, page_h)) {
            Some(bbox) => detections.push(Detection::semantic(
                DetectionClass::CheckboxGroup,
                Some(bbox),
                SemanticClaim::CheckboxGroup,
            )),
            None => debug!("Dropping box-less checkbox group claim"),
        }
    }

    detections
}
