//! The emitted block schema and its flattened renderable form.
//!
//! A [`Block`] is the terminal output of the engine: a grounded,
//! deduplicated structural unit with per-kind attributes and a provenance
//! record naming the primitives and detector sources that justified it.
//! Blocks are never mutated after assembly — re-running extraction
//! replaces a page's whole set.
//!
//! [`FlattenedElement`] is the sibling output consumed by the canvas
//! editor: plain text/rectangle/line records with the style property
//! vocabulary the editor already understands (`fontFamily`, `stroke`,
//! `strokeWidth`, …), one list per pattern. The property defaults here are
//! that collaborator's contract, not aesthetics this crate owns.

use crate::detector::DetectionSource;
use crate::geometry::BBox;
use serde::{Deserialize, Serialize};

/// Block type vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Grid,
    Header,
    CheckboxList,
    LabeledInput,
    TextRegion,
}

impl BlockKind {
    /// Short slug used in block ids.
    pub fn slug(&self) -> &'static str {
        match self {
            BlockKind::Grid => "grid",
            BlockKind::Header => "header",
            BlockKind::CheckboxList => "checkboxes",
            BlockKind::LabeledInput => "input",
            BlockKind::TextRegion => "text",
        }
    }
}

/// Kind-specific block attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockAttrs {
    Grid {
        rows: usize,
        cols: usize,
        /// Column header labels; empty when none aligned.
        headers: Vec<String>,
    },
    Header {
        text: String,
        font_size: f32,
    },
    CheckboxList {
        /// One box per checkbox cell, in page points.
        cells: Vec<BBox>,
    },
    LabeledInput {
        label: String,
        /// The input area the label refers to.
        input_box: BBox,
    },
    TextRegion {
        text: Option<String>,
    },
}

impl BlockAttrs {
    pub fn kind(&self) -> BlockKind {
        match self {
            BlockAttrs::Grid { .. } => BlockKind::Grid,
            BlockAttrs::Header { .. } => BlockKind::Header,
            BlockAttrs::CheckboxList { .. } => BlockKind::CheckboxList,
            BlockAttrs::LabeledInput { .. } => BlockKind::LabeledInput,
            BlockAttrs::TextRegion { .. } => BlockKind::TextRegion,
        }
    }
}

/// Which primitives and detector sources grounded a block.
///
/// `primitives` indexes into the page's primitive set (post-reinforcement
/// order, which is deterministic). An empty primitive list is a bug by
/// construction: the assembler refuses to build such a block.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Provenance {
    pub primitives: Vec<usize>,
    pub sources: Vec<DetectionSource>,
}

impl Provenance {
    pub fn new(mut primitives: Vec<usize>, mut sources: Vec<DetectionSource>) -> Self {
        primitives.sort_unstable();
        primitives.dedup();
        sources.dedup();
        Self {
            primitives,
            sources,
        }
    }
}

/// A validated, grounded structural unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: BlockKind,
    pub bbox: BBox,
    pub page_index: usize,
    pub provenance: Provenance,
    pub attrs: BlockAttrs,
}

// ── Flattened elements ───────────────────────────────────────────────────

/// Element type vocabulary of the editor contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Text,
    Rectangle,
    Line,
}

/// Style properties in the editor's vocabulary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ElementProperties {
    Text {
        text: String,
        #[serde(rename = "fontSize")]
        font_size: f32,
        #[serde(rename = "fontFamily")]
        font_family: String,
        color: String,
        align: String,
    },
    Shape {
        fill: Option<String>,
        stroke: String,
        #[serde(rename = "strokeWidth")]
        stroke_width: f32,
    },
}

/// A directly renderable element flattened from a block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlattenedElement {
    #[serde(rename = "type")]
    pub kind: ElementKind,
    pub page_index: usize,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub properties: ElementProperties,
}

impl FlattenedElement {
    pub fn text(page_index: usize, bbox: BBox, text: impl Into<String>, font_size: f32) -> Self {
        Self {
            kind: ElementKind::Text,
            page_index,
            x: bbox.x,
            y: bbox.y,
            width: bbox.w,
            height: bbox.h,
            properties: ElementProperties::Text {
                text: text.into(),
                font_size,
                font_family: "Helvetica".into(),
                color: "#2C2C2C".into(),
                align: "left".into(),
            },
        }
    }

    pub fn rectangle(page_index: usize, bbox: BBox) -> Self {
        Self {
            kind: ElementKind::Rectangle,
            page_index,
            x: bbox.x,
            y: bbox.y,
            width: bbox.w,
            height: bbox.h,
            properties: ElementProperties::Shape {
                fill: Some("transparent".into()),
                stroke: "#CCCCCC".into(),
                stroke_width: 0.5,
            },
        }
    }

    pub fn line(page_index: usize, bbox: BBox) -> Self {
        Self {
            kind: ElementKind::Line,
            page_index,
            x: bbox.x,
            y: bbox.y,
            width: bbox.w,
            height: bbox.h,
            properties: ElementProperties::Shape {
                fill: None,
                stroke: "#CCCCCC".into(),
                stroke_width: 0.5,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attrs_kind_matches() {
        let a = BlockAttrs::Grid {
            rows: 5,
            cols: 7,
            headers: vec![],
        };
        assert_eq!(a.kind(), BlockKind::Grid);
        assert_eq!(a.kind().slug(), "grid");
    }

    #[test]
    fn provenance_sorts_and_dedups() {
        let p = Provenance::new(
            vec![5, 1, 5, 3],
            vec![DetectionSource::Geometric, DetectionSource::Geometric],
        );
        assert_eq!(p.primitives, vec![1, 3, 5]);
        assert_eq!(p.sources, vec![DetectionSource::Geometric]);
    }

    #[test]
    fn block_serialises_with_type_field() {
        let b = Block {
            id: "p001-grid-01".into(),
            kind: BlockKind::Grid,
            bbox: BBox::new(36.0, 36.0, 360.0, 500.0),
            page_index: 0,
            provenance: Provenance::new(vec![0], vec![DetectionSource::Geometric]),
            attrs: BlockAttrs::Grid {
                rows: 10,
                cols: 7,
                headers: vec!["Mon".into(), "Tue".into()],
            },
        };
        let json = serde_json::to_string(&b).unwrap();
        assert!(json.contains("\"type\":\"grid\""), "got: {json}");
        let back: Block = serde_json::from_str(&json).unwrap();
        assert_eq!(back, b);
    }

    #[test]
    fn flattened_text_carries_editor_defaults() {
        let e = FlattenedElement::text(0, BBox::new(36.0, 40.0, 200.0, 30.0), "WEEKLY PLAN", 36.0);
        let json = serde_json::to_string(&e).unwrap();
        assert!(json.contains("\"fontFamily\":\"Helvetica\""));
        assert!(json.contains("\"color\":\"#2C2C2C\""));
    }

    #[test]
    fn flattened_rectangle_round_trips() {
        let e = FlattenedElement::rectangle(1, BBox::new(50.0, 400.0, 18.0, 18.0));
        let json = serde_json::to_string(&e).unwrap();
        assert!(json.contains("\"strokeWidth\":0.5"));
        let back: FlattenedElement = serde_json::from_str(&json).unwrap();
        assert_eq!(back, e);
    }
}
