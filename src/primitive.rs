//! Ground-truth page primitives.
//!
//! A [`Primitive`] is an atomic geometric fact extracted from the page's
//! vector content (or recovered from the raster by line reinforcement).
//! Primitives are the only trusted geometry in the pipeline: detector
//! output is provisional until the fusion engine has matched it against
//! them. They are created once per page and never mutated afterwards —
//! the single exception is the reinforcement pass, which runs before any
//! detector and may append synthetic lines or reclassify line-shaped
//! rectangles in place.

use crate::geometry::BBox;
use serde::{Deserialize, Serialize};

/// Direction of a line primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    Horizontal,
    Vertical,
}

/// Kind-specific payload of a [`Primitive`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PrimitiveKind {
    /// A run of text with its source content.
    TextRun { text: String, font_size: f32 },
    /// A straight rule. `synthetic` marks lines recovered from the raster
    /// rather than present in the vector layer.
    Line {
        orientation: Orientation,
        thickness: f32,
        synthetic: bool,
    },
    /// A rectangle outline or filled area.
    Rectangle { filled: bool },
}

/// An atomic, ground-truth geometric fact in page points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Primitive {
    #[serde(flatten)]
    pub kind: PrimitiveKind,
    pub bbox: BBox,
}

impl Primitive {
    pub fn text_run(bbox: BBox, text: impl Into<String>, font_size: f32) -> Self {
        Self {
            kind: PrimitiveKind::TextRun {
                text: text.into(),
                font_size,
            },
            bbox,
        }
    }

    pub fn line(bbox: BBox, orientation: Orientation, thickness: f32) -> Self {
        Self {
            kind: PrimitiveKind::Line {
                orientation,
                thickness,
                synthetic: false,
            },
            bbox,
        }
    }

    pub fn synthetic_line(bbox: BBox, orientation: Orientation, thickness: f32) -> Self {
        Self {
            kind: PrimitiveKind::Line {
                orientation,
                thickness,
                synthetic: true,
            },
            bbox,
        }
    }

    pub fn rectangle(bbox: BBox, filled: bool) -> Self {
        Self {
            kind: PrimitiveKind::Rectangle { filled },
            bbox,
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self.kind, PrimitiveKind::TextRun { .. })
    }

    pub fn is_line(&self) -> bool {
        matches!(self.kind, PrimitiveKind::Line { .. })
    }

    pub fn is_rectangle(&self) -> bool {
        matches!(self.kind, PrimitiveKind::Rectangle { .. })
    }

    /// Text content, for text runs.
    pub fn text(&self) -> Option<&str> {
        match &self.kind {
            PrimitiveKind::TextRun { text, .. } => Some(text),
            _ => None,
        }
    }

    /// Line orientation, for lines.
    pub fn orientation(&self) -> Option<Orientation> {
        match self.kind {
            PrimitiveKind::Line { orientation, .. } => Some(orientation),
            _ => None,
        }
    }
}

/// Deduce orientation from an extent: the longer axis wins, ties are
/// horizontal (a square "line" is noise either way).
pub fn orientation_of(w: f32, h: f32) -> Orientation {
    if h > w {
        Orientation::Vertical
    } else {
        Orientation::Horizontal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors_match_kind() {
        let t = Primitive::text_run(BBox::new(0.0, 0.0, 50.0, 12.0), "Notes", 12.0);
        assert!(t.is_text());
        assert_eq!(t.text(), Some("Notes"));
        assert_eq!(t.orientation(), None);

        let l = Primitive::line(BBox::new(0.0, 0.0, 200.0, 1.0), Orientation::Horizontal, 0.5);
        assert!(l.is_line());
        assert_eq!(l.orientation(), Some(Orientation::Horizontal));

        let r = Primitive::rectangle(BBox::new(0.0, 0.0, 20.0, 20.0), false);
        assert!(r.is_rectangle());
    }

    #[test]
    fn orientation_from_extent() {
        assert_eq!(orientation_of(100.0, 2.0), Orientation::Horizontal);
        assert_eq!(orientation_of(2.0, 100.0), Orientation::Vertical);
        assert_eq!(orientation_of(5.0, 5.0), Orientation::Horizontal);
    }

    #[test]
    fn serde_tags_kinds() {
        let l = Primitive::synthetic_line(
            BBox::new(10.0, 10.0, 300.0, 1.0),
            Orientation::Horizontal,
            1.0,
        );
        let json = serde_json::to_string(&l).unwrap();
        assert!(json.contains("\"kind\":\"line\""), "got: {json}");
        assert!(json.contains("\"synthetic\":true"));
        let back: Primitive = serde_json::from_str(&json).unwrap();
        assert_eq!(back, l);
    }
}
