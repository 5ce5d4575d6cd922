//! Vector primitive extraction: typed primitives from a page's raw
//! vector content.
//!
//! The rasterizer's page JSON is the closest thing this engine has to
//! ground truth, so parsing is strict: non-finite coordinates, negative
//! extents, an unknown element kind, or a foreign coordinate system all
//! fail the page with [`PageError::MalformedPage`] rather than being
//! silently repaired. The one permitted repair is degenerate line height —
//! vector tools routinely emit rules with `height: 0`, and a zero-extent
//! box would be invisible to every IoU test downstream, so lines are given
//! their stroke thickness as height.
//!
//! Parsing is deterministic: the same JSON always yields the same
//! primitives in the same order (document order).

use crate::error::PageError;
use crate::geometry::BBox;
use crate::primitive::{orientation_of, Primitive};
use serde::Deserialize;

/// Fallback thickness for lines whose stroke width is absent, in points.
const DEFAULT_LINE_THICKNESS: f32 = 0.75;

/// Typed form of the rasterizer's page JSON.
#[derive(Debug, Deserialize)]
pub struct PageContent {
    #[serde(default)]
    pub page_index: usize,
    pub width: f32,
    pub height: f32,
    #[serde(default)]
    pub coord_system: Option<String>,
    #[serde(default)]
    pub elements: Vec<RawElement>,
}

/// One untyped element as the rasterizer wrote it.
#[derive(Debug, Deserialize)]
pub struct RawElement {
    #[serde(rename = "type")]
    pub kind: String,
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub width: f32,
    #[serde(default)]
    pub height: f32,
    #[serde(default)]
    pub properties: RawProperties,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawProperties {
    pub text: Option<String>,
    #[serde(rename = "fontSize")]
    pub font_size: Option<f32>,
    pub fill: Option<String>,
    #[serde(rename = "strokeWidth")]
    pub stroke_width: Option<f32>,
}

/// A page's parsed geometry: dimensions plus the primitive set.
#[derive(Debug)]
pub struct ParsedPage {
    pub width: f32,
    pub height: f32,
    pub primitives: Vec<Primitive>,
}

/// Parse a page's raw content JSON into typed primitives.
pub fn parse_page(index: usize, content: &serde_json::Value) -> Result<ParsedPage, PageError> {
    let content: PageContent =
        serde_json::from_value(content.clone()).map_err(|e| PageError::MalformedPage {
            page: index,
            detail: format!("content does not match page schema: {e}"),
        })?;

    if !(content.width.is_finite() && content.width > 0.0)
        || !(content.height.is_finite() && content.height > 0.0)
    {
        return Err(PageError::MalformedPage {
            page: index,
            detail: format!(
                "page dimensions invalid: {} x {}",
                content.width, content.height
            ),
        });
    }

    if let Some(cs) = content.coord_system.as_deref() {
        if cs != "top-left" {
            return Err(PageError::MalformedPage {
                page: index,
                detail: format!("unsupported coord_system '{cs}' (expected 'top-left')"),
            });
        }
    }

    let mut primitives = Vec::with_capacity(content.elements.len());
    for (i, el) in content.elements.iter().enumerate() {
        if let Some(p) = parse_element(index, i, el)? {
            primitives.push(p);
        }
    }

    Ok(ParsedPage {
        width: content.width,
        height: content.height,
        primitives,
    })
}

fn parse_element(
    page: usize,
    ordinal: usize,
    el: &RawElement,
) -> Result<Option<Primitive>, PageError> {
    let bad = |detail: String| PageError::MalformedPage { page, detail };

    for (name, v) in [
        ("x", el.x),
        ("y", el.y),
        ("width", el.width),
        ("height", el.height),
    ] {
        if !v.is_finite() {
            return Err(bad(format!("element {ordinal}: non-finite {name}")));
        }
    }
    if el.width < 0.0 || el.height < 0.0 {
        return Err(bad(format!(
            "element {ordinal}: negative extent {} x {}",
            el.width, el.height
        )));
    }

    match el.kind.as_str() {
        "text" => {
            let text = el.properties.text.as_deref().unwrap_or("").trim();
            // Empty runs carry no information worth grounding against.
            if text.is_empty() {
                return Ok(None);
            }
            let font_size = el.properties.font_size.unwrap_or(12.0);
            let bbox = BBox::new(el.x, el.y, el.width.max(1.0), el.height.max(1.0));
            Ok(Some(Primitive::text_run(bbox, text, font_size)))
        }
        "rectangle" => {
            if el.width == 0.0 || el.height == 0.0 {
                return Err(bad(format!("element {ordinal}: zero-extent rectangle")));
            }
            let filled = matches!(
                el.properties.fill.as_deref(),
                Some(f) if f != "transparent" && f != "none" && !f.is_empty()
            );
            Ok(Some(Primitive::rectangle(
                BBox::new(el.x, el.y, el.width, el.height),
                filled,
            )))
        }
        "line" => {
            let thickness = el
                .properties
                .stroke_width
                .filter(|t| t.is_finite() && *t > 0.0)
                .unwrap_or(DEFAULT_LINE_THICKNESS);
            let orientation = orientation_of(el.width, el.height);
            // Give degenerate extents the stroke thickness so the line has
            // a real box for IoU tests.
            let w = if el.width <= 0.0 { thickness } else { el.width };
            let h = if el.height <= 0.0 { thickness } else { el.height };
            Ok(Some(Primitive::line(
                BBox::new(el.x, el.y, w, h),
                orientation,
                thickness,
            )))
        }
        other => Err(bad(format!("element {ordinal}: unknown kind '{other}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitive::Orientation;
    use serde_json::json;

    fn content(elements: serde_json::Value) -> serde_json::Value {
        json!({
            "page_index": 0,
            "width": 432.0,
            "height": 648.0,
            "coord_system": "top-left",
            "elements": elements,
        })
    }

    #[test]
    fn parses_the_three_kinds() {
        let v = content(json!([
            {"type": "text", "x": 36.0, "y": 40.0, "width": 200.0, "height": 30.0,
             "properties": {"text": "WEEKLY PLAN", "fontSize": 36.0}},
            {"type": "rectangle", "x": 36.0, "y": 100.0, "width": 360.0, "height": 500.0,
             "properties": {"fill": "transparent"}},
            {"type": "line", "x": 36.0, "y": 150.0, "width": 360.0, "height": 0.0,
             "properties": {"strokeWidth": 0.5}},
        ]));
        let page = parse_page(0, &v).unwrap();
        assert_eq!(page.primitives.len(), 3);
        assert_eq!(page.primitives[0].text(), Some("WEEKLY PLAN"));
        assert!(page.primitives[1].is_rectangle());
        assert_eq!(
            page.primitives[2].orientation(),
            Some(Orientation::Horizontal)
        );
        // Degenerate line height replaced by stroke width.
        assert_eq!(page.primitives[2].bbox.h, 0.5);
    }

    #[test]
    fn same_input_same_output() {
        let v = content(json!([
            {"type": "text", "x": 1.0, "y": 2.0, "width": 30.0, "height": 10.0,
             "properties": {"text": "a"}},
            {"type": "line", "x": 0.0, "y": 0.0, "width": 100.0, "height": 0.0},
        ]));
        let a = parse_page(0, &v).unwrap();
        let b = parse_page(0, &v).unwrap();
        assert_eq!(a.primitives, b.primitives);
    }

    #[test]
    fn empty_text_runs_are_skipped() {
        let v = content(json!([
            {"type": "text", "x": 0.0, "y": 0.0, "width": 10.0, "height": 10.0,
             "properties": {"text": "   "}},
        ]));
        let page = parse_page(0, &v).unwrap();
        assert!(page.primitives.is_empty());
    }

    #[test]
    fn unknown_kind_is_malformed() {
        let v = content(json!([
            {"type": "bezier", "x": 0.0, "y": 0.0, "width": 10.0, "height": 10.0},
        ]));
        let err = parse_page(3, &v).unwrap_err();
        assert!(matches!(err, PageError::MalformedPage { page: 3, .. }));
        assert!(err.to_string().contains("bezier"));
    }

    #[test]
    fn non_finite_coordinate_is_malformed() {
        let v = content(json!([
            {"type": "rectangle", "x": null, "y": 0.0, "width": 10.0, "height": 10.0},
        ]));
        // null x fails schema deserialization
        assert!(parse_page(0, &v).is_err());
    }

    #[test]
    fn bad_page_dimensions_are_malformed() {
        let v = json!({"width": 0.0, "height": 648.0, "elements": []});
        let err = parse_page(0, &v).unwrap_err();
        assert!(err.to_string().contains("dimensions"));
    }

    #[test]
    fn foreign_coord_system_is_malformed() {
        let v = json!({"width": 432.0, "height": 648.0, "coord_system": "bottom-left", "elements": []});
        let err = parse_page(0, &v).unwrap_err();
        assert!(err.to_string().contains("bottom-left"));
    }
}
