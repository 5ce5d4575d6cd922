//! Raster line reinforcement: recover rules the vector layer lost.
//!
//! Two cheap repairs run before any detector sees the page:
//!
//! 1. **Thin-rectangle reclassification** — vector tools commonly draw
//!    rules as filled rectangles a fraction of a point tall. Any rectangle
//!    whose aspect ratio exceeds `line_aspect_ratio` becomes a `line`
//!    primitive of matching orientation, in place.
//! 2. **Raster edge recovery** — the page raster is thresholded to a dark
//!    mask and scanned row-by-row and column-by-column for dark runs
//!    spanning at least `reinforce_min_run_fraction` of the page. A run
//!    with no existing line or rectangle edge within
//!    `reinforce_tolerance_px` becomes a *synthetic* line primitive.
//!
//! Both passes are additive or reclassifying; no true primitive is ever
//! removed. The synthetic flag lets downstream consumers (and tests) tell
//! recovered geometry from native geometry.

use crate::config::ExtractionConfig;
use crate::geometry::BBox;
use crate::primitive::{Orientation, Primitive, PrimitiveKind};
use image::DynamicImage;
use tracing::debug;

/// What the reinforcement pass did to a page.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReinforceStats {
    pub reclassified: usize,
    pub recovered: usize,
}

/// A maximal dark run band, in pixel coordinates.
#[derive(Debug, Clone, Copy)]
struct Band {
    /// Cross-axis start (first row for horizontal bands, first column for
    /// vertical ones).
    pos0: u32,
    pos1: u32,
    /// Along-axis span.
    span0: u32,
    span1: u32,
}

/// Run reinforcement over one page, mutating its primitive set.
///
/// `page_w` fixes the pixel-to-point scale; the vertical scale follows
/// from square pixels.
pub fn reinforce(
    primitives: &mut Vec<Primitive>,
    image: &DynamicImage,
    page_w: f32,
    config: &ExtractionConfig,
) -> ReinforceStats {
    let mut stats = ReinforceStats::default();

    stats.reclassified = reclassify_thin_rects(primitives, config.line_aspect_ratio);

    let px_per_pt = image.width() as f32 / page_w;
    if px_per_pt <= 0.0 || !px_per_pt.is_finite() {
        return stats;
    }

    let gray = image.to_luma8();
    let (w, h) = (gray.width(), gray.height());
    if w < 4 || h < 4 {
        return stats;
    }
    let data = gray.as_raw();

    let min_h_run = ((w as f32) * config.reinforce_min_run_fraction) as u32;
    let min_v_run = ((h as f32) * config.reinforce_min_run_fraction) as u32;
    let tol_pt = config.reinforce_tolerance_px as f32 / px_per_pt;

    let h_bands = scan_bands(
        |pos, along| data[(pos * w + along) as usize] <= config.dark_threshold,
        h,
        w,
        min_h_run,
    );
    let v_bands = scan_bands(
        |pos, along| data[(along * w + pos) as usize] <= config.dark_threshold,
        w,
        h,
        min_v_run,
    );

    for band in h_bands {
        let bbox = BBox::new(
            band.span0 as f32 / px_per_pt,
            band.pos0 as f32 / px_per_pt,
            (band.span1 - band.span0 + 1) as f32 / px_per_pt,
            (band.pos1 - band.pos0 + 1) as f32 / px_per_pt,
        );
        if covered(primitives, &bbox, Orientation::Horizontal, tol_pt) {
            continue;
        }
        let thickness = bbox.h.max(0.25);
        primitives.push(Primitive::synthetic_line(
            bbox,
            Orientation::Horizontal,
            thickness,
        ));
        stats.recovered += 1;
    }

    for band in v_bands {
        let bbox = BBox::new(
            band.pos0 as f32 / px_per_pt,
            band.span0 as f32 / px_per_pt,
            (band.pos1 - band.pos0 + 1) as f32 / px_per_pt,
            (band.span1 - band.span0 + 1) as f32 / px_per_pt,
        );
        if covered(primitives, &bbox, Orientation::Vertical, tol_pt) {
            continue;
        }
        let thickness = bbox.w.max(0.25);
        primitives.push(Primitive::synthetic_line(
            bbox,
            Orientation::Vertical,
            thickness,
        ));
        stats.recovered += 1;
    }

    if stats.reclassified > 0 || stats.recovered > 0 {
        debug!(
            "Reinforcement: {} rectangles reclassified, {} raster lines recovered",
            stats.reclassified, stats.recovered
        );
    }
    stats
}

/// Reclassify line-shaped rectangles in place. Returns the count changed.
fn reclassify_thin_rects(primitives: &mut [Primitive], aspect_ratio: f32) -> usize {
    let mut changed = 0;
    for p in primitives.iter_mut() {
        if !matches!(p.kind, PrimitiveKind::Rectangle { .. }) {
            continue;
        }
        let (long, short) = if p.bbox.w >= p.bbox.h {
            (p.bbox.w, p.bbox.h)
        } else {
            (p.bbox.h, p.bbox.w)
        };
        if short <= 0.0 || long / short < aspect_ratio {
            continue;
        }
        let orientation = crate::primitive::orientation_of(p.bbox.w, p.bbox.h);
        p.kind = PrimitiveKind::Line {
            orientation,
            thickness: short,
            synthetic: false,
        };
        changed += 1;
    }
    changed
}

/// Scan every cross-axis position for dark runs of at least `min_run`
/// along the other axis, merging adjacent positions whose runs overlap
/// into thick bands.
fn scan_bands(
    is_dark: impl Fn(u32, u32) -> bool,
    positions: u32,
    along: u32,
    min_run: u32,
) -> Vec<Band> {
    let mut bands: Vec<Band> = Vec::new();
    let mut open: Option<Band> = None;

    for pos in 0..positions {
        let seg = longest_run(|a| is_dark(pos, a), along);
        let seg = match seg {
            Some((s0, s1)) if s1 - s0 + 1 >= min_run.max(1) => (s0, s1),
            _ => {
                if let Some(b) = open.take() {
                    bands.push(b);
                }
                continue;
            }
        };

        match open {
            Some(ref mut b) if seg.0 <= b.span1 && seg.1 >= b.span0 && pos == b.pos1 + 1 => {
                b.pos1 = pos;
                b.span0 = b.span0.min(seg.0);
                b.span1 = b.span1.max(seg.1);
            }
            _ => {
                if let Some(b) = open.take() {
                    bands.push(b);
                }
                open = Some(Band {
                    pos0: pos,
                    pos1: pos,
                    span0: seg.0,
                    span1: seg.1,
                });
            }
        }
    }
    if let Some(b) = open {
        bands.push(b);
    }
    bands
}

/// Longest maximal dark run along one scanline.
fn longest_run(is_dark: impl Fn(u32) -> bool, len: u32) -> Option<(u32, u32)> {
    let mut best: Option<(u32, u32)> = None;
    let mut start: Option<u32> = None;
    for i in 0..len {
        if is_dark(i) {
            start.get_or_insert(i);
        } else if let Some(s) = start.take() {
            let run = (s, i - 1);
            if best.is_none_or(|b| run.1 - run.0 > b.1 - b.0) {
                best = Some(run);
            }
        }
    }
    if let Some(s) = start {
        let run = (s, len - 1);
        if best.is_none_or(|b| run.1 - run.0 > b.1 - b.0) {
            best = Some(run);
        }
    }
    best
}

/// Is a recovered band already represented by a vector primitive?
///
/// A line of matching orientation counts when its cross-axis centre is
/// within tolerance and its span overlaps; a rectangle counts when one of
/// its parallel edges is within tolerance and spans overlap.
fn covered(primitives: &[Primitive], bbox: &BBox, orientation: Orientation, tol: f32) -> bool {
    let (center, span0, span1) = match orientation {
        Orientation::Horizontal => (bbox.y + bbox.h / 2.0, bbox.x, bbox.x1()),
        Orientation::Vertical => (bbox.x + bbox.w / 2.0, bbox.y, bbox.y1()),
    };

    primitives.iter().any(|p| match &p.kind {
        PrimitiveKind::Line {
            orientation: o, ..
        } if *o == orientation => {
            let (pc, p0, p1) = match orientation {
                Orientation::Horizontal => (p.bbox.y + p.bbox.h / 2.0, p.bbox.x, p.bbox.x1()),
                Orientation::Vertical => (p.bbox.x + p.bbox.w / 2.0, p.bbox.y, p.bbox.y1()),
            };
            (pc - center).abs() <= tol && spans_overlap(span0, span1, p0, p1)
        }
        PrimitiveKind::Rectangle { .. } => {
            let (edges, p0, p1) = match orientation {
                Orientation::Horizontal => ([p.bbox.y, p.bbox.y1()], p.bbox.x, p.bbox.x1()),
                Orientation::Vertical => ([p.bbox.x, p.bbox.x1()], p.bbox.y, p.bbox.y1()),
            };
            edges.iter().any(|e| (e - center).abs() <= tol) && spans_overlap(span0, span1, p0, p1)
        }
        _ => false,
    })
}

fn spans_overlap(a0: f32, a1: f32, b0: f32, b1: f32) -> bool {
    let overlap = a1.min(b1) - a0.max(b0);
    let shorter = (a1 - a0).min(b1 - b0);
    shorter > 0.0 && overlap >= shorter * 0.5
}
