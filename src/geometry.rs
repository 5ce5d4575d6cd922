//! Axis-aligned box math shared by every pipeline stage.
//!
//! All geometry in this crate is expressed as [`BBox`] values in page
//! points (1/72 inch), top-left origin, matching the coordinate system the
//! rasterizer collaborator writes into the page analysis JSON. Detector
//! wrappers convert pixel-space boxes into points at their boundary so the
//! fusion engine only ever sees one coordinate system.

use serde::{Deserialize, Serialize};

/// An axis-aligned bounding box: origin at top-left, extent rightward/downward.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x: f32,
    pub y: f32,
    #[serde(rename = "width")]
    pub w: f32,
    #[serde(rename = "height")]
    pub h: f32,
}

impl BBox {
    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    pub fn x1(&self) -> f32 {
        self.x + self.w
    }

    pub fn y1(&self) -> f32 {
        self.y + self.h
    }

    pub fn area(&self) -> f32 {
        if self.w <= 0.0 || self.h <= 0.0 {
            return 0.0;
        }
        self.w * self.h
    }

    pub fn center(&self) -> (f32, f32) {
        (self.x + self.w / 2.0, self.y + self.h / 2.0)
    }

    /// All coordinates finite and extent strictly positive.
    pub fn is_valid(&self) -> bool {
        self.x.is_finite()
            && self.y.is_finite()
            && self.w.is_finite()
            && self.h.is_finite()
            && self.w > 0.0
            && self.h > 0.0
    }

    /// Intersection box, or `None` when the boxes do not overlap.
    pub fn intersect(&self, other: &BBox) -> Option<BBox> {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.x1().min(other.x1());
        let y1 = self.y1().min(other.y1());
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(BBox::new(x0, y0, x1 - x0, y1 - y0))
    }

    /// Smallest box covering both.
    pub fn union_with(&self, other: &BBox) -> BBox {
        let x0 = self.x.min(other.x);
        let y0 = self.y.min(other.y);
        let x1 = self.x1().max(other.x1());
        let y1 = self.y1().max(other.y1());
        BBox::new(x0, y0, x1 - x0, y1 - y0)
    }

    /// Intersection-over-Union. Degenerate boxes yield 0.0, never NaN.
    pub fn iou(&self, other: &BBox) -> f32 {
        let inter = match self.intersect(other) {
            Some(b) => b.area(),
            None => return 0.0,
        };
        let union = self.area() + other.area() - inter;
        if union > 0.0 {
            inter / union
        } else {
            0.0
        }
    }

    /// Intersection-over-own-area: how much of `self` lies inside `other`.
    ///
    /// Asymmetric on purpose — used to decide whether a small box is
    /// effectively contained in a larger region even when IoU is tiny.
    pub fn ioa(&self, other: &BBox) -> f32 {
        let own = self.area();
        if own <= 0.0 {
            return 0.0;
        }
        match self.intersect(other) {
            Some(b) => b.area() / own,
            None => 0.0,
        }
    }

    /// True when `other` lies entirely within `self` (closed bounds).
    pub fn contains(&self, other: &BBox) -> bool {
        other.x >= self.x && other.y >= self.y && other.x1() <= self.x1() && other.y1() <= self.y1()
    }

    pub fn contains_point(&self, px: f32, py: f32) -> bool {
        px >= self.x && px <= self.x1() && py >= self.y && py <= self.y1()
    }

    /// Scale all coordinates by a uniform factor (px ↔ pt conversion).
    pub fn scaled(&self, factor: f32) -> BBox {
        BBox::new(
            self.x * factor,
            self.y * factor,
            self.w * factor,
            self.h * factor,
        )
    }

    /// Translate by an offset (tile-local → page coordinates).
    pub fn offset(&self, dx: f32, dy: f32) -> BBox {
        BBox::new(self.x + dx, self.y + dy, self.w, self.h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iou_identical_boxes() {
        let a = BBox::new(0.0, 0.0, 100.0, 100.0);
        assert_eq!(a.iou(&a), 1.0);
    }

    #[test]
    fn iou_disjoint_boxes() {
        let a = BBox::new(0.0, 0.0, 100.0, 100.0);
        let b = BBox::new(200.0, 200.0, 100.0, 100.0);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn iou_half_overlap() {
        let a = BBox::new(0.0, 0.0, 100.0, 100.0);
        let b = BBox::new(50.0, 0.0, 100.0, 100.0);
        // intersection 50*100 = 5000, union 15000
        let iou = a.iou(&b);
        assert!((iou - 1.0 / 3.0).abs() < 1e-6, "got {iou}");
    }

    #[test]
    fn iou_degenerate_box_is_zero() {
        let a = BBox::new(0.0, 0.0, 0.0, 100.0);
        let b = BBox::new(0.0, 0.0, 100.0, 100.0);
        assert_eq!(a.iou(&b), 0.0);
        assert_eq!(b.iou(&a), 0.0);
    }

    #[test]
    fn ioa_small_inside_large() {
        let small = BBox::new(10.0, 10.0, 10.0, 10.0);
        let large = BBox::new(0.0, 0.0, 100.0, 100.0);
        assert_eq!(small.ioa(&large), 1.0);
        assert!(large.ioa(&small) < 0.02);
    }

    #[test]
    fn contains_and_nesting() {
        let outer = BBox::new(0.0, 0.0, 100.0, 100.0);
        let inner = BBox::new(20.0, 20.0, 30.0, 30.0);
        assert!(outer.contains(&inner));
        assert!(!inner.contains(&outer));
    }

    #[test]
    fn scale_and_offset_round_trip() {
        let b = BBox::new(10.0, 20.0, 30.0, 40.0);
        let px = b.scaled(300.0 / 72.0);
        let back = px.scaled(72.0 / 300.0);
        assert!((back.x - b.x).abs() < 1e-4);
        assert!((back.h - b.h).abs() < 1e-4);
        let moved = b.offset(5.0, -5.0);
        assert_eq!(moved.x, 15.0);
        assert_eq!(moved.y, 15.0);
        assert_eq!(moved.w, 30.0);
    }
}
