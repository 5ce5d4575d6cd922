//! Tiled geometric detection: partition, classify, remap, merge.
//!
//! ## Why tiles?
//!
//! Region classifiers run at a fixed inference resolution. Squeezing a
//! full 300-DPI page into 640 px erases checkbox cells and hairline rules
//! entirely; classifying overlapping tiles keeps small objects at a
//! legible scale and trades throughput for recall. The cost is duplicate
//! detections — the same object seen by two overlapping tiles — which the
//! merge step collapses with class-aware non-maximum suppression.
//!
//! Tile offsets exist only inside [`TiledRegionDetector::detect`]: raw
//! proposals are remapped to page points exactly once and nothing
//! downstream ever sees tile coordinates.

use crate::config::ExtractionConfig;
use crate::detector::{
    Detection, GeometricDetector, PageView, RegionClassifier, RegionProposal,
};
use crate::error::DetectorError;
use async_trait::async_trait;
use image::imageops::FilterType;
use tracing::debug;

/// One tile's placement within the page raster, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tile {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

/// Offsets along one axis so tiles of `tile` pixels cover `len` pixels
/// with `stride` spacing and the far edge covered exactly.
fn axis_offsets(len: u32, tile: u32, stride: u32) -> Vec<u32> {
    if len <= tile {
        return vec![0];
    }
    let mut offsets = Vec::new();
    let mut x = 0u32;
    loop {
        if x + tile >= len {
            let last = len - tile;
            if offsets.last() != Some(&last) {
                offsets.push(last);
            }
            break;
        }
        offsets.push(x);
        x += stride;
    }
    offsets
}

/// Compute the tile grid for an image.
///
/// Adjacent tiles share `overlap` pixels so an object up to `overlap`
/// wide that straddles a boundary appears whole in at least one tile.
pub fn tile_grid(img_w: u32, img_h: u32, tile_size: u32, overlap: u32) -> Vec<Tile> {
    let stride = tile_size.saturating_sub(overlap).max(1);
    let mut tiles = Vec::new();
    for &y in &axis_offsets(img_h, tile_size, stride) {
        for &x in &axis_offsets(img_w, tile_size, stride) {
            tiles.push(Tile {
                x,
                y,
                w: tile_size.min(img_w),
                h: tile_size.min(img_h),
            });
        }
    }
    tiles
}

/// Collapse duplicate detections with class-aware non-maximum suppression.
///
/// Sorted by confidence descending; a detection is suppressed when a kept
/// detection of the same class overlaps it with IoU ≥ `merge_iou`.
/// Boundary-straddling duplicates from adjacent tiles are
/// indistinguishable from same-tile duplicates here — both are just boxes.
pub fn merge_detections(mut detections: Vec<Detection>, merge_iou: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| {
        b.confidence()
            .partial_cmp(&a.confidence())
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut kept: Vec<Detection> = Vec::with_capacity(detections.len());
    for det in detections {
        let Some(bbox) = det.bbox else {
            kept.push(det);
            continue;
        };
        let duplicate = kept.iter().any(|k| {
            k.class == det.class
                && k.bbox
                    .map(|kb| kb.iou(&bbox) >= merge_iou)
                    .unwrap_or(false)
        });
        if !duplicate {
            kept.push(det);
        }
    }
    kept
}

/// Adapts any per-tile [`RegionClassifier`] into the page-level
/// [`GeometricDetector`] role.
pub struct TiledRegionDetector<C> {
    classifier: C,
    tile_size: u32,
    tile_overlap: u32,
    inference_size: u32,
    merge_iou: f32,
    min_confidence: f32,
}

impl<C: RegionClassifier> TiledRegionDetector<C> {
    pub fn new(classifier: C, config: &ExtractionConfig) -> Self {
        Self {
            classifier,
            tile_size: config.tile_size,
            tile_overlap: config.tile_overlap,
            inference_size: config.inference_size,
            merge_iou: config.merge_iou,
            min_confidence: config.min_confidence,
        }
    }
}

#[async_trait]
impl<C: RegionClassifier> GeometricDetector for TiledRegionDetector<C> {
    async fn detect(&self, page: &PageView<'_>) -> Result<Vec<Detection>, DetectorError> {
        let (img_w, img_h) = (page.image.width(), page.image.height());
        let tiles = tile_grid(img_w, img_h, self.tile_size, self.tile_overlap);
        debug!(
            "Page {}: {} tiles of {} px (overlap {})",
            page.index,
            tiles.len(),
            self.tile_size,
            self.tile_overlap
        );

        let mut detections: Vec<Detection> = Vec::new();
        for tile in &tiles {
            let crop = page.image.crop_imm(tile.x, tile.y, tile.w, tile.h);
            let resized = if tile.w == self.inference_size && tile.h == self.inference_size {
                crop
            } else {
                crop.resize_exact(self.inference_size, self.inference_size, FilterType::Triangle)
            };

            let proposals = self.classifier.classify(&resized).await?;

            // Inference space → tile space → page pixels → page points.
            let sx = tile.w as f32 / self.inference_size as f32;
            let sy = tile.h as f32 / self.inference_size as f32;
            for p in proposals {
                if p.confidence < self.min_confidence || !p.bbox.is_valid() {
                    continue;
                }
                let page_px = remap_proposal(&p, sx, sy, tile);
                let bbox_pt = page_px.scaled(1.0 / page.px_per_pt);
                detections.push(Detection::geometric(p.class.into(), bbox_pt, p.confidence));
            }
        }

        let before = detections.len();
        let merged = merge_detections(detections, self.merge_iou);
        debug!(
            "Page {}: {} raw proposals merged to {}",
            page.index,
            before,
            merged.len()
        );
        Ok(merged)
    }
}

fn remap_proposal(p: &RegionProposal, sx: f32, sy: f32, tile: &Tile) -> crate::geometry::BBox {
    crate::geometry::BBox::new(p.bbox.x * sx, p.bbox.y * sy, p.bbox.w * sx, p.bbox.h * sy)
        .offset(tile.x as f32, tile.y as f32)
}
