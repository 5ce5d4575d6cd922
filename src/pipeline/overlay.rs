//! QA overlay rendering: one annotated PNG per page.
//!
//! The overlay is a human-inspection artefact only — nothing parses it.
//! Each emitted block is drawn as a hollow rectangle over a copy of the
//! page raster, colour-coded by block kind, so a reviewer can spot a
//! mis-grounded grid or a surviving hallucination at a glance.

use crate::block::{Block, BlockKind};
use crate::error::ExtractError;
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use std::path::Path;

/// Border thickness in image pixels.
const BORDER_PX: i32 = 3;

fn kind_colour(kind: BlockKind) -> Rgb<u8> {
    match kind {
        BlockKind::Grid => Rgb([220, 50, 50]),
        BlockKind::Header => Rgb([40, 90, 220]),
        BlockKind::CheckboxList => Rgb([30, 160, 60]),
        BlockKind::LabeledInput => Rgb([230, 150, 20]),
        BlockKind::TextRegion => Rgb([140, 60, 200]),
    }
}

/// Render the overlay image for one page.
pub fn render_overlay(image: &DynamicImage, blocks: &[Block], px_per_pt: f32) -> RgbImage {
    let mut canvas = image.to_rgb8();
    let (w, h) = (canvas.width() as i32, canvas.height() as i32);

    for block in blocks {
        let colour = kind_colour(block.kind);
        let bbox = block.bbox.scaled(px_per_pt);
        let x = bbox.x.round() as i32;
        let y = bbox.y.round() as i32;
        let bw = bbox.w.round().max(1.0) as i32;
        let bh = bbox.h.round().max(1.0) as i32;

        for inset in 0..BORDER_PX {
            let (rx, ry) = (x + inset, y + inset);
            let (rw, rh) = (bw - 2 * inset, bh - 2 * inset);
            if rw < 1 || rh < 1 || rx >= w || ry >= h {
                break;
            }
            draw_hollow_rect_mut(
                &mut canvas,
                Rect::at(rx, ry).of_size(rw as u32, rh as u32),
                colour,
            );
        }
    }

    canvas
}

/// Render and write `page_<n>_overlay.png` into `dir`.
pub fn write_overlay(
    dir: &Path,
    page_index: usize,
    image: &DynamicImage,
    blocks: &[Block],
    px_per_pt: f32,
) -> Result<(), ExtractError> {
    let canvas = render_overlay(image, blocks, px_per_pt);
    let path = dir.join(format!("page_{}_overlay.png", page_index + 1));
    canvas
        .save(&path)
        .map_err(|e| ExtractError::OutputWriteFailed {
            path: path.clone(),
            source: std::io::Error::other(e),
        })
}
