//! Input loading: page JSON/PNG pairs from an analysis directory.
//!
//! The rasterizer collaborator writes `page_<n>.json` (vector content in
//! page points, top-left origin) next to `page_<n>.png` (the raster at a
//! fixed DPI). This module only pairs the files up and decodes the images;
//! interpreting the vector content is [`super::parse`]'s job, so a page
//! with unreadable files surfaces as the same per-page failure as one with
//! unreadable geometry.

use crate::error::{ExtractError, PageError};
use image::DynamicImage;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One page's worth of input, as handed to the extraction pipeline.
pub struct PageInput {
    /// 0-based page index.
    pub index: usize,
    /// Rendered page raster.
    pub image: DynamicImage,
    /// Raw vector content JSON (parsed into primitives later).
    pub content: serde_json::Value,
}

impl PageInput {
    pub fn new(index: usize, image: DynamicImage, content: serde_json::Value) -> Self {
        Self {
            index,
            image,
            content,
        }
    }
}

/// Find `page_<n>.json` files under `dir` and return their 1-based numbers
/// in ascending order.
fn page_numbers(dir: &Path) -> Result<Vec<usize>, ExtractError> {
    let entries = std::fs::read_dir(dir).map_err(|_| ExtractError::InputUnreadable {
        path: dir.to_path_buf(),
    })?;

    let mut numbers: Vec<usize> = entries
        .filter_map(|e| e.ok())
        .filter_map(|e| {
            let name = e.file_name();
            let name = name.to_str()?;
            let stem = name.strip_prefix("page_")?.strip_suffix(".json")?;
            stem.parse::<usize>().ok()
        })
        .filter(|&n| n >= 1)
        .collect();
    numbers.sort_unstable();
    numbers.dedup();
    Ok(numbers)
}

/// Load all page pairs from an analysis directory.
///
/// Fatal errors are reserved for "there is nothing to do": the directory
/// is unreadable or holds no pages. A single broken page (missing PNG,
/// undecodable image, invalid JSON) is returned as
/// `Err(PageError::MalformedPage)` in its slot so the batch continues.
pub fn load_pages(dir: &Path) -> Result<Vec<Result<PageInput, PageError>>, ExtractError> {
    let numbers = page_numbers(dir)?;
    if numbers.is_empty() {
        return Err(ExtractError::NoPages {
            path: dir.to_path_buf(),
        });
    }

    let mut pages = Vec::with_capacity(numbers.len());
    for n in numbers {
        let index = n - 1;
        pages.push(load_page(dir, n, index));
    }
    Ok(pages)
}

fn load_page(dir: &Path, number: usize, index: usize) -> Result<PageInput, PageError> {
    let json_path = dir.join(format!("page_{number}.json"));
    let png_path = dir.join(format!("page_{number}.png"));

    let text = std::fs::read_to_string(&json_path).map_err(|e| PageError::MalformedPage {
        page: index,
        detail: format!("cannot read {}: {e}", json_path.display()),
    })?;
    let content: serde_json::Value =
        serde_json::from_str(&text).map_err(|e| PageError::MalformedPage {
            page: index,
            detail: format!("invalid JSON in {}: {e}", json_path.display()),
        })?;

    let image = read_image(&png_path).map_err(|detail| PageError::MalformedPage {
        page: index,
        detail,
    })?;

    debug!(
        "Loaded page {} ({}x{} px)",
        index,
        image.width(),
        image.height()
    );

    Ok(PageInput::new(index, image, content))
}

fn read_image(path: &PathBuf) -> Result<DynamicImage, String> {
    let bytes = std::fs::read(path).map_err(|e| format!("cannot read {}: {e}", path.display()))?;
    image::load_from_memory(&bytes).map_err(|e| format!("cannot decode {}: {e}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn write_png(path: &Path, w: u32, h: u32) {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb([255, 255, 255])));
        img.save(path).unwrap();
    }

    fn page_json() -> &'static str {
        r#"{"page_index":0,"width":432.0,"height":648.0,"coord_system":"top-left","elements":[]}"#
    }

    #[test]
    fn missing_dir_is_fatal() {
        let err = load_pages(Path::new("/definitely/not/a/dir")).unwrap_err();
        assert!(matches!(err, ExtractError::InputUnreadable { .. }));
    }

    #[test]
    fn empty_dir_is_no_pages() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_pages(dir.path()).unwrap_err();
        assert!(matches!(err, ExtractError::NoPages { .. }));
    }

    #[test]
    fn loads_pages_in_order() {
        let dir = tempfile::tempdir().unwrap();
        for n in [2usize, 1, 3] {
            std::fs::write(dir.path().join(format!("page_{n}.json")), page_json()).unwrap();
            write_png(&dir.path().join(format!("page_{n}.png")), 20, 30);
        }
        let pages = load_pages(dir.path()).unwrap();
        assert_eq!(pages.len(), 3);
        let indices: Vec<usize> = pages.iter().map(|p| p.as_ref().unwrap().index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn missing_png_fails_that_page_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("page_1.json"), page_json()).unwrap();
        write_png(&dir.path().join("page_1.png"), 20, 30);
        std::fs::write(dir.path().join("page_2.json"), page_json()).unwrap();
        // no page_2.png

        let pages = load_pages(dir.path()).unwrap();
        assert_eq!(pages.len(), 2);
        assert!(pages[0].is_ok());
        let err = pages[1].as_ref().unwrap_err();
        assert!(matches!(err, PageError::MalformedPage { page: 1, .. }));
    }

    #[test]
    fn bad_json_fails_that_page_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("page_1.json"), "{not json").unwrap();
        write_png(&dir.path().join("page_1.png"), 20, 30);
        std::fs::write(dir.path().join("page_2.json"), page_json()).unwrap();
        write_png(&dir.path().join("page_2.png"), 20, 30);

        let pages = load_pages(dir.path()).unwrap();
        assert!(pages[0].is_err());
        assert!(pages[1].is_ok());
    }
}
