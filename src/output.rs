//! Output types: per-page reports, batch statistics, and persistence.
//!
//! The batch result always reports per-page status alongside the
//! aggregate block set: a failed page is visible in `pages` with its
//! error and contributes nothing to `blocks`, while degraded pages
//! contribute whatever their remaining sources grounded. Callers decide
//! their own tolerance — retry failed pages individually, warn on
//! degraded ones, or accept everything.

use crate::block::{Block, FlattenedElement};
use crate::error::{ExtractError, PageError};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;

/// Terminal state of one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageStatus {
    /// Both configured detectors ran and fusion completed.
    Success,
    /// A detector failed or timed out; blocks come from the remaining
    /// sources.
    Degraded,
    /// The page produced nothing (malformed geometry).
    Failed,
}

/// Non-fatal observations about a page worth surfacing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageWarning {
    /// Fusion pruned every candidate; an empty block set is valid.
    EmptyResult,
}

/// Everything the engine has to say about one page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageReport {
    pub page_index: usize,
    pub status: PageStatus,
    #[serde(default)]
    pub warnings: Vec<PageWarning>,
    #[serde(default)]
    pub error: Option<PageError>,
    pub blocks_emitted: usize,
    /// Semantic claims discarded for want of grounding primitives.
    pub grounding_discards: usize,
    pub duration_ms: u64,
}

/// Aggregate statistics for a batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionStats {
    pub total_pages: usize,
    pub succeeded_pages: usize,
    pub degraded_pages: usize,
    pub failed_pages: usize,
    pub total_blocks: usize,
    pub total_elements: usize,
    pub geometric_detections: usize,
    pub semantic_detections: usize,
    pub grounding_discards: usize,
    pub total_duration_ms: u64,
}

/// The batch result: reports, blocks, flattened elements, stats.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionOutput {
    pub pages: Vec<PageReport>,
    pub blocks: Vec<Block>,
    pub elements: Vec<FlattenedElement>,
    pub stats: ExtractionStats,
}

impl ExtractionOutput {
    /// Blocks belonging to one page.
    pub fn blocks_for_page(&self, page_index: usize) -> impl Iterator<Item = &Block> {
        self.blocks.iter().filter(move |b| b.page_index == page_index)
    }

    /// Persist `blocks.json` and `elements.json` into `dir`.
    ///
    /// Atomic per file (temp file in the same directory, then rename) so a
    /// crash mid-write never leaves a half-written result for the editor
    /// to load.
    pub fn write_output(&self, dir: &Path) -> Result<(), ExtractError> {
        std::fs::create_dir_all(dir).map_err(|e| ExtractError::OutputWriteFailed {
            path: dir.to_path_buf(),
            source: e,
        })?;

        let blocks = serde_json::json!({ "blocks": self.blocks });
        let elements = serde_json::json!({ "elements": self.elements });
        write_atomic(dir, "blocks.json", &blocks)?;
        write_atomic(dir, "elements.json", &elements)?;
        Ok(())
    }
}

fn write_atomic(dir: &Path, name: &str, value: &serde_json::Value) -> Result<(), ExtractError> {
    let path = dir.join(name);
    let wrap = |e: std::io::Error| ExtractError::OutputWriteFailed {
        path: path.clone(),
        source: e,
    };

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(wrap)?;
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| ExtractError::Internal(format!("serialising {name}: {e}")))?;
    tmp.write_all(text.as_bytes()).map_err(wrap)?;
    tmp.persist(&path)
        .map_err(|e| ExtractError::OutputWriteFailed {
            path: path.clone(),
            source: e.error,
        })?;
    Ok(())
}
