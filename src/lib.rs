//! # pagefuse
//!
//! Extract structured layout blocks from rendered pages by fusing
//! geometric and semantic detectors against ground-truth vector geometry.
//!
//! ## Why this crate?
//!
//! Single-detector layout extraction fails in opposite directions: object
//! detectors see boxes but miss meaning, and vision-language models see
//! meaning but invent geometry. This crate runs both, then reconciles
//! their proposals against the page's real vector primitives — every
//! emitted block is grounded in geometry that actually exists, and
//! ungrounded claims are discarded as hallucinations rather than passed
//! downstream.
//!
//! ## Pipeline Overview
//!
//! ```text
//! page JSON + PNG
//!  │
//!  ├─ 1. Parse      vector content → typed primitives (ground truth)
//!  ├─ 2. Reinforce  recover raster-only rules as synthetic lines
//!  ├─ 3. Detect     tiled geometric pass ∥ whole-image semantic pass
//!  ├─ 4. Fuse       dedup, ground, prune, promote
//!  ├─ 5. Assemble   blocks + flattened elements, deterministic ids
//!  └─ 6. Overlay    one QA image per page
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pagefuse::{extract_to_dir, Detectors, ExtractionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ExtractionConfig::default();
//!     // Replay detectors read recorded detector output from the same dir.
//!     let detectors = Detectors::replay_from_dir("analysis/");
//!     let output = extract_to_dir("analysis/", "extracted/", &detectors, &config).await?;
//!     println!("{} blocks from {} pages",
//!         output.stats.total_blocks,
//!         output.stats.total_pages);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pagefuse` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only
//! deps:
//! ```toml
//! pagefuse = { version = "0.3", default-features = false }
//! ```
//!
//! ## Trust model
//!
//! | Source | Trust | Role |
//! |--------|-------|------|
//! | Vector primitives | ground truth | final geometry of every block |
//! | Geometric detector | boxes yes, meaning partial | region proposals, corroboration |
//! | Semantic detector | meaning yes, boxes no | labels, headers, groupings |
//!
//! Detector confidence is a tie-breaker during overlap resolution, never a
//! trust signal — grounding against primitives does the actual filtering.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod block;
pub mod config;
pub mod detector;
pub mod error;
pub mod extract;
pub mod geometry;
pub mod output;
pub mod pipeline;
pub mod primitive;
pub mod progress;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use block::{Block, BlockAttrs, BlockKind, FlattenedElement, Provenance};
pub use config::{DetectorSelection, ExtractionConfig, ExtractionConfigBuilder};
pub use detector::{
    Detection, DetectionClass, DetectionPayload, DetectionSource, Detectors, GeometricDetector,
    PageView, RegionClassifier, RegionProposal, ReplayGeometricDetector, ReplaySemanticDetector,
    SemanticClaim, SemanticDetector,
};
pub use error::{DetectorError, DetectorKind, ExtractError, PageError};
pub use extract::{extract, extract_sync, extract_to_dir};
pub use geometry::BBox;
pub use output::{ExtractionOutput, ExtractionStats, PageReport, PageStatus, PageWarning};
pub use pipeline::input::PageInput;
pub use pipeline::semantic::{parse_semantic_payload, SemanticPayload};
pub use pipeline::tile::TiledRegionDetector;
pub use primitive::{Orientation, Primitive, PrimitiveKind};
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use stream::{extract_stream, PageResult, PageResultStream};
