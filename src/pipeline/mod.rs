//! Pipeline stages for layout extraction.
//!
//! Each submodule implements exactly one transformation step.
//! Keeping stages separate makes each independently testable and lets us
//! swap implementations (e.g. a different region classifier) without
//! touching other stages.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ parse ──▶ reinforce ──▶ tile ─┐
//! (json+png) (primitives) (raster lines)  ├──▶ fuse ──▶ assemble ──▶ overlay
//!                         semantic ───────┘   (ground)  (blocks)     (QA png)
//! ```
//!
//! 1. [`input`]     — load page JSON/PNG pairs from an analysis directory
//! 2. [`parse`]     — typed [`crate::primitive::Primitive`]s from the page's
//!    vector content; the only stage that can fail a page outright
//! 3. [`reinforce`] — recover raster-only rules as synthetic line
//!    primitives; reclassify line-shaped rectangles
//! 4. [`tile`]      — tiled geometric detection with cross-tile merge
//! 5. [`semantic`]  — semantic payload schema, fence-stripping JSON
//!    recovery, claim-to-detection conversion
//! 6. [`fuse`]      — the fusion & pruning engine: dedup, grounding,
//!    margin pruning, promotions, overlap resolution
//! 7. [`assemble`]  — grounded candidates → blocks with deterministic ids,
//!    plus the flattened element list
//! 8. [`overlay`]   — one colour-coded QA image per page

pub mod assemble;
pub mod fuse;
pub mod input;
pub mod overlay;
pub mod parse;
pub mod reinforce;
pub mod semantic;
pub mod tile;
