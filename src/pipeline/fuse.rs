//! The fusion & pruning engine.
//!
//! Everything upstream produces *candidates*: primitives that are true but
//! unlabelled, and detections that are labelled but untrusted. This module
//! reconciles them. The guiding rule is that a detection alone never
//! justifies a block — every surviving candidate's box is replaced by (or
//! verified against) real primitive geometry, and a semantic claim with no
//! primitive to stand on is treated as a hallucination and discarded.
//! Confidence scores only break ties; they are never a trust signal.
//!
//! Steps, in order (each corresponds to a numbered responsibility in the
//! module docs of [`crate::pipeline`]):
//!
//! 1. cross-detector dedup — overlapping geometric/semantic pairs merge,
//!    the geometric box wins, consistent claims ride along
//! 2. semantic-claim grounding — approximate boxes snap to rectangle
//!    primitives or line-bounded regions, or the claim dies
//! 3. top-margin pruning — checkbox/input claims in the header band are
//!    dropped unless the geometric detector corroborates them
//! 4. table → grid promotion — row/column structure counted from line
//!    primitives, never taken from the detector
//! 5. header promotion — top-band titles and text-matched header claims
//! 6. overlap resolution — the block-level duplicate invariant
//!
//! A page where every candidate is pruned is a valid empty result, not an
//! error.

use crate::block::{BlockAttrs, BlockKind, Provenance};
use crate::config::ExtractionConfig;
use crate::detector::{Detection, DetectionClass, DetectionSource, SemanticClaim};
use crate::geometry::BBox;
use crate::primitive::{Orientation, Primitive, PrimitiveKind};
use tracing::debug;

/// Score assigned to candidates whose only detector evidence is semantic.
///
/// Semantic geometry is untrusted, so these rank below any plausibly
/// confident geometric detection during overlap resolution, while still
/// outranking nothing at all.
const SEMANTIC_BASE_SCORE: f32 = 0.35;

/// Fraction of a checkbox-cell search box's size a rectangle may deviate
/// from square and still count as a cell.
const CELL_MAX_SIZE_PT: f32 = 40.0;
const CELL_MIN_SIZE_PT: f32 = 8.0;

/// What fusion discarded and why, for observability and stats.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FuseStats {
    /// Semantic detections merged into geometric ones in step 1.
    pub cross_merged: usize,
    /// Claims discarded for want of a grounding primitive.
    pub grounding_discards: usize,
    /// Claims discarded by the top-margin rule.
    pub margin_discards: usize,
    /// Candidates rejected by block-level overlap resolution.
    pub duplicate_discards: usize,
}

/// A grounded, not-yet-assembled block.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub bbox: BBox,
    pub attrs: BlockAttrs,
    pub provenance: Provenance,
    pub score: f32,
}

impl Candidate {
    pub fn kind(&self) -> BlockKind {
        self.attrs.kind()
    }
}

/// Result of fusing one page.
#[derive(Debug)]
pub struct FuseOutcome {
    pub candidates: Vec<Candidate>,
    pub stats: FuseStats,
}

/// Internal working form of a geometric detection with any semantic
/// claims that merged into it.
struct GeoCand {
    class: DetectionClass,
    bbox: BBox,
    confidence: f32,
    claims: Vec<SemanticClaim>,
}

/// Internal working form of a standalone semantic claim.
struct SemCand {
    class: DetectionClass,
    bbox: Option<BBox>,
    claim: SemanticClaim,
    /// Primitive indices that grounded `bbox`, filled in step 2.
    grounding: Vec<usize>,
}

/// Fuse one page's detections against its primitives.
pub fn fuse(
    primitives: &[Primitive],
    detections: Vec<Detection>,
    page_w: f32,
    page_h: f32,
    config: &ExtractionConfig,
) -> FuseOutcome {
    let mut stats = FuseStats::default();

    // Partition by source. This is the one place in the crate allowed to
    // branch on detector identity.
    let mut geo: Vec<GeoCand> = Vec::new();
    let mut sem: Vec<SemCand> = Vec::new();
    for det in detections {
        match det.source() {
            DetectionSource::Geometric => {
                if let Some(bbox) = det.bbox {
                    geo.push(GeoCand {
                        class: det.class,
                        bbox,
                        confidence: det.confidence(),
                        claims: Vec::new(),
                    });
                }
            }
            DetectionSource::Semantic => {
                if let Some(claim) = det.claim().cloned() {
                    sem.push(SemCand {
                        class: det.class,
                        bbox: det.bbox,
                        claim,
                        grounding: Vec::new(),
                    });
                }
            }
        }
    }

    // ── Step 1: cross-detector deduplication ────────────────────────────
    sem.retain(|s| {
        let Some(sbox) = s.bbox else { return true };
        let best = geo
            .iter_mut()
            .map(|g| (g.bbox.iou(&sbox), g))
            .filter(|(iou, _)| *iou >= config.dedup_iou)
            .max_by(|(a, _), (b, _)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        match best {
            Some((_, g)) => {
                if claim_consistent_with(&s.claim, g.class) {
                    g.claims.push(s.claim.clone());
                }
                stats.cross_merged += 1;
                false
            }
            None => true,
        }
    });

    // ── Step 2: semantic-claim grounding ────────────────────────────────
    let mut grounded_sem: Vec<SemCand> = Vec::new();
    for mut s in sem {
        match s.bbox {
            Some(sbox) => match ground_box(primitives, &sbox, config.grounding_iou) {
                Some((gbox, prims)) => {
                    s.bbox = Some(gbox);
                    s.grounding = prims;
                    grounded_sem.push(s);
                }
                None => {
                    stats.grounding_discards += 1;
                    debug!(
                        "Discarding ungrounded {:?} claim at ({:.0},{:.0})",
                        s.class, sbox.x, sbox.y
                    );
                }
            },
            // Box-less claims (header title) are grounded by text in step 5.
            None => grounded_sem.push(s),
        }
    }

    // ── Step 3: position-based pruning ──────────────────────────────────
    let margin_y = page_h * config.top_margin_fraction;
    grounded_sem.retain(|s| {
        if !matches!(
            s.class,
            DetectionClass::CheckboxGroup | DetectionClass::LabeledInput
        ) {
            return true;
        }
        let Some(sbox) = s.bbox else { return true };
        let (_, cy) = sbox.center();
        if cy >= margin_y {
            return true;
        }
        let corroborated = geo.iter().any(|g| {
            g.bbox.iou(&sbox) >= config.grounding_iou || {
                let (cx, cy) = sbox.center();
                g.bbox.contains_point(cx, cy)
            }
        });
        if !corroborated {
            stats.margin_discards += 1;
            debug!(
                "Pruning {:?} claim in top margin band (y {:.0} < {:.0})",
                s.class, cy, margin_y
            );
        }
        corroborated
    });

    // ── Steps 4–5: promotion ────────────────────────────────────────────
    let mut candidates: Vec<Candidate> = Vec::new();

    for g in &geo {
        match g.class {
            DetectionClass::Table => {
                match promote_table(primitives, g, config) {
                    Some(c) => candidates.push(c),
                    None => {
                        stats.grounding_discards += 1;
                        debug!(
                            "Discarding ungrounded table detection at ({:.0},{:.0})",
                            g.bbox.x, g.bbox.y
                        );
                    }
                }
            }
            DetectionClass::Title | DetectionClass::TextBlock => {
                match promote_text(primitives, g, margin_y, config) {
                    Some(c) => candidates.push(c),
                    None => {
                        stats.grounding_discards += 1;
                        debug!(
                            "Discarding ungrounded {:?} detection at ({:.0},{:.0})",
                            g.class, g.bbox.x, g.bbox.y
                        );
                    }
                }
            }
            // Lone cells corroborate claims but are not blocks themselves.
            _ => {}
        }
    }

    for s in &grounded_sem {
        match (&s.claim, s.bbox) {
            (SemanticClaim::CheckboxGroup, Some(sbox)) => {
                candidates.push(promote_checkbox_group(primitives, &sbox, &s.grounding));
            }
            (SemanticClaim::LabeledInput { label }, Some(sbox)) => {
                candidates.push(promote_labeled_input(&sbox, label, &s.grounding));
            }
            (SemanticClaim::HeaderTitle { text }, _) => {
                match ground_header_text(primitives, text) {
                    Some(c) => candidates.push(c),
                    None => {
                        stats.grounding_discards += 1;
                        debug!("Discarding header title claim '{text}': no matching text run");
                    }
                }
            }
            // Grid header claims only matter attached to a table; a
            // grounded but table-less claim has nothing to annotate.
            (SemanticClaim::GridHeaders { .. }, _) => {
                debug!("Dropping grid header claim with no table to attach to");
            }
            _ => {}
        }
    }

    // Primitive-only header fallback: with no header block from either
    // detector, a wide text run in the top band is still a header.
    if !candidates
        .iter()
        .any(|c| c.kind() == BlockKind::Header)
    {
        if let Some(c) = widest_top_band_text(primitives, page_w, margin_y) {
            candidates.push(c);
        }
    }

    // ── Step 6: block-level overlap resolution ──────────────────────────
    let before = candidates.len();
    let resolved = resolve_overlaps(candidates, config.duplicate_iou);
    stats.duplicate_discards += before - resolved.len();

    FuseOutcome {
        candidates: resolved,
        stats,
    }
}

/// Is a semantic claim's meaning compatible with a geometric class?
fn claim_consistent_with(claim: &SemanticClaim, class: DetectionClass) -> bool {
    match claim {
        SemanticClaim::GridHeaders { .. } => class == DetectionClass::Table,
        SemanticClaim::CheckboxGroup => {
            matches!(class, DetectionClass::Table | DetectionClass::Cell)
        }
        SemanticClaim::LabeledInput { .. } => {
            matches!(class, DetectionClass::Cell | DetectionClass::TextBlock)
        }
        SemanticClaim::HeaderTitle { .. } => {
            matches!(class, DetectionClass::Title | DetectionClass::TextBlock)
        }
    }
}

/// Find real geometry for an approximate box: the best-overlapping
/// rectangle primitive, or failing that the union of line primitives the
/// box intersects (a line-bounded region).
fn ground_box(
    primitives: &[Primitive],
    approx: &BBox,
    grounding_iou: f32,
) -> Option<(BBox, Vec<usize>)> {
    let best_rect = primitives
        .iter()
        .enumerate()
        .filter(|(_, p)| p.is_rectangle())
        .map(|(i, p)| (i, p.bbox, p.bbox.iou(approx)))
        .filter(|(_, _, iou)| *iou >= grounding_iou)
        .max_by(|(_, _, a), (_, _, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    if let Some((i, bbox, _)) = best_rect {
        return Some((bbox, vec![i]));
    }

    let lines: Vec<(usize, &Primitive)> = primitives
        .iter()
        .enumerate()
        .filter(|(_, p)| p.is_line() && p.bbox.intersect(approx).is_some())
        .collect();
    if lines.is_empty() {
        return None;
    }
    let mut union = lines[0].1.bbox;
    for (_, p) in &lines[1..] {
        union = union.union_with(&p.bbox);
    }
    if union.iou(approx) >= grounding_iou {
        let indices = lines.iter().map(|(i, _)| *i).collect();
        Some((union, indices))
    } else {
        None
    }
}

/// Interior line primitives of one orientation inside a table box.
///
/// Lines within `edge_tol` of the matching border are the table's own
/// frame, not row/column separators, and are excluded from the count.
fn interior_lines(
    primitives: &[Primitive],
    table: &BBox,
    orientation: Orientation,
    edge_tol: f32,
) -> Vec<usize> {
    primitives
        .iter()
        .enumerate()
        .filter(|(_, p)| p.orientation() == Some(orientation))
        .filter(|(_, p)| p.bbox.ioa(table) >= 0.8)
        .filter(|(_, p)| {
            let (cx, cy) = p.bbox.center();
            match orientation {
                Orientation::Horizontal => {
                    cy > table.y + edge_tol && cy < table.y1() - edge_tol
                }
                Orientation::Vertical => cx > table.x + edge_tol && cx < table.x1() - edge_tol,
            }
        })
        .map(|(i, _)| i)
        .collect()
}

/// Step 4: a geometric `table` detection becomes a grid candidate, with
/// structure counted from primitives. Returns `None` when no primitive
/// grounds the detection at all.
fn promote_table(
    primitives: &[Primitive],
    g: &GeoCand,
    config: &ExtractionConfig,
) -> Option<Candidate> {
    let (bbox, mut prims) = ground_box(primitives, &g.bbox, config.grounding_iou)?;

    let edge_tol = config.header_align_tolerance_pt.min(bbox.h / 4.0);
    let h_lines = interior_lines(primitives, &bbox, Orientation::Horizontal, edge_tol);
    let v_lines = interior_lines(primitives, &bbox, Orientation::Vertical, edge_tol);
    let rows = h_lines.len() + 1;
    let mut cols = v_lines.len() + 1;
    prims.extend(h_lines);
    prims.extend(v_lines.iter().copied());

    // Attach column headers only when they agree with the inferred
    // structure; with no vertical rules the headers themselves are the
    // best column evidence available.
    let mut headers: Vec<String> = Vec::new();
    for claim in &g.claims {
        if let SemanticClaim::GridHeaders {
            columns,
            column_centers,
        } = claim
        {
            if columns.is_empty() {
                continue;
            }
            let aligned = if v_lines.is_empty() {
                true
            } else if columns.len() != cols {
                false
            } else {
                headers_align(&bbox, columns.len(), column_centers, config)
            };
            if aligned {
                headers = columns.clone();
                if v_lines.is_empty() {
                    cols = columns.len();
                }
                break;
            }
            debug!(
                "Dropping {} grid headers: misaligned with {} inferred columns",
                columns.len(),
                cols
            );
        }
    }

    let mut sources = vec![DetectionSource::Geometric];
    if !g.claims.is_empty() {
        sources.push(DetectionSource::Semantic);
    }

    Some(Candidate {
        bbox,
        attrs: BlockAttrs::Grid {
            rows,
            cols,
            headers,
        },
        provenance: Provenance::new(prims, sources),
        score: g.confidence,
    })
}

/// Per-column alignment check: each claimed header centre must fall
/// within tolerance of its column's centre. Claims without per-column
/// geometry pass by count alone (already checked by the caller).
fn headers_align(
    table: &BBox,
    n: usize,
    column_centers: &[f32],
    config: &ExtractionConfig,
) -> bool {
    if column_centers.is_empty() {
        return true;
    }
    if column_centers.len() != n {
        return false;
    }
    let col_w = table.w / n as f32;
    column_centers.iter().enumerate().all(|(i, &cx)| {
        let expected = table.x + (i as f32 + 0.5) * col_w;
        (cx - expected).abs() <= config.header_align_tolerance_pt.max(col_w / 2.0)
    })
}

/// Steps 4/5 for text-bearing geometric detections: top-band boxes become
/// headers, the rest become text regions. Both snap to their best text
/// run.
fn promote_text(
    primitives: &[Primitive],
    g: &GeoCand,
    margin_y: f32,
    config: &ExtractionConfig,
) -> Option<Candidate> {
    let (i, run) = primitives
        .iter()
        .enumerate()
        .filter(|(_, p)| p.is_text())
        .map(|(i, p)| (i, p, p.bbox.iou(&g.bbox)))
        .filter(|(_, _, iou)| *iou >= config.grounding_iou)
        .max_by(|(_, _, a), (_, _, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(i, p, _)| (i, p))?;

    let text = run.text().unwrap_or_default().to_string();
    let font_size = match run.kind {
        PrimitiveKind::TextRun { font_size, .. } => font_size,
        _ => 12.0,
    };

    // Header promotion needs the top band; a mid-page "title" detection is
    // still just a text region.
    let (_, cy) = run.bbox.center();
    let attrs = if cy < margin_y {
        BlockAttrs::Header { text, font_size }
    } else {
        BlockAttrs::TextRegion { text: Some(text) }
    };

    Some(Candidate {
        bbox: run.bbox,
        attrs,
        provenance: Provenance::new(vec![i], vec![DetectionSource::Geometric]),
        score: g.confidence,
    })
}

/// A grounded checkbox-group claim becomes a checkbox list; its cells are
/// the small square-ish rectangles inside the grounded box.
fn promote_checkbox_group(primitives: &[Primitive], bbox: &BBox, grounding: &[usize]) -> Candidate {
    let mut prims = grounding.to_vec();

    let mut cells: Vec<(usize, BBox)> = primitives
        .iter()
        .enumerate()
        .filter(|(_, p)| p.is_rectangle())
        .filter(|(_, p)| {
            let b = p.bbox;
            b.ioa(bbox) >= 0.8
                && b.w >= CELL_MIN_SIZE_PT
                && b.w <= CELL_MAX_SIZE_PT
                && b.h >= CELL_MIN_SIZE_PT
                && b.h <= CELL_MAX_SIZE_PT
        })
        .map(|(i, p)| (i, p.bbox))
        .collect();
    cells.sort_by(|(_, a), (_, b)| {
        (a.y, a.x)
            .partial_cmp(&(b.y, b.x))
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    prims.extend(cells.iter().map(|(i, _)| *i));

    Candidate {
        bbox: *bbox,
        attrs: BlockAttrs::CheckboxList {
            cells: cells.into_iter().map(|(_, b)| b).collect(),
        },
        provenance: Provenance::new(prims, vec![DetectionSource::Semantic]),
        score: SEMANTIC_BASE_SCORE,
    }
}

/// A grounded labelled-input claim becomes a labeled_input block over its
/// input box.
fn promote_labeled_input(bbox: &BBox, label: &str, grounding: &[usize]) -> Candidate {
    Candidate {
        bbox: *bbox,
        attrs: BlockAttrs::LabeledInput {
            label: label.to_string(),
            input_box: *bbox,
        },
        provenance: Provenance::new(grounding.to_vec(), vec![DetectionSource::Semantic]),
        score: SEMANTIC_BASE_SCORE,
    }
}

fn normalise_text(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Step 5b: a header-title claim grounds by text content, not geometry.
fn ground_header_text(primitives: &[Primitive], text: &str) -> Option<Candidate> {
    let wanted = normalise_text(text);
    if wanted.is_empty() {
        return None;
    }
    let (i, run) = primitives.iter().enumerate().find(|(_, p)| {
        p.text()
            .map(|t| {
                let have = normalise_text(t);
                have == wanted || have.contains(&wanted)
            })
            .unwrap_or(false)
    })?;

    let font_size = match run.kind {
        PrimitiveKind::TextRun { font_size, .. } => font_size,
        _ => 12.0,
    };
    Some(Candidate {
        bbox: run.bbox,
        attrs: BlockAttrs::Header {
            text: run.text().unwrap_or_default().to_string(),
            font_size,
        },
        provenance: Provenance::new(vec![i], vec![DetectionSource::Semantic]),
        score: SEMANTIC_BASE_SCORE,
    })
}

/// Fallback header heuristic: the widest text run in the top band, if it
/// spans a meaningful share of the page.
fn widest_top_band_text(primitives: &[Primitive], page_w: f32, margin_y: f32) -> Option<Candidate> {
    let (i, run) = primitives
        .iter()
        .enumerate()
        .filter(|(_, p)| p.is_text() && p.bbox.center().1 < margin_y)
        .filter(|(_, p)| p.bbox.w >= page_w * 0.3)
        .max_by(|(_, a), (_, b)| {
            a.bbox
                .w
                .partial_cmp(&b.bbox.w)
                .unwrap_or(std::cmp::Ordering::Equal)
        })?;

    let font_size = match run.kind {
        PrimitiveKind::TextRun { font_size, .. } => font_size,
        _ => 12.0,
    };
    Some(Candidate {
        bbox: run.bbox,
        attrs: BlockAttrs::Header {
            text: run.text().unwrap_or_default().to_string(),
            font_size,
        },
        provenance: Provenance::new(vec![i], Vec::new()),
        score: SEMANTIC_BASE_SCORE / 2.0,
    })
}

/// Step 6: enforce the block-level duplicate invariant.
///
/// Candidates are considered best-first; a candidate is rejected when a
/// kept one overlaps it at or above `duplicate_iou`, unless the two have
/// different kinds and one strictly nests inside the other.
fn resolve_overlaps(mut candidates: Vec<Candidate>, duplicate_iou: f32) -> Vec<Candidate> {
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                (a.bbox.y, a.bbox.x)
                    .partial_cmp(&(b.bbox.y, b.bbox.x))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
    });

    let mut kept: Vec<Candidate> = Vec::with_capacity(candidates.len());
    for c in candidates {
        let rejected = kept.iter().any(|k| {
            let iou = k.bbox.iou(&c.bbox);
            if iou < duplicate_iou {
                return false;
            }
            let nested = k.kind() != c.kind()
                && (k.bbox.contains(&c.bbox) || c.bbox.contains(&k.bbox));
            !nested
        });
        if rejected {
            debug!("Rejecting duplicate {:?} at ({:.0},{:.0})", c.kind(), c.bbox.x, c.bbox.y);
        } else {
            kept.push(c);
        }
    }
    kept
}
