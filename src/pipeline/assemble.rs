//! Block assembly: grounded candidates → the output schema.
//!
//! Assembly is the last, purely mechanical stage: sort candidates into
//! reading order, hand out ids, and flatten each block into the element
//! vocabulary the canvas editor consumes. Ids are a pure function of the
//! sorted candidate list (`p{page}-{kind}-{ordinal}`), so running the
//! pipeline twice on identical input produces byte-identical output —
//! the idempotence the persistence layer relies on to diff re-extractions.

use crate::block::{Block, BlockAttrs, BlockKind, FlattenedElement};
use crate::geometry::BBox;
use crate::pipeline::fuse::Candidate;
use std::collections::HashMap;

/// Font size used for flattened grid header and input labels.
const LABEL_FONT_SIZE: f32 = 14.0;

/// One page's assembled output.
#[derive(Debug, Default)]
pub struct AssembledPage {
    pub blocks: Vec<Block>,
    pub elements: Vec<FlattenedElement>,
}

/// Assemble one page's candidates into blocks and flattened elements.
pub fn assemble(page_index: usize, mut candidates: Vec<Candidate>) -> AssembledPage {
    // Reading order: top-to-bottom, left-to-right, kind slug as the final
    // tie-break so id assignment never depends on fusion's internal order.
    candidates.sort_by(|a, b| {
        (a.bbox.y, a.bbox.x, a.kind().slug())
            .partial_cmp(&(b.bbox.y, b.bbox.x, b.kind().slug()))
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut ordinals: HashMap<BlockKind, usize> = HashMap::new();
    let mut page = AssembledPage::default();

    for c in candidates {
        debug_assert!(
            !c.provenance.primitives.is_empty() || c.provenance.sources.is_empty(),
            "detector-sourced candidate without primitive provenance"
        );

        let ordinal = ordinals.entry(c.kind()).or_insert(0);
        *ordinal += 1;
        let id = format!("p{:03}-{}-{:02}", page_index, c.kind().slug(), ordinal);

        flatten_into(&mut page.elements, page_index, &c);
        page.blocks.push(Block {
            id,
            kind: c.kind(),
            bbox: c.bbox,
            page_index,
            provenance: c.provenance,
            attrs: c.attrs,
        });
    }

    page
}

/// Flatten one block into renderable elements.
fn flatten_into(elements: &mut Vec<FlattenedElement>, page_index: usize, c: &Candidate) {
    match &c.attrs {
        BlockAttrs::Header { text, font_size } => {
            elements.push(FlattenedElement::text(page_index, c.bbox, text, *font_size));
        }
        BlockAttrs::Grid {
            rows,
            cols,
            headers,
        } => {
            elements.push(FlattenedElement::rectangle(page_index, c.bbox));
            // Interior separators at even spacing; the grounded line
            // primitives informed the counts, the flattened form re-derives
            // clean positions from them.
            for r in 1..*rows {
                let y = c.bbox.y + c.bbox.h * r as f32 / *rows as f32;
                elements.push(FlattenedElement::line(
                    page_index,
                    BBox::new(c.bbox.x, y, c.bbox.w, 0.0),
                ));
            }
            for col in 1..*cols {
                let x = c.bbox.x + c.bbox.w * col as f32 / *cols as f32;
                elements.push(FlattenedElement::line(
                    page_index,
                    BBox::new(x, c.bbox.y, 0.0, c.bbox.h),
                ));
            }
            let col_w = c.bbox.w / (*cols).max(1) as f32;
            for (i, header) in headers.iter().enumerate() {
                let x = c.bbox.x + i as f32 * col_w;
                elements.push(FlattenedElement::text(
                    page_index,
                    BBox::new(x, c.bbox.y - LABEL_FONT_SIZE - 4.0, col_w, LABEL_FONT_SIZE),
                    header,
                    LABEL_FONT_SIZE,
                ));
            }
        }
        BlockAttrs::CheckboxList { cells } => {
            for cell in cells {
                elements.push(FlattenedElement::rectangle(page_index, *cell));
            }
        }
        BlockAttrs::LabeledInput { label, input_box } => {
            elements.push(FlattenedElement::text(
                page_index,
                BBox::new(
                    input_box.x,
                    input_box.y - LABEL_FONT_SIZE - 2.0,
                    input_box.w,
                    LABEL_FONT_SIZE,
                ),
                label,
                LABEL_FONT_SIZE,
            ));
            elements.push(FlattenedElement::rectangle(page_index, *input_box));
        }
        BlockAttrs::TextRegion { text } => match text {
            Some(t) => elements.push(FlattenedElement::text(page_index, c.bbox, t, 12.0)),
            None => elements.push(FlattenedElement::rectangle(page_index, c.bbox)),
        },
    }
}
