pub mod fields;
pub mod segments;

use tracing::warn;
use url::Url;

use crate::error::{Result, Warning};
use crate::renderer::RenderedDocument;
use fields::FieldRecord;
use segments::Markers;

/// Everything parsed out of one rendered page.
#[derive(Debug)]
pub struct PageExtract {
    pub records: Vec<FieldRecord>,
    pub segment_count: usize,
    pub declared_total: usize,
    pub warnings: Vec<Warning>,
}

/// Two-pass pipeline over one page: markup → item segments → field records.
///
/// A segment that yields nothing extractable is skipped with a warning;
/// its siblings are unaffected. A missing start marker propagates as the
/// page-fatal `MarkerNotFound`.
pub fn process_document(doc: &RenderedDocument, markers: &Markers) -> Result<PageExtract> {
    let segmentation = segments::segment(doc, markers)?;
    let base = Url::parse(&doc.url).ok();

    let mut records = Vec::new();
    let mut warnings = segmentation.warnings;

    for (item_index, segment) in segmentation.segments.iter().enumerate() {
        match fields::reconstruct(item_index, segment, base.as_ref()) {
            Ok(segment_records) => records.extend(segment_records),
            Err(e) => {
                warn!("Skipping segment {}: {}", item_index, e);
                warnings.push(Warning::SegmentParse { item_index });
            }
        }
    }

    Ok(PageExtract {
        records,
        segment_count: segmentation.segments.len(),
        declared_total: segmentation.declared_total,
        warnings,
    })
}

// ── Tests ──
