// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// formcast-document — Placeholder substitution for PDF templates.
//
// Finds placeholder markers (runs of one repeated character such as
// `####################`) in page content, plans how each replacement value
// fits the marker's space, and rewrites the pages so the value appears where
// the marker was. Also stamps an optional title block and drives whole
// directories of templates.

pub mod batch;
pub mod pdf;
pub mod planner;
pub mod scanner;
pub mod title_block;

#[cfg(test)]
pub(crate) mod fixtures;

use formcast_core::error::FormcastError;
use formcast_core::{FillOptions, SubstitutionMap};
use tracing::{debug, instrument};

// Re-export the primary structs so callers can use `formcast_document::PlaceholderScanner` etc.
pub use batch::BatchDriver;
pub use pdf::reader::PdfReader;
pub use pdf::writer::PdfWriter;
pub use planner::{ReplacementPlanner, fit_text};
pub use scanner::PlaceholderScanner;
pub use title_block::{BlockContent, TitleBlock, TitleBlockCell, stamp_title_block};

/// Scan, plan and rewrite one document held in memory.
///
/// A document without placeholders comes back byte-for-byte unchanged.
#[instrument(skip_all, fields(bytes_len = bytes.len(), substitutions = map.len()))]
pub fn fill_document(
    bytes: &[u8],
    map: &SubstitutionMap,
    options: &FillOptions,
) -> Result<Vec<u8>, FormcastError> {
    let reader = PdfReader::from_bytes(bytes)?;
    let sightings = PlaceholderScanner::new(options.clone()).scan_reader(&reader)?;
    let instructions = ReplacementPlanner::new(options.clone()).plan(&sightings, map);
    debug!(
        sightings = sightings.len(),
        instructions = instructions.len(),
        "Document planned"
    );

    if instructions.is_empty() {
        return Ok(bytes.to_vec());
    }
    let mut doc = reader.into_document();
    let writer = PdfWriter::new(options.clone());
    writer.apply_to_document(&mut doc, &instructions)?;
    pdf::writer::save_document(&mut doc)
}
