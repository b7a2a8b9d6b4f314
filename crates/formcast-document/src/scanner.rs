// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Placeholder scanner — finds runs of a single repeated character drawn by one
// show-text operation and reports where they sit on the page.
//
// A fragment qualifies when its text, with surrounding whitespace removed, is
// one character repeated at least `min_run` times. Runs split across several
// operations are not joined.

use formcast_core::error::FormcastError;
use formcast_core::{FillOptions, PlaceholderSighting, Point, TextSource};
use tracing::{debug, instrument};

use crate::pdf::text::PositionedGlyph;
use crate::pdf::{PdfReader, TextFragment};

/// Locates placeholder markers in a document.
#[derive(Debug, Clone)]
pub struct PlaceholderScanner {
    options: FillOptions,
}

impl PlaceholderScanner {
    pub fn new(options: FillOptions) -> Self {
        Self { options }
    }

    /// Scan a document held in memory.
    pub fn scan(&self, bytes: &[u8]) -> Result<Vec<PlaceholderSighting>, FormcastError> {
        let reader = PdfReader::from_bytes(bytes)?;
        self.scan_reader(&reader)
    }

    /// Scan an already opened document. Sightings come out in page order,
    /// then content-stream order.
    #[instrument(skip_all, fields(pages = reader.page_count()))]
    pub fn scan_reader(&self, reader: &PdfReader) -> Result<Vec<PlaceholderSighting>, FormcastError> {
        let sightings: Vec<PlaceholderSighting> = reader
            .text_fragments()?
            .iter()
            .filter_map(|fragment| self.sighting_for(fragment))
            .collect();
        debug!(sightings = sightings.len(), "Scan complete");
        Ok(sightings)
    }

    /// The marker character if `text` is a placeholder.
    pub fn match_marker(&self, text: &str) -> Option<char> {
        let trimmed = text.trim();
        let mut chars = trimmed.chars();
        let marker = chars.next()?;
        if !self.options.accepts_marker(marker) || !chars.all(|c| c == marker) {
            return None;
        }
        (trimmed.chars().count() >= self.options.min_run).then_some(marker)
    }

    fn sighting_for(&self, fragment: &TextFragment) -> Option<PlaceholderSighting> {
        let text = fragment.text();
        self.match_marker(&text)?;

        let is_blank = |g: &PositionedGlyph| g.text.trim().is_empty();
        let first = fragment.glyphs.iter().position(|g| !is_blank(g))?;
        let last = fragment.glyphs.iter().rposition(|g| !is_blank(g))?;
        let raw_text: String = fragment.glyphs[first..=last]
            .iter()
            .map(|g| g.text.as_str())
            .collect();

        let font_size = fragment.effective_font_size();
        let position: Point = fragment.glyph_origin(first);
        Some(PlaceholderSighting {
            page_index: fragment.page_index,
            position,
            raw_text,
            width: fragment.span_width(first, last),
            height: (fragment.ascent - fragment.descent) / 1000.0 * font_size,
            descent: fragment.descent / 1000.0 * font_size,
            font_size,
            rotation: fragment.rotation(),
            source: TextSource {
                op_index: fragment.op_index,
                advance: fragment.advance_in_adjustment_units(),
                form: fragment.form,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use lopdf::Object;
    use lopdf::content::Operation;

    fn scanner() -> PlaceholderScanner {
        PlaceholderScanner::new(FillOptions::default())
    }

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-3 * b.abs().max(1.0)
    }

    #[test]
    fn marker_matching_rules() {
        let s = scanner();
        assert_eq!(s.match_marker("####"), Some('#'));
        assert_eq!(s.match_marker("  ********  "), Some('*'));
        assert_eq!(s.match_marker("###"), None);
        assert_eq!(s.match_marker("Name: ####"), None);
        assert_eq!(s.match_marker("##$$"), None);
        assert_eq!(s.match_marker("    "), None);
        assert_eq!(s.match_marker(""), None);
    }

    #[test]
    fn finds_client_name_placeholder() {
        let bytes = fixtures::pdf_with_text(&[&[(72.0, 700.0, 12.0, "####################")]]);
        let sightings = scanner().scan(&bytes).unwrap();
        assert_eq!(sightings.len(), 1);

        let s = &sightings[0];
        assert_eq!(s.page_index, 0);
        assert_eq!(s.marker(), '#');
        assert_eq!(s.raw_text.len(), 20);
        assert!(approx(s.position.x, 72.0) && approx(s.position.y, 700.0));
        assert!(approx(s.font_size, 12.0));
        // 20 × 556/1000 × 12
        assert!(approx(s.width, 133.44));
        assert!(approx(s.height, 11.1));
        assert!(approx(s.descent, -2.484));
        assert_eq!(s.source.op_index, 3);
        assert!(approx(s.source.advance, 11120.0));
    }

    #[test]
    fn leading_whitespace_shifts_position() {
        let bytes = fixtures::pdf_with_text(&[&[(100.0, 500.0, 10.0, "  $$$$$  ")]]);
        let s = &scanner().scan(&bytes).unwrap()[0];
        assert_eq!(s.raw_text, "$$$$$");
        // Two spaces at 278/1000 × 10.
        assert!(approx(s.position.x, 105.56));
        assert!(approx(s.width, 27.8));
        // The blanking advance covers the padded run, spaces included.
        assert!(approx(s.source.advance, 3892.0));
    }

    #[test]
    fn ignores_labels_and_short_runs() {
        let bytes = fixtures::pdf_with_text(&[&[
            (72.0, 700.0, 12.0, "Client: "),
            (72.0, 680.0, 12.0, "###"),
            (72.0, 660.0, 12.0, "Ref: ####"),
        ]]);
        assert!(scanner().scan(&bytes).unwrap().is_empty());
    }

    #[test]
    fn sightings_on_several_pages_keep_page_order() {
        let bytes = fixtures::pdf_with_text(&[
            &[(72.0, 700.0, 12.0, "********"), (72.0, 650.0, 12.0, "########")],
            &[(72.0, 700.0, 12.0, "$$$$$$$$")],
        ]);
        let sightings = scanner().scan(&bytes).unwrap();
        let summary: Vec<(usize, char)> = sightings.iter().map(|s| (s.page_index, s.marker())).collect();
        assert_eq!(summary, vec![(0, '*'), (0, '#'), (1, '$')]);
    }

    #[test]
    fn font_size_includes_graphics_scaling() {
        let mut ops = vec![
            Operation::new("q", vec![]),
            Operation::new("cm", vec![2.into(), 0.into(), 0.into(), 2.into(), 0.into(), 0.into()]),
        ];
        ops.extend(fixtures::text_ops(36.0, 350.0, 6.0, "######"));
        ops.push(Operation::new("Q", vec![]));
        let bytes = fixtures::pdf_from_operations(vec![ops]);

        let s = &scanner().scan(&bytes).unwrap()[0];
        assert!(approx(s.font_size, 12.0));
        assert!(approx(s.position.x, 72.0) && approx(s.position.y, 700.0));
        assert!(approx(s.width, 6.0 * 556.0 / 1000.0 * 12.0));
        // The advance stays in the operation's own text space.
        assert!(approx(s.source.advance, 3336.0));
    }

    #[test]
    fn tj_array_counts_as_one_fragment() {
        let ops = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 12.into()]),
            Operation::new("Td", vec![72.into(), 700.into()]),
            Operation::new(
                "TJ",
                vec![Object::Array(vec![
                    Object::string_literal("#####"),
                    Object::Integer(0),
                    Object::string_literal("#####"),
                ])],
            ),
            Operation::new("ET", vec![]),
        ];
        let bytes = fixtures::pdf_from_operations(vec![ops]);
        let sightings = scanner().scan(&bytes).unwrap();
        assert_eq!(sightings.len(), 1);
        assert_eq!(sightings[0].raw_text, "##########");
    }

    #[test]
    fn alphabet_limits_markers() {
        let bytes = fixtures::pdf_with_text(&[&[
            (72.0, 700.0, 12.0, "________"),
            (72.0, 680.0, 12.0, "########"),
        ]]);
        let options = FillOptions {
            marker_alphabet: Some("#*$".into()),
            ..FillOptions::default()
        };
        let sightings = PlaceholderScanner::new(options).scan(&bytes).unwrap();
        assert_eq!(sightings.len(), 1);
        assert_eq!(sightings[0].marker(), '#');
    }

    #[test]
    fn rotated_run_reports_direction_and_box() {
        let ops = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 12.into()]),
            Operation::new(
                "Tm",
                vec![0.into(), 1.into(), (-1).into(), 0.into(), 300.into(), 400.into()],
            ),
            Operation::new("Tj", vec![Object::string_literal("####################")]),
            Operation::new("ET", vec![]),
        ];
        let bytes = fixtures::pdf_from_operations(vec![ops]);
        let s = &scanner().scan(&bytes).unwrap()[0];

        assert!(approx(s.rotation, std::f32::consts::FRAC_PI_2));
        assert!(approx(s.position.x, 300.0) && approx(s.position.y, 400.0));
        assert!(approx(s.width, 133.44));
        // The run climbs the page; ascenders point toward -x.
        let b = s.glyph_box();
        assert!(approx(b.x, 300.0 - 8.616) && approx(b.right(), 302.484), "{b:?}");
        assert!(approx(b.y, 400.0) && approx(b.top(), 533.44), "{b:?}");
    }

    #[test]
    fn runs_inside_form_xobjects_are_found() {
        let page_ops = vec![Operation::new("Do", vec![Object::Name(b"X1".to_vec())])];
        let form_ops = fixtures::text_ops(72.0, 700.0, 12.0, "####################");
        let bytes = fixtures::pdf_with_form(page_ops, form_ops, [1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

        let sightings = scanner().scan(&bytes).unwrap();
        assert_eq!(sightings.len(), 1);
        let s = &sightings[0];
        assert_eq!(s.marker(), '#');
        assert!(s.source.form.is_some());
        assert_eq!(s.source.op_index, 3);
        assert!(approx(s.position.x, 72.0) && approx(s.position.y, 700.0));
    }

    #[test]
    fn corrupt_input_is_a_load_error() {
        let err = scanner().scan(b"%PDF-1.4 truncated").unwrap_err();
        assert!(matches!(err, FormcastError::DocumentLoad(_)));
    }
}
