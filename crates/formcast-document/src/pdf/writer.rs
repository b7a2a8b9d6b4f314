// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF writer — rewrites pages of an existing document in place.
//
// A placeholder is removed by swapping the operation that drew it for a `TJ`
// that advances the text position by the same amount without painting, so
// text later on the same line keeps its position. The replacement is then
// painted on top: an opaque mask followed by the new text in Helvetica.
//
// The original page content is wrapped in `q ... Q` so whatever graphics
// state it leaves behind cannot leak into the overlay. Placeholders drawn by
// a form XObject are blanked inside the form's own stream, which changes
// every place the form is painted; each of those places has its own
// sighting and so its own overlay.

use std::collections::BTreeMap;

use formcast_core::error::FormcastError;
use formcast_core::{FillOptions, Point, Rect, ReplacementInstruction, RgbColor};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, StringFormat, dictionary};
use tracing::{debug, info, instrument};

use super::fonts::{StandardFont, encode_win_ansi, resolve};
use super::reader::{page_ids, page_operations, page_resources, stream_operations};

/// Applies replacement instructions to PDF documents.
pub struct PdfWriter {
    options: FillOptions,
}

impl PdfWriter {
    pub fn new(options: FillOptions) -> Self {
        Self { options }
    }

    /// Apply `instructions` to the document in `bytes` and return the
    /// rewritten document. The input is never modified.
    ///
    /// With no instructions the input is returned unchanged.
    #[instrument(skip_all, fields(bytes_len = bytes.len(), instructions = instructions.len()))]
    pub fn apply(
        &self,
        bytes: &[u8],
        instructions: &[ReplacementInstruction],
    ) -> Result<Vec<u8>, FormcastError> {
        if instructions.is_empty() {
            debug!("No instructions, returning document unchanged");
            return Ok(bytes.to_vec());
        }

        let mut doc = Document::load_mem(bytes)
            .map_err(|err| FormcastError::DocumentLoad(format!("not a readable PDF: {}", err)))?;
        self.apply_to_document(&mut doc, instructions)?;
        let output = save_document(&mut doc)?;

        info!(
            replacements = instructions.len(),
            output_bytes = output.len(),
            "Document rewritten"
        );
        Ok(output)
    }

    /// Apply `instructions` to an already loaded document.
    pub fn apply_to_document(
        &self,
        doc: &mut Document,
        instructions: &[ReplacementInstruction],
    ) -> Result<(), FormcastError> {
        let pages = page_ids(doc);

        let mut by_page: BTreeMap<usize, Vec<&ReplacementInstruction>> = BTreeMap::new();
        let mut by_form: BTreeMap<ObjectId, Vec<&ReplacementInstruction>> = BTreeMap::new();
        for instruction in instructions {
            by_page
                .entry(instruction.page_index())
                .or_default()
                .push(instruction);
            if let Some(form_id) = instruction.sighting.source.form {
                by_form.entry(form_id).or_default().push(instruction);
            }
        }

        for (form_id, group) in &by_form {
            blank_out_form(doc, *form_id, group)?;
        }

        let mut font_ids = BTreeMap::new();
        for (page_index, group) in by_page {
            let page_id = *pages.get(page_index).ok_or_else(|| {
                FormcastError::Mutation(format!(
                    "page {} out of range (document has {} pages)",
                    page_index,
                    pages.len()
                ))
            })?;

            let in_page_stream: Vec<&ReplacementInstruction> = group
                .iter()
                .copied()
                .filter(|instruction| instruction.sighting.source.form.is_none())
                .collect();
            let operations = blank_out_placeholders(page_operations(doc, page_id)?, &in_page_stream)?;
            let font_name = register_font(doc, page_id, StandardFont::Helvetica, &mut font_ids)?;
            let overlay = self.overlay(&font_name, &group);
            replace_page_content(doc, page_id, operations, overlay)?;

            debug!(page_index, replacements = group.len(), "Page rewritten");
        }
        Ok(())
    }

    fn overlay(&self, font_name: &[u8], group: &[&ReplacementInstruction]) -> Vec<Operation> {
        let mut content = ContentBuilder::default();
        for instruction in group {
            let sighting = &instruction.sighting;
            let size = sighting.font_size;
            let step = size * self.options.line_height;
            let line_count = instruction.draw_lines.len();

            content.save();
            // Rotated runs are drawn in their baseline frame.
            let (mask, origin) = if sighting.is_rotated() {
                content.transform(sighting.baseline_transform());
                (
                    sighting.local_box().inflate(self.options.mask_padding),
                    Point { x: 0.0, y: 0.0 },
                )
            } else {
                (instruction.mask_rect, sighting.position)
            };
            content.fill_color(self.options.mask_color);
            content.rectangle(mask);
            content.fill();
            content.fill_color(self.options.text_color);
            for (i, line) in instruction.draw_lines.iter().enumerate() {
                if line.is_empty() {
                    continue;
                }
                let y = origin.y + (line_count - 1 - i) as f32 * step;
                content.text(font_name, size, origin.x, y, line);
            }
            content.restore();
        }
        content.into_operations()
    }
}

/// Rewrite a form XObject's stream with its placeholders blanked.
fn blank_out_form(
    doc: &mut Document,
    form_id: ObjectId,
    group: &[&ReplacementInstruction],
) -> Result<(), FormcastError> {
    let form_error =
        |err: lopdf::Error| FormcastError::Mutation(format!("form XObject {:?} unusable: {}", form_id, err));

    let stream = doc.get_object(form_id).and_then(Object::as_stream).map_err(form_error)?;
    let operations = blank_out_placeholders(stream_operations(stream)?, group)?;
    let bytes = Content { operations }
        .encode()
        .map_err(|err| FormcastError::Mutation(format!("failed to encode form content: {}", err)))?;
    doc.get_object_mut(form_id)
        .and_then(Object::as_stream_mut)
        .map_err(form_error)?
        .set_plain_content(bytes);

    debug!(?form_id, replacements = group.len(), "Form XObject rewritten");
    Ok(())
}

/// Swap each placeholder's show-text operation for an invisible `TJ` with the
/// same advance. Operations that moved to a new line first keep doing so.
fn blank_out_placeholders(
    operations: Vec<Operation>,
    group: &[&ReplacementInstruction],
) -> Result<Vec<Operation>, FormcastError> {
    let mut replacements: BTreeMap<usize, Vec<Operation>> = BTreeMap::new();

    for instruction in group {
        let source = instruction.sighting.source;
        let op = operations.get(source.op_index).ok_or_else(|| {
            FormcastError::Mutation(format!(
                "operation {} not found on page {}",
                source.op_index,
                instruction.page_index()
            ))
        })?;

        let blank = Operation::new("TJ", vec![Object::Array(vec![Object::Real(-source.advance)])]);
        let swapped = match op.operator.as_str() {
            "Tj" | "TJ" => vec![blank],
            "'" => vec![Operation::new("T*", vec![]), blank],
            "\"" => {
                let mut ops = Vec::with_capacity(4);
                if let [aw, ac, _] = op.operands.as_slice() {
                    ops.push(Operation::new("Tw", vec![aw.clone()]));
                    ops.push(Operation::new("Tc", vec![ac.clone()]));
                }
                ops.push(Operation::new("T*", vec![]));
                ops.push(blank);
                ops
            }
            other => {
                return Err(FormcastError::Mutation(format!(
                    "operation {} on page {} is '{}', not a text operation",
                    source.op_index,
                    instruction.page_index(),
                    other
                )));
            }
        };
        replacements.insert(source.op_index, swapped);
    }

    Ok(operations
        .into_iter()
        .enumerate()
        .flat_map(|(i, op)| replacements.remove(&i).unwrap_or_else(|| vec![op]))
        .collect())
}

// -- Shared page plumbing -----------------------------------------------------

/// Serialise a document.
pub(crate) fn save_document(doc: &mut Document) -> Result<Vec<u8>, FormcastError> {
    let pruned = doc.prune_objects();
    debug!(pruned = pruned.len(), "Unreferenced objects pruned");

    let mut output = Vec::new();
    doc.save_to(&mut output)
        .map_err(|err| FormcastError::Mutation(format!("failed to serialise PDF: {}", err)))?;
    Ok(output)
}

/// Make `font` available to the page and return its resource name.
///
/// The page gets its own /Resources and /Font dictionaries (copied from
/// whatever it inherited) so shared resource objects are never modified.
pub(crate) fn register_font(
    doc: &mut Document,
    page_id: ObjectId,
    font: StandardFont,
    font_ids: &mut BTreeMap<StandardFont, ObjectId>,
) -> Result<Vec<u8>, FormcastError> {
    let font_id = *font_ids.entry(font).or_insert_with(|| {
        doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => font.base_font(),
            "Encoding" => "WinAnsiEncoding",
        })
    });

    let mut resources = page_resources(doc, page_id)
        .cloned()
        .unwrap_or_else(Dictionary::new);
    let mut fonts = resources
        .get(b"Font")
        .ok()
        .and_then(|obj| resolve(doc, obj))
        .and_then(|obj| obj.as_dict().ok())
        .cloned()
        .unwrap_or_else(Dictionary::new);

    let existing = fonts
        .iter()
        .find(|(_, value)| matches!(value, Object::Reference(id) if *id == font_id))
        .map(|(key, _)| key.clone());
    let name = match existing {
        Some(name) => name,
        None => {
            let mut n = 1;
            loop {
                let candidate = format!("FcF{n}").into_bytes();
                if !fonts.has(&candidate) {
                    break candidate;
                }
                n += 1;
            }
        }
    };

    fonts.set(name.clone(), Object::Reference(font_id));
    resources.set("Font", Object::Dictionary(fonts));
    page_dictionary_mut(doc, page_id)?.set("Resources", Object::Dictionary(resources));
    Ok(name)
}

/// Replace the page's content with `q base Q overlay` as a single stream.
pub(crate) fn replace_page_content(
    doc: &mut Document,
    page_id: ObjectId,
    base: Vec<Operation>,
    overlay: Vec<Operation>,
) -> Result<(), FormcastError> {
    // Close any `q` the original content left open before our own `Q`.
    let mut depth: usize = 0;
    for op in &base {
        match op.operator.as_str() {
            "q" => depth += 1,
            "Q" => depth = depth.saturating_sub(1),
            _ => {}
        }
    }

    let mut operations = Vec::with_capacity(base.len() + overlay.len() + depth + 2);
    operations.push(Operation::new("q", vec![]));
    operations.extend(base);
    operations.extend((0..depth).map(|_| Operation::new("Q", vec![])));
    operations.push(Operation::new("Q", vec![]));
    operations.extend(overlay);

    let bytes = Content { operations }
        .encode()
        .map_err(|err| FormcastError::Mutation(format!("failed to encode page content: {}", err)))?;
    let stream_id = doc.add_object(Stream::new(dictionary! {}, bytes));
    page_dictionary_mut(doc, page_id)?.set("Contents", Object::Reference(stream_id));
    Ok(())
}

fn page_dictionary_mut(doc: &mut Document, page_id: ObjectId) -> Result<&mut Dictionary, FormcastError> {
    doc.get_object_mut(page_id)
        .and_then(Object::as_dict_mut)
        .map_err(|err| FormcastError::Mutation(format!("page {:?} is not a dictionary: {}", page_id, err)))
}

/// Builds overlay operations in page space.
#[derive(Debug, Default)]
pub(crate) struct ContentBuilder {
    operations: Vec<Operation>,
}

impl ContentBuilder {
    pub(crate) fn save(&mut self) {
        self.push("q", vec![]);
    }

    pub(crate) fn restore(&mut self) {
        self.push("Q", vec![]);
    }

    /// Concatenate `[a b c d e f]` onto the CTM.
    pub(crate) fn transform(&mut self, matrix: [f32; 6]) {
        self.push("cm", matrix.iter().copied().map(real).collect());
    }

    pub(crate) fn fill_color(&mut self, color: RgbColor) {
        self.push("rg", vec![real(color.r), real(color.g), real(color.b)]);
    }

    pub(crate) fn stroke_color(&mut self, color: RgbColor) {
        self.push("RG", vec![real(color.r), real(color.g), real(color.b)]);
    }

    pub(crate) fn line_width(&mut self, width: f32) {
        self.push("w", vec![real(width)]);
    }

    pub(crate) fn rectangle(&mut self, rect: Rect) {
        self.push(
            "re",
            vec![real(rect.x), real(rect.y), real(rect.width), real(rect.height)],
        );
    }

    pub(crate) fn line(&mut self, x1: f32, y1: f32, x2: f32, y2: f32) {
        self.push("m", vec![real(x1), real(y1)]);
        self.push("l", vec![real(x2), real(y2)]);
        self.push("S", vec![]);
    }

    pub(crate) fn fill(&mut self) {
        self.push("f", vec![]);
    }

    pub(crate) fn fill_and_stroke(&mut self) {
        self.push("B", vec![]);
    }

    /// Draw one line of WinAnsi text with its baseline origin at `(x, y)`.
    pub(crate) fn text(&mut self, font_name: &[u8], size: f32, x: f32, y: f32, text: &str) {
        self.push("BT", vec![]);
        self.push("Tf", vec![Object::Name(font_name.to_vec()), real(size)]);
        self.push("Td", vec![real(x), real(y)]);
        self.push(
            "Tj",
            vec![Object::String(encode_win_ansi(text), StringFormat::Literal)],
        );
        self.push("ET", vec![]);
    }

    pub(crate) fn into_operations(self) -> Vec<Operation> {
        self.operations
    }

    fn push(&mut self, operator: &str, operands: Vec<Object>) {
        self.operations.push(Operation::new(operator, operands));
    }
}

fn real(value: f32) -> Object {
    Object::Real(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use crate::pdf::PdfReader;
    use crate::pdf::fonts::number;
    use crate::{PlaceholderScanner, ReplacementPlanner};
    use formcast_core::{PlaceholderSighting, SubstitutionMap, TextSource};

    fn instruction(page_index: usize, op_index: usize, lines: &[&str]) -> ReplacementInstruction {
        let sighting = PlaceholderSighting {
            page_index,
            position: Point { x: 72.0, y: 700.0 },
            raw_text: "####".into(),
            width: 26.688,
            height: 11.1,
            descent: -2.484,
            font_size: 12.0,
            rotation: 0.0,
            source: TextSource {
                op_index,
                advance: 2224.0,
                form: None,
            },
        };
        let mask_rect = sighting.glyph_box().inflate(0.5);
        ReplacementInstruction {
            sighting,
            value: lines.join(" "),
            draw_lines: lines.iter().map(|s| s.to_string()).collect(),
            mask_rect,
        }
    }

    #[test]
    fn no_instructions_returns_input() {
        let bytes = fixtures::pdf_with_text(&[&[(72.0, 700.0, 12.0, "####")]]);
        let out = PdfWriter::new(FillOptions::default()).apply(&bytes, &[]).unwrap();
        assert_eq!(out, bytes);
    }

    #[test]
    fn page_out_of_range_is_a_mutation_error() {
        let bytes = fixtures::pdf_with_text(&[&[(72.0, 700.0, 12.0, "####")]]);
        let err = PdfWriter::new(FillOptions::default())
            .apply(&bytes, &[instruction(3, 3, &["x"])])
            .unwrap_err();
        assert!(matches!(err, FormcastError::Mutation(msg) if msg.contains("out of range")));
    }

    #[test]
    fn non_text_operation_is_refused() {
        let bytes = fixtures::pdf_with_text(&[&[(72.0, 700.0, 12.0, "####")]]);
        // Operation 1 is the `Tf`.
        let err = PdfWriter::new(FillOptions::default())
            .apply(&bytes, &[instruction(0, 1, &["x"])])
            .unwrap_err();
        assert!(matches!(err, FormcastError::Mutation(_)));
    }

    #[test]
    fn placeholder_is_replaced_by_overlay_text() {
        let bytes = fixtures::pdf_with_text(&[&[(72.0, 700.0, 12.0, "####")]]);
        let out = PdfWriter::new(FillOptions::default())
            .apply(&bytes, &[instruction(0, 3, &["Acme"])])
            .unwrap();

        let texts: Vec<String> = PdfReader::from_bytes(&out)
            .unwrap()
            .text_fragments()
            .unwrap()
            .iter()
            .map(|f| f.text())
            .collect();
        assert!(texts.iter().all(|t| !t.contains('#')));
        assert!(texts.iter().any(|t| t == "Acme"));
    }

    #[test]
    fn wrapped_lines_stack_upward_from_baseline() {
        let bytes = fixtures::pdf_with_text(&[&[(72.0, 700.0, 12.0, "####")]]);
        let options = FillOptions::default();
        let step = 12.0 * options.line_height;
        let out = PdfWriter::new(options)
            .apply(&bytes, &[instruction(0, 3, &["first", "second"])])
            .unwrap();

        let fragments = PdfReader::from_bytes(&out).unwrap().text_fragments().unwrap();
        let first = fragments.iter().find(|f| f.text() == "first").unwrap();
        let second = fragments.iter().find(|f| f.text() == "second").unwrap();
        assert!((second.glyph_origin(0).y - 700.0).abs() < 1e-3);
        assert!((first.glyph_origin(0).y - (700.0 + step)).abs() < 1e-3);
    }

    #[test]
    fn unbalanced_save_is_closed_before_overlay() {
        let mut ops = vec![Operation::new("q", vec![])];
        ops.extend(fixtures::text_ops(72.0, 700.0, 12.0, "####"));
        let bytes = fixtures::pdf_from_operations(vec![ops]);
        let out = PdfWriter::new(FillOptions::default())
            .apply(&bytes, &[instruction(0, 4, &["Acme"])])
            .unwrap();

        let reader = PdfReader::from_bytes(&out).unwrap();
        let page_id = page_ids(reader.document())[0];
        let operations = page_operations(reader.document(), page_id).unwrap();
        let saves = operations.iter().filter(|op| op.operator == "q").count();
        let restores = operations.iter().filter(|op| op.operator == "Q").count();
        assert_eq!(saves, restores);
    }

    #[test]
    fn placeholder_in_form_is_blanked_inside_the_form() {
        let page_ops = vec![Operation::new("Do", vec![Object::Name(b"X1".to_vec())])];
        let form_ops = fixtures::text_ops(72.0, 700.0, 12.0, "####");
        let bytes = fixtures::pdf_with_form(page_ops, form_ops, [1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);
        let options = FillOptions::default();
        let sightings = PlaceholderScanner::new(options.clone()).scan(&bytes).unwrap();
        let map: SubstitutionMap = [('#', "Acme")].into_iter().collect();
        let plan = ReplacementPlanner::new(options.clone()).plan(&sightings, &map);
        let out = PdfWriter::new(options).apply(&bytes, &plan).unwrap();

        let reader = PdfReader::from_bytes(&out).unwrap();
        let form_id = sightings[0].source.form.unwrap();
        let form = reader.document().get_object(form_id).and_then(Object::as_stream).unwrap();
        let form_ops = stream_operations(form).unwrap();
        assert_eq!(form_ops[3].operator, "TJ");
        assert!(form_ops.iter().all(|op| op.operator != "Tj"));

        // The page still paints the form, then the overlay.
        let page_ops = page_operations(reader.document(), page_ids(reader.document())[0]).unwrap();
        assert!(page_ops.iter().any(|op| op.operator == "Do"));
        let texts: Vec<String> = reader.text_fragments().unwrap().iter().map(|f| f.text()).collect();
        assert!(texts.iter().any(|t| t == "Acme"));
    }

    #[test]
    fn rotated_overlay_is_drawn_in_the_baseline_frame() {
        let bytes = fixtures::pdf_with_text(&[&[(72.0, 700.0, 12.0, "####")]]);
        let mut rotated = instruction(0, 3, &["Acme"]);
        rotated.sighting.rotation = std::f32::consts::FRAC_PI_2;
        rotated.sighting.position = Point { x: 300.0, y: 400.0 };
        let out = PdfWriter::new(FillOptions::default()).apply(&bytes, &[rotated]).unwrap();

        let reader = PdfReader::from_bytes(&out).unwrap();
        let operations = page_operations(reader.document(), page_ids(reader.document())[0]).unwrap();
        let cm = operations.iter().rev().find(|op| op.operator == "cm").unwrap();
        let values: Vec<f32> = cm.operands.iter().filter_map(number).collect();
        assert!((values[1] - 1.0).abs() < 1e-4 && (values[2] + 1.0).abs() < 1e-4);
        assert_eq!((values[4], values[5]), (300.0, 400.0));

        // The mask is the padded glyph box in that frame.
        let re = operations.iter().rev().find(|op| op.operator == "re").unwrap();
        let rect: Vec<f32> = re.operands.iter().filter_map(number).collect();
        assert!((rect[0] + 0.5).abs() < 1e-4);
        assert!((rect[2] - 27.688).abs() < 1e-3);
    }

    #[test]
    fn registered_font_name_avoids_collisions() {
        let bytes = fixtures::pdf_with_text(&[&[(72.0, 700.0, 12.0, "x")]]);
        let mut doc = Document::load_mem(&bytes).unwrap();
        let page_id = page_ids(&doc)[0];
        let mut font_ids = BTreeMap::new();
        let regular = register_font(&mut doc, page_id, StandardFont::Helvetica, &mut font_ids).unwrap();
        let bold = register_font(&mut doc, page_id, StandardFont::HelveticaBold, &mut font_ids).unwrap();
        let again = register_font(&mut doc, page_id, StandardFont::Helvetica, &mut font_ids).unwrap();
        assert_ne!(regular, bold);
        assert_eq!(regular, again);

        // The inherited /F1 survives alongside the new entries.
        let fonts = page_resources(&doc, page_id)
            .and_then(|res| res.get(b"Font").ok())
            .and_then(|obj| obj.as_dict().ok())
            .unwrap();
        assert!(fonts.has(b"F1"));
        assert!(fonts.has(&regular));
    }
}
