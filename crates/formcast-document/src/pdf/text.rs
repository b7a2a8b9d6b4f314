// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Text positioning — replays a page's content operations through the PDF text
// state machine and reports every show-text operation as a positioned
// fragment.
//
// Tracked state: CTM (`cm`, `q`/`Q`), text and line matrices (`BT`, `Tm`,
// `Td`, `TD`, `T*`), and the text parameters `Tf`, `Tc`, `Tw`, `Tz`, `TL`,
// `Ts`. Form XObjects painted with `Do` are replayed with their /Matrix
// applied and their own /Resources, falling back to the caller's.

use std::collections::HashMap;

use formcast_core::Point;
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, content::Operation};
use tracing::{debug, trace};

use super::fonts::{FontInfo, number, resolve};
use super::reader::stream_operations;

/// Form XObjects nested deeper than this are not entered.
const MAX_FORM_DEPTH: usize = 12;

// -- Matrix -------------------------------------------------------------------

/// A PDF transformation matrix `[a b c d e f]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub e: f32,
    pub f: f32,
}

impl Matrix {
    pub const IDENTITY: Self = Self {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    pub fn new(a: f32, b: f32, c: f32, d: f32, e: f32, f: f32) -> Self {
        Self { a, b, c, d, e, f }
    }

    pub fn translate(tx: f32, ty: f32) -> Self {
        Self::new(1.0, 0.0, 0.0, 1.0, tx, ty)
    }

    /// `self × other`: apply `self` first, then `other`.
    pub fn multiply(&self, other: &Matrix) -> Matrix {
        Matrix {
            a: self.a * other.a + self.b * other.c,
            b: self.a * other.b + self.b * other.d,
            c: self.c * other.a + self.d * other.c,
            d: self.c * other.b + self.d * other.d,
            e: self.e * other.a + self.f * other.c + other.e,
            f: self.e * other.b + self.f * other.d + other.f,
        }
    }

    pub fn apply(&self, x: f32, y: f32) -> Point {
        Point {
            x: self.a * x + self.c * y + self.e,
            y: self.b * x + self.d * y + self.f,
        }
    }

    /// Length of the transformed unit x vector.
    pub fn horizontal_scale(&self) -> f32 {
        self.a.hypot(self.b)
    }

    /// Length of the transformed unit y vector.
    pub fn vertical_scale(&self) -> f32 {
        self.c.hypot(self.d)
    }

    fn from_operands(operands: &[Object]) -> Option<Self> {
        let values: Vec<f32> = operands.iter().filter_map(number).collect();
        match values.as_slice() {
            [a, b, c, d, e, f] => Some(Self::new(*a, *b, *c, *d, *e, *f)),
            _ => None,
        }
    }
}

// -- Fragments ----------------------------------------------------------------

/// One glyph of a fragment, positioned along the text baseline.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionedGlyph {
    pub text: String,
    /// Distance from the fragment origin, in unscaled text space.
    pub offset: f32,
    /// Horizontal displacement including character and word spacing.
    pub advance: f32,
}

/// The glyphs drawn by a single show-text operation.
#[derive(Debug, Clone, PartialEq)]
pub struct TextFragment {
    pub page_index: usize,
    /// Index of the operation in the decoded operation list of `form`, or
    /// of the page content when `form` is `None`.
    pub op_index: usize,
    /// The form XObject whose stream holds the operation.
    pub form: Option<ObjectId>,
    /// The operator that drew the fragment (`Tj`, `TJ`, `'` or `"`).
    pub operator: String,
    pub glyphs: Vec<PositionedGlyph>,
    /// Text space to page space at the first glyph (`Tm × CTM`).
    pub matrix: Matrix,
    /// Size operand of the active `Tf`.
    pub font_size: f32,
    pub horizontal_scaling: f32,
    pub rise: f32,
    /// Font ascent and descent in 1/1000 em.
    pub ascent: f32,
    pub descent: f32,
    /// Total horizontal displacement of the operation in text space.
    pub advance: f32,
}

impl TextFragment {
    pub fn text(&self) -> String {
        self.glyphs.iter().map(|g| g.text.as_str()).collect()
    }

    /// Baseline origin of glyph `index` in page space.
    pub fn glyph_origin(&self, index: usize) -> Point {
        let offset = self.glyphs.get(index).map(|g| g.offset).unwrap_or(0.0);
        self.matrix.apply(offset, self.rise)
    }

    /// Page-space width of glyphs `first..=last`.
    pub fn span_width(&self, first: usize, last: usize) -> f32 {
        match (self.glyphs.get(first), self.glyphs.get(last)) {
            (Some(start), Some(end)) => {
                (end.offset + end.advance - start.offset) * self.matrix.horizontal_scale()
            }
            _ => 0.0,
        }
    }

    /// Direction of the baseline in page space, in radians.
    pub fn rotation(&self) -> f32 {
        self.matrix.b.atan2(self.matrix.a)
    }

    /// Font size after the text and graphics transforms.
    pub fn effective_font_size(&self) -> f32 {
        self.font_size * self.matrix.vertical_scale()
    }

    /// The operation's advance in thousandths of a text-space unit, scaled
    /// the way a `TJ` adjustment is.
    pub fn advance_in_adjustment_units(&self) -> f32 {
        let unit = self.font_size * self.horizontal_scaling;
        if unit.abs() < f32::EPSILON {
            0.0
        } else {
            self.advance * 1000.0 / unit
        }
    }
}

// -- Interpreter --------------------------------------------------------------

#[derive(Debug, Clone)]
struct GraphicsState {
    ctm: Matrix,
    font: Option<Vec<u8>>,
    font_size: f32,
    char_spacing: f32,
    word_spacing: f32,
    horizontal_scaling: f32,
    leading: f32,
    rise: f32,
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self {
            ctm: Matrix::IDENTITY,
            font: None,
            font_size: 0.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            horizontal_scaling: 1.0,
            leading: 0.0,
            rise: 0.0,
        }
    }
}

enum ShowElement<'o> {
    Bytes(&'o [u8]),
    Adjust(f32),
}

/// Replays content operations and collects text fragments.
pub struct TextInterpreter<'a> {
    doc: &'a Document,
    resources: Option<&'a Dictionary>,
    fonts: HashMap<Vec<u8>, FontInfo>,
    state: GraphicsState,
    stack: Vec<GraphicsState>,
    text_matrix: Matrix,
    line_matrix: Matrix,
    /// Forms being replayed, outermost first. The last one owns the
    /// operations currently running.
    forms: Vec<ObjectId>,
}

impl<'a> TextInterpreter<'a> {
    pub fn new(doc: &'a Document, resources: Option<&'a Dictionary>) -> Self {
        Self {
            doc,
            resources,
            fonts: HashMap::new(),
            state: GraphicsState::default(),
            stack: Vec::new(),
            text_matrix: Matrix::IDENTITY,
            line_matrix: Matrix::IDENTITY,
            forms: Vec::new(),
        }
    }

    /// Fragments drawn by `operations` and by any form XObjects they paint,
    /// in drawing order.
    pub fn run(mut self, page_index: usize, operations: &[Operation]) -> Vec<TextFragment> {
        let mut fragments = Vec::new();
        self.replay(page_index, operations, &mut fragments);
        trace!(page_index, fragments = fragments.len(), "Text fragments collected");
        fragments
    }

    fn replay(&mut self, page_index: usize, operations: &[Operation], fragments: &mut Vec<TextFragment>) {
        for (op_index, op) in operations.iter().enumerate() {
            let operands = op.operands.as_slice();
            match op.operator.as_str() {
                "q" => self.stack.push(self.state.clone()),
                "Q" => {
                    if let Some(saved) = self.stack.pop() {
                        self.state = saved;
                    }
                }
                "cm" => {
                    if let Some(m) = Matrix::from_operands(operands) {
                        self.state.ctm = m.multiply(&self.state.ctm);
                    }
                }
                "BT" => {
                    self.text_matrix = Matrix::IDENTITY;
                    self.line_matrix = Matrix::IDENTITY;
                }
                "Tf" => {
                    if let [name, size] = operands {
                        self.state.font = name.as_name().ok().map(<[u8]>::to_vec);
                        self.state.font_size = number(size).unwrap_or(0.0);
                    }
                }
                "Tc" => set_from(operands, &mut self.state.char_spacing),
                "Tw" => set_from(operands, &mut self.state.word_spacing),
                "TL" => set_from(operands, &mut self.state.leading),
                "Ts" => set_from(operands, &mut self.state.rise),
                "Tz" => {
                    if let Some(scale) = operands.first().and_then(number) {
                        self.state.horizontal_scaling = scale / 100.0;
                    }
                }
                "Td" | "TD" => {
                    if let [tx, ty] = operands
                        && let (Some(tx), Some(ty)) = (number(tx), number(ty))
                    {
                        if op.operator == "TD" {
                            self.state.leading = -ty;
                        }
                        self.move_line(tx, ty);
                    }
                }
                "Tm" => {
                    if let Some(m) = Matrix::from_operands(operands) {
                        self.text_matrix = m;
                        self.line_matrix = m;
                    }
                }
                "T*" => self.next_line(),
                "Tj" => {
                    if let Some(bytes) = operands.first().and_then(string_bytes) {
                        fragments.push(self.show(page_index, op_index, op, &[ShowElement::Bytes(bytes)]));
                    }
                }
                "'" => {
                    self.next_line();
                    if let Some(bytes) = operands.first().and_then(string_bytes) {
                        fragments.push(self.show(page_index, op_index, op, &[ShowElement::Bytes(bytes)]));
                    }
                }
                "\"" => {
                    if let [aw, ac, text] = operands {
                        set_from(std::slice::from_ref(aw), &mut self.state.word_spacing);
                        set_from(std::slice::from_ref(ac), &mut self.state.char_spacing);
                        self.next_line();
                        if let Some(bytes) = string_bytes(text) {
                            fragments.push(self.show(page_index, op_index, op, &[ShowElement::Bytes(bytes)]));
                        }
                    }
                }
                "TJ" => {
                    if let Some(Object::Array(items)) = operands.first() {
                        let elements: Vec<ShowElement<'_>> = items
                            .iter()
                            .filter_map(|item| match item {
                                Object::String(bytes, _) => Some(ShowElement::Bytes(bytes.as_slice())),
                                other => number(other).map(ShowElement::Adjust),
                            })
                            .collect();
                        fragments.push(self.show(page_index, op_index, op, &elements));
                    }
                }
                "Do" => {
                    if let Some(Ok(name)) = operands.first().map(Object::as_name) {
                        self.paint_form(page_index, name, fragments);
                    }
                }
                _ => {}
            }
        }
    }

    /// Replay the form XObject `name` from the current resources. Images and
    /// unknown names are skipped, as are forms already being replayed.
    fn paint_form(&self, page_index: usize, name: &[u8], fragments: &mut Vec<TextFragment>) {
        let doc = self.doc;
        let Some(form_id) = self
            .resources
            .and_then(|res| res.get(b"XObject").ok())
            .and_then(|obj| resolve(doc, obj))
            .and_then(|obj| obj.as_dict().ok())
            .and_then(|xobjects| xobjects.get(name).ok())
            .and_then(|obj| obj.as_reference().ok())
        else {
            debug!(xobject = %String::from_utf8_lossy(name), "XObject not found in resources");
            return;
        };
        if self.forms.contains(&form_id) || self.forms.len() >= MAX_FORM_DEPTH {
            debug!(?form_id, depth = self.forms.len(), "Form XObject not entered");
            return;
        }
        let Some(stream) = doc
            .get_object(form_id)
            .and_then(Object::as_stream)
            .ok()
            .filter(|stream| is_form(stream))
        else {
            return;
        };
        let operations = match stream_operations(stream) {
            Ok(operations) => operations,
            Err(err) => {
                debug!(?form_id, error = %err, "Form XObject content unreadable");
                return;
            }
        };

        let form_matrix = stream
            .dict
            .get(b"Matrix")
            .ok()
            .and_then(|obj| obj.as_array().ok())
            .and_then(|values| Matrix::from_operands(values))
            .unwrap_or(Matrix::IDENTITY);
        let resources = stream
            .dict
            .get(b"Resources")
            .ok()
            .and_then(|obj| resolve(doc, obj))
            .and_then(|obj| obj.as_dict().ok())
            .or(self.resources);

        let mut state = self.state.clone();
        state.ctm = form_matrix.multiply(&self.state.ctm);
        let mut forms = self.forms.clone();
        forms.push(form_id);

        let mut inner = TextInterpreter {
            doc,
            resources,
            fonts: HashMap::new(),
            state,
            stack: Vec::new(),
            text_matrix: Matrix::IDENTITY,
            line_matrix: Matrix::IDENTITY,
            forms,
        };
        inner.replay(page_index, &operations, fragments);
    }

    fn move_line(&mut self, tx: f32, ty: f32) {
        self.line_matrix = Matrix::translate(tx, ty).multiply(&self.line_matrix);
        self.text_matrix = self.line_matrix;
    }

    fn next_line(&mut self) {
        let leading = self.state.leading;
        self.move_line(0.0, -leading);
    }

    fn show(
        &mut self,
        page_index: usize,
        op_index: usize,
        op: &Operation,
        elements: &[ShowElement<'_>],
    ) -> TextFragment {
        let font = self.font_info();
        let GraphicsState {
            ctm,
            font_size,
            char_spacing,
            word_spacing,
            horizontal_scaling,
            rise,
            ..
        } = self.state.clone();

        let mut glyphs = Vec::new();
        let mut offset = 0.0f32;
        for element in elements {
            match element {
                ShowElement::Bytes(bytes) => {
                    for glyph in font.decode(bytes) {
                        let spacing = if glyph.is_word_space {
                            char_spacing + word_spacing
                        } else {
                            char_spacing
                        };
                        let advance =
                            (font.width(glyph.code) / 1000.0 * font_size + spacing) * horizontal_scaling;
                        glyphs.push(PositionedGlyph {
                            text: glyph.text,
                            offset,
                            advance,
                        });
                        offset += advance;
                    }
                }
                ShowElement::Adjust(amount) => {
                    offset -= amount / 1000.0 * font_size * horizontal_scaling;
                }
            }
        }

        let fragment = TextFragment {
            page_index,
            op_index,
            form: self.forms.last().copied(),
            operator: op.operator.clone(),
            glyphs,
            matrix: self.text_matrix.multiply(&ctm),
            font_size,
            horizontal_scaling,
            rise,
            ascent: font.ascent,
            descent: font.descent,
            advance: offset,
        };
        self.text_matrix = Matrix::translate(offset, 0.0).multiply(&self.text_matrix);
        fragment
    }

    fn font_info(&mut self) -> FontInfo {
        let Some(name) = self.state.font.clone() else {
            return FontInfo::default();
        };
        if let Some(info) = self.fonts.get(&name) {
            return info.clone();
        }

        let doc = self.doc;
        let info = self
            .resources
            .and_then(|res| res.get(b"Font").ok())
            .and_then(|obj| resolve(doc, obj))
            .and_then(|obj| obj.as_dict().ok())
            .and_then(|fonts| fonts.get(&name).ok())
            .and_then(|obj| resolve(doc, obj))
            .and_then(|obj| obj.as_dict().ok())
            .map(|dict| FontInfo::from_dictionary(doc, dict))
            .unwrap_or_else(|| {
                debug!(font = %String::from_utf8_lossy(&name), "Font resource not found, using Helvetica metrics");
                FontInfo::default()
            });
        self.fonts.insert(name, info.clone());
        info
    }
}

fn is_form(stream: &Stream) -> bool {
    stream
        .dict
        .get(b"Subtype")
        .and_then(Object::as_name)
        .map(|subtype| subtype == b"Form")
        .unwrap_or(false)
}

fn set_from(operands: &[Object], target: &mut f32) {
    if let Some(value) = operands.first().and_then(number) {
        *target = value;
    }
}

fn string_bytes(obj: &Object) -> Option<&[u8]> {
    match obj {
        Object::String(bytes, _) => Some(bytes.as_slice()),
        _ => None,
    }
}
