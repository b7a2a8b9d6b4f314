// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Font metrics — glyph widths, vertical extents and byte-to-text decoding for
// the fonts a page's content stream selects with `Tf`.
//
// Widths come from the font dictionary when it carries them (/Widths for
// simple fonts, /W for CID fonts). The standard 14 fonts usually omit them, so
// Helvetica and Courier metrics are built in.

use std::collections::BTreeMap;

use lopdf::{Dictionary, Document, Object};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::cmap::ToUnicodeMap;

// -- Standard fonts -----------------------------------------------------------

/// Helvetica advance widths for WinAnsi codes 32..=126 (1/1000 em).
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '../
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, // 0-9
    278, 278, 584, 584, 584, 556, 1015, // :..@
    667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, // A-M
    722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, // N-Z
    278, 278, 278, 469, 556, 333, // [..`
    556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, // a-m
    556, 556, 556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, // n-z
    334, 260, 334, 584, // {..~
];

/// Helvetica-Bold advance widths for WinAnsi codes 32..=126 (1/1000 em).
const HELVETICA_BOLD_WIDTHS: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278, // ' '../
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, // 0-9
    333, 333, 584, 584, 584, 611, 975, // :..@
    722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, // A-M
    722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, // N-Z
    333, 278, 333, 584, 556, 333, // [..`
    556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, // a-m
    611, 611, 611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, // n-z
    389, 280, 389, 584, // {..~
];

const HELVETICA_ASCENT: f32 = 718.0;
const HELVETICA_DESCENT: f32 = -207.0;

/// Width used for codes outside the built-in tables.
const FALLBACK_WIDTH: f32 = 556.0;

/// A standard 14 font the renderer draws with. Neither needs embedding.
///
/// Serialised by base font name. Any name other than `Helvetica-Bold` reads
/// as `Helvetica`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StandardFont {
    Helvetica,
    HelveticaBold,
}

impl From<String> for StandardFont {
    fn from(name: String) -> Self {
        if name == "Helvetica-Bold" {
            Self::HelveticaBold
        } else {
            Self::Helvetica
        }
    }
}

impl From<StandardFont> for String {
    fn from(font: StandardFont) -> Self {
        font.base_font().to_string()
    }
}

impl StandardFont {
    pub fn base_font(self) -> &'static str {
        match self {
            Self::Helvetica => "Helvetica",
            Self::HelveticaBold => "Helvetica-Bold",
        }
    }

    /// Advance width of a WinAnsi code in 1/1000 em.
    pub fn code_width(self, code: u8) -> f32 {
        let table = match self {
            Self::Helvetica => &HELVETICA_WIDTHS,
            Self::HelveticaBold => &HELVETICA_BOLD_WIDTHS,
        };
        match code {
            32..=126 => f32::from(table[usize::from(code - 32)]),
            // Non-breaking space.
            160 => f32::from(table[0]),
            _ => FALLBACK_WIDTH,
        }
    }

    /// Rendered width of `text` at `font_size`, using WinAnsi encoding.
    pub fn text_width(self, text: &str, font_size: f32) -> f32 {
        let units: f32 = encode_win_ansi(text)
            .into_iter()
            .map(|code| self.code_width(code))
            .sum();
        units / 1000.0 * font_size
    }
}

/// Encode text as WinAnsi bytes, substituting `?` for unrepresentable chars.
pub fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            '\u{20}'..='\u{7e}' => c as u8,
            '\u{a0}'..='\u{ff}' => c as u8,
            '€' => 0x80,
            '‚' => 0x82,
            '„' => 0x84,
            '…' => 0x85,
            '‘' => 0x91,
            '’' => 0x92,
            '“' => 0x93,
            '”' => 0x94,
            '•' => 0x95,
            '–' => 0x96,
            '—' => 0x97,
            '™' => 0x99,
            c if c.is_whitespace() => b' ',
            _ => b'?',
        })
        .collect()
}

// -- Page fonts ---------------------------------------------------------------

#[derive(Debug, Clone)]
enum WidthTable {
    /// /FirstChar + /Widths of a simple font.
    Simple {
        first_char: u32,
        widths: Vec<f32>,
        missing: f32,
    },
    /// /W + /DW of a CID font.
    Cid {
        widths: BTreeMap<u32, f32>,
        default: f32,
    },
    Builtin(StandardFont),
    Monospaced(f32),
}

/// One decoded glyph of a show-text string.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedGlyph {
    pub code: u32,
    pub text: String,
    /// Whether word spacing applies (single-byte code 32).
    pub is_word_space: bool,
}

/// Metrics and decoding rules for one font resource.
#[derive(Debug, Clone)]
pub struct FontInfo {
    two_byte: bool,
    widths: WidthTable,
    to_unicode: Option<ToUnicodeMap>,
    /// Ascent in 1/1000 em (positive).
    pub ascent: f32,
    /// Descent in 1/1000 em (negative).
    pub descent: f32,
}

impl Default for FontInfo {
    fn default() -> Self {
        Self {
            two_byte: false,
            widths: WidthTable::Builtin(StandardFont::Helvetica),
            to_unicode: None,
            ascent: HELVETICA_ASCENT,
            descent: HELVETICA_DESCENT,
        }
    }
}

impl FontInfo {
    /// Build metrics from a font dictionary. Missing pieces fall back to
    /// Helvetica's, so text in an unreadable font is still measured sensibly.
    pub fn from_dictionary(doc: &Document, font: &Dictionary) -> Self {
        let subtype = name_of(font.get(b"Subtype").ok());
        let base_font = name_of(font.get(b"BaseFont").ok()).unwrap_or_default();

        let to_unicode = font
            .get(b"ToUnicode")
            .ok()
            .and_then(|obj| resolve(doc, obj))
            .and_then(|obj| match obj {
                Object::Stream(stream) => stream
                    .decompressed_content()
                    .ok()
                    .or_else(|| Some(stream.content.clone())),
                _ => None,
            })
            .map(|bytes| ToUnicodeMap::parse(&bytes));

        if subtype.as_deref() == Some("Type0") {
            let descendant = font
                .get(b"DescendantFonts")
                .ok()
                .and_then(|obj| resolve(doc, obj))
                .and_then(|obj| obj.as_array().ok())
                .and_then(|kids| kids.first())
                .and_then(|kid| resolve(doc, kid))
                .and_then(|kid| kid.as_dict().ok());

            let (widths, default, descriptor) = match descendant {
                Some(cid_font) => (
                    cid_widths(doc, cid_font),
                    cid_font
                        .get(b"DW")
                        .ok()
                        .and_then(number)
                        .unwrap_or(1000.0),
                    descriptor_of(doc, cid_font),
                ),
                None => (BTreeMap::new(), 1000.0, None),
            };
            let (ascent, descent) = vertical_extent(descriptor);

            debug!(base_font, cid_widths = widths.len(), "Loaded Type0 font");
            return Self {
                two_byte: true,
                widths: WidthTable::Cid { widths, default },
                to_unicode,
                ascent,
                descent,
            };
        }

        let descriptor = descriptor_of(doc, font);
        let explicit_widths = font
            .get(b"Widths")
            .ok()
            .and_then(|obj| resolve(doc, obj))
            .and_then(|obj| obj.as_array().ok())
            .map(|arr| arr.iter().map(|w| number(w).unwrap_or(0.0)).collect::<Vec<_>>());

        let widths = match explicit_widths {
            Some(widths) if !widths.is_empty() => WidthTable::Simple {
                first_char: font
                    .get(b"FirstChar")
                    .ok()
                    .and_then(number)
                    .map(|n| n.max(0.0) as u32)
                    .unwrap_or(0),
                widths,
                missing: descriptor
                    .and_then(|d| d.get(b"MissingWidth").ok())
                    .and_then(number)
                    .unwrap_or(0.0),
            },
            _ => builtin_widths(&base_font),
        };
        let (ascent, descent) = vertical_extent(descriptor);

        Self {
            two_byte: false,
            widths,
            to_unicode,
            ascent,
            descent,
        }
    }

    /// Split a show-text string into glyphs.
    pub fn decode(&self, bytes: &[u8]) -> Vec<DecodedGlyph> {
        let codes: Vec<u32> = if self.two_byte {
            bytes
                .chunks(2)
                .map(|pair| match pair {
                    [hi, lo] => (u32::from(*hi) << 8) | u32::from(*lo),
                    [single] => u32::from(*single),
                    _ => 0,
                })
                .collect()
        } else {
            bytes.iter().map(|b| u32::from(*b)).collect()
        };

        codes
            .into_iter()
            .map(|code| {
                let text = self
                    .to_unicode
                    .as_ref()
                    .and_then(|map| map.lookup(code))
                    .map(str::to_owned)
                    .unwrap_or_else(|| fallback_text(code));
                DecodedGlyph {
                    code,
                    text,
                    is_word_space: !self.two_byte && code == 32,
                }
            })
            .collect()
    }

    /// Advance width of `code` in 1/1000 em.
    pub fn width(&self, code: u32) -> f32 {
        match &self.widths {
            WidthTable::Simple {
                first_char,
                widths,
                missing,
            } => code
                .checked_sub(*first_char)
                .and_then(|i| widths.get(i as usize))
                .copied()
                .unwrap_or(*missing),
            WidthTable::Cid { widths, default } => widths.get(&code).copied().unwrap_or(*default),
            WidthTable::Builtin(font) => u8::try_from(code)
                .map(|c| font.code_width(c))
                .unwrap_or(FALLBACK_WIDTH),
            WidthTable::Monospaced(width) => *width,
        }
    }
}

// -- Helpers ------------------------------------------------------------------

/// Follow a reference one level; direct objects are returned as-is.
pub(crate) fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
    match obj {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

/// Numeric value of an Integer or Real operand.
pub(crate) fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r as f32),
        _ => None,
    }
}

fn name_of(obj: Option<&Object>) -> Option<String> {
    obj.and_then(|o| o.as_name().ok())
        .map(|n| String::from_utf8_lossy(n).into_owned())
}

fn descriptor_of<'a>(doc: &'a Document, font: &'a Dictionary) -> Option<&'a Dictionary> {
    font.get(b"FontDescriptor")
        .ok()
        .and_then(|obj| resolve(doc, obj))
        .and_then(|obj| obj.as_dict().ok())
}

fn vertical_extent(descriptor: Option<&Dictionary>) -> (f32, f32) {
    let ascent = descriptor
        .and_then(|d| d.get(b"Ascent").ok())
        .and_then(number)
        .filter(|a| *a > 0.0)
        .unwrap_or(HELVETICA_ASCENT);
    let descent = descriptor
        .and_then(|d| d.get(b"Descent").ok())
        .and_then(number)
        .map(|d| -d.abs())
        .filter(|d| *d < 0.0)
        .unwrap_or(HELVETICA_DESCENT);
    (ascent, descent)
}

fn builtin_widths(base_font: &str) -> WidthTable {
    // Subset prefixes look like "ABCDEF+Helvetica".
    let name = base_font.rsplit('+').next().unwrap_or(base_font);
    if name.starts_with("Courier") {
        WidthTable::Monospaced(600.0)
    } else if name.contains("Bold") {
        WidthTable::Builtin(StandardFont::HelveticaBold)
    } else {
        WidthTable::Builtin(StandardFont::Helvetica)
    }
}

/// Parse a CID font's /W array: `c [w1 w2 ...]` and `c_first c_last w` forms.
fn cid_widths(doc: &Document, cid_font: &Dictionary) -> BTreeMap<u32, f32> {
    let mut widths = BTreeMap::new();
    let Some(entries) = cid_font
        .get(b"W")
        .ok()
        .and_then(|obj| resolve(doc, obj))
        .and_then(|obj| obj.as_array().ok())
    else {
        return widths;
    };

    let mut i = 0;
    while i < entries.len() {
        let Some(first) = number(&entries[i]).map(|n| n.max(0.0) as u32) else {
            break;
        };
        match entries.get(i + 1).and_then(|obj| resolve(doc, obj)) {
            Some(Object::Array(list)) => {
                for (offset, w) in list.iter().enumerate() {
                    if let Some(w) = number(w) {
                        widths.insert(first + offset as u32, w);
                    }
                }
                i += 2;
            }
            Some(last) => {
                let last = number(last).map(|n| n.max(0.0) as u32).unwrap_or(first);
                let width = entries.get(i + 2).and_then(number).unwrap_or(1000.0);
                // Guard against absurd ranges in damaged files.
                for cid in first..=last.min(first.saturating_add(0xFFFF)) {
                    widths.insert(cid, width);
                }
                i += 3;
            }
            None => break,
        }
    }
    widths
}

/// Text for a code with no ToUnicode entry. Single-byte codes are read as
/// Latin-1, which matches WinAnsi over the printable ASCII range.
fn fallback_text(code: u32) -> String {
    char::from_u32(code).map(String::from).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;

    #[test]
    fn helvetica_hash_width() {
        assert_eq!(StandardFont::Helvetica.code_width(b'#'), 556.0);
        let width = StandardFont::Helvetica.text_width("####", 10.0);
        assert!((width - 22.24).abs() < 1e-4);
    }

    #[test]
    fn bold_is_wider_for_lowercase() {
        let regular = StandardFont::Helvetica.text_width("abc", 12.0);
        let bold = StandardFont::HelveticaBold.text_width("abc", 12.0);
        assert!(bold > regular);
    }

    #[test]
    fn win_ansi_substitutes_unknown_chars() {
        assert_eq!(encode_win_ansi("A€✓"), vec![b'A', 0x80, b'?']);
        assert_eq!(encode_win_ansi("é"), vec![0xE9]);
    }

    #[test]
    fn simple_font_uses_widths_array() {
        let doc = Document::with_version("1.5");
        let font = dictionary! {
            "Type" => "Font",
            "Subtype" => "TrueType",
            "BaseFont" => "Arial",
            "FirstChar" => 32,
            "Widths" => vec![Object::Integer(250), Object::Integer(300)],
        };
        let info = FontInfo::from_dictionary(&doc, &font);
        assert_eq!(info.width(32), 250.0);
        assert_eq!(info.width(33), 300.0);
        assert_eq!(info.width(90), 0.0);
        assert_eq!(info.ascent, HELVETICA_ASCENT);
    }

    #[test]
    fn standard_font_without_widths_uses_builtin_metrics() {
        let doc = Document::with_version("1.5");
        let font = dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        };
        let info = FontInfo::from_dictionary(&doc, &font);
        assert_eq!(info.width(u32::from(b'#')), 600.0);
        let glyphs = info.decode(b"#a");
        assert_eq!(glyphs.len(), 2);
        assert_eq!(glyphs[0].text, "#");
        assert!(!glyphs[0].is_word_space);
    }
}
