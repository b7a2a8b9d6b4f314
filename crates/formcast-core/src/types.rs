// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the FormCast placeholder engine.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A point in PDF page space (origin bottom-left, y grows upward).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

/// Axis-aligned rectangle in page space. `(x, y)` is the lower-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn top(&self) -> f32 {
        self.y + self.height
    }

    /// Grow the rectangle by `padding` on every side.
    pub fn inflate(&self, padding: f32) -> Self {
        Self {
            x: self.x - padding,
            y: self.y - padding,
            width: self.width + 2.0 * padding,
            height: self.height + 2.0 * padding,
        }
    }

    /// Whether `other` lies entirely inside (or on the edge of) this rectangle.
    pub fn contains(&self, other: &Rect) -> bool {
        self.x <= other.x
            && self.y <= other.y
            && self.right() >= other.right()
            && self.top() >= other.top()
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.top()
            && other.y < self.top()
    }
}

/// The content-stream operation that drew a sighting's glyphs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TextSource {
    /// Index into the decoded operation list of the stream named by `form`,
    /// or of the page's own content when `form` is `None`.
    pub op_index: usize,
    /// Horizontal advance of the whole operation, expressed in thousandths of
    /// a text-space unit (the unit of a `TJ` array adjustment).
    pub advance: f32,
    /// Object id (number, generation) of the form XObject holding the
    /// operation.
    #[serde(default)]
    pub form: Option<(u32, u16)>,
}

/// One placeholder found on a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceholderSighting {
    /// Zero-based page ordinal.
    pub page_index: usize,
    /// Baseline origin of the first marker glyph.
    pub position: Point,
    /// The matched marker run, e.g. `"####################"`.
    pub raw_text: String,
    /// Rendered advance width of the marker run in page units.
    pub width: f32,
    /// Rendered glyph-box height (ascent to descent) in page units.
    pub height: f32,
    /// Offset from the baseline to the bottom of the glyph box (<= 0).
    pub descent: f32,
    /// Effective font size after the text and graphics transforms.
    pub font_size: f32,
    /// Baseline direction in radians, counter-clockwise from page +x.
    #[serde(default)]
    pub rotation: f32,
    pub source: TextSource,
}

impl PlaceholderSighting {
    /// The repeated character identifying the placeholder family.
    pub fn marker(&self) -> char {
        self.raw_text.chars().next().unwrap_or(' ')
    }

    pub fn is_rotated(&self) -> bool {
        self.rotation.abs() > ROTATION_EPSILON
    }

    /// Transform from the baseline frame to page space as `[a b c d e f]`.
    /// The frame's origin is `position` and its x axis runs along the
    /// baseline.
    pub fn baseline_transform(&self) -> [f32; 6] {
        let (sin, cos) = self.rotation.sin_cos();
        [cos, sin, -sin, cos, self.position.x, self.position.y]
    }

    /// The glyph box in the baseline frame.
    pub fn local_box(&self) -> Rect {
        Rect::new(0.0, self.descent, self.width, self.height)
    }

    /// Page-space bounding box of a rectangle given in the baseline frame.
    pub fn page_bounds(&self, local: Rect) -> Rect {
        if !self.is_rotated() {
            return Rect::new(
                self.position.x + local.x,
                self.position.y + local.y,
                local.width,
                local.height,
            );
        }
        let [a, b, c, d, e, f] = self.baseline_transform();
        let corners = [
            (local.x, local.y),
            (local.right(), local.y),
            (local.x, local.top()),
            (local.right(), local.top()),
        ]
        .map(|(u, v)| (a * u + c * v + e, b * u + d * v + f));
        let min_x = corners.iter().map(|p| p.0).fold(f32::INFINITY, f32::min);
        let max_x = corners.iter().map(|p| p.0).fold(f32::NEG_INFINITY, f32::max);
        let min_y = corners.iter().map(|p| p.1).fold(f32::INFINITY, f32::min);
        let max_y = corners.iter().map(|p| p.1).fold(f32::NEG_INFINITY, f32::max);
        Rect::new(min_x, min_y, max_x - min_x, max_y - min_y)
    }

    /// Page-space bounding box of the original glyphs.
    pub fn glyph_box(&self) -> Rect {
        self.page_bounds(self.local_box())
    }
}

/// Rotations below this many radians are treated as horizontal text.
const ROTATION_EPSILON: f32 = 1e-4;

/// A single directive for the page mutator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplacementInstruction {
    pub sighting: PlaceholderSighting,
    /// The resolved substitution value (empty when the marker is unmapped).
    pub value: String,
    /// Lines to draw, top first. The last line sits on the original baseline.
    pub draw_lines: Vec<String>,
    /// Page-space bounds of the opaque mask painted before any text. For
    /// rotated text the mask is the padded glyph box turned with the
    /// baseline and this is its envelope.
    pub mask_rect: Rect,
}

impl ReplacementInstruction {
    pub fn page_index(&self) -> usize {
        self.sighting.page_index
    }
}

/// Marker character to replacement string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubstitutionMap(BTreeMap<char, String>);

impl SubstitutionMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, marker: char, value: impl Into<String>) -> Option<String> {
        self.0.insert(marker, value.into())
    }

    pub fn get(&self, marker: char) -> Option<&str> {
        self.0.get(&marker).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (char, &str)> {
        self.0.iter().map(|(k, v)| (*k, v.as_str()))
    }
}

impl<S: Into<String>> FromIterator<(char, S)> for SubstitutionMap {
    fn from_iter<I: IntoIterator<Item = (char, S)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

/// How replacement text that is wider than its placeholder is fitted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FitPolicy {
    /// Drop trailing characters until the text fits on one line.
    #[default]
    Truncate,
    /// Break into several lines, stacked upward from the baseline.
    Wrap,
}

impl std::str::FromStr for FitPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "truncate" | "trim" => Ok(Self::Truncate),
            "wrap" => Ok(Self::Wrap),
            other => Err(format!("unknown fit policy '{other}'")),
        }
    }
}

/// RGB colour with components in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RgbColor {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl RgbColor {
    pub const WHITE: Self = Self {
        r: 1.0,
        g: 1.0,
        b: 1.0,
    };
    pub const BLACK: Self = Self {
        r: 0.0,
        g: 0.0,
        b: 0.0,
    };

    /// Parse `#RRGGBB` or `RRGGBB`.
    pub fn from_hex(hex: &str) -> Option<Self> {
        let digits = hex.trim().trim_start_matches('#');
        if digits.len() != 6 || !digits.is_ascii() {
            return None;
        }
        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&digits[range], 16)
                .ok()
                .map(|v| v as f32 / 255.0)
        };
        Some(Self {
            r: channel(0..2)?,
            g: channel(2..4)?,
            b: channel(4..6)?,
        })
    }
}

/// A document that could not be rewritten during a batch run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchFailure {
    pub file_name: String,
    pub reason: String,
}

/// Result of a batch run. `processed` and `failures` partition the candidates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub processed: Vec<String>,
    pub failures: Vec<BatchFailure>,
}

impl BatchOutcome {
    pub fn candidate_count(&self) -> usize {
        self.processed.len() + self.failures.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Classification of errors for retry logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorClass {
    /// Timeout, refused connection or busy server. Safe to retry.
    Transient,
    /// Bad URL, missing resource or invalid data.
    Permanent,
}
