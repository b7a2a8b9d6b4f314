// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Title block — a row of bordered boxes stamped along the bottom margin of
// every page, each holding a short text, a numbered list, or label/value rows.

use std::collections::BTreeMap;

use formcast_core::error::FormcastError;
use formcast_core::{Rect, RgbColor};
use lopdf::Document;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::pdf::StandardFont;
use crate::pdf::reader::{media_box, page_ids, page_operations};
use crate::pdf::writer::{ContentBuilder, register_font, replace_page_content, save_document};

// -- Data model ---------------------------------------------------------------

/// `#RRGGBB` colour, validated when deserialised.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HexColor(pub RgbColor);

impl TryFrom<String> for HexColor {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        RgbColor::from_hex(&value)
            .map(HexColor)
            .ok_or_else(|| format!("'{value}' is not a #RRGGBB colour"))
    }
}

impl From<HexColor> for String {
    fn from(color: HexColor) -> Self {
        let channel = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        format!(
            "#{:02x}{:02x}{:02x}",
            channel(color.0.r),
            channel(color.0.g),
            channel(color.0.b)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextStyle {
    pub font: StandardFont,
    pub font_size: f32,
    pub color: HexColor,
}

impl TextStyle {
    fn content_default() -> Self {
        Self {
            font: StandardFont::Helvetica,
            font_size: 8.0,
            color: HexColor(RgbColor::BLACK),
        }
    }

    fn label_default() -> Self {
        Self {
            font: StandardFont::HelveticaBold,
            font_size: 6.0,
            color: HexColor(RgbColor::BLACK),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoxStyle {
    pub background: HexColor,
    pub border_color: HexColor,
    pub border_width: f32,
}

impl Default for BoxStyle {
    fn default() -> Self {
        Self {
            background: HexColor(RgbColor::WHITE),
            border_color: HexColor(RgbColor::BLACK),
            border_width: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelValue {
    pub label: String,
    pub value: String,
}

/// What a box shows. The JSON shape decides the variant: a string, an array
/// of strings, or an array of `{label, value}` objects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BlockContent {
    PlainText(String),
    NumberedList(Vec<String>),
    LabelValueRows(Vec<LabelValue>),
}

/// One box of the title block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TitleBlockCell {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub content: BlockContent,
    #[serde(default, alias = "labelStyle", skip_serializing_if = "Option::is_none")]
    pub label_style: Option<TextStyle>,
    #[serde(default, alias = "contentStyle", skip_serializing_if = "Option::is_none")]
    pub content_style: Option<TextStyle>,
    #[serde(default, alias = "boxStyle", skip_serializing_if = "Option::is_none")]
    pub box_style: Option<BoxStyle>,
}

/// Placement of the row of boxes, in points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TitleBlockLayout {
    pub box_height: f32,
    /// Distance from the page bottom to the boxes.
    pub bottom: f32,
    /// Left and right page margin.
    pub margin: f32,
}

impl Default for TitleBlockLayout {
    fn default() -> Self {
        Self {
            box_height: 60.0,
            bottom: 30.0,
            margin: 20.0,
        }
    }
}

// -- Stamping -----------------------------------------------------------------

/// A title block ready to be stamped onto documents.
#[derive(Debug, Clone, PartialEq)]
pub struct TitleBlock {
    cells: Vec<TitleBlockCell>,
    layout: TitleBlockLayout,
}

impl TitleBlock {
    pub fn new(cells: Vec<TitleBlockCell>) -> Self {
        Self {
            cells,
            layout: TitleBlockLayout::default(),
        }
    }

    pub fn with_layout(mut self, layout: TitleBlockLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn cells(&self) -> &[TitleBlockCell] {
        &self.cells
    }

    /// Stamp every page of the document in `bytes`. Without cells the input
    /// is returned unchanged.
    #[instrument(skip_all, fields(bytes_len = bytes.len(), cells = self.cells.len()))]
    pub fn stamp(&self, bytes: &[u8]) -> Result<Vec<u8>, FormcastError> {
        if self.cells.is_empty() {
            return Ok(bytes.to_vec());
        }
        let mut doc = Document::load_mem(bytes)
            .map_err(|err| FormcastError::DocumentLoad(format!("not a readable PDF: {}", err)))?;
        self.stamp_document(&mut doc)?;
        let output = save_document(&mut doc)?;
        info!(output_bytes = output.len(), "Title block stamped");
        Ok(output)
    }

    pub fn stamp_document(&self, doc: &mut Document) -> Result<(), FormcastError> {
        let mut font_ids = BTreeMap::new();
        for page_id in page_ids(doc) {
            let page = media_box(doc, page_id);
            let mut names = BTreeMap::new();
            for font in [StandardFont::Helvetica, StandardFont::HelveticaBold] {
                names.insert(font, register_font(doc, page_id, font, &mut font_ids)?);
            }

            let overlay = self.page_overlay(page, &names);
            let base = page_operations(doc, page_id)?;
            replace_page_content(doc, page_id, base, overlay)?;
            debug!(?page_id, "Title block drawn");
        }
        Ok(())
    }

    fn page_overlay(&self, page: Rect, names: &BTreeMap<StandardFont, Vec<u8>>) -> Vec<lopdf::content::Operation> {
        let layout = self.layout;
        let column_width = (page.width - 2.0 * layout.margin) / self.cells.len() as f32;
        let mut content = ContentBuilder::default();

        for (idx, cell) in self.cells.iter().enumerate() {
            let cell_box = Rect::new(
                page.x + layout.margin + idx as f32 * column_width,
                page.y + layout.bottom,
                column_width,
                layout.box_height,
            );
            content.save();
            draw_cell(&mut content, cell, cell_box, names);
            content.restore();
        }
        content.into_operations()
    }
}

/// Stamp `cells` onto every page of the document in `bytes`.
pub fn stamp_title_block(bytes: &[u8], cells: &[TitleBlockCell]) -> Result<Vec<u8>, FormcastError> {
    TitleBlock::new(cells.to_vec()).stamp(bytes)
}

fn draw_cell(
    content: &mut ContentBuilder,
    cell: &TitleBlockCell,
    area: Rect,
    names: &BTreeMap<StandardFont, Vec<u8>>,
) {
    let box_style = cell.box_style.clone().unwrap_or_default();
    let content_style = cell.content_style.clone().unwrap_or_else(TextStyle::content_default);
    let label_style = cell.label_style.clone().unwrap_or_else(TextStyle::label_default);
    let font_name = |font: StandardFont| names.get(&font).map(Vec::as_slice).unwrap_or(b"");

    content.fill_color(box_style.background.0);
    content.stroke_color(box_style.border_color.0);
    content.line_width(box_style.border_width);
    content.rectangle(area);
    content.fill_and_stroke();

    let size = content_style.font_size;
    content.fill_color(content_style.color.0);

    match &cell.content {
        BlockContent::NumberedList(items) => {
            let mut text_y = area.top() - size - 5.0;
            'items: for (i, item) in items.iter().enumerate() {
                let numbered = format!("{}. {}", i + 1, item);
                for line in wrap_words(&numbered, content_style.font, size, area.width - 10.0) {
                    if text_y < area.y + 5.0 {
                        break 'items;
                    }
                    content.text(font_name(content_style.font), size, area.x + 5.0, text_y, &line);
                    text_y -= size + 2.0;
                }
            }
        }
        BlockContent::LabelValueRows(rows) => {
            if rows.is_empty() {
                return;
            }
            let row_height = area.height / rows.len() as f32;
            for (i, row) in rows.iter().enumerate() {
                let row_y = area.top() - (i + 1) as f32 * row_height;
                let text_y = row_y + row_height / 2.0 - size / 2.0;
                content.line_width(0.5);
                content.line(area.x, row_y, area.right(), row_y);
                let font = font_name(content_style.font);
                content.text(font, size, area.x + 5.0, text_y, &row.label);
                content.text(font, size, area.x + area.width / 2.0 + 5.0, text_y, &row.value);
            }
        }
        BlockContent::PlainText(text) => {
            if let Some(label) = cell.label.as_deref().filter(|l| !l.is_empty()) {
                content.fill_color(label_style.color.0);
                content.text(
                    font_name(label_style.font),
                    label_style.font_size,
                    area.x + 5.0,
                    area.top() - label_style.font_size - 2.0,
                    label,
                );
                content.fill_color(content_style.color.0);
            }
            content.text(
                font_name(content_style.font),
                size,
                area.x + 5.0,
                area.top() - label_style.font_size - size - 4.0,
                text,
            );
        }
    }
}

/// Greedy word wrap. A word wider than the line stays on a line of its own.
fn wrap_words(text: &str, font: StandardFont, size: f32, max_width: f32) -> Vec<String> {
    let mut lines = Vec::new();
    let mut line = String::new();
    for word in text.split(' ') {
        let candidate = if line.is_empty() {
            word.to_string()
        } else {
            format!("{line} {word}")
        };
        if font.text_width(&candidate, size) <= max_width {
            line = candidate;
        } else {
            if !line.is_empty() {
                lines.push(line);
            }
            line = word.to_string();
        }
    }
    if !line.is_empty() {
        lines.push(line);
    }
    lines
}
