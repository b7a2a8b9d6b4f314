// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF reader — open existing PDF documents with `lopdf` and expose their page
// content as positioned text fragments.

use formcast_core::Rect;
use formcast_core::error::FormcastError;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use tracing::{debug, instrument};

use super::fonts::{number, resolve};
use super::text::{TextFragment, TextInterpreter};

/// Page-tree depth at which inherited attribute lookup gives up.
const MAX_TREE_DEPTH: usize = 32;

/// US Letter, used when no /MediaBox is found anywhere in the page tree.
const DEFAULT_MEDIA_BOX: Rect = Rect {
    x: 0.0,
    y: 0.0,
    width: 612.0,
    height: 792.0,
};

/// Reads existing PDF documents held in memory.
///
/// Wraps `lopdf::Document` and provides the page-level views the placeholder
/// scanner needs.
pub struct PdfReader {
    document: Document,
}

impl PdfReader {
    /// Create a reader from raw PDF bytes already in memory.
    #[instrument(skip_all, fields(bytes_len = data.len()))]
    pub fn from_bytes(data: &[u8]) -> Result<Self, FormcastError> {
        if data.is_empty() {
            return Err(FormcastError::DocumentLoad("file is empty".into()));
        }
        let document = Document::load_mem(data)
            .map_err(|err| FormcastError::DocumentLoad(format!("not a readable PDF: {}", err)))?;

        debug!(pages = document.get_pages().len(), "PDF loaded from bytes");

        Ok(Self { document })
    }

    /// Number of pages in the document.
    pub fn page_count(&self) -> usize {
        self.document.get_pages().len()
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn into_document(self) -> Document {
        self.document
    }

    /// Every show-text operation in the document, pages in order and
    /// operations in drawing order within a page. Text inside form XObjects
    /// is included where the form is painted.
    #[instrument(skip(self))]
    pub fn text_fragments(&self) -> Result<Vec<TextFragment>, FormcastError> {
        let mut fragments = Vec::new();
        for (page_index, page_id) in page_ids(&self.document).into_iter().enumerate() {
            let operations = page_operations(&self.document, page_id)?;
            let resources = page_resources(&self.document, page_id);
            let page_fragments =
                TextInterpreter::new(&self.document, resources).run(page_index, &operations);
            fragments.extend(page_fragments);
        }
        debug!(fragments = fragments.len(), "Text extracted");
        Ok(fragments)
    }
}

// -- Page helpers -------------------------------------------------------------

/// Page object ids in page order.
pub(crate) fn page_ids(doc: &Document) -> Vec<ObjectId> {
    // `get_pages` is keyed by 1-based page number, so values come out in order.
    doc.get_pages().into_values().collect()
}

/// Decoded operations of a page's (possibly multi-stream) content.
pub(crate) fn page_operations(
    doc: &Document,
    page_id: ObjectId,
) -> Result<Vec<Operation>, FormcastError> {
    let bytes = doc.get_page_content(page_id).map_err(|err| {
        FormcastError::DocumentLoad(format!("cannot read content of page {:?}: {}", page_id, err))
    })?;
    if bytes.is_empty() {
        return Ok(Vec::new());
    }
    let content = Content::decode(&bytes).map_err(|err| {
        FormcastError::DocumentLoad(format!("cannot parse content of page {:?}: {}", page_id, err))
    })?;
    Ok(content.operations)
}

/// Decoded operations of a single stream, such as a form XObject.
pub(crate) fn stream_operations(stream: &Stream) -> Result<Vec<Operation>, FormcastError> {
    let bytes = stream
        .get_plain_content()
        .map_err(|err| FormcastError::DocumentLoad(format!("cannot decode stream: {}", err)))?;
    if bytes.is_empty() {
        return Ok(Vec::new());
    }
    let content = Content::decode(&bytes)
        .map_err(|err| FormcastError::DocumentLoad(format!("cannot parse stream content: {}", err)))?;
    Ok(content.operations)
}

/// Look up a page attribute, following /Parent for inheritable keys.
pub(crate) fn inherited_attribute<'a>(
    doc: &'a Document,
    page_id: ObjectId,
    key: &[u8],
) -> Option<&'a Object> {
    let mut current = doc.get_dictionary(page_id).ok();
    let mut depth = 0;
    while let Some(dict) = current {
        if let Ok(value) = dict.get(key) {
            return resolve(doc, value);
        }
        depth += 1;
        if depth > MAX_TREE_DEPTH {
            break;
        }
        current = dict
            .get(b"Parent")
            .ok()
            .and_then(|parent| parent.as_reference().ok())
            .and_then(|id| doc.get_dictionary(id).ok());
    }
    None
}

/// The resource dictionary in effect for a page.
pub(crate) fn page_resources(doc: &Document, page_id: ObjectId) -> Option<&Dictionary> {
    inherited_attribute(doc, page_id, b"Resources").and_then(|obj| obj.as_dict().ok())
}

/// The page's /MediaBox as a rectangle.
pub(crate) fn media_box(doc: &Document, page_id: ObjectId) -> Rect {
    let values: Vec<f32> = inherited_attribute(doc, page_id, b"MediaBox")
        .and_then(|obj| obj.as_array().ok())
        .map(|arr| arr.iter().filter_map(|v| resolve(doc, v).and_then(number)).collect())
        .unwrap_or_default();
    match values.as_slice() {
        [x0, y0, x1, y1] => Rect::new(x0.min(*x1), y0.min(*y1), (x1 - x0).abs(), (y1 - y0).abs()),
        _ => DEFAULT_MEDIA_BOX,
    }
}
