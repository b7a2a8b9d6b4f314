// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF module — reading positioned text out of pages and rewriting page content.

pub mod cmap;
pub mod fonts;
pub mod reader;
pub mod text;
pub mod writer;

pub use fonts::StandardFont;
pub use reader::PdfReader;
pub use text::{Matrix, TextFragment};
pub use writer::PdfWriter;
