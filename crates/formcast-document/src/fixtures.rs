// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Small PDFs built in memory for unit tests. Every page uses Helvetica as
// /F1 through a resource dictionary inherited from the page tree root.

use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, ObjectId, Stream, dictionary};

/// One line of text: `(x, y, font size, text)`.
pub(crate) type Line<'a> = (f32, f32, f32, &'a str);

/// Operations drawing `text` at `(x, y)` in /F1.
pub(crate) fn text_ops(x: f32, y: f32, size: f32, text: &str) -> Vec<Operation> {
    vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec!["F1".into(), size.into()]),
        Operation::new("Td", vec![x.into(), y.into()]),
        Operation::new("Tj", vec![Object::string_literal(text)]),
        Operation::new("ET", vec![]),
    ]
}

/// A document with one page per entry, each drawing its lines.
pub(crate) fn pdf_with_text(pages: &[&[Line<'_>]]) -> Vec<u8> {
    let page_ops = pages
        .iter()
        .map(|lines| {
            lines
                .iter()
                .flat_map(|(x, y, size, text)| text_ops(*x, *y, *size, text))
                .collect()
        })
        .collect();
    pdf_from_operations(page_ops)
}

/// A document with one page per operation list.
pub(crate) fn pdf_from_operations(pages: Vec<Vec<Operation>>) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let font_id = helvetica(&mut doc);
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });
    assemble(doc, pages, resources_id)
}

/// A one-page document whose resources name a form XObject `/X1` drawing
/// `form_ops` under `matrix`. The form shares the page's resources, so it
/// can paint itself.
pub(crate) fn pdf_with_form(
    page_ops: Vec<Operation>,
    form_ops: Vec<Operation>,
    matrix: [f32; 6],
) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let font_id = helvetica(&mut doc);
    let resources_id = doc.new_object_id();
    let form_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Form",
            "BBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            "Matrix" => matrix.iter().map(|v| Object::Real(*v)).collect::<Vec<_>>(),
            "Resources" => resources_id,
        },
        Content { operations: form_ops }
            .encode()
            .expect("fixture form encodes"),
    ));
    doc.objects.insert(
        resources_id,
        Object::Dictionary(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
            "XObject" => dictionary! { "X1" => form_id },
        }),
    );
    assemble(doc, vec![page_ops], resources_id)
}

fn helvetica(doc: &mut Document) -> ObjectId {
    doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    })
}

fn assemble(mut doc: Document, pages: Vec<Vec<Operation>>, resources_id: ObjectId) -> Vec<u8> {
    let pages_id = doc.new_object_id();
    let mut kids = Vec::new();
    for operations in pages {
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().expect("fixture content encodes"),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(Object::from(page_id));
    }

    let count = kids.len() as i64;
    let pages_dict = dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => count,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages_dict));

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut out = Vec::new();
    doc.save_to(&mut out).expect("fixture document saves");
    out
}

/// Write a fixture into `dir` under `name`.
pub(crate) fn write_pdf(dir: &std::path::Path, name: &str, bytes: &[u8]) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).expect("fixture written");
    path
}
