//! PDF fixtures shared by the unit tests.

use lopdf::{Dictionary, Document, Object, Stream, StringFormat};

/// Build a PDF with `num_pages` pages whose content streams carry
/// `({prefix}-Page-{n})` markers.
///
/// MediaBox and Resources live on the /Pages node so every page inherits
/// them, and all pages share one font object.
pub(crate) fn create_test_pdf(num_pages: u32, prefix: &str) -> Vec<u8> {
    build_pdf(num_pages, prefix, None, 1)
}

/// Like [`create_test_pdf`] with a document information dictionary.
pub(crate) fn create_pdf_with_info(num_pages: u32, title: &str, author: &str) -> Vec<u8> {
    build_pdf(num_pages, "Info", Some((title, author)), 1)
}

/// Uncompressed pages with identical, long content streams.
pub(crate) fn create_verbose_pdf(num_pages: u32) -> Vec<u8> {
    build_pdf(num_pages, "Verbose", None, 200)
}

fn build_pdf(num_pages: u32, prefix: &str, info: Option<(&str, &str)>, repeat: usize) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");

    let pages_id = doc.new_object_id();
    let catalog_id = doc.new_object_id();
    let font_id = doc.add_object(Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Font".to_vec())),
        ("Subtype", Object::Name(b"Type1".to_vec())),
        ("BaseFont", Object::Name(b"Helvetica".to_vec())),
    ]));

    let mut kids = Vec::new();
    for page_num in 0..num_pages {
        let content = if repeat > 1 {
            "BT /F1 12 Tf 50 700 Td (Verbose) Tj ET\n".repeat(repeat)
        } else {
            format!("BT /F1 12 Tf 50 700 Td ({}-Page-{}) Tj ET", prefix, page_num + 1)
        };
        let content_id = doc.add_object(Stream::new(Dictionary::new(), content.into_bytes()));

        let page_id = doc.add_object(Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Page".to_vec())),
            ("Parent", Object::Reference(pages_id)),
            ("Contents", Object::Reference(content_id)),
        ]));
        kids.push(Object::Reference(page_id));
    }

    let resources = Dictionary::from_iter(vec![(
        "Font",
        Object::Dictionary(Dictionary::from_iter(vec![("F1", Object::Reference(font_id))])),
    )]);
    let media_box = vec![
        Object::Integer(0),
        Object::Integer(0),
        Object::Integer(612),
        Object::Integer(792),
    ];

    doc.objects.insert(
        pages_id,
        Object::Dictionary(Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Pages".to_vec())),
            ("Count", Object::Integer(num_pages as i64)),
            ("Kids", Object::Array(kids)),
            ("Resources", Object::Dictionary(resources)),
            ("MediaBox", Object::Array(media_box)),
        ])),
    );
    doc.objects.insert(
        catalog_id,
        Object::Dictionary(Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Catalog".to_vec())),
            ("Pages", Object::Reference(pages_id)),
        ])),
    );
    doc.trailer.set("Root", Object::Reference(catalog_id));

    if let Some((title, author)) = info {
        let info_id = doc.add_object(Dictionary::from_iter(vec![
            (
                "Title",
                Object::String(title.as_bytes().to_vec(), StringFormat::Literal),
            ),
            (
                "Author",
                Object::String(author.as_bytes().to_vec(), StringFormat::Literal),
            ),
        ]));
        doc.trailer.set("Info", Object::Reference(info_id));
    }

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).unwrap();
    buffer
}

/// Pages whose single link annotation jumps to the next page; the last page
/// links back to the first.
pub(crate) fn create_linked_pdf(num_pages: u32) -> Vec<u8> {
    let mut doc = Document::load_mem(&create_test_pdf(num_pages, "Link")).unwrap();
    let page_ids: Vec<_> = doc.get_pages().values().copied().collect();

    for (position, &page_id) in page_ids.iter().enumerate() {
        let target = page_ids[(position + 1) % page_ids.len()];
        let link_id = doc.add_object(Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Annot".to_vec())),
            ("Subtype", Object::Name(b"Link".to_vec())),
            (
                "Rect",
                Object::Array(vec![
                    Object::Integer(50),
                    Object::Integer(50),
                    Object::Integer(150),
                    Object::Integer(80),
                ]),
            ),
            (
                "Dest",
                Object::Array(vec![
                    Object::Reference(target),
                    Object::Name(b"Fit".to_vec()),
                ]),
            ),
        ]));
        doc.get_dictionary_mut(page_id)
            .unwrap()
            .set("Annots", Object::Array(vec![Object::Reference(link_id)]));
    }

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).unwrap();
    buffer
}

/// For each page in order, the index of the page its first link jumps to,
/// or `None` when the page has no resolvable link.
pub(crate) fn link_targets(bytes: &[u8]) -> Vec<Option<usize>> {
    let doc = Document::load_mem(bytes).unwrap();
    let page_ids: Vec<_> = doc.get_pages().values().copied().collect();

    page_ids
        .iter()
        .map(|&page_id| {
            let page = doc.get_dictionary(page_id).ok()?;
            let annots = page.get(b"Annots").and_then(Object::as_array).ok()?;
            let link_id = annots.first()?.as_reference().ok()?;
            let link = doc.get_dictionary(link_id).ok()?;
            let dest = link.get(b"Dest").and_then(Object::as_array).ok()?;
            let target = dest.first()?.as_reference().ok()?;
            page_ids.iter().position(|&id| id == target)
        })
        .collect()
}

/// The text marker of each page, in page order.
pub(crate) fn page_markers(bytes: &[u8]) -> Vec<String> {
    let doc = Document::load_mem(bytes).unwrap();
    doc.get_pages()
        .values()
        .map(|&id| {
            let content = doc.get_page_content(id);
            let text = String::from_utf8_lossy(&content);
            match (text.find('('), text.find(')')) {
                (Some(open), Some(close)) if open < close => text[open + 1..close].to_string(),
                _ => String::new(),
            }
        })
        .collect()
}
