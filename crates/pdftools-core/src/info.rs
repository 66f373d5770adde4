//! Document information extraction
//!
//! Read-only: nothing here mutates the parsed document.

use lopdf::{Dictionary, Document, Object, ObjectId};
use serde::Serialize;
use tracing::{instrument, warn};

use crate::document::DocumentModel;
use crate::error::Result;
use crate::source::ByteSource;

/// Guards against /Parent chains that loop.
const MAX_TREE_DEPTH: usize = 64;

/// US Letter, used when a page has no usable MediaBox.
const DEFAULT_MEDIA_BOX: [f64; 4] = [0.0, 0.0, 612.0, 792.0];

/// Document information dictionary fields plus the page count.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub page_count: usize,
}

/// Information about a single PDF page
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    /// 1-indexed
    pub page_number: usize,
    /// Page width in points (1 point = 1/72 inch)
    pub width: f32,
    pub height: f32,
    /// 0, 90, 180 or 270
    pub rotation: i32,
    /// Orientation as displayed, i.e. after rotation
    pub orientation: PageOrientation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PageOrientation {
    Portrait,
    Landscape,
    Square,
}

/// Everything the info operation reports about one upload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentInfo {
    #[serde(flatten)]
    pub metadata: Metadata,
    pub size_bytes: u64,
    pub size_formatted: String,
    pub version: String,
    pub encrypted: bool,
    pub pages: Vec<PageInfo>,
}

/// Parse `source` and describe it.
#[instrument(skip_all, fields(name = source.original_name(), size = source.size_bytes()))]
pub fn info(source: &ByteSource) -> Result<DocumentInfo> {
    let model = DocumentModel::parse(source.bytes())?;
    Ok(describe(&model, source.size_bytes()))
}

pub(crate) fn describe(model: &DocumentModel, size_bytes: u64) -> DocumentInfo {
    let doc = model.inner();
    let pages = doc
        .get_pages()
        .values()
        .enumerate()
        .map(|(index, &id)| PageInfo::from_page(doc, id, index + 1))
        .collect();

    DocumentInfo {
        metadata: model.metadata(),
        size_bytes,
        size_formatted: format_bytes(size_bytes),
        version: model.version().to_string(),
        encrypted: model.is_encrypted(),
        pages,
    }
}

/// Human-readable size: bytes below 1 KiB, then KB and MB with two decimals.
pub fn format_bytes(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = 1024.0 * 1024.0;

    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.2} KB", bytes as f64 / KB)
    } else {
        format!("{:.2} MB", bytes as f64 / MB)
    }
}

pub(crate) fn read_metadata(doc: &Document, page_count: usize) -> Metadata {
    let info = match doc.trailer.get(b"Info") {
        Ok(Object::Reference(id)) => doc.get_object(*id).and_then(Object::as_dict).ok(),
        Ok(Object::Dictionary(dict)) => Some(dict),
        _ => None,
    };

    let Some(info) = info else {
        return Metadata {
            page_count,
            ..Metadata::default()
        };
    };

    Metadata {
        title: text_field(doc, info, b"Title"),
        author: text_field(doc, info, b"Author"),
        subject: text_field(doc, info, b"Subject"),
        creator: text_field(doc, info, b"Creator"),
        producer: text_field(doc, info, b"Producer"),
        page_count,
    }
}

fn text_field(doc: &Document, dict: &Dictionary, key: &[u8]) -> Option<String> {
    let value = match dict.get(key).ok()? {
        Object::Reference(id) => doc.get_object(*id).ok()?,
        other => other,
    };
    let decoded = decode_text_string(value.as_str().ok()?);
    let trimmed = decoded.trim_end_matches('\0');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Decode a PDF text string: UTF-16BE or UTF-8 when a byte order mark is
/// present, otherwise PDFDocEncoding (treated as Latin-1).
pub(crate) fn decode_text_string(bytes: &[u8]) -> String {
    if let Some(utf16) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = utf16
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    if let Some(utf8) = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        return String::from_utf8_lossy(utf8).into_owned();
    }
    bytes.iter().map(|&b| b as char).collect()
}

impl PageInfo {
    fn from_page(doc: &Document, page_id: ObjectId, page_number: usize) -> Self {
        let page = doc.get_object(page_id).and_then(Object::as_dict).ok();

        let media_box = page
            .and_then(|dict| inherited(doc, dict, b"MediaBox"))
            .and_then(|obj| resolve(doc, obj).as_array().ok())
            .and_then(|array| match parse_box_array(doc, array) {
                Ok(media_box) => Some(media_box),
                Err(detail) => {
                    warn!(page_number, %detail, "Unusable MediaBox, assuming US Letter");
                    None
                }
            })
            .unwrap_or(DEFAULT_MEDIA_BOX);

        let rotation = page
            .and_then(|dict| inherited(doc, dict, b"Rotate"))
            .and_then(|obj| resolve(doc, obj).as_i64().ok())
            .map(|angle| normalize_rotation(angle as i32))
            .unwrap_or(0);

        let width = (media_box[2] - media_box[0]).abs();
        let height = (media_box[3] - media_box[1]).abs();

        Self {
            page_number,
            width: width as f32,
            height: height as f32,
            rotation,
            orientation: orientation(width, height, rotation),
        }
    }
}

fn orientation(width: f64, height: f64, rotation: i32) -> PageOrientation {
    let (effective_width, effective_height) = if rotation == 90 || rotation == 270 {
        (height, width)
    } else {
        (width, height)
    };

    if (effective_width - effective_height).abs() < 1.0 {
        PageOrientation::Square
    } else if effective_width > effective_height {
        PageOrientation::Landscape
    } else {
        PageOrientation::Portrait
    }
}

/// Look `key` up on the page, then on each ancestor in the page tree.
fn inherited<'a>(doc: &'a Document, page: &'a Dictionary, key: &[u8]) -> Option<&'a Object> {
    let mut current = page;
    for _ in 0..MAX_TREE_DEPTH {
        if let Ok(value) = current.get(key) {
            return Some(value);
        }
        let parent_id = current.get(b"Parent").and_then(Object::as_reference).ok()?;
        current = doc.get_object(parent_id).and_then(Object::as_dict).ok()?;
    }
    None
}

fn resolve<'a>(doc: &'a Document, object: &'a Object) -> &'a Object {
    match object {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(object),
        other => other,
    }
}

/// Parse a box array [x1, y1, x2, y2]
fn parse_box_array(doc: &Document, array: &[Object]) -> std::result::Result<[f64; 4], String> {
    if array.len() != 4 {
        return Err("MediaBox must have 4 elements".to_string());
    }

    let mut result = [0.0; 4];
    for (i, obj) in array.iter().enumerate() {
        result[i] = match resolve(doc, obj) {
            Object::Integer(n) => *n as f64,
            Object::Real(n) => *n as f64,
            _ => return Err(format!("MediaBox element {} is not a number", i)),
        };
    }

    Ok(result)
}

/// Normalize rotation to 0, 90, 180, or 270
fn normalize_rotation(angle: i32) -> i32 {
    angle.rem_euclid(360) / 90 * 90
}
