//! Page range parsing
//!
//! Two input forms are accepted:
//! - text, 1-based: `"1-3, 5, 8-10"`
//! - JSON, 0-based inclusive pairs: `[[0,2],[4,4]]`
//!
//! Both produce 0-based inclusive [`PageRange`]s in the order given.
//! Duplicates and overlaps are kept: each range becomes its own partition.

use serde::{Deserialize, Serialize};

use crate::error::{PdfToolsError, Result};

/// Inclusive, 0-based page range. Serialized as `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "(usize, usize)", into = "(usize, usize)")]
pub struct PageRange {
    pub start: usize,
    pub end: usize,
}

impl PageRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn single(page: usize) -> Self {
        Self::new(page, page)
    }
}

impl From<(usize, usize)> for PageRange {
    fn from((start, end): (usize, usize)) -> Self {
        Self::new(start, end)
    }
}

impl From<PageRange> for (usize, usize) {
    fn from(range: PageRange) -> Self {
        (range.start, range.end)
    }
}

/// Parse page range string like "1-3, 5, 8-10".
pub fn parse_page_ranges(input: &str) -> Result<Vec<PageRange>> {
    let mut ranges = Vec::new();

    for part in input.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        if let Some((start, end)) = part.split_once('-') {
            let start = parse_page_number(start, "start")?;
            let end = parse_page_number(end, "end")?;

            if start > end {
                return Err(PdfToolsError::InvalidRange(format!(
                    "Start {} > end {}",
                    start, end
                )));
            }

            ranges.push(PageRange::new(start - 1, end - 1));
        } else {
            let page = parse_page_number(part, "page")?;
            ranges.push(PageRange::single(page - 1));
        }
    }

    if ranges.is_empty() {
        return Err(PdfToolsError::InvalidRange("No pages specified".into()));
    }

    Ok(ranges)
}

/// Parse a JSON list of 0-based `[start, end]` pairs.
pub fn parse_range_list(input: &str) -> Result<Vec<PageRange>> {
    serde_json::from_str(input)
        .map_err(|e| PdfToolsError::InvalidRange(format!("Invalid range list: {}", e)))
}

/// Parse a `ranges` form field in either form. Blank means "not given".
pub fn parse_ranges_field(input: &str) -> Result<Option<Vec<PageRange>>> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        Ok(None)
    } else if trimmed.starts_with('[') {
        parse_range_list(trimmed).map(Some)
    } else {
        parse_page_ranges(trimmed).map(Some)
    }
}

/// 1-based page number; 0 is rejected.
fn parse_page_number(text: &str, what: &str) -> Result<usize> {
    let text = text.trim();
    let page: usize = text
        .parse()
        .map_err(|_| PdfToolsError::InvalidRange(format!("Invalid {}: {}", what, text)))?;
    if page == 0 {
        return Err(PdfToolsError::InvalidRange(
            "Page numbers must be >= 1".into(),
        ));
    }
    Ok(page)
}
