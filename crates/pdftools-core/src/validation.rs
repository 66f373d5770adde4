//! Upload validation
//!
//! Gates every untrusted [`ByteSource`] before a job touches it. Checks run
//! in a fixed order and stop at the first failure; the size check happens
//! before any parse is attempted.

use serde::ser::{Serialize, SerializeStruct, Serializer};
use tracing::debug;

use crate::document::DocumentModel;
use crate::error::{PdfToolsError, ValidationError};
use crate::info::format_bytes;
use crate::source::{ByteSource, PDF_MEDIA_TYPE};

const FORMAT: &str = "PDF";
const PDF_HEADER: &[u8] = b"%PDF-";
/// Readers tolerate junk before the header as long as it starts in the first KiB.
const HEADER_SEARCH_WINDOW: usize = 1024;
const MB: u64 = 1024 * 1024;

/// Outcome of validating one upload.
///
/// Serializes as `{"valid": true}` or `{"valid": false, "error": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    Valid,
    Invalid(ValidationError),
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid)
    }

    pub fn error(&self) -> Option<&ValidationError> {
        match self {
            ValidationResult::Valid => None,
            ValidationResult::Invalid(err) => Some(err),
        }
    }

    pub fn into_result(self) -> Result<(), ValidationError> {
        match self {
            ValidationResult::Valid => Ok(()),
            ValidationResult::Invalid(err) => Err(err),
        }
    }
}

impl Serialize for ValidationResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ValidationResult::Valid => {
                let mut state = serializer.serialize_struct("ValidationResult", 1)?;
                state.serialize_field("valid", &true)?;
                state.end()
            }
            ValidationResult::Invalid(err) => {
                let mut state = serializer.serialize_struct("ValidationResult", 2)?;
                state.serialize_field("valid", &false)?;
                state.serialize_field("error", &err.to_string())?;
                state.end()
            }
        }
    }
}

/// PDF upload validator with a fixed size ceiling.
#[derive(Debug, Clone, Copy)]
pub struct Validator {
    max_size_bytes: u64,
}

impl Validator {
    pub fn new(max_size_bytes: u64) -> Self {
        Self { max_size_bytes }
    }

    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_bytes
    }

    pub fn validate(&self, source: &ByteSource) -> ValidationResult {
        match self.admit(source) {
            Ok(_) => ValidationResult::Valid,
            Err(err) => ValidationResult::Invalid(err),
        }
    }

    /// Validate and hand back the parsed document instead of discarding it.
    pub(crate) fn admit(&self, source: &ByteSource) -> Result<DocumentModel, ValidationError> {
        if !is_pdf_type(source) {
            return Err(ValidationError::InvalidType { format: FORMAT });
        }

        if source.is_empty() {
            return Err(ValidationError::EmptyFile);
        }

        if source.size_bytes() > self.max_size_bytes {
            return Err(ValidationError::TooLarge {
                limit: format_limit(self.max_size_bytes),
            });
        }

        let window = &source.bytes()[..source.bytes().len().min(HEADER_SEARCH_WINDOW)];
        if !window.windows(PDF_HEADER.len()).any(|w| w == PDF_HEADER) {
            return Err(malformed("missing %PDF- header"));
        }

        let model = DocumentModel::parse(source.bytes()).map_err(|err| match err {
            PdfToolsError::Decode(detail) => malformed(detail),
            other => malformed(other.to_string()),
        })?;

        if model.is_encrypted() {
            return Err(malformed("encrypted documents are not supported"));
        }

        debug!(
            name = source.original_name(),
            pages = model.page_count(),
            "Upload validated"
        );
        Ok(model)
    }
}

/// Validate one upload against `max_size_bytes`.
pub fn validate(source: &ByteSource, max_size_bytes: u64) -> ValidationResult {
    Validator::new(max_size_bytes).validate(source)
}

fn is_pdf_type(source: &ByteSource) -> bool {
    let media_type = source
        .declared_media_type()
        .split(';')
        .next()
        .unwrap_or_default()
        .trim();
    media_type.eq_ignore_ascii_case(PDF_MEDIA_TYPE) || source.extension().as_deref() == Some("pdf")
}

/// Whole megabytes when the limit is an exact multiple, otherwise the usual
/// byte formatting.
fn format_limit(limit: u64) -> String {
    if limit >= MB && limit % MB == 0 {
        format!("{}MB", limit / MB)
    } else {
        format_bytes(limit)
    }
}

fn malformed(detail: impl Into<String>) -> ValidationError {
    ValidationError::MalformedStructure {
        format: FORMAT,
        detail: detail.into(),
    }
}
