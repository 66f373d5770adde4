//! Uploaded file bytes
//!
//! A `ByteSource` is one file as it arrived at the boundary. It owns its
//! bytes for the lifetime of one job and is never mutated.

use std::path::Path;

use crate::error::Result;

pub const PDF_MEDIA_TYPE: &str = "application/pdf";

/// Immutable, sized, in-memory representation of one uploaded file.
#[derive(Debug, Clone)]
pub struct ByteSource {
    bytes: Vec<u8>,
    declared_media_type: String,
    original_name: String,
}

impl ByteSource {
    pub fn new(
        bytes: Vec<u8>,
        declared_media_type: impl Into<String>,
        original_name: impl Into<String>,
    ) -> Self {
        Self {
            bytes,
            declared_media_type: declared_media_type.into(),
            original_name: original_name.into(),
        }
    }

    /// Convenience constructor for bytes that are known to be a PDF.
    pub fn pdf(bytes: Vec<u8>, original_name: impl Into<String>) -> Self {
        Self::new(bytes, PDF_MEDIA_TYPE, original_name)
    }

    /// Read a spooled upload back into memory.
    pub fn from_path(
        path: impl AsRef<Path>,
        declared_media_type: impl Into<String>,
        original_name: impl Into<String>,
    ) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref())?;
        Ok(Self::new(bytes, declared_media_type, original_name))
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn size_bytes(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn declared_media_type(&self) -> &str {
        &self.declared_media_type
    }

    pub fn original_name(&self) -> &str {
        &self.original_name
    }

    /// Lowercased file extension of the original name, if any.
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.original_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
    }
}
