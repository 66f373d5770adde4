//! PDF merge, split, compress, validate and info engine
//!
//! Every operation works on whole documents held in memory:
//!
//! - [`merge`]: concatenate the pages of several documents in input order
//! - [`split`]: partition one document by page range, bounded by a
//!   partition ceiling
//! - [`compress`]: re-serialize a document under a quality tier
//! - [`validation`]: type, size and structure checks for untrusted uploads
//! - [`info`]: metadata and per-page geometry
//!
//! [`Engine`] wraps them with per-operation size limits and a per-job
//! [`JobBudget`] (deadline, page ceiling, cancellation). The same engine
//! backs the HTTP server and in-process embedding; hosts speaking JSON can
//! use [`JobCommand`] and [`ProcessResult`].

pub mod budget;
pub mod command;
pub mod compress;
pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod guard;
pub mod info;
pub mod merge;
pub mod ranges;
pub mod source;
pub mod split;
pub mod validation;

#[cfg(test)]
pub(crate) mod testing;

pub use budget::{CancellationToken, JobBudget};
pub use command::{FileInput, JobCommand, ProcessMetrics, ProcessResult};
pub use compress::{compress, CompressJob, CompressOutcome, EncodingProfile, QualityTier};
pub use config::{EngineConfig, Operation, SizeLimits};
pub use document::{DocumentModel, PageCopier, PageHandle};
pub use engine::Engine;
pub use error::{
    BudgetError, CleanupWarning, InputFailure, PdfToolsError, Result, ValidationError,
};
pub use guard::{with_guard, ResourceGuard, TempResource};
pub use info::{format_bytes, info, DocumentInfo, Metadata, PageInfo, PageOrientation};
pub use merge::{merge, merge_sources, MergeInput, MergeJob, MergeOutcome};
pub use ranges::{parse_page_ranges, parse_range_list, parse_ranges_field, PageRange};
pub use source::{ByteSource, PDF_MEDIA_TYPE};
pub use split::{split, PartitionResult, SplitJob, SplitOutcome};
pub use validation::{validate, ValidationResult, Validator};

/// Parse PDF bytes and return page count
pub fn get_page_count(bytes: &[u8]) -> Result<usize> {
    Ok(DocumentModel::parse(bytes)?.page_count())
}
