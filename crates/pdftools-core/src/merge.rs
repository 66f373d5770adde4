//! PDF Merge algorithm
//!
//! Concatenates the page sequences of several documents, in input order.
//!
//! The algorithm:
//! 1. Reject fewer than two inputs
//! 2. Start from an empty document (no default blank page)
//! 3. For each input, in order, deep-copy every page into the output
//! 4. Serialize once at the end
//!
//! Merging is all-or-nothing: the output only escapes when every page of
//! every input was copied. A failure names the input that caused it.

use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::budget::JobBudget;
use crate::compress::EncodingProfile;
use crate::document::{DocumentModel, PageCopier};
use crate::error::{PdfToolsError, Result};
use crate::source::ByteSource;

pub const MIN_MERGE_INPUTS: usize = 2;

/// One document taking part in a merge, with the name used in error reports.
#[derive(Debug, Clone)]
pub struct MergeInput {
    pub name: String,
    pub document: DocumentModel,
}

impl MergeInput {
    pub fn new(name: impl Into<String>, document: DocumentModel) -> Self {
        Self {
            name: name.into(),
            document,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MergeJob {
    pub inputs: Vec<MergeInput>,
    pub min_inputs: usize,
}

impl MergeJob {
    pub fn new(inputs: Vec<MergeInput>) -> Self {
        Self {
            inputs,
            min_inputs: MIN_MERGE_INPUTS,
        }
    }
}

/// Serialized merge result plus the counters reported to callers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeOutcome {
    #[serde(skip)]
    pub bytes: Vec<u8>,
    pub file_count: usize,
    pub page_count: usize,
    pub input_size_bytes: u64,
    pub output_size_bytes: u64,
}

/// Merge the inputs of `job` into a new document.
#[instrument(skip_all, fields(inputs = job.inputs.len()))]
pub fn merge(job: &MergeJob, budget: &JobBudget) -> Result<DocumentModel> {
    if job.inputs.len() < job.min_inputs {
        return Err(PdfToolsError::InsufficientInputs {
            required: job.min_inputs,
            provided: job.inputs.len(),
        });
    }

    let total_pages: usize = job.inputs.iter().map(|i| i.document.page_count()).sum();
    budget.checkpoint(total_pages)?;

    let mut output = DocumentModel::empty();
    let mut copied = 0;

    for (index, input) in job.inputs.iter().enumerate() {
        debug!(
            index,
            name = %input.name,
            pages = input.document.page_count(),
            "Appending input"
        );

        let mut copier = PageCopier::new(&input.document);
        for page in 0..input.document.page_count() {
            budget.checkpoint(copied)?;
            let handle = copier
                .copy_page(&mut output, page)
                .and_then(|handle| output.add_page(handle))
                .map_err(|err| attribute(index, &input.name, err))?;
            debug_assert_eq!(handle.index(), copied);
            copied += 1;
        }
        copier.finish(&mut output);
    }

    info!(pages = output.page_count(), "Merge complete");
    Ok(output)
}

/// Parse, merge and serialize uploaded files.
#[instrument(skip_all, fields(inputs = sources.len()))]
pub fn merge_sources(sources: &[ByteSource], budget: &JobBudget) -> Result<MergeOutcome> {
    if sources.len() < MIN_MERGE_INPUTS {
        return Err(PdfToolsError::InsufficientInputs {
            required: MIN_MERGE_INPUTS,
            provided: sources.len(),
        });
    }

    let inputs = sources
        .iter()
        .enumerate()
        .map(|(index, source)| {
            DocumentModel::parse(source.bytes())
                .map(|document| MergeInput::new(source.original_name(), document))
                .map_err(|err| attribute(index, source.original_name(), err))
        })
        .collect::<Result<Vec<_>>>()?;

    merge_inputs(MergeJob::new(inputs), budget)
}

/// Merge already-parsed inputs and serialize with shared objects.
pub fn merge_inputs(job: MergeJob, budget: &JobBudget) -> Result<MergeOutcome> {
    let input_size_bytes = job.inputs.iter().map(|i| i.document.source_len()).sum();
    let file_count = job.inputs.len();

    let merged = merge(&job, budget)?;
    let page_count = merged.page_count();
    let bytes = merged.into_bytes(EncodingProfile::SharedObjects)?;

    Ok(MergeOutcome {
        output_size_bytes: bytes.len() as u64,
        bytes,
        file_count,
        page_count,
        input_size_bytes,
    })
}

/// Wrap a per-input failure so callers know which file broke the merge.
/// Budget errors are about the job, not the input, and pass through.
fn attribute(index: usize, name: &str, err: PdfToolsError) -> PdfToolsError {
    match err {
        PdfToolsError::Budget(_) => err,
        other => PdfToolsError::MergeFailed {
            index,
            name: name.to_string(),
            source: Box::new(other),
        },
    }
}
