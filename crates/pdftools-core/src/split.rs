//! PDF Split algorithm
//!
//! Partitions one document into several by page range. Every partition is
//! built and serialized so its size can be reported, but only the first one
//! keeps its bytes: the response stays bounded no matter how many
//! partitions were requested.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Serialize, Serializer};
use tracing::{debug, info, instrument};

use crate::budget::JobBudget;
use crate::compress::EncodingProfile;
use crate::document::{DocumentModel, PageCopier};
use crate::error::Result;
use crate::ranges::PageRange;

pub const DEFAULT_MAX_PARTITIONS: usize = 10;

#[derive(Debug, Clone)]
pub struct SplitJob {
    pub input: DocumentModel,
    /// `None` means one partition per page.
    pub ranges: Option<Vec<PageRange>>,
    pub max_partitions: usize,
}

impl SplitJob {
    pub fn new(input: DocumentModel) -> Self {
        Self {
            input,
            ranges: None,
            max_partitions: DEFAULT_MAX_PARTITIONS,
        }
    }

    pub fn with_ranges(mut self, ranges: Vec<PageRange>) -> Self {
        self.ranges = Some(ranges);
        self
    }

    pub fn with_max_partitions(mut self, max_partitions: usize) -> Self {
        self.max_partitions = max_partitions;
        self
    }
}

/// One output document of a split.
///
/// Page numbers are 1-based. A range lying past the end of the document
/// yields `page_count == 0`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionResult {
    pub index: usize,
    pub start_page: usize,
    pub end_page: usize,
    pub page_count: usize,
    pub size_bytes: u64,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_payload"
    )]
    pub payload: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitOutcome {
    pub page_count: usize,
    pub requested_partitions: usize,
    pub processed_partitions: usize,
    /// True when ranges beyond `max_partitions` were dropped.
    pub truncated: bool,
    pub partitions: Vec<PartitionResult>,
}

/// Split `job.input` into at most `job.max_partitions` documents.
#[instrument(skip_all, fields(pages = job.input.page_count(), max_partitions = job.max_partitions))]
pub fn split(job: &SplitJob, budget: &JobBudget) -> Result<SplitOutcome> {
    let page_count = job.input.page_count();
    if page_count == 0 {
        return Ok(SplitOutcome {
            page_count: 0,
            requested_partitions: job.ranges.as_ref().map_or(0, Vec::len),
            processed_partitions: 0,
            truncated: false,
            partitions: Vec::new(),
        });
    }

    let ranges = resolve_ranges(job.ranges.as_deref(), page_count);
    let requested_partitions = ranges.len();
    let selected = &ranges[..requested_partitions.min(job.max_partitions)];

    let total_pages: usize = selected
        .iter()
        .map(|range| clip(*range, page_count).count())
        .sum();
    budget.checkpoint(total_pages)?;

    let mut partitions = Vec::with_capacity(selected.len());
    let mut copied = 0;

    for (position, range) in selected.iter().enumerate() {
        let pages = clip(*range, page_count);
        let mut output = DocumentModel::empty();
        let mut copier = PageCopier::new(&job.input);

        for page in pages {
            budget.checkpoint(copied)?;
            let handle = copier.copy_page(&mut output, page)?;
            output.add_page(handle)?;
            copied += 1;
        }
        copier.finish(&mut output);

        let partition_pages = output.page_count();
        let bytes = output.into_bytes(EncodingProfile::SharedObjects)?;
        debug!(
            partition = position + 1,
            start = range.start,
            end = range.end,
            pages = partition_pages,
            size = bytes.len(),
            "Partition built"
        );

        partitions.push(PartitionResult {
            index: position + 1,
            start_page: range.start.saturating_add(1),
            end_page: range.end.min(page_count - 1) + 1,
            page_count: partition_pages,
            size_bytes: bytes.len() as u64,
            payload: (position == 0).then_some(bytes),
        });
    }

    let processed_partitions = partitions.len();
    let truncated = processed_partitions < requested_partitions;
    info!(
        requested_partitions,
        processed_partitions, truncated, "Split complete"
    );

    Ok(SplitOutcome {
        page_count,
        requested_partitions,
        processed_partitions,
        truncated,
        partitions,
    })
}

/// Explicit ranges as given, or one single-page range per page.
fn resolve_ranges(ranges: Option<&[PageRange]>, page_count: usize) -> Vec<PageRange> {
    match ranges {
        Some(ranges) => ranges.to_vec(),
        None => (0..page_count).map(PageRange::single).collect(),
    }
}

/// Page indices a range covers once its end is clipped to the document.
/// Empty when the range starts past the end or is inverted.
fn clip(range: PageRange, page_count: usize) -> std::ops::Range<usize> {
    let end = range.end.saturating_add(1).min(page_count);
    if range.start >= end {
        return 0..0;
    }
    range.start..end
}

fn serialize_payload<S: Serializer>(
    payload: &Option<Vec<u8>>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match payload {
        Some(bytes) => serializer.serialize_str(&STANDARD.encode(bytes)),
        None => serializer.serialize_none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{BudgetError, PdfToolsError};
    use crate::testing::{create_linked_pdf, create_test_pdf, link_targets, page_markers};
    use pretty_assertions::assert_eq;

    fn job(pages: u32) -> SplitJob {
        SplitJob::new(DocumentModel::parse(&create_test_pdf(pages, "S")).unwrap())
    }

    fn ranges(pairs: &[(usize, usize)]) -> Vec<PageRange> {
        pairs.iter().copied().map(PageRange::from).collect()
    }

    #[test]
    fn test_split_defaults_to_one_page_per_partition() {
        let outcome = split(&job(3), &JobBudget::unbounded()).unwrap();

        assert_eq!(outcome.page_count, 3);
        assert_eq!(outcome.requested_partitions, 3);
        assert_eq!(outcome.processed_partitions, 3);
        assert!(!outcome.truncated);
        for (i, partition) in outcome.partitions.iter().enumerate() {
            assert_eq!(partition.index, i + 1);
            assert_eq!(partition.start_page, i + 1);
            assert_eq!(partition.end_page, i + 1);
            assert_eq!(partition.page_count, 1);
            assert!(partition.size_bytes > 0);
        }
    }

    #[test]
    fn test_split_only_first_partition_has_payload() {
        let outcome = split(&job(3), &JobBudget::unbounded()).unwrap();
        let first = outcome.partitions[0].payload.as_ref().unwrap();
        assert_eq!(first.len() as u64, outcome.partitions[0].size_bytes);
        assert_eq!(page_markers(first), vec!["S-Page-1"]);
        assert!(outcome.partitions[1..].iter().all(|p| p.payload.is_none()));
    }

    #[test]
    fn test_split_extracts_range() {
        let outcome = split(
            &job(5).with_ranges(ranges(&[(1, 3)])),
            &JobBudget::unbounded(),
        )
        .unwrap();
        let payload = outcome.partitions[0].payload.as_ref().unwrap();
        assert_eq!(page_markers(payload), vec!["S-Page-2", "S-Page-3", "S-Page-4"]);
        assert_eq!(outcome.partitions[0].page_count, 3);
    }

    #[test]
    fn test_split_keeps_links_inside_a_partition() {
        let linked = SplitJob::new(DocumentModel::parse(&create_linked_pdf(3)).unwrap())
            .with_ranges(ranges(&[(0, 1)]));
        let outcome = split(&linked, &JobBudget::unbounded()).unwrap();
        let payload = outcome.partitions[0].payload.as_ref().unwrap();
        // The second page links to page 3, which stays behind.
        assert_eq!(link_targets(payload), vec![Some(1), None]);
    }

    #[test]
    fn test_split_truncates_at_max_partitions() {
        let outcome = split(&job(15).with_max_partitions(10), &JobBudget::unbounded()).unwrap();
        assert_eq!(outcome.requested_partitions, 15);
        assert_eq!(outcome.processed_partitions, 10);
        assert!(outcome.truncated);
        assert_eq!(outcome.partitions.len(), 10);
        assert_eq!(outcome.partitions[9].start_page, 10);
    }

    #[test]
    fn test_split_clips_end_to_page_count() {
        let outcome = split(
            &job(4).with_ranges(ranges(&[(2, 99)])),
            &JobBudget::unbounded(),
        )
        .unwrap();
        let partition = &outcome.partitions[0];
        assert_eq!(partition.start_page, 3);
        assert_eq!(partition.end_page, 4);
        assert_eq!(partition.page_count, 2);
    }

    #[test]
    fn test_split_range_past_end_is_empty_partition() {
        let outcome = split(
            &job(2).with_ranges(ranges(&[(5, 7), (0, 0)])),
            &JobBudget::unbounded(),
        )
        .unwrap();
        assert_eq!(outcome.processed_partitions, 2);
        assert_eq!(outcome.partitions[0].page_count, 0);
        let payload = outcome.partitions[0].payload.as_ref().unwrap();
        assert_eq!(DocumentModel::parse(payload).unwrap().page_count(), 0);
        assert_eq!(outcome.partitions[1].page_count, 1);
    }

    #[test]
    fn test_split_inverted_range_is_empty_partition() {
        let outcome = split(
            &job(3).with_ranges(ranges(&[(2, 1)])),
            &JobBudget::unbounded(),
        )
        .unwrap();
        assert_eq!(outcome.partitions[0].page_count, 0);
    }

    #[test]
    fn test_split_zero_page_document() {
        let empty = DocumentModel::parse(
            &DocumentModel::empty()
                .into_bytes(EncodingProfile::Plain)
                .unwrap(),
        )
        .unwrap();
        let outcome = split(&SplitJob::new(empty), &JobBudget::unbounded()).unwrap();
        assert_eq!(outcome.page_count, 0);
        assert!(outcome.partitions.is_empty());
    }

    #[test]
    fn test_split_does_not_modify_input() {
        let job = job(3);
        split(&job, &JobBudget::unbounded()).unwrap();
        assert_eq!(job.input.page_count(), 3);
    }

    #[test]
    fn test_split_respects_page_ceiling() {
        let result = split(&job(4), &JobBudget::new(None, Some(2)));
        assert!(matches!(
            result,
            Err(PdfToolsError::Budget(BudgetError::PageLimitExceeded { limit: 2 }))
        ));
    }

    #[test]
    fn test_split_json_shape() {
        let outcome = split(&job(2), &JobBudget::unbounded()).unwrap();
        let value = serde_json::to_value(&outcome).unwrap();

        assert_eq!(value["pageCount"], 2);
        assert_eq!(value["truncated"], false);
        let payload = value["partitions"][0]["payload"].as_str().unwrap();
        assert!(STANDARD.decode(payload).unwrap().starts_with(b"%PDF-"));
        assert!(value["partitions"][1].get("payload").is_none());
        assert_eq!(value["partitions"][1]["startPage"], 2);
    }
}
