//! Engine facade
//!
//! Validate-then-run entry points shared by the network server and by
//! embedding hosts. Every operation checks its uploads against the size
//! limit configured for it before any parsing happens.

use tracing::instrument;

use crate::budget::JobBudget;
use crate::compress::{self, CompressJob, CompressOutcome, QualityTier};
use crate::config::{EngineConfig, Operation};
use crate::document::DocumentModel;
use crate::error::{InputFailure, PdfToolsError, Result};
use crate::info::{self, DocumentInfo};
use crate::merge::{self, MergeInput, MergeJob, MergeOutcome, MIN_MERGE_INPUTS};
use crate::ranges::PageRange;
use crate::source::ByteSource;
use crate::split::{self, SplitJob, SplitOutcome};
use crate::validation::{ValidationResult, Validator};

#[derive(Debug, Clone, Default)]
pub struct Engine {
    config: EngineConfig,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// A fresh budget derived from the configured timeout and page ceiling.
    pub fn budget(&self) -> JobBudget {
        self.config.budget()
    }

    pub fn validator(&self, operation: Operation) -> Validator {
        Validator::new(self.config.limits.for_operation(operation))
    }

    /// Validate one upload against the limit of `operation`.
    pub fn validate(&self, operation: Operation, source: &ByteSource) -> ValidationResult {
        self.validator(operation).validate(source)
    }

    /// Validate every upload and report each failure, not just the first.
    pub fn validate_all(&self, operation: Operation, sources: &[ByteSource]) -> Vec<InputFailure> {
        let validator = self.validator(operation);
        sources
            .iter()
            .enumerate()
            .filter_map(|(index, source)| match validator.validate(source) {
                ValidationResult::Valid => None,
                ValidationResult::Invalid(error) => Some(InputFailure {
                    index,
                    name: source.original_name().to_string(),
                    error,
                }),
            })
            .collect()
    }

    /// Merge uploads in order. Stops at the first invalid upload and reports
    /// it by index and name.
    #[instrument(skip_all, fields(inputs = sources.len()))]
    pub fn merge(&self, sources: &[ByteSource], budget: &JobBudget) -> Result<MergeOutcome> {
        check_merge_count(sources)?;

        let validator = self.validator(Operation::Merge);
        let inputs = sources
            .iter()
            .enumerate()
            .map(|(index, source)| -> Result<MergeInput> {
                let document = validator.admit(source).map_err(|error| {
                    PdfToolsError::InvalidInputs {
                        total: sources.len(),
                        failures: vec![InputFailure {
                            index,
                            name: source.original_name().to_string(),
                            error,
                        }],
                    }
                })?;
                Ok(MergeInput::new(source.original_name(), document))
            })
            .collect::<Result<Vec<_>>>()?;

        merge::merge_inputs(MergeJob::new(inputs), budget)
    }

    /// Validate all uploads first; merge only when every one passes.
    #[instrument(skip_all, fields(inputs = sources.len()))]
    pub fn validate_merge(
        &self,
        sources: &[ByteSource],
        budget: &JobBudget,
    ) -> Result<MergeOutcome> {
        check_merge_count(sources)?;

        let validator = self.validator(Operation::Merge);
        let mut inputs = Vec::with_capacity(sources.len());
        let mut failures = Vec::new();
        for (index, source) in sources.iter().enumerate() {
            match validator.admit(source) {
                Ok(document) => inputs.push(MergeInput::new(source.original_name(), document)),
                Err(error) => failures.push(InputFailure {
                    index,
                    name: source.original_name().to_string(),
                    error,
                }),
            }
        }

        if !failures.is_empty() {
            return Err(PdfToolsError::InvalidInputs {
                total: sources.len(),
                failures,
            });
        }

        merge::merge_inputs(MergeJob::new(inputs), budget)
    }

    #[instrument(skip_all, fields(name = source.original_name()))]
    pub fn split(
        &self,
        source: &ByteSource,
        ranges: Option<Vec<PageRange>>,
        budget: &JobBudget,
    ) -> Result<SplitOutcome> {
        let document = self.admit(Operation::Split, source)?;
        let mut job = SplitJob::new(document).with_max_partitions(self.config.max_partitions);
        job.ranges = ranges;
        split::split(&job, budget)
    }

    #[instrument(skip_all, fields(name = source.original_name(), quality = quality.as_str()))]
    pub fn compress(
        &self,
        source: &ByteSource,
        quality: QualityTier,
        budget: &JobBudget,
    ) -> Result<CompressOutcome> {
        let document = self.admit(Operation::Compress, source)?;
        compress::compress(CompressJob::new(document, quality), budget)
    }

    #[instrument(skip_all, fields(name = source.original_name()))]
    pub fn info(&self, source: &ByteSource) -> Result<DocumentInfo> {
        let document = self.admit(Operation::Info, source)?;
        Ok(info::describe(&document, source.size_bytes()))
    }

    fn admit(&self, operation: Operation, source: &ByteSource) -> Result<DocumentModel> {
        Ok(self.validator(operation).admit(source)?)
    }
}

fn check_merge_count(sources: &[ByteSource]) -> Result<()> {
    if sources.len() < MIN_MERGE_INPUTS {
        return Err(PdfToolsError::InsufficientInputs {
            required: MIN_MERGE_INPUTS,
            provided: sources.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SizeLimits;
    use crate::error::ValidationError;
    use crate::testing::{create_pdf_with_info, create_test_pdf, page_markers};
    use pretty_assertions::assert_eq;

    fn pdf(pages: u32, prefix: &str) -> ByteSource {
        ByteSource::pdf(create_test_pdf(pages, prefix), format!("{prefix}.pdf"))
    }

    #[test]
    fn test_merge_validates_before_running() {
        let engine = Engine::default();
        let sources = vec![
            pdf(1, "A"),
            ByteSource::new(b"hello".to_vec(), "text/plain", "notes.txt"),
        ];
        let err = engine.merge(&sources, &JobBudget::unbounded()).unwrap_err();
        match err {
            PdfToolsError::InvalidInputs { total, failures } => {
                assert_eq!(total, 2);
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].index, 1);
                assert_eq!(failures[0].name, "notes.txt");
                assert!(matches!(
                    failures[0].error,
                    ValidationError::InvalidType { .. }
                ));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_merge_in_order() {
        let engine = Engine::default();
        let outcome = engine
            .merge(&[pdf(1, "A"), pdf(2, "B")], &JobBudget::unbounded())
            .unwrap();
        assert_eq!(
            page_markers(&outcome.bytes),
            vec!["A-Page-1", "B-Page-1", "B-Page-2"]
        );
    }

    #[test]
    fn test_merge_requires_two_inputs() {
        let err = Engine::default()
            .merge(&[pdf(1, "Solo")], &JobBudget::unbounded())
            .unwrap_err();
        assert_eq!(err.user_message(), "Please select at least 2 PDF files to merge");
    }

    #[test]
    fn test_validate_merge_reports_every_failure() {
        let engine = Engine::default();
        let sources = vec![
            ByteSource::pdf(Vec::new(), "empty.pdf"),
            pdf(1, "Fine"),
            ByteSource::new(b"x".to_vec(), "image/png", "photo.png"),
        ];

        match engine.validate_merge(&sources, &JobBudget::unbounded()) {
            Err(PdfToolsError::InvalidInputs { total, failures }) => {
                assert_eq!(total, 3);
                let names: Vec<&str> = failures.iter().map(|f| f.name.as_str()).collect();
                assert_eq!(names, vec!["empty.pdf", "photo.png"]);
                assert_eq!(failures[0].error, ValidationError::EmptyFile);
                assert_eq!(failures[1].index, 2);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_per_operation_limits() {
        let small = create_test_pdf(1, "Limit");
        let limit = small.len() as u64 - 1;
        let engine = Engine::new(EngineConfig::default().with_limits(SizeLimits {
            info: limit,
            ..SizeLimits::default()
        }));
        let source = ByteSource::pdf(small, "limit.pdf");

        assert!(!engine.validate(Operation::Info, &source).is_valid());
        assert!(engine.validate(Operation::Compress, &source).is_valid());
        assert!(matches!(
            engine.info(&source),
            Err(PdfToolsError::Validation(ValidationError::TooLarge { .. }))
        ));
    }

    #[test]
    fn test_split_uses_configured_max_partitions() {
        let engine = Engine::new(EngineConfig {
            max_partitions: 2,
            ..EngineConfig::default()
        });
        let outcome = engine
            .split(&pdf(5, "P"), None, &JobBudget::unbounded())
            .unwrap();
        assert_eq!(outcome.requested_partitions, 5);
        assert_eq!(outcome.processed_partitions, 2);
        assert!(outcome.truncated);
    }

    #[test]
    fn test_compress_and_info() {
        let engine = Engine::new(EngineConfig::embedded());
        let source = ByteSource::pdf(create_pdf_with_info(2, "Title", "Me"), "doc.pdf");

        let compressed = engine
            .compress(&source, QualityTier::Medium, &engine.budget())
            .unwrap();
        assert_eq!(compressed.original_size_bytes, source.size_bytes());

        let info = engine.info(&source).unwrap();
        assert_eq!(info.metadata.title.as_deref(), Some("Title"));
        assert_eq!(info.metadata.page_count, 2);
    }
}
