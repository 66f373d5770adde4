use serde::Serialize;
use thiserror::Error;

/// Reasons an uploaded file is rejected before any processing happens.
///
/// Always the caller's fault and always checked before mutation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("File must be a {format} file")]
    InvalidType { format: &'static str },

    #[error("File is empty")]
    EmptyFile,

    #[error("File size must be less than {limit}")]
    TooLarge { limit: String },

    #[error("Invalid {format} file: {detail}")]
    MalformedStructure {
        format: &'static str,
        detail: String,
    },
}

/// Why a job stopped early under its [`JobBudget`](crate::budget::JobBudget).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BudgetError {
    #[error("job was cancelled")]
    Cancelled,

    #[error("processing time limit of {limit_ms}ms exceeded")]
    DeadlineExceeded { limit_ms: u64 },

    #[error("page limit of {limit} pages exceeded")]
    PageLimitExceeded { limit: usize },
}

#[derive(Error, Debug)]
pub enum PdfToolsError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Failed to parse PDF: {0}")]
    Decode(String),

    #[error("At least {required} PDF files are required to merge, got {provided}")]
    InsufficientInputs { required: usize, provided: usize },

    #[error("Failed to merge PDFs: file {} ({name}): {source}", .index + 1)]
    MergeFailed {
        index: usize,
        name: String,
        #[source]
        source: Box<PdfToolsError>,
    },

    #[error("{} of {total} uploaded files failed validation", .failures.len())]
    InvalidInputs {
        total: usize,
        failures: Vec<InputFailure>,
    },

    #[error("Invalid page range: {0}")]
    InvalidRange(String),

    #[error(transparent)]
    Budget(#[from] BudgetError),

    #[error("PDF operation failed: {0}")]
    Operation(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PdfToolsError {
    /// Short message suitable for showing to an end user.
    ///
    /// The `Display` output carries parser diagnostics; this never does on
    /// its own.
    pub fn user_message(&self) -> String {
        match self {
            PdfToolsError::Validation(err) => match err {
                ValidationError::MalformedStructure { format, .. } => {
                    format!("Invalid {format} file")
                }
                other => other.to_string(),
            },
            PdfToolsError::Decode(_) => "Could not read the PDF file".to_string(),
            PdfToolsError::InsufficientInputs { required, .. } => {
                format!("Please select at least {required} PDF files to merge")
            }
            PdfToolsError::MergeFailed { .. } => "Failed to merge PDFs".to_string(),
            PdfToolsError::InvalidInputs { failures, .. } => match failures.as_slice() {
                [only] => format!("{}: {}", only.name, only.error),
                _ => format!("{} files are invalid", failures.len()),
            },
            PdfToolsError::InvalidRange(_) => "Invalid page range".to_string(),
            PdfToolsError::Budget(BudgetError::Cancelled) => "Processing was cancelled".to_string(),
            PdfToolsError::Budget(BudgetError::DeadlineExceeded { .. }) => {
                "Processing took too long".to_string()
            }
            PdfToolsError::Budget(BudgetError::PageLimitExceeded { .. }) => {
                "Document has too many pages".to_string()
            }
            PdfToolsError::Operation(_) | PdfToolsError::Serialization(_) => {
                "Failed to process PDF".to_string()
            }
            PdfToolsError::Io(_) => "Failed to read uploaded file".to_string(),
        }
    }

    /// True when the failure was caused by the caller's input rather than the engine.
    pub fn is_client_error(&self) -> bool {
        match self {
            PdfToolsError::Validation(_)
            | PdfToolsError::Decode(_)
            | PdfToolsError::InsufficientInputs { .. }
            | PdfToolsError::InvalidInputs { .. }
            | PdfToolsError::InvalidRange(_) => true,
            PdfToolsError::MergeFailed { source, .. } => source.is_client_error(),
            _ => false,
        }
    }
}

/// One rejected file out of a multi-file upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InputFailure {
    pub index: usize,
    pub name: String,
    #[serde(serialize_with = "serialize_display")]
    pub error: ValidationError,
}

fn serialize_display<S: serde::Serializer>(
    value: &ValidationError,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

/// A temporary resource that could not be released.
///
/// Logged by the guard; never changes the outcome of the job that owned it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupWarning {
    pub resource: String,
    pub detail: String,
}

impl std::fmt::Display for CleanupWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "failed to release {}: {}", self.resource, self.detail)
    }
}

pub type Result<T> = std::result::Result<T, PdfToolsError>;
