//! JSON command protocol for embedding hosts
//!
//! A host that cannot link against Rust types sends one [`JobCommand`] and
//! gets one [`ProcessResult`] back. File contents travel base64-encoded in
//! both directions.

use std::time::Instant;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::compress::QualityTier;
use crate::config::Operation;
use crate::engine::Engine;
use crate::error::{PdfToolsError, Result};
use crate::ranges::PageRange;
use crate::source::{ByteSource, PDF_MEDIA_TYPE};

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum JobCommand {
    Merge {
        files: Vec<FileInput>,
    },
    Split {
        file: FileInput,
        #[serde(default)]
        ranges: Option<Vec<PageRange>>,
    },
    Compress {
        file: FileInput,
        #[serde(default)]
        quality: QualityTier,
    },
    Info {
        file: FileInput,
    },
    Validate {
        file: FileInput,
        #[serde(default = "default_validate_operation")]
        operation: Operation,
    },
}

/// One file inside a command.
#[derive(Debug, Clone, Deserialize)]
pub struct FileInput {
    #[serde(default = "default_file_name")]
    pub name: String,
    #[serde(default = "default_media_type")]
    pub media_type: String,
    /// Base64-encoded file contents
    pub data: String,
}

fn default_file_name() -> String {
    "document.pdf".to_string()
}

fn default_media_type() -> String {
    PDF_MEDIA_TYPE.to_string()
}

fn default_validate_operation() -> Operation {
    Operation::Validate
}

impl FileInput {
    fn decode(&self) -> Result<ByteSource> {
        let bytes = STANDARD.decode(self.data.trim()).map_err(|e| {
            PdfToolsError::Operation(format!("{}: invalid base64 data: {}", self.name, e))
        })?;
        Ok(ByteSource::new(bytes, self.media_type.clone(), self.name.clone()))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessResult {
    pub success: bool,
    /// Base64-encoded PDF data
    pub data: Option<String>,
    pub error: Option<String>,
    /// Structured output of split, info and validate
    pub report: Option<serde_json::Value>,
    pub metrics: Option<ProcessMetrics>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessMetrics {
    pub input_size_bytes: u64,
    pub output_size_bytes: u64,
    pub page_count: usize,
    pub processing_time_ms: u64,
}

impl ProcessResult {
    fn failure(error: &PdfToolsError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.to_string()),
            report: None,
            metrics: None,
        }
    }
}

impl Engine {
    /// Run one command under a fresh budget. Never fails: errors are
    /// reported inside the result.
    pub fn execute(&self, command: JobCommand) -> ProcessResult {
        let started = Instant::now();
        match self.run_command(command) {
            Ok(mut result) => {
                if let Some(metrics) = result.metrics.as_mut() {
                    metrics.processing_time_ms = started.elapsed().as_millis() as u64;
                }
                result
            }
            Err(err) => {
                warn!(error = %err, "Command failed");
                ProcessResult::failure(&err)
            }
        }
    }

    /// Parse a JSON command, run it, and serialize the result.
    pub fn execute_json(&self, command: &str) -> String {
        let result = match serde_json::from_str::<JobCommand>(command) {
            Ok(command) => self.execute(command),
            Err(e) => {
                ProcessResult::failure(&PdfToolsError::Serialization(format!("bad command: {}", e)))
            }
        };
        serde_json::to_string(&result).unwrap_or_else(|e| {
            format!(r#"{{"success":false,"error":"failed to encode result: {}"}}"#, e)
        })
    }

    fn run_command(&self, command: JobCommand) -> Result<ProcessResult> {
        let budget = self.budget();

        match command {
            JobCommand::Merge { files } => {
                let sources = files
                    .iter()
                    .map(FileInput::decode)
                    .collect::<Result<Vec<_>>>()?;
                let outcome = self.merge(&sources, &budget)?;
                Ok(ProcessResult {
                    success: true,
                    data: Some(STANDARD.encode(&outcome.bytes)),
                    error: None,
                    report: None,
                    metrics: Some(ProcessMetrics {
                        input_size_bytes: outcome.input_size_bytes,
                        output_size_bytes: outcome.output_size_bytes,
                        page_count: outcome.page_count,
                        processing_time_ms: 0,
                    }),
                })
            }
            JobCommand::Split { file, ranges } => {
                let source = file.decode()?;
                let outcome = self.split(&source, ranges, &budget)?;
                let first = outcome.partitions.first();
                let metrics = ProcessMetrics {
                    input_size_bytes: source.size_bytes(),
                    output_size_bytes: first.map_or(0, |p| p.size_bytes),
                    page_count: outcome.page_count,
                    processing_time_ms: 0,
                };
                let data = first
                    .and_then(|p| p.payload.as_ref())
                    .map(|bytes| STANDARD.encode(bytes));
                Ok(ProcessResult {
                    success: true,
                    data,
                    error: None,
                    report: Some(to_report(&outcome)?),
                    metrics: Some(metrics),
                })
            }
            JobCommand::Compress { file, quality } => {
                let source = file.decode()?;
                let outcome = self.compress(&source, quality, &budget)?;
                Ok(ProcessResult {
                    success: true,
                    data: Some(STANDARD.encode(&outcome.bytes)),
                    error: None,
                    report: Some(to_report(&outcome)?),
                    metrics: Some(ProcessMetrics {
                        input_size_bytes: outcome.original_size_bytes,
                        output_size_bytes: outcome.compressed_size_bytes,
                        page_count: outcome.page_count,
                        processing_time_ms: 0,
                    }),
                })
            }
            JobCommand::Info { file } => {
                let source = file.decode()?;
                let info = self.info(&source)?;
                Ok(ProcessResult {
                    success: true,
                    data: None,
                    error: None,
                    report: Some(to_report(&info)?),
                    metrics: None,
                })
            }
            JobCommand::Validate { file, operation } => {
                let source = file.decode()?;
                let result = self.validate(operation, &source);
                Ok(ProcessResult {
                    success: result.is_valid(),
                    data: None,
                    error: result.error().map(ToString::to_string),
                    report: Some(to_report(&result)?),
                    metrics: None,
                })
            }
        }
    }
}

fn to_report<T: Serialize>(value: &T) -> Result<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| PdfToolsError::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{create_test_pdf, page_markers};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn encoded(pages: u32, prefix: &str) -> String {
        STANDARD.encode(create_test_pdf(pages, prefix))
    }

    #[test]
    fn test_command_deserializes_merge() {
        let json = r#"{"type":"Merge","files":[]}"#;
        let cmd: JobCommand = serde_json::from_str(json).unwrap();
        assert!(matches!(cmd, JobCommand::Merge { .. }));
    }

    #[test]
    fn test_command_deserializes_split() {
        let json = r#"{"type":"Split","file":{"data":""},"ranges":[[0,2],[4,4]]}"#;
        match serde_json::from_str::<JobCommand>(json).unwrap() {
            JobCommand::Split { file, ranges } => {
                assert_eq!(file.name, "document.pdf");
                assert_eq!(
                    ranges,
                    Some(vec![PageRange::new(0, 2), PageRange::single(4)])
                );
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_compress_defaults_to_medium() {
        let json = r#"{"type":"Compress","file":{"data":""}}"#;
        let cmd: JobCommand = serde_json::from_str(json).unwrap();
        assert!(matches!(
            cmd,
            JobCommand::Compress {
                quality: QualityTier::Medium,
                ..
            }
        ));
    }

    #[test]
    fn test_execute_merge() {
        let engine = Engine::default();
        let command: JobCommand = serde_json::from_value(json!({
            "type": "Merge",
            "files": [
                { "name": "a.pdf", "data": encoded(1, "A") },
                { "name": "b.pdf", "data": encoded(2, "B") }
            ]
        }))
        .unwrap();

        let result = engine.execute(command);
        assert!(result.success, "{:?}", result.error);
        let bytes = STANDARD.decode(result.data.unwrap()).unwrap();
        assert_eq!(page_markers(&bytes), vec!["A-Page-1", "B-Page-1", "B-Page-2"]);

        let metrics = result.metrics.unwrap();
        assert_eq!(metrics.page_count, 3);
        assert_eq!(metrics.output_size_bytes, bytes.len() as u64);
    }

    #[test]
    fn test_execute_split_returns_first_partition() {
        let engine = Engine::default();
        let result = engine.execute(JobCommand::Split {
            file: FileInput {
                name: "s.pdf".into(),
                media_type: PDF_MEDIA_TYPE.into(),
                data: encoded(3, "S"),
            },
            ranges: Some(vec![PageRange::new(1, 2), PageRange::single(0)]),
        });

        assert!(result.success);
        let bytes = STANDARD.decode(result.data.unwrap()).unwrap();
        assert_eq!(page_markers(&bytes), vec!["S-Page-2", "S-Page-3"]);
        let report = result.report.unwrap();
        assert_eq!(report["processedPartitions"], 2);
    }

    #[test]
    fn test_execute_validate_reports_invalid() {
        let engine = Engine::default();
        let result = engine.execute(JobCommand::Validate {
            file: FileInput {
                name: "empty.pdf".into(),
                media_type: PDF_MEDIA_TYPE.into(),
                data: String::new(),
            },
            operation: Operation::Validate,
        });

        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("File is empty"));
        assert_eq!(result.report.unwrap(), json!({ "valid": false, "error": "File is empty" }));
    }

    #[test]
    fn test_execute_reports_bad_base64() {
        let engine = Engine::default();
        let result = engine.execute(JobCommand::Info {
            file: FileInput {
                name: "x.pdf".into(),
                media_type: PDF_MEDIA_TYPE.into(),
                data: "***".into(),
            },
        });
        assert!(!result.success);
        assert!(result.error.unwrap().contains("invalid base64"));
    }

    #[test]
    fn test_execute_json() {
        let engine = Engine::default();
        let output = engine.execute_json(r#"{"type":"Nope"}"#);
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["success"], false);
        assert!(value["error"].as_str().unwrap().contains("bad command"));

        let command = json!({ "type": "Info", "file": { "data": encoded(2, "I") } }).to_string();
        let value: serde_json::Value = serde_json::from_str(&engine.execute_json(&command)).unwrap();
        assert_eq!(value["success"], true);
        assert_eq!(value["report"]["pageCount"], 2);
    }
}
