//! API handlers for the pdftools server
//!
//! Provides REST endpoints for:
//! - Merge and validate-then-merge
//! - Split, compress, validate and info on a single upload

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use axum::{
    extract::{Multipart, State},
    http::{header, HeaderName, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use pdftools_core::{
    parse_ranges_field, ByteSource, CompressOutcome, DocumentInfo, JobBudget, MergeOutcome,
    Operation, QualityTier, ResourceGuard, SplitOutcome, ValidationResult,
};
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::ServerError;
use crate::AppState;

const PDF_CONTENT_TYPE: &str = "application/pdf";
const OCTET_STREAM: &str = "application/octet-stream";

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// Handler: GET /health
pub async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "pdftools-server",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Split response: the outcome plus a success flag
#[derive(Serialize)]
pub struct SplitResponse {
    pub success: bool,
    #[serde(flatten)]
    pub outcome: SplitOutcome,
}

/// Info response: the document info plus a success flag
#[derive(Serialize)]
pub struct InfoResponse {
    pub success: bool,
    #[serde(flatten)]
    pub info: DocumentInfo,
}

/// An uploaded file that has been written to a guarded temp file.
#[derive(Debug, Clone)]
struct SpooledUpload {
    path: PathBuf,
    media_type: String,
    name: String,
}

impl SpooledUpload {
    fn load(&self) -> pdftools_core::Result<ByteSource> {
        ByteSource::from_path(&self.path, self.media_type.clone(), self.name.clone())
    }
}

/// Parsed multipart form. Dropping it deletes the spooled files.
struct UploadForm {
    files: Vec<SpooledUpload>,
    fields: HashMap<String, String>,
    _guard: ResourceGuard,
}

impl UploadForm {
    fn single_file(&self) -> Result<SpooledUpload, ServerError> {
        self.files
            .first()
            .cloned()
            .ok_or_else(|| ServerError::InvalidRequest("No file provided".into()))
    }

    fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// Stream every file part to disk and collect text fields.
async fn read_upload(state: &AppState, mut multipart: Multipart) -> Result<UploadForm, ServerError> {
    let mut guard = ResourceGuard::new();
    let mut files = Vec::new();
    let mut fields = HashMap::new();

    while let Some(mut field) = multipart.next_field().await? {
        let field_name = field.name().unwrap_or("").to_string();

        if matches!(field_name.as_str(), "file" | "files" | "files[]") {
            let name = field
                .file_name()
                .map(|s| s.to_string())
                .unwrap_or_else(|| format!("upload-{}.pdf", files.len() + 1));
            let media_type = field.content_type().unwrap_or(OCTET_STREAM).to_string();

            let (file, path) = guard.spool_file(state.spool_dir.as_deref())?;
            let mut file = tokio::fs::File::from_std(file);
            let mut written = 0usize;
            while let Some(chunk) = field.chunk().await? {
                written += chunk.len();
                file.write_all(&chunk).await?;
            }
            file.flush().await?;

            debug!(name = %name, media_type = %media_type, bytes = written, "Upload spooled");
            files.push(SpooledUpload {
                path,
                media_type,
                name,
            });
        } else if !field_name.is_empty() {
            let value = field.text().await?;
            fields.insert(field_name, value);
        }
    }

    Ok(UploadForm {
        files,
        fields,
        _guard: guard,
    })
}

/// Run a job on the blocking pool under the configured timeout.
///
/// On timeout the job's token is cancelled so the worker gives up at its
/// next checkpoint instead of running to completion unobserved.
pub(crate) async fn run_blocking<T, F>(
    state: &AppState,
    operation: Operation,
    job: F,
) -> Result<T, ServerError>
where
    T: Send + 'static,
    F: FnOnce(&JobBudget) -> pdftools_core::Result<T> + Send + 'static,
{
    let job_id = Uuid::new_v4();
    let budget = state.engine.budget();
    let token = budget.token();
    let timeout_ms = state.engine.config().job_timeout_ms;

    debug!(%job_id, operation = operation.as_str(), "Job started");
    let task = tokio::task::spawn_blocking(move || job(&budget));

    let joined = if timeout_ms > 0 {
        match tokio::time::timeout(Duration::from_millis(timeout_ms), task).await {
            Ok(joined) => joined,
            Err(_) => {
                token.cancel();
                warn!(%job_id, operation = operation.as_str(), timeout_ms, "Job timed out");
                return Err(ServerError::Timeout(timeout_ms));
            }
        }
    } else {
        task.await
    };

    let result = joined.map_err(|e| ServerError::Internal(format!("Worker failed: {}", e)))?;
    debug!(%job_id, ok = result.is_ok(), "Job finished");
    Ok(result?)
}

fn load_all(uploads: &[SpooledUpload]) -> pdftools_core::Result<Vec<ByteSource>> {
    uploads.iter().map(SpooledUpload::load).collect()
}

fn pdf_response(bytes: Vec<u8>, filename: &str, headers: Vec<(&'static str, String)>) -> Response {
    let mut response = bytes.into_response();
    let map = response.headers_mut();
    map.insert(header::CONTENT_TYPE, HeaderValue::from_static(PDF_CONTENT_TYPE));
    if let Ok(value) = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", filename)) {
        map.insert(header::CONTENT_DISPOSITION, value);
    }
    for (name, value) in headers {
        if let Ok(value) = HeaderValue::from_str(&value) {
            map.insert(HeaderName::from_static(name), value);
        }
    }
    response
}

fn merge_response(outcome: MergeOutcome) -> Response {
    info!(
        files = outcome.file_count,
        pages = outcome.page_count,
        input_bytes = outcome.input_size_bytes,
        output_bytes = outcome.output_size_bytes,
        "Merge served"
    );
    let headers = vec![
        ("x-file-count", outcome.file_count.to_string()),
        ("x-page-count", outcome.page_count.to_string()),
        ("x-original-size", outcome.input_size_bytes.to_string()),
        ("x-merged-size", outcome.output_size_bytes.to_string()),
    ];
    pdf_response(outcome.bytes, "merged.pdf", headers)
}

/// Handler: POST /api/merge
pub async fn handle_merge(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, ServerError> {
    let form = read_upload(&state, multipart).await?;
    info!("Merge request: {} files", form.files.len());

    let engine = state.engine.clone();
    let uploads = form.files.clone();
    let outcome = run_blocking(&state, Operation::Merge, move |budget| {
        engine.merge(&load_all(&uploads)?, budget)
    })
    .await?;

    Ok(merge_response(outcome))
}

/// Handler: POST /api/validate-merge
pub async fn handle_validate_merge(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, ServerError> {
    let form = read_upload(&state, multipart).await?;
    info!("Validate-merge request: {} files", form.files.len());

    let engine = state.engine.clone();
    let uploads = form.files.clone();
    let outcome = run_blocking(&state, Operation::Merge, move |budget| {
        engine.validate_merge(&load_all(&uploads)?, budget)
    })
    .await?;

    Ok(merge_response(outcome))
}

/// Handler: POST /api/validate
pub async fn handle_validate(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<ValidationResult>, ServerError> {
    let form = read_upload(&state, multipart).await?;
    let upload = form.single_file()?;
    info!("Validate request: {}", upload.name);

    let engine = state.engine.clone();
    let result = run_blocking(&state, Operation::Validate, move |_| {
        Ok(engine.validate(Operation::Validate, &upload.load()?))
    })
    .await?;

    Ok(Json(result))
}

/// Handler: POST /api/split
pub async fn handle_split(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<SplitResponse>, ServerError> {
    let form = read_upload(&state, multipart).await?;
    let upload = form.single_file()?;
    let ranges = form.field("ranges").map(parse_ranges_field).transpose()?.flatten();
    info!(
        "Split request: {} ({} ranges)",
        upload.name,
        ranges.as_ref().map_or(0, Vec::len)
    );

    let engine = state.engine.clone();
    let outcome = run_blocking(&state, Operation::Split, move |budget| {
        engine.split(&upload.load()?, ranges, budget)
    })
    .await?;

    Ok(Json(SplitResponse {
        success: true,
        outcome,
    }))
}

/// Handler: POST /api/compress
pub async fn handle_compress(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, ServerError> {
    let form = read_upload(&state, multipart).await?;
    let upload = form.single_file()?;
    let quality = match form.field("quality").map(str::trim) {
        None | Some("") => QualityTier::default(),
        Some(value) => value
            .parse::<QualityTier>()
            .map_err(|e| ServerError::InvalidRequest(e.to_string()))?,
    };
    info!("Compress request: {} (quality={})", upload.name, quality.as_str());

    let engine = state.engine.clone();
    let outcome: CompressOutcome = run_blocking(&state, Operation::Compress, move |budget| {
        engine.compress(&upload.load()?, quality, budget)
    })
    .await?;

    let headers = vec![
        ("x-original-size", outcome.original_size_bytes.to_string()),
        ("x-compressed-size", outcome.compressed_size_bytes.to_string()),
        ("x-savings-percent", outcome.savings_percent.to_string()),
    ];
    Ok(pdf_response(outcome.bytes, "compressed.pdf", headers))
}

/// Handler: POST /api/info
pub async fn handle_info(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<InfoResponse>, ServerError> {
    let form = read_upload(&state, multipart).await?;
    let upload = form.single_file()?;
    info!("Info request: {}", upload.name);

    let engine = state.engine.clone();
    let info = run_blocking(&state, Operation::Info, move |_| {
        engine.info(&upload.load()?)
    })
    .await?;

    Ok(Json(InfoResponse {
        success: true,
        info,
    }))
}
