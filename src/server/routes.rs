//! Request handlers.

use crate::pipeline::input::SourceDocument;
use crate::server::error::{ApiError, ApiResult};
use crate::server::AppState;
use crate::service::ProcessOutput;
use crate::Doc2TextError;
use axum::{
    extract::{Multipart, Path, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::debug;

/// Name of the multipart field carrying the document.
pub const FILE_FIELD: &str = "file";

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub active_jobs: usize,
    pub version: String,
}

/// Health check endpoint.
/// GET /health
pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        active_jobs: state.service.jobs().len().await,
        version: env!("CARGO_PKG_VERSION").to_string(),
    }))
}

/// Convert an upload to PDF and return it.
/// POST /convert
pub async fn convert(State(state): State<AppState>, multipart: Multipart) -> ApiResult<Response> {
    let doc = read_upload(multipart).await?;
    let pdf = state.service.convert_and_return(&doc).await?;
    Ok(pdf_attachment(pdf.bytes, &pdf.filename))
}

/// Extract text from an upload and register its PDF for download.
/// POST /process
pub async fn process(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Json<ProcessOutput>> {
    let doc = read_upload(multipart).await?;
    let output = state.service.process_and_extract(&doc).await?;
    Ok(Json(output))
}

/// Download the PDF of a processed document, once.
/// GET /download/:job_id
pub async fn download(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Response> {
    let pdf = state.service.download_job(&job_id).await?;
    Ok(pdf_attachment(pdf.bytes, &pdf.filename))
}

/// Take the first `file` field of a multipart body.
async fn read_upload(mut multipart: Multipart) -> ApiResult<SourceDocument> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("malformed multipart body: {e}")))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let name = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(format!("failed to read upload: {e}")))?;
        debug!("Received upload '{}' ({} bytes)", name, bytes.len());
        return Ok(SourceDocument::new(name, bytes.to_vec())?);
    }
    Err(Doc2TextError::InputInvalid(format!("no file provided (expected multipart field '{FILE_FIELD}')")).into())
}

fn pdf_attachment(bytes: Vec<u8>, filename: &str) -> Response {
    (
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (header::CONTENT_DISPOSITION, content_disposition(filename)),
        ],
        bytes,
    )
        .into_response()
}

/// `attachment; filename="…"` with the name reduced to printable ASCII.
fn content_disposition(filename: &str) -> String {
    let ascii: String = filename
        .chars()
        .map(|c| if c.is_ascii_graphic() || c == ' ' { c } else { '_' })
        .map(|c| if c == '"' || c == '\\' { '_' } else { c })
        .collect();
    format!("attachment; filename=\"{ascii}\"")
}
