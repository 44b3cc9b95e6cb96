//! Job API Handlers
//!
//! Batch submission, status polling and archive download.

use axum::{
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use upscaler::{JobSummary, SubmitRequest, Upload};

use crate::api::error::{ApiError, ApiResult};
use crate::state::AppState;

const PHOTOS_FIELD: &str = "photos";
const SCALE_FIELD: &str = "scale";
const TARGET_FIELD: &str = "target_mb";

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub job_id: String,
    pub status_url: String,
}

/// POST /process
/// Accepts a multipart batch and queues it as one job.
pub async fn process(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    let mut request = SubmitRequest::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            PHOTOS_FIELD => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let data = field.bytes().await?;
                request.uploads.push(Upload {
                    file_name,
                    data: data.to_vec(),
                });
            }
            SCALE_FIELD | TARGET_FIELD => {
                let text = field.text().await?;
                let value = parse_number(&name, &text)?;
                if name == SCALE_FIELD {
                    request.scale = value;
                } else {
                    request.target_mb = value;
                }
            }
            other => tracing::debug!("Ignoring form field '{}'", other),
        }
    }

    tracing::info!("Received batch of {} files", request.uploads.len());

    // Staging writes to disk and may notify synchronously.
    let manager = state.manager.clone();
    let job_id = tokio::task::spawn_blocking(move || manager.submit(request)).await??;

    let status_url = format!("/status/{}", job_id);
    Ok((
        StatusCode::ACCEPTED,
        [(header::LOCATION, status_url.clone())],
        Json(SubmitResponse { job_id, status_url }),
    ))
}

/// GET /status/{id}
pub async fn status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobSummary>> {
    tracing::debug!("Getting status for job {}", job_id);
    state.manager.summary(&job_id).map(Json).ok_or(ApiError::NotFound)
}

/// GET /download/{id}
/// Streams the archive of a finished job.
pub async fn download(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let path = state
        .manager
        .archive_path(&job_id)
        .ok_or(ApiError::NotFound)?;

    let bytes = tokio::fs::read(&path).await.map_err(|e| {
        tracing::warn!("Archive for job {} unreadable: {}", job_id, e);
        ApiError::NotFound
    })?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upscaled.zip");
    Ok((
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name),
            ),
        ],
        bytes,
    ))
}

/// Blank values mean "use the default"; anything else must be a number.
fn parse_number(field: &str, text: &str) -> ApiResult<Option<f64>> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }
    text.parse::<f64>()
        .map(Some)
        .map_err(|_| ApiError::BadRequest(format!("{} must be a number, got '{}'", field, text)))
}
