//! Service settings and notification check.

use axum::{extract::State, Json};
use serde::Serialize;
use upscaler::Config;

use crate::api::error::ApiResult;
use crate::state::AppState;

const TEST_MESSAGE: &str = "Test notification from the photo upscaler.";

/// Effective limits a client should respect when building a batch.
#[derive(Debug, Serialize)]
pub struct Limits {
    pub max_files: usize,
    pub max_upload_mb: u64,
    pub min_scale: f64,
    pub min_target_mb: f64,
    pub max_target_mb: f64,
    pub max_image_pixels: u64,
    pub max_output_pixels: u64,
    pub adapters: Vec<&'static str>,
    pub ai_model_loaded: bool,
    pub notifications_enabled: bool,
}

impl Limits {
    fn from_config(config: &Config, ai_model_loaded: bool) -> Self {
        Self {
            max_files: config.max_files,
            max_upload_mb: config.max_upload_mb,
            min_scale: config.min_scale,
            min_target_mb: config.min_target_mb,
            max_target_mb: config.max_target_mb,
            max_image_pixels: config.max_image_pixels,
            max_output_pixels: config.max_output_pixels,
            adapters: config.adapters.priority.iter().map(|k| k.as_str()).collect(),
            ai_model_loaded,
            notifications_enabled: config.notify.enabled,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct NotifyTestResponse {
    pub sent: bool,
    pub channel: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// GET /
pub async fn index(State(state): State<AppState>) -> Json<Limits> {
    let manager = &state.manager;
    Json(Limits::from_config(manager.config(), manager.model().is_loaded()))
}

/// POST /notify-test
pub async fn notify_test(State(state): State<AppState>) -> ApiResult<Json<NotifyTestResponse>> {
    let notifier = state.manager.notifier();
    let response = tokio::task::spawn_blocking(move || {
        let result = notifier.send(TEST_MESSAGE);
        if let Err(e) = &result {
            tracing::warn!("Test notification via {} failed: {}", notifier.name(), e);
        }
        NotifyTestResponse {
            sent: result.is_ok(),
            channel: notifier.name(),
            error: result.err().map(|e| e.to_string()),
        }
    })
    .await?;
    Ok(Json(response))
}
