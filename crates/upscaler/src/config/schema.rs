use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_max_files")]
    pub max_files: usize,
    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: u64,
    #[serde(default = "default_min_scale")]
    pub min_scale: f64,
    #[serde(default = "default_min_target_mb")]
    pub min_target_mb: f64,
    #[serde(default = "default_max_target_mb")]
    pub max_target_mb: f64,
    #[serde(default = "default_max_image_pixels")]
    pub max_image_pixels: u64,
    #[serde(default = "default_max_output_pixels")]
    pub max_output_pixels: u64,
    #[serde(default = "default_max_size_passes")]
    pub max_size_passes: u32,
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default = "default_task_concurrency")]
    pub task_concurrency: usize,
    #[serde(default = "default_task_timeout_secs")]
    pub task_timeout_secs: u64,
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
    #[serde(default)]
    pub adapters: AdapterConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

fn default_max_files() -> usize {
    200
}

fn default_max_upload_mb() -> u64 {
    3000
}

fn default_min_scale() -> f64 {
    4.0
}

fn default_min_target_mb() -> f64 {
    20.0
}

fn default_max_target_mb() -> f64 {
    100.0
}

fn default_max_image_pixels() -> u64 {
    12_000 * 12_000
}

fn default_max_output_pixels() -> u64 {
    20_000 * 20_000
}

fn default_max_size_passes() -> u32 {
    6
}

fn default_worker_count() -> usize {
    2
}

fn default_task_concurrency() -> usize {
    num_cpus::get()
}

fn default_task_timeout_secs() -> u64 {
    600
}

fn default_work_dir() -> PathBuf {
    std::env::temp_dir().join("upscaler")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_bind_addr() -> String {
    "0.0.0.0:5050".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_files: default_max_files(),
            max_upload_mb: default_max_upload_mb(),
            min_scale: default_min_scale(),
            min_target_mb: default_min_target_mb(),
            max_target_mb: default_max_target_mb(),
            max_image_pixels: default_max_image_pixels(),
            max_output_pixels: default_max_output_pixels(),
            max_size_passes: default_max_size_passes(),
            worker_count: default_worker_count(),
            task_concurrency: default_task_concurrency(),
            task_timeout_secs: default_task_timeout_secs(),
            work_dir: default_work_dir(),
            adapters: AdapterConfig::default(),
            notify: NotifyConfig::default(),
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            bind_addr: default_bind_addr(),
        }
    }
}

impl Config {
    /// Requested scale floored to the configured minimum. Missing or
    /// non-finite requests resolve to the minimum.
    pub fn effective_scale(&self, requested: Option<f64>) -> f64 {
        match requested {
            Some(scale) if scale.is_finite() => scale.max(self.min_scale),
            _ => self.min_scale,
        }
    }

    /// Requested target size clamped into the configured bounds, in bytes.
    pub fn target_size_bytes(&self, requested_mb: Option<f64>) -> u64 {
        let mb = match requested_mb {
            Some(mb) if mb.is_finite() => mb.clamp(self.min_target_mb, self.max_target_mb),
            _ => self.min_target_mb,
        };
        (mb * BYTES_PER_MB).round() as u64
    }

    pub fn max_upload_bytes(&self) -> usize {
        usize::try_from(self.max_upload_mb.saturating_mul(1024 * 1024)).unwrap_or(usize::MAX)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Upscaling engines, in the order they appear in `AdapterConfig::priority`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdapterKind {
    Ai,
    Resample,
    External,
}

impl AdapterKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AdapterKind::Ai => "ai",
            AdapterKind::Resample => "resample",
            AdapterKind::External => "external",
        }
    }

    /// Parses a comma separated adapter list, e.g. `"ai,pillow"`.
    pub fn parse_list(value: &str) -> Result<Vec<AdapterKind>, ConfigError> {
        value
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(AdapterKind::from_str)
            .collect()
    }
}

impl fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AdapterKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ai" | "fsrcnn" | "opencv" | "espcn" => Ok(AdapterKind::Ai),
            "pillow" | "resample" | "lanczos" => Ok(AdapterKind::Resample),
            "topaz" | "external" | "cli" => Ok(AdapterKind::External),
            other => Err(ConfigError::UnknownAdapter(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterConfig {
    #[serde(default = "default_priority")]
    pub priority: Vec<AdapterKind>,
    #[serde(default)]
    pub ai_model_path: Option<PathBuf>,
    #[serde(default)]
    pub external_cli_path: Option<PathBuf>,
    #[serde(default = "default_external_cli_args")]
    pub external_cli_args: Vec<String>,
}

fn default_priority() -> Vec<AdapterKind> {
    vec![AdapterKind::Resample]
}

fn default_external_cli_args() -> Vec<String> {
    ["-i", "{input}", "-o", "{output}", "-s", "{scale}"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            priority: default_priority(),
            ai_model_path: None,
            external_cli_path: None,
            external_cli_args: default_external_cli_args(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_channel")]
    pub channel: String,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub telegram_bot_token: Option<String>,
    #[serde(default)]
    pub telegram_chat_id: Option<String>,
    #[serde(default = "default_command")]
    pub command: String,
}

fn default_true() -> bool {
    true
}

fn default_channel() -> String {
    "telegram".to_string()
}

fn default_command() -> String {
    "openclaw".to_string()
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            channel: default_channel(),
            target: None,
            telegram_bot_token: None,
            telegram_chat_id: None,
            command: default_command(),
        }
    }
}
