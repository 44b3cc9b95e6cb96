use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum UpscalerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Job setup error: {0}")]
    JobSetup(#[from] JobSetupError),

    #[error("Submission rejected: {0}")]
    Submit(#[from] SubmitError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Unknown upscale adapter '{0}'")]
    UnknownAdapter(String),
}

/// Failure of a single upscaling engine, or of the whole fallback chain.
#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("{adapter} adapter unavailable: {reason}")]
    Unavailable {
        adapter: &'static str,
        reason: String,
    },

    #[error("{adapter} adapter failed: {reason}")]
    Failed {
        adapter: &'static str,
        reason: String,
    },

    #[error("{adapter} adapter reached only {effective:.2}x, below the {minimum:.2}x minimum")]
    ScaleBelowMinimum {
        adapter: &'static str,
        effective: f64,
        minimum: f64,
    },

    #[error("all upscale adapters failed: {}", attempts.join("; "))]
    Exhausted { attempts: Vec<String> },
}

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("JPEG encoding failed at quality {quality}: {source}")]
    Jpeg {
        quality: u8,
        #[source]
        source: image::ImageError,
    },
}

/// Per-file failure. Every variant ends up as an `error` row in the report,
/// never as a job failure.
#[derive(Error, Debug)]
pub enum TaskError {
    #[error("{0}")]
    Input(String),

    #[error("{0}")]
    Adapter(#[from] AdapterError),

    #[error("{0}")]
    Encoding(#[from] EncodeError),

    #[error("{0}")]
    Capacity(String),

    #[error("failed to write output '{path}': {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("processing timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("processing aborted unexpectedly")]
    Aborted,
}

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Failed to access '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write ZIP archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Archive for job {0} has already been built")]
    AlreadyBuilt(String),
}

/// Fatal, job-level failure. The job transitions to `failed`.
#[derive(Error, Debug)]
pub enum JobSetupError {
    #[error("No files were uploaded")]
    NoFiles,

    #[error("Failed to prepare work directory '{path}': {source}")]
    WorkDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to store upload '{name}': {source}")]
    StoreUpload {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Archive assembly failed: {0}")]
    Archive(#[from] ArchiveError),
}

#[derive(Error, Debug)]
pub enum SubmitError {
    #[error("Too many files: {got} uploaded, at most {max} allowed")]
    TooManyFiles { got: usize, max: usize },

    #[error("Worker pool is not accepting jobs")]
    PoolClosed,
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Failed to spawn worker: {0}")]
    SpawnFailed(String),
}

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Notifications are disabled")]
    Disabled,

    #[error("Notification channel not configured: {0}")]
    NotConfigured(&'static str),

    #[error("Telegram request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Telegram rejected the message: {0}")]
    Rejected(String),

    #[error("Notification command failed: {0}")]
    Command(String),

    #[error("All notification channels failed: {}", .0.join("; "))]
    AllFailed(Vec<String>),
}

pub type Result<T> = std::result::Result<T, UpscalerError>;
