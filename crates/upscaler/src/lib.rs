pub mod adapter;
pub mod archive;
pub mod config;
pub mod encoder;
pub mod error;
pub mod notify;
pub mod pipeline;
pub mod sanitize;
pub mod worker;

pub use adapter::{Adapter, AdapterChain, ModelHandle};
pub use config::{load_config, load_config_from_env, Config};
pub use encoder::{encode_to_target, EncodeOutcome};
pub use error::{
    AdapterError, ArchiveError, ConfigError, EncodeError, JobSetupError, NotifyError, Result,
    SubmitError, TaskError, UpscalerError, WorkerError,
};
pub use notify::{Notification, Notifier};
pub use pipeline::{TaskRunner, TaskSettings};
pub use worker::{FileTask, Job, JobManager, JobStatus, JobSummary, SubmitRequest, TaskStatus, Upload};
