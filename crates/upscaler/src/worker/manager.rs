//! Entry point for callers: submission, status and download lookups.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{info, warn};

use crate::adapter::{AdapterChain, ModelHandle};
use crate::config::Config;
use crate::error::{JobSetupError, Result, SubmitError};
use crate::notify::{build_notifier, deliver, Notification, Notifier};
use crate::pipeline::{check_file_type, TaskRunner};
use crate::sanitize;

use super::executor::{cleanup, JobExecutor, INPUT_DIR};
use super::job::{FileTask, Job, JobStatus, JobSummary};
use super::pool::WorkerPool;
use super::store::{lock_job, JobStore};

/// One uploaded file as received from the caller.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct SubmitRequest {
    pub uploads: Vec<Upload>,
    pub scale: Option<f64>,
    pub target_mb: Option<f64>,
}

pub struct JobManager {
    config: Arc<Config>,
    store: Arc<JobStore>,
    pool: WorkerPool,
    notifier: Arc<dyn Notifier>,
    model: Arc<ModelHandle>,
}

impl JobManager {
    /// Starts the worker pool with the notifier described by the config.
    pub fn start(config: Config) -> Result<Self> {
        let notifier = build_notifier(&config.notify);
        Self::with_notifier(config, notifier)
    }

    pub fn with_notifier(config: Config, notifier: Arc<dyn Notifier>) -> Result<Self> {
        let config = Arc::new(config);
        let model = Arc::new(ModelHandle::new(config.adapters.ai_model_path.clone()));
        let chain = AdapterChain::from_config(&config.adapters, config.min_scale, Arc::clone(&model));
        info!(
            "Upscale adapters in priority order: {}",
            chain
                .kinds()
                .iter()
                .map(|k| k.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );

        let store = Arc::new(JobStore::new());
        let executor = Arc::new(JobExecutor::new(
            Arc::clone(&config),
            Arc::new(TaskRunner::new(Arc::new(chain))),
            Arc::clone(&store),
            Arc::clone(&notifier),
        ));
        let pool = WorkerPool::new(executor, config.worker_count)?;

        Ok(Self {
            config,
            store,
            pool,
            notifier,
            model,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn notifier(&self) -> Arc<dyn Notifier> {
        Arc::clone(&self.notifier)
    }

    pub fn model(&self) -> &ModelHandle {
        &self.model
    }

    /// Creates a job for `request` and queues it.
    ///
    /// Returns the job id. Setup failures (no files, unwritable work
    /// directory) still create the job, immediately `failed`.
    pub fn submit(&self, request: SubmitRequest) -> std::result::Result<String, SubmitError> {
        let uploads: Vec<Upload> = request
            .uploads
            .into_iter()
            .filter(|u| !sanitize::base_name(&u.file_name).trim().is_empty())
            .collect();
        if uploads.len() > self.config.max_files {
            return Err(SubmitError::TooManyFiles {
                got: uploads.len(),
                max: self.config.max_files,
            });
        }
        if self.pool.is_shutdown() {
            return Err(SubmitError::PoolClosed);
        }

        let mut job = Job::new(
            self.config.effective_scale(request.scale),
            self.config.target_size_bytes(request.target_mb),
            &self.config.work_dir,
        );
        let job_id = job.id.clone();

        if let Err(e) = stage_uploads(&mut job, uploads) {
            warn!("Job {} setup failed: {}", job_id, e);
            job.mark_failed(e.to_string());
            cleanup(&job.work_dir);
            remove_if_empty(&job.work_dir);
            let summary = job.summary();
            self.store.insert(job);
            deliver(self.notifier.as_ref(), &Notification::from_summary(&summary));
            return Ok(job_id);
        }

        info!(
            "Queued job {} with {} files (scale {:.2}, target {} bytes)",
            job_id,
            job.tasks.len(),
            job.requested_scale,
            job.target_size_bytes
        );
        let shared = self.store.insert(job);
        if let Err(e) = self.pool.submit(job_id.clone()) {
            warn!("Job {} could not be queued: {}", job_id, e);
            let (summary, work_dir) = {
                let mut job = lock_job(&shared);
                job.mark_failed(e.to_string());
                (job.summary(), job.work_dir.clone())
            };
            cleanup(&work_dir);
            deliver(self.notifier.as_ref(), &Notification::from_summary(&summary));
            return Err(e);
        }
        Ok(job_id)
    }

    pub fn summary(&self, job_id: &str) -> Option<JobSummary> {
        self.store.summary(job_id)
    }

    pub fn job(&self, job_id: &str) -> Option<Job> {
        self.store.snapshot(job_id)
    }

    /// Archive of a `done` job.
    pub fn archive_path(&self, job_id: &str) -> Option<PathBuf> {
        self.store
            .snapshot(job_id)
            .filter(|job| job.status == JobStatus::Done)
            .and_then(|job| job.archive_path)
            .filter(|path| path.is_file())
    }

    /// Polls until the job is terminal or `timeout` passes.
    pub fn wait_for_terminal(&self, job_id: &str, timeout: Duration) -> Option<JobSummary> {
        let deadline = Instant::now() + timeout;
        loop {
            let summary = self.store.summary(job_id)?;
            if summary.status.is_terminal() || Instant::now() >= deadline {
                return Some(summary);
            }
            std::thread::sleep(Duration::from_millis(20));
        }
    }

    /// Stops accepting jobs and joins the workers. Running jobs finish first.
    pub fn shutdown(&self) {
        self.pool.shutdown();
        self.pool.wait();
    }
}

/// Writes uploads into the job's input directory and creates one task per
/// upload, in upload order.
fn stage_uploads(job: &mut Job, uploads: Vec<Upload>) -> std::result::Result<(), JobSetupError> {
    if uploads.is_empty() {
        return Err(JobSetupError::NoFiles);
    }

    let input_dir = job.work_dir.join(INPUT_DIR);
    std::fs::create_dir_all(&input_dir).map_err(|source| JobSetupError::WorkDir {
        path: input_dir.clone(),
        source,
    })?;

    let mut used = HashSet::new();
    for (index, upload) in uploads.into_iter().enumerate() {
        let source_name = sanitize::base_name(&upload.file_name).to_string();
        // Unsupported uploads keep an empty output name and fail in the runner.
        let output_name = if check_file_type(&source_name).is_ok() {
            let base = format!("{}_upscaled.jpg", sanitize::safe_stem(&source_name));
            sanitize::unique_name(&base, &mut used)
        } else {
            String::new()
        };

        let ext = sanitize::extension(&source_name).unwrap_or_default();
        let stored = input_dir.join(format!("{:04}{}", index, ext));
        std::fs::write(&stored, &upload.data).map_err(|source| JobSetupError::StoreUpload {
            name: source_name.clone(),
            source,
        })?;

        let mut task = FileTask::new(index, source_name, output_name);
        task.source_path = Some(stored);
        job.tasks.push(task);
    }
    Ok(())
}

fn remove_if_empty(dir: &std::path::Path) {
    // Fails harmlessly when the directory is missing or not empty.
    let _ = std::fs::remove_dir(dir);
}
