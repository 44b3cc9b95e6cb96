//! Drives one job from `queued` to a terminal state.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, unbounded, RecvTimeoutError};
use log::{debug, error, info, warn};
use tracing::info_span;

use crate::archive::build_archive;
use crate::config::Config;
use crate::error::{JobSetupError, TaskError, WorkerError};
use crate::notify::{deliver, Notification, Notifier};
use crate::pipeline::{TaskRunner, TaskSettings};

use super::job::FileTask;
use super::store::{lock_job, JobStore, SharedJob};

pub const INPUT_DIR: &str = "input";
pub const OUTPUT_DIR: &str = "output";

const SHUTDOWN_MESSAGE: &str = "Service stopped before the job started";

pub const ABANDONED_LIMIT_NOTE: &str = "too many timed-out tasks still running";

pub struct JobExecutor {
    config: Arc<Config>,
    runner: Arc<TaskRunner>,
    store: Arc<JobStore>,
    notifier: Arc<dyn Notifier>,
    /// Task threads still running after their timeout fired.
    abandoned: Arc<AtomicUsize>,
}

/// Lives on a task thread. Whichever of the thread and the timed-out waiter
/// flips `finished` second owns the decrement of the abandoned count.
struct TaskGuard {
    finished: Arc<AtomicBool>,
    abandoned: Arc<AtomicUsize>,
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        if self.finished.swap(true, Ordering::SeqCst) {
            self.abandoned.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl JobExecutor {
    pub fn new(
        config: Arc<Config>,
        runner: Arc<TaskRunner>,
        store: Arc<JobStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            config,
            runner,
            store,
            notifier,
            abandoned: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of timed-out task threads that have not finished yet.
    pub fn abandoned_tasks(&self) -> usize {
        self.abandoned.load(Ordering::SeqCst)
    }

    pub fn execute(&self, job_id: &str) {
        let Some(shared) = self.store.get(job_id) else {
            warn!("Job {} not found, skipping", job_id);
            return;
        };

        let (tasks, settings, work_dir) = {
            let mut job = lock_job(&shared);
            if !job.start() {
                warn!("Job {} is {}, not starting it", job.id, job.status.as_str());
                return;
            }
            let settings = TaskSettings::from_config(
                &self.config,
                job.requested_scale,
                job.target_size_bytes,
                job.work_dir.join(OUTPUT_DIR),
            );
            (job.tasks.clone(), settings, job.work_dir.clone())
        };

        let _job_span = info_span!("job", job_id = %job_id, files = tasks.len()).entered();
        info!("Processing job {} with {} files", job_id, tasks.len());

        let outcome = self
            .prepare_output(&settings, tasks.len())
            .and_then(|()| {
                self.run_tasks(&shared, tasks, &settings);
                self.assemble(&shared)
            });

        // Uploads and intermediate outputs go before the job turns terminal.
        cleanup(&work_dir);

        {
            let mut job = lock_job(&shared);
            match outcome {
                Ok(archive) => {
                    if !job.mark_done(archive) {
                        error!("Job {} could not be marked done", job.id);
                    }
                }
                Err(e) => {
                    error!("Job {} failed: {}", job.id, e);
                    job.mark_failed(e.to_string());
                }
            }
        }

        let summary = lock_job(&shared).summary();
        info!(
            "Job {} finished as {}: {} succeeded, {} warnings, {} failed",
            job_id,
            summary.status.as_str(),
            summary.succeeded,
            summary.warnings,
            summary.failed
        );
        deliver(self.notifier.as_ref(), &Notification::from_summary(&summary));
    }

    /// Fails a job that was still queued when the pool stopped.
    pub fn abandon(&self, job_id: &str) {
        let Some(shared) = self.store.get(job_id) else {
            return;
        };
        let (summary, work_dir) = {
            let mut job = lock_job(&shared);
            if !job.mark_failed(SHUTDOWN_MESSAGE) {
                return;
            }
            (job.summary(), job.work_dir.clone())
        };
        warn!("Job {} was still queued at shutdown", job_id);
        cleanup(&work_dir);
        deliver(self.notifier.as_ref(), &Notification::from_summary(&summary));
    }

    fn prepare_output(&self, settings: &TaskSettings, tasks: usize) -> Result<(), JobSetupError> {
        if tasks == 0 {
            return Err(JobSetupError::NoFiles);
        }
        std::fs::create_dir_all(&settings.output_dir).map_err(|source| JobSetupError::WorkDir {
            path: settings.output_dir.clone(),
            source,
        })
    }

    /// Runs tasks on up to `task_concurrency` lanes. Each result is folded
    /// into the job under its lock as soon as it is available.
    fn run_tasks(&self, shared: &SharedJob, tasks: Vec<FileTask>, settings: &TaskSettings) {
        let lanes = self.config.task_concurrency.clamp(1, tasks.len().max(1));
        let (queue_tx, queue_rx) = unbounded::<FileTask>();
        for task in tasks {
            // The receiver is alive until the scope below ends.
            let _ = queue_tx.send(task);
        }
        drop(queue_tx);

        thread::scope(|s| {
            for lane in 0..lanes {
                let queue_rx = queue_rx.clone();
                s.spawn(move || {
                    debug!("Task lane {} started", lane);
                    while let Ok(task) = queue_rx.recv() {
                        lock_job(shared).begin_task(task.index);
                        let done = self.run_with_timeout(task, settings);
                        lock_job(shared).complete_task(done);
                    }
                    debug!("Task lane {} drained", lane);
                });
            }
        });
    }

    /// Runs a task on its own thread and waits at most `task_timeout_secs`.
    /// A timed-out computation is abandoned and its result discarded. At most
    /// `task_concurrency` abandoned threads may be alive; past that a new task
    /// waits one timeout for room and then fails.
    fn run_with_timeout(&self, mut task: FileTask, settings: &TaskSettings) -> FileTask {
        let timeout = Duration::from_secs(self.config.task_timeout_secs.max(1));
        if !self.wait_for_capacity(timeout) {
            warn!(
                "Task {} skipped: {} timed-out tasks still running",
                task.source_name,
                self.abandoned_tasks()
            );
            task.fail(TaskError::Capacity(ABANDONED_LIMIT_NOTE.to_string()).to_string());
            return task;
        }

        let (result_tx, result_rx) = bounded::<FileTask>(1);
        let finished = Arc::new(AtomicBool::new(false));
        let guard = TaskGuard {
            finished: Arc::clone(&finished),
            abandoned: Arc::clone(&self.abandoned),
        };

        let runner = Arc::clone(&self.runner);
        let settings = settings.clone();
        let input = task.clone();
        let spawned = thread::Builder::new()
            .name(format!("file-task-{}", task.index))
            .spawn(move || {
                let _guard = guard;
                let _ = result_tx.send(runner.run(input, &settings));
            });
        if let Err(e) = spawned {
            task.fail(WorkerError::SpawnFailed(e.to_string()).to_string());
            return task;
        }

        match result_rx.recv_timeout(timeout) {
            Ok(done) => done,
            Err(RecvTimeoutError::Timeout) => {
                warn!("Task {} timed out after {:?}", task.source_name, timeout);
                self.abandoned.fetch_add(1, Ordering::SeqCst);
                if finished.swap(true, Ordering::SeqCst) {
                    // The thread ended right after the timeout.
                    self.abandoned.fetch_sub(1, Ordering::SeqCst);
                }
                task.fail(TaskError::Timeout(timeout).to_string());
                task
            }
            Err(RecvTimeoutError::Disconnected) => {
                error!("Task {} aborted", task.source_name);
                task.fail(TaskError::Aborted.to_string());
                task
            }
        }
    }

    fn wait_for_capacity(&self, timeout: Duration) -> bool {
        let limit = self.config.task_concurrency.max(1);
        let deadline = Instant::now() + timeout;
        while self.abandoned_tasks() >= limit {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(20));
        }
        true
    }

    fn assemble(&self, shared: &SharedJob) -> Result<PathBuf, JobSetupError> {
        let _step = info_span!("archive").entered();
        let snapshot = {
            let mut job = lock_job(shared);
            job.message = "Building archive...".to_string();
            job.current_item = None;
            job.clone()
        };
        Ok(build_archive(&snapshot)?)
    }
}

/// Removes uploads and intermediate outputs. The archive stays.
pub fn cleanup(work_dir: &Path) {
    for dir in [INPUT_DIR, OUTPUT_DIR] {
        let path = work_dir.join(dir);
        if path.exists() {
            if let Err(e) = std::fs::remove_dir_all(&path) {
                warn!("Failed to clean up {}: {}", path.display(), e);
            }
        }
    }
}
