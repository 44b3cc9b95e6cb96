use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, error, info, warn};

use crate::error::{SubmitError, WorkerError};

use super::executor::JobExecutor;

/// Fixed set of threads draining job ids from a bounded channel.
pub struct WorkerPool {
    job_sender: Sender<String>,
    job_receiver: Receiver<String>,
    executor: Arc<JobExecutor>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    shutdown: Arc<AtomicBool>,
}

impl WorkerPool {
    pub fn new(executor: Arc<JobExecutor>, worker_count: usize) -> Result<Self, WorkerError> {
        let worker_count = worker_count.max(1);
        let (job_sender, job_receiver) = bounded::<String>(worker_count * 16);
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut workers = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let job_rx = job_receiver.clone();
            let shutdown_flag = Arc::clone(&shutdown);
            let worker_executor = Arc::clone(&executor);

            let handle = thread::Builder::new()
                .name(format!("job-worker-{}", worker_id))
                .spawn(move || run_worker(worker_id, job_rx, shutdown_flag, worker_executor))
                .map_err(|e| WorkerError::SpawnFailed(e.to_string()))?;
            workers.push(handle);
        }

        info!("Started {} workers", worker_count);

        Ok(Self {
            job_sender,
            job_receiver,
            executor,
            workers: Mutex::new(workers),
            shutdown,
        })
    }

    /// Queues a job id. Blocks while the queue is full.
    pub fn submit(&self, job_id: String) -> Result<(), SubmitError> {
        if self.is_shutdown() {
            return Err(SubmitError::PoolClosed);
        }
        self.job_sender
            .send(job_id)
            .map_err(|_| SubmitError::PoolClosed)
    }

    pub fn shutdown(&self) {
        info!("Shutting down worker pool...");
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Joins all workers. Call after [`WorkerPool::shutdown`].
    ///
    /// Jobs still queued once the workers are gone are failed, so every
    /// submitted job reaches a terminal state.
    pub fn wait(&self) {
        let workers = match self.workers.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };

        for (i, worker) in workers.into_iter().enumerate() {
            if let Err(e) = worker.join() {
                error!("Worker {} panicked: {:?}", i, e);
            } else {
                debug!("Worker {} finished", i);
            }
        }

        info!("All workers have stopped");

        let mut abandoned = 0;
        while let Ok(job_id) = self.job_receiver.try_recv() {
            self.executor.abandon(&job_id);
            abandoned += 1;
        }
        if abandoned > 0 {
            warn!("Failed {} queued jobs at shutdown", abandoned);
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }
}

fn run_worker(
    worker_id: usize,
    job_receiver: Receiver<String>,
    shutdown: Arc<AtomicBool>,
    executor: Arc<JobExecutor>,
) {
    debug!("Worker {} started", worker_id);

    loop {
        if shutdown.load(Ordering::Relaxed) {
            debug!("Worker {} received shutdown signal", worker_id);
            break;
        }

        match job_receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(job_id) => {
                debug!("Worker {} processing job {}", worker_id, job_id);
                executor.execute(&job_id);
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                debug!("Worker {} job channel disconnected", worker_id);
                break;
            }
        }
    }

    debug!("Worker {} stopped", worker_id);
}
