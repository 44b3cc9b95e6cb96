//! In-memory job registry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use super::job::{Job, JobSummary};

/// A job behind its single mutex. All mutation goes through this lock.
pub type SharedJob = Arc<Mutex<Job>>;

/// Locks a job, recovering from poisoning.
pub fn lock_job(job: &SharedJob) -> MutexGuard<'_, Job> {
    match job.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log::warn!("Job lock was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

/// Jobs by id. Lives for the whole process; nothing is persisted.
#[derive(Default)]
pub struct JobStore {
    jobs: RwLock<HashMap<String, SharedJob>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, job: Job) -> SharedJob {
        let id = job.id.clone();
        let shared = Arc::new(Mutex::new(job));
        let mut jobs = match self.jobs.write() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Job store lock was poisoned, recovering");
                poisoned.into_inner()
            }
        };
        jobs.insert(id, Arc::clone(&shared));
        shared
    }

    pub fn get(&self, id: &str) -> Option<SharedJob> {
        let jobs = match self.jobs.read() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Job store lock was poisoned, recovering");
                poisoned.into_inner()
            }
        };
        jobs.get(id).cloned()
    }

    /// Cloned snapshot of the job.
    pub fn snapshot(&self, id: &str) -> Option<Job> {
        self.get(id).map(|job| lock_job(&job).clone())
    }

    pub fn summary(&self, id: &str) -> Option<JobSummary> {
        self.get(id).map(|job| lock_job(&job).summary())
    }

    pub fn len(&self) -> usize {
        self.jobs.read().map(|jobs| jobs.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
