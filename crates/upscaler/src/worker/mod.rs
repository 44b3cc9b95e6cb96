pub mod executor;
pub mod job;
pub mod manager;
pub mod pool;
pub mod store;

pub use executor::JobExecutor;
pub use job::{Dims, FileTask, Job, JobStatus, JobSummary, TaskStatus};
pub use manager::{JobManager, SubmitRequest, Upload};
pub use pool::WorkerPool;
pub use store::{JobStore, SharedJob};
