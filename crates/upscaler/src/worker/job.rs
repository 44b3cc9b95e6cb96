use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Done,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processed,
    Error,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processed => "processed",
            TaskStatus::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dims {
    pub width: u32,
    pub height: u32,
}

impl Dims {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn pixels(self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// One uploaded file within a job.
#[derive(Debug, Clone, Serialize)]
pub struct FileTask {
    /// Position in upload order.
    pub index: usize,
    pub source_name: String,
    pub output_name: String,
    /// Stored upload inside the job's work directory.
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
    pub status: TaskStatus,
    pub source_dims: Option<Dims>,
    pub output_dims: Option<Dims>,
    pub quality_used: Option<u8>,
    pub size_bytes: Option<u64>,
    pub target_met: bool,
    pub notes: Vec<String>,
    #[serde(skip)]
    pub output_path: Option<PathBuf>,
}

impl FileTask {
    pub fn new(index: usize, source_name: String, output_name: String) -> Self {
        Self {
            index,
            source_name,
            output_name,
            source_path: None,
            status: TaskStatus::Pending,
            source_dims: None,
            output_dims: None,
            quality_used: None,
            size_bytes: None,
            target_met: false,
            notes: Vec::new(),
            output_path: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status != TaskStatus::Pending
    }

    /// Marks the task as failed with `note`, clearing any partial results.
    pub fn fail(&mut self, note: impl Into<String>) {
        self.status = TaskStatus::Error;
        self.source_dims = None;
        self.output_dims = None;
        self.quality_used = None;
        self.size_bytes = None;
        self.target_met = false;
        self.output_path = None;
        self.push_note(note);
    }

    /// Appends a note unless an identical one is already present.
    pub fn push_note(&mut self, note: impl Into<String>) {
        let note = note.into();
        if !self.notes.contains(&note) {
            self.notes.push(note);
        }
    }
}

#[derive(Debug, Clone)]
pub struct Job {
    /// 32 lowercase hex characters.
    pub id: String,
    pub status: JobStatus,
    pub requested_scale: f64,
    pub target_size_bytes: u64,
    pub tasks: Vec<FileTask>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub archive_path: Option<PathBuf>,
    pub work_dir: PathBuf,
    pub message: String,
    pub current_item: Option<String>,
}

impl Job {
    pub fn new(requested_scale: f64, target_size_bytes: u64, work_root: &std::path::Path) -> Self {
        let id = uuid::Uuid::new_v4().simple().to_string();
        let work_dir = work_root.join(&id);
        Self {
            id,
            status: JobStatus::Queued,
            requested_scale,
            target_size_bytes,
            tasks: Vec::new(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            archive_path: None,
            work_dir,
            message: "Queued".to_string(),
            current_item: None,
        }
    }

    pub fn total(&self) -> usize {
        self.tasks.len()
    }

    /// Tasks that reached a terminal state, processed or error.
    pub fn completed_count(&self) -> usize {
        self.tasks.iter().filter(|t| t.is_terminal()).count()
    }

    pub fn all_tasks_terminal(&self) -> bool {
        self.tasks.iter().all(FileTask::is_terminal)
    }

    /// queued → processing. Returns false if the job already left `queued`.
    pub fn start(&mut self) -> bool {
        if self.status != JobStatus::Queued {
            return false;
        }
        self.status = JobStatus::Processing;
        self.started_at = Some(Utc::now());
        self.message = "Processing images...".to_string();
        true
    }

    pub fn begin_task(&mut self, index: usize) {
        if let Some(task) = self.tasks.get(index) {
            self.current_item = Some(task.source_name.clone());
            self.message = format!(
                "Processing {}/{}: {}",
                index + 1,
                self.tasks.len(),
                task.source_name
            );
        }
    }

    /// Records a finished task. Results for already terminal tasks are
    /// ignored so the completed count never goes backwards.
    pub fn complete_task(&mut self, task: FileTask) -> bool {
        match self.tasks.get_mut(task.index) {
            Some(slot) if !slot.is_terminal() && task.is_terminal() => {
                *slot = task;
                true
            }
            _ => false,
        }
    }

    /// processing → done. Requires every task to be terminal.
    pub fn mark_done(&mut self, archive_path: PathBuf) -> bool {
        if self.status != JobStatus::Processing || !self.all_tasks_terminal() {
            return false;
        }
        let summary = self.summary();
        self.status = JobStatus::Done;
        self.archive_path = Some(archive_path);
        self.completed_at = Some(Utc::now());
        self.current_item = None;
        self.message = format!(
            "Processing complete. {} met target, {} upscaled but below target, {} failed.",
            summary.succeeded, summary.warnings, summary.failed
        );
        true
    }

    /// Any non-terminal state → failed.
    pub fn mark_failed(&mut self, message: impl Into<String>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = JobStatus::Failed;
        self.completed_at = Some(Utc::now());
        self.current_item = None;
        self.message = message.into();
        true
    }

    pub fn summary(&self) -> JobSummary {
        let mut succeeded = 0;
        let mut warnings = 0;
        let mut failed = 0;
        for task in &self.tasks {
            match task.status {
                TaskStatus::Processed if task.target_met => succeeded += 1,
                TaskStatus::Processed => warnings += 1,
                TaskStatus::Error => failed += 1,
                TaskStatus::Pending => {}
            }
        }

        let total = self.total();
        let processed = self.completed_count();
        let progress = if total == 0 {
            if self.status.is_terminal() {
                100
            } else {
                0
            }
        } else {
            (processed * 100 / total) as u8
        };

        JobSummary {
            job_id: self.id.clone(),
            created_at: self.created_at,
            status: self.status,
            total,
            processed,
            succeeded,
            warnings,
            failed,
            message: self.message.clone(),
            current_item: self.current_item.clone().unwrap_or_default(),
            progress,
            download_url: (self.status == JobStatus::Done)
                .then(|| format!("/download/{}", self.id)),
        }
    }
}

/// Point-in-time view of a job, as returned by the status endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSummary {
    pub job_id: String,
    pub created_at: DateTime<Utc>,
    pub status: JobStatus,
    pub total: usize,
    pub processed: usize,
    pub succeeded: usize,
    pub warnings: usize,
    pub failed: usize,
    pub message: String,
    pub current_item: String,
    /// Integer percent of terminal tasks.
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn job_with_tasks(n: usize) -> Job {
        let mut job = Job::new(4.0, 1024, Path::new("/tmp/upscaler-test"));
        for i in 0..n {
            job.tasks.push(FileTask::new(
                i,
                format!("p{}.jpg", i),
                format!("p{}_upscaled.jpg", i),
            ));
        }
        job
    }

    fn processed(index: usize, target_met: bool) -> FileTask {
        let mut task = FileTask::new(index, String::new(), String::new());
        task.status = TaskStatus::Processed;
        task.target_met = target_met;
        task
    }

    #[test]
    fn test_job_id_is_32_hex() {
        let job = job_with_tasks(0);
        assert_eq!(job.id.len(), 32);
        assert!(job
            .id
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
        assert!(job.work_dir.ends_with(&job.id));
    }

    #[test]
    fn test_start_happens_once() {
        let mut job = job_with_tasks(1);
        assert!(job.start());
        assert!(!job.start());
        assert_eq!(job.status, JobStatus::Processing);
    }

    #[test]
    fn test_done_requires_terminal_tasks() {
        let mut job = job_with_tasks(2);
        job.start();
        job.complete_task(processed(0, true));
        assert!(!job.mark_done(PathBuf::from("a.zip")));

        let mut err = FileTask::new(1, String::new(), String::new());
        err.fail("bad");
        job.complete_task(err);
        assert!(job.mark_done(PathBuf::from("a.zip")));
        assert_eq!(job.status, JobStatus::Done);
        assert!(job.archive_path.is_some());
    }

    #[test]
    fn test_terminal_task_is_not_overwritten() {
        let mut job = job_with_tasks(1);
        assert!(job.complete_task(processed(0, true)));
        assert!(!job.complete_task(processed(0, false)));
        assert!(job.tasks[0].target_met);
    }

    #[test]
    fn test_failed_is_final() {
        let mut job = job_with_tasks(0);
        assert!(job.mark_failed("No files were uploaded"));
        assert!(!job.mark_failed("again"));
        assert!(!job.start());
        assert_eq!(job.message, "No files were uploaded");
    }

    #[test]
    fn test_summary_counts_and_progress() {
        let mut job = job_with_tasks(4);
        job.start();
        job.complete_task(processed(0, true));
        job.complete_task(processed(1, false));
        let mut err = FileTask::new(2, String::new(), String::new());
        err.fail("x");
        job.complete_task(err);

        let summary = job.summary();
        assert_eq!(summary.total, 4);
        assert_eq!(summary.processed, 3);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.warnings, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.progress, 75);
        assert!(summary.download_url.is_none());
    }

    #[test]
    fn test_summary_serializes_lowercase_status() {
        let mut job = job_with_tasks(1);
        job.start();
        job.complete_task(processed(0, true));
        job.mark_done(PathBuf::from("x.zip"));

        let value = serde_json::to_value(job.summary()).unwrap();
        assert_eq!(value["status"], "done");
        assert_eq!(value["download_url"], format!("/download/{}", job.id));
        assert_eq!(value["progress"], 100);
    }

    #[test]
    fn test_push_note_dedups() {
        let mut task = FileTask::new(0, String::new(), String::new());
        task.push_note("a");
        task.push_note("a");
        task.push_note("b");
        assert_eq!(task.notes, vec!["a", "b"]);
    }
}
