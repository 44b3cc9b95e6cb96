//! Isolated `JobManager` for integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;

use upscaler::config::Config;
use upscaler::error::NotifyError;
use upscaler::{JobManager, JobSummary, Notifier, SubmitRequest, Upload};

/// Records every message instead of sending it.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn send(&self, message: &str) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(message.to_string());
        Ok(())
    }
}

pub struct TestHarness {
    temp_dir: TempDir,
    pub manager: JobManager,
    pub notifier: Arc<RecordingNotifier>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_config(|c| c)
    }

    /// Builds a harness whose config is adjusted by `configure`.
    pub fn with_config(configure: impl FnOnce(super::ConfigBuilder) -> super::ConfigBuilder) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config = configure(super::ConfigBuilder::new(temp_dir.path())).build();
        Self::with_built_config(temp_dir, config)
    }

    pub fn with_built_config(temp_dir: TempDir, config: Config) -> Self {
        let notifier = Arc::new(RecordingNotifier::default());
        let manager = JobManager::with_notifier(config, Arc::clone(&notifier) as Arc<dyn Notifier>)
            .expect("Failed to start job manager");
        Self {
            temp_dir,
            manager,
            notifier,
        }
    }

    pub fn work_dir(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn submit(&self, uploads: Vec<Upload>, scale: f64, target_mb: f64) -> String {
        self.manager
            .submit(SubmitRequest {
                uploads,
                scale: Some(scale),
                target_mb: Some(target_mb),
            })
            .expect("submission rejected")
    }

    pub fn wait(&self, job_id: &str) -> JobSummary {
        let summary = self
            .manager
            .wait_for_terminal(job_id, Duration::from_secs(120))
            .expect("job not found");
        assert!(
            summary.status.is_terminal(),
            "job {} did not finish: {:?}",
            job_id,
            summary
        );
        summary
    }
}

impl Drop for TestHarness {
    fn drop(&mut self) {
        self.manager.shutdown();
    }
}
