use std::sync::Arc;

use upscaler::JobManager;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<JobManager>,
}

impl AppState {
    pub fn new(manager: Arc<JobManager>) -> Self {
        Self { manager }
    }
}
