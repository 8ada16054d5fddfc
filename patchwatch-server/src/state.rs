// ---------------------------------------------------------------------------
// Application state
// ---------------------------------------------------------------------------

use std::sync::Arc;
use std::time::Duration;

use patchwatch_types::AdvisorySource;
use tokio::sync::Mutex;

use crate::jobs::{DEFAULT_MAX_JOBS, DEFAULT_READ_TIMEOUT, JobManager};

/// Global state for the advisory server: the upstream source jobs are
/// started against, and the manager that tracks them between polls.
pub struct AppState {
    pub source: Arc<dyn AdvisorySource>,
    pub jobs: Mutex<JobManager>,
}

impl AppState {
    pub fn new(source: Arc<dyn AdvisorySource>) -> Self {
        Self::with_options(source, DEFAULT_MAX_JOBS, DEFAULT_READ_TIMEOUT)
    }

    pub fn with_max_jobs(source: Arc<dyn AdvisorySource>, max_jobs: usize) -> Self {
        Self::with_options(source, max_jobs, DEFAULT_READ_TIMEOUT)
    }

    pub fn with_options(
        source: Arc<dyn AdvisorySource>,
        max_jobs: usize,
        read_timeout: Duration,
    ) -> Self {
        Self {
            source,
            jobs: Mutex::new(JobManager::new(max_jobs, read_timeout)),
        }
    }
}
