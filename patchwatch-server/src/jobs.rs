// ---------------------------------------------------------------------------
// Job manager
// ---------------------------------------------------------------------------
//
// Admits live advisory fetches on behalf of HTTP clients, names them with
// opaque hex ids, and drains them under a per-poll time budget.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::time::Duration;

use patchwatch_types::{Advisory, FetchError, Job};
use rand::RngCore;
use rand::rngs::OsRng;
use thiserror::Error;
use tokio::time::Instant;
use tracing::debug;

pub const DEFAULT_MAX_JOBS: usize = 128;
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(30);

const JOB_ID_BYTES: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobsError {
    #[error("job queue full; try again later")]
    QueueFull,
    #[error("no such job")]
    NoSuchJob,
}

/// Everything one poll of a job produced. `complete` means the job's
/// terminal was observed and the record has been evicted.
#[derive(Debug, Default)]
pub struct Retrieved {
    pub advisories: Vec<Advisory>,
    pub errors: Vec<FetchError>,
    pub complete: bool,
}

/// Owns every live [`Job`] the server is answering polls for.
///
/// The map is guarded by a single mutex in the server state; the critical
/// sections are a map insert or a bounded drain, so contention stays cheap.
pub struct JobManager {
    managing: HashMap<String, Job>,
    max_jobs: usize,
    read_timeout: Duration,
}

impl JobManager {
    pub fn new(max_jobs: usize, read_timeout: Duration) -> Self {
        Self {
            managing: HashMap::new(),
            max_jobs,
            read_timeout,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_MAX_JOBS, DEFAULT_READ_TIMEOUT)
    }

    /// Number of live records. Never exceeds `max_jobs`.
    pub fn len(&self) -> usize {
        self.managing.len()
    }

    pub fn is_empty(&self) -> bool {
        self.managing.is_empty()
    }

    /// Admit a job, returning the id a client must present to poll it.
    pub fn register(&mut self, job: Job) -> Result<String, JobsError> {
        if self.managing.len() >= self.max_jobs {
            return Err(JobsError::QueueFull);
        }

        let id = loop {
            let candidate = generate_id();
            if !self.managing.contains_key(&candidate) {
                break candidate;
            }
        };

        self.managing.insert(id.clone(), job);
        debug!(%id, live = self.managing.len(), "registered job");
        Ok(id)
    }

    /// Drain a job's channels for up to the read timeout.
    ///
    /// Selection across the three channels is fair; neither errors nor the
    /// terminal can be starved by a fast advisory stream. Observing the
    /// terminal evicts the record; otherwise it stays live for the next
    /// poll. A record is never evicted just because errors were drained.
    pub async fn retrieve(&mut self, id: &str) -> Result<Retrieved, JobsError> {
        let job = self.managing.get_mut(id).ok_or(JobsError::NoSuchJob)?;

        let mut out = Retrieved::default();
        let deadline = Instant::now() + self.read_timeout;

        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => break,
                // A dropped writer counts as terminal: the producer is gone
                // and nothing further can arrive.
                _ = &mut job.terminal => {
                    out.complete = true;
                    break;
                }
                Some(error) = job.errors.recv() => out.errors.push(error),
                Some(advisory) = job.advisories.recv() => out.advisories.push(advisory),
            }
        }

        if out.complete {
            // Everything the producer wrote is already buffered; hand it
            // over before the record disappears.
            while let Ok(advisory) = job.advisories.try_recv() {
                out.advisories.push(advisory);
            }
            while let Ok(error) = job.errors.try_recv() {
                out.errors.push(error);
            }
            self.managing.remove(id);
            debug!(%id, live = self.managing.len(), "job complete, evicted");
        }

        Ok(out)
    }
}

/// 16 cryptographic-random bytes, hex-encoded: a 32-character opaque token.
fn generate_id() -> String {
    let mut bytes = [0u8; JOB_ID_BYTES];
    OsRng.fill_bytes(&mut bytes);
    bytes.iter().fold(
        String::with_capacity(JOB_ID_BYTES * 2),
        |mut id, byte| {
            let _ = write!(id, "{byte:02x}");
            id
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use patchwatch_types::{Package, Severity};

    fn advisory(name: &str) -> Advisory {
        Advisory {
            name: name.into(),
            affected_package_name: "testpackage".into(),
            affected_platform_name: "debian-8".into(),
            details_href: "website.com".into(),
            severity_rating: Severity::Low,
            fixed_in_packages: vec![Package {
                name: "testpackage".into(),
                version: "1.2.3".into(),
            }],
        }
    }

    #[test]
    fn ids_are_32_hex_characters() {
        for _ in 0..64 {
            let id = generate_id();
            assert_eq!(id.len(), 32);
            assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        }
    }

    #[tokio::test]
    async fn admission_cap_is_enforced() {
        let mut manager = JobManager::new(1, DEFAULT_READ_TIMEOUT);

        let (_writer_a, job_a) = Job::channel();
        let first = manager.register(job_a);
        assert!(first.is_ok());
        assert_eq!(manager.len(), 1);

        let (_writer_b, job_b) = Job::channel();
        assert_eq!(manager.register(job_b), Err(JobsError::QueueFull));
        assert_eq!(manager.len(), 1);
    }

    #[tokio::test]
    async fn registrations_up_to_the_cap_succeed() {
        let mut manager = JobManager::new(10, DEFAULT_READ_TIMEOUT);
        let mut writers = Vec::new();

        for _ in 0..10 {
            let (writer, job) = Job::channel();
            writers.push(writer);
            assert!(manager.register(job).is_ok());
        }
        assert_eq!(manager.len(), 10);
    }

    #[tokio::test]
    async fn retrieve_of_unknown_id_fails() {
        let mut manager = JobManager::with_defaults();
        assert_eq!(
            manager.retrieve("testid").await.unwrap_err(),
            JobsError::NoSuchJob
        );
    }

    #[tokio::test]
    async fn retrieve_drains_within_the_time_budget() {
        let mut manager = JobManager::with_defaults();
        let (writer, job) = Job::channel();
        let id = manager.register(job).unwrap();

        assert!(writer.advisory(advisory("one")).await);
        assert!(writer.error(FetchError::Upstream("testerror".into())).await);

        let retrieved = manager.retrieve(&id).await.unwrap();
        assert_eq!(retrieved.advisories, vec![advisory("one")]);
        assert_eq!(
            retrieved.errors,
            vec![FetchError::Upstream("testerror".into())]
        );
        assert!(!retrieved.complete);
        assert_eq!(manager.len(), 1, "record must stay live until terminal");
    }

    #[tokio::test]
    async fn terminal_completes_and_evicts() {
        let mut manager = JobManager::with_defaults();
        let (writer, job) = Job::channel();
        let id = manager.register(job).unwrap();

        assert!(writer.advisory(advisory("one")).await);
        assert!(writer.advisory(advisory("two")).await);
        writer.finish();

        let retrieved = manager.retrieve(&id).await.unwrap();
        assert!(retrieved.complete);
        assert_eq!(retrieved.advisories.len(), 2);
        assert!(manager.is_empty());

        // The id is gone for good.
        assert_eq!(
            manager.retrieve(&id).await.unwrap_err(),
            JobsError::NoSuchJob
        );
    }

    #[tokio::test]
    async fn eviction_frees_an_admission_slot() {
        let mut manager = JobManager::new(1, DEFAULT_READ_TIMEOUT);

        let (writer, job) = Job::channel();
        let id = manager.register(job).unwrap();
        writer.finish();
        assert!(manager.retrieve(&id).await.unwrap().complete);

        let (_writer, job) = Job::channel();
        assert!(manager.register(job).is_ok());
    }

    #[tokio::test]
    async fn empty_poll_respects_the_read_timeout() {
        let mut manager = JobManager::new(DEFAULT_MAX_JOBS, Duration::from_millis(30));
        let (_writer, job) = Job::channel();
        let id = manager.register(job).unwrap();

        let started = std::time::Instant::now();
        let retrieved = manager.retrieve(&id).await.unwrap();
        let elapsed = started.elapsed();

        assert!(retrieved.advisories.is_empty());
        assert!(!retrieved.complete);
        assert!(
            elapsed >= Duration::from_millis(25) && elapsed < Duration::from_millis(500),
            "poll took {elapsed:?}"
        );
    }
}
