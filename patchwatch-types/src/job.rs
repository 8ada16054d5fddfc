use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::advisory::Advisory;
use crate::platform::Platform;

/// Capacity of a job's advisory and error channels. Lets a producer run a
/// little ahead of its consumer without the two having to rendezvous.
const JOB_CHANNEL_CAPACITY: usize = 64;

/// An error surfaced on a job's error channel. `Display` is the bare message
/// so the HTTP layer can join several with newlines.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The request never completed (connection refused, timeout, ...).
    #[error("{0}")]
    Transport(String),
    /// The response body was not the expected shape.
    #[error("{0}")]
    Decode(String),
    /// The upstream answered with its error envelope.
    #[error("{0}")]
    Upstream(String),
}

/// One live advisory fetch: a stream of advisories, a stream of errors, and
/// a one-shot terminal signal.
///
/// Once the terminal fires, nothing further appears on either stream; the
/// single [`JobWriter`] enforces this by consuming itself on
/// [`finish`](JobWriter::finish).
pub struct Job {
    pub advisories: mpsc::Receiver<Advisory>,
    pub terminal: oneshot::Receiver<()>,
    pub errors: mpsc::Receiver<FetchError>,
}

impl Job {
    /// Create a job together with its unique writer.
    pub fn channel() -> (JobWriter, Job) {
        let (advisory_tx, advisory_rx) = mpsc::channel(JOB_CHANNEL_CAPACITY);
        let (terminal_tx, terminal_rx) = oneshot::channel();
        let (error_tx, error_rx) = mpsc::channel(JOB_CHANNEL_CAPACITY);

        let writer = JobWriter {
            advisories: advisory_tx,
            terminal: terminal_tx,
            errors: error_tx,
        };
        let job = Job {
            advisories: advisory_rx,
            terminal: terminal_rx,
            errors: error_rx,
        };
        (writer, job)
    }
}

/// The producing half of a [`Job`]. There is exactly one per job.
pub struct JobWriter {
    advisories: mpsc::Sender<Advisory>,
    terminal: oneshot::Sender<()>,
    errors: mpsc::Sender<FetchError>,
}

impl JobWriter {
    /// Send one advisory. Returns false if the job has been dropped by its
    /// consumer, which producers should treat as cancellation.
    pub async fn advisory(&self, advisory: Advisory) -> bool {
        self.advisories.send(advisory).await.is_ok()
    }

    /// Send one error. Returns false if the consumer is gone.
    pub async fn error(&self, error: FetchError) -> bool {
        self.errors.send(error).await.is_ok()
    }

    /// A cloneable handle for concurrent producers feeding this job.
    pub fn sink(&self) -> JobSink {
        JobSink {
            advisories: self.advisories.clone(),
            errors: self.errors.clone(),
        }
    }

    /// Fire the terminal signal and give up the write side. Consuming `self`
    /// guarantees nothing can be written after the terminal.
    pub fn finish(self) {
        let _ = self.terminal.send(());
    }
}

/// A cloneable advisory/error producer for one job. Cannot fire the
/// terminal — only the owning [`JobWriter`] can.
#[derive(Clone)]
pub struct JobSink {
    advisories: mpsc::Sender<Advisory>,
    errors: mpsc::Sender<FetchError>,
}

impl JobSink {
    pub async fn advisory(&self, advisory: Advisory) -> bool {
        self.advisories.send(advisory).await.is_ok()
    }

    pub async fn error(&self, error: FetchError) -> bool {
        self.errors.send(error).await.is_ok()
    }
}

/// Anything that can start a live advisory fetch for a platform: the Clair
/// fetcher on the server, the polling HTTP client on the agent.
pub trait AdvisorySource: Send + Sync {
    fn vulnerabilities(&self, platform: Platform) -> Job;
}
