use std::time::Duration;

use patchwatch_types::Advisory;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::LifecycleError;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const ERROR_CHANNEL_CAPACITY: usize = 64;
const SINK_CAPACITY: usize = 64;

/// Most scan cycles fit in one batch of this size; the buffer grows past it
/// freely because the send timer, never the size, triggers a flush.
const BATCH_PREALLOC: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReportError {
    #[error("failed to deliver report: {0}")]
    Transport(String),
    #[error("collector returned status {0}")]
    Rejected(u16),
}

#[derive(Serialize)]
struct ReportBody {
    vulnerabilities: Vec<Advisory>,
}

/// Coalesces findings into timed batches and posts them to the collector.
///
/// Deliveries are detached and never retried; each failure surfaces one
/// [`ReportError`] on the error channel. A finding lost to a failed delivery
/// is re-found on the next scan cycle.
pub struct Reporter {
    sink: mpsc::Sender<Advisory>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl Reporter {
    pub fn spawn(
        collector_url: &str,
        send_every: Duration,
    ) -> Result<(Self, mpsc::Receiver<ReportError>), reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent("patchwatch-agent/0.1")
            .build()?;

        let (sink, advisories) = mpsc::channel(SINK_CAPACITY);
        let (error_tx, error_rx) = mpsc::channel(ERROR_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(run(
            client,
            collector_url.to_string(),
            send_every,
            advisories,
            error_tx,
            cancel.clone(),
        ));

        Ok((
            Self {
                sink,
                cancel,
                handle: Some(handle),
            },
            error_rx,
        ))
    }

    /// Queue one finding for the next batch. Returns false if the reporter
    /// has terminated.
    pub async fn submit(&self, advisory: Advisory) -> bool {
        self.sink.send(advisory).await.is_ok()
    }

    /// Shut the reporter down and wait for acknowledgement. Whatever is
    /// buffered is discarded; a second call is an error.
    pub async fn terminate(&mut self) -> Result<(), LifecycleError> {
        let Some(handle) = self.handle.take() else {
            return Err(LifecycleError::AlreadyStopped);
        };
        self.cancel.cancel();
        let _ = handle.await;
        Ok(())
    }
}

async fn run(
    client: reqwest::Client,
    url: String,
    send_every: Duration,
    mut advisories: mpsc::Receiver<Advisory>,
    errors: mpsc::Sender<ReportError>,
    cancel: CancellationToken,
) {
    let mut batch: Vec<Advisory> = Vec::with_capacity(BATCH_PREALLOC);
    let mut timer = tokio::time::interval_at(Instant::now() + send_every, send_every);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            Some(advisory) = advisories.recv() => batch.push(advisory),
            _ = timer.tick() => {
                if batch.is_empty() {
                    continue;
                }
                let body = std::mem::replace(&mut batch, Vec::with_capacity(BATCH_PREALLOC));
                info!(count = body.len(), "reporting found vulnerabilities");

                let client = client.clone();
                let url = url.clone();
                let errors = errors.clone();
                tokio::spawn(async move {
                    deliver(client, url, body, errors).await;
                });
            }
        }
    }
}

async fn deliver(
    client: reqwest::Client,
    url: String,
    vulnerabilities: Vec<Advisory>,
    errors: mpsc::Sender<ReportError>,
) {
    let body = ReportBody { vulnerabilities };
    match client.post(&url).json(&body).send().await {
        Ok(response) => {
            let status = response.status().as_u16();
            if status != 200 {
                let _ = errors.send(ReportError::Rejected(status)).await;
            }
        }
        Err(err) => {
            let _ = errors.send(ReportError::Transport(err.to_string())).await;
        }
    }
}
