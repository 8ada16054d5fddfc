use std::sync::Arc;

use patchwatch_types::{AdvisorySource, Job, JobWriter, Platform};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::LifecycleError;
use crate::scheduler::TickSignal;

/// Binds scheduler ticks to advisory pulls, demultiplexing every pull into
/// one output stream.
///
/// Single-flight: a tick that arrives while a pull is in flight is dropped,
/// so at most one upstream pull exists at any instant.
pub struct JobRunner {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl JobRunner {
    /// Spawn the runner. The returned job is its output stream; its terminal
    /// fires only when the runner stops.
    pub fn spawn(
        source: Arc<dyn AdvisorySource>,
        platform: Platform,
        ticks: mpsc::Receiver<TickSignal>,
    ) -> (Self, Job) {
        let (writer, job) = Job::channel();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run(source, platform, ticks, writer, cancel.clone()));
        (
            Self {
                cancel,
                handle: Some(handle),
            },
            job,
        )
    }

    /// Cancel any in-flight pull and wait for the runner to emit its
    /// terminal. Synchronous: when this returns, the output stream is done.
    /// A second call is an error.
    pub async fn stop(&mut self) -> Result<(), LifecycleError> {
        let Some(handle) = self.handle.take() else {
            return Err(LifecycleError::AlreadyStopped);
        };
        self.cancel.cancel();
        let _ = handle.await;
        Ok(())
    }
}

async fn run(
    source: Arc<dyn AdvisorySource>,
    platform: Platform,
    mut ticks: mpsc::Receiver<TickSignal>,
    writer: JobWriter,
    cancel: CancellationToken,
) {
    'idle: loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            tick = ticks.recv() => {
                // A closed tick channel means the scheduler is gone; treat
                // it like a stop.
                if tick.is_none() {
                    break;
                }
            }
        }

        debug!(platform = %platform, "starting advisory pull");
        let mut child = source.vulnerabilities(platform);

        loop {
            tokio::select! {
                // Dropping the child job is what cancels the pull: its
                // producer sees closed channels and winds down.
                _ = cancel.cancelled() => break 'idle,
                Some(TickSignal) = ticks.recv() => {
                    debug!("dropping tick; a pull is already in flight");
                }
                _ = &mut child.terminal => {
                    // Forward whatever the pull left buffered, then go idle.
                    while let Ok(advisory) = child.advisories.try_recv() {
                        if !writer.advisory(advisory).await {
                            break 'idle;
                        }
                    }
                    while let Ok(error) = child.errors.try_recv() {
                        if !writer.error(error).await {
                            break 'idle;
                        }
                    }
                    debug!(platform = %platform, "advisory pull complete");
                    continue 'idle;
                }
                Some(advisory) = child.advisories.recv() => {
                    if !writer.advisory(advisory).await {
                        break 'idle;
                    }
                }
                Some(error) = child.errors.recv() => {
                    if !writer.error(error).await {
                        break 'idle;
                    }
                }
            }
        }
    }

    writer.finish();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use patchwatch_types::{Advisory, FetchError, Package, Severity};

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

    /// Counts pulls; each pull emits the configured advisories and errors,
    /// then finishes.
    struct CountingSource {
        pulls: AtomicUsize,
        advisories_per_pull: usize,
        errors_per_pull: usize,
    }

    impl CountingSource {
        fn new(advisories_per_pull: usize, errors_per_pull: usize) -> Arc<Self> {
            Arc::new(Self {
                pulls: AtomicUsize::new(0),
                advisories_per_pull,
                errors_per_pull,
            })
        }
    }

    impl AdvisorySource for CountingSource {
        fn vulnerabilities(&self, _platform: Platform) -> Job {
            self.pulls.fetch_add(1, Ordering::SeqCst);
            let (writer, job) = Job::channel();
            let advisories = self.advisories_per_pull;
            let errors = self.errors_per_pull;
            tokio::spawn(async move {
                for i in 0..advisories {
                    writer.advisory(advisory(&format!("vuln{i}"))).await;
                }
                for i in 0..errors {
                    writer
                        .error(FetchError::Upstream(format!("error{i}")))
                        .await;
                }
                writer.finish();
            });
            job
        }
    }

    /// Starts pulls that never finish, counting how many were started.
    struct BlockedSource {
        pulls: AtomicUsize,
    }

    impl AdvisorySource for BlockedSource {
        fn vulnerabilities(&self, _platform: Platform) -> Job {
            self.pulls.fetch_add(1, Ordering::SeqCst);
            let (writer, job) = Job::channel();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                writer.finish();
            });
            job
        }
    }

    #[tokio::test]
    async fn forwards_each_pull_and_returns_to_idle() {
        let source = CountingSource::new(2, 1);
        let (tick_tx, tick_rx) = mpsc::channel(8);
        let (mut runner, mut stream) = JobRunner::spawn(source.clone(), Platform::Debian8, tick_rx);

        for round in 1..=2 {
            // A tick that races the tail of the previous pull is dropped by
            // design, so keep inviting until the pull actually starts.
            while source.pulls.load(Ordering::SeqCst) < round {
                tick_tx.send(TickSignal).await.unwrap();
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            for _ in 0..2 {
                let advisory =
                    tokio::time::timeout(Duration::from_secs(5), stream.advisories.recv())
                        .await
                        .unwrap()
                        .unwrap();
                assert!(advisory.name.starts_with("vuln"));
            }
            let error = tokio::time::timeout(Duration::from_secs(5), stream.errors.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(error, FetchError::Upstream("error0".into()));
        }
        assert!(source.pulls.load(Ordering::SeqCst) >= 2);

        // The output stream must not terminate between pulls.
        let pending =
            tokio::time::timeout(Duration::from_millis(50), &mut stream.terminal).await;
        assert!(pending.is_err(), "terminal fired while runner was idle");

        runner.stop().await.unwrap();
        assert!(stream.terminal.await.is_ok());
    }

    #[tokio::test]
    async fn rapid_ticks_start_exactly_one_pull() {
        let source = Arc::new(BlockedSource {
            pulls: AtomicUsize::new(0),
        });
        let (tick_tx, tick_rx) = mpsc::channel(8);
        let (mut runner, _stream) = JobRunner::spawn(source.clone(), Platform::Debian8, tick_rx);

        for _ in 0..5 {
            tick_tx.send(TickSignal).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(source.pulls.load(Ordering::SeqCst), 1);
        runner.stop().await.unwrap();
    }

    #[tokio::test]
    async fn stop_cancels_an_inflight_pull_and_fires_terminal() {
        let source = Arc::new(BlockedSource {
            pulls: AtomicUsize::new(0),
        });
        let (tick_tx, tick_rx) = mpsc::channel(8);
        let (mut runner, stream) = JobRunner::spawn(source, Platform::Debian8, tick_rx);

        tick_tx.send(TickSignal).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        runner.stop().await.unwrap();
        assert!(stream.terminal.await.is_ok());

        assert_eq!(runner.stop().await.unwrap_err(), LifecycleError::AlreadyStopped);
    }

    #[tokio::test]
    async fn closing_the_tick_channel_stops_the_runner() {
        let source = CountingSource::new(0, 0);
        let (tick_tx, tick_rx) = mpsc::channel::<TickSignal>(8);
        let (_runner, stream) = JobRunner::spawn(source, Platform::Debian8, tick_rx);

        drop(tick_tx);
        let fin = tokio::time::timeout(Duration::from_secs(5), stream.terminal).await;
        assert!(fin.unwrap().is_ok());
    }
}
