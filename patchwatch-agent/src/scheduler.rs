use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::LifecycleError;

/// "Begin a scan cycle now, if idle." Carries nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickSignal;

/// Periodic tick source with a start/stop lifecycle.
///
/// Ticks are invitations, not work items: one is produced per interval
/// expiry, and a tick no consumer is ready for is dropped rather than
/// queued. A missed tick is harmless — the next follows one period later.
pub struct Scheduler {
    period: Duration,
    cancel: CancellationToken,
    state: State,
}

enum State {
    Idle,
    Running(JoinHandle<()>),
    Stopped,
}

impl Scheduler {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            cancel: CancellationToken::new(),
            state: State::Idle,
        }
    }

    /// Begin ticking. The first tick arrives one period after the call.
    /// Starting twice is an error.
    pub fn start(&mut self) -> Result<mpsc::Receiver<TickSignal>, LifecycleError> {
        match self.state {
            State::Idle => {}
            State::Running(_) => return Err(LifecycleError::AlreadyStarted),
            State::Stopped => return Err(LifecycleError::AlreadyStopped),
        }

        // Capacity one: at most a single tick can ever be pending, and a
        // tick arriving while the consumer is busy is discarded by try_send.
        let (tx, rx) = mpsc::channel(1);
        let cancel = self.cancel.clone();
        let period = self.period;

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        if tx.try_send(TickSignal).is_err() {
                            debug!("dropped a scan tick; consumer busy or gone");
                        }
                    }
                }
            }
        });

        self.state = State::Running(handle);
        Ok(rx)
    }

    /// Cease tick production and wait for the tick task to exit. Stopping
    /// before starting, or twice, is an error; state is unchanged either way.
    pub async fn stop(&mut self) -> Result<(), LifecycleError> {
        match std::mem::replace(&mut self.state, State::Stopped) {
            State::Running(handle) => {
                self.cancel.cancel();
                let _ = handle.await;
                Ok(())
            }
            State::Idle => {
                self.state = State::Idle;
                Err(LifecycleError::NotStarted)
            }
            State::Stopped => Err(LifecycleError::AlreadyStopped),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ticks_arrive_at_the_configured_period() {
        let mut scheduler = Scheduler::new(Duration::from_millis(100));
        let mut ticks = scheduler.start().unwrap();

        let mut counted = 0;
        let deadline = tokio::time::sleep(Duration::from_millis(350));
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                _ = &mut deadline => break,
                Some(TickSignal) = ticks.recv() => counted += 1,
            }
        }

        assert!((2..=4).contains(&counted), "got {counted} ticks in 350 ms");
        scheduler.stop().await.unwrap();
    }

    #[tokio::test]
    async fn start_twice_is_an_error() {
        let mut scheduler = Scheduler::new(Duration::from_millis(50));
        let _ticks = scheduler.start().unwrap();
        assert_eq!(scheduler.start().unwrap_err(), LifecycleError::AlreadyStarted);
        scheduler.stop().await.unwrap();
    }

    #[tokio::test]
    async fn stop_before_start_is_an_error() {
        let mut scheduler = Scheduler::new(Duration::from_millis(50));
        assert_eq!(scheduler.stop().await.unwrap_err(), LifecycleError::NotStarted);

        // The failed stop must not have wedged the scheduler.
        let _ticks = scheduler.start().unwrap();
        scheduler.stop().await.unwrap();
    }

    #[tokio::test]
    async fn stop_twice_is_an_error() {
        let mut scheduler = Scheduler::new(Duration::from_millis(50));
        let _ticks = scheduler.start().unwrap();
        scheduler.stop().await.unwrap();
        assert_eq!(
            scheduler.stop().await.unwrap_err(),
            LifecycleError::AlreadyStopped
        );
    }

    #[tokio::test]
    async fn no_ticks_after_stop() {
        let mut scheduler = Scheduler::new(Duration::from_millis(30));
        let mut ticks = scheduler.start().unwrap();
        scheduler.stop().await.unwrap();

        // Drain anything that raced the stop, then expect silence.
        tokio::time::sleep(Duration::from_millis(100)).await;
        while ticks.try_recv().is_ok() {}
        let quiet = tokio::time::timeout(Duration::from_millis(100), ticks.recv()).await;
        assert!(
            matches!(quiet, Ok(None)),
            "tick task should be gone after stop"
        );
    }
}
