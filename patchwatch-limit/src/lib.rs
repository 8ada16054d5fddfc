use std::time::Duration;

use tokio::sync::oneshot;

/// A constant-interval rate limiter.
///
/// Each [`acquire`](Self::acquire) hands back a one-shot signal that fires a
/// fixed pause after the call. Invocations do not share timing state — the
/// call site defines the delay origin — which is enough for consumers that
/// serialize their own acquisitions, as every consumer in this pipeline does.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    pause: Duration,
}

impl RateLimiter {
    pub fn new(pause: Duration) -> Self {
        Self { pause }
    }

    /// A signal that fires `pause` from now. Useful inside `select!` loops.
    pub fn acquire(&self) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        let pause = self.pause;
        tokio::spawn(async move {
            tokio::time::sleep(pause).await;
            let _ = tx.send(());
        });
        rx
    }

    /// Block the caller for one pause interval.
    pub async fn wait(&self) {
        let _ = self.acquire().await;
    }
}
