// ---------------------------------------------------------------------------
// Host agent
// ---------------------------------------------------------------------------
//
// Everything that runs on a scanned host: the scan-cycle scheduler, the
// job runner that turns ticks into advisory pulls, the batching reporter,
// and the agent loop that ties them to the package scanner.

pub mod agent;
pub mod reporter;
pub mod runner;
pub mod scheduler;

pub use agent::{Agent, AgentError};
pub use reporter::{ReportError, Reporter};
pub use runner::JobRunner;
pub use scheduler::{Scheduler, TickSignal};

/// Lifecycle misuse: each start/stop/terminate may happen exactly once, and
/// a second attempt is reported without corrupting state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    #[error("already started")]
    AlreadyStarted,
    #[error("not started")]
    NotStarted,
    #[error("already stopped")]
    AlreadyStopped,
}
