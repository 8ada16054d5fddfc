pub mod advisory;
pub mod job;
pub mod package;
pub mod platform;

pub use advisory::{Advisory, Severity};
pub use job::{AdvisorySource, FetchError, Job, JobSink, JobWriter};
pub use package::{Package, VersionMatch};
pub use platform::Platform;
