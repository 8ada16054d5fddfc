use std::sync::Arc;
use std::time::Duration;

use patchwatch_scan::{PackageScanner, Presence};
use patchwatch_types::{Advisory, AdvisorySource, Platform};
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::reporter::{ReportError, Reporter};
use crate::runner::JobRunner;
use crate::scheduler::Scheduler;
use crate::LifecycleError;

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error("failed to install signal handler: {0}")]
    Signal(#[from] std::io::Error),
}

/// Top-level composition: scheduler → runner → scanner → reporter, wired to
/// OS signals for shutdown.
pub struct Agent {
    pub source: Arc<dyn AdvisorySource>,
    pub platform: Platform,
    pub scan_frequency: Duration,
    pub scanner: Arc<dyn PackageScanner>,
    pub reporter: Reporter,
    pub reporter_errors: mpsc::Receiver<ReportError>,
}

impl Agent {
    /// Run until the advisory stream ends or a shutdown signal (HUP, INT,
    /// TERM, QUIT) arrives, then stop every component and wait for each to
    /// acknowledge.
    pub async fn run(self) -> Result<(), AgentError> {
        let Agent {
            source,
            platform,
            scan_frequency,
            scanner,
            mut reporter,
            mut reporter_errors,
        } = self;

        let mut scheduler = Scheduler::new(scan_frequency);
        let ticks = scheduler.start()?;
        let (mut runner, mut stream) = JobRunner::spawn(source, platform, ticks);

        let mut hangup = signal(SignalKind::hangup())?;
        let mut interrupt = signal(SignalKind::interrupt())?;
        let mut terminate = signal(SignalKind::terminate())?;
        let mut quit = signal(SignalKind::quit())?;

        info!(platform = %platform, period_mins = scan_frequency.as_secs() / 60, "agent running");

        loop {
            tokio::select! {
                Some(advisory) = stream.advisories.recv() => {
                    if !is_resolved(scanner.as_ref(), &advisory).await {
                        debug!(advisory = %advisory, "reporting unresolved vulnerability");
                        if !reporter.submit(advisory).await {
                            warn!("reporter is gone; dropping finding");
                        }
                    }
                }
                Some(err) = stream.errors.recv() => {
                    error!(error = %err, "advisory stream error");
                }
                Some(err) = reporter_errors.recv() => {
                    error!(error = %err, "report delivery failed");
                }
                _ = &mut stream.terminal => {
                    warn!("advisory stream ended; shutting down");
                    break;
                }
                _ = hangup.recv() => { info!("received SIGHUP; shutting down"); break; }
                _ = interrupt.recv() => { info!("received SIGINT; shutting down"); break; }
                _ = terminate.recv() => { info!("received SIGTERM; shutting down"); break; }
                _ = quit.recv() => { info!("received SIGQUIT; shutting down"); break; }
            }
        }

        // Scheduler first so no new pulls begin, then the runner (cancelling
        // any in-flight pull), then the reporter.
        scheduler.stop().await?;
        runner.stop().await?;
        reporter.terminate().await?;
        info!("agent shut down cleanly");
        Ok(())
    }
}

/// Patching any one of the listed fix versions resolves the vulnerability;
/// an advisory is reported only when none of them is installed. A failed
/// scan counts as not-installed: being unable to prove installation must
/// not suppress the report.
async fn is_resolved(scanner: &dyn PackageScanner, advisory: &Advisory) -> bool {
    for package in &advisory.fixed_in_packages {
        match scanner.scan(package).await {
            Ok(Presence::Installed) => {
                debug!(advisory = %advisory.name, package = %package.name, "fix already installed");
                return true;
            }
            Ok(Presence::NotInstalled) => {}
            Err(err) => {
                warn!(error = %err, package = %package.name, "package scan failed");
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use patchwatch_scan::ScanError;
    use patchwatch_types::{Package, Severity};

    struct StubScanner {
        installed: Vec<Package>,
        fail: bool,
    }

    #[async_trait]
    impl PackageScanner for StubScanner {
        async fn scan(&self, package: &Package) -> Result<Presence, ScanError> {
            if self.fail {
                return Err(ScanError::Exec {
                    tool: "stub",
                    source: std::io::Error::other("exec failed"),
                });
            }
            if self.installed.contains(package) {
                Ok(Presence::Installed)
            } else {
                Ok(Presence::NotInstalled)
            }
        }
    }

    fn package(name: &str, version: &str) -> Package {
        Package {
            name: name.into(),
            version: version.into(),
        }
    }

    fn advisory_with_fixes(fixes: Vec<Package>) -> Advisory {
        Advisory {
            name: "testvuln".into(),
            affected_package_name: "testpackage".into(),
            affected_platform_name: "debian-8".into(),
            details_href: "website.com".into(),
            severity_rating: Severity::Low,
            fixed_in_packages: fixes,
        }
    }

    #[tokio::test]
    async fn any_installed_fix_resolves_the_advisory() {
        let scanner = StubScanner {
            installed: vec![package("testpackage", "1.2.3")],
            fail: false,
        };
        let advisory = advisory_with_fixes(vec![
            package("testpackage", "0.9.9"),
            package("testpackage", "1.2.3"),
        ]);
        assert!(is_resolved(&scanner, &advisory).await);
    }

    #[tokio::test]
    async fn no_installed_fix_means_report() {
        let scanner = StubScanner {
            installed: vec![],
            fail: false,
        };
        let advisory = advisory_with_fixes(vec![package("testpackage", "1.2.3")]);
        assert!(!is_resolved(&scanner, &advisory).await);
    }

    #[tokio::test]
    async fn scan_failures_fail_open() {
        let scanner = StubScanner {
            installed: vec![],
            fail: true,
        };
        let advisory = advisory_with_fixes(vec![package("testpackage", "1.2.3")]);
        assert!(
            !is_resolved(&scanner, &advisory).await,
            "a failed scan must not suppress the report"
        );
    }
}
