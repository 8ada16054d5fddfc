use async_trait::async_trait;
use patchwatch_types::{Package, VersionMatch};

/// Whether a scan located the package on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Installed,
    NotInstalled,
}

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("failed to run {tool}: {source}")]
    Exec {
        tool: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("{tool} exited with {status}: {stderr}")]
    ToolFailed {
        tool: &'static str,
        status: std::process::ExitStatus,
        stderr: String,
    },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Trait all host package scanners must satisfy.
#[async_trait]
pub trait PackageScanner: Send + Sync {
    async fn scan(&self, package: &Package) -> Result<Presence, ScanError>;
}

/// A hit requires the installed name to contain the queried name and the
/// version predicate to accept the installed version.
pub(crate) fn find_package(
    wanted: &Package,
    installed: &[Package],
    version_match: VersionMatch,
) -> Presence {
    for candidate in installed {
        if candidate.name.contains(&wanted.name)
            && version_match.matches(&wanted.version, &candidate.version)
        {
            return Presence::Installed;
        }
    }
    Presence::NotInstalled
}
