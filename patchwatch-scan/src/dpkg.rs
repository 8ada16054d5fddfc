use async_trait::async_trait;
use patchwatch_types::{Package, VersionMatch};
use tokio::process::Command;
use tracing::debug;

use crate::traits::{PackageScanner, Presence, ScanError, find_package};

/// Scanner for dpkg-managed hosts (Debian, Ubuntu).
pub struct Dpkg {
    version_match: VersionMatch,
}

impl Dpkg {
    pub fn new(version_match: VersionMatch) -> Self {
        Self { version_match }
    }
}

#[async_trait]
impl PackageScanner for Dpkg {
    async fn scan(&self, package: &Package) -> Result<Presence, ScanError> {
        let output = Command::new("dpkg")
            .arg("-l")
            .arg(&package.name)
            .output()
            .await
            .map_err(|source| ScanError::Exec {
                tool: "dpkg",
                source,
            })?;

        if !output.status.success() {
            // dpkg exits 1 when the package is simply not installed.
            if output.status.code() == Some(1) {
                return Ok(Presence::NotInstalled);
            }
            return Err(ScanError::ToolFailed {
                tool: "dpkg",
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        let installed = parse_dpkg_output(&String::from_utf8_lossy(&output.stdout));
        debug!(package = %package.name, candidates = installed.len(), "dpkg scan");
        Ok(find_package(package, &installed, self.version_match))
    }
}

/// Pull (name, version) out of `dpkg -l` listing rows. Only rows in the
/// installed state (`ii`) count.
fn parse_dpkg_output(output: &str) -> Vec<Package> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            if fields.next()? != "ii" {
                return None;
            }
            let name = fields.next()?;
            let version = fields.next()?;
            Some(Package {
                name: name.to_string(),
                version: version.to_string(),
            })
        })
        .collect()
}
