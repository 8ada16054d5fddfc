use async_trait::async_trait;
use patchwatch_types::{Package, VersionMatch};
use tokio::process::Command;
use tracing::debug;

use crate::traits::{PackageScanner, Presence, ScanError, find_package};

/// Scanner for rpm-managed hosts (CentOS, Oracle Linux).
pub struct Rpm {
    version_match: VersionMatch,
}

impl Rpm {
    pub fn new(version_match: VersionMatch) -> Self {
        Self { version_match }
    }
}

#[async_trait]
impl PackageScanner for Rpm {
    async fn scan(&self, package: &Package) -> Result<Presence, ScanError> {
        let output = Command::new("rpm")
            .args(["-qa", "--queryformat", "%{NAME} %{EVR}\\n"])
            .output()
            .await
            .map_err(|source| ScanError::Exec {
                tool: "rpm",
                source,
            })?;

        if !output.status.success() {
            return Err(ScanError::ToolFailed {
                tool: "rpm",
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        let installed = parse_rpm_output(&String::from_utf8_lossy(&output.stdout));
        debug!(package = %package.name, candidates = installed.len(), "rpm scan");
        Ok(find_package(package, &installed, self.version_match))
    }
}

/// Each line of the query output is `NAME EVR`; anything else is skipped.
fn parse_rpm_output(output: &str) -> Vec<Package> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let name = fields.next()?;
            let version = fields.next()?;
            Some(Package {
                name: name.to_string(),
                version: version.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_name_evr_pairs() {
        let output = "bash 4.2.46-35.el7_9\nopenssl-libs 1:1.0.2k-26.el7_9\n\n";
        let installed = parse_rpm_output(output);
        assert_eq!(installed.len(), 2);
        assert_eq!(installed[0].name, "bash");
        assert_eq!(installed[0].version, "4.2.46-35.el7_9");
        assert_eq!(installed[1].name, "openssl-libs");
        assert_eq!(installed[1].version, "1:1.0.2k-26.el7_9");
    }

    #[test]
    fn skips_short_lines() {
        assert!(parse_rpm_output("loneword\n\n").is_empty());
    }
}
