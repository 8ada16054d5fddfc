use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use patchwatch_types::Package;

use crate::traits::{PackageScanner, Presence, ScanError};

/// Homebrew installs every package version into its own cellar directory;
/// `{cellar}/{name}/{version}` existing as a directory means installed.
pub struct Homebrew {
    cellar: PathBuf,
}

impl Homebrew {
    pub fn new() -> Self {
        Self::with_cellar("/usr/local/Cellar")
    }

    pub fn with_cellar(path: impl Into<PathBuf>) -> Self {
        Self {
            cellar: path.into(),
        }
    }
}

impl Default for Homebrew {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PackageScanner for Homebrew {
    async fn scan(&self, package: &Package) -> Result<Presence, ScanError> {
        let path = self.cellar.join(&package.name).join(&package.version);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_dir() => Ok(Presence::Installed),
            Ok(_) => Ok(Presence::NotInstalled),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Presence::NotInstalled),
            Err(err) => Err(ScanError::Io(err)),
        }
    }
}
