use async_trait::async_trait;
use patchwatch_types::Package;

use crate::traits::{PackageScanner, Presence, ScanError};

/// A scanner that never finds anything. Used for platforms with no shell-out
/// implementation, so their advisories are reported rather than suppressed.
pub struct NullScanner;

#[async_trait]
impl PackageScanner for NullScanner {
    async fn scan(&self, _package: &Package) -> Result<Presence, ScanError> {
        Ok(Presence::NotInstalled)
    }
}
