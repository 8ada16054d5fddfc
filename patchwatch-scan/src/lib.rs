// ---------------------------------------------------------------------------
// Host package scanners
// ---------------------------------------------------------------------------
//
// Each scanner answers one question: is this (name, version) installed on
// the local host? Implementations shell out to the platform's package tool;
// version comparison is delegated to the configured predicate.

mod dpkg;
mod homebrew;
mod null;
mod rpm;
mod traits;

pub use dpkg::Dpkg;
pub use homebrew::Homebrew;
pub use null::NullScanner;
pub use rpm::Rpm;
pub use traits::{PackageScanner, Presence, ScanError};

use patchwatch_types::{Platform, VersionMatch};

/// Pick the scanner implementation for a platform: dpkg for Debian/Ubuntu,
/// rpm for CentOS/Oracle. Platforms with no shell-out implementation get the
/// null scanner, which reports nothing installed — advisories for them are
/// reported rather than silently suppressed.
pub fn for_platform(platform: Platform, version_match: VersionMatch) -> Box<dyn PackageScanner> {
    if platform.is_debian_like() {
        Box::new(Dpkg::new(version_match))
    } else if platform.is_rpm_based() {
        Box::new(Rpm::new(version_match))
    } else {
        Box::new(NullScanner)
    }
}
