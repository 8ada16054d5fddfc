use std::fmt;

use serde::{Deserialize, Serialize};

use crate::package::Package;

/// Severity of an advisory, as rated by the upstream database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Unknown,
    Negligible,
    Low,
    Medium,
    High,
    Critical,
    Urgent,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Negligible => write!(f, "negligible"),
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
            Self::Urgent => write!(f, "urgent"),
        }
    }
}

/// A normalized vulnerability advisory: one affected package on one platform,
/// with at least one known fix version.
///
/// Advisories with an empty fix set never leave the upstream fetcher, so
/// consumers may rely on `fixed_in_packages` being non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Advisory {
    pub name: String,
    pub affected_package_name: String,
    #[serde(rename = "affectedPlatform")]
    pub affected_platform_name: String,
    pub details_href: String,
    pub severity_rating: Severity,
    pub fixed_in_packages: Vec<Package>,
}

impl fmt::Display for Advisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} on {}, {})",
            self.name, self.affected_package_name, self.affected_platform_name, self.severity_rating
        )
    }
}
