use serde::{Deserialize, Serialize};

/// A software package that may be installed on a host. The version is an
/// opaque string; how it is compared is up to a [`VersionMatch`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Package {
    pub name: String,
    pub version: String,
}

/// How a fix version from an advisory is matched against an installed
/// version reported by the host package database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionMatch {
    /// The fix version is a prefix of the installed version.
    Prefix,
    /// The fix version is a suffix of the installed version.
    Suffix,
    /// The fix version is a regular expression matched against the installed
    /// version. An unparseable pattern matches nothing.
    Regex,
}

impl VersionMatch {
    pub fn matches(self, fix_version: &str, installed: &str) -> bool {
        match self {
            Self::Prefix => installed.starts_with(fix_version),
            Self::Suffix => installed.ends_with(fix_version),
            Self::Regex => {
                regex::Regex::new(fix_version).is_ok_and(|re| re.is_match(installed))
            }
        }
    }
}
