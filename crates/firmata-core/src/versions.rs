//! Semantic versions of owlcms-firmata releases and installations.
//!
//! Installed versions live in directories named exactly after the version
//! (`1.4.2`, `2.0.0-rc3`). Parsing is delegated to the `semver` crate; the
//! ordering differs from plain semver precedence in one respect: pre-release
//! identifiers ending in digits compare their numeric suffix as a number, so
//! `rc2` sorts before `rc10`.

use crate::error::{FirmataError, Result};
use regex::Regex;
use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

/// Directory names that are treated as installed versions.
static VERSION_DIR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d+\.\d+\.\d+(?:-(?:rc|alpha|beta)(?:\d+)?)?$").unwrap()
});

/// A parsed owlcms-firmata version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AppVersion(semver::Version);

/// One dot-separated pre-release identifier, split for comparison.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum PreSegment {
    Numeric(u64),
    Tagged { label: String, number: Option<u64> },
}

impl PreSegment {
    fn parse(identifier: &str) -> Self {
        if !identifier.is_empty() && identifier.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(n) = identifier.parse() {
                return PreSegment::Numeric(n);
            }
        }

        let label = identifier.trim_end_matches(|c: char| c.is_ascii_digit());
        let digits = &identifier[label.len()..];
        match digits.parse() {
            Ok(n) if !label.is_empty() => PreSegment::Tagged {
                label: label.to_string(),
                number: Some(n),
            },
            _ => PreSegment::Tagged {
                label: identifier.to_string(),
                number: None,
            },
        }
    }
}

impl AppVersion {
    /// Parse a version string. A leading `v` (as used by some release tags)
    /// is accepted and dropped.
    pub fn parse(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let trimmed = trimmed
            .strip_prefix('v')
            .or_else(|| trimmed.strip_prefix('V'))
            .unwrap_or(trimmed);

        semver::Version::parse(trimmed)
            .map(AppVersion)
            .map_err(|_| FirmataError::InvalidVersion {
                version: s.to_string(),
            })
    }

    /// Parse a directory name, accepting only the installed-version pattern.
    pub fn from_dir_name(name: &str) -> Option<Self> {
        if !is_version_dir_name(name) {
            return None;
        }
        Self::parse(name).ok()
    }

    /// Whether this version carries a pre-release tag.
    pub fn is_prerelease(&self) -> bool {
        !self.0.pre.is_empty()
    }

    /// The pre-release tag, if any (`rc2`, `beta`).
    pub fn prerelease(&self) -> Option<&str> {
        if self.is_prerelease() {
            Some(self.0.pre.as_str())
        } else {
            None
        }
    }

    fn pre_segments(&self) -> Vec<PreSegment> {
        self.0.pre.as_str().split('.').map(PreSegment::parse).collect()
    }
}

impl Ord for AppVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let core = (self.0.major, self.0.minor, self.0.patch).cmp(&(
            other.0.major,
            other.0.minor,
            other.0.patch,
        ));
        if core != Ordering::Equal {
            return core;
        }

        let pre = match (self.is_prerelease(), other.is_prerelease()) {
            (false, false) => Ordering::Equal,
            (false, true) => Ordering::Greater,
            (true, false) => Ordering::Less,
            (true, true) => self.pre_segments().cmp(&other.pre_segments()),
        };

        // Fall back to semver precedence so the order stays consistent with Eq
        // (`rc01` vs `rc1`, build metadata).
        pre.then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for AppVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for AppVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for AppVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl FromStr for AppVersion {
    type Err = FirmataError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Whether a directory name looks like an installed version.
pub fn is_version_dir_name(name: &str) -> bool {
    VERSION_DIR_PATTERN.is_match(name)
}

/// Sort versions strictly newest first.
pub fn sort_newest_first(versions: &mut [AppVersion]) {
    versions.sort_by(|a, b| b.cmp(a));
}

/// Highest version without a pre-release tag.
pub fn latest_stable<'a>(versions: impl IntoIterator<Item = &'a AppVersion>) -> Option<AppVersion> {
    versions
        .into_iter()
        .filter(|v| !v.is_prerelease())
        .max()
        .cloned()
}

/// Highest version carrying a pre-release tag.
pub fn latest_prerelease<'a>(
    versions: impl IntoIterator<Item = &'a AppVersion>,
) -> Option<AppVersion> {
    versions
        .into_iter()
        .filter(|v| v.is_prerelease())
        .max()
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> AppVersion {
        AppVersion::parse(s).unwrap()
    }

    fn strings(versions: &[AppVersion]) -> Vec<String> {
        versions.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_dir_name_pattern() {
        for name in ["1.2.3", "10.0.0", "2.0.0-rc1", "2.0.0-beta", "2.0.0-alpha12"] {
            assert!(is_version_dir_name(name), "{} should match", name);
        }
        for name in [
            "v1.2.3",
            "1.2",
            "1.2.3-SNAPSHOT",
            "1.2.3-rc.1",
            "1.2.3+build",
            "java17",
            "logs",
            "1.2.3 ",
        ] {
            assert!(!is_version_dir_name(name), "{} should not match", name);
        }
    }

    #[test]
    fn test_release_ordering() {
        let mut versions = vec![v("1.2.0"), v("1.10.0"), v("2.0.0-rc1"), v("2.0.0")];
        sort_newest_first(&mut versions);
        assert_eq!(
            strings(&versions),
            vec!["2.0.0", "2.0.0-rc1", "1.10.0", "1.2.0"]
        );
    }

    #[test]
    fn test_prerelease_numeric_suffix() {
        assert!(v("2.0.0-rc2") < v("2.0.0-rc10"));
        assert!(v("2.0.0-rc") < v("2.0.0-rc1"));
        assert!(v("2.0.0-alpha3") < v("2.0.0-beta1"));
        assert!(v("2.0.0-beta9") < v("2.0.0-rc1"));
        assert!(v("2.0.0-rc10") < v("2.0.0"));
        assert!(v("1.9.9") < v("2.0.0-alpha"));
    }

    #[test]
    fn test_ordering_consistent_with_eq() {
        let a = v("1.0.0-rc01");
        let b = v("1.0.0-rc1");
        assert_ne!(a, b);
        assert_ne!(a.cmp(&b), Ordering::Equal);
        assert_eq!(a.cmp(&b), b.cmp(&a).reverse());
    }

    #[test]
    fn test_latest_lookups() {
        let versions = vec![v("1.0.0"), v("1.1.0-beta"), v("1.1.0")];
        assert_eq!(latest_stable(&versions).unwrap().to_string(), "1.1.0");
        assert_eq!(latest_prerelease(&versions).unwrap().to_string(), "1.1.0-beta");
        assert!(latest_prerelease(&[v("1.0.0")]).is_none());
        assert!(latest_stable(&[]).is_none());
    }

    #[test]
    fn test_tag_prefix_and_display() {
        assert_eq!(v("v2.3.4").to_string(), "2.3.4");
        assert_eq!(v(" 2.3.4-rc1 ").to_string(), "2.3.4-rc1");
        assert!(AppVersion::parse("not-a-version").is_err());
        assert!(AppVersion::parse("1.2").is_err());
    }

    #[test]
    fn test_from_dir_name_rejects_tags() {
        assert!(AppVersion::from_dir_name("v1.0.0").is_none());
        assert_eq!(
            AppVersion::from_dir_name("1.0.0-rc2").unwrap().prerelease(),
            Some("rc2")
        );
    }
}
