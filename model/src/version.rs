use crate::constants::{LATEST_VERSION_SENTINEL, SUPPORTED_VERSIONS};
use crate::error::{self, Result};
use serde_plain::{derive_deserialize_from_fromstr, derive_serialize_from_display};
use snafu::ensure;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Represents a parsed Kubernetes version. Examples of valid values when parsing:
/// - `v1.11`
/// - `1.11`
/// - `v1.11.5`
/// - `1.11.5`
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct K8sVersion {
    major: u8,
    minor: u8,
    patch: Option<u8>,
}

impl K8sVersion {
    pub const fn new(major: u8, minor: u8, patch: Option<u8>) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    pub fn major(&self) -> u8 {
        self.major
    }

    pub fn minor(&self) -> u8 {
        self.minor
    }

    /// Returns the major and minor versions without a v prefix (even if a patch value is present).
    /// Example: `1.11`.
    pub fn major_minor_without_v(&self) -> String {
        format!("{}.{}", self.major, self.minor)
    }

    /// Returns the version with a v prefix, including the patch value if it exists. Examples:
    /// `v1.11.5` when a patch value exists, or `v1.11` if the patch value is `None`.
    pub fn full_version_with_v(&self) -> String {
        if let Some(patch) = self.patch {
            format!("v{}.{}.{}", self.major, self.minor, patch)
        } else {
            format!("v{}.{}", self.major, self.minor)
        }
    }

    /// Returns `true` when this version is at least `major.minor`.
    pub fn at_least(&self, major: u8, minor: u8) -> bool {
        (self.major, self.minor) >= (major, minor)
    }

    pub fn parse<S: AsRef<str>>(s: S) -> std::result::Result<Self, String> {
        let original = s.as_ref();
        // skip the 'v' if present
        let no_v = original.strip_prefix('v').unwrap_or(original);
        let mut iter = no_v.split('.');
        let major = iter
            .next()
            .ok_or_else(|| {
                format!(
                    "Unable to find the major version number when parsing '{}' as a k8s version",
                    original
                )
            })?
            .parse::<u8>()
            .map_err(|e| {
                format!(
                    "Error when parsing the major version number of a k8s version: {}",
                    e
                )
            })?;
        let minor = iter
            .next()
            .ok_or_else(|| {
                format!(
                    "Unable to find the minor version number when parsing '{}' as a k8s version",
                    original
                )
            })?
            .parse::<u8>()
            .map_err(|e| {
                format!(
                    "Error when parsing the minor version number of a k8s version: {}",
                    e
                )
            })?;
        let patch = iter.next().and_then(|s| s.parse::<u8>().ok());
        Ok(Self {
            major,
            minor,
            patch,
        })
    }
}

impl Display for K8sVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.major_minor_without_v(), f)
    }
}

impl FromStr for K8sVersion {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        K8sVersion::parse(s)
    }
}

derive_serialize_from_display!(K8sVersion);
derive_deserialize_from_fromstr!(K8sVersion, "k8s version such as 1.11 or v1.11.5");

/// The version as requested by the user, before it is checked against the supported list.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RequestedVersion {
    Latest,
    Explicit(String),
}

impl RequestedVersion {
    pub fn new<S: AsRef<str>>(s: S) -> Self {
        let s = s.as_ref().trim();
        if s.is_empty() || s == LATEST_VERSION_SENTINEL {
            Self::Latest
        } else {
            Self::Explicit(s.to_string())
        }
    }
}

impl Default for RequestedVersion {
    fn default() -> Self {
        Self::Latest
    }
}

pub fn supported_versions() -> Vec<String> {
    SUPPORTED_VERSIONS.iter().map(|v| v.to_string()).collect()
}

pub fn latest_version() -> K8sVersion {
    // The supported list is a non-empty constant.
    SUPPORTED_VERSIONS
        .last()
        .and_then(|v| K8sVersion::parse(v).ok())
        .unwrap_or_default()
}

/// Resolves the requested version to a supported control plane version. `latest` becomes the
/// latest supported version; an explicit version must match one of the supported versions.
pub fn resolve_version(requested: &RequestedVersion) -> Result<K8sVersion> {
    match requested {
        RequestedVersion::Latest => Ok(latest_version()),
        RequestedVersion::Explicit(version) => {
            let parsed = K8sVersion::parse(version).ok();
            let supported = parsed
                .map(|v| SUPPORTED_VERSIONS.contains(&v.major_minor_without_v().as_str()))
                .unwrap_or(false);
            ensure!(
                supported,
                error::UnsupportedVersionSnafu {
                    version,
                    supported: supported_versions(),
                }
            );
            // `supported` is only true when parsing succeeded.
            Ok(parsed.unwrap_or_default())
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_as_from_str() {
        let v: K8sVersion = "v1.11.5".parse().unwrap();
        assert_eq!(v, K8sVersion::new(1, 11, Some(5)));
        assert!("one.eleven".parse::<K8sVersion>().is_err());
        let v: K8sVersion = serde_plain::from_str("1.10").unwrap();
        assert_eq!(v.to_string(), "1.10");
    }

    #[test]
    fn latest_resolves_to_last_supported() {
        let v = resolve_version(&RequestedVersion::new("latest")).unwrap();
        assert_eq!(v.to_string(), *SUPPORTED_VERSIONS.last().unwrap());
        let v = resolve_version(&RequestedVersion::new("")).unwrap();
        assert_eq!(v, latest_version());
    }

    #[test]
    fn explicit_supported_version() {
        let v = resolve_version(&RequestedVersion::new("1.10")).unwrap();
        assert_eq!(v, K8sVersion::new(1, 10, None));
        let v = resolve_version(&RequestedVersion::new("v1.11")).unwrap();
        assert_eq!(v.to_string(), "1.11");
    }

    #[test]
    fn unsupported_version_lists_supported_values() {
        let err = resolve_version(&RequestedVersion::new("1.9")).unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("invalid version, supported values: {}", SUPPORTED_VERSIONS.join(","))
        );
        assert!(resolve_version(&RequestedVersion::new("banana")).is_err());
    }

    #[test]
    fn parse_git_version() {
        let v = K8sVersion::parse("v1.27.3").unwrap();
        assert_eq!(v.full_version_with_v(), "v1.27.3");
        assert!(v.at_least(1, 10));
        let v = K8sVersion::parse("v1.9.0-eks-1").unwrap();
        assert!(!v.at_least(1, 10));
    }
}
