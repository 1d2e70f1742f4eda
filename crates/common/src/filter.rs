//! Package filter specs (`name` or `name@range`).

use std::fmt;
use std::str::FromStr;

use semver::{Version, VersionReq};

use crate::error::Error;

/// A user-supplied include/exclude filter over registry publications.
///
/// A bare `name` matches every version of that package; `name@range` also
/// requires the version to satisfy the semver range. Scoped package names
/// (`@scope/name`) are handled by splitting at the last `@`.
#[derive(Debug, Clone)]
pub struct PackageFilter {
    name: String,
    range: Option<VersionReq>,
}

impl PackageFilter {
    /// The package name this filter applies to.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether a (name, version) publication matches this filter.
    ///
    /// Versions that do not parse as semver never match a ranged filter.
    pub fn matches(&self, package_name: &str, version: &str) -> bool {
        if self.name != package_name {
            return false;
        }
        match &self.range {
            None => true,
            Some(req) => Version::parse(version)
                .map(|v| req.matches(&v))
                .unwrap_or(false),
        }
    }
}

impl FromStr for PackageFilter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let spec = s.trim();
        if spec.is_empty() {
            return Err(Error::InvalidFilterSpec {
                spec: s.to_string(),
                reason: "empty spec".to_string(),
            });
        }

        // The last '@' separates name from range, unless it is the leading
        // '@' of a scoped package name.
        match spec.rfind('@').filter(|idx| *idx > 0) {
            Some(idx) => {
                let (name, range) = (&spec[..idx], &spec[idx + 1..]);
                let req = VersionReq::parse(range).map_err(|e| Error::InvalidFilterSpec {
                    spec: s.to_string(),
                    reason: e.to_string(),
                })?;
                Ok(PackageFilter {
                    name: name.to_string(),
                    range: Some(req),
                })
            }
            None => Ok(PackageFilter {
                name: spec.to_string(),
                range: None,
            }),
        }
    }
}

impl fmt::Display for PackageFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.range {
            Some(req) => write!(f, "{}@{}", self.name, req),
            None => write!(f, "{}", self.name),
        }
    }
}
