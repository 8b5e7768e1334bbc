// src/version/mod.rs

//! Version handling and constraint satisfaction for RPM capabilities
//!
//! This module provides parsing and rpmvercmp-style comparison for
//! epoch:version-release strings, the version constraints carried by
//! provides/requires entries, and the field-precision helpers used when a
//! caller asks for a version like "3.3" rather than a full build.

use crate::error::{Error, Result};
use std::cmp::Ordering;
use std::fmt;

/// A parsed RPM version with epoch, version, and release components
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RpmVersion {
    pub epoch: u64,
    pub version: String,
    pub release: Option<String>,
}

impl RpmVersion {
    /// Parse an RPM version string
    ///
    /// Format: [epoch:]version[-release]
    /// Examples:
    /// - "1.2.3" → epoch=0, version="1.2.3", release=None
    /// - "2:1.2.3" → epoch=2, version="1.2.3", release=None
    /// - "3.3.0.1-1.git.0.abc.el7" → epoch=0, version="3.3.0.1", release=Some("1.git.0.abc.el7")
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let (epoch_str, rest) = match s.split_once(':') {
            Some((e, r)) => (e, r),
            None => ("0", s),
        };

        let epoch = if epoch_str.is_empty() {
            0
        } else {
            epoch_str.parse::<u64>().map_err(|e| {
                Error::ParseError(format!("Invalid epoch in version '{}': {}", s, e))
            })?
        };

        // Release is everything after the last dash; versions never contain one
        let (version, release) = match rest.rsplit_once('-') {
            Some((v, r)) => (v.to_string(), Some(r.to_string())),
            None => (rest.to_string(), None),
        };

        if version.is_empty() {
            return Err(Error::ParseError(format!(
                "Empty version component in '{}'",
                s
            )));
        }

        Ok(Self {
            epoch,
            version,
            release,
        })
    }

    /// Build a version from separate rpm-md fields
    pub fn from_parts(epoch: u64, version: &str, release: Option<&str>) -> Self {
        Self {
            epoch,
            version: version.to_string(),
            release: release.filter(|r| !r.is_empty()).map(str::to_string),
        }
    }

    /// Compare two RPM versions
    pub fn compare(&self, other: &RpmVersion) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| rpmvercmp(&self.version, &other.version))
            .then_with(|| match (&self.release, &other.release) {
                (Some(a), Some(b)) => rpmvercmp(a, b),
                (a, b) => a.is_some().cmp(&b.is_some()),
            })
    }

    /// Compare against a constraint's version
    ///
    /// When the constraint omits the release, only epoch and version take
    /// part, so `foo >= 1.2` is met by every 1.2 build.
    fn compare_to_bound(&self, bound: &RpmVersion) -> Ordering {
        let ord = self
            .epoch
            .cmp(&bound.epoch)
            .then_with(|| rpmvercmp(&self.version, &bound.version));

        match (&self.release, &bound.release) {
            (_, None) => ord,
            (Some(a), Some(b)) => ord.then_with(|| rpmvercmp(a, b)),
            (None, Some(_)) => ord,
        }
    }
}

impl fmt::Display for RpmVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.epoch > 0 {
            write!(f, "{}:", self.epoch)?;
        }
        write!(f, "{}", self.version)?;
        if let Some(ref release) = self.release {
            write!(f, "-{}", release)?;
        }
        Ok(())
    }
}

impl Ord for RpmVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
    }
}

impl PartialOrd for RpmVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Compare two version or release strings segment by segment
///
/// Follows rpm's rules: alphanumeric runs are compared in order, numeric
/// runs numerically and newer than alphabetic ones, and a tilde sorts
/// before everything including the end of the string.
pub fn rpmvercmp(a: &str, b: &str) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }

    let mut one = a.as_bytes();
    let mut two = b.as_bytes();

    loop {
        one = trim_separators(one);
        two = trim_separators(two);

        // Tilde sorts before anything else
        match (one.first() == Some(&b'~'), two.first() == Some(&b'~')) {
            (true, true) => {
                one = &one[1..];
                two = &two[1..];
                continue;
            }
            (true, false) => return Ordering::Less,
            (false, true) => return Ordering::Greater,
            (false, false) => {}
        }

        if one.is_empty() || two.is_empty() {
            break;
        }

        let numeric = one[0].is_ascii_digit();
        let seg_one = take_segment(one, numeric);
        let seg_two = take_segment(two, numeric);
        one = &one[seg_one.len()..];
        two = &two[seg_two.len()..];

        // Segment types differ: numeric is newer than alpha
        if seg_two.is_empty() {
            return if numeric { Ordering::Greater } else { Ordering::Less };
        }

        let ord = if numeric {
            let a = strip_leading_zeros(seg_one);
            let b = strip_leading_zeros(seg_two);
            a.len().cmp(&b.len()).then_with(|| a.cmp(b))
        } else {
            seg_one.cmp(seg_two)
        };

        if ord != Ordering::Equal {
            return ord;
        }
    }

    match (one.is_empty(), two.is_empty()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        _ => Ordering::Greater,
    }
}

fn trim_separators(s: &[u8]) -> &[u8] {
    let skip = s
        .iter()
        .take_while(|c| !c.is_ascii_alphanumeric() && **c != b'~')
        .count();
    &s[skip..]
}

fn take_segment(s: &[u8], numeric: bool) -> &[u8] {
    let len = s
        .iter()
        .take_while(|c| {
            if numeric {
                c.is_ascii_digit()
            } else {
                c.is_ascii_alphabetic()
            }
        })
        .count();
    &s[..len]
}

fn strip_leading_zeros(s: &[u8]) -> &[u8] {
    let skip = s.iter().take_while(|c| **c == b'0').count();
    &s[skip..]
}

/// Version constraint operators
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionConstraint {
    /// Any version is acceptable
    Any,
    /// Exact version match
    Exact(RpmVersion),
    /// Greater than
    GreaterThan(RpmVersion),
    /// Greater than or equal
    GreaterOrEqual(RpmVersion),
    /// Less than
    LessThan(RpmVersion),
    /// Less than or equal
    LessOrEqual(RpmVersion),
    /// Not equal
    NotEqual(RpmVersion),
    /// Both constraints must be satisfied (for ranges like ">= 1.0, < 2.0")
    And(Box<VersionConstraint>, Box<VersionConstraint>),
}

impl VersionConstraint {
    /// Parse a version constraint string
    ///
    /// Examples:
    /// - ">= 1.2.3" → GreaterOrEqual(1.2.3)
    /// - "< 2.0.0" → LessThan(2.0.0)
    /// - "= 1.5.0" → Exact(1.5.0)
    /// - "> 1.0" → GreaterThan(1.0)
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();

        if s.is_empty() || s == "*" {
            return Ok(VersionConstraint::Any);
        }

        if let Some((left, right)) = s.split_once(',') {
            let left = Self::parse(left)?;
            let right = Self::parse(right)?;
            return Ok(VersionConstraint::And(Box::new(left), Box::new(right)));
        }

        if let Some(rest) = s.strip_prefix(">=") {
            Ok(VersionConstraint::GreaterOrEqual(RpmVersion::parse(rest)?))
        } else if let Some(rest) = s.strip_prefix("<=") {
            Ok(VersionConstraint::LessOrEqual(RpmVersion::parse(rest)?))
        } else if let Some(rest) = s.strip_prefix("!=") {
            Ok(VersionConstraint::NotEqual(RpmVersion::parse(rest)?))
        } else if let Some(rest) = s.strip_prefix('>') {
            Ok(VersionConstraint::GreaterThan(RpmVersion::parse(rest)?))
        } else if let Some(rest) = s.strip_prefix('<') {
            Ok(VersionConstraint::LessThan(RpmVersion::parse(rest)?))
        } else if let Some(rest) = s.strip_prefix('=') {
            Ok(VersionConstraint::Exact(RpmVersion::parse(rest)?))
        } else {
            // No operator means exact match
            Ok(VersionConstraint::Exact(RpmVersion::parse(s)?))
        }
    }

    /// Build a constraint from rpm-md `flags` and the bound it applies to
    pub fn from_rpm_flags(flags: &str, version: RpmVersion) -> Result<Self> {
        match flags {
            "EQ" => Ok(VersionConstraint::Exact(version)),
            "LT" => Ok(VersionConstraint::LessThan(version)),
            "LE" => Ok(VersionConstraint::LessOrEqual(version)),
            "GT" => Ok(VersionConstraint::GreaterThan(version)),
            "GE" => Ok(VersionConstraint::GreaterOrEqual(version)),
            other => Err(Error::ParseError(format!(
                "Unknown dependency flags '{}'",
                other
            ))),
        }
    }

    /// Check if a version satisfies this constraint
    pub fn satisfies(&self, version: &RpmVersion) -> bool {
        match self {
            VersionConstraint::Any => true,
            VersionConstraint::Exact(v) => version.compare_to_bound(v) == Ordering::Equal,
            VersionConstraint::GreaterThan(v) => version.compare_to_bound(v) == Ordering::Greater,
            VersionConstraint::GreaterOrEqual(v) => version.compare_to_bound(v) != Ordering::Less,
            VersionConstraint::LessThan(v) => version.compare_to_bound(v) == Ordering::Less,
            VersionConstraint::LessOrEqual(v) => version.compare_to_bound(v) != Ordering::Greater,
            VersionConstraint::NotEqual(v) => version.compare_to_bound(v) != Ordering::Equal,
            VersionConstraint::And(left, right) => {
                left.satisfies(version) && right.satisfies(version)
            }
        }
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionConstraint::Any => write!(f, "*"),
            VersionConstraint::Exact(v) => write!(f, "= {}", v),
            VersionConstraint::GreaterThan(v) => write!(f, "> {}", v),
            VersionConstraint::GreaterOrEqual(v) => write!(f, ">= {}", v),
            VersionConstraint::LessThan(v) => write!(f, "< {}", v),
            VersionConstraint::LessOrEqual(v) => write!(f, "<= {}", v),
            VersionConstraint::NotEqual(v) => write!(f, "!= {}", v),
            VersionConstraint::And(left, right) => write!(f, "{}, {}", left, right),
        }
    }
}

/// Remove a leading "v" marker ("v3.3" → "3.3")
pub fn strip_version_prefix(version: &str) -> &str {
    version.strip_prefix('v').unwrap_or(version)
}

/// Number of dot-delimited fields a requested version cares about
pub fn precision(requested: &str) -> usize {
    requested.matches('.').count() + 1
}

/// Keep only the first `fields` dot-delimited fields of a version
pub fn truncate_fields(version: &str, fields: usize) -> String {
    version.split('.').take(fields).collect::<Vec<_>>().join(".")
}

/// The x.y minor version line of a version string
pub fn minor_version(version: &str) -> String {
    truncate_fields(version, 2)
}
