// src/checks/consistency.rs

//! Version consistency analysis
//!
//! Answers two questions about a set of expected packages: is each one
//! available at the requested version, and is exactly one x.y minor line of
//! each one offered by the enabled repositories?

use crate::error::{Error, Result};
use crate::repository::snapshot::RepositorySnapshot;
use crate::version::{minor_version, precision, strip_version_prefix, truncate_fields};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Package name to the set of minor versions it is available in
pub type NameVersionIndex = BTreeMap<String, BTreeSet<String>>;

/// Names available at the requested version
pub type PreciseMatchSet = BTreeSet<String>;

/// What the analysis saw, for callers that want more than pass/fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsistencyReport {
    /// Requested version with any leading "v" removed
    pub requested: String,
    /// Number of dot-delimited fields compared
    pub precision: usize,
    pub precise_matches: PreciseMatchSet,
    pub minor_versions: NameVersionIndex,
}

/// Check that every expected package is available at `requested_version`
/// and in exactly one minor version
///
/// Packages that are not expected are ignored. Missing packages are
/// reported before ambiguous ones; both lists keep the order of `expected`.
pub fn analyze(
    snapshot: &RepositorySnapshot,
    expected: &[String],
    requested_version: &str,
) -> Result<ConsistencyReport> {
    let requested = strip_version_prefix(requested_version.trim()).to_string();
    let precision = precision(&requested);
    debug!(
        "Checking {} packages against version {} ({} fields)",
        expected.len(),
        requested,
        precision
    );

    let mut precise_matches = PreciseMatchSet::new();
    let mut minor_versions = NameVersionIndex::new();

    for record in snapshot.records() {
        if !expected.iter().any(|name| name == record.name) {
            continue;
        }

        if truncate_fields(record.version, precision) == requested {
            precise_matches.insert(record.name.to_string());
        }

        minor_versions
            .entry(record.name.to_string())
            .or_default()
            .insert(minor_version(record.version));
    }

    // Also covers nothing expected being available at all
    let not_found: Vec<String> = expected
        .iter()
        .filter(|name| !precise_matches.contains(name.as_str()))
        .cloned()
        .collect();
    if !not_found.is_empty() {
        return Err(Error::VersionNotAvailable {
            version: requested,
            packages: not_found,
        });
    }

    let multi_found: Vec<String> = expected
        .iter()
        .filter(|name| minor_versions.get(name.as_str()).is_some_and(|v| v.len() > 1))
        .cloned()
        .collect();
    if !multi_found.is_empty() {
        return Err(Error::AmbiguousMinorVersions(multi_found));
    }

    Ok(ConsistencyReport {
        requested,
        precision,
        precise_matches,
        minor_versions,
    })
}
