// src/repository/installed.rs

//! Installed package inventory
//!
//! The host's installed set, with every package's provides, requires,
//! conflicts and obsoletes, is read from the rpm database through the `rpm`
//! command-line tool.

use super::parsers::{Relation, RelationKind};
use super::snapshot::Package;
use crate::error::{Error, Result};
use crate::version::RpmVersion;
use std::process::Command;
use tracing::{debug, warn};

/// Query format: one `@` header line per package, then one line per relation
const QUERY_FORMAT: &str = concat!(
    "@|%{NAME}|%{EPOCH}|%{VERSION}|%{RELEASE}|%{ARCH}\\n",
    "[provides|%{PROVIDENAME}|%{PROVIDEFLAGS}|%{PROVIDEVERSION}\\n]",
    "[requires|%{REQUIRENAME}|%{REQUIREFLAGS}|%{REQUIREVERSION}\\n]",
    "[conflicts|%{CONFLICTNAME}|%{CONFLICTFLAGS}|%{CONFLICTVERSION}\\n]",
    "[obsoletes|%{OBSOLETENAME}|%{OBSOLETEFLAGS}|%{OBSOLETEVERSION}\\n]",
);

// rpmsenseFlags comparison bits
const RPMSENSE_LESS: u32 = 1 << 1;
const RPMSENSE_GREATER: u32 = 1 << 2;
const RPMSENSE_EQUAL: u32 = 1 << 3;

/// Source of the packages installed on the host
pub trait InstalledInventory {
    fn installed_packages(&self) -> Result<Vec<Package>>;
}

/// Reads the installed set from the rpm database
#[derive(Debug, Clone)]
pub struct RpmDb {
    program: String,
    root: Option<String>,
}

impl RpmDb {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            root: None,
        }
    }

    /// Query the rpm database of another root filesystem
    pub fn with_root(mut self, root: impl Into<String>) -> Self {
        self.root = Some(root.into());
        self
    }
}

impl Default for RpmDb {
    fn default() -> Self {
        Self::new("rpm")
    }
}

impl InstalledInventory for RpmDb {
    fn installed_packages(&self) -> Result<Vec<Package>> {
        debug!("Querying installed packages with {}", self.program);

        let mut command = Command::new(&self.program);
        if let Some(root) = &self.root {
            command.args(["--root", root]);
        }
        let output = command
            .args(["-qa", "--queryformat", QUERY_FORMAT])
            .output()
            .map_err(|e| Error::InitError(format!("Failed to run {}: {}. Is rpm installed?", self.program, e)))?;

        if !output.status.success() {
            return Err(Error::InitError(format!(
                "rpm -qa failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let packages = parse_query_output(&String::from_utf8_lossy(&output.stdout))?;
        debug!("Found {} installed packages", packages.len());
        Ok(packages)
    }
}

/// A fixed installed set, for callers that already know it
#[derive(Debug, Clone, Default)]
pub struct FixedInventory {
    packages: Vec<Package>,
}

impl FixedInventory {
    pub fn new(packages: Vec<Package>) -> Self {
        Self { packages }
    }
}

impl InstalledInventory for FixedInventory {
    fn installed_packages(&self) -> Result<Vec<Package>> {
        Ok(self.packages.clone())
    }
}

/// Parse the output of `rpm -qa` run with [`QUERY_FORMAT`]
pub fn parse_query_output(output: &str) -> Result<Vec<Package>> {
    let mut packages = Vec::new();
    let mut current: Option<Package> = None;

    for line in output.lines().filter(|l| !l.trim().is_empty()) {
        let fields: Vec<&str> = line.split('|').collect();

        if fields[0] == "@" {
            packages.extend(current.take());
            if fields.len() < 6 {
                return Err(Error::ParseError(format!("Malformed rpm header line: {}", line)));
            }
            let epoch = match fields[2] {
                "(none)" | "" => 0,
                e => e.parse::<u64>().map_err(|e| {
                    Error::ParseError(format!("Invalid epoch for {}: {}", fields[1], e))
                })?,
            };
            let evr = RpmVersion::from_parts(epoch, fields[3], Some(fields[4]));
            let arch = match fields[5] {
                "(none)" => None,
                arch => Some(arch.to_string()),
            };
            current = Some(Package::installed(fields[1], evr, arch));
            continue;
        }

        let Some(pkg) = current.take() else {
            return Err(Error::ParseError(format!("Relation before any package: {}", line)));
        };
        current = Some(match parse_relation(&fields) {
            Some(relation) => pkg.with_relation(&relation)?,
            None => pkg,
        });
    }

    packages.extend(current);
    Ok(packages)
}

fn parse_relation(fields: &[&str]) -> Option<Relation> {
    let [kind, name, flags, version] = fields else {
        warn!("Skipping malformed rpm relation line: {}", fields.join("|"));
        return None;
    };
    let kind = kind.parse::<RelationKind>().ok()?;

    // Same filtering as repository metadata: rpmlib, file and rich dependencies
    if name.starts_with("rpmlib(") || name.starts_with('/') || name.starts_with('(') {
        return None;
    }

    let flags = flags.parse::<u32>().unwrap_or(0);
    let op = match (
        flags & RPMSENSE_LESS != 0,
        flags & RPMSENSE_GREATER != 0,
        flags & RPMSENSE_EQUAL != 0,
    ) {
        (true, false, true) => Some("<="),
        (false, true, true) => Some(">="),
        (false, false, true) => Some("="),
        (true, false, false) => Some("<"),
        (false, true, false) => Some(">"),
        _ => None,
    };

    let constraint = match op {
        Some(op) if !version.is_empty() => Some(format!("{} {}", op, version)),
        _ => None,
    };
    Some(Relation::new(kind, name, constraint.as_deref()))
}
