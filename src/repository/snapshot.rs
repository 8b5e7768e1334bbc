// src/repository/snapshot.rs

//! In-memory view of the enabled repositories and the installed set
//!
//! A [`RepositorySnapshot`] is what the loader hands to the checks: every
//! available package build, every installed package, and the capabilities
//! each of them provides, requires, conflicts with and obsoletes.

use crate::db::models::{RelationEntry, RelationKind, RepositoryPackage};
use crate::error::{Error, Result};
use crate::repository::parsers::{PackageMetadata, Relation};
use crate::version::{RpmVersion, VersionConstraint};
use std::fmt;

/// Where a package in the snapshot comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    Installed,
    /// Available from the repository with this id
    Repository(String),
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Installed => write!(f, "@installed"),
            Origin::Repository(id) => write!(f, "{}", id),
        }
    }
}

/// A named capability with an optional version constraint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capability {
    pub name: String,
    pub constraint: VersionConstraint,
}

impl Capability {
    pub fn new(name: &str, constraint: Option<&str>) -> Result<Self> {
        let constraint = match constraint {
            Some(c) => VersionConstraint::parse(c).map_err(|e| {
                Error::ParseError(format!("Invalid constraint for capability {}: {}", name, e))
            })?,
            None => VersionConstraint::Any,
        };

        Ok(Self {
            name: name.to_string(),
            constraint,
        })
    }

    /// The version a provide advertises, if it pins one
    fn provided_version(&self) -> Option<&RpmVersion> {
        match &self.constraint {
            VersionConstraint::Exact(v)
            | VersionConstraint::GreaterThan(v)
            | VersionConstraint::GreaterOrEqual(v)
            | VersionConstraint::LessThan(v)
            | VersionConstraint::LessOrEqual(v)
            | VersionConstraint::NotEqual(v) => Some(v),
            VersionConstraint::Any | VersionConstraint::And(..) => None,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.constraint {
            VersionConstraint::Any => write!(f, "{}", self.name),
            ref constraint => write!(f, "{} {}", self.name, constraint),
        }
    }
}

/// One package build, available or installed
#[derive(Debug, Clone)]
pub struct Package {
    pub name: String,
    pub evr: RpmVersion,
    pub arch: Option<String>,
    pub origin: Origin,
    pub provides: Vec<Capability>,
    pub requires: Vec<Capability>,
    pub conflicts: Vec<Capability>,
    pub obsoletes: Vec<Capability>,
}

/// The (name, version) pair the version analysis works on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackageRecord<'a> {
    pub name: &'a str,
    /// Upstream version only, without epoch or release
    pub version: &'a str,
}

impl Package {
    fn new(name: &str, evr: RpmVersion, arch: Option<String>, origin: Origin) -> Self {
        Self {
            name: name.to_string(),
            evr,
            arch,
            origin,
            provides: Vec::new(),
            requires: Vec::new(),
            conflicts: Vec::new(),
            obsoletes: Vec::new(),
        }
    }

    /// Build from freshly parsed repository metadata
    pub fn from_metadata(meta: &PackageMetadata, repo_id: &str) -> Result<Self> {
        let evr = RpmVersion::from_parts(meta.epoch, &meta.version, Some(meta.release.as_str()));
        let mut pkg = Self::new(
            &meta.name,
            evr,
            meta.architecture.clone(),
            Origin::Repository(repo_id.to_string()),
        );
        for relation in &meta.relations {
            pkg.add_relation(relation.kind, &relation.name, relation.constraint.as_deref())?;
        }
        Ok(pkg)
    }

    /// Build from a cached repository row and its relations
    pub fn from_cached(row: &RepositoryPackage, relations: &[RelationEntry], repo_id: &str) -> Result<Self> {
        let evr = RpmVersion::from_parts(epoch_of(row.epoch, &row.name)?, &row.version, Some(row.release.as_str()));
        let mut pkg = Self::new(
            &row.name,
            evr,
            row.architecture.clone(),
            Origin::Repository(repo_id.to_string()),
        );
        pkg.add_relation_entries(relations)?;
        Ok(pkg)
    }

    /// An installed package without relations; add them with [`Package::with_relation`]
    pub fn installed(name: &str, evr: RpmVersion, arch: Option<String>) -> Self {
        Self::new(name, evr, arch, Origin::Installed)
    }

    fn add_relation_entries(&mut self, relations: &[RelationEntry]) -> Result<()> {
        for entry in relations {
            self.add_relation(entry.kind, &entry.name, entry.version_constraint.as_deref())?;
        }
        Ok(())
    }

    fn add_relation(&mut self, kind: RelationKind, name: &str, constraint: Option<&str>) -> Result<()> {
        let capability = Capability::new(name, constraint)?;
        match kind {
            RelationKind::Provides => self.provides.push(capability),
            RelationKind::Requires => self.requires.push(capability),
            RelationKind::Conflicts => self.conflicts.push(capability),
            RelationKind::Obsoletes => self.obsoletes.push(capability),
        }
        Ok(())
    }

    /// Attach a relation, for building packages by hand
    pub fn with_relation(mut self, relation: &Relation) -> Result<Self> {
        self.add_relation(relation.kind, &relation.name, relation.constraint.as_deref())?;
        Ok(self)
    }

    /// name-[epoch:]version-release.arch
    pub fn nevra(&self) -> String {
        match &self.arch {
            Some(arch) => format!("{}-{}.{}", self.name, self.evr, arch),
            None => format!("{}-{}", self.name, self.evr),
        }
    }

    pub fn record(&self) -> PackageRecord<'_> {
        PackageRecord {
            name: &self.name,
            version: &self.evr.version,
        }
    }

    pub fn is_installed(&self) -> bool {
        self.origin == Origin::Installed
    }

    /// Does this package satisfy `wanted`?
    ///
    /// Every package implicitly provides `name = EVR`. An explicit provide
    /// without a version satisfies any constraint on that name.
    pub fn provides_capability(&self, wanted: &Capability) -> bool {
        if self.name == wanted.name && wanted.constraint.satisfies(&self.evr) {
            return true;
        }

        self.provides
            .iter()
            .filter(|p| p.name == wanted.name)
            .any(|p| match p.provided_version() {
                Some(version) => wanted.constraint.satisfies(version),
                None => true,
            })
    }

    /// Does one of this package's obsoletes match `other`?
    pub fn obsoletes_package(&self, other: &Package) -> bool {
        self.obsoletes
            .iter()
            .any(|o| o.name == other.name && o.constraint.satisfies(&other.evr))
    }
}

fn epoch_of(epoch: i64, name: &str) -> Result<u64> {
    u64::try_from(epoch)
        .map_err(|_| Error::ParseError(format!("Negative epoch {} for package {}", epoch, name)))
}

/// Everything loaded from the enabled repositories plus the installed set
#[derive(Debug, Clone, Default)]
pub struct RepositorySnapshot {
    /// Ids of the repositories that contributed packages
    pub repositories: Vec<String>,
    pub available: Vec<Package>,
    pub installed: Vec<Package>,
}

impl RepositorySnapshot {
    pub fn new(repositories: Vec<String>, available: Vec<Package>, installed: Vec<Package>) -> Self {
        Self {
            repositories,
            available,
            installed,
        }
    }

    /// (name, version) of every available package build
    pub fn records(&self) -> impl Iterator<Item = PackageRecord<'_>> {
        self.available.iter().map(Package::record)
    }

    /// Indices of available builds named `name`
    pub fn available_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = usize> + 'a {
        self.available
            .iter()
            .enumerate()
            .filter(move |(_, p)| p.name == name)
            .map(|(i, _)| i)
    }

    /// Indices of installed packages named `name`
    pub fn installed_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = usize> + 'a {
        self.installed
            .iter()
            .enumerate()
            .filter(move |(_, p)| p.name == name)
            .map(|(i, _)| i)
    }

    /// Highest available build of `name`
    pub fn best_available(&self, name: &str) -> Option<usize> {
        self.available_named(name)
            .max_by(|&a, &b| self.available[a].evr.cmp(&self.available[b].evr))
    }

    /// Highest installed version of `name`
    pub fn newest_installed(&self, name: &str) -> Option<usize> {
        self.installed_named(name)
            .max_by(|&a, &b| self.installed[a].evr.cmp(&self.installed[b].evr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn available(name: &str, evr: &str) -> Package {
        let mut meta = PackageMetadata::new(name, "0", "0");
        let evr = RpmVersion::parse(evr).unwrap();
        meta.epoch = evr.epoch;
        meta.version = evr.version;
        meta.release = evr.release.unwrap_or_default();
        Package::from_metadata(&meta, "base").unwrap()
    }

    #[test]
    fn test_implicit_name_provide() {
        let pkg = available("docker", "2:1.10.3-46.el7");
        assert!(pkg.provides_capability(&Capability::new("docker", Some(">= 2:1.10")).unwrap()));
        assert!(pkg.provides_capability(&Capability::new("docker", None).unwrap()));
        assert!(!pkg.provides_capability(&Capability::new("docker", Some(">= 2:1.12")).unwrap()));
        assert!(!pkg.provides_capability(&Capability::new("podman", None).unwrap()));
    }

    #[test]
    fn test_explicit_provides() {
        let pkg = available("docker", "2:1.10.3-46.el7")
            .with_relation(&Relation::new(RelationKind::Provides, "docker-engine", None))
            .unwrap()
            .with_relation(&Relation::new(RelationKind::Provides, "docker-api", Some("= 1.22")))
            .unwrap();

        // Unversioned provides satisfy any version
        assert!(pkg.provides_capability(&Capability::new("docker-engine", Some(">= 99")).unwrap()));
        assert!(pkg.provides_capability(&Capability::new("docker-api", Some(">= 1.20")).unwrap()));
        assert!(!pkg.provides_capability(&Capability::new("docker-api", Some("> 1.22")).unwrap()));
    }

    #[test]
    fn test_obsoletes_package() {
        let new = available("atomic-openshift", "3.3.0.1-1.el7")
            .with_relation(&Relation::new(RelationKind::Obsoletes, "openshift", Some("< 3.0")))
            .unwrap();

        assert!(new.obsoletes_package(&available("openshift", "2.9-1")));
        assert!(!new.obsoletes_package(&available("openshift", "3.1-1")));
    }

    #[test]
    fn test_nevra_and_capability_display() {
        let pkg = available("docker", "2:1.10.3-46.el7");
        assert_eq!(pkg.nevra(), "docker-2:1.10.3-46.el7.x86_64");
        assert_eq!(Capability::new("docker", Some(">= 1.10")).unwrap().to_string(), "docker >= 1.10");
        assert_eq!(Capability::new("docker", None).unwrap().to_string(), "docker");
        assert_eq!(Origin::Installed.to_string(), "@installed");
    }

    #[test]
    fn test_snapshot_lookups() {
        let snapshot = RepositorySnapshot::new(
            vec!["base".to_string()],
            vec![
                available("atomic-openshift", "3.3.0.1-1.el7"),
                available("atomic-openshift", "3.3.1.3-1.el7"),
                available("docker", "2:1.10.3-46.el7"),
            ],
            Vec::new(),
        );

        let best = snapshot.best_available("atomic-openshift").unwrap();
        assert_eq!(snapshot.available[best].evr.version, "3.3.1.3");
        assert!(snapshot.best_available("foo").is_none());
        assert!(snapshot.newest_installed("docker").is_none());

        let records: Vec<_> = snapshot.records().collect();
        assert_eq!(records.len(), 3);
        assert_eq!(records[2], PackageRecord { name: "docker", version: "1.10.3" });
    }
}
