// src/repository/parsers/mod.rs

//! Repository metadata parsers
//!
//! Only the rpm-md format (repomd.xml + primary.xml) used by yum
//! repositories is supported.

pub mod rpmmd;

pub use crate::db::models::RelationKind;

/// Everything parsed out of one repository's metadata
#[derive(Debug, Clone, Default)]
pub struct RepositoryMetadata {
    /// Revision advertised by repomd.xml, if any
    pub revision: Option<String>,

    /// All package builds listed in primary.xml
    pub packages: Vec<PackageMetadata>,
}

/// Package metadata extracted from repository
#[derive(Debug, Clone)]
pub struct PackageMetadata {
    /// Package name
    pub name: String,

    /// Epoch (0 when absent)
    pub epoch: u64,

    /// Upstream version, without epoch or release ("3.3.0.1")
    pub version: String,

    /// Release ("1.git.0.abc.el7")
    pub release: String,

    /// Architecture (x86_64, noarch, ...)
    pub architecture: Option<String>,

    /// Short package summary
    pub summary: Option<String>,

    /// Package checksum
    pub checksum: String,

    /// Checksum algorithm type
    pub checksum_type: ChecksumType,

    /// Compressed package size in bytes
    pub size: u64,

    /// Path of the package file relative to the repository root
    pub location: String,

    /// provides/requires/conflicts/obsoletes entries
    pub relations: Vec<Relation>,
}

/// One provides/requires/conflicts/obsoletes entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    /// Capability name
    pub name: String,

    /// Version constraint (e.g., ">= 1.0", "= 2:2.3.4-1.el7")
    pub constraint: Option<String>,

    pub kind: RelationKind,
}

/// Checksum algorithm type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChecksumType {
    Sha256,
    Sha512,
    /// Recognised by name only; never verified
    Other(String),
}

impl ChecksumType {
    pub fn from_name(name: &str) -> Self {
        match name {
            "sha256" => ChecksumType::Sha256,
            "sha512" => ChecksumType::Sha512,
            other => ChecksumType::Other(other.to_string()),
        }
    }
}

impl PackageMetadata {
    /// Create minimal package metadata for testing
    pub fn new(name: &str, version: &str, release: &str) -> Self {
        Self {
            name: name.to_string(),
            epoch: 0,
            version: version.to_string(),
            release: release.to_string(),
            architecture: Some("x86_64".to_string()),
            summary: None,
            checksum: String::new(),
            checksum_type: ChecksumType::Sha256,
            size: 0,
            location: format!("Packages/{}-{}-{}.rpm", name, version, release),
            relations: Vec::new(),
        }
    }

    /// Relations of one kind
    pub fn relations_of(&self, kind: RelationKind) -> impl Iterator<Item = &Relation> {
        self.relations.iter().filter(move |r| r.kind == kind)
    }
}

impl Relation {
    pub fn new(kind: RelationKind, name: &str, constraint: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            constraint: constraint.map(str::to_string),
            kind,
        }
    }
}
