// src/db/models.rs

//! Data models for preflight database entities
//!
//! This module defines Rust structs that correspond to database tables
//! and provides methods for creating, reading, updating, and deleting records.

use crate::error::{Error, Result};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::collections::HashMap;
use std::str::FromStr;

/// Kind of package relation carried by rpm metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationKind {
    Provides,
    Requires,
    Conflicts,
    Obsoletes,
}

impl RelationKind {
    pub fn as_str(&self) -> &str {
        match self {
            RelationKind::Provides => "provides",
            RelationKind::Requires => "requires",
            RelationKind::Conflicts => "conflicts",
            RelationKind::Obsoletes => "obsoletes",
        }
    }
}

impl FromStr for RelationKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "provides" => Ok(RelationKind::Provides),
            "requires" => Ok(RelationKind::Requires),
            "conflicts" => Ok(RelationKind::Conflicts),
            "obsoletes" => Ok(RelationKind::Obsoletes),
            _ => Err(format!("Invalid relation kind: {}", s)),
        }
    }
}

/// Cached state of one configured repository
#[derive(Debug, Clone)]
pub struct CachedRepository {
    pub id: Option<i64>,
    pub repo_id: String,
    pub name: String,
    /// Mirror the cached metadata was fetched from
    pub baseurl: String,
    pub revision: Option<String>,
    pub last_sync: Option<String>,
    pub created_at: Option<String>,
}

impl CachedRepository {
    /// Create a new, never-synced repository record
    pub fn new(repo_id: String, name: String, baseurl: String) -> Self {
        Self {
            id: None,
            repo_id,
            name,
            baseurl,
            revision: None,
            last_sync: None,
            created_at: None,
        }
    }

    /// Insert this repository into the database
    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        conn.execute(
            "INSERT INTO repositories (repo_id, name, baseurl, revision, last_sync)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                &self.repo_id,
                &self.name,
                &self.baseurl,
                &self.revision,
                &self.last_sync,
            ],
        )?;

        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    /// Find a repository by its configured id
    pub fn find_by_repo_id(conn: &Connection, repo_id: &str) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, repo_id, name, baseurl, revision, last_sync, created_at
             FROM repositories WHERE repo_id = ?1",
        )?;

        let repo = stmt.query_row([repo_id], Self::from_row).optional()?;

        Ok(repo)
    }

    /// List all cached repositories
    pub fn list_all(conn: &Connection) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, repo_id, name, baseurl, revision, last_sync, created_at
             FROM repositories ORDER BY repo_id",
        )?;

        let repos = stmt
            .query_map([], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(repos)
    }

    /// Update repository cache state
    pub fn update(&self, conn: &Connection) -> Result<()> {
        let id = self.id.ok_or_else(|| {
            Error::InitError("Cannot update repository without ID".to_string())
        })?;

        conn.execute(
            "UPDATE repositories SET repo_id = ?1, name = ?2, baseurl = ?3,
             revision = ?4, last_sync = ?5 WHERE id = ?6",
            params![
                &self.repo_id,
                &self.name,
                &self.baseurl,
                &self.revision,
                &self.last_sync,
                id,
            ],
        )?;

        Ok(())
    }

    /// Convert a database row to a CachedRepository
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            repo_id: row.get(1)?,
            name: row.get(2)?,
            baseurl: row.get(3)?,
            revision: row.get(4)?,
            last_sync: row.get(5)?,
            created_at: row.get(6)?,
        })
    }
}

/// RepositoryPackage represents a package build available from a repository
#[derive(Debug, Clone)]
pub struct RepositoryPackage {
    pub id: Option<i64>,
    pub repository_id: i64,
    pub name: String,
    pub epoch: i64,
    pub version: String,
    pub release: String,
    pub architecture: Option<String>,
    pub checksum: String,
    pub size: i64,
    pub location: String,
}

impl RepositoryPackage {
    /// Insert this repository package into the database
    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        conn.execute(
            "INSERT INTO repository_packages
             (repository_id, name, epoch, version, release, architecture, checksum, size, location)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                &self.repository_id,
                &self.name,
                &self.epoch,
                &self.version,
                &self.release,
                &self.architecture,
                &self.checksum,
                &self.size,
                &self.location,
            ],
        )?;

        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    /// Find repository packages by repository ID
    pub fn find_by_repository(conn: &Connection, repository_id: i64) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, repository_id, name, epoch, version, release, architecture,
                    checksum, size, location
             FROM repository_packages WHERE repository_id = ?1
             ORDER BY name, id",
        )?;

        let packages = stmt
            .query_map([repository_id], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(packages)
    }

    /// Delete all packages for a repository (used when refreshing)
    pub fn delete_by_repository(conn: &Connection, repository_id: i64) -> Result<()> {
        conn.execute(
            "DELETE FROM repository_packages WHERE repository_id = ?1",
            [repository_id],
        )?;
        Ok(())
    }

    /// Convert a database row to a RepositoryPackage
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            repository_id: row.get(1)?,
            name: row.get(2)?,
            epoch: row.get(3)?,
            version: row.get(4)?,
            release: row.get(5)?,
            architecture: row.get(6)?,
            checksum: row.get(7)?,
            size: row.get(8)?,
            location: row.get(9)?,
        })
    }
}

/// A provides/requires/conflicts/obsoletes row
#[derive(Debug, Clone)]
pub struct RelationEntry {
    pub id: Option<i64>,
    pub package_id: i64,
    pub kind: RelationKind,
    pub name: String,
    pub version_constraint: Option<String>,
}

impl RelationEntry {
    /// Create a new RelationEntry
    pub fn new(
        package_id: i64,
        kind: RelationKind,
        name: String,
        version_constraint: Option<String>,
    ) -> Self {
        Self {
            id: None,
            package_id,
            kind,
            name,
            version_constraint,
        }
    }

    /// Insert this relation
    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        conn.execute(
            "INSERT INTO repository_relations (package_id, kind, name, version_constraint)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                &self.package_id,
                self.kind.as_str(),
                &self.name,
                &self.version_constraint,
            ],
        )?;

        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    /// All relations of one repository's packages, grouped by package id
    pub fn find_by_repository(
        conn: &Connection,
        repository_id: i64,
    ) -> Result<HashMap<i64, Vec<Self>>> {
        let mut stmt = conn.prepare(
            "SELECT r.id, r.package_id, r.kind, r.name, r.version_constraint
             FROM repository_relations r
             JOIN repository_packages p ON p.id = r.package_id
             WHERE p.repository_id = ?1
             ORDER BY r.id",
        )?;

        let rows = stmt
            .query_map([repository_id], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(group_by_package(rows))
    }

    /// Convert a database row to a RelationEntry
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let kind_str: String = row.get(2)?;
        let kind = kind_str.parse::<RelationKind>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                2,
                rusqlite::types::Type::Text,
                Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
            )
        })?;

        Ok(Self {
            id: Some(row.get(0)?),
            package_id: row.get(1)?,
            kind,
            name: row.get(3)?,
            version_constraint: row.get(4)?,
        })
    }
}

fn group_by_package(rows: Vec<RelationEntry>) -> HashMap<i64, Vec<RelationEntry>> {
    let mut grouped: HashMap<i64, Vec<RelationEntry>> = HashMap::new();
    for row in rows {
        grouped.entry(row.package_id).or_default().push(row);
    }
    grouped
}
