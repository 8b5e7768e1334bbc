// src/repository/mod.rs

//! Repository access and metadata cache maintenance
//!
//! This module provides functionality for:
//! - Fetching repository files over http(s) or from `file://` URLs
//! - Trying each configured mirror of a repository in order
//! - Refreshing the SQLite metadata cache (`makecache`)
//! - Deciding whether cached metadata is still fresh
//! - Reading the host's installed packages from the rpm database

pub mod installed;
pub mod loader;
pub mod parsers;
pub mod snapshot;

use crate::config::RepoDefinition;
use crate::db;
use crate::db::models::{CachedRepository, RelationEntry, RepositoryPackage};
use crate::error::{Error, Result};
use parsers::RepositoryMetadata;
use reqwest::blocking::Client;
use rusqlite::Connection;
use std::fs;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Blocking client for repository files
///
/// Each request is attempted once. No timeout is configured on the client,
/// so a stalled mirror blocks until the transport gives up.
pub struct RepositoryClient {
    client: Client,
}

impl RepositoryClient {
    /// Create a new repository client
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(None::<Duration>)
            .build()
            .map_err(|e| Error::InitError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    /// Fetch the body of `url`
    ///
    /// Every transport failure (connection error, non-success status,
    /// missing local file) is reported as `DownloadError`.
    pub fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let parsed = Url::parse(url)
            .map_err(|e| Error::DownloadError(format!("Invalid URL {}: {}", url, e)))?;

        if parsed.scheme() == "file" {
            let path = parsed
                .to_file_path()
                .map_err(|_| Error::DownloadError(format!("Invalid file URL {}", url)))?;
            return fs::read(&path).map_err(|e| {
                Error::DownloadError(format!("Failed to read {}: {}", path.display(), e))
            });
        }

        let response = self
            .client
            .get(parsed)
            .send()
            .map_err(|e| Error::DownloadError(format!("Failed to download {}: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(Error::DownloadError(format!(
                "Failed to download {}: HTTP {}",
                url,
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .map_err(|e| Error::DownloadError(format!("Failed to read response from {}: {}", url, e)))?;
        Ok(bytes.to_vec())
    }
}

/// Join a repository base URL and a relative path
pub fn join_url(base: &str, relative: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), relative.trim_start_matches('/'))
}

/// Fetch a repository's metadata, trying each mirror once in order
///
/// Returns the mirror that answered together with the parsed metadata.
/// Only transport failures move on to the next mirror.
pub fn fetch_from_mirrors(
    client: &RepositoryClient,
    repo: &RepoDefinition,
) -> Result<(String, RepositoryMetadata)> {
    let mut last_error = None;

    for baseurl in &repo.baseurls {
        debug!("Trying mirror {} for repository {}", baseurl, repo.id);
        match parsers::rpmmd::fetch_metadata(client, baseurl) {
            Ok(metadata) => return Ok((baseurl.clone(), metadata)),
            Err(Error::DownloadError(msg)) => {
                warn!("Mirror {} of repository {} failed: {}", baseurl, repo.id, msg);
                last_error = Some(msg);
            }
            Err(e) => return Err(e),
        }
    }

    Err(Error::MirrorUnreachable(format!(
        "repository '{}': {}",
        repo.id,
        last_error.unwrap_or_else(|| "no mirrors configured".to_string())
    )))
}

/// Result of a `makecache` run
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MakecacheSummary {
    pub refreshed: Vec<String>,
    pub skipped: Vec<String>,
}

impl MakecacheSummary {
    pub fn changed(&self) -> bool {
        !self.refreshed.is_empty()
    }
}

/// Refresh the cached metadata of every enabled repository
///
/// Repositories whose cache is still fresh are skipped unless `force` is set.
pub fn makecache(
    conn: &mut Connection,
    repos: &[RepoDefinition],
    force: bool,
) -> Result<MakecacheSummary> {
    let client = RepositoryClient::new()?;
    let mut summary = MakecacheSummary::default();

    for repo in repos.iter().filter(|r| r.enabled) {
        let cached = CachedRepository::find_by_repo_id(conn, &repo.id)?;
        let fresh = cached
            .as_ref()
            .is_some_and(|c| repo.baseurls.contains(&c.baseurl) && !needs_sync(c, repo.metadata_expire));

        if fresh && !force {
            debug!("Metadata for {} is still fresh", repo.id);
            summary.skipped.push(repo.id.clone());
            continue;
        }

        sync_repository(conn, &client, repo)?;
        summary.refreshed.push(repo.id.clone());
    }

    Ok(summary)
}

/// Synchronize one repository's metadata into the cache
///
/// Metadata is fetched first; the cached rows are then replaced inside a
/// single transaction.
pub fn sync_repository(
    conn: &mut Connection,
    client: &RepositoryClient,
    repo: &RepoDefinition,
) -> Result<usize> {
    info!("Synchronizing repository: {}", repo.id);
    let (mirror, metadata) = fetch_from_mirrors(client, repo)?;
    store_metadata(conn, repo, &mirror, &metadata)
}

/// Replace the cached rows of `repo` with `metadata`
pub fn store_metadata(
    conn: &mut Connection,
    repo: &RepoDefinition,
    mirror: &str,
    metadata: &RepositoryMetadata,
) -> Result<usize> {
    let count = db::transaction(conn, |tx| {
        let mut cached = match CachedRepository::find_by_repo_id(tx, &repo.id)? {
            Some(cached) => cached,
            None => {
                let mut cached =
                    CachedRepository::new(repo.id.clone(), repo.name.clone(), mirror.to_string());
                cached.insert(tx)?;
                cached
            }
        };
        let repository_id = cached.id.ok_or_else(|| {
            Error::InitError(format!("Repository {} has no database id", repo.id))
        })?;

        RepositoryPackage::delete_by_repository(tx, repository_id)?;

        for pkg in &metadata.packages {
            let mut row = RepositoryPackage {
                id: None,
                repository_id,
                name: pkg.name.clone(),
                epoch: pkg.epoch as i64,
                version: pkg.version.clone(),
                release: pkg.release.clone(),
                architecture: pkg.architecture.clone(),
                checksum: pkg.checksum.clone(),
                size: pkg.size as i64,
                location: pkg.location.clone(),
            };
            let package_id = row.insert(tx)?;

            for relation in &pkg.relations {
                RelationEntry::new(
                    package_id,
                    relation.kind,
                    relation.name.clone(),
                    relation.constraint.clone(),
                )
                .insert(tx)?;
            }
        }

        cached.name = repo.name.clone();
        cached.baseurl = mirror.to_string();
        cached.revision = metadata.revision.clone();
        cached.last_sync = Some(current_timestamp());
        cached.update(tx)?;

        Ok(metadata.packages.len())
    })?;

    info!("Synchronized {} packages from repository {}", count, repo.id);
    Ok(count)
}

/// Check if cached metadata is older than `metadata_expire` seconds
pub fn needs_sync(repo: &CachedRepository, metadata_expire: i64) -> bool {
    match &repo.last_sync {
        None => true,
        Some(last_sync) => match parse_timestamp(last_sync) {
            Ok(last_sync_time) => {
                let age_seconds = chrono::Utc::now().timestamp() - last_sync_time;
                age_seconds > metadata_expire
            }
            Err(_) => true, // If we can't parse timestamp, force sync
        },
    }
}

/// Get current timestamp as ISO 8601 string
fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Parse ISO 8601 timestamp to Unix seconds
fn parse_timestamp(timestamp: &str) -> Result<i64> {
    let dt = chrono::DateTime::parse_from_rfc3339(timestamp)
        .map_err(|e| Error::ParseError(format!("Invalid timestamp: {}", e)))?;
    Ok(dt.timestamp())
}
