// src/repository/loader.rs

//! Repository metadata loader
//!
//! Builds a [`RepositorySnapshot`] from the configured repositories and the
//! host's installed packages. The cache database is optional and only ever
//! opened read-only; repositories without usable cached metadata are fetched
//! from their mirrors into memory.
//!
//! Every failure leaves this module as one of three errors:
//! `MirrorUnreachable`, `InvalidRepoConfig` or `UnknownRepoError`.

use super::installed::InstalledInventory;
use super::snapshot::{Package, RepositorySnapshot};
use super::{RepositoryClient, fetch_from_mirrors, needs_sync};
use crate::capture::capture_diagnostics;
use crate::config::{Config, RepoDefinition, RepoSection};
use crate::db;
use crate::db::models::{CachedRepository, RelationEntry, RepositoryPackage};
use crate::error::{Error, Result};
use rusqlite::Connection;
use std::path::Path;
use tracing::{debug, info};

/// Load the enabled repositories and the installed package set
///
/// With `cache_only`, usable cached metadata is always preferred and mirrors
/// are only contacted for repositories that were never cached.
pub fn load(
    config: &Config,
    cache_only: bool,
    inventory: &dyn InstalledInventory,
) -> Result<RepositorySnapshot> {
    load_snapshot(config, cache_only, inventory).map_err(classify)
}

/// [`load`] with its diagnostics captured and replayed at debug level
pub fn load_quietly(
    config: &Config,
    cache_only: bool,
    inventory: &dyn InstalledInventory,
) -> Result<RepositorySnapshot> {
    let (result, diagnostics) = capture_diagnostics(|| load(config, cache_only, inventory));
    for line in diagnostics {
        debug!(target: "preflight::loader", "{}", line);
    }
    result
}

fn classify(err: Error) -> Error {
    match err {
        e @ (Error::MirrorUnreachable(_) | Error::InvalidRepoConfig(_) | Error::UnknownRepoError(_)) => e,
        other => Error::UnknownRepoError(other.to_string()),
    }
}

/// Open the metadata cache if one exists
fn open_cache(db_path: &str) -> Result<Option<Connection>> {
    if !Path::new(db_path).exists() {
        info!("No metadata cache at {}, every repository is fetched from its mirrors", db_path);
        return Ok(None);
    }
    db::open_read_only(db_path).map(Some)
}

fn load_snapshot(
    config: &Config,
    cache_only: bool,
    inventory: &dyn InstalledInventory,
) -> Result<RepositorySnapshot> {
    let repos = RepoSection::validate_all(&config.repos)?;
    let conn = open_cache(&config.db_path)?;

    let mut repositories = Vec::new();
    let mut available = Vec::new();
    let mut to_fetch = Vec::new();

    for repo in repos.iter().filter(|r| r.enabled) {
        let cached = match &conn {
            Some(conn) => CachedRepository::find_by_repo_id(conn, &repo.id)?
                .filter(|cached| cache_usable(cached, repo, cache_only))
                .map(|cached| (conn, cached)),
            None => None,
        };

        match cached {
            Some((conn, cached)) => {
                debug!("Using cached metadata for {}", repo.id);
                available.extend(load_cached(conn, &cached, &repo.id)?);
                repositories.push(repo.id.clone());
            }
            None => to_fetch.push(repo),
        }
    }

    if !to_fetch.is_empty() {
        let client = RepositoryClient::new()?;
        for repo in to_fetch {
            let (mirror, metadata) = fetch_from_mirrors(&client, repo)?;
            debug!("Loaded {} from {}", repo.id, mirror);
            for meta in &metadata.packages {
                available.push(Package::from_metadata(meta, &repo.id)?);
            }
            repositories.push(repo.id.clone());
        }
    }

    let installed = inventory.installed_packages()?;

    info!(
        "Loaded {} available and {} installed packages from {} repositories",
        available.len(),
        installed.len(),
        repositories.len()
    );

    Ok(RepositorySnapshot::new(repositories, available, installed))
}

/// Cached metadata is usable when it was synced from a configured mirror
/// and, outside cache-only mode, is still fresh
fn cache_usable(cached: &CachedRepository, repo: &RepoDefinition, cache_only: bool) -> bool {
    cached.last_sync.is_some()
        && repo.baseurls.contains(&cached.baseurl)
        && (cache_only || !needs_sync(cached, repo.metadata_expire))
}

fn load_cached(conn: &Connection, cached: &CachedRepository, repo_id: &str) -> Result<Vec<Package>> {
    let Some(id) = cached.id else {
        return Ok(Vec::new());
    };

    let relations = RelationEntry::find_by_repository(conn, id)?;
    RepositoryPackage::find_by_repository(conn, id)?
        .iter()
        .map(|row| {
            let rels = row.id.and_then(|pid| relations.get(&pid)).map(Vec::as_slice).unwrap_or(&[]);
            Package::from_cached(row, rels, repo_id)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BaseUrls;
    use crate::repository::installed::FixedInventory;
    use crate::repository::parsers::{PackageMetadata, RepositoryMetadata};
    use crate::repository::store_metadata;
    use crate::version::RpmVersion;
    use std::fs;

    fn section(id: &str, baseurl: &str) -> RepoSection {
        RepoSection {
            id: Some(id.to_string()),
            baseurl: Some(BaseUrls::One(baseurl.to_string())),
            ..Default::default()
        }
    }

    fn config_with(dir: &tempfile::TempDir, repos: Vec<RepoSection>) -> Config {
        let db_path = dir.path().join("preflight.db");
        let db_path = db_path.to_str().unwrap().to_string();
        db::init(&db_path).unwrap();
        Config {
            db_path,
            repos,
            ..Default::default()
        }
    }

    #[test]
    fn test_cache_only_uses_cached_metadata() {
        let dir = tempfile::tempdir().unwrap();
        // The mirror does not exist; only the cache can answer
        let mirror = "file:///nonexistent/ose-3.3";
        let config = config_with(&dir, vec![section("ose-3.3", mirror)]);

        let repo = RepoSection::validate_all(&config.repos).unwrap().remove(0);
        let metadata = RepositoryMetadata {
            revision: None,
            packages: vec![PackageMetadata::new("atomic-openshift", "3.3.0.1", "1.el7")],
        };
        let mut conn = db::open(&config.db_path).unwrap();
        store_metadata(&mut conn, &repo, mirror, &metadata).unwrap();
        drop(conn);

        let snapshot = load(&config, true, &FixedInventory::default()).unwrap();
        assert_eq!(snapshot.repositories, vec!["ose-3.3".to_string()]);
        assert_eq!(snapshot.available.len(), 1);
        assert_eq!(snapshot.available[0].evr.to_string(), "3.3.0.1-1.el7");
    }

    #[test]
    fn test_cache_from_other_mirror_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_with(&dir, vec![section("base", "file:///nonexistent/new")]);

        let mut repo = RepoSection::validate_all(&config.repos).unwrap().remove(0);
        repo.baseurls = vec!["file:///nonexistent/old".to_string()];
        let mut conn = db::open(&config.db_path).unwrap();
        store_metadata(&mut conn, &repo, "file:///nonexistent/old", &RepositoryMetadata::default()).unwrap();
        drop(conn);

        let err = load(&config, true, &FixedInventory::default()).unwrap_err();
        assert!(matches!(err, Error::MirrorUnreachable(_)));
    }

    #[test]
    fn test_disabled_repos_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut disabled = section("old", "file:///nonexistent/old");
        disabled.enabled = Some(false);
        let config = config_with(&dir, vec![disabled]);

        let snapshot = load(&config, true, &FixedInventory::default()).unwrap();
        assert!(snapshot.repositories.is_empty());
        assert!(snapshot.available.is_empty());
    }

    #[test]
    fn test_invalid_config_passes_through() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_with(&dir, vec![section("base", "gopher://example.com/")]);
        assert!(matches!(load(&config, true, &FixedInventory::default()), Err(Error::InvalidRepoConfig(_))));
    }

    #[test]
    fn test_corrupt_cache_becomes_unknown_repo_error() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("preflight.db");
        fs::write(&db_path, b"this is not an sqlite database, just some bytes").unwrap();
        let config = Config {
            db_path: db_path.to_str().unwrap().to_string(),
            ..Default::default()
        };

        match load(&config, true, &FixedInventory::default()).unwrap_err() {
            Error::UnknownRepoError(msg) => assert!(!msg.is_empty()),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_cache_fetches_from_mirror() {
        let dir = tempfile::tempdir().unwrap();
        let mirror = dir.path().join("mirror");
        let repodata = mirror.join("repodata");
        fs::create_dir_all(&repodata).unwrap();
        fs::write(
            repodata.join("repomd.xml"),
            r#"<repomd><data type="primary"><location href="repodata/primary.xml"/></data></repomd>"#,
        )
        .unwrap();
        fs::write(
            repodata.join("primary.xml"),
            r#"<metadata><package type="rpm"><name>bash</name><arch>x86_64</arch>
<version epoch="0" ver="4.2.46" rel="20.el7"/><checksum type="sha256">00</checksum>
<size package="1"/><location href="Packages/bash.rpm"/></package></metadata>"#,
        )
        .unwrap();

        let config = Config {
            db_path: dir.path().join("never-created.db").to_str().unwrap().to_string(),
            repos: vec![section("base", &format!("file://{}", mirror.display()))],
            ..Default::default()
        };

        for cache_only in [false, true] {
            let snapshot = load(&config, cache_only, &FixedInventory::default()).unwrap();
            assert_eq!(snapshot.repositories, vec!["base".to_string()]);
            assert_eq!(snapshot.available.len(), 1);
        }
        assert!(!dir.path().join("never-created.db").exists());
    }

    #[test]
    fn test_installed_set_comes_from_inventory() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_with(&dir, Vec::new());
        let inventory = FixedInventory::new(vec![Package::installed(
            "bash",
            RpmVersion::parse("4.2.46-20.el7").unwrap(),
            Some("x86_64".to_string()),
        )]);

        let snapshot = load(&config, true, &inventory).unwrap();
        assert_eq!(snapshot.installed.len(), 1);
        assert!(snapshot.installed[0].is_installed());
    }

    #[test]
    fn test_load_quietly_returns_same_result() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_with(&dir, Vec::new());
        let snapshot = load_quietly(&config, true, &FixedInventory::default()).unwrap();
        assert!(snapshot.available.is_empty());
        assert!(snapshot.installed.is_empty());
    }
}
