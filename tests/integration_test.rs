// tests/integration_test.rs

//! Integration tests for preflight
//!
//! Repositories are served from `file://` mirrors written into a temporary
//! directory, so every path from mirror to check result is exercised.

use flate2::Compression;
use flate2::write::GzEncoder;
use preflight::checks;
use preflight::config::{BaseUrls, Config, RepoSection};
use preflight::db;
use preflight::repository::installed::FixedInventory;
use preflight::repository::snapshot::Package;
use preflight::repository::{self, loader};
use preflight::resolver::{self, TransactionOutcome};
use preflight::Error;
use preflight::version::RpmVersion;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::TempDir;
use url::Url;

fn package_xml(name: &str, ver: &str, rel: &str, requires: &[(&str, &str)]) -> String {
    let requires: String = requires
        .iter()
        .map(|(dep, min)| {
            format!(r#"<rpm:entry name="{}" flags="GE" epoch="0" ver="{}"/>"#, dep, min)
        })
        .collect();
    format!(
        r#"<package type="rpm">
  <name>{name}</name>
  <arch>x86_64</arch>
  <version epoch="0" ver="{ver}" rel="{rel}"/>
  <checksum type="sha256" pkgid="YES">00</checksum>
  <size package="1"/>
  <location href="Packages/{name}-{ver}-{rel}.x86_64.rpm"/>
  <format>
    <rpm:requires>{requires}</rpm:requires>
  </format>
</package>"#
    )
}

/// Write an rpm-md repository under `root` and return its file:// URL
fn write_repo(root: &Path, packages: &[String]) -> String {
    let repodata = root.join("repodata");
    fs::create_dir_all(&repodata).unwrap();

    let primary = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<metadata xmlns="http://linux.duke.edu/metadata/common" xmlns:rpm="http://linux.duke.edu/metadata/rpm" packages="{}">
{}
</metadata>"#,
        packages.len(),
        packages.concat()
    );
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(primary.as_bytes()).unwrap();
    let compressed = encoder.finish().unwrap();
    let checksum = format!("{:x}", Sha256::digest(&compressed));
    fs::write(repodata.join("primary.xml.gz"), &compressed).unwrap();

    let repomd = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<repomd xmlns="http://linux.duke.edu/metadata/repo">
  <revision>1478000000</revision>
  <data type="primary">
    <checksum type="sha256">{}</checksum>
    <location href="repodata/primary.xml.gz"/>
  </data>
</repomd>"#,
        checksum
    );
    fs::write(repodata.join("repomd.xml"), repomd).unwrap();

    Url::from_directory_path(root).unwrap().to_string()
}

fn repo(id: &str, baseurls: Vec<String>) -> RepoSection {
    RepoSection {
        id: Some(id.to_string()),
        baseurl: Some(BaseUrls::Many(baseurls)),
        ..Default::default()
    }
}

fn setup(dir: &TempDir, repos: Vec<RepoSection>) -> Config {
    let db_path = dir.path().join("cache/preflight.db");
    let db_path = db_path.to_str().unwrap().to_string();
    db::init(&db_path).unwrap();
    Config {
        db_path,
        repos,
        ..Default::default()
    }
}

fn makecache(config: &Config) -> repository::MakecacheSummary {
    let repos = RepoSection::validate_all(&config.repos).unwrap();
    let mut conn = db::open(&config.db_path).unwrap();
    repository::makecache(&mut conn, &repos, false).unwrap()
}

/// Installed set of (name, version-release) pairs
fn installed(packages: &[(&str, &str)]) -> FixedInventory {
    FixedInventory::new(
        packages
            .iter()
            .map(|(name, evr)| {
                Package::installed(name, RpmVersion::parse(evr).unwrap(), Some("x86_64".to_string()))
            })
            .collect(),
    )
}

fn ose_packages(ver: &str) -> Vec<String> {
    ["atomic-openshift", "atomic-openshift-node", "atomic-openshift-master"]
        .iter()
        .map(|name| package_xml(name, ver, "1.git.0.abc.el7", &[]))
        .collect()
}

#[test]
fn test_version_check_passes_for_single_minor_version() {
    let dir = tempfile::tempdir().unwrap();
    let url = write_repo(&dir.path().join("ose-3.3"), &ose_packages("3.3.0.32"));
    let config = setup(&dir, vec![repo("ose-3.3", vec![url])]);

    let snapshot = loader::load(&config, true, &FixedInventory::default()).unwrap();
    let report = checks::analyze(&snapshot, &config.expected_packages, "v3.3").unwrap();

    assert_eq!(report.requested, "3.3");
    assert_eq!(report.precise_matches.len(), 3);
}

#[test]
fn test_version_check_reports_missing_version() {
    let dir = tempfile::tempdir().unwrap();
    let url = write_repo(&dir.path().join("ose-3.2"), &ose_packages("3.2.1.4"));
    let config = setup(&dir, vec![repo("ose-3.2", vec![url])]);

    let snapshot = loader::load(&config, true, &FixedInventory::default()).unwrap();
    let err = checks::analyze(&snapshot, &config.expected_packages, "3.3").unwrap_err();

    let msg = err.to_string();
    assert!(msg.starts_with("Not all of the required packages are available at requested version 3.3:\n"));
    assert!(msg.contains("\n  atomic-openshift\n  atomic-openshift-node\n  atomic-openshift-master\n"));
}

#[test]
fn test_version_check_rejects_two_enabled_minor_versions() {
    let dir = tempfile::tempdir().unwrap();
    let old = write_repo(&dir.path().join("ose-3.3"), &ose_packages("3.3.0.32"));
    let new = write_repo(&dir.path().join("ose-3.4"), &ose_packages("3.4.0.12"));
    let config = setup(&dir, vec![repo("ose-3.3", vec![old]), repo("ose-3.4", vec![new])]);

    let snapshot = loader::load(&config, true, &FixedInventory::default()).unwrap();
    let err = checks::analyze(&snapshot, &config.expected_packages, "3.3").unwrap_err();

    match err {
        Error::AmbiguousMinorVersions(names) => assert_eq!(names.len(), 3),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_mirror_failover() {
    let dir = tempfile::tempdir().unwrap();
    let missing = Url::from_directory_path(dir.path().join("missing")).unwrap().to_string();
    let good = write_repo(&dir.path().join("mirror2"), &ose_packages("3.3.0.32"));
    let config = setup(&dir, vec![repo("ose-3.3", vec![missing, good])]);

    let snapshot = loader::load(&config, true, &FixedInventory::default()).unwrap();
    assert_eq!(snapshot.repositories, vec!["ose-3.3".to_string()]);
    assert_eq!(snapshot.available.len(), 3);
}

#[test]
fn test_all_mirrors_unreachable() {
    let dir = tempfile::tempdir().unwrap();
    let missing = Url::from_directory_path(dir.path().join("missing")).unwrap().to_string();
    let config = setup(&dir, vec![repo("ose-3.3", vec![missing])]);

    let err = loader::load(&config, true, &FixedInventory::default()).unwrap_err();
    match err {
        Error::MirrorUnreachable(msg) => assert!(msg.starts_with("repository 'ose-3.3': ")),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_invalid_repo_config_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let config = setup(&dir, vec![RepoSection::default()]);

    let err = loader::load(&config, true, &FixedInventory::default()).unwrap_err();
    assert!(matches!(err, Error::InvalidRepoConfig(_)));
}

#[test]
fn test_makecache_then_load_without_mirrors() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("ose-3.3");
    let url = write_repo(&root, &ose_packages("3.3.0.32"));
    let config = setup(&dir, vec![repo("ose-3.3", vec![url])]);

    let summary = makecache(&config);
    assert!(summary.changed());
    assert_eq!(summary.refreshed, vec!["ose-3.3".to_string()]);

    // Second run finds the cache fresh
    assert!(!makecache(&config).changed());

    fs::remove_dir_all(&root).unwrap();
    let snapshot = loader::load(&config, true, &FixedInventory::default()).unwrap();
    assert_eq!(snapshot.available.len(), 3);
    checks::analyze(&snapshot, &config.expected_packages, "3.3").unwrap();
}

#[test]
fn test_config_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let url = write_repo(&dir.path().join("ose-3.3"), &ose_packages("3.3.0.32"));
    let db_path = dir.path().join("preflight.db");
    db::init(db_path.to_str().unwrap()).unwrap();

    let toml = format!(
        "db_path = {:?}\nexpected_packages = [\"atomic-openshift\"]\n\n[[repo]]\nid = \"ose-3.3\"\nbaseurl = {:?}\n",
        db_path.to_str().unwrap(),
        url
    );
    let config_path = dir.path().join("preflight.toml");
    fs::write(&config_path, toml).unwrap();

    let config = Config::load(&config_path).unwrap();
    assert_eq!(config.expected_packages, vec!["atomic-openshift".to_string()]);

    let snapshot = loader::load(&config, true, &FixedInventory::default()).unwrap();
    checks::analyze(&snapshot, &config.expected_packages, "3.3.0").unwrap();
}

#[test]
fn test_update_check_with_nothing_installed_is_noop() {
    let dir = tempfile::tempdir().unwrap();
    let url = write_repo(&dir.path().join("ose-3.3"), &ose_packages("3.3.0.32"));
    let config = setup(&dir, vec![repo("ose-3.3", vec![url])]);

    let snapshot = loader::load(&config, true, &FixedInventory::default()).unwrap();
    assert_eq!(resolver::simulate(&snapshot, &[]).unwrap(), TransactionOutcome::NoOp);
}

#[test]
fn test_update_check_reports_unavailable_packages() {
    let dir = tempfile::tempdir().unwrap();
    let url = write_repo(&dir.path().join("ose-3.3"), &ose_packages("3.3.0.32"));
    let config = setup(&dir, vec![repo("ose-3.3", vec![url])]);

    let snapshot = loader::load(&config, true, &FixedInventory::default()).unwrap();
    let requested = vec!["atomic-openshift".to_string(), "foo".to_string()];
    let err = resolver::simulate(&snapshot, &requested).unwrap_err();

    match err {
        Error::PackagesUnavailable(names) => assert_eq!(names, vec!["foo".to_string()]),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_update_check_installs_with_dependencies() {
    let dir = tempfile::tempdir().unwrap();
    let packages = vec![
        package_xml("atomic-openshift-node", "3.3.0.32", "1.el7", &[("docker", "1.10")]),
        package_xml("docker", "1.10.3", "46.el7", &[]),
    ];
    let url = write_repo(&dir.path().join("ose-3.3"), &packages);
    let config = setup(&dir, vec![repo("ose-3.3", vec![url])]);

    let snapshot = loader::load(&config, true, &FixedInventory::default()).unwrap();
    let outcome = resolver::simulate(&snapshot, &["atomic-openshift-node".to_string()]).unwrap();
    assert_eq!(outcome, TransactionOutcome::Resolved);
}

#[test]
fn test_update_all_fails_on_missing_dependency() {
    let dir = tempfile::tempdir().unwrap();
    let packages = vec![package_xml("atomic-openshift", "3.3.0.32", "1.el7", &[("docker", "1.12")])];
    let url = write_repo(&dir.path().join("ose-3.3"), &packages);
    let config = setup(&dir, vec![repo("ose-3.3", vec![url])]);

    let inventory = installed(&[("atomic-openshift", "3.2.1.4-1.el7")]);

    let snapshot = loader::load(&config, true, &inventory).unwrap();
    assert_eq!(snapshot.installed.len(), 1);

    let err = resolver::simulate(&snapshot, &[]).unwrap()
        .into_result()
        .unwrap_err();
    let msg = err.to_string();
    assert!(msg.starts_with("Could not perform yum update.\n"));
    assert!(msg.contains("requires docker"));
}

#[test]
fn test_update_all_resolves_plain_upgrade() {
    let dir = tempfile::tempdir().unwrap();
    let url = write_repo(&dir.path().join("ose-3.3"), &ose_packages("3.3.0.32"));
    let config = setup(&dir, vec![repo("ose-3.3", vec![url])]);

    let inventory = installed(&[("atomic-openshift", "3.3.0.31-1.el7")]);

    let snapshot = loader::load(&config, true, &inventory).unwrap();
    assert_eq!(resolver::simulate(&snapshot, &[]).unwrap(), TransactionOutcome::Resolved);
}

#[test]
fn test_update_all_sees_installed_inventory_after_makecache() {
    let dir = tempfile::tempdir().unwrap();
    let url = write_repo(&dir.path().join("base"), &[package_xml("bash", "9.9", "1.el7", &[])]);
    let config = setup(&dir, vec![repo("base", vec![url])]);
    makecache(&config);

    let inventory = installed(&[("bash", "4.2.46-20.el7")]);
    let snapshot = loader::load(&config, true, &inventory).unwrap();
    assert_eq!(snapshot.installed.len(), 1);
    assert_eq!(snapshot.available.len(), 1);

    assert_eq!(resolver::simulate(&snapshot, &[]).unwrap(), TransactionOutcome::Resolved);
}

#[test]
fn test_load_without_cache_database() {
    let dir = tempfile::tempdir().unwrap();
    let url = write_repo(&dir.path().join("ose-3.3"), &ose_packages("3.3.0.32"));
    let config = Config {
        db_path: dir.path().join("missing/preflight.db").to_str().unwrap().to_string(),
        repos: vec![repo("ose-3.3", vec![url])],
        ..Default::default()
    };

    let snapshot = loader::load(&config, false, &FixedInventory::default()).unwrap();
    checks::analyze(&snapshot, &config.expected_packages, "3.3").unwrap();
}
