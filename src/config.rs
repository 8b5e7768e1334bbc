// src/config.rs

//! Configuration file handling
//!
//! Settings and repository definitions are read from a TOML file:
//!
//! ```toml
//! db_path = "/var/lib/preflight/preflight.db"
//! cache_only = true
//!
//! [[repo]]
//! id = "rhel-7-server-ose-3.3-rpms"
//! name = "OpenShift Enterprise 3.3"
//! baseurl = ["https://mirror1.example.com/ose/3.3", "https://mirror2.example.com/ose/3.3"]
//! metadata_expire = 3600
//! ```
//!
//! Repository sections are kept raw here and validated by
//! [`RepoSection::validate_all`] when metadata is loaded, so structural
//! problems surface as `InvalidRepoConfig`.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use url::Url;

/// Default configuration file location
pub const DEFAULT_CONFIG_PATH: &str = "/etc/preflight/preflight.toml";

/// Default metadata cache database location
pub const DEFAULT_DB_PATH: &str = "/var/lib/preflight/preflight.db";

/// Default metadata lifetime (1 hour)
pub const DEFAULT_METADATA_EXPIRE: i64 = 3600;

/// Packages checked by `version-check` when none are given
pub const DEFAULT_EXPECTED_PACKAGES: [&str; 3] = [
    "atomic-openshift",
    "atomic-openshift-node",
    "atomic-openshift-master",
];

/// Namespace images are looked up under by `image-check`
pub const DEFAULT_IMAGE_NAMESPACE: &str = "openshift3";

/// Top-level configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Prefer cached metadata over contacting mirrors
    #[serde(default = "default_true")]
    pub cache_only: bool,

    #[serde(default = "default_expected_packages")]
    pub expected_packages: Vec<String>,

    #[serde(default = "default_image_namespace")]
    pub image_namespace: String,

    #[serde(default, rename = "repo")]
    pub repos: Vec<RepoSection>,
}

/// A `[[repo]]` table exactly as written in the file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RepoSection {
    pub id: Option<String>,
    pub name: Option<String>,
    pub baseurl: Option<BaseUrls>,
    pub enabled: Option<bool>,
    pub priority: Option<i32>,
    pub metadata_expire: Option<i64>,
}

/// `baseurl` may be a single URL or a list of mirrors
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum BaseUrls {
    One(String),
    Many(Vec<String>),
}

impl BaseUrls {
    fn into_vec(self) -> Vec<String> {
        match self {
            BaseUrls::One(url) => vec![url],
            BaseUrls::Many(urls) => urls,
        }
    }
}

/// A validated repository definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoDefinition {
    pub id: String,
    pub name: String,
    /// Mirrors, tried in order
    pub baseurls: Vec<String>,
    pub enabled: bool,
    pub priority: i32,
    pub metadata_expire: i64,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::InvalidRepoConfig(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
            .map_err(|e| Error::InvalidRepoConfig(format!("{}: {}", path.display(), e)))
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            cache_only: true,
            expected_packages: default_expected_packages(),
            image_namespace: default_image_namespace(),
            repos: Vec::new(),
        }
    }
}

impl RepoSection {
    /// Validate every section, rejecting the whole set on the first problem
    pub fn validate_all(sections: &[RepoSection]) -> Result<Vec<RepoDefinition>> {
        let mut seen = HashSet::new();
        let mut definitions = Vec::with_capacity(sections.len());

        for (index, section) in sections.iter().enumerate() {
            let definition = section.clone().validate(index)?;
            if !seen.insert(definition.id.clone()) {
                return Err(Error::InvalidRepoConfig(format!(
                    "Repository '{}' is defined more than once",
                    definition.id
                )));
            }
            definitions.push(definition);
        }

        Ok(definitions)
    }

    fn validate(self, index: usize) -> Result<RepoDefinition> {
        let id = self
            .id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| {
                Error::InvalidRepoConfig(format!("Repository #{} is missing an id", index + 1))
            })?;

        if let Some(bad) = id
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':')))
        {
            return Err(Error::InvalidRepoConfig(format!(
                "Repository id '{}' contains invalid character '{}'",
                id, bad
            )));
        }

        let baseurls = self.baseurl.map(BaseUrls::into_vec).unwrap_or_default();
        if baseurls.is_empty() {
            return Err(Error::InvalidRepoConfig(format!(
                "Repository '{}' has no baseurl",
                id
            )));
        }

        for baseurl in &baseurls {
            validate_url(&id, baseurl)?;
        }

        let metadata_expire = self.metadata_expire.unwrap_or(DEFAULT_METADATA_EXPIRE);
        if metadata_expire < 0 {
            return Err(Error::InvalidRepoConfig(format!(
                "Repository '{}' has a negative metadata_expire",
                id
            )));
        }

        Ok(RepoDefinition {
            name: self.name.unwrap_or_else(|| id.clone()),
            id,
            baseurls,
            enabled: self.enabled.unwrap_or(true),
            priority: self.priority.unwrap_or(0),
            metadata_expire,
        })
    }
}

fn validate_url(id: &str, baseurl: &str) -> Result<()> {
    let url = Url::parse(baseurl).map_err(|e| {
        Error::InvalidRepoConfig(format!(
            "Repository '{}' has malformed baseurl '{}': {}",
            id, baseurl, e
        ))
    })?;

    match url.scheme() {
        "http" | "https" | "file" => Ok(()),
        other => Err(Error::InvalidRepoConfig(format!(
            "Repository '{}' uses unsupported scheme '{}' in '{}'",
            id, other, baseurl
        ))),
    }
}

fn default_db_path() -> String {
    DEFAULT_DB_PATH.to_string()
}

fn default_true() -> bool {
    true
}

fn default_expected_packages() -> Vec<String> {
    DEFAULT_EXPECTED_PACKAGES.iter().map(|s| s.to_string()).collect()
}

fn default_image_namespace() -> String {
    DEFAULT_IMAGE_NAMESPACE.to_string()
}
