// src/error.rs

use thiserror::Error;

/// Core error types for preflight
///
/// The `Display` text of each check failure is the operator-facing report:
/// a summary line, one indented line per offending package or diagnostic,
/// and a remediation hint where one exists.
#[derive(Error, Debug)]
pub enum Error {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Database initialization error
    #[error("Failed to initialize database: {0}")]
    InitError(String),

    /// Database not found
    #[error("Database not found at path: {0}")]
    DatabaseNotFound(String),

    /// Transport failure while fetching repository data
    #[error("Download error: {0}")]
    DownloadError(String),

    /// Malformed metadata, versions or capabilities
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Downloaded repodata does not match the checksum in repomd.xml
    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    /// Dependency solver internal failure
    #[error("Resolver error: {0}")]
    Resolver(String),

    /// The external image inspection tool could not be run
    #[error("Image inspection failed: {0}")]
    ImageInspection(String),

    /// No mirror of a repository could be reached
    #[error("Error getting data from at least one yum repository: {0}")]
    MirrorUnreachable(String),

    /// Repository definitions are structurally invalid
    #[error("Error with yum repository configuration: {0}")]
    InvalidRepoConfig(String),

    /// Any other metadata load failure, passed through verbatim
    #[error("Unexpected error with yum repository: {0}")]
    UnknownRepoError(String),

    /// Requested version is missing for one or more packages
    #[error(
        "Not all of the required packages are available at requested version {version}:\n{}Please check your subscriptions and enabled repositories.",
        indented(.packages)
    )]
    VersionNotAvailable {
        version: String,
        packages: Vec<String>,
    },

    /// More than one minor version line is enabled for these packages
    #[error(
        "Multiple minor versions of these packages are available\n{}There should only be one OpenShift version's repository enabled at a time.",
        indented(.0)
    )]
    AmbiguousMinorVersions(Vec<String>),

    /// Explicitly requested packages exist in no enabled repository
    #[error(
        "Cannot install all of the necessary packages. Unavailable:\n{}You may need to enable one or more repos to make this content available.",
        indented(.0)
    )]
    PackagesUnavailable(Vec<String>),

    /// The staged transaction could not be resolved
    #[error("Could not perform yum update.\n{}", resolution_errors(.0))]
    Unresolved(Vec<String>),

    /// The resolver returned an outcome code nobody has classified yet
    #[error(
        "Unknown error(s) from dependency resolution. Exit Code: {code}:\n{}",
        indented(.messages)
    )]
    UnknownResolutionError { code: i32, messages: Vec<String> },

    /// The resolver failed before producing a classification
    #[error("Unexpected error during dependency resolution: {0}")]
    ResolutionCrashed(String),
}

/// Result type alias using preflight's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// One line per item, each indented by two spaces and newline-terminated
fn indented(items: &[String]) -> String {
    items.iter().map(|item| format!("  {}\n", item)).collect()
}

fn resolution_errors(messages: &[String]) -> String {
    if messages.is_empty() {
        String::new()
    } else {
        format!("Errors from resolution:\n{}", indented(messages))
    }
}
