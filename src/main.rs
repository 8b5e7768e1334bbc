// src/main.rs

use anyhow::Result;
use clap::{Parser, Subcommand};
use preflight::checks::{self, DockerCli};
use preflight::config::{Config, DEFAULT_CONFIG_PATH, RepoSection};
use preflight::report::ModuleResult;
use preflight::repository::installed::{FixedInventory, RpmDb};
use preflight::repository::{self, loader};
use preflight::resolver;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "preflight")]
#[command(author, version, about = "Dry-run package update feasibility checks for yum repositories", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Metadata cache database (overrides db_path from the configuration)
    #[arg(short, long, global = true)]
    db_path: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the expected packages are available at one version
    VersionCheck {
        /// Requested version, e.g. "3.3" or "v3.3.0.1"
        #[arg(long)]
        version: String,
        /// Package to check (repeatable; defaults to expected_packages)
        #[arg(short, long = "package")]
        packages: Vec<String>,
        /// Contact mirrors when cached metadata has expired
        #[arg(long)]
        refresh: bool,
    },
    /// Check that installing/updating packages would resolve
    UpdateCheck {
        /// Packages to install or update (updates everything if omitted)
        packages: Vec<String>,
        /// Contact mirrors when cached metadata has expired
        #[arg(long)]
        refresh: bool,
        /// rpm binary used to read the installed packages
        #[arg(long, default_value = "rpm")]
        rpm: String,
        /// Read the rpm database of this root instead of /
        #[arg(long)]
        root: Option<String>,
    },
    /// Check that the image for a component exists
    ImageCheck {
        /// Component name, e.g. "ose-haproxy-router"
        #[arg(long)]
        component: Option<String>,
        /// docker client to run
        #[arg(long, default_value = "docker")]
        docker: String,
    },
    /// Refresh the repository metadata cache
    Makecache {
        /// Refresh even if cached metadata has not expired
        #[arg(short, long)]
        force: bool,
    },
}

fn main() -> Result<ExitCode> {
    // Logs go to stderr; stdout carries the result document
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::VersionCheck {
            version,
            packages,
            refresh,
        } => {
            let result = load_config(&cli.config, cli.db_path).and_then(|config| {
                let expected = if packages.is_empty() {
                    config.expected_packages.clone()
                } else {
                    packages
                };
                info!("Checking {} package(s) for version {}", expected.len(), version);
                // Only available packages matter here
                let snapshot = loader::load_quietly(
                    &config,
                    config.cache_only && !refresh,
                    &FixedInventory::default(),
                )?;
                checks::analyze(&snapshot, &expected, &version)
            });
            emit(&ModuleResult::from(result))
        }
        Commands::UpdateCheck {
            packages,
            refresh,
            rpm,
            root,
        } => {
            let rpmdb = match root {
                Some(root) => RpmDb::new(rpm).with_root(root),
                None => RpmDb::new(rpm),
            };
            let result = load_config(&cli.config, cli.db_path).and_then(|config| {
                let snapshot = loader::load_quietly(&config, config.cache_only && !refresh, &rpmdb)?;
                resolver::simulate(&snapshot, &packages)?.into_result()
            });
            emit(&ModuleResult::from(result))
        }
        Commands::ImageCheck { component, docker } => {
            let config = load_config(&cli.config, cli.db_path).unwrap_or_else(|e| {
                warn!("{}; using default image namespace", e);
                Config::default()
            });
            let value = checks::verify_image(&DockerCli::new(docker), &config.image_namespace, component.as_deref())
                .unwrap_or_else(|e| to_value(&ModuleResult::from(&e)));
            emit_value(&value)
        }
        Commands::Makecache { force } => {
            let result = load_config(&cli.config, cli.db_path).and_then(|config| {
                let repos = RepoSection::validate_all(&config.repos)?;
                preflight::db::init(&config.db_path)?;
                let mut conn = preflight::db::open(&config.db_path)?;
                let summary = repository::makecache(&mut conn, &repos, force)?;
                info!(
                    "Refreshed {} repositories, {} still fresh",
                    summary.refreshed.len(),
                    summary.skipped.len()
                );
                Ok(summary.changed())
            });
            let report = match result {
                Ok(changed) => ModuleResult::changed(changed),
                Err(e) => ModuleResult::from(&e),
            };
            emit(&report)
        }
    }
}

fn load_config(path: &Path, db_path: Option<String>) -> preflight::Result<Config> {
    let mut config = Config::load(path)?;
    if let Some(db_path) = db_path {
        config.db_path = db_path;
    }
    Ok(config)
}

fn emit(report: &ModuleResult) -> Result<ExitCode> {
    println!("{}", serde_json::to_string(report)?);
    Ok(ExitCode::from(report.exit_code()))
}

fn emit_value(value: &Value) -> Result<ExitCode> {
    println!("{}", serde_json::to_string(value)?);
    let failed = value.get("failed").and_then(Value::as_bool).unwrap_or(false);
    Ok(if failed { ExitCode::FAILURE } else { ExitCode::SUCCESS })
}

fn to_value(report: &ModuleResult) -> Value {
    serde_json::to_value(report).unwrap_or_else(|_| Value::Null)
}
