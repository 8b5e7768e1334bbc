// src/lib.rs

//! Preflight
//!
//! Dry-run feasibility checks for package updates against yum (rpm-md)
//! repositories. Nothing on the host is ever installed or updated.
//!
//! # Architecture
//!
//! - Loader: builds a read-only snapshot of enabled repositories, from the
//!   SQLite metadata cache or straight from mirrors, plus the installed set
//!   from the rpm database
//! - Version consistency: every expected package available at the requested
//!   version, in exactly one minor release line
//! - Transaction simulation: stage installs/updates, build the dependency
//!   closure, classify the result; the transaction is always discarded

pub mod capture;
pub mod checks;
pub mod config;
pub mod db;
mod error;
pub mod report;
pub mod repository;
pub mod resolver;
pub mod version;

pub use error::{Error, Result};
