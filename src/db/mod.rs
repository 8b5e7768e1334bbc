// src/db/mod.rs

//! Database layer for preflight
//!
//! This module handles all SQLite operations including:
//! - Database initialization and schema creation
//! - Read-write connections for refreshing the metadata cache
//! - Read-only connections for checks, which never modify anything
//! - Transaction handling

use crate::error::{Error, Result};
use rusqlite::{Connection, OpenFlags, Transaction};
use std::path::Path;
use tracing::{debug, info};

pub mod models;
pub mod schema;

/// Initialize a preflight database at the specified path
///
/// Creates the database file and applies all schema migrations.
/// This is idempotent - calling it on an existing database is safe.
pub fn init(db_path: &str) -> Result<()> {
    debug!("Initializing database at: {}", db_path);

    // Create parent directories if they don't exist
    if let Some(parent) = Path::new(db_path).parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| Error::InitError(format!("Failed to create database directory: {}", e)))?;
    }

    let conn = Connection::open(db_path)?;

    // Rollback journal: checks open the cache with SQLITE_OPEN_READ_ONLY,
    // which cannot attach to a WAL database without its -shm file
    conn.execute_batch(
        "
        PRAGMA journal_mode = DELETE;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        PRAGMA busy_timeout = 5000;
        ",
    )?;

    schema::migrate(&conn)?;

    info!("Database initialized successfully");
    Ok(())
}

/// Open an existing database for writing
///
/// # Arguments
///
/// * `db_path` - Path to the database file
pub fn open(db_path: &str) -> Result<Connection> {
    if !Path::new(db_path).exists() {
        return Err(Error::DatabaseNotFound(db_path.to_string()));
    }

    let conn = Connection::open(db_path)?;

    conn.execute_batch(
        "
        PRAGMA foreign_keys = ON;
        PRAGMA busy_timeout = 5000;
        ",
    )?;

    schema::migrate(&conn)?;
    Ok(conn)
}

/// Open an existing database without write access
///
/// Used by every check. The schema must already be current: read-only
/// connections cannot migrate.
pub fn open_read_only(db_path: &str) -> Result<Connection> {
    if !Path::new(db_path).exists() {
        return Err(Error::DatabaseNotFound(db_path.to_string()));
    }

    let conn = Connection::open_with_flags(
        db_path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    conn.execute_batch("PRAGMA busy_timeout = 5000;")?;

    let version = schema::read_schema_version(&conn)?;
    if version < schema::SCHEMA_VERSION {
        return Err(Error::InitError(format!(
            "Database schema version {} is older than {}; run `preflight makecache` first",
            version,
            schema::SCHEMA_VERSION
        )));
    }

    Ok(conn)
}

/// Run `f` inside a single SQLite transaction
///
/// The transaction commits only when `f` returns `Ok`; any error rolls
/// everything back.
pub fn transaction<T, F>(conn: &mut Connection, f: F) -> Result<T>
where
    F: FnOnce(&Transaction) -> Result<T>,
{
    let tx = conn.transaction()?;
    let value = f(&tx)?;
    tx.commit()?;
    Ok(value)
}
