//! Database connection management
//!
//! A single pooled connection behind a mutex; every acquisition carries the
//! required pragmas (WAL, foreign keys on, busy timeout). Writers run their
//! whole multi-statement step inside one transaction.

use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::migrations::run_migrations;
use crate::error::Result;

/// Authoritative store wrapping SQLite
pub struct RelationalStore {
    db_path: PathBuf,
    conn: Arc<Mutex<Connection>>,
}

impl RelationalStore {
    /// Open or create the database at the given path
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = Self::create_connection(db_path)?;
        run_migrations(&conn)?;

        Ok(Self {
            db_path: db_path.to_path_buf(),
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database (tests)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::configure_pragmas(&conn)?;
        run_migrations(&conn)?;

        Ok(Self {
            db_path: PathBuf::from(":memory:"),
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn create_connection(db_path: &Path) -> Result<Connection> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open_with_flags(db_path, flags)?;
        Self::configure_pragmas(&conn)?;

        Ok(conn)
    }

    /// Pragmas applied on every connection; foreign keys must be on for the
    /// memory -> summary cascade to hold.
    fn configure_pragmas(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA busy_timeout=30000;
            PRAGMA temp_store=MEMORY;
            PRAGMA foreign_keys=ON;
            "#,
        )?;
        Ok(())
    }

    /// Execute a function with the connection
    pub fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock();
        f(&conn)
    }

    /// Execute a function inside a transaction
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }

    /// Drop all rows and re-run migrations from scratch
    pub fn reset(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute_batch(
            r#"
            DROP TABLE IF EXISTS summaries;
            DROP TABLE IF EXISTS memory_tags;
            DROP TABLE IF EXISTS memory_items;
            DROP TABLE IF EXISTS topics;
            DROP TABLE IF EXISTS schema_version;
            "#,
        )?;
        run_migrations(&conn)?;
        Ok(())
    }

    /// Get database path
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }
}

impl Clone for RelationalStore {
    fn clone(&self) -> Self {
        Self {
            db_path: self.db_path.clone(),
            conn: self.conn.clone(),
        }
    }
}
