//! Database migrations for the relational store

use rusqlite::Connection;

use crate::error::Result;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// Run all migrations
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    let current_version: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current_version < 1 {
        migrate_v1(conn)?;
    }

    Ok(())
}

/// Initial schema (v1)
fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Topic buckets with a live-memory refcount
        CREATE TABLE IF NOT EXISTS topics (
            name TEXT PRIMARY KEY,
            description TEXT,
            item_count INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            CHECK (item_count >= 0)
        );

        -- Durable memory rows
        CREATE TABLE IF NOT EXISTS memory_items (
            id TEXT PRIMARY KEY,
            content TEXT NOT NULL,
            topic_name TEXT NOT NULL REFERENCES topics(name),
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            version INTEGER NOT NULL DEFAULT 1
        );

        CREATE INDEX IF NOT EXISTS idx_memory_items_topic ON memory_items(topic_name);
        CREATE INDEX IF NOT EXISTS idx_memory_items_created ON memory_items(created_at);

        -- Tags as a child table, display order preserved via position
        CREATE TABLE IF NOT EXISTS memory_tags (
            memory_id TEXT NOT NULL REFERENCES memory_items(id) ON DELETE CASCADE,
            tag TEXT NOT NULL,
            position INTEGER NOT NULL,
            PRIMARY KEY (memory_id, tag)
        );

        -- Derived summaries; at most one row per (memory, type)
        CREATE TABLE IF NOT EXISTS summaries (
            id TEXT PRIMARY KEY,
            memory_id TEXT NOT NULL REFERENCES memory_items(id) ON DELETE CASCADE,
            summary_type TEXT NOT NULL,
            summary_text TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (memory_id, summary_type)
        );

        CREATE INDEX IF NOT EXISTS idx_summaries_memory ON summaries(memory_id);
        "#,
    )?;

    conn.execute("INSERT INTO schema_version (version) VALUES (1)", [])?;

    Ok(())
}
