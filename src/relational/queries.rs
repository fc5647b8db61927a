//! Queries for topics, memory items, and summaries
//!
//! All functions take an open connection; multi-statement write paths are
//! expected to run inside a caller-held transaction
//! (`RelationalStore::with_transaction`).

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

use crate::envelope::now_iso;
use crate::error::{MnemonError, Result};
use crate::types::{synthesize_topic_description, MemoryItem, Summary, Topic};

fn parse_ts(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn topic_from_row(row: &Row) -> rusqlite::Result<Topic> {
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;
    Ok(Topic {
        name: row.get("name")?,
        description: row.get("description")?,
        item_count: row.get("item_count")?,
        created_at: parse_ts(&created_at),
        updated_at: parse_ts(&updated_at),
    })
}

/// Parse a memory from a row; tags are loaded separately
fn memory_from_row(row: &Row) -> rusqlite::Result<MemoryItem> {
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;
    Ok(MemoryItem {
        id: row.get("id")?,
        content: row.get("content")?,
        topic_name: row.get("topic_name")?,
        tags: vec![],
        created_at: parse_ts(&created_at),
        updated_at: parse_ts(&updated_at),
        version: row.get("version")?,
    })
}

fn summary_from_row(row: &Row) -> rusqlite::Result<Summary> {
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;
    Ok(Summary {
        id: row.get("id")?,
        memory_id: row.get("memory_id")?,
        summary_type: row.get("summary_type")?,
        summary_text: row.get("summary_text")?,
        created_at: parse_ts(&created_at),
        updated_at: parse_ts(&updated_at),
    })
}

/// Load tags for a memory in display order
pub fn load_tags(conn: &Connection, memory_id: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare_cached(
        "SELECT tag FROM memory_tags WHERE memory_id = ? ORDER BY position ASC",
    )?;
    let tags: Vec<String> = stmt
        .query_map([memory_id], |row| row.get(0))?
        .filter_map(|r| r.ok())
        .collect();
    Ok(tags)
}

fn replace_tags(conn: &Connection, memory_id: &str, tags: &[String]) -> Result<()> {
    conn.execute("DELETE FROM memory_tags WHERE memory_id = ?", [memory_id])?;
    let mut stmt = conn
        .prepare_cached("INSERT INTO memory_tags (memory_id, tag, position) VALUES (?, ?, ?)")?;
    for (position, tag) in tags.iter().enumerate() {
        stmt.execute(params![memory_id, tag, position as i64])?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Topic refcounting
// ---------------------------------------------------------------------------

/// Create-with-1 or increment the topic refcount
pub fn add_to_topic(conn: &Connection, name: &str, tags: &[String]) -> Result<()> {
    let now = now_iso();
    let description = synthesize_topic_description(name, tags);
    conn.execute(
        "INSERT INTO topics (name, description, item_count, created_at, updated_at)
         VALUES (?1, ?2, 1, ?3, ?3)
         ON CONFLICT(name) DO UPDATE SET
             item_count = item_count + 1,
             updated_at = excluded.updated_at",
        params![name, description, now],
    )?;
    Ok(())
}

/// Decrement the topic refcount; the row is removed when it reaches zero.
/// Missing rows are a no-op so the count can never go negative.
pub fn remove_from_topic(conn: &Connection, name: &str) -> Result<()> {
    let now = now_iso();
    conn.execute(
        "UPDATE topics SET item_count = item_count - 1, updated_at = ?2
         WHERE name = ?1 AND item_count > 0",
        params![name, now],
    )?;
    conn.execute(
        "DELETE FROM topics WHERE name = ?1 AND item_count <= 0",
        params![name],
    )?;
    Ok(())
}

/// Refresh an existing topic's description and bump its updated_at.
/// Does not touch the refcount and does not create missing rows.
pub fn upsert_topic(conn: &Connection, name: &str, tags: &[String]) -> Result<()> {
    let now = now_iso();
    let description = synthesize_topic_description(name, tags);
    conn.execute(
        "UPDATE topics SET description = ?2, updated_at = ?3 WHERE name = ?1",
        params![name, description, now],
    )?;
    Ok(())
}

/// List topics, most recently touched first
pub fn list_topics(conn: &Connection) -> Result<Vec<Topic>> {
    let mut stmt = conn.prepare_cached(
        "SELECT name, description, item_count, created_at, updated_at
         FROM topics ORDER BY updated_at DESC, name ASC",
    )?;
    let topics: Vec<Topic> = stmt
        .query_map([], topic_from_row)?
        .filter_map(|r| r.ok())
        .collect();
    Ok(topics)
}

pub fn get_topic(conn: &Connection, name: &str) -> Result<Option<Topic>> {
    let mut stmt = conn.prepare_cached(
        "SELECT name, description, item_count, created_at, updated_at
         FROM topics WHERE name = ?",
    )?;
    Ok(stmt.query_row([name], topic_from_row).optional()?)
}

// ---------------------------------------------------------------------------
// Memory items
// ---------------------------------------------------------------------------

/// Insert a memory and bump its topic in the same (caller-held) transaction
pub fn insert_memory(
    conn: &Connection,
    id: &str,
    content: &str,
    topic: &str,
    tags: &[String],
) -> Result<MemoryItem> {
    add_to_topic(conn, topic, tags)?;

    let now = now_iso();
    conn.execute(
        "INSERT INTO memory_items (id, content, topic_name, created_at, updated_at, version)
         VALUES (?1, ?2, ?3, ?4, ?4, 1)",
        params![id, content, topic, now],
    )?;
    replace_tags(conn, id, tags)?;

    get_memory(conn, id)
}

pub fn get_memory(conn: &Connection, id: &str) -> Result<MemoryItem> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, content, topic_name, created_at, updated_at, version
         FROM memory_items WHERE id = ?",
    )?;
    let mut memory = stmt
        .query_row([id], memory_from_row)
        .optional()?
        .ok_or_else(|| MnemonError::NotFound(id.to_string()))?;
    memory.tags = load_tags(conn, id)?;
    Ok(memory)
}

/// Apply field updates to a memory. Bumps `version` and `updated_at`; when
/// the topic changes, both refcounts are adjusted in the same transaction.
pub fn update_memory(
    conn: &Connection,
    id: &str,
    content: Option<&str>,
    topic: Option<&str>,
    tags: Option<&[String]>,
) -> Result<MemoryItem> {
    let existing = get_memory(conn, id)?;
    let now = now_iso();

    let topic_change = topic.filter(|t| *t != existing.topic_name);
    if let Some(new_topic) = topic_change {
        let tag_hint: &[String] = tags.unwrap_or(&existing.tags);
        add_to_topic(conn, new_topic, tag_hint)?;
    }

    conn.execute(
        "UPDATE memory_items SET
             content = COALESCE(?2, content),
             topic_name = COALESCE(?3, topic_name),
             updated_at = ?4,
             version = version + 1
         WHERE id = ?1",
        params![id, content, topic, now],
    )?;

    // The old topic row may only be dropped once nothing references it
    if topic_change.is_some() {
        remove_from_topic(conn, &existing.topic_name)?;
    }

    if let Some(new_tags) = tags {
        replace_tags(conn, id, new_tags)?;
    }

    get_memory(conn, id)
}

/// Delete a memory. The summary rows and tag rows go with it via CASCADE;
/// the topic refcount is decremented in the same transaction.
pub fn delete_memory(conn: &Connection, id: &str) -> Result<()> {
    let existing = get_memory(conn, id)?;
    conn.execute("DELETE FROM memory_items WHERE id = ?", [id])?;
    remove_from_topic(conn, &existing.topic_name)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Summaries
// ---------------------------------------------------------------------------

/// Store a summary row. A second summary with the same (memory, type) pair
/// violates the unique index and is reported as a conflict.
pub fn store_summary(
    conn: &Connection,
    id: &str,
    memory_id: &str,
    summary_type: &str,
    summary_text: &str,
) -> Result<Summary> {
    let now = now_iso();
    conn.execute(
        "INSERT INTO summaries (id, memory_id, summary_type, summary_text, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
        params![id, memory_id, summary_type, summary_text, now],
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(inner, _)
            if inner.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            MnemonError::Conflict(format!(
                "summary of type '{}' already exists for memory {}",
                summary_type, memory_id
            ))
        }
        other => MnemonError::Database(other),
    })?;

    get_summary_by_id(conn, id)?
        .ok_or_else(|| MnemonError::Internal("summary row vanished after insert".to_string()))
}

/// Overwrite a summary's text in place, keeping its id
pub fn update_summary(conn: &Connection, summary_id: &str, summary_text: &str) -> Result<()> {
    let now = now_iso();
    let changed = conn.execute(
        "UPDATE summaries SET summary_text = ?2, updated_at = ?3 WHERE id = ?1",
        params![summary_id, summary_text, now],
    )?;
    if changed == 0 {
        return Err(MnemonError::NotFound(summary_id.to_string()));
    }
    Ok(())
}

pub fn get_summary(
    conn: &Connection,
    memory_id: &str,
    summary_type: &str,
) -> Result<Option<Summary>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, memory_id, summary_type, summary_text, created_at, updated_at
         FROM summaries WHERE memory_id = ? AND summary_type = ?",
    )?;
    Ok(stmt
        .query_row(params![memory_id, summary_type], summary_from_row)
        .optional()?)
}

pub fn get_summary_by_id(conn: &Connection, summary_id: &str) -> Result<Option<Summary>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, memory_id, summary_type, summary_text, created_at, updated_at
         FROM summaries WHERE id = ?",
    )?;
    Ok(stmt.query_row([summary_id], summary_from_row).optional()?)
}

/// All summaries of a memory. Callers on the delete path must enumerate
/// these BEFORE removing the memory row, or the cascade erases the ids the
/// vector store still holds.
pub fn list_summaries(conn: &Connection, memory_id: &str) -> Result<Vec<Summary>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, memory_id, summary_type, summary_text, created_at, updated_at
         FROM summaries WHERE memory_id = ? ORDER BY created_at ASC, id ASC",
    )?;
    let summaries: Vec<Summary> = stmt
        .query_map([memory_id], summary_from_row)?
        .filter_map(|r| r.ok())
        .collect();
    Ok(summaries)
}

pub fn list_summary_types(conn: &Connection, memory_id: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare_cached(
        "SELECT summary_type FROM summaries WHERE memory_id = ? ORDER BY summary_type ASC",
    )?;
    let types: Vec<String> = stmt
        .query_map([memory_id], |row| row.get(0))?
        .filter_map(|r| r.ok())
        .collect();
    Ok(types)
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct TopicCount {
    pub name: String,
    pub item_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RelationalStatus {
    pub total_memories: i64,
    pub total_topics: i64,
    pub total_summaries: i64,
    pub top_topics: Vec<TopicCount>,
    pub latest_item_at: Option<String>,
}

pub fn status(conn: &Connection) -> Result<RelationalStatus> {
    let total_memories: i64 =
        conn.query_row("SELECT COUNT(*) FROM memory_items", [], |row| row.get(0))?;
    let total_topics: i64 = conn.query_row("SELECT COUNT(*) FROM topics", [], |row| row.get(0))?;
    let total_summaries: i64 =
        conn.query_row("SELECT COUNT(*) FROM summaries", [], |row| row.get(0))?;

    let mut stmt = conn.prepare_cached(
        "SELECT name, item_count FROM topics ORDER BY item_count DESC, name ASC LIMIT 5",
    )?;
    let top_topics: Vec<TopicCount> = stmt
        .query_map([], |row| {
            Ok(TopicCount {
                name: row.get(0)?,
                item_count: row.get(1)?,
            })
        })?
        .filter_map(|r| r.ok())
        .collect();

    let latest_item_at: Option<String> = conn.query_row(
        "SELECT MAX(created_at) FROM memory_items",
        [],
        |row| row.get(0),
    )?;

    Ok(RelationalStatus {
        total_memories,
        total_topics,
        total_summaries,
        top_topics,
        latest_item_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relational::RelationalStore;
    use pretty_assertions::assert_eq;

    fn store() -> RelationalStore {
        RelationalStore::open_in_memory().unwrap()
    }

    fn tags(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_insert_and_get_memory() {
        let store = store();
        store
            .with_transaction(|conn| {
                insert_memory(conn, "m-1", "tabs over spaces", "prefs", &tags(&["style"]))
            })
            .unwrap();

        let memory = store
            .with_connection(|conn| get_memory(conn, "m-1"))
            .unwrap();
        assert_eq!(memory.content, "tabs over spaces");
        assert_eq!(memory.topic_name, "prefs");
        assert_eq!(memory.tags, tags(&["style"]));
        assert_eq!(memory.version, 1);
    }

    #[test]
    fn test_get_missing_memory_is_not_found() {
        let store = store();
        let err = store
            .with_connection(|conn| get_memory(conn, "nope"))
            .unwrap_err();
        assert!(matches!(err, MnemonError::NotFound(_)));
    }

    #[test]
    fn test_topic_refcount_lifecycle() {
        let store = store();
        store
            .with_transaction(|conn| {
                insert_memory(conn, "m-1", "one", "x", &[])?;
                insert_memory(conn, "m-2", "two", "x", &[])
            })
            .unwrap();

        let topic = store
            .with_connection(|conn| get_topic(conn, "x"))
            .unwrap()
            .unwrap();
        assert_eq!(topic.item_count, 2);

        store
            .with_transaction(|conn| delete_memory(conn, "m-1"))
            .unwrap();
        let topic = store
            .with_connection(|conn| get_topic(conn, "x"))
            .unwrap()
            .unwrap();
        assert_eq!(topic.item_count, 1);

        store
            .with_transaction(|conn| delete_memory(conn, "m-2"))
            .unwrap();
        let topic = store.with_connection(|conn| get_topic(conn, "x")).unwrap();
        assert!(topic.is_none(), "zero-count topic row must be removed");
    }

    #[test]
    fn test_remove_from_missing_topic_is_noop() {
        let store = store();
        store
            .with_transaction(|conn| remove_from_topic(conn, "ghost"))
            .unwrap();
        assert!(store
            .with_connection(|conn| get_topic(conn, "ghost"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_update_bumps_version_and_moves_topic() {
        let store = store();
        store
            .with_transaction(|conn| insert_memory(conn, "m-1", "body", "old", &[]))
            .unwrap();

        let updated = store
            .with_transaction(|conn| update_memory(conn, "m-1", Some("new body"), Some("new"), None))
            .unwrap();
        assert_eq!(updated.version, 2);
        assert_eq!(updated.topic_name, "new");
        assert_eq!(updated.content, "new body");

        store.with_connection(|conn| {
            assert!(get_topic(conn, "old")?.is_none());
            assert_eq!(get_topic(conn, "new")?.unwrap().item_count, 1);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_update_tags_replaces_ordered() {
        let store = store();
        store
            .with_transaction(|conn| insert_memory(conn, "m-1", "body", "t", &tags(&["a", "b"])))
            .unwrap();

        let updated = store
            .with_transaction(|conn| {
                update_memory(conn, "m-1", None, None, Some(&tags(&["c", "a"])))
            })
            .unwrap();
        assert_eq!(updated.tags, tags(&["c", "a"]));
    }

    #[test]
    fn test_summary_cascade_on_delete() {
        let store = store();
        store
            .with_transaction(|conn| {
                insert_memory(conn, "m-1", "body", "t", &[])?;
                store_summary(conn, "s-1", "m-1", "abstractive_medium", "short body")
            })
            .unwrap();

        store
            .with_transaction(|conn| delete_memory(conn, "m-1"))
            .unwrap();

        let remaining = store
            .with_connection(|conn| list_summaries(conn, "m-1"))
            .unwrap();
        assert!(remaining.is_empty());
    }

    #[test]
    fn test_duplicate_summary_type_is_conflict() {
        let store = store();
        store
            .with_transaction(|conn| {
                insert_memory(conn, "m-1", "body", "t", &[])?;
                store_summary(conn, "s-1", "m-1", "abstractive_medium", "one")
            })
            .unwrap();

        let err = store
            .with_transaction(|conn| {
                store_summary(conn, "s-2", "m-1", "abstractive_medium", "two")
            })
            .unwrap_err();
        assert!(matches!(err, MnemonError::Conflict(_)));
    }

    #[test]
    fn test_update_summary_in_place() {
        let store = store();
        store
            .with_transaction(|conn| {
                insert_memory(conn, "m-1", "body", "t", &[])?;
                store_summary(conn, "s-1", "m-1", "abstractive_medium", "old")
            })
            .unwrap();

        store
            .with_transaction(|conn| update_summary(conn, "s-1", "new"))
            .unwrap();

        let summary = store
            .with_connection(|conn| get_summary(conn, "m-1", "abstractive_medium"))
            .unwrap()
            .unwrap();
        assert_eq!(summary.id, "s-1");
        assert_eq!(summary.summary_text, "new");
    }

    #[test]
    fn test_list_topics_most_recent_first() {
        let store = store();
        store
            .with_transaction(|conn| {
                insert_memory(conn, "m-1", "one", "alpha", &[])?;
                insert_memory(conn, "m-2", "two", "beta", &[])
            })
            .unwrap();

        // Touching alpha again moves it to the front
        store
            .with_transaction(|conn| insert_memory(conn, "m-3", "three", "alpha", &[]))
            .unwrap();

        let topics = store.with_connection(list_topics).unwrap();
        assert_eq!(topics[0].name, "alpha");
        assert_eq!(topics[0].item_count, 2);
    }

    #[test]
    fn test_status_reports_totals_and_top_topics() {
        let store = store();
        store
            .with_transaction(|conn| {
                insert_memory(conn, "m-1", "one", "big", &[])?;
                insert_memory(conn, "m-2", "two", "big", &[])?;
                insert_memory(conn, "m-3", "three", "small", &[])?;
                store_summary(conn, "s-1", "m-1", "abstractive_medium", "one")
            })
            .unwrap();

        let status = store.with_connection(status).unwrap();
        assert_eq!(status.total_memories, 3);
        assert_eq!(status.total_topics, 2);
        assert_eq!(status.total_summaries, 1);
        assert_eq!(status.top_topics[0].name, "big");
        assert_eq!(status.top_topics[0].item_count, 2);
        assert!(status.latest_item_at.is_some());
    }
}
