//! Vector index store - three named collections of embedded documents
//!
//! Collections (`memories`, `summaries`, `topics`) live in one SQLite file
//! under the vector directory. Embeddings are little-endian f32 BLOBs scored
//! with in-process cosine similarity; the only metadata equality filter is
//! `topic`. Everything here is derived state, reconstructible from the
//! relational store.

use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde::Serialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::embedding::{blob_to_embedding, cosine_similarity, embedding_to_blob, Embedder};
use crate::error::{MnemonError, Result};

pub const COLLECTION_MEMORIES: &str = "memories";
pub const COLLECTION_SUMMARIES: &str = "summaries";
pub const COLLECTION_TOPICS: &str = "topics";

/// Vector database filename inside the vector directory
pub const DB_FILENAME: &str = "vectors.sqlite";

/// A stored document with its metadata
#[derive(Debug, Clone)]
pub struct VectorDoc {
    pub id: String,
    pub document: String,
    pub topic: Option<String>,
    pub metadata: Value,
}

/// A nearest-neighbor search hit
#[derive(Debug, Clone)]
pub struct VectorHit {
    pub id: String,
    pub score: f32,
    pub document: String,
    pub metadata: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct VectorStatus {
    pub memories: i64,
    pub summaries: i64,
    pub topics: i64,
    pub embedding_model: String,
    pub dimensions: usize,
}

/// Vector store over one SQLite file
pub struct VectorStore {
    dir: PathBuf,
    conn: Arc<Mutex<Connection>>,
    embedder: Arc<dyn Embedder>,
}

impl VectorStore {
    /// Open or create the store inside `dir`
    pub fn open(dir: &Path, embedder: Arc<dyn Embedder>) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let db_path = dir.join(DB_FILENAME);

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(&db_path, flags)?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA busy_timeout=30000;
            "#,
        )?;
        Self::create_schema(&conn)?;

        Ok(Self {
            dir: dir.to_path_buf(),
            conn: Arc::new(Mutex::new(conn)),
            embedder,
        })
    }

    /// In-memory store (tests)
    pub fn open_in_memory(embedder: Arc<dyn Embedder>) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::create_schema(&conn)?;
        Ok(Self {
            dir: PathBuf::from(":memory:"),
            conn: Arc::new(Mutex::new(conn)),
            embedder,
        })
    }

    fn create_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                document TEXT NOT NULL,
                embedding BLOB NOT NULL,
                topic TEXT,
                metadata TEXT NOT NULL DEFAULT '{}',
                PRIMARY KEY (collection, id)
            );

            CREATE INDEX IF NOT EXISTS idx_documents_topic ON documents(collection, topic);
            "#,
        )?;
        Ok(())
    }

    /// Drop all documents and recreate the schema
    pub fn reset(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute_batch("DROP TABLE IF EXISTS documents;")?;
        Self::create_schema(&conn)?;
        Ok(())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    // -- generic document plumbing --------------------------------------

    fn upsert_doc(
        &self,
        collection: &str,
        id: &str,
        document: &str,
        topic: Option<&str>,
        metadata: &Value,
    ) -> Result<()> {
        let embedding = self.embedder.embed(document)?;
        let blob = embedding_to_blob(&embedding);
        let metadata_str = serde_json::to_string(metadata)?;

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO documents (collection, id, document, embedding, topic, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(collection, id) DO UPDATE SET
                 document = excluded.document,
                 embedding = excluded.embedding,
                 topic = excluded.topic,
                 metadata = excluded.metadata",
            params![collection, id, document, blob, topic, metadata_str],
        )?;
        Ok(())
    }

    fn get_doc(&self, collection: &str, id: &str) -> Result<Option<VectorDoc>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT id, document, topic, metadata FROM documents
             WHERE collection = ? AND id = ?",
        )?;
        let doc = stmt
            .query_row(params![collection, id], |row| {
                let metadata_str: String = row.get(3)?;
                Ok(VectorDoc {
                    id: row.get(0)?,
                    document: row.get(1)?,
                    topic: row.get(2)?,
                    metadata: serde_json::from_str(&metadata_str).unwrap_or(Value::Null),
                })
            })
            .optional()?;
        Ok(doc)
    }

    fn delete_doc(&self, collection: &str, id: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "DELETE FROM documents WHERE collection = ? AND id = ?",
            params![collection, id],
        )?;
        Ok(())
    }

    /// Nearest-neighbor search within a collection. Results come back in
    /// decreasing similarity order, ties broken by id ascending; each id
    /// appears exactly once.
    fn search(
        &self,
        collection: &str,
        query: &str,
        k: usize,
        topic: Option<&str>,
    ) -> Result<Vec<VectorHit>> {
        if k == 0 {
            return Ok(vec![]);
        }
        let query_embedding = self.embedder.embed(query)?;

        let conn = self.conn.lock();
        let mut scored: Vec<VectorHit> = match topic {
            Some(t) => {
                let mut stmt = conn.prepare_cached(
                    "SELECT id, document, embedding, metadata FROM documents
                     WHERE collection = ? AND topic = ?",
                )?;
                let rows = stmt.query_map(params![collection, t], row_to_scored)?;
                collect_hits(rows, &query_embedding)
            }
            None => {
                let mut stmt = conn.prepare_cached(
                    "SELECT id, document, embedding, metadata FROM documents
                     WHERE collection = ?",
                )?;
                let rows = stmt.query_map(params![collection], row_to_scored)?;
                collect_hits(rows, &query_embedding)
            }
        };

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        scored.truncate(k);
        Ok(scored)
    }

    // -- memories collection ---------------------------------------------

    pub fn add_memory(&self, id: &str, text: &str, topic: &str, tags: &[String]) -> Result<()> {
        let metadata = json!({
            "topic": topic,
            "tags": tags,
            "created_at": crate::envelope::now_iso(),
            "updated_at": crate::envelope::now_iso(),
        });
        self.upsert_doc(COLLECTION_MEMORIES, id, text, Some(topic), &metadata)
    }

    /// Read-merge-write update; only the supplied fields are overwritten
    pub fn update_memory(
        &self,
        id: &str,
        text: Option<&str>,
        topic: Option<&str>,
        tags: Option<&[String]>,
    ) -> Result<()> {
        let existing = self
            .get_doc(COLLECTION_MEMORIES, id)?
            .ok_or_else(|| MnemonError::NotFound(id.to_string()))?;

        let document = text.unwrap_or(&existing.document);
        let merged_topic = topic
            .map(String::from)
            .or(existing.topic.clone())
            .unwrap_or_default();

        let mut metadata = existing.metadata.clone();
        if !metadata.is_object() {
            metadata = json!({});
        }
        let map = metadata.as_object_mut().expect("metadata is an object");
        map.insert("topic".to_string(), json!(merged_topic));
        if let Some(new_tags) = tags {
            map.insert("tags".to_string(), json!(new_tags));
        }
        map.insert("updated_at".to_string(), json!(crate::envelope::now_iso()));

        self.upsert_doc(
            COLLECTION_MEMORIES,
            id,
            document,
            Some(&merged_topic),
            &metadata,
        )
    }

    pub fn delete_memory(&self, id: &str) -> Result<()> {
        self.delete_doc(COLLECTION_MEMORIES, id)
    }

    pub fn get_memory(&self, id: &str) -> Result<Option<VectorDoc>> {
        self.get_doc(COLLECTION_MEMORIES, id)
    }

    pub fn search_memories(
        &self,
        query: &str,
        k: usize,
        topic: Option<&str>,
    ) -> Result<Vec<VectorHit>> {
        self.search(COLLECTION_MEMORIES, query, k, topic)
    }

    // -- summaries collection --------------------------------------------

    pub fn add_summary(
        &self,
        id: &str,
        text: &str,
        memory_id: &str,
        summary_type: &str,
        topic: &str,
    ) -> Result<()> {
        let metadata = json!({
            "memory_id": memory_id,
            "summary_type": summary_type,
            "topic": topic,
        });
        self.upsert_doc(COLLECTION_SUMMARIES, id, text, Some(topic), &metadata)
    }

    /// Re-embed a summary under its existing id; overwrites, never duplicates
    pub fn update_summary(&self, id: &str, text: &str) -> Result<()> {
        let existing = self
            .get_doc(COLLECTION_SUMMARIES, id)?
            .ok_or_else(|| MnemonError::NotFound(id.to_string()))?;
        self.upsert_doc(
            COLLECTION_SUMMARIES,
            id,
            text,
            existing.topic.as_deref(),
            &existing.metadata,
        )
    }

    pub fn delete_summary(&self, id: &str) -> Result<()> {
        self.delete_doc(COLLECTION_SUMMARIES, id)
    }

    pub fn get_summary(&self, id: &str) -> Result<Option<VectorDoc>> {
        self.get_doc(COLLECTION_SUMMARIES, id)
    }

    pub fn search_summaries(
        &self,
        query: &str,
        k: usize,
        topic: Option<&str>,
    ) -> Result<Vec<VectorHit>> {
        self.search(COLLECTION_SUMMARIES, query, k, topic)
    }

    // -- topics collection -----------------------------------------------

    pub fn upsert_topic(&self, name: &str, tags: &[String]) -> Result<()> {
        let document = crate::types::synthesize_topic_description(name, tags);
        let metadata = json!({
            "topic": name,
            "tags": tags,
        });
        self.upsert_doc(COLLECTION_TOPICS, name, &document, Some(name), &metadata)
    }

    pub fn get_topic(&self, name: &str) -> Result<Option<VectorDoc>> {
        self.get_doc(COLLECTION_TOPICS, name)
    }

    pub fn delete_topic(&self, name: &str) -> Result<()> {
        self.delete_doc(COLLECTION_TOPICS, name)
    }

    // -- status ----------------------------------------------------------

    pub fn status(&self) -> Result<VectorStatus> {
        let conn = self.conn.lock();
        let count = |collection: &str| -> Result<i64> {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM documents WHERE collection = ?",
                [collection],
                |row| row.get(0),
            )?)
        };
        Ok(VectorStatus {
            memories: count(COLLECTION_MEMORIES)?,
            summaries: count(COLLECTION_SUMMARIES)?,
            topics: count(COLLECTION_TOPICS)?,
            embedding_model: self.embedder.model_name().to_string(),
            dimensions: self.embedder.dimensions(),
        })
    }
}

impl Clone for VectorStore {
    fn clone(&self) -> Self {
        Self {
            dir: self.dir.clone(),
            conn: self.conn.clone(),
            embedder: self.embedder.clone(),
        }
    }
}

type ScoredRow = (String, String, Vec<u8>, String);

fn row_to_scored(row: &rusqlite::Row) -> rusqlite::Result<ScoredRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn collect_hits<I>(rows: I, query_embedding: &[f32]) -> Vec<VectorHit>
where
    I: Iterator<Item = rusqlite::Result<ScoredRow>>,
{
    rows.filter_map(|r| r.ok())
        .map(|(id, document, blob, metadata_str)| {
            let embedding = blob_to_embedding(&blob);
            VectorHit {
                id,
                score: cosine_similarity(query_embedding, &embedding),
                document,
                metadata: serde_json::from_str(&metadata_str).unwrap_or(Value::Null),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::default_embedder;
    use pretty_assertions::assert_eq;

    fn store() -> VectorStore {
        VectorStore::open_in_memory(default_embedder()).unwrap()
    }

    fn tags(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_add_and_get_memory() {
        let store = store();
        store
            .add_memory("m-1", "tabs over spaces", "prefs", &tags(&["style"]))
            .unwrap();

        let doc = store.get_memory("m-1").unwrap().unwrap();
        assert_eq!(doc.document, "tabs over spaces");
        assert_eq!(doc.topic.as_deref(), Some("prefs"));
        assert_eq!(doc.metadata["tags"], serde_json::json!(["style"]));
    }

    #[test]
    fn test_add_twice_overwrites() {
        let store = store();
        store.add_memory("m-1", "first", "t", &[]).unwrap();
        store.add_memory("m-1", "second", "t", &[]).unwrap();

        let doc = store.get_memory("m-1").unwrap().unwrap();
        assert_eq!(doc.document, "second");

        let status = store.status().unwrap();
        assert_eq!(status.memories, 1);
    }

    #[test]
    fn test_update_memory_merges_fields() {
        let store = store();
        store
            .add_memory("m-1", "original text", "old_topic", &tags(&["a"]))
            .unwrap();

        store
            .update_memory("m-1", None, Some("new_topic"), None)
            .unwrap();

        let doc = store.get_memory("m-1").unwrap().unwrap();
        assert_eq!(doc.document, "original text");
        assert_eq!(doc.topic.as_deref(), Some("new_topic"));
        assert_eq!(doc.metadata["tags"], serde_json::json!(["a"]));
    }

    #[test]
    fn test_update_missing_memory_is_not_found() {
        let store = store();
        let err = store.update_memory("ghost", Some("x"), None, None).unwrap_err();
        assert!(matches!(err, MnemonError::NotFound(_)));
    }

    #[test]
    fn test_search_orders_by_similarity() {
        let store = store();
        store
            .add_memory("m-1", "user prefers tabs over spaces indentation", "t", &[])
            .unwrap();
        store
            .add_memory("m-2", "quarterly revenue forecast for the board", "t", &[])
            .unwrap();

        let hits = store.search_memories("tabs indentation", 2, None).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "m-1");
        assert!(hits[0].score >= hits[1].score);
    }

    #[test]
    fn test_search_topic_filter() {
        let store = store();
        store.add_memory("m-1", "alpha text", "a", &[]).unwrap();
        store.add_memory("m-2", "alpha text", "b", &[]).unwrap();

        let hits = store.search_memories("alpha", 10, Some("a")).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "m-1");
    }

    #[test]
    fn test_search_k_zero_is_empty() {
        let store = store();
        store.add_memory("m-1", "text", "t", &[]).unwrap();
        assert!(store.search_memories("text", 0, None).unwrap().is_empty());
    }

    #[test]
    fn test_search_no_duplicate_ids() {
        let store = store();
        for i in 0..5 {
            store
                .add_memory(&format!("m-{}", i), "identical text", "t", &[])
                .unwrap();
        }
        let hits = store.search_memories("identical text", 10, None).unwrap();
        let mut ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        let len_before = ids.len();
        ids.dedup();
        assert_eq!(ids.len(), len_before);
        // Equal scores fall back to id-ascending order
        assert_eq!(ids, vec!["m-0", "m-1", "m-2", "m-3", "m-4"]);
    }

    #[test]
    fn test_summary_round_trip_and_metadata() {
        let store = store();
        store
            .add_summary("s-1", "a short summary", "m-1", "abstractive_medium", "t")
            .unwrap();

        let doc = store.get_summary("s-1").unwrap().unwrap();
        assert_eq!(doc.metadata["memory_id"], "m-1");
        assert_eq!(doc.metadata["summary_type"], "abstractive_medium");
        assert_eq!(doc.metadata["topic"], "t");
    }

    #[test]
    fn test_update_summary_keeps_id_and_metadata() {
        let store = store();
        store
            .add_summary("s-1", "old text", "m-1", "abstractive_medium", "t")
            .unwrap();
        store.update_summary("s-1", "new text").unwrap();

        let doc = store.get_summary("s-1").unwrap().unwrap();
        assert_eq!(doc.document, "new text");
        assert_eq!(doc.metadata["memory_id"], "m-1");

        let status = store.status().unwrap();
        assert_eq!(status.summaries, 1);
    }

    #[test]
    fn test_delete_memory_and_summary() {
        let store = store();
        store.add_memory("m-1", "text", "t", &[]).unwrap();
        store
            .add_summary("s-1", "text", "m-1", "abstractive_medium", "t")
            .unwrap();

        store.delete_memory("m-1").unwrap();
        store.delete_summary("s-1").unwrap();

        assert!(store.get_memory("m-1").unwrap().is_none());
        assert!(store.get_summary("s-1").unwrap().is_none());
    }

    #[test]
    fn test_topic_upsert_and_get() {
        let store = store();
        store.upsert_topic("research", &tags(&["ml"])).unwrap();
        store.upsert_topic("research", &tags(&["ml", "rust"])).unwrap();

        let doc = store.get_topic("research").unwrap().unwrap();
        assert_eq!(doc.metadata["tags"], serde_json::json!(["ml", "rust"]));

        let status = store.status().unwrap();
        assert_eq!(status.topics, 1);
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = VectorStore::open(dir.path(), default_embedder()).unwrap();
            store.add_memory("m-1", "persisted text", "t", &[]).unwrap();
        }
        let store = VectorStore::open(dir.path(), default_embedder()).unwrap();
        let hits = store.search_memories("persisted text", 1, None).unwrap();
        assert_eq!(hits[0].id, "m-1");
    }
}
