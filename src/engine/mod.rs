//! Hybrid Memory Engine
//!
//! Coordinates the relational store (authoritative rows), the vector store
//! (derived embeddings), the summarizer, and the backup manager. Writes are
//! best-effort dual writes: the relational transaction commits first and
//! vector mirror failures surface as warnings in an otherwise-ok envelope.
//! Every public operation answers with a response envelope and never
//! propagates an error to the RPC boundary.

use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;

use crate::backup::{BackupConfig, BackupManager};
use crate::embedding::Embedder;
use crate::envelope::{self, new_id, now_iso, to_iso};
use crate::error::{MnemonError, Result};
use crate::relational::{queries, RelationalStore, DB_FILENAME};
use crate::summarize::{validate_request, Summarizer};
use crate::types::{
    normalize_tags, tier_for, MemoryItem, RetrieveInput, ReturnType, SizeTier, StoreInput,
    SummarizeInput, SummaryKind, SummaryLength, UpdateInput, DEFAULT_SUMMARY_TYPE,
};
use crate::vector::{VectorHit, VectorStore};

/// Subdirectory of the data dir holding the vector index
pub const VECTOR_DIRNAME: &str = "chroma";

/// Candidate pool size for multi-memory summarization
const SUMMARIZE_CANDIDATES: usize = 10;

/// Separator between concatenated memories fed to the summarizer
const CONTENT_SEPARATOR: &str = "\n\n---\n\n";

/// Explicit engine configuration; tests run parallel instances on
/// disjoint data directories.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub data_dir: PathBuf,
    pub tiny_threshold: usize,
    pub small_threshold: usize,
    pub default_max_results: usize,
    pub backup: BackupConfig,
}

impl EngineConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            tiny_threshold: 500,
            small_threshold: 2000,
            default_max_results: 5,
            backup: BackupConfig::default(),
        }
    }
}

pub struct MemoryEngine {
    config: EngineConfig,
    relational: RelationalStore,
    vector: VectorStore,
    summarizer: Option<Arc<dyn Summarizer>>,
    backups: BackupManager,
}

impl MemoryEngine {
    /// Open both stores under the configured data directory
    pub fn open(
        config: EngineConfig,
        embedder: Arc<dyn Embedder>,
        summarizer: Option<Arc<dyn Summarizer>>,
    ) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;

        let relational = RelationalStore::open(&config.data_dir.join(DB_FILENAME))?;
        let vector = VectorStore::open(&config.data_dir.join(VECTOR_DIRNAME), embedder)?;
        let backups = BackupManager::new(&config.data_dir, config.backup.clone());

        Ok(Self {
            config,
            relational,
            vector,
            summarizer,
            backups,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn relational(&self) -> &RelationalStore {
        &self.relational
    }

    pub fn vector(&self) -> &VectorStore {
        &self.vector
    }

    pub fn backups(&self) -> &BackupManager {
        &self.backups
    }

    // ------------------------------------------------------------------
    // initialize
    // ------------------------------------------------------------------

    /// Initialize both stores; with `reset` all rows and vectors are wiped.
    /// Without it this is an idempotent no-op beyond schema creation.
    pub fn initialize(&self, reset: bool) -> Value {
        if reset {
            if let Err(e) = self.relational.reset() {
                return envelope::error(&e);
            }
            if let Err(e) = self.vector.reset() {
                return envelope::error(&e);
            }
            tracing::info!("stores wiped and recreated");
        }
        envelope::ok_with(
            if reset {
                "memory stores reset"
            } else {
                "memory stores initialized"
            },
            json!({
                "data_dir": self.config.data_dir.display().to_string(),
                "reset": reset,
            }),
        )
    }

    // ------------------------------------------------------------------
    // store
    // ------------------------------------------------------------------

    pub fn store(&self, input: StoreInput) -> Value {
        if input.content.trim().is_empty() {
            return envelope::error(&MnemonError::InvalidArgument(
                "content must not be empty".to_string(),
            ));
        }
        let topic = input.topic.trim().to_string();
        if topic.is_empty() {
            return envelope::error(&MnemonError::InvalidArgument(
                "topic must not be empty".to_string(),
            ));
        }
        let tags = match normalize_tags(&input.tags) {
            Ok(tags) => tags,
            Err(e) => return envelope::error(&e),
        };

        let id = new_id();

        // Relational truth first: topic bump + insert in one transaction
        if let Err(e) = self
            .relational
            .with_transaction(|conn| queries::insert_memory(conn, &id, &input.content, &topic, &tags))
        {
            return envelope::error(&e);
        }

        let mut warnings: Vec<String> = Vec::new();

        if let Err(e) = self.vector.add_memory(&id, &input.content, &topic, &tags) {
            warnings.push(format!("partial_write: memory vector not mirrored: {}", e));
        }
        if let Err(e) = self.vector.upsert_topic(&topic, &tags) {
            warnings.push(format!("partial_write: topic vector not updated: {}", e));
        }

        let tier = self.tier_of(&input.content);
        let (summary_generated, summary_id) =
            self.write_default_summary(&id, &input.content, &topic, tier, None, &mut warnings);

        self.backups.tick();

        let mut data = json!({
            "memory_id": id,
            "summary_generated": summary_generated,
            "summary_tier": tier.as_str(),
        });
        if let Some(sid) = summary_id {
            data["summary_id"] = json!(sid);
        }
        if !warnings.is_empty() {
            data["warning"] = json!(warnings.join("; "));
        }
        envelope::ok_with("memory stored", data)
    }

    // ------------------------------------------------------------------
    // retrieve
    // ------------------------------------------------------------------

    /// Summary-first retrieval. Always returns a JSON array; when nothing
    /// matches, the array holds a single response envelope.
    pub fn retrieve(&self, input: RetrieveInput) -> Value {
        let return_type = match input.return_type.as_deref() {
            Some(raw) => match raw.parse::<ReturnType>() {
                Ok(rt) => rt,
                Err(e) => return json!([envelope::error(&e)]),
            },
            None => ReturnType::default(),
        };
        let k = input
            .max_results
            .unwrap_or(self.config.default_max_results);
        if k == 0 {
            return json!([envelope::ok("no matches")]);
        }

        let hits = match self
            .vector
            .search_summaries(&input.query, k, input.topic.as_deref())
        {
            Ok(hits) => hits,
            Err(e) => return json!([envelope::error(&e)]),
        };

        let mut results: Vec<Value> = Vec::new();
        let mut seen: Vec<String> = Vec::new();
        for hit in &hits {
            let memory_id = match hit.metadata.get("memory_id").and_then(Value::as_str) {
                Some(id) => id.to_string(),
                None => continue,
            };
            if seen.contains(&memory_id) {
                continue;
            }

            let memory = match self
                .relational
                .with_connection(|conn| queries::get_memory(conn, &memory_id))
            {
                Ok(memory) => memory,
                Err(MnemonError::NotFound(_)) => {
                    // Reconcilable drift: the vector doc outlived the row
                    tracing::debug!(memory_id, "skipping orphaned summary vector");
                    continue;
                }
                Err(e) => return json!([envelope::error(&e)]),
            };

            seen.push(memory_id);
            results.push(shape_result(&memory, hit, return_type));
        }

        if results.is_empty() {
            return json!([envelope::ok("no matches")]);
        }
        Value::Array(results)
    }

    // ------------------------------------------------------------------
    // update
    // ------------------------------------------------------------------

    pub fn update(&self, input: UpdateInput) -> Value {
        if input.content.is_none() && input.topic.is_none() && input.tags.is_none() {
            return envelope::error(&MnemonError::InvalidArgument(
                "update requires at least one of content, topic, or tags".to_string(),
            ));
        }
        if let Some(content) = &input.content {
            if content.trim().is_empty() {
                return envelope::error(&MnemonError::InvalidArgument(
                    "content must not be empty".to_string(),
                ));
            }
        }
        if let Some(topic) = &input.topic {
            if topic.trim().is_empty() {
                return envelope::error(&MnemonError::InvalidArgument(
                    "topic must not be empty".to_string(),
                ));
            }
        }
        let tags = match &input.tags {
            Some(raw) => match normalize_tags(raw) {
                Ok(tags) => Some(tags),
                Err(e) => return envelope::error(&e),
            },
            None => None,
        };

        let existing = match self
            .relational
            .with_connection(|conn| queries::get_memory(conn, &input.memory_id))
        {
            Ok(memory) => memory,
            Err(e) => return envelope::error(&e),
        };

        let topic_changed = input
            .topic
            .as_deref()
            .is_some_and(|t| t != existing.topic_name);
        let content_changed = input
            .content
            .as_deref()
            .is_some_and(|c| c != existing.content);

        let updated = match self.relational.with_transaction(|conn| {
            queries::update_memory(
                conn,
                &input.memory_id,
                input.content.as_deref(),
                input.topic.as_deref(),
                tags.as_deref(),
            )
        }) {
            Ok(memory) => memory,
            Err(e) => return envelope::error(&e),
        };

        let mut warnings: Vec<String> = Vec::new();

        if let Err(e) = self.vector.update_memory(
            &input.memory_id,
            input.content.as_deref(),
            input.topic.as_deref(),
            tags.as_deref(),
        ) {
            warnings.push(format!("partial_write: memory vector not updated: {}", e));
        }

        if topic_changed {
            if let Err(e) = self.vector.upsert_topic(&updated.topic_name, &updated.tags) {
                warnings.push(format!("partial_write: topic vector not updated: {}", e));
            }
            self.refresh_summary_topics(&updated, &mut warnings);
            self.drop_topic_vector_if_dead(&existing.topic_name);
        } else if tags.is_some() {
            // Tag-only change still refreshes the topic description
            if let Err(e) = self
                .relational
                .with_connection(|conn| queries::upsert_topic(conn, &updated.topic_name, &updated.tags))
            {
                warnings.push(format!("topic description not refreshed: {}", e));
            }
        }

        let mut summary_regenerated = false;
        if content_changed {
            summary_regenerated =
                self.regenerate_default_summary(&updated, &mut warnings);
        }

        self.backups.tick();

        let mut data = json!({
            "memory_id": updated.id,
            "version": updated.version,
            "topic": updated.topic_name,
            "summary_regenerated": summary_regenerated,
        });
        if !warnings.is_empty() {
            data["warning"] = json!(warnings.join("; "));
        }
        envelope::ok_with("memory updated", data)
    }

    // ------------------------------------------------------------------
    // delete
    // ------------------------------------------------------------------

    /// Delete a memory everywhere. The summary ids MUST be enumerated
    /// before the relational cascade runs; afterwards they are gone and
    /// their vector documents would be orphaned forever.
    pub fn delete(&self, memory_id: &str) -> Value {
        let existing = match self
            .relational
            .with_connection(|conn| queries::get_memory(conn, memory_id))
        {
            Ok(memory) => memory,
            Err(e) => return envelope::error(&e),
        };

        let summaries = match self
            .relational
            .with_connection(|conn| queries::list_summaries(conn, memory_id))
        {
            Ok(summaries) => summaries,
            Err(e) => return envelope::error(&e),
        };

        if let Err(e) = self
            .relational
            .with_transaction(|conn| queries::delete_memory(conn, memory_id))
        {
            return envelope::error(&e);
        }

        let mut warnings: Vec<String> = Vec::new();
        if let Err(e) = self.vector.delete_memory(memory_id) {
            warnings.push(format!("partial_write: memory vector not removed: {}", e));
        }
        for summary in &summaries {
            if let Err(e) = self.vector.delete_summary(&summary.id) {
                warnings.push(format!(
                    "partial_write: summary vector {} not removed: {}",
                    summary.id, e
                ));
            }
        }
        self.drop_topic_vector_if_dead(&existing.topic_name);

        self.backups.tick();

        let mut data = json!({
            "memory_id": memory_id,
            "topic": existing.topic_name,
            "summaries_removed": summaries.len(),
        });
        if !warnings.is_empty() {
            data["warning"] = json!(warnings.join("; "));
        }
        envelope::ok_with("memory deleted", data)
    }

    // ------------------------------------------------------------------
    // list_topics / status
    // ------------------------------------------------------------------

    /// Always a JSON array; empty stores answer with one envelope element
    pub fn list_topics(&self) -> Value {
        match self.relational.with_connection(queries::list_topics) {
            Ok(topics) if topics.is_empty() => json!([envelope::ok("no topics")]),
            Ok(topics) => Value::Array(
                topics
                    .iter()
                    .map(|t| {
                        json!({
                            "name": t.name,
                            "description": t.description,
                            "item_count": t.item_count,
                            "created_at": to_iso(t.created_at),
                            "updated_at": to_iso(t.updated_at),
                        })
                    })
                    .collect(),
            ),
            Err(e) => json!([envelope::error(&e)]),
        }
    }

    pub fn status(&self) -> Value {
        let relational = match self.relational.with_connection(queries::status) {
            Ok(status) => status,
            Err(e) => return envelope::error(&e),
        };
        let vector = match self.vector.status() {
            Ok(status) => status,
            Err(e) => return envelope::error(&e),
        };
        let backup_count = self.backups.list().map(|b| b.len()).unwrap_or(0);

        envelope::ok_with(
            "memory service status",
            json!({
                "data_dir": self.config.data_dir.display().to_string(),
                "current_time": now_iso(),
                "relational": relational,
                "vector": vector,
                "backups": {
                    "enabled": self.backups.config().enabled,
                    "count": backup_count,
                    "last_backup_at": self.backups.last_timestamp().map(to_iso),
                },
                "summarizer_available": self.summarizer.is_some(),
            }),
        )
    }

    // ------------------------------------------------------------------
    // summarize
    // ------------------------------------------------------------------

    /// On-demand summarization; the result is returned, never persisted
    pub fn summarize(&self, input: SummarizeInput) -> Value {
        let has = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        let selector_count =
            [has(&input.memory_id), has(&input.query), has(&input.topic)]
                .iter()
                .filter(|present| **present)
                .count();
        if selector_count != 1 {
            return envelope::error(&MnemonError::InvalidArgument(
                "exactly one of memory_id, query, or topic must be provided".to_string(),
            ));
        }

        let kind = match input.summary_type.as_deref() {
            Some(raw) => match raw.parse::<SummaryKind>() {
                Ok(kind) => kind,
                Err(e) => return envelope::error(&e),
            },
            None => SummaryKind::Abstractive,
        };
        let length = match input.length.as_deref() {
            Some(raw) => match raw.parse::<SummaryLength>() {
                Ok(length) => length,
                Err(e) => return envelope::error(&e),
            },
            None => SummaryLength::Medium,
        };
        if let Err(e) = validate_request(kind, input.query.as_deref()) {
            return envelope::error(&e);
        }

        let summarizer = match &self.summarizer {
            Some(summarizer) => summarizer.clone(),
            None => {
                return envelope::error(&MnemonError::DependencyUnavailable(
                    "no summarization backend configured (set OPENROUTER_API_KEY)".to_string(),
                ))
            }
        };

        let (text, source_count) = if has(&input.memory_id) {
            let memory_id = input.memory_id.as_deref().unwrap_or_default();
            match self
                .relational
                .with_connection(|conn| queries::get_memory(conn, memory_id))
            {
                Ok(memory) => (memory.content, 1),
                Err(e) => return envelope::error(&e),
            }
        } else {
            let seed = input
                .query
                .clone()
                .or_else(|| input.topic.clone())
                .unwrap_or_default();
            let hits = match self.vector.search_memories(
                &seed,
                SUMMARIZE_CANDIDATES,
                input.topic.as_deref(),
            ) {
                Ok(hits) => hits,
                Err(e) => return envelope::error(&e),
            };

            let mut contents: Vec<String> = Vec::new();
            for hit in &hits {
                match self
                    .relational
                    .with_connection(|conn| queries::get_memory(conn, &hit.id))
                {
                    Ok(memory) => contents.push(memory.content),
                    Err(MnemonError::NotFound(_)) => continue,
                    Err(e) => return envelope::error(&e),
                }
            }
            if contents.is_empty() {
                return envelope::error(&MnemonError::NotFound(
                    "no memories matched the summarize request".to_string(),
                ));
            }
            let count = contents.len();
            (contents.join(CONTENT_SEPARATOR), count)
        };

        // The query only reaches the summarizer for query-focused summaries
        let query = if kind == SummaryKind::QueryFocused {
            input.query.as_deref()
        } else {
            None
        };

        match summarizer.summarize(&text, kind, length, query) {
            Ok(summary) => envelope::ok_with(
                "summary generated",
                json!({
                    "summary": summary,
                    "summary_type": kind.as_str(),
                    "length": length.as_str(),
                    "source_count": source_count,
                }),
            ),
            Err(e) => envelope::error(&e),
        }
    }

    // ------------------------------------------------------------------
    // internals
    // ------------------------------------------------------------------

    fn tier_of(&self, content: &str) -> SizeTier {
        tier_for(
            content.chars().count(),
            self.config.tiny_threshold,
            self.config.small_threshold,
        )
    }

    /// Produce the default summary text for a tier. Tiny content needs no
    /// backend: the content itself is the summary.
    fn default_summary_text(&self, content: &str, tier: SizeTier) -> Result<String> {
        match tier {
            SizeTier::Tiny => Ok(content.to_string()),
            SizeTier::Small | SizeTier::Large => {
                let summarizer = self.summarizer.as_ref().ok_or_else(|| {
                    MnemonError::DependencyUnavailable(
                        "no summarization backend configured".to_string(),
                    )
                })?;
                let (kind, length) = match tier {
                    SizeTier::Small => (SummaryKind::Extractive, SummaryLength::Short),
                    _ => (SummaryKind::Abstractive, SummaryLength::Medium),
                };
                summarizer.summarize(content, kind, length, None)
            }
        }
    }

    /// Create the default summary in both stores. With `existing_id` the
    /// summary is regenerated in place, keeping its id in both stores.
    fn write_default_summary(
        &self,
        memory_id: &str,
        content: &str,
        topic: &str,
        tier: SizeTier,
        existing_id: Option<&str>,
        warnings: &mut Vec<String>,
    ) -> (bool, Option<String>) {
        let text = match self.default_summary_text(content, tier) {
            Ok(text) => text,
            Err(e) => {
                warnings.push(format!("summary generation failed: {}", e));
                return (false, None);
            }
        };

        match existing_id {
            Some(summary_id) => {
                if let Err(e) = self
                    .relational
                    .with_transaction(|conn| queries::update_summary(conn, summary_id, &text))
                {
                    warnings.push(format!("summary not updated: {}", e));
                    return (false, None);
                }
                // Overwrite the embedding under the same id; fall back to a
                // fresh add when the vector doc drifted away
                let mirrored = match self.vector.update_summary(summary_id, &text) {
                    Ok(()) => Ok(()),
                    Err(MnemonError::NotFound(_)) => self.vector.add_summary(
                        summary_id,
                        &text,
                        memory_id,
                        DEFAULT_SUMMARY_TYPE,
                        topic,
                    ),
                    Err(e) => Err(e),
                };
                if let Err(e) = mirrored {
                    warnings.push(format!(
                        "partial_write: summary vector not mirrored: {}",
                        e
                    ));
                }
                (true, Some(summary_id.to_string()))
            }
            None => {
                let summary_id = new_id();
                if let Err(e) = self.relational.with_transaction(|conn| {
                    queries::store_summary(conn, &summary_id, memory_id, DEFAULT_SUMMARY_TYPE, &text)
                }) {
                    warnings.push(format!("summary not stored: {}", e));
                    return (false, None);
                }
                if let Err(e) = self.vector.add_summary(
                    &summary_id,
                    &text,
                    memory_id,
                    DEFAULT_SUMMARY_TYPE,
                    topic,
                ) {
                    warnings.push(format!(
                        "partial_write: summary vector not mirrored: {}",
                        e
                    ));
                }
                (true, Some(summary_id))
            }
        }
    }

    /// Regenerate the default summary after a content change
    fn regenerate_default_summary(
        &self,
        memory: &MemoryItem,
        warnings: &mut Vec<String>,
    ) -> bool {
        let tier = self.tier_of(&memory.content);
        let existing = match self
            .relational
            .with_connection(|conn| queries::get_summary(conn, &memory.id, DEFAULT_SUMMARY_TYPE))
        {
            Ok(existing) => existing,
            Err(e) => {
                warnings.push(format!("default summary lookup failed: {}", e));
                return false;
            }
        };

        let (generated, _) = self.write_default_summary(
            &memory.id,
            &memory.content,
            &memory.topic_name,
            tier,
            existing.as_ref().map(|s| s.id.as_str()),
            warnings,
        );
        generated
    }

    /// After a topic move, re-point the memory's summary vectors at the new
    /// topic so topic-filtered retrieval keeps finding them
    fn refresh_summary_topics(&self, memory: &MemoryItem, warnings: &mut Vec<String>) {
        let summaries = match self
            .relational
            .with_connection(|conn| queries::list_summaries(conn, &memory.id))
        {
            Ok(summaries) => summaries,
            Err(e) => {
                warnings.push(format!("summary topic refresh failed: {}", e));
                return;
            }
        };
        for summary in &summaries {
            if let Err(e) = self.vector.add_summary(
                &summary.id,
                &summary.summary_text,
                &memory.id,
                &summary.summary_type,
                &memory.topic_name,
            ) {
                warnings.push(format!(
                    "partial_write: summary vector {} not re-pointed: {}",
                    summary.id, e
                ));
            }
        }
    }

    /// Remove the topic's vector document once its relational row is gone
    fn drop_topic_vector_if_dead(&self, topic: &str) {
        let alive = self
            .relational
            .with_connection(|conn| queries::get_topic(conn, topic))
            .ok()
            .flatten()
            .is_some();
        if !alive {
            if let Err(e) = self.vector.delete_topic(topic) {
                tracing::debug!(topic, "stale topic vector not removed: {}", e);
            }
        }
    }
}

/// Shape one retrieve result per the requested return type
fn shape_result(memory: &MemoryItem, hit: &VectorHit, return_type: ReturnType) -> Value {
    let summary_type = hit
        .metadata
        .get("summary_type")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_SUMMARY_TYPE);

    match return_type {
        ReturnType::FullText => json!({
            "id": memory.id,
            "content": memory.content,
            "topic": memory.topic_name,
            "tags": memory.tags,
            "created_at": to_iso(memory.created_at),
            "updated_at": to_iso(memory.updated_at),
            "version": memory.version,
        }),
        ReturnType::Summary => json!({
            "id": memory.id,
            "topic": memory.topic_name,
            "tags": memory.tags,
            "summary_text": hit.document,
            "summary_type": summary_type,
        }),
        ReturnType::Both => json!({
            "id": memory.id,
            "content": memory.content,
            "topic": memory.topic_name,
            "tags": memory.tags,
            "created_at": to_iso(memory.created_at),
            "updated_at": to_iso(memory.updated_at),
            "version": memory.version,
            "summary_text": hit.document,
            "summary_type": summary_type,
        }),
    }
}
