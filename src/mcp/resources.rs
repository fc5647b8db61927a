//! Read-only documentation resources served over MCP

use super::protocol::ResourceDefinition;

const AGENTS_DOC: &str = r#"# Working with the memory service

You are connected to a persistent memory service. Use it to offload durable
facts out of your bounded context and recall them later.

## When to store

- User preferences, decisions, and constraints worth keeping across sessions
- Project facts you derived at nontrivial cost
- Anything you would otherwise re-ask the user

Call `memory_store` with a short, self-contained `content`, a stable `topic`
(snake_case works well), and a few `tags`. Topics are created implicitly.

## When to retrieve

Call `memory_retrieve` with a natural-language query before answering
questions that may touch stored knowledge. Retrieval is summary-first:
the query is matched against summary embeddings, then full records are
hydrated. Use `return_type="summary"` when you only need the gist.

Note the return shape: always a list. When nothing matches, the list holds a
single element with `status: "ok"` and no `content` field - check for that
before indexing into results.

## Housekeeping

- `memory_update` bumps the version and regenerates the default summary on
  content changes.
- `memory_delete` removes the memory and its summaries from both stores.
- `memory_list_topics` and `memory_status` tell you what is stored.
- `memory_summarize` produces an on-demand digest of a memory, a query's
  matches, or a whole topic; the digest is returned, not persisted.
"#;

const README_DOC: &str = r#"# Mnemon

Persistent hybrid memory for AI agents over the Model Context Protocol.

Two stores, one engine:

- A relational SQLite store owns the truth: topics with live refcounts,
  memory items with versions and tags, summaries with a uniqueness
  constraint per (memory, type).
- A vector store mirrors derived embeddings in three collections
  (memories, summaries, topics) for semantic search with topic filtering.

Writes are best-effort dual writes: the relational transaction commits
first; vector mirror failures surface as warnings, never as failed
operations. Summaries are size-tiered - tiny content is embedded as-is,
larger content is summarized through an OpenRouter-compatible endpoint.
The data directory is snapshotted on a time gate with retention pruning.

Configuration is environment-driven; see the schema resource for the
persisted layout and `memory_status` for live state.
"#;

const SCHEMA_DOC: &str = r#"# Persisted layout and schema

```
<DB_PATH>/memory.sqlite          relational store
<DB_PATH>/chroma/vectors.sqlite  vector collections
<BACKUP_PATH>/memory_backup_YYYY-MM-DD_HH-MM-SS.zip
```

## Relational tables

- `topics(name PK, description, item_count, created_at, updated_at)` -
  `item_count` tracks live memories; rows disappear at zero.
- `memory_items(id PK, content, topic_name FK, created_at, updated_at,
  version)` - version starts at 1 and increments on every update.
- `memory_tags(memory_id FK CASCADE, tag, position)` - ordered tag list.
- `summaries(id PK, memory_id FK CASCADE, summary_type, summary_text,
  created_at, updated_at)` - unique on (memory_id, summary_type). The
  default summary's type is `abstractive_medium`.

## Vector collections

Each document is `(collection, id, document, embedding, topic, metadata)`.
Ids match the relational ids exactly. Memory metadata carries
`topic`/`tags`/timestamps; summary metadata carries
`memory_id`/`summary_type`/`topic`.

## Size tiers

| content length | tier  | default summary |
|----------------|-------|-----------------|
| < 500          | tiny  | the content itself |
| 500..1999      | small | extractive, short |
| >= 2000        | large | abstractive, medium |
"#;

const ROADMAP_DOC: &str = r#"# Roadmap

- Reconciliation utility: enumerate ids in both stores, report and repair
  drift between relational rows and vector documents.
- Structured retrieve variant returning `{results: [], message}` alongside
  the legacy list-with-envelope shape.
- Tag-filtered retrieval on top of the normalized tag table.
- Restore tooling for backup snapshots.
"#;

/// (uri, name, description, text)
const RESOURCES: &[(&str, &str, &str, &str)] = &[
    (
        "memory://docs/agents",
        "Agent usage guide",
        "How agents should store and retrieve memories",
        AGENTS_DOC,
    ),
    (
        "memory://docs/readme",
        "Service overview",
        "What the memory service is and how it is put together",
        README_DOC,
    ),
    (
        "memory://docs/schema",
        "Storage schema",
        "Persisted layout, tables, collections, and size tiers",
        SCHEMA_DOC,
    ),
    (
        "memory://docs/roadmap",
        "Roadmap",
        "Planned work",
        ROADMAP_DOC,
    ),
];

pub fn get_resource_definitions() -> Vec<ResourceDefinition> {
    RESOURCES
        .iter()
        .map(|(uri, name, description, _)| ResourceDefinition {
            uri: uri.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            mime_type: "text/markdown".to_string(),
        })
        .collect()
}

/// Look up a resource's text by uri
pub fn read_resource(uri: &str) -> Option<&'static str> {
    RESOURCES
        .iter()
        .find(|(u, _, _, _)| *u == uri)
        .map(|(_, _, _, text)| *text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_docs_resolve() {
        for def in get_resource_definitions() {
            assert!(read_resource(&def.uri).is_some(), "missing {}", def.uri);
        }
    }

    #[test]
    fn test_unknown_uri_is_none() {
        assert!(read_resource("memory://docs/missing").is_none());
    }

    #[test]
    fn test_expected_uris() {
        let uris: Vec<&str> = RESOURCES.iter().map(|(u, _, _, _)| *u).collect();
        assert_eq!(
            uris,
            vec![
                "memory://docs/agents",
                "memory://docs/readme",
                "memory://docs/schema",
                "memory://docs/roadmap",
            ]
        );
    }
}
