//! MCP tool definitions for Mnemon

use super::protocol::ToolDefinition;

/// All tool definitions: (name, description, input schema)
pub const TOOL_DEFINITIONS: &[(&str, &str, &str)] = &[
    (
        "memory_initialize",
        "Initialize the memory stores. With reset=true, wipe and recreate both the relational and vector stores.",
        r#"{
            "type": "object",
            "properties": {
                "reset": {"type": "boolean", "default": false, "description": "Wipe all stored memories and recreate the stores"}
            }
        }"#,
    ),
    (
        "memory_store",
        "Store a durable memory under a topic. A default summary is generated according to the content's size tier and becomes the primary retrieval surface.",
        r#"{
            "type": "object",
            "properties": {
                "content": {"type": "string", "description": "The content to remember (non-empty)"},
                "topic": {"type": "string", "description": "Topic bucket; created implicitly on first use"},
                "tags": {"type": "array", "items": {"type": "string"}, "default": [], "description": "Tags for filtering; must not contain commas"}
            },
            "required": ["content", "topic"]
        }"#,
    ),
    (
        "memory_retrieve",
        "Retrieve memories by semantic similarity. Searches summary embeddings first, then hydrates full records from the relational store. Always returns a list; when nothing matches, the list holds a single status envelope.",
        r#"{
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "Semantic search query"},
                "max_results": {"type": "integer", "default": 5, "minimum": 0},
                "topic": {"type": "string", "description": "Restrict the search to one topic"},
                "return_type": {"type": "string", "enum": ["full_text", "summary", "both"], "default": "full_text"}
            },
            "required": ["query"]
        }"#,
    ),
    (
        "memory_update",
        "Update a memory's content, topic, or tags. Bumps the version; a content change regenerates the default summary in place.",
        r#"{
            "type": "object",
            "properties": {
                "memory_id": {"type": "string", "description": "Memory UUID"},
                "content": {"type": "string", "description": "New content"},
                "topic": {"type": "string", "description": "New topic; refcounts move with the memory"},
                "tags": {"type": "array", "items": {"type": "string"}, "description": "Replacement tag list"}
            },
            "required": ["memory_id"]
        }"#,
    ),
    (
        "memory_delete",
        "Delete a memory and all of its summaries from both stores.",
        r#"{
            "type": "object",
            "properties": {
                "memory_id": {"type": "string", "description": "Memory UUID"}
            },
            "required": ["memory_id"]
        }"#,
    ),
    (
        "memory_list_topics",
        "List all topics with their live memory counts, most recently updated first. Returns a list; when no topics exist, the list holds a single status envelope.",
        r#"{
            "type": "object",
            "properties": {}
        }"#,
    ),
    (
        "memory_status",
        "Report service status: memory/topic/summary counts, top topics, vector collection sizes, backup state, and the data directory.",
        r#"{
            "type": "object",
            "properties": {}
        }"#,
    ),
    (
        "memory_summarize",
        "Produce an on-demand summary of one memory (memory_id), of memories matching a query, or of a topic. Exactly one selector must be provided. The result is returned, not persisted.",
        r#"{
            "type": "object",
            "properties": {
                "memory_id": {"type": "string", "description": "Summarize this single memory"},
                "query": {"type": "string", "description": "Summarize up to 10 memories matching this query"},
                "topic": {"type": "string", "description": "Summarize up to 10 memories from this topic"},
                "summary_type": {"type": "string", "enum": ["abstractive", "extractive", "query_focused"], "default": "abstractive"},
                "length": {"type": "string", "enum": ["short", "medium", "detailed"], "default": "medium"}
            }
        }"#,
    ),
];

/// Parse the schema table into protocol tool definitions
pub fn get_tool_definitions() -> Vec<ToolDefinition> {
    TOOL_DEFINITIONS
        .iter()
        .map(|(name, description, schema)| ToolDefinition {
            name: name.to_string(),
            description: description.to_string(),
            input_schema: serde_json::from_str(schema).expect("tool schema is valid JSON"),
        })
        .collect()
}
