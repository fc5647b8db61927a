//! Mnemon MCP Server
//!
//! Run with: mnemon-server

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use serde_json::{json, Value};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mnemon::backup::BackupConfig;
use mnemon::embedding::default_embedder;
use mnemon::engine::{EngineConfig, MemoryEngine};
use mnemon::error::Result;
use mnemon::mcp::{
    get_resource_definitions, get_tool_definitions, methods, read_resource, InitializeResult,
    McpHandler, McpRequest, McpResponse, McpServer, ToolCallResult,
};
use mnemon::summarize::{OpenRouterSummarizer, Summarizer};
use mnemon::types::{DeleteInput, InitializeInput, RetrieveInput, StoreInput, SummarizeInput, UpdateInput};

#[derive(Parser, Debug)]
#[command(name = "mnemon-server")]
#[command(about = "Mnemon MCP server for persistent agent memory")]
struct Args {
    /// Root data directory (relational file + vector dir live under it)
    #[arg(long, env = "DB_PATH", default_value = "./memory_db")]
    db_path: String,

    /// OpenRouter API key; without it summarization degrades gracefully
    #[arg(long, env = "OPENROUTER_API_KEY")]
    openrouter_api_key: Option<String>,

    /// Base URL of the OpenRouter-compatible API
    #[arg(
        long,
        env = "OPENROUTER_ENDPOINT",
        default_value = "https://api.openrouter.ai/v1"
    )]
    openrouter_endpoint: String,

    /// Summarization model name
    #[arg(
        long,
        env = "OPENROUTER_MODEL",
        default_value = "meta-llama/llama-3.1-8b-instruct"
    )]
    openrouter_model: String,

    /// Default result count for memory_retrieve
    #[arg(long, env = "DEFAULT_MAX_RESULTS", default_value = "5")]
    default_max_results: usize,

    /// Content below this length embeds as-is (no summarization call)
    #[arg(long, env = "TINY_CONTENT_THRESHOLD", default_value = "500")]
    tiny_content_threshold: usize,

    /// Content at or above this length gets an abstractive summary
    #[arg(long, env = "SMALL_CONTENT_THRESHOLD", default_value = "2000")]
    small_content_threshold: usize,

    /// Automatic time-gated backups of the data directory
    #[arg(
        long,
        env = "ENABLE_AUTO_BACKUP",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    enable_auto_backup: bool,

    /// Minimum hours between snapshots
    #[arg(long, env = "BACKUP_INTERVAL_HOURS", default_value = "24")]
    backup_interval_hours: u64,

    /// Number of snapshots kept by retention pruning
    #[arg(long, env = "BACKUP_RETENTION_COUNT", default_value = "10")]
    backup_retention_count: usize,

    /// Directory for backup snapshots
    #[arg(long, env = "BACKUP_PATH", default_value = "./backups")]
    backup_path: String,
}

/// MCP request handler mapping tool calls onto the engine
struct MnemonHandler {
    engine: Arc<MemoryEngine>,
}

impl MnemonHandler {
    fn new(engine: Arc<MemoryEngine>) -> Self {
        Self { engine }
    }

    fn handle_tool_call(&self, name: &str, params: Value) -> Value {
        match name {
            "memory_initialize" => self.tool_initialize(params),
            "memory_store" => self.tool_store(params),
            "memory_retrieve" => self.tool_retrieve(params),
            "memory_update" => self.tool_update(params),
            "memory_delete" => self.tool_delete(params),
            "memory_list_topics" => self.tool_list_topics(),
            "memory_status" => self.tool_status(),
            "memory_summarize" => self.tool_summarize(params),
            _ => mnemon::envelope::error_parts(
                "invalid_argument",
                format!("Unknown tool: {}", name),
            ),
        }
    }

    fn tool_initialize(&self, params: Value) -> Value {
        let input: InitializeInput = match serde_json::from_value(params) {
            Ok(input) => input,
            Err(e) => return invalid_params(e),
        };
        self.engine.initialize(input.reset)
    }

    fn tool_store(&self, params: Value) -> Value {
        let input: StoreInput = match serde_json::from_value(params) {
            Ok(input) => input,
            Err(e) => return invalid_params(e),
        };
        self.engine.store(input)
    }

    fn tool_retrieve(&self, params: Value) -> Value {
        let input: RetrieveInput = match serde_json::from_value(params) {
            Ok(input) => input,
            Err(e) => return json!([invalid_params(e)]),
        };
        self.engine.retrieve(input)
    }

    fn tool_update(&self, params: Value) -> Value {
        let input: UpdateInput = match serde_json::from_value(params) {
            Ok(input) => input,
            Err(e) => return invalid_params(e),
        };
        self.engine.update(input)
    }

    fn tool_delete(&self, params: Value) -> Value {
        let input: DeleteInput = match serde_json::from_value(params) {
            Ok(input) => input,
            Err(e) => return invalid_params(e),
        };
        self.engine.delete(&input.memory_id)
    }

    fn tool_list_topics(&self) -> Value {
        self.engine.list_topics()
    }

    fn tool_status(&self) -> Value {
        self.engine.status()
    }

    fn tool_summarize(&self, params: Value) -> Value {
        let input: SummarizeInput = match serde_json::from_value(params) {
            Ok(input) => input,
            Err(e) => return invalid_params(e),
        };
        self.engine.summarize(input)
    }
}

fn invalid_params(e: serde_json::Error) -> Value {
    mnemon::envelope::error_parts("invalid_argument", format!("Invalid arguments: {}", e))
}

impl McpHandler for MnemonHandler {
    fn handle_request(&self, request: McpRequest) -> McpResponse {
        match request.method.as_str() {
            methods::INITIALIZE => {
                let result = InitializeResult::default();
                McpResponse::success(request.id, json!(result))
            }
            methods::INITIALIZED => {
                // Notification, no response needed
                McpResponse::success(request.id, json!({}))
            }
            methods::LIST_TOOLS => {
                let tools = get_tool_definitions();
                McpResponse::success(request.id, json!({"tools": tools}))
            }
            methods::CALL_TOOL => {
                let name = request
                    .params
                    .get("name")
                    .and_then(|v| v.as_str())
                    .unwrap_or("");
                let arguments = request
                    .params
                    .get("arguments")
                    .cloned()
                    .unwrap_or(json!({}));

                let result = self.handle_tool_call(name, arguments);
                let tool_result = ToolCallResult::json(&result);
                McpResponse::success(request.id, json!(tool_result))
            }
            methods::LIST_RESOURCES => {
                let resources = get_resource_definitions();
                McpResponse::success(request.id, json!({"resources": resources}))
            }
            methods::READ_RESOURCE => {
                let uri = request
                    .params
                    .get("uri")
                    .and_then(|v| v.as_str())
                    .unwrap_or("");
                match read_resource(uri) {
                    Some(text) => McpResponse::success(
                        request.id,
                        json!({
                            "contents": [{
                                "uri": uri,
                                "mimeType": "text/markdown",
                                "text": text,
                            }]
                        }),
                    ),
                    None => McpResponse::error(
                        request.id,
                        -32001,
                        format!("Unknown resource: {}", uri),
                    ),
                }
            }
            _ => McpResponse::error(
                request.id,
                -32601,
                format!("Method not found: {}", request.method),
            ),
        }
    }
}

fn main() -> Result<()> {
    // Initialize logging to stderr (stdout is for MCP protocol)
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false),
        )
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    // Expand ~ in paths
    let data_dir = PathBuf::from(shellexpand::tilde(&args.db_path).to_string());
    let backup_path = PathBuf::from(shellexpand::tilde(&args.backup_path).to_string());

    let config = EngineConfig {
        data_dir,
        tiny_threshold: args.tiny_content_threshold,
        small_threshold: args.small_content_threshold,
        default_max_results: args.default_max_results,
        backup: BackupConfig {
            enabled: args.enable_auto_backup,
            path: backup_path,
            interval_hours: args.backup_interval_hours,
            retention_count: args.backup_retention_count,
        },
    };

    let summarizer: Option<Arc<dyn Summarizer>> = match args.openrouter_api_key {
        Some(key) if !key.trim().is_empty() => Some(Arc::new(OpenRouterSummarizer::with_model(
            args.openrouter_endpoint,
            key,
            args.openrouter_model,
        )?)),
        _ => {
            tracing::warn!(
                "OPENROUTER_API_KEY not set; summarization degrades to tiny-tier only"
            );
            None
        }
    };

    let engine = Arc::new(MemoryEngine::open(
        config,
        default_embedder(),
        summarizer,
    )?);

    tracing::info!(
        version = mnemon::VERSION,
        data_dir = %engine.config().data_dir.display(),
        "mnemon MCP server starting on stdio"
    );

    let handler = MnemonHandler::new(engine);
    let server = McpServer::new(handler);
    server.run()
}
