//! Mnemon - persistent hybrid memory for AI agents
//!
//! A relational store holds the authoritative rows (topics, memories,
//! summaries); a vector store mirrors derived embeddings for semantic
//! recall. The engine keeps both coherent and serves them over MCP.

pub mod backup;
pub mod embedding;
pub mod engine;
pub mod envelope;
pub mod error;
pub mod mcp;
pub mod relational;
pub mod summarize;
pub mod types;
pub mod vector;

pub use engine::{EngineConfig, MemoryEngine};
pub use error::{MnemonError, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
