//! Error types for Mnemon

use thiserror::Error;

/// Result type alias for Mnemon operations
pub type Result<T> = std::result::Result<T, MnemonError>;

/// Main error type for Mnemon
#[derive(Error, Debug)]
pub enum MnemonError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Memory not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Summarization unavailable: {0}")]
    DependencyUnavailable(String),

    #[error("Store I/O error: {0}")]
    StoreIo(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MnemonError {
    /// Semantic error kind used in response envelopes
    pub fn kind(&self) -> &'static str {
        match self {
            MnemonError::InvalidArgument(_) => "invalid_argument",
            MnemonError::NotFound(_) => "not_found",
            MnemonError::Conflict(_) => "conflict",
            MnemonError::DependencyUnavailable(_) => "dependency_unavailable",
            MnemonError::Database(_) | MnemonError::StoreIo(_) | MnemonError::Io(_) => "store_io",
            MnemonError::Serialization(_) | MnemonError::Internal(_) => "internal",
        }
    }

    /// Get error code for the MCP protocol
    pub fn code(&self) -> i64 {
        match self {
            MnemonError::NotFound(_) => -32001,
            MnemonError::InvalidArgument(_) => -32602,
            MnemonError::Conflict(_) => -32005,
            MnemonError::DependencyUnavailable(_) => -32011,
            _ => -32000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            MnemonError::InvalidArgument("x".into()).kind(),
            "invalid_argument"
        );
        assert_eq!(MnemonError::NotFound("id".into()).kind(), "not_found");
        assert_eq!(MnemonError::Conflict("dup".into()).kind(), "conflict");
        assert_eq!(
            MnemonError::DependencyUnavailable("api".into()).kind(),
            "dependency_unavailable"
        );
        assert_eq!(MnemonError::StoreIo("disk".into()).kind(), "store_io");
        assert_eq!(MnemonError::Internal("bug".into()).kind(), "internal");
    }

    #[test]
    fn test_code_mapping() {
        assert_eq!(MnemonError::NotFound("id".into()).code(), -32001);
        assert_eq!(MnemonError::InvalidArgument("x".into()).code(), -32602);
        assert_eq!(MnemonError::Conflict("dup".into()).code(), -32005);
        assert_eq!(MnemonError::Internal("bug".into()).code(), -32000);
    }
}
