//! Error types for the gateway, tools and data store

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::core::jsonrpc::{INVALID_PARAMS, JsonRpcError, METHOD_NOT_FOUND};

// Tool execution codes (implementation-defined JSON-RPC server error range)
pub const STORE_UNAVAILABLE: i32 = -32000;
pub const QUERY_FAILED: i32 = -32001;
pub const STORE_NOT_CONFIGURED: i32 = -32002;
pub const STORE_TIMEOUT: i32 = -32003;

pub type StoreResult<T> = Result<T, StoreError>;

/// Failures of the backing data store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Data store is not configured: set DATABASE_URL or enable MCP_SIMULATION_MODE")]
    NotConfigured,

    #[error("Data store unavailable: {0}")]
    Unavailable(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Data store call timed out after {}s", .0.as_secs())]
    Timeout(Duration),
}

impl StoreError {
    pub fn code(&self) -> i32 {
        match self {
            StoreError::Unavailable(_) => STORE_UNAVAILABLE,
            StoreError::Query(_) => QUERY_FAILED,
            StoreError::NotConfigured => STORE_NOT_CONFIGURED,
            StoreError::Timeout(_) => STORE_TIMEOUT,
        }
    }
}

/// Failures a tool invocation can end in.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Unknown tool: {0}")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ToolError {
    /// Convert to JSON-RPC error
    pub fn to_jsonrpc_error(&self) -> JsonRpcError {
        match self {
            ToolError::InvalidArguments(_) => JsonRpcError::new(INVALID_PARAMS, self.to_string()),
            ToolError::NotFound(_) => JsonRpcError::new(METHOD_NOT_FOUND, self.to_string()),
            ToolError::Store(err) => JsonRpcError::new(err.code(), err.to_string()),
        }
    }
}

pub type ServerResult<T> = Result<T, ServerError>;

/// Startup and transport failures.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Tool already registered: {0}")]
    DuplicateTool(String),

    #[error("Failed to read tool allow-list {}: {source}", .path.display())]
    AllowList {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
