/// Core Server Framework Module
///
/// This module contains the core server implementation including:
/// - jsonrpc.rs / mcp.rs: JSON-RPC 2.0 envelope and MCP method catalogue
/// - registry.rs / allowlist.rs: tool registry and its optional allow-list
/// - gateway.rs: transport-independent request dispatch
/// - server.rs: HTTP and STDIO transports
/// - config.rs / redact.rs / error.rs / content.rs: supporting types

pub mod allowlist;
pub mod config;
pub mod content;
pub mod error;
pub mod gateway;
pub mod jsonrpc;
pub mod mcp;
pub mod redact;
pub mod registry;
pub mod server;
