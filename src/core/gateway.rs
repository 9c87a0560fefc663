/// Tool Dispatch Gateway
///
/// Transport-independent request handling: a raw JSON-RPC body goes in, an
/// optional response envelope comes out (`None` for notifications). Both the
/// HTTP and the STDIO transport drive the same [`Gateway`].
///
/// Per message the gateway decodes the envelope, routes the method to a
/// protocol handler or to a registered tool, and converts every failure into
/// a JSON-RPC error object. Panics inside handlers are caught here and never
/// reach the transport.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures_util::FutureExt;
use serde_json::{Value, json};
use tracing::{debug, error, info, warn};

use crate::core::content::ToolOutput;
use crate::core::jsonrpc::{JsonRpcError, JsonRpcResponse, Message};
use crate::core::mcp::{
    METHOD_GET_CAPABILITIES, METHOD_INITIALIZE, METHOD_INITIALIZED, METHOD_PING, METHOD_PROMPTS_LIST,
    METHOD_RESOURCES_LIST, METHOD_TOOLS_CALL, METHOD_TOOLS_LIST, SUPPORTED_PROTOCOL_VERSIONS,
    negotiate_protocol_version,
};
use crate::core::redact::{Redactor, truncate};
use crate::core::registry::ToolRegistry;
use crate::store::StoreMode;

/// Longest argument or output preview written to the debug log
const PREVIEW_CHARS: usize = 200;

const INSTRUCTIONS: &str = "Tools for inspecting and querying a Supabase Postgres database: \
    run SQL with execute_sql, explore the schema with list_tables and list_extensions, \
    and read auth users and storage objects.";

/// Server metadata reported by `initialize`, `ping` and the HTTP endpoints.
#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

pub struct Gateway {
    info: ServerInfo,
    registry: Arc<ToolRegistry>,
    store_mode: StoreMode,
    redactor: Redactor,
}

impl Gateway {
    pub fn new(info: ServerInfo, registry: Arc<ToolRegistry>, store_mode: StoreMode, redactor: Redactor) -> Self {
        Self {
            info,
            registry,
            store_mode,
            redactor,
        }
    }

    pub fn info(&self) -> &ServerInfo {
        &self.info
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn store_mode(&self) -> StoreMode {
        self.store_mode
    }

    /// Handle one raw JSON-RPC message.
    ///
    /// Returns `None` when the message is a notification (no `id`) or
    /// `notifications/initialized`; the transport then sends nothing back.
    pub async fn handle(&self, body: &[u8]) -> Option<JsonRpcResponse> {
        let started = Instant::now();

        let message = match Message::decode(body) {
            Ok(message) => message,
            Err(rejection) => {
                warn!(
                    id = %rejection.id,
                    code = rejection.error.code,
                    "rejected message: {}",
                    self.redactor.redact(&rejection.error.message)
                );
                return Some(JsonRpcResponse::failure(rejection.id, rejection.error));
            }
        };

        if message.method() == METHOD_INITIALIZED || matches!(message, Message::Notification { .. }) {
            debug!(method = message.method(), "notification received");
            return None;
        }

        let Message::Request { id, method, params } = message else {
            return None;
        };

        let outcome = match AssertUnwindSafe(self.route(&method, params)).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(panic) => {
                error!(
                    method = %method,
                    id = %id,
                    "handler panicked: {}",
                    self.redactor.redact(&panic_message(panic.as_ref()))
                );
                Err(JsonRpcError::internal_error())
            }
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        let response = match outcome {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(err) => JsonRpcResponse::failure(id, err),
        };
        match response.error() {
            None => info!(method = %method, id = %response.id, duration_ms, outcome = "ok", "handled request"),
            Some(err) => info!(
                method = %method,
                id = %response.id,
                duration_ms,
                outcome = "error",
                code = err.code,
                "handled request"
            ),
        }
        Some(response)
    }

    async fn route(&self, method: &str, params: Option<Value>) -> Result<Value, JsonRpcError> {
        match method {
            METHOD_PING => Ok(self.ping()),
            METHOD_INITIALIZE => Ok(self.initialize(params.as_ref())),
            METHOD_TOOLS_LIST => Ok(self.tools_list()),
            METHOD_TOOLS_CALL => self.tools_call(params).await,
            METHOD_RESOURCES_LIST => Ok(json!({ "resources": [] })),
            METHOD_PROMPTS_LIST => Ok(json!({ "prompts": [] })),
            METHOD_GET_CAPABILITIES => Ok(self.get_capabilities()),
            other => Err(JsonRpcError::method_not_found(other)),
        }
    }

    fn ping(&self) -> Value {
        json!({
            "pong": true,
            "server": self.info.name,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        })
    }

    fn initialize(&self, params: Option<&Value>) -> Value {
        let requested = params
            .and_then(|params| params.get("protocolVersion"))
            .and_then(Value::as_str);
        json!({
            "protocolVersion": negotiate_protocol_version(requested),
            "capabilities": capabilities(),
            "serverInfo": {
                "name": self.info.name,
                "version": self.info.version,
            },
            "instructions": INSTRUCTIONS,
        })
    }

    fn tools_list(&self) -> Value {
        json!({ "tools": self.registry.list().collect::<Vec<_>>() })
    }

    fn get_capabilities(&self) -> Value {
        let tools: Vec<&str> = self.registry.list().map(|tool| tool.name.as_str()).collect();
        json!({
            "capabilities": capabilities(),
            "protocolVersions": SUPPORTED_PROTOCOL_VERSIONS,
            "serverInfo": {
                "name": self.info.name,
                "version": self.info.version,
            },
            "tools": tools,
            "toolCount": tools.len(),
            "dataStore": self.store_mode,
        })
    }

    async fn tools_call(&self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let params = params.ok_or_else(|| JsonRpcError::invalid_params("Missing params"))?;
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| JsonRpcError::invalid_params("Missing or invalid tool name"))?;
        let arguments = match params.get("arguments") {
            None | Some(Value::Null) => json!({}),
            Some(arguments) => arguments.clone(),
        };

        let output = self.execute_tool(name, arguments).await?;
        serde_json::to_value(output).map_err(|err| {
            error!(tool = name, "failed to serialize tool output: {}", err);
            JsonRpcError::internal_error()
        })
    }

    /// Look up, validate and run a tool. Shared by `tools/call` and the REST
    /// mirror, so both report identical errors.
    pub async fn execute_tool(&self, name: &str, arguments: Value) -> Result<ToolOutput, JsonRpcError> {
        let tool = self.registry.lookup(name).map_err(|err| err.to_jsonrpc_error())?;
        debug!(
            tool = name,
            arguments = %self.redactor.preview(&arguments, PREVIEW_CHARS),
            "invoking tool"
        );
        tool.descriptor
            .input_schema
            .validate(&arguments)
            .map_err(|err| err.to_jsonrpc_error())?;

        let started = Instant::now();
        let result = AssertUnwindSafe(async { tool.invoke(arguments).await })
            .catch_unwind()
            .await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(Ok(output)) => {
                debug!(
                    tool = name,
                    duration_ms,
                    output = %truncate(&self.redactor.redact(&output.plain_text()), PREVIEW_CHARS),
                    "tool completed"
                );
                Ok(output)
            }
            Ok(Err(err)) => {
                let mut error = err.to_jsonrpc_error();
                error.message = self.redactor.redact(&error.message);
                warn!(tool = name, duration_ms, code = error.code, "tool failed: {}", error.message);
                Err(error)
            }
            Err(panic) => {
                error!(
                    tool = name,
                    duration_ms,
                    "tool panicked: {}",
                    self.redactor.redact(&panic_message(panic.as_ref()))
                );
                Err(JsonRpcError::internal_error())
            }
        }
    }
}

/// Capabilities advertised by `initialize` and `get_capabilities`.
pub fn capabilities() -> Value {
    json!({
        "tools": { "listChanged": false },
        "resources": {},
        "prompts": {},
    })
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
