/// Tool Registry
///
/// Holds the tools this server exposes: each one a descriptor (name,
/// description, input schema) paired with the handler that executes it. The
/// registry is filled once during startup, optionally narrowed by an
/// allow-list, then frozen behind an `Arc` and shared read-only by every
/// worker.

use std::collections::HashMap;
use std::future::Future;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::core::allowlist::AllowList;
use crate::core::content::ToolOutput;
use crate::core::error::{ServerError, ServerResult, ToolError};

/// JSON-Schema type of a single tool parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    String,
    Integer,
    Boolean,
    /// Array of strings
    StringArray,
}

impl ParamType {
    fn schema(self) -> Value {
        match self {
            ParamType::String => json!({ "type": "string" }),
            ParamType::Integer => json!({ "type": "integer" }),
            ParamType::Boolean => json!({ "type": "boolean" }),
            ParamType::StringArray => json!({ "type": "array", "items": { "type": "string" } }),
        }
    }

    fn accepts(self, value: &Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Integer => value.is_i64() || value.is_u64(),
            ParamType::Boolean => value.is_boolean(),
            ParamType::StringArray => value
                .as_array()
                .is_some_and(|items| items.iter().all(Value::is_string)),
        }
    }

    fn describe(self) -> &'static str {
        match self {
            ParamType::String => "a string",
            ParamType::Integer => "an integer",
            ParamType::Boolean => "a boolean",
            ParamType::StringArray => "an array of strings",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Param {
    name: String,
    kind: ParamType,
    description: String,
    required: bool,
}

/// Input schema of a tool: an object with named, typed parameters.
///
/// Serializes as a JSON-Schema object (`type`, `properties`, `required`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputSchema {
    params: Vec<Param>,
}

impl InputSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(self, name: &str, kind: ParamType, description: &str) -> Self {
        self.param(name, kind, description, true)
    }

    pub fn optional(self, name: &str, kind: ParamType, description: &str) -> Self {
        self.param(name, kind, description, false)
    }

    fn param(mut self, name: &str, kind: ParamType, description: &str, required: bool) -> Self {
        self.params.push(Param {
            name: name.to_string(),
            kind,
            description: description.to_string(),
            required,
        });
        self
    }

    /// Check tool arguments against the schema.
    ///
    /// Arguments must be an object; required parameters must be present and
    /// non-null; declared parameters must have their declared type. Unknown
    /// keys are ignored.
    pub fn validate(&self, arguments: &Value) -> Result<(), ToolError> {
        let object = arguments
            .as_object()
            .ok_or_else(|| ToolError::InvalidArguments("arguments must be an object".to_string()))?;

        for param in &self.params {
            match object.get(&param.name) {
                None | Some(Value::Null) if param.required => {
                    return Err(ToolError::InvalidArguments(format!(
                        "Missing required parameter: {}",
                        param.name
                    )));
                }
                None | Some(Value::Null) => {}
                Some(value) if !param.kind.accepts(value) => {
                    return Err(ToolError::InvalidArguments(format!(
                        "Parameter '{}' must be {}",
                        param.name,
                        param.kind.describe()
                    )));
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

impl Serialize for InputSchema {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut properties = Map::new();
        for param in &self.params {
            let mut schema = param.kind.schema();
            if let Some(object) = schema.as_object_mut() {
                object.insert("description".to_string(), Value::String(param.description.clone()));
            }
            properties.insert(param.name.clone(), schema);
        }
        let required: Vec<&str> = self
            .params
            .iter()
            .filter(|param| param.required)
            .map(|param| param.name.as_str())
            .collect();

        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("type", "object")?;
        map.serialize_entry("properties", &properties)?;
        if !required.is_empty() {
            map.serialize_entry("required", &required)?;
        }
        map.end()
    }
}

/// MCP tool definition structure.
///
/// Serialized as-is in `tools/list`, the discovery document and `/api/tools`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDescriptor {
    /// Unique tool identifier (e.g., "execute_sql")
    pub name: String,
    /// Human-readable description of what the tool does
    pub description: String,
    /// Parameters the tool accepts
    #[serde(rename = "inputSchema")]
    pub input_schema: InputSchema,
}

impl ToolDescriptor {
    pub fn new(name: &str, description: &str, input_schema: InputSchema) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            input_schema,
        }
    }
}

pub type ToolFuture = BoxFuture<'static, Result<ToolOutput, ToolError>>;

/// Tool handler function type definition.
///
/// Handlers take the (already validated) JSON arguments and resolve to the
/// tool output or a [`ToolError`]. They never build JSON-RPC errors
/// themselves; the gateway does that.
pub type ToolHandler = Box<dyn Fn(Value) -> ToolFuture + Send + Sync>;

/// Box an async function into a [`ToolHandler`].
pub fn handler<F, Fut>(f: F) -> ToolHandler
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ToolOutput, ToolError>> + Send + 'static,
{
    Box::new(move |arguments| f(arguments).boxed())
}

pub struct RegisteredTool {
    pub descriptor: ToolDescriptor,
    handler: ToolHandler,
}

impl RegisteredTool {
    pub fn invoke(&self, arguments: Value) -> ToolFuture {
        (self.handler)(arguments)
    }
}

/// Registry of available MCP tools, in registration order.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool with the registry.
    ///
    /// Names are unique; registering a name twice is a startup error.
    pub fn register(&mut self, descriptor: ToolDescriptor, handler: ToolHandler) -> ServerResult<()> {
        if self.index.contains_key(&descriptor.name) {
            return Err(ServerError::DuplicateTool(descriptor.name));
        }
        self.index.insert(descriptor.name.clone(), self.tools.len());
        self.tools.push(RegisteredTool { descriptor, handler });
        Ok(())
    }

    /// All tools, in registration order.
    pub fn list(&self) -> impl ExactSizeIterator<Item = &ToolDescriptor> {
        self.tools.iter().map(|tool| &tool.descriptor)
    }

    /// Case-sensitive exact lookup.
    pub fn lookup(&self, name: &str) -> Result<&RegisteredTool, ToolError> {
        self.index
            .get(name)
            .map(|&position| &self.tools[position])
            .ok_or_else(|| ToolError::NotFound(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Keep only the tools the allow-list names. Everything else disappears
    /// from both `list` and `lookup`.
    pub fn restrict(self, allow_list: &AllowList) -> Self {
        let mut restricted = Self::new();
        for tool in self.tools {
            if allow_list.permits(&tool.descriptor.name) {
                restricted.index.insert(tool.descriptor.name.clone(), restricted.tools.len());
                restricted.tools.push(tool);
            }
        }
        restricted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo_registry(names: &[&str]) -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        for name in names {
            let reply = name.to_string();
            registry
                .register(
                    ToolDescriptor::new(name, "test tool", InputSchema::new()),
                    handler(move |_| {
                        let reply = reply.clone();
                        async move { Ok(ToolOutput::text(reply)) }
                    }),
                )
                .unwrap();
        }
        registry
    }

    fn names(registry: &ToolRegistry) -> Vec<String> {
        registry.list().map(|tool| tool.name.clone()).collect()
    }

    #[test]
    fn list_preserves_registration_order() {
        let registry = echo_registry(&["execute_sql", "check_health", "list_tables"]);
        assert_eq!(names(&registry), ["execute_sql", "check_health", "list_tables"]);
        assert_eq!(names(&registry), names(&registry));
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn lookup_is_case_sensitive() {
        let registry = echo_registry(&["list_tables"]);
        assert!(registry.lookup("list_tables").is_ok());
        assert!(matches!(registry.lookup("LIST_TABLES"), Err(ToolError::NotFound(name)) if name == "LIST_TABLES"));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut registry = echo_registry(&["ping_db"]);
        let err = registry
            .register(
                ToolDescriptor::new("ping_db", "again", InputSchema::new()),
                handler(|_| async { Ok(ToolOutput::default()) }),
            )
            .unwrap_err();
        assert!(matches!(err, ServerError::DuplicateTool(name) if name == "ping_db"));
    }

    #[test]
    fn restrict_hides_tools_outside_the_allow_list() {
        let registry = echo_registry(&["execute_sql", "check_health", "list_tables"])
            .restrict(&AllowList::parse("list_tables\nexecute_sql\n"));
        assert_eq!(names(&registry), ["execute_sql", "list_tables"]);
        assert!(matches!(registry.lookup("check_health"), Err(ToolError::NotFound(_))));
    }

    #[tokio::test]
    async fn invoke_runs_the_registered_handler() {
        let registry = echo_registry(&["first", "second"]);
        let output = registry.lookup("second").unwrap().invoke(json!({})).await.unwrap();
        assert_eq!(output.plain_text(), "second");
    }

    #[test]
    fn schema_serializes_as_json_schema_object() {
        let schema = InputSchema::new()
            .required("sql", ParamType::String, "SQL to run")
            .optional("schemas", ParamType::StringArray, "Schemas to scan");
        assert_eq!(
            serde_json::to_value(&schema).unwrap(),
            json!({
                "type": "object",
                "properties": {
                    "sql": {"type": "string", "description": "SQL to run"},
                    "schemas": {"type": "array", "items": {"type": "string"}, "description": "Schemas to scan"}
                },
                "required": ["sql"]
            })
        );
        assert_eq!(
            serde_json::to_value(InputSchema::new()).unwrap(),
            json!({"type": "object", "properties": {}})
        );
    }

    #[test]
    fn validation_checks_presence_and_types() {
        let schema = InputSchema::new()
            .required("sql", ParamType::String, "SQL")
            .optional("limit", ParamType::Integer, "Row limit");

        assert!(schema.validate(&json!({"sql": "select 1"})).is_ok());
        assert!(schema.validate(&json!({"sql": "select 1", "limit": 5, "extra": true})).is_ok());
        assert!(matches!(
            schema.validate(&json!({})),
            Err(ToolError::InvalidArguments(msg)) if msg == "Missing required parameter: sql"
        ));
        assert!(schema.validate(&json!({"sql": null})).is_err());
        assert!(schema.validate(&json!({"sql": 42})).is_err());
        assert!(schema.validate(&json!({"sql": "x", "limit": 1.5})).is_err());
        assert!(schema.validate(&json!(["select 1"])).is_err());
    }
}
