/// Tools Module
///
/// This module contains all MCP tool implementations, grouped by the part of
/// the Supabase schema they touch. Each group exports a `register` function
/// that adds its tools to the registry during server initialization:
/// - database.rs: free-form SQL, catalogue and health tools
/// - auth.rs: read access to `auth.users`
/// - storage.rs: read access to storage buckets and objects

pub mod auth;
pub mod database;
pub mod storage;

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;

use crate::core::content::ToolOutput;
use crate::core::error::{ServerResult, ToolError};
use crate::core::registry::{ToolHandler, ToolRegistry, handler};
use crate::store::{DataStore, Row, StoreMode};

/// Register every tool, in the order `tools/list` reports them.
pub fn register_all(registry: &mut ToolRegistry, store: &Arc<dyn DataStore>) -> ServerResult<()> {
    database::register(registry, store)?;
    auth::register(registry, store)?;
    storage::register(registry, store)?;
    Ok(())
}

/// Wrap an async tool function that needs the data store into a handler.
fn with_store<F, Fut>(store: &Arc<dyn DataStore>, f: F) -> ToolHandler
where
    F: Fn(Arc<dyn DataStore>, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ToolOutput, ToolError>> + Send + 'static,
{
    let store = Arc::clone(store);
    handler(move |arguments| f(Arc::clone(&store), arguments))
}

fn str_arg<'a>(arguments: &'a Value, key: &str) -> Option<&'a str> {
    arguments.get(key).and_then(Value::as_str)
}

/// Row limit argument: `default` when absent, capped at `max`.
fn limit_arg(arguments: &Value, key: &str, default: i64, max: i64) -> Result<i64, ToolError> {
    match arguments.get(key).and_then(Value::as_i64) {
        None => Ok(default),
        Some(limit) if limit < 1 => Err(ToolError::InvalidArguments(format!(
            "Parameter '{}' must be at least 1",
            key
        ))),
        Some(limit) => Ok(limit.min(max)),
    }
}

/// One cell rendered for the text block: strings bare, null as `-`.
fn cell(row: &Row, column: &str) -> String {
    match row.get(column) {
        None | Some(Value::Null) => "-".to_string(),
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
    }
}

/// Render rows as one line per row with the given columns, or `empty` when
/// there are none.
fn render_rows(rows: &[Row], columns: &[&str], empty: &str) -> String {
    if rows.is_empty() {
        return empty.to_string();
    }
    rows.iter()
        .map(|row| {
            columns
                .iter()
                .map(|column| cell(row, column))
                .collect::<Vec<_>>()
                .join("  ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Text summary plus the rows as an embedded JSON document.
fn rows_output(mode: StoreMode, text: String, uri: &str, rows: Vec<Row>) -> ToolOutput {
    let rows = Value::Array(rows.into_iter().map(Value::Object).collect());
    ToolOutput::text(annotate(mode, text)).with_json(uri, &rows)
}

fn annotate(mode: StoreMode, text: String) -> String {
    match mode {
        StoreMode::Simulation => format!("{}\n[simulation mode: canned data]", text),
        StoreMode::Postgres | StoreMode::Unconfigured => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SimulatedStore;
    use serde_json::json;

    #[test]
    fn registers_the_full_catalogue_in_order() {
        let store: Arc<dyn DataStore> = Arc::new(SimulatedStore);
        let mut registry = ToolRegistry::new();
        register_all(&mut registry, &store).unwrap();

        let names: Vec<&str> = registry.list().map(|tool| tool.name.as_str()).collect();
        assert_eq!(
            names,
            [
                "execute_sql",
                "list_tables",
                "check_health",
                "list_extensions",
                "get_database_stats",
                "list_auth_users",
                "get_auth_user",
                "list_storage_buckets",
                "list_storage_objects",
            ]
        );
    }

    #[test]
    fn limits_default_cap_and_reject_nonpositive() {
        assert_eq!(limit_arg(&json!({}), "limit", 50, 1000).unwrap(), 50);
        assert_eq!(limit_arg(&json!({"limit": 5000}), "limit", 50, 1000).unwrap(), 1000);
        assert!(matches!(
            limit_arg(&json!({"limit": 0}), "limit", 50, 1000),
            Err(ToolError::InvalidArguments(_))
        ));
    }

    #[test]
    fn rows_render_one_line_each() {
        let rows: Vec<Row> = vec![
            json!({"a": "x", "b": 1}).as_object().cloned().unwrap(),
            json!({"a": null, "b": true}).as_object().cloned().unwrap(),
        ];
        assert_eq!(render_rows(&rows, &["a", "b"], "(none)"), "x  1\n-  true");
        assert_eq!(render_rows(&[], &["a"], "(none)"), "(none)");
    }
}
