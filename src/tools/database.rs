/// Database Tools
///
/// Free-form SQL plus read-only catalogue queries against the connected
/// Postgres database.

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;

use super::{annotate, cell, render_rows, rows_output, str_arg, with_store};
use crate::core::content::ToolOutput;
use crate::core::error::{ServerResult, ToolError};
use crate::core::registry::{InputSchema, ParamType, ToolDescriptor, ToolRegistry};
use crate::store::{DataStore, ExecOutcome, SqlParam, Statement};

const LIST_TABLES_SQL: &str = "\
    select table_schema::text as table_schema, table_name::text as table_name \
    from information_schema.tables \
    where table_schema = any($1) \
      and (table_type = 'BASE TABLE' or ($2 and table_type = 'VIEW')) \
    order by table_schema, table_name";

const CHECK_HEALTH_SQL: &str = "select 1::int4 as ok";

const LIST_EXTENSIONS_SQL: &str = "\
    select extname::text as extname, extversion::text as extversion \
    from pg_extension order by extname";

const DATABASE_STATS_SQL: &str = "\
    select current_database()::text as database, \
           pg_size_pretty(pg_database_size(current_database()))::text as size, \
           (select count(*) from pg_stat_activity where datname = current_database())::int8 as connections, \
           version()::text as version";

/// Most rows `execute_sql` returns in its text block; the JSON resource
/// carries all of them.
const PREVIEW_ROWS: usize = 20;

pub fn register(registry: &mut ToolRegistry, store: &Arc<dyn DataStore>) -> ServerResult<()> {
    registry.register(
        ToolDescriptor::new(
            "execute_sql",
            "Execute a SQL statement against the database and return its rows or the number of rows affected.",
            InputSchema::new().required("sql", ParamType::String, "SQL statement to execute"),
        ),
        with_store(store, execute_sql),
    )?;

    registry.register(
        ToolDescriptor::new(
            "list_tables",
            "List the tables in the given schemas.",
            InputSchema::new()
                .optional(
                    "schemas",
                    ParamType::StringArray,
                    "Schemas to list tables from (default: [\"public\"])",
                )
                .optional("include_views", ParamType::Boolean, "Also list views (default: false)"),
        ),
        with_store(store, list_tables),
    )?;

    registry.register(
        ToolDescriptor::new(
            "check_health",
            "Check that the database is reachable and report the round-trip time.",
            InputSchema::new(),
        ),
        with_store(store, check_health),
    )?;

    registry.register(
        ToolDescriptor::new(
            "list_extensions",
            "List the Postgres extensions installed in the database.",
            InputSchema::new(),
        ),
        with_store(store, list_extensions),
    )?;

    registry.register(
        ToolDescriptor::new(
            "get_database_stats",
            "Report database name, size, active connections and server version.",
            InputSchema::new(),
        ),
        with_store(store, get_database_stats),
    )?;

    Ok(())
}

async fn execute_sql(store: Arc<dyn DataStore>, arguments: Value) -> Result<ToolOutput, ToolError> {
    let sql = str_arg(&arguments, "sql").unwrap_or_default().trim();
    if sql.is_empty() {
        return Err(ToolError::InvalidArguments("Parameter 'sql' must not be empty".to_string()));
    }

    Ok(match store.execute(sql).await? {
        ExecOutcome::Rows(rows) => {
            let columns: Vec<String> = rows
                .first()
                .map(|row| row.keys().cloned().collect())
                .unwrap_or_default();
            let columns: Vec<&str> = columns.iter().map(String::as_str).collect();
            let mut text = format!("{} row(s) returned", rows.len());
            if !rows.is_empty() {
                text.push('\n');
                text.push_str(&columns.join("  "));
                text.push('\n');
                text.push_str(&render_rows(&rows[..rows.len().min(PREVIEW_ROWS)], &columns, ""));
                if rows.len() > PREVIEW_ROWS {
                    text.push_str(&format!("\n... {} more", rows.len() - PREVIEW_ROWS));
                }
            }
            rows_output(store.mode(), text, "sql://execute_sql/result", rows)
        }
        ExecOutcome::Affected(count) => ToolOutput::text(annotate(
            store.mode(),
            format!("Statement executed, {} row(s) affected", count),
        )),
    })
}

async fn list_tables(store: Arc<dyn DataStore>, arguments: Value) -> Result<ToolOutput, ToolError> {
    let schemas: Vec<String> = match arguments.get("schemas").and_then(Value::as_array) {
        Some(items) if !items.is_empty() => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => vec!["public".to_string()],
    };
    let include_views = arguments
        .get("include_views")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let rows = store
        .fetch(
            &Statement::new("list_tables", LIST_TABLES_SQL)
                .bind(SqlParam::TextArray(schemas))
                .bind(SqlParam::Bool(include_views)),
        )
        .await?;
    let text = if rows.is_empty() {
        "(no tables)".to_string()
    } else {
        rows.iter()
            .map(|row| format!("{}.{}", cell(row, "table_schema"), cell(row, "table_name")))
            .collect::<Vec<_>>()
            .join("\n")
    };
    Ok(rows_output(store.mode(), text, "sql://list_tables", rows))
}

async fn check_health(store: Arc<dyn DataStore>, _arguments: Value) -> Result<ToolOutput, ToolError> {
    let started = Instant::now();
    store.fetch(&Statement::new("check_health", CHECK_HEALTH_SQL)).await?;
    let elapsed = started.elapsed().as_millis();
    Ok(ToolOutput::text(annotate(
        store.mode(),
        format!("Database healthy ({} ms)", elapsed),
    )))
}

async fn list_extensions(store: Arc<dyn DataStore>, _arguments: Value) -> Result<ToolOutput, ToolError> {
    let rows = store
        .fetch(&Statement::new("list_extensions", LIST_EXTENSIONS_SQL))
        .await?;
    let text = render_rows(&rows, &["extname", "extversion"], "(no extensions)");
    Ok(rows_output(store.mode(), text, "sql://list_extensions", rows))
}

async fn get_database_stats(store: Arc<dyn DataStore>, _arguments: Value) -> Result<ToolOutput, ToolError> {
    let rows = store
        .fetch(&Statement::new("get_database_stats", DATABASE_STATS_SQL))
        .await?;
    let text = match rows.first() {
        Some(row) => ["database", "size", "connections", "version"]
            .iter()
            .map(|column| format!("{}: {}", column, cell(row, column)))
            .collect::<Vec<_>>()
            .join("\n"),
        None => "(no statistics)".to_string(),
    };
    Ok(rows_output(store.mode(), text, "sql://get_database_stats", rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::{StoreError, StoreResult};
    use crate::store::testing::{EmptyStore, RefusingStore};
    use crate::store::{Row, SimulatedStore, StoreMode, exec_outcome, insert_column};
    use async_trait::async_trait;
    use serde_json::json;

    async fn call(store: Arc<dyn DataStore>, tool: &str, arguments: Value) -> Result<ToolOutput, ToolError> {
        let mut registry = ToolRegistry::new();
        register(&mut registry, &store).unwrap();
        registry.lookup(tool)?.invoke(arguments).await
    }

    #[tokio::test]
    async fn list_tables_defaults_to_public() {
        let output = call(Arc::new(SimulatedStore), "list_tables", json!({})).await.unwrap();
        let text = output.plain_text();
        assert!(text.starts_with("public.comments\npublic.posts\npublic.profiles\npublic.users"));
        assert!(text.contains("[simulation mode"));
        assert_eq!(output.content.len(), 2);
    }

    #[tokio::test]
    async fn list_tables_reports_empty_schemas() {
        let output = call(Arc::new(EmptyStore), "list_tables", json!({"schemas": ["audit"]}))
            .await
            .unwrap();
        assert_eq!(output.plain_text(), "(no tables)");
    }

    #[tokio::test]
    async fn execute_sql_reports_affected_rows() {
        let output = call(Arc::new(EmptyStore), "execute_sql", json!({"sql": "delete from t"}))
            .await
            .unwrap();
        assert_eq!(output.plain_text(), "Statement executed, 3 row(s) affected");
    }

    /// Answers free-form SQL like `select * from a join b` would.
    struct JoinStore;

    #[async_trait]
    impl DataStore for JoinStore {
        fn mode(&self) -> StoreMode {
            StoreMode::Postgres
        }

        async fn fetch(&self, _statement: &Statement) -> StoreResult<Vec<Row>> {
            Ok(Vec::new())
        }

        async fn execute(&self, sql: &str) -> StoreResult<ExecOutcome> {
            let mut row = Row::new();
            for (name, value) in [("name", json!("a")), ("id", json!(1)), ("id", json!(2))] {
                insert_column(&mut row, name, value);
            }
            Ok(exec_outcome(vec![row], 1, sql))
        }
    }

    #[tokio::test]
    async fn execute_sql_keeps_column_order_and_duplicate_columns() {
        let output = call(Arc::new(JoinStore), "execute_sql", json!({"sql": "-- joined\ntable a"}))
            .await
            .unwrap();
        let text = output.plain_text();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("1 row(s) returned"));
        assert_eq!(lines.next(), Some("name  id  id_2"));
        assert_eq!(lines.next(), Some("a  1  2"));
    }

    #[tokio::test]
    async fn execute_sql_rejects_blank_sql() {
        let err = call(Arc::new(EmptyStore), "execute_sql", json!({"sql": "   "}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn store_failures_surface_as_store_errors() {
        let err = call(Arc::new(RefusingStore), "check_health", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Store(StoreError::Unavailable(_))));
    }

    #[tokio::test]
    async fn stats_render_one_line_per_field() {
        let output = call(Arc::new(SimulatedStore), "get_database_stats", json!({}))
            .await
            .unwrap();
        let text = output.plain_text();
        assert!(text.contains("database: postgres"));
        assert!(text.contains("connections: 3"));
    }
}
