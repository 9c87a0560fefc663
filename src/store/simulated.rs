//! Canned fixture data served when `MCP_SIMULATION_MODE` is on

use async_trait::async_trait;
use serde_json::{Value, json};

use super::{DataStore, ExecOutcome, Row, SqlParam, Statement, StoreMode, exec_outcome};
use crate::core::error::StoreResult;

/// Answers every catalogue query from fixtures keyed by statement name.
/// Free-form SQL is accepted and produces no rows.
pub struct SimulatedStore;

fn rows(value: Value) -> Vec<Row> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::Object(row) => Some(row),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn tables() -> Vec<Row> {
    rows(json!([
        {"table_schema": "public", "table_name": "comments"},
        {"table_schema": "public", "table_name": "posts"},
        {"table_schema": "public", "table_name": "profiles"},
        {"table_schema": "public", "table_name": "users"},
        {"table_schema": "storage", "table_name": "buckets"},
        {"table_schema": "storage", "table_name": "objects"}
    ]))
}

fn users() -> Vec<Row> {
    rows(json!([
        {"id": "8d0fd2b3-9ca7-4d9e-a95f-9e13dded323e", "email": "alice@example.com",
         "created_at": "2024-01-15 09:30:00+00", "last_sign_in_at": "2024-06-01 08:00:00+00"},
        {"id": "4b9c4f3e-2a1d-4e8f-9b7a-6c5d4e3f2a1b", "email": "bob@example.com",
         "created_at": "2024-02-20 14:10:00+00", "last_sign_in_at": null}
    ]))
}

fn objects() -> Vec<Row> {
    rows(json!([
        {"bucket_id": "avatars", "name": "alice.png", "size": "20480", "created_at": "2024-01-15 09:31:00+00"},
        {"bucket_id": "avatars", "name": "bob.png", "size": "18112", "created_at": "2024-02-20 14:12:00+00"},
        {"bucket_id": "public-assets", "name": "logo.svg", "size": "4096", "created_at": "2024-01-02 12:00:00+00"}
    ]))
}

fn column_matches(row: &Row, column: &str, wanted: &str) -> bool {
    row.get(column).and_then(Value::as_str) == Some(wanted)
}

#[async_trait]
impl DataStore for SimulatedStore {
    fn mode(&self) -> StoreMode {
        StoreMode::Simulation
    }

    async fn fetch(&self, statement: &Statement) -> StoreResult<Vec<Row>> {
        let fixture = match statement.name {
            "check_health" => rows(json!([{"ok": 1}])),
            "list_tables" => {
                let schemas = match statement.params.first() {
                    Some(SqlParam::TextArray(schemas)) => schemas.clone(),
                    _ => vec!["public".to_string()],
                };
                tables()
                    .into_iter()
                    .filter(|row| schemas.iter().any(|schema| column_matches(row, "table_schema", schema)))
                    .collect()
            }
            "list_extensions" => rows(json!([
                {"extname": "pg_graphql", "extversion": "1.5.1"},
                {"extname": "pgcrypto", "extversion": "1.3"},
                {"extname": "plpgsql", "extversion": "1.0"},
                {"extname": "uuid-ossp", "extversion": "1.1"}
            ])),
            "get_database_stats" => rows(json!([{
                "database": "postgres",
                "size": "12 MB",
                "connections": 3,
                "version": "PostgreSQL 15.1 (simulated)"
            }])),
            "list_auth_users" => users(),
            "get_auth_user_by_id" => match statement.text_param(0) {
                Some(id) => users().into_iter().filter(|row| column_matches(row, "id", id)).collect(),
                None => Vec::new(),
            },
            "get_auth_user_by_email" => match statement.text_param(0) {
                Some(email) => users()
                    .into_iter()
                    .filter(|row| column_matches(row, "email", email))
                    .collect(),
                None => Vec::new(),
            },
            "list_storage_buckets" => rows(json!([
                {"id": "avatars", "name": "avatars", "public": false, "created_at": "2024-01-01 00:00:00+00"},
                {"id": "public-assets", "name": "public-assets", "public": true, "created_at": "2024-01-01 00:00:00+00"}
            ])),
            "list_storage_objects" => match statement.text_param(0) {
                Some(bucket) => objects()
                    .into_iter()
                    .filter(|row| column_matches(row, "bucket_id", bucket))
                    .collect(),
                None => Vec::new(),
            },
            _ => Vec::new(),
        };
        Ok(fixture)
    }

    async fn execute(&self, sql: &str) -> StoreResult<ExecOutcome> {
        Ok(exec_outcome(Vec::new(), 0, sql))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn list_tables_fixture_honours_requested_schemas() {
        let store = SimulatedStore;
        let public = store
            .fetch(&Statement::new("list_tables", "").bind(SqlParam::TextArray(vec!["public".into()])))
            .await
            .unwrap();
        assert_eq!(public.len(), 4);

        let storage = store
            .fetch(&Statement::new("list_tables", "").bind(SqlParam::TextArray(vec!["storage".into()])))
            .await
            .unwrap();
        assert_eq!(storage.len(), 2);
    }

    #[tokio::test]
    async fn user_lookup_filters_fixtures() {
        let store = SimulatedStore;
        let found = store
            .fetch(&Statement::new("get_auth_user_by_email", "").bind(SqlParam::Text("bob@example.com".into())))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);

        let missing = store
            .fetch(&Statement::new("get_auth_user_by_id", "").bind(SqlParam::Text("nope".into())))
            .await
            .unwrap();
        assert!(missing.is_empty());
    }
}
