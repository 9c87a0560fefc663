/// Auth Tools
///
/// Read-only views of the users in Supabase's `auth.users` table.

use std::sync::Arc;

use serde_json::Value;

use super::{cell, limit_arg, render_rows, rows_output, str_arg, with_store};
use crate::core::content::ToolOutput;
use crate::core::error::{ServerResult, ToolError};
use crate::core::registry::{InputSchema, ParamType, ToolDescriptor, ToolRegistry};
use crate::store::{DataStore, SqlParam, Statement};

const DEFAULT_USER_LIMIT: i64 = 50;
const MAX_USER_LIMIT: i64 = 1000;

const USER_COLUMNS: &[&str] = &["id", "email", "created_at", "last_sign_in_at"];

const LIST_USERS_SQL: &str = "\
    select id::text as id, email::text as email, created_at::text as created_at, \
           last_sign_in_at::text as last_sign_in_at \
    from auth.users order by created_at desc limit $1";

const USER_BY_ID_SQL: &str = "\
    select id::text as id, email::text as email, created_at::text as created_at, \
           last_sign_in_at::text as last_sign_in_at \
    from auth.users where id::text = $1";

const USER_BY_EMAIL_SQL: &str = "\
    select id::text as id, email::text as email, created_at::text as created_at, \
           last_sign_in_at::text as last_sign_in_at \
    from auth.users where email::text = $1";

pub fn register(registry: &mut ToolRegistry, store: &Arc<dyn DataStore>) -> ServerResult<()> {
    registry.register(
        ToolDescriptor::new(
            "list_auth_users",
            "List users registered with Supabase Auth, newest first.",
            InputSchema::new().optional(
                "limit",
                ParamType::Integer,
                "Maximum number of users to return (default 50, max 1000)",
            ),
        ),
        with_store(store, list_auth_users),
    )?;

    registry.register(
        ToolDescriptor::new(
            "get_auth_user",
            "Look up a single Supabase Auth user by id or email.",
            InputSchema::new()
                .optional("id", ParamType::String, "User id (UUID)")
                .optional("email", ParamType::String, "User email address"),
        ),
        with_store(store, get_auth_user),
    )?;

    Ok(())
}

async fn list_auth_users(store: Arc<dyn DataStore>, arguments: Value) -> Result<ToolOutput, ToolError> {
    let limit = limit_arg(&arguments, "limit", DEFAULT_USER_LIMIT, MAX_USER_LIMIT)?;
    let rows = store
        .fetch(&Statement::new("list_auth_users", LIST_USERS_SQL).bind(SqlParam::Int(limit)))
        .await?;
    let text = render_rows(&rows, &["id", "email", "created_at"], "(no users)");
    Ok(rows_output(store.mode(), text, "auth://users", rows))
}

async fn get_auth_user(store: Arc<dyn DataStore>, arguments: Value) -> Result<ToolOutput, ToolError> {
    let statement = match (str_arg(&arguments, "id"), str_arg(&arguments, "email")) {
        (Some(id), _) => Statement::new("get_auth_user_by_id", USER_BY_ID_SQL).bind(SqlParam::Text(id.to_string())),
        (None, Some(email)) => {
            Statement::new("get_auth_user_by_email", USER_BY_EMAIL_SQL).bind(SqlParam::Text(email.to_string()))
        }
        (None, None) => {
            return Err(ToolError::InvalidArguments(
                "Either 'id' or 'email' is required".to_string(),
            ));
        }
    };

    let rows = store.fetch(&statement).await?;
    let text = match rows.first() {
        Some(user) => USER_COLUMNS
            .iter()
            .map(|column| format!("{}: {}", column, cell(user, column)))
            .collect::<Vec<_>>()
            .join("\n"),
        None => "User not found".to_string(),
    };
    Ok(rows_output(store.mode(), text, "auth://user", rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SimulatedStore;
    use crate::store::testing::EmptyStore;
    use serde_json::json;

    async fn call(store: Arc<dyn DataStore>, tool: &str, arguments: Value) -> Result<ToolOutput, ToolError> {
        let mut registry = ToolRegistry::new();
        register(&mut registry, &store).unwrap();
        registry.lookup(tool)?.invoke(arguments).await
    }

    #[tokio::test]
    async fn finds_user_by_email() {
        let output = call(Arc::new(SimulatedStore), "get_auth_user", json!({"email": "alice@example.com"}))
            .await
            .unwrap();
        let text = output.plain_text();
        assert!(text.contains("email: alice@example.com"));
        assert!(text.contains("id: 8d0fd2b3-9ca7-4d9e-a95f-9e13dded323e"));
    }

    #[tokio::test]
    async fn unknown_user_is_reported_not_failed() {
        let output = call(Arc::new(SimulatedStore), "get_auth_user", json!({"id": "00000000"}))
            .await
            .unwrap();
        assert!(output.plain_text().starts_with("User not found"));
    }

    #[tokio::test]
    async fn lookup_needs_id_or_email() {
        let err = call(Arc::new(SimulatedStore), "get_auth_user", json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(msg) if msg.contains("'id' or 'email'")));
    }

    #[tokio::test]
    async fn empty_user_table() {
        let output = call(Arc::new(EmptyStore), "list_auth_users", json!({"limit": 10}))
            .await
            .unwrap();
        assert_eq!(output.plain_text(), "(no users)");
    }
}
