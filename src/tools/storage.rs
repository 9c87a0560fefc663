/// Storage Tools
///
/// Read-only views of Supabase Storage buckets and the objects they hold.

use std::sync::Arc;

use serde_json::Value;

use super::{limit_arg, render_rows, rows_output, str_arg, with_store};
use crate::core::content::ToolOutput;
use crate::core::error::{ServerResult, ToolError};
use crate::core::registry::{InputSchema, ParamType, ToolDescriptor, ToolRegistry};
use crate::store::{DataStore, SqlParam, Statement};

const DEFAULT_OBJECT_LIMIT: i64 = 100;
const MAX_OBJECT_LIMIT: i64 = 1000;

const LIST_BUCKETS_SQL: &str = "\
    select id::text as id, name::text as name, public, created_at::text as created_at \
    from storage.buckets order by name";

const LIST_OBJECTS_SQL: &str = "\
    select bucket_id::text as bucket_id, name::text as name, \
           (metadata->>'size')::text as size, created_at::text as created_at \
    from storage.objects where bucket_id = $1 order by name limit $2";

pub fn register(registry: &mut ToolRegistry, store: &Arc<dyn DataStore>) -> ServerResult<()> {
    registry.register(
        ToolDescriptor::new(
            "list_storage_buckets",
            "List the Supabase Storage buckets.",
            InputSchema::new(),
        ),
        with_store(store, list_storage_buckets),
    )?;

    registry.register(
        ToolDescriptor::new(
            "list_storage_objects",
            "List the objects stored in a Supabase Storage bucket.",
            InputSchema::new()
                .required("bucket_id", ParamType::String, "Bucket to list")
                .optional(
                    "limit",
                    ParamType::Integer,
                    "Maximum number of objects to return (default 100, max 1000)",
                ),
        ),
        with_store(store, list_storage_objects),
    )?;

    Ok(())
}

async fn list_storage_buckets(store: Arc<dyn DataStore>, _arguments: Value) -> Result<ToolOutput, ToolError> {
    let rows = store
        .fetch(&Statement::new("list_storage_buckets", LIST_BUCKETS_SQL))
        .await?;
    let text = render_rows(&rows, &["name", "public", "created_at"], "(no buckets)");
    Ok(rows_output(store.mode(), text, "storage://buckets", rows))
}

async fn list_storage_objects(store: Arc<dyn DataStore>, arguments: Value) -> Result<ToolOutput, ToolError> {
    let bucket = str_arg(&arguments, "bucket_id").unwrap_or_default().to_string();
    let limit = limit_arg(&arguments, "limit", DEFAULT_OBJECT_LIMIT, MAX_OBJECT_LIMIT)?;

    let uri = format!("storage://buckets/{}/objects", bucket);
    let rows = store
        .fetch(
            &Statement::new("list_storage_objects", LIST_OBJECTS_SQL)
                .bind(SqlParam::Text(bucket))
                .bind(SqlParam::Int(limit)),
        )
        .await?;
    let text = render_rows(&rows, &["name", "size", "created_at"], "(no objects)");
    Ok(rows_output(store.mode(), text, &uri, rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::content::ContentBlock;
    use crate::store::SimulatedStore;
    use serde_json::json;

    async fn call(tool: &str, arguments: Value) -> Result<ToolOutput, ToolError> {
        let store: Arc<dyn DataStore> = Arc::new(SimulatedStore);
        let mut registry = ToolRegistry::new();
        register(&mut registry, &store).unwrap();
        registry.lookup(tool)?.invoke(arguments).await
    }

    #[tokio::test]
    async fn lists_buckets() {
        let text = call("list_storage_buckets", json!({})).await.unwrap().plain_text();
        assert!(text.starts_with("avatars  false"));
        assert!(text.contains("public-assets  true"));
    }

    #[tokio::test]
    async fn objects_are_scoped_to_the_bucket() {
        let output = call("list_storage_objects", json!({"bucket_id": "avatars"})).await.unwrap();
        let text = output.plain_text();
        assert!(text.contains("alice.png"));
        assert!(!text.contains("logo.svg"));

        match &output.content[1] {
            ContentBlock::Resource { resource } => {
                assert_eq!(resource.uri, "storage://buckets/avatars/objects");
                let rows: Value = serde_json::from_str(&resource.text).unwrap();
                assert_eq!(rows.as_array().unwrap().len(), 2);
            }
            other => panic!("expected a resource block, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn unknown_bucket_has_no_objects() {
        let text = call("list_storage_objects", json!({"bucket_id": "missing"}))
            .await
            .unwrap()
            .plain_text();
        assert!(text.starts_with("(no objects)"));
    }
}
