//! Postgres-backed data store

use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::TryStreamExt;
use serde_json::{Map, Number, Value};
use sqlx::postgres::{PgConnectOptions, PgRow};
use sqlx::{Column, Connection, Either, Executor, PgConnection, Row as _, TypeInfo, ValueRef};
use tracing::debug;

use super::{DataStore, ExecOutcome, Row, SqlParam, Statement, StoreMode, exec_outcome, insert_column};
use crate::core::error::{ServerError, ServerResult, StoreError, StoreResult};

/// Opens a fresh connection for every call and closes it before returning.
/// No pool, no retries; connecting and each statement are bounded by
/// `timeout`.
pub struct PostgresStore {
    options: PgConnectOptions,
    timeout: Duration,
}

impl PostgresStore {
    pub fn new(database_url: &str, timeout: Duration) -> ServerResult<Self> {
        let options = PgConnectOptions::from_str(database_url)
            .map_err(|err| ServerError::Config(format!("invalid DATABASE_URL: {}", err)))?
            .application_name("supabase-mcp-server");
        Ok(Self { options, timeout })
    }

    async fn connect(&self) -> StoreResult<PgConnection> {
        match tokio::time::timeout(self.timeout, PgConnection::connect_with(&self.options)).await {
            Ok(Ok(connection)) => Ok(connection),
            Ok(Err(err)) => Err(StoreError::Unavailable(err.to_string())),
            Err(_) => Err(StoreError::Timeout(self.timeout)),
        }
    }

    async fn bounded<T, F>(&self, operation: F) -> StoreResult<T>
    where
        F: Future<Output = Result<T, sqlx::Error>>,
    {
        match tokio::time::timeout(self.timeout, operation).await {
            Ok(result) => result.map_err(classify),
            Err(_) => Err(StoreError::Timeout(self.timeout)),
        }
    }
}

#[async_trait]
impl DataStore for PostgresStore {
    fn mode(&self) -> StoreMode {
        StoreMode::Postgres
    }

    async fn fetch(&self, statement: &Statement) -> StoreResult<Vec<Row>> {
        let mut connection = self.connect().await?;

        let mut query = sqlx::query(statement.sql);
        for param in &statement.params {
            query = match param {
                SqlParam::Text(value) => query.bind(value.clone()),
                SqlParam::TextArray(values) => query.bind(values.clone()),
                SqlParam::Int(value) => query.bind(*value),
                SqlParam::Bool(value) => query.bind(*value),
            };
        }

        debug!(statement = statement.name, "running catalogue query");
        let result = self.bounded(query.fetch_all(&mut connection)).await;
        close(connection).await;

        result?.iter().map(convert_row).collect()
    }

    async fn execute(&self, sql: &str) -> StoreResult<ExecOutcome> {
        let mut connection = self.connect().await?;

        let result = self.bounded(run_script(&mut connection, sql)).await;
        close(connection).await;

        let (rows, affected) = result?;
        let rows = rows.iter().map(convert_row).collect::<StoreResult<Vec<_>>>()?;
        Ok(exec_outcome(rows, affected, sql))
    }
}

/// Run caller-supplied SQL and keep every row plus the summed affected count.
///
/// A bare &str goes over the simple query protocol: several statements are
/// allowed and every column arrives in text format.
async fn run_script(connection: &mut PgConnection, sql: &str) -> Result<(Vec<PgRow>, u64), sqlx::Error> {
    let mut rows = Vec::new();
    let mut affected = 0;
    let mut results = (&mut *connection).fetch_many(sql);
    while let Some(step) = results.try_next().await? {
        match step {
            Either::Left(done) => affected += done.rows_affected(),
            Either::Right(row) => rows.push(row),
        }
    }
    Ok((rows, affected))
}

async fn close(connection: PgConnection) {
    if let Err(err) = connection.close().await {
        debug!("error closing postgres connection: {}", err);
    }
}

/// Connectivity problems are "unavailable"; anything the server answered is
/// a query failure.
fn classify(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            StoreError::Unavailable(err.to_string())
        }
        _ => StoreError::Query(err.to_string()),
    }
}

fn convert_row(row: &PgRow) -> StoreResult<Row> {
    let mut object = Map::with_capacity(row.len());
    for column in row.columns() {
        let value = extract_column(row, column.ordinal(), column.type_info().name())?;
        insert_column(&mut object, column.name(), value);
    }
    Ok(object)
}

fn extract_column(row: &PgRow, idx: usize, type_name: &str) -> StoreResult<Value> {
    let raw = row.try_get_raw(idx).map_err(classify)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }

    let value = match type_name.to_ascii_uppercase().as_str() {
        "BOOL" => Value::Bool(row.try_get::<bool, _>(idx).map_err(classify)?),
        "INT2" => Value::from(row.try_get::<i16, _>(idx).map_err(classify)?),
        "INT4" => Value::from(row.try_get::<i32, _>(idx).map_err(classify)?),
        "INT8" => Value::from(row.try_get::<i64, _>(idx).map_err(classify)?),
        "FLOAT4" => float(row.try_get::<f32, _>(idx).map_err(classify)? as f64),
        "FLOAT8" => float(row.try_get::<f64, _>(idx).map_err(classify)?),
        "JSON" | "JSONB" => row.try_get::<Value, _>(idx).map_err(classify)?,
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => {
            Value::String(row.try_get::<String, _>(idx).map_err(classify)?)
        }
        // Text-format columns (simple query protocol) decode as their textual
        // representation; binary values of other types do not.
        other => row
            .try_get_unchecked::<String, _>(idx)
            .map(Value::String)
            .unwrap_or_else(|_| Value::String(format!("<{}>", other.to_ascii_lowercase()))),
    };
    Ok(value)
}

fn float(value: f64) -> Value {
    Number::from_f64(value).map(Value::Number).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_urls() {
        let err = PostgresStore::new("definitely not a url", Duration::from_secs(1))
            .err()
            .unwrap();
        assert!(matches!(err, ServerError::Config(_)));
    }

    #[tokio::test]
    async fn unreachable_server_is_unavailable_or_timeout() {
        // Port 1 on loopback refuses connections immediately on most hosts.
        let store = PostgresStore::new("postgres://app:pw@127.0.0.1:1/postgres", Duration::from_secs(2)).unwrap();
        let err = store.execute("select 1").await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_) | StoreError::Timeout(_)));
    }
}
