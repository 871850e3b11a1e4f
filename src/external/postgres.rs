//! External PostgreSQL execution over a short-lived pool.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};

use super::DialectExecutor;
use crate::error::{EngineError, Result};
use crate::models::{ConnectionInfo, RecordData};
use crate::normalize;
use crate::sql::Statement;

pub(super) struct PostgresExecutor;

#[async_trait]
impl DialectExecutor for PostgresExecutor {
    async fn ping(&self, info: &ConnectionInfo) -> Result<()> {
        ping(info).await
    }

    async fn fetch_all(&self, info: &ConnectionInfo, stmt: &Statement) -> Result<Vec<RecordData>> {
        fetch_all(info, stmt).await
    }
}

fn pool(info: &ConnectionInfo) -> PgPool {
    let options = PgConnectOptions::new()
        .host(&info.host)
        .port(info.port)
        .database(&info.database)
        .username(&info.username)
        .password(&info.password);

    PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(60))
        .test_before_acquire(true)
        .connect_lazy_with(options)
}

/// Postgres has no unsigned integer type; out-of-range values clamp.
fn clamp_u64(u: u64) -> i64 {
    i64::try_from(u).unwrap_or(i64::MAX)
}

fn bind_pg<'q>(
    query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
    value: &Value,
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    match value {
        Value::Null => query.bind(Option::<String>::None),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                query.bind(i)
            } else if let Some(u) = n.as_u64() {
                query.bind(clamp_u64(u))
            } else {
                query.bind(n.as_f64().unwrap_or(0.0))
            }
        }
        Value::String(s) => query.bind(s.clone()),
        other => query.bind(other.to_string()),
    }
}

async fn ping(info: &ConnectionInfo) -> Result<()> {
    let pool = pool(info);
    let result = sqlx::query("SELECT 1").execute(&pool).await;
    pool.close().await;
    result.map_err(|e| EngineError::connection_failed(format!("ping {}", info), e))?;
    Ok(())
}

async fn fetch_all(info: &ConnectionInfo, stmt: &Statement) -> Result<Vec<RecordData>> {
    let pool = pool(info);
    let mut query = sqlx::query(&stmt.sql);
    for param in &stmt.params {
        query = bind_pg(query, param);
    }
    let rows = query.fetch_all(&pool).await;
    pool.close().await;

    rows.map_err(|e| EngineError::query_failed(format!("query against {}", info), e))?
        .iter()
        .map(normalize::decode_pg_row)
        .collect()
}
