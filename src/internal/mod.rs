//! The internal managed store: DDL and record operations over a shared,
//! long-lived MySQL pool.
//!
//! The pool is owned by the host and handed in at construction; unlike
//! external datasources, nothing here opens or closes connections per call.

use serde_json::Value;
use sqlx::MySqlPool;

use crate::error::{EngineError, Result};
use crate::models::RecordData;
use crate::normalize;
use crate::sql::Statement;

mod ddl;
mod records;

/// System-managed primary key column of every internal table.
pub const PK_COLUMN: &str = "id";
/// Actor reference written on insert.
pub const CREATED_BY_COLUMN: &str = "created_by";
/// Creation timestamp, database-managed default.
pub const CREATED_AT_COLUMN: &str = "created_at";
/// Update timestamp with touch-on-update semantics.
pub const UPDATED_AT_COLUMN: &str = "updated_at";

/// Columns owned by the engine; field codes may not collide with them.
pub const SYSTEM_COLUMNS: [&str; 4] = [
    PK_COLUMN,
    CREATED_BY_COLUMN,
    CREATED_AT_COLUMN,
    UPDATED_AT_COLUMN,
];

/// Handle to the internal store.
///
/// Stateless aside from the shared pool; safe to clone and use from many
/// tasks concurrently (the driver pool serializes access).
#[derive(Clone)]
pub struct InternalStore {
    pool: MySqlPool,
}

impl InternalStore {
    /// Wraps an existing pool. The caller keeps ownership of pool lifecycle.
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// The underlying pool, for hosts that need transaction-scoped work
    /// outside this engine.
    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    async fn execute(&self, stmt: &Statement, context: &str) -> Result<sqlx::mysql::MySqlQueryResult> {
        tracing::debug!(sql = %stmt.sql, "executing internal statement");
        let mut query = sqlx::query(&stmt.sql);
        for param in &stmt.params {
            query = bind_mysql(query, param);
        }
        query
            .execute(&self.pool)
            .await
            .map_err(|e| EngineError::query_failed(context.to_string(), e))
    }

    async fn fetch_all(&self, stmt: &Statement, context: &str) -> Result<Vec<RecordData>> {
        tracing::debug!(sql = %stmt.sql, "fetching internal rows");
        let mut query = sqlx::query(&stmt.sql);
        for param in &stmt.params {
            query = bind_mysql(query, param);
        }
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| EngineError::query_failed(context.to_string(), e))?;
        rows.iter().map(normalize::decode_mysql_row).collect()
    }
}

/// Binds one logical value onto a MySQL query. Arrays and objects are bound
/// as their JSON text (JSON columns accept it; everything else stores it as
/// text).
pub(crate) fn bind_mysql<'q>(
    query: sqlx::query::Query<'q, sqlx::MySql, sqlx::mysql::MySqlArguments>,
    value: &Value,
) -> sqlx::query::Query<'q, sqlx::MySql, sqlx::mysql::MySqlArguments> {
    match value {
        Value::Null => query.bind(Option::<String>::None),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                query.bind(i)
            } else if let Some(u) = n.as_u64() {
                query.bind(u)
            } else {
                query.bind(n.as_f64().unwrap_or_default())
            }
        }
        Value::String(s) => query.bind(s.clone()),
        other => query.bind(other.to_string()),
    }
}
