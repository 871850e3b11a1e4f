//! External MySQL execution over a short-lived pool.

use std::time::Duration;

use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};

use async_trait::async_trait;

use super::DialectExecutor;
use crate::error::{EngineError, Result};
use crate::internal::bind_mysql;
use crate::models::{ConnectionInfo, RecordData};
use crate::normalize;
use crate::sql::Statement;

pub(super) struct MySqlExecutor;

#[async_trait]
impl DialectExecutor for MySqlExecutor {
    async fn ping(&self, info: &ConnectionInfo) -> Result<()> {
        ping(info).await
    }

    async fn fetch_all(&self, info: &ConnectionInfo, stmt: &Statement) -> Result<Vec<RecordData>> {
        fetch_all(info, stmt).await
    }
}

/// Lazy pool for one call. Connections are capped low and recycled quickly
/// since the pool lives only until the call returns.
fn pool(info: &ConnectionInfo) -> MySqlPool {
    let options = MySqlConnectOptions::new()
        .host(&info.host)
        .port(info.port)
        .database(&info.database)
        .username(&info.username)
        .password(&info.password);

    MySqlPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(60))
        .test_before_acquire(true)
        .connect_lazy_with(options)
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
        query = bind_mysql(query, param);
    }
    let rows = query.fetch_all(&pool).await;
    pool.close().await;

    rows.map_err(|e| EngineError::query_failed(format!("query against {}", info), e))?
        .iter()
        .map(normalize::decode_mysql_row)
        .collect()
}
