//! External SQL Server execution over a per-call TDS connection.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::Value;
use tiberius::{AuthMethod, Client, ColumnData, Config, FromSql};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

use async_trait::async_trait;

use super::DialectExecutor;
use crate::error::{EngineError, Result};
use crate::models::{ConnectionInfo, RecordData};
use crate::normalize;
use crate::sql::Statement;

pub(super) struct SqlServerExecutor;

#[async_trait]
impl DialectExecutor for SqlServerExecutor {
    async fn ping(&self, info: &ConnectionInfo) -> Result<()> {
        ping(info).await
    }

    async fn fetch_all(&self, info: &ConnectionInfo, stmt: &Statement) -> Result<Vec<RecordData>> {
        fetch_all(info, stmt).await
    }
}

async fn connect(info: &ConnectionInfo) -> Result<Client<Compat<TcpStream>>> {
    let mut config = Config::new();
    config.host(&info.host);
    config.port(info.port);
    config.database(&info.database);
    config.authentication(AuthMethod::sql_server(&info.username, &info.password));
    config.trust_cert();

    let tcp = TcpStream::connect(config.get_addr())
        .await
        .map_err(|e| EngineError::connection_failed(format!("connect to {}", info), e))?;
    tcp.set_nodelay(true)
        .map_err(|e| EngineError::connection_failed(format!("connect to {}", info), e))?;

    Client::connect(config, tcp.compat_write())
        .await
        .map_err(|e| EngineError::connection_failed(format!("handshake with {}", info), e))
}

/// Owned parameter value bridging compiled statements to the TDS wire.
enum SqlParam {
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    Text(String),
}

impl SqlParam {
    fn from_value(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::I64(i)
                } else {
                    Self::F64(n.as_f64().unwrap_or(0.0))
                }
            }
            Value::String(s) => Self::Text(s.clone()),
            other => Self::Text(other.to_string()),
        }
    }
}

impl tiberius::ToSql for SqlParam {
    fn to_sql(&self) -> ColumnData<'_> {
        match self {
            Self::Null => ColumnData::String(None),
            Self::Bool(b) => ColumnData::Bit(Some(*b)),
            Self::I64(i) => ColumnData::I64(Some(*i)),
            Self::F64(f) => ColumnData::F64(Some(*f)),
            Self::Text(s) => ColumnData::String(Some(s.as_str().into())),
        }
    }
}

async fn ping(info: &ConnectionInfo) -> Result<()> {
    let mut client = connect(info).await?;
    client
        .simple_query("SELECT 1")
        .await
        .map_err(|e| EngineError::connection_failed(format!("ping {}", info), e))?
        .into_results()
        .await
        .map_err(|e| EngineError::connection_failed(format!("ping {}", info), e))?;
    client
        .close()
        .await
        .map_err(|e| EngineError::connection_failed(format!("close {}", info), e))
}

async fn fetch_all(info: &ConnectionInfo, stmt: &Statement) -> Result<Vec<RecordData>> {
    let mut client = connect(info).await?;
    let params: Vec<SqlParam> = stmt.params.iter().map(SqlParam::from_value).collect();
    let refs: Vec<&dyn tiberius::ToSql> =
        params.iter().map(|p| p as &dyn tiberius::ToSql).collect();

    let rows = client
        .query(&stmt.sql, &refs)
        .await
        .map_err(|e| EngineError::query_failed(format!("query against {}", info), e))?
        .into_first_result()
        .await
        .map_err(|e| EngineError::query_failed(format!("query against {}", info), e))?;
    client
        .close()
        .await
        .map_err(|e| EngineError::connection_failed(format!("close {}", info), e))?;

    let mut records = Vec::with_capacity(rows.len());
    for row in &rows {
        records.push(decode_row(row, info)?);
    }
    Ok(records)
}

fn decode_row(row: &tiberius::Row, info: &ConnectionInfo) -> Result<RecordData> {
    let mut record = RecordData::new();
    for (column, data) in row.cells() {
        let value = decode_cell(data).map_err(|e| {
            EngineError::query_failed(
                format!("decoding column '{}' from {}", column.name(), info),
                e,
            )
        })?;
        record.insert(column.name().to_string(), value);
    }
    Ok(record)
}

fn decode_cell(
    data: &ColumnData<'static>,
) -> std::result::Result<Value, tiberius::error::Error> {
    let value = match data {
        ColumnData::Bit(v) => (*v).map(Value::from),
        ColumnData::U8(v) => (*v).map(|n| Value::from(u64::from(n))),
        ColumnData::I16(v) => (*v).map(|n| Value::from(i64::from(n))),
        ColumnData::I32(v) => (*v).map(|n| Value::from(i64::from(n))),
        ColumnData::I64(v) => (*v).map(Value::from),
        ColumnData::F32(v) => (*v).map(|n| Value::from(f64::from(n))),
        ColumnData::F64(v) => (*v).map(Value::from),
        ColumnData::Numeric(v) => (*v).map(|n| Value::from(f64::from(n))),
        ColumnData::String(v) => v.as_ref().map(|s| Value::String(s.to_string())),
        ColumnData::Guid(v) => (*v).map(|g| Value::String(g.to_string())),
        ColumnData::Binary(v) => v.as_ref().map(|b| normalize::bytes_value(b.to_vec())),
        ColumnData::Xml(v) => v.as_ref().map(|x| Value::String(x.as_ref().to_string())),
        ColumnData::Date(_) => NaiveDate::from_sql(data)?.map(normalize::date_value),
        ColumnData::Time(_) => NaiveTime::from_sql(data)?.map(normalize::time_value),
        ColumnData::SmallDateTime(_) | ColumnData::DateTime(_) | ColumnData::DateTime2(_) => {
            NaiveDateTime::from_sql(data)?.map(normalize::naive_datetime_value)
        }
        ColumnData::DateTimeOffset(_) => {
            DateTime::<Utc>::from_sql(data)?.map(normalize::datetime_utc_value)
        }
    };
    Ok(value.unwrap_or(Value::Null))
}
