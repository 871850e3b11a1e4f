//! Query execution against registered external databases.
//!
//! An [`ExternalDataSource`] pairs a dialect with connection parameters and
//! compiles every request through the dialect's profile. Statement
//! compilation is pure and covered by unit tests; execution dispatches to the
//! per-vendor driver modules, each of which opens a short-lived pool for the
//! call and closes it before returning.

use async_trait::async_trait;
use serde_json::Value;

use crate::dialect::Dialect;
use crate::error::{EngineError, Result};
use crate::identifier;
use crate::models::{
    AggregationRequest, AggregationResult, ColumnInfo, ConnectionInfo, FieldDefinition,
    FilterClause, QueryOptions, RecordData, TableInfo,
};
use crate::normalize;
use crate::sql::{self, ResolvedColumn, Statement};

#[cfg(feature = "mssql")]
mod mssql;
mod mysql;
mod oracle;
#[cfg(feature = "postgres")]
mod postgres;

/// Fallback primary key column when no field maps one.
const DEFAULT_PK: &str = "id";

/// One vendor's execution surface: connect, run, normalize, disconnect.
///
/// Implementations hold no state; connection parameters arrive per call and
/// any pool or socket they open is closed before the call returns.
#[async_trait]
trait DialectExecutor: Send + Sync {
    /// Opens a connection, runs a liveness probe, and closes it.
    async fn ping(&self, info: &ConnectionInfo) -> Result<()>;

    /// Runs one compiled statement and normalizes the rows.
    async fn fetch_all(&self, info: &ConnectionInfo, stmt: &Statement) -> Result<Vec<RecordData>>;
}

/// Selects the executor for a dialect. Dialects whose driver feature is not
/// compiled in, and Oracle, report the capability gap.
fn executor(dialect: Dialect) -> Result<&'static dyn DialectExecutor> {
    match dialect {
        Dialect::MySql => Ok(&mysql::MySqlExecutor),
        #[cfg(feature = "postgres")]
        Dialect::Postgres => Ok(&postgres::PostgresExecutor),
        #[cfg(not(feature = "postgres"))]
        Dialect::Postgres => Err(EngineError::unsupported_feature(
            "query execution (compile with --features postgres)",
            "PostgreSQL",
        )),
        #[cfg(feature = "mssql")]
        Dialect::SqlServer => Ok(&mssql::SqlServerExecutor),
        #[cfg(not(feature = "mssql"))]
        Dialect::SqlServer => Err(EngineError::unsupported_feature(
            "query execution (compile with --features mssql)",
            "SQL Server",
        )),
        Dialect::Oracle => Err(oracle::unsupported("query execution")),
        Dialect::Internal => Err(EngineError::configuration(
            "the internal store is not an external datasource",
        )),
    }
}

/// A registered external database: dialect plus connection parameters.
///
/// Holds no connection state; every call connects, runs, and disconnects.
pub struct ExternalDataSource {
    dialect: Dialect,
    info: ConnectionInfo,
}

impl ExternalDataSource {
    /// Creates a datasource for an external dialect.
    ///
    /// # Errors
    /// The internal store is not reachable through this surface.
    pub fn new(dialect: Dialect, info: ConnectionInfo) -> Result<Self> {
        if dialect == Dialect::Internal {
            return Err(EngineError::configuration(
                "the internal store is not an external datasource",
            ));
        }
        Ok(Self { dialect, info })
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Driver name and vendor-conventional connection string for handoff to
    /// tooling that manages its own connections. The string embeds
    /// credentials; it must never be logged unredacted.
    pub fn connection(&self) -> Result<(&'static str, String)> {
        let profile = self.dialect.profile();
        Ok((profile.driver_name()?, profile.dsn(&self.info)?))
    }

    /// Opens a connection, pings it, and closes it.
    pub async fn test_connection(&self) -> Result<()> {
        tracing::debug!(dialect = %self.dialect, target = %self.info, "testing connection");
        executor(self.dialect)?.ping(&self.info).await
    }

    /// Lists tables and views visible to the connection.
    pub async fn list_tables(&self) -> Result<Vec<TableInfo>> {
        let stmt = Statement::new(self.dialect.profile().tables_query()?);
        let rows = self.fetch(&stmt).await.map_err(catalog_error)?;
        Ok(rows.iter().map(table_from_row).collect())
    }

    /// Lists the columns of one table, with primary-key and nullability
    /// flags.
    pub async fn list_columns(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        identifier::validate(table)?;
        let stmt = Statement {
            sql: self.dialect.profile().columns_query()?.to_string(),
            params: vec![Value::String(table.to_string())],
        };
        let rows = self.fetch(&stmt).await.map_err(catalog_error)?;
        Ok(rows.iter().map(column_from_row).collect())
    }

    /// Lists records with filtering, sorting, and pagination, plus the total
    /// count for the same WHERE clause.
    pub async fn list(
        &self,
        table: &str,
        fields: &[FieldDefinition],
        options: &QueryOptions,
    ) -> Result<(Vec<RecordData>, u64)> {
        let (count_stmt, select_stmt) = build_list(self.dialect, table, fields, options)?;
        let total = normalize::scan_count(&self.fetch(&count_stmt).await?);
        let records = self.fetch(&select_stmt).await?;
        Ok((records, total))
    }

    /// Fetches one record by primary key value; `None` when no row matches.
    pub async fn get_by_id(
        &self,
        table: &str,
        fields: &[FieldDefinition],
        id: &str,
    ) -> Result<Option<RecordData>> {
        let stmt = build_get_by_id(self.dialect, table, fields, id)?;
        let rows = self.fetch(&stmt).await?;
        Ok(rows.into_iter().next())
    }

    /// Runs a GROUP-BY aggregation.
    pub async fn aggregate(
        &self,
        table: &str,
        fields: &[FieldDefinition],
        request: &AggregationRequest,
    ) -> Result<AggregationResult> {
        let stmt = build_aggregation(self.dialect, table, fields, request)?;
        let rows = self.fetch(&stmt).await?;
        let label = match request.y_field.as_deref() {
            Some(y) if request.aggregation != crate::models::Aggregation::Count => {
                format!("{}({})", request.aggregation, y)
            }
            _ => format!("{}(*)", request.aggregation),
        };
        Ok(normalize::collect_aggregation(&rows, label))
    }

    /// Total rows matching the filters.
    pub async fn count(
        &self,
        table: &str,
        fields: &[FieldDefinition],
        filters: &[FilterClause],
    ) -> Result<u64> {
        let stmt = build_filtered_count(self.dialect, table, fields, filters)?;
        Ok(normalize::scan_count(&self.fetch(&stmt).await?))
    }

    async fn fetch(&self, stmt: &Statement) -> Result<Vec<RecordData>> {
        tracing::debug!(dialect = %self.dialect, sql = %stmt.sql, "executing external statement");
        executor(self.dialect)?.fetch_all(&self.info, stmt).await
    }
}

/// Resolves a field code to its quoted physical column. Both the code and
/// the physical name pass the identifier guard; unknown codes are rejected.
/// The bind type follows the field's declared type.
fn resolve_physical<'a>(
    dialect: Dialect,
    fields: &'a [FieldDefinition],
) -> impl Fn(&str) -> Result<ResolvedColumn> + 'a {
    move |name: &str| {
        identifier::validate(name)?;
        let field = fields
            .iter()
            .find(|field| field.code == name)
            .ok_or_else(|| EngineError::configuration(format!("unknown field '{}'", name)))?;
        let sql = identifier::quote(dialect, field.physical_column())?;
        Ok(if field.field_type.is_numeric() {
            ResolvedColumn::numeric(sql)
        } else {
            ResolvedColumn::text(sql)
        })
    }
}

/// Physical primary key column: the field mapped to `id` (by code or source
/// column), else the literal `id`.
fn pk_physical<'a>(fields: &'a [FieldDefinition]) -> &'a str {
    fields
        .iter()
        .find(|field| field.code == DEFAULT_PK || field.physical_column() == DEFAULT_PK)
        .map(FieldDefinition::physical_column)
        .unwrap_or(DEFAULT_PK)
}

/// Reclassifies driver failures from catalog introspection so callers can
/// tell a broken metadata query from a broken data query.
fn catalog_error(error: EngineError) -> EngineError {
    match error {
        EngineError::Query { context, source } => EngineError::Catalog { context, source },
        other => other,
    }
}

/// Surrogate keys are numeric unless a field remaps the key to a typed column.
fn pk_numeric(fields: &[FieldDefinition]) -> bool {
    fields
        .iter()
        .find(|field| field.code == DEFAULT_PK || field.physical_column() == DEFAULT_PK)
        .map(|field| field.field_type.is_numeric())
        .unwrap_or(true)
}

/// Projection list: each field's physical column aliased back to its code,
/// primary key first when no field maps it.
fn build_select_list(dialect: Dialect, fields: &[FieldDefinition]) -> Result<String> {
    let mut parts = Vec::with_capacity(fields.len() + 1);
    let pk = pk_physical(fields);
    if !fields.iter().any(|field| field.physical_column() == pk) {
        parts.push(format!(
            "{} AS {}",
            identifier::quote(dialect, pk)?,
            identifier::quote(dialect, DEFAULT_PK)?
        ));
    }
    for field in fields {
        parts.push(format!(
            "{} AS {}",
            identifier::quote(dialect, field.physical_column())?,
            identifier::quote(dialect, &field.code)?
        ));
    }
    Ok(parts.join(", "))
}

pub(crate) fn build_list(
    dialect: Dialect,
    table: &str,
    fields: &[FieldDefinition],
    options: &QueryOptions,
) -> Result<(Statement, Statement)> {
    let profile = dialect.profile();
    let table_q = identifier::quote(dialect, table)?;
    let resolve = resolve_physical(dialect, fields);

    let mut index = 1;
    let (where_sql, where_params) =
        sql::build_where(profile, &options.filters, &resolve, &mut index)?;
    let count_stmt = sql::build_count(&table_q, &where_sql, where_params.clone());

    let order_sql = sql::build_order(
        options.sort_field.as_deref(),
        options.sort_direction,
        &resolve,
        &identifier::quote(dialect, pk_physical(fields))?,
    )?;

    let select_stmt = Statement {
        sql: format!(
            "SELECT {} FROM {}{}{} {}",
            build_select_list(dialect, fields)?,
            table_q,
            where_sql,
            order_sql,
            profile.pagination(options.limit.max(1), options.offset()),
        ),
        params: where_params,
    };
    Ok((count_stmt, select_stmt))
}

pub(crate) fn build_get_by_id(
    dialect: Dialect,
    table: &str,
    fields: &[FieldDefinition],
    id: &str,
) -> Result<Statement> {
    let profile = dialect.profile();
    let table_q = identifier::quote(dialect, table)?;
    let pk = identifier::quote(dialect, pk_physical(fields))?;

    Ok(Statement {
        sql: format!(
            "SELECT {} FROM {} WHERE {} = {} ORDER BY {} {}",
            build_select_list(dialect, fields)?,
            table_q,
            pk,
            profile.placeholder(1),
            pk,
            profile.pagination(1, 0),
        ),
        params: vec![sql::scalar_param(id, pk_numeric(fields))],
    })
}

pub(crate) fn build_aggregation(
    dialect: Dialect,
    table: &str,
    fields: &[FieldDefinition],
    request: &AggregationRequest,
) -> Result<Statement> {
    let profile = dialect.profile();
    let table_q = identifier::quote(dialect, table)?;
    let resolve = resolve_physical(dialect, fields);

    let x_column = resolve(&request.x_field)?;
    let y_column = match request.y_field.as_deref() {
        Some(y) => Some(resolve(y)?),
        None => None,
    };

    let mut index = 1;
    let (where_sql, params) = sql::build_where(profile, &request.filters, &resolve, &mut index)?;
    sql::build_aggregate(
        &table_q,
        &x_column.sql,
        request.aggregation,
        y_column.as_ref().map(|column| column.sql.as_str()),
        &where_sql,
        params,
    )
}

pub(crate) fn build_filtered_count(
    dialect: Dialect,
    table: &str,
    fields: &[FieldDefinition],
    filters: &[FilterClause],
) -> Result<Statement> {
    let profile = dialect.profile();
    let table_q = identifier::quote(dialect, table)?;
    let resolve = resolve_physical(dialect, fields);

    let mut index = 1;
    let (where_sql, params) = sql::build_where(profile, filters, &resolve, &mut index)?;
    Ok(sql::build_count(&table_q, &where_sql, params))
}

fn as_text(value: Option<&Value>) -> Option<String> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => Some(other.to_string()),
    }
}

/// Catalog flags arrive as whatever the vendor emits: YES/NO text, Y/N
/// text, 0/1 numbers, or booleans.
fn truthy(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => {
            s.eq_ignore_ascii_case("yes") || s.eq_ignore_ascii_case("y") || s == "1"
        }
        _ => false,
    }
}

fn table_from_row(row: &RecordData) -> TableInfo {
    TableInfo {
        name: as_text(row.get_ignore_case("table_name")).unwrap_or_default(),
        schema: as_text(row.get_ignore_case("table_schema")),
        is_view: as_text(row.get_ignore_case("table_type"))
            .is_some_and(|t| t.to_ascii_uppercase().contains("VIEW")),
    }
}

fn column_from_row(row: &RecordData) -> ColumnInfo {
    ColumnInfo {
        name: as_text(row.get_ignore_case("column_name")).unwrap_or_default(),
        data_type: as_text(row.get_ignore_case("data_type")).unwrap_or_default(),
        nullable: truthy(row.get_ignore_case("is_nullable")),
        is_primary_key: truthy(row.get_ignore_case("is_primary")),
        default_value: as_text(row.get_ignore_case("column_default")),
    }
}
