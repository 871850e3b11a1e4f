//! CRUD and aggregation against the internal store.
//!
//! Statements are compiled by pure builders (unit-tested directly) and
//! executed over the shared pool. Every caller-supplied name — record keys,
//! filter fields, sort fields — goes through the identifier guard via the
//! column resolver before it can reach SQL text.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::dialect::Dialect;
use crate::error::{EngineError, Result};
use crate::identifier;
use crate::models::{
    AggregationRequest, AggregationResult, FieldDefinition, QueryOptions, RecordData,
};
use crate::normalize;
use crate::sql::{self, ResolvedColumn, Statement};

use super::{InternalStore, CREATED_BY_COLUMN, PK_COLUMN, SYSTEM_COLUMNS, UPDATED_AT_COLUMN};

impl InternalStore {
    /// Inserts one record and returns the generated primary key.
    ///
    /// Record keys are validated as identifiers; the actor reference is
    /// written alongside the data.
    pub async fn insert(&self, table: &str, data: &RecordData, actor_id: i64) -> Result<u64> {
        let stmt = build_insert(table, data, actor_id)?;
        let result = self
            .execute(&stmt, &format!("insert into '{}'", table))
            .await?;
        Ok(result.last_insert_id())
    }

    /// Partially updates one record; keys absent from `data` are untouched.
    /// An empty `data` is a no-op.
    pub async fn update(&self, table: &str, record_id: u64, data: &RecordData) -> Result<()> {
        let Some(stmt) = build_update(table, record_id, data)? else {
            return Ok(());
        };
        self.execute(&stmt, &format!("update record {} in '{}'", record_id, table))
            .await?;
        Ok(())
    }

    /// Deletes one record by primary key.
    pub async fn delete(&self, table: &str, record_id: u64) -> Result<()> {
        let stmt = build_delete(table, record_id)?;
        self.execute(&stmt, &format!("delete record {} from '{}'", record_id, table))
            .await?;
        Ok(())
    }

    /// Deletes many records by primary key. An empty id list is a no-op.
    pub async fn delete_many(&self, table: &str, record_ids: &[u64]) -> Result<()> {
        let Some(stmt) = build_delete_many(table, record_ids)? else {
            return Ok(());
        };
        self.execute(&stmt, &format!("delete {} records from '{}'", record_ids.len(), table))
            .await?;
        Ok(())
    }

    /// Lists records with filtering, sorting, and pagination, returning the
    /// page plus the total count for the same WHERE clause.
    pub async fn list(
        &self,
        table: &str,
        fields: &[FieldDefinition],
        options: &QueryOptions,
    ) -> Result<(Vec<RecordData>, u64)> {
        let (count_stmt, select_stmt) = build_list(table, fields, options)?;
        let total = normalize::scan_count(
            &self
                .fetch_all(&count_stmt, &format!("count records in '{}'", table))
                .await?,
        );
        let records = self
            .fetch_all(&select_stmt, &format!("list records in '{}'", table))
            .await?;
        Ok((records, total))
    }

    /// Fetches one record by primary key; `None` when no such record exists.
    pub async fn get_by_id(&self, table: &str, record_id: u64) -> Result<Option<RecordData>> {
        let stmt = build_get_by_id(table, record_id)?;
        let rows = self
            .fetch_all(&stmt, &format!("get record {} from '{}'", record_id, table))
            .await?;
        Ok(rows.into_iter().next())
    }

    /// Runs a GROUP-BY aggregation and returns labels with one aligned
    /// series.
    pub async fn aggregate(
        &self,
        table: &str,
        fields: &[FieldDefinition],
        request: &AggregationRequest,
    ) -> Result<AggregationResult> {
        let stmt = build_aggregation(table, fields, request)?;
        let rows = self
            .fetch_all(&stmt, &format!("aggregate '{}' in '{}'", request.x_field, table))
            .await?;
        Ok(normalize::collect_aggregation(&rows, series_label(request)))
    }

    /// Total number of records in the table.
    pub async fn count_all(&self, table: &str) -> Result<u64> {
        let stmt = build_count_all(table)?;
        let rows = self
            .fetch_all(&stmt, &format!("count all records in '{}'", table))
            .await?;
        Ok(normalize::scan_count(&rows))
    }

    /// Number of records touched at or after `since`.
    pub async fn count_updated_since(&self, table: &str, since: DateTime<Utc>) -> Result<u64> {
        let stmt = build_count_updated_since(table, since)?;
        let rows = self
            .fetch_all(&stmt, &format!("count recent records in '{}'", table))
            .await?;
        Ok(normalize::scan_count(&rows))
    }
}

fn quote(name: &str) -> Result<String> {
    identifier::quote(Dialect::Internal, name)
}

/// Resolver for filter/sort fields: the name must be a declared field code
/// or a system column, and passes the identifier guard either way. The bind
/// type follows the column: numeric fields and the id/actor columns compare
/// numerically, everything else as text.
fn resolve_column<'a>(
    fields: &'a [FieldDefinition],
) -> impl Fn(&str) -> Result<ResolvedColumn> + 'a {
    move |name: &str| {
        identifier::validate(name)?;
        if SYSTEM_COLUMNS.contains(&name) {
            let sql = quote(name)?;
            return Ok(if name == PK_COLUMN || name == CREATED_BY_COLUMN {
                ResolvedColumn::numeric(sql)
            } else {
                ResolvedColumn::text(sql)
            });
        }
        let field = fields
            .iter()
            .find(|field| field.code == name)
            .ok_or_else(|| EngineError::configuration(format!("unknown field '{}'", name)))?;
        let sql = quote(name)?;
        Ok(if field.field_type.is_numeric() {
            ResolvedColumn::numeric(sql)
        } else {
            ResolvedColumn::text(sql)
        })
    }
}

fn series_label(request: &AggregationRequest) -> String {
    match request.y_field.as_deref() {
        Some(y) if request.aggregation != crate::models::Aggregation::Count => {
            format!("{}({})", request.aggregation, y)
        }
        _ => format!("{}(*)", request.aggregation),
    }
}

pub(crate) fn build_insert(table: &str, data: &RecordData, actor_id: i64) -> Result<Statement> {
    let table_q = quote(table)?;
    let mut columns = Vec::with_capacity(data.len() + 1);
    let mut params = Vec::with_capacity(data.len() + 1);

    for (key, value) in data.iter() {
        if SYSTEM_COLUMNS.contains(&key.as_str()) {
            return Err(EngineError::configuration(format!(
                "record key '{}' is a system column",
                key
            )));
        }
        columns.push(quote(key)?);
        params.push(value.clone());
    }
    columns.push(quote(CREATED_BY_COLUMN)?);
    params.push(Value::from(actor_id));

    let placeholders = vec!["?"; columns.len()].join(", ");
    Ok(Statement {
        sql: format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table_q,
            columns.join(", "),
            placeholders
        ),
        params,
    })
}

pub(crate) fn build_update(
    table: &str,
    record_id: u64,
    data: &RecordData,
) -> Result<Option<Statement>> {
    if data.is_empty() {
        return Ok(None);
    }
    let table_q = quote(table)?;
    let mut assignments = Vec::with_capacity(data.len());
    let mut params = Vec::with_capacity(data.len() + 1);

    for (key, value) in data.iter() {
        if SYSTEM_COLUMNS.contains(&key.as_str()) {
            return Err(EngineError::configuration(format!(
                "record key '{}' is a system column",
                key
            )));
        }
        assignments.push(format!("{} = ?", quote(key)?));
        params.push(value.clone());
    }
    params.push(Value::from(record_id));

    Ok(Some(Statement {
        sql: format!(
            "UPDATE {} SET {} WHERE {} = ?",
            table_q,
            assignments.join(", "),
            quote(PK_COLUMN)?
        ),
        params,
    }))
}

pub(crate) fn build_delete(table: &str, record_id: u64) -> Result<Statement> {
    Ok(Statement {
        sql: format!(
            "DELETE FROM {} WHERE {} = ?",
            quote(table)?,
            quote(PK_COLUMN)?
        ),
        params: vec![Value::from(record_id)],
    })
}

pub(crate) fn build_delete_many(table: &str, record_ids: &[u64]) -> Result<Option<Statement>> {
    if record_ids.is_empty() {
        return Ok(None);
    }
    let placeholders = vec!["?"; record_ids.len()].join(", ");
    Ok(Some(Statement {
        sql: format!(
            "DELETE FROM {} WHERE {} IN ({})",
            quote(table)?,
            quote(PK_COLUMN)?,
            placeholders
        ),
        params: record_ids.iter().map(|id| Value::from(*id)).collect(),
    }))
}

pub(crate) fn build_list(
    table: &str,
    fields: &[FieldDefinition],
    options: &QueryOptions,
) -> Result<(Statement, Statement)> {
    let profile = Dialect::Internal.profile();
    let table_q = quote(table)?;
    let resolve = resolve_column(fields);

    let mut index = 1;
    let (where_sql, where_params) = sql::build_where(profile, &options.filters, &resolve, &mut index)?;
    let count_stmt = sql::build_count(&table_q, &where_sql, where_params.clone());

    let order_sql = sql::build_order(
        options.sort_field.as_deref(),
        options.sort_direction,
        &resolve,
        &quote(PK_COLUMN)?,
    )?;

    let mut params = where_params;
    params.push(Value::from(options.limit.max(1)));
    params.push(Value::from(options.offset()));

    let select_stmt = Statement {
        sql: format!(
            "SELECT * FROM {}{}{} LIMIT ? OFFSET ?",
            table_q, where_sql, order_sql
        ),
        params,
    };
    Ok((count_stmt, select_stmt))
}

pub(crate) fn build_get_by_id(table: &str, record_id: u64) -> Result<Statement> {
    Ok(Statement {
        sql: format!(
            "SELECT * FROM {} WHERE {} = ? LIMIT 1",
            quote(table)?,
            quote(PK_COLUMN)?
        ),
        params: vec![Value::from(record_id)],
    })
}

pub(crate) fn build_aggregation(
    table: &str,
    fields: &[FieldDefinition],
    request: &AggregationRequest,
) -> Result<Statement> {
    let profile = Dialect::Internal.profile();
    let table_q = quote(table)?;
    let resolve = resolve_column(fields);

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

pub(crate) fn build_count_all(table: &str) -> Result<Statement> {
    Ok(sql::build_count(&quote(table)?, "", Vec::new()))
}

pub(crate) fn build_count_updated_since(table: &str, since: DateTime<Utc>) -> Result<Statement> {
    Ok(Statement {
        sql: format!(
            "SELECT COUNT(*) AS total FROM {} WHERE {} >= ?",
            quote(table)?,
            quote(UPDATED_AT_COLUMN)?
        ),
        params: vec![Value::from(
            since.naive_utc().format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
        )],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Aggregation, FilterClause, FieldType, SortDirection};
    use serde_json::json;

    fn sample_fields() -> Vec<FieldDefinition> {
        vec![
            FieldDefinition::new("title", "Title", FieldType::Text),
            FieldDefinition::new("category", "Category", FieldType::SingleSelect),
            FieldDefinition::new("amount", "Amount", FieldType::Number),
        ]
    }

    #[test]
    fn test_insert_statement() {
        let data: RecordData = [
            ("title".to_string(), json!("x")),
            ("amount".to_string(), json!(100)),
        ]
        .into_iter()
        .collect();
        let stmt = build_insert("t_app_7", &data, 42).unwrap();

        assert_eq!(
            stmt.sql,
            "INSERT INTO `t_app_7` (`title`, `amount`, `created_by`) VALUES (?, ?, ?)"
        );
        assert_eq!(stmt.params, vec![json!("x"), json!(100), json!(42)]);
    }

    #[test]
    fn test_insert_rejects_system_key() {
        let data: RecordData = [("id".to_string(), json!(9))].into_iter().collect();
        assert!(build_insert("t_app_7", &data, 1).is_err());
    }

    #[test]
    fn test_insert_rejects_hostile_key() {
        let data: RecordData = [("a`; --".to_string(), json!(1))].into_iter().collect();
        assert!(matches!(
            build_insert("t_app_7", &data, 1),
            Err(EngineError::InvalidIdentifier { .. })
        ));
    }

    #[test]
    fn test_update_statement() {
        let data: RecordData = [("title".to_string(), json!("y"))].into_iter().collect();
        let stmt = build_update("t_app_7", 12, &data).unwrap().unwrap();

        assert_eq!(stmt.sql, "UPDATE `t_app_7` SET `title` = ? WHERE `id` = ?");
        assert_eq!(stmt.params, vec![json!("y"), json!(12)]);
    }

    #[test]
    fn test_update_empty_is_noop() {
        let stmt = build_update("t_app_7", 12, &RecordData::new()).unwrap();
        assert!(stmt.is_none());
    }

    #[test]
    fn test_delete_statements() {
        let stmt = build_delete("t_app_7", 5).unwrap();
        assert_eq!(stmt.sql, "DELETE FROM `t_app_7` WHERE `id` = ?");

        let stmt = build_delete_many("t_app_7", &[1, 2, 3]).unwrap().unwrap();
        assert_eq!(stmt.sql, "DELETE FROM `t_app_7` WHERE `id` IN (?, ?, ?)");
        assert_eq!(stmt.params, vec![json!(1), json!(2), json!(3)]);

        assert!(build_delete_many("t_app_7", &[]).unwrap().is_none());
    }

    #[test]
    fn test_list_default_sort_and_pagination() {
        let options = QueryOptions {
            page: 3,
            limit: 20,
            ..Default::default()
        };
        let (count_stmt, select_stmt) = build_list("t_app_7", &sample_fields(), &options).unwrap();

        assert_eq!(count_stmt.sql, "SELECT COUNT(*) AS total FROM `t_app_7`");
        assert_eq!(
            select_stmt.sql,
            "SELECT * FROM `t_app_7` ORDER BY `id` DESC LIMIT ? OFFSET ?"
        );
        assert_eq!(select_stmt.params, vec![json!(20), json!(40)]);
    }

    #[test]
    fn test_list_filters_and_sort_share_where() {
        let options = QueryOptions {
            page: 1,
            limit: 10,
            sort_field: Some("amount".to_string()),
            sort_direction: SortDirection::Asc,
            filters: vec![
                FilterClause::new("category", "eq", "A"),
                FilterClause::new("amount", "gt", "200"),
            ],
        };
        let (count_stmt, select_stmt) = build_list("t_app_7", &sample_fields(), &options).unwrap();

        assert_eq!(
            count_stmt.sql,
            "SELECT COUNT(*) AS total FROM `t_app_7` WHERE `category` = ? AND `amount` > ?"
        );
        assert_eq!(count_stmt.params, vec![json!("A"), json!(200)]);
        assert_eq!(
            select_stmt.sql,
            "SELECT * FROM `t_app_7` WHERE `category` = ? AND `amount` > ? ORDER BY `amount` ASC LIMIT ? OFFSET ?"
        );
        assert_eq!(
            select_stmt.params,
            vec![json!("A"), json!(200), json!(10), json!(0)]
        );
    }

    #[test]
    fn test_list_text_field_binds_numeric_string_as_text() {
        let options = QueryOptions {
            filters: vec![FilterClause::new("category", "eq", "3")],
            ..Default::default()
        };
        let (count_stmt, select_stmt) = build_list("t_app_7", &sample_fields(), &options).unwrap();
        assert_eq!(count_stmt.params, vec![json!("3")]);
        assert_eq!(select_stmt.params[0], json!("3"));
    }

    #[test]
    fn test_list_rejects_unknown_sort_field() {
        let options = QueryOptions {
            sort_field: Some("ghost".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            build_list("t_app_7", &sample_fields(), &options),
            Err(EngineError::Configuration { .. })
        ));
    }

    #[test]
    fn test_list_allows_system_sort_column() {
        let options = QueryOptions {
            sort_field: Some("updated_at".to_string()),
            ..Default::default()
        };
        let (_, select_stmt) = build_list("t_app_7", &sample_fields(), &options).unwrap();
        assert!(select_stmt.sql.contains("ORDER BY `updated_at` ASC"));
    }

    #[test]
    fn test_aggregation_count() {
        let request = AggregationRequest {
            x_field: "category".to_string(),
            y_field: None,
            aggregation: Aggregation::Count,
            filters: Vec::new(),
        };
        let stmt = build_aggregation("t_app_7", &sample_fields(), &request).unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT `category` AS label, COUNT(*) AS value FROM `t_app_7` GROUP BY `category` ORDER BY `category`"
        );
    }

    #[test]
    fn test_aggregation_sum_with_filter() {
        let request = AggregationRequest {
            x_field: "category".to_string(),
            y_field: Some("amount".to_string()),
            aggregation: Aggregation::Sum,
            filters: vec![FilterClause::new("amount", "gte", "100")],
        };
        let stmt = build_aggregation("t_app_7", &sample_fields(), &request).unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT `category` AS label, SUM(`amount`) AS value FROM `t_app_7` WHERE `amount` >= ? GROUP BY `category` ORDER BY `category`"
        );
        assert_eq!(stmt.params, vec![json!(100)]);
    }

    #[test]
    fn test_aggregation_requires_known_y_field() {
        let request = AggregationRequest {
            x_field: "category".to_string(),
            y_field: Some("ghost".to_string()),
            aggregation: Aggregation::Sum,
            filters: Vec::new(),
        };
        assert!(build_aggregation("t_app_7", &sample_fields(), &request).is_err());
    }

    #[test]
    fn test_count_updated_since() {
        let since = chrono::DateTime::parse_from_rfc3339("2024-03-09T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let stmt = build_count_updated_since("t_app_7", since).unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT COUNT(*) AS total FROM `t_app_7` WHERE `updated_at` >= ?"
        );
        assert_eq!(stmt.params, vec![json!("2024-03-09 00:00:00.000")]);
    }

    #[test]
    fn test_get_by_id_statement() {
        let stmt = build_get_by_id("t_app_7", 99).unwrap();
        assert_eq!(stmt.sql, "SELECT * FROM `t_app_7` WHERE `id` = ? LIMIT 1");
        assert_eq!(stmt.params, vec![json!(99)]);
    }

    #[test]
    fn test_series_label() {
        let request = AggregationRequest {
            x_field: "category".to_string(),
            y_field: Some("amount".to_string()),
            aggregation: Aggregation::Avg,
            filters: Vec::new(),
        };
        assert_eq!(series_label(&request), "avg(amount)");

        let request = AggregationRequest {
            x_field: "category".to_string(),
            y_field: Some("amount".to_string()),
            aggregation: Aggregation::Count,
            filters: Vec::new(),
        };
        assert_eq!(series_label(&request), "count(*)");
    }
}
