//! Shared statement compilation.
//!
//! Builds SQL text plus the positional parameter list for whichever dialect
//! profile is in play. Every identifier reaching these builders has already
//! been resolved through a caller-supplied resolver, which validates the name
//! and returns its quoted physical column — the resolver is the only path
//! from caller text to SQL text.

use serde_json::Value;

use crate::dialect::DialectProfile;
use crate::error::{EngineError, Result};
use crate::models::{Aggregation, FilterClause, FilterOperator, SortDirection};

/// Compiled SQL text with its positionally ordered parameters.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Statement {
    pub(crate) sql: String,
    pub(crate) params: Vec<Value>,
}

impl Statement {
    pub(crate) fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }
}

/// A resolved column: its quoted SQL text plus whether values targeting it
/// bind as numbers. Dialects with strongly typed parameters reject a text
/// parameter compared against a numeric column and vice versa, so the bind
/// type must follow the column, not the value's spelling.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ResolvedColumn {
    pub(crate) sql: String,
    pub(crate) numeric: bool,
}

impl ResolvedColumn {
    pub(crate) fn text(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            numeric: false,
        }
    }

    pub(crate) fn numeric(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            numeric: true,
        }
    }
}

/// Resolves a caller-supplied field name to a quoted physical column.
pub(crate) type ColumnResolver<'a> = dyn Fn(&str) -> Result<ResolvedColumn> + 'a;

/// Binds a filter value. For numeric columns the value parses as integer,
/// then float, falling back to text; for everything else it binds verbatim
/// as text.
pub(crate) fn scalar_param(value: &str, numeric: bool) -> Value {
    if numeric {
        if let Ok(i) = value.parse::<i64>() {
            return Value::from(i);
        }
        if let Ok(f) = value.parse::<f64>() {
            if f.is_finite() {
                return Value::from(f);
            }
        }
    }
    Value::String(value.to_string())
}

/// Compiles the filter list into a `WHERE` fragment (empty string when no
/// predicate survives) and its parameters.
///
/// Clauses are AND-combined in caller order. A clause with an unrecognized
/// operator contributes no predicate — documented policy, logged at WARN.
/// An `in` clause splits its value on commas; an empty element list also
/// contributes no predicate.
pub(crate) fn build_where(
    profile: &dyn DialectProfile,
    filters: &[FilterClause],
    resolve: &ColumnResolver<'_>,
    next_index: &mut usize,
) -> Result<(String, Vec<Value>)> {
    let mut predicates: Vec<String> = Vec::new();
    let mut params: Vec<Value> = Vec::new();

    for clause in filters {
        let Some(operator) = FilterOperator::parse(&clause.operator) else {
            tracing::warn!(
                operator = %clause.operator,
                field = %clause.field,
                "dropping filter with unrecognized operator"
            );
            continue;
        };
        let column = resolve(&clause.field)?;

        match operator {
            FilterOperator::Like => {
                predicates.push(format!(
                    "{} LIKE {}",
                    column.sql,
                    profile.placeholder(*next_index)
                ));
                *next_index += 1;
                params.push(Value::String(format!("%{}%", clause.value)));
            }
            FilterOperator::In => {
                let elements: Vec<&str> = clause
                    .value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .collect();
                if elements.is_empty() {
                    continue;
                }
                let mut marks = Vec::with_capacity(elements.len());
                for element in elements {
                    marks.push(profile.placeholder(*next_index));
                    *next_index += 1;
                    params.push(scalar_param(element, column.numeric));
                }
                predicates.push(format!("{} IN ({})", column.sql, marks.join(", ")));
            }
            other => {
                // Scalar comparisons; `comparison` is total for these.
                let op = other.comparison().unwrap_or("=");
                predicates.push(format!(
                    "{} {} {}",
                    column.sql,
                    op,
                    profile.placeholder(*next_index)
                ));
                *next_index += 1;
                params.push(scalar_param(&clause.value, column.numeric));
            }
        }
    }

    if predicates.is_empty() {
        Ok((String::new(), params))
    } else {
        Ok((format!(" WHERE {}", predicates.join(" AND ")), params))
    }
}

/// Compiles the `ORDER BY` fragment. Falls back to the primary key,
/// descending (most-recent-first), when no sort field is given.
pub(crate) fn build_order(
    sort_field: Option<&str>,
    direction: SortDirection,
    resolve: &ColumnResolver<'_>,
    default_pk: &str,
) -> Result<String> {
    match sort_field {
        Some(field) => {
            let column = resolve(field)?;
            Ok(format!(" ORDER BY {} {}", column.sql, direction.as_sql()))
        }
        None => Ok(format!(" ORDER BY {} DESC", default_pk)),
    }
}

/// Compiles `SELECT COUNT(*)` sharing the given WHERE fragment.
pub(crate) fn build_count(table: &str, where_sql: &str, params: Vec<Value>) -> Statement {
    Statement {
        sql: format!("SELECT COUNT(*) AS total FROM {}{}", table, where_sql),
        params,
    }
}

/// Compiles the GROUP-BY aggregation statement.
///
/// `count` ignores the y column and counts rows; the remaining aggregations
/// require one.
pub(crate) fn build_aggregate(
    table: &str,
    x_column: &str,
    aggregation: Aggregation,
    y_column: Option<&str>,
    where_sql: &str,
    params: Vec<Value>,
) -> Result<Statement> {
    let value_expr = match (aggregation, y_column) {
        (Aggregation::Count, _) => "COUNT(*)".to_string(),
        (agg, Some(column)) => format!("{}({})", agg.sql_name(), column),
        (agg, None) => {
            return Err(EngineError::configuration(format!(
                "aggregation {} requires a y field",
                agg
            )));
        }
    };

    Ok(Statement {
        sql: format!(
            "SELECT {x} AS label, {value} AS value FROM {table}{where} GROUP BY {x} ORDER BY {x}",
            x = x_column,
            value = value_expr,
            table = table,
            where = where_sql,
        ),
        params,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Dialect;
    use serde_json::json;

    // Treats `amount` as a numeric column, everything else as text.
    fn passthrough(dialect: Dialect) -> impl Fn(&str) -> Result<ResolvedColumn> {
        move |name: &str| {
            let sql = crate::identifier::quote(dialect, name)?;
            Ok(if name == "amount" {
                ResolvedColumn::numeric(sql)
            } else {
                ResolvedColumn::text(sql)
            })
        }
    }

    #[test]
    fn test_where_single_eq() {
        let profile = Dialect::Postgres.profile();
        let resolve = passthrough(Dialect::Postgres);
        let filters = vec![FilterClause::new("category", "eq", "A")];
        let mut index = 1;
        let (sql, params) = build_where(profile, &filters, &resolve, &mut index).unwrap();

        assert_eq!(sql, " WHERE \"category\" = $1");
        assert_eq!(params, vec![json!("A")]);
        assert_eq!(index, 2);
    }

    #[test]
    fn test_where_numeric_comparison_binds_number() {
        let profile = Dialect::Postgres.profile();
        let resolve = passthrough(Dialect::Postgres);
        let filters = vec![FilterClause::new("amount", "gt", "200")];
        let mut index = 1;
        let (sql, params) = build_where(profile, &filters, &resolve, &mut index).unwrap();

        assert_eq!(sql, " WHERE \"amount\" > $1");
        assert_eq!(params, vec![json!(200)]);
    }

    #[test]
    fn test_where_text_column_binds_numeric_string_as_text() {
        let profile = Dialect::Postgres.profile();
        let resolve = passthrough(Dialect::Postgres);
        let filters = vec![FilterClause::new("category", "eq", "3")];
        let mut index = 1;
        let (sql, params) = build_where(profile, &filters, &resolve, &mut index).unwrap();

        assert_eq!(sql, " WHERE \"category\" = $1");
        assert_eq!(params, vec![json!("3")]);
    }

    #[test]
    fn test_where_in_numeric_column_binds_numbers() {
        let profile = Dialect::Postgres.profile();
        let resolve = passthrough(Dialect::Postgres);
        let filters = vec![FilterClause::new("amount", "in", "100, 250")];
        let mut index = 1;
        let (sql, params) = build_where(profile, &filters, &resolve, &mut index).unwrap();

        assert_eq!(sql, " WHERE \"amount\" IN ($1, $2)");
        assert_eq!(params, vec![json!(100), json!(250)]);
    }

    #[test]
    fn test_where_clauses_and_combined_in_order() {
        let profile = Dialect::SqlServer.profile();
        let resolve = passthrough(Dialect::SqlServer);
        let filters = vec![
            FilterClause::new("category", "eq", "A"),
            FilterClause::new("amount", "lte", "250.5"),
        ];
        let mut index = 1;
        let (sql, params) = build_where(profile, &filters, &resolve, &mut index).unwrap();

        assert_eq!(sql, " WHERE [category] = @p1 AND [amount] <= @p2");
        assert_eq!(params, vec![json!("A"), json!(250.5)]);
    }

    #[test]
    fn test_where_unknown_operator_dropped() {
        let profile = Dialect::MySql.profile();
        let resolve = passthrough(Dialect::MySql);
        let filters = vec![
            FilterClause::new("category", "regex", ".*"),
            FilterClause::new("category", "eq", "B"),
        ];
        let mut index = 1;
        let (sql, params) = build_where(profile, &filters, &resolve, &mut index).unwrap();

        assert_eq!(sql, " WHERE `category` = ?");
        assert_eq!(params, vec![json!("B")]);
    }

    #[test]
    fn test_where_all_dropped_is_empty() {
        let profile = Dialect::MySql.profile();
        let resolve = passthrough(Dialect::MySql);
        let filters = vec![FilterClause::new("category", "matches", "A")];
        let mut index = 1;
        let (sql, params) = build_where(profile, &filters, &resolve, &mut index).unwrap();

        assert_eq!(sql, "");
        assert!(params.is_empty());
    }

    #[test]
    fn test_where_like_wraps_value() {
        let profile = Dialect::MySql.profile();
        let resolve = passthrough(Dialect::MySql);
        let filters = vec![FilterClause::new("title", "like", "draft")];
        let mut index = 1;
        let (sql, params) = build_where(profile, &filters, &resolve, &mut index).unwrap();

        assert_eq!(sql, " WHERE `title` LIKE ?");
        assert_eq!(params, vec![json!("%draft%")]);
    }

    #[test]
    fn test_where_in_splits_commas() {
        let profile = Dialect::Oracle.profile();
        let resolve = passthrough(Dialect::Oracle);
        let filters = vec![FilterClause::new("status", "in", "open, closed , 3")];
        let mut index = 1;
        let (sql, params) = build_where(profile, &filters, &resolve, &mut index).unwrap();

        assert_eq!(sql, " WHERE \"STATUS\" IN (:1, :2, :3)");
        assert_eq!(params, vec![json!("open"), json!("closed"), json!("3")]);
        assert_eq!(index, 4);
    }

    #[test]
    fn test_where_in_empty_list_dropped() {
        let profile = Dialect::Postgres.profile();
        let resolve = passthrough(Dialect::Postgres);
        let filters = vec![FilterClause::new("status", "in", " , ,")];
        let mut index = 1;
        let (sql, params) = build_where(profile, &filters, &resolve, &mut index).unwrap();

        assert_eq!(sql, "");
        assert!(params.is_empty());
    }

    #[test]
    fn test_where_rejects_hostile_field() {
        let profile = Dialect::Postgres.profile();
        let resolve = passthrough(Dialect::Postgres);
        let filters = vec![FilterClause::new("amount; DROP TABLE x", "eq", "1")];
        let mut index = 1;
        let result = build_where(profile, &filters, &resolve, &mut index);
        assert!(matches!(
            result,
            Err(EngineError::InvalidIdentifier { .. })
        ));
    }

    #[test]
    fn test_order_default_is_pk_desc() {
        let resolve = passthrough(Dialect::MySql);
        let sql = build_order(None, SortDirection::Asc, &resolve, "`id`").unwrap();
        assert_eq!(sql, " ORDER BY `id` DESC");
    }

    #[test]
    fn test_order_with_sort_field() {
        let resolve = passthrough(Dialect::Postgres);
        let sql = build_order(Some("amount"), SortDirection::Desc, &resolve, "\"id\"").unwrap();
        assert_eq!(sql, " ORDER BY \"amount\" DESC");
    }

    #[test]
    fn test_count_shares_where() {
        let stmt = build_count("`t_app_7`", " WHERE `a` = ?", vec![json!(1)]);
        assert_eq!(stmt.sql, "SELECT COUNT(*) AS total FROM `t_app_7` WHERE `a` = ?");
        assert_eq!(stmt.params, vec![json!(1)]);
    }

    #[test]
    fn test_aggregate_count_ignores_y() {
        let stmt = build_aggregate(
            "`t`",
            "`category`",
            Aggregation::Count,
            Some("`amount`"),
            "",
            vec![],
        )
        .unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT `category` AS label, COUNT(*) AS value FROM `t` GROUP BY `category` ORDER BY `category`"
        );
    }

    #[test]
    fn test_aggregate_sum_uses_y() {
        let stmt = build_aggregate(
            "\"t\"",
            "\"category\"",
            Aggregation::Sum,
            Some("\"amount\""),
            " WHERE \"region\" = $1",
            vec![json!("east")],
        )
        .unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT \"category\" AS label, SUM(\"amount\") AS value FROM \"t\" WHERE \"region\" = $1 GROUP BY \"category\" ORDER BY \"category\""
        );
        assert_eq!(stmt.params, vec![json!("east")]);
    }

    #[test]
    fn test_aggregate_requires_y_for_non_count() {
        for agg in [
            Aggregation::Sum,
            Aggregation::Avg,
            Aggregation::Min,
            Aggregation::Max,
        ] {
            let result = build_aggregate("`t`", "`x`", agg, None, "", vec![]);
            assert!(matches!(result, Err(EngineError::Configuration { .. })));
        }
    }
}
