//! Value types shared by the internal and external record engines.
//!
//! Everything here is constructed per request by the calling service layer and
//! owned by that call; the engine never caches or retains these values. All
//! models serialize with `serde` so a host can pass them straight through its
//! own request/response marshaling.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Abstract type of a user-defined field.
///
/// Unrecognized wire values deserialize to [`FieldType::Unknown`] so schema
/// evolution in the calling layer never hard-fails deserialization; the
/// column mapper falls back to a bounded varchar for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    LongText,
    Number,
    Date,
    Datetime,
    SingleSelect,
    MultiSelect,
    Checkbox,
    Radio,
    Link,
    Attachment,
    #[serde(other)]
    Unknown,
}

impl FieldType {
    /// True for types whose physical column compares numerically; filter
    /// values for these bind as numbers, everything else binds as text.
    pub(crate) fn is_numeric(self) -> bool {
        matches!(self, FieldType::Number | FieldType::Checkbox)
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FieldType::Text => "text",
            FieldType::LongText => "long_text",
            FieldType::Number => "number",
            FieldType::Date => "date",
            FieldType::Datetime => "datetime",
            FieldType::SingleSelect => "single_select",
            FieldType::MultiSelect => "multi_select",
            FieldType::Checkbox => "checkbox",
            FieldType::Radio => "radio",
            FieldType::Link => "link",
            FieldType::Attachment => "attachment",
            FieldType::Unknown => "unknown",
        };
        write!(f, "{}", name)
    }
}

/// One user-defined, typed field of a logical application schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDefinition {
    /// Logical, internally controlled identifier; the physical column name
    /// for internal tables. Must pass identifier validation before any DDL
    /// or DML referencing it is compiled.
    pub code: String,
    /// Human-readable name, never used in SQL.
    pub display_name: String,
    /// Abstract field type driving physical column mapping.
    pub field_type: FieldType,
    /// Physical column name override for external tables; lets a user map an
    /// arbitrary external schema onto a field. Falls back to `code`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_column: Option<String>,
}

impl FieldDefinition {
    /// Creates a field with no source-column override.
    pub fn new(code: impl Into<String>, display_name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            code: code.into(),
            display_name: display_name.into(),
            field_type,
            source_column: None,
        }
    }

    /// Sets the external source column override.
    pub fn with_source_column(mut self, column: impl Into<String>) -> Self {
        self.source_column = Some(column.into());
        self
    }

    /// Physical column name for external tables: the source column when
    /// present, otherwise the field code.
    pub fn physical_column(&self) -> &str {
        self.source_column.as_deref().unwrap_or(&self.code)
    }
}

/// One logical row: an ordered mapping of field code to scalar value.
///
/// Key order is preserved (insertion order), so a row reads back in the same
/// column order the statement produced it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordData(pub serde_json::Map<String, Value>);

impl RecordData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Case-insensitive lookup, for rows coming from dialects that fold
    /// identifier case (Oracle upper-cases, Postgres lower-cases).
    pub fn get_ignore_case(&self, key: &str) -> Option<&Value> {
        self.0.get(key).or_else(|| {
            self.0
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(key))
                .map(|(_, v)| v)
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, Value)> for RecordData {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Sort direction for list queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    /// Lenient parse: anything that is not "desc" (case-insensitive) sorts
    /// ascending.
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("desc") {
            SortDirection::Desc
        } else {
            SortDirection::Asc
        }
    }

    pub fn as_sql(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// Filter predicate operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOperator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    In,
}

impl FilterOperator {
    /// Parses a wire operator name. Returns `None` for anything outside the
    /// enumerated set; callers drop the clause (documented policy).
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "eq" => Some(Self::Eq),
            "ne" => Some(Self::Ne),
            "gt" => Some(Self::Gt),
            "gte" => Some(Self::Gte),
            "lt" => Some(Self::Lt),
            "lte" => Some(Self::Lte),
            "like" => Some(Self::Like),
            "in" => Some(Self::In),
            _ => None,
        }
    }

    /// SQL comparison token for the scalar operators.
    pub(crate) fn comparison(self) -> Option<&'static str> {
        match self {
            Self::Eq => Some("="),
            Self::Ne => Some("<>"),
            Self::Gt => Some(">"),
            Self::Gte => Some(">="),
            Self::Lt => Some("<"),
            Self::Lte => Some("<="),
            Self::Like | Self::In => None,
        }
    }
}

/// One filter predicate over a field.
///
/// `operator` is carried as its wire string: the compiler parses it and
/// silently drops clauses with an unrecognized operator instead of erroring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterClause {
    pub field: String,
    pub operator: String,
    pub value: String,
}

impl FilterClause {
    pub fn new(
        field: impl Into<String>,
        operator: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            operator: operator.into(),
            value: value.into(),
        }
    }
}

/// Options for a paginated, filtered, sorted list query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryOptions {
    /// 1-based page number; values below 1 are clamped to 1.
    pub page: u64,
    /// Page size; must be at least 1.
    pub limit: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_field: Option<String>,
    #[serde(default)]
    pub sort_direction: SortDirection,
    #[serde(default)]
    pub filters: Vec<FilterClause>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            page: 1,
            limit: 20,
            sort_field: None,
            sort_direction: SortDirection::Asc,
            filters: Vec::new(),
        }
    }
}

impl QueryOptions {
    /// Rows skipped before the requested page: `(page - 1) * limit`,
    /// saturating at `u64::MAX` since both values are caller-supplied.
    pub fn offset(&self) -> u64 {
        self.page.max(1).saturating_sub(1).saturating_mul(self.limit)
    }
}

/// Aggregation functions for the analytical query path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl Aggregation {
    pub(crate) fn sql_name(self) -> &'static str {
        match self {
            Self::Count => "COUNT",
            Self::Sum => "SUM",
            Self::Avg => "AVG",
            Self::Min => "MIN",
            Self::Max => "MAX",
        }
    }
}

impl std::fmt::Display for Aggregation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Count => "count",
            Self::Sum => "sum",
            Self::Avg => "avg",
            Self::Min => "min",
            Self::Max => "max",
        };
        write!(f, "{}", name)
    }
}

/// A GROUP-BY aggregation request.
///
/// `y_field` is required for every aggregation except `count`, which ignores
/// it and counts rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationRequest {
    /// Grouping field.
    pub x_field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y_field: Option<String>,
    pub aggregation: Aggregation,
    #[serde(default)]
    pub filters: Vec<FilterClause>,
}

/// One aggregation series, positionally aligned with the result labels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationSeries {
    pub label: String,
    pub values: Vec<f64>,
}

/// Result of an aggregation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationResult {
    pub labels: Vec<String>,
    pub series: Vec<AggregationSeries>,
}

/// Pagination summary computed from a total row count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u64,
    pub limit: u64,
    pub total: u64,
    pub total_pages: u64,
}

impl Pagination {
    /// Computes `total_pages = ceil(total / limit)`; a zero total yields
    /// zero pages. A zero limit is treated as 1.
    pub fn new(page: u64, limit: u64, total: u64) -> Self {
        let limit = limit.max(1);
        let total_pages = if total == 0 { 0 } else { total.div_ceil(limit) };
        Self {
            page: page.max(1),
            limit,
            total,
            total_pages,
        }
    }
}

/// A table or view discovered in an external datasource catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableInfo {
    pub name: String,
    pub schema: Option<String>,
    pub is_view: bool,
}

/// A column discovered in an external datasource catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub is_primary_key: bool,
    pub default_value: Option<String>,
}

/// Connection parameters for a registered external database.
///
/// The password is held in memory for the duration of the call only; the
/// `Display` impl and all error paths omit it.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
}

impl std::fmt::Display for ConnectionInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Credentials intentionally omitted.
        write!(f, "{}:{}/{}", self.host, self.port, self.database)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_field_type_unknown_fallback() {
        let parsed: FieldType = serde_json::from_str("\"holo_cube\"").unwrap();
        assert_eq!(parsed, FieldType::Unknown);

        let parsed: FieldType = serde_json::from_str("\"long_text\"").unwrap();
        assert_eq!(parsed, FieldType::LongText);
    }

    #[test]
    fn test_physical_column_fallback() {
        let field = FieldDefinition::new("amount", "Amount", FieldType::Number);
        assert_eq!(field.physical_column(), "amount");

        let field = field.with_source_column("order_total");
        assert_eq!(field.physical_column(), "order_total");
    }

    #[test]
    fn test_record_data_preserves_order() {
        let mut record = RecordData::new();
        record.insert("zeta", json!(1));
        record.insert("alpha", json!(2));
        record.insert("mid", json!(3));

        let keys: Vec<&String> = record.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, ["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_record_data_ignore_case() {
        let mut record = RecordData::new();
        record.insert("AMOUNT", json!(5));
        assert_eq!(record.get_ignore_case("amount"), Some(&json!(5)));
        assert!(record.get("amount").is_none());
    }

    #[test]
    fn test_filter_operator_parse() {
        assert_eq!(FilterOperator::parse("eq"), Some(FilterOperator::Eq));
        assert_eq!(FilterOperator::parse("in"), Some(FilterOperator::In));
        assert_eq!(FilterOperator::parse("between"), None);
        assert_eq!(FilterOperator::parse("EQ"), None);
    }

    #[test]
    fn test_sort_direction_parse() {
        assert_eq!(SortDirection::parse("desc"), SortDirection::Desc);
        assert_eq!(SortDirection::parse("DESC"), SortDirection::Desc);
        assert_eq!(SortDirection::parse("asc"), SortDirection::Asc);
        assert_eq!(SortDirection::parse("sideways"), SortDirection::Asc);
    }

    #[test]
    fn test_query_options_offset() {
        let options = QueryOptions {
            page: 3,
            limit: 20,
            ..Default::default()
        };
        assert_eq!(options.offset(), 40);

        let options = QueryOptions {
            page: 0,
            limit: 20,
            ..Default::default()
        };
        assert_eq!(options.offset(), 0);
    }

    #[test]
    fn test_query_options_offset_saturates() {
        let options = QueryOptions {
            page: u64::MAX,
            limit: 20,
            ..Default::default()
        };
        assert_eq!(options.offset(), u64::MAX);
    }

    #[test]
    fn test_pagination_arithmetic() {
        assert_eq!(Pagination::new(1, 10, 0).total_pages, 0);
        assert_eq!(Pagination::new(1, 10, 25).total_pages, 3);
        assert_eq!(Pagination::new(1, 10, 30).total_pages, 3);
        assert_eq!(Pagination::new(1, 10, 31).total_pages, 4);
        assert_eq!(Pagination::new(0, 0, 5).limit, 1);
    }

    #[test]
    fn test_connection_info_display_omits_credentials() {
        let info = ConnectionInfo {
            host: "db.example.com".into(),
            port: 5432,
            database: "crm".into(),
            username: "svc".into(),
            password: "hunter2".into(),
        };
        let shown = info.to_string();
        assert!(shown.contains("db.example.com"));
        assert!(!shown.contains("hunter2"));
        assert!(!shown.contains("svc"));
    }
}
