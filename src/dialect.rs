//! Dialect profiles: the per-vendor SQL facts in one place.
//!
//! Each supported dialect implements [`DialectProfile`] once — identifier
//! quoting, positional placeholder syntax, pagination clause, connection
//! string construction, and catalog queries. Adding a dialect means adding
//! one implementation here, not a switch statement per call site.
//!
//! Quoting assumes the name has already passed
//! [`crate::identifier::validate`]; the doubling of embedded delimiters is
//! defense in depth, not the primary injection barrier.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::models::ConnectionInfo;

/// Supported SQL dialects: the managed internal store plus the four external
/// vendors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// The engine's own managed store (MySQL syntax).
    Internal,
    Postgres,
    MySql,
    Oracle,
    SqlServer,
}

impl Dialect {
    /// Parses a dialect from its wire name.
    ///
    /// # Errors
    /// Returns [`EngineError::UnsupportedDialect`] for unrecognized names.
    pub fn from_name(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "internal" => Ok(Self::Internal),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "mysql" => Ok(Self::MySql),
            "oracle" => Ok(Self::Oracle),
            "sqlserver" | "mssql" => Ok(Self::SqlServer),
            other => Err(EngineError::unsupported_dialect(other)),
        }
    }

    /// The profile implementing this dialect's SQL facts.
    pub fn profile(self) -> &'static dyn DialectProfile {
        match self {
            Self::Internal => &InternalProfile,
            Self::Postgres => &PostgresProfile,
            Self::MySql => &MySqlProfile,
            Self::Oracle => &OracleProfile,
            Self::SqlServer => &SqlServerProfile,
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.profile().name())
    }
}

/// Per-dialect SQL capability, implemented once per vendor.
pub trait DialectProfile: Send + Sync {
    /// Display name (used in logs and error context).
    fn name(&self) -> &'static str;

    /// Quotes a validated identifier, doubling any embedded delimiter.
    /// Dialects that fold case may re-case the name.
    fn quote(&self, ident: &str) -> String;

    /// Positional parameter placeholder for the 1-based `index`.
    fn placeholder(&self, index: usize) -> String;

    /// Pagination clause with literal bounds (both values are unsigned
    /// integers supplied by the engine, never caller text).
    fn pagination(&self, limit: u64, offset: u64) -> String;

    /// Default TCP port for the vendor.
    fn default_port(&self) -> u16;

    /// Driver identifier for connection handoff.
    ///
    /// # Errors
    /// The internal dialect has no external driver.
    fn driver_name(&self) -> Result<&'static str>;

    /// Vendor-conventional connection string. Credentials are escaped per
    /// the vendor's rules; the result must never be logged unredacted.
    ///
    /// # Errors
    /// The internal dialect has no connection string.
    fn dsn(&self, info: &ConnectionInfo) -> Result<String>;

    /// Catalog query listing tables and views. Columns: `table_name`,
    /// `table_schema`, `table_type` (normalized to TABLE/VIEW by callers).
    ///
    /// # Errors
    /// The internal dialect exposes no catalog.
    fn tables_query(&self) -> Result<&'static str>;

    /// Catalog query listing columns of one table, with the table name bound
    /// as the first positional parameter. Columns: `column_name`,
    /// `data_type`, `is_nullable`, `column_default`, `is_primary`.
    ///
    /// # Errors
    /// The internal dialect exposes no catalog.
    fn columns_query(&self) -> Result<&'static str>;
}

fn no_external(feature: &str, dialect: &str) -> EngineError {
    EngineError::unsupported_feature(feature, dialect)
}

/// Wraps in `delim`, doubling embedded occurrences of `delim_char`.
fn wrap(ident: &str, open: char, close: char, doubled: char) -> String {
    let mut out = String::with_capacity(ident.len() + 2);
    out.push(open);
    for c in ident.chars() {
        out.push(c);
        if c == doubled {
            out.push(c);
        }
    }
    out.push(close);
    out
}

/// Internal managed store (MySQL syntax; no external connection surface).
struct InternalProfile;

impl DialectProfile for InternalProfile {
    fn name(&self) -> &'static str {
        "internal"
    }

    fn quote(&self, ident: &str) -> String {
        wrap(ident, '`', '`', '`')
    }

    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn pagination(&self, limit: u64, offset: u64) -> String {
        format!("LIMIT {} OFFSET {}", limit, offset)
    }

    fn default_port(&self) -> u16 {
        3306
    }

    fn driver_name(&self) -> Result<&'static str> {
        Err(no_external("external driver", "internal"))
    }

    fn dsn(&self, _info: &ConnectionInfo) -> Result<String> {
        Err(no_external("connection string", "internal"))
    }

    fn tables_query(&self) -> Result<&'static str> {
        Err(no_external("catalog listing", "internal"))
    }

    fn columns_query(&self) -> Result<&'static str> {
        Err(no_external("catalog listing", "internal"))
    }
}

struct PostgresProfile;

impl DialectProfile for PostgresProfile {
    fn name(&self) -> &'static str {
        "PostgreSQL"
    }

    fn quote(&self, ident: &str) -> String {
        wrap(ident, '"', '"', '"')
    }

    fn placeholder(&self, index: usize) -> String {
        format!("${}", index)
    }

    fn pagination(&self, limit: u64, offset: u64) -> String {
        format!("LIMIT {} OFFSET {}", limit, offset)
    }

    fn default_port(&self) -> u16 {
        5432
    }

    fn driver_name(&self) -> Result<&'static str> {
        Ok("postgres")
    }

    fn dsn(&self, info: &ConnectionInfo) -> Result<String> {
        // libpq keyword pairs; the password is single-quoted with backslash
        // escaping so any byte sequence survives.
        Ok(format!(
            "host={} port={} dbname={} user={} password={}",
            info.host,
            info.port,
            info.database,
            info.username,
            pg_quote_value(&info.password),
        ))
    }

    fn tables_query(&self) -> Result<&'static str> {
        Ok("SELECT table_name, table_schema, table_type \
            FROM information_schema.tables \
            WHERE table_schema NOT IN ('pg_catalog', 'information_schema') \
            ORDER BY table_schema, table_name")
    }

    fn columns_query(&self) -> Result<&'static str> {
        Ok("SELECT c.column_name, c.data_type, c.is_nullable, c.column_default, \
                   CASE WHEN pk.column_name IS NULL THEN 0 ELSE 1 END AS is_primary \
            FROM information_schema.columns c \
            LEFT JOIN ( \
                SELECT kcu.table_name, kcu.column_name \
                FROM information_schema.table_constraints tc \
                JOIN information_schema.key_column_usage kcu \
                  ON tc.constraint_name = kcu.constraint_name \
                 AND tc.table_schema = kcu.table_schema \
                WHERE tc.constraint_type = 'PRIMARY KEY' \
            ) pk ON pk.table_name = c.table_name AND pk.column_name = c.column_name \
            WHERE c.table_name = $1 \
            ORDER BY c.ordinal_position")
    }
}

struct MySqlProfile;

impl DialectProfile for MySqlProfile {
    fn name(&self) -> &'static str {
        "MySQL"
    }

    fn quote(&self, ident: &str) -> String {
        wrap(ident, '`', '`', '`')
    }

    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn pagination(&self, limit: u64, offset: u64) -> String {
        format!("LIMIT {} OFFSET {}", limit, offset)
    }

    fn default_port(&self) -> u16 {
        3306
    }

    fn driver_name(&self) -> Result<&'static str> {
        Ok("mysql")
    }

    fn dsn(&self, info: &ConnectionInfo) -> Result<String> {
        Ok(format!(
            "{}:{}@tcp({}:{})/{}",
            info.username, info.password, info.host, info.port, info.database
        ))
    }

    fn tables_query(&self) -> Result<&'static str> {
        Ok("SELECT table_name, table_schema, table_type \
            FROM information_schema.tables \
            WHERE table_schema = DATABASE() \
            ORDER BY table_name")
    }

    fn columns_query(&self) -> Result<&'static str> {
        Ok("SELECT column_name, data_type, is_nullable, column_default, \
                   CASE WHEN column_key = 'PRI' THEN 1 ELSE 0 END AS is_primary \
            FROM information_schema.columns \
            WHERE table_schema = DATABASE() AND table_name = ? \
            ORDER BY ordinal_position")
    }
}

struct OracleProfile;

impl DialectProfile for OracleProfile {
    fn name(&self) -> &'static str {
        "Oracle"
    }

    fn quote(&self, ident: &str) -> String {
        // Oracle folds unquoted identifiers to upper case; managed names are
        // upper-cased before quoting so both spellings resolve to the same
        // object. Only ASCII letters fold.
        let upper = ident.to_ascii_uppercase();
        wrap(&upper, '"', '"', '"')
    }

    fn placeholder(&self, index: usize) -> String {
        format!(":{}", index)
    }

    fn pagination(&self, limit: u64, offset: u64) -> String {
        format!("OFFSET {} ROWS FETCH NEXT {} ROWS ONLY", offset, limit)
    }

    fn default_port(&self) -> u16 {
        1521
    }

    fn driver_name(&self) -> Result<&'static str> {
        Ok("oracle")
    }

    fn dsn(&self, info: &ConnectionInfo) -> Result<String> {
        url_dsn("oracle", info, None)
    }

    fn tables_query(&self) -> Result<&'static str> {
        Ok("SELECT table_name, owner AS table_schema, 'BASE TABLE' AS table_type FROM all_tables \
            UNION ALL \
            SELECT view_name AS table_name, owner AS table_schema, 'VIEW' AS table_type FROM all_views \
            ORDER BY table_schema, table_name")
    }

    fn columns_query(&self) -> Result<&'static str> {
        Ok("SELECT c.column_name, c.data_type, c.nullable AS is_nullable, \
                   c.data_default AS column_default, \
                   CASE WHEN pk.column_name IS NULL THEN 0 ELSE 1 END AS is_primary \
            FROM all_tab_columns c \
            LEFT JOIN ( \
                SELECT cc.table_name, cc.column_name \
                FROM all_constraints k \
                JOIN all_cons_columns cc ON k.constraint_name = cc.constraint_name \
                WHERE k.constraint_type = 'P' \
            ) pk ON pk.table_name = c.table_name AND pk.column_name = c.column_name \
            WHERE c.table_name = :1 \
            ORDER BY c.column_id")
    }
}

struct SqlServerProfile;

impl DialectProfile for SqlServerProfile {
    fn name(&self) -> &'static str {
        "SQL Server"
    }

    fn quote(&self, ident: &str) -> String {
        // Brackets close with `]`, so only the closing bracket needs doubling.
        wrap(ident, '[', ']', ']')
    }

    fn placeholder(&self, index: usize) -> String {
        format!("@p{}", index)
    }

    fn pagination(&self, limit: u64, offset: u64) -> String {
        format!("OFFSET {} ROWS FETCH NEXT {} ROWS ONLY", offset, limit)
    }

    fn default_port(&self) -> u16 {
        1433
    }

    fn driver_name(&self) -> Result<&'static str> {
        Ok("sqlserver")
    }

    fn dsn(&self, info: &ConnectionInfo) -> Result<String> {
        url_dsn("sqlserver", info, Some("database"))
    }

    fn tables_query(&self) -> Result<&'static str> {
        Ok("SELECT table_name, table_schema, table_type \
            FROM information_schema.tables \
            ORDER BY table_schema, table_name")
    }

    fn columns_query(&self) -> Result<&'static str> {
        Ok("SELECT c.column_name, c.data_type, c.is_nullable, c.column_default, \
                   CASE WHEN pk.column_name IS NULL THEN 0 ELSE 1 END AS is_primary \
            FROM information_schema.columns c \
            LEFT JOIN ( \
                SELECT kcu.table_name, kcu.column_name \
                FROM information_schema.table_constraints tc \
                JOIN information_schema.key_column_usage kcu \
                  ON tc.constraint_name = kcu.constraint_name \
                WHERE tc.constraint_type = 'PRIMARY KEY' \
            ) pk ON pk.table_name = c.table_name AND pk.column_name = c.column_name \
            WHERE c.table_name = @p1 \
            ORDER BY c.ordinal_position")
    }
}

/// Single-quotes a libpq connection value, escaping `\` and `'`.
fn pg_quote_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        if c == '\\' || c == '\'' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('\'');
    out
}

/// Builds a URL-form DSN with percent-encoded userinfo.
///
/// `database_param` selects where the database name goes: a query parameter
/// of that name, or the URL path when `None`.
fn url_dsn(scheme: &str, info: &ConnectionInfo, database_param: Option<&str>) -> Result<String> {
    let base = format!("{}://{}:{}", scheme, info.host, info.port);
    let mut parsed = url::Url::parse(&base).map_err(|e| {
        EngineError::configuration(format!("invalid host for {} connection: {}", scheme, e))
    })?;

    parsed
        .set_username(&info.username)
        .map_err(|_| EngineError::configuration("connection host does not accept a username"))?;
    parsed
        .set_password(Some(&info.password))
        .map_err(|_| EngineError::configuration("connection host does not accept a password"))?;

    match database_param {
        Some(param) => {
            parsed.query_pairs_mut().append_pair(param, &info.database);
        }
        None => parsed.set_path(&info.database),
    }

    Ok(parsed.to_string())
}
