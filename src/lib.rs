//! Schema-driven query engine over runtime-defined tables.
//!
//! This crate turns user-defined field schemas into physical DDL for a
//! managed internal store, compiles filter/sort/aggregation requests into
//! dialect-correct SQL for that store and for registered external databases
//! (PostgreSQL, MySQL, SQL Server, Oracle), and normalizes driver results
//! into one logical record representation.
//!
//! # Security Guarantees
//! - Every caller-supplied identifier passes a strict allow-list validator
//!   before it can appear in SQL text; data values only ever travel as bound
//!   parameters
//! - Connection passwords never appear in errors, logs, or `Display` output
//! - External connections are opened per call and closed before returning
//!
//! # Architecture
//! - One [`dialect::DialectProfile`] implementation per vendor holds all
//!   per-dialect SQL facts
//! - Statement compilation is pure; execution is a thin driver layer per
//!   vendor
//! - Rows from every driver normalize into [`RecordData`]

pub mod dialect;
pub mod error;
pub mod external;
pub mod identifier;
pub mod internal;
pub mod logging;
pub mod mapping;
pub mod models;
pub(crate) mod normalize;
pub(crate) mod sql;

// Re-export commonly used types
pub use dialect::{Dialect, DialectProfile};
pub use error::{EngineError, Result};
pub use external::ExternalDataSource;
pub use internal::InternalStore;
pub use logging::init_logging;
pub use models::{
    Aggregation, AggregationRequest, AggregationResult, AggregationSeries, ColumnInfo,
    ConnectionInfo, FieldDefinition, FieldType, FilterClause, FilterOperator, Pagination,
    QueryOptions, RecordData, SortDirection, TableInfo,
};
