//! Reflection post-processing
//!
//! Reflection itself happens behind `Connection::table_metadata`; this module
//! turns the reflected table into the column mapping and hints carried by the
//! control record, applying the configured reflection level and any caller
//! adapters on the way.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{ColumnMetadata, SqlType, TableMetadata};

/// How much reflected type detail survives into the derived column mapping
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReflectionLevel {
    /// Column names and nullability only
    Minimal,
    /// Column types without numeric precision detail
    #[default]
    Full,
    /// Column types including decimal precision and scale
    FullWithPrecision,
}

/// Rewrites reflected table metadata before the column mapping is derived
pub trait TableAdapter: Send + Sync {
    /// Rewrite `table`
    fn adapt(&self, table: TableMetadata) -> Result<TableMetadata>;
}

impl<F> TableAdapter for F
where
    F: Fn(TableMetadata) -> Result<TableMetadata> + Send + Sync,
{
    fn adapt(&self, table: TableMetadata) -> Result<TableMetadata> {
        self(table)
    }
}

/// Rewrites individual column types while the mapping is derived
pub trait TypeAdapter: Send + Sync {
    /// Map a reflected type to the type the mapping should carry; `None`
    /// drops the type (the column falls back to untyped)
    fn adapt(&self, column: &ColumnMetadata, sql_type: SqlType) -> Option<SqlType>;
}

/// Drop every column not named in `included`; an empty list keeps the table
/// untouched
pub fn apply_included_columns(mut table: TableMetadata, included: &[String]) -> TableMetadata {
    if included.is_empty() {
        return table;
    }
    table
        .columns
        .retain(|c| included.iter().any(|name| name.eq_ignore_ascii_case(&c.name)));
    table
}

/// Derive the column mapping from a reflected table
///
/// The type adapter runs first, on the reflected type; the reflection level
/// then strips what the caller did not ask for.
pub fn table_to_columns(
    table: &TableMetadata,
    level: ReflectionLevel,
    type_adapter: Option<&dyn TypeAdapter>,
) -> Vec<ColumnMetadata> {
    table
        .columns
        .iter()
        .map(|column| {
            let mut mapped = column.clone();
            mapped.sql_type = match (&column.sql_type, type_adapter) {
                (Some(t), Some(adapter)) => adapter.adapt(column, t.clone()),
                (t, None) => t.clone(),
                (None, _) => None,
            };
            mapped.sql_type = match level {
                ReflectionLevel::Minimal => None,
                ReflectionLevel::Full => mapped.sql_type.map(|t| t.without_precision()),
                ReflectionLevel::FullWithPrecision => mapped.sql_type,
            };
            mapped
        })
        .collect()
}

/// Primary key column names in key order, `None` when the table has none
pub fn get_primary_key(table: &TableMetadata) -> Option<Vec<String>> {
    let pk: Vec<String> = table
        .primary_key_columns()
        .into_iter()
        .map(|c| c.name.clone())
        .collect();
    if pk.is_empty() {
        None
    } else {
        Some(pk)
    }
}

/// Control-record payload: what the run learned about the table before
/// emitting any data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaHints {
    /// Primary key column names, when the table has a primary key
    pub primary_key: Option<Vec<String>>,
    /// Derived column mapping
    pub columns: Vec<ColumnMetadata>,
}
