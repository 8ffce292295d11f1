//! Incremental SELECT construction
//!
//! Builds a `SelectStatement` from table metadata and cursor policy. The
//! statement stays dialect-neutral here; `Dialect` renders it either with
//! bind parameters (in-process path) or as inline literals (bulk path).

use sea_query::{
    Alias, Asterisk, Cond, Expr, IntoIden, Order, Query, SelectStatement, TableRef,
    Value as SeaValue, Values,
};

use crate::cursor::{CursorState, LastValueFunc, MissingValuePolicy, RowOrder};
use crate::error::{Error, Result};
use crate::types::{TableMetadata, Value};

/// Hook for rewriting the generated statement before execution.
///
/// Runs after the cursor clauses are in place; adapters can add projections,
/// extra filters or hints. Binds added by an adapter travel with the
/// statement and are extracted again at render time.
pub trait QueryAdapter: Send + Sync {
    /// Rewrite the statement for `table`
    fn adapt(&self, stmt: SelectStatement, table: &TableMetadata) -> Result<SelectStatement>;
}

impl<F> QueryAdapter for F
where
    F: Fn(SelectStatement, &TableMetadata) -> Result<SelectStatement> + Send + Sync,
{
    fn adapt(&self, stmt: SelectStatement, table: &TableMetadata) -> Result<SelectStatement> {
        self(stmt, table)
    }
}

/// Builds the extraction SELECT for one table and cursor state
pub struct QueryBuilder<'a> {
    table: &'a TableMetadata,
    cursor: Option<&'a CursorState>,
}

impl<'a> QueryBuilder<'a> {
    /// Create a builder for `table`, optionally constrained by `cursor`
    pub fn new(table: &'a TableMetadata, cursor: Option<&'a CursorState>) -> Self {
        Self { table, cursor }
    }

    /// Build the SELECT statement
    ///
    /// Without a cursor, or with a custom aggregation, this is a plain
    /// unfiltered `SELECT *`. Otherwise the cursor contributes:
    /// - a lower bound on the tracked column once a `last_value` exists
    ///   (inclusive, direction given by the aggregation),
    /// - an exclusive end bound when `end_value` is set,
    /// - NULL handling per `MissingValuePolicy` (include ORs `IS NULL` onto
    ///   the bound; exclude ANDs `IS NOT NULL` after everything else),
    /// - ORDER BY only when an order was requested.
    pub fn build(&self) -> Result<SelectStatement> {
        let mut stmt = Query::select()
            .column(Asterisk)
            .from(table_ref(self.table))
            .to_owned();

        let cursor = match self.cursor {
            Some(c) if c.func.is_filtering() => c,
            _ => return Ok(stmt),
        };

        let col = Alias::new(&cursor.column);
        let is_max = matches!(cursor.func, LastValueFunc::Max);

        // The bounds only exist once a previous run recorded a boundary; the
        // end bound narrows that window and never stands alone.
        let mut cond: Option<Cond> = None;
        if let Some(last) = &cursor.last_value {
            let v = to_sea_value(last.clone())?;
            let bound = if is_max {
                Expr::col(col.clone()).gte(v)
            } else {
                Expr::col(col.clone()).lte(v)
            };
            let mut window = Cond::all().add(bound);
            if let Some(end) = &cursor.end_value {
                let v = to_sea_value(end.clone())?;
                let end_bound = if is_max {
                    Expr::col(col.clone()).lt(v)
                } else {
                    Expr::col(col.clone()).gt(v)
                };
                window = window.add(end_bound);
            }
            if matches!(cursor.on_missing, MissingValuePolicy::Include) {
                window = Cond::any()
                    .add(window)
                    .add(Expr::col(col.clone()).is_null());
            }
            cond = Some(window);
        }

        // Appended after the include-augmented window; the composition is
        // order-dependent when both policies meet across runs.
        if matches!(cursor.on_missing, MissingValuePolicy::Exclude) {
            let not_null = Expr::col(col.clone()).is_not_null();
            cond = Some(match cond {
                Some(window) => Cond::all().add(window).add(not_null),
                None => Cond::all().add(not_null),
            });
        }

        if let Some(cond) = cond {
            stmt.cond_where(cond);
        }

        if let Some(order) = cursor.resolved_order() {
            let direction = match order {
                RowOrder::Asc => Order::Asc,
                RowOrder::Desc => Order::Desc,
            };
            stmt.order_by(col, direction);
        }

        Ok(stmt)
    }
}

fn table_ref(table: &TableMetadata) -> TableRef {
    match &table.schema {
        Some(schema) => TableRef::SchemaTable(
            Alias::new(schema).into_iden(),
            Alias::new(&table.name).into_iden(),
        ),
        None => TableRef::Table(Alias::new(&table.name).into_iden()),
    }
}

/// Convert a [`Value`] into a renderable sea-query value.
///
/// Composite values have no portable literal form; rejecting them here keeps
/// the failure fatal and attributable on both render paths.
pub(crate) fn to_sea_value(value: Value) -> Result<SeaValue> {
    Ok(match value {
        Value::Null => SeaValue::String(None),
        Value::Bool(b) => SeaValue::Bool(Some(b)),
        Value::Int8(n) => SeaValue::TinyInt(Some(n)),
        Value::Int16(n) => SeaValue::SmallInt(Some(n)),
        Value::Int32(n) => SeaValue::Int(Some(n)),
        Value::Int64(n) => SeaValue::BigInt(Some(n)),
        Value::Float32(n) => SeaValue::Float(Some(n)),
        Value::Float64(n) => SeaValue::Double(Some(n)),
        Value::Decimal(d) => SeaValue::Decimal(Some(Box::new(d))),
        Value::String(s) => SeaValue::String(Some(Box::new(s))),
        Value::Bytes(b) => SeaValue::Bytes(Some(Box::new(b))),
        Value::Date(d) => SeaValue::ChronoDate(Some(Box::new(d))),
        Value::Time(t) => SeaValue::ChronoTime(Some(Box::new(t))),
        Value::DateTime(dt) => SeaValue::ChronoDateTime(Some(Box::new(dt))),
        Value::DateTimeTz(dt) => SeaValue::ChronoDateTimeUtc(Some(Box::new(dt))),
        Value::Uuid(u) => SeaValue::Uuid(Some(Box::new(u))),
        Value::Json(j) => SeaValue::Json(Some(Box::new(j))),
        Value::Array(_) => {
            return Err(Error::unsupported(
                "array values cannot be rendered into SQL clauses",
            ))
        }
    })
}

/// Extract the bind values of a rendered statement back into [`Value`]s.
///
/// The rendered `Values` list is authoritative: adapters may have added
/// binds the cursor never produced.
pub(crate) fn values_from_sea(values: &Values) -> Result<Vec<Value>> {
    values.0.iter().map(from_sea_value).collect()
}

fn from_sea_value(v: &SeaValue) -> Result<Value> {
    Ok(match v {
        SeaValue::Bool(Some(b)) => Value::Bool(*b),
        SeaValue::TinyInt(Some(n)) => Value::Int8(*n),
        SeaValue::SmallInt(Some(n)) => Value::Int16(*n),
        SeaValue::Int(Some(n)) => Value::Int32(*n),
        SeaValue::BigInt(Some(n)) => Value::Int64(*n),
        SeaValue::Float(Some(n)) => Value::Float32(*n),
        SeaValue::Double(Some(n)) => Value::Float64(*n),
        SeaValue::Decimal(Some(d)) => Value::Decimal(**d),
        SeaValue::String(Some(s)) => Value::String((**s).clone()),
        SeaValue::Bytes(Some(b)) => Value::Bytes((**b).clone()),
        SeaValue::ChronoDate(Some(d)) => Value::Date(**d),
        SeaValue::ChronoTime(Some(t)) => Value::Time(**t),
        SeaValue::ChronoDateTime(Some(dt)) => Value::DateTime(**dt),
        SeaValue::ChronoDateTimeUtc(Some(dt)) => Value::DateTimeTz(**dt),
        SeaValue::Uuid(Some(u)) => Value::Uuid(**u),
        SeaValue::Json(Some(j)) => Value::Json((**j).clone()),
        SeaValue::Bool(None)
        | SeaValue::TinyInt(None)
        | SeaValue::SmallInt(None)
        | SeaValue::Int(None)
        | SeaValue::BigInt(None)
        | SeaValue::TinyUnsigned(None)
        | SeaValue::SmallUnsigned(None)
        | SeaValue::Unsigned(None)
        | SeaValue::BigUnsigned(None)
        | SeaValue::Float(None)
        | SeaValue::Double(None)
        | SeaValue::String(None)
        | SeaValue::Char(None)
        | SeaValue::Bytes(None)
        | SeaValue::Decimal(None)
        | SeaValue::ChronoDate(None)
        | SeaValue::ChronoTime(None)
        | SeaValue::ChronoDateTime(None)
        | SeaValue::ChronoDateTimeUtc(None)
        | SeaValue::ChronoDateTimeLocal(None)
        | SeaValue::ChronoDateTimeWithTimeZone(None)
        | SeaValue::Uuid(None)
        | SeaValue::Json(None) => Value::Null,
        other => {
            return Err(Error::type_conversion(format!(
                "unsupported bind value produced by query adapter: {other:?}"
            )))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Dialect;
    use crate::types::{ColumnMetadata, SqlType};

    fn table() -> TableMetadata {
        TableMetadata::new("events")
            .with_schema("public")
            .with_column(ColumnMetadata::new("id", SqlType::Int64).primary_key(1))
            .with_column(ColumnMetadata::new(
                "updated_at",
                SqlType::Timestamp { with_tz: false },
            ))
    }

    #[test]
    fn test_no_cursor_plain_select() {
        let t = table();
        let stmt = QueryBuilder::new(&t, None).build().unwrap();
        let (sql, values) = Dialect::Postgres.build(&stmt);
        assert_eq!(sql, r#"SELECT * FROM "public"."events""#);
        assert!(values.0.is_empty());
    }

    #[test]
    fn test_max_cursor_lower_bound() {
        let t = table();
        let cursor = CursorState::max("updated_at").with_last_value(100_i64);
        let stmt = QueryBuilder::new(&t, Some(&cursor)).build().unwrap();
        let (sql, values) = Dialect::Postgres.build(&stmt);
        assert!(sql.contains(r#""updated_at" >= $1"#));
        assert!(!sql.contains("ORDER BY"));
        assert_eq!(values.0.len(), 1);
    }

    #[test]
    fn test_min_cursor_bounds() {
        let t = table();
        let cursor = CursorState::min("updated_at")
            .with_last_value(100_i64)
            .with_end_value(10_i64);
        let stmt = QueryBuilder::new(&t, Some(&cursor)).build().unwrap();
        let (sql, _) = Dialect::Postgres.build(&stmt);
        assert!(sql.contains(r#""updated_at" <= $1"#));
        assert!(sql.contains(r#""updated_at" > $2"#));
    }

    #[test]
    fn test_custom_func_full_scan() {
        let t = table();
        let cursor = CursorState::custom("updated_at").with_last_value(100_i64);
        let stmt = QueryBuilder::new(&t, Some(&cursor)).build().unwrap();
        let (sql, values) = Dialect::Postgres.build(&stmt);
        assert!(!sql.contains("WHERE"));
        assert!(values.0.is_empty());
    }

    #[test]
    fn test_include_ors_is_null() {
        let t = table();
        let cursor = CursorState::max("updated_at")
            .with_last_value(100_i64)
            .with_on_missing(MissingValuePolicy::Include);
        let stmt = QueryBuilder::new(&t, Some(&cursor)).build().unwrap();
        let (sql, _) = Dialect::Postgres.build(&stmt);
        assert!(sql.contains("OR"));
        assert!(sql.contains(r#""updated_at" IS NULL"#));
    }

    #[test]
    fn test_include_without_last_value_no_filter() {
        let t = table();
        let cursor =
            CursorState::max("updated_at").with_on_missing(MissingValuePolicy::Include);
        let stmt = QueryBuilder::new(&t, Some(&cursor)).build().unwrap();
        let (sql, _) = Dialect::Postgres.build(&stmt);
        assert!(!sql.contains("IS NULL"));
    }

    #[test]
    fn test_exclude_is_unconditional() {
        let t = table();
        let cursor =
            CursorState::max("updated_at").with_on_missing(MissingValuePolicy::Exclude);
        let stmt = QueryBuilder::new(&t, Some(&cursor)).build().unwrap();
        let (sql, _) = Dialect::Postgres.build(&stmt);
        assert!(sql.contains(r#""updated_at" IS NOT NULL"#));
    }

    #[test]
    fn test_array_value_rejected() {
        let err = to_sea_value(Value::Array(vec![Value::Int32(1)])).unwrap_err();
        assert!(matches!(err, Error::Unsupported { .. }));
    }

    #[test]
    fn test_null_binds_extract_as_null() {
        let values = Values(vec![
            SeaValue::String(None),
            SeaValue::BigInt(None),
            SeaValue::ChronoDateTimeUtc(None),
        ]);
        let params = values_from_sea(&values).unwrap();
        assert_eq!(params, vec![Value::Null, Value::Null, Value::Null]);
    }

    #[test]
    fn test_values_roundtrip_through_render() {
        let t = table();
        let cursor = CursorState::max("updated_at").with_last_value(100_i64);
        let stmt = QueryBuilder::new(&t, Some(&cursor)).build().unwrap();
        let (_, values) = Dialect::Postgres.build(&stmt);
        let params = values_from_sea(&values).unwrap();
        assert_eq!(params, vec![Value::Int64(100)]);
    }
}
