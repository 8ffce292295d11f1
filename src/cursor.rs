//! Cursor state and the policies that govern incremental extraction
//!
//! The cursor describes where a previous run stopped: the column it tracks,
//! the aggregation direction used to pick the boundary value, and how rows
//! with a NULL cursor value are treated. The query builder turns this into
//! WHERE/ORDER BY clauses; everything here is pure policy.

use serde::{Deserialize, Serialize};

use crate::types::Value;

/// Aggregation used to derive the boundary value of a completed run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LastValueFunc {
    /// Track the maximum seen value (ascending extraction)
    #[default]
    Max,
    /// Track the minimum seen value (descending extraction)
    Min,
    /// Caller-defined aggregation: the engine cannot build a filter for it,
    /// so the table is scanned in full without WHERE or ORDER BY
    Custom,
}

impl LastValueFunc {
    /// Whether this aggregation admits a server-side filter
    #[inline]
    pub const fn is_filtering(self) -> bool {
        !matches!(self, Self::Custom)
    }
}

/// Requested row ordering for the extraction query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowOrder {
    /// Ascending by cursor column
    Asc,
    /// Descending by cursor column
    Desc,
}

/// How rows whose cursor column is NULL participate in extraction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingValuePolicy {
    /// Leave NULL handling to the database (NULLs fall outside the bound)
    #[default]
    Default,
    /// Also emit rows whose cursor column is NULL
    Include,
    /// Explicitly exclude rows whose cursor column is NULL
    Exclude,
}

/// Resumable cursor state for one table
///
/// Serializable so callers can persist it between runs. `last_value` of
/// `None` means "no lower bound yet": the first run scans everything and the
/// caller records the boundary for the next run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CursorState {
    /// The tracked column
    pub column: String,
    /// Aggregation direction
    #[serde(default)]
    pub func: LastValueFunc,
    /// Boundary value from the previous run, if any
    #[serde(default)]
    pub last_value: Option<Value>,
    /// Optional exclusive end bound (backfill windows)
    #[serde(default)]
    pub end_value: Option<Value>,
    /// Requested ordering; `None` means no ORDER BY
    #[serde(default)]
    pub row_order: Option<RowOrder>,
    /// NULL cursor handling
    #[serde(default)]
    pub on_missing: MissingValuePolicy,
    /// Primary key hint passed through to the control record
    #[serde(default)]
    pub primary_key: Option<Vec<String>>,
}

impl CursorState {
    /// Cursor tracking the maximum of `column`
    pub fn max(column: impl Into<String>) -> Self {
        Self::new(column, LastValueFunc::Max)
    }

    /// Cursor tracking the minimum of `column`
    pub fn min(column: impl Into<String>) -> Self {
        Self::new(column, LastValueFunc::Min)
    }

    /// Cursor with a caller-defined aggregation (full scan, no filter)
    pub fn custom(column: impl Into<String>) -> Self {
        Self::new(column, LastValueFunc::Custom)
    }

    fn new(column: impl Into<String>, func: LastValueFunc) -> Self {
        Self {
            column: column.into(),
            func,
            last_value: None,
            end_value: None,
            row_order: None,
            on_missing: MissingValuePolicy::Default,
            primary_key: None,
        }
    }

    /// Set the boundary value from the previous run
    pub fn with_last_value(mut self, value: impl Into<Value>) -> Self {
        self.last_value = Some(value.into());
        self
    }

    /// Set an exclusive end bound
    pub fn with_end_value(mut self, value: impl Into<Value>) -> Self {
        self.end_value = Some(value.into());
        self
    }

    /// Request row ordering
    pub fn with_row_order(mut self, order: RowOrder) -> Self {
        self.row_order = Some(order);
        self
    }

    /// Set the NULL cursor handling policy
    pub fn with_on_missing(mut self, policy: MissingValuePolicy) -> Self {
        self.on_missing = policy;
        self
    }

    /// Set the primary key hint
    pub fn with_primary_key(mut self, columns: Vec<String>) -> Self {
        self.primary_key = Some(columns);
        self
    }

    /// Effective SQL ordering: the requested order is interpreted relative to
    /// the aggregation direction. Asking for `Asc` while tracking `Min` means
    /// "ascending in extraction direction", which is descending in SQL.
    /// `None` when no order was requested or the aggregation is custom.
    pub fn resolved_order(&self) -> Option<RowOrder> {
        let requested = self.row_order?;
        match (requested, self.func) {
            (RowOrder::Asc, LastValueFunc::Max) | (RowOrder::Desc, LastValueFunc::Min) => {
                Some(RowOrder::Asc)
            }
            (RowOrder::Asc, LastValueFunc::Min) | (RowOrder::Desc, LastValueFunc::Max) => {
                Some(RowOrder::Desc)
            }
            (_, LastValueFunc::Custom) => None,
        }
    }
}
