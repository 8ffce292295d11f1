//! Output backends
//!
//! The backend decides both the chunk representation and, for the bulk case,
//! who executes the query. The bulk reader is an external collaborator: this
//! crate renders the literal SQL and hands it over, it never links a bulk
//! driver itself.

use std::fmt;
use std::sync::Arc;

use arrow_array::RecordBatch;
use async_trait::async_trait;

use crate::error::Result;

/// How extracted chunks are represented
#[derive(Clone, Default)]
pub enum TableBackend {
    /// Row mappings (column name → value)
    #[default]
    Rows,
    /// Tabular frames with types inferred from the data
    Frame,
    /// Columnar batches built from declared column types
    Arrow(ArrowOptions),
    /// Delegate the whole query to an external bulk reader
    Bulk(BulkExport),
}

impl TableBackend {
    /// Backend name for logs and errors
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Rows => "rows",
            Self::Frame => "frame",
            Self::Arrow(_) => "arrow",
            Self::Bulk(_) => "bulk",
        }
    }
}

impl fmt::Debug for TableBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rows => write!(f, "Rows"),
            Self::Frame => write!(f, "Frame"),
            Self::Arrow(opts) => f.debug_tuple("Arrow").field(opts).finish(),
            Self::Bulk(export) => f
                .debug_struct("Bulk")
                .field("reader", &export.reader.is_some())
                .field("options", &export.options)
                .finish(),
        }
    }
}

/// Options for the columnar backend
#[derive(Debug, Clone, Default)]
pub struct ArrowOptions {
    /// Timezone applied to timezone-aware timestamp columns; UTC when unset
    pub timezone: Option<String>,
}

/// External reader executing a literal SQL statement in bulk
#[async_trait]
pub trait BulkReader: Send + Sync {
    /// Run `query` against `connection_url` and return the full result
    async fn read_sql(
        &self,
        connection_url: &str,
        query: &str,
        options: &BulkExportOptions,
    ) -> Result<RecordBatch>;
}

/// Bulk delegation: the reader plus its tuning options
#[derive(Clone)]
pub struct BulkExport {
    /// The reader implementation; `None` surfaces a missing-dependency error
    /// at load time
    pub reader: Option<Arc<dyn BulkReader>>,
    /// Reader options
    pub options: BulkExportOptions,
}

impl BulkExport {
    /// Bulk export through `reader` with default options
    pub fn new(reader: Arc<dyn BulkReader>) -> Self {
        Self {
            reader: Some(reader),
            options: BulkExportOptions::default(),
        }
    }

    /// Bulk export without a reader; loading will fail with instructions
    pub fn unconfigured() -> Self {
        Self {
            reader: None,
            options: BulkExportOptions::default(),
        }
    }

    /// Override the reader options
    pub fn with_options(mut self, options: BulkExportOptions) -> Self {
        self.options = options;
        self
    }
}

/// Output shape of the bulk result
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BulkFormat {
    /// Columnar batch
    #[default]
    Arrow,
    /// Tabular frame
    Frame,
}

/// Wire protocol the bulk reader should use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BulkProtocol {
    /// Vendor binary protocol
    #[default]
    Binary,
    /// CSV text protocol
    Csv,
    /// Server-side cursor
    Cursor,
}

/// Options handed to the bulk reader
///
/// Defaults apply first, caller overrides on top. The connection URL can only
/// be replaced wholesale; otherwise it is derived from the engine URL with
/// the driver qualifier stripped.
#[derive(Debug, Clone, Default)]
pub struct BulkExportOptions {
    /// Result representation
    pub format: BulkFormat,
    /// Wire protocol
    pub protocol: BulkProtocol,
    /// Full replacement connection URL for the reader
    pub connection_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_names() {
        assert_eq!(TableBackend::Rows.name(), "rows");
        assert_eq!(TableBackend::Frame.name(), "frame");
        assert_eq!(TableBackend::Arrow(ArrowOptions::default()).name(), "arrow");
        assert_eq!(
            TableBackend::Bulk(BulkExport::unconfigured()).name(),
            "bulk"
        );
    }

    #[test]
    fn test_bulk_defaults() {
        let options = BulkExportOptions::default();
        assert_eq!(options.format, BulkFormat::Arrow);
        assert_eq!(options.protocol, BulkProtocol::Binary);
        assert!(options.connection_url.is_none());
    }
}
