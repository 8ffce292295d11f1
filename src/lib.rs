//! # increx
//!
//! Incremental table-extraction engine. Given a relational table and an
//! optional cursor state, increx builds a bounded query, executes it through
//! a pluggable connection seam and streams the result in fixed-size chunks:
//! row mappings, inferred-type tabular frames or typed columnar batches.
//! Very large tables can be delegated wholesale to an external bulk reader.
//!
//! Concrete database drivers stay outside the crate; they plug in through
//! [`ConnectionFactory`](connection::ConnectionFactory).
//!
//! ```no_run
//! use std::sync::Arc;
//! use increx::prelude::*;
//!
//! # async fn example(factory: Arc<dyn ConnectionFactory>) -> increx::Result<()> {
//! let engine = engine_from_credentials(
//!     "postgresql://app@localhost/warehouse".into(),
//!     factory,
//!     true,
//!     &EngineOptions::default(),
//! )?;
//!
//! let cursor = CursorState::max("updated_at").with_last_value(1_700_000_000_i64);
//! let mut stream = TableExtract::new(engine, "events")
//!     .with_schema("public")
//!     .with_cursor(cursor)
//!     .with_chunk_size(10_000)
//!     .run()
//!     .await?;
//!
//! while let Some(item) = stream.next().await? {
//!     match item {
//!         ExtractItem::Hints(hints) => println!("columns: {}", hints.columns.len()),
//!         ExtractItem::Chunk(chunk) => println!("rows: {}", chunk.num_rows()),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod arrow;
pub mod backend;
pub mod config;
pub mod connection;
pub mod cursor;
pub mod dialect;
pub mod engine;
pub mod error;
pub mod extract;
pub mod loader;
pub mod pool;
pub mod query;
pub mod schema;
pub mod testing;
pub mod types;

pub use error::{Error, ErrorCategory, Result};
pub use types::{Row, Value};

/// Commonly used types
pub mod prelude {
    pub use crate::backend::{
        ArrowOptions, BulkExport, BulkExportOptions, BulkFormat, BulkProtocol, BulkReader,
        TableBackend,
    };
    pub use crate::config::{BackendKind, CredentialsConfig, ExtractConfig};
    pub use crate::connection::{
        Connection, ConnectionConfig, ConnectionFactory, RowStream,
    };
    pub use crate::cursor::{CursorState, LastValueFunc, MissingValuePolicy, RowOrder};
    pub use crate::dialect::Dialect;
    pub use crate::engine::{
        engine_from_credentials, ConnectionDescriptor, Credentials, Engine, EngineOptions,
    };
    pub use crate::error::{Error, ErrorCategory, Result};
    pub use crate::extract::{ExtractItem, ExtractStream, TableExtract};
    pub use crate::loader::{Chunk, ChunkStream, TableLoader};
    pub use crate::query::{QueryAdapter, QueryBuilder};
    pub use crate::schema::{
        ReflectionLevel, SchemaHints, TableAdapter, TypeAdapter,
    };
    pub use crate::types::{ColumnMetadata, Row, SqlType, TableMetadata, Value};
}
