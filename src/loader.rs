//! Table loading: query execution and chunked streaming
//!
//! `TableLoader` validates its configuration up front, builds the extraction
//! query and executes it, yielding a [`ChunkStream`]. The stream is pull
//! based: each `next_chunk` call drains up to `chunk_size` rows and encodes
//! them per the backend. The pooled connection rides inside the stream and is
//! released on exhaustion, on error and on early drop alike.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use arrow_array::RecordBatch;
use sea_query::SelectStatement;
use tracing::debug;

use crate::arrow::{rows_to_batch, rows_to_frame};
use crate::backend::{BulkFormat, TableBackend};
use crate::connection::RowStream;
use crate::cursor::CursorState;
use crate::dialect::bulk_connection_url;
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::pool::PooledConnection;
use crate::query::{values_from_sea, QueryAdapter, QueryBuilder};
use crate::types::{ColumnMetadata, Row, TableMetadata, Value};

/// One extracted chunk, in the representation the backend selected
#[derive(Debug, Clone)]
pub enum Chunk {
    /// Row mappings
    Rows(Vec<HashMap<String, Value>>),
    /// Tabular frame with inferred types
    Frame(RecordBatch),
    /// Columnar batch built from declared types
    Arrow(RecordBatch),
}

impl Chunk {
    /// Number of rows in the chunk
    pub fn num_rows(&self) -> usize {
        match self {
            Self::Rows(rows) => rows.len(),
            Self::Frame(batch) | Self::Arrow(batch) => batch.num_rows(),
        }
    }
}

/// Loads one table incrementally
pub struct TableLoader {
    engine: Engine,
    backend: TableBackend,
    table: TableMetadata,
    cursor: Option<CursorState>,
    chunk_size: usize,
    query_adapter: Option<Arc<dyn QueryAdapter>>,
}

impl fmt::Debug for TableLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableLoader")
            .field("table", &self.table.qualified_name())
            .field("backend", &self.backend.name())
            .field("cursor", &self.cursor)
            .field("chunk_size", &self.chunk_size)
            .finish_non_exhaustive()
    }
}

impl TableLoader {
    /// Create a loader, validating the configuration
    ///
    /// A cursor column that does not exist in `table` fails here, before any
    /// query is built or executed.
    pub fn new(
        engine: Engine,
        backend: TableBackend,
        table: TableMetadata,
        cursor: Option<CursorState>,
        chunk_size: usize,
        query_adapter: Option<Arc<dyn QueryAdapter>>,
    ) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::config("chunk_size must be greater than zero"));
        }
        if let Some(cursor) = &cursor {
            if table.column(&cursor.column).is_none() {
                return Err(Error::CursorColumnMissing {
                    column: cursor.column.clone(),
                    table: table.qualified_name(),
                });
            }
        }
        Ok(Self {
            engine,
            backend,
            table,
            cursor,
            chunk_size,
            query_adapter,
        })
    }

    /// Build the extraction statement for the current cursor state
    pub fn make_query(&self) -> Result<SelectStatement> {
        let stmt = QueryBuilder::new(&self.table, self.cursor.as_ref()).build()?;
        match &self.query_adapter {
            Some(adapter) => adapter.adapt(stmt, &self.table),
            None => Ok(stmt),
        }
    }

    /// Execute the query and return the chunk stream
    pub async fn load(self) -> Result<ChunkStream> {
        if let TableBackend::Bulk(export) = &self.backend {
            let reader = export.reader.clone().ok_or_else(|| {
                Error::missing_dependency(
                    "bulk",
                    "no bulk reader configured; supply one via BulkExport::new",
                )
            })?;

            let table_name = self.table.qualified_name();
            let stmt = self.make_query().map_err(|e| match e {
                Error::Unsupported { message, source } => Error::Unsupported {
                    message: format!("table '{table_name}': {message}"),
                    source,
                },
                other => other,
            })?;
            // The bulk reader receives a self-contained statement; it has no
            // channel for bind parameters.
            let sql = self.engine.dialect().build_literal(&stmt);
            let connection_url = export
                .options
                .connection_url
                .clone()
                .unwrap_or_else(|| bulk_connection_url(self.engine.url()));

            debug!(table = %table_name, %sql, "delegating to bulk reader");
            let batch = reader.read_sql(&connection_url, &sql, &export.options).await?;
            let chunk = match export.options.format {
                BulkFormat::Arrow => Chunk::Arrow(batch),
                BulkFormat::Frame => Chunk::Frame(batch),
            };
            return Ok(ChunkStream {
                inner: Inner::Bulk { chunk: Some(chunk) },
            });
        }

        let stmt = self.make_query()?;
        let (sql, values) = self.engine.dialect().build(&stmt);
        let params = values_from_sea(&values)?;

        debug!(
            table = %self.table.qualified_name(),
            %sql,
            params = params.len(),
            "executing extraction query"
        );

        let mut conn = self.engine.connect().await?;
        let rows = conn.query_stream(&sql, &params).await?;

        let encoding = match self.backend {
            TableBackend::Rows => Encoding::Rows,
            TableBackend::Frame => Encoding::Frame,
            TableBackend::Arrow(options) => Encoding::Arrow {
                timezone: options.timezone,
            },
            TableBackend::Bulk(_) => unreachable!(),
        };

        Ok(ChunkStream {
            inner: Inner::Streamed {
                conn: Some(conn),
                rows: Some(rows),
                encoding,
                columns: self.table.columns,
                chunk_size: self.chunk_size,
            },
        })
    }
}

enum Encoding {
    Rows,
    Frame,
    Arrow { timezone: Option<String> },
}

enum Inner {
    Streamed {
        conn: Option<PooledConnection>,
        rows: Option<Box<dyn RowStream>>,
        encoding: Encoding,
        columns: Vec<ColumnMetadata>,
        chunk_size: usize,
    },
    Bulk {
        chunk: Option<Chunk>,
    },
}

/// Pull-based stream of chunks
///
/// Holds the pooled connection while rows remain; the connection returns to
/// the pool when the stream finishes, fails or is dropped early.
pub struct ChunkStream {
    inner: Inner,
}

impl fmt::Debug for ChunkStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.inner {
            Inner::Bulk { chunk: Some(_) } => "bulk (pending)",
            Inner::Bulk { chunk: None } => "bulk (drained)",
            Inner::Streamed { rows: Some(_), .. } => "streaming",
            Inner::Streamed { rows: None, .. } => "exhausted",
        };
        f.debug_struct("ChunkStream")
            .field("state", &state)
            .finish_non_exhaustive()
    }
}

impl ChunkStream {
    /// Fetch the next chunk, `None` when the result set is exhausted
    pub async fn next_chunk(&mut self) -> Result<Option<Chunk>> {
        match &mut self.inner {
            Inner::Bulk { chunk } => Ok(chunk.take()),
            Inner::Streamed {
                conn,
                rows,
                encoding,
                columns,
                chunk_size,
            } => {
                let Some(mut stream) = rows.take() else {
                    return Ok(None);
                };

                let mut buf: Vec<Row> = Vec::with_capacity(*chunk_size);
                let mut finished = false;
                while buf.len() < *chunk_size {
                    match stream.next().await {
                        Ok(Some(row)) => buf.push(row),
                        Ok(None) => {
                            finished = true;
                            break;
                        }
                        Err(e) => {
                            conn.take();
                            return Err(e);
                        }
                    }
                }

                if finished {
                    conn.take();
                } else {
                    *rows = Some(stream);
                }

                if buf.is_empty() {
                    return Ok(None);
                }

                let chunk = match encoding {
                    Encoding::Rows => {
                        Ok(Chunk::Rows(buf.into_iter().map(Row::into_map).collect()))
                    }
                    Encoding::Frame => rows_to_frame(&buf).map(Chunk::Frame),
                    Encoding::Arrow { timezone } => {
                        rows_to_batch(&buf, columns, timezone.as_deref()).map(Chunk::Arrow)
                    }
                };
                match chunk {
                    Ok(chunk) => Ok(Some(chunk)),
                    Err(e) => {
                        rows.take();
                        conn.take();
                        Err(e)
                    }
                }
            }
        }
    }
}
