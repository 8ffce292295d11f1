//! Extraction orchestration
//!
//! `TableExtract` ties everything together: it resolves table metadata
//! (reflecting at run time unless metadata was supplied), derives the schema
//! hints, and starts the loader. When reflection is deferred to run time the
//! resulting [`ExtractStream`] yields exactly one control record before the
//! data chunks; with pre-supplied metadata it yields data only. An engine
//! owned by the run is disposed exactly once, whether the run succeeds,
//! fails or is dropped early.

use std::fmt;
use std::sync::Arc;

use tracing::{info, warn};

use crate::backend::TableBackend;
use crate::cursor::CursorState;
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::loader::{Chunk, ChunkStream, TableLoader};
use crate::query::QueryAdapter;
use crate::schema::{
    apply_included_columns, get_primary_key, table_to_columns, ReflectionLevel, SchemaHints,
    TableAdapter, TypeAdapter,
};
use crate::types::TableMetadata;

/// One item of an extraction run
#[derive(Debug)]
pub enum ExtractItem {
    /// Control record carrying schema hints discovered at run time; when
    /// present it is the first item, and there is at most one
    Hints(SchemaHints),
    /// Data chunk
    Chunk(Chunk),
}

/// Builder for one extraction run
pub struct TableExtract {
    engine: Engine,
    schema: Option<String>,
    table: String,
    metadata: Option<TableMetadata>,
    cursor: Option<CursorState>,
    backend: TableBackend,
    chunk_size: usize,
    reflection_level: ReflectionLevel,
    included_columns: Vec<String>,
    table_adapter: Option<Arc<dyn TableAdapter>>,
    type_adapter: Option<Arc<dyn TypeAdapter>>,
    query_adapter: Option<Arc<dyn QueryAdapter>>,
}

impl std::fmt::Debug for TableExtract {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableExtract")
            .field("schema", &self.schema)
            .field("table", &self.table)
            .field("backend", &self.backend.name())
            .field("chunk_size", &self.chunk_size)
            .field("reflection_level", &self.reflection_level)
            .finish_non_exhaustive()
    }
}

impl TableExtract {
    /// Extraction of `table` through `engine`
    pub fn new(engine: Engine, table: impl Into<String>) -> Self {
        Self {
            engine,
            schema: None,
            table: table.into(),
            metadata: None,
            cursor: None,
            backend: TableBackend::default(),
            chunk_size: 50_000,
            reflection_level: ReflectionLevel::default(),
            included_columns: Vec::new(),
            table_adapter: None,
            type_adapter: None,
            query_adapter: None,
        }
    }

    /// Set the schema/namespace the table lives in
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Supply already-reflected metadata, skipping run-time reflection
    pub fn with_metadata(mut self, metadata: TableMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Set the cursor state for incremental extraction
    pub fn with_cursor(mut self, cursor: CursorState) -> Self {
        self.cursor = Some(cursor);
        self
    }

    /// Select the output backend
    pub fn with_backend(mut self, backend: TableBackend) -> Self {
        self.backend = backend;
        self
    }

    /// Set the chunk size (default 50 000)
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Set the reflection level
    pub fn with_reflection_level(mut self, level: ReflectionLevel) -> Self {
        self.reflection_level = level;
        self
    }

    /// Restrict extraction to the listed columns
    pub fn with_included_columns(mut self, columns: Vec<String>) -> Self {
        self.included_columns = columns;
        self
    }

    /// Install a table adapter
    pub fn with_table_adapter(mut self, adapter: Arc<dyn TableAdapter>) -> Self {
        self.table_adapter = Some(adapter);
        self
    }

    /// Install a type adapter
    pub fn with_type_adapter(mut self, adapter: Arc<dyn TypeAdapter>) -> Self {
        self.type_adapter = Some(adapter);
        self
    }

    /// Install a query adapter
    pub fn with_query_adapter(mut self, adapter: Arc<dyn QueryAdapter>) -> Self {
        self.query_adapter = Some(adapter);
        self
    }

    /// Start the run
    pub async fn run(self) -> Result<ExtractStream> {
        let engine = self.engine.clone();
        match self.prepare().await {
            Ok(stream) => Ok(stream),
            Err(e) => {
                if engine.may_dispose_after_use() {
                    if let Err(dispose_err) = engine.dispose().await {
                        warn!(error = %dispose_err, "failed to dispose engine after error");
                    }
                }
                Err(e)
            }
        }
    }

    async fn prepare(mut self) -> Result<ExtractStream> {
        // Reflection is deferred when no metadata was supplied up front; only
        // a deferred run announces what it discovered through a control
        // record. With pre-reflected metadata the caller already knows the
        // mapping and the stream starts with data.
        let deferred = self.metadata.is_none();
        info!(
            table = %self.qualified_name(),
            backend = self.backend.name(),
            incremental = self.cursor.is_some(),
            deferred,
            "starting extraction"
        );

        let mut table = match self.metadata.take() {
            Some(metadata) => metadata,
            None => {
                let mut conn = self.engine.connect().await?;
                conn.table_metadata(self.schema.as_deref(), &self.table)
                    .await?
                    .ok_or_else(|| Error::TableNotFound {
                        table: self.qualified_name(),
                    })?
            }
        };

        table = apply_included_columns(table, &self.included_columns);
        if let Some(adapter) = &self.table_adapter {
            table = adapter.adapt(table)?;
        }

        let columns =
            table_to_columns(&table, self.reflection_level, self.type_adapter.as_deref());

        let mut cursor = self.cursor;
        let primary_key = cursor
            .as_ref()
            .and_then(|c| c.primary_key.clone())
            .or_else(|| get_primary_key(&table));
        if let Some(cursor) = &mut cursor {
            if cursor.primary_key.is_none() {
                cursor.primary_key = primary_key.clone();
            }
        }
        let hints = deferred.then_some(SchemaHints {
            primary_key,
            columns,
        });

        let loader = TableLoader::new(
            self.engine.clone(),
            self.backend,
            table,
            cursor,
            self.chunk_size,
            self.query_adapter,
        )?;
        let chunks = loader.load().await?;

        Ok(ExtractStream {
            engine: Some(self.engine),
            hints,
            chunks,
            finished: false,
        })
    }

    fn qualified_name(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", schema, self.table),
            None => self.table.clone(),
        }
    }
}

/// Stream of extraction items: data chunks, preceded by one control record
/// when reflection was deferred to run time
pub struct ExtractStream {
    engine: Option<Engine>,
    hints: Option<SchemaHints>,
    chunks: ChunkStream,
    finished: bool,
}

impl fmt::Debug for ExtractStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractStream")
            .field("hints_pending", &self.hints.is_some())
            .field("finished", &self.finished)
            .field("chunks", &self.chunks)
            .finish_non_exhaustive()
    }
}

impl ExtractStream {
    /// Fetch the next item, `None` when the run is complete
    pub async fn next(&mut self) -> Result<Option<ExtractItem>> {
        if let Some(hints) = self.hints.take() {
            return Ok(Some(ExtractItem::Hints(hints)));
        }
        if self.finished {
            return Ok(None);
        }
        match self.chunks.next_chunk().await {
            Ok(Some(chunk)) => Ok(Some(ExtractItem::Chunk(chunk))),
            Ok(None) => {
                self.finished = true;
                self.finish().await;
                Ok(None)
            }
            Err(e) => {
                self.finished = true;
                self.finish().await;
                Err(e)
            }
        }
    }

    /// Adapt the pull-based stream to a `futures::Stream`
    ///
    /// After an error the stream terminates on the next poll; cleanup has
    /// already run by then.
    pub fn into_stream(self) -> impl futures::Stream<Item = Result<ExtractItem>> {
        futures::stream::unfold(self, |mut stream| async move {
            match stream.next().await {
                Ok(Some(item)) => Some((Ok(item), stream)),
                Ok(None) => None,
                Err(e) => Some((Err(e), stream)),
            }
        })
    }

    /// End the run early, disposing an owned engine
    pub async fn finish(&mut self) {
        let Some(engine) = self.engine.take() else { return };
        if engine.may_dispose_after_use() {
            if let Err(e) = engine.dispose().await {
                warn!(error = %e, "failed to dispose engine");
            }
        }
    }
}

impl Drop for ExtractStream {
    fn drop(&mut self) {
        if let Some(engine) = self.engine.take() {
            if engine.may_dispose_after_use() {
                engine.dispose_in_background();
            }
        }
    }
}
