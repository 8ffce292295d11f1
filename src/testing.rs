//! In-memory connection for tests
//!
//! `MemoryConnectionFactory` hands out connections backed by shared state:
//! canned table metadata, canned rows or a responder closure, plus a log of
//! every executed statement. Open/close counters make connection lifecycle
//! assertions possible without a database.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::connection::{Connection, ConnectionConfig, ConnectionFactory, RowStream};
use crate::dialect::Dialect;
use crate::error::{Error, Result};
use crate::types::{Row, TableMetadata, Value};

type Responder = Arc<dyn Fn(&str, &[Value]) -> Vec<Row> + Send + Sync>;

#[derive(Default)]
struct MemoryState {
    tables: Mutex<HashMap<String, TableMetadata>>,
    rows: Mutex<Vec<Row>>,
    responder: Mutex<Option<Responder>>,
    queries: Mutex<Vec<(String, Vec<Value>)>>,
    open: AtomicUsize,
    closed: AtomicUsize,
    fail_connect: AtomicBool,
    fail_query: Mutex<Option<String>>,
}

/// Factory producing in-memory connections over shared state
#[derive(Default)]
pub struct MemoryConnectionFactory {
    state: Arc<MemoryState>,
}

impl MemoryConnectionFactory {
    /// Create an empty factory
    pub fn new() -> Self {
        Self::default()
    }

    /// Register table metadata for reflection
    pub fn add_table(&self, table: TableMetadata) {
        let key = table.qualified_name();
        self.state.tables.lock().insert(key, table);
    }

    /// Set the rows every query returns
    pub fn set_rows(&self, rows: Vec<Row>) {
        *self.state.rows.lock() = rows;
    }

    /// Answer queries through a closure instead of canned rows
    pub fn set_responder<F>(&self, responder: F)
    where
        F: Fn(&str, &[Value]) -> Vec<Row> + Send + Sync + 'static,
    {
        *self.state.responder.lock() = Some(Arc::new(responder));
    }

    /// Make subsequent connection attempts fail
    pub fn fail_connections(&self, fail: bool) {
        self.state.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent queries fail with `message`
    pub fn fail_queries(&self, message: impl Into<String>) {
        *self.state.fail_query.lock() = Some(message.into());
    }

    /// Every executed statement with its bind parameters, in order
    pub fn executed_queries(&self) -> Vec<(String, Vec<Value>)> {
        self.state.queries.lock().clone()
    }

    /// How many connections were opened
    pub fn open_connections(&self) -> usize {
        self.state.open.load(Ordering::SeqCst)
    }

    /// How many connections were closed
    pub fn closed_connections(&self) -> usize {
        self.state.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectionFactory for MemoryConnectionFactory {
    async fn connect(&self, _config: &ConnectionConfig) -> Result<Box<dyn Connection>> {
        if self.state.fail_connect.load(Ordering::SeqCst) {
            return Err(Error::connection("injected connect failure"));
        }
        self.state.open.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryConnection {
            state: Arc::clone(&self.state),
            closed: AtomicBool::new(false),
        }))
    }

    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }
}

/// A single in-memory connection
pub struct MemoryConnection {
    state: Arc<MemoryState>,
    closed: AtomicBool,
}

impl MemoryConnection {
    fn run_query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        if let Some(message) = self.state.fail_query.lock().clone() {
            return Err(Error::query_with_sql(message, sql));
        }
        self.state
            .queries
            .lock()
            .push((sql.to_owned(), params.to_vec()));

        let responder = self.state.responder.lock().clone();
        Ok(match responder {
            Some(responder) => responder(sql, params),
            None => self.state.rows.lock().clone(),
        })
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        self.run_query(sql, params)
    }

    async fn query_stream(
        &mut self,
        sql: &str,
        params: &[Value],
    ) -> Result<Box<dyn RowStream>> {
        let rows = self.run_query(sql, params)?;
        Ok(Box::new(VecRowStream::new(rows)))
    }

    async fn table_metadata(
        &mut self,
        schema: Option<&str>,
        table: &str,
    ) -> Result<Option<TableMetadata>> {
        let key = match schema {
            Some(schema) => format!("{schema}.{table}"),
            None => table.to_owned(),
        };
        Ok(self.state.tables.lock().get(&key).cloned())
    }

    async fn is_valid(&mut self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    async fn close(&mut self) -> Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.state.closed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// Row stream over materialized rows
pub struct VecRowStream {
    rows: VecDeque<Row>,
}

impl VecRowStream {
    /// Stream over `rows`
    pub fn new(rows: Vec<Row>) -> Self {
        Self { rows: rows.into() }
    }
}

impl RowStream for VecRowStream {
    fn next(&mut self) -> Pin<Box<dyn Future<Output = Result<Option<Row>>> + Send + '_>> {
        let row = self.rows.pop_front();
        Box::pin(async move { Ok(row) })
    }
}
