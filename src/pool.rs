//! Lazy connection pool
//!
//! Connections are opened on demand up to a fixed cap and parked for reuse
//! when the guard drops. The pool is the engine handle's disposable state:
//! `close` drains and closes every idle connection, and in-flight guards
//! returning to a closed pool close their connection instead of parking it.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tracing::warn;

use crate::connection::{Connection, ConnectionConfig, ConnectionFactory};
use crate::error::{Error, Result};

/// Connection pool with lazy connection creation
pub struct ConnectionPool {
    factory: Arc<dyn ConnectionFactory>,
    config: ConnectionConfig,
    semaphore: Arc<Semaphore>,
    idle: Mutex<Vec<Box<dyn Connection>>>,
    closed: AtomicBool,
    acquire_timeout: Duration,
}

impl ConnectionPool {
    /// Create a pool of at most `max_size` connections
    pub fn new(
        factory: Arc<dyn ConnectionFactory>,
        config: ConnectionConfig,
        max_size: usize,
        acquire_timeout: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            factory,
            config,
            semaphore: Arc::new(Semaphore::new(max_size)),
            idle: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            acquire_timeout,
        })
    }

    /// Acquire a connection, reusing an idle one when possible
    pub async fn get(self: &Arc<Self>) -> Result<PooledConnection> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::connection("pool is closed"));
        }

        let permit = tokio::time::timeout(
            self.acquire_timeout,
            Arc::clone(&self.semaphore).acquire_owned(),
        )
        .await
        .map_err(|_| {
            Error::pool_exhausted(format!(
                "no connection available within {:?}",
                self.acquire_timeout
            ))
        })?
        .map_err(|_| Error::connection("pool is closed"))?;

        // Reuse an idle connection when it still responds. The lock is not
        // held across the validity probe.
        loop {
            let candidate = self.idle.lock().await.pop();
            let Some(mut conn) = candidate else { break };
            if conn.is_valid().await {
                return Ok(PooledConnection {
                    conn: Some(conn),
                    pool: Arc::clone(self),
                    permit: Some(permit),
                });
            }
            if let Err(e) = conn.close().await {
                warn!(error = %e, "failed to close stale connection");
            }
        }

        let conn = self.factory.connect(&self.config).await?;
        Ok(PooledConnection {
            conn: Some(conn),
            pool: Arc::clone(self),
            permit: Some(permit),
        })
    }

    async fn return_connection(&self, mut conn: Box<dyn Connection>) {
        if self.closed.load(Ordering::Acquire) {
            if let Err(e) = conn.close().await {
                warn!(error = %e, "failed to close returned connection");
            }
            return;
        }
        self.idle.lock().await.push(conn);
    }

    /// Close the pool and every idle connection
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.semaphore.close();

        let mut idle = self.idle.lock().await;
        for mut conn in idle.drain(..) {
            if let Err(e) = conn.close().await {
                warn!(error = %e, "failed to close pooled connection");
            }
        }
        Ok(())
    }

    /// Whether the pool has been closed
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Guard over a pooled connection; returns it to the pool on drop
pub struct PooledConnection {
    conn: Option<Box<dyn Connection>>,
    pool: Arc<ConnectionPool>,
    permit: Option<OwnedSemaphorePermit>,
}

impl fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("live", &self.conn.is_some())
            .field("pool_closed", &self.pool.is_closed())
            .finish_non_exhaustive()
    }
}

impl Deref for PooledConnection {
    type Target = dyn Connection;

    fn deref(&self) -> &Self::Target {
        match self.conn.as_deref() {
            Some(conn) => conn,
            // Taken only inside Drop, after which no deref can happen.
            None => unreachable!(),
        }
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match self.conn.as_deref_mut() {
            Some(conn) => conn,
            None => unreachable!(),
        }
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else { return };
        let pool = Arc::clone(&self.pool);
        let permit = self.permit.take();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                pool.return_connection(conn).await;
                drop(permit);
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Dialect;
    use crate::testing::MemoryConnectionFactory;

    fn pool(factory: Arc<MemoryConnectionFactory>, max: usize) -> Arc<ConnectionPool> {
        ConnectionPool::new(
            factory,
            ConnectionConfig::new("memory://test"),
            max,
            Duration::from_millis(100),
        )
    }

    #[tokio::test]
    async fn test_get_opens_lazily() {
        let factory = Arc::new(MemoryConnectionFactory::new());
        assert_eq!(factory.dialect(), Dialect::Postgres);
        let pool = pool(Arc::clone(&factory), 2);
        assert_eq!(factory.open_connections(), 0);

        let conn = pool.get().await.unwrap();
        assert_eq!(factory.open_connections(), 1);
        drop(conn);
    }

    #[tokio::test]
    async fn test_connection_reuse() {
        let factory = Arc::new(MemoryConnectionFactory::new());
        let pool = pool(Arc::clone(&factory), 2);

        let conn = pool.get().await.unwrap();
        drop(conn);
        // The return is spawned; give it a tick to land.
        tokio::time::sleep(Duration::from_millis(20)).await;

        let _conn = pool.get().await.unwrap();
        assert_eq!(factory.open_connections(), 1);
    }

    #[tokio::test]
    async fn test_exhaustion_times_out() {
        let factory = Arc::new(MemoryConnectionFactory::new());
        let pool = pool(factory, 1);

        let _held = pool.get().await.unwrap();
        let err = pool.get().await.unwrap_err();
        assert!(matches!(err, Error::PoolExhausted { .. }));
        assert!(err.is_retriable());
    }

    #[tokio::test]
    async fn test_close_closes_idle() {
        let factory = Arc::new(MemoryConnectionFactory::new());
        let pool = pool(Arc::clone(&factory), 2);

        let conn = pool.get().await.unwrap();
        drop(conn);
        tokio::time::sleep(Duration::from_millis(20)).await;

        pool.close().await.unwrap();
        assert_eq!(factory.closed_connections(), 1);
        assert!(pool.get().await.is_err());
    }

    #[tokio::test]
    async fn test_return_after_close_closes_connection() {
        let factory = Arc::new(MemoryConnectionFactory::new());
        let pool = pool(Arc::clone(&factory), 2);

        let conn = pool.get().await.unwrap();
        pool.close().await.unwrap();
        drop(conn);
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(factory.closed_connections(), 1);
    }
}
