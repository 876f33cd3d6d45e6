//! Fixed-capacity connection pool
//!
//! Holds up to `capacity` open connections to one PrintSrv endpoint. A
//! semaphore with `capacity` permits bounds concurrent borrowers, so a borrow
//! blocks while every connection is out. Idle connections wait in a FIFO
//! queue.
//!
//! A borrowed connection comes back through exactly one of
//! [`ConnectionPool::return_connection`] or
//! [`ConnectionPool::invalidate_and_replace`]. A guard that is simply dropped
//! discards its connection; the permit is released and the next borrower
//! opens a fresh one.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info, warn};
use utoipa::ToSchema;

use crate::error::{Result, ScadaError};

/// A connection that can live in the pool
#[async_trait]
pub trait PooledConnection: Send + Sync + 'static {
    /// Identity token used in log lines (`con=<id>`)
    fn id(&self) -> &str;

    /// Locally observable liveness: not closed, still connected
    fn is_valid(&self) -> bool;

    /// Send one request body as a frame
    async fn send_request(&mut self, body: &str) -> Result<()>;

    /// Read one response frame
    async fn receive_response(&mut self) -> Result<String>;

    /// Close the connection; errors are swallowed
    async fn close(&mut self);
}

/// Opens new connections for the pool
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    type Connection: PooledConnection;

    async fn create(&self) -> Result<Self::Connection>;

    /// Human-readable endpoint, for logs
    fn endpoint(&self) -> String;
}

/// Connection pool statistics
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PoolStats {
    pub capacity: usize,
    pub idle: usize,
    pub in_use: usize,
    pub created: u64,
    pub invalidated: u64,
    pub replacement_failures: u64,
}

/// Borrowed connection
///
/// Derefs to the connection. Hand it back with
/// [`ConnectionPool::return_connection`] or
/// [`ConnectionPool::invalidate_and_replace`].
pub struct PooledConnectionGuard<C: PooledConnection> {
    connection: C,
    _permit: OwnedSemaphorePermit,
}

impl<C: PooledConnection> fmt::Debug for PooledConnectionGuard<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnectionGuard")
            .field("con", &self.connection.id())
            .finish()
    }
}

impl<C: PooledConnection> std::ops::Deref for PooledConnectionGuard<C> {
    type Target = C;

    fn deref(&self) -> &Self::Target {
        &self.connection
    }
}

impl<C: PooledConnection> std::ops::DerefMut for PooledConnectionGuard<C> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.connection
    }
}

/// Fixed-capacity pool of PrintSrv connections
pub struct ConnectionPool<F: ConnectionFactory> {
    factory: F,
    capacity: usize,
    idle: Mutex<VecDeque<F::Connection>>,
    permits: Arc<Semaphore>,
    shut_down: AtomicBool,
    created: AtomicU64,
    invalidated: AtomicU64,
    replacement_failures: AtomicU64,
}

impl<F: ConnectionFactory> ConnectionPool<F> {
    /// Create the pool and open `capacity` connections up front
    ///
    /// Connections that fail to open are logged and skipped; the pool starts
    /// degraded and borrowers open the missing ones on demand.
    pub async fn new(factory: F, capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(ScadaError::config("connection pool size must be >= 1"));
        }

        let pool = Self {
            factory,
            capacity,
            idle: Mutex::new(VecDeque::with_capacity(capacity)),
            permits: Arc::new(Semaphore::new(capacity)),
            shut_down: AtomicBool::new(false),
            created: AtomicU64::new(0),
            invalidated: AtomicU64::new(0),
            replacement_failures: AtomicU64::new(0),
        };

        for slot in 1..=capacity {
            match pool.open_connection().await {
                Ok(conn) => pool.idle.lock().push_back(conn),
                Err(e) => warn!(
                    "Failed to open pooled connection {}/{} to {}: {}",
                    slot,
                    capacity,
                    pool.factory.endpoint(),
                    e
                ),
            }
        }

        let ready = pool.idle.lock().len();
        if ready == capacity {
            info!(
                "Connection pool ready: {}/{} connections to {}",
                ready,
                capacity,
                pool.factory.endpoint()
            );
        } else {
            warn!(
                "Connection pool started degraded: {}/{} connections to {}",
                ready,
                capacity,
                pool.factory.endpoint()
            );
        }

        Ok(pool)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn endpoint(&self) -> String {
        self.factory.endpoint()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    async fn open_connection(&self) -> Result<F::Connection> {
        let conn = self.factory.create().await?;
        self.created.fetch_add(1, Ordering::Relaxed);
        debug!("Opened con={} to {}", conn.id(), self.factory.endpoint());
        Ok(conn)
    }

    /// Borrow a connection, waiting while all of them are in use
    ///
    /// An idle connection that is no longer valid is closed and replaced
    /// before it is handed out. If the pool has shrunk below capacity a new
    /// connection is opened.
    pub async fn borrow_connection(&self) -> Result<PooledConnectionGuard<F::Connection>> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ScadaError::connection("connection pool is shut down"))?;

        let candidate = self.idle.lock().pop_front();
        let connection = match candidate {
            Some(conn) if conn.is_valid() => conn,
            Some(mut stale) => {
                warn!("con={} is no longer valid, replacing it", stale.id());
                stale.close().await;
                self.invalidated.fetch_add(1, Ordering::Relaxed);
                self.open_connection().await?
            },
            None => {
                debug!("No idle connection available, opening a new one");
                self.open_connection().await?
            },
        };

        debug!("Borrowed con={}", connection.id());
        Ok(PooledConnectionGuard {
            connection,
            _permit: permit,
        })
    }

    /// Give a healthy connection back to the pool
    ///
    /// Closed instead if the pool is already full or shut down.
    pub async fn return_connection(&self, guard: PooledConnectionGuard<F::Connection>) {
        let PooledConnectionGuard {
            connection,
            _permit: permit,
        } = guard;

        let rejected = if self.is_shut_down() || !connection.is_valid() {
            Some(connection)
        } else {
            let mut idle = self.idle.lock();
            if idle.len() < self.capacity {
                debug!("Returned con={}", connection.id());
                idle.push_back(connection);
                None
            } else {
                Some(connection)
            }
        };

        if let Some(mut conn) = rejected {
            debug!("Closing con={} instead of returning it", conn.id());
            conn.close().await;
        }

        drop(permit);
    }

    /// Close a broken connection and try to put a fresh one in its place
    ///
    /// If the replacement cannot be opened the pool runs one connection
    /// short until a later borrow opens it. Only transport and framing
    /// failures are logged as warnings; other reasons discard the socket
    /// quietly.
    pub async fn invalidate_and_replace(
        &self,
        guard: PooledConnectionGuard<F::Connection>,
        reason: &ScadaError,
    ) {
        let PooledConnectionGuard {
            mut connection,
            _permit: permit,
        } = guard;

        let old_id = connection.id().to_string();
        if reason.is_connection_fatal() {
            warn!("Invalidating con={}: {}", old_id, reason);
        } else {
            debug!("Discarding con={} after non-transport error: {}", old_id, reason);
        }
        connection.close().await;
        self.invalidated.fetch_add(1, Ordering::Relaxed);

        if !self.is_shut_down() {
            match self.open_connection().await {
                Ok(fresh) => {
                    info!("Replaced con={} with con={}", old_id, fresh.id());
                    let overflow = {
                        let mut idle = self.idle.lock();
                        if idle.len() < self.capacity {
                            idle.push_back(fresh);
                            None
                        } else {
                            Some(fresh)
                        }
                    };
                    if let Some(mut extra) = overflow {
                        extra.close().await;
                    }
                },
                Err(e) => {
                    self.replacement_failures.fetch_add(1, Ordering::Relaxed);
                    error!(
                        "Failed to replace con={}: {}. Pool capacity degraded ({} idle of {})",
                        old_id,
                        e,
                        self.idle.lock().len(),
                        self.capacity
                    );
                },
            }
        }

        drop(permit);
    }

    /// Close every idle connection
    ///
    /// Borrowed connections are untouched. Used after PrintSrv has been
    /// unreachable so later borrows open fresh sockets.
    pub async fn reset_idle_connections(&self) -> usize {
        let drained: Vec<F::Connection> = self.idle.lock().drain(..).collect();
        let count = drained.len();
        for mut conn in drained {
            conn.close().await;
        }
        if count > 0 {
            self.invalidated.fetch_add(count as u64, Ordering::Relaxed);
            info!("Closed {} idle connection(s) to {}", count, self.factory.endpoint());
        }
        count
    }

    /// Stop lending connections and close the idle ones
    ///
    /// Best effort: close failures are ignored. Connections still borrowed are
    /// closed when they come back.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        self.permits.close();

        let drained: Vec<F::Connection> = self.idle.lock().drain(..).collect();
        let count = drained.len();
        for mut conn in drained {
            conn.close().await;
        }
        info!("Connection pool shut down, closed {} idle connection(s)", count);
    }

    /// Get pool statistics
    pub fn stats(&self) -> PoolStats {
        let available = if self.is_shut_down() {
            self.capacity
        } else {
            self.permits.available_permits()
        };
        PoolStats {
            capacity: self.capacity,
            idle: self.idle.lock().len(),
            in_use: self.capacity.saturating_sub(available),
            created: self.created.load(Ordering::Relaxed),
            invalidated: self.invalidated.load(Ordering::Relaxed),
            replacement_failures: self.replacement_failures.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // unwrap is acceptable in tests
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;
    use tracing_test::traced_test;

    pub(crate) struct MockConnection {
        id: String,
        valid: Arc<AtomicBool>,
        closed: Arc<AtomicU32>,
    }

    #[async_trait]
    impl PooledConnection for MockConnection {
        fn id(&self) -> &str {
            &self.id
        }

        fn is_valid(&self) -> bool {
            self.valid.load(Ordering::SeqCst)
        }

        async fn send_request(&mut self, _body: &str) -> Result<()> {
            Ok(())
        }

        async fn receive_response(&mut self) -> Result<String> {
            Ok("{}".to_string())
        }

        async fn close(&mut self) {
            self.valid.store(false, Ordering::SeqCst);
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Factory that counts creations and can be switched to fail
    #[derive(Clone, Default)]
    pub(crate) struct MockFactory {
        pub created: Arc<AtomicU32>,
        pub closed: Arc<AtomicU32>,
        pub failing: Arc<AtomicBool>,
        pub handles: Arc<Mutex<Vec<Arc<AtomicBool>>>>,
    }

    #[async_trait]
    impl ConnectionFactory for MockFactory {
        type Connection = MockConnection;

        async fn create(&self) -> Result<MockConnection> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(ScadaError::connection("connection refused"));
            }
            let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
            let valid = Arc::new(AtomicBool::new(true));
            self.handles.lock().push(valid.clone());
            Ok(MockConnection {
                id: format!("{:x}", n),
                valid,
                closed: self.closed.clone(),
            })
        }

        fn endpoint(&self) -> String {
            "mock:0".to_string()
        }
    }

    #[tokio::test]
    async fn test_prepopulates_capacity() {
        let factory = MockFactory::default();
        let pool = ConnectionPool::new(factory.clone(), 3).await.unwrap();

        assert_eq!(factory.created.load(Ordering::SeqCst), 3);
        let stats = pool.stats();
        assert_eq!(stats.idle, 3);
        assert_eq!(stats.in_use, 0);
    }

    #[tokio::test]
    async fn test_zero_capacity_is_rejected() {
        assert!(matches!(
            ConnectionPool::new(MockFactory::default(), 0).await,
            Err(ScadaError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_starts_degraded_when_endpoint_down() {
        let factory = MockFactory::default();
        factory.failing.store(true, Ordering::SeqCst);
        let pool = ConnectionPool::new(factory.clone(), 2).await.unwrap();
        assert_eq!(pool.stats().idle, 0);

        // Borrow fails while the endpoint is down, then recovers lazily
        assert!(pool.borrow_connection().await.is_err());
        factory.failing.store(false, Ordering::SeqCst);
        let conn = pool.borrow_connection().await.unwrap();
        pool.return_connection(conn).await;
        assert_eq!(pool.stats().idle, 1);
    }

    #[tokio::test]
    async fn test_borrow_blocks_until_return() {
        let pool = Arc::new(ConnectionPool::new(MockFactory::default(), 1).await.unwrap());
        let held = pool.borrow_connection().await.unwrap();

        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move {
                let conn = pool.borrow_connection().await.unwrap();
                let id = conn.id().to_string();
                pool.return_connection(conn).await;
                id
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        let held_id = held.id().to_string();
        pool.return_connection(held).await;
        assert_eq!(waiter.await.unwrap(), held_id);
    }

    #[tokio::test]
    async fn test_invalid_idle_connection_is_replaced_on_borrow() {
        let factory = MockFactory::default();
        let pool = ConnectionPool::new(factory.clone(), 1).await.unwrap();
        factory.handles.lock()[0].store(false, Ordering::SeqCst);

        let conn = pool.borrow_connection().await.unwrap();
        assert!(conn.is_valid());
        assert_eq!(conn.id(), "2");
        assert_eq!(factory.created.load(Ordering::SeqCst), 2);
        assert_eq!(pool.stats().invalidated, 1);
        pool.return_connection(conn).await;
    }

    #[tokio::test]
    async fn test_invalidate_and_replace_keeps_capacity() {
        let factory = MockFactory::default();
        let pool = ConnectionPool::new(factory.clone(), 2).await.unwrap();

        let conn = pool.borrow_connection().await.unwrap();
        pool.invalidate_and_replace(conn, &ScadaError::io("reset"))
            .await;

        let stats = pool.stats();
        assert_eq!(stats.idle, 2);
        assert_eq!(stats.in_use, 0);
        assert_eq!(stats.invalidated, 1);
        assert_eq!(factory.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_transport_failure_invalidates_with_warning() {
        let pool = ConnectionPool::new(MockFactory::default(), 1).await.unwrap();

        let conn = pool.borrow_connection().await.unwrap();
        pool.invalidate_and_replace(conn, &ScadaError::io("connection reset"))
            .await;

        assert!(logs_contain("WARN"));
        assert!(logs_contain("Invalidating con=1: "));
        assert!(!logs_contain("non-transport"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_non_transport_failure_discards_quietly() {
        let factory = MockFactory::default();
        let pool = ConnectionPool::new(factory.clone(), 1).await.unwrap();

        let conn = pool.borrow_connection().await.unwrap();
        let reason = ScadaError::validation("request body must not be empty");
        pool.invalidate_and_replace(conn, &reason).await;

        assert!(logs_contain("Discarding con=1 after non-transport error"));
        assert!(!logs_contain("Invalidating con="));
        assert!(!logs_contain("WARN"));

        // The socket is still replaced
        let stats = pool.stats();
        assert_eq!(stats.idle, 1);
        assert_eq!(stats.invalidated, 1);
        assert_eq!(factory.created.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_replacement_shrinks_pool() {
        let factory = MockFactory::default();
        let pool = ConnectionPool::new(factory.clone(), 2).await.unwrap();

        let conn = pool.borrow_connection().await.unwrap();
        factory.failing.store(true, Ordering::SeqCst);
        pool.invalidate_and_replace(conn, &ScadaError::io("reset"))
            .await;

        let stats = pool.stats();
        assert_eq!(stats.idle, 1);
        assert_eq!(stats.replacement_failures, 1);
        assert_eq!(stats.in_use, 0);
    }

    #[tokio::test]
    async fn test_return_to_full_pool_closes_connection() {
        let factory = MockFactory::default();
        let pool = ConnectionPool::new(factory.clone(), 1).await.unwrap();

        // Pool was shrunk by an external reset, then refilled while a
        // connection was out
        let conn = pool.borrow_connection().await.unwrap();
        let extra = factory.create().await.unwrap();
        pool.idle.lock().push_back(extra);

        pool.return_connection(conn).await;
        assert_eq!(pool.stats().idle, 1);
        assert_eq!(factory.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_reset_idle_connections() {
        let factory = MockFactory::default();
        let pool = ConnectionPool::new(factory.clone(), 3).await.unwrap();

        assert_eq!(pool.reset_idle_connections().await, 3);
        assert_eq!(pool.stats().idle, 0);
        assert_eq!(factory.closed.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_shutdown_closes_idle_and_rejects_borrowers() {
        let factory = MockFactory::default();
        let pool = ConnectionPool::new(factory.clone(), 2).await.unwrap();
        let out = pool.borrow_connection().await.unwrap();

        pool.shutdown().await;
        assert_eq!(factory.closed.load(Ordering::SeqCst), 1);
        assert!(pool.borrow_connection().await.is_err());

        // A connection returned after shutdown is closed, not pooled
        pool.return_connection(out).await;
        assert_eq!(factory.closed.load(Ordering::SeqCst), 2);
        assert_eq!(pool.stats().idle, 0);

        // Idempotent
        pool.shutdown().await;
    }
}
