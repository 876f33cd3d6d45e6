//! Request executor
//!
//! Runs one request/response exchange on a pooled connection, retrying once
//! on a fresh connection. Any failure invalidates the connection it happened
//! on; a stream that produced an error is never reused.

use std::sync::Arc;

use tracing::{debug, error, warn};

use super::pool::{ConnectionFactory, ConnectionPool, PooledConnection};
use crate::error::{Result, ScadaError};

/// Attempts per request, including the first
pub const MAX_ATTEMPTS: u32 = 2;

/// Executes PrintSrv operations against the pool
pub struct RequestExecutor<F: ConnectionFactory> {
    pool: Arc<ConnectionPool<F>>,
}

impl<F: ConnectionFactory> Clone for RequestExecutor<F> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
        }
    }
}

impl<F: ConnectionFactory> RequestExecutor<F> {
    pub fn new(pool: Arc<ConnectionPool<F>>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Arc<ConnectionPool<F>> {
        &self.pool
    }

    /// Run `operation` with up to [`MAX_ATTEMPTS`] attempts
    ///
    /// `build` produces the request body and `parse` turns the response body
    /// into a result; both run once per attempt. When both attempts fail the
    /// second error is returned with the first one attached.
    pub async fn execute<T, B, P>(&self, operation: &str, build: B, parse: P) -> Result<T>
    where
        B: Fn() -> Result<String> + Send + Sync,
        P: Fn(&str) -> Result<T> + Send + Sync,
        T: Send,
    {
        let first = match self.attempt(operation, &build, &parse).await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };
        warn!(
            "{} attempt 1/{} failed, retrying on a fresh connection: {}",
            operation, MAX_ATTEMPTS, first
        );

        match self.attempt(operation, &build, &parse).await {
            Ok(value) => {
                debug!("{} succeeded on attempt 2/{}", operation, MAX_ATTEMPTS);
                Ok(value)
            },
            Err(second) => {
                error!(
                    "{} failed after {} attempts: {} (first attempt: {})",
                    operation, MAX_ATTEMPTS, second, first
                );
                Err(ScadaError::RetryExhausted {
                    operation: operation.to_string(),
                    error: Box::new(second),
                    first: Box::new(first),
                })
            },
        }
    }

    async fn attempt<T, B, P>(&self, operation: &str, build: &B, parse: &P) -> Result<T>
    where
        B: Fn() -> Result<String> + Send + Sync,
        P: Fn(&str) -> Result<T> + Send + Sync,
        T: Send,
    {
        let mut conn = self.pool.borrow_connection().await?;
        debug!("{} on con={}", operation, conn.id());

        let outcome = async {
            let request = build()?;
            conn.send_request(&request).await?;
            let response = conn.receive_response().await?;
            parse(&response)
        }
        .await;

        match outcome {
            Ok(value) => {
                self.pool.return_connection(conn).await;
                Ok(value)
            },
            Err(e) => {
                self.pool.invalidate_and_replace(conn, &e).await;
                Err(e)
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // unwrap is acceptable in tests
mod tests {
    use super::*;
    use crate::printsrv::pool::tests::MockFactory;
    use std::sync::atomic::{AtomicU32, Ordering};

    async fn executor(capacity: usize) -> (RequestExecutor<MockFactory>, MockFactory) {
        let factory = MockFactory::default();
        let pool = ConnectionPool::new(factory.clone(), capacity).await.unwrap();
        (RequestExecutor::new(Arc::new(pool)), factory)
    }

    #[tokio::test]
    async fn test_success_returns_connection() {
        let (exec, factory) = executor(1).await;

        let value = exec
            .execute("QueryAll", || Ok("{}".to_string()), |body| Ok(body.len()))
            .await
            .unwrap();

        assert_eq!(value, 2);
        assert_eq!(factory.created.load(Ordering::SeqCst), 1);
        assert_eq!(exec.pool().stats().idle, 1);
    }

    #[tokio::test]
    async fn test_first_failure_retries_on_fresh_connection() {
        let (exec, factory) = executor(1).await;
        let calls = AtomicU32::new(0);

        let value = exec
            .execute(
                "QueryAll",
                || Ok("{}".to_string()),
                |_| {
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(ScadaError::FailResponse {
                            body: "Fail".into(),
                        })
                    } else {
                        Ok(7)
                    }
                },
            )
            .await
            .unwrap();

        assert_eq!(value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        // Original + replacement
        assert_eq!(factory.created.load(Ordering::SeqCst), 2);
        assert_eq!(exec.pool().stats().invalidated, 1);
    }

    #[tokio::test]
    async fn test_two_failures_chain_both_errors() {
        let (exec, _factory) = executor(2).await;
        let calls = AtomicU32::new(0);

        let err = exec
            .execute(
                "SetUnitVars",
                || Ok("{}".to_string()),
                |_| -> Result<()> {
                    match calls.fetch_add(1, Ordering::SeqCst) {
                        0 => Err(ScadaError::io("first")),
                        _ => Err(ScadaError::data("second")),
                    }
                },
            )
            .await
            .unwrap_err();

        match &err {
            ScadaError::RetryExhausted {
                operation,
                error,
                first,
            } => {
                assert_eq!(operation, "SetUnitVars");
                assert!(matches!(**error, ScadaError::Data(_)));
                assert!(matches!(**first, ScadaError::Io(_)));
            },
            other => panic!("expected RetryExhausted, got {:?}", other),
        }
        // Exactly two attempts, both connections invalidated
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(exec.pool().stats().invalidated, 2);
    }

    #[tokio::test]
    async fn test_build_failure_counts_as_attempt() {
        let (exec, _factory) = executor(1).await;
        let builds = AtomicU32::new(0);

        let err = exec
            .execute(
                "SetUnitVars",
                || {
                    builds.fetch_add(1, Ordering::SeqCst);
                    Err(ScadaError::validation("bad request"))
                },
                |_| Ok(()),
            )
            .await
            .unwrap_err();

        assert_eq!(builds.load(Ordering::SeqCst), 2);
        assert!(matches!(err.root(), ScadaError::Validation(_)));
    }

    #[tokio::test]
    async fn test_borrow_failure_is_retried() {
        let (exec, factory) = executor(1).await;
        exec.pool().reset_idle_connections().await;
        factory.failing.store(true, std::sync::atomic::Ordering::SeqCst);

        let err = exec
            .execute("QueryAll", || Ok("{}".to_string()), |_| Ok(()))
            .await
            .unwrap_err();

        assert!(matches!(err.root(), ScadaError::Connection(_)));
        assert!(matches!(err.first_attempt(), Some(ScadaError::Connection(_))));
    }
}
