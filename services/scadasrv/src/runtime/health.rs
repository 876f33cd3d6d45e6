//! Connection health policy
//!
//! Second tier of failure handling above the request executor. Isolated
//! failures are counted and handed back to the caller. Once
//! [`FAILURE_THRESHOLD`] consecutive failures pile up the policy runs a
//! reconnection loop with capped exponential backoff, and if that loop is
//! exhausted it falls into recovery mode, where calls are rejected with
//! [`ScadaError::Recovering`] except for one probe per
//! `recovery_check_interval`.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use utoipa::ToSchema;

use crate::error::{Result, ScadaError};
use crate::printsrv::pool::{ConnectionFactory, ConnectionPool};

/// Consecutive failures that switch the policy into the reconnection loop
pub const FAILURE_THRESHOLD: u32 = 5;

/// Policy state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    /// Calls go straight through
    Normal,
    /// Reconnection loop in progress
    Reconnecting,
    /// Degraded; calls are throttled to periodic probes
    Recovery,
}

impl std::fmt::Display for HealthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::Reconnecting => write!(f, "reconnecting"),
            Self::Recovery => write!(f, "recovery"),
        }
    }
}

/// Reconnection and recovery timing
#[derive(Debug, Clone)]
pub struct HealthPolicyConfig {
    /// Attempts in one reconnection loop (at least 1)
    pub max_attempts: u32,
    /// Backoff base
    pub initial_delay: Duration,
    /// Backoff cap
    pub max_delay: Duration,
    /// Minimum spacing between recovery probes
    pub recovery_check_interval: Duration,
}

impl Default for HealthPolicyConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            recovery_check_interval: Duration::from_secs(60),
        }
    }
}

impl HealthPolicyConfig {
    /// Create from configuration values
    pub fn from_config(
        max_attempts: u32,
        initial_delay_ms: u64,
        max_delay_ms: u64,
        recovery_check_interval_ms: u64,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay: Duration::from_millis(initial_delay_ms),
            max_delay: Duration::from_millis(max_delay_ms),
            recovery_check_interval: Duration::from_millis(recovery_check_interval_ms),
        }
    }
}

/// Delay before reconnection attempt `attempt` (1-based)
///
/// `min(initial * 2^(attempt-1), max)`, no jitter. Attempt 1 is never
/// delayed by the loop, the value is only meaningful from attempt 2 on.
pub fn compute_backoff(attempt: u32, initial: Duration, max: Duration) -> Duration {
    let factor = 2u32
        .checked_pow(attempt.saturating_sub(1))
        .unwrap_or(u32::MAX);
    initial.saturating_mul(factor).min(max)
}

/// Hook the policy uses to drop stale sockets
#[async_trait]
pub trait ConnectionReset: Send + Sync + 'static {
    async fn reset_connections(&self);
}

#[async_trait]
impl<F: ConnectionFactory> ConnectionReset for ConnectionPool<F> {
    async fn reset_connections(&self) {
        self.reset_idle_connections().await;
    }
}

/// Policy counters plus the current state
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HealthStats {
    pub state: HealthState,
    pub consecutive_failures: u32,
    pub reconnect_loops: u64,
    pub successful_reconnects: u64,
    pub failed_reconnect_attempts: u64,
    pub recovery_probes: u64,
}

#[derive(Debug)]
struct PolicyState {
    state: HealthState,
    consecutive_failures: u32,
    last_probe: Option<Instant>,
}

/// Failure-counting wrapper around device operations
pub struct ConnectionHealthPolicy {
    config: HealthPolicyConfig,
    inner: Mutex<PolicyState>,
    reset: Option<Arc<dyn ConnectionReset>>,
    shutdown: CancellationToken,
    reconnect_loops: AtomicU64,
    successful_reconnects: AtomicU64,
    failed_reconnect_attempts: AtomicU64,
    recovery_probes: AtomicU64,
}

impl ConnectionHealthPolicy {
    /// Create a policy; cancelling `shutdown` interrupts backoff sleeps
    pub fn new(config: HealthPolicyConfig, shutdown: CancellationToken) -> Self {
        info!(
            "Health policy initialized (threshold={} failures, max_attempts={}, recovery_interval={:?})",
            FAILURE_THRESHOLD, config.max_attempts, config.recovery_check_interval
        );
        Self {
            config,
            inner: Mutex::new(PolicyState {
                state: HealthState::Normal,
                consecutive_failures: 0,
                last_probe: None,
            }),
            reset: None,
            shutdown,
            reconnect_loops: AtomicU64::new(0),
            successful_reconnects: AtomicU64::new(0),
            failed_reconnect_attempts: AtomicU64::new(0),
            recovery_probes: AtomicU64::new(0),
        }
    }

    /// Attach the hook that invalidates pooled connections
    pub fn with_reset_hook(mut self, reset: Arc<dyn ConnectionReset>) -> Self {
        self.reset = Some(reset);
        self
    }

    pub fn config(&self) -> &HealthPolicyConfig {
        &self.config
    }

    pub fn state(&self) -> HealthState {
        self.inner.lock().state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.inner.lock().consecutive_failures
    }

    pub fn stats(&self) -> HealthStats {
        let inner = self.inner.lock();
        HealthStats {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            reconnect_loops: self.reconnect_loops.load(Ordering::Relaxed),
            successful_reconnects: self.successful_reconnects.load(Ordering::Relaxed),
            failed_reconnect_attempts: self.failed_reconnect_attempts.load(Ordering::Relaxed),
            recovery_probes: self.recovery_probes.load(Ordering::Relaxed),
        }
    }

    /// Run `op` under the policy
    ///
    /// `op` is invoked once in normal mode, up to `max_attempts` times inside
    /// a reconnection loop, and at most once per probe in recovery mode.
    pub async fn execute<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if self.state() == HealthState::Recovery {
            return self.recovery_probe(operation, &mut op).await;
        }

        match op().await {
            Ok(value) => {
                self.on_success();
                Ok(value)
            },
            Err(e) => {
                let failures = {
                    let mut inner = self.inner.lock();
                    inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
                    inner.consecutive_failures
                };
                error!(
                    "{} failed (consecutive failures: {}): {}",
                    operation, failures, e
                );

                if failures >= FAILURE_THRESHOLD {
                    return self.reconnect_loop(operation, &mut op, e).await;
                }
                Err(e)
            },
        }
    }

    fn on_success(&self) {
        let previous = {
            let mut inner = self.inner.lock();
            let previous = inner.consecutive_failures;
            inner.consecutive_failures = 0;
            inner.state = HealthState::Normal;
            previous
        };
        if previous > 0 {
            info!(
                "PrintSrv connection recovered after {} consecutive failures",
                previous
            );
        }
    }

    async fn reconnect_loop<T, F, Fut>(
        &self,
        operation: &str,
        op: &mut F,
        original: ScadaError,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.inner.lock().state = HealthState::Reconnecting;
        self.reconnect_loops.fetch_add(1, Ordering::Relaxed);
        warn!(
            "Failure threshold reached ({} consecutive failures), reconnecting to PrintSrv",
            FAILURE_THRESHOLD
        );
        self.reset_connections().await;

        let max_attempts = self.config.max_attempts;
        let mut last_error = original;
        for attempt in 1..=max_attempts {
            if attempt > 1 {
                let delay =
                    compute_backoff(attempt, self.config.initial_delay, self.config.max_delay);
                info!(
                    "Waiting {:?} before reconnection attempt {}/{}",
                    delay, attempt, max_attempts
                );
                tokio::select! {
                    _ = self.shutdown.cancelled() => {
                        error!("Reconnection interrupted during backoff");
                        self.enter_recovery();
                        return Err(ScadaError::Interrupted(format!(
                            "{} reconnection cancelled before attempt {}/{}",
                            operation, attempt, max_attempts
                        )));
                    },
                    _ = tokio::time::sleep(delay) => {},
                }
            }

            info!("Starting reconnection attempt {}/{}", attempt, max_attempts);
            match op().await {
                Ok(value) => {
                    {
                        let mut inner = self.inner.lock();
                        inner.consecutive_failures = 0;
                        inner.state = HealthState::Normal;
                    }
                    self.successful_reconnects.fetch_add(1, Ordering::Relaxed);
                    info!(
                        "Reconnection successful on attempt {}/{}",
                        attempt, max_attempts
                    );
                    return Ok(value);
                },
                Err(e) => {
                    self.failed_reconnect_attempts.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        "Reconnection attempt {}/{} failed: {}",
                        attempt, max_attempts, e
                    );
                    self.reset_connections().await;
                    last_error = e;
                },
            }
        }

        self.enter_recovery();
        Err(last_error)
    }

    async fn recovery_probe<T, F, Fut>(&self, operation: &str, op: &mut F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let interval = self.config.recovery_check_interval;
        {
            let now = Instant::now();
            let mut inner = self.inner.lock();
            if let Some(last) = inner.last_probe {
                let elapsed = now.saturating_duration_since(last);
                if elapsed < interval {
                    trace!(
                        "Recovery mode: skipping {} ({:?} until next check)",
                        operation,
                        interval - elapsed
                    );
                    return Err(ScadaError::Recovering);
                }
            }
            inner.last_probe = Some(now);
        }

        self.recovery_probes.fetch_add(1, Ordering::Relaxed);
        info!("Recovery mode: probing PrintSrv availability with {}", operation);
        self.reset_connections().await;

        match op().await {
            Ok(value) => {
                {
                    let mut inner = self.inner.lock();
                    inner.consecutive_failures = 0;
                    inner.state = HealthState::Normal;
                }
                info!("PrintSrv is available again, leaving recovery mode");
                Ok(value)
            },
            Err(e) => {
                error!(
                    "Recovery probe failed, PrintSrv still unavailable: {} (next check in {:?})",
                    e, interval
                );
                self.reset_connections().await;
                Err(e)
            },
        }
    }

    fn enter_recovery(&self) {
        {
            let mut inner = self.inner.lock();
            inner.state = HealthState::Recovery;
            inner.last_probe = Some(Instant::now());
        }
        error!(
            "Entering recovery mode, all reconnection attempts failed. Probing PrintSrv every {:?}",
            self.config.recovery_check_interval
        );
    }

    async fn reset_connections(&self) {
        if let Some(reset) = &self.reset {
            debug!("Resetting pooled PrintSrv connections");
            reset.reset_connections().await;
        }
    }
}
