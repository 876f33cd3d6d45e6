//! Upstream facade
//!
//! What the HTTP adapter is allowed to do: queue a write, read the latest
//! snapshot and ask about readiness. It never touches PrintSrv directly.

use std::sync::Arc;

use serde::Serialize;
use tracing::info;
use utoipa::ToSchema;

use crate::domain::{DeviceSnapshot, WriteCommand};
use crate::error::{Result, ScadaError};
use crate::printsrv::pool::{ConnectionFactory, ConnectionPool, PoolStats};
use crate::runtime::{ConnectionHealthPolicy, HealthStats, ScanCycleStats, ScanCycleStatsSnapshot};
use crate::store::{PendingBufferStatsSnapshot, PendingWriteBuffer, SnapshotStore};

/// Source of pool statistics for diagnostics
pub trait PoolMonitor: Send + Sync + 'static {
    fn pool_stats(&self) -> PoolStats;
}

impl<F: ConnectionFactory> PoolMonitor for ConnectionPool<F> {
    fn pool_stats(&self) -> PoolStats {
        self.stats()
    }
}

/// Bridge diagnostics for the status endpoint
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BridgeStatus {
    pub device_name: String,
    pub ready: bool,
    pub health: HealthStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pool: Option<PoolStats>,
    pub pending_writes: usize,
    pub pending_capacity: usize,
    pub buffer: PendingBufferStatsSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scan_cycle: Option<ScanCycleStatsSnapshot>,
}

/// Facade over the buffer and the snapshot store
pub struct ScadaService {
    device_name: String,
    buffer: Arc<PendingWriteBuffer>,
    store: Arc<SnapshotStore>,
    health: Arc<ConnectionHealthPolicy>,
    pool: Option<Arc<dyn PoolMonitor>>,
    cycle_stats: Option<Arc<ScanCycleStats>>,
}

impl ScadaService {
    pub fn new(
        device_name: impl Into<String>,
        buffer: Arc<PendingWriteBuffer>,
        store: Arc<SnapshotStore>,
        health: Arc<ConnectionHealthPolicy>,
    ) -> Self {
        Self {
            device_name: device_name.into(),
            buffer,
            store,
            health,
            pool: None,
            cycle_stats: None,
        }
    }

    pub fn with_pool_monitor(mut self, pool: Arc<dyn PoolMonitor>) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn with_cycle_stats(mut self, stats: Arc<ScanCycleStats>) -> Self {
        self.cycle_stats = Some(stats);
        self
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Queue a command value for a unit; it is sent on the next scan cycle
    pub fn submit_write(&self, unit_number: u32, value: i32) -> Result<()> {
        let command = WriteCommand::new(unit_number, value)?;
        self.buffer.enqueue(command)?;
        info!(
            "Command queued for u{}: {} (pending {})",
            unit_number,
            value,
            self.buffer.size()
        );
        Ok(())
    }

    /// Latest snapshot, or [`ScadaError::NotReady`] before the first poll
    pub fn latest_snapshot(&self) -> Result<Arc<DeviceSnapshot>> {
        self.store.latest().ok_or(ScadaError::NotReady)
    }

    /// True once at least one snapshot has been published
    pub fn is_ready(&self) -> bool {
        self.store.is_ready()
    }

    /// The process is up; independent of PrintSrv reachability
    pub fn is_alive(&self) -> bool {
        true
    }

    pub fn status(&self) -> BridgeStatus {
        BridgeStatus {
            device_name: self.device_name.clone(),
            ready: self.is_ready(),
            health: self.health.stats(),
            pool: self.pool.as_ref().map(|p| p.pool_stats()),
            pending_writes: self.buffer.size(),
            pending_capacity: self.buffer.capacity(),
            buffer: self.buffer.stats().snapshot(),
            scan_cycle: self.cycle_stats.as_ref().map(|s| s.snapshot()),
        }
    }
}
