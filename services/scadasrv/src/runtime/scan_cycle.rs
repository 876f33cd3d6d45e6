//! Scan-cycle orchestrator
//!
//! One task, one timeline. Every tick runs read → drain → write → update in
//! that order and never overlaps with the previous tick. The orchestrator is
//! the only borrower of PrintSrv connections.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use utoipa::ToSchema;

use super::health::ConnectionHealthPolicy;
use crate::domain::WriteCommand;
use crate::error::ScadaError;
use crate::printsrv::client::DeviceGateway;
use crate::printsrv::dto;
use crate::store::{PendingWriteBuffer, SnapshotStore};

/// Result of one cycle
#[derive(Debug)]
pub enum CycleOutcome {
    /// Snapshot refreshed. `lost` lists the units whose commands were dropped
    /// after a write failure.
    Completed { written: usize, lost: Vec<u32> },
    /// QueryAll failed; snapshot and buffer untouched
    ReadFailed(ScadaError),
    /// The previous cycle was still running
    Skipped,
}

/// Cycle counters
#[derive(Debug, Default)]
pub struct ScanCycleStats {
    pub completed: AtomicU64,
    pub read_failures: AtomicU64,
    pub skipped: AtomicU64,
    pub commands_written: AtomicU64,
    pub commands_lost: AtomicU64,
}

impl ScanCycleStats {
    pub fn snapshot(&self) -> ScanCycleStatsSnapshot {
        ScanCycleStatsSnapshot {
            completed: self.completed.load(Ordering::Relaxed),
            read_failures: self.read_failures.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            commands_written: self.commands_written.load(Ordering::Relaxed),
            commands_lost: self.commands_lost.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ScanCycleStatsSnapshot {
    pub completed: u64,
    pub read_failures: u64,
    pub skipped: u64,
    pub commands_written: u64,
    pub commands_lost: u64,
}

/// Periodic read/write orchestrator over a [`DeviceGateway`]
pub struct ScanCycle<G: DeviceGateway> {
    gateway: Arc<G>,
    health: Arc<ConnectionHealthPolicy>,
    buffer: Arc<PendingWriteBuffer>,
    store: Arc<SnapshotStore>,
    interval: Duration,
    running: tokio::sync::Mutex<()>,
    stats: Arc<ScanCycleStats>,
}

impl<G: DeviceGateway> ScanCycle<G> {
    pub fn new(
        gateway: Arc<G>,
        health: Arc<ConnectionHealthPolicy>,
        buffer: Arc<PendingWriteBuffer>,
        store: Arc<SnapshotStore>,
        interval: Duration,
    ) -> Self {
        Self {
            gateway,
            health,
            buffer,
            store,
            interval,
            running: tokio::sync::Mutex::new(()),
            stats: Arc::new(ScanCycleStats::default()),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Shared handle to the cycle counters
    pub fn stats(&self) -> Arc<ScanCycleStats> {
        Arc::clone(&self.stats)
    }

    /// Run one cycle now
    pub async fn run_cycle(&self) -> CycleOutcome {
        let Ok(_running) = self.running.try_lock() else {
            self.stats.skipped.fetch_add(1, Ordering::Relaxed);
            debug!("Previous scan cycle still running, skipping tick");
            return CycleOutcome::Skipped;
        };

        // [1] read
        let gateway = &self.gateway;
        let snapshot = match self
            .health
            .execute(dto::QUERY_ALL, || gateway.query_all())
            .await
        {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.stats.read_failures.fetch_add(1, Ordering::Relaxed);
                if e.is_expected_degradation() {
                    trace!("Scan cycle skipped: {}", e);
                } else {
                    error!("Scan cycle read failed, PrintSrv unavailable: {}", e);
                    debug!(
                        "{} pending command(s) stay buffered for the next cycle",
                        self.buffer.size()
                    );
                }
                return CycleOutcome::ReadFailed(e);
            },
        };

        // [2] drain
        let pending = self.buffer.drain();

        // [3] write
        let (written, lost) = if pending.is_empty() {
            (0, Vec::new())
        } else {
            self.write_pending(pending).await
        };

        // [4] update, regardless of the write result
        self.store.save(snapshot);

        self.stats.completed.fetch_add(1, Ordering::Relaxed);
        self.stats
            .commands_written
            .fetch_add(written as u64, Ordering::Relaxed);
        self.stats
            .commands_lost
            .fetch_add(lost.len() as u64, Ordering::Relaxed);

        CycleOutcome::Completed { written, lost }
    }

    /// Send drained commands one by one, stopping at the first failure
    async fn write_pending(&self, pending: BTreeMap<u32, WriteCommand>) -> (usize, Vec<u32>) {
        let total = pending.len();
        let mut written = 0;
        let mut commands = pending.into_values();

        while let Some(command) = commands.next() {
            let gateway = &self.gateway;
            let result = self
                .health
                .execute(dto::SET_UNIT_VARS, || gateway.set_unit_vars(&command))
                .await;

            if let Err(e) = result {
                let lost: Vec<u32> = std::iter::once(command.unit_number())
                    .chain(commands.map(|c| c.unit_number()))
                    .collect();
                error!(
                    "Write step failed, {} of {} command(s) lost: {}",
                    lost.len(),
                    total,
                    e
                );
                warn!("Lost commands for units: {:?}", lost);
                return (written, lost);
            }
            written += 1;
        }

        debug!("Wrote {} command(s) to PrintSrv", written);
        (written, Vec::new())
    }

    /// Tick until `shutdown` is cancelled
    ///
    /// A late tick is delayed rather than bursted, so a slow cycle pushes the
    /// schedule back instead of triggering catch-up runs.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Scan cycle started, interval {:?}", self.interval);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {},
            }

            match self.run_cycle().await {
                CycleOutcome::Completed { written, lost } => {
                    trace!("Scan cycle completed (written={}, lost={})", written, lost.len());
                },
                CycleOutcome::ReadFailed(_) | CycleOutcome::Skipped => {},
            }
        }

        info!("Scan cycle stopped");
    }
}
