//! Background runtime: connection health policy and the scan cycle

pub mod health;
pub mod scan_cycle;

pub use health::{
    ConnectionHealthPolicy, ConnectionReset, HealthPolicyConfig, HealthState, HealthStats,
    FAILURE_THRESHOLD,
};
pub use scan_cycle::{CycleOutcome, ScanCycle, ScanCycleStats, ScanCycleStatsSnapshot};
