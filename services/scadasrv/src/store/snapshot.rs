//! Latest device snapshot
//!
//! Holds the result of the most recent successful QueryAll. Writers replace
//! the whole value; readers get a cheap `Arc` clone.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::domain::DeviceSnapshot;

#[derive(Default)]
pub struct SnapshotStore {
    latest: RwLock<Option<Arc<DeviceSnapshot>>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the held snapshot unconditionally
    pub fn save(&self, snapshot: DeviceSnapshot) {
        debug!(
            "Snapshot saved for {} ({} units)",
            snapshot.device_name(),
            snapshot.unit_count()
        );
        *self.latest.write() = Some(Arc::new(snapshot));
    }

    /// Latest snapshot, `None` before the first successful poll
    pub fn latest(&self) -> Option<Arc<DeviceSnapshot>> {
        self.latest.read().clone()
    }

    pub fn is_ready(&self) -> bool {
        self.latest.read().is_some()
    }
}
