//! State shared between the scan cycle and HTTP callers

pub mod snapshot;
pub mod write_buffer;

pub use snapshot::SnapshotStore;
pub use write_buffer::{PendingBufferStatsSnapshot, PendingWriteBuffer, DEFAULT_CAPACITY};
