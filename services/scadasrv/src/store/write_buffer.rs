//! Pending write buffer
//!
//! Collects unit commands submitted over HTTP until the next scan cycle
//! drains them. One entry per unit, last write wins.
//!
//! # Usage
//! ```ignore
//! let buffer = PendingWriteBuffer::new();
//! buffer.enqueue(WriteCommand::new(3, 42)?)?;
//! buffer.enqueue(WriteCommand::new(3, 43)?)?; // replaces 42
//!
//! let batch = buffer.drain(); // {3: 43}, buffer is now empty
//! ```
//!
//! Capacity is enforced under the same lock as the insert, so concurrent
//! enqueues of new units can never push the buffer past its bound.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, warn};
use utoipa::ToSchema;

use crate::domain::WriteCommand;
use crate::error::{Result, ScadaError};

/// Distinct units the buffer holds before rejecting new ones
pub const DEFAULT_CAPACITY: usize = 100;

/// Statistics for monitoring the buffer
#[derive(Debug, Default)]
pub struct PendingBufferStats {
    /// Accepted enqueues, including replacements
    pub enqueued: AtomicU64,
    /// Enqueues that replaced a pending command for the same unit
    pub replaced: AtomicU64,
    /// Enqueues rejected because the buffer was full
    pub overflow_rejections: AtomicU64,
    /// Non-empty drains
    pub drains: AtomicU64,
}

impl PendingBufferStats {
    /// Get a snapshot of current stats
    pub fn snapshot(&self) -> PendingBufferStatsSnapshot {
        PendingBufferStatsSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            replaced: self.replaced.load(Ordering::Relaxed),
            overflow_rejections: self.overflow_rejections.load(Ordering::Relaxed),
            drains: self.drains.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of buffer statistics
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PendingBufferStatsSnapshot {
    pub enqueued: u64,
    pub replaced: u64,
    pub overflow_rejections: u64,
    pub drains: u64,
}

/// Last-write-wins command buffer keyed by unit number
pub struct PendingWriteBuffer {
    pending: Mutex<BTreeMap<u32, WriteCommand>>,
    capacity: usize,
    stats: PendingBufferStats,
}

impl Default for PendingWriteBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingWriteBuffer {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            pending: Mutex::new(BTreeMap::new()),
            capacity,
            stats: PendingBufferStats::default(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> &PendingBufferStats {
        &self.stats
    }

    /// Queue a command, replacing any pending one for the same unit
    ///
    /// Fails with [`ScadaError::BufferOverflow`] only when the unit is new
    /// and the buffer already holds `capacity` units.
    pub fn enqueue(&self, command: WriteCommand) -> Result<()> {
        let unit = command.unit_number();
        let mut pending = self.pending.lock();

        if let Some(slot) = pending.get_mut(&unit) {
            debug!(
                "Pending command for u{} replaced: {} -> {}",
                unit,
                slot.command_value(),
                command.command_value()
            );
            *slot = command;
            self.stats.replaced.fetch_add(1, Ordering::Relaxed);
            self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        }

        let size = pending.len();
        if size >= self.capacity {
            drop(pending);
            self.stats.overflow_rejections.fetch_add(1, Ordering::Relaxed);
            warn!(
                "Pending write buffer full ({}/{}), rejecting command for u{}",
                size, self.capacity, unit
            );
            return Err(ScadaError::BufferOverflow {
                size,
                capacity: self.capacity,
            });
        }

        pending.insert(unit, command);
        self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn size(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// Take every pending command and leave the buffer empty
    ///
    /// Commands come back ordered by unit number. An enqueue that races with
    /// the drain lands either in this batch or in the next one, never both.
    pub fn drain(&self) -> BTreeMap<u32, WriteCommand> {
        let batch = std::mem::take(&mut *self.pending.lock());
        if !batch.is_empty() {
            self.stats.drains.fetch_add(1, Ordering::Relaxed);
            debug!("Drained {} pending command(s)", batch.len());
        }
        batch
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // unwrap is acceptable in tests
mod tests {
    use super::*;
    use std::sync::Arc;

    fn cmd(unit: u32, value: i32) -> WriteCommand {
        WriteCommand::new(unit, value).unwrap()
    }

    #[test]
    fn test_last_write_wins() {
        let buffer = PendingWriteBuffer::new();
        buffer.enqueue(cmd(3, 10)).unwrap();
        buffer.enqueue(cmd(3, 20)).unwrap();

        let batch = buffer.drain();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[&3].command_value(), 20);

        let stats = buffer.stats().snapshot();
        assert_eq!(stats.enqueued, 2);
        assert_eq!(stats.replaced, 1);
    }

    #[test]
    fn test_independent_units_drain_in_unit_order() {
        let buffer = PendingWriteBuffer::new();
        buffer.enqueue(cmd(7, 1)).unwrap();
        buffer.enqueue(cmd(2, 2)).unwrap();
        buffer.enqueue(cmd(5, 3)).unwrap();

        let units: Vec<u32> = buffer.drain().into_keys().collect();
        assert_eq!(units, vec![2, 5, 7]);
    }

    #[test]
    fn test_overflow_rejects_only_new_units() {
        let buffer = PendingWriteBuffer::with_capacity(2);
        buffer.enqueue(cmd(1, 1)).unwrap();
        buffer.enqueue(cmd(2, 1)).unwrap();

        let err = buffer.enqueue(cmd(3, 1)).unwrap_err();
        assert!(matches!(
            err,
            ScadaError::BufferOverflow {
                size: 2,
                capacity: 2
            }
        ));

        // updating a pending unit does not grow the buffer
        buffer.enqueue(cmd(2, 9)).unwrap();
        assert_eq!(buffer.size(), 2);
        assert_eq!(buffer.stats().snapshot().overflow_rejections, 1);
    }

    #[test]
    fn test_default_capacity() {
        let buffer = PendingWriteBuffer::new();
        for unit in 1..=DEFAULT_CAPACITY as u32 {
            buffer.enqueue(cmd(unit, 1)).unwrap();
        }
        assert!(buffer.enqueue(cmd(DEFAULT_CAPACITY as u32 + 1, 1)).is_err());
        assert!(buffer.enqueue(cmd(1, 2)).is_ok());
    }

    #[test]
    fn test_drain_empties_buffer() {
        let buffer = PendingWriteBuffer::new();
        buffer.enqueue(cmd(1, 1)).unwrap();

        assert_eq!(buffer.drain().len(), 1);
        assert!(buffer.is_empty());
        assert!(buffer.drain().is_empty());

        buffer.enqueue(cmd(1, 5)).unwrap();
        assert_eq!(buffer.drain()[&1].command_value(), 5);
        assert_eq!(buffer.stats().snapshot().drains, 2);
    }

    #[test]
    fn test_concurrent_enqueue_never_exceeds_capacity() {
        let buffer = Arc::new(PendingWriteBuffer::with_capacity(10));
        let handles: Vec<_> = (0..4u32)
            .map(|t| {
                let buffer = buffer.clone();
                std::thread::spawn(move || {
                    for unit in 1..=20u32 {
                        let _ = buffer.enqueue(cmd(t * 100 + unit, 1));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(buffer.size(), 10);
        assert_eq!(buffer.stats().snapshot().overflow_rejections, 70);
    }

    #[test]
    fn test_no_command_lost_across_concurrent_drains() {
        let buffer = Arc::new(PendingWriteBuffer::with_capacity(10_000));
        let producer = {
            let buffer = buffer.clone();
            std::thread::spawn(move || {
                for unit in 1..=5_000u32 {
                    buffer.enqueue(cmd(unit, 1)).unwrap();
                }
            })
        };

        let mut seen = 0;
        while !producer.is_finished() {
            seen += buffer.drain().len();
        }
        producer.join().unwrap();
        seen += buffer.drain().len();

        assert_eq!(seen, 5_000);
    }
}
