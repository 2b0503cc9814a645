//! Global and per-thread context: timestamp generation, thread
//! registration, and the active-transaction registry the high-water-mark
//! (the smallest read timestamp among live transactions) is computed from.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::primitives::epoch::{EpochRegistry, ScopedEpoch};

/// Process-wide state shared by every thread and transaction: the
/// timestamp/id counter, the epoch registry threads publish into, and the
/// set of currently active transactions' read timestamps.
pub struct GlobalContext {
    timestamp_clock: AtomicU64,
    epochs: Arc<EpochRegistry>,
    active_read_ts: Mutex<Vec<u64>>,
}

impl GlobalContext {
    /// A fresh context with no registered threads or active transactions.
    pub fn new() -> Arc<Self> {
        Arc::new(GlobalContext {
            timestamp_clock: AtomicU64::new(1),
            epochs: EpochRegistry::new(),
            active_read_ts: Mutex::new(Vec::new()),
        })
    }

    /// The epoch registry threads publish their progress into.
    pub fn epochs(&self) -> &Arc<EpochRegistry> {
        &self.epochs
    }

    /// Draw a fresh, monotonically increasing timestamp/id. Used both for
    /// a transaction's read timestamp and (on commit) its commit
    /// timestamp, and doubles as the transaction id space.
    pub fn next_timestamp(&self) -> u64 {
        self.timestamp_clock.fetch_add(1, Ordering::AcqRel)
    }

    /// Register a read timestamp as active (a transaction with this
    /// snapshot is now live).
    pub fn begin_transaction(&self, read_ts: u64) {
        self.active_read_ts.lock().push(read_ts);
    }

    /// Unregister a transaction's read timestamp once it terminates
    /// (commit or rollback).
    pub fn end_transaction(&self, read_ts: u64) {
        let mut active = self.active_read_ts.lock();
        if let Some(pos) = active.iter().position(|&t| t == read_ts) {
            active.swap_remove(pos);
        }
    }

    /// The high-water-mark: the smallest read timestamp among currently
    /// active transactions, or the current clock reading if none are
    /// active (nothing pins any earlier version, so everything is
    /// prunable).
    pub fn high_water_mark(&self) -> u64 {
        self.active_read_ts
            .lock()
            .iter()
            .copied()
            .min()
            .unwrap_or_else(|| self.timestamp_clock.load(Ordering::Acquire))
    }
}

/// Per-thread handle obtained from `register_thread`, held for the
/// lifetime of the thread's interaction with the store.
pub struct ThreadContext {
    global: Arc<GlobalContext>,
    epoch_cell: Arc<AtomicU64>,
}

impl ThreadContext {
    pub(crate) fn new(global: Arc<GlobalContext>) -> Self {
        let epoch_cell = global.epochs().register();
        ThreadContext { global, epoch_cell }
    }

    /// Enter a critical section for the duration of the returned guard,
    /// publishing this thread's current epoch so the GC won't reclaim
    /// anything this thread might still be reading.
    pub fn enter_critical_section(&self) -> ScopedEpoch<'_> {
        ScopedEpoch::enter(self.global.epochs(), &self.epoch_cell)
    }
}

impl Drop for ThreadContext {
    fn drop(&mut self) {
        self.global.epochs().unregister(&self.epoch_cell);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn high_water_mark_tracks_active_set() {
        let ctx = GlobalContext::new();
        ctx.begin_transaction(5);
        ctx.begin_transaction(9);
        assert_eq!(ctx.high_water_mark(), 5);
        ctx.end_transaction(5);
        assert_eq!(ctx.high_water_mark(), 9);
        ctx.end_transaction(9);
        assert_eq!(ctx.high_water_mark(), ctx.next_timestamp());
    }
}
