//! Gate: the lock + separator-key + fence-key bundle covering a contiguous
//! run of segments.
//!
//! The state machine (`FREE -> READ -> FREE`, `FREE -> WRITE -> FREE`,
//! `FREE -> REBAL -> FREE`) is implemented with a `parking_lot::Mutex` +
//! `Condvar` pair rather than a hand-rolled intrusive promise queue: waiters
//! block on the condvar and are woken in the batching order the original's
//! `gate.cpp` uses (one writer, or one contiguous run of readers, resumed
//! together; a waiting rebalancer is only ever woken alone). The FIFO order
//! itself is modelled with `CircularArray`, reused from the epoch GC's
//! retirement queue.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Condvar, Mutex};

use crate::index::key::Key;
use crate::primitives::circular::CircularArray;
use crate::memstore::segment::Segment;

/// What a gate is currently doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GateMode {
    Free,
    Read(u32),
    Write,
    Rebalance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WaiterKind {
    Read,
    Write,
    Rebalance,
}

struct Inner {
    mode: GateMode,
    waiters: CircularArray<WaiterKind>,
}

/// Result of a fence-key recheck performed right after acquiring a gate's
/// lock, guarding against a concurrent split/merge having invalidated the
/// gate the caller looked up through a (now stale) ART entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceCheck {
    /// The gate is still the right one for the key.
    Valid,
    /// The gate was split/merged away; the caller must re-resolve the key
    /// through the index and restart.
    Invalid,
}

/// The lock, separator/fence keys, used-space counter, and segment array
/// for a contiguous run of segments within a chunk.
pub struct Gate {
    inner: Mutex<Inner>,
    condvar: Condvar,
    /// `S - 1` separator keys splitting this gate's `S` segments;
    /// `separators[i]` is the minimum key of `segments[i + 1]`.
    separators: Mutex<Vec<Key>>,
    /// Inclusive-low fence key. Set to `Key::max()` (the invalid sentinel)
    /// once this gate has been split/merged out of existence.
    low_fence: Mutex<Key>,
    /// Exclusive-high fence key.
    high_fence: Mutex<Key>,
    used_qwords: AtomicU64,
    segments: Vec<Segment>,
    /// Index of this gate within its chunk, for undo-entry routing.
    pub id: u16,
}

/// RAII guard for a read-held gate; unlocks (and wakes the next waiter
/// batch, if any) on drop.
pub struct ReadGuard<'a> {
    gate: &'a Gate,
}

impl Drop for ReadGuard<'_> {
    fn drop(&mut self) {
        self.gate.release_read();
    }
}

/// RAII guard for a write-held gate.
pub struct WriteGuard<'a> {
    gate: &'a Gate,
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        self.gate.release_write();
    }
}

/// RAII guard for a rebalance-held gate. `phantom` requests that release
/// not treat this as a logical write (see `primitives::latch`'s
/// `unlock_phantom`): used by a bookkeeping-only pass that must not
/// invalidate concurrent optimistic readers purely from its own passage.
pub struct RebalanceGuard<'a> {
    gate: &'a Gate,
}

impl Drop for RebalanceGuard<'_> {
    fn drop(&mut self) {
        self.gate.release_rebalance();
    }
}

impl Gate {
    /// A fresh gate covering `segments`, with fences `[low, high)` and the
    /// separator keys partitioning the segments among themselves.
    pub fn new(id: u16, segments: Vec<Segment>, low: Key, high: Key, separators: Vec<Key>) -> Self {
        debug_assert_eq!(separators.len() + 1, segments.len());
        Gate {
            inner: Mutex::new(Inner {
                mode: GateMode::Free,
                waiters: CircularArray::new(),
            }),
            condvar: Condvar::new(),
            separators: Mutex::new(separators),
            low_fence: Mutex::new(low),
            high_fence: Mutex::new(high),
            used_qwords: AtomicU64::new(0),
            segments,
            id,
        }
    }

    /// This gate's segments.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Index in `[0, segments.len())` of the segment whose range contains
    /// `key`, per the separator keys.
    pub fn find_segment(&self, key: Key) -> usize {
        let separators = self.separators.lock();
        // First separator strictly greater than `key` marks the boundary;
        // everything before it belongs to the preceding segment.
        match separators.iter().position(|&sep| key < sep) {
            Some(idx) => idx,
            None => separators.len(),
        }
    }

    /// Current fence keys.
    pub fn fences(&self) -> (Key, Key) {
        (*self.low_fence.lock(), *self.high_fence.lock())
    }

    /// True if `key` falls within `[low_fence, high_fence)`.
    pub fn covers(&self, key: Key) -> bool {
        let (low, high) = self.fences();
        key >= low && (high.is_invalid() || key < high)
    }

    /// Re-validate that this gate still covers its claimed range after
    /// acquiring the lock. `Invalid` once the low fence has been set to the
    /// sentinel by a split/merge.
    pub fn recheck_fences(&self) -> FenceCheck {
        if self.low_fence.lock().is_invalid() {
            FenceCheck::Invalid
        } else {
            FenceCheck::Valid
        }
    }

    /// Invalidate this gate (called by the rebalancer after a split/merge
    /// has moved its data elsewhere). Any thread still holding a stale
    /// reference sees `Invalid` on its next fence recheck.
    pub fn invalidate(&self) {
        *self.low_fence.lock() = Key::max();
    }

    /// Update this gate's fence keys (called by the rebalancer after a
    /// split/merge has changed what range it covers).
    pub fn set_fences(&self, low: Key, high: Key) {
        *self.low_fence.lock() = low;
        *self.high_fence.lock() = high;
    }

    /// Update the separator keys (called after a rebalance redistributes
    /// content across this gate's segments).
    pub fn set_separators(&self, separators: Vec<Key>) {
        *self.separators.lock() = separators;
    }

    /// Recompute and store the used-space counter from the current
    /// segments (invariant 4: "total used-space counter equals the sum of
    /// qwords occupied in its segments").
    pub fn recompute_used_qwords(&self) {
        let total: u64 = self.segments.iter().map(|s| s.used_qwords()).sum();
        self.used_qwords.store(total, Ordering::Release);
    }

    /// The gate's used-space counter.
    pub fn used_qwords(&self) -> u64 {
        self.used_qwords.load(Ordering::Acquire)
    }

    /// Acquire read access. Blocks only if the gate is currently `Write`
    /// or `Rebalance`.
    pub fn acquire_read(&self) -> ReadGuard<'_> {
        let mut inner = self.inner.lock();
        loop {
            match inner.mode {
                GateMode::Free | GateMode::Read(_) => {
                    inner.mode = match inner.mode {
                        GateMode::Read(n) => GateMode::Read(n + 1),
                        _ => GateMode::Read(1),
                    };
                    return ReadGuard { gate: self };
                }
                GateMode::Write | GateMode::Rebalance => {
                    inner.waiters.append(WaiterKind::Read);
                    self.condvar.wait(&mut inner);
                }
            }
        }
    }

    fn release_read(&self) {
        let mut inner = self.inner.lock();
        inner.mode = match inner.mode {
            GateMode::Read(n) if n > 1 => GateMode::Read(n - 1),
            _ => GateMode::Free,
        };
        if inner.mode == GateMode::Free {
            self.wake_next_batch(&mut inner);
        }
    }

    /// Acquire exclusive write access.
    pub fn acquire_write(&self) -> WriteGuard<'_> {
        let mut inner = self.inner.lock();
        loop {
            if inner.mode == GateMode::Free {
                inner.mode = GateMode::Write;
                return WriteGuard { gate: self };
            }
            inner.waiters.append(WaiterKind::Write);
            self.condvar.wait(&mut inner);
        }
    }

    fn release_write(&self) {
        let mut inner = self.inner.lock();
        inner.mode = GateMode::Free;
        self.wake_next_batch(&mut inner);
    }

    /// Acquire `Rebalance` mode, excluding both readers and writers. Used
    /// by a chunk-wide rebalance walking every gate in turn.
    pub fn acquire_rebalance(&self) -> RebalanceGuard<'_> {
        let mut inner = self.inner.lock();
        loop {
            if inner.mode == GateMode::Free {
                inner.mode = GateMode::Rebalance;
                return RebalanceGuard { gate: self };
            }
            inner.waiters.append(WaiterKind::Rebalance);
            self.condvar.wait(&mut inner);
        }
    }

    fn release_rebalance(&self) {
        let mut inner = self.inner.lock();
        inner.mode = GateMode::Free;
        self.wake_next_batch(&mut inner);
    }

    /// Wake the next batch of waiters: a single `Write` or `Rebalance`
    /// waiter, or a contiguous run of `Read` waiters from the front of the
    /// queue, per the original's wake-up batching rule.
    fn wake_next_batch(&self, inner: &mut Inner) {
        match inner.waiters.front() {
            None => {}
            Some(WaiterKind::Write) | Some(WaiterKind::Rebalance) => {
                inner.waiters.pop_front();
                self.condvar.notify_all();
            }
            Some(WaiterKind::Read) => {
                while matches!(inner.waiters.front(), Some(WaiterKind::Read)) {
                    inner.waiters.pop_front();
                }
                self.condvar.notify_all();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_gate() -> Gate {
        Gate::new(
            0,
            vec![Segment::new(1024), Segment::new(1024)],
            Key::min(),
            Key::max(),
            vec![Key::edge(100, 0)],
        )
    }

    #[test]
    fn find_segment_respects_separators() {
        let gate = test_gate();
        assert_eq!(gate.find_segment(Key::edge(5, 0)), 0);
        assert_eq!(gate.find_segment(Key::edge(100, 0)), 1);
        assert_eq!(gate.find_segment(Key::edge(200, 0)), 1);
    }

    #[test]
    fn readers_coexist_writer_exclusive() {
        let gate = test_gate();
        let r1 = gate.acquire_read();
        let r2 = gate.acquire_read();
        drop(r1);
        drop(r2);
        let w = gate.acquire_write();
        drop(w);
    }

    #[test]
    fn invalidate_fails_fence_recheck() {
        let gate = test_gate();
        assert_eq!(gate.recheck_fences(), FenceCheck::Valid);
        gate.invalidate();
        assert_eq!(gate.recheck_fences(), FenceCheck::Invalid);
    }
}
