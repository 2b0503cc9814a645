//! Chunk: `G` gates plus a chunk-level latch serialising global rebalances.
//!
//! The original allocates a 2 MiB-aligned block through the platform
//! allocator and deallocates it through the epoch GC once a merge retires
//! it. This in-memory crate has no raw byte layout to align (see
//! `memstore::segment`'s module doc), so a chunk here is simply an `Arc`ed
//! Rust struct; "2 MiB-aligned" becomes "sized by `StoreConfig::solve`'s
//! gate/segment/qword geometry", and "freed through the epoch GC" becomes
//! "the last `Arc` reference (held by the ART leaves pointing at it and by
//! any in-flight scan) drops once the GC's retirement pass releases its
//! own handle".

use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::{Condvar, Mutex};

use crate::memstore::gate::Gate;

/// Opaque chunk identifier, unique for the lifetime of the store.
pub type ChunkId = u64;

/// `G` gates and the latch coordinating chunk-wide rebalances.
pub struct Chunk {
    /// This chunk's id, stable for its lifetime (reused by the ART's
    /// `IndexEntry::chunk_id`).
    pub id: ChunkId,
    gates: Vec<Gate>,
    /// Readers/writers currently inside any of this chunk's gates. A
    /// chunk-wide rebalance waits for this to drain to zero for each gate
    /// it visits (tracked per-gate by the gate's own mode, this counter is
    /// the chunk-level view used to decide whether a rebalance may even be
    /// attempted without spinning on every gate).
    writers_active: AtomicU32,
    /// Exclusive latch serialising global (chunk-wide) rebalances; ordinary
    /// per-gate writers never take this.
    rebalance_lock: Mutex<bool>,
    rebalance_cv: Condvar,
}

impl Chunk {
    /// A chunk with the given id and already-constructed gates.
    pub fn new(id: ChunkId, gates: Vec<Gate>) -> Self {
        Chunk {
            id,
            gates,
            writers_active: AtomicU32::new(0),
            rebalance_lock: Mutex::new(false),
            rebalance_cv: Condvar::new(),
        }
    }

    /// This chunk's gates.
    pub fn gates(&self) -> &[Gate] {
        &self.gates
    }

    /// The low fence of gate 0 / high fence of the last gate: this chunk's
    /// overall key range.
    pub fn fences(&self) -> (crate::index::key::Key, crate::index::key::Key) {
        let low = self.gates.first().map(|g| g.fences().0).unwrap_or_default();
        let high = self.gates.last().map(|g| g.fences().1).unwrap_or_default();
        (low, high)
    }

    pub(crate) fn note_writer_enter(&self) {
        self.writers_active.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn note_writer_exit(&self) {
        self.writers_active.fetch_sub(1, Ordering::AcqRel);
    }

    /// Acquire the chunk-wide exclusive latch for a global rebalance or
    /// merge. Blocks until any other in-flight chunk-wide rebalance on this
    /// chunk has finished.
    pub fn acquire_rebalance_lock(&self) -> ChunkRebalanceGuard<'_> {
        let mut held = self.rebalance_lock.lock();
        while *held {
            self.rebalance_cv.wait(&mut held);
        }
        *held = true;
        ChunkRebalanceGuard { chunk: self }
    }

    fn release_rebalance_lock(&self) {
        *self.rebalance_lock.lock() = false;
        self.rebalance_cv.notify_one();
    }

    /// Total qwords occupied across every gate, for merge-threshold
    /// decisions (the merger service's "both occupy less than ~60% of a
    /// single chunk's total qwords" check).
    pub fn total_used_qwords(&self) -> u64 {
        self.gates.iter().map(|g| g.used_qwords()).sum()
    }
}

/// RAII guard for the chunk-wide rebalance latch.
pub struct ChunkRebalanceGuard<'a> {
    chunk: &'a Chunk,
}

impl Drop for ChunkRebalanceGuard<'_> {
    fn drop(&mut self) {
        self.chunk.release_rebalance_lock();
    }
}
