//! Background merger service: periodically walks chunks in key order,
//! prunes each gate's stale version chains, and merges adjacent chunks
//! whose combined occupancy would still fit comfortably in one.
//!
//! Mirrors the epoch GC's own background-thread shape
//! (`primitives::epoch::EpochGarbageCollector`): a named thread, a
//! `running` flag, and a `Drop` impl that joins it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::debug;

use crate::memstore::rebalancer::{self, MERGE_FILL_THRESHOLD};
use crate::memstore::sparse_array::MemStore;

/// Periodic pruning + adjacent-chunk-merge pass over a [`MemStore`].
pub struct MergerService {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl MergerService {
    /// Spawn the background merger thread, ticking every `interval`.
    pub fn start(store: Arc<MemStore>, interval: Duration) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let thread_running = running.clone();
        let handle = std::thread::Builder::new()
            .name("sombra-merger".into())
            .spawn(move || {
                while thread_running.load(Ordering::Acquire) {
                    std::thread::sleep(interval);
                    if !thread_running.load(Ordering::Acquire) {
                        break;
                    }
                    run_pass(&store);
                }
            })
            .expect("failed to spawn merger thread");
        MergerService {
            running,
            handle: Some(handle),
        }
    }

    /// Stop the background thread and wait for it to exit.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for MergerService {
    fn drop(&mut self) {
        self.stop();
    }
}

/// One merger pass: prune every gate, then merge adjacent chunk pairs
/// that both sit below [`MERGE_FILL_THRESHOLD`] (spec §4.8). Exposed at
/// `pub(crate)` visibility so `Store::debug_run_merger_pass` can drive a
/// pass synchronously instead of waiting on the background timer.
pub(crate) fn run_pass(store: &MemStore) {
    let hwm = store.high_water_mark();
    let chunks = store.chunks_in_key_order();
    for chunk in &chunks {
        for gate in chunk.gates() {
            let _guard = gate.acquire_rebalance();
            rebalancer::rebalance_gate_local(gate, hwm);
        }
    }

    let mut i = 0;
    while i + 1 < chunks.len() {
        let left = &chunks[i];
        let right = &chunks[i + 1];
        let left_fill = fill_fraction(left);
        let right_fill = fill_fraction(right);
        if left_fill < MERGE_FILL_THRESHOLD && right_fill < MERGE_FILL_THRESHOLD {
            debug!(left = left.id, right = right.id, left_fill, right_fill, "merging adjacent chunks");
            rebalancer::merge_chunks(store, left, right);
            // `right` is now retired: skip past the pair instead of
            // treating it as the next `left`, which would re-fire the
            // merge against a chunk already removed from the table.
            i += 2;
        } else {
            i += 1;
        }
    }
}

fn fill_fraction(chunk: &crate::memstore::chunk::Chunk) -> f64 {
    let capacity: u64 = chunk
        .gates()
        .iter()
        .map(rebalancer::gate_capacity_qwords)
        .sum::<u64>()
        .max(1);
    chunk.total_used_qwords() as f64 / capacity as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::index::key::Key;
    use crate::primitives::epoch::{EpochGarbageCollector, EpochRegistry};
    use crate::txn::context::GlobalContext;
    use crate::txn::transaction::TransactionContext;

    #[test]
    fn merger_prunes_and_keeps_data_findable() {
        let global = GlobalContext::new();
        let gc = EpochGarbageCollector::start(EpochRegistry::new(), Duration::from_secs(3600));
        let store = Arc::new(MemStore::new(StoreConfig::solve(64 * 1024, 2, 64), gc, global));
        let tx = TransactionContext::new(1, 1, false);
        for v in 0u64..32 {
            store.write_key(&tx, Key::vertex_header(v), Some(0.0)).unwrap();
        }
        store.commit_writes(&tx, 2);
        run_pass(&store);
        for v in 0u64..32 {
            assert_eq!(
                store.lookup_key(Key::vertex_header(v), crate::memstore::segment::Reader::Timestamp(1000)),
                Some(0.0)
            );
        }
    }
}
