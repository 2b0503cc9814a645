//! The top-level memstore: the chunk table plus the ART index over gate
//! low-fence keys, and the vertex/edge read/write dispatch every
//! `TxHandle` operation bottoms out in.
//!
//! Named after the teacher corpus's `sparse_array.hpp`/`.cpp` (the file
//! this module's responsibilities are grounded on): resolving a key to its
//! owning `{chunk, gate}` through the index, taking the covering gate's
//! lock, and handing off to the right segment.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{GraphError, LogicalError};
use crate::index::art::{ArtIndex, IndexEntry};
use crate::index::key::Key;
use crate::memstore::chunk::{Chunk, ChunkId};
use crate::memstore::gate::{FenceCheck, Gate};
use crate::memstore::rebalancer;
use crate::memstore::segment::{Reader, Segment, UpdateError, UpdateOutcome};
use crate::config::StoreConfig;
use crate::primitives::epoch::EpochGarbageCollector;
use crate::txn::context::GlobalContext;
use crate::txn::transaction::{TransactionContext, UndoEntry};

/// Chunk table + index + the geometry every newly allocated chunk is
/// built from.
pub struct MemStore {
    chunks: RwLock<HashMap<ChunkId, Arc<Chunk>>>,
    next_chunk_id: AtomicU64,
    index: ArtIndex,
    config: StoreConfig,
    gc: Arc<EpochGarbageCollector>,
    global: Arc<GlobalContext>,
}

/// Debug/introspection snapshot, the substrate's stand-in for the
/// excluded telemetry-counter layer (spec §1 Non-goals) — plain numbers
/// for tests and operators, not a serialised counter feed.
#[derive(Debug, Clone, Copy)]
pub struct StoreStats {
    /// Number of live chunks.
    pub chunk_count: usize,
    /// Total qwords occupied across every chunk's gates.
    pub total_used_qwords: u64,
}

impl MemStore {
    /// Build a store with one chunk covering the whole key space.
    pub fn new(config: StoreConfig, gc: Arc<EpochGarbageCollector>, global: Arc<GlobalContext>) -> Self {
        let store = MemStore {
            chunks: RwLock::new(HashMap::new()),
            next_chunk_id: AtomicU64::new(1),
            index: ArtIndex::new(Some(gc.clone())),
            config,
            gc,
            global,
        };
        let root_gate_segments = store.new_segments();
        let root_gate = Gate::new(
            0,
            root_gate_segments,
            Key::min(),
            Key::max(),
            vec![Key::max(); store.config.segments_per_gate.saturating_sub(1)],
        );
        let root_chunk = Arc::new(Chunk::new(0, vec![root_gate]));
        store.index.insert(Key::min(), IndexEntry { chunk_id: 0, gate_id: 0 });
        store.chunks.write().insert(0, root_chunk);
        store
    }

    fn new_segments(&self) -> Vec<Segment> {
        (0..self.config.segments_per_gate)
            .map(|_| Segment::new(self.config.qwords_per_segment as u64))
            .collect()
    }

    /// The high-water-mark: smallest active read timestamp, or "everything
    /// is prunable" if no transaction is active.
    pub fn high_water_mark(&self) -> u64 {
        self.global.high_water_mark()
    }

    /// Number of live chunks.
    pub fn chunk_count(&self) -> usize {
        self.chunks.read().len()
    }

    /// Debug/introspection snapshot (scenario (e)'s "debug hook reporting
    /// chunk count", generalised to the other gross size the tests check).
    pub fn stats(&self) -> StoreStats {
        let chunks = self.chunks.read();
        let total_used_qwords = chunks.values().map(|c| c.total_used_qwords()).sum();
        StoreStats {
            chunk_count: chunks.len(),
            total_used_qwords,
        }
    }

    fn get_chunk(&self, id: ChunkId) -> Option<Arc<Chunk>> {
        self.chunks.read().get(&id).cloned()
    }

    /// Resolve `key` to its owning `{chunk, gate}` via the ART's
    /// predecessor search over gate low-fence keys.
    fn resolve(&self, key: Key) -> Option<(Arc<Chunk>, u16)> {
        let (_, entry) = self.index.find_less_or_equal(key)?;
        let chunk = self.get_chunk(entry.chunk_id)?;
        Some((chunk, entry.gate_id))
    }

    pub(crate) fn allocate_sibling_chunk(&self, low: Key, high: Key) -> Arc<Chunk> {
        let id = self.next_chunk_id.fetch_add(1, Ordering::AcqRel);
        let gate = Gate::new(
            0,
            self.new_segments(),
            low,
            high,
            vec![Key::max(); self.config.segments_per_gate.saturating_sub(1)],
        );
        Arc::new(Chunk::new(id, vec![gate]))
    }

    pub(crate) fn register_chunk(&self, chunk: Arc<Chunk>) {
        self.chunks.write().insert(chunk.id, chunk);
    }

    pub(crate) fn index_insert(&self, key: Key, chunk_id: ChunkId, gate_id: u16) {
        self.index.insert(key, IndexEntry { chunk_id, gate_id });
    }

    pub(crate) fn index_remove(&self, key: Key) {
        self.index.remove(key);
    }

    pub(crate) fn retire_chunk(&self, chunk: Arc<Chunk>) {
        self.chunks.write().remove(&chunk.id);
        self.gc.mark(Box::new(chunk), |_| {});
    }

    /// Chunks in ascending key order, for the merger's adjacent-pair walk.
    pub(crate) fn chunks_in_key_order(&self) -> Vec<Arc<Chunk>> {
        let mut chunks: Vec<Arc<Chunk>> = self.chunks.read().values().cloned().collect();
        chunks.sort_by_key(|c| c.fences().0);
        chunks
    }

    /// Apply an insert (`Some(weight)`) or remove (`None`) of `key`,
    /// retrying through local/global rebalances as needed. `weight` is
    /// ignored (but still conceptually "present") for vertex-header keys.
    pub(crate) fn write_key(&self, tx: &TransactionContext, key: Key, op_insert: Option<f64>) -> Result<(), GraphError> {
        loop {
            let Some((chunk, gate_id)) = self.resolve(key) else {
                return Err(GraphError::Logical(LogicalError::VertexNotFound(
                    crate::index::key::to_external_vertex(key.source),
                )));
            };
            let gate = &chunk.gates()[gate_id as usize];
            let guard = gate.acquire_write();
            if gate.recheck_fences() == FenceCheck::Invalid || !gate.covers(key) {
                drop(guard);
                continue;
            }
            let segment_index = gate.find_segment(key);
            let outcome = gate.segments()[segment_index].update(tx.id(), key, op_insert);
            match outcome {
                Ok(UpdateOutcome::Applied { is_lhs, undo_kind }) => {
                    gate.recompute_used_qwords();
                    tx.push_undo(UndoEntry {
                        chunk_id: chunk.id,
                        gate_id,
                        segment_index,
                        is_lhs,
                        key,
                        kind: undo_kind,
                    });
                    return Ok(());
                }
                Ok(UpdateOutcome::Collapsed) => {
                    gate.recompute_used_qwords();
                    tx.pop_undo_if_matches(key);
                    return Ok(());
                }
                Ok(UpdateOutcome::NeedsRebalance) => {
                    drop(guard);
                    rebalancer::maybe_rebalance(self, &chunk, gate_id);
                    continue;
                }
                Err(UpdateError::Logical(e)) => return Err(GraphError::Logical(e)),
                Err(UpdateError::Conflict(c)) => return Err(GraphError::Conflict(c)),
            }
        }
    }

    /// Point lookup of `key` as visible to `reader`.
    pub(crate) fn lookup_key(&self, key: Key, reader: Reader) -> Option<f64> {
        loop {
            let Some((chunk, gate_id)) = self.resolve(key) else {
                return None;
            };
            let gate = &chunk.gates()[gate_id as usize];
            let _guard = gate.acquire_read();
            if gate.recheck_fences() == FenceCheck::Invalid || !gate.covers(key) {
                continue;
            }
            let segment_index = gate.find_segment(key);
            let segment = &gate.segments()[segment_index];
            return segment
                .lookup(true, key, reader)
                .or_else(|| segment.lookup(false, key, reader));
        }
    }

    /// Walk every edge of `source_internal` visible to `reader`.
    pub(crate) fn scan_vertex_edges(&self, source_internal: u64, reader: Reader, mut callback: impl FnMut(u64, f64) -> bool) {
        let key = Key::vertex_header(source_internal);
        loop {
            let Some((chunk, gate_id)) = self.resolve(key) else {
                return;
            };
            let gate = &chunk.gates()[gate_id as usize];
            let _guard = gate.acquire_read();
            if gate.recheck_fences() == FenceCheck::Invalid || !gate.covers(key) {
                continue;
            }
            let segment_index = gate.find_segment(key);
            let segment = &gate.segments()[segment_index];
            let mut keep_going = true;
            segment.scan_vertex_edges(true, source_internal, reader, |d, w| {
                keep_going = callback(d, w);
                keep_going
            });
            if keep_going {
                segment.scan_vertex_edges(false, source_internal, reader, |d, w| {
                    keep_going = callback(d, w);
                    keep_going
                });
            }
            return;
        }
    }

    /// Apply `action` to whatever half currently holds `entry.key`,
    /// tolerating relocation by an intervening split/merge: the cached
    /// `{chunk, gate, segment}` is tried first, then the key is
    /// re-resolved through the index if that location no longer covers it
    /// (see `DESIGN.md`'s note on in-flight relocation).
    pub(crate) fn apply_at_current_location(&self, entry: &UndoEntry, action: impl Fn(&Segment, bool)) {
        if let Some(chunk) = self.get_chunk(entry.chunk_id) {
            if let Some(gate) = chunk.gates().get(entry.gate_id as usize) {
                if gate.recheck_fences() != FenceCheck::Invalid && gate.covers(entry.key) {
                    let segment_index = gate.find_segment(entry.key);
                    let segment = &gate.segments()[segment_index];
                    action(segment, true);
                    action(segment, false);
                    return;
                }
            }
        }
        if let Some((chunk, gate_id)) = self.resolve(entry.key) {
            let gate = &chunk.gates()[gate_id as usize];
            let segment_index = gate.find_segment(entry.key);
            let segment = &gate.segments()[segment_index];
            action(segment, true);
            action(segment, false);
        }
    }

    /// Stamp every version record `tx` wrote with its commit timestamp.
    pub(crate) fn commit_writes(&self, tx: &TransactionContext, commit_ts: u64) {
        for entry in tx.written_keys() {
            self.apply_at_current_location(&entry, |segment, is_lhs| {
                segment.commit(is_lhs, entry.key, tx.id(), commit_ts)
            });
        }
    }

    /// Reverse every write `tx` made, LIFO.
    pub(crate) fn rollback_writes(&self, tx: &TransactionContext) {
        for entry in tx.undo_log_lifo() {
            self.apply_at_current_location(&entry, |segment, is_lhs| segment.rollback(is_lhs, entry.key, tx.id()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::epoch::EpochRegistry;
    use std::time::Duration;

    fn test_store() -> MemStore {
        let global = GlobalContext::new();
        let gc = EpochGarbageCollector::start(EpochRegistry::new(), Duration::from_secs(3600));
        MemStore::new(StoreConfig::solve(64 * 1024, 2, 64), gc, global)
    }

    #[test]
    fn write_then_lookup_round_trips() {
        let store = test_store();
        let tx = TransactionContext::new(1, 1, false);
        let key = Key::vertex_header(5);
        store.write_key(&tx, key, Some(0.0)).unwrap();
        assert_eq!(store.lookup_key(key, Reader::Transaction(1)), Some(0.0));
    }

    #[test]
    fn duplicate_insert_is_logical_error() {
        let store = test_store();
        let tx = TransactionContext::new(1, 1, false);
        let key = Key::vertex_header(5);
        store.write_key(&tx, key, Some(0.0)).unwrap();
        let err = store.write_key(&tx, key, Some(0.0)).unwrap_err();
        assert!(matches!(err, GraphError::Logical(LogicalError::VertexAlreadyExists(5))));
    }

    #[test]
    fn many_inserts_trigger_rebalance_and_stay_findable() {
        let store = test_store();
        let tx = TransactionContext::new(1, 1, false);
        for v in 0u64..2000 {
            store.write_key(&tx, Key::vertex_header(v), Some(0.0)).unwrap();
        }
        for v in 0u64..2000 {
            assert_eq!(
                store.lookup_key(Key::vertex_header(v), Reader::Transaction(1)),
                Some(0.0),
                "vertex {v} missing"
            );
        }
        assert!(store.chunk_count() >= 1);
    }
}
