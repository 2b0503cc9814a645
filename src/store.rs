//! The top-level handle a caller opens: wires the memstore, the epoch GC,
//! the background merger, and the transaction clock together, and hands
//! out [`TxHandle`]s.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::StoreConfig;
use crate::memstore::merger::MergerService;
use crate::memstore::sparse_array::{MemStore, StoreStats};
use crate::primitives::epoch::EpochGarbageCollector;
use crate::txn::context::{GlobalContext, ThreadContext};
use crate::txn::handle::TxHandle;
use crate::txn::transaction::TransactionContext;

/// An open graph store: the memstore plus the background services
/// (epoch GC, merger) that keep it healthy.
pub struct Store {
    pub(crate) memstore: Arc<MemStore>,
    pub(crate) global: Arc<GlobalContext>,
    gc: Arc<EpochGarbageCollector>,
    merger: Mutex<Option<MergerService>>,
    pub(crate) config: StoreConfig,
    pub(crate) vertex_count: AtomicI64,
    pub(crate) edge_count: AtomicI64,
}

/// A thread's registration with a store; holding one publishes this
/// thread's epoch so the background GC won't reclaim anything it might
/// still be reading. Drop to unregister.
pub struct ThreadHandle {
    ctx: ThreadContext,
}

impl ThreadHandle {
    /// Enter a critical section for the duration of the returned guard.
    pub fn enter_critical_section(&self) -> crate::primitives::epoch::ScopedEpoch<'_> {
        self.ctx.enter_critical_section()
    }
}

impl Store {
    /// Open a store with the default geometry, undirected or directed.
    pub fn new_store(directed: bool) -> Arc<Store> {
        let config = if directed {
            StoreConfig::default_directed()
        } else {
            StoreConfig::default_undirected()
        };
        Self::with_config(config)
    }

    /// Open a store with caller-supplied geometry (see
    /// [`StoreConfig::solve`]).
    pub fn with_config(config: StoreConfig) -> Arc<Store> {
        let global = GlobalContext::new();
        let gc = EpochGarbageCollector::start(global.epochs().clone(), config.gc_tick_interval);
        let memstore = Arc::new(MemStore::new(config.clone(), gc.clone(), global.clone()));
        let merger = MergerService::start(memstore.clone(), config.merger_tick_interval);
        Arc::new(Store {
            memstore,
            global,
            gc,
            merger: Mutex::new(Some(merger)),
            config,
            vertex_count: AtomicI64::new(0),
            edge_count: AtomicI64::new(0),
        })
    }

    /// Register the calling thread with the store's epoch registry.
    pub fn register_thread(self: &Arc<Self>) -> ThreadHandle {
        ThreadHandle {
            ctx: ThreadContext::new(self.global.clone()),
        }
    }

    /// Start a new transaction. Read-only transactions never block a
    /// writer and never produce undo entries.
    pub fn start_transaction(&self, read_only: bool) -> TxHandle<'_> {
        let ts = self.global.next_timestamp();
        self.global.begin_transaction(ts);
        TxHandle::new(self, TransactionContext::new(ts, ts, read_only))
    }

    /// Whether this store treats edges as directed.
    pub fn directed(&self) -> bool {
        self.config.directed
    }

    /// Debug/introspection snapshot.
    pub fn stats(&self) -> StoreStats {
        self.memstore.stats()
    }

    /// Number of live chunks, exposed for tests and operators (scenario
    /// (e): "a debug hook reporting the current chunk count").
    pub fn chunk_count(&self) -> usize {
        self.memstore.chunk_count()
    }

    /// Synchronously run one merger pass (prune + adjacent-chunk merge)
    /// instead of waiting for the background timer. Test-only debug hook;
    /// the background [`MergerService`] already runs this on its own
    /// schedule in normal operation.
    pub fn debug_run_merger_pass(&self) {
        crate::memstore::merger::run_pass(&self.memstore);
    }

    pub(crate) fn end_transaction(&self, read_ts: u64) {
        self.global.end_transaction(read_ts);
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        if let Some(mut merger) = self.merger.lock().take() {
            merger.stop();
        }
        self.gc.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_store_starts_with_one_chunk() {
        let store = Store::new_store(false);
        assert_eq!(store.chunk_count(), 1);
    }

    #[test]
    fn vertex_insert_is_visible_after_commit() {
        let store = Store::new_store(false);
        let _thread = store.register_thread();
        let mut tx = store.start_transaction(false);
        tx.insert_vertex(1).unwrap();
        tx.commit().unwrap();

        let mut reader = store.start_transaction(true);
        assert!(reader.has_vertex(1));
        reader.commit().unwrap();
    }
}
