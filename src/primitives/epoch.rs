//! Epoch-based reclamation.
//!
//! Every registered thread publishes a coarse monotonic "epoch" reading
//! whenever it enters a critical section, and a sentinel "quiescent" value
//! otherwise. `min_epoch()` is the smallest published epoch across all
//! registered threads, read optimistically through a latch-protected list —
//! here, a `parking_lot::Mutex<Vec<_>>`, which gives the same "readers never
//! block for long" behaviour as the original's latch-protected linked list
//! without requiring unsafe intrusive-list surgery.
//!
//! `mark` never fails; deallocation callbacks must not panic.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::trace;

use crate::primitives::circular::CircularArray;

/// Sentinel published by a thread that is not inside a critical section.
pub const QUIESCENT: u64 = u64::MAX;

/// Registry of per-thread published epochs plus the shared logical clock.
pub struct EpochRegistry {
    clock: AtomicU64,
    threads: Mutex<Vec<Arc<AtomicU64>>>,
}

impl EpochRegistry {
    /// A fresh, empty registry.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            clock: AtomicU64::new(0),
            threads: Mutex::new(Vec::new()),
        })
    }

    /// Register a new thread, returning the published-epoch cell it should
    /// store in its thread-local context. Starts quiescent.
    pub fn register(&self) -> Arc<AtomicU64> {
        let handle = Arc::new(AtomicU64::new(QUIESCENT));
        self.threads.lock().push(handle.clone());
        handle
    }

    /// Remove a thread's published-epoch cell from the registry.
    pub fn unregister(&self, handle: &Arc<AtomicU64>) {
        let mut threads = self.threads.lock();
        if let Some(pos) = threads.iter().position(|h| Arc::ptr_eq(h, handle)) {
            threads.swap_remove(pos);
        }
    }

    /// Bump and return the shared logical clock. Called on entering a
    /// critical section (`ScopedEpoch::enter`).
    pub fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Read the shared logical clock without advancing it. Used to stamp
    /// objects at retirement time.
    pub fn current_tick(&self) -> u64 {
        self.clock.load(Ordering::Acquire)
    }

    /// The smallest epoch published by any non-quiescent thread, or the
    /// current clock value if every thread is quiescent (nothing pins any
    /// earlier epoch, so anything is reclaimable).
    pub fn min_epoch(&self) -> u64 {
        let threads = self.threads.lock();
        threads
            .iter()
            .map(|h| h.load(Ordering::Acquire))
            .filter(|&e| e != QUIESCENT)
            .min()
            .unwrap_or_else(|| self.current_tick())
    }
}

impl Default for EpochRegistry {
    fn default() -> Self {
        Arc::try_unwrap(Self::new()).unwrap_or_else(|arc| Self {
            clock: AtomicU64::new(arc.current_tick()),
            threads: Mutex::new(Vec::new()),
        })
    }
}

/// RAII guard publishing the current thread's epoch for the guard's
/// lifetime, then reverting to quiescent. Pair one of these with every
/// critical section that reads shared, epoch-reclaimed state (an ART
/// traversal, a gate-protected scan).
pub struct ScopedEpoch<'a> {
    cell: &'a AtomicU64,
}

impl<'a> ScopedEpoch<'a> {
    /// Publish a fresh epoch reading on `cell` for the registry.
    pub fn enter(registry: &EpochRegistry, cell: &'a Arc<AtomicU64>) -> Self {
        let epoch = registry.tick();
        cell.store(epoch, Ordering::Release);
        Self { cell }
    }
}

impl Drop for ScopedEpoch<'_> {
    fn drop(&mut self) {
        self.cell.store(QUIESCENT, Ordering::Release);
    }
}

struct RetiredItem {
    epoch: u64,
    deleter: Box<dyn FnOnce() + Send>,
}

/// One process-wide instance with a background thread. Generic deletion is
/// modelled with a boxed `FnOnce` rather than
/// the original's type-erased `DeleteInterface`/`DeleteImplementation` pair
/// — the same capability, expressed with a closure instead of a vtable we'd
/// have to hand-roll.
pub struct EpochGarbageCollector {
    registry: Arc<EpochRegistry>,
    queue: Mutex<CircularArray<RetiredItem>>,
    running: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl EpochGarbageCollector {
    /// Start a background thread performing a collection pass every
    /// `tick_interval` (default 1s in the original).
    pub fn start(registry: Arc<EpochRegistry>, tick_interval: Duration) -> Arc<Self> {
        let gc = Arc::new(Self {
            registry,
            queue: Mutex::new(CircularArray::new()),
            running: Arc::new(AtomicBool::new(true)),
            handle: Mutex::new(None),
        });

        let worker = {
            let gc = gc.clone();
            thread::Builder::new()
                .name("sombra-epoch-gc".into())
                .spawn(move || {
                    while gc.running.load(Ordering::Acquire) {
                        thread::sleep(tick_interval);
                        gc.perform_gc_pass();
                    }
                })
                .expect("failed to spawn epoch GC thread")
        };
        *gc.handle.lock() = Some(worker);
        gc
    }

    /// Mark `ptr` for deletion via `deleter`, stamped with the current
    /// epoch. Never fails.
    pub fn mark<T: Send + 'static>(&self, ptr: Box<T>, deleter: impl FnOnce(Box<T>) + Send + 'static) {
        let epoch = self.registry.current_tick();
        let item = RetiredItem {
            epoch,
            deleter: Box::new(move || deleter(ptr)),
        };
        self.queue.lock().append(item);
    }

    /// Run a single collection pass: compute `min_epoch`, then free every
    /// queued entry strictly older than it.
    pub fn perform_gc_pass(&self) {
        let epoch = self.registry.min_epoch();
        let drained = {
            let mut queue = self.queue.lock();
            queue.drain_while(|item| item.epoch < epoch)
        };
        trace!(min_epoch = epoch, reclaimed = drained.len(), "epoch gc pass");
        for item in drained {
            (item.deleter)();
        }
    }

    /// Stop the background thread and join it.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.join();
        }
    }

    /// Number of entries still awaiting reclamation.
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }
}

impl Drop for EpochGarbageCollector {
    fn drop(&mut self) {
        self.stop();
        // Run any items left behind after the last pass: nothing can still
        // be reading them once the collector itself is being torn down.
        let drained = {
            let mut queue = self.queue.lock();
            let all: Vec<_> = std::iter::from_fn(|| queue.pop_front()).collect();
            all
        };
        for item in drained {
            (item.deleter)();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn min_epoch_ignores_quiescent_threads() {
        let registry = EpochRegistry::new();
        let a = registry.register();
        let b = registry.register();
        a.store(5, Ordering::Release);
        b.store(QUIESCENT, Ordering::Release);
        assert_eq!(registry.min_epoch(), 5);
    }

    #[test]
    fn min_epoch_is_current_tick_when_all_quiescent() {
        let registry = EpochRegistry::new();
        let a = registry.register();
        a.store(QUIESCENT, Ordering::Release);
        registry.tick();
        registry.tick();
        assert_eq!(registry.min_epoch(), registry.current_tick());
    }

    #[test]
    fn gc_reclaims_only_past_min_epoch() {
        let registry = EpochRegistry::new();
        let handle = registry.register();
        let gc = Arc::new(GcStub::new(registry.clone()));

        let _guard = ScopedEpoch::enter(&registry, &handle);
        let reclaimed = Arc::new(AtomicUsize::new(0));
        let reclaimed_clone = reclaimed.clone();
        gc.mark(Box::new(42u32), move |_| {
            reclaimed_clone.fetch_add(1, Ordering::SeqCst);
        });
        gc.perform_gc_pass();
        // The marking thread is still inside the critical section (guard
        // alive), so its own epoch pins the retired item: not reclaimed yet.
        assert_eq!(reclaimed.load(Ordering::SeqCst), 0);
        drop(_guard);
        registry.tick();
        gc.perform_gc_pass();
        assert_eq!(reclaimed.load(Ordering::SeqCst), 1);
    }

    // Thin wrapper avoiding the background thread in the reclaim-ordering test.
    struct GcStub {
        inner: EpochGarbageCollector,
    }
    impl GcStub {
        fn new(registry: Arc<EpochRegistry>) -> Self {
            Self {
                inner: EpochGarbageCollector {
                    registry,
                    queue: Mutex::new(CircularArray::new()),
                    running: Arc::new(AtomicBool::new(false)),
                    handle: Mutex::new(None),
                },
            }
        }
        fn mark<T: Send + 'static>(&self, ptr: Box<T>, deleter: impl FnOnce(Box<T>) + Send + 'static) {
            self.inner.mark(ptr, deleter);
        }
        fn perform_gc_pass(&self) {
            self.inner.perform_gc_pass();
        }
    }
}
