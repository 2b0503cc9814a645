//! Low-level primitives underlying the storage substrate.
//!
//! Everything here is process-local and allocation-free at the hot path:
//! the optimistic latch, the epoch-based reclaimer, and the intrusive FIFO
//! shared by the gate wait-list and the GC retirement queue.

/// Versioned spinlock with invalidation and a small inline payload.
pub mod latch;

/// Epoch-based garbage collector deferring reclamation until every thread
/// has exited the epoch observed at retirement.
pub mod epoch;

/// Intrusive FIFO used by the gate wait-list and the GC retirement queue
///.
pub mod circular;
