//! # sombra_graphstore
//!
//! An in-memory, concurrent, MVCC graph storage substrate: vertices and
//! edges addressed through an adaptive radix trie, stored in
//! self-rebalancing chunks of optimistically-latched gates, versioned
//! for snapshot-isolated reads under a global high-water-mark.
//!
//! ## Quick start
//!
//! ```rust
//! use sombra_graphstore::Store;
//!
//! let store = Store::new_store(false);
//! let _thread = store.register_thread();
//!
//! let mut tx = store.start_transaction(false);
//! tx.insert_vertex(1).unwrap();
//! tx.insert_vertex(2).unwrap();
//! tx.insert_edge(1, 2, 0.5).unwrap();
//! tx.commit().unwrap();
//!
//! let mut reader = store.start_transaction(true);
//! assert_eq!(reader.get_weight(1, 2), Some(0.5));
//! reader.commit().unwrap();
//! ```
//!
//! ## Layout
//!
//! - [`primitives`]: the optimistic latch, epoch GC, and FIFO queue every
//!   higher layer is built from.
//! - [`index`]: the 16-byte `(source, destination)` key space and the
//!   adaptive radix trie mapping it to `{chunk, gate}` locations.
//! - [`memstore`]: chunks, gates, segments, the calibrator-tree
//!   rebalancer, and the background merger.
//! - [`txn`]: transaction context and the public [`TxHandle`] API.
//! - [`store`]: the top-level [`Store`] handle tying everything together.

/// Public error taxonomy (`GraphError`, `LogicalError`,
/// `TransactionConflict`).
pub mod error;

/// `StoreConfig` and the chunk-geometry solver.
pub mod config;

/// The optimistic latch, epoch-based reclamation, and the FIFO array
/// used by both the GC's retirement queue and a gate's wait list.
pub mod primitives;

/// The key space and the adaptive radix trie indexing it.
pub mod index;

/// Chunks, gates, segments, the rebalancer, and the merger.
pub mod memstore;

/// Transaction context and the public transaction handle.
pub mod txn;

/// The top-level store handle.
pub mod store;

/// `tracing`-based logging setup.
pub mod logging;

pub use crate::config::StoreConfig;
pub use crate::error::{GraphError, LogicalError, Result, TransactionConflict};
pub use crate::store::{Store, ThreadHandle};
pub use crate::txn::TxHandle;
