//! Transaction state, the global/per-thread context it is issued from, and
//! the public handle embedders call operations through.

/// `GlobalContext`/`ThreadContext`: timestamp generation, thread
/// registration, and the active-transaction registry the high-water-mark
/// is computed from.
pub mod context;

/// `TransactionContext`: read/commit timestamps, lifecycle state, and the
/// undo log.
pub mod transaction;

/// `TxHandle`: the public embedder-facing transaction API.
pub mod handle;

pub use handle::TxHandle;
pub use transaction::{TransactionContext, TxId};
