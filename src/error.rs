//! Public error taxonomy.
//!
//! The storage substrate surfaces exactly two user-visible error kinds
//! (`LogicalError`, `TransactionConflict`). A third signal, [`Abort`], exists
//! only inside the crate: it is the "please restart" value threaded through
//! optimistic-latch validation and ART traversal, and it never crosses a
//! public function boundary.

use thiserror::Error;

/// Result alias used by every public operation on a [`crate::TxHandle`].
pub type Result<T> = std::result::Result<T, GraphError>;

/// Errors visible to callers of the storage substrate.
#[derive(Debug, Error)]
pub enum GraphError {
    /// Static misuse: duplicate/missing entity, wrong transaction state, ...
    #[error(transparent)]
    Logical(#[from] LogicalError),

    /// A write-write conflict with another still-active transaction.
    #[error(transparent)]
    Conflict(#[from] TransactionConflict),
}

/// Static misuse errors, raised immediately and never retried internally.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LogicalError {
    /// `insert_vertex` on a vertex id already present in the store.
    #[error("vertex {0} already exists")]
    VertexAlreadyExists(u64),

    /// An operation referenced a vertex that is not present.
    #[error("vertex {0} does not exist")]
    VertexNotFound(u64),

    /// `insert_edge` on an edge already present between the two endpoints.
    #[error("edge ({0}, {1}) already exists")]
    EdgeAlreadyExists(u64, u64),

    /// An operation referenced an edge that is not present.
    #[error("edge ({0}, {1}) does not exist")]
    EdgeNotFound(u64, u64),

    /// `commit`/`rollback`/a mutation was attempted after the transaction
    /// already terminated.
    #[error("transaction already terminated")]
    TransactionTerminated,

    /// A mutating call was made through a read-only transaction handle.
    #[error("cannot write through a read-only transaction")]
    ReadOnlyTransaction,

    /// The supplied vertex id is the reserved sentinel `u64::MAX`.
    #[error("vertex id {0:#x} is reserved")]
    ReservedVertexId(u64),
}

/// A dynamic write-write conflict: the target record's overlay entry is
/// currently owned by a different, still-active transaction. The caller
/// must retry on a fresh transaction — the core never auto-retries a user
/// operation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("transaction conflict on key ({source}, {destination})")]
pub struct TransactionConflict {
    /// Source half of the contended key.
    pub source: u64,
    /// Destination half of the contended key (0 for a vertex header).
    pub destination: u64,
}

/// Internal restart signal. Raised by optimistic-latch validation, ART
/// traversal, and gate fence-key rechecks. Always caught and retried by the
/// component that raised it; the outermost public operation is the restart
/// scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Abort {
    /// The latch/node/gate observed was invalidated or changed underfoot;
    /// restart the traversal from its natural root.
    Retry,
    /// The gate we intended to write was co-opted by a chunk-level
    /// rebalance; release held locks and retry via the gate's entry point.
    RebalancingAbort,
}

pub(crate) type AbortResult<T> = std::result::Result<T, Abort>;
