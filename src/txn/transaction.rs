//! Transaction state: read/commit timestamps, the undo log, and the
//! commit/rollback state machine.
//!
//! Mirrors the teacher's `db::transaction::TxState` naming, generalised:
//! the teacher tracks a single WAL-backed log sequence number, this tracks
//! a read timestamp assigned at start and (if the transaction commits an
//! update) a commit timestamp assigned at commit, plus the in-memory undo
//! buffer a durability-free store needs instead of a WAL.

use parking_lot::Mutex;

use crate::error::LogicalError;
use crate::index::key::Key;

/// Opaque transaction identifier. While a transaction is active, version
/// records it writes carry this id as their owner (the "tagged pointer to
/// its own transaction state" the data model describes); the identifier is
/// unique for the lifetime of the store (drawn from the same monotonic
/// counter as timestamps).
pub type TxId = u64;

/// Lifecycle state of a [`TransactionContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    /// Accepting reads (and, if not read-only, writes).
    Active,
    /// Committed; undo entries are retained only until no running
    /// transaction's read timestamp could still need them.
    Committed,
    /// Rolled back; all of its writes have been reversed.
    RolledBack,
}

/// What kind of pre-image an undo entry replays, mirroring the original's
/// `UndoEntryVertex`/edge split so `rollback` knows which dispatch to take.
#[derive(Debug, Clone, Copy)]
pub enum UndoKind {
    /// A vertex header was inserted; undo removes it.
    VertexAdd,
    /// A vertex header was removed; undo re-inserts it.
    VertexRemove,
    /// An edge was inserted with this weight; undo removes it.
    EdgeAdd {
        /// The weight the edge was inserted with.
        weight: f64,
    },
    /// An edge was removed; undo re-inserts it. The weight it carried is
    /// not needed to reverse an in-overlay remove (the remove record is
    /// simply popped, exposing whatever was visible underneath), but is
    /// kept for symmetry with `EdgeAdd` and future diagnostics.
    EdgeRemove,
}

/// One entry in a transaction's undo log: enough routing information to
/// find the version record this transaction wrote and pop it back to
/// whatever preceded it.
#[derive(Debug, Clone, Copy)]
pub struct UndoEntry {
    /// Chunk the write landed in.
    pub chunk_id: u64,
    /// Gate within the chunk.
    pub gate_id: u16,
    /// Segment index within the gate.
    pub segment_index: usize,
    /// Which half of the segment.
    pub is_lhs: bool,
    /// The key the write touched.
    pub key: Key,
    /// What kind of pre-image this replays.
    pub kind: UndoKind,
}

/// Per-transaction state: timestamps, lifecycle, and the undo buffer.
pub struct TransactionContext {
    id: TxId,
    read_ts: u64,
    read_only: bool,
    state: Mutex<TxState>,
    commit_ts: Mutex<Option<u64>>,
    undo_log: Mutex<Vec<UndoEntry>>,
}

impl TransactionContext {
    /// A fresh, active transaction with the given id and read timestamp.
    pub fn new(id: TxId, read_ts: u64, read_only: bool) -> Self {
        TransactionContext {
            id,
            read_ts,
            read_only,
            state: Mutex::new(TxState::Active),
            commit_ts: Mutex::new(None),
            undo_log: Mutex::new(Vec::new()),
        }
    }

    /// This transaction's id.
    pub fn id(&self) -> TxId {
        self.id
    }

    /// The snapshot this transaction reads through.
    pub fn read_ts(&self) -> u64 {
        self.read_ts
    }

    /// Whether this handle permits mutation.
    pub fn read_only(&self) -> bool {
        self.read_only
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TxState {
        *self.state.lock()
    }

    /// The commit timestamp, if this transaction has committed.
    pub fn commit_ts(&self) -> Option<u64> {
        *self.commit_ts.lock()
    }

    /// Error out if this transaction isn't `Active`, or if it's read-only
    /// and the caller wants to write.
    pub fn ensure_writable(&self) -> Result<(), LogicalError> {
        match self.state() {
            TxState::Active => {}
            _ => return Err(LogicalError::TransactionTerminated),
        }
        if self.read_only {
            return Err(LogicalError::ReadOnlyTransaction);
        }
        Ok(())
    }

    /// Error out if this transaction isn't `Active` (read path).
    pub fn ensure_active(&self) -> Result<(), LogicalError> {
        match self.state() {
            TxState::Active => Ok(()),
            _ => Err(LogicalError::TransactionTerminated),
        }
    }

    /// Append an undo entry for a write this transaction just applied.
    pub fn push_undo(&self, entry: UndoEntry) {
        self.undo_log.lock().push(entry);
    }

    /// Drop the undo log's most recently pushed entry for `key`, if the
    /// write it recorded collapsed (self-reverting insert/remove) and so
    /// needs no replay on rollback.
    pub fn pop_undo_if_matches(&self, key: Key) {
        let mut log = self.undo_log.lock();
        if matches!(log.last(), Some(e) if e.key == key) {
            log.pop();
        }
    }

    /// Snapshot of the undo log in LIFO (newest-first) order, for a
    /// rollback walk.
    pub fn undo_log_lifo(&self) -> Vec<UndoEntry> {
        let mut log = self.undo_log.lock().clone();
        log.reverse();
        log
    }

    /// Every key this transaction wrote, for the commit pass that stamps
    /// each written version record with the commit timestamp.
    pub fn written_keys(&self) -> Vec<UndoEntry> {
        self.undo_log.lock().clone()
    }

    /// Transition to `Committed` at the given timestamp.
    pub fn mark_committed(&self, commit_ts: u64) {
        *self.state.lock() = TxState::Committed;
        *self.commit_ts.lock() = Some(commit_ts);
    }

    /// Transition to `RolledBack`.
    pub fn mark_rolled_back(&self) {
        *self.state.lock() = TxState::RolledBack;
    }
}
