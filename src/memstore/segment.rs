//! Segment layout and the `update`/`scan`/`rollback` operations a gate
//! dispatches to.
//!
//! The original packs a segment's content and version overlay into a flat
//! qword buffer with four growing offsets (LHS content from the low end,
//! LHS overlay growing inward, RHS overlay growing inward from the high
//! end, RHS content from the high end). There is no on-disk format to
//! preserve here, so this module keeps the same *halves*, *sorted content*,
//! and *version-overlay-with-back-pointer* structure but represents each
//! half with typed Rust collections (a sorted `Vec` of content records and a
//! `BTreeMap` overlay) instead of raw byte offsets. A `used_qwords` counter
//! tracks the same accounting quantity the byte layout would, so the
//! capacity check in `update` and the gate's used-space invariant both hold
//! exactly as described. All of a half's state lives behind one
//! `parking_lot::Mutex`; the caller (`sparse_array`) is expected to already
//! hold the covering gate's write lock before calling any mutating method,
//! so contention on that inner mutex is never real.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{LogicalError, TransactionConflict};
use crate::index::key::Key;
use crate::txn::transaction::{TxId, UndoKind};

/// One vertex's packed content record: its id, whether this is the first
/// occurrence of that id within the chunk, and its inline edge list.
#[derive(Debug, Clone)]
pub struct VertexRecord {
    /// Internal (shifted) vertex id.
    pub id: u64,
    /// Set iff this is the first occurrence of `id` within the chunk.
    pub first: bool,
    /// `(destination, weight)` pairs, sorted ascending by destination.
    pub edges: Vec<(u64, f64)>,
}

impl VertexRecord {
    /// Approximate qword cost: one header qword plus two qwords per edge
    /// (`{destination, weight}`).
    pub fn qwords(&self) -> usize {
        1 + 2 * self.edges.len()
    }
}

/// Effect a version-overlay record applies on top of (or instead of) the
/// content baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionOp {
    /// Insert the vertex header, or insert one edge with the given weight
    /// bits (`f64::to_bits`, so the enum stays `Eq`).
    Insert {
        /// `weight.to_bits()`; `0` for a vertex header.
        weight_bits: u64,
    },
    /// Remove the vertex or edge the key names.
    Remove,
}

/// Which transaction a version record currently belongs to: an in-flight
/// writer (subject to conflict checks and rollback) or a commit timestamp
/// (subject to read-timestamp visibility).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owner {
    /// Tagged pointer to the writer's own transaction state, modelled here
    /// as its id.
    Uncommitted(TxId),
    /// Stamped in at commit time.
    Committed(u64),
}

/// One entry in a key's version chain, newest first.
pub struct VersionNode {
    /// The operation this node applies.
    pub op: VersionOp,
    /// Current owner; mutated in place at commit (`Uncommitted` ->
    /// `Committed`).
    pub owner: Owner,
    /// The record this one superseded, or `None` if this is the key's only
    /// version.
    pub prev: Option<Arc<VersionNode>>,
    /// Saturating chain-length hint (caps at 7, the 3-bit field the
    /// original's `SegmentVersion` bitfield reserves for it) so pruning can
    /// short-circuit a walk on short chains instead of always reaching the
    /// tail.
    pub chain_len_hint: u8,
}

const CHAIN_HINT_MAX: u8 = 7;

impl VersionNode {
    fn new(op: VersionOp, owner: Owner, prev: Option<Arc<VersionNode>>) -> Arc<Self> {
        let chain_len_hint = match &prev {
            None => 1,
            Some(p) => (p.chain_len_hint + 1).min(CHAIN_HINT_MAX),
        };
        Arc::new(VersionNode {
            op,
            owner,
            prev,
            chain_len_hint,
        })
    }

    /// Resolve the value visible to `reader`: `None` if the key doesn't
    /// exist at that point, `Some(weight_bits)` if it does (vertex headers
    /// use a sentinel weight of `0`).
    fn visible_to(self: &Arc<Self>, reader: Reader) -> Option<u64> {
        let mut node = self.clone();
        loop {
            let visible = match (node.owner, reader) {
                (Owner::Uncommitted(owner_tx), Reader::Transaction(reader_tx)) => {
                    owner_tx == reader_tx
                }
                (Owner::Uncommitted(_), Reader::Timestamp(_)) => false,
                // A writer always sees everything already committed; only
                // read-only scans care about a fixed read timestamp.
                (Owner::Committed(_), Reader::Transaction(_)) => true,
                (Owner::Committed(ts), Reader::Timestamp(read_ts)) => ts <= read_ts,
            };
            if visible {
                return match node.op {
                    VersionOp::Insert { weight_bits } => Some(weight_bits),
                    VersionOp::Remove => None,
                };
            }
            match &node.prev {
                Some(p) => node = p.clone(),
                None => return None,
            }
        }
    }
}

/// Who is resolving visibility for a version chain.
#[derive(Debug, Clone, Copy)]
pub enum Reader {
    /// The writing/reading transaction itself: always sees its own
    /// uncommitted writes.
    Transaction(TxId),
    /// A read-only scan resolving against a fixed read timestamp.
    Timestamp(u64),
}

struct HalfState {
    content: Vec<VertexRecord>,
    overlay: std::collections::BTreeMap<Key, Arc<VersionNode>>,
    used_qwords: u64,
}

/// One half (LHS or RHS) of a segment: sorted content plus a version
/// overlay keyed by the same `Key` space.
pub struct SegmentHalf {
    state: Mutex<HalfState>,
    capacity_qwords: u64,
}

impl SegmentHalf {
    fn new(capacity_qwords: u64) -> Self {
        SegmentHalf {
            state: Mutex::new(HalfState {
                content: Vec::new(),
                overlay: std::collections::BTreeMap::new(),
                used_qwords: 0,
            }),
            capacity_qwords,
        }
    }

    /// Qwords currently occupied by content + overlay.
    pub fn used(&self) -> u64 {
        self.state.lock().used_qwords
    }

    fn find_vertex(content: &[VertexRecord], internal_id: u64) -> Option<usize> {
        content.binary_search_by_key(&internal_id, |v| v.id).ok()
    }

    fn content_has(content: &[VertexRecord], key: Key) -> bool {
        match Self::find_vertex(content, key.source) {
            None => false,
            Some(idx) => {
                let v = &content[idx];
                if key.destination == 0 {
                    v.first
                } else {
                    v.edges.binary_search_by_key(&key.destination, |e| e.0).is_ok()
                }
            }
        }
    }

    fn content_weight(content: &[VertexRecord], key: Key) -> Option<f64> {
        let idx = Self::find_vertex(content, key.source)?;
        let v = &content[idx];
        if key.destination == 0 {
            return if v.first { Some(0.0) } else { None };
        }
        v.edges
            .binary_search_by_key(&key.destination, |e| e.0)
            .ok()
            .map(|i| v.edges[i].1)
    }

    pub(crate) fn capacity(&self) -> u64 {
        self.capacity_qwords
    }

    /// Fold every overlay entry whose whole chain predates `high_water_mark`
    /// into `content` (dropping the overlay entry entirely), and return the
    /// remaining content plus whatever overlay entries are still too young
    /// to prune — the rebalancer's "load + prune" step (spec §4.7 step 1).
    pub(crate) fn snapshot_for_rebalance(&self, high_water_mark: u64) -> (Vec<VertexRecord>, Vec<(Key, Arc<VersionNode>)>) {
        let mut state = self.state.lock();
        let mut content = state.content.clone();
        let mut kept = Vec::new();
        let stale_keys: Vec<Key> = state
            .overlay
            .iter()
            .filter(|(_, chain)| chain_fully_stable(chain, high_water_mark))
            .map(|(k, _)| *k)
            .collect();
        for key in stale_keys {
            let chain = state.overlay.remove(&key).unwrap();
            fold_into_content(&mut content, key, chain.op);
        }
        for (key, chain) in state.overlay.iter() {
            kept.push((*key, chain.clone()));
        }
        (content, kept)
    }

    /// Replace this half's content and overlay wholesale — the rebalancer's
    /// "write back" step. `overlay` entries keep their existing chains and
    /// owners; only their back-pointer placement (which segment/half they
    /// live in) changes.
    pub(crate) fn install(&self, content: Vec<VertexRecord>, overlay: Vec<(Key, Arc<VersionNode>)>) {
        let content_qwords: u64 = content.iter().map(|v| v.qwords() as u64).sum();
        let overlay_qwords = overlay.len() as u64 * 2;
        let mut state = self.state.lock();
        state.content = content;
        state.overlay = overlay.into_iter().collect();
        state.used_qwords = content_qwords + overlay_qwords;
    }
}

/// A chain is foldable once every node in it is committed strictly before
/// `high_water_mark`: no active reader's read timestamp can be below any of
/// the chain's commit timestamps, so only the newest (topmost) value is
/// ever observable and the rest of the chain can be discarded.
fn chain_fully_stable(chain: &Arc<VersionNode>, high_water_mark: u64) -> bool {
    let mut node = chain;
    loop {
        match node.owner {
            Owner::Uncommitted(_) => return false,
            Owner::Committed(ts) if ts >= high_water_mark => return false,
            Owner::Committed(_) => {}
        }
        match &node.prev {
            Some(prev) => node = prev,
            None => return true,
        }
    }
}

/// Apply a folded version op directly to the content vector: upsert/remove
/// a vertex header or a single edge of an already-present vertex.
fn fold_into_content(content: &mut Vec<VertexRecord>, key: Key, op: VersionOp) {
    let pos = content.binary_search_by_key(&key.source, |v| v.id);
    if key.destination == 0 {
        match (op, pos) {
            (VersionOp::Insert { .. }, Ok(idx)) => content[idx].first = true,
            (VersionOp::Insert { .. }, Err(idx)) => content.insert(
                idx,
                VertexRecord {
                    id: key.source,
                    first: true,
                    edges: Vec::new(),
                },
            ),
            (VersionOp::Remove, Ok(idx)) => {
                content.remove(idx);
            }
            (VersionOp::Remove, Err(_)) => {}
        }
        return;
    }
    let Ok(idx) = pos else { return };
    let edges = &mut content[idx].edges;
    let epos = edges.binary_search_by_key(&key.destination, |e| e.0);
    match (op, epos) {
        (VersionOp::Insert { weight_bits }, Ok(eidx)) => {
            edges[eidx].1 = f64::from_bits(weight_bits);
        }
        (VersionOp::Insert { weight_bits }, Err(eidx)) => {
            edges.insert(eidx, (key.destination, f64::from_bits(weight_bits)));
        }
        (VersionOp::Remove, Ok(eidx)) => {
            edges.remove(eidx);
        }
        (VersionOp::Remove, Err(_)) => {}
    }
}

/// One segment: a pair of halves, each independently filling from its own
/// end of the logical key range the segment covers.
pub struct Segment {
    pub lhs: SegmentHalf,
    pub rhs: SegmentHalf,
}

impl Segment {
    /// A fresh, empty segment with `capacity_qwords` per half.
    pub fn new(capacity_qwords_per_half: u64) -> Self {
        Segment {
            lhs: SegmentHalf::new(capacity_qwords_per_half),
            rhs: SegmentHalf::new(capacity_qwords_per_half),
        }
    }

    fn half(&self, is_lhs: bool) -> &SegmentHalf {
        if is_lhs {
            &self.lhs
        } else {
            &self.rhs
        }
    }

    /// Total qwords occupied across both halves (content + overlay),
    /// reported to the owning gate's used-space counter.
    pub fn used_qwords(&self) -> u64 {
        self.lhs.used() + self.rhs.used()
    }

    /// Apply an insert/remove of a vertex or edge. Returns `Ok(Applied)` on
    /// success, `Ok(NeedsRebalance)` to request a rebalance (insufficient
    /// overlay room), or an error for logical misuse / a live conflict.
    ///
    /// The half actually written is resolved here rather than taken from
    /// the caller: a rebalance may have folded the key's committed
    /// content into either the LHS or the RHS half, and the
    /// existence/duplicate check below must consult whichever half
    /// actually holds it (or both, for a brand-new key) or it would
    /// silently miss content living in the other half.
    pub fn update(&self, tx: TxId, key: Key, op_insert: Option<f64>) -> Result<UpdateOutcome, UpdateError> {
        let is_lhs = self
            .resident_half(key)
            .unwrap_or_else(|| self.choose_half_for_new_key(key));
        let half = self.half(is_lhs);
        let mut state = half.state.lock();
        let requesting_insert = op_insert.is_some();

        if let Some(existing) = state.overlay.get(&key).cloned() {
            if let Owner::Uncommitted(owner_tx) = existing.owner {
                if owner_tx != tx {
                    return Err(UpdateError::Conflict(TransactionConflict {
                        source: crate::index::key::to_external_vertex(key.source),
                        destination: if key.destination == 0 {
                            0
                        } else {
                            crate::index::key::to_external_vertex(key.destination)
                        },
                    }));
                }
                // Self-reverting collapse: this transaction's own top
                // record, immediately undone.
                let top_is_insert = matches!(existing.op, VersionOp::Insert { .. });
                if requesting_insert != top_is_insert {
                    match existing.prev.clone() {
                        Some(prev) => {
                            state.overlay.insert(key, prev);
                        }
                        None => {
                            state.overlay.remove(&key);
                        }
                    }
                    state.used_qwords = state.used_qwords.saturating_sub(2);
                    return Ok(UpdateOutcome::Collapsed);
                }
            }

            let currently_visible = existing.visible_to(Reader::Transaction(tx)).is_some();
            if currently_visible == requesting_insert {
                return Err(UpdateError::Logical(logical_error_for(key, requesting_insert)));
            }
        } else {
            let visible = SegmentHalf::content_has(&state.content, key);
            if visible == requesting_insert {
                return Err(UpdateError::Logical(logical_error_for(key, requesting_insert)));
            }
        }

        let extra = 2u64; // one overlay record's worth of qwords
        if state.used_qwords + extra > half.capacity_qwords {
            return Ok(UpdateOutcome::NeedsRebalance);
        }

        let op = match op_insert {
            Some(weight) => VersionOp::Insert {
                weight_bits: weight.to_bits(),
            },
            None => VersionOp::Remove,
        };
        let prev = state.overlay.get(&key).cloned();
        let node = VersionNode::new(op, Owner::Uncommitted(tx), prev);
        state.overlay.insert(key, node);
        state.used_qwords += extra;

        let undo_kind = match (op_insert, key.destination == 0) {
            (Some(w), false) => UndoKind::EdgeAdd { weight: w },
            (Some(_), true) => UndoKind::VertexAdd,
            (None, false) => UndoKind::EdgeRemove,
            (None, true) => UndoKind::VertexRemove,
        };
        Ok(UpdateOutcome::Applied { is_lhs, undo_kind })
    }

    /// Reverse one write this transaction made to `key`: pop the chain's
    /// head back to whatever preceded it (or remove the overlay entry
    /// entirely if there was nothing before it).
    pub fn rollback(&self, is_lhs: bool, key: Key, tx: TxId) {
        let half = self.half(is_lhs);
        let mut state = half.state.lock();
        let Some(node) = state.overlay.get(&key).cloned() else {
            return;
        };
        if !matches!(node.owner, Owner::Uncommitted(owner_tx) if owner_tx == tx) {
            return;
        }
        match node.prev.clone() {
            Some(prev) => {
                state.overlay.insert(key, prev);
            }
            None => {
                state.overlay.remove(&key);
            }
        }
        state.used_qwords = state.used_qwords.saturating_sub(2);
    }

    /// Stamp the overlay record this transaction wrote for `key` with its
    /// commit timestamp, turning `Owner::Uncommitted(tx)` into
    /// `Owner::Committed(commit_ts)`.
    pub fn commit(&self, is_lhs: bool, key: Key, tx: TxId, commit_ts: u64) {
        let half = self.half(is_lhs);
        let mut state = half.state.lock();
        if let Some(node) = state.overlay.get(&key) {
            if matches!(node.owner, Owner::Uncommitted(owner_tx) if owner_tx == tx) {
                let stamped = node.clone_with_owner(Owner::Committed(commit_ts));
                state.overlay.insert(key, Arc::new(stamped));
            }
        }
    }

    /// Point lookup: does `key` exist, and if so at what weight (`0.0` for
    /// a vertex header), as visible to `reader`.
    pub fn lookup(&self, is_lhs: bool, key: Key, reader: Reader) -> Option<f64> {
        let half = self.half(is_lhs);
        let state = half.state.lock();
        match state.overlay.get(&key) {
            Some(chain) => chain.visible_to(reader).map(f64::from_bits),
            None => SegmentHalf::content_weight(&state.content, key),
        }
    }

    /// Visibility-aware existence check, used by the writer's "does this
    /// already exist" checks when the caller already knows its own id.
    pub fn exists_for(&self, is_lhs: bool, key: Key, tx: TxId) -> bool {
        self.lookup(is_lhs, key, Reader::Transaction(tx)).is_some()
    }

    /// Walk content merged with the version overlay in ascending key order,
    /// invoking `callback(dest, weight)` for each edge of `source_internal`
    /// visible to `reader`. Vertex-header keys are skipped (callers asking
    /// for edges of a vertex, not its header).
    pub fn scan_vertex_edges(
        &self,
        is_lhs: bool,
        source_internal: u64,
        reader: Reader,
        mut callback: impl FnMut(u64, f64) -> bool,
    ) -> bool {
        let half = self.half(is_lhs);
        let state = half.state.lock();
        let mut seen = std::collections::BTreeMap::<u64, Option<f64>>::new();
        if let Some(idx) = SegmentHalf::find_vertex(&state.content, source_internal) {
            for &(dest, w) in &state.content[idx].edges {
                seen.insert(dest, Some(w));
            }
        }
        let lo = Key::edge(source_internal, 0);
        let hi = Key::edge(source_internal, u64::MAX);
        for (k, chain) in state.overlay.range(lo..=hi) {
            if k.destination == 0 {
                continue;
            }
            let value = chain.visible_to(reader).map(f64::from_bits);
            seen.insert(k.destination, value);
        }
        drop(state);
        for (dest, value) in seen {
            if let Some(weight) = value {
                if !callback(dest, weight) {
                    return false;
                }
            }
        }
        true
    }

    /// Direct, crate-internal access for the rebalancer, which needs to
    /// read and rewrite both halves' raw content wholesale.
    pub(crate) fn halves(&self) -> (&SegmentHalf, &SegmentHalf) {
        (&self.lhs, &self.rhs)
    }

    /// Which half currently holds a live record for `key` — its overlay
    /// takes precedence over content, since an overlay entry is the
    /// newest state; checked on both halves because a rebalance may have
    /// folded the key's content into either one. `None` means `key` is
    /// absent from both (a genuinely new insert).
    fn resident_half(&self, key: Key) -> Option<bool> {
        if self.lhs.state.lock().overlay.contains_key(&key) {
            return Some(true);
        }
        if self.rhs.state.lock().overlay.contains_key(&key) {
            return Some(false);
        }
        if SegmentHalf::content_has(&self.lhs.state.lock().content, key) {
            return Some(true);
        }
        if SegmentHalf::content_has(&self.rhs.state.lock().content, key) {
            return Some(false);
        }
        None
    }

    /// Where a brand-new key should land: the half whose content already
    /// brackets it (LHS holds the lower ids, RHS the upper ids within a
    /// segment, per `redistribute`'s split), falling back to whichever
    /// half has more free room when neither half's content brackets it
    /// (e.g. both still empty, just after a split).
    fn choose_half_for_new_key(&self, key: Key) -> bool {
        let lhs_state = self.lhs.state.lock();
        let rhs_state = self.rhs.state.lock();
        if let Some(rhs_min) = rhs_state.content.first() {
            if key.source >= rhs_min.id {
                return false;
            }
        }
        if let Some(lhs_max) = lhs_state.content.last() {
            if key.source <= lhs_max.id {
                return true;
            }
        }
        lhs_state.used_qwords <= rhs_state.used_qwords
    }
}

impl VersionNode {
    fn clone_with_owner(&self, owner: Owner) -> VersionNode {
        VersionNode {
            op: self.op,
            owner,
            prev: self.prev.clone(),
            chain_len_hint: self.chain_len_hint,
        }
    }
}

fn logical_error_for(key: Key, requesting_insert: bool) -> LogicalError {
    let source = crate::index::key::to_external_vertex(key.source);
    if key.destination == 0 {
        if requesting_insert {
            LogicalError::VertexAlreadyExists(source)
        } else {
            LogicalError::VertexNotFound(source)
        }
    } else {
        let destination = crate::index::key::to_external_vertex(key.destination);
        if requesting_insert {
            LogicalError::EdgeAlreadyExists(source, destination)
        } else {
            LogicalError::EdgeNotFound(source, destination)
        }
    }
}

/// Result of a successful `Segment::update` call.
#[derive(Debug, Clone, Copy)]
pub enum UpdateOutcome {
    /// The write applied; the undo kind the caller should push onto the
    /// transaction's undo log.
    Applied {
        /// Which half the version record actually landed in, so the
        /// caller's undo entry points rollback/commit at the right place.
        is_lhs: bool,
        /// What kind of pre-image the transaction's undo entry should
        /// record.
        undo_kind: UndoKind,
    },
    /// An insert-then-remove (or vice versa) by the same transaction
    /// collapsed the chain back to its pre-transaction state; no undo
    /// entry is needed.
    Collapsed,
    /// The overlay has no room; the caller must trigger a rebalance and
    /// retry.
    NeedsRebalance,
}

/// Failure from `Segment::update`.
#[derive(Debug, Clone)]
pub enum UpdateError {
    /// Static misuse (duplicate/missing entity).
    Logical(LogicalError),
    /// A live writer from another transaction owns this key.
    Conflict(TransactionConflict),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_v(id: u64) -> Key {
        Key::vertex_header(id)
    }

    #[test]
    fn insert_then_duplicate_insert_is_logical_error() {
        let seg = Segment::new(4096);
        let k = key_v(10);
        let out = seg.update(1, k, Some(0.0)).unwrap();
        assert!(matches!(out, UpdateOutcome::Applied { .. }));
        seg.commit(true, k, 1, 100);
        let err = seg.update(2, k, Some(0.0)).unwrap_err();
        assert!(matches!(
            err,
            UpdateError::Logical(LogicalError::VertexAlreadyExists(10))
        ));
    }

    #[test]
    fn concurrent_writers_conflict() {
        let seg = Segment::new(4096);
        let k = key_v(5);
        seg.update(1, k, Some(0.0)).unwrap();
        let err = seg.update(2, k, Some(0.0)).unwrap_err();
        assert!(matches!(err, UpdateError::Conflict(_)));
    }

    #[test]
    fn self_revert_collapses() {
        let seg = Segment::new(4096);
        let k = Key::edge(1, 2);
        seg.update(1, k, Some(1.0)).unwrap();
        let out = seg.update(1, k, None).unwrap();
        assert!(matches!(out, UpdateOutcome::Collapsed));
        assert_eq!(seg.lookup(true, k, Reader::Transaction(1)), None);
    }

    #[test]
    fn rollback_restores_prior_state() {
        let seg = Segment::new(4096);
        let k = key_v(7);
        seg.update(1, k, Some(0.0)).unwrap();
        assert_eq!(seg.lookup(true, k, Reader::Transaction(1)), Some(0.0));
        seg.rollback(true, k, 1);
        assert_eq!(seg.lookup(true, k, Reader::Transaction(1)), None);
    }
}
