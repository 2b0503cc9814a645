//! Calibrator-tree rebalancing: prune stale versions, redistribute a
//! window of segments, and split or merge chunks when a gate's single
//! window (this implementation keeps one populated gate per chunk, see
//! `DESIGN.md`) over- or under-fills.
//!
//! The full calibrator-tree window search (spec §4.7: windows of length
//! 1, 2, 4, ... bracketed by interpolated density thresholds) collapses
//! here to two cases because a chunk carries exactly one live gate: a
//! *local* rebalance redistributes that gate's own segments, and, if the
//! gate is still over the split threshold afterwards, a *global* rebalance
//! splits the chunk in two. The interpolated `[ρ_h, τ_h]` thresholds
//! still gate the decision; they just don't need a window-size search
//! since there's only one window to consider.

use std::sync::Arc;

use tracing::debug;

use crate::index::key::Key;
use crate::memstore::chunk::Chunk;
use crate::memstore::gate::Gate;
use crate::memstore::segment::{Segment, VersionNode, VertexRecord};
use crate::memstore::sparse_array::MemStore;

/// Leaf-level fill thresholds (`ρ₀`, `τ₀`) from spec §4.7's calibrator
/// tree; a single-gate chunk is always at tree height 0.
const LEAF_LOW_WATERMARK: f64 = 0.5;
const LEAF_HIGH_WATERMARK: f64 = 1.0;

/// Merge threshold: the merger service combines two adjacent chunks once
/// both sit below this fraction of a single chunk's total capacity.
pub const MERGE_FILL_THRESHOLD: f64 = 0.6;

pub(crate) fn gate_capacity_qwords(gate: &Gate) -> u64 {
    gate.segments().iter().map(|s| s.lhs.capacity() + s.rhs.capacity()).sum()
}

fn fill_ratio(gate: &Gate) -> f64 {
    let cap = gate_capacity_qwords(gate).max(1);
    gate.used_qwords() as f64 / cap as f64
}

/// Load every half's content + kept overlay across `segments`, pruning
/// overlay chains fully older than `high_water_mark` into `content` along
/// the way (spec §4.7 step 1).
fn load_and_prune(segments: &[Segment], high_water_mark: u64) -> (Vec<VertexRecord>, Vec<(Key, Arc<VersionNode>)>) {
    let mut content = Vec::new();
    let mut overlay = Vec::new();
    for segment in segments {
        let (lhs_content, lhs_overlay) = segment.lhs.snapshot_for_rebalance(high_water_mark);
        let (rhs_content, rhs_overlay) = segment.rhs.snapshot_for_rebalance(high_water_mark);
        content.extend(lhs_content);
        content.extend(rhs_content);
        overlay.extend(lhs_overlay);
        overlay.extend(rhs_overlay);
    }
    content.sort_by_key(|v| v.id);
    (content, overlay)
}

/// Split `content`/`overlay` evenly (by vertex count) across `segments`,
/// half to each segment's LHS and half to its RHS (spec §4.7 step 2-3),
/// and return the new separator keys (`segments.len() - 1` of them).
fn redistribute(segments: &[Segment], content: Vec<VertexRecord>, mut overlay: Vec<(Key, Arc<VersionNode>)>) -> Vec<Key> {
    let seg_count = segments.len().max(1);
    let n = content.len();
    let base = n / seg_count;
    let rem = n % seg_count;

    let mut groups: Vec<Vec<VertexRecord>> = Vec::with_capacity(seg_count);
    let mut iter = content.into_iter();
    for i in 0..seg_count {
        let take = base + if i < rem { 1 } else { 0 };
        groups.push((&mut iter).take(take).collect());
    }

    let boundaries: Vec<Option<u64>> = groups.iter().map(|g| g.first().map(|v| v.id)).collect();
    overlay.sort_by_key(|(k, _)| *k);

    let mut overlay_by_group: Vec<Vec<(Key, Arc<VersionNode>)>> = vec![Vec::new(); seg_count];
    for entry in overlay {
        let idx = group_index_for(&boundaries, entry.0.source);
        overlay_by_group[idx].push(entry);
    }

    for (i, (group, group_overlay)) in groups.into_iter().zip(overlay_by_group.into_iter()).enumerate() {
        let mid_id = group.get(group.len() / 2).map(|v| v.id);
        let split_at = group.len() / 2;
        let mut lhs_content = group;
        let rhs_content = lhs_content.split_off(split_at);

        let mut lhs_overlay = Vec::new();
        let mut rhs_overlay = Vec::new();
        for entry in group_overlay {
            match mid_id {
                Some(mid) if entry.0.source >= mid => rhs_overlay.push(entry),
                _ => lhs_overlay.push(entry),
            }
        }
        segments[i].lhs.install(lhs_content, lhs_overlay);
        segments[i].rhs.install(rhs_content, rhs_overlay);
    }

    boundaries[1..]
        .iter()
        .map(|b| Key::vertex_header(b.unwrap_or(u64::MAX)))
        .collect()
}

fn group_index_for(boundaries: &[Option<u64>], source_id: u64) -> usize {
    let mut idx = 0;
    for (i, boundary) in boundaries.iter().enumerate().skip(1) {
        if let Some(b) = boundary {
            if source_id >= *b {
                idx = i;
            }
        }
    }
    idx
}

/// Local (gate-scoped) rebalance: reload, prune, and evenly redistribute a
/// gate's own segments. Caller must already hold the gate in `Rebalance`
/// mode.
pub fn rebalance_gate_local(gate: &Gate, high_water_mark: u64) {
    let (content, overlay) = load_and_prune(gate.segments(), high_water_mark);
    let separators = redistribute(gate.segments(), content, overlay);
    gate.set_separators(separators);
    gate.recompute_used_qwords();
    debug!(fill = fill_ratio(gate), "rebalanced gate in place");
}

/// Outcome of `maybe_rebalance`: whether (and how) the gate's geometry
/// changed, for the caller to decide whether to retry its write or
/// surface a resource-exhaustion error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebalanceOutcome {
    /// Rebalanced in place; the gate now has room.
    Local,
    /// The chunk was split; the caller must re-resolve the key through the
    /// index (it may now live in a different chunk).
    Split,
}

/// Entry point from the write path: a segment reported `NeedsRebalance`.
/// Performs a local rebalance first; if the gate is still above the split
/// threshold, splits the chunk. Caller must not be holding the gate's read
/// or write lock (only the index resolution that led here).
pub fn maybe_rebalance(store: &MemStore, chunk: &Arc<Chunk>, gate_id: u16) -> RebalanceOutcome {
    let hwm = store.high_water_mark();
    let gate = &chunk.gates()[gate_id as usize];
    {
        let _guard = gate.acquire_rebalance();
        rebalance_gate_local(gate, hwm);
        if fill_ratio(gate) <= LEAF_HIGH_WATERMARK {
            return RebalanceOutcome::Local;
        }
    }
    split_chunk(store, chunk, gate_id);
    RebalanceOutcome::Split
}

/// Split `chunk`'s single populated gate into two chunks of roughly equal
/// vertex count (spec §4.7: "allocating a sibling chunk and distributing
/// half the content to each"). Patches the ART with the new chunk's
/// low-fence entry and narrows the original chunk's high fence.
pub fn split_chunk(store: &MemStore, chunk: &Arc<Chunk>, gate_id: u16) {
    let _chunk_lock = chunk.acquire_rebalance_lock();
    let gate = &chunk.gates()[gate_id as usize];
    let _gate_guard = gate.acquire_rebalance();

    let hwm = store.high_water_mark();
    let (mut content, mut overlay) = load_and_prune(gate.segments(), hwm);
    if content.len() < 2 {
        // Nothing meaningful to split; leave it overfull rather than
        // produce a degenerate empty sibling.
        let separators = redistribute(gate.segments(), content, overlay);
        gate.set_separators(separators);
        gate.recompute_used_qwords();
        return;
    }
    let split_at = content.len() / 2;
    let upper_content = content.split_off(split_at);
    let median_id = upper_content[0].id;
    let median_key = Key::vertex_header(median_id);

    let mut upper_overlay = Vec::new();
    let mut lower_overlay = Vec::new();
    overlay.drain(..).for_each(|entry| {
        if entry.0.source >= median_id {
            upper_overlay.push(entry);
        } else {
            lower_overlay.push(entry);
        }
    });

    let (_old_low, old_high) = gate.fences();
    gate.set_fences(_old_low, median_key);
    let lower_separators = redistribute(gate.segments(), content, lower_overlay);
    gate.set_separators(lower_separators);
    gate.recompute_used_qwords();

    let new_chunk = store.allocate_sibling_chunk(median_key, old_high);
    let new_gate = &new_chunk.gates()[0];
    let upper_separators = redistribute(new_gate.segments(), upper_content, upper_overlay);
    new_gate.set_separators(upper_separators);
    new_gate.recompute_used_qwords();

    store.register_chunk(new_chunk.clone());
    store.index_insert(median_key, new_chunk.id, 0);
    debug!(old_chunk = chunk.id, new_chunk = new_chunk.id, split_key = ?median_key, "split chunk");
}

/// Merge `right` into `left` (spec §4.8): combine both chunks' single
/// gate's content into `left`'s gate, widen `left`'s high fence to
/// `right`'s, remove the ART entry that pointed at `right`, and hand
/// `right` to the epoch GC. Caller (the merger service) has already
/// confirmed both chunks are under the merge fill threshold.
pub fn merge_chunks(store: &MemStore, left: &Arc<Chunk>, right: &Arc<Chunk>) {
    let left_lock = left.acquire_rebalance_lock();
    let right_lock = right.acquire_rebalance_lock();
    let left_gate = &left.gates()[0];
    let right_gate = &right.gates()[0];
    let left_guard = left_gate.acquire_rebalance();
    let right_guard = right_gate.acquire_rebalance();

    let hwm = store.high_water_mark();
    let (mut content, mut overlay) = load_and_prune(left_gate.segments(), hwm);
    let (right_content, right_overlay) = load_and_prune(right_gate.segments(), hwm);
    content.extend(right_content);
    content.sort_by_key(|v| v.id);
    overlay.extend(right_overlay);

    let (left_low, _) = left_gate.fences();
    let (right_low, right_high) = right_gate.fences();
    left_gate.set_fences(left_low, right_high);
    let separators = redistribute(left_gate.segments(), content, overlay);
    left_gate.set_separators(separators);
    left_gate.recompute_used_qwords();

    right_gate.invalidate();
    store.index_remove(right_low);
    store.retire_chunk(right.clone());

    drop(right_guard);
    drop(left_guard);
    drop(right_lock);
    drop(left_lock);
    debug!(kept = left.id, merged_away = right.id, "merged chunks");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memstore::gate::Gate;
    use crate::memstore::segment::{Reader, Segment, UpdateOutcome};

    fn test_gate(segments: usize, cap: u64) -> Gate {
        let segs: Vec<Segment> = (0..segments).map(|_| Segment::new(cap)).collect();
        Gate::new(0, segs, Key::min(), Key::max(), vec![Key::max(); segments - 1])
    }

    #[test]
    fn rebalance_redistributes_and_keeps_lookup() {
        let gate = test_gate(4, 4096);
        for v in 0u64..64 {
            let key = Key::vertex_header(v);
            let idx = gate.find_segment(key);
            let outcome = gate.segments()[idx].update(1, key, Some(0.0)).unwrap();
            let is_lhs = matches!(outcome, UpdateOutcome::Applied { is_lhs: true, .. });
            gate.segments()[idx].commit(is_lhs, key, 1, 2);
        }
        rebalance_gate_local(&gate, 1000);
        for v in 0u64..64 {
            let key = Key::vertex_header(v);
            let idx = gate.find_segment(key);
            assert_eq!(
                gate.segments()[idx]
                    .lookup(true, key, Reader::Timestamp(1000))
                    .or_else(|| gate.segments()[idx].lookup(false, key, Reader::Timestamp(1000))),
                Some(0.0),
                "vertex {v} lost after rebalance"
            );
        }
    }
}
