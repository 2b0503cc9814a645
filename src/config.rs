//! Store configuration and the chunk memory-layout solver.
//!
//! Geometry is fixed at store creation: given a
//! memory budget `B` for a chunk, a fixed number of segments per gate `S`,
//! and a target qwords-per-segment `Q`, the number of gates per chunk `G` is
//! solved so that `sizeof(Chunk) + G·(gate_header(S) + S·(segment_header +
//! 8·Q)) <= B`, and `Q` is then rounded down so the bound holds with equality
//! modulo 8 (the remaining slack, if any, is wasted chunk padding rather than
//! left as a partially-addressable qword).

use std::time::Duration;

/// Fixed chunk size: 2 MiB, aligned.
pub const CHUNK_SIZE_BYTES: usize = 2 * 1024 * 1024;

/// Fixed POD header carried by every `Chunk` (latch + writer count + gate
/// count + padding) — see `memstore::chunk::ChunkHeader`.
const CHUNK_HEADER_BYTES: usize = 64;

/// Fixed POD header carried by every `Gate` before its `S - 1` separator
/// keys and 2 fence keys (16 bytes each) — see `memstore::gate::GateHeader`.
const GATE_FIXED_HEADER_BYTES: usize = 48;
const KEY_BYTES: usize = 16;

/// Fixed POD header carried by every `Segment` (four region offsets) — see
/// `memstore::segment::SegmentHeader`.
const SEGMENT_HEADER_BYTES: usize = 8;

fn gate_header_bytes(segments_per_gate: usize) -> usize {
    GATE_FIXED_HEADER_BYTES + (segments_per_gate.saturating_sub(1)) * KEY_BYTES + 2 * KEY_BYTES
}

/// Tunable knobs for a [`crate::Store`].
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Whether edges are stored symmetrically (undirected) or once per
    /// direction`).
    pub directed: bool,
    /// Segments covered by each gate (`S`).
    pub segments_per_gate: usize,
    /// Capacity, in 8-byte words, of a single segment's packed buffer (`Q`).
    pub qwords_per_segment: usize,
    /// Gates per chunk (`G`), solved from the memory budget.
    pub gates_per_chunk: usize,
    /// How often the background merger service ticks.
    pub merger_tick_interval: Duration,
    /// How often the epoch GC sweeps its retirement queue (default 1s).
    pub gc_tick_interval: Duration,
}

impl StoreConfig {
    /// Solve the chunk geometry for a memory budget per chunk, a fixed
    /// segments-per-gate, and a *target* qwords-per-segment (rounded down to
    /// whatever actually fits once the gate count is chosen).
    pub fn solve(chunk_budget_bytes: usize, segments_per_gate: usize, target_qwords_per_segment: usize) -> Self {
        assert!(segments_per_gate > 0, "segments_per_gate must be positive");
        assert!(target_qwords_per_segment > 0, "qwords_per_segment must be positive");

        let gate_header = gate_header_bytes(segments_per_gate);
        let per_segment_fixed = SEGMENT_HEADER_BYTES;
        let available = chunk_budget_bytes.saturating_sub(CHUNK_HEADER_BYTES);

        let bytes_per_gate_at_target = gate_header
            + segments_per_gate * (per_segment_fixed + 8 * target_qwords_per_segment);
        let gates_per_chunk = (available / bytes_per_gate_at_target.max(1)).max(1);

        // Re-derive Q for the chosen G: how many qwords actually fit once the
        // fixed per-gate/per-segment headers are subtracted, rounded down.
        let fixed_total = gates_per_chunk * (gate_header + segments_per_gate * per_segment_fixed);
        let remaining = available.saturating_sub(fixed_total);
        let qwords_per_segment = (remaining / (8 * gates_per_chunk * segments_per_gate).max(1))
            .max(1);

        StoreConfig {
            directed: false,
            segments_per_gate,
            qwords_per_segment,
            gates_per_chunk,
            merger_tick_interval: Duration::from_secs(1),
            gc_tick_interval: Duration::from_secs(1),
        }
    }

    /// A small-footprint preset: 2 MiB chunks, 4 segments per gate, an
    /// initial target of 512 qwords per segment.
    pub fn default_undirected() -> Self {
        let mut cfg = Self::solve(CHUNK_SIZE_BYTES, 4, 512);
        cfg.directed = false;
        cfg
    }

    /// Same geometry, with the symmetry toggle flipped for a directed graph.
    pub fn default_directed() -> Self {
        let mut cfg = Self::default_undirected();
        cfg.directed = true;
        cfg
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::default_undirected()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solve_respects_budget() {
        let cfg = StoreConfig::solve(CHUNK_SIZE_BYTES, 4, 512);
        let gate_header = gate_header_bytes(cfg.segments_per_gate);
        let per_gate = gate_header
            + cfg.segments_per_gate * (SEGMENT_HEADER_BYTES + 8 * cfg.qwords_per_segment);
        assert!(cfg.gates_per_chunk * per_gate + CHUNK_HEADER_BYTES <= CHUNK_SIZE_BYTES);
        assert!(cfg.gates_per_chunk >= 1);
    }

    #[test]
    fn default_presets_toggle_directed_only() {
        let undirected = StoreConfig::default_undirected();
        let directed = StoreConfig::default_directed();
        assert!(!undirected.directed);
        assert!(directed.directed);
        assert_eq!(undirected.gates_per_chunk, directed.gates_per_chunk);
    }
}
