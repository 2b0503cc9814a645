//! `TxHandle`: the public read/write surface a caller drives a
//! transaction through.
//!
//! Every mutation is expressed as one or two point writes against the
//! memstore (a vertex touches one key, an undirected edge touches two —
//! `(u, v)` and `(v, u)` — applied in sequence with the second rolled
//! back if it fails, so an edge never ends up inserted in only one
//! direction). Reads go straight to the memstore using the transaction's
//! own id (so it sees its own uncommitted writes) or, for a read-only
//! handle, its fixed read timestamp.

use crate::error::{GraphError, LogicalError, Result};
use crate::index::key::{to_external_vertex, to_internal_vertex, Key};
use crate::memstore::segment::Reader;
use crate::store::Store;
use crate::txn::transaction::{TransactionContext, TxState};

/// An open transaction against a [`Store`].
///
/// Must be finished with [`TxHandle::commit`] or [`TxHandle::rollback`];
/// dropping one still active rolls it back automatically.
pub struct TxHandle<'s> {
    store: &'s Store,
    ctx: TransactionContext,
    finished: bool,
    vertex_delta: i64,
    edge_delta: i64,
}

impl<'s> TxHandle<'s> {
    pub(crate) fn new(store: &'s Store, ctx: TransactionContext) -> Self {
        TxHandle {
            store,
            ctx,
            finished: false,
            vertex_delta: 0,
            edge_delta: 0,
        }
    }

    fn reader(&self) -> Reader {
        if self.ctx.read_only() {
            Reader::Timestamp(self.ctx.read_ts())
        } else {
            Reader::Transaction(self.ctx.id())
        }
    }

    /// Insert a new vertex. Errors if it already exists.
    pub fn insert_vertex(&mut self, external_id: u64) -> Result<()> {
        self.ctx.ensure_writable()?;
        let internal = to_internal_vertex(external_id)?;
        self.store.memstore.write_key(&self.ctx, Key::vertex_header(internal), Some(0.0))?;
        self.vertex_delta += 1;
        Ok(())
    }

    /// Remove a vertex and every edge touching it (both directions, for
    /// an undirected store). Errors if the vertex doesn't exist.
    pub fn remove_vertex(&mut self, external_id: u64) -> Result<()> {
        self.ctx.ensure_writable()?;
        let internal = to_internal_vertex(external_id)?;
        let header = Key::vertex_header(internal);
        if self.store.memstore.lookup_key(header, self.reader()).is_none() {
            return Err(GraphError::Logical(LogicalError::VertexNotFound(external_id)));
        }

        let mut outgoing = Vec::new();
        self.store.memstore.scan_vertex_edges(internal, self.reader(), |dest, _| {
            outgoing.push(dest);
            true
        });
        for dest in outgoing {
            self.store.memstore.write_key(&self.ctx, Key::edge(internal, dest), None)?;
            self.edge_delta -= 1;
            if !self.store.config.directed {
                // Best-effort: only clear the reverse edge if it's actually
                // there (it might already have been removed by a prior call
                // touching the same pair from the other endpoint).
                if self.store.memstore.lookup_key(Key::edge(dest, internal), self.reader()).is_some() {
                    let _ = self.store.memstore.write_key(&self.ctx, Key::edge(dest, internal), None);
                }
            }
        }

        self.store.memstore.write_key(&self.ctx, header, None)?;
        self.vertex_delta -= 1;
        Ok(())
    }

    /// Whether `external_id` currently exists, as visible to this
    /// transaction.
    pub fn has_vertex(&self, external_id: u64) -> bool {
        let Ok(internal) = to_internal_vertex(external_id) else {
            return false;
        };
        self.store.memstore.lookup_key(Key::vertex_header(internal), self.reader()).is_some()
    }

    /// Number of outgoing edges from `external_id`, or `0` if it doesn't
    /// exist.
    pub fn degree(&self, external_id: u64) -> u64 {
        let Ok(internal) = to_internal_vertex(external_id) else {
            return 0;
        };
        let mut count = 0u64;
        self.store.memstore.scan_vertex_edges(internal, self.reader(), |_, _| {
            count += 1;
            true
        });
        count
    }

    /// Insert an edge between two already-present vertices. In an
    /// undirected store this inserts both `(source, dest)` and
    /// `(dest, source)`; if the second insert fails (e.g. it already
    /// exists the other way around, which shouldn't happen but is
    /// checked rather than assumed) the first is rolled back so the edge
    /// never ends up inserted in only one direction.
    pub fn insert_edge(&mut self, source: u64, destination: u64, weight: f64) -> Result<()> {
        self.ctx.ensure_writable()?;
        let src = to_internal_vertex(source)?;
        let dst = to_internal_vertex(destination)?;
        if self.store.memstore.lookup_key(Key::vertex_header(src), self.reader()).is_none() {
            return Err(GraphError::Logical(LogicalError::VertexNotFound(source)));
        }
        if self.store.memstore.lookup_key(Key::vertex_header(dst), self.reader()).is_none() {
            return Err(GraphError::Logical(LogicalError::VertexNotFound(destination)));
        }

        self.store.memstore.write_key(&self.ctx, Key::edge(src, dst), Some(weight))?;
        if !self.store.config.directed && src != dst {
            if let Err(e) = self.store.memstore.write_key(&self.ctx, Key::edge(dst, src), Some(weight)) {
                self.store.memstore.write_key(&self.ctx, Key::edge(src, dst), None).ok();
                return Err(e);
            }
        }
        self.edge_delta += 1;
        Ok(())
    }

    /// Remove an edge. In an undirected store this removes both
    /// directions.
    pub fn remove_edge(&mut self, source: u64, destination: u64) -> Result<()> {
        self.ctx.ensure_writable()?;
        let src = to_internal_vertex(source)?;
        let dst = to_internal_vertex(destination)?;
        self.store.memstore.write_key(&self.ctx, Key::edge(src, dst), None)?;
        if !self.store.config.directed && src != dst {
            if let Err(e) = self.store.memstore.write_key(&self.ctx, Key::edge(dst, src), None) {
                self.store.memstore.write_key(&self.ctx, Key::edge(src, dst), Some(0.0)).ok();
                return Err(e);
            }
        }
        self.edge_delta -= 1;
        Ok(())
    }

    /// Whether an edge `source -> destination` currently exists.
    pub fn has_edge(&self, source: u64, destination: u64) -> bool {
        self.get_weight(source, destination).is_some()
    }

    /// The weight of edge `source -> destination`, if it exists.
    pub fn get_weight(&self, source: u64, destination: u64) -> Option<f64> {
        let src = to_internal_vertex(source).ok()?;
        let dst = to_internal_vertex(destination).ok()?;
        self.store.memstore.lookup_key(Key::edge(src, dst), self.reader())
    }

    /// Walk every outgoing edge of `source`, invoking `callback(dest,
    /// weight)` for each; stops early if `callback` returns `false`.
    pub fn scan_out(&self, source: u64, mut callback: impl FnMut(u64, f64) -> bool) {
        let Ok(internal) = to_internal_vertex(source) else {
            return;
        };
        self.store.memstore.scan_vertex_edges(internal, self.reader(), |dest, weight| {
            callback(to_external_vertex(dest), weight)
        });
    }

    /// Approximate vertex count, adjusted for this transaction's own
    /// not-yet-committed writes.
    pub fn num_vertices(&self) -> u64 {
        (self.store.vertex_count.load(std::sync::atomic::Ordering::Acquire) + self.vertex_delta).max(0) as u64
    }

    /// Approximate edge count, adjusted for this transaction's own
    /// not-yet-committed writes.
    pub fn num_edges(&self) -> u64 {
        (self.store.edge_count.load(std::sync::atomic::Ordering::Acquire) + self.edge_delta).max(0) as u64
    }

    /// Commit this transaction: stamp every written version record with
    /// a fresh commit timestamp and make the writes visible to readers
    /// whose read timestamp is at least that high.
    pub fn commit(mut self) -> Result<()> {
        self.ctx.ensure_active()?;
        if !self.ctx.read_only() {
            let commit_ts = self.store.global.next_timestamp();
            self.store.memstore.commit_writes(&self.ctx, commit_ts);
            self.store.vertex_count.fetch_add(self.vertex_delta, std::sync::atomic::Ordering::AcqRel);
            self.store.edge_count.fetch_add(self.edge_delta, std::sync::atomic::Ordering::AcqRel);
            self.ctx.mark_committed(commit_ts);
        } else {
            self.ctx.mark_committed(self.ctx.read_ts());
        }
        self.finish();
        Ok(())
    }

    /// Roll back every write this transaction made.
    pub fn rollback(mut self) {
        if self.ctx.state() == TxState::Active {
            self.store.memstore.rollback_writes(&self.ctx);
            self.ctx.mark_rolled_back();
        }
        self.finish();
    }

    fn finish(&mut self) {
        if !self.finished {
            self.store.end_transaction(self.ctx.read_ts());
            self.finished = true;
        }
    }
}

impl Drop for TxHandle<'_> {
    fn drop(&mut self) {
        if self.ctx.state() == TxState::Active {
            self.store.memstore.rollback_writes(&self.ctx);
            self.ctx.mark_rolled_back();
        }
        self.finish();
    }
}
