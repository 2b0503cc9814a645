//! Adaptive Radix Trie over 16-byte keys.
//!
//! Node kinds `N4`/`N16`/`N48`/`N256` grow and shrink at the standard
//! capacity thresholds. Each inner node carries a compressed prefix (the key
//! bytes common to every key under it that haven't yet been dispatched on).
//! Leaves are a distinct `NodeData::Leaf` variant rather than a
//! pointer-tagged leaf (the original sets the MSB of a raw node pointer to
//! distinguish a leaf from an inner node; Rust's enum discriminant gives the
//! same one-bit distinction without reaching for an unsafe tagged pointer).
//!
//! Concurrency follows optimistic lock coupling: every node carries an
//! [`OptimisticLatch`]. Readers (`find_exact`, `find_less_or_equal`) read a
//! node's version, read its data through a coarse `Mutex` snapshot, and
//! validate the version again before trusting what they read — on mismatch
//! they return `Abort::Retry` and the caller restarts from the root.
//! Writers (`insert`, `remove`) upgrade the latches of the node being
//! modified (and, when restructuring, its parent) before mutating, then
//! unlock to bump the version, invalidating any reader that was mid-scan.
//! All modifications that discover a stale version anywhere in the path
//! abort and restart from the root.

use std::sync::Arc;

use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::error::{Abort, AbortResult};
use crate::index::key::Key;
use crate::primitives::epoch::EpochGarbageCollector;
use crate::primitives::latch::OptimisticLatch;

/// `{chunk, gate}` entry a leaf maps its key to, packed into 64 bits (48 bits
/// of chunk id, 16 bits of gate id) — the exact split named in
/// `sparse_array.hpp`'s `IndexEntry`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    /// Opaque handle into the store's chunk table (low 48 bits significant).
    pub chunk_id: u64,
    /// Gate index within the chunk.
    pub gate_id: u16,
}

impl IndexEntry {
    const CHUNK_MASK: u64 = (1u64 << 48) - 1;

    /// Pack into the canonical 48+16 bit layout.
    pub fn pack(self) -> u64 {
        ((self.chunk_id & Self::CHUNK_MASK) << 16) | self.gate_id as u64
    }

    /// Unpack from the canonical 48+16 bit layout.
    pub fn unpack(word: u64) -> Self {
        IndexEntry {
            chunk_id: (word >> 16) & Self::CHUNK_MASK,
            gate_id: (word & 0xFFFF) as u16,
        }
    }
}

const NODE4_CAP: usize = 4;
const NODE16_CAP: usize = 16;
const NODE48_CAP: usize = 48;
const NODE256_CAP: usize = 256;

/// Inner node storage, one variant per ART node kind.
enum NodeKind {
    N4 {
        keys: SmallVec<[u8; NODE4_CAP]>,
        children: SmallVec<[Arc<ArtNode>; NODE4_CAP]>,
    },
    N16 {
        keys: SmallVec<[u8; NODE16_CAP]>,
        children: SmallVec<[Arc<ArtNode>; NODE16_CAP]>,
    },
    N48 {
        /// `child_index[byte] = 1 + index into children`, `0` meaning absent.
        child_index: Box<[u8; 256]>,
        children: Vec<Option<Arc<ArtNode>>>,
    },
    N256 {
        children: Box<[Option<Arc<ArtNode>>; 256]>,
    },
}

impl NodeKind {
    fn new_n4() -> Self {
        NodeKind::N4 {
            keys: SmallVec::new(),
            children: SmallVec::new(),
        }
    }

    fn len(&self) -> usize {
        match self {
            NodeKind::N4 { keys, .. } => keys.len(),
            NodeKind::N16 { keys, .. } => keys.len(),
            NodeKind::N48 { children, .. } => children.iter().filter(|c| c.is_some()).count(),
            NodeKind::N256 { children } => children.iter().filter(|c| c.is_some()).count(),
        }
    }

    fn get(&self, byte: u8) -> Option<Arc<ArtNode>> {
        match self {
            NodeKind::N4 { keys, children } | NodeKind::N16 { keys, children } => keys
                .iter()
                .position(|&k| k == byte)
                .map(|i| children[i].clone()),
            NodeKind::N48 { child_index, children } => {
                let slot = child_index[byte as usize];
                if slot == 0 {
                    None
                } else {
                    children[(slot - 1) as usize].clone()
                }
            }
            NodeKind::N256 { children } => children[byte as usize].clone(),
        }
    }

    /// Greatest existing child byte strictly less than `byte`.
    fn predecessor(&self, byte: u8) -> Option<(u8, Arc<ArtNode>)> {
        self.entries()
            .into_iter()
            .filter(|(b, _)| *b < byte)
            .max_by_key(|(b, _)| *b)
    }

    /// Greatest existing child overall.
    fn max_entry(&self) -> Option<(u8, Arc<ArtNode>)> {
        self.entries().into_iter().max_by_key(|(b, _)| *b)
    }

    fn entries(&self) -> Vec<(u8, Arc<ArtNode>)> {
        match self {
            NodeKind::N4 { keys, children } | NodeKind::N16 { keys, children } => keys
                .iter()
                .cloned()
                .zip(children.iter().cloned())
                .collect(),
            NodeKind::N48 { child_index, children } => child_index
                .iter()
                .enumerate()
                .filter(|(_, &slot)| slot != 0)
                .filter_map(|(byte, &slot)| {
                    children[(slot - 1) as usize]
                        .clone()
                        .map(|c| (byte as u8, c))
                })
                .collect(),
            NodeKind::N256 { children } => children
                .iter()
                .enumerate()
                .filter_map(|(byte, c)| c.clone().map(|c| (byte as u8, c)))
                .collect(),
        }
    }

    fn insert_child(&mut self, byte: u8, child: Arc<ArtNode>) -> NodeKind {
        match self {
            NodeKind::N4 { keys, children } => {
                if keys.len() < NODE4_CAP {
                    keys.push(byte);
                    children.push(child);
                    return std::mem::replace(self, NodeKind::new_n4());
                }
                let mut grown = NodeKind::N16 {
                    keys: keys.iter().cloned().collect(),
                    children: children.iter().cloned().collect(),
                };
                grown.insert_child(byte, child);
                grown
            }
            NodeKind::N16 { keys, children } => {
                if keys.len() < NODE16_CAP {
                    keys.push(byte);
                    children.push(child);
                    return std::mem::replace(
                        self,
                        NodeKind::N16 {
                            keys: SmallVec::new(),
                            children: SmallVec::new(),
                        },
                    );
                }
                let mut child_index = Box::new([0u8; 256]);
                let mut grown_children = Vec::with_capacity(NODE48_CAP + 1);
                for (i, (k, c)) in keys.iter().zip(children.iter()).enumerate() {
                    child_index[*k as usize] = (i + 1) as u8;
                    grown_children.push(Some(c.clone()));
                }
                let mut grown = NodeKind::N48 {
                    child_index,
                    children: grown_children,
                };
                grown.insert_child(byte, child);
                grown
            }
            NodeKind::N48 { child_index, children } => {
                if self.len() < NODE48_CAP {
                    let slot = children.iter().position(|c| c.is_none()).unwrap_or_else(|| {
                        children.push(None);
                        children.len() - 1
                    });
                    children[slot] = Some(child);
                    child_index[byte as usize] = (slot + 1) as u8;
                    return std::mem::replace(
                        self,
                        NodeKind::N48 {
                            child_index: Box::new([0u8; 256]),
                            children: Vec::new(),
                        },
                    );
                }
                let mut grown_children: Box<[Option<Arc<ArtNode>>; 256]> =
                    Box::new(std::array::from_fn(|_| None));
                for (b, c) in self.entries() {
                    grown_children[b as usize] = Some(c);
                }
                let mut grown = NodeKind::N256 {
                    children: grown_children,
                };
                grown.insert_child(byte, child);
                grown
            }
            NodeKind::N256 { children } => {
                children[byte as usize] = Some(child);
                std::mem::replace(
                    self,
                    NodeKind::N256 {
                        children: Box::new(std::array::from_fn(|_| None)),
                    },
                )
            }
        }
    }

    fn remove_child(&mut self, byte: u8) {
        match self {
            NodeKind::N4 { keys, children } | NodeKind::N16 { keys, children } => {
                if let Some(pos) = keys.iter().position(|&k| k == byte) {
                    keys.remove(pos);
                    children.remove(pos);
                }
            }
            NodeKind::N48 { child_index, children } => {
                let slot = child_index[byte as usize];
                if slot != 0 {
                    children[(slot - 1) as usize] = None;
                    child_index[byte as usize] = 0;
                }
            }
            NodeKind::N256 { children } => {
                children[byte as usize] = None;
            }
        }
    }
}

/// An inner node: a compressed prefix plus a child dispatch table.
struct InnerNode {
    prefix: SmallVec<[u8; 8]>,
    kind: NodeKind,
}

/// Data held behind a node's optimistic latch.
enum NodeData {
    Inner(InnerNode),
    Leaf(Key, IndexEntry),
}

/// One ART node: a version/lock latch guarding a `Mutex`-protected body.
/// The latch provides the optimistic read-version/validate protocol; the
/// mutex is the safe-Rust stand-in for the original's direct in-place
/// pointer mutation under the same latch.
struct ArtNode {
    latch: OptimisticLatch<0>,
    data: Mutex<NodeData>,
}

impl ArtNode {
    fn leaf(key: Key, entry: IndexEntry) -> Arc<Self> {
        Arc::new(ArtNode {
            latch: OptimisticLatch::new(0),
            data: Mutex::new(NodeData::Leaf(key, entry)),
        })
    }

    fn inner(prefix: SmallVec<[u8; 8]>, kind: NodeKind) -> Arc<Self> {
        Arc::new(ArtNode {
            latch: OptimisticLatch::new(0),
            data: Mutex::new(NodeData::Inner(InnerNode { prefix, kind })),
        })
    }
}

/// The trie. A single root slot, `None` when the index is empty.
pub struct ArtIndex {
    root: Mutex<Option<Arc<ArtNode>>>,
    gc: Option<Arc<EpochGarbageCollector>>,
}

impl ArtIndex {
    /// An empty index. Retired inner/leaf nodes are handed to `gc` when
    /// given; pass `None` in tests that don't need reclamation.
    pub fn new(gc: Option<Arc<EpochGarbageCollector>>) -> Self {
        ArtIndex {
            root: Mutex::new(None),
            gc,
        }
    }

    fn retire(&self, node: Arc<ArtNode>) {
        node.latch.invalidate();
        if let Some(gc) = &self.gc {
            gc.mark(Box::new(node), |_| {});
        }
    }

    /// Point lookup.
    pub fn find_exact(&self, key: Key) -> Option<IndexEntry> {
        loop {
            match self.try_find_exact(key) {
                Ok(result) => return result,
                Err(Abort::Retry) => continue,
                Err(Abort::RebalancingAbort) => unreachable!("ART never raises RebalancingAbort"),
            }
        }
    }

    fn try_find_exact(&self, key: Key) -> AbortResult<Option<IndexEntry>> {
        let Some(root) = self.root.lock().clone() else {
            return Ok(None);
        };
        let bytes = key.to_bytes();
        self.descend_exact(&root, &bytes, 0)
    }

    fn descend_exact(&self, node: &Arc<ArtNode>, bytes: &[u8; 16], depth: usize) -> AbortResult<Option<IndexEntry>> {
        enum Plan {
            Found(IndexEntry),
            NotFound,
            Descend(Arc<ArtNode>, usize),
        }
        let version = node.latch.read_version()?;
        let plan = {
            let data = node.data.lock();
            match &*data {
                NodeData::Leaf(leaf_key, entry) => {
                    if leaf_key.to_bytes() == *bytes {
                        Plan::Found(*entry)
                    } else {
                        Plan::NotFound
                    }
                }
                NodeData::Inner(inner) => {
                    let plen = inner.prefix.len();
                    if depth + plen > 16 || bytes[depth..depth + plen] != inner.prefix[..] {
                        Plan::NotFound
                    } else {
                        let next_depth = depth + plen;
                        if next_depth >= 16 {
                            Plan::NotFound
                        } else {
                            match inner.kind.get(bytes[next_depth]) {
                                Some(child) => Plan::Descend(child, next_depth + 1),
                                None => Plan::NotFound,
                            }
                        }
                    }
                }
            }
        };
        node.latch.validate(version)?;
        match plan {
            Plan::Found(entry) => Ok(Some(entry)),
            Plan::NotFound => Ok(None),
            Plan::Descend(child, next_depth) => self.descend_exact(&child, bytes, next_depth),
        }
    }

    /// Predecessor search: the entry whose key is the greatest key `<=
    /// key`, or `None` if no such key exists.
    pub fn find_less_or_equal(&self, key: Key) -> Option<(Key, IndexEntry)> {
        loop {
            match self.try_find_less_or_equal(key) {
                Ok(result) => return result,
                Err(Abort::Retry) => continue,
                Err(Abort::RebalancingAbort) => unreachable!("ART never raises RebalancingAbort"),
            }
        }
    }

    fn try_find_less_or_equal(&self, key: Key) -> AbortResult<Option<(Key, IndexEntry)>> {
        let Some(root) = self.root.lock().clone() else {
            return Ok(None);
        };
        let bytes = key.to_bytes();
        self.descend_le(&root, &bytes, 0)
    }

    fn descend_le(&self, node: &Arc<ArtNode>, bytes: &[u8; 16], depth: usize) -> AbortResult<Option<(Key, IndexEntry)>> {
        let version = node.latch.read_version()?;
        enum Plan {
            Leaf(Key, IndexEntry),
            LeafTooBig,
            Descend(Arc<ArtNode>, usize),
            TakeMaxOfPredecessor(Arc<ArtNode>),
            PrefixGreater,
            PrefixLess(Arc<ArtNode>),
            None,
        }
        let plan = {
            let data = node.data.lock();
            match &*data {
                NodeData::Leaf(leaf_key, entry) => {
                    if leaf_key.to_bytes() <= *bytes {
                        Plan::Leaf(*leaf_key, *entry)
                    } else {
                        Plan::LeafTooBig
                    }
                }
                NodeData::Inner(inner) => {
                    let plen = inner.prefix.len();
                    if depth + plen > 16 {
                        Plan::None
                    } else {
                        let search_slice = &bytes[depth..depth + plen];
                        if search_slice < &inner.prefix[..] {
                            Plan::PrefixGreater
                        } else if search_slice > &inner.prefix[..] {
                            match inner.kind.max_entry() {
                                Some((_, child)) => Plan::PrefixLess(child),
                                None => Plan::None,
                            }
                        } else {
                            let next_depth = depth + plen;
                            if next_depth >= 16 {
                                Plan::None
                            } else {
                                let byte = bytes[next_depth];
                                if let Some(child) = inner.kind.get(byte) {
                                    Plan::Descend(child, next_depth + 1)
                                } else if let Some((_, pred)) = inner.kind.predecessor(byte) {
                                    Plan::TakeMaxOfPredecessor(pred)
                                } else {
                                    Plan::None
                                }
                            }
                        }
                    }
                }
            }
        };
        node.latch.validate(version)?;

        match plan {
            Plan::Leaf(key, entry) => Ok(Some((key, entry))),
            Plan::LeafTooBig | Plan::PrefixGreater | Plan::None => Ok(None),
            Plan::PrefixLess(child) | Plan::TakeMaxOfPredecessor(child) => self.descend_max(&child),
            Plan::Descend(child, next_depth) => {
                match self.descend_le(&child, bytes, next_depth)? {
                    found @ Some(_) => Ok(found),
                    None => {
                        // The exact-byte child had nothing `<=` within it;
                        // fall back to this node's predecessor byte.
                        let version = node.latch.read_version()?;
                        let fallback = {
                            let data = node.data.lock();
                            match &*data {
                                NodeData::Inner(inner) => {
                                    let byte = bytes[next_depth - 1];
                                    inner.kind.predecessor(byte).map(|(_, c)| c)
                                }
                                NodeData::Leaf(..) => None,
                            }
                        };
                        node.latch.validate(version)?;
                        match fallback {
                            Some(pred) => self.descend_max(&pred),
                            None => Ok(None),
                        }
                    }
                }
            }
        }
    }

    /// Descend to the maximum leaf under `node`.
    fn descend_max(&self, node: &Arc<ArtNode>) -> AbortResult<Option<(Key, IndexEntry)>> {
        let version = node.latch.read_version()?;
        let plan = {
            let data = node.data.lock();
            match &*data {
                NodeData::Leaf(key, entry) => Some(Ok((*key, *entry))),
                NodeData::Inner(inner) => inner.kind.max_entry().map(|(_, child)| Err(child)),
            }
        };
        node.latch.validate(version)?;
        match plan {
            Some(Ok(leaf)) => Ok(Some(leaf)),
            Some(Err(child)) => self.descend_max(&child),
            None => Ok(None),
        }
    }

    /// Insert `key -> entry`. Restarts from the root on any Abort.
    pub fn insert(&self, key: Key, entry: IndexEntry) {
        loop {
            match self.try_insert(key, entry) {
                Ok(()) => return,
                Err(Abort::Retry) => continue,
                Err(Abort::RebalancingAbort) => unreachable!("ART never raises RebalancingAbort"),
            }
        }
    }

    fn try_insert(&self, key: Key, entry: IndexEntry) -> AbortResult<()> {
        let bytes = key.to_bytes();
        let mut root_guard = self.root.lock();
        match root_guard.clone() {
            None => {
                *root_guard = Some(ArtNode::leaf(key, entry));
                Ok(())
            }
            Some(root) => {
                drop(root_guard);
                self.insert_at(&root, &bytes, key, entry, 0)
            }
        }
    }

    fn insert_at(&self, node: &Arc<ArtNode>, bytes: &[u8; 16], key: Key, entry: IndexEntry, depth: usize) -> AbortResult<()> {
        node.latch.lock()?;
        let mut data = node.data.lock();
        match &mut *data {
            NodeData::Leaf(existing_key, existing_entry) => {
                if *existing_key == key {
                    *existing_entry = entry;
                    drop(data);
                    node.latch.unlock();
                    return Ok(());
                }
                let existing_bytes = existing_key.to_bytes();
                let mut common = 0usize;
                while depth + common < 16 && existing_bytes[depth + common] == bytes[depth + common] {
                    common += 1;
                }
                let prefix: SmallVec<[u8; 8]> = existing_bytes[depth..depth + common].iter().cloned().collect();
                let old_leaf = ArtNode::leaf(*existing_key, *existing_entry);
                let new_leaf = ArtNode::leaf(key, entry);
                let mut kind = NodeKind::new_n4();
                let split_depth = depth + common;
                if split_depth >= 16 {
                    // Keys identical up to full length but compared unequal:
                    // cannot happen since Key equality matches byte equality.
                    *existing_entry = entry;
                    drop(data);
                    node.latch.unlock();
                    return Ok(());
                }
                kind.insert_child(existing_bytes[split_depth], old_leaf);
                kind.insert_child(bytes[split_depth], new_leaf);
                *data = NodeData::Inner(InnerNode { prefix, kind });
                drop(data);
                node.latch.unlock();
                Ok(())
            }
            NodeData::Inner(inner) => {
                let plen = inner.prefix.len();
                let common = {
                    let mut c = 0usize;
                    while c < plen && depth + c < 16 && inner.prefix[c] == bytes[depth + c] {
                        c += 1;
                    }
                    c
                };
                if common < plen {
                    // Prefix mismatch: split this node.
                    let old_prefix_rest: SmallVec<[u8; 8]> = inner.prefix[common + 1..].iter().cloned().collect();
                    let branch_byte_old = inner.prefix[common];
                    let old_kind = std::mem::replace(&mut inner.kind, NodeKind::new_n4());
                    let old_child = ArtNode::inner(old_prefix_rest, old_kind);
                    let new_leaf = ArtNode::leaf(key, entry);
                    let mut new_kind = NodeKind::new_n4();
                    new_kind.insert_child(branch_byte_old, old_child);
                    new_kind.insert_child(bytes[depth + common], new_leaf);
                    let new_prefix: SmallVec<[u8; 8]> = inner.prefix[..common].iter().cloned().collect();
                    inner.prefix = new_prefix;
                    inner.kind = new_kind;
                    drop(data);
                    node.latch.unlock();
                    return Ok(());
                }
                let next_depth = depth + plen;
                let byte = bytes[next_depth];
                let existing_child = inner.kind.get(byte);
                match existing_child {
                    Some(child) => {
                        drop(data);
                        node.latch.unlock();
                        self.insert_at(&child, bytes, key, entry, next_depth + 1)
                    }
                    None => {
                        let leaf = ArtNode::leaf(key, entry);
                        let replaced = inner.kind.insert_child(byte, leaf);
                        let _ = replaced;
                        drop(data);
                        node.latch.unlock();
                        Ok(())
                    }
                }
            }
        }
    }

    /// Remove `key`. Restarts from the root on any Abort.
    pub fn remove(&self, key: Key) -> bool {
        loop {
            match self.try_remove(key) {
                Ok(found) => return found,
                Err(Abort::Retry) => continue,
                Err(Abort::RebalancingAbort) => unreachable!("ART never raises RebalancingAbort"),
            }
        }
    }

    fn try_remove(&self, key: Key) -> AbortResult<bool> {
        let bytes = key.to_bytes();
        let root = self.root.lock().clone();
        match root {
            None => Ok(false),
            Some(root) => {
                if let NodeData::Leaf(leaf_key, _) = &*root.data.lock() {
                    if *leaf_key == key {
                        *self.root.lock() = None;
                        self.retire(root.clone());
                        return Ok(true);
                    }
                }
                self.remove_at(&root, &bytes, 0)
            }
        }
    }

    fn remove_at(&self, node: &Arc<ArtNode>, bytes: &[u8; 16], depth: usize) -> AbortResult<bool> {
        node.latch.lock()?;
        let mut data = node.data.lock();
        let inner = match &mut *data {
            NodeData::Leaf(..) => {
                drop(data);
                node.latch.unlock();
                return Ok(false);
            }
            NodeData::Inner(inner) => inner,
        };
        let plen = inner.prefix.len();
        if depth + plen > 16 || bytes[depth..depth + plen] != inner.prefix[..] {
            drop(data);
            node.latch.unlock();
            return Ok(false);
        }
        let next_depth = depth + plen;
        let byte = bytes[next_depth];
        let child = inner.kind.get(byte);
        match child {
            None => {
                drop(data);
                node.latch.unlock();
                Ok(false)
            }
            Some(child) => {
                let is_leaf_match = matches!(&*child.data.lock(), NodeData::Leaf(k, _) if *k == crate::index::key::Key::from_bytes(*bytes));
                if is_leaf_match {
                    inner.kind.remove_child(byte);
                    self.retire(child.clone());
                    // Elide a single-child N4: fold this node's byte+prefix
                    // into the surviving child (path compression).
                    let sole = match &inner.kind {
                        NodeKind::N4 { keys, children } if keys.len() == 1 => {
                            Some((keys[0], children[0].clone()))
                        }
                        _ => None,
                    };
                    if let Some((sole_byte, sole_child)) = sole {
                        let placeholder = NodeData::Leaf(Key::max(), IndexEntry { chunk_id: 0, gate_id: 0 });
                        let sole_data = std::mem::replace(&mut *sole_child.data.lock(), placeholder);
                        let collapsed = match sole_data {
                            NodeData::Leaf(k, e) => NodeData::Leaf(k, e),
                            NodeData::Inner(child_inner) => {
                                let mut merged_prefix: SmallVec<[u8; 8]> = inner.prefix.clone();
                                merged_prefix.push(sole_byte);
                                merged_prefix.extend(child_inner.prefix.iter().cloned());
                                NodeData::Inner(InnerNode {
                                    prefix: merged_prefix,
                                    kind: child_inner.kind,
                                })
                            }
                        };
                        self.retire(sole_child);
                        *data = collapsed;
                    }
                    drop(data);
                    node.latch.unlock();
                    Ok(true)
                } else {
                    drop(data);
                    node.latch.unlock();
                    self.remove_at(&child, bytes, next_depth + 1)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(n: u64) -> IndexEntry {
        IndexEntry {
            chunk_id: n,
            gate_id: 0,
        }
    }

    #[test]
    fn index_entry_packs_48_16() {
        let e = IndexEntry {
            chunk_id: 0xABCDEF012345,
            gate_id: 0x7777,
        };
        assert_eq!(IndexEntry::unpack(e.pack()), e);
    }

    #[test]
    fn insert_then_find_exact() {
        let index = ArtIndex::new(None);
        index.insert(Key::edge(1, 2), entry(10));
        index.insert(Key::edge(1, 3), entry(20));
        index.insert(Key::edge(5, 0), entry(30));
        assert_eq!(index.find_exact(Key::edge(1, 2)), Some(entry(10)));
        assert_eq!(index.find_exact(Key::edge(1, 3)), Some(entry(20)));
        assert_eq!(index.find_exact(Key::edge(5, 0)), Some(entry(30)));
        assert_eq!(index.find_exact(Key::edge(9, 9)), None);
    }

    #[test]
    fn find_less_or_equal_returns_predecessor() {
        let index = ArtIndex::new(None);
        index.insert(Key::edge(10, 0), entry(1));
        index.insert(Key::edge(20, 0), entry(2));
        index.insert(Key::edge(30, 0), entry(3));

        assert_eq!(index.find_less_or_equal(Key::edge(25, 0)), Some((Key::edge(20, 0), entry(2))));
        assert_eq!(index.find_less_or_equal(Key::edge(30, 0)), Some((Key::edge(30, 0), entry(3))));
        assert_eq!(index.find_less_or_equal(Key::edge(5, 0)), None);
    }

    #[test]
    fn many_keys_round_trip_insert_and_remove() {
        let index = ArtIndex::new(None);
        let keys: Vec<Key> = (0u64..200).map(|i| Key::edge(i, i * 7 % 31)).collect();
        for (i, k) in keys.iter().enumerate() {
            index.insert(*k, entry(i as u64));
        }
        for k in &keys {
            assert!(index.find_exact(*k).is_some());
        }
        for k in &keys {
            assert!(index.remove(*k));
        }
        for k in &keys {
            assert_eq!(index.find_exact(*k), None);
        }
    }
}
