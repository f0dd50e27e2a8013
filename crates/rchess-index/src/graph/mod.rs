//! Position-keyed transition graph
//!
//! `PositionKey → [(move, next key, frequency)]`. Edges are only ever created
//! or incremented during ingestion; `prune` is a separate maintenance step.

mod tiered;

pub use tiered::TieredGraph;

use std::cmp::Ordering;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::error::{IndexError, IndexResult, StorageError};
use crate::position::PositionKey;
use crate::types::Move;

/// One observed transition out of a position.
///
/// Packed layout (little endian, 18 bytes): move `u16`, to-key `u64`,
/// frequency `u64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub mv: Move,
    pub to: PositionKey,
    pub frequency: u64,
}

impl EdgeRecord {
    pub const PACKED_SIZE: usize = 2 + 8 + 8;

    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_u16::<LittleEndian>(self.mv.raw())?;
        writer.write_u64::<LittleEndian>(self.to.raw())?;
        writer.write_u64::<LittleEndian>(self.frequency)
    }

    pub fn read_from<R: Read>(reader: &mut R) -> io::Result<Self> {
        let raw = reader.read_u16::<LittleEndian>()?;
        let mv = Move::from_raw(raw).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidData, format!("invalid packed move {raw:#06x}"))
        })?;
        let to = PositionKey(reader.read_u64::<LittleEndian>()?);
        let frequency = reader.read_u64::<LittleEndian>()?;
        Ok(EdgeRecord { mv, to, frequency })
    }
}

/// 表示順: 頻度の降順、同数なら指し手の生値の昇順
#[inline]
pub(crate) fn presentation_order(a: (u64, Move), b: (u64, Move)) -> Ordering {
    b.0.cmp(&a.0).then_with(|| a.1.raw().cmp(&b.1.raw()))
}

pub(crate) fn sort_for_presentation(edges: &mut [EdgeRecord]) {
    edges.sort_by(|a, b| presentation_order((a.frequency, a.mv), (b.frequency, b.mv)));
}

/// Per-position payload. Edges are kept sorted by move so that equality and
/// merging do not depend on insertion order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionNode {
    edges: SmallVec<[EdgeRecord; 4]>,
    /// Shallowest ply at which the position was reached
    pub min_ply: u32,
    /// Number of times the position was reached
    pub occurrences: u64,
}

impl PositionNode {
    fn new(ply: u32) -> Self {
        PositionNode {
            edges: SmallVec::new(),
            min_ply: ply,
            occurrences: 0,
        }
    }

    /// Build a node from stored parts (snapshot loading, storage backends)
    pub fn from_parts(min_ply: u32, occurrences: u64, edges: impl IntoIterator<Item = EdgeRecord>) -> Self {
        let mut node = PositionNode {
            edges: SmallVec::new(),
            min_ply,
            occurrences,
        };
        for edge in edges {
            node.add_edge(edge);
        }
        node
    }

    /// Edges in move order
    pub fn edges(&self) -> &[EdgeRecord] {
        &self.edges
    }

    fn find(&self, mv: Move) -> Result<usize, usize> {
        self.edges.binary_search_by_key(&mv.raw(), |e| e.mv.raw())
    }

    /// 同じ手があれば頻度を加算、なければ挿入
    fn add_edge(&mut self, edge: EdgeRecord) {
        match self.find(edge.mv) {
            Ok(i) => self.edges[i].frequency += edge.frequency,
            Err(i) => self.edges.insert(i, edge),
        }
    }
}

/// Summary of one indexed position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionInfo {
    pub min_ply: u32,
    pub occurrences: u64,
    pub out_degree: usize,
}

/// Adjacency index over position keys
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PositionGraph {
    nodes: HashMap<PositionKey, PositionNode>,
}

impl PositionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct positions
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.nodes.values().map(|n| n.edges.len()).sum()
    }

    pub fn contains(&self, key: PositionKey) -> bool {
        self.nodes.contains_key(&key)
    }

    /// Record that `key` was reached at `ply`.
    ///
    /// Returns true when the position is new to this graph.
    pub fn visit(&mut self, key: PositionKey, ply: u32) -> bool {
        match self.nodes.entry(key) {
            Entry::Occupied(mut e) => {
                let node = e.get_mut();
                node.min_ply = node.min_ply.min(ply);
                node.occurrences += 1;
                false
            }
            Entry::Vacant(e) => {
                let node = e.insert(PositionNode::new(ply));
                node.occurrences = 1;
                true
            }
        }
    }

    /// Make sure `key` exists with `min_ply <= ply` without counting an
    /// occurrence
    pub(crate) fn touch(&mut self, key: PositionKey, ply: u32) {
        let node = self.nodes.entry(key).or_insert_with(|| PositionNode::new(ply));
        node.min_ply = node.min_ply.min(ply);
    }

    /// Count one observation of `from --mv--> to`.
    ///
    /// An existing edge keeps its destination; callers that need to detect a
    /// disagreeing destination check `edge` first.
    pub fn upsert_edge(&mut self, from: PositionKey, mv: Move, to: PositionKey) {
        let node = self.nodes.entry(from).or_insert_with(|| PositionNode::new(u32::MAX));
        node.add_edge(EdgeRecord { mv, to, frequency: 1 });
    }

    /// The stored edge for `(from, mv)`, if any
    pub fn edge(&self, from: PositionKey, mv: Move) -> Option<&EdgeRecord> {
        let node = self.nodes.get(&from)?;
        node.find(mv).ok().map(|i| &node.edges[i])
    }

    /// Outgoing edges in presentation order, `None` for an unknown key
    pub fn edges_from(&self, key: PositionKey) -> Option<Vec<EdgeRecord>> {
        let node = self.nodes.get(&key)?;
        let mut edges = node.edges.to_vec();
        sort_for_presentation(&mut edges);
        Some(edges)
    }

    pub fn position(&self, key: PositionKey) -> Option<PositionInfo> {
        self.nodes.get(&key).map(|n| PositionInfo {
            min_ply: n.min_ply,
            occurrences: n.occurrences,
            out_degree: n.edges.len(),
        })
    }

    pub fn node(&self, key: PositionKey) -> Option<&PositionNode> {
        self.nodes.get(&key)
    }

    /// Iterate over all positions (arbitrary order)
    pub fn iter(&self) -> impl Iterator<Item = (PositionKey, &PositionNode)> + '_ {
        self.nodes.iter().map(|(k, n)| (*k, n))
    }

    /// Insert or merge a stored node
    pub fn insert_node(&mut self, key: PositionKey, node: PositionNode) {
        match self.nodes.entry(key) {
            Entry::Occupied(mut e) => {
                let existing = e.get_mut();
                existing.min_ply = existing.min_ply.min(node.min_ply);
                existing.occurrences += node.occurrences;
                for edge in node.edges {
                    existing.add_edge(edge);
                }
            }
            Entry::Vacant(e) => {
                e.insert(node);
            }
        }
    }

    /// Fold `other` into `self`: matching edges sum, everything else is
    /// unioned. Fails without touching `self` when the two graphs disagree on
    /// the destination of a shared `(from, move)`.
    pub fn merge_from(&mut self, other: PositionGraph) -> IndexResult<()> {
        self.check_mergeable(&other)?;
        for (key, node) in other.nodes {
            self.insert_node(key, node);
        }
        Ok(())
    }

    pub(crate) fn check_mergeable(&self, other: &PositionGraph) -> IndexResult<()> {
        // 小さい方を走査する
        let (small, large) = if self.nodes.len() <= other.nodes.len() {
            (self, other)
        } else {
            (other, self)
        };
        for (key, node) in &small.nodes {
            let Some(theirs) = large.nodes.get(key) else {
                continue;
            };
            for edge in &node.edges {
                if let Ok(i) = theirs.find(edge.mv)
                    && theirs.edges[i].to != edge.to
                {
                    let (left, right) = if std::ptr::eq(small, self) {
                        (edge.to, theirs.edges[i].to)
                    } else {
                        (theirs.edges[i].to, edge.to)
                    };
                    return Err(IndexError::MergeConflict {
                        from: *key,
                        mv: edge.mv,
                        left,
                        right,
                    });
                }
            }
        }
        Ok(())
    }

    /// Positions with at least `min_branches` distinct continuations, sorted
    /// by key
    pub fn branching_positions(&self, min_branches: usize) -> Vec<PositionKey> {
        let mut keys: Vec<_> = self
            .nodes
            .iter()
            .filter(|(_, n)| n.edges.len() >= min_branches)
            .map(|(k, _)| *k)
            .collect();
        keys.sort_unstable();
        keys
    }

    /// Maintenance: drop edges seen fewer than `min_frequency` times, then
    /// drop positions that are left without edges and were reached fewer
    /// than `min_frequency` times. Returns the number of edges removed.
    pub fn prune(&mut self, min_frequency: u64) -> usize {
        let mut removed = 0;
        for node in self.nodes.values_mut() {
            let before = node.edges.len();
            node.edges.retain(|e| e.frequency >= min_frequency);
            removed += before - node.edges.len();
        }
        self.nodes
            .retain(|_, n| !n.edges.is_empty() || n.occurrences >= min_frequency);
        removed
    }
}

/// Read access to outgoing edges, shared by the in-memory graph and
/// backend-fronted graphs
pub trait EdgeLookup {
    fn lookup_edges(&self, key: PositionKey) -> Result<Option<Vec<EdgeRecord>>, StorageError>;
}

impl EdgeLookup for PositionGraph {
    fn lookup_edges(&self, key: PositionKey) -> Result<Option<Vec<EdgeRecord>>, StorageError> {
        Ok(self.edges_from(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mv(s: &str) -> Move {
        Move::from_uci(s).unwrap()
    }

    const A: PositionKey = PositionKey(1);
    const B: PositionKey = PositionKey(2);
    const C: PositionKey = PositionKey(3);

    #[test]
    fn test_upsert_creates_then_increments() {
        let mut g = PositionGraph::new();
        g.upsert_edge(A, mv("e2e4"), B);
        g.upsert_edge(A, mv("e2e4"), B);
        let edges = g.edges_from(A).unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].frequency, 2);
        assert_eq!(g.edges_from(PositionKey(99)), None);
    }

    #[test]
    fn test_presentation_order() {
        let mut g = PositionGraph::new();
        g.upsert_edge(A, mv("g1f3"), B);
        g.upsert_edge(A, mv("b1c3"), C);
        g.upsert_edge(A, mv("d2d4"), PositionKey(4));
        g.upsert_edge(A, mv("d2d4"), PositionKey(4));
        let order: Vec<_> = g.edges_from(A).unwrap().iter().map(|e| e.mv).collect();
        // d2d4 が最多、残りは生値の昇順（b1c3 < g1f3）
        assert_eq!(order, vec![mv("d2d4"), mv("b1c3"), mv("g1f3")]);
        assert!(mv("b1c3").raw() < mv("g1f3").raw());
    }

    #[test]
    fn test_visit_tracks_min_ply_and_occurrences() {
        let mut g = PositionGraph::new();
        assert!(g.visit(B, 5));
        assert!(!g.visit(B, 3));
        let info = g.position(B).unwrap();
        assert_eq!(info.min_ply, 3);
        assert_eq!(info.occurrences, 2);
    }

    fn sample(a: &[(&str, PositionKey)]) -> PositionGraph {
        let mut g = PositionGraph::new();
        g.visit(A, 0);
        for (m, to) in a {
            g.upsert_edge(A, mv(m), *to);
            g.visit(*to, 1);
        }
        g
    }

    #[test]
    fn test_merge_sums_and_unions() {
        let mut left = sample(&[("e2e4", B), ("d2d4", C)]);
        let right = sample(&[("e2e4", B), ("c2c4", PositionKey(5))]);
        left.merge_from(right).unwrap();
        let edges = left.edges_from(A).unwrap();
        assert_eq!(edges.len(), 3);
        assert_eq!(edges[0].mv, mv("e2e4"));
        assert_eq!(edges[0].frequency, 2);
        assert_eq!(left.position(A).unwrap().occurrences, 2);
    }

    #[test]
    fn test_merge_commutative() {
        let a = sample(&[("e2e4", B), ("d2d4", C)]);
        let b = sample(&[("e2e4", B), ("c2c4", PositionKey(5))]);
        let mut ab = a.clone();
        ab.merge_from(b.clone()).unwrap();
        let mut ba = b;
        ba.merge_from(a).unwrap();
        assert_eq!(ab, ba);
    }

    #[test]
    fn test_merge_conflict_leaves_receiver_untouched() {
        let mut left = sample(&[("e2e4", B), ("d2d4", C)]);
        let snapshot = left.clone();
        let right = sample(&[("c2c4", PositionKey(5)), ("e2e4", C)]);
        let err = left.merge_from(right).unwrap_err();
        match err {
            IndexError::MergeConflict { from, mv: m, left: l, right: r } => {
                assert_eq!(from, A);
                assert_eq!(m, mv("e2e4"));
                assert_eq!((l, r), (B, C));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(left, snapshot);
    }

    #[test]
    fn test_branching_and_prune() {
        let mut g = sample(&[("e2e4", B), ("e2e4", B), ("d2d4", C)]);
        g.upsert_edge(B, mv("e7e5"), PositionKey(6));
        assert_eq!(g.branching_positions(2), vec![A]);

        let removed = g.prune(2);
        assert_eq!(removed, 2);
        assert_eq!(g.edges_from(A).unwrap().len(), 1);
        // C は1回しか現れず辺もないので消える
        assert!(!g.contains(C));
        assert!(g.contains(B));
    }

    #[test]
    fn test_edge_record_packed_size() {
        let edge = EdgeRecord { mv: mv("e7e8q"), to: C, frequency: 42 };
        let mut buf = Vec::new();
        edge.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), EdgeRecord::PACKED_SIZE);
        assert_eq!(EdgeRecord::read_from(&mut buf.as_slice()).unwrap(), edge);
    }
}
