//! Backend-fronted position graph
//!
//! 浅い手数の局面（ほぼ全局で共有される）はメモリに置き、`resident_ply` より
//! 深い局面の辺は `StorageBackend` に逃がす。契約は `PositionGraph` と同じで、
//! バックエンドの失敗がそのまま返る点だけが違う。

use log::debug;

use super::{EdgeLookup, EdgeRecord, PositionGraph, PositionNode, sort_for_presentation};
use crate::error::StorageResult;
use crate::position::PositionKey;
use crate::storage::StorageBackend;
use crate::types::Move;

/// Position graph split between memory and a storage backend
#[derive(Debug)]
pub struct TieredGraph<B: StorageBackend> {
    resident: PositionGraph,
    backend: B,
    resident_ply: u32,
}

impl<B: StorageBackend> TieredGraph<B> {
    pub fn new(backend: B, resident_ply: u32) -> Self {
        TieredGraph {
            resident: PositionGraph::new(),
            backend,
            resident_ply,
        }
    }

    /// Split an in-memory graph: positions first reached deeper than
    /// `resident_ply` move to `backend`.
    pub fn from_graph(graph: PositionGraph, mut backend: B, resident_ply: u32) -> StorageResult<Self> {
        let mut resident = PositionGraph::new();
        let mut spilled = 0usize;
        for (key, node) in graph.nodes {
            if node.min_ply <= resident_ply {
                resident.insert_node(key, node);
            } else {
                backend.put(key, node.edges())?;
                spilled += 1;
            }
        }
        backend.flush()?;
        debug!(
            "tiered graph: {} resident positions, {} spilled (resident_ply={})",
            resident.len(),
            spilled,
            resident_ply
        );
        Ok(TieredGraph {
            resident,
            backend,
            resident_ply,
        })
    }

    pub fn resident(&self) -> &PositionGraph {
        &self.resident
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn resident_ply(&self) -> u32 {
        self.resident_ply
    }

    /// `from` が `ply` 手目の局面として辺を1回数える
    pub fn upsert_edge(&mut self, from: PositionKey, ply: u32, mv: Move, to: PositionKey) -> StorageResult<()> {
        if ply <= self.resident_ply || self.resident.contains(from) {
            self.resident.touch(from, ply);
            self.resident.upsert_edge(from, mv, to);
            return Ok(());
        }

        let mut node = PositionNode::from_parts(ply, 0, self.backend.get(from)?.unwrap_or_default());
        node.add_edge(EdgeRecord { mv, to, frequency: 1 });
        self.backend.put(from, node.edges())
    }

    /// Outgoing edges in presentation order. Both tiers are consulted and
    /// summed, so a position split across tiers still answers in full.
    pub fn edges_from(&self, key: PositionKey) -> StorageResult<Option<Vec<EdgeRecord>>> {
        let resident = self.resident.node(key);
        let spilled = self.backend.get(key)?;
        let mut edges = match (resident, spilled) {
            (None, None) => return Ok(None),
            (Some(node), None) => node.edges().to_vec(),
            (None, Some(edges)) => edges,
            (Some(node), Some(edges)) => {
                PositionNode::from_parts(0, 0, node.edges().iter().copied().chain(edges))
                    .edges()
                    .to_vec()
            }
        };
        sort_for_presentation(&mut edges);
        Ok(Some(edges))
    }

    pub fn flush(&mut self) -> StorageResult<()> {
        self.backend.flush()
    }

    pub fn into_parts(self) -> (PositionGraph, B) {
        (self.resident, self.backend)
    }
}

impl<B: StorageBackend> EdgeLookup for TieredGraph<B> {
    fn lookup_edges(&self, key: PositionKey) -> StorageResult<Option<Vec<EdgeRecord>>> {
        self.edges_from(key)
    }
}
