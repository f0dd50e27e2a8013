//! Context object owning the graph, the trie and the metadata indexes
//!
//! `IndexBuilder` is the accumulate-only build phase; `freeze` turns it into
//! an immutable `FrozenIndex` that queries share through `Arc`. A new
//! ingestion pass starts from `FrozenIndex::reopen`, which copies the data so
//! live readers keep their view.

use std::collections::{HashMap, VecDeque};

use log::debug;

use crate::error::IndexResult;
use crate::graph::PositionGraph;
use crate::metadata::MetadataIndex;
use crate::position::PositionKey;
use crate::trie::{MoveTrie, NodeId};

/// Size counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexStats {
    pub positions: usize,
    pub edges: usize,
    pub trie_nodes: usize,
    pub games: usize,
}

/// Result of a maintenance prune
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneStats {
    pub edges_removed: usize,
    pub positions_removed: usize,
    pub trie_nodes_removed: usize,
}

/// Mutable index under construction (one per shard, or the merged result)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexBuilder {
    pub(crate) graph: PositionGraph,
    pub(crate) trie: MoveTrie,
    pub(crate) metadata: MetadataIndex,
}

impl IndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_parts(graph: PositionGraph, trie: MoveTrie, metadata: MetadataIndex) -> Self {
        IndexBuilder {
            graph,
            trie,
            metadata,
        }
    }

    pub fn graph(&self) -> &PositionGraph {
        &self.graph
    }

    pub fn trie(&self) -> &MoveTrie {
        &self.trie
    }

    pub fn metadata(&self) -> &MetadataIndex {
        &self.metadata
    }

    pub fn stats(&self) -> IndexStats {
        stats_of(&self.graph, &self.trie, &self.metadata)
    }

    /// Merge another builder. All three structures are checked before any of
    /// them changes, so a conflict leaves `self` exactly as it was.
    pub fn merge(&mut self, other: IndexBuilder) -> IndexResult<()> {
        self.graph.check_mergeable(&other.graph)?;
        self.trie.check_merge(&other.trie)?;
        self.metadata.check_merge(&other.metadata)?;

        self.graph.merge_from(other.graph)?;
        self.trie.merge(other.trie)?;
        self.metadata.merge_from(other.metadata)?;
        Ok(())
    }

    /// Maintenance pass. A zero threshold leaves that structure alone.
    pub fn prune(&mut self, min_frequency: u64, min_descendants: u64) -> PruneStats {
        let mut stats = PruneStats::default();
        if min_frequency > 0 {
            let before = self.graph.len();
            stats.edges_removed = self.graph.prune(min_frequency);
            stats.positions_removed = before - self.graph.len();
        }
        if min_descendants > 0 {
            stats.trie_nodes_removed = self.trie.prune(min_descendants);
        }
        debug!("[prune] {stats:?}");
        stats
    }

    /// End the build phase
    pub fn freeze(self) -> FrozenIndex {
        let lines = shallowest_nodes(&self.trie);
        FrozenIndex {
            graph: self.graph,
            trie: self.trie,
            metadata: self.metadata,
            lines,
        }
    }
}

fn stats_of(graph: &PositionGraph, trie: &MoveTrie, metadata: &MetadataIndex) -> IndexStats {
    IndexStats {
        positions: graph.len(),
        edges: graph.edge_count(),
        trie_nodes: trie.len(),
        games: metadata.len(),
    }
}

/// 各局面キーについて、最も浅い（同じ深さなら手の生値順で最初の）トライノード
fn shallowest_nodes(trie: &MoveTrie) -> HashMap<PositionKey, NodeId> {
    let mut lines = HashMap::new();
    let mut queue = VecDeque::from([NodeId::ROOT]);
    while let Some(id) = queue.pop_front() {
        let Some(node) = trie.node(id) else {
            continue;
        };
        lines.entry(node.key()).or_insert(id);
        let mut children: Vec<_> = trie.child_moves(id).into_iter().map(|c| (c.mv, c.node)).collect();
        children.sort_unstable_by_key(|(mv, _)| mv.raw());
        queue.extend(children.into_iter().map(|(_, node)| node));
    }
    lines
}

/// Immutable index. `Send + Sync`; share it with `Arc`.
#[derive(Debug, Clone)]
pub struct FrozenIndex {
    graph: PositionGraph,
    trie: MoveTrie,
    metadata: MetadataIndex,
    lines: HashMap<PositionKey, NodeId>,
}

impl FrozenIndex {
    pub fn graph(&self) -> &PositionGraph {
        &self.graph
    }

    pub fn trie(&self) -> &MoveTrie {
        &self.trie
    }

    pub fn metadata(&self) -> &MetadataIndex {
        &self.metadata
    }

    pub fn stats(&self) -> IndexStats {
        stats_of(&self.graph, &self.trie, &self.metadata)
    }

    /// Shallowest trie node whose prefix reaches `key`
    pub fn line_node(&self, key: PositionKey) -> Option<NodeId> {
        self.lines.get(&key).copied()
    }

    /// Copy the data into a new builder for another ingestion pass
    pub fn reopen(&self) -> IndexBuilder {
        IndexBuilder {
            graph: self.graph.clone(),
            trie: self.trie.clone(),
            metadata: self.metadata.clone(),
        }
    }

    /// Reopen without copying, when no reader holds this index any more
    pub fn into_builder(self) -> IndexBuilder {
        IndexBuilder {
            graph: self.graph,
            trie: self.trie,
            metadata: self.metadata,
        }
    }
}

impl PartialEq for FrozenIndex {
    fn eq(&self, other: &Self) -> bool {
        self.graph == other.graph && self.trie == other.trie && self.metadata == other.metadata
    }
}

impl Eq for FrozenIndex {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IndexError;
    use crate::position::PositionHasher;
    use crate::record::GameId;
    use crate::types::{BoardState, Move};

    fn insert_line(builder: &mut IndexBuilder, line: &str, game: u64) {
        let moves = crate::types::parse_uci_line(line).unwrap();
        let mut board = BoardState::startpos();
        let keys: Vec<_> = moves
            .iter()
            .map(|mv| {
                board.play(*mv).unwrap();
                PositionHasher.hash(&board)
            })
            .collect();
        builder.trie.insert(&moves, &keys, GameId(game)).unwrap();
    }

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_frozen_is_send_sync() {
        assert_send_sync::<FrozenIndex>();
        assert_send_sync::<IndexBuilder>();
    }

    #[test]
    fn test_line_nodes_prefer_shallowest() {
        let mut builder = IndexBuilder::new();
        // 同じ局面へ 3手目で到達（g1f3 g8f6 b1c3 / b1c3 g8f6 g1f3）
        insert_line(&mut builder, "g1f3 g8f6 b1c3", 1);
        insert_line(&mut builder, "b1c3 g8f6 g1f3", 2);
        insert_line(&mut builder, "e2e4", 3);
        let frozen = builder.freeze();

        let target = PositionHasher.hash(&BoardState::after_moves(&crate::types::parse_uci_line("g1f3 g8f6 b1c3").unwrap()).unwrap());
        let node = frozen.line_node(target).unwrap();
        let path = frozen.trie().path_to(node).unwrap();
        // b1c3 の方が生値が小さい
        assert_eq!(path[0], Move::from_uci("b1c3").unwrap());
        assert_eq!(frozen.line_node(PositionHasher.startpos()), Some(NodeId::ROOT));
    }

    #[test]
    fn test_reopen_is_a_copy() {
        let mut builder = IndexBuilder::new();
        insert_line(&mut builder, "e2e4", 1);
        let frozen = builder.freeze();
        let mut reopened = frozen.reopen();
        insert_line(&mut reopened, "d2d4", 2);
        assert_eq!(frozen.trie().len(), 2);
        assert_eq!(reopened.trie().len(), 3);
    }

    #[test]
    fn test_merge_conflict_checks_all_parts_first() {
        let mut a = IndexBuilder::new();
        insert_line(&mut a, "e2e4", 1);
        a.graph.upsert_edge(PositionKey(1), Move::from_uci("e2e4").unwrap(), PositionKey(2));

        let mut b = IndexBuilder::new();
        insert_line(&mut b, "d2d4", 2);
        b.graph.upsert_edge(PositionKey(1), Move::from_uci("e2e4").unwrap(), PositionKey(3));

        let before = a.clone();
        assert!(matches!(a.merge(b), Err(IndexError::MergeConflict { .. })));
        assert_eq!(a, before);
    }
}
