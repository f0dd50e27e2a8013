//! Read-only queries over a frozen index
//!
//! Every lookup that can miss returns `Option`; a miss is not an error.

use std::sync::Arc;

use log::warn;

use crate::error::StorageError;
use crate::graph::{EdgeLookup, EdgeRecord, PositionInfo};
use crate::index::FrozenIndex;
use crate::metadata::GameSummary;
use crate::position::{PositionHasher, PositionKey};
use crate::record::GameId;
use crate::trie::{ChildView, NodeId};
use crate::types::{BoardState, Move};

/// Trie node reached by a move sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceNode {
    pub node: NodeId,
    pub key: PositionKey,
    /// Games that passed through this prefix
    pub descendants: u64,
    /// Games that ended exactly here
    pub terminals: Vec<GameId>,
}

/// Where two lines part
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Divergence {
    /// First ply (1-based) whose positions differ
    At(usize),
    /// Equal over the common length: one line is a prefix of the other
    None,
}

/// Compare two key paths ply by ply. Comparing positions rather than moves
/// treats transpositions as the same line.
pub fn divergence_of(a: &[PositionKey], b: &[PositionKey]) -> Divergence {
    a.iter()
        .zip(b)
        .position(|(x, y)| x != y)
        .map_or(Divergence::None, |i| Divergence::At(i + 1))
}

/// `outgoing_moves` against any edge source, including backend-fronted
/// graphs
pub fn outgoing_moves_in<G: EdgeLookup + ?Sized>(
    graph: &G,
    key: PositionKey,
) -> Result<Option<Vec<EdgeRecord>>, StorageError> {
    graph.lookup_edges(key)
}

/// Query surface over a shared `FrozenIndex`
#[derive(Debug, Clone)]
pub struct QueryEngine {
    index: Arc<FrozenIndex>,
}

impl QueryEngine {
    pub fn new(index: Arc<FrozenIndex>) -> Self {
        QueryEngine { index }
    }

    pub fn index(&self) -> &Arc<FrozenIndex> {
        &self.index
    }

    /// Moves played from `key`, most frequent first
    pub fn outgoing_moves(&self, key: PositionKey) -> Option<Vec<EdgeRecord>> {
        self.index.graph().edges_from(key)
    }

    pub fn position(&self, key: PositionKey) -> Option<PositionInfo> {
        self.index.graph().position(key)
    }

    /// Positions where at least `min_branches` different moves were played
    pub fn branching_positions(&self, min_branches: usize) -> Vec<PositionKey> {
        self.index.graph().branching_positions(min_branches)
    }

    pub fn sequence_node(&self, moves: &[Move]) -> Option<SequenceNode> {
        let trie = self.index.trie();
        let id = trie.lookup(moves)?;
        let node = trie.node(id)?;
        Some(SequenceNode {
            node: id,
            key: node.key(),
            descendants: node.descendants(),
            terminals: node.terminals().to_vec(),
        })
    }

    /// Continuations of a move sequence, most popular first
    pub fn continuations(&self, moves: &[Move]) -> Option<Vec<ChildView>> {
        let trie = self.index.trie();
        trie.lookup(moves).map(|id| trie.child_moves(id))
    }

    pub fn filter_by_year_range(&self, lo: u16, hi: u16) -> Vec<GameId> {
        self.index.metadata().games_in_years(lo, hi)
    }

    pub fn filter_by_player(&self, name: &str) -> Vec<GameId> {
        self.index.metadata().games_of_player(name)
    }

    pub fn filter_by_opening(&self, eco: &str) -> Vec<GameId> {
        self.index.metadata().games_with_eco(eco)
    }

    pub fn game(&self, id: GameId) -> Option<&GameSummary> {
        self.index.metadata().game(id)
    }

    /// First ply at which the two lines reach different positions.
    ///
    /// `None` when either line is not in the index.
    pub fn divergence_point(&self, a: &[Move], b: &[Move]) -> Option<Divergence> {
        let trie = self.index.trie();
        let keys_a = trie.key_path(a)?;
        let keys_b = trie.key_path(b)?;
        Some(divergence_of(&keys_a, &keys_b))
    }

    /// A shortest indexed line reaching `key`
    pub fn line_to(&self, key: PositionKey) -> Option<Vec<Move>> {
        let node = self.index.line_node(key)?;
        self.index.trie().path_to(node)
    }

    /// Rebuild the board for `key` by replaying an indexed line
    pub fn board_of(&self, key: PositionKey) -> Option<BoardState> {
        let line = self.line_to(key)?;
        let board = match BoardState::after_moves(&line) {
            Ok(board) => board,
            Err(e) => {
                warn!("[query] replay of line to {key} failed: {e}");
                return None;
            }
        };
        let replayed = PositionHasher.hash(&board);
        if replayed != key {
            warn!("[query] replayed line to {key} hashes to {replayed}");
            return None;
        }
        Some(board)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexBuilder;
    use crate::ingest::IngestionPipeline;
    use crate::record::{GameHeaders, GameRecord};
    use crate::types::parse_uci_line;

    fn engine(lines: &[&str]) -> QueryEngine {
        let games: Vec<_> = lines
            .iter()
            .enumerate()
            .map(|(i, l)| Ok(GameRecord::from_uci_line(GameId(i as u64 + 1), GameHeaders::default(), l).unwrap()))
            .collect();
        let mut builder = IndexBuilder::new();
        IngestionPipeline::default().ingest(&mut builder, games).unwrap();
        QueryEngine::new(Arc::new(builder.freeze()))
    }

    #[test]
    fn test_divergence_of() {
        let k = |v: &[u64]| v.iter().map(|x| PositionKey(*x)).collect::<Vec<_>>();
        assert_eq!(divergence_of(&k(&[1, 2, 3]), &k(&[1, 2, 4])), Divergence::At(3));
        assert_eq!(divergence_of(&k(&[1, 2]), &k(&[1, 2, 4])), Divergence::None);
        assert_eq!(divergence_of(&k(&[5]), &k(&[6])), Divergence::At(1));
        assert_eq!(divergence_of(&[], &k(&[6])), Divergence::None);
    }

    #[test]
    fn test_transposition_is_not_divergence() {
        let q = engine(&["g1f3 g8f6 b1c3 e7e6", "b1c3 g8f6 g1f3 d7d5"]);
        let a = parse_uci_line("g1f3 g8f6 b1c3 e7e6").unwrap();
        let b = parse_uci_line("b1c3 g8f6 g1f3 d7d5").unwrap();
        assert_eq!(q.divergence_point(&a, &b), Some(Divergence::At(1)));
        let a3 = &a[..3];
        let b3 = &b[..3];
        // 1手目の局面は違うが、3手目で同じ局面に合流する
        assert_eq!(
            q.sequence_node(a3).unwrap().key,
            q.sequence_node(b3).unwrap().key
        );
        assert_eq!(q.divergence_point(&a[..3], &a), Some(Divergence::None));
        assert_eq!(q.divergence_point(&a, &parse_uci_line("h2h4").unwrap()), None);
    }

    #[test]
    fn test_line_and_board_reconstruction() {
        let q = engine(&["e2e4 c7c5 g1f3 d7d6"]);
        let moves = parse_uci_line("e2e4 c7c5 g1f3").unwrap();
        let key = q.sequence_node(&moves).unwrap().key;
        assert_eq!(q.line_to(key).unwrap(), moves);
        let board = q.board_of(key).unwrap();
        assert_eq!(board, BoardState::after_moves(&moves).unwrap());
        assert_eq!(q.board_of(PositionKey(12345)), None);
    }

    #[test]
    fn test_continuations_and_branching() {
        let q = engine(&["e2e4 e7e5", "e2e4 c7c5", "e2e4 c7c5", "d2d4"]);
        let after_e4 = q.continuations(&parse_uci_line("e2e4").unwrap()).unwrap();
        assert_eq!(after_e4[0].mv, Move::from_uci("c7c5").unwrap());
        assert_eq!(after_e4[0].descendants, 2);
        let start = PositionHasher.startpos();
        assert!(q.branching_positions(2).contains(&start));
        assert_eq!(q.position(start).unwrap().occurrences, 4);
    }
}
