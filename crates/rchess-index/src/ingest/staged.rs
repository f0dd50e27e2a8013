//! Per-game staging area

use crate::error::IndexResult;
use crate::index::IndexBuilder;
use crate::metadata::GameSummary;
use crate::position::{BoardDelta, PositionHasher, PositionKey};
use crate::record::{GameId, GameRecord};
use crate::types::{BoardState, Move};

use super::SkipReason;

type Skip = (SkipReason, String);

/// Everything one game will write, computed before touching the index
#[derive(Debug)]
pub(super) struct StagedGame {
    id: GameId,
    moves: Vec<Move>,
    /// `keys[i]` is the position after `moves[i]`
    keys: Vec<PositionKey>,
    summary: GameSummary,
}

impl StagedGame {
    /// Derive the running key incrementally from the collaborator's boards.
    pub(super) fn stage(game: &GameRecord, max_plies: usize) -> Result<Self, Skip> {
        let start = BoardState::startpos();
        if let Some(given) = &game.start
            && *given != start
        {
            return Err((SkipReason::NonStandardStart, given.to_fen()));
        }
        if game.plies.is_empty() {
            return Err((SkipReason::Empty, "no moves".to_string()));
        }
        if game.plies.len() > max_plies {
            return Err((
                SkipReason::TooLong,
                format!("{} plies (limit {max_plies})", game.plies.len()),
            ));
        }

        let hasher = PositionHasher;
        let mut key = hasher.startpos();
        let mut prev = &start;
        let mut moves = Vec::with_capacity(game.plies.len());
        let mut keys = Vec::with_capacity(game.plies.len());

        for (i, ply) in game.plies.iter().enumerate() {
            let mover = prev.side_to_move();
            let follows = prev.piece_on(ply.mv.from_sq()).is_some_and(|p| p.color == mover)
                && ply.board.piece_on(ply.mv.to_sq()).is_some_and(|p| p.color == mover)
                && ply.board.side_to_move() == !mover;
            if !follows {
                return Err((
                    SkipReason::Inconsistent,
                    format!("board after ply {} does not follow {}", i + 1, ply.mv),
                ));
            }

            let delta = BoardDelta::between(prev, &ply.board);
            key = hasher.update(key, &delta);
            debug_assert_eq!(key, hasher.hash(&ply.board));
            moves.push(ply.mv);
            keys.push(key);
            prev = &ply.board;
        }

        Ok(StagedGame {
            id: game.id,
            summary: GameSummary::from_headers(&game.headers, moves.len() as u32, key),
            moves,
            keys,
        })
    }

    pub(super) fn plies(&self) -> usize {
        self.moves.len()
    }

    /// Check the staged writes against what is already indexed
    pub(super) fn validate(&self, builder: &IndexBuilder) -> Result<(), Skip> {
        builder
            .trie
            .check_insert(&self.moves, &self.keys)
            .map_err(|e| (SkipReason::Inconsistent, e.to_string()))?;

        let mut from = builder.trie.root().key();
        for (mv, to) in self.moves.iter().zip(&self.keys) {
            if let Some(edge) = builder.graph.edge(from, *mv)
                && edge.to != *to
            {
                return Err((
                    SkipReason::Inconsistent,
                    format!("{from} via {mv} leads to {} in the index, {to} here", edge.to),
                ));
            }
            from = *to;
        }

        if !builder.metadata.accepts(self.id, &self.summary) {
            return Err((
                SkipReason::DuplicateId,
                format!("game {} already indexed with different metadata", self.id),
            ));
        }
        Ok(())
    }

    /// Apply to the index. Only called after `validate` succeeded.
    pub(super) fn commit(self, builder: &mut IndexBuilder) -> IndexResult<()> {
        builder.trie.insert(&self.moves, &self.keys, self.id)?;

        let mut from = builder.trie.root().key();
        builder.graph.visit(from, 0);
        for (ply, (mv, to)) in self.moves.iter().zip(&self.keys).enumerate() {
            builder.graph.upsert_edge(from, *mv, *to);
            builder.graph.visit(*to, ply as u32 + 1);
            from = *to;
        }

        builder.metadata.add(self.id, self.summary);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::GameHeaders;

    fn record(line: &str) -> GameRecord {
        GameRecord::from_uci_line(GameId(1), GameHeaders::default(), line).unwrap()
    }

    #[test]
    fn test_stage_keys_match_full_hash() {
        let game = record("e2e4 d7d5 e4d5 d8d5 b1c3");
        let staged = StagedGame::stage(&game, 100).unwrap();
        for (ply, key) in game.plies.iter().zip(&staged.keys) {
            assert_eq!(*key, PositionHasher.hash(&ply.board));
        }
        assert_eq!(staged.summary.end_key, *staged.keys.last().unwrap());
        assert_eq!(staged.summary.plies, 5);
    }

    #[test]
    fn test_board_not_following_move() {
        let mut game = record("e2e4 e7e5");
        // 2手目の盤面を1手目と同じにする
        game.plies[1].board = game.plies[0].board.clone();
        let (reason, detail) = StagedGame::stage(&game, 100).unwrap_err();
        assert_eq!(reason, SkipReason::Inconsistent);
        assert!(detail.contains("ply 2"), "{detail}");
    }

    #[test]
    fn test_validate_detects_graph_disagreement() {
        let game = record("e2e4");
        let staged = StagedGame::stage(&game, 100).unwrap();
        let mut builder = IndexBuilder::new();
        builder
            .graph
            .upsert_edge(PositionHasher.startpos(), Move::from_uci("e2e4").unwrap(), PositionKey(42));
        let (reason, _) = staged.validate(&builder).unwrap_err();
        assert_eq!(reason, SkipReason::Inconsistent);
    }
}
