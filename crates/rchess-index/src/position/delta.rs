//! 2局面間の差分

use smallvec::SmallVec;

use crate::types::{BoardState, CastlingRights, Piece, Square};

/// 1マス分の変化
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SquareChange {
    pub square: Square,
    pub before: Option<Piece>,
    pub after: Option<Piece>,
}

/// `PositionHasher::update` の入力。
///
/// 通常手は2マス、アンパッサンは3マス、キャスリングは4マスが変化する。
/// アンパッサンは「実際に取れる場合」の値で持つ。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardDelta {
    pub squares: SmallVec<[SquareChange; 4]>,
    pub castling_before: CastlingRights,
    pub castling_after: CastlingRights,
    pub en_passant_before: Option<Square>,
    pub en_passant_after: Option<Square>,
    pub side_flipped: bool,
}

impl BoardDelta {
    /// 2局面を比較して差分を作る
    pub fn between(before: &BoardState, after: &BoardState) -> Self {
        let squares = Square::all()
            .filter_map(|sq| {
                let old = before.piece_on(sq);
                let new = after.piece_on(sq);
                (old != new).then_some(SquareChange {
                    square: sq,
                    before: old,
                    after: new,
                })
            })
            .collect();
        BoardDelta {
            squares,
            castling_before: before.castling(),
            castling_after: after.castling(),
            en_passant_before: before.en_passant_capturable(),
            en_passant_after: after.en_passant_capturable(),
            side_flipped: before.side_to_move() != after.side_to_move(),
        }
    }

    /// 変化なし
    pub fn is_empty(&self) -> bool {
        self.squares.is_empty()
            && self.castling_before == self.castling_after
            && self.en_passant_before == self.en_passant_after
            && !self.side_flipped
    }
}
