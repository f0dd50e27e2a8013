//! 盤面状態（BoardState）
//!
//! 外部の合法手エンジンから渡される論理局面。インデックス自体は保持せず、
//! ハッシュ計算と、索引済み手順の再生（`play`）にだけ使う。
//!
//! `play` は駒の移動を機械的に適用するだけで、合法性は一切検査しない。

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::{Color, Move, Piece, PieceType, Square};
use crate::error::BoardError;

/// キャスリング権（4bit）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CastlingRights(u8);

impl CastlingRights {
    pub const WHITE_KING: CastlingRights = CastlingRights(1);
    pub const WHITE_QUEEN: CastlingRights = CastlingRights(2);
    pub const BLACK_KING: CastlingRights = CastlingRights(4);
    pub const BLACK_QUEEN: CastlingRights = CastlingRights(8);
    pub const NONE: CastlingRights = CastlingRights(0);
    pub const ALL: CastlingRights = CastlingRights(15);

    /// FEN の並び順（KQkq）
    pub const FLAGS: [(CastlingRights, char); 4] = [
        (CastlingRights::WHITE_KING, 'K'),
        (CastlingRights::WHITE_QUEEN, 'Q'),
        (CastlingRights::BLACK_KING, 'k'),
        (CastlingRights::BLACK_QUEEN, 'q'),
    ];

    #[inline]
    pub const fn bits(self) -> u8 {
        self.0
    }

    #[inline]
    pub const fn contains(self, other: CastlingRights) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub fn insert(&mut self, other: CastlingRights) {
        self.0 |= other.0;
    }

    #[inline]
    pub fn remove(&mut self, other: CastlingRights) {
        self.0 &= !other.0;
    }

    /// 指定マスが動く（または取られる）と失われる権利
    fn lost_by(sq: Square) -> CastlingRights {
        match sq {
            Square::E1 => CastlingRights(Self::WHITE_KING.0 | Self::WHITE_QUEEN.0),
            Square::H1 => Self::WHITE_KING,
            Square::A1 => Self::WHITE_QUEEN,
            Square::E8 => CastlingRights(Self::BLACK_KING.0 | Self::BLACK_QUEEN.0),
            Square::H8 => Self::BLACK_KING,
            Square::A8 => Self::BLACK_QUEEN,
            _ => Self::NONE,
        }
    }
}

/// 論理局面: 駒配置・手番・キャスリング権・アンパッサン対象マス
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct BoardState {
    squares: [Option<Piece>; Square::NUM],
    side_to_move: Color,
    castling: CastlingRights,
    en_passant: Option<Square>,
}

impl BoardState {
    /// 駒のない局面（白番、権利なし）
    pub fn empty() -> Self {
        Self {
            squares: [None; Square::NUM],
            side_to_move: Color::White,
            castling: CastlingRights::NONE,
            en_passant: None,
        }
    }

    /// 標準の初期局面
    pub fn startpos() -> Self {
        const BACK_RANK: [PieceType; 8] = [
            PieceType::Rook,
            PieceType::Knight,
            PieceType::Bishop,
            PieceType::Queen,
            PieceType::King,
            PieceType::Bishop,
            PieceType::Knight,
            PieceType::Rook,
        ];
        let mut board = Self::empty();
        for (file, &pt) in BACK_RANK.iter().enumerate() {
            let file = file as u8;
            board.put(Square::from_file_rank(file, 0), Piece::new(Color::White, pt));
            board.put(Square::from_file_rank(file, 1), Piece::new(Color::White, PieceType::Pawn));
            board.put(Square::from_file_rank(file, 6), Piece::new(Color::Black, PieceType::Pawn));
            board.put(Square::from_file_rank(file, 7), Piece::new(Color::Black, pt));
        }
        board.castling = CastlingRights::ALL;
        board
    }

    fn put(&mut self, sq: Option<Square>, piece: Piece) {
        if let Some(sq) = sq {
            self.squares[sq.index()] = Some(piece);
        }
    }

    #[inline]
    pub fn piece_on(&self, sq: Square) -> Option<Piece> {
        self.squares[sq.index()]
    }

    pub fn set_piece(&mut self, sq: Square, piece: Option<Piece>) {
        self.squares[sq.index()] = piece;
    }

    #[inline]
    pub fn side_to_move(&self) -> Color {
        self.side_to_move
    }

    pub fn set_side_to_move(&mut self, color: Color) {
        self.side_to_move = color;
    }

    #[inline]
    pub fn castling(&self) -> CastlingRights {
        self.castling
    }

    pub fn set_castling(&mut self, rights: CastlingRights) {
        self.castling = rights;
    }

    /// FEN に書かれたままのアンパッサン対象マス
    #[inline]
    pub fn en_passant(&self) -> Option<Square> {
        self.en_passant
    }

    pub fn set_en_passant(&mut self, sq: Option<Square>) {
        self.en_passant = sq;
    }

    /// 実際に手番側のポーンが取れる場合だけアンパッサン対象マスを返す。
    ///
    /// ハッシュはこちらを使う。ダブルプッシュ直後でも取れる駒がいなければ
    /// 手順違いの同一局面と同じキーになる。
    pub fn en_passant_capturable(&self) -> Option<Square> {
        let ep = self.en_passant?;
        let us = self.side_to_move;
        // 直前にダブルプッシュしたポーンは ep の一つ先（相手から見て）にいる
        let pushed = ep.offset(0, -us.forward())?;
        let capturer = Piece::new(us, PieceType::Pawn);
        let has_capturer = [-1i8, 1]
            .iter()
            .filter_map(|&df| pushed.offset(df, 0))
            .any(|sq| self.piece_on(sq) == Some(capturer));
        has_capturer.then_some(ep)
    }

    /// 駒のあるマスを列挙
    pub fn pieces(&self) -> impl Iterator<Item = (Square, Piece)> + '_ {
        Square::all().filter_map(move |sq| self.piece_on(sq).map(|p| (sq, p)))
    }

    /// 指し手を機械的に適用する（合法性チェックなし）。
    ///
    /// 移動元が空、または手番でない駒の場合のみエラーにする。
    pub fn play(&mut self, mv: Move) -> Result<(), BoardError> {
        let from = mv.from_sq();
        let to = mv.to_sq();
        let piece = self.piece_on(from).ok_or(BoardError::EmptySource(from))?;
        if piece.color != self.side_to_move {
            return Err(BoardError::WrongSide(from));
        }
        let us = piece.color;
        let is_pawn = piece.piece_type == PieceType::Pawn;

        // アンパッサン: 空きマスへの斜め移動で対象マスに一致
        if is_pawn
            && Some(to) == self.en_passant
            && self.piece_on(to).is_none()
            && from.file() != to.file()
            && let Some(victim) = to.offset(0, -us.forward())
        {
            self.set_piece(victim, None);
        }

        self.set_piece(from, None);
        let landed = match mv.promotion() {
            Some(pt) if is_pawn => Piece::new(us, pt),
            _ => piece,
        };
        self.set_piece(to, Some(landed));

        // キャスリング: キングの2マス移動でルークも動かす
        if piece.piece_type == PieceType::King && from.file().abs_diff(to.file()) == 2 {
            let (rook_from, rook_to) = if to.file() > from.file() {
                (to.offset(1, 0), to.offset(-1, 0))
            } else {
                (to.offset(-2, 0), to.offset(1, 0))
            };
            if let (Some(rf), Some(rt)) = (rook_from, rook_to) {
                let rook = self.piece_on(rf);
                self.set_piece(rf, None);
                self.set_piece(rt, rook);
            }
        }

        self.castling.remove(CastlingRights::lost_by(from));
        self.castling.remove(CastlingRights::lost_by(to));

        self.en_passant = if is_pawn && from.rank().abs_diff(to.rank()) == 2 {
            from.offset(0, us.forward())
        } else {
            None
        };

        self.side_to_move = !us;
        Ok(())
    }

    /// 初期局面から手順を再生した局面
    pub fn after_moves(moves: &[Move]) -> Result<BoardState, BoardError> {
        let mut board = BoardState::startpos();
        for &mv in moves {
            board.play(mv)?;
        }
        Ok(board)
    }
}

impl Default for BoardState {
    fn default() -> Self {
        Self::startpos()
    }
}

impl fmt::Debug for BoardState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BoardState({})", self.to_fen())
    }
}

impl Serialize for BoardState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_fen())
    }
}

impl<'de> Deserialize<'de> for BoardState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        BoardState::from_fen(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn play_all(line: &str) -> BoardState {
        let mut board = BoardState::startpos();
        for text in line.split_whitespace() {
            board.play(Move::from_uci(text).unwrap()).unwrap();
        }
        board
    }

    #[test]
    fn test_startpos_layout() {
        let board = BoardState::startpos();
        assert_eq!(board.pieces().count(), 32);
        assert_eq!(
            board.piece_on(Square::E1),
            Some(Piece::new(Color::White, PieceType::King))
        );
        assert_eq!(
            board.piece_on(Square::D8),
            Some(Piece::new(Color::Black, PieceType::Queen))
        );
        assert_eq!(board.castling(), CastlingRights::ALL);
        assert_eq!(board.side_to_move(), Color::White);
    }

    #[test]
    fn test_play_rejects_wrong_side_and_empty() {
        let mut board = BoardState::startpos();
        let e7e5 = Move::from_uci("e7e5").unwrap();
        assert!(matches!(board.play(e7e5), Err(BoardError::WrongSide(_))));
        let e4e5 = Move::from_uci("e4e5").unwrap();
        assert!(matches!(board.play(e4e5), Err(BoardError::EmptySource(_))));
        // 失敗しても局面は変わらない
        assert_eq!(board, BoardState::startpos());
    }

    #[test]
    fn test_double_push_sets_en_passant() {
        let board = play_all("e2e4");
        assert_eq!(board.en_passant(), Square::parse("e3"));
        // 取れる黒ポーンがいない
        assert_eq!(board.en_passant_capturable(), None);
    }

    #[test]
    fn test_en_passant_capture() {
        let board = play_all("e2e4 a7a6 e4e5 d7d5");
        assert_eq!(board.en_passant_capturable(), Square::parse("d6"));
        let mut board = board;
        board.play(Move::from_uci("e5d6").unwrap()).unwrap();
        assert_eq!(board.piece_on(Square::parse("d5").unwrap()), None);
        assert_eq!(
            board.piece_on(Square::parse("d6").unwrap()),
            Some(Piece::new(Color::White, PieceType::Pawn))
        );
    }

    #[test]
    fn test_castling_moves_rook_and_clears_rights() {
        let board = play_all("e2e4 e7e5 g1f3 b8c6 f1c4 g8f6 e1g1");
        assert_eq!(
            board.piece_on(Square::G1),
            Some(Piece::new(Color::White, PieceType::King))
        );
        assert_eq!(
            board.piece_on(Square::F1),
            Some(Piece::new(Color::White, PieceType::Rook))
        );
        assert_eq!(board.piece_on(Square::H1), None);
        assert!(!board.castling().contains(CastlingRights::WHITE_KING));
        assert!(!board.castling().contains(CastlingRights::WHITE_QUEEN));
        assert!(board.castling().contains(CastlingRights::BLACK_KING));
    }

    #[test]
    fn test_promotion() {
        let mut board = BoardState::empty();
        board.set_piece(
            Square::parse("a7").unwrap(),
            Some(Piece::new(Color::White, PieceType::Pawn)),
        );
        board.play(Move::from_uci("a7a8n").unwrap()).unwrap();
        assert_eq!(
            board.piece_on(Square::A8),
            Some(Piece::new(Color::White, PieceType::Knight))
        );
        assert_eq!(board.side_to_move(), Color::Black);
    }
}
