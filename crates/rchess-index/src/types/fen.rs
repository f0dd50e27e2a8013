//! FEN 変換
//!
//! 先頭4フィールド（駒配置・手番・キャスリング・アンパッサン）だけを扱う。
//! 手数カウンタは解析時に読み捨て、出力時は `0 1` 固定。

use super::{BoardState, CastlingRights, Color, Piece, Square};
use crate::error::BoardError;

/// 標準初期局面の FEN
pub const STANDARD_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

impl BoardState {
    pub fn from_fen(fen: &str) -> Result<BoardState, BoardError> {
        let bad = |what: &str| BoardError::Fen(format!("{what} in {fen:?}"));
        let mut fields = fen.split_whitespace();
        let placement = fields.next().ok_or_else(|| bad("missing placement"))?;
        let side = fields.next().unwrap_or("w");
        let castling = fields.next().unwrap_or("-");
        let en_passant = fields.next().unwrap_or("-");

        let mut board = BoardState::empty();
        let ranks: Vec<&str> = placement.split('/').collect();
        if ranks.len() != 8 {
            return Err(bad("expected 8 ranks"));
        }
        for (i, rank_text) in ranks.iter().enumerate() {
            let rank = 7 - i as u8;
            let mut file = 0u8;
            for c in rank_text.chars() {
                if let Some(skip) = c.to_digit(10) {
                    file += skip as u8;
                    continue;
                }
                let piece = Piece::from_char(c).ok_or_else(|| bad("invalid piece"))?;
                let sq = Square::from_file_rank(file, rank).ok_or_else(|| bad("rank overflow"))?;
                board.set_piece(sq, Some(piece));
                file += 1;
            }
            if file != 8 {
                return Err(bad("rank does not cover 8 files"));
            }
        }

        board.set_side_to_move(match side {
            "w" => Color::White,
            "b" => Color::Black,
            _ => return Err(bad("invalid side to move")),
        });

        let mut rights = CastlingRights::NONE;
        if castling != "-" {
            for c in castling.chars() {
                let (flag, _) = CastlingRights::FLAGS
                    .iter()
                    .find(|(_, fc)| *fc == c)
                    .ok_or_else(|| bad("invalid castling flag"))?;
                rights.insert(*flag);
            }
        }
        board.set_castling(rights);

        board.set_en_passant(match en_passant {
            "-" => None,
            text => Some(Square::parse(text).ok_or_else(|| bad("invalid en-passant square"))?),
        });
        Ok(board)
    }

    pub fn to_fen(&self) -> String {
        let mut out = String::with_capacity(72);
        for rank in (0..8u8).rev() {
            let mut empty = 0;
            for file in 0..8u8 {
                let piece = Square::from_file_rank(file, rank).and_then(|sq| self.piece_on(sq));
                match piece {
                    Some(p) => {
                        if empty > 0 {
                            out.push(char::from(b'0' + empty));
                            empty = 0;
                        }
                        out.push(p.to_char());
                    }
                    None => empty += 1,
                }
            }
            if empty > 0 {
                out.push(char::from(b'0' + empty));
            }
            if rank > 0 {
                out.push('/');
            }
        }
        out.push(' ');
        out.push(self.side_to_move().fen_char());
        out.push(' ');
        let rights = self.castling();
        if rights == CastlingRights::NONE {
            out.push('-');
        } else {
            for (flag, c) in CastlingRights::FLAGS {
                if rights.contains(flag) {
                    out.push(c);
                }
            }
        }
        out.push(' ');
        match self.en_passant() {
            Some(sq) => out.push_str(&sq.to_string()),
            None => out.push('-'),
        }
        out.push_str(" 0 1");
        out
    }
}
