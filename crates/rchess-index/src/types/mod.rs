//! 基本型: 手番・駒・マス・指し手・盤面

mod board;
mod color;
mod fen;
mod moves;
mod piece;
mod square;

pub use board::{BoardState, CastlingRights};
pub use color::Color;
pub use fen::STANDARD_FEN;
pub use moves::{Move, parse_uci_line};
pub use piece::{Piece, PieceType};
pub use square::Square;
