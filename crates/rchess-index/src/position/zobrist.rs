//! Zobrist hashing for position identification
//!
//! Provides the deterministic 64-bit fingerprint that keys both the position
//! graph and the trie nodes, plus O(1)-per-move incremental updates.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

use super::BoardDelta;
use crate::types::{BoardState, CastlingRights, Color, Piece, PieceType, Square};

/// Fixed table seed. DO NOT CHANGE: every persisted snapshot is keyed by it.
const ZOBRIST_SEED: u64 = 0x7061_776e_6b65_7973;

/// 64-bit position fingerprint
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PositionKey(pub u64);

impl PositionKey {
    #[inline]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PositionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl fmt::Debug for PositionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PositionKey({:016x})", self.0)
    }
}

impl FromStr for PositionKey {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        u64::from_str_radix(s, 16).map(PositionKey)
    }
}

/// Zobrist hash tables
pub struct ZobristTable {
    /// Hash values for pieces on squares \[color\]\[piece_type\]\[square\]
    pub piece_square: [[[u64; Square::NUM]; PieceType::NUM]; Color::NUM],

    /// One value per castling flag, in KQkq order
    pub castling: [u64; 4],

    /// One value per en-passant file (a..h)
    pub en_passant: [u64; 8],

    /// Hash value for side to move (Black)
    pub side_to_move: u64,
}

impl Default for ZobristTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ZobristTable {
    /// Create the Zobrist table. Values depend only on `ZOBRIST_SEED` and the
    /// draw order below.
    pub fn new() -> Self {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(ZOBRIST_SEED);

        let mut table = ZobristTable {
            piece_square: [[[0; Square::NUM]; PieceType::NUM]; Color::NUM],
            castling: [0; 4],
            en_passant: [0; 8],
            side_to_move: 0,
        };

        for color in 0..Color::NUM {
            for piece_type in 0..PieceType::NUM {
                for sq in 0..Square::NUM {
                    table.piece_square[color][piece_type][sq] = rng.random();
                }
            }
        }
        for value in table.castling.iter_mut() {
            *value = rng.random();
        }
        for value in table.en_passant.iter_mut() {
            *value = rng.random();
        }
        table.side_to_move = rng.random();

        table
    }

    /// Get hash value for a piece on a square
    #[inline]
    pub fn piece_square_hash(&self, piece: Piece, sq: Square) -> u64 {
        self.piece_square[piece.color.index()][piece.piece_type.index()][sq.index()]
    }

    /// XOR of the values for every flag set in `rights`
    #[inline]
    pub fn castling_hash(&self, rights: CastlingRights) -> u64 {
        CastlingRights::FLAGS
            .iter()
            .zip(self.castling.iter())
            .filter(|((flag, _), _)| rights.contains(*flag))
            .fold(0, |acc, (_, value)| acc ^ value)
    }

    #[inline]
    pub fn en_passant_hash(&self, sq: Option<Square>) -> u64 {
        sq.map_or(0, |sq| self.en_passant[sq.file() as usize])
    }

    #[inline]
    pub fn side_hash(&self, color: Color) -> u64 {
        match color {
            Color::White => 0,
            Color::Black => self.side_to_move,
        }
    }
}

/// Global Zobrist table instance
pub static ZOBRIST: LazyLock<ZobristTable> = LazyLock::new(ZobristTable::new);

/// Fingerprinting of board states.
///
/// Collisions are not detected: two distinct positions with equal keys are
/// merged in the graph. At 64 bits this is an accepted risk for archive-scale
/// data, not a guarantee under adversarial input.
#[derive(Debug, Clone, Copy, Default)]
pub struct PositionHasher;

impl PositionHasher {
    /// Compute the key from scratch
    pub fn hash(&self, board: &BoardState) -> PositionKey {
        let table = &*ZOBRIST;
        let mut hash = 0u64;
        for (sq, piece) in board.pieces() {
            hash ^= table.piece_square_hash(piece, sq);
        }
        hash ^= table.castling_hash(board.castling());
        hash ^= table.en_passant_hash(board.en_passant_capturable());
        hash ^= table.side_hash(board.side_to_move());
        PositionKey(hash)
    }

    /// Key of the standard initial position
    pub fn startpos(&self) -> PositionKey {
        static STARTPOS: LazyLock<PositionKey> =
            LazyLock::new(|| PositionHasher.hash(&BoardState::startpos()));
        *STARTPOS
    }

    /// Apply a delta: XOR out the old contributions, XOR in the new ones.
    pub fn update(&self, key: PositionKey, delta: &BoardDelta) -> PositionKey {
        let table = &*ZOBRIST;
        let mut hash = key.0;
        for change in &delta.squares {
            if let Some(old) = change.before {
                hash ^= table.piece_square_hash(old, change.square);
            }
            if let Some(new) = change.after {
                hash ^= table.piece_square_hash(new, change.square);
            }
        }
        if delta.castling_before != delta.castling_after {
            hash ^= table.castling_hash(delta.castling_before);
            hash ^= table.castling_hash(delta.castling_after);
        }
        if delta.en_passant_before != delta.en_passant_after {
            hash ^= table.en_passant_hash(delta.en_passant_before);
            hash ^= table.en_passant_hash(delta.en_passant_after);
        }
        if delta.side_flipped {
            hash ^= table.side_to_move;
        }
        PositionKey(hash)
    }
}
