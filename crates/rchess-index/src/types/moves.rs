//! Move representation
//!
//! A move is packed into 16 bits so that edges and trie children can be stored
//! as fixed-width records. The raw value doubles as the canonical ordering key
//! used to break frequency ties.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::{PieceType, Square};

/// Packed move
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Move {
    /// Encoded move data (16-bit):
    /// - bits 0-5: source square (0-63)
    /// - bits 6-11: destination square (0-63)
    /// - bits 12-14: promotion piece (0 = none, 1 = N, 2 = B, 3 = R, 4 = Q)
    /// - bit 15: reserved
    data: u16,
}

impl Move {
    /// Null move (a1a1), never produced by a real game
    pub const NULL: Move = Move { data: 0 };

    #[inline]
    pub const fn new(from: Square, to: Square) -> Self {
        Move {
            data: from.raw() as u16 | ((to.raw() as u16) << 6),
        }
    }

    /// Create a promotion move. Non-promotable piece types are ignored.
    #[inline]
    pub fn with_promotion(from: Square, to: Square, promotion: PieceType) -> Self {
        let base = Self::new(from, to);
        let code = match promotion {
            PieceType::Knight => 1,
            PieceType::Bishop => 2,
            PieceType::Rook => 3,
            PieceType::Queen => 4,
            _ => 0,
        };
        Move {
            data: base.data | (code << 12),
        }
    }

    /// Rebuild from the packed representation (snapshot / spill records).
    /// Rejects values with out-of-range promotion bits.
    pub const fn from_raw(data: u16) -> Option<Self> {
        if data >> 15 != 0 || (data >> 12) & 0x7 > 4 {
            return None;
        }
        Some(Move { data })
    }

    #[inline]
    pub const fn raw(self) -> u16 {
        self.data
    }

    #[inline]
    pub fn from_sq(self) -> Square {
        // 6bit マスクなので常に盤内
        Square::new((self.data & 0x3f) as u8).unwrap_or(Square::A1)
    }

    #[inline]
    pub fn to_sq(self) -> Square {
        Square::new(((self.data >> 6) & 0x3f) as u8).unwrap_or(Square::A1)
    }

    pub fn promotion(self) -> Option<PieceType> {
        match (self.data >> 12) & 0x7 {
            1 => Some(PieceType::Knight),
            2 => Some(PieceType::Bishop),
            3 => Some(PieceType::Rook),
            4 => Some(PieceType::Queen),
            _ => None,
        }
    }

    /// Parse UCI coordinate notation ("e2e4", "e7e8q").
    pub fn from_uci(s: &str) -> Option<Move> {
        if !s.is_ascii() || !(4..=5).contains(&s.len()) {
            return None;
        }
        let from = Square::parse(&s[0..2])?;
        let to = Square::parse(&s[2..4])?;
        match s[4..].chars().next() {
            None => Some(Move::new(from, to)),
            Some(c) => {
                let pt = PieceType::from_char(c)?;
                if !pt.is_promotion_target() {
                    return None;
                }
                Some(Move::with_promotion(from, to, pt))
            }
        }
    }

    pub fn to_uci(self) -> String {
        let mut s = format!("{}{}", self.from_sq(), self.to_sq());
        if let Some(pt) = self.promotion() {
            s.push(pt.to_char());
        }
        s
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_uci())
    }
}

impl Serialize for Move {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_uci())
    }
}

impl<'de> Deserialize<'de> for Move {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Move::from_uci(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid UCI move: {s:?}")))
    }
}

/// Parse a whitespace separated UCI line ("e2e4 e7e5 g1f3").
pub fn parse_uci_line(line: &str) -> Option<Vec<Move>> {
    line.split_whitespace().map(Move::from_uci).collect()
}
