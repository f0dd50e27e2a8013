//! Game records handed over by the parsing / move-legality collaborator
//!
//! The index never parses game text or checks legality. It trusts each
//! `PlyRecord` (move plus resulting board) and treats a `RejectedGame` as a
//! skip signal.

use std::fmt;
use std::io::{self, BufRead};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::BoardError;
use crate::types::{BoardState, Move};

/// Game identifier assigned by the collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameId(pub u64);

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Raw header values as they appeared in the source
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameHeaders {
    pub date: Option<String>,
    pub white: Option<String>,
    pub black: Option<String>,
    pub result: Option<String>,
    pub eco: Option<String>,
}

/// One ply: the move and the board it produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlyRecord {
    #[serde(rename = "move")]
    pub mv: Move,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub san: Option<String>,
    pub board: BoardState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameRecord {
    pub id: GameId,
    #[serde(default)]
    pub headers: GameHeaders,
    /// Starting position when it is not the standard one (FEN "SetUp" games)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<BoardState>,
    pub plies: Vec<PlyRecord>,
}

impl GameRecord {
    /// Build a record by replaying UCI moves from the initial position.
    ///
    /// Stands in for the collaborator in tests and small tools; it applies
    /// moves mechanically and does not check legality.
    pub fn from_uci_line(id: GameId, headers: GameHeaders, line: &str) -> Result<Self, BoardError> {
        let mut board = BoardState::startpos();
        let mut plies = Vec::new();
        for text in line.split_whitespace() {
            let mv = Move::from_uci(text).ok_or_else(|| BoardError::Fen(format!("bad move {text:?}")))?;
            board.play(mv)?;
            plies.push(PlyRecord {
                mv,
                san: None,
                board: board.clone(),
            });
        }
        Ok(GameRecord {
            id,
            headers,
            start: None,
            plies,
        })
    }

    pub fn moves(&self) -> impl Iterator<Item = Move> + '_ {
        self.plies.iter().map(|p| p.mv)
    }

    pub fn ply_count(&self) -> usize {
        self.plies.len()
    }
}

/// A game the collaborator could not turn into a record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedGame {
    pub id: Option<GameId>,
    pub reason: String,
}

impl RejectedGame {
    pub fn new(id: Option<GameId>, reason: impl Into<String>) -> Self {
        RejectedGame {
            id,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for RejectedGame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id {
            Some(id) => write!(f, "game {id} rejected: {}", self.reason),
            None => write!(f, "game rejected: {}", self.reason),
        }
    }
}

impl std::error::Error for RejectedGame {}

/// Adapts JSON Lines (one `GameRecord` object per line) into the ingestion
/// input. Undecodable lines become rejections; a read error ends the stream
/// after being reported once.
pub struct JsonLinesSource<R> {
    lines: io::Lines<R>,
    line_no: usize,
    done: bool,
}

impl<R: BufRead> JsonLinesSource<R> {
    pub fn new(reader: R) -> Self {
        JsonLinesSource {
            lines: reader.lines(),
            line_no: 0,
            done: false,
        }
    }
}

impl JsonLinesSource<Box<dyn BufRead + Send>> {
    /// Open a (possibly gzip-compressed) JSON Lines file
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        crate::io::open_reader(path).map(JsonLinesSource::new)
    }
}

impl<R: BufRead> Iterator for JsonLinesSource<R> {
    type Item = Result<GameRecord, RejectedGame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            self.line_no += 1;
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => {
                    self.done = true;
                    return Some(Err(RejectedGame::new(None, format!("line {}: {e}", self.line_no))));
                }
            };
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            return Some(
                serde_json::from_str::<GameRecord>(trimmed)
                    .map_err(|e| RejectedGame::new(None, format!("line {}: {e}", self.line_no))),
            );
        }
    }
}
