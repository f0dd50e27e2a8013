//! Error types for the index
//!
//! Malformed games never surface here: ingestion records them as skips in
//! the report. Only structural merge conflicts, backend failures and
//! snapshot/config problems are errors.

use std::path::PathBuf;

use crate::position::PositionKey;
use crate::record::GameId;
use crate::types::{Move, Square};

/// Mechanical board replay / FEN errors
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum BoardError {
    #[error("no piece on {0}")]
    EmptySource(Square),

    #[error("piece on {0} does not belong to the side to move")]
    WrongSide(Square),

    #[error("invalid FEN: {0}")]
    Fen(String),
}

/// Storage backend errors (spill / persistence)
#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("corrupt record at offset {offset}: {reason}")]
    Corrupt { offset: u64, reason: String },
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Snapshot encode/decode errors
#[derive(thiserror::Error, Debug)]
pub enum SnapshotError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("not an index snapshot (bad magic)")]
    BadMagic,

    #[error("unsupported snapshot version {0}")]
    UnsupportedVersion(u32),

    #[error("corrupt snapshot: {0}")]
    Corrupt(String),
}

/// Configuration loading errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Index-level errors
#[derive(thiserror::Error, Debug)]
pub enum IndexError {
    /// Two shards disagree on where the same transition leads
    #[error("merge conflict at {from} via {mv}: {left} vs {right}")]
    MergeConflict {
        from: PositionKey,
        mv: Move,
        left: PositionKey,
        right: PositionKey,
    },

    /// The same game id carries different metadata in two shards
    #[error("game {0} has conflicting metadata")]
    GameConflict(GameId),

    /// Trie insert arguments do not line up
    #[error("move sequence has {moves} plies but {keys} position keys")]
    LengthMismatch { moves: usize, keys: usize },

    /// An existing trie node disagrees with the key supplied for it
    #[error("trie node after ply {ply} holds {existing}, insert supplied {supplied}")]
    KeyMismatch {
        ply: usize,
        existing: PositionKey,
        supplied: PositionKey,
    },

    #[error("trie node arena is full ({0} nodes)")]
    TrieFull(usize),

    #[error("ingestion worker pool: {0}")]
    ThreadPool(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result type for index operations
pub type IndexResult<T> = Result<T, IndexError>;
