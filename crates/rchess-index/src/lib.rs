//! # rchess-index
//!
//! 大量の棋譜アーカイブから、局面キーで引く遷移グラフと手順で引くトライを
//! 同時に構築するインデックスライブラリ。
//!
//! ## モジュール構成
//!
//! - `types`: 基本型（Color, Square, Piece, Move, BoardState, FEN）
//! - `position`: Zobrist ハッシュによる局面キーと差分更新
//! - `graph`: 局面 → (指し手, 次局面, 頻度) の遷移グラフ
//! - `trie`: 手順のトライ（ノードアリーナ）
//! - `metadata`: 年・選手・ECO の二次索引
//! - `record`: 外部パーサから受け取る棋譜レコード
//! - `ingest`: 1局単位でトランザクショナルなインジェストとシャード並列構築
//! - `index`: ビルダー（構築中）とフリーズ済みインデックス
//! - `query`: 読み取り専用クエリ
//! - `storage`: 深い局面の退避先（StorageBackend）
//! - `snapshot`: バイナリスナップショット
//!
//! ```
//! use std::sync::Arc;
//! use rchess_index::{GameHeaders, GameId, GameRecord, IndexBuilder, IngestionPipeline, QueryEngine};
//! use rchess_index::types::parse_uci_line;
//!
//! let games = ["e2e4 e7e5 g1f3", "e2e4 e7e5 b1c3"]
//!     .iter()
//!     .enumerate()
//!     .map(|(i, line)| GameRecord::from_uci_line(GameId(i as u64), GameHeaders::default(), line)
//!         .map_err(|e| rchess_index::RejectedGame::new(None, e.to_string())));
//!
//! let mut builder = IndexBuilder::new();
//! let report = IngestionPipeline::default().ingest(&mut builder, games).unwrap();
//! assert_eq!(report.processed, 2);
//!
//! let query = QueryEngine::new(Arc::new(builder.freeze()));
//! let node = query.sequence_node(&parse_uci_line("e2e4 e7e5").unwrap()).unwrap();
//! assert_eq!(node.descendants, 2);
//! ```

// 基本型と局面キー
pub mod position;
pub mod types;

// 索引本体
pub mod graph;
pub mod metadata;
pub mod trie;

// 構築
pub mod index;
pub mod ingest;
pub mod record;

// 参照・永続化
pub mod query;
pub mod snapshot;
pub mod storage;

pub mod config;
pub mod error;
pub mod io;

pub use config::IndexConfig;
pub use error::{BoardError, ConfigError, IndexError, IndexResult, SnapshotError, StorageError};
pub use graph::{EdgeLookup, EdgeRecord, PositionGraph, TieredGraph};
pub use index::{FrozenIndex, IndexBuilder, IndexStats, PruneStats};
pub use ingest::{CancelToken, IngestionPipeline, IngestionReport, SkipReason};
pub use metadata::{GameSummary, MetadataIndex};
pub use position::{PositionHasher, PositionKey};
pub use query::{Divergence, QueryEngine, SequenceNode, divergence_of};
pub use record::{GameHeaders, GameId, GameRecord, JsonLinesSource, PlyRecord, RejectedGame};
pub use storage::{FileBackend, MemoryBackend, StorageBackend};
pub use trie::{MoveTrie, NodeId};
