//! Ingestion pipeline
//!
//! 1局ごとに更新内容を `StagedGame` に溜め、全体が妥当と確認できた場合だけ
//! グラフ・トライ・メタデータへ反映する。途中で失敗した対局は何も残さない。
//!
//! 並列版（`ingest_shards`）はシャードごとに専用の `IndexBuilder` を作り、
//! rayon の木構造リダクションでマージする。マージは可換・結合的なので、
//! シャード数や分割方法に結果は依存しない。

mod report;
mod staged;

pub use report::{IngestionReport, SkipReason, SkipSample};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info, warn};
use rayon::prelude::*;

use crate::config::IndexConfig;
use crate::error::{IndexError, IndexResult};
use crate::index::IndexBuilder;
use crate::record::{GameId, GameRecord, RejectedGame};
use staged::StagedGame;

/// Cooperative cancellation flag, checked between games
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Drives games into an `IndexBuilder`
#[derive(Debug, Clone)]
pub struct IngestionPipeline {
    threads: usize,
    max_plies: usize,
    max_error_samples: usize,
    progress_interval: u64,
    cancel: CancelToken,
}

impl Default for IngestionPipeline {
    fn default() -> Self {
        Self::new(&IndexConfig::default())
    }
}

impl IngestionPipeline {
    pub fn new(config: &IndexConfig) -> Self {
        IngestionPipeline {
            threads: config.threads,
            max_plies: config.max_plies,
            max_error_samples: config.max_error_samples,
            progress_interval: config.progress_interval,
            cancel: CancelToken::new(),
        }
    }

    /// Share an existing token (e.g. one wired to a signal handler)
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Ingest games sequentially into `builder`.
    ///
    /// Never fails on bad games: they are skipped and counted.
    pub fn ingest<I>(&self, builder: &mut IndexBuilder, games: I) -> IndexResult<IngestionReport>
    where
        I: IntoIterator<Item = Result<GameRecord, RejectedGame>>,
    {
        let report = self.run(builder, games)?;
        info!("[ingest] {report}");
        Ok(report)
    }

    fn run<I>(&self, builder: &mut IndexBuilder, games: I) -> IndexResult<IngestionReport>
    where
        I: IntoIterator<Item = Result<GameRecord, RejectedGame>>,
    {
        let mut report = IngestionReport::default();
        let positions_before = builder.graph.len();

        for item in games {
            // 対局の境界でのみ中断を確認する
            if self.cancel.is_cancelled() {
                report.cancelled = true;
                warn!("[ingest] cancelled after {} games", report.total());
                break;
            }

            let game = match item {
                Ok(game) => game,
                Err(rejected) => {
                    self.skip(&mut report, rejected.id, SkipReason::Rejected, rejected.reason);
                    continue;
                }
            };

            let staged = match StagedGame::stage(&game, self.max_plies)
                .and_then(|staged| staged.validate(builder).map(|()| staged))
            {
                Ok(staged) => staged,
                Err((reason, detail)) => {
                    self.skip(&mut report, Some(game.id), reason, detail);
                    continue;
                }
            };

            report.plies += staged.plies() as u64;
            staged.commit(builder)?;
            report.processed += 1;

            if self.progress_interval > 0 && report.total() % self.progress_interval == 0 {
                info!("[ingest] {} games ({} skipped)", report.total(), report.skipped);
            }
        }

        report.new_positions = (builder.graph.len() - positions_before) as u64;
        Ok(report)
    }

    fn skip(
        &self,
        report: &mut IngestionReport,
        game: Option<GameId>,
        reason: SkipReason,
        detail: String,
    ) {
        debug!("[ingest] skip {game:?}: {reason} ({detail})");
        report.record_skip(SkipSample { game, reason, detail }, self.max_error_samples);
    }

    /// Ingest shards in parallel, each into its own private builder, then
    /// merge the results into `builder`.
    ///
    /// A merge conflict aborts the whole call and leaves `builder` untouched.
    pub fn ingest_shards<S>(&self, builder: &mut IndexBuilder, shards: Vec<S>) -> IndexResult<IngestionReport>
    where
        S: IntoIterator<Item = Result<GameRecord, RejectedGame>> + Send,
    {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .thread_name(|i| format!("ingest-{i}"))
            .build()
            .map_err(|e| IndexError::ThreadPool(e.to_string()))?;

        let shard_count = shards.len();
        let max_samples = self.max_error_samples;
        let (merged, mut report) = pool.install(|| {
            shards
                .into_par_iter()
                .map(|shard| -> IndexResult<(IndexBuilder, IngestionReport)> {
                    let mut local = IndexBuilder::new();
                    let report = self.run(&mut local, shard)?;
                    Ok((local, report))
                })
                .try_reduce(
                    || (IndexBuilder::new(), IngestionReport::default()),
                    |(mut a, mut ra), (b, rb)| {
                        a.merge(b)?;
                        ra.absorb(rb, max_samples);
                        Ok((a, ra))
                    },
                )
        })?;

        let positions_before = builder.graph.len();
        builder.merge(merged)?;
        // シャード単位の新規局面数は重複して数えられるので、マージ後に数え直す
        report.new_positions = (builder.graph.len() - positions_before) as u64;
        info!("[ingest] {shard_count} shards on {} threads: {report}", pool.current_num_threads());
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::PositionHasher;
    use crate::record::GameHeaders;
    use crate::types::BoardState;

    fn game(id: u64, line: &str) -> Result<GameRecord, RejectedGame> {
        Ok(GameRecord::from_uci_line(GameId(id), GameHeaders::default(), line).unwrap())
    }

    #[test]
    fn test_skips_do_not_abort() {
        let pipeline = IngestionPipeline::default();
        let mut builder = IndexBuilder::new();
        let mut non_standard = game(3, "e2e4").unwrap();
        non_standard.start = Some(BoardState::empty());

        let games = vec![
            game(1, "e2e4 e7e5"),
            Err(RejectedGame::new(Some(GameId(2)), "illegal move")),
            Ok(non_standard),
            game(4, ""),
            game(5, "d2d4"),
        ];
        let report = pipeline.ingest(&mut builder, games).unwrap();
        assert_eq!(report.processed, 2);
        assert_eq!(report.skipped, 3);
        assert_eq!(report.plies, 3);
        assert_eq!(report.skipped_by_reason[&SkipReason::Rejected], 1);
        assert_eq!(report.skipped_by_reason[&SkipReason::NonStandardStart], 1);
        assert_eq!(report.skipped_by_reason[&SkipReason::Empty], 1);
        // 初期局面 + e4 + e4e5 + d4
        assert_eq!(report.new_positions, 4);
        assert_eq!(builder.graph().position(PositionHasher.startpos()).unwrap().occurrences, 2);
    }

    #[test]
    fn test_too_long_and_duplicate_id() {
        let config = IndexConfig {
            max_plies: 2,
            ..Default::default()
        };
        let pipeline = IngestionPipeline::new(&config);
        let mut builder = IndexBuilder::new();
        let mut renamed = game(1, "e2e4").unwrap();
        renamed.headers.white = Some("Someone".to_string());
        let games = vec![game(1, "e2e4"), game(2, "e2e4 e7e5 g1f3"), Ok(renamed), game(1, "e2e4")];
        let report = pipeline.ingest(&mut builder, games).unwrap();
        assert_eq!(report.processed, 2);
        assert_eq!(report.skipped_by_reason[&SkipReason::TooLong], 1);
        assert_eq!(report.skipped_by_reason[&SkipReason::DuplicateId], 1);
        assert_eq!(builder.metadata().multiplicity(GameId(1)), 2);
    }

    #[test]
    fn test_cancel_before_start() {
        let pipeline = IngestionPipeline::default();
        pipeline.cancel_token().cancel();
        let mut builder = IndexBuilder::new();
        let report = pipeline.ingest(&mut builder, vec![game(1, "e2e4")]).unwrap();
        assert!(report.cancelled);
        assert_eq!(report.processed, 0);
        assert!(builder.trie().is_empty());
        assert!(builder.graph().is_empty());
    }

    #[test]
    fn test_cancel_mid_stream_keeps_whole_games() {
        let pipeline = IngestionPipeline::default();
        let token = pipeline.cancel_token().clone();
        let mut builder = IndexBuilder::new();
        let games = (1..=10u64).map(move |id| {
            if id == 4 {
                token.cancel();
            }
            game(id, "e2e4 e7e5 g1f3")
        });
        let report = pipeline.ingest(&mut builder, games).unwrap();
        assert!(report.cancelled);
        // 4局目を取り出した時点で中断要求が出ているので、その対局は反映されない
        assert_eq!(report.processed, 3);
        let node = builder.trie().lookup(&crate::types::parse_uci_line("e2e4 e7e5 g1f3").unwrap()).unwrap();
        assert_eq!(builder.trie().node(node).unwrap().descendants(), 3);
        assert_eq!(builder.trie().root().descendants(), 3);
    }

    #[test]
    fn test_shards_equal_single_pass() {
        let lines = ["e2e4 e7e5 g1f3", "e2e4 e7e5 b1c3", "d2d4 d7d5", "e2e4 c7c5", "g1f3 g8f6 b1c3", "b1c3 g8f6 g1f3"];
        let all: Vec<_> = lines.iter().enumerate().map(|(i, l)| game(i as u64, l)).collect();

        let pipeline = IngestionPipeline::default();
        let mut single = IndexBuilder::new();
        let r1 = pipeline.ingest(&mut single, all.clone()).unwrap();

        let shards: Vec<Vec<_>> = vec![all[..1].to_vec(), all[1..4].to_vec(), all[4..].to_vec()];
        let mut sharded = IndexBuilder::new();
        let r2 = pipeline.ingest_shards(&mut sharded, shards).unwrap();

        assert_eq!(single, sharded);
        assert_eq!(r1.processed, r2.processed);
        assert_eq!(r1.new_positions, r2.new_positions);
    }
}
