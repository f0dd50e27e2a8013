//! Shared fixtures for integration tests

#![allow(dead_code)]

use rchess_index::types::{Move, parse_uci_line};
use rchess_index::{GameHeaders, GameId, GameRecord, IndexBuilder, IngestionPipeline, RejectedGame};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn moves(line: &str) -> Vec<Move> {
    parse_uci_line(line).expect("valid UCI line")
}

pub fn game(id: u64, line: &str) -> Result<GameRecord, RejectedGame> {
    Ok(GameRecord::from_uci_line(GameId(id), GameHeaders::default(), line).expect("replayable line"))
}

pub fn game_with(id: u64, line: &str, date: &str, white: &str, black: &str, eco: &str) -> Result<GameRecord, RejectedGame> {
    let headers = GameHeaders {
        date: Some(date.to_string()),
        white: Some(white.to_string()),
        black: Some(black.to_string()),
        result: Some("1/2-1/2".to_string()),
        eco: Some(eco.to_string()),
    };
    Ok(GameRecord::from_uci_line(GameId(id), headers, line).expect("replayable line"))
}

/// A small archive with shared prefixes and one transposition
pub fn archive() -> Vec<Result<GameRecord, RejectedGame>> {
    vec![
        game_with(1, "e2e4 e7e5 g1f3 b8c6 f1b5 a7a6", "1962.05.01", "Fischer, Robert", "Tal, Mikhail", "C78"),
        game_with(2, "e2e4 e7e5 g1f3 b8c6 f1c4", "1962.06.11", "Tal, Mikhail", "Fischer, Robert", "C50"),
        game_with(3, "e2e4 c7c5 g1f3 d7d6 d2d4", "1972.07.11", "Spassky, Boris", "Fischer, Robert", "B44"),
        game_with(4, "d2d4 g8f6 c2c4 e7e6", "1985.09.03", "Karpov, Anatoly", "Kasparov, Garry", "E12"),
        game_with(5, "g1f3 g8f6 c2c4 e7e6", "1985.10.15", "Kasparov, Garry", "Karpov, Anatoly", "A13"),
        game(6, "c2c4 g8f6 g1f3 e7e6"),
        game(7, "e2e4 e7e5"),
        game(8, "e2e4 e7e5 g1f3 b8c6 f1b5 a7a6"),
    ]
}

pub fn build(games: Vec<Result<GameRecord, RejectedGame>>) -> IndexBuilder {
    let mut builder = IndexBuilder::new();
    IngestionPipeline::default()
        .ingest(&mut builder, games)
        .expect("ingestion never fails on game data");
    builder
}
