//! Shard-parallel builds must not depend on partitioning or merge order

mod common;

use common::{archive, build, game, init_logger};
use rchess_index::{IndexBuilder, IndexConfig, IndexError, IngestionPipeline, PositionKey};

fn merged(parts: Vec<IndexBuilder>) -> IndexBuilder {
    let mut acc = IndexBuilder::new();
    for part in parts {
        acc.merge(part).unwrap();
    }
    acc
}

#[test]
fn test_partitioning_does_not_change_result() {
    init_logger();
    let games = archive();
    let single = build(games.clone());

    for shard_count in 1..=games.len() {
        let mut shards: Vec<Vec<_>> = vec![Vec::new(); shard_count];
        for (i, g) in games.iter().enumerate() {
            shards[i % shard_count].push(g.clone());
        }
        let parts: Vec<_> = shards.into_iter().map(build).collect();
        assert_eq!(merged(parts), single, "{shard_count} shards");
    }
}

#[test]
fn test_merge_commutative_and_associative() {
    let games = archive();
    let a = build(games[..3].to_vec());
    let b = build(games[3..5].to_vec());
    let c = build(games[5..].to_vec());

    let mut ab = a.clone();
    ab.merge(b.clone()).unwrap();
    let mut ba = b.clone();
    ba.merge(a.clone()).unwrap();
    assert_eq!(ab, ba);

    let mut ab_c = ab;
    ab_c.merge(c.clone()).unwrap();
    let mut bc = b;
    bc.merge(c).unwrap();
    let mut a_bc = a;
    a_bc.merge(bc).unwrap();
    assert_eq!(ab_c, a_bc);
}

#[test]
fn test_parallel_shards_match_sequential() {
    let config = IndexConfig {
        threads: 3,
        ..Default::default()
    };
    let pipeline = IngestionPipeline::new(&config);
    let games = archive();

    let mut sequential = IndexBuilder::new();
    let seq_report = pipeline.ingest(&mut sequential, games.clone()).unwrap();

    let shards: Vec<Vec<_>> = games.chunks(3).map(|c| c.to_vec()).collect();
    let mut parallel = IndexBuilder::new();
    let par_report = pipeline.ingest_shards(&mut parallel, shards).unwrap();

    assert_eq!(sequential, parallel);
    assert_eq!(seq_report.processed, par_report.processed);
    assert_eq!(seq_report.plies, par_report.plies);
    assert_eq!(seq_report.new_positions, par_report.new_positions);
}

#[test]
fn test_parallel_ingest_into_existing_builder() {
    let pipeline = IngestionPipeline::default();
    let games = archive();
    let mut builder = build(games[..4].to_vec());
    let before = builder.stats().positions;
    let report = pipeline
        .ingest_shards(&mut builder, vec![games[4..6].to_vec(), games[6..].to_vec()])
        .unwrap();
    assert_eq!(builder, build(games));
    assert_eq!(report.new_positions as usize, builder.stats().positions - before);
}

#[test]
fn test_conflicting_shard_aborts_merge() {
    let mut good = build(vec![game(1, "e2e4 e7e5")]);
    let before = good.clone();

    // 同じ (局面, 手) が別の局面へ進むシャード（衝突したハッシュの再現）
    let mut bad = IndexBuilder::new();
    let mut graph = bad.graph().clone();
    let start = rchess_index::PositionHasher.startpos();
    graph.upsert_edge(start, common::moves("e2e4")[0], PositionKey(0xdead_beef));
    bad = IndexBuilder::from_parts(graph, bad.trie().clone(), bad.metadata().clone());

    let err = good.merge(bad).unwrap_err();
    assert!(matches!(err, IndexError::MergeConflict { .. }), "{err}");
    assert_eq!(good, before);
}
