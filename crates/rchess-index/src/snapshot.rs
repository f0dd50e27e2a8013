//! Binary snapshot of a frozen index
//!
//! Little endian throughout. gzip-compressed when written with `compress`
//! or to a `.gz` path; loading detects compression from the content.
//!
//! ```text
//! header    : b"RCIX" | version u32
//! positions : count u64, then per position (ascending key)
//!             key u64 | min_ply u32 | occurrences u64 | edges u32 | EdgeRecord * edges
//! trie      : nodes u32, root = key u64 | descendants u64 | terminals
//!             then per node (parent before child)
//!             parent u32 | move u16 | key u64 | descendants u64 | terminals
//!             terminals = count u32 | game id u64 * count
//! games     : count u64, then per game (ascending id)
//!             id u64 | multiplicity u32 | year (u8 flag, u16) | white | black |
//!             result | eco | plies u32 | end key u64
//!             strings = u8 flag | len u32 | utf-8 bytes
//! ```

use std::io::{Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::info;

use crate::error::SnapshotError;
use crate::graph::{EdgeRecord, PositionGraph, PositionNode};
use crate::index::{FrozenIndex, IndexBuilder};
use crate::io::{open_reader, open_writer};
use crate::metadata::{GameSummary, MetadataIndex};
use crate::position::PositionKey;
use crate::record::GameId;
use crate::trie::{MoveTrie, NodeId};
use crate::types::Move;

const MAGIC: &[u8; 4] = b"RCIX";
const VERSION: u32 = 1;
const MAX_STRING_LEN: u32 = 1 << 16;
/// 壊れた件数で巨大な確保をしないための上限
const PREALLOC_CAP: usize = 1 << 16;

type SnapshotResult<T> = Result<T, SnapshotError>;

fn corrupt(msg: impl Into<String>) -> SnapshotError {
    SnapshotError::Corrupt(msg.into())
}

// ============================================================================
// Save
// ============================================================================

/// Write `index` to `path`
pub fn save_snapshot<P: AsRef<Path>>(index: &FrozenIndex, path: P, compress: bool) -> SnapshotResult<()> {
    let path = path.as_ref();
    let mut writer = open_writer(path, compress)?;
    write_snapshot(index, &mut writer)?;
    let compressed = writer.is_compressed();
    writer.close()?;
    let stats = index.stats();
    info!(
        "[snapshot] saved {} ({} positions, {} trie nodes, {} games{})",
        path.display(),
        stats.positions,
        stats.trie_nodes,
        stats.games,
        if compressed { ", gzip" } else { "" }
    );
    Ok(())
}

pub fn write_snapshot<W: Write>(index: &FrozenIndex, w: &mut W) -> SnapshotResult<()> {
    w.write_all(MAGIC)?;
    w.write_u32::<LittleEndian>(VERSION)?;
    write_positions(index.graph(), w)?;
    write_trie(index.trie(), w)?;
    write_games(index.metadata(), w)?;
    w.flush()?;
    Ok(())
}

fn write_positions<W: Write>(graph: &PositionGraph, w: &mut W) -> SnapshotResult<()> {
    let mut keys: Vec<_> = graph.iter().collect();
    keys.sort_unstable_by_key(|(k, _)| *k);
    w.write_u64::<LittleEndian>(keys.len() as u64)?;
    for (key, node) in keys {
        w.write_u64::<LittleEndian>(key.raw())?;
        w.write_u32::<LittleEndian>(node.min_ply)?;
        w.write_u64::<LittleEndian>(node.occurrences)?;
        w.write_u32::<LittleEndian>(node.edges().len() as u32)?;
        for edge in node.edges() {
            edge.write_to(w)?;
        }
    }
    Ok(())
}

fn write_terminals<W: Write>(terminals: &[GameId], w: &mut W) -> SnapshotResult<()> {
    w.write_u32::<LittleEndian>(terminals.len() as u32)?;
    for id in terminals {
        w.write_u64::<LittleEndian>(id.0)?;
    }
    Ok(())
}

fn write_trie<W: Write>(trie: &MoveTrie, w: &mut W) -> SnapshotResult<()> {
    w.write_u32::<LittleEndian>(trie.len() as u32)?;
    for (id, node) in trie.iter() {
        match (node.parent(), node.mv()) {
            (Some(parent), Some(mv)) => {
                w.write_u32::<LittleEndian>(parent.raw())?;
                w.write_u16::<LittleEndian>(mv.raw())?;
            }
            _ if id == NodeId::ROOT => {}
            _ => return Err(corrupt(format!("trie node {} has no parent", id.raw()))),
        }
        w.write_u64::<LittleEndian>(node.key().raw())?;
        w.write_u64::<LittleEndian>(node.descendants())?;
        write_terminals(node.terminals(), w)?;
    }
    Ok(())
}

fn write_opt_str<W: Write>(value: Option<&str>, w: &mut W) -> SnapshotResult<()> {
    match value {
        Some(s) => {
            w.write_u8(1)?;
            w.write_u32::<LittleEndian>(s.len() as u32)?;
            w.write_all(s.as_bytes())?;
        }
        None => w.write_u8(0)?,
    }
    Ok(())
}

fn write_games<W: Write>(metadata: &MetadataIndex, w: &mut W) -> SnapshotResult<()> {
    let games = metadata.summaries();
    w.write_u64::<LittleEndian>(games.len() as u64)?;
    for (id, s, count) in games {
        w.write_u64::<LittleEndian>(id.0)?;
        w.write_u32::<LittleEndian>(count)?;
        match s.year {
            Some(year) => {
                w.write_u8(1)?;
                w.write_u16::<LittleEndian>(year)?;
            }
            None => w.write_u8(0)?,
        }
        write_opt_str(s.white.as_deref(), w)?;
        write_opt_str(s.black.as_deref(), w)?;
        write_opt_str(s.result.as_deref(), w)?;
        write_opt_str(s.eco.as_deref(), w)?;
        w.write_u32::<LittleEndian>(s.plies)?;
        w.write_u64::<LittleEndian>(s.end_key.raw())?;
    }
    Ok(())
}

// ============================================================================
// Load
// ============================================================================

/// Read a snapshot written by `save_snapshot`
pub fn load_snapshot<P: AsRef<Path>>(path: P) -> SnapshotResult<FrozenIndex> {
    let path = path.as_ref();
    let mut reader = open_reader(path)?;
    let index = read_snapshot(&mut reader)?;
    let stats = index.stats();
    info!(
        "[snapshot] loaded {} ({} positions, {} trie nodes, {} games)",
        path.display(),
        stats.positions,
        stats.trie_nodes,
        stats.games
    );
    Ok(index)
}

pub fn read_snapshot<R: Read>(r: &mut R) -> SnapshotResult<FrozenIndex> {
    let mut magic = [0u8; 4];
    r.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(SnapshotError::BadMagic);
    }
    let version = r.read_u32::<LittleEndian>()?;
    if version != VERSION {
        return Err(SnapshotError::UnsupportedVersion(version));
    }
    let graph = read_positions(r)?;
    let trie = read_trie(r)?;
    let metadata = read_games(r)?;
    Ok(IndexBuilder::from_parts(graph, trie, metadata).freeze())
}

fn read_positions<R: Read>(r: &mut R) -> SnapshotResult<PositionGraph> {
    let count = r.read_u64::<LittleEndian>()?;
    let mut graph = PositionGraph::new();
    for _ in 0..count {
        let key = PositionKey(r.read_u64::<LittleEndian>()?);
        let min_ply = r.read_u32::<LittleEndian>()?;
        let occurrences = r.read_u64::<LittleEndian>()?;
        let edge_count = r.read_u32::<LittleEndian>()? as usize;
        let mut edges = Vec::with_capacity(edge_count.min(PREALLOC_CAP));
        for _ in 0..edge_count {
            edges.push(EdgeRecord::read_from(r)?);
        }
        if graph.contains(key) {
            return Err(corrupt(format!("duplicate position {key}")));
        }
        graph.insert_node(key, PositionNode::from_parts(min_ply, occurrences, edges));
    }
    Ok(graph)
}

fn read_terminals<R: Read>(r: &mut R) -> SnapshotResult<Vec<GameId>> {
    let count = r.read_u32::<LittleEndian>()? as usize;
    let mut ids = Vec::with_capacity(count.min(PREALLOC_CAP));
    for _ in 0..count {
        ids.push(GameId(r.read_u64::<LittleEndian>()?));
    }
    Ok(ids)
}

fn read_trie<R: Read>(r: &mut R) -> SnapshotResult<MoveTrie> {
    let count = r.read_u32::<LittleEndian>()?;
    if count == 0 {
        return Err(corrupt("trie without root"));
    }
    let root_key = PositionKey(r.read_u64::<LittleEndian>()?);
    let root_descendants = r.read_u64::<LittleEndian>()?;
    let root_terminals = read_terminals(r)?;
    if !root_terminals.is_sorted() {
        return Err(corrupt("unsorted terminals at root"));
    }
    let mut trie = MoveTrie::restore_root(root_key, root_descendants, root_terminals);

    for _ in 1..count {
        let parent = r.read_u32::<LittleEndian>()?;
        let raw = r.read_u16::<LittleEndian>()?;
        let mv = Move::from_raw(raw).ok_or_else(|| corrupt(format!("invalid packed move {raw:#06x}")))?;
        let key = PositionKey(r.read_u64::<LittleEndian>()?);
        let descendants = r.read_u64::<LittleEndian>()?;
        let terminals = read_terminals(r)?;
        trie.restore_child(NodeId::from_raw(parent), mv, key, descendants, terminals)
            .map_err(SnapshotError::Corrupt)?;
    }
    Ok(trie)
}

fn read_opt_str<R: Read>(r: &mut R) -> SnapshotResult<Option<String>> {
    if r.read_u8()? == 0 {
        return Ok(None);
    }
    let len = r.read_u32::<LittleEndian>()?;
    if len > MAX_STRING_LEN {
        return Err(corrupt(format!("string of {len} bytes")));
    }
    let mut buf = vec![0u8; len as usize];
    r.read_exact(&mut buf)?;
    String::from_utf8(buf)
        .map(Some)
        .map_err(|e| corrupt(e.to_string()))
}

fn read_games<R: Read>(r: &mut R) -> SnapshotResult<MetadataIndex> {
    let count = r.read_u64::<LittleEndian>()?;
    let mut metadata = MetadataIndex::new();
    for _ in 0..count {
        let id = GameId(r.read_u64::<LittleEndian>()?);
        let multiplicity = r.read_u32::<LittleEndian>()?;
        let year = match r.read_u8()? {
            0 => None,
            _ => Some(r.read_u16::<LittleEndian>()?),
        };
        let summary = GameSummary {
            year,
            white: read_opt_str(r)?,
            black: read_opt_str(r)?,
            result: read_opt_str(r)?,
            eco: read_opt_str(r)?,
            plies: r.read_u32::<LittleEndian>()?,
            end_key: PositionKey(r.read_u64::<LittleEndian>()?),
        };
        if metadata.game(id).is_some() {
            return Err(corrupt(format!("duplicate game {id}")));
        }
        for _ in 0..multiplicity {
            metadata.add(id, summary.clone());
        }
    }
    Ok(metadata)
}

impl FrozenIndex {
    pub fn save<P: AsRef<Path>>(&self, path: P, compress: bool) -> SnapshotResult<()> {
        save_snapshot(self, path, compress)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> SnapshotResult<FrozenIndex> {
        load_snapshot(path)
    }
}
