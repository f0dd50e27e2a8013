//! Secondary indexes: year, player and opening code → game ids
//!
//! Updated in the same pass as the graph and trie. Header values are
//! normalized on the way in, so queries match regardless of how the source
//! spelled a name.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{IndexError, IndexResult};
use crate::position::PositionKey;
use crate::record::{GameHeaders, GameId};

/// Header values that mean "unknown"
const EMPTY_HEADER_VALUES: &[&str] = &[
    "?", "??", "???", "????", "x", "xx", "xxx", "xxxx", "-", "--", "---", "----", "*", "**", "***",
    "****", "#", "##", "###", "####", ".", "..", "...", "....", "????.??.??", "xxxx.xx.xx",
    "####.##.##", "????.??", "xxxx.xx", "####.##", "n/a", "unknown", "none", "no", "no date",
    "no name", "no event",
];

/// Trim and drop placeholder values
pub fn clean_header(value: Option<&str>) -> Option<String> {
    let v = value?.trim();
    if v.is_empty() || EMPTY_HEADER_VALUES.iter().any(|e| e.eq_ignore_ascii_case(v)) {
        return None;
    }
    Some(v.to_string())
}

/// "Doe, John" → "john doe"; lowercase with collapsed whitespace
pub fn normalize_player(name: &str) -> Option<String> {
    let cleaned = clean_header(Some(name))?.to_lowercase();
    let reordered = match cleaned.split_once(", ") {
        Some((last, first)) => format!("{first} {last}"),
        None => cleaned,
    };
    let collapsed = reordered.split_whitespace().collect::<Vec<_>>().join(" ");
    (!collapsed.is_empty()).then_some(collapsed)
}

/// Year from a PGN-style date ("1972.07.11", "1972.??.??", "1972-07-11").
///
/// A fully numeric date must also be a real calendar date.
pub fn year_of(date: &str) -> Option<u16> {
    let date = clean_header(Some(date))?;
    let year_text = date.get(..4)?;
    if !year_text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let year: u16 = year_text.parse().ok()?;

    let numeric = date.len() == 10 && date.bytes().enumerate().all(|(i, b)| match i {
        4 | 7 => b == b'.' || b == b'-',
        _ => b.is_ascii_digit(),
    });
    if numeric {
        let unified = date.replace('-', ".");
        NaiveDate::parse_from_str(&unified, "%Y.%m.%d").ok()?;
    }
    Some(year)
}

/// "b12" → "B12"; anything that is not A00–E99 is dropped
pub fn normalize_eco(code: &str) -> Option<String> {
    let code = clean_header(Some(code))?.to_ascii_uppercase();
    let bytes = code.as_bytes();
    let valid = bytes.len() == 3
        && (b'A'..=b'E').contains(&bytes[0])
        && bytes[1].is_ascii_digit()
        && bytes[2].is_ascii_digit();
    valid.then_some(code)
}

/// Only decisive or drawn results are kept
pub fn normalize_result(result: &str) -> Option<String> {
    let r = result.trim();
    matches!(r, "1-0" | "0-1" | "1/2-1/2").then(|| r.to_string())
}

/// Per-game metadata kept after ingestion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSummary {
    pub year: Option<u16>,
    pub white: Option<String>,
    pub black: Option<String>,
    pub result: Option<String>,
    pub eco: Option<String>,
    pub plies: u32,
    pub end_key: PositionKey,
}

impl GameSummary {
    pub fn from_headers(headers: &GameHeaders, plies: u32, end_key: PositionKey) -> Self {
        GameSummary {
            year: headers.date.as_deref().and_then(year_of),
            white: headers.white.as_deref().and_then(normalize_player),
            black: headers.black.as_deref().and_then(normalize_player),
            result: headers.result.as_deref().and_then(normalize_result),
            eco: headers.eco.as_deref().and_then(normalize_eco),
            plies,
            end_key,
        }
    }
}

/// ソート済みの多重集合に追加
fn insert_sorted(ids: &mut Vec<GameId>, id: GameId) {
    let pos = ids.partition_point(|g| *g <= id);
    ids.insert(pos, id);
}

fn merge_sorted(into: &mut Vec<GameId>, from: Vec<GameId>) {
    let mut merged = Vec::with_capacity(into.len() + from.len());
    let (mut a, mut b) = (into.drain(..).peekable(), from.into_iter().peekable());
    loop {
        let next = match (a.peek(), b.peek()) {
            (Some(x), Some(y)) if x <= y => a.next(),
            (Some(_), Some(_)) => b.next(),
            (Some(_), None) => a.next(),
            (None, Some(_)) => b.next(),
            (None, None) => break,
        };
        merged.extend(next);
    }
    drop(a);
    *into = merged;
}

fn dedup_sorted(ids: impl IntoIterator<Item = GameId>) -> Vec<GameId> {
    let mut out: Vec<GameId> = ids.into_iter().collect();
    out.sort_unstable();
    out.dedup();
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Recorded {
    summary: GameSummary,
    count: u32,
}

/// Year / player / opening indexes plus per-game summaries.
///
/// Lists are sorted multisets: ingesting the same game twice records it twice,
/// matching the counters in the graph and trie. Queries de-duplicate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataIndex {
    by_year: BTreeMap<u16, Vec<GameId>>,
    by_player: HashMap<String, Vec<GameId>>,
    by_eco: HashMap<String, Vec<GameId>>,
    games: HashMap<GameId, Recorded>,
}

impl MetadataIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct games
    pub fn len(&self) -> usize {
        self.games.len()
    }

    pub fn is_empty(&self) -> bool {
        self.games.is_empty()
    }

    pub fn game(&self, id: GameId) -> Option<&GameSummary> {
        self.games.get(&id).map(|r| &r.summary)
    }

    /// How many times `id` was recorded (one per ingestion)
    pub fn multiplicity(&self, id: GameId) -> u32 {
        self.games.get(&id).map_or(0, |r| r.count)
    }

    /// Whether `summary` can be recorded under `id` (unknown id, or the
    /// same game seen again)
    pub fn accepts(&self, id: GameId, summary: &GameSummary) -> bool {
        self.games.get(&id).is_none_or(|r| r.summary == *summary)
    }

    /// Record a game. Callers check `accepts` first; a conflicting summary
    /// is ignored and reported as `false`.
    pub fn add(&mut self, id: GameId, summary: GameSummary) -> bool {
        if !self.accepts(id, &summary) {
            return false;
        }
        self.index_lists(id, &summary);
        self.games
            .entry(id)
            .or_insert(Recorded { summary, count: 0 })
            .count += 1;
        true
    }

    fn index_lists(&mut self, id: GameId, summary: &GameSummary) {
        if let Some(year) = summary.year {
            insert_sorted(self.by_year.entry(year).or_default(), id);
        }
        for player in [&summary.white, &summary.black].into_iter().flatten() {
            insert_sorted(self.by_player.entry(player.clone()).or_default(), id);
        }
        if let Some(eco) = &summary.eco {
            insert_sorted(self.by_eco.entry(eco.clone()).or_default(), id);
        }
    }

    /// Games dated within `lo..=hi`, sorted and de-duplicated
    pub fn games_in_years(&self, lo: u16, hi: u16) -> Vec<GameId> {
        if lo > hi {
            return Vec::new();
        }
        dedup_sorted(self.by_year.range(lo..=hi).flat_map(|(_, ids)| ids.iter().copied()))
    }

    /// Games where `name` played either colour. The query is normalized the
    /// same way as stored names.
    pub fn games_of_player(&self, name: &str) -> Vec<GameId> {
        normalize_player(name)
            .and_then(|n| self.by_player.get(&n))
            .map(|ids| dedup_sorted(ids.iter().copied()))
            .unwrap_or_default()
    }

    pub fn games_with_eco(&self, eco: &str) -> Vec<GameId> {
        normalize_eco(eco)
            .and_then(|e| self.by_eco.get(&e))
            .map(|ids| dedup_sorted(ids.iter().copied()))
            .unwrap_or_default()
    }

    /// All games in id order with their multiplicity
    pub fn summaries(&self) -> Vec<(GameId, &GameSummary, u32)> {
        let mut all: Vec<_> = self.games.iter().map(|(id, r)| (*id, &r.summary, r.count)).collect();
        all.sort_unstable_by_key(|(id, _, _)| *id);
        all
    }

    pub(crate) fn check_merge(&self, other: &MetadataIndex) -> IndexResult<()> {
        for (id, theirs) in &other.games {
            if !self.accepts(*id, &theirs.summary) {
                return Err(IndexError::GameConflict(*id));
            }
        }
        Ok(())
    }

    /// Fold `other` in. Fails without changes when a game id carries
    /// different summaries on the two sides.
    pub fn merge_from(&mut self, other: MetadataIndex) -> IndexResult<()> {
        self.check_merge(&other)?;
        for (year, ids) in other.by_year {
            merge_sorted(self.by_year.entry(year).or_default(), ids);
        }
        for (player, ids) in other.by_player {
            merge_sorted(self.by_player.entry(player).or_default(), ids);
        }
        for (eco, ids) in other.by_eco {
            merge_sorted(self.by_eco.entry(eco).or_default(), ids);
        }
        for (id, theirs) in other.games {
            match self.games.entry(id) {
                Entry::Occupied(mut e) => e.get_mut().count += theirs.count,
                Entry::Vacant(e) => {
                    e.insert(theirs);
                }
            }
        }
        Ok(())
    }
}
