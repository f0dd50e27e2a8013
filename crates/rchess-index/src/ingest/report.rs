//! Ingestion outcome counters

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::record::GameId;

/// Why a game was left out of the index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The collaborator could not produce a record
    Rejected,
    /// No moves
    Empty,
    /// Starts from a position other than the standard one
    NonStandardStart,
    /// More plies than `max_plies`
    TooLong,
    /// Known id with different metadata
    DuplicateId,
    /// Boards disagree with what is already indexed, or do not follow the moves
    Inconsistent,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SkipReason::Rejected => "rejected",
            SkipReason::Empty => "empty",
            SkipReason::NonStandardStart => "non-standard start",
            SkipReason::TooLong => "too long",
            SkipReason::DuplicateId => "duplicate id",
            SkipReason::Inconsistent => "inconsistent",
        };
        f.write_str(s)
    }
}

/// One recorded skip
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkipSample {
    pub game: Option<GameId>,
    pub reason: SkipReason,
    pub detail: String,
}

impl fmt::Display for SkipSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.game {
            Some(id) => write!(f, "{id}: {} ({})", self.reason, self.detail),
            None => write!(f, "{} ({})", self.reason, self.detail),
        }
    }
}

/// Summary of one ingestion run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestionReport {
    /// Games committed to the index
    pub processed: u64,
    /// Games left out, all reasons
    pub skipped: u64,
    /// Plies of committed games
    pub plies: u64,
    /// Positions that did not exist before the run
    pub new_positions: u64,
    /// The run stopped early on a cancellation request
    pub cancelled: bool,
    pub skipped_by_reason: BTreeMap<SkipReason, u64>,
    /// First skips, up to the configured sample cap
    pub errors: Vec<SkipSample>,
}

impl IngestionReport {
    pub(crate) fn record_skip(&mut self, sample: SkipSample, max_samples: usize) {
        self.skipped += 1;
        *self.skipped_by_reason.entry(sample.reason).or_default() += 1;
        if self.errors.len() < max_samples {
            self.errors.push(sample);
        }
    }

    /// Fold a shard report in. Samples from `other` fill the remaining room.
    pub fn absorb(&mut self, other: IngestionReport, max_samples: usize) {
        self.processed += other.processed;
        self.skipped += other.skipped;
        self.plies += other.plies;
        self.new_positions += other.new_positions;
        self.cancelled |= other.cancelled;
        for (reason, count) in other.skipped_by_reason {
            *self.skipped_by_reason.entry(reason).or_default() += count;
        }
        let room = max_samples.saturating_sub(self.errors.len());
        self.errors.extend(other.errors.into_iter().take(room));
    }

    pub fn total(&self) -> u64 {
        self.processed + self.skipped
    }
}

impl fmt::Display for IngestionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "processed={} skipped={} plies={} new_positions={}",
            self.processed, self.skipped, self.plies, self.new_positions
        )?;
        if self.cancelled {
            f.write_str(" (cancelled)")?;
        }
        Ok(())
    }
}
