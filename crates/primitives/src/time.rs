use chrono::{DateTime, SubsecRound, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, ops::RangeInclusive};

/// Block number of the ledger.
pub type BlockNumber = u64;

/// Truncates an instant to whole seconds.
///
/// Block timestamps have second resolution on the ledger, so every comparison between a block and
/// a wall-clock instant is done on flattened values.
pub fn flatten(utc: DateTime<Utc>) -> DateTime<Utc> {
    utc.trunc_subsecs(0)
}

/// Correlates one ledger block with its timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockTimeEntry {
    /// The block number.
    pub block_number: BlockNumber,
    /// The block timestamp.
    pub utc: DateTime<Utc>,
}

impl BlockTimeEntry {
    /// Creates a new entry.
    pub const fn new(block_number: BlockNumber, utc: DateTime<Utc>) -> Self {
        Self { block_number, utc }
    }

    /// Returns the block timestamp truncated to whole seconds.
    pub fn flat_utc(&self) -> DateTime<Utc> {
        flatten(self.utc)
    }
}

impl fmt::Display for BlockTimeEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} ({})", self.block_number, self.utc.format("%Y-%m-%d %H:%M:%S%.3f"))
    }
}

/// Inclusive range of instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    /// Start of the range.
    pub from: DateTime<Utc>,
    /// End of the range.
    pub to: DateTime<Utc>,
}

impl TimeRange {
    /// Creates a new range.
    pub const fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self { from, to }
    }

    /// Creates a range of zero duration.
    pub const fn at(utc: DateTime<Utc>) -> Self {
        Self { from: utc, to: utc }
    }

    /// Returns the duration covered by the range.
    pub fn duration(&self) -> TimeDelta {
        self.to - self.from
    }

    /// Returns `true` if the instant lies within the range.
    pub fn contains(&self, utc: DateTime<Utc>) -> bool {
        self.from <= utc && utc <= self.to
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{} -> {}] ({}s)",
            self.from.format("%Y-%m-%d %H:%M:%S"),
            self.to.format("%Y-%m-%d %H:%M:%S"),
            self.duration().num_seconds()
        )
    }
}

/// Inclusive interval of blocks together with the time span they cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInterval {
    /// First block of the interval.
    pub from: BlockNumber,
    /// Last block of the interval.
    pub to: BlockNumber,
    /// Timestamps of `from` and `to`.
    pub time_range: TimeRange,
}

impl BlockInterval {
    /// Creates an interval spanning the two entries.
    pub const fn new(from: BlockTimeEntry, to: BlockTimeEntry) -> Self {
        Self {
            from: from.block_number,
            to: to.block_number,
            time_range: TimeRange::new(from.utc, to.utc),
        }
    }

    /// Number of blocks in the interval, both ends included.
    pub const fn number_of_blocks(&self) -> u64 {
        self.to.saturating_sub(self.from) + 1
    }

    /// Returns `true` if the block lies within the interval.
    pub const fn contains(&self, block_number: BlockNumber) -> bool {
        self.from <= block_number && block_number <= self.to
    }

    /// Returns the block numbers of the interval in ascending order.
    pub const fn blocks(&self) -> RangeInclusive<BlockNumber> {
        self.from..=self.to
    }
}

impl fmt::Display for BlockInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}-{}] {}", self.from, self.to, self.time_range)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn flatten_drops_subseconds() {
        let utc = Utc.timestamp_opt(1_700_000_000, 999_000_000).unwrap();
        assert_eq!(flatten(utc), Utc.timestamp_opt(1_700_000_000, 0).unwrap());
    }

    #[test]
    fn interval_counts_both_ends() {
        let from = BlockTimeEntry::new(10, Utc.timestamp_opt(100, 0).unwrap());
        let to = BlockTimeEntry::new(14, Utc.timestamp_opt(148, 0).unwrap());
        let interval = BlockInterval::new(from, to);

        assert_eq!(interval.number_of_blocks(), 5);
        assert_eq!(interval.time_range.duration().num_seconds(), 48);
        assert!(interval.contains(14));
        assert!(!interval.contains(15));
        assert_eq!(interval.blocks().count(), 5);
    }
}
