use marketwatch_primitives::{chrono::TimeDelta, BlockTimeEntry, DateTime, Utc};
use std::collections::VecDeque;

/// Recency window of block samples, newest first, spaced at least `gap` apart.
#[derive(Debug, Clone)]
pub struct Ladder {
    gap: TimeDelta,
    max_length: usize,
    entries: VecDeque<BlockTimeEntry>,
}

impl Ladder {
    /// Creates an empty ladder.
    pub fn new(gap: TimeDelta, max_length: usize) -> Self {
        Self { gap, max_length, entries: VecDeque::with_capacity(max_length) }
    }

    /// Adds a sample if it is at least `gap` newer than the newest one. Returns whether it was
    /// added.
    pub fn add(&mut self, entry: BlockTimeEntry) -> bool {
        if let Some(newest) = self.entries.front() {
            if entry.utc - newest.utc < self.gap {
                return false
            }
        }
        self.entries.push_front(entry);
        self.entries.truncate(self.max_length);
        true
    }

    /// Samples, newest first.
    pub fn entries(&self) -> impl Iterator<Item = &BlockTimeEntry> + '_ {
        self.entries.iter()
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if there are no samples.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn closest_lower(&self, mut lower: BlockTimeEntry, target: DateTime<Utc>) -> BlockTimeEntry {
        for entry in &self.entries {
            if entry.utc <= target && entry.block_number > lower.block_number {
                lower = *entry;
            }
        }
        lower
    }

    fn closest_upper(&self, mut upper: BlockTimeEntry, target: DateTime<Utc>) -> BlockTimeEntry {
        for entry in &self.entries {
            if entry.utc >= target && entry.block_number < upper.block_number {
                upper = *entry;
            }
        }
        upper
    }
}

/// Three [`Ladder`]s covering roughly the last hour, eight hours and day.
///
/// Used to tighten the bounds of a search before bisecting. Empty ladders change nothing.
#[derive(Debug, Clone)]
pub struct BlockLadder {
    ladders: [Ladder; 3],
}

impl BlockLadder {
    /// Creates empty ladders with gaps of 2 minutes, 10 minutes and 1 hour.
    pub fn new() -> Self {
        Self {
            ladders: [
                Ladder::new(TimeDelta::minutes(2), 30),
                Ladder::new(TimeDelta::minutes(10), 48),
                Ladder::new(TimeDelta::hours(1), 24),
            ],
        }
    }

    /// Offers the sample to every ladder.
    pub fn add(&mut self, entry: BlockTimeEntry) {
        for ladder in &mut self.ladders {
            ladder.add(entry);
        }
    }

    /// The ladders, finest first.
    pub const fn ladders(&self) -> &[Ladder; 3] {
        &self.ladders
    }

    /// Returns the highest known block at or before `target` that is above `lower`, or `lower`.
    pub fn closest_lower(&self, lower: BlockTimeEntry, target: DateTime<Utc>) -> BlockTimeEntry {
        self.ladders.iter().fold(lower, |lower, ladder| ladder.closest_lower(lower, target))
    }

    /// Returns the lowest known block at or after `target` that is below `upper`, or `upper`.
    pub fn closest_upper(&self, upper: BlockTimeEntry, target: DateTime<Utc>) -> BlockTimeEntry {
        self.ladders.iter().fold(upper, |upper, ladder| ladder.closest_upper(upper, target))
    }
}

impl Default for BlockLadder {
    fn default() -> Self {
        Self::new()
    }
}
