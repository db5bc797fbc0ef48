use crate::{BlockFetcher, BlockLadder, BlockTimeError, BlockTimeResult, BlockchainBounds};
use marketwatch_interfaces::LedgerRpc;
use marketwatch_primitives::{flatten, BlockNumber, BlockTimeEntry, DateTime, Utc};
use tracing::trace;

/// Which side of the target instant a search looks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    /// Highest block at or before the target.
    HighestBefore,
    /// Lowest block at or after the target.
    LowestAfter,
}

/// Finds the blocks surrounding wall-clock instants.
///
/// Searches start from the [`BlockchainBounds`], tightened by the [`BlockLadder`], and bisect over
/// block numbers. Every probed block goes through the shared cache, so repeated or nearby searches
/// cost close to no RPC calls.
#[derive(Debug)]
pub struct BlockTimeFinder<R> {
    bounds: BlockchainBounds<R>,
    ladder: BlockLadder,
}

impl<R: LedgerRpc> BlockTimeFinder<R> {
    /// Creates a finder reading blocks through the fetcher.
    pub fn new(fetcher: BlockFetcher<R>) -> Self {
        Self { bounds: BlockchainBounds::new(fetcher), ladder: BlockLadder::new() }
    }

    /// The chain bounds.
    pub const fn bounds(&self) -> &BlockchainBounds<R> {
        &self.bounds
    }

    /// The ladder of recent samples.
    pub const fn ladder(&self) -> &BlockLadder {
        &self.ladder
    }

    /// Returns the entry of the block, reading through the cache.
    pub fn block_time(&mut self, block_number: BlockNumber) -> BlockTimeResult<BlockTimeEntry> {
        let entry = self.bounds.fetcher().fetch_required(block_number)?;
        self.ladder.add(entry);
        Ok(entry)
    }

    /// Returns the entry of the current head, refreshed if `moment` lies past it.
    pub fn current(&mut self, moment: DateTime<Utc>) -> BlockTimeResult<BlockTimeEntry> {
        self.bounds.update_current_if_needed_at(moment)?;
        let current = self.bounds.current()?;
        self.ladder.add(current);
        Ok(current)
    }

    /// Returns the highest block whose timestamp is at or before `moment`.
    ///
    /// `None` if `moment` precedes the earliest block with a valid timestamp. Moments at or past
    /// the head resolve to the head.
    pub fn highest_block_number_before(
        &mut self,
        moment: DateTime<Utc>,
    ) -> BlockTimeResult<Option<BlockNumber>> {
        let current = self.current(moment)?;
        let earliest = self.bounds.earliest()?;

        if moment < earliest.utc {
            return Ok(None)
        }
        if moment == earliest.utc {
            return Ok(Some(earliest.block_number))
        }
        if moment >= current.utc {
            return Ok(Some(current.block_number))
        }

        let lower = self.ladder.closest_lower(earliest, moment);
        let upper = self.ladder.closest_upper(current, moment);
        self.search(lower, upper, moment, Direction::HighestBefore).map(Some)
    }

    /// Returns the lowest block whose timestamp is at or after `moment`.
    ///
    /// `None` if `moment` lies past the head. Moments at or before the earliest block resolve to
    /// the earliest block.
    pub fn lowest_block_number_after(
        &mut self,
        moment: DateTime<Utc>,
    ) -> BlockTimeResult<Option<BlockNumber>> {
        let current = self.current(moment)?;
        let earliest = self.bounds.earliest()?;

        if moment > current.utc {
            return Ok(None)
        }
        if moment == current.utc {
            return Ok(Some(current.block_number))
        }
        if moment <= earliest.utc {
            return Ok(Some(earliest.block_number))
        }

        let lower = self.ladder.closest_lower(earliest, moment);
        let upper = self.ladder.closest_upper(current, moment);
        self.search(lower, upper, moment, Direction::LowestAfter).map(Some)
    }

    fn search(
        &mut self,
        mut lower: BlockTimeEntry,
        mut upper: BlockTimeEntry,
        moment: DateTime<Utc>,
        direction: Direction,
    ) -> BlockTimeResult<BlockNumber> {
        let target = flatten(moment);
        let calls_before = self.bounds.fetcher().rpc_calls();
        let mut steps = 0usize;

        let found = loop {
            steps += 1;
            let middle = lower.block_number + (upper.block_number - lower.block_number) / 2;
            if middle == lower.block_number {
                // at most two blocks left
                break if self.is_match(upper, target, direction)? {
                    upper.block_number
                } else {
                    lower.block_number
                }
            }

            let candidate = self.block_time(middle)?;
            if self.is_match(candidate, target, direction)? {
                break middle
            }

            let below = match direction {
                Direction::HighestBefore => candidate.flat_utc() <= target,
                Direction::LowestAfter => candidate.flat_utc() < target,
            };
            if below {
                lower = candidate;
            } else {
                upper = candidate;
            }
        };

        trace!(
            target: "blocktime::finder",
            ?direction,
            %moment,
            block = found,
            steps,
            rpc_calls = self.bounds.fetcher().rpc_calls() - calls_before,
            "Search finished"
        );
        Ok(found)
    }

    /// Tests the candidate against its neighbour: `candidate + 1` when looking for the highest
    /// block before the target, `candidate - 1` when looking for the lowest block after it.
    ///
    /// If candidate and neighbour share the target second, the candidate wins.
    fn is_match(
        &mut self,
        candidate: BlockTimeEntry,
        target: DateTime<Utc>,
        direction: Direction,
    ) -> BlockTimeResult<bool> {
        let candidate_utc = candidate.flat_utc();
        match direction {
            Direction::HighestBefore => {
                if candidate_utc > target {
                    return Ok(false)
                }
                let Some(next) = self.neighbour(candidate.block_number.checked_add(1))? else {
                    return Ok(true)
                };
                let next_utc = next.flat_utc();
                Ok(next_utc > target || (candidate_utc == target && next_utc == target))
            }
            Direction::LowestAfter => {
                if candidate_utc < target {
                    return Ok(false)
                }
                let Some(previous) = self.neighbour(candidate.block_number.checked_sub(1))? else {
                    return Ok(true)
                };
                let previous_utc = previous.flat_utc();
                Ok(previous_utc < target || (candidate_utc == target && previous_utc == target))
            }
        }
    }

    /// Returns the neighbour entry if it lies within the bounds.
    fn neighbour(
        &mut self,
        block_number: Option<BlockNumber>,
    ) -> BlockTimeResult<Option<BlockTimeEntry>> {
        let Some(block_number) = block_number else { return Ok(None) };
        let earliest = self.bounds.earliest()?;
        let current = self.bounds.current()?;
        if block_number < earliest.block_number || block_number > current.block_number {
            return Ok(None)
        }
        match self.block_time(block_number) {
            Ok(entry) => Ok(Some(entry)),
            Err(BlockTimeError::MissingTimestamp { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BlockCache;
    use marketwatch_interfaces::{test_utils::MockChain, RetryPolicy};
    use marketwatch_primitives::chrono::{TimeDelta, TimeZone};
    use std::sync::Arc;

    fn genesis() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    fn finder(chain: &Arc<MockChain>) -> BlockTimeFinder<Arc<MockChain>> {
        finder_with_cache(chain, Arc::new(BlockCache::in_memory()))
    }

    fn finder_with_cache(
        chain: &Arc<MockChain>,
        cache: Arc<BlockCache>,
    ) -> BlockTimeFinder<Arc<MockChain>> {
        BlockTimeFinder::new(BlockFetcher::new(chain.clone(), cache, RetryPolicy::none()))
    }

    /// Reference answer by linear scan.
    fn highest_before(chain: &MockChain, moment: DateTime<Utc>) -> Option<u64> {
        (0..=chain.head()).rev().find(|n| chain.time_of(*n) <= moment)
    }

    fn lowest_after(chain: &MockChain, moment: DateTime<Utc>) -> Option<u64> {
        (0..=chain.head()).find(|n| chain.time_of(*n) >= moment)
    }

    #[test]
    fn highest_before_matches_linear_scan() {
        let chain = Arc::new(MockChain::new(genesis(), TimeDelta::seconds(12), 500));
        let mut finder = finder(&chain);

        for offset in (0..500 * 12).step_by(7) {
            let moment = genesis() + TimeDelta::seconds(offset);
            assert_eq!(
                finder.highest_block_number_before(moment).unwrap(),
                highest_before(&chain, moment),
                "offset {offset}"
            );
        }
    }

    #[test]
    fn lowest_after_matches_linear_scan() {
        let chain = Arc::new(MockChain::new(genesis(), TimeDelta::seconds(12), 500));
        let mut finder = finder(&chain);

        for offset in (0..500 * 12).step_by(5) {
            let moment = genesis() + TimeDelta::seconds(offset);
            assert_eq!(
                finder.lowest_block_number_after(moment).unwrap(),
                lowest_after(&chain, moment),
                "offset {offset}"
            );
        }
    }

    #[test]
    fn subsecond_moments_use_whole_seconds() {
        let chain = Arc::new(MockChain::new(genesis(), TimeDelta::seconds(12), 100));
        let mut finder = finder(&chain);

        let moment = chain.time_of(40) + TimeDelta::milliseconds(500);
        assert_eq!(finder.highest_block_number_before(moment).unwrap(), Some(40));
    }

    #[test]
    fn out_of_range_moments() {
        let chain =
            Arc::new(MockChain::new(genesis(), TimeDelta::seconds(12), 100).with_invalid_prefix(3));
        let mut finder = finder(&chain);

        let before = chain.time_of(3) - TimeDelta::seconds(1);
        let after = chain.time_of(99) + TimeDelta::seconds(1);

        assert_eq!(finder.highest_block_number_before(before).unwrap(), None);
        assert_eq!(finder.lowest_block_number_after(before).unwrap(), Some(3));
        assert_eq!(finder.highest_block_number_before(after).unwrap(), Some(99));
        assert_eq!(finder.lowest_block_number_after(after).unwrap(), None);

        assert_eq!(finder.highest_block_number_before(chain.time_of(3)).unwrap(), Some(3));
        assert_eq!(finder.lowest_block_number_after(chain.time_of(99)).unwrap(), Some(99));
    }

    #[test]
    fn ties_resolve_to_the_candidate() {
        // two blocks per second
        let chain = Arc::new(MockChain::new(genesis(), TimeDelta::milliseconds(500), 200));
        let mut finder = finder(&chain);

        let moment = chain.time_of(50);
        let found = finder.highest_block_number_before(moment).unwrap().unwrap();
        assert_eq!(flatten(chain.time_of(found)), flatten(moment));

        let found = finder.lowest_block_number_after(moment).unwrap().unwrap();
        assert_eq!(flatten(chain.time_of(found)), flatten(moment));
    }

    #[test]
    fn repeated_searches_are_amortized() {
        let chain = Arc::new(MockChain::new(genesis(), TimeDelta::seconds(12), 10_000));
        let mut finder = finder(&chain);

        let moment = chain.time_of(7_321) + TimeDelta::seconds(3);
        assert_eq!(finder.highest_block_number_before(moment).unwrap(), Some(7_321));
        let first_search = chain.timestamp_calls();
        assert!(first_search < 40, "{first_search} calls");

        assert_eq!(finder.highest_block_number_before(moment).unwrap(), Some(7_321));
        assert_eq!(chain.timestamp_calls(), first_search);
    }

    #[test]
    fn finders_share_the_cache() {
        let chain = Arc::new(MockChain::new(genesis(), TimeDelta::seconds(12), 1_000));
        let cache = Arc::new(BlockCache::in_memory());
        let mut first = finder_with_cache(&chain, cache.clone());
        let mut second = finder_with_cache(&chain, cache);

        let moment = chain.time_of(345);
        assert_eq!(first.highest_block_number_before(moment).unwrap(), Some(345));
        let calls = chain.timestamp_calls();

        assert_eq!(second.highest_block_number_before(moment).unwrap(), Some(345));
        assert_eq!(chain.timestamp_calls(), calls);
    }

    #[test]
    fn end_to_end_block_lookup() {
        let chain = Arc::new(MockChain::new(genesis(), TimeDelta::seconds(12), 21));
        let mut finder = finder(&chain);

        let moment = chain.time_of(8) - TimeDelta::seconds(1);
        assert_eq!(finder.highest_block_number_before(moment).unwrap(), Some(7));
    }
}
