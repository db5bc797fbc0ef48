use crate::{BlockFetcher, BlockTimeError, BlockTimeResult};
use marketwatch_interfaces::LedgerRpc;
use marketwatch_primitives::{BlockNumber, BlockTimeEntry, DateTime, Utc};
use tracing::{debug, info};

/// The earliest block with a valid timestamp and the current head of the chain.
///
/// Both are kept in the shared [`BlockCache`](crate::BlockCache), so every finder over the same
/// cache sees the same bounds.
#[derive(Debug)]
pub struct BlockchainBounds<R> {
    fetcher: BlockFetcher<R>,
}

impl<R: LedgerRpc> BlockchainBounds<R> {
    /// Creates the bounds over the fetcher.
    pub const fn new(fetcher: BlockFetcher<R>) -> Self {
        Self { fetcher }
    }

    /// The fetcher used to read blocks.
    pub const fn fetcher(&self) -> &BlockFetcher<R> {
        &self.fetcher
    }

    /// Establishes both bounds, unless already known.
    pub fn initialize(&self) -> BlockTimeResult<()> {
        let cache = self.fetcher.cache();
        if cache.earliest().is_some() && cache.current().is_some() {
            return Ok(())
        }

        let current = self.fetch_current()?;
        let earliest = self.find_earliest(current)?;
        if earliest.block_number == current.block_number {
            return Err(BlockTimeError::SingleBlockChain { block: current.block_number })
        }

        cache.set_earliest(earliest);
        cache.set_current(current);
        info!(target: "blocktime::bounds", %earliest, %current, "Initialized blockchain bounds");
        Ok(())
    }

    /// The earliest block with a valid timestamp.
    pub fn earliest(&self) -> BlockTimeResult<BlockTimeEntry> {
        self.initialize()?;
        self.fetcher.cache().earliest().ok_or(BlockTimeError::MissingTimestamp { block: 0 })
    }

    /// The latest known block.
    pub fn current(&self) -> BlockTimeResult<BlockTimeEntry> {
        self.initialize()?;
        self.fetcher.cache().current().ok_or(BlockTimeError::MissingTimestamp { block: 0 })
    }

    /// Refreshes the head if the instant lies past the current one.
    pub fn update_current_if_needed_at(&self, utc: DateTime<Utc>) -> BlockTimeResult<()> {
        if utc <= self.current()?.utc {
            return Ok(())
        }
        let head = self.fetcher.current_block_number()?;
        self.update_current_if_needed(head)
    }

    /// Moves the head forward to the block, if it is newer than the current one.
    pub fn update_current_if_needed(&self, block_number: BlockNumber) -> BlockTimeResult<()> {
        let current = self.current()?;
        if block_number <= current.block_number {
            return Ok(())
        }
        let entry = self.fetcher.fetch_required(block_number)?;
        self.fetcher.cache().set_current(entry);
        debug!(target: "blocktime::bounds", current = %entry, "Updated current block");
        Ok(())
    }

    fn fetch_current(&self) -> BlockTimeResult<BlockTimeEntry> {
        let head = self.fetcher.current_block_number()?;
        self.fetcher.fetch_required(head)
    }

    /// Bisects `[0, current]` for the lowest block with a valid timestamp.
    fn find_earliest(&self, current: BlockTimeEntry) -> BlockTimeResult<BlockTimeEntry> {
        if let Some(genesis) = self.fetcher.fetch(0)? {
            return Ok(genesis)
        }

        let (mut invalid, mut valid) = (0, current);
        while valid.block_number - invalid > 1 {
            let middle = invalid + (valid.block_number - invalid) / 2;
            match self.fetcher.fetch(middle)? {
                Some(entry) => valid = entry,
                None => invalid = middle,
            }
        }
        debug!(target: "blocktime::bounds", earliest = %valid, "Found earliest valid block");
        Ok(valid)
    }
}
