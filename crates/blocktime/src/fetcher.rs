use crate::{BlockCache, BlockTimeError, BlockTimeResult};
use marketwatch_interfaces::{LedgerRpc, RetryPolicy};
use marketwatch_primitives::{chrono::TimeDelta, BlockNumber, BlockTimeEntry, DateTime, Utc};
use std::{
    fmt,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

/// Returns `true` if the timestamp is usable, i.e. more than one second after the unix epoch.
///
/// Nodes report zero or garbage timestamps for blocks they pruned or never initialised.
pub fn is_valid_timestamp(utc: DateTime<Utc>) -> bool {
    utc > DateTime::<Utc>::UNIX_EPOCH + TimeDelta::seconds(1)
}

/// Reads block timestamps through the [`BlockCache`], asking the ledger on a miss.
pub struct BlockFetcher<R> {
    rpc: R,
    cache: Arc<BlockCache>,
    retry: RetryPolicy,
    rpc_calls: AtomicUsize,
}

impl<R: LedgerRpc> BlockFetcher<R> {
    /// Creates a fetcher.
    pub fn new(rpc: R, cache: Arc<BlockCache>, retry: RetryPolicy) -> Self {
        Self { rpc, cache, retry, rpc_calls: AtomicUsize::new(0) }
    }

    /// The ledger.
    pub const fn rpc(&self) -> &R {
        &self.rpc
    }

    /// The shared cache.
    pub const fn cache(&self) -> &Arc<BlockCache> {
        &self.cache
    }

    /// Number of timestamp calls sent to the ledger by this fetcher.
    pub fn rpc_calls(&self) -> usize {
        self.rpc_calls.load(Ordering::Relaxed)
    }

    /// Returns the entry of the block. `None` if the block has no valid timestamp.
    ///
    /// Valid entries fetched from the ledger are added to the cache; invalid ones never are.
    pub fn fetch(&self, block_number: BlockNumber) -> BlockTimeResult<Option<BlockTimeEntry>> {
        if let Some(entry) = self.cache.get(block_number)? {
            return Ok(Some(entry))
        }

        self.rpc_calls.fetch_add(1, Ordering::Relaxed);
        let utc = self
            .retry
            .retry("block_timestamp", || self.rpc.block_timestamp(block_number))?
            .filter(|utc| is_valid_timestamp(*utc));

        match utc {
            Some(utc) => Ok(Some(self.cache.add(BlockTimeEntry::new(block_number, utc))?)),
            None => Ok(None),
        }
    }

    /// Returns the entry of a block that must have a valid timestamp.
    pub fn fetch_required(&self, block_number: BlockNumber) -> BlockTimeResult<BlockTimeEntry> {
        self.fetch(block_number)?.ok_or(BlockTimeError::MissingTimestamp { block: block_number })
    }

    /// Returns the number of the latest block.
    pub fn current_block_number(&self) -> BlockTimeResult<BlockNumber> {
        Ok(self.retry.retry("current_block_number", || self.rpc.current_block_number())?)
    }
}

impl<R> fmt::Debug for BlockFetcher<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockFetcher")
            .field("retry", &self.retry)
            .field("rpc_calls", &self.rpc_calls)
            .finish_non_exhaustive()
    }
}
