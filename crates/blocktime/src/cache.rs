use crate::{bucket_number, BlockBucket, BlockBucketStore, MemoryBucketStore, StoreError};
use marketwatch_primitives::{BlockNumber, BlockTimeEntry};
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::debug;

/// Default number of buckets kept in memory.
pub const MAX_RESIDENT_BUCKETS: usize = 10;

#[derive(Debug, Default)]
struct CacheInner {
    resident: HashMap<u64, BlockBucket>,
    earliest: Option<BlockTimeEntry>,
    current: Option<BlockTimeEntry>,
}

/// Bounded memo of block timestamps over a [`BlockBucketStore`].
///
/// Entries are immutable once added: adding a known block returns the cached value. Every new entry
/// writes its bucket through to the store.
///
/// Loading a bucket while the resident limit is reached drops *all* resident buckets; they are
/// reloaded from the store on demand.
///
/// The cache also holds the two boundary entries of the chain: the earliest block with a valid
/// timestamp and the current head. It is safe to share between finders.
#[derive(Debug)]
pub struct BlockCache {
    inner: Mutex<CacheInner>,
    store: Box<dyn BlockBucketStore>,
    max_resident_buckets: usize,
}

impl BlockCache {
    /// Creates a cache over the store.
    pub fn new(store: impl BlockBucketStore + 'static) -> Self {
        Self {
            inner: Mutex::new(CacheInner::default()),
            store: Box::new(store),
            max_resident_buckets: MAX_RESIDENT_BUCKETS,
        }
    }

    /// Creates a cache that only lives in memory.
    pub fn in_memory() -> Self {
        Self::new(MemoryBucketStore::new())
    }

    /// Sets the number of buckets kept in memory.
    pub fn with_max_resident_buckets(mut self, max_resident_buckets: usize) -> Self {
        self.max_resident_buckets = max_resident_buckets.max(1);
        self
    }

    /// Returns the cached entry of the block.
    pub fn get(&self, block_number: BlockNumber) -> Result<Option<BlockTimeEntry>, StoreError> {
        let mut inner = self.inner.lock();
        let bucket = self.resident_bucket(&mut inner, bucket_number(block_number))?;
        Ok(bucket.get(block_number))
    }

    /// Adds the entry unless the block is already cached, and returns the cached entry.
    pub fn add(&self, entry: BlockTimeEntry) -> Result<BlockTimeEntry, StoreError> {
        let mut inner = self.inner.lock();
        let bucket = self.resident_bucket(&mut inner, bucket_number(entry.block_number))?;
        let (cached, inserted) = bucket.insert(entry);
        if inserted {
            self.store.save(bucket)?;
        }
        Ok(cached)
    }

    /// The earliest block with a valid timestamp, once known.
    pub fn earliest(&self) -> Option<BlockTimeEntry> {
        self.inner.lock().earliest
    }

    /// The latest known block, once known.
    pub fn current(&self) -> Option<BlockTimeEntry> {
        self.inner.lock().current
    }

    /// Sets the earliest block with a valid timestamp.
    pub fn set_earliest(&self, entry: BlockTimeEntry) {
        self.inner.lock().earliest = Some(entry);
    }

    /// Sets the latest known block.
    pub fn set_current(&self, entry: BlockTimeEntry) {
        self.inner.lock().current = Some(entry);
    }

    /// Number of buckets currently in memory.
    pub fn resident_buckets(&self) -> usize {
        self.inner.lock().resident.len()
    }

    fn resident_bucket<'a>(
        &self,
        inner: &'a mut CacheInner,
        number: u64,
    ) -> Result<&'a mut BlockBucket, StoreError> {
        if !inner.resident.contains_key(&number) {
            let bucket = self.store.load(number)?.unwrap_or_else(|| BlockBucket::new(number));
            if inner.resident.len() >= self.max_resident_buckets {
                debug!(
                    target: "blocktime::cache",
                    resident = inner.resident.len(),
                    "Resident bucket limit reached, clearing"
                );
                inner.resident.clear();
            }
            inner.resident.insert(number, bucket);
        }
        Ok(inner.resident.entry(number).or_insert_with(|| BlockBucket::new(number)))
    }
}
