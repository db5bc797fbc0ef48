//! Backing stores for the block cache.

use crate::StoreError;
use marketwatch_primitives::{BlockNumber, BlockTimeEntry, DateTime, Utc};
use parking_lot::RwLock;
use std::{
    collections::{BTreeMap, HashMap},
    fs,
    path::{Path, PathBuf},
};
use tracing::trace;

/// Number of consecutive blocks owned by one bucket.
pub const BUCKET_SIZE: u64 = 4096;

/// Returns the bucket owning the block.
pub const fn bucket_number(block_number: BlockNumber) -> u64 {
    block_number / BUCKET_SIZE
}

/// Timestamps of the known blocks of one bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockBucket {
    number: u64,
    entries: BTreeMap<BlockNumber, DateTime<Utc>>,
}

impl BlockBucket {
    /// Creates an empty bucket.
    pub const fn new(number: u64) -> Self {
        Self { number, entries: BTreeMap::new() }
    }

    /// Creates a bucket from stored entries.
    pub const fn with_entries(number: u64, entries: BTreeMap<BlockNumber, DateTime<Utc>>) -> Self {
        Self { number, entries }
    }

    /// The bucket number.
    pub const fn number(&self) -> u64 {
        self.number
    }

    /// The known entries.
    pub const fn entries(&self) -> &BTreeMap<BlockNumber, DateTime<Utc>> {
        &self.entries
    }

    /// Returns the entry of the block, if known.
    pub fn get(&self, block_number: BlockNumber) -> Option<BlockTimeEntry> {
        self.entries.get(&block_number).map(|utc| BlockTimeEntry::new(block_number, *utc))
    }

    /// Inserts the entry unless the block is already known. Returns the entry now stored and
    /// whether it was inserted.
    pub(crate) fn insert(&mut self, entry: BlockTimeEntry) -> (BlockTimeEntry, bool) {
        debug_assert_eq!(bucket_number(entry.block_number), self.number);
        match self.entries.get(&entry.block_number) {
            Some(utc) => (BlockTimeEntry::new(entry.block_number, *utc), false),
            None => {
                self.entries.insert(entry.block_number, entry.utc);
                (entry, true)
            }
        }
    }

    /// Number of known entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no entry is known.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Persistence of block buckets.
#[auto_impl::auto_impl(&, Arc, Box)]
pub trait BlockBucketStore: Send + Sync + std::fmt::Debug {
    /// Loads a bucket. `None` if it was never saved.
    fn load(&self, bucket_number: u64) -> Result<Option<BlockBucket>, StoreError>;

    /// Saves a bucket, replacing the previous version.
    fn save(&self, bucket: &BlockBucket) -> Result<(), StoreError>;
}

/// Store that keeps buckets in memory only.
#[derive(Debug, Default)]
pub struct MemoryBucketStore {
    buckets: RwLock<HashMap<u64, BlockBucket>>,
}

impl MemoryBucketStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlockBucketStore for MemoryBucketStore {
    fn load(&self, bucket_number: u64) -> Result<Option<BlockBucket>, StoreError> {
        Ok(self.buckets.read().get(&bucket_number).cloned())
    }

    fn save(&self, bucket: &BlockBucket) -> Result<(), StoreError> {
        self.buckets.write().insert(bucket.number, bucket.clone());
        Ok(())
    }
}

/// Store that keeps one JSON file per bucket, named `{bucket_number}.json`.
///
/// Each file holds a `{blockNumber: timestamp}` map.
#[derive(Debug, Clone)]
pub struct DiskBucketStore {
    dir: PathBuf,
}

impl DiskBucketStore {
    /// Opens the store in the directory, creating it if needed.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Directory of the bucket files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn bucket_path(&self, bucket_number: u64) -> PathBuf {
        self.dir.join(format!("{bucket_number}.json"))
    }
}

impl BlockBucketStore for DiskBucketStore {
    fn load(&self, bucket_number: u64) -> Result<Option<BlockBucket>, StoreError> {
        let path = self.bucket_path(bucket_number);
        if !path.exists() {
            return Ok(None)
        }
        let entries = serde_json::from_slice(&fs::read(&path)?)?;
        trace!(target: "blocktime::store", ?path, "Loaded bucket");
        Ok(Some(BlockBucket::with_entries(bucket_number, entries)))
    }

    fn save(&self, bucket: &BlockBucket) -> Result<(), StoreError> {
        let path = self.bucket_path(bucket.number);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec(&bucket.entries)?)?;
        fs::rename(&tmp, &path)?;
        trace!(target: "blocktime::store", ?path, entries = bucket.len(), "Saved bucket");
        Ok(())
    }
}
