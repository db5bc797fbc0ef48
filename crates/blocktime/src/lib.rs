//! Maps wall-clock instants to ledger block numbers and back.
//!
//! Ledger nodes only answer "what is the timestamp of block N". Finding the block at a given
//! instant therefore means bisecting over block numbers, and every probe costs an RPC call. This
//! crate keeps that cost low:
//!
//! - [`BlockCache`] memoizes every observed `{block -> timestamp}` pair in buckets of
//!   [`BUCKET_SIZE`] blocks, backed by a [`BlockBucketStore`] (in memory or one JSON file per
//!   bucket on disk) so the knowledge survives restarts.
//! - [`BlockLadder`] remembers a few recent samples at three resolutions, used to shrink the search
//!   interval before bisecting.
//! - [`BlockchainBounds`] establishes the earliest block with a usable timestamp and the current
//!   head.
//! - [`BlockTimeFinder`] runs the bisection.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

mod bounds;
mod cache;
mod error;
mod fetcher;
mod finder;
mod ladder;
mod store;

pub use bounds::BlockchainBounds;
pub use cache::{BlockCache, MAX_RESIDENT_BUCKETS};
pub use error::{BlockTimeError, BlockTimeResult, StoreError};
pub use fetcher::{is_valid_timestamp, BlockFetcher};
pub use finder::BlockTimeFinder;
pub use ladder::{BlockLadder, Ladder};
pub use store::{
    bucket_number, BlockBucket, BlockBucketStore, DiskBucketStore, MemoryBucketStore, BUCKET_SIZE,
};
