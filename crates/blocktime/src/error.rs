use marketwatch_interfaces::RpcError;
use marketwatch_primitives::BlockNumber;
use thiserror::Error;

/// Result alias for block/time lookups.
pub type BlockTimeResult<T> = Result<T, BlockTimeError>;

/// Errors of the bucket backing store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing a bucket file failed.
    #[error("bucket io error: {0}")]
    Io(#[from] std::io::Error),
    /// A bucket file could not be encoded or decoded.
    #[error("bucket encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors of the block/time correlation.
#[derive(Debug, Error)]
pub enum BlockTimeError {
    /// The ledger call failed after all retries.
    #[error(transparent)]
    Rpc(#[from] RpcError),
    /// The cache backing store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// A block that must exist has no usable timestamp.
    #[error("block {block} has no valid timestamp")]
    MissingTimestamp {
        /// The block queried.
        block: BlockNumber,
    },
    /// The chain consists of a single block with a valid timestamp.
    #[error("Unsupported condition: earliest and current block are both #{block}")]
    SingleBlockChain {
        /// The only block.
        block: BlockNumber,
    },
}
