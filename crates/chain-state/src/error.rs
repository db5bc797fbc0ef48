use marketwatch_blocktime::BlockTimeError;
use marketwatch_interfaces::RpcError;
use marketwatch_primitives::{BlockNumber, DateTime, RequestId, Utc};
use thiserror::Error;

/// Result alias for [`ChainStateError`].
pub type ChainStateResult<T> = Result<T, ChainStateError>;

/// Errors of the period monitor.
#[derive(Debug, Error)]
pub enum PeriodError {
    /// A transaction called a marketplace function that only reads state.
    #[error("transaction {tx_hash} in block {block_number} calls view function {function}")]
    ViewFunctionInTransaction {
        /// Name of the called function.
        function: &'static str,
        /// Block that included the transaction.
        block_number: BlockNumber,
        /// Hash of the transaction.
        tx_hash: marketwatch_primitives::B256,
    },
}

/// Errors of the chain state projection.
#[derive(Debug, Error)]
pub enum ChainStateError {
    /// An update targeted an instant before the already covered span.
    #[error("out of order update to {requested}, already covered up to {covered}")]
    OutOfOrder {
        /// Instant the update targeted.
        requested: DateTime<Utc>,
        /// Instant already covered.
        covered: DateTime<Utc>,
    },
    /// An interval did not start right after the last applied block.
    #[error("interval starts at block {from}, expected block {expected}")]
    NonContiguous {
        /// Block following the last applied one.
        expected: BlockNumber,
        /// First block of the interval.
        from: BlockNumber,
    },
    /// A newly created request could not be read from the marketplace.
    #[error("storage request {request_id} was created in block {block_number} but cannot be read")]
    UnknownRequest {
        /// The unreadable request.
        request_id: RequestId,
        /// Block that created it.
        block_number: BlockNumber,
    },
    /// No block is known for the instant.
    #[error("no block at or before {utc}")]
    Unresolvable {
        /// The instant.
        utc: DateTime<Utc>,
    },
    /// Resolving blocks and instants failed.
    #[error(transparent)]
    BlockTime(#[from] BlockTimeError),
    /// A ledger call failed after all retries.
    #[error(transparent)]
    Rpc(#[from] RpcError),
    /// The period monitor failed.
    #[error(transparent)]
    Period(#[from] PeriodError),
}

impl ChainStateError {
    /// Returns `true` if the projection cannot continue after this error.
    ///
    /// Other errors leave the projection untouched, so the same update can be retried later.
    pub const fn is_fatal(&self) -> bool {
        match self {
            Self::OutOfOrder { .. } |
            Self::NonContiguous { .. } |
            Self::UnknownRequest { .. } |
            Self::Period(_) => true,
            Self::BlockTime(BlockTimeError::SingleBlockChain { .. }) => true,
            Self::Unresolvable { .. } | Self::BlockTime(_) | Self::Rpc(_) => false,
        }
    }
}
