use marketwatch_blocktime::StoreError;
use marketwatch_chain_state::ChainStateError;
use thiserror::Error;

/// Errors of the [`ChainMonitor`](crate::ChainMonitor).
#[derive(Debug, Error)]
pub enum MonitorError {
    /// The projection failed and cannot continue.
    #[error(transparent)]
    ChainState(#[from] ChainStateError),
    /// The block timestamp cache could not be opened.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The worker panicked or was cancelled.
    #[error("chain monitor worker panicked: {0}")]
    WorkerPanicked(String),
    /// The monitor was already stopped.
    #[error("chain monitor already stopped")]
    AlreadyStopped,
}
