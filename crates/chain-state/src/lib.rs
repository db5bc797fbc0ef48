//! Event-sourced projection of the storage marketplace.
//!
//! [`ChainState`] replays the marketplace events block by block and keeps a
//! [`ChainStateRequest`] per storage request. Every change is forwarded to a
//! [`ChainStateChangeHandler`]. Alongside, the [`PeriodMonitor`] follows the proving periods and
//! emits a [`PeriodReport`] for every period that closes.
//!
//! ## Feature Flags
//!
//! - `test-utils`: Export a [`RecordingHandler`](test_utils::RecordingHandler).

#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

mod error;
mod handler;
pub mod period;
mod request;
mod state;

pub use error::{ChainStateError, ChainStateResult, PeriodError};
pub use handler::{
    ChainStateChangeHandler, ChainStateChangeHandlerMux, DoNothingChainEventHandler, ProofEvent,
    RequestEvent, SlotFill,
};
pub use period::{PeriodMonitor, PeriodMonitorResult, PeriodReport};
pub use request::{ChainStateRequest, RequestHosts};
pub use state::{ChainState, ChainStateConfig};

#[cfg(any(test, feature = "test-utils"))]
/// Common test helpers for observing the projection.
pub mod test_utils;
