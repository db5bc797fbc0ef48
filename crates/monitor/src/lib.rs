//! Background monitoring of the storage marketplace.
//!
//! A [`ChainMonitor`] owns a [`ChainState`](marketwatch_chain_state::ChainState) and advances it
//! to the current time at a fixed interval on a blocking worker. Readers get the requests through
//! a snapshot that is replaced after every update, so they never wait on the ledger.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

mod error;
mod monitor;
mod shutdown;

pub use error::MonitorError;
pub use monitor::{ChainMonitor, RequestsSnapshot};
pub use shutdown::{stop_channel, StopHandle, StopRequested};
