//! Interfaces to the ledger node and the marketplace contracts.
//!
//! The replay engine never talks to a node directly. Everything it needs from the ledger goes
//! through [`LedgerRpc`] (blocks, timestamps, transactions) and [`MarketplaceContracts`] (decoded
//! marketplace state and events). Calls are expected to block until answered; wrap them in a
//! [`RetryPolicy`] to survive flaky nodes.
//!
//! ## Feature Flags
//!
//! - `test-utils`: Export an in-memory [`MockChain`](test_utils::MockChain) implementing both
//!   interfaces.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

mod contracts;
mod error;
mod ledger;
mod retry;

pub use contracts::MarketplaceContracts;
pub use error::{RpcError, RpcResult};
pub use ledger::{ContractCall, LedgerRpc};
pub use retry::{BackoffKind, RetryPolicy};

#[cfg(any(test, feature = "test-utils"))]
/// Common test helpers for mocking the ledger.
pub mod test_utils;
