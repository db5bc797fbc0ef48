//! Commonly used types in marketwatch.
//!
//! This crate contains the value types shared by the block/time correlation engine and the chain
//! state replay: block and time ranges, storage request identifiers, decoded marketplace events
//! and the proving period arithmetic of the marketplace.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

mod abi;
mod events;
mod period;
mod request;
mod time;

pub use abi::{FunctionKind, MarketplaceFunction, MarketplaceFunctions, Selector};
pub use events::{ChainEvent, ChainEvents, EventKind, MarketplaceEvent};
pub use period::{PeriodNumber, ProofPeriods};
pub use request::{slot_id, Ask, Content, Request, RequestId, RequestState, SlotId};
pub use time::{flatten, BlockInterval, BlockNumber, BlockTimeEntry, TimeRange};

pub use alloy_primitives::{keccak256, Address, B256};
/// Re-export of the time crate used for every instant in marketwatch.
pub use chrono;
pub use chrono::{DateTime, Utc};
