use crate::{BlockInterval, BlockNumber, BlockTimeEntry, RequestId, SlotId};
use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

/// Decoded marketplace log event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketplaceEvent {
    /// A client created a storage request.
    StorageRequested {
        /// The new request.
        request_id: RequestId,
    },
    /// All slots of a request are filled and the request started.
    RequestFulfilled {
        /// The started request.
        request_id: RequestId,
    },
    /// A request expired before it started.
    RequestCancelled {
        /// The cancelled request.
        request_id: RequestId,
    },
    /// A request lost too many slots.
    RequestFailed {
        /// The failed request.
        request_id: RequestId,
    },
    /// A host filled a slot.
    SlotFilled {
        /// Request owning the slot.
        request_id: RequestId,
        /// Index of the slot.
        slot_index: u64,
        /// Host that filled the slot.
        host: Address,
    },
    /// A slot was freed, by its host or by the marketplace.
    SlotFreed {
        /// Request owning the slot.
        request_id: RequestId,
        /// Index of the slot.
        slot_index: u64,
    },
    /// All reservations for a slot are taken.
    SlotReservationsFull {
        /// Request owning the slot.
        request_id: RequestId,
        /// Index of the slot.
        slot_index: u64,
    },
    /// A host submitted a storage proof.
    ProofSubmitted {
        /// Slot the proof was submitted for.
        slot_id: SlotId,
    },
}

/// Discriminant of [`MarketplaceEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// [`MarketplaceEvent::StorageRequested`]
    StorageRequested,
    /// [`MarketplaceEvent::RequestFulfilled`]
    RequestFulfilled,
    /// [`MarketplaceEvent::RequestCancelled`]
    RequestCancelled,
    /// [`MarketplaceEvent::RequestFailed`]
    RequestFailed,
    /// [`MarketplaceEvent::SlotFilled`]
    SlotFilled,
    /// [`MarketplaceEvent::SlotFreed`]
    SlotFreed,
    /// [`MarketplaceEvent::SlotReservationsFull`]
    SlotReservationsFull,
    /// [`MarketplaceEvent::ProofSubmitted`]
    ProofSubmitted,
}

impl MarketplaceEvent {
    /// Returns the kind of the event.
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::StorageRequested { .. } => EventKind::StorageRequested,
            Self::RequestFulfilled { .. } => EventKind::RequestFulfilled,
            Self::RequestCancelled { .. } => EventKind::RequestCancelled,
            Self::RequestFailed { .. } => EventKind::RequestFailed,
            Self::SlotFilled { .. } => EventKind::SlotFilled,
            Self::SlotFreed { .. } => EventKind::SlotFreed,
            Self::SlotReservationsFull { .. } => EventKind::SlotReservationsFull,
            Self::ProofSubmitted { .. } => EventKind::ProofSubmitted,
        }
    }

    /// Returns the request the event refers to. Proofs only carry a slot id.
    pub const fn request_id(&self) -> Option<&RequestId> {
        match self {
            Self::StorageRequested { request_id } |
            Self::RequestFulfilled { request_id } |
            Self::RequestCancelled { request_id } |
            Self::RequestFailed { request_id } |
            Self::SlotFilled { request_id, .. } |
            Self::SlotFreed { request_id, .. } |
            Self::SlotReservationsFull { request_id, .. } => Some(request_id),
            Self::ProofSubmitted { .. } => None,
        }
    }
}

/// A marketplace event together with the block that emitted it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainEvent {
    /// Block that emitted the event.
    pub block: BlockTimeEntry,
    /// The decoded event.
    pub event: MarketplaceEvent,
}

/// All marketplace events of one block interval, ordered by block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainEvents {
    interval: BlockInterval,
    events: Vec<ChainEvent>,
}

impl ChainEvents {
    /// Creates the event set of an interval.
    ///
    /// Events are ordered by block number. Events of the same block keep their log order.
    pub fn new(interval: BlockInterval, mut events: Vec<ChainEvent>) -> Self {
        events.sort_by_key(|e| e.block.block_number);
        Self { interval, events }
    }

    /// The interval covered.
    pub const fn interval(&self) -> &BlockInterval {
        &self.interval
    }

    /// All events, ordered by block.
    pub fn all(&self) -> &[ChainEvent] {
        &self.events
    }

    /// Number of events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns `true` if the interval has no events.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events emitted by the given block, in log order.
    pub fn in_block(&self, block_number: BlockNumber) -> impl Iterator<Item = &ChainEvent> + '_ {
        let start = self.events.partition_point(|e| e.block.block_number < block_number);
        self.events[start..].iter().take_while(move |e| e.block.block_number == block_number)
    }

    /// Events of the given kind, ordered by block.
    pub fn of_kind(&self, kind: EventKind) -> impl Iterator<Item = &ChainEvent> + '_ {
        self.events.iter().filter(move |e| e.event.kind() == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::B256;
    use chrono::{TimeZone, Utc};

    fn entry(n: u64) -> BlockTimeEntry {
        BlockTimeEntry::new(n, Utc.timestamp_opt(1_000 + n as i64 * 12, 0).unwrap())
    }

    #[test]
    fn events_are_grouped_by_block() {
        let id = B256::repeat_byte(1);
        let events = ChainEvents::new(
            BlockInterval::new(entry(1), entry(10)),
            vec![
                ChainEvent {
                    block: entry(7),
                    event: MarketplaceEvent::RequestFulfilled { request_id: id },
                },
                ChainEvent {
                    block: entry(3),
                    event: MarketplaceEvent::StorageRequested { request_id: id },
                },
                ChainEvent {
                    block: entry(7),
                    event: MarketplaceEvent::SlotFreed { request_id: id, slot_index: 0 },
                },
            ],
        );

        assert_eq!(events.len(), 3);
        assert_eq!(events.all()[0].block.block_number, 3);
        assert_eq!(events.in_block(7).count(), 2);
        assert_eq!(events.in_block(5).count(), 0);
        assert_eq!(
            events.in_block(7).next().map(|e| e.event.kind()),
            Some(EventKind::RequestFulfilled)
        );
        assert_eq!(events.of_kind(EventKind::StorageRequested).count(), 1);
    }
}
