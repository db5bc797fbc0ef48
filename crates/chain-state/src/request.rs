use marketwatch_primitives::{
    chrono::TimeDelta, Address, BlockTimeEntry, DateTime, Request, RequestId, RequestState, Utc,
};
use std::collections::{BTreeMap, BTreeSet};

/// Assignment of slot indices to hosts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestHosts {
    hosts: BTreeMap<u64, Address>,
    ever_filled: BTreeSet<u64>,
}

impl RequestHosts {
    /// Records the host filling the slot.
    pub fn add(&mut self, slot_index: u64, host: Address) {
        self.hosts.insert(slot_index, host);
        self.ever_filled.insert(slot_index);
    }

    /// Clears the host of the slot. The slot stays known as previously filled.
    pub fn remove(&mut self, slot_index: u64) {
        self.hosts.remove(&slot_index);
    }

    /// Host currently filling the slot.
    pub fn host(&self, slot_index: u64) -> Option<Address> {
        self.hosts.get(&slot_index).copied()
    }

    /// Whether the slot is currently filled.
    pub fn is_filled(&self, slot_index: u64) -> bool {
        self.hosts.contains_key(&slot_index)
    }

    /// Whether the slot has been filled at any point.
    pub fn was_previously_filled(&self, slot_index: u64) -> bool {
        self.ever_filled.contains(&slot_index)
    }

    /// Currently filled slots and their hosts, by slot index.
    pub fn iter(&self) -> impl Iterator<Item = (u64, Address)> + '_ {
        self.hosts.iter().map(|(slot, host)| (*slot, *host))
    }

    /// Number of currently filled slots.
    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    /// Returns `true` if no slot is filled.
    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}

/// Projection of one storage request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainStateRequest {
    request: Request,
    state: RequestState,
    first_seen: BlockTimeEntry,
    expiry_utc: DateTime<Utc>,
    finished_utc: DateTime<Utc>,
    hosts: RequestHosts,
}

impl ChainStateRequest {
    /// Creates the projection of a request first seen in the given block.
    ///
    /// Expiry and end are counted from that block.
    pub fn new(request: Request, state: RequestState, first_seen: BlockTimeEntry) -> Self {
        let expiry_utc = first_seen.utc + seconds(request.expiry);
        let finished_utc = first_seen.utc + seconds(request.ask.duration);
        let hosts = RequestHosts::default();
        Self { request, state, first_seen, expiry_utc, finished_utc, hosts }
    }

    /// Identifier of the request.
    pub const fn id(&self) -> &RequestId {
        &self.request.id
    }

    /// The on-chain request.
    pub const fn request(&self) -> &Request {
        &self.request
    }

    /// Current state.
    pub const fn state(&self) -> RequestState {
        self.state
    }

    /// Block in which the request was first referenced.
    pub const fn first_seen(&self) -> BlockTimeEntry {
        self.first_seen
    }

    /// Instant the request expires if it has not started.
    pub const fn expiry_utc(&self) -> DateTime<Utc> {
        self.expiry_utc
    }

    /// Instant the storage duration ends.
    pub const fn finished_utc(&self) -> DateTime<Utc> {
        self.finished_utc
    }

    /// Slot assignments.
    pub const fn hosts(&self) -> &RequestHosts {
        &self.hosts
    }

    /// Number of slots.
    pub const fn slots(&self) -> u64 {
        self.request.ask.slots
    }

    /// Whether the request still takes part in the marketplace.
    pub const fn is_live(&self) -> bool {
        !self.state.is_terminal()
    }

    pub(crate) fn hosts_mut(&mut self) -> &mut RequestHosts {
        &mut self.hosts
    }

    pub(crate) fn set_state(&mut self, state: RequestState) {
        self.state = state;
    }
}

fn seconds(value: u64) -> TimeDelta {
    TimeDelta::seconds(i64::try_from(value).unwrap_or(i64::MAX / 1_000))
}
