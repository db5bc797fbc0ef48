//! In-memory ledger for tests.

use crate::{ContractCall, LedgerRpc, MarketplaceContracts, RpcError, RpcResult};
use marketwatch_primitives::{
    chrono::TimeDelta, Address, BlockInterval, BlockNumber, DateTime, MarketplaceEvent,
    PeriodNumber, ProofPeriods, Request, RequestId, RequestState, SlotId, TimeRange, Utc,
};
use parking_lot::Mutex;
use std::{
    collections::{HashMap, HashSet},
    sync::atomic::{AtomicUsize, Ordering},
};

/// Address of the marketplace contract on the [`MockChain`].
pub const MOCK_MARKETPLACE: Address = Address::repeat_byte(0x4d);

#[derive(Debug, Default)]
struct MockChainInner {
    timestamps: Vec<Option<DateTime<Utc>>>,
    events: Vec<(BlockNumber, MarketplaceEvent)>,
    requests: HashMap<RequestId, (Request, RequestState)>,
    hosts: HashMap<(RequestId, u64), Address>,
    proof_required: HashSet<(RequestId, u64)>,
    proof_will_be_required: HashSet<(RequestId, u64)>,
    can_mark_missing: HashSet<(SlotId, PeriodNumber)>,
    marked_missing: HashSet<(SlotId, PeriodNumber)>,
    calls: Vec<ContractCall>,
    failing_timestamp_calls: usize,
    failing_request_calls: usize,
    failing_missed_proof_calls: usize,
}

impl MockChainInner {
    fn fail_missed_proof_call(&mut self) -> RpcResult<()> {
        if self.failing_missed_proof_calls > 0 {
            self.failing_missed_proof_calls -= 1;
            return Err(RpcError::Timeout)
        }
        Ok(())
    }
}

/// A scriptable chain implementing [`LedgerRpc`] and [`MarketplaceContracts`].
///
/// Blocks are mined at a fixed spacing. Everything the marketplace would answer is set up by the
/// test through the setters.
#[derive(Debug)]
pub struct MockChain {
    inner: Mutex<MockChainInner>,
    spacing: TimeDelta,
    periods: ProofPeriods,
    timestamp_calls: AtomicUsize,
    request_calls: AtomicUsize,
}

impl MockChain {
    /// Creates a chain of `count` blocks, block 0 at `genesis`, one block every `spacing`.
    pub fn new(genesis: DateTime<Utc>, spacing: TimeDelta, count: u64) -> Self {
        let timestamps = (0..count).map(|n| Some(genesis + spacing * n as i32)).collect();
        Self {
            inner: Mutex::new(MockChainInner { timestamps, ..Default::default() }),
            spacing,
            periods: ProofPeriods::new(60),
            timestamp_calls: AtomicUsize::new(0),
            request_calls: AtomicUsize::new(0),
        }
    }

    /// Sets the proving period length.
    pub fn with_periods(mut self, periods: ProofPeriods) -> Self {
        self.periods = periods;
        self
    }

    /// Makes the first `count` blocks report an unusable timestamp, as a pruned node does.
    pub fn with_invalid_prefix(self, count: u64) -> Self {
        {
            let mut inner = self.inner.lock();
            for (n, ts) in inner.timestamps.iter_mut().enumerate().take(count as usize) {
                *ts = if n % 2 == 0 { None } else { Some(DateTime::<Utc>::UNIX_EPOCH) };
            }
        }
        self
    }

    /// Timestamp of the block, as configured.
    pub fn time_of(&self, block_number: BlockNumber) -> DateTime<Utc> {
        self.inner.lock().timestamps[block_number as usize].unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }

    /// Number of the latest block.
    pub fn head(&self) -> BlockNumber {
        self.inner.lock().timestamps.len() as BlockNumber - 1
    }

    /// Appends `count` blocks at the configured spacing.
    pub fn mine(&self, count: u64) {
        let mut inner = self.inner.lock();
        for _ in 0..count {
            let last =
                inner.timestamps.last().copied().flatten().unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
            inner.timestamps.push(Some(last + self.spacing));
        }
    }

    /// Emits an event in the block.
    pub fn add_event(&self, block_number: BlockNumber, event: MarketplaceEvent) {
        self.inner.lock().events.push((block_number, event));
    }

    /// Registers a request on the marketplace.
    pub fn add_request(&self, request: Request, state: RequestState) {
        self.inner.lock().requests.insert(request.id, (request, state));
    }

    /// Changes the state the marketplace reports for a request.
    pub fn set_request_state(&self, request_id: &RequestId, state: RequestState) {
        if let Some((_, current)) = self.inner.lock().requests.get_mut(request_id) {
            *current = state;
        }
    }

    /// Sets the host of a slot.
    pub fn set_host(&self, request_id: &RequestId, slot_index: u64, host: Option<Address>) {
        let mut inner = self.inner.lock();
        match host {
            Some(host) => inner.hosts.insert((*request_id, slot_index), host),
            None => inner.hosts.remove(&(*request_id, slot_index)),
        };
    }

    /// Sets whether a proof is required now and in the next period.
    pub fn set_proof_required(
        &self,
        request_id: &RequestId,
        slot_index: u64,
        now: bool,
        next: bool,
    ) {
        let mut inner = self.inner.lock();
        let key = (*request_id, slot_index);
        if now {
            inner.proof_required.insert(key);
        } else {
            inner.proof_required.remove(&key);
        }
        if next {
            inner.proof_will_be_required.insert(key);
        } else {
            inner.proof_will_be_required.remove(&key);
        }
    }

    /// Makes the proof of the slot for the period markable as missing.
    pub fn set_can_mark_missing(&self, slot_id: SlotId, period: PeriodNumber) {
        self.inner.lock().can_mark_missing.insert((slot_id, period));
    }

    /// Marks the proof of the slot for the period as missing.
    pub fn set_marked_missing(&self, slot_id: SlotId, period: PeriodNumber) {
        self.inner.lock().marked_missing.insert((slot_id, period));
    }

    /// Includes a transaction.
    pub fn add_contract_call(&self, call: ContractCall) {
        self.inner.lock().calls.push(call);
    }

    /// Makes the next `count` timestamp lookups time out.
    pub fn fail_timestamps(&self, count: usize) {
        self.inner.lock().failing_timestamp_calls = count;
    }

    /// Makes the next `count` request lookups fail with a transport error.
    pub fn fail_requests(&self, count: usize) {
        self.inner.lock().failing_request_calls = count;
    }

    /// Makes the next `count` missed-proof lookups time out.
    pub fn fail_missed_proof_queries(&self, count: usize) {
        self.inner.lock().failing_missed_proof_calls = count;
    }

    /// Number of timestamp lookups served so far.
    pub fn timestamp_calls(&self) -> usize {
        self.timestamp_calls.load(Ordering::Relaxed)
    }

    /// Number of request lookups served so far.
    pub fn request_calls(&self) -> usize {
        self.request_calls.load(Ordering::Relaxed)
    }
}

impl LedgerRpc for MockChain {
    fn current_block_number(&self) -> RpcResult<BlockNumber> {
        Ok(self.head())
    }

    fn block_timestamp(&self, block_number: BlockNumber) -> RpcResult<Option<DateTime<Utc>>> {
        self.timestamp_calls.fetch_add(1, Ordering::Relaxed);
        let mut inner = self.inner.lock();
        if inner.failing_timestamp_calls > 0 {
            inner.failing_timestamp_calls -= 1;
            return Err(RpcError::Timeout)
        }
        Ok(inner.timestamps.get(block_number as usize).copied().flatten())
    }

    fn contract_calls(&self, interval: &BlockInterval) -> RpcResult<Vec<ContractCall>> {
        let inner = self.inner.lock();
        Ok(inner.calls.iter().filter(|c| interval.contains(c.block_number)).cloned().collect())
    }
}

impl MarketplaceContracts for MockChain {
    fn marketplace_address(&self) -> Address {
        MOCK_MARKETPLACE
    }

    fn request(&self, request_id: &RequestId) -> RpcResult<Request> {
        self.request_calls.fetch_add(1, Ordering::Relaxed);
        let mut inner = self.inner.lock();
        if inner.failing_request_calls > 0 {
            inner.failing_request_calls -= 1;
            return Err(RpcError::Transport("connection reset".to_string()))
        }
        inner
            .requests
            .get(request_id)
            .map(|(request, _)| request.clone())
            .ok_or_else(|| RpcError::NotFound(format!("request {request_id}")))
    }

    fn request_state(&self, request_id: &RequestId) -> RpcResult<RequestState> {
        let inner = self.inner.lock();
        inner
            .requests
            .get(request_id)
            .map(|(_, state)| *state)
            .ok_or_else(|| RpcError::NotFound(format!("request {request_id}")))
    }

    fn slot_host(&self, request_id: &RequestId, slot_index: u64) -> RpcResult<Option<Address>> {
        Ok(self.inner.lock().hosts.get(&(*request_id, slot_index)).copied())
    }

    fn is_proof_required(&self, request_id: &RequestId, slot_index: u64) -> RpcResult<bool> {
        Ok(self.inner.lock().proof_required.contains(&(*request_id, slot_index)))
    }

    fn will_proof_be_required(&self, request_id: &RequestId, slot_index: u64) -> RpcResult<bool> {
        Ok(self.inner.lock().proof_will_be_required.contains(&(*request_id, slot_index)))
    }

    fn can_mark_proof_as_missing(&self, slot_id: &SlotId, period: PeriodNumber) -> RpcResult<bool> {
        let mut inner = self.inner.lock();
        inner.fail_missed_proof_call()?;
        Ok(inner.can_mark_missing.contains(&(*slot_id, period)))
    }

    fn is_proof_marked_as_missing(
        &self,
        slot_id: &SlotId,
        period: PeriodNumber,
    ) -> RpcResult<bool> {
        let mut inner = self.inner.lock();
        inner.fail_missed_proof_call()?;
        Ok(inner.marked_missing.contains(&(*slot_id, period)))
    }

    fn period_number(&self, utc: DateTime<Utc>) -> PeriodNumber {
        self.periods.period_number(utc)
    }

    fn period_time_range(&self, period: PeriodNumber) -> TimeRange {
        self.periods.period_time_range(period)
    }

    fn events(&self, interval: &BlockInterval) -> RpcResult<Vec<(BlockNumber, MarketplaceEvent)>> {
        let inner = self.inner.lock();
        Ok(inner.events.iter().filter(|(n, _)| interval.contains(*n)).cloned().collect())
    }
}
