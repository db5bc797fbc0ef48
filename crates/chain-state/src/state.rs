use crate::{
    period::{PeriodMonitor, PeriodMonitorResult, DEFAULT_PERIOD_STEP},
    ChainStateChangeHandler, ChainStateError, ChainStateRequest, ChainStateResult, ProofEvent,
    RequestEvent, SlotFill,
};
use marketwatch_blocktime::BlockTimeFinder;
use marketwatch_interfaces::{ContractCall, LedgerRpc, MarketplaceContracts, RetryPolicy, RpcResult};
use marketwatch_primitives::{
    BlockInterval, BlockNumber, BlockTimeEntry, ChainEvent, ChainEvents, DateTime,
    MarketplaceEvent, RequestId, RequestState, SlotId, TimeRange, Utc,
};
use std::{collections::BTreeMap, time::Duration};
use tracing::{debug, info, trace, warn};

/// Settings of the [`ChainState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainStateConfig {
    /// Retry policy of marketplace calls.
    pub retry: RetryPolicy,
    /// Whether proving periods are followed.
    pub period_monitoring: bool,
    /// Interval at which the period monitor checks for a period change.
    pub period_step: Duration,
}

impl Default for ChainStateConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            period_monitoring: true,
            period_step: DEFAULT_PERIOD_STEP,
        }
    }
}

/// Projection of the marketplace, advanced by replaying its events.
///
/// The projection covers a continuous [`TimeRange`] starting at the instant it was initialized at.
/// [`ChainState::update`] extends it forward; it can never move back.
///
/// Requests created before that instant are read from the marketplace the first time an event
/// references them.
#[derive(Debug)]
pub struct ChainState<R, C, H> {
    finder: BlockTimeFinder<R>,
    contracts: C,
    handler: H,
    retry: RetryPolicy,
    // few hundred live requests at most, linear lookups are fine
    requests: Vec<ChainStateRequest>,
    total_span: TimeRange,
    current_block: BlockTimeEntry,
    last_update_utc: DateTime<Utc>,
    period_monitor: Option<PeriodMonitor>,
}

impl<R, C, H> ChainState<R, C, H>
where
    R: LedgerRpc,
    C: MarketplaceContracts,
    H: ChainStateChangeHandler,
{
    /// Creates the projection starting at the highest block at or before `start_utc`.
    ///
    /// Falls back to block 1 if that block cannot be resolved.
    pub fn initialize(
        mut finder: BlockTimeFinder<R>,
        contracts: C,
        handler: H,
        start_utc: DateTime<Utc>,
        config: ChainStateConfig,
    ) -> ChainStateResult<Self> {
        let start = match finder.highest_block_number_before(start_utc) {
            Ok(Some(block_number)) => finder.block_time(block_number)?,
            Ok(None) => {
                warn!(
                    target: "chain_state",
                    %start_utc,
                    "Start precedes the known chain, starting at block 1"
                );
                finder.block_time(1)?
            }
            Err(err) => {
                warn!(
                    target: "chain_state",
                    %start_utc,
                    %err,
                    "Failed to resolve start block, starting at block 1"
                );
                finder.block_time(1)?
            }
        };
        info!(target: "chain_state", %start, "Initialized chain state");

        let period_monitor = config
            .period_monitoring
            .then(|| PeriodMonitor::new(config.period_step, config.retry));

        Ok(Self {
            finder,
            contracts,
            handler,
            retry: config.retry,
            requests: Vec::new(),
            total_span: TimeRange::at(start.utc),
            current_block: start,
            last_update_utc: start_utc,
            period_monitor,
        })
    }

    /// All requests seen so far, in order of first sighting.
    pub fn requests(&self) -> &[ChainStateRequest] {
        &self.requests
    }

    /// The request with the given id, if seen.
    pub fn request(&self, request_id: &RequestId) -> Option<&ChainStateRequest> {
        self.requests.iter().find(|r| r.id() == request_id)
    }

    /// Instants covered by the projection.
    pub const fn total_span(&self) -> TimeRange {
        self.total_span
    }

    /// Last block applied.
    pub const fn current_block(&self) -> BlockTimeEntry {
        self.current_block
    }

    /// The period monitor, if period monitoring is enabled.
    pub const fn period_monitor(&self) -> Option<&PeriodMonitor> {
        self.period_monitor.as_ref()
    }

    /// Returns the period reports collected so far and forgets them.
    pub fn get_and_clear_period_reports(&mut self) -> PeriodMonitorResult {
        self.period_monitor.as_mut().map(PeriodMonitor::get_and_clear_reports).unwrap_or_default()
    }

    /// The change handler.
    pub const fn handler(&self) -> &H {
        &self.handler
    }

    /// The marketplace contracts.
    pub const fn contracts(&self) -> &C {
        &self.contracts
    }

    /// The block/time finder.
    pub const fn finder(&self) -> &BlockTimeFinder<R> {
        &self.finder
    }

    /// Advances the projection to the current wall-clock time.
    pub fn update_to_now(&mut self) -> ChainStateResult<()> {
        self.update(Utc::now())
    }

    /// Advances the projection to the highest block at or before `to_utc`.
    ///
    /// Fails with [`ChainStateError::OutOfOrder`] if `to_utc` precedes an earlier update. If the
    /// chain has no new block, nothing changes. Errors while reading the chain leave the
    /// projection untouched.
    pub fn update(&mut self, to_utc: DateTime<Utc>) -> ChainStateResult<()> {
        if to_utc < self.last_update_utc {
            return Err(ChainStateError::OutOfOrder {
                requested: to_utc,
                covered: self.last_update_utc,
            })
        }

        let Some(to_block) = self.finder.highest_block_number_before(to_utc)? else {
            return Err(ChainStateError::Unresolvable { utc: to_utc })
        };
        if to_block <= self.current_block.block_number {
            trace!(target: "chain_state", %to_utc, current = %self.current_block, "No new blocks");
            self.last_update_utc = to_utc;
            return Ok(())
        }

        let from = self.finder.block_time(self.current_block.block_number + 1)?;
        let to = self.finder.block_time(to_block)?;
        let interval = BlockInterval::new(from, to);
        let events = self.fetch_events(&interval)?;
        let calls = if self.period_monitor.is_some() {
            let rpc = self.finder.bounds().fetcher().rpc();
            self.retry.retry("contract_calls", || rpc.contract_calls(&interval))?
        } else {
            Vec::new()
        };

        self.apply(&events, &calls)?;
        self.last_update_utc = to_utc;
        Ok(())
    }

    /// Applies the events and transactions of an interval directly following the current block.
    ///
    /// Blocks without events get a time interpolated linearly over the interval.
    pub fn apply(&mut self, events: &ChainEvents, calls: &[ContractCall]) -> ChainStateResult<()> {
        let interval = *events.interval();
        if interval.from <= self.current_block.block_number ||
            interval.time_range.from < self.total_span.from
        {
            return Err(ChainStateError::OutOfOrder {
                requested: interval.time_range.from,
                covered: self.total_span.to,
            })
        }
        let expected = self.current_block.block_number + 1;
        if interval.from != expected {
            return Err(ChainStateError::NonContiguous { expected, from: interval.from })
        }

        debug!(
            target: "chain_state",
            %interval,
            events = events.len(),
            calls = calls.len(),
            "Applying interval"
        );

        let mut calls_by_block: BTreeMap<BlockNumber, Vec<ContractCall>> = BTreeMap::new();
        for call in calls {
            calls_by_block.entry(call.block_number).or_default().push(call.clone());
        }

        let blocks = i32::try_from(interval.number_of_blocks()).unwrap_or(i32::MAX);
        let span_per_block = interval.time_range.duration() / blocks;
        let mut utc = interval.time_range.from;

        for block_number in interval.blocks() {
            // the block belongs to the period of its own time
            if let Some(monitor) = &mut self.period_monitor {
                monitor.update(&self.contracts, &self.handler, utc, &self.requests);
            }

            for event in events.in_block(block_number) {
                self.apply_event(event)?;
            }

            let block = BlockTimeEntry::new(block_number, utc);
            self.apply_time_implicit_changes(block);

            if let (Some(monitor), Some(calls)) =
                (&mut self.period_monitor, calls_by_block.get(&block_number))
            {
                monitor.record_calls(self.contracts.marketplace_address(), calls)?;
            }

            self.current_block = block;
            utc += span_per_block;
        }

        self.current_block = BlockTimeEntry::new(interval.to, interval.time_range.to);
        self.total_span.to = interval.time_range.to;
        Ok(())
    }

    fn fetch_events(&mut self, interval: &BlockInterval) -> ChainStateResult<ChainEvents> {
        let contracts = &self.contracts;
        let raw = self.retry.retry("marketplace_events", || contracts.events(interval))?;

        let mut events = Vec::with_capacity(raw.len());
        for (block_number, event) in raw {
            let block = self.finder.block_time(block_number)?;
            events.push(ChainEvent { block, event });
        }
        Ok(ChainEvents::new(*interval, events))
    }

    fn apply_event(&mut self, chain_event: &ChainEvent) -> ChainStateResult<()> {
        let block = chain_event.block;
        trace!(target: "chain_state", %block, event = ?chain_event.event, "Applying event");

        match &chain_event.event {
            MarketplaceEvent::StorageRequested { request_id } => {
                let Some(index) = self.find_or_read(request_id, block, true) else {
                    return Err(ChainStateError::UnknownRequest {
                        request_id: *request_id,
                        block_number: block.block_number,
                    })
                };
                self.handler.on_new_request(&self.event(index, block));
            }
            MarketplaceEvent::RequestFulfilled { request_id } => {
                if let Some(index) = self.transition(request_id, block, RequestState::Started) {
                    self.handler.on_request_fulfilled(&self.event(index, block));
                }
            }
            MarketplaceEvent::RequestCancelled { request_id } => {
                if let Some(index) = self.transition(request_id, block, RequestState::Cancelled) {
                    self.handler.on_request_cancelled(&self.event(index, block));
                }
            }
            MarketplaceEvent::RequestFailed { request_id } => {
                if let Some(index) = self.transition(request_id, block, RequestState::Failed) {
                    self.handler.on_request_failed(&self.event(index, block));
                }
            }
            MarketplaceEvent::SlotFilled { request_id, slot_index, host } => {
                if let Some(index) = self.find_or_read(request_id, block, false) {
                    let hosts = self.requests[index].hosts_mut();
                    let is_repair =
                        !hosts.is_filled(*slot_index) && hosts.was_previously_filled(*slot_index);
                    hosts.add(*slot_index, *host);
                    let fill = SlotFill { slot_index: *slot_index, host: *host, is_repair };
                    self.handler.on_slot_filled(&self.event(index, block), &fill);
                }
            }
            MarketplaceEvent::SlotFreed { request_id, slot_index } => {
                if let Some(index) = self.find_or_read(request_id, block, false) {
                    self.requests[index].hosts_mut().remove(*slot_index);
                    self.handler.on_slot_freed(&self.event(index, block), *slot_index);
                }
            }
            MarketplaceEvent::SlotReservationsFull { request_id, slot_index } => {
                if let Some(index) = self.find_or_read(request_id, block, false) {
                    self.handler.on_slot_reservations_full(&self.event(index, block), *slot_index);
                }
            }
            MarketplaceEvent::ProofSubmitted { slot_id } => {
                let origin = self.find_slot(slot_id);
                if origin.is_none() {
                    debug!(
                        target: "chain_state",
                        %slot_id,
                        %block,
                        "Proof submitted for unknown slot"
                    );
                }
                self.handler.on_proof_submitted(&ProofEvent { block, slot_id: *slot_id, origin });
            }
        }
        Ok(())
    }

    /// Moves started requests whose duration ended to [`RequestState::Finished`].
    fn apply_time_implicit_changes(&mut self, block: BlockTimeEntry) {
        for request in &mut self.requests {
            if request.state() == RequestState::Started && request.finished_utc() < block.utc {
                request.set_state(RequestState::Finished);
                debug!(target: "chain_state", request = %request.id(), %block, "Request finished");
                let event = RequestEvent { block, request: request.clone() };
                self.handler.on_request_finished(&event);
            }
        }
    }

    fn transition(
        &mut self,
        request_id: &RequestId,
        block: BlockTimeEntry,
        state: RequestState,
    ) -> Option<usize> {
        let index = self.find_or_read(request_id, block, false)?;
        self.requests[index].set_state(state);
        Some(index)
    }

    /// Returns the index of the request, reading it from the marketplace if not seen yet.
    ///
    /// `None` if the request cannot be read. The failure is logged and reported to the handler.
    fn find_or_read(
        &mut self,
        request_id: &RequestId,
        block: BlockTimeEntry,
        is_creation: bool,
    ) -> Option<usize> {
        if let Some(index) = self.requests.iter().position(|r| r.id() == request_id) {
            return Some(index)
        }

        match self.read_request(request_id, block, is_creation) {
            Ok(request) => {
                debug!(
                    target: "chain_state",
                    request = %request_id,
                    state = %request.state(),
                    %block,
                    "Tracking request"
                );
                self.requests.push(request);
                Some(self.requests.len() - 1)
            }
            Err(err) => {
                warn!(
                    target: "chain_state",
                    request = %request_id,
                    %block,
                    %err,
                    "Failed to read request, dropping event"
                );
                self.handler.on_error(&format!("failed to read request {request_id}: {err}"));
                None
            }
        }
    }

    fn read_request(
        &self,
        request_id: &RequestId,
        block: BlockTimeEntry,
        is_creation: bool,
    ) -> RpcResult<ChainStateRequest> {
        let contracts = &self.contracts;
        let request = self.retry.retry("get_request", || contracts.request(request_id))?;
        if is_creation {
            return Ok(ChainStateRequest::new(request, RequestState::New, block))
        }

        let state = self.retry.retry("request_state", || contracts.request_state(request_id))?;
        let mut projected = ChainStateRequest::new(request, state, block);
        if projected.is_live() {
            for slot_index in 0..projected.slots() {
                let host =
                    self.retry.retry("slot_host", || contracts.slot_host(request_id, slot_index))?;
                if let Some(host) = host {
                    projected.hosts_mut().add(slot_index, host);
                }
            }
        }
        Ok(projected)
    }

    /// Finds the request and index of a slot by trying every slot of every known request.
    fn find_slot(&self, slot_id: &SlotId) -> Option<(RequestId, u64)> {
        self.requests.iter().find_map(|request| {
            (0..request.slots())
                .find(|slot_index| &self.contracts.slot_id(request.id(), *slot_index) == slot_id)
                .map(|slot_index| (*request.id(), slot_index))
        })
    }

    fn event(&self, index: usize, block: BlockTimeEntry) -> RequestEvent {
        RequestEvent { block, request: self.requests[index].clone() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        test_utils::{Notification, RecordingHandler},
        PeriodError,
    };
    use assert_matches::assert_matches;
    use marketwatch_blocktime::{BlockCache, BlockFetcher};
    use marketwatch_interfaces::{
        test_utils::{MockChain, MOCK_MARKETPLACE},
        BackoffKind,
    };
    use marketwatch_primitives::{
        chrono::{TimeDelta, TimeZone},
        slot_id, Address, Ask, Content, MarketplaceFunctions, PeriodNumber, Request, B256,
    };
    use std::sync::Arc;

    type TestState = ChainState<Arc<MockChain>, Arc<MockChain>, Arc<RecordingHandler>>;

    fn genesis() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    fn chain(blocks: u64) -> Arc<MockChain> {
        Arc::new(MockChain::new(genesis(), TimeDelta::seconds(12), blocks))
    }

    fn request(byte: u8, slots: u64, duration: u64) -> Request {
        Request {
            id: B256::repeat_byte(byte),
            client: Address::repeat_byte(0xc1),
            ask: Ask { slots, duration, ..Default::default() },
            content: Content::default(),
            expiry: 120,
            nonce: B256::ZERO,
        }
    }

    fn state_with(
        chain: &Arc<MockChain>,
        start: BlockNumber,
        config: ChainStateConfig,
    ) -> (TestState, Arc<RecordingHandler>) {
        let handler = Arc::new(RecordingHandler::default());
        let cache = Arc::new(BlockCache::in_memory());
        let fetcher = BlockFetcher::new(chain.clone(), cache, RetryPolicy::none());
        let state = ChainState::initialize(
            BlockTimeFinder::new(fetcher),
            chain.clone(),
            handler.clone(),
            chain.time_of(start),
            config,
        )
        .unwrap();
        (state, handler)
    }

    fn state(chain: &Arc<MockChain>) -> (TestState, Arc<RecordingHandler>) {
        let config = ChainStateConfig {
            retry: RetryPolicy::none(),
            period_monitoring: false,
            ..Default::default()
        };
        state_with(chain, 0, config)
    }

    #[test]
    fn request_lifecycle() {
        let chain = chain(20);
        let request = request(1, 4, 60);
        let id = request.id;
        chain.add_request(request, RequestState::New);
        chain.add_event(5, MarketplaceEvent::StorageRequested { request_id: id });
        chain.add_event(8, MarketplaceEvent::RequestFulfilled { request_id: id });

        let (mut state, handler) = state(&chain);
        assert_eq!(state.current_block().block_number, 0);

        state.update(chain.time_of(10)).unwrap();
        let tracked = state.request(&id).unwrap();
        assert_eq!(tracked.state(), RequestState::Started);
        assert_eq!(tracked.first_seen().block_number, 5);
        assert_eq!(tracked.finished_utc(), chain.time_of(5) + TimeDelta::seconds(60));
        assert_eq!(state.current_block().block_number, 10);
        assert_eq!(handler.request_callbacks(&id), vec!["new", "fulfilled"]);

        state.update(chain.time_of(19)).unwrap();
        assert_eq!(state.request(&id).unwrap().state(), RequestState::Finished);
        assert_eq!(handler.request_callbacks(&id), vec!["new", "fulfilled", "finished"]);
        assert_matches!(
            handler.notifications().last(),
            Some(Notification::Request { block_number: 11, callback: "finished", .. })
        );
        assert_eq!(state.total_span(), TimeRange::new(chain.time_of(0), chain.time_of(19)));
    }

    #[test]
    fn slot_refill_is_a_repair() {
        let chain = chain(12);
        let request = request(2, 2, 3_600);
        let id = request.id;
        let (a, b, c) =
            (Address::repeat_byte(0xa), Address::repeat_byte(0xb), Address::repeat_byte(0xc));
        chain.add_request(request, RequestState::New);
        chain.add_event(2, MarketplaceEvent::StorageRequested { request_id: id });
        chain.add_event(3, MarketplaceEvent::SlotFilled { request_id: id, slot_index: 0, host: a });
        chain.add_event(4, MarketplaceEvent::SlotFilled { request_id: id, slot_index: 1, host: b });
        chain.add_event(5, MarketplaceEvent::RequestFulfilled { request_id: id });
        chain.add_event(6, MarketplaceEvent::SlotFreed { request_id: id, slot_index: 0 });
        chain.add_event(7, MarketplaceEvent::SlotFilled { request_id: id, slot_index: 0, host: c });
        chain.add_event(
            8,
            MarketplaceEvent::SlotReservationsFull { request_id: id, slot_index: 1 },
        );

        let (mut state, handler) = state(&chain);
        state.update(chain.time_of(10)).unwrap();

        let slot_changes: Vec<_> = handler
            .notifications()
            .into_iter()
            .filter(|n| !matches!(n, Notification::Request { .. }))
            .collect();
        assert_eq!(
            slot_changes,
            vec![
                Notification::SlotFilled {
                    request_id: id,
                    fill: SlotFill { slot_index: 0, host: a, is_repair: false }
                },
                Notification::SlotFilled {
                    request_id: id,
                    fill: SlotFill { slot_index: 1, host: b, is_repair: false }
                },
                Notification::SlotFreed { request_id: id, slot_index: 0 },
                Notification::SlotFilled {
                    request_id: id,
                    fill: SlotFill { slot_index: 0, host: c, is_repair: true }
                },
                Notification::SlotReservationsFull { request_id: id, slot_index: 1 },
            ]
        );

        let hosts = state.request(&id).unwrap().hosts();
        assert_eq!(hosts.host(0), Some(c));
        assert_eq!(hosts.host(1), Some(b));
    }

    #[test]
    fn reads_requests_created_before_the_start() {
        let chain = chain(8);
        let request = request(3, 2, 3_600);
        let id = request.id;
        let (a, b) = (Address::repeat_byte(0xa), Address::repeat_byte(0xb));
        chain.add_request(request, RequestState::Started);
        chain.set_host(&id, 0, Some(a));
        chain.set_host(&id, 1, Some(b));
        chain.add_event(3, MarketplaceEvent::SlotFreed { request_id: id, slot_index: 0 });

        let (mut state, handler) = state(&chain);
        state.update(chain.time_of(5)).unwrap();

        let tracked = state.request(&id).unwrap();
        assert_eq!(tracked.state(), RequestState::Started);
        assert_eq!(tracked.first_seen().block_number, 3);
        assert!(!tracked.hosts().is_filled(0));
        assert!(tracked.hosts().was_previously_filled(0));
        assert_eq!(tracked.hosts().host(1), Some(b));
        assert_eq!(handler.take(), vec![Notification::SlotFreed { request_id: id, slot_index: 0 }]);
    }

    #[test]
    fn drops_events_of_unreadable_requests() {
        let chain = chain(8);
        let unknown = B256::repeat_byte(0xee);
        chain.add_event(3, MarketplaceEvent::RequestFulfilled { request_id: unknown });

        let (mut state, handler) = state(&chain);
        state.update(chain.time_of(5)).unwrap();

        assert!(state.requests().is_empty());
        assert_matches!(handler.take().as_slice(), [Notification::Error(_)]);
        assert_eq!(state.current_block().block_number, 5);
    }

    #[test]
    fn unreadable_new_request_is_fatal() {
        let chain = chain(8);
        let unknown = B256::repeat_byte(0xee);
        chain.add_event(3, MarketplaceEvent::StorageRequested { request_id: unknown });

        let (mut state, _) = state(&chain);
        let err = state.update(chain.time_of(5)).unwrap_err();
        assert_matches!(err, ChainStateError::UnknownRequest { block_number: 3, .. });
        assert!(err.is_fatal());
    }

    #[test]
    fn retries_transient_request_failures() {
        let chain = chain(8);
        let request = request(4, 1, 3_600);
        let id = request.id;
        chain.add_request(request, RequestState::New);
        chain.add_event(2, MarketplaceEvent::StorageRequested { request_id: id });
        chain.fail_requests(1);

        let retry = RetryPolicy {
            max_attempts: 2,
            delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff: BackoffKind::Fixed,
        };
        let config = ChainStateConfig { retry, period_monitoring: false, ..Default::default() };
        let (mut state, handler) = state_with(&chain, 0, config);
        state.update(chain.time_of(5)).unwrap();

        assert_eq!(chain.request_calls(), 2);
        assert_eq!(handler.request_callbacks(&id), vec!["new"]);
    }

    #[test]
    fn failed_update_can_be_retried() {
        let chain = chain(10);
        let request = request(5, 1, 3_600);
        let id = request.id;
        chain.add_request(request, RequestState::New);

        let (mut state, handler) = state(&chain);
        chain.mine(10);
        chain.add_event(12, MarketplaceEvent::StorageRequested { request_id: id });
        chain.fail_timestamps(1);

        let err = state.update(chain.time_of(19)).unwrap_err();
        assert!(!err.is_fatal());
        assert_eq!(state.current_block().block_number, 0);
        assert!(handler.notifications().is_empty());

        state.update(chain.time_of(19)).unwrap();
        assert_eq!(state.current_block().block_number, 19);
        assert_eq!(handler.request_callbacks(&id), vec!["new"]);
    }

    #[test]
    fn never_moves_back() {
        let chain = chain(20);
        let (mut state, _) = state(&chain);
        state.update(chain.time_of(10)).unwrap();

        let err = state.update(chain.time_of(5)).unwrap_err();
        assert_matches!(err, ChainStateError::OutOfOrder { .. });
        assert!(err.is_fatal());

        // same instant again is a no-op
        state.update(chain.time_of(10)).unwrap();
        assert_eq!(state.current_block().block_number, 10);

        let replay = ChainEvents::new(
            BlockInterval::new(
                BlockTimeEntry::new(5, chain.time_of(5)),
                BlockTimeEntry::new(6, chain.time_of(6)),
            ),
            vec![],
        );
        assert_matches!(state.apply(&replay, &[]), Err(ChainStateError::OutOfOrder { .. }));
    }

    #[test]
    fn rejects_gaps() {
        let chain = chain(20);
        let (mut state, _) = state(&chain);
        state.update(chain.time_of(5)).unwrap();

        let skipping = ChainEvents::new(
            BlockInterval::new(
                BlockTimeEntry::new(10, chain.time_of(10)),
                BlockTimeEntry::new(12, chain.time_of(12)),
            ),
            vec![],
        );
        let err = state.apply(&skipping, &[]).unwrap_err();
        assert_matches!(err, ChainStateError::NonContiguous { expected: 6, from: 10 });
        assert!(err.is_fatal());
        assert_eq!(state.current_block().block_number, 5);
    }

    #[test]
    fn resolves_proof_origin() {
        let chain = chain(8);
        let request = request(6, 3, 3_600);
        let id = request.id;
        chain.add_request(request, RequestState::New);
        chain.add_event(2, MarketplaceEvent::StorageRequested { request_id: id });
        chain.add_event(4, MarketplaceEvent::ProofSubmitted { slot_id: slot_id(&id, 1) });
        chain.add_event(5, MarketplaceEvent::ProofSubmitted { slot_id: B256::repeat_byte(0x99) });

        let (mut state, handler) = state(&chain);
        state.update(chain.time_of(6)).unwrap();

        let proofs: Vec<_> = handler
            .notifications()
            .into_iter()
            .filter_map(|n| match n {
                Notification::Proof(proof) => Some((proof.block.block_number, proof.origin)),
                _ => None,
            })
            .collect();
        assert_eq!(proofs, vec![(4, Some((id, 1))), (5, None)]);
    }

    #[test]
    fn reports_closed_periods() {
        let chain = chain(30);
        let period = |seconds: i64| -> PeriodNumber {
            chain.period_number(genesis() + TimeDelta::seconds(seconds))
        };
        let request = request(7, 2, 3_600);
        let id = request.id;
        chain.add_request(request, RequestState::New);
        chain.add_event(5, MarketplaceEvent::StorageRequested { request_id: id });
        chain.add_event(7, MarketplaceEvent::RequestFulfilled { request_id: id });
        chain.set_proof_required(&id, 0, true, false);
        chain.set_can_mark_missing(slot_id(&id, 0), period(100));

        let functions = MarketplaceFunctions::default();
        let mut input = functions.by_name("submitProof").unwrap().selector.to_vec();
        input.extend_from_slice(&[0u8; 64]);
        chain.add_contract_call(ContractCall {
            tx_hash: B256::repeat_byte(0x77),
            block_number: 11,
            from: Address::repeat_byte(0xa),
            to: Some(MOCK_MARKETPLACE),
            input,
        });

        let config = ChainStateConfig { retry: RetryPolicy::none(), ..Default::default() };
        let (mut state, handler) = state_with(&chain, 0, config);
        state.update(chain.time_of(29)).unwrap();

        let reports = handler.period_reports();
        let numbers: Vec<_> = reports.iter().map(|r| r.period_number).collect();
        assert_eq!(numbers, (period(0)..period(0) + 5).collect::<Vec<_>>());

        // created during the period, nothing queried
        let created = &reports[1];
        assert_eq!(created.period_number, period(40));
        assert_eq!(created.requests.len(), 1);
        assert!(created.requests[0].created_in_period);
        assert_eq!(created.number_of_proofs_missed(), 0);

        let missed = &reports[2];
        assert_eq!(missed.period_number, period(100));
        assert!(!missed.requests[0].created_in_period);
        assert_eq!(missed.number_of_proofs_required(), 1);
        let missed_slots: Vec<_> =
            missed.missed_proofs().map(|(r, s)| (*r, s.slot_index)).collect();
        assert_eq!(missed_slots, vec![(id, 0)]);
        assert_eq!(missed.function_call_counts(), vec![("submitProof", 1)]);

        let result = state.get_and_clear_period_reports();
        assert_eq!(result.reports, reports);
        assert_eq!(result.period_low(), Some(period(0)));
        assert!(state.get_and_clear_period_reports().is_empty());
    }

    #[test]
    fn reports_missed_proofs_of_every_slot() {
        let chain = chain(30);
        let period = |seconds: i64| -> PeriodNumber {
            chain.period_number(genesis() + TimeDelta::seconds(seconds))
        };
        let requests = [request(0x11, 3, 3_600), request(0x12, 3, 3_600), request(0x13, 3, 3_600)];
        let [a, b, c] = requests.each_ref().map(|request| request.id);
        for request in requests {
            let id = request.id;
            chain.add_request(request, RequestState::New);
            chain.add_event(5, MarketplaceEvent::StorageRequested { request_id: id });
            chain.add_event(7, MarketplaceEvent::RequestFulfilled { request_id: id });
            for slot_index in 0..3 {
                chain.set_proof_required(&id, slot_index, true, false);
            }
        }
        chain.set_can_mark_missing(slot_id(&a, 0), period(100));
        chain.set_marked_missing(slot_id(&b, 1), period(100));
        chain.set_can_mark_missing(slot_id(&c, 2), period(100));
        chain.set_marked_missing(slot_id(&c, 2), period(100));
        chain.add_event(10, MarketplaceEvent::RequestFailed { request_id: c });

        let config = ChainStateConfig { retry: RetryPolicy::none(), ..Default::default() };
        let (mut state, handler) = state_with(&chain, 0, config);
        state.update(chain.time_of(29)).unwrap();

        let reports = handler.period_reports();
        let report = &reports[2];
        assert_eq!(report.period_number, period(100));
        assert_eq!(report.requests.len(), 3);
        assert!(report.requests.iter().all(|r| r.slots.len() == 3 && !r.created_in_period));
        assert_eq!(report.number_of_slots(), 9);
        assert_eq!(report.number_of_proofs_required(), 9);
        assert_eq!(report.number_of_proofs_missed(), 3);

        let missed: Vec<_> = report.missed_proofs().map(|(r, s)| (*r, s.slot_index)).collect();
        assert_eq!(missed, vec![(a, 0), (b, 1), (c, 2)]);
        let ended: Vec<_> = report.requests.iter().map(|r| r.ended).collect();
        assert_eq!(ended, vec![false, false, true]);

        let failed = &report.requests[2].slots[2];
        assert!(failed.can_mark_as_missing && failed.marked_as_missing);
        let marked = &report.requests[1].slots[1];
        assert!(!marked.can_mark_as_missing && marked.marked_as_missing);

        // the failed request is gone from the next period
        let next = &reports[3];
        let tracked: Vec<_> = next.requests.iter().map(|r| r.request_id).collect();
        assert_eq!(tracked, vec![a, b]);
        assert_eq!(next.number_of_slots(), 6);
        assert_eq!(next.number_of_proofs_missed(), 0);
    }

    #[test]
    fn failed_missed_proof_queries_count_as_not_missed() {
        let chain = chain(30);
        let request = request(0x21, 1, 3_600);
        let id = request.id;
        chain.add_request(request, RequestState::New);
        chain.add_event(5, MarketplaceEvent::StorageRequested { request_id: id });
        chain.add_event(7, MarketplaceEvent::RequestFulfilled { request_id: id });
        chain.set_proof_required(&id, 0, true, false);
        chain.set_can_mark_missing(slot_id(&id, 0), chain.period_number(chain.time_of(10)));
        chain.fail_missed_proof_queries(2);

        let config = ChainStateConfig { retry: RetryPolicy::none(), ..Default::default() };
        let (mut state, handler) = state_with(&chain, 0, config);
        state.update(chain.time_of(29)).unwrap();

        let reports = handler.period_reports();
        let report = &reports[2];
        assert_eq!(report.number_of_proofs_required(), 1);
        assert_eq!(report.number_of_proofs_missed(), 0);
        assert!(!report.requests[0].slots[0].can_mark_as_missing);

        let errors: Vec<_> = handler
            .notifications()
            .into_iter()
            .filter_map(|n| match n {
                Notification::Error(message) => Some(message),
                _ => None,
            })
            .collect();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].starts_with("can_mark_proof_as_missing failed"));
        assert!(errors[1].starts_with("is_proof_marked_as_missing failed"));
    }

    #[test]
    fn new_request_belongs_to_its_period() {
        let chain = chain(30);
        let request = request(0x31, 2, 3_600);
        let id = request.id;
        chain.add_request(request, RequestState::New);
        // first block of the second period
        chain.add_event(4, MarketplaceEvent::StorageRequested { request_id: id });

        let config = ChainStateConfig { retry: RetryPolicy::none(), ..Default::default() };
        let (mut state, handler) = state_with(&chain, 0, config);
        state.update(chain.time_of(29)).unwrap();

        let reports = handler.period_reports();
        assert_ne!(chain.period_number(chain.time_of(3)), chain.period_number(chain.time_of(4)));
        assert!(reports[0].requests.is_empty());
        assert_eq!(reports[1].requests.len(), 1);
        assert!(reports[1].requests[0].created_in_period);
    }

    #[test]
    fn view_call_in_transaction_is_fatal() {
        let chain = chain(10);
        let functions = MarketplaceFunctions::default();
        let mut input = functions.by_name("getRequest").unwrap().selector.to_vec();
        input.extend_from_slice(&[0u8; 32]);
        chain.add_contract_call(ContractCall {
            tx_hash: B256::repeat_byte(0x78),
            block_number: 4,
            from: Address::repeat_byte(0xa),
            to: Some(MOCK_MARKETPLACE),
            input,
        });

        let config = ChainStateConfig { retry: RetryPolicy::none(), ..Default::default() };
        let (mut state, _) = state_with(&chain, 0, config);
        let err = state.update(chain.time_of(9)).unwrap_err();
        assert_matches!(
            err,
            ChainStateError::Period(PeriodError::ViewFunctionInTransaction { .. })
        );
        assert!(err.is_fatal());
    }
}
