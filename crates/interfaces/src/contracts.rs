use crate::RpcResult;
use marketwatch_primitives::{
    slot_id, Address, BlockInterval, BlockNumber, DateTime, MarketplaceEvent, PeriodNumber,
    Request, RequestId, RequestState, SlotId, TimeRange, Utc,
};

/// Decoded access to the marketplace contracts.
#[auto_impl::auto_impl(&, Arc, Box)]
pub trait MarketplaceContracts: Send + Sync + std::fmt::Debug {
    /// Address of the marketplace contract.
    fn marketplace_address(&self) -> Address;

    /// Returns the request, or [`RpcError::NotFound`](crate::RpcError::NotFound).
    fn request(&self, request_id: &RequestId) -> RpcResult<Request>;

    /// Returns the current state of the request.
    fn request_state(&self, request_id: &RequestId) -> RpcResult<RequestState>;

    /// Returns the host currently filling the slot.
    fn slot_host(&self, request_id: &RequestId, slot_index: u64) -> RpcResult<Option<Address>>;

    /// Returns the slot id of a request slot.
    fn slot_id(&self, request_id: &RequestId, slot_index: u64) -> SlotId {
        slot_id(request_id, slot_index)
    }

    /// Whether the host of the slot has to submit a proof in the current period.
    fn is_proof_required(&self, request_id: &RequestId, slot_index: u64) -> RpcResult<bool>;

    /// Whether the host of the slot will have to submit a proof in the next period.
    fn will_proof_be_required(&self, request_id: &RequestId, slot_index: u64) -> RpcResult<bool>;

    /// Whether the proof of the slot for the period can currently be marked as missing.
    fn can_mark_proof_as_missing(&self, slot_id: &SlotId, period: PeriodNumber) -> RpcResult<bool>;

    /// Whether the proof of the slot for the period has been marked as missing.
    fn is_proof_marked_as_missing(&self, slot_id: &SlotId, period: PeriodNumber)
        -> RpcResult<bool>;

    /// Returns the proving period containing the instant.
    fn period_number(&self, utc: DateTime<Utc>) -> PeriodNumber;

    /// Returns the instants covered by the proving period.
    fn period_time_range(&self, period: PeriodNumber) -> TimeRange;

    /// Returns the marketplace events emitted in the interval, in log order.
    fn events(&self, interval: &BlockInterval) -> RpcResult<Vec<(BlockNumber, MarketplaceEvent)>>;
}
