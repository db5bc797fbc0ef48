use crate::{ChainStateRequest, PeriodReport};
use marketwatch_primitives::{Address, BlockTimeEntry, RequestId, SlotId};

/// A change of one request, together with the block that caused it.
///
/// `request` is a copy taken after the change was applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestEvent {
    /// Block of the change, with its interpolated time.
    pub block: BlockTimeEntry,
    /// The request after the change.
    pub request: ChainStateRequest,
}

/// A slot that was filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotFill {
    /// Index of the slot.
    pub slot_index: u64,
    /// The new host.
    pub host: Address,
    /// Whether the slot had been filled before and was freed since.
    pub is_repair: bool,
}

/// A submitted storage proof.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProofEvent {
    /// Block that included the proof.
    pub block: BlockTimeEntry,
    /// Slot the proof is for.
    pub slot_id: SlotId,
    /// Request and slot index owning the slot, if the slot is known.
    pub origin: Option<(RequestId, u64)>,
}

/// Receives every change of the chain state projection.
///
/// Callbacks run on the thread applying the update, in block order. Within a block, changes
/// caused by events come before changes caused by the passing of time.
#[auto_impl::auto_impl(&, Arc, Box)]
pub trait ChainStateChangeHandler: Send + Sync + std::fmt::Debug {
    /// A storage request was created.
    fn on_new_request(&self, event: &RequestEvent);

    /// All slots of a request were filled and the request started.
    fn on_request_fulfilled(&self, event: &RequestEvent);

    /// A request expired before starting.
    fn on_request_cancelled(&self, event: &RequestEvent);

    /// A request lost too many slots.
    fn on_request_failed(&self, event: &RequestEvent);

    /// The storage duration of a started request ended.
    fn on_request_finished(&self, event: &RequestEvent);

    /// A host filled a slot.
    fn on_slot_filled(&self, event: &RequestEvent, fill: &SlotFill);

    /// A slot lost its host.
    fn on_slot_freed(&self, event: &RequestEvent, slot_index: u64);

    /// All reservations of a slot are taken.
    fn on_slot_reservations_full(&self, event: &RequestEvent, slot_index: u64);

    /// A host submitted a storage proof.
    fn on_proof_submitted(&self, event: &ProofEvent);

    /// A non-fatal problem occurred while applying changes.
    fn on_error(&self, error: &str);

    /// A proving period closed.
    fn on_period_report(&self, report: &PeriodReport);
}

/// A [`ChainStateChangeHandler`] that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
#[non_exhaustive]
pub struct DoNothingChainEventHandler;

impl ChainStateChangeHandler for DoNothingChainEventHandler {
    fn on_new_request(&self, _event: &RequestEvent) {}
    fn on_request_fulfilled(&self, _event: &RequestEvent) {}
    fn on_request_cancelled(&self, _event: &RequestEvent) {}
    fn on_request_failed(&self, _event: &RequestEvent) {}
    fn on_request_finished(&self, _event: &RequestEvent) {}
    fn on_slot_filled(&self, _event: &RequestEvent, _fill: &SlotFill) {}
    fn on_slot_freed(&self, _event: &RequestEvent, _slot_index: u64) {}
    fn on_slot_reservations_full(&self, _event: &RequestEvent, _slot_index: u64) {}
    fn on_proof_submitted(&self, _event: &ProofEvent) {}
    fn on_error(&self, _error: &str) {}
    fn on_period_report(&self, _report: &PeriodReport) {}
}

/// Forwards every change to all registered handlers, in registration order.
#[derive(Debug, Default)]
pub struct ChainStateChangeHandlerMux {
    handlers: Vec<Box<dyn ChainStateChangeHandler>>,
}

impl ChainStateChangeHandlerMux {
    /// Creates a mux without handlers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler.
    pub fn with_handler(mut self, handler: impl ChainStateChangeHandler + 'static) -> Self {
        self.push(handler);
        self
    }

    /// Registers a handler.
    pub fn push(&mut self, handler: impl ChainStateChangeHandler + 'static) {
        self.handlers.push(Box::new(handler));
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns `true` if no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    fn each(&self, f: impl Fn(&dyn ChainStateChangeHandler)) {
        for handler in &self.handlers {
            f(handler.as_ref());
        }
    }
}

impl ChainStateChangeHandler for ChainStateChangeHandlerMux {
    fn on_new_request(&self, event: &RequestEvent) {
        self.each(|h| h.on_new_request(event));
    }

    fn on_request_fulfilled(&self, event: &RequestEvent) {
        self.each(|h| h.on_request_fulfilled(event));
    }

    fn on_request_cancelled(&self, event: &RequestEvent) {
        self.each(|h| h.on_request_cancelled(event));
    }

    fn on_request_failed(&self, event: &RequestEvent) {
        self.each(|h| h.on_request_failed(event));
    }

    fn on_request_finished(&self, event: &RequestEvent) {
        self.each(|h| h.on_request_finished(event));
    }

    fn on_slot_filled(&self, event: &RequestEvent, fill: &SlotFill) {
        self.each(|h| h.on_slot_filled(event, fill));
    }

    fn on_slot_freed(&self, event: &RequestEvent, slot_index: u64) {
        self.each(|h| h.on_slot_freed(event, slot_index));
    }

    fn on_slot_reservations_full(&self, event: &RequestEvent, slot_index: u64) {
        self.each(|h| h.on_slot_reservations_full(event, slot_index));
    }

    fn on_proof_submitted(&self, event: &ProofEvent) {
        self.each(|h| h.on_proof_submitted(event));
    }

    fn on_error(&self, error: &str) {
        self.each(|h| h.on_error(error));
    }

    fn on_period_report(&self, report: &PeriodReport) {
        self.each(|h| h.on_period_report(report));
    }
}
