//! Handlers for observing the projection in tests.

use crate::{
    ChainStateChangeHandler, PeriodReport, ProofEvent, RequestEvent, SlotFill,
};
use marketwatch_primitives::{BlockNumber, RequestId, RequestState};
use parking_lot::Mutex;

/// A change recorded by [`RecordingHandler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// A request changed state, or was created.
    Request {
        /// Block of the change.
        block_number: BlockNumber,
        /// The request.
        request_id: RequestId,
        /// Its state after the change.
        state: RequestState,
        /// Name of the callback.
        callback: &'static str,
    },
    /// A slot was filled.
    SlotFilled {
        /// The request.
        request_id: RequestId,
        /// The fill.
        fill: SlotFill,
    },
    /// A slot was freed.
    SlotFreed {
        /// The request.
        request_id: RequestId,
        /// Index of the slot.
        slot_index: u64,
    },
    /// All reservations of a slot are taken.
    SlotReservationsFull {
        /// The request.
        request_id: RequestId,
        /// Index of the slot.
        slot_index: u64,
    },
    /// A proof was submitted.
    Proof(ProofEvent),
    /// A non-fatal error.
    Error(String),
    /// A period closed.
    Period(PeriodReport),
}

/// Records every change it receives.
#[derive(Debug, Default)]
pub struct RecordingHandler {
    notifications: Mutex<Vec<Notification>>,
}

impl RecordingHandler {
    /// Returns and clears the recorded changes.
    pub fn take(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.notifications.lock())
    }

    /// Copy of the recorded changes.
    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications.lock().clone()
    }

    /// Names of the request callbacks received for the request, in order.
    pub fn request_callbacks(&self, request_id: &RequestId) -> Vec<&'static str> {
        self.notifications
            .lock()
            .iter()
            .filter_map(|n| match n {
                Notification::Request { request_id: id, callback, .. } if id == request_id => {
                    Some(*callback)
                }
                _ => None,
            })
            .collect()
    }

    /// Period reports received so far.
    pub fn period_reports(&self) -> Vec<PeriodReport> {
        self.notifications
            .lock()
            .iter()
            .filter_map(|n| match n {
                Notification::Period(report) => Some(report.clone()),
                _ => None,
            })
            .collect()
    }

    fn request(&self, event: &RequestEvent, callback: &'static str) {
        self.notifications.lock().push(Notification::Request {
            block_number: event.block.block_number,
            request_id: *event.request.id(),
            state: event.request.state(),
            callback,
        });
    }
}

impl ChainStateChangeHandler for RecordingHandler {
    fn on_new_request(&self, event: &RequestEvent) {
        self.request(event, "new");
    }

    fn on_request_fulfilled(&self, event: &RequestEvent) {
        self.request(event, "fulfilled");
    }

    fn on_request_cancelled(&self, event: &RequestEvent) {
        self.request(event, "cancelled");
    }

    fn on_request_failed(&self, event: &RequestEvent) {
        self.request(event, "failed");
    }

    fn on_request_finished(&self, event: &RequestEvent) {
        self.request(event, "finished");
    }

    fn on_slot_filled(&self, event: &RequestEvent, fill: &SlotFill) {
        self.notifications
            .lock()
            .push(Notification::SlotFilled { request_id: *event.request.id(), fill: *fill });
    }

    fn on_slot_freed(&self, event: &RequestEvent, slot_index: u64) {
        self.notifications
            .lock()
            .push(Notification::SlotFreed { request_id: *event.request.id(), slot_index });
    }

    fn on_slot_reservations_full(&self, event: &RequestEvent, slot_index: u64) {
        self.notifications.lock().push(Notification::SlotReservationsFull {
            request_id: *event.request.id(),
            slot_index,
        });
    }

    fn on_proof_submitted(&self, event: &ProofEvent) {
        self.notifications.lock().push(Notification::Proof(*event));
    }

    fn on_error(&self, error: &str) {
        self.notifications.lock().push(Notification::Error(error.to_string()));
    }

    fn on_period_report(&self, report: &PeriodReport) {
        self.notifications.lock().push(Notification::Period(report.clone()));
    }
}
