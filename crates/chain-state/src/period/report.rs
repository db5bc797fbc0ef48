use marketwatch_primitives::{
    Address, BlockNumber, PeriodNumber, RequestId, SlotId, TimeRange, B256,
};
use std::fmt;

/// Proof status of one slot at the end of a period.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotReport {
    /// Index of the slot within its request.
    pub slot_index: u64,
    /// Identifier of the slot.
    pub slot_id: SlotId,
    /// Host at the start of the period.
    pub host: Option<Address>,
    /// Whether a proof was required during the period.
    pub is_proof_required: bool,
    /// Whether a proof was announced for the following period.
    pub will_proof_be_required: bool,
    /// Whether the proof of the period can still be marked as missing.
    pub can_mark_as_missing: bool,
    /// Whether the proof of the period was marked as missing.
    pub marked_as_missing: bool,
}

impl SlotReport {
    /// Whether the host missed the proof of the period.
    pub const fn is_missed(&self) -> bool {
        self.can_mark_as_missing || self.marked_as_missing
    }
}

/// Proof status of one request at the end of a period.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestReport {
    /// The request.
    pub request_id: RequestId,
    /// Slots, by index.
    pub slots: Vec<SlotReport>,
    /// The request was created during the period. Its slots are not queried.
    pub created_in_period: bool,
    /// The request ended during the period. Its slots are still queried for missed proofs.
    pub ended: bool,
}

impl RequestReport {
    /// Slots whose proof was missed.
    pub fn missed_proofs(&self) -> impl Iterator<Item = &SlotReport> + '_ {
        self.slots.iter().filter(|slot| slot.is_missed())
    }
}

/// A transaction calling the marketplace during a period.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionCallReport {
    /// Block that included the transaction.
    pub block_number: BlockNumber,
    /// Hash of the transaction.
    pub tx_hash: B256,
    /// Sender of the transaction.
    pub from: Address,
    /// Name of the called function, `None` if the selector is unknown.
    pub function: Option<&'static str>,
}

impl fmt::Display for FunctionCallReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let function = self.function.unwrap_or("unknown");
        write!(f, "{function} by {} in #{}", self.from, self.block_number)
    }
}

/// Everything observed about one closed proving period.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeriodReport {
    /// The period.
    pub period_number: PeriodNumber,
    /// Instants covered by the period.
    pub time_range: TimeRange,
    /// Every request live at any point of the period.
    pub requests: Vec<RequestReport>,
    /// Marketplace transactions included during the period.
    pub function_calls: Vec<FunctionCallReport>,
}

impl PeriodReport {
    /// Number of slots across all requests.
    pub fn number_of_slots(&self) -> usize {
        self.requests.iter().map(|r| r.slots.len()).sum()
    }

    /// Number of slots that had to submit a proof.
    pub fn number_of_proofs_required(&self) -> usize {
        self.slots().filter(|(_, slot)| slot.is_proof_required).count()
    }

    /// Number of proofs missed.
    pub fn number_of_proofs_missed(&self) -> usize {
        self.missed_proofs().count()
    }

    /// Missed proofs with the request owning the slot.
    pub fn missed_proofs(&self) -> impl Iterator<Item = (&RequestId, &SlotReport)> + '_ {
        self.slots().filter(|(_, slot)| slot.is_missed())
    }

    /// Number of calls to each function, unknown selectors counted under `"unknown"`.
    pub fn function_call_counts(&self) -> Vec<(&'static str, usize)> {
        let mut counts: Vec<(&'static str, usize)> = Vec::new();
        for call in &self.function_calls {
            let name = call.function.unwrap_or("unknown");
            match counts.iter_mut().find(|(n, _)| *n == name) {
                Some((_, count)) => *count += 1,
                None => counts.push((name, 1)),
            }
        }
        counts
    }

    fn slots(&self) -> impl Iterator<Item = (&RequestId, &SlotReport)> + '_ {
        self.requests.iter().flat_map(|r| r.slots.iter().map(move |slot| (&r.request_id, slot)))
    }
}

/// Reports collected since the last time they were taken.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PeriodMonitorResult {
    /// The reports, oldest first.
    pub reports: Vec<PeriodReport>,
}

impl PeriodMonitorResult {
    /// Returns `true` if no period closed.
    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    /// Lowest reported period.
    pub fn period_low(&self) -> Option<PeriodNumber> {
        self.reports.iter().map(|r| r.period_number).min()
    }

    /// Highest reported period.
    pub fn period_high(&self) -> Option<PeriodNumber> {
        self.reports.iter().map(|r| r.period_number).max()
    }

    /// Average number of slots per period.
    pub fn average_num_slots(&self) -> f64 {
        self.average(PeriodReport::number_of_slots)
    }

    /// Average number of required proofs per period.
    pub fn average_num_proofs_required(&self) -> f64 {
        self.average(PeriodReport::number_of_proofs_required)
    }

    fn average(&self, f: impl Fn(&PeriodReport) -> usize) -> f64 {
        if self.reports.is_empty() {
            return 0.0
        }
        self.reports.iter().map(f).sum::<usize>() as f64 / self.reports.len() as f64
    }
}
