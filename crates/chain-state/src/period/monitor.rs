use super::{
    calls::classify_calls, FunctionCallReport, PeriodMonitorResult, PeriodReport, RequestReport,
    SlotReport,
};
use crate::{ChainStateChangeHandler, ChainStateRequest, PeriodError};
use marketwatch_interfaces::{ContractCall, MarketplaceContracts, RetryPolicy, RpcResult};
use marketwatch_primitives::{
    chrono::TimeDelta, Address, DateTime, MarketplaceFunctions, PeriodNumber, RequestId, SlotId,
    TimeRange, Utc,
};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Interval at which the period monitor checks for a period change.
pub const DEFAULT_PERIOD_STEP: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
struct SlotSnapshot {
    slot_index: u64,
    slot_id: SlotId,
    host: Option<Address>,
    is_proof_required: bool,
    will_proof_be_required: bool,
}

impl SlotSnapshot {
    const fn into_report(self, can_mark_as_missing: bool, marked_as_missing: bool) -> SlotReport {
        SlotReport {
            slot_index: self.slot_index,
            slot_id: self.slot_id,
            host: self.host,
            is_proof_required: self.is_proof_required,
            will_proof_be_required: self.will_proof_be_required,
            can_mark_as_missing,
            marked_as_missing,
        }
    }
}

#[derive(Debug, Clone)]
struct RequestSnapshot {
    request_id: RequestId,
    slots: Vec<SlotSnapshot>,
}

/// The period being observed, captured when it was entered.
#[derive(Debug, Clone)]
pub struct CurrentPeriod {
    period_number: PeriodNumber,
    time_range: TimeRange,
    requests: Vec<RequestSnapshot>,
    function_calls: Vec<FunctionCallReport>,
}

impl CurrentPeriod {
    /// The period.
    pub const fn period_number(&self) -> PeriodNumber {
        self.period_number
    }

    /// Instants covered by the period.
    pub const fn time_range(&self) -> TimeRange {
        self.time_range
    }

    /// Number of requests live when the period was entered.
    pub fn number_of_requests(&self) -> usize {
        self.requests.len()
    }

    /// Marketplace transactions seen so far in the period.
    pub fn function_calls(&self) -> &[FunctionCallReport] {
        &self.function_calls
    }
}

/// Follows the proving periods while the chain state advances.
///
/// The monitor steps through time at a fixed interval. On entering a period it captures which
/// slots must prove; on leaving it asks the marketplace which proofs were missed and emits a
/// [`PeriodReport`]. Failed queries are reported to the handler and count as `false`.
#[derive(Debug)]
pub struct PeriodMonitor {
    step: TimeDelta,
    retry: RetryPolicy,
    functions: MarketplaceFunctions,
    last_step_utc: Option<DateTime<Utc>>,
    current: Option<CurrentPeriod>,
    reports: Vec<PeriodReport>,
}

impl PeriodMonitor {
    /// Creates a monitor checking for period changes every `step`.
    pub fn new(step: Duration, retry: RetryPolicy) -> Self {
        let step = TimeDelta::from_std(step).unwrap_or_else(|_| TimeDelta::days(1));
        Self {
            step: step.max(TimeDelta::seconds(1)),
            retry,
            functions: MarketplaceFunctions::default(),
            last_step_utc: None,
            current: None,
            reports: Vec::new(),
        }
    }

    /// The period being observed.
    pub const fn current_period(&self) -> Option<&CurrentPeriod> {
        self.current.as_ref()
    }

    /// Returns the reports collected so far and forgets them.
    pub fn get_and_clear_reports(&mut self) -> PeriodMonitorResult {
        PeriodMonitorResult { reports: std::mem::take(&mut self.reports) }
    }

    /// Steps up to `utc`, closing and entering periods on the way.
    ///
    /// If `utc` lies in a later period than the last step, the monitor also steps at `utc` itself,
    /// so the period is entered before anything happening at that instant.
    pub fn update<C, H>(
        &mut self,
        contracts: &C,
        handler: &H,
        utc: DateTime<Utc>,
        requests: &[ChainStateRequest],
    ) where
        C: MarketplaceContracts,
        H: ChainStateChangeHandler,
    {
        let mut next = self.last_step_utc.map_or(utc, |last| last + self.step);
        while next <= utc {
            self.step_at(contracts, handler, next, requests);
            self.last_step_utc = Some(next);
            next += self.step;
        }

        let period = contracts.period_number(utc);
        if self.current.as_ref().is_some_and(|current| current.period_number != period) {
            self.step_at(contracts, handler, utc, requests);
            self.last_step_utc = Some(utc);
        }
    }

    /// Attributes the transactions of a block to the current period.
    pub fn record_calls(
        &mut self,
        marketplace: Address,
        calls: &[ContractCall],
    ) -> Result<(), PeriodError> {
        let reports = classify_calls(&self.functions, marketplace, calls)?;
        if let Some(current) = &mut self.current {
            current.function_calls.extend(reports);
        }
        Ok(())
    }

    fn step_at<C, H>(
        &mut self,
        contracts: &C,
        handler: &H,
        utc: DateTime<Utc>,
        requests: &[ChainStateRequest],
    ) where
        C: MarketplaceContracts,
        H: ChainStateChangeHandler,
    {
        let period = contracts.period_number(utc);
        if self.current.as_ref().is_some_and(|current| current.period_number == period) {
            return
        }

        if let Some(closing) = self.current.take() {
            let report = self.close(contracts, handler, closing, requests);
            info!(
                target: "chain_state::period",
                period = report.period_number,
                requests = report.requests.len(),
                required = report.number_of_proofs_required(),
                missed = report.number_of_proofs_missed(),
                calls = report.function_calls.len(),
                "Period closed"
            );
            handler.on_period_report(&report);
            self.reports.push(report);
        }

        let current = self.capture(contracts, handler, period, requests);
        debug!(
            target: "chain_state::period",
            period,
            requests = current.requests.len(),
            "Entered period"
        );
        self.current = Some(current);
    }

    fn capture<C, H>(
        &self,
        contracts: &C,
        handler: &H,
        period: PeriodNumber,
        requests: &[ChainStateRequest],
    ) -> CurrentPeriod
    where
        C: MarketplaceContracts,
        H: ChainStateChangeHandler,
    {
        let requests = requests
            .iter()
            .filter(|request| request.is_live())
            .map(|request| {
                let id = request.id();
                let slots = (0..request.slots())
                    .map(|slot_index| SlotSnapshot {
                        slot_index,
                        slot_id: contracts.slot_id(id, slot_index),
                        host: request.hosts().host(slot_index),
                        is_proof_required: self.query(handler, "is_proof_required", || {
                            contracts.is_proof_required(id, slot_index)
                        }),
                        will_proof_be_required: self.query(handler, "will_proof_be_required", || {
                            contracts.will_proof_be_required(id, slot_index)
                        }),
                    })
                    .collect();
                RequestSnapshot { request_id: *id, slots }
            })
            .collect();

        CurrentPeriod {
            period_number: period,
            time_range: contracts.period_time_range(period),
            requests,
            function_calls: Vec::new(),
        }
    }

    fn close<C, H>(
        &self,
        contracts: &C,
        handler: &H,
        closing: CurrentPeriod,
        requests: &[ChainStateRequest],
    ) -> PeriodReport
    where
        C: MarketplaceContracts,
        H: ChainStateChangeHandler,
    {
        let period = closing.period_number;
        let mut reports = Vec::with_capacity(closing.requests.len());

        for snapshot in &closing.requests {
            let ended = !requests.iter().any(|r| r.id() == &snapshot.request_id && r.is_live());
            if ended {
                warn!(
                    target: "chain_state::period",
                    request = %snapshot.request_id,
                    period,
                    "Request ended during period"
                );
            }

            let slots = snapshot
                .slots
                .iter()
                .cloned()
                .map(|slot| {
                    let slot_id = slot.slot_id;
                    let can_mark = self.query(handler, "can_mark_proof_as_missing", || {
                        contracts.can_mark_proof_as_missing(&slot_id, period)
                    });
                    let marked = self.query(handler, "is_proof_marked_as_missing", || {
                        contracts.is_proof_marked_as_missing(&slot_id, period)
                    });
                    slot.into_report(can_mark, marked)
                })
                .collect();
            reports.push(RequestReport {
                request_id: snapshot.request_id,
                slots,
                created_in_period: false,
                ended,
            });
        }

        for request in requests.iter().filter(|r| r.is_live()) {
            if closing.requests.iter().any(|s| &s.request_id == request.id()) {
                continue
            }
            let slots = (0..request.slots())
                .map(|slot_index| SlotReport {
                    slot_index,
                    slot_id: contracts.slot_id(request.id(), slot_index),
                    host: request.hosts().host(slot_index),
                    is_proof_required: false,
                    will_proof_be_required: false,
                    can_mark_as_missing: false,
                    marked_as_missing: false,
                })
                .collect();
            reports.push(RequestReport {
                request_id: *request.id(),
                slots,
                created_in_period: true,
                ended: false,
            });
        }

        PeriodReport {
            period_number: period,
            time_range: closing.time_range,
            requests: reports,
            function_calls: closing.function_calls,
        }
    }

    fn query<H: ChainStateChangeHandler>(
        &self,
        handler: &H,
        operation: &str,
        call: impl FnMut() -> RpcResult<bool>,
    ) -> bool {
        match self.retry.retry(operation, call) {
            Ok(value) => value,
            Err(err) => {
                warn!(target: "chain_state::period", %err, operation, "Period query failed");
                handler.on_error(&format!("{operation} failed: {err}"));
                false
            }
        }
    }
}
