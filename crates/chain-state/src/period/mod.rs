//! Per proving period observation of the marketplace.

mod calls;
mod monitor;
mod report;

pub use monitor::{CurrentPeriod, PeriodMonitor, DEFAULT_PERIOD_STEP};
pub use report::{
    FunctionCallReport, PeriodMonitorResult, PeriodReport, RequestReport, SlotReport,
};
