use crate::TimeRange;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// Number of a proving period, counted from the unix epoch.
pub type PeriodNumber = u64;

/// Proving period arithmetic of the marketplace.
///
/// The marketplace divides time into fixed windows of `period_seconds`, starting at the unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofPeriods {
    /// Length of one proving period in seconds.
    pub period_seconds: u64,
}

impl ProofPeriods {
    /// Creates the period arithmetic for the given period length.
    pub const fn new(period_seconds: u64) -> Self {
        Self { period_seconds }
    }

    /// Returns the period containing the instant.
    pub fn period_number(&self, utc: DateTime<Utc>) -> PeriodNumber {
        let seconds = utc.timestamp().max(0) as u64;
        seconds / self.period_seconds.max(1)
    }

    /// Returns the instants covered by the period, both ends included.
    pub fn period_time_range(&self, period: PeriodNumber) -> TimeRange {
        let length = self.period_seconds.max(1);
        let start = DateTime::<Utc>::UNIX_EPOCH + TimeDelta::seconds((period * length) as i64);
        let end = start + TimeDelta::seconds(length as i64) - TimeDelta::seconds(1);
        TimeRange::new(start, end)
    }

    /// Length of one period.
    pub fn period_duration(&self) -> TimeDelta {
        TimeDelta::seconds(self.period_seconds as i64)
    }
}
