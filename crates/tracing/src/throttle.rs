//! Rate limiting of repeated log messages.

use std::time::{Duration, Instant};

/// Lets a recurring message through at most once per interval and counts the ones held back.
///
/// ```
/// use marketwatch_tracing::LogThrottle;
/// use std::time::Duration;
///
/// let mut throttle = LogThrottle::new(Duration::from_secs(60));
/// for attempt in 0..3 {
///     if let Some(suppressed) = throttle.permit() {
///         tracing::warn!(attempt, suppressed, "Update failed");
///     }
/// }
/// ```
#[derive(Debug, Clone)]
pub struct LogThrottle {
    interval: Duration,
    last: Option<Instant>,
    suppressed: u64,
}

impl LogThrottle {
    /// Creates a throttle letting the first message through.
    pub const fn new(interval: Duration) -> Self {
        Self { interval, last: None, suppressed: 0 }
    }

    /// Returns the number of messages held back since the last permitted one, or `None` if this
    /// one should be held back too.
    pub fn permit(&mut self) -> Option<u64> {
        self.permit_at(Instant::now())
    }

    /// Forgets the last permitted message, so the next one goes through.
    ///
    /// Call it once the condition behind the messages is gone.
    pub fn reset(&mut self) {
        self.last = None;
        self.suppressed = 0;
    }

    fn permit_at(&mut self, now: Instant) -> Option<u64> {
        match self.last {
            Some(last) if now.saturating_duration_since(last) < self.interval => {
                self.suppressed += 1;
                None
            }
            _ => {
                self.last = Some(now);
                Some(std::mem::take(&mut self.suppressed))
            }
        }
    }
}
