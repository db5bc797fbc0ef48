//! Bounded retries for calls against the ledger.

use crate::{RpcError, RpcResult};
use backon::{BlockingRetryable, ConstantBuilder, ExponentialBuilder};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, warn};

/// Describes how the delay between two attempts evolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackoffKind {
    /// Sleep the same delay after every failure.
    Fixed,
    /// Double the delay after every failure, capped at the max delay.
    Exponential,
}

/// Bounded retry of a blocking call.
///
/// Only [retryable](RpcError::is_retryable) errors are retried. Once the attempts are exhausted the
/// last error is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, the first one included.
    pub max_attempts: usize,
    /// Delay after the first failure.
    pub delay: Duration,
    /// Upper bound of the delay for [`BackoffKind::Exponential`].
    pub max_delay: Duration,
    /// How the delay evolves.
    pub backoff: BackoffKind,
}

impl RetryPolicy {
    /// Policy for liveness checks: one retry after a short pause.
    pub const fn fail_fast() -> Self {
        Self {
            max_attempts: 2,
            delay: Duration::from_millis(500),
            max_delay: Duration::from_millis(500),
            backoff: BackoffKind::Fixed,
        }
    }

    /// Policy that never retries.
    pub const fn none() -> Self {
        Self {
            max_attempts: 1,
            delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff: BackoffKind::Fixed,
        }
    }

    /// Runs the call until it succeeds, fails with a non retryable error or runs out of attempts.
    pub fn retry<T>(
        &self,
        operation: &str,
        mut call: impl FnMut() -> RpcResult<T>,
    ) -> RpcResult<T> {
        let retries = self.max_attempts.saturating_sub(1);
        let notify = |err: &RpcError, delay: Duration| {
            warn!(target: "interfaces::retry", %err, ?delay, operation, "Call failed, retrying");
        };

        let result = match self.backoff {
            BackoffKind::Fixed => (|| call())
                .retry(ConstantBuilder::default().with_delay(self.delay).with_max_times(retries))
                .when(RpcError::is_retryable)
                .notify(notify)
                .call(),
            BackoffKind::Exponential => (|| call())
                .retry(
                    ExponentialBuilder::default()
                        .with_min_delay(self.delay)
                        .with_max_delay(self.max_delay)
                        .with_max_times(retries),
                )
                .when(RpcError::is_retryable)
                .notify(notify)
                .call(),
        };

        result.inspect_err(|err| {
            error!(
                target: "interfaces::retry",
                %err,
                operation,
                attempts = self.max_attempts,
                "Call failed"
            )
        })
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            backoff: BackoffKind::Fixed,
        }
    }
}
