use crate::{
    shutdown::{stop_channel, StopHandle, StopRequested},
    MonitorError,
};
use marketwatch_blocktime::{BlockFetcher, BlockTimeFinder};
use marketwatch_chain_state::{ChainState, ChainStateChangeHandler, ChainStateRequest};
use marketwatch_config::{Config, MonitorConfig};
use marketwatch_interfaces::{LedgerRpc, MarketplaceContracts};
use marketwatch_primitives::{chrono::TimeDelta, Utc};
use marketwatch_tracing::LogThrottle;
use std::{sync::Arc, time::Duration};
use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, error, info, warn};

/// Snapshot of all requests, published after every successful update.
pub type RequestsSnapshot = Arc<[ChainStateRequest]>;

/// Keeps a [`ChainState`] up to date in the background.
///
/// The worker updates the projection to the current time, publishes a [`RequestsSnapshot`] and
/// sleeps for the poll interval. Recoverable errors are reported to the change handler and the
/// next update tries again. A fatal error ends the worker and is passed to the failure callback.
#[derive(Debug)]
pub struct ChainMonitor {
    stop: Option<StopHandle>,
    handle: Option<JoinHandle<Result<(), MonitorError>>>,
    requests: watch::Receiver<RequestsSnapshot>,
}

impl ChainMonitor {
    /// Opens the block cache, initializes the projection at `now - start_offset` and starts
    /// monitoring it.
    pub async fn launch<R, C, H, F>(
        rpc: R,
        contracts: C,
        handler: H,
        config: &Config,
        on_failure: F,
    ) -> Result<Self, MonitorError>
    where
        R: LedgerRpc + 'static,
        C: MarketplaceContracts + 'static,
        H: ChainStateChangeHandler + 'static,
        F: FnOnce(&MonitorError) + Send + 'static,
    {
        let cache = Arc::new(config.cache.open()?);
        let finder = BlockTimeFinder::new(BlockFetcher::new(rpc, cache, config.rpc.into()));
        let offset = TimeDelta::from_std(config.monitor.start_offset).unwrap_or(TimeDelta::zero());
        let start_utc = Utc::now() - offset;
        let chain_state = config.chain_state();

        let state = tokio::task::spawn_blocking(move || {
            ChainState::initialize(finder, contracts, handler, start_utc, chain_state)
        })
        .await
        .map_err(|err| MonitorError::WorkerPanicked(err.to_string()))??;

        Ok(Self::start(state, config.monitor, on_failure))
    }

    /// Spawns the worker on the current runtime.
    pub fn start<R, C, H, F>(
        state: ChainState<R, C, H>,
        config: MonitorConfig,
        on_failure: F,
    ) -> Self
    where
        R: LedgerRpc + 'static,
        C: MarketplaceContracts + 'static,
        H: ChainStateChangeHandler + 'static,
        F: FnOnce(&MonitorError) + Send + 'static,
    {
        let (stop, stop_requested) = stop_channel();
        let (sender, requests) = watch::channel(RequestsSnapshot::from(state.requests()));
        let poll_interval = config.poll_interval.max(Duration::from_millis(1));

        info!(
            target: "monitor",
            current = %state.current_block(),
            ?poll_interval,
            "Starting chain monitor"
        );
        let handle = tokio::spawn(async move {
            let result = run(state, poll_interval, sender, stop_requested).await;
            if let Err(err) = &result {
                error!(target: "monitor", %err, "Chain monitor stopped");
                on_failure(err);
            }
            result
        });

        Self { stop: Some(stop), handle: Some(handle), requests }
    }

    /// The latest published snapshot.
    pub fn requests(&self) -> RequestsSnapshot {
        self.requests.borrow().clone()
    }

    /// Returns a receiver notified on every new snapshot.
    pub fn subscribe(&self) -> watch::Receiver<RequestsSnapshot> {
        self.requests.clone()
    }

    /// Whether the worker is still running.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Stops the worker and waits for it to finish.
    ///
    /// Returns the error that ended the worker, if it failed before.
    pub async fn stop(&mut self) -> Result<(), MonitorError> {
        let Some(handle) = self.handle.take() else { return Err(MonitorError::AlreadyStopped) };
        if let Some(stop) = self.stop.take() {
            stop.stop();
        }
        let result = handle.await.map_err(|err| MonitorError::WorkerPanicked(err.to_string()))?;
        info!(target: "monitor", "Chain monitor stopped");
        result
    }
}

async fn run<R, C, H>(
    mut state: ChainState<R, C, H>,
    poll_interval: Duration,
    requests: watch::Sender<RequestsSnapshot>,
    mut stop_requested: StopRequested,
) -> Result<(), MonitorError>
where
    R: LedgerRpc + 'static,
    C: MarketplaceContracts + 'static,
    H: ChainStateChangeHandler + 'static,
{
    let mut failures = LogThrottle::new(Duration::from_secs(60));
    while !stop_requested.is_requested() {
        // updates block on the ledger
        let (returned, result) = tokio::task::spawn_blocking(move || {
            let result = state.update_to_now();
            (state, result)
        })
        .await
        .map_err(|err| MonitorError::WorkerPanicked(err.to_string()))?;
        state = returned;

        match result {
            Ok(()) => {
                debug!(
                    target: "monitor",
                    current = %state.current_block(),
                    requests = state.requests().len(),
                    "Updated chain state"
                );
                requests.send_replace(RequestsSnapshot::from(state.requests()));
                failures.reset();
            }
            Err(err) if err.is_fatal() => return Err(err.into()),
            Err(err) => {
                if let Some(suppressed) = failures.permit() {
                    warn!(
                        target: "monitor",
                        %err,
                        suppressed,
                        "Failed to update chain state, retrying"
                    );
                }
                state.handler().on_error(&err.to_string());
            }
        }

        tokio::select! {
            _ = &mut stop_requested => break,
            _ = tokio::time::sleep(poll_interval) => {}
        }
    }

    debug!(target: "monitor", "Stop requested");
    Ok(())
}
