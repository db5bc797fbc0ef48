use assert_matches::assert_matches;
use marketwatch_blocktime::{BlockCache, BlockFetcher, BlockTimeFinder};
use marketwatch_chain_state::{
    test_utils::{Notification, RecordingHandler},
    ChainState, ChainStateConfig, ChainStateError,
};
use marketwatch_config::{Config, MonitorConfig, PeriodMonitorConfig, RetryConfig};
use marketwatch_interfaces::{test_utils::MockChain, RetryPolicy};
use marketwatch_monitor::{ChainMonitor, MonitorError, RequestsSnapshot};
use marketwatch_primitives::{
    chrono::{TimeDelta, TimeZone},
    Address, Ask, Content, DateTime, MarketplaceEvent, Request, RequestState, Utc, B256,
};
use std::{sync::Arc, time::Duration};
use tokio::sync::{oneshot, watch};

const TIMEOUT: Duration = Duration::from_secs(10);

/// A chain of 100 blocks, one per second, the last one a second ago.
fn chain() -> Arc<MockChain> {
    let now = Utc.timestamp_opt(Utc::now().timestamp(), 0).unwrap();
    Arc::new(MockChain::new(now - TimeDelta::seconds(100), TimeDelta::seconds(1), 100))
}

fn request(byte: u8) -> Request {
    Request {
        id: B256::repeat_byte(byte),
        client: Address::repeat_byte(0xc1),
        ask: Ask { slots: 2, duration: 3_600, ..Default::default() },
        content: Content::default(),
        expiry: 600,
        nonce: B256::ZERO,
    }
}

fn config() -> Config {
    Config {
        rpc: RetryConfig { max_attempts: 1, ..Default::default() },
        monitor: MonitorConfig {
            poll_interval: Duration::from_millis(50),
            start_offset: Duration::from_secs(30),
        },
        period: PeriodMonitorConfig { enabled: false, ..Default::default() },
        ..Default::default()
    }
}

async fn next_non_empty(receiver: &mut watch::Receiver<RequestsSnapshot>) -> RequestsSnapshot {
    tokio::time::timeout(TIMEOUT, receiver.wait_for(|requests| !requests.is_empty()))
        .await
        .expect("no snapshot published")
        .expect("monitor dropped the snapshot")
        .clone()
}

#[tokio::test(flavor = "multi_thread")]
async fn publishes_snapshots() {
    marketwatch_tracing::init_test_tracing();
    let chain = chain();
    let request = request(1);
    chain.add_request(request.clone(), RequestState::New);
    chain.add_event(95, MarketplaceEvent::StorageRequested { request_id: request.id });
    let handler = Arc::new(RecordingHandler::default());

    let mut monitor =
        ChainMonitor::launch(chain.clone(), chain.clone(), handler.clone(), &config(), |_| {})
            .await
            .unwrap();
    assert!(monitor.is_running());

    let snapshot = next_non_empty(&mut monitor.subscribe()).await;
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].id(), &request.id);
    assert_eq!(snapshot[0].state(), RequestState::New);
    assert_eq!(snapshot[0].first_seen().utc, chain.time_of(95));
    assert_eq!(monitor.requests().len(), 1);
    assert_eq!(handler.request_callbacks(&request.id), vec!["new"]);

    monitor.stop().await.unwrap();
    assert!(!monitor.is_running());
    assert_matches!(monitor.stop().await, Err(MonitorError::AlreadyStopped));
}

#[tokio::test(flavor = "multi_thread")]
async fn stops_on_fatal_error() {
    let chain = chain();
    let unknown = B256::repeat_byte(9);
    chain.add_event(95, MarketplaceEvent::StorageRequested { request_id: unknown });

    let (failed, on_failure) = oneshot::channel();
    let mut monitor = ChainMonitor::launch(
        chain.clone(),
        chain.clone(),
        Arc::new(RecordingHandler::default()),
        &config(),
        move |err: &MonitorError| {
            let _ = failed.send(err.to_string());
        },
    )
    .await
    .unwrap();

    let message = tokio::time::timeout(TIMEOUT, on_failure).await.unwrap().unwrap();
    assert!(message.contains(&unknown.to_string()), "{message}");
    assert!(monitor.requests().is_empty());

    assert_matches!(
        monitor.stop().await,
        Err(MonitorError::ChainState(ChainStateError::UnknownRequest { block_number: 95, .. }))
    );
    assert_matches!(monitor.stop().await, Err(MonitorError::AlreadyStopped));
}

#[tokio::test(flavor = "multi_thread")]
async fn recovers_from_ledger_failures() {
    let chain = chain();
    let handler = Arc::new(RecordingHandler::default());
    let finder = BlockTimeFinder::new(BlockFetcher::new(
        chain.clone(),
        Arc::new(BlockCache::in_memory()),
        RetryPolicy::none(),
    ));
    let start: DateTime<Utc> = Utc::now() - TimeDelta::seconds(30);
    let config = ChainStateConfig {
        retry: RetryPolicy::none(),
        period_monitoring: false,
        ..Default::default()
    };
    let state = tokio::task::spawn_blocking({
        let chain = chain.clone();
        let handler = handler.clone();
        move || ChainState::initialize(finder, chain, handler, start, config)
    })
    .await
    .unwrap()
    .unwrap();

    // the new head cannot be read on the first update
    let request = request(2);
    chain.add_request(request.clone(), RequestState::New);
    chain.mine(2);
    chain.add_event(100, MarketplaceEvent::StorageRequested { request_id: request.id });
    chain.fail_timestamps(1);

    let mut monitor = ChainMonitor::start(
        state,
        MonitorConfig { poll_interval: Duration::from_millis(50), ..Default::default() },
        |err| panic!("unexpected failure: {err}"),
    );

    let snapshot = next_non_empty(&mut monitor.subscribe()).await;
    assert_eq!(snapshot[0].id(), &request.id);
    assert!(handler.notifications().iter().any(|n| matches!(n, Notification::Error(_))));

    monitor.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn stop_interrupts_the_pause() {
    let chain = chain();
    let config = Config {
        monitor: MonitorConfig {
            poll_interval: Duration::from_secs(3_600),
            start_offset: Duration::from_secs(10),
        },
        ..config()
    };
    let mut monitor = ChainMonitor::launch(
        chain.clone(),
        chain,
        Arc::new(RecordingHandler::default()),
        &config,
        |_| {},
    )
    .await
    .unwrap();

    tokio::time::timeout(TIMEOUT, monitor.stop()).await.unwrap().unwrap();
}
