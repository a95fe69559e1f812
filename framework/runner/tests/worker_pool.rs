mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chain_tunnel_runner::prelude::{
    DispatchPacer, MetricCollector, Observation, PatternAnalyzer, RequestCatalog, RequestDescriptor,
    RequestFailure, RequestTarget, Response, Scenario, ScenarioGenerator, ScenarioQueue,
    ShutdownHandle, Transport, WorkerPool,
};
use common::{descriptors, MockRequester, TestState};
use rand::RngCore;
use tokio::time::Instant;

fn pool(requester: Arc<MockRequester>) -> WorkerPool {
    WorkerPool::new(
        requester,
        Arc::new(MetricCollector::new()),
        Arc::new(PatternAnalyzer::new()),
    )
}

#[tokio::test]
async fn four_requests_at_concurrency_two_run_as_two_batches() {
    let requester = MockRequester::new();
    let pool = pool(requester.clone());

    let scenario = Scenario::new("blocks", 1.0, descriptors("/blocks/1", 4));
    let outcome = pool.execute_scenario(&scenario, 2).await;

    assert_eq!(2, outcome.effective_concurrency);
    assert_eq!(vec![2, 2], outcome.batch_sizes);
    assert_eq!(4, outcome.summary.dispatched);
    assert_eq!(4, pool.collector().count("block"));
    assert_eq!(4, pool.collector().total_requests());
    assert!(requester.max_in_flight() <= 2);
}

#[tokio::test]
async fn scenarios_run_in_order_with_weighted_concurrency() {
    let requester = MockRequester::new();
    let pool = pool(requester.clone());

    let scenarios = vec![
        Scenario::new("basic", 1.0, descriptors("/latest", 3)),
        Scenario::new("empty", 1.25, Vec::new()),
        Scenario::new("accounts", 1.5, descriptors("/balances", 5)),
    ];
    let outcomes = pool.execute_scenarios(&scenarios, 2).await;

    assert_eq!(
        vec!["basic", "accounts"],
        outcomes.iter().map(|o| o.name.as_str()).collect::<Vec<_>>()
    );
    assert_eq!(vec![2, 1], outcomes[0].batch_sizes);
    assert_eq!(3, outcomes[1].effective_concurrency);
    assert_eq!(vec![3, 2], outcomes[1].batch_sizes);
    assert_eq!(8, requester.sent());
}

#[tokio::test]
async fn each_descriptor_is_sent_once() {
    let requester = MockRequester::new();
    let pool = pool(requester.clone());

    let queue = Arc::new(ScenarioQueue::from_descriptors(descriptors("/blocks/1", 50)));
    let summary = pool.run(queue, 8).await;

    assert_eq!(50, summary.dispatched);
    assert_eq!(50, requester.sent());
    assert_eq!(50, pool.collector().count("block"));
    assert!(pool.live_workers().is_empty());
}

#[tokio::test]
async fn failures_do_not_stop_other_requests() {
    let requester = MockRequester::new();
    let pool = pool(requester.clone());

    let mut requests = descriptors("/fail", 3);
    requests.extend(descriptors("/ok", 5));
    requests.extend(descriptors("/rate-limited", 2));

    let summary = pool
        .run(Arc::new(ScenarioQueue::from_descriptors(requests)), 3)
        .await;

    assert_eq!(10, summary.dispatched);
    assert_eq!(5, summary.succeeded);
    assert_eq!(5, summary.failed);
    assert_eq!(2, summary.rate_limited);
    assert_eq!(5, pool.collector().errors("block"));
    assert_eq!(50.0, pool.collector().error_rate("block"));
    assert_eq!(2, pool.collector().total_rate_limit_hits());
}

#[tokio::test(start_paused = true)]
async fn backpressure_delays_the_next_pull() {
    let requester = MockRequester::new();
    let pool = pool(requester.clone());
    for _ in 0..11 {
        pool.collector()
            .record("eth_call", Observation::rate_limited(Duration::from_millis(3)));
    }

    let start = Instant::now();
    let summary = pool
        .run(
            Arc::new(ScenarioQueue::from_descriptors(descriptors("/ok", 1))),
            1,
        )
        .await;

    assert!(summary.cooldowns >= 1);
    assert!(start.elapsed() >= Duration::from_secs(1));
    assert_eq!(1, requester.sent());
}

#[tokio::test(start_paused = true)]
async fn no_backpressure_at_the_threshold() {
    let requester = MockRequester::new();
    let pool = pool(requester.clone());
    for _ in 0..10 {
        pool.collector()
            .record("eth_call", Observation::rate_limited(Duration::from_millis(3)));
    }

    let start = Instant::now();
    let summary = pool
        .run(
            Arc::new(ScenarioQueue::from_descriptors(descriptors("/ok", 1))),
            1,
        )
        .await;

    assert_eq!(0, summary.cooldowns);
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn cancelled_workers_finish_their_request_and_stop() {
    let requester = MockRequester::new();
    let pool = pool(requester.clone());

    let queue = Arc::new(ScenarioQueue::from_descriptors(descriptors("/slow", 100)));
    let run = tokio::spawn({
        let pool = pool.clone();
        async move { pool.run(queue, 2).await }
    });

    tokio::time::sleep(Duration::from_millis(250)).await;
    pool.live_workers().cancel_all();

    let summary = run.await.unwrap();
    assert!(summary.dispatched < 100);
    assert!(summary.dispatched > 0);
    // Nothing in flight was abandoned
    assert_eq!(summary.dispatched, pool.collector().total_requests());
    assert_eq!(summary.dispatched as usize, requester.sent());
}

#[tokio::test(start_paused = true)]
async fn cancelling_one_worker_leaves_the_rest_running() {
    let requester = MockRequester::new();
    let pool = pool(requester.clone());

    let queue = Arc::new(ScenarioQueue::from_descriptors(descriptors("/slow", 20)));
    let run = tokio::spawn({
        let pool = pool.clone();
        async move { pool.run(queue, 2).await }
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    let ids = pool.live_workers().ids();
    assert_eq!(2, ids.len());
    assert!(pool.live_workers().cancel(ids[0]));

    let summary = run.await.unwrap();
    assert_eq!(20, summary.dispatched);
}

async fn drain(queue: &ScenarioQueue) -> usize {
    let mut left = 0;
    while queue.next().await.is_some() {
        left += 1;
    }
    left
}

#[tokio::test(start_paused = true)]
async fn cancelled_during_cooldown_sends_nothing_more() {
    let requester = MockRequester::new();
    let pool = pool(requester.clone());
    for _ in 0..11 {
        pool.collector()
            .record("eth_call", Observation::rate_limited(Duration::from_millis(3)));
    }

    let queue = Arc::new(ScenarioQueue::from_descriptors(descriptors("/ok", 5)));
    let run = tokio::spawn({
        let pool = pool.clone();
        let queue = queue.clone();
        async move { pool.run(queue, 1).await }
    });

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(0, requester.sent());
    pool.live_workers().cancel_all();

    let start = Instant::now();
    let summary = run.await.unwrap();
    assert_eq!(0, summary.dispatched);
    assert_eq!(0, requester.sent());
    // Stopped without sitting out the rest of the cooldown
    assert!(start.elapsed() < Duration::from_millis(500));
    assert_eq!(5, drain(&queue).await);
}

#[tokio::test(start_paused = true)]
async fn cancelled_while_waiting_for_the_next_batch() {
    let requester = MockRequester::new();
    let pool = pool(requester.clone());

    let catalog = Arc::new(RequestCatalog::new().register("latest", Transport::RestGet, 1.0, latest));
    let generator = ScenarioGenerator::new(catalog.clone(), catalog.weights(), Some(5));
    let queue = Arc::new(ScenarioQueue::from_stream(generator.into_stream(
        Arc::new(TestState::default()),
        4,
        Duration::from_secs(1),
    )));

    let run = tokio::spawn({
        let pool = pool.clone();
        async move { pool.run(queue, 1).await }
    });

    // Two batches are out, the third is a second away
    tokio::time::sleep(Duration::from_millis(1500)).await;
    pool.live_workers().cancel_all();

    let summary = run.await.unwrap();
    assert_eq!(8, summary.dispatched);
    assert_eq!(8, requester.sent());
}

#[tokio::test(start_paused = true)]
async fn cancelled_while_paced_puts_the_request_back() {
    let requester = MockRequester::new();
    let pool = pool(requester.clone()).with_pacer(Arc::new(DispatchPacer::per_second(1)));

    let queue = Arc::new(ScenarioQueue::from_descriptors(descriptors("/ok", 5)));
    let run = tokio::spawn({
        let pool = pool.clone();
        let queue = queue.clone();
        async move { pool.run(queue, 1).await }
    });

    // Slots at 0s and 1s have been used, the worker holds a request for the 2s slot
    tokio::time::sleep(Duration::from_millis(1500)).await;
    pool.live_workers().cancel_all();

    let summary = run.await.unwrap();
    assert_eq!(2, summary.dispatched);
    assert_eq!(2, requester.sent());
    assert_eq!(3, drain(&queue).await);
}

fn latest(_: &TestState, _: &mut dyn RngCore) -> Option<RequestTarget> {
    Some(RequestTarget::path("/latest"))
}

#[tokio::test(start_paused = true)]
async fn streaming_stops_on_shutdown() {
    let requester = MockRequester::new();
    let shutdown = ShutdownHandle::new();
    let pool = pool(requester.clone()).with_shutdown(shutdown.clone());

    let catalog = Arc::new(RequestCatalog::new().register("latest", Transport::RestGet, 1.0, latest));
    let generator = ScenarioGenerator::new(catalog.clone(), catalog.weights(), Some(5));
    let queue = Arc::new(ScenarioQueue::from_stream(generator.into_stream(
        Arc::new(TestState::default()),
        4,
        Duration::from_secs(1),
    )));

    let run = tokio::spawn({
        let pool = pool.clone();
        async move { pool.run(queue, 2).await }
    });

    tokio::time::sleep(Duration::from_millis(2500)).await;
    shutdown.shutdown();

    let summary = run.await.unwrap();
    // Three batches were released before the shutdown
    assert_eq!(12, summary.dispatched);
    assert_eq!(12, pool.collector().count("latest"));
}

#[tokio::test(start_paused = true)]
async fn pacer_caps_dispatch_rate() {
    let requester = MockRequester::new();
    let pool = pool(requester.clone()).with_pacer(Arc::new(DispatchPacer::per_second(5)));

    let start = Instant::now();
    pool.run(
        Arc::new(ScenarioQueue::from_descriptors(descriptors("/ok", 10))),
        4,
    )
    .await;

    assert!(start.elapsed() >= Duration::from_millis(1800));
    assert_eq!(10, requester.sent());
}

#[tokio::test]
async fn new_response_shape_is_flagged() {
    let requester = MockRequester::new();
    let pool = pool(requester.clone());

    let mut requests = descriptors("/ok", 20);
    requests.push(RequestDescriptor::rest_get("block", "/odd"));
    pool.run(Arc::new(ScenarioQueue::from_descriptors(requests)), 1)
        .await;

    let report = pool.analyzer().report();
    assert_eq!(2, report.patterns_by_endpoint["block"].len());
    assert_eq!(1, report.anomalies.len());
    assert_eq!("block", report.anomalies[0].endpoint);
}

#[tokio::test]
async fn result_hook_sees_every_request() {
    let requester = MockRequester::new();
    let seen = Arc::new(AtomicUsize::new(0));
    let pool = pool(requester.clone()).with_on_result(Arc::new({
        let seen = seen.clone();
        move |_: &RequestDescriptor, _: &Result<Response, RequestFailure>| {
            seen.fetch_add(1, Ordering::SeqCst);
        }
    }));

    let mut requests = descriptors("/ok", 3);
    requests.extend(descriptors("/fail", 2));
    pool.run(Arc::new(ScenarioQueue::from_descriptors(requests)), 2)
        .await;

    assert_eq!(5, seen.load(Ordering::SeqCst));
}
