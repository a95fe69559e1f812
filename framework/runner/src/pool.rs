use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chain_tunnel_core::prelude::{
    RequestDescriptor, RequestFailure, Requester, Response, ShutdownHandle,
};
use chain_tunnel_instruments::{MetricCollector, OperationRecord, PatternAnalyzer};
use futures::stream::{self, BoxStream, Stream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::pacer::DispatchPacer;
use crate::scenario::Scenario;

/// Called once per request, after its metrics have been recorded.
pub type ResultHook =
    Arc<dyn Fn(&RequestDescriptor, &Result<Response, RequestFailure>) + Send + Sync>;

/// Pool wide throttle driven by rate limit responses.
///
/// When more than `threshold` rate limit hits have been recorded inside `window`, every worker
/// sleeps for `cooldown` before its next pull.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backpressure {
    pub threshold: usize,
    pub window: Duration,
    pub cooldown: Duration,
}

impl Default for Backpressure {
    fn default() -> Self {
        Self {
            threshold: 10,
            window: Duration::from_secs(60),
            cooldown: Duration::from_secs(1),
        }
    }
}

impl Backpressure {
    pub fn is_active(&self, collector: &MetricCollector) -> bool {
        collector.recent_rate_limit_hits(self.window) > self.threshold
    }
}

/// The shared source of work. Every descriptor is handed to exactly one worker.
pub struct ScenarioQueue {
    inner: tokio::sync::Mutex<BoxStream<'static, RequestDescriptor>>,
    returned: Mutex<Vec<RequestDescriptor>>,
}

impl ScenarioQueue {
    pub fn from_descriptors(descriptors: Vec<RequestDescriptor>) -> Self {
        Self::from_stream(stream::iter(descriptors))
    }

    /// Fused, so that workers arriving after the end all see `None`.
    pub fn from_stream(stream: impl Stream<Item = RequestDescriptor> + Send + 'static) -> Self {
        Self {
            inner: tokio::sync::Mutex::new(stream.fuse().boxed()),
            returned: Mutex::new(Vec::new()),
        }
    }

    /// Descriptors put back with [ScenarioQueue::put_back] are handed out first.
    pub async fn next(&self) -> Option<RequestDescriptor> {
        let returned = self.returned.lock().pop();
        if returned.is_some() {
            return returned;
        }
        self.inner.lock().await.next().await
    }

    /// Return a descriptor that was pulled but never dispatched.
    pub fn put_back(&self, descriptor: RequestDescriptor) {
        self.returned.lock().push(descriptor);
    }
}

impl std::fmt::Debug for ScenarioQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScenarioQueue").finish_non_exhaustive()
    }
}

/// Ids of the workers that are allowed to keep pulling work.
///
/// Removing an id stops that worker once its in-flight request completes. A worker that is
/// cooling down or waiting for work stops right away.
#[derive(Debug, Clone, Default)]
pub struct LiveWorkers {
    inner: Arc<Mutex<HashSet<usize>>>,
    changed: Arc<Notify>,
}

impl LiveWorkers {
    fn register(&self, id: usize) {
        self.inner.lock().insert(id);
    }

    pub fn cancel(&self, id: usize) -> bool {
        let removed = self.inner.lock().remove(&id);
        self.changed.notify_waiters();
        removed
    }

    pub fn cancel_all(&self) {
        self.inner.lock().clear();
        self.changed.notify_waiters();
    }

    /// Resolves once `id` is no longer live.
    async fn cancelled(&self, id: usize) {
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            // Registered before the check so a cancel in between is not missed
            notified.as_mut().enable();
            if !self.is_live(id) {
                return;
            }
            notified.await;
        }
    }

    pub fn is_live(&self, id: usize) -> bool {
        self.inner.lock().contains(&id)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn ids(&self) -> Vec<usize> {
        let mut ids = self.inner.lock().iter().copied().collect::<Vec<_>>();
        ids.sort_unstable();
        ids
    }
}

/// What a pool run did. Counters are summed over every worker.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PoolSummary {
    pub dispatched: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub rate_limited: u64,
    pub cooldowns: u64,
    pub elapsed: Duration,
}

impl PoolSummary {
    pub fn merge(&mut self, other: &PoolSummary) {
        self.dispatched += other.dispatched;
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.rate_limited += other.rate_limited;
        self.cooldowns += other.cooldowns;
        self.elapsed += other.elapsed;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioOutcome {
    pub name: String,
    pub effective_concurrency: usize,
    pub batch_sizes: Vec<usize>,
    pub summary: PoolSummary,
}

/// A fixed number of workers draining one shared queue through a [Requester].
///
/// Cheap to clone, clones share the same collector, analyzer and live worker set.
#[derive(Clone)]
pub struct WorkerPool {
    requester: Arc<dyn Requester>,
    collector: Arc<MetricCollector>,
    analyzer: Arc<PatternAnalyzer>,
    backpressure: Backpressure,
    pacer: Option<Arc<DispatchPacer>>,
    shutdown: Option<ShutdownHandle>,
    on_result: Option<ResultHook>,
    live: LiveWorkers,
    next_worker_id: Arc<AtomicUsize>,
    throttled: Arc<AtomicBool>,
}

impl WorkerPool {
    pub fn new(
        requester: Arc<dyn Requester>,
        collector: Arc<MetricCollector>,
        analyzer: Arc<PatternAnalyzer>,
    ) -> Self {
        Self {
            requester,
            collector,
            analyzer,
            backpressure: Backpressure::default(),
            pacer: None,
            shutdown: None,
            on_result: None,
            live: LiveWorkers::default(),
            next_worker_id: Arc::new(AtomicUsize::new(0)),
            throttled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_backpressure(mut self, backpressure: Backpressure) -> Self {
        self.backpressure = backpressure;
        self
    }

    pub fn with_pacer(mut self, pacer: Arc<DispatchPacer>) -> Self {
        self.pacer = Some(pacer);
        self
    }

    /// Stop pulling work once the handle is shut down. Waiting on the queue is interrupted too.
    pub fn with_shutdown(mut self, shutdown: ShutdownHandle) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn with_on_result(mut self, on_result: ResultHook) -> Self {
        self.on_result = Some(on_result);
        self
    }

    pub fn live_workers(&self) -> &LiveWorkers {
        &self.live
    }

    pub fn collector(&self) -> &Arc<MetricCollector> {
        &self.collector
    }

    pub fn analyzer(&self) -> &Arc<PatternAnalyzer> {
        &self.analyzer
    }

    /// Spawn `concurrency` workers and wait for all of them to finish.
    ///
    /// Workers stop when the queue is exhausted, when they are cancelled or when the pool's
    /// shutdown handle fires.
    pub async fn run(&self, queue: Arc<ScenarioQueue>, concurrency: usize) -> PoolSummary {
        let start = Instant::now();

        let mut workers = JoinSet::new();
        for _ in 0..concurrency.max(1) {
            let id = self.next_worker_id.fetch_add(1, Ordering::SeqCst);
            self.live.register(id);

            let pool = self.clone();
            let queue = queue.clone();
            workers.spawn(async move { pool.work(id, queue).await });
        }

        let mut summary = PoolSummary::default();
        while let Some(result) = workers.join_next().await {
            match result {
                Ok(worker_summary) => summary.merge(&worker_summary),
                Err(e) => log::error!("Worker task failed: {:?}", e),
            }
        }

        summary.elapsed = start.elapsed();
        summary
    }

    /// Run a scenario's requests in sequential batches at its effective concurrency.
    pub async fn execute_scenario(
        &self,
        scenario: &Scenario,
        base_concurrency: usize,
    ) -> ScenarioOutcome {
        let effective_concurrency = scenario.effective_concurrency(base_concurrency);
        log::info!(
            "Running scenario [{}] with {} requests at concurrency {}",
            scenario.name(),
            scenario.requests().len(),
            effective_concurrency
        );

        let mut batch_sizes = Vec::new();
        let mut summary = PoolSummary::default();
        for batch in scenario.batches(base_concurrency) {
            if self.is_shutdown() {
                log::info!("Shutdown requested, skipping remaining batches of [{}]", scenario.name());
                break;
            }

            let queue = Arc::new(ScenarioQueue::from_descriptors(batch.to_vec()));
            let batch_summary = self.run(queue, batch.len()).await;
            log::debug!(
                "Batch of {} for [{}] finished in {:?}",
                batch.len(),
                scenario.name(),
                batch_summary.elapsed
            );
            batch_sizes.push(batch.len());
            summary.merge(&batch_summary);
        }

        ScenarioOutcome {
            name: scenario.name().to_string(),
            effective_concurrency,
            batch_sizes,
            summary,
        }
    }

    /// Run scenarios one after another, in the order given.
    pub async fn execute_scenarios(
        &self,
        scenarios: &[Scenario],
        base_concurrency: usize,
    ) -> Vec<ScenarioOutcome> {
        let mut outcomes = Vec::with_capacity(scenarios.len());
        for scenario in scenarios {
            if self.is_shutdown() {
                break;
            }
            if scenario.is_empty() {
                log::info!("Scenario [{}] has no requests, skipping", scenario.name());
                continue;
            }
            outcomes.push(self.execute_scenario(scenario, base_concurrency).await);
        }
        outcomes
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown.as_ref().is_some_and(|s| s.is_shutdown())
    }

    async fn work(self, id: usize, queue: Arc<ScenarioQueue>) -> PoolSummary {
        let mut summary = PoolSummary::default();
        let mut shutdown_listener = self.shutdown.as_ref().map(|s| s.new_listener());

        loop {
            if !self.live.is_live(id) {
                log::trace!("Worker {} cancelled", id);
                break;
            }
            if self.is_shutdown() {
                log::trace!("Worker {} stopping for shutdown", id);
                break;
            }

            if self.backpressure.is_active(&self.collector) {
                if !self.throttled.swap(true, Ordering::SeqCst) {
                    log::warn!(
                        "More than {} rate limit hits in the last {:?}, workers are cooling down",
                        self.backpressure.threshold,
                        self.backpressure.window
                    );
                }
                summary.cooldowns += 1;
                tokio::select! {
                    _ = tokio::time::sleep(self.backpressure.cooldown) => {}
                    _ = self.live.cancelled(id) => {}
                }
                if !self.live.is_live(id) {
                    log::trace!("Worker {} cancelled during cooldown", id);
                    break;
                }
            } else if self.throttled.swap(false, Ordering::SeqCst) {
                log::info!("Rate limit pressure has eased, resuming full speed");
            }

            let next = match shutdown_listener.as_mut() {
                Some(listener) => {
                    tokio::select! {
                        next = queue.next() => next,
                        _ = listener.wait_for_shutdown() => None,
                        _ = self.live.cancelled(id) => None,
                    }
                }
                None => {
                    tokio::select! {
                        next = queue.next() => next,
                        _ = self.live.cancelled(id) => None,
                    }
                }
            };

            let Some(descriptor) = next else {
                break;
            };

            let paced = match &self.pacer {
                Some(pacer) => {
                    tokio::select! {
                        _ = pacer.wait() => true,
                        _ = self.live.cancelled(id) => false,
                    }
                }
                None => true,
            };
            if !paced || !self.live.is_live(id) {
                log::trace!("Worker {} cancelled before dispatch", id);
                queue.put_back(descriptor);
                break;
            }

            self.dispatch(&descriptor, &mut summary).await;
        }

        self.live.cancel(id);
        summary
    }

    async fn dispatch(&self, descriptor: &RequestDescriptor, summary: &mut PoolSummary) {
        let record = OperationRecord::new(descriptor.method());
        let result = self.requester.send(descriptor).await;
        let observation = self.collector.record_operation(&record, &result);

        summary.dispatched += 1;
        match &result {
            Ok(response) => {
                summary.succeeded += 1;
                if let Err(e) = self.analyzer.observe_body(descriptor.method(), &response.body) {
                    log::debug!("Skipping pattern analysis: {}", e);
                }
            }
            Err(failure) => {
                summary.failed += 1;
                if observation.rate_limited {
                    summary.rate_limited += 1;
                }
                log::debug!("Request [{}] failed: {}", descriptor.method(), failure);
            }
        }

        if let Some(on_result) = &self.on_result {
            on_result(descriptor, &result);
        }
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("backpressure", &self.backpressure)
            .field("pacer", &self.pacer)
            .field("live", &self.live.ids())
            .finish_non_exhaustive()
    }
}
