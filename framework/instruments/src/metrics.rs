use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chain_tunnel_core::prelude::{RequestFailure, Response};
use chain_tunnel_summary_model::{
    EndpointSummary, RateLimitSummary, RequestTotals, RunSummary, Snapshot,
};
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::OperationRecord;

/// Trailing window used when counting recent rate limit hits.
pub const DEFAULT_RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);

/// The outcome of one request, as far as the metrics are concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    pub duration: Duration,
    pub success: bool,
    pub rate_limited: bool,
}

impl Observation {
    pub fn success(duration: Duration) -> Self {
        Self {
            duration,
            success: true,
            rate_limited: false,
        }
    }

    pub fn failure(duration: Duration) -> Self {
        Self {
            duration,
            success: false,
            rate_limited: false,
        }
    }

    pub fn rate_limited(duration: Duration) -> Self {
        Self {
            duration,
            success: false,
            rate_limited: true,
        }
    }
}

#[derive(Debug, Default)]
struct MetricRecord {
    count: u64,
    errors: u64,
    latency_sum_micros: u128,
    /// In the order they were recorded.
    latencies: Vec<Duration>,
    rate_limit_hits: u64,
}

impl MetricRecord {
    fn add(&mut self, observation: Observation) {
        self.count += 1;
        if !observation.success {
            self.errors += 1;
        }
        self.latency_sum_micros += observation.duration.as_micros();
        self.latencies.push(observation.duration);

        if observation.rate_limited {
            self.rate_limit_hits += 1;
        }
    }

    fn error_rate(&self) -> f64 {
        percentage(self.errors, self.count)
    }

    fn average_latency(&self) -> u64 {
        average_millis(self.latency_sum_micros, self.count)
    }

    fn summarize(&self) -> EndpointSummary {
        let mut sorted = self.latencies.clone();
        sorted.sort_unstable();

        EndpointSummary {
            count: self.count,
            errors: self.errors,
            error_rate: self.error_rate(),
            average_latency: self.average_latency(),
            min_latency: sorted.first().map(as_millis).unwrap_or_default(),
            max_latency: sorted.last().map(as_millis).unwrap_or_default(),
            p50_latency: nearest_rank(&sorted, 50.0),
            p95_latency: nearest_rank(&sorted, 95.0),
            p99_latency: nearest_rank(&sorted, 99.0),
            rate_limit_hits: self.rate_limit_hits,
        }
    }
}

/// Collects per-endpoint request metrics for the duration of one run.
///
/// Shared between every worker. Aggregates are additive, so the order in which observations arrive
/// does not change the per-endpoint results. Only the snapshot history is ordered in time.
#[derive(Debug)]
pub struct MetricCollector {
    started: Instant,
    rate_limit_window: Duration,
    records: Mutex<HashMap<String, MetricRecord>>,
    rate_limit_hits: Mutex<VecDeque<Instant>>,
    total_rate_limit_hits: AtomicU64,
    snapshots: Mutex<Vec<Snapshot>>,
}

impl Default for MetricCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricCollector {
    pub fn new() -> Self {
        Self::with_rate_limit_window(DEFAULT_RATE_LIMIT_WINDOW)
    }

    /// Rate limit hits older than the window are discarded as new ones arrive.
    pub fn with_rate_limit_window(rate_limit_window: Duration) -> Self {
        Self {
            started: Instant::now(),
            rate_limit_window,
            records: Mutex::new(HashMap::new()),
            rate_limit_hits: Mutex::new(VecDeque::new()),
            total_rate_limit_hits: AtomicU64::new(0),
            snapshots: Mutex::new(Vec::new()),
        }
    }

    pub fn rate_limit_window(&self) -> Duration {
        self.rate_limit_window
    }

    pub fn record(&self, endpoint: &str, observation: Observation) {
        let now = Instant::now();
        {
            let mut records = self.records.lock();
            match records.get_mut(endpoint) {
                Some(record) => record.add(observation),
                None => {
                    let mut record = MetricRecord::default();
                    record.add(observation);
                    records.insert(endpoint.to_string(), record);
                }
            }
        }

        if observation.rate_limited {
            self.total_rate_limit_hits.fetch_add(1, Ordering::SeqCst);
            let mut hits = self.rate_limit_hits.lock();
            hits.push_back(now);
            while hits
                .front()
                .is_some_and(|hit| now.duration_since(*hit) > self.rate_limit_window)
            {
                hits.pop_front();
            }
        }
    }

    /// Record the outcome of a request timed by `record`.
    pub fn record_operation(
        &self,
        record: &OperationRecord,
        result: &Result<Response, RequestFailure>,
    ) -> Observation {
        let duration = record.elapsed();
        let observation = match result {
            Ok(_) => Observation::success(duration),
            Err(e) if e.is_rate_limited() => Observation::rate_limited(duration),
            Err(_) => Observation::failure(duration),
        };
        self.record(record.endpoint(), observation);
        observation
    }

    pub fn count(&self, endpoint: &str) -> u64 {
        self.records
            .lock()
            .get(endpoint)
            .map(|r| r.count)
            .unwrap_or_default()
    }

    pub fn errors(&self, endpoint: &str) -> u64 {
        self.records
            .lock()
            .get(endpoint)
            .map(|r| r.errors)
            .unwrap_or_default()
    }

    /// Percentage of failed requests for the endpoint, rounded to two decimal places.
    pub fn error_rate(&self, endpoint: &str) -> f64 {
        self.records
            .lock()
            .get(endpoint)
            .map(|r| r.error_rate())
            .unwrap_or_default()
    }

    /// Mean latency in whole milliseconds, `None` if nothing was recorded for the endpoint.
    pub fn average_latency(&self, endpoint: &str) -> Option<u64> {
        self.records
            .lock()
            .get(endpoint)
            .map(|r| r.average_latency())
    }

    pub fn total_requests(&self) -> u64 {
        self.records.lock().values().map(|r| r.count).sum()
    }

    pub fn total_rate_limit_hits(&self) -> u64 {
        self.total_rate_limit_hits.load(Ordering::SeqCst)
    }

    /// Rate limit hits, across all endpoints, inside the trailing `window`.
    ///
    /// Exact, computed by filtering the stored timestamps. Only hits inside the collector's own
    /// window are retained, so a larger `window` is clamped to it.
    pub fn recent_rate_limit_hits(&self, window: Duration) -> usize {
        let now = Instant::now();
        self.rate_limit_hits
            .lock()
            .iter()
            .filter(|hit| now.duration_since(**hit) <= window)
            .count()
    }

    pub fn endpoint_summaries(&self) -> BTreeMap<String, EndpointSummary> {
        self.records
            .lock()
            .iter()
            .map(|(endpoint, record)| (endpoint.clone(), record.summarize()))
            .collect()
    }

    /// Take a point in time copy of the metrics and append it to the snapshot history.
    pub fn snapshot(&self) -> Snapshot {
        let endpoints = self.endpoint_summaries();
        let snapshot = Snapshot {
            elapsed_ms: self.started.elapsed().as_millis() as u64,
            requests: totals(&endpoints),
            rate_limit_hits_in_window: self.recent_rate_limit_hits(self.rate_limit_window),
            endpoints,
        };

        self.snapshots.lock().push(snapshot.clone());
        snapshot
    }

    pub fn snapshots(&self) -> Vec<Snapshot> {
        self.snapshots.lock().clone()
    }

    /// Fill the metric fields of `summary` from everything recorded so far.
    ///
    /// A final snapshot is taken so the history always ends with the closing state.
    pub fn finalize(&self, mut summary: RunSummary) -> RunSummary {
        self.snapshot();

        let (latency_sum_micros, count) = {
            let records = self.records.lock();
            records.values().fold((0u128, 0u64), |(sum, count), r| {
                (sum + r.latency_sum_micros, count + r.count)
            })
        };

        summary.endpoints = self.endpoint_summaries();
        summary.requests = totals(&summary.endpoints);
        summary.average_latency = average_millis(latency_sum_micros, count);
        summary.error_rate = percentage(summary.requests.failed, summary.requests.total);
        summary.rate_limit = RateLimitSummary {
            total_hits: self.total_rate_limit_hits(),
            recent_hits_in_window: self.recent_rate_limit_hits(self.rate_limit_window),
        };
        summary.snapshots = self.snapshots();
        summary
    }
}

fn totals(endpoints: &BTreeMap<String, EndpointSummary>) -> RequestTotals {
    let total = endpoints.values().map(|e| e.count).sum::<u64>();
    let failed = endpoints.values().map(|e| e.errors).sum::<u64>();
    RequestTotals {
        total,
        successful: total - failed,
        failed,
    }
}

fn percentage(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    ((part as f64 / whole as f64) * 100.0 * 100.0).round() / 100.0
}

fn average_millis(sum_micros: u128, count: u64) -> u64 {
    if count == 0 {
        return 0;
    }
    (sum_micros as f64 / count as f64 / 1000.0).round() as u64
}

fn as_millis(duration: &Duration) -> u64 {
    duration.as_millis() as u64
}

/// Nearest-rank percentile over already sorted samples.
fn nearest_rank(sorted: &[Duration], percentile: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = ((percentile / 100.0) * sorted.len() as f64).ceil() as usize;
    as_millis(&sorted[rank.clamp(1, sorted.len()) - 1])
}

#[cfg(test)]
mod tests {
    use super::*;
    use itertools::Itertools;

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    #[test]
    fn error_rate_is_rounded_percentage() {
        let collector = MetricCollector::new();
        collector.record("eth_call", Observation::success(ms(10)));
        collector.record("eth_call", Observation::success(ms(10)));
        collector.record("eth_call", Observation::failure(ms(10)));

        assert_eq!(3, collector.count("eth_call"));
        assert_eq!(1, collector.errors("eth_call"));
        assert_eq!(33.33, collector.error_rate("eth_call"));
    }

    #[test]
    fn average_latency_rounds_to_whole_millis() {
        let collector = MetricCollector::new();
        collector.record("latest_block", Observation::success(ms(10)));
        collector.record("latest_block", Observation::success(ms(11)));

        // 10.5ms rounds away from zero
        assert_eq!(Some(11), collector.average_latency("latest_block"));
        assert_eq!(None, collector.average_latency("unknown"));
    }

    #[test]
    fn unknown_endpoint_is_empty() {
        let collector = MetricCollector::new();
        assert_eq!(0, collector.count("balances"));
        assert_eq!(0.0, collector.error_rate("balances"));
    }

    #[test]
    fn aggregation_does_not_depend_on_order() {
        let events = vec![
            ("eth_call", ms(12), true),
            ("eth_call", ms(40), false),
            ("eth_getBalance", ms(7), true),
            ("eth_call", ms(3), true),
            ("eth_getBalance", ms(101), false),
        ];

        let mut results = Vec::new();
        for permutation in events.iter().permutations(events.len()) {
            let collector = MetricCollector::new();
            for (endpoint, duration, success) in permutation {
                let observation = if *success {
                    Observation::success(*duration)
                } else {
                    Observation::failure(*duration)
                };
                collector.record(endpoint, observation);
            }

            results.push(
                ["eth_call", "eth_getBalance"]
                    .iter()
                    .map(|endpoint| {
                        (
                            collector.count(endpoint),
                            collector.error_rate(endpoint),
                            collector.average_latency(endpoint),
                        )
                    })
                    .collect::<Vec<_>>(),
            );
        }

        assert_eq!(120, results.len());
        assert!(results.iter().all_equal());
        assert_eq!((3, 33.33, Some(18)), results[0][0]);
        assert_eq!((2, 50.0, Some(54)), results[0][1]);
    }

    #[test]
    fn count_never_below_errors() {
        let collector = MetricCollector::new();
        for i in 0..50 {
            let observation = match i % 3 {
                0 => Observation::success(ms(i)),
                1 => Observation::failure(ms(i)),
                _ => Observation::rate_limited(ms(i)),
            };
            collector.record("supply", observation);
        }

        assert!(collector.count("supply") >= collector.errors("supply"));
        assert_eq!(33, collector.errors("supply"));
        assert_eq!(16, collector.total_rate_limit_hits());
    }

    #[test]
    fn latency_distribution() {
        let collector = MetricCollector::new();
        for millis in 1..=100 {
            collector.record("block", Observation::success(ms(millis)));
        }

        let summary = &collector.endpoint_summaries()["block"];
        assert_eq!(1, summary.min_latency);
        assert_eq!(100, summary.max_latency);
        assert_eq!(50, summary.p50_latency);
        assert_eq!(95, summary.p95_latency);
        assert_eq!(99, summary.p99_latency);
    }

    #[tokio::test(start_paused = true)]
    async fn recent_rate_limit_hits_slide_out_of_window() {
        let collector = MetricCollector::new();
        for _ in 0..5 {
            collector.record("eth_call", Observation::rate_limited(ms(1)));
        }

        tokio::time::advance(Duration::from_secs(30)).await;
        for _ in 0..3 {
            collector.record("eth_getLogs", Observation::rate_limited(ms(1)));
        }
        assert_eq!(8, collector.recent_rate_limit_hits(DEFAULT_RATE_LIMIT_WINDOW));
        assert_eq!(3, collector.recent_rate_limit_hits(Duration::from_secs(10)));

        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(3, collector.recent_rate_limit_hits(DEFAULT_RATE_LIMIT_WINDOW));
        assert_eq!(8, collector.total_rate_limit_hits());

        // Per endpoint totals are not windowed
        let endpoints = collector.endpoint_summaries();
        assert_eq!(5, endpoints["eth_call"].rate_limit_hits);
        assert_eq!(3, endpoints["eth_getLogs"].rate_limit_hits);
    }

    #[tokio::test(start_paused = true)]
    async fn snapshots_are_appended_in_order() {
        let collector = MetricCollector::new();
        collector.record("eth_chainId", Observation::success(ms(5)));
        let first = collector.snapshot();

        tokio::time::advance(Duration::from_secs(10)).await;
        collector.record("eth_chainId", Observation::failure(ms(5)));
        let second = collector.snapshot();

        assert_eq!(1, first.requests.total);
        assert_eq!(2, second.requests.total);
        assert_eq!(1, second.requests.failed);
        assert_eq!(10_000, second.elapsed_ms - first.elapsed_ms);

        let history = collector.snapshots();
        pretty_assertions::assert_eq!(vec![first, second], history);
    }

    #[test]
    fn finalize_fills_totals() {
        let collector = MetricCollector::new();
        collector.record("a", Observation::success(ms(10)));
        collector.record("a", Observation::rate_limited(ms(20)));
        collector.record("b", Observation::success(ms(30)));
        collector.record("b", Observation::failure(ms(40)));

        let summary = collector.finalize(RunSummary::new(
            "run".to_string(),
            "test".to_string(),
            0,
            Default::default(),
            "0.1.0".to_string(),
        ));

        assert_eq!(
            RequestTotals {
                total: 4,
                successful: 2,
                failed: 2,
            },
            summary.requests
        );
        assert_eq!(25, summary.average_latency);
        assert_eq!(50.0, summary.error_rate);
        assert_eq!(1, summary.rate_limit.total_hits);
        assert_eq!(1, summary.rate_limit.recent_hits_in_window);
        assert_eq!(1, summary.snapshots.len());
        assert_eq!(2, summary.endpoints.len());
    }
}
