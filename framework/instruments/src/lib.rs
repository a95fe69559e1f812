mod metrics;
mod patterns;
mod report;

pub use metrics::{MetricCollector, Observation, DEFAULT_RATE_LIMIT_WINDOW};
pub use patterns::{Fingerprint, PatternAnalyzer, MAX_EXAMPLES, MAX_FINGERPRINT_DEPTH};
pub use report::{JsonlReporter, NoopReporter, ReportConfig, ReportSink, Reporter, TableReporter};

/// Timing for a single request, started just before it is dispatched.
#[derive(Debug, Clone)]
pub struct OperationRecord {
    endpoint: String,
    started: tokio::time::Instant,
}

impl OperationRecord {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            started: tokio::time::Instant::now(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn elapsed(&self) -> std::time::Duration {
        self.started.elapsed()
    }
}
