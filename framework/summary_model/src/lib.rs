use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha3::Digest;
use std::collections::{BTreeMap, HashMap};
use std::io::{BufRead, Read, Write};
use std::path::PathBuf;

/// Summary of a run
///
/// This is the final aggregate handed to the reporter once the load has stopped.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSummary {
    /// The unique run id
    ///
    /// Chosen by the runner. Unique for each run.
    pub run_id: String,
    /// The name of the scenario that was run
    pub scenario_name: String,
    /// The time the run started
    ///
    /// This is a Unix timestamp in seconds.
    pub started_at: i64,
    /// Wall clock duration of the load phase, in milliseconds
    pub duration_ms: u64,
    /// The configuration the engine ran with
    pub config: RunConfig,
    /// Request totals across every endpoint
    pub requests: RequestTotals,
    /// Mean latency across every recorded request, in milliseconds
    pub average_latency: u64,
    /// Percentage of failed requests across every endpoint, rounded to two decimal places
    pub error_rate: f64,
    /// Aggregated metrics per endpoint, keyed by the logical method name
    pub endpoints: BTreeMap<String, EndpointSummary>,
    /// Observed response shapes per endpoint
    pub patterns_by_endpoint: BTreeMap<String, Vec<PatternSummary>>,
    /// Minority response shapes seen for endpoints with an established dominant shape
    pub anomalies: Vec<AnomalySummary>,
    /// Rate limit responses seen during the run
    pub rate_limit: RateLimitSummary,
    /// Point in time copies of the metrics, in the order they were taken
    pub snapshots: Vec<Snapshot>,
    /// Environment variables set for the run
    ///
    /// This won't capture all environment variables. Just the ones that the runner is aware of.
    pub env: HashMap<String, String>,
    /// The version of Chain Tunnel that was used for this run
    pub chain_tunnel_version: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunConfig {
    pub base_endpoint: String,
    pub rpc_endpoint: String,
    pub concurrency: usize,
    pub max_requests_per_second: u32,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RequestTotals {
    pub total: u64,
    pub successful: u64,
    pub failed: u64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RateLimitSummary {
    pub total_hits: u64,
    /// Hits inside the trailing window at the time the summary was produced
    pub recent_hits_in_window: usize,
}

/// Aggregated metrics for one endpoint.
///
/// All latencies are in milliseconds.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EndpointSummary {
    pub count: u64,
    pub errors: u64,
    /// `errors / count * 100`, rounded to two decimal places
    pub error_rate: f64,
    pub average_latency: u64,
    pub min_latency: u64,
    pub max_latency: u64,
    pub p50_latency: u64,
    pub p95_latency: u64,
    pub p99_latency: u64,
    pub rate_limit_hits: u64,
}

/// Point in time copy of the aggregated metrics.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Snapshot {
    /// Time since the collector was created, in milliseconds
    pub elapsed_ms: u64,
    pub requests: RequestTotals,
    pub rate_limit_hits_in_window: usize,
    pub endpoints: BTreeMap<String, EndpointSummary>,
}

/// One observed response shape for an endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatternSummary {
    /// Canonical compact rendering of the structural signature
    pub key: String,
    /// The signature as a JSON value, for inspection
    pub fingerprint: Value,
    pub count: u64,
    /// Up to five example payloads, the first ones seen
    pub examples: Vec<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnomalySummary {
    pub endpoint: String,
    pub key: String,
    pub count: u64,
    /// How often the endpoint's dominant shape had been seen when this one first appeared
    pub dominant_count: u64,
    pub example: Value,
}

/// Output of the response pattern analysis.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PatternReport {
    pub patterns_by_endpoint: BTreeMap<String, Vec<PatternSummary>>,
    pub anomalies: Vec<AnomalySummary>,
}

impl RunSummary {
    /// Create a new run summary with no recorded activity
    pub fn new(
        run_id: String,
        scenario_name: String,
        started_at: i64,
        config: RunConfig,
        chain_tunnel_version: String,
    ) -> Self {
        Self {
            run_id,
            scenario_name,
            started_at,
            duration_ms: 0,
            config,
            requests: RequestTotals::default(),
            average_latency: 0,
            error_rate: 0.0,
            endpoints: BTreeMap::new(),
            patterns_by_endpoint: BTreeMap::new(),
            anomalies: Vec::new(),
            rate_limit: RateLimitSummary::default(),
            snapshots: Vec::new(),
            env: HashMap::with_capacity(0),
            chain_tunnel_version,
        }
    }

    /// Attach the response pattern analysis
    pub fn set_pattern_report(&mut self, report: PatternReport) {
        self.patterns_by_endpoint = report.patterns_by_endpoint;
        self.anomalies = report.anomalies;
    }

    /// Add an environment variable
    pub fn add_env(&mut self, key: String, value: String) {
        self.env.insert(key, value);
    }

    /// Compute a fingerprint for this run summary
    ///
    /// The fingerprint is intended to uniquely identify the configuration used to run the scenario.
    /// It uses the
    ///     - Scenario name
    ///     - Endpoints
    ///     - Concurrency and request rate ceiling
    ///     - Selected environment variables
    ///     - Chain Tunnel version
    ///
    /// The fingerprint is computed using [sha3::Sha3_256].
    pub fn fingerprint(&self) -> String {
        let mut hasher = sha3::Sha3_256::new();
        Digest::update(&mut hasher, self.scenario_name.as_bytes());
        Digest::update(&mut hasher, self.config.base_endpoint.as_bytes());
        Digest::update(&mut hasher, self.config.rpc_endpoint.as_bytes());
        Digest::update(&mut hasher, (self.config.concurrency as u64).to_le_bytes());
        Digest::update(&mut hasher, self.config.max_requests_per_second.to_le_bytes());
        self.env
            .iter()
            .sorted_by_key(|(k, _)| k.to_owned())
            .for_each(|(k, v)| {
                Digest::update(&mut hasher, k.as_bytes());
                Digest::update(&mut hasher, v.as_bytes());
            });
        Digest::update(&mut hasher, self.chain_tunnel_version.as_bytes());

        format!("{:x}", hasher.finalize())
    }
}

/// Append the run summary to a file
///
/// The summary will be serialized to JSON and output as a single line followed by a newline. The
/// recommended file extension is `.jsonl`.
pub fn append_run_summary(run_summary: &RunSummary, path: PathBuf) -> anyhow::Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)?;
    store_run_summary(run_summary, &mut file)?;
    file.write_all("\n".as_bytes())?;
    Ok(())
}

/// Serialize the run summary to a writer
pub fn store_run_summary<W: Write>(run_summary: &RunSummary, writer: &mut W) -> anyhow::Result<()> {
    serde_json::to_writer(writer, run_summary)?;
    Ok(())
}

/// Load a run summary from a reader
pub fn load_run_summary<R: Read>(reader: R) -> anyhow::Result<RunSummary> {
    let reader = std::io::BufReader::new(reader);
    let run_summary: RunSummary = serde_json::from_reader(reader)?;
    Ok(run_summary)
}

/// Load run summaries from a file
///
/// The file should contain one JSON object per line. This is the format produced by
/// [append_run_summary].
pub fn load_summary_runs(path: PathBuf) -> anyhow::Result<Vec<RunSummary>> {
    let file = std::fs::File::open(path)?;
    let reader = std::io::BufReader::new(file);
    let mut runs = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let run: RunSummary = serde_json::from_str(&line)?;
        runs.push(run);
    }
    Ok(runs)
}
