use std::path::PathBuf;

use clap::{Parser, ValueEnum};

#[derive(Parser, Debug, Clone)]
#[command(about, long_about = None)]
pub struct ChainTunnelCli {
    /// Base URL of the REST API to test, for example `http://localhost:1317`
    #[clap(short, long)]
    pub base_endpoint: String,

    /// URL that JSON-RPC calls are posted to. Defaults to the base endpoint.
    #[clap(long)]
    pub rpc_endpoint: Option<String>,

    /// Bearer token sent with every request
    #[clap(long, env = "CHAIN_TUNNEL_AUTH_TOKEN", hide_env_values = true)]
    pub auth_token: Option<String>,

    /// The number of concurrent workers. Scenario sets scale this by their weight.
    #[clap(long, default_value = "10")]
    pub concurrency: usize,

    /// Ceiling on requests dispatched per second, across all workers
    #[clap(long, default_value = "50")]
    pub max_rps: u32,

    /// The number of seconds to run the scenario for
    #[clap(long)]
    pub duration: Option<u64>,

    /// Run this test as a soak test, ignoring any configured duration and continuing to run until stopped
    #[clap(long, default_value = "false")]
    pub soak: bool,

    /// Do not show a progress bar on the CLI.
    ///
    /// This is recommended for CI/CD environments where the progress bar isn't being looked at by anyone and is just adding noise to the logs.
    #[clap(long, default_value = "false")]
    pub no_progress: bool,

    /// Where the run summary goes when the run ends
    #[clap(long, value_enum, default_value_t = ReporterOpt::Table)]
    pub reporter: ReporterOpt,

    /// File that the `jsonl` reporter appends run summaries to
    #[clap(long, default_value = "run_summaries.jsonl")]
    pub summary_path: PathBuf,

    /// Identifier for this run. A random one is generated if not set.
    #[clap(long)]
    pub run_id: Option<String>,

    /// Seed for request sampling, to make the request sequence reproducible
    #[clap(long)]
    pub seed: Option<u64>,

    /// Number of requests drawn per weighted batch
    #[clap(long, default_value = "20")]
    pub batch_size: usize,

    /// Number of weighted batches to run. Without this, batches stream until the run is stopped.
    #[clap(long)]
    pub batches: Option<usize>,

    /// Pause between streamed batches, in milliseconds
    #[clap(long, default_value = "1000")]
    pub batch_pause_ms: u64,

    /// Timeout applied to every request, in milliseconds
    #[clap(long, default_value = "10000")]
    pub request_timeout_ms: u64,

    /// Interval between metric snapshots, in seconds
    #[clap(long, default_value = "10")]
    pub snapshot_interval_s: u64,

    /// Number of recent blocks inspected during discovery
    #[clap(long, default_value = "10")]
    pub block_window: usize,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReporterOpt {
    /// Print tables to stdout
    #[default]
    Table,
    /// Append the summary as a JSON line to `--summary-path`
    Jsonl,
    /// Discard the summary
    Noop,
}

impl ChainTunnelCli {
    /// Defaults for everything except the endpoint. Useful when driving the runner from code.
    pub fn for_endpoint(base_endpoint: impl Into<String>) -> Self {
        Self {
            base_endpoint: base_endpoint.into(),
            rpc_endpoint: None,
            auth_token: None,
            concurrency: 10,
            max_rps: 50,
            duration: None,
            soak: false,
            no_progress: false,
            reporter: ReporterOpt::Table,
            summary_path: PathBuf::from("run_summaries.jsonl"),
            run_id: None,
            seed: None,
            batch_size: 20,
            batches: None,
            batch_pause_ms: 1000,
            request_timeout_ms: 10_000,
            snapshot_interval_s: 10,
            block_window: 10,
        }
    }

    /// The planned run time in seconds, `None` when the run should continue until stopped.
    pub fn resolve_duration(&self, default_duration_s: Option<u64>) -> Option<u64> {
        if self.soak {
            None
        } else {
            self.duration.or(default_duration_s)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_defaults_match_for_endpoint() {
        let parsed =
            ChainTunnelCli::try_parse_from(["chain-tunnel", "--base-endpoint", "http://node:1317"])
                .unwrap();
        let built = ChainTunnelCli::for_endpoint("http://node:1317");

        assert_eq!(built.concurrency, parsed.concurrency);
        assert_eq!(built.max_rps, parsed.max_rps);
        assert_eq!(built.batch_size, parsed.batch_size);
        assert_eq!(built.reporter, parsed.reporter);
        assert_eq!(built.summary_path, parsed.summary_path);
    }

    #[test]
    fn parse_reporter() {
        let parsed = ChainTunnelCli::try_parse_from([
            "chain-tunnel",
            "-b",
            "http://node:1317",
            "--reporter",
            "jsonl",
            "--concurrency",
            "4",
        ])
        .unwrap();

        assert_eq!(ReporterOpt::Jsonl, parsed.reporter);
        assert_eq!(4, parsed.concurrency);
    }
}
