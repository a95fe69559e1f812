use std::time::Duration;

use anyhow::Context;
use chain_tunnel_summary_model::RunConfig;
use url::Url;

use crate::cli::ChainTunnelCli;

/// Validated engine configuration, derived from the command line.
#[derive(Clone)]
pub struct EngineConfig {
    pub base_endpoint: Url,
    pub rpc_endpoint: Url,
    pub auth_token: Option<String>,
    pub concurrency: usize,
    pub max_requests_per_second: u32,
    pub request_timeout: Duration,
    pub batch_size: usize,
    pub batches: Option<usize>,
    pub batch_pause: Duration,
    pub snapshot_interval: Duration,
    pub seed: Option<u64>,
}

impl EngineConfig {
    pub fn from_cli(cli: &ChainTunnelCli) -> anyhow::Result<Self> {
        let base_endpoint = Url::parse(&cli.base_endpoint)
            .with_context(|| format!("Invalid base endpoint: {}", cli.base_endpoint))?;
        let rpc_endpoint = match &cli.rpc_endpoint {
            Some(rpc_endpoint) => Url::parse(rpc_endpoint)
                .with_context(|| format!("Invalid RPC endpoint: {}", rpc_endpoint))?,
            None => base_endpoint.clone(),
        };

        if cli.concurrency == 0 {
            anyhow::bail!("Concurrency must be greater than 0");
        }
        if cli.max_rps == 0 {
            anyhow::bail!("Max requests per second must be greater than 0");
        }
        if cli.batch_size == 0 {
            anyhow::bail!("Batch size must be greater than 0");
        }

        Ok(Self {
            base_endpoint,
            rpc_endpoint,
            auth_token: cli.auth_token.clone().filter(|t| !t.is_empty()),
            concurrency: cli.concurrency,
            max_requests_per_second: cli.max_rps,
            request_timeout: Duration::from_millis(cli.request_timeout_ms),
            batch_size: cli.batch_size,
            batches: cli.batches,
            batch_pause: Duration::from_millis(cli.batch_pause_ms),
            snapshot_interval: Duration::from_secs(cli.snapshot_interval_s.max(1)),
            seed: cli.seed,
        })
    }

    pub fn run_config(&self) -> RunConfig {
        RunConfig {
            base_endpoint: self.base_endpoint.to_string(),
            rpc_endpoint: self.rpc_endpoint.to_string(),
            concurrency: self.concurrency,
            max_requests_per_second: self.max_requests_per_second,
        }
    }
}

impl std::fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineConfig")
            .field("base_endpoint", &self.base_endpoint.as_str())
            .field("rpc_endpoint", &self.rpc_endpoint.as_str())
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .field("concurrency", &self.concurrency)
            .field("max_requests_per_second", &self.max_requests_per_second)
            .field("request_timeout", &self.request_timeout)
            .field("batch_size", &self.batch_size)
            .field("batches", &self.batches)
            .field("batch_pause", &self.batch_pause)
            .field("snapshot_interval", &self.snapshot_interval)
            .field("seed", &self.seed)
            .finish()
    }
}
