mod cli;
mod config;
mod context;
mod definition;
mod discovery;
mod executor;
mod init;
mod monitor;
mod pacer;
mod pool;
mod progress;
mod run;
mod scenario;
mod shutdown;
mod types;

pub mod prelude {
    pub use crate::cli::{ChainTunnelCli, ReporterOpt};
    pub use crate::config::EngineConfig;
    pub use crate::context::RunnerContext;
    pub use crate::definition::{
        DiscoveryFactory, HookResult, LoadTestDefinitionBuilder, RequesterFactory,
        ScenarioSetBuilder, SetupHook,
    };
    pub use crate::discovery::{
        DiscoveredState, DiscoveryOutcome, DiscoveryRunner, DiscoveryStage, Mergeable,
        DEFAULT_STAGE_TIMEOUT,
    };
    pub use crate::executor::Executor;
    pub use crate::pacer::DispatchPacer;
    pub use crate::pool::{
        Backpressure, LiveWorkers, PoolSummary, ResultHook, ScenarioOutcome, ScenarioQueue,
        WorkerPool,
    };
    pub use crate::run::run;
    pub use crate::scenario::{
        CatalogEntry, ParamBuilder, RequestCatalog, RequestTarget, Scenario, ScenarioGenerator,
        WeightTable,
    };
    pub use crate::types::ChainTunnelResult;

    pub use chain_tunnel_core::prelude::*;
    pub use chain_tunnel_instruments::{MetricCollector, Observation, PatternAnalyzer};
    pub use chain_tunnel_summary_model::RunSummary;
}
