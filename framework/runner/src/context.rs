use std::sync::Arc;

use chain_tunnel_core::prelude::{Requester, ShutdownHandle};
use chain_tunnel_instruments::{MetricCollector, PatternAnalyzer};

use crate::config::EngineConfig;
use crate::executor::Executor;

/// Everything shared for the lifetime of one run.
///
/// The collector and analyzer are created empty at the start of the run and handed to the
/// reporter at the end, nothing is carried over between runs.
pub struct RunnerContext {
    executor: Arc<Executor>,
    config: EngineConfig,
    run_id: String,
    requester: Arc<dyn Requester>,
    collector: Arc<MetricCollector>,
    analyzer: Arc<PatternAnalyzer>,
    shutdown_handle: ShutdownHandle,
}

impl RunnerContext {
    pub(crate) fn new(
        executor: Arc<Executor>,
        config: EngineConfig,
        run_id: String,
        requester: Arc<dyn Requester>,
        shutdown_handle: ShutdownHandle,
    ) -> Self {
        Self {
            executor,
            config,
            run_id,
            requester,
            collector: Arc::new(MetricCollector::new()),
            analyzer: Arc::new(PatternAnalyzer::new()),
            shutdown_handle,
        }
    }

    pub fn executor(&self) -> &Arc<Executor> {
        &self.executor
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn requester(&self) -> &Arc<dyn Requester> {
        &self.requester
    }

    pub fn collector(&self) -> &Arc<MetricCollector> {
        &self.collector
    }

    pub fn analyzer(&self) -> &Arc<PatternAnalyzer> {
        &self.analyzer
    }

    pub fn shutdown_handle(&self) -> &ShutdownHandle {
        &self.shutdown_handle
    }

    /// Stop the load early. Workers finish their in-flight requests and the run is reported as
    /// normal.
    pub fn force_stop_scenario(&self) {
        self.shutdown_handle.shutdown();
    }
}

impl std::fmt::Debug for RunnerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunnerContext")
            .field("config", &self.config)
            .field("run_id", &self.run_id)
            .finish_non_exhaustive()
    }
}
