use std::sync::Arc;

use chain_tunnel_core::prelude::Requester;

use crate::cli::ChainTunnelCli;
use crate::config::EngineConfig;
use crate::context::RunnerContext;
use crate::discovery::{DiscoveredState, DiscoveryRunner};
use crate::scenario::{RequestCatalog, Scenario, WeightTable};

pub type HookResult = anyhow::Result<()>;

pub type RequesterFactory = fn(&EngineConfig) -> anyhow::Result<Arc<dyn Requester>>;
pub type DiscoveryFactory<S> = fn(&ChainTunnelCli) -> DiscoveryRunner<S>;
pub type ScenarioSetBuilder<S> = fn(&S) -> Vec<Scenario>;
pub type SetupHook<S> = fn(&RunnerContext, &S) -> HookResult;

/// How load is generated once discovery has finished.
pub(crate) enum LoadPlan<S> {
    /// Weighted sampling over a catalog, in fixed batches or as a stream.
    Weighted {
        catalog: Arc<RequestCatalog<S>>,
        weights: WeightTable,
    },
    /// Fixed scenarios built from the discovered state, run in order.
    ScenarioSets(ScenarioSetBuilder<S>),
}

/// The builder for a load test definition.
///
/// This must be used at the start of a test to define the load that you want to run.
pub struct LoadTestDefinitionBuilder<S: DiscoveredState> {
    /// The name of the scenario, which should be unique within the test suite.
    ///
    /// Recommended value is `env!("CARGO_PKG_NAME")`.
    name: String,
    /// This value is initialised for you and you cannot change it.
    #[doc(hidden)]
    cli: ChainTunnelCli,
    /// Used when the command line does not set a duration and the run is not a soak test.
    default_duration_s: Option<u64>,
    /// Creates the transport that all discovery and load requests go through. Required.
    requester_fn: Option<RequesterFactory>,
    /// Discovery stages to run before any load is generated.
    ///
    /// Optional. Without discovery the load is generated from `S::default()`.
    discovery_fn: Option<DiscoveryFactory<S>>,
    /// Runs once after discovery, before any load.
    setup_fn: Option<SetupHook<S>>,
    catalog: Option<RequestCatalog<S>>,
    weights: Option<WeightTable>,
    scenario_sets_fn: Option<ScenarioSetBuilder<S>>,
}

pub(crate) struct LoadTestDefinition<S: DiscoveredState> {
    pub name: String,
    pub cli: ChainTunnelCli,
    pub duration_s: Option<u64>,
    pub requester_fn: RequesterFactory,
    pub discovery_fn: Option<DiscoveryFactory<S>>,
    pub setup_fn: Option<SetupHook<S>>,
    pub plan: LoadPlan<S>,
}

impl<S: DiscoveredState> LoadTestDefinitionBuilder<S> {
    /// Initialise a new load test definition from the scenario name and command line arguments.
    /// See the [LoadTestDefinitionBuilder::name] for more information about the name.
    pub fn new(name: &str) -> Self {
        Self::new_with_init(name, crate::init::init())
    }

    /// Initialise with an already parsed command line, for driving the runner from code.
    pub fn new_with_init(name: &str, cli: ChainTunnelCli) -> Self {
        Self {
            name: name.to_string(),
            cli,
            default_duration_s: None,
            requester_fn: None,
            discovery_fn: None,
            setup_fn: None,
            catalog: None,
            weights: None,
            scenario_sets_fn: None,
        }
    }

    pub fn cli(&self) -> &ChainTunnelCli {
        &self.cli
    }

    pub fn with_default_duration_s(mut self, duration: u64) -> Self {
        self.default_duration_s = Some(duration);
        self
    }

    pub fn use_requester(mut self, requester_fn: RequesterFactory) -> Self {
        self.requester_fn = Some(requester_fn);
        self
    }

    pub fn use_discovery(mut self, discovery_fn: DiscoveryFactory<S>) -> Self {
        self.discovery_fn = Some(discovery_fn);
        self
    }

    pub fn use_setup(mut self, setup_fn: SetupHook<S>) -> Self {
        self.setup_fn = Some(setup_fn);
        self
    }

    /// Generate load by weighted sampling over `catalog`, using the catalog's own weights unless
    /// [LoadTestDefinitionBuilder::use_weights] overrides them.
    pub fn use_catalog(mut self, catalog: RequestCatalog<S>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn use_weights(mut self, weights: WeightTable) -> Self {
        self.weights = Some(weights);
        self
    }

    /// Generate load from fixed scenarios built from the discovered state.
    pub fn use_scenario_sets(mut self, scenario_sets_fn: ScenarioSetBuilder<S>) -> Self {
        self.scenario_sets_fn = Some(scenario_sets_fn);
        self
    }

    pub(crate) fn build(self) -> anyhow::Result<LoadTestDefinition<S>> {
        let requester_fn = self
            .requester_fn
            .ok_or_else(|| anyhow::anyhow!("No requester configured for [{}]", self.name))?;

        let plan = match (self.catalog, self.scenario_sets_fn) {
            (Some(catalog), None) => {
                let weights = self.weights.unwrap_or_else(|| catalog.weights());
                LoadPlan::Weighted {
                    catalog: Arc::new(catalog),
                    weights,
                }
            }
            (None, Some(scenario_sets_fn)) => LoadPlan::ScenarioSets(scenario_sets_fn),
            (Some(_), Some(_)) => anyhow::bail!(
                "[{}] configures both a catalog and scenario sets, choose one",
                self.name
            ),
            (None, None) => anyhow::bail!(
                "[{}] needs either a catalog or scenario sets to generate load from",
                self.name
            ),
        };

        Ok(LoadTestDefinition {
            duration_s: self.cli.resolve_duration(self.default_duration_s),
            name: self.name,
            cli: self.cli,
            requester_fn,
            discovery_fn: self.discovery_fn,
            setup_fn: self.setup_fn,
            plan,
        })
    }
}
