mod common;

use std::sync::Arc;

use async_trait::async_trait;
use chain_tunnel_runner::prelude::{
    run, ChainTunnelCli, DiscoveryFailure, DiscoveryRunner, DiscoveryStage, EngineConfig,
    HookResult, LoadTestDefinitionBuilder, RequestCatalog, RequestDescriptor, RequestTarget,
    Requester, ReporterOpt, RunnerContext, Scenario, Transport,
};
use common::{MockRequester, TestState};
use rand::RngCore;

fn sample_cli_cfg() -> ChainTunnelCli {
    let mut cli = ChainTunnelCli::for_endpoint("http://localhost:1317");
    cli.no_progress = true;
    cli.reporter = ReporterOpt::Noop;
    cli.max_rps = 1000;
    cli.batch_pause_ms = 0;
    cli
}

fn mock_requester(_: &EngineConfig) -> anyhow::Result<Arc<dyn Requester>> {
    let requester: Arc<dyn Requester> = MockRequester::new();
    Ok(requester)
}

fn block_scenarios(state: &TestState) -> Vec<Scenario> {
    let blocks = state
        .heights
        .iter()
        .map(|h| RequestDescriptor::rest_get("block", format!("/blocks/{h}")))
        .collect::<Vec<_>>();
    let failing = (0..2)
        .map(|_| RequestDescriptor::rest_get("broken", "/fail"))
        .collect::<Vec<_>>();

    vec![
        Scenario::new("blocks", 1.0, blocks),
        Scenario::new("broken", 1.5, failing),
    ]
}

struct LatestHeights;

#[async_trait]
impl DiscoveryStage<TestState> for LatestHeights {
    fn name(&self) -> &str {
        "latest_heights"
    }

    async fn discover(
        &self,
        _: &TestState,
        _: &dyn Requester,
    ) -> Result<TestState, DiscoveryFailure> {
        Ok(TestState {
            heights: vec![10, 9, 8, 7],
        })
    }
}

struct Unavailable;

#[async_trait]
impl DiscoveryStage<TestState> for Unavailable {
    fn name(&self) -> &str {
        "unavailable"
    }

    async fn discover(
        &self,
        _: &TestState,
        requester: &dyn Requester,
    ) -> Result<TestState, DiscoveryFailure> {
        requester
            .send(&RequestDescriptor::rest_get("contracts", "/fail"))
            .await
            .map_err(|e| DiscoveryFailure::from_request(self.name(), &e))?;
        Ok(TestState::default())
    }
}

fn discovery(_: &ChainTunnelCli) -> DiscoveryRunner<TestState> {
    DiscoveryRunner::new()
        .with_stage(Unavailable)
        .with_stage(LatestHeights)
}

#[test]
fn propagate_error_in_setup_hook() {
    fn setup(_ctx: &RunnerContext, _state: &TestState) -> HookResult {
        Err(anyhow::anyhow!("Error in setup hook"))
    }

    let scenario = LoadTestDefinitionBuilder::<TestState>::new_with_init(
        "propagate_error_in_setup_hook",
        sample_cli_cfg(),
    )
    .use_requester(mock_requester)
    .use_scenario_sets(block_scenarios)
    .use_setup(setup);

    let result = run(scenario);

    assert!(result.is_err());
    assert_eq!(result.unwrap_err().to_string(), "Error in setup hook");
}

#[test]
fn missing_requester_is_an_error() {
    let scenario = LoadTestDefinitionBuilder::<TestState>::new_with_init(
        "missing_requester",
        sample_cli_cfg(),
    )
    .use_scenario_sets(block_scenarios);

    assert!(run(scenario).is_err());
}

#[test]
fn failed_discovery_stage_does_not_stop_the_run() {
    let scenario = LoadTestDefinitionBuilder::<TestState>::new_with_init(
        "failed_discovery_stage_does_not_stop_the_run",
        sample_cli_cfg(),
    )
    .use_requester(mock_requester)
    .use_discovery(discovery)
    .use_scenario_sets(block_scenarios);

    let summary = run(scenario).unwrap();

    assert_eq!(6, summary.requests.total);
    assert_eq!(4, summary.endpoints["block"].count);
    assert_eq!(2, summary.endpoints["broken"].errors);
    assert_eq!(100.0, summary.endpoints["broken"].error_rate);
    assert!(!summary.snapshots.is_empty());
    assert_eq!(
        "failed_discovery_stage_does_not_stop_the_run",
        summary.scenario_name
    );
}

fn latest(_: &TestState, _: &mut dyn RngCore) -> Option<RequestTarget> {
    Some(RequestTarget::path("/latest"))
}

fn block(state: &TestState, rng: &mut dyn RngCore) -> Option<RequestTarget> {
    if state.heights.is_empty() {
        return None;
    }
    let height = state.heights[(rng.next_u32() as usize) % state.heights.len()];
    Some(RequestTarget::path(format!("/blocks/{height}")))
}

#[test]
fn weighted_batches_run_to_completion() {
    fn catalog() -> RequestCatalog<TestState> {
        RequestCatalog::new()
            .register("latest", Transport::RestGet, 1.0, latest)
            .register("block", Transport::RestGet, 3.0, block)
    }

    let mut cli = sample_cli_cfg();
    cli.batches = Some(3);
    cli.batch_size = 5;
    cli.seed = Some(11);
    cli.run_id = Some("weighted".to_string());

    let scenario =
        LoadTestDefinitionBuilder::<TestState>::new_with_init("weighted_batches", cli)
            .use_requester(mock_requester)
            .use_discovery(discovery)
            .use_catalog(catalog());

    let summary = run(scenario).unwrap();

    assert_eq!("weighted", summary.run_id);
    assert_eq!(15, summary.requests.total);
    assert_eq!(0, summary.requests.failed);
    assert_eq!(
        15,
        summary.endpoints.values().map(|e| e.count).sum::<u64>()
    );
    assert!(!summary.patterns_by_endpoint.is_empty());
    assert!(summary.anomalies.is_empty());
}

#[test]
fn nothing_to_generate_ends_the_run() {
    fn catalog() -> RequestCatalog<TestState> {
        RequestCatalog::new().register("block", Transport::RestGet, 1.0, block)
    }

    // No discovery, so no heights to build block requests from, and no batch limit
    let scenario = LoadTestDefinitionBuilder::<TestState>::new_with_init(
        "nothing_to_generate",
        sample_cli_cfg(),
    )
    .use_requester(mock_requester)
    .use_catalog(catalog());

    let summary = run(scenario).unwrap();
    assert_eq!(0, summary.requests.total);
}
