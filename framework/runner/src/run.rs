use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chain_tunnel_core::prelude::{ShutdownHandle, ShutdownSignalError};
use chain_tunnel_instruments::{MetricCollector, ReportConfig};
use chain_tunnel_summary_model::RunSummary;
use tokio::time::Instant;

use crate::cli::{ChainTunnelCli, ReporterOpt};
use crate::config::EngineConfig;
use crate::context::RunnerContext;
use crate::definition::{LoadPlan, LoadTestDefinitionBuilder};
use crate::discovery::DiscoveredState;
use crate::executor::Executor;
use crate::monitor::start_monitor;
use crate::pacer::DispatchPacer;
use crate::pool::{PoolSummary, ScenarioQueue, WorkerPool};
use crate::progress::start_progress;
use crate::scenario::ScenarioGenerator;
use crate::shutdown::start_shutdown_listener;

/// Environment variables with this prefix are recorded in the run summary.
const ENV_PREFIX: &str = "CHAIN_TUNNEL_";

pub fn run<S: DiscoveredState>(
    definition: LoadTestDefinitionBuilder<S>,
) -> anyhow::Result<RunSummary> {
    let definition = definition.build()?;

    log::info!("Running scenario: {}", definition.name);

    let config = EngineConfig::from_cli(&definition.cli)?;
    log::debug!("Engine configuration: {:?}", config);

    let runtime = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;
    let shutdown_handle = start_shutdown_listener(&runtime)?;
    let executor = Arc::new(Executor::new(runtime, shutdown_handle.clone()));
    let requester =
        (definition.requester_fn)(&config).context("Failed to create the requester")?;

    let run_id = definition
        .cli
        .run_id
        .clone()
        .unwrap_or_else(|| nanoid::nanoid!());
    let started_at = chrono::Utc::now().timestamp();
    let run_start = Instant::now();
    let reporter = report_config(&definition.cli).init();

    let runner_context = RunnerContext::new(
        executor.clone(),
        config.clone(),
        run_id.clone(),
        requester.clone(),
        shutdown_handle.clone(),
    );

    let state = match definition.discovery_fn {
        Some(discovery_fn) => {
            let discovery = discovery_fn(&definition.cli);
            log::info!("Discovering chain state with stages {:?}", discovery.stage_names());
            let requester = requester.clone();
            match executor.execute_in_place(async move { Ok(discovery.run(requester).await) }) {
                Ok(outcome) => {
                    log::info!(
                        "Discovery finished, {} stages completed and {} failed",
                        outcome.completed.len(),
                        outcome.failed.len()
                    );
                    outcome.state
                }
                Err(e) if e.is::<ShutdownSignalError>() => {
                    log::info!("Shutdown during discovery, no load will be generated");
                    S::default()
                }
                Err(e) => return Err(e),
            }
        }
        None => S::default(),
    };
    log::debug!("Discovered state: {:?}", state);
    let state = Arc::new(state);

    if let Some(setup_fn) = definition.setup_fn {
        setup_fn(&runner_context, &state)?;
    }

    // After discovery has run, and if this is a time bounded run, then we need to take additional actions
    if let Some(duration) = definition.duration_s {
        if !definition.cli.no_progress {
            // If the run is time bounded then start the progress monitor to show the user how long is left
            if let Err(e) = start_progress(
                Duration::from_secs(duration),
                runner_context.collector().clone(),
                shutdown_handle.new_listener(),
            ) {
                log::warn!("Could not start the progress display: {:?}", e);
            }
        }

        // Set a timer to shut down the run after the duration has elapsed
        let shutdown_handle = shutdown_handle.clone();
        executor.spawn(async move {
            tokio::time::sleep(Duration::from_secs(duration)).await;
            shutdown_handle.shutdown();
        });
    }

    start_snapshots(
        &executor,
        runner_context.collector().clone(),
        config.snapshot_interval,
        shutdown_handle.clone(),
    );

    // Ready to start generating load so start the resource monitor to report high usage by the
    // workers which might lead to misleading latencies.
    if let Err(e) = start_monitor(shutdown_handle.new_listener()) {
        log::warn!("Could not start the resource monitor: {:?}", e);
    }

    let pool = WorkerPool::new(
        requester.clone(),
        runner_context.collector().clone(),
        runner_context.analyzer().clone(),
    )
    .with_pacer(Arc::new(DispatchPacer::per_second(
        config.max_requests_per_second,
    )))
    .with_shutdown(shutdown_handle.clone());

    let repeat = definition.cli.soak || definition.duration_s.is_some();
    let pool_summary = match definition.plan {
        LoadPlan::ScenarioSets(scenario_sets_fn) => {
            let scenarios = scenario_sets_fn(&state);
            executor.block_on(async {
                let mut total = PoolSummary::default();
                loop {
                    let outcomes = pool
                        .execute_scenarios(&scenarios, config.concurrency)
                        .await;
                    if outcomes.is_empty() {
                        break;
                    }
                    for outcome in &outcomes {
                        log::info!(
                            "Scenario [{}] ran batches {:?}, {} succeeded and {} failed",
                            outcome.name,
                            outcome.batch_sizes,
                            outcome.summary.succeeded,
                            outcome.summary.failed
                        );
                        total.merge(&outcome.summary);
                    }
                    if !repeat || shutdown_handle.is_shutdown() {
                        break;
                    }
                }
                total
            })
        }
        LoadPlan::Weighted { catalog, weights } => {
            let generator = ScenarioGenerator::new(catalog, weights, config.seed);
            match config.batches {
                Some(batches) => executor.block_on(run_batches(
                    &pool,
                    generator,
                    state.clone(),
                    &config,
                    batches,
                    &shutdown_handle,
                )),
                None => {
                    log::info!(
                        "Streaming batches of {} requests until the run is stopped",
                        config.batch_size
                    );
                    let queue = Arc::new(ScenarioQueue::from_stream(generator.into_stream(
                        state.clone(),
                        config.batch_size,
                        config.batch_pause,
                    )));
                    executor.block_on(pool.run(queue, config.concurrency))
                }
            }
        }
    };

    log::info!(
        "Load finished: {} requests dispatched, {} rate limited, {} cooldowns",
        pool_summary.dispatched,
        pool_summary.rate_limited,
        pool_summary.cooldowns
    );

    // Stops the progress, monitor and snapshot tasks if the load ended on its own
    shutdown_handle.shutdown();

    let mut summary = RunSummary::new(
        run_id,
        definition.name,
        started_at,
        config.run_config(),
        env!("CARGO_PKG_VERSION").to_string(),
    );
    for (key, value) in std::env::vars() {
        if key.starts_with(ENV_PREFIX) && !key.ends_with("AUTH_TOKEN") {
            summary.add_env(key, value);
        }
    }

    let mut summary = runner_context.collector().finalize(summary);
    summary.duration_ms = run_start.elapsed().as_millis() as u64;
    summary.set_pattern_report(runner_context.analyzer().report());

    reporter.finalize(&summary);

    Ok(summary)
}

/// Run a fixed number of weighted batches, each one drained by the full pool.
async fn run_batches<S: DiscoveredState>(
    pool: &WorkerPool,
    mut generator: ScenarioGenerator<S>,
    state: Arc<S>,
    config: &EngineConfig,
    batches: usize,
    shutdown_handle: &ShutdownHandle,
) -> PoolSummary {
    let mut total = PoolSummary::default();
    for i in 0..batches {
        if shutdown_handle.is_shutdown() {
            break;
        }
        if i > 0 && !config.batch_pause.is_zero() {
            let mut listener = shutdown_handle.new_listener();
            tokio::select! {
                _ = tokio::time::sleep(config.batch_pause) => {},
                _ = listener.wait_for_shutdown() => break,
            }
        }

        let batch = generator.batch(&state, config.batch_size);
        if batch.is_empty() {
            log::warn!("No requests could be generated from the discovered state, stopping");
            break;
        }

        log::debug!("Running batch {} of {} with {} requests", i + 1, batches, batch.len());
        let queue = Arc::new(ScenarioQueue::from_descriptors(batch));
        let summary = pool.run(queue, config.concurrency).await;
        total.merge(&summary);
    }
    total
}

fn start_snapshots(
    executor: &Executor,
    collector: Arc<MetricCollector>,
    interval: Duration,
    shutdown_handle: ShutdownHandle,
) {
    let mut listener = shutdown_handle.new_listener();
    executor.spawn(async move {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    let snapshot = collector.snapshot();
                    log::info!(
                        "{} requests, {} failed, {} rate limit hits in window",
                        snapshot.requests.total,
                        snapshot.requests.failed,
                        snapshot.rate_limit_hits_in_window
                    );
                }
                _ = listener.wait_for_shutdown() => break,
            }
        }
    });
}

fn report_config(cli: &ChainTunnelCli) -> ReportConfig {
    match cli.reporter {
        ReporterOpt::Table => ReportConfig::default().enable_table(),
        ReporterOpt::Jsonl => ReportConfig::default().enable_jsonl(cli.summary_path.clone()),
        ReporterOpt::Noop => ReportConfig::default(),
    }
}
