use chain_api_runner::prelude::*;

fn setup(ctx: &RunnerContext, state: &ChainState) -> HookResult {
    if state.is_empty() {
        anyhow::bail!(
            "Nothing could be discovered from {}, check the endpoints",
            ctx.config().base_endpoint
        );
    }

    log::info!(
        "Loading with {} blocks, {} accounts, {} contracts and {} tokens, plus {} EVM accounts and {} EVM contracts",
        state.blocks.len() + state.evm.blocks.len(),
        state.accounts.len(),
        state.contracts.len(),
        state.tokens.len(),
        state.evm.accounts.len(),
        state.evm.contracts.len(),
    );

    Ok(())
}

fn main() -> ChainTunnelResult<()> {
    let builder = LoadTestDefinitionBuilder::<ChainState>::new(env!("CARGO_PKG_NAME"))
        .use_requester(http_requester)
        .use_discovery(chain_discovery)
        .use_setup(setup)
        .use_scenario_sets(progressive_scenarios);

    let summary = run(builder)?;

    log::info!(
        "Run [{}] finished with {} requests at {}% errors",
        summary.run_id,
        summary.requests.total,
        summary.error_rate
    );

    Ok(())
}
