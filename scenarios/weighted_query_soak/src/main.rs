use chain_api_runner::prelude::*;

fn setup(ctx: &RunnerContext, state: &ChainState) -> HookResult {
    if state.is_empty() {
        anyhow::bail!(
            "Nothing could be discovered from {}, check the endpoints",
            ctx.config().base_endpoint
        );
    }

    Ok(())
}

fn main() -> ChainTunnelResult<()> {
    let catalog = default_catalog();

    // Log range queries are the most expensive for archive nodes, keep them rare over long runs.
    let weights = catalog
        .weights()
        .with_weight(requests::method::ETH_GET_LOGS, 0.1);

    let builder = LoadTestDefinitionBuilder::<ChainState>::new(env!("CARGO_PKG_NAME"))
        .with_default_duration_s(300)
        .use_requester(http_requester)
        .use_discovery(chain_discovery)
        .use_setup(setup)
        .use_catalog(catalog)
        .use_weights(weights);

    run(builder)?;

    Ok(())
}
