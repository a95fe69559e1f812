use std::collections::BTreeSet;

use chain_tunnel_runner::prelude::{RequestCatalog, RequestTarget, Transport};
use rand::seq::IteratorRandom;
use rand::{Rng, RngCore};

use crate::requests::{self, method};
use crate::state::ChainState;

/// How far back `eth_getLogs` ranges reach from the latest block.
const LOG_RANGE: u64 = 4;

/// Every query the engine knows how to generate, weighted towards the cheap and common ones.
///
/// Each builder declines when the state it draws from was not discovered, for example when the
/// node serves only one of the two dialects.
pub fn default_catalog() -> RequestCatalog<ChainState> {
    RequestCatalog::new()
        .register(method::NODE_INFO, Transport::RestGet, 0.5, node_info)
        .register(method::LATEST_BLOCK, Transport::RestGet, 2.0, latest_block)
        .register(method::BLOCK_BY_HEIGHT, Transport::RestGet, 2.0, block_by_height)
        .register(method::TXS_BY_BLOCK, Transport::RestGet, 1.0, txs_by_block)
        .register(method::BALANCES, Transport::RestGet, 1.5, balances)
        .register(method::ACCOUNT, Transport::RestGet, 1.0, account)
        .register(method::SUPPLY_BY_DENOM, Transport::RestGet, 0.5, supply_by_denom)
        .register(method::DELEGATIONS, Transport::RestGet, 0.75, delegations)
        .register(
            method::WASM_CONTRACT_INFO,
            Transport::RestGet,
            0.75,
            wasm_contract_info,
        )
        .register(
            method::WASM_CONTRACT_STATE,
            Transport::RestGet,
            0.5,
            wasm_contract_state,
        )
        .register(method::ETH_BLOCK_NUMBER, Transport::JsonRpc, 2.0, eth_block_number)
        .register(method::ETH_CHAIN_ID, Transport::JsonRpc, 0.5, eth_chain_id)
        .register(method::ETH_GAS_PRICE, Transport::JsonRpc, 1.0, eth_gas_price)
        .register(
            method::ETH_GET_BLOCK_BY_NUMBER,
            Transport::JsonRpc,
            1.5,
            eth_get_block_by_number,
        )
        .register(method::ETH_GET_BALANCE, Transport::JsonRpc, 1.5, eth_get_balance)
        .register(
            method::ETH_GET_TRANSACTION_COUNT,
            Transport::JsonRpc,
            1.0,
            eth_get_transaction_count,
        )
        .register(method::ETH_GET_CODE, Transport::JsonRpc, 0.5, eth_get_code)
        .register(
            method::ERC20_TOTAL_SUPPLY,
            Transport::JsonRpc,
            0.5,
            erc20_total_supply,
        )
        .register(method::ETH_GET_LOGS, Transport::JsonRpc, 0.5, eth_get_logs)
}

fn pick<'a>(set: &'a BTreeSet<String>, rng: &mut dyn RngCore) -> Option<&'a str> {
    set.iter().choose(rng).map(String::as_str)
}

/// A known block if there are any, otherwise one of the few below the latest height.
fn pick_height(
    known: impl Iterator<Item = u64>,
    latest: Option<u64>,
    rng: &mut dyn RngCore,
) -> Option<u64> {
    if let Some(height) = known.choose(&mut *rng) {
        return Some(height);
    }
    let latest = latest?;
    Some(rng.gen_range(latest.saturating_sub(LOG_RANGE).max(1)..=latest.max(1)))
}

fn node_info(state: &ChainState, _: &mut dyn RngCore) -> Option<RequestTarget> {
    state.latest_height.map(|_| requests::node_info())
}

fn latest_block(state: &ChainState, _: &mut dyn RngCore) -> Option<RequestTarget> {
    state.latest_height.map(|_| requests::latest_block())
}

fn block_by_height(state: &ChainState, rng: &mut dyn RngCore) -> Option<RequestTarget> {
    pick_height(state.blocks.keys().copied(), state.latest_height, rng)
        .map(requests::block_by_height)
}

fn txs_by_block(state: &ChainState, rng: &mut dyn RngCore) -> Option<RequestTarget> {
    pick_height(state.blocks.keys().copied(), state.latest_height, rng)
        .map(requests::txs_by_block)
}

fn balances(state: &ChainState, rng: &mut dyn RngCore) -> Option<RequestTarget> {
    pick(&state.accounts, rng).map(requests::balances)
}

fn account(state: &ChainState, rng: &mut dyn RngCore) -> Option<RequestTarget> {
    pick(&state.accounts, rng).map(requests::account)
}

fn supply_by_denom(state: &ChainState, rng: &mut dyn RngCore) -> Option<RequestTarget> {
    pick(&state.tokens, rng).map(requests::supply_by_denom)
}

fn delegations(state: &ChainState, rng: &mut dyn RngCore) -> Option<RequestTarget> {
    pick(&state.accounts, rng).map(requests::delegations)
}

fn wasm_contract_info(state: &ChainState, rng: &mut dyn RngCore) -> Option<RequestTarget> {
    pick(&state.contracts, rng).map(requests::wasm_contract_info)
}

fn wasm_contract_state(state: &ChainState, rng: &mut dyn RngCore) -> Option<RequestTarget> {
    pick(&state.contracts, rng).map(requests::wasm_contract_state)
}

fn eth_block_number(state: &ChainState, _: &mut dyn RngCore) -> Option<RequestTarget> {
    state.evm.latest_block.map(|_| requests::eth_block_number())
}

fn eth_chain_id(state: &ChainState, _: &mut dyn RngCore) -> Option<RequestTarget> {
    state.evm.latest_block.map(|_| requests::eth_chain_id())
}

fn eth_gas_price(state: &ChainState, _: &mut dyn RngCore) -> Option<RequestTarget> {
    state.evm.latest_block.map(|_| requests::eth_gas_price())
}

fn eth_get_block_by_number(state: &ChainState, rng: &mut dyn RngCore) -> Option<RequestTarget> {
    pick_height(state.evm.blocks.keys().copied(), state.evm.latest_block, rng)
        .map(|n| requests::eth_get_block_by_number(n, false))
}

fn eth_get_balance(state: &ChainState, rng: &mut dyn RngCore) -> Option<RequestTarget> {
    pick(&state.evm.accounts, rng).map(requests::eth_get_balance)
}

fn eth_get_transaction_count(state: &ChainState, rng: &mut dyn RngCore) -> Option<RequestTarget> {
    pick(&state.evm.accounts, rng).map(requests::eth_get_transaction_count)
}

fn eth_get_code(state: &ChainState, rng: &mut dyn RngCore) -> Option<RequestTarget> {
    pick(&state.evm.contracts, rng).map(requests::eth_get_code)
}

fn erc20_total_supply(state: &ChainState, rng: &mut dyn RngCore) -> Option<RequestTarget> {
    pick(&state.evm.tokens, rng).map(requests::erc20_total_supply)
}

fn eth_get_logs(state: &ChainState, _: &mut dyn RngCore) -> Option<RequestTarget> {
    let latest = state.evm.latest_block?;
    Some(requests::eth_get_logs(
        latest.saturating_sub(LOG_RANGE),
        latest,
    ))
}
