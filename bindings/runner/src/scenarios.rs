use chain_tunnel_runner::prelude::{RequestDescriptor, Scenario};

use crate::requests::{self, method, rest, rpc};
use crate::state::ChainState;

/// Identifiers of each kind that a scenario draws on. Keeps scenario sizes bounded on busy chains.
const MAX_ITEMS: usize = 20;

/// ERC-20 holders queried per token.
const MAX_HOLDERS: usize = 5;

/// Scenario sets in increasing weight, each one going deeper into the discovered state.
///
/// Sets that the state cannot fill come back empty and are skipped by the pool.
pub fn progressive_scenarios(state: &ChainState) -> Vec<Scenario> {
    let basic = basic(state);
    let per_block = per_block(state);
    let per_account = per_account(state);
    let per_token = per_token(state);
    let per_contract = per_contract(state);
    let earlier = interleave(
        &[&basic, &per_block, &per_account, &per_token, &per_contract],
        MAX_ITEMS * 2,
    );
    let mixed = interleave(&[&contracts_with_accounts(state), &earlier], MAX_ITEMS * 4);

    vec![
        Scenario::new("basic", 1.0, basic),
        Scenario::new("per_block", 1.25, per_block),
        Scenario::new("per_account", 1.5, per_account),
        Scenario::new("per_token", 1.75, per_token),
        Scenario::new("per_contract", 2.0, per_contract),
        Scenario::new("mixed", 2.5, mixed),
    ]
}

fn basic(state: &ChainState) -> Vec<RequestDescriptor> {
    let mut requests = Vec::new();

    if state.latest_height.is_some() {
        requests.push(rest(method::NODE_INFO, requests::node_info()));
        requests.push(rest(method::LATEST_BLOCK, requests::latest_block()));
    }
    if state.evm.latest_block.is_some() {
        requests.push(rpc(method::ETH_BLOCK_NUMBER, requests::eth_block_number()));
        requests.push(rpc(method::ETH_CHAIN_ID, requests::eth_chain_id()));
        requests.push(rpc(method::ETH_GAS_PRICE, requests::eth_gas_price()));
    }

    requests
}

fn per_block(state: &ChainState) -> Vec<RequestDescriptor> {
    let mut requests = Vec::new();

    for height in state.blocks.keys().rev().take(MAX_ITEMS) {
        requests.push(rest(method::BLOCK_BY_HEIGHT, requests::block_by_height(*height)));
        requests.push(rest(method::TXS_BY_BLOCK, requests::txs_by_block(*height)));
    }
    for number in state.evm.blocks.keys().rev().take(MAX_ITEMS) {
        requests.push(rpc(
            method::ETH_GET_BLOCK_BY_NUMBER,
            requests::eth_get_block_by_number(*number, false),
        ));
    }
    if let Some(latest) = state.evm.latest_block {
        requests.push(rpc(
            method::ETH_GET_LOGS,
            requests::eth_get_logs(latest.saturating_sub(4), latest),
        ));
    }

    requests
}

fn per_account(state: &ChainState) -> Vec<RequestDescriptor> {
    let mut requests = Vec::new();

    for address in state.accounts.iter().take(MAX_ITEMS) {
        requests.push(rest(method::BALANCES, requests::balances(address)));
        requests.push(rest(method::ACCOUNT, requests::account(address)));
        requests.push(rest(method::DELEGATIONS, requests::delegations(address)));
    }
    for address in state.evm.accounts.iter().take(MAX_ITEMS) {
        requests.push(rpc(method::ETH_GET_BALANCE, requests::eth_get_balance(address)));
        requests.push(rpc(
            method::ETH_GET_TRANSACTION_COUNT,
            requests::eth_get_transaction_count(address),
        ));
    }

    requests
}

fn per_token(state: &ChainState) -> Vec<RequestDescriptor> {
    let mut requests = Vec::new();

    for denom in state.tokens.iter().take(MAX_ITEMS) {
        requests.push(rest(method::SUPPLY_BY_DENOM, requests::supply_by_denom(denom)));
    }
    for token in state.evm.tokens.iter().take(MAX_ITEMS) {
        requests.push(rpc(
            method::ERC20_TOTAL_SUPPLY,
            requests::erc20_total_supply(token),
        ));
        for holder in state.evm.accounts.iter().take(MAX_HOLDERS) {
            requests.push(rpc(
                method::ERC20_BALANCE_OF,
                requests::erc20_balance_of(token, holder),
            ));
        }
    }

    requests
}

fn per_contract(state: &ChainState) -> Vec<RequestDescriptor> {
    let mut requests = Vec::new();

    for contract in state.contracts.iter().take(MAX_ITEMS) {
        requests.push(rest(
            method::WASM_CONTRACT_INFO,
            requests::wasm_contract_info(contract),
        ));
        requests.push(rest(
            method::WASM_CONTRACT_STATE,
            requests::wasm_contract_state(contract),
        ));
    }
    for contract in state.evm.contracts.iter().take(MAX_ITEMS) {
        requests.push(rpc(method::ETH_GET_CODE, requests::eth_get_code(contract)));
    }

    requests
}

/// EVM contracts and tokens queried on behalf of discovered EVM accounts.
fn contracts_with_accounts(state: &ChainState) -> Vec<RequestDescriptor> {
    let mut requests = Vec::new();

    let contracts = state
        .evm
        .contracts
        .union(&state.evm.tokens)
        .take(MAX_ITEMS);
    for contract in contracts {
        for account in state.evm.accounts.iter().take(MAX_HOLDERS) {
            requests.push(rpc(
                method::ERC20_BALANCE_OF,
                requests::erc20_balance_of(contract, account),
            ));
            requests.push(rpc(
                method::CONTRACT_CALL,
                requests::contract_call_from(contract, account),
            ));
        }
    }

    requests
}

/// Round robin over the given sets, so every kind of query is in flight at once.
fn interleave(sets: &[&Vec<RequestDescriptor>], limit: usize) -> Vec<RequestDescriptor> {
    let longest = sets.iter().map(|s| s.len()).max().unwrap_or_default();

    (0..longest)
        .flat_map(|i| sets.iter().filter_map(move |s| s.get(i)))
        .take(limit)
        .cloned()
        .collect()
}
