//! Targets for the chain query APIs, shared by discovery and load generation.

use chain_tunnel_runner::prelude::{RequestDescriptor, RequestTarget, Transport};
use serde_json::{json, Value};

use crate::state::to_hex;

/// ERC-20 `totalSupply()`.
pub const ERC20_TOTAL_SUPPLY_SELECTOR: &str = "0x18160ddd";
/// ERC-20 `balanceOf(address)`.
pub const ERC20_BALANCE_OF_SELECTOR: &str = "0x70a08231";

/// Logical method names that metrics and response patterns are grouped by.
pub mod method {
    pub const NODE_INFO: &str = "node_info";
    pub const LATEST_BLOCK: &str = "latest_block";
    pub const BLOCK_BY_HEIGHT: &str = "block_by_height";
    pub const TXS_BY_BLOCK: &str = "txs_by_block";
    pub const BALANCES: &str = "balances";
    pub const ACCOUNT: &str = "account";
    pub const SUPPLY_BY_DENOM: &str = "supply_by_denom";
    pub const DELEGATIONS: &str = "delegations";
    pub const WASM_CODES: &str = "wasm_codes";
    pub const WASM_CODE_CONTRACTS: &str = "wasm_code_contracts";
    pub const WASM_CONTRACT_INFO: &str = "wasm_contract_info";
    pub const WASM_CONTRACT_STATE: &str = "wasm_contract_state";

    pub const ETH_BLOCK_NUMBER: &str = "eth_blockNumber";
    pub const ETH_CHAIN_ID: &str = "eth_chainId";
    pub const ETH_GAS_PRICE: &str = "eth_gasPrice";
    pub const ETH_GET_BLOCK_BY_NUMBER: &str = "eth_getBlockByNumber";
    pub const ETH_GET_BALANCE: &str = "eth_getBalance";
    pub const ETH_GET_TRANSACTION_COUNT: &str = "eth_getTransactionCount";
    pub const ETH_GET_CODE: &str = "eth_getCode";
    pub const ETH_GET_LOGS: &str = "eth_getLogs";
    pub const ERC20_TOTAL_SUPPLY: &str = "erc20_total_supply";
    pub const ERC20_BALANCE_OF: &str = "erc20_balance_of";
    pub const CONTRACT_CALL: &str = "contract_call";
}

const ETH_CALL: &str = "eth_call";

pub fn node_info() -> RequestTarget {
    RequestTarget::path("/cosmos/base/tendermint/v1beta1/node_info")
}

pub fn latest_block() -> RequestTarget {
    RequestTarget::path("/cosmos/base/tendermint/v1beta1/blocks/latest")
}

pub fn block_by_height(height: u64) -> RequestTarget {
    RequestTarget::path(format!("/cosmos/base/tendermint/v1beta1/blocks/{height}"))
}

pub fn txs_by_block(height: u64) -> RequestTarget {
    RequestTarget::path(format!("/cosmos/tx/v1beta1/txs/block/{height}"))
}

pub fn balances(address: &str) -> RequestTarget {
    RequestTarget::new(
        format!("/cosmos/bank/v1beta1/balances/{address}"),
        json!({"pagination.limit": 10}),
    )
}

pub fn account(address: &str) -> RequestTarget {
    RequestTarget::path(format!("/cosmos/auth/v1beta1/accounts/{address}"))
}

/// Denoms may contain `/` (IBC denoms), so they go in the query rather than the path.
pub fn supply_by_denom(denom: &str) -> RequestTarget {
    RequestTarget::new(
        "/cosmos/bank/v1beta1/supply/by_denom",
        json!({"denom": denom}),
    )
}

pub fn delegations(address: &str) -> RequestTarget {
    RequestTarget::path(format!("/cosmos/staking/v1beta1/delegations/{address}"))
}

pub fn wasm_codes() -> RequestTarget {
    RequestTarget::path("/cosmwasm/wasm/v1/code")
}

pub fn wasm_code_contracts(code_id: u64) -> RequestTarget {
    RequestTarget::path(format!("/cosmwasm/wasm/v1/code/{code_id}/contracts"))
}

pub fn wasm_contract_info(contract: &str) -> RequestTarget {
    RequestTarget::path(format!("/cosmwasm/wasm/v1/contract/{contract}"))
}

pub fn wasm_contract_state(contract: &str) -> RequestTarget {
    RequestTarget::new(
        format!("/cosmwasm/wasm/v1/contract/{contract}/state"),
        json!({"pagination.limit": 10}),
    )
}

pub fn eth_block_number() -> RequestTarget {
    RequestTarget::new(method::ETH_BLOCK_NUMBER, json!([]))
}

pub fn eth_chain_id() -> RequestTarget {
    RequestTarget::new(method::ETH_CHAIN_ID, json!([]))
}

pub fn eth_gas_price() -> RequestTarget {
    RequestTarget::new(method::ETH_GAS_PRICE, json!([]))
}

pub fn eth_get_block_by_number(number: u64, full_transactions: bool) -> RequestTarget {
    RequestTarget::new(
        method::ETH_GET_BLOCK_BY_NUMBER,
        json!([to_hex(number), full_transactions]),
    )
}

pub fn eth_get_balance(address: &str) -> RequestTarget {
    RequestTarget::new(method::ETH_GET_BALANCE, json!([address, "latest"]))
}

pub fn eth_get_transaction_count(address: &str) -> RequestTarget {
    RequestTarget::new(method::ETH_GET_TRANSACTION_COUNT, json!([address, "latest"]))
}

pub fn eth_get_code(address: &str) -> RequestTarget {
    RequestTarget::new(method::ETH_GET_CODE, json!([address, "latest"]))
}

pub fn eth_get_logs(from_block: u64, to_block: u64) -> RequestTarget {
    RequestTarget::new(
        method::ETH_GET_LOGS,
        json!([{"fromBlock": to_hex(from_block), "toBlock": to_hex(to_block)}]),
    )
}

pub fn erc20_total_supply(token: &str) -> RequestTarget {
    eth_call(token, ERC20_TOTAL_SUPPLY_SELECTOR.to_string())
}

pub fn erc20_balance_of(token: &str, holder: &str) -> RequestTarget {
    let holder = holder.trim_start_matches("0x");
    eth_call(token, format!("{ERC20_BALANCE_OF_SELECTOR}{holder:0>64}"))
}

/// A read-only call to `contract` made as `from`, the way a wallet would query it.
pub fn contract_call_from(contract: &str, from: &str) -> RequestTarget {
    RequestTarget::new(
        ETH_CALL,
        json!([{"from": from, "to": contract, "data": ERC20_TOTAL_SUPPLY_SELECTOR}, "latest"]),
    )
}

fn eth_call(to: &str, data: String) -> RequestTarget {
    RequestTarget::new(ETH_CALL, json!([{"to": to, "data": data}, "latest"]))
}

pub fn rest(method: &str, target: RequestTarget) -> RequestDescriptor {
    RequestDescriptor::new(method, Transport::RestGet, target.target, target.params)
}

pub fn rpc(method: &str, target: RequestTarget) -> RequestDescriptor {
    RequestDescriptor::new(method, Transport::JsonRpc, target.target, target.params)
}

/// The `result` of a JSON-RPC response body, or the message of its `error` object.
pub fn rpc_result(body: &Value) -> Result<&Value, String> {
    if let Some(error) = body.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Err(message);
    }

    body.get("result")
        .ok_or_else(|| "response has neither a result nor an error".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn logical_method_differs_from_rpc_method() {
        let descriptor = rpc(method::ERC20_TOTAL_SUPPLY, erc20_total_supply("0xtoken"));

        assert_eq!("erc20_total_supply", descriptor.method());
        assert_eq!("eth_call", descriptor.target());
        assert_eq!(
            &json!([{"to": "0xtoken", "data": "0x18160ddd"}, "latest"]),
            descriptor.params()
        );
    }

    #[test]
    fn balance_of_pads_holder() {
        let target = erc20_balance_of("0xtoken", "0xabc");
        let data = target.params[0]["data"].as_str().unwrap();

        assert_eq!(10 + 64, data.len());
        assert!(data.starts_with("0x70a08231000"));
        assert!(data.ends_with("abc"));
    }

    #[test]
    fn contract_call_carries_the_caller() {
        let descriptor = rpc(method::CONTRACT_CALL, contract_call_from("0xc", "0xa"));

        assert_eq!("eth_call", descriptor.target());
        assert_eq!(
            &json!([{"from": "0xa", "to": "0xc", "data": "0x18160ddd"}, "latest"]),
            descriptor.params()
        );
    }

    #[test]
    fn block_numbers_are_hex() {
        assert_eq!(
            json!(["0x64", true]),
            eth_get_block_by_number(100, true).params
        );
        assert_eq!(
            json!([{"fromBlock": "0x60", "toBlock": "0x64"}]),
            eth_get_logs(96, 100).params
        );
    }

    #[test]
    fn rpc_result_and_error() {
        assert_eq!(
            Ok(&json!("0x10")),
            rpc_result(&json!({"jsonrpc": "2.0", "id": 1, "result": "0x10"}))
        );
        assert_eq!(
            Err("method not found".to_string()),
            rpc_result(&json!({"error": {"code": -32601, "message": "method not found"}}))
        );
        assert!(rpc_result(&json!({})).is_err());
    }
}
