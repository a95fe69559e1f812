use std::collections::BTreeSet;

use serde_json::Value;

use crate::state::Dialect;

/// ERC-20 `transfer(address,uint256)`.
pub const ERC20_TRANSFER_SELECTOR: &str = "0xa9059cbb";

const COSMOS_ADDRESS_FIELDS: &[&str] = &[
    "from_address",
    "to_address",
    "sender",
    "receiver",
    "delegator_address",
    "granter",
    "grantee",
];

const COSMOS_COIN_FIELDS: &[&str] = &["amount", "funds", "token", "coins"];

/// Identifiers pulled out of one transaction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extracted {
    pub accounts: BTreeSet<String>,
    pub contracts: BTreeSet<String>,
    pub tokens: BTreeSet<String>,
    /// Addresses that were called with input data, so may be contracts.
    pub contract_candidates: BTreeSet<String>,
}

impl Extracted {
    pub fn merge(&mut self, other: Extracted) {
        self.accounts.extend(other.accounts);
        self.contracts.extend(other.contracts);
        self.tokens.extend(other.tokens);
        self.contract_candidates.extend(other.contract_candidates);
    }
}

/// Decodes transactions of one dialect into the accounts, contracts and tokens involved.
pub trait TransactionExtractor: Send + Sync {
    fn dialect(&self) -> Dialect;

    fn extract(&self, tx: &Value) -> Extracted;
}

/// Reads the messages of a Cosmos SDK transaction.
#[derive(Debug, Default)]
pub struct CosmosExtractor;

impl TransactionExtractor for CosmosExtractor {
    fn dialect(&self) -> Dialect {
        Dialect::Cosmos
    }

    fn extract(&self, tx: &Value) -> Extracted {
        let mut extracted = Extracted::default();

        let Some(messages) = tx.pointer("/body/messages").and_then(Value::as_array) else {
            return extracted;
        };

        for message in messages {
            for field in COSMOS_ADDRESS_FIELDS {
                if let Some(address) = message.get(*field).and_then(Value::as_str) {
                    extracted.accounts.insert(address.to_string());
                }
            }

            if let Some(contract) = message.get("contract").and_then(Value::as_str) {
                extracted.contracts.insert(contract.to_string());
            }

            for field in COSMOS_COIN_FIELDS {
                if let Some(coins) = message.get(*field) {
                    collect_denoms(coins, &mut extracted.tokens);
                }
            }

            // MsgMultiSend
            for side in ["inputs", "outputs"] {
                for entry in message.get(side).and_then(Value::as_array).into_iter().flatten() {
                    if let Some(address) = entry.get("address").and_then(Value::as_str) {
                        extracted.accounts.insert(address.to_string());
                    }
                    if let Some(coins) = entry.get("coins") {
                        collect_denoms(coins, &mut extracted.tokens);
                    }
                }
            }
        }

        extracted
    }
}

fn collect_denoms(coins: &Value, tokens: &mut BTreeSet<String>) {
    match coins {
        Value::Array(coins) => {
            for coin in coins {
                collect_denoms(coin, tokens);
            }
        }
        Value::Object(coin) => {
            if let Some(denom) = coin.get("denom").and_then(Value::as_str) {
                tokens.insert(denom.to_string());
            }
        }
        _ => {}
    }
}

/// Reads the sender, recipient and call data of an EVM transaction.
#[derive(Debug, Default)]
pub struct EvmExtractor;

impl TransactionExtractor for EvmExtractor {
    fn dialect(&self) -> Dialect {
        Dialect::Evm
    }

    fn extract(&self, tx: &Value) -> Extracted {
        let mut extracted = Extracted::default();

        if let Some(from) = tx.get("from").and_then(Value::as_str) {
            extracted.accounts.insert(from.to_lowercase());
        }

        // `to` is null for contract creation
        let Some(to) = tx.get("to").and_then(Value::as_str).map(str::to_lowercase) else {
            return extracted;
        };

        let input = tx
            .get("input")
            .or_else(|| tx.get("data"))
            .and_then(Value::as_str)
            .unwrap_or("0x");

        if input.len() <= 2 {
            extracted.accounts.insert(to);
            return extracted;
        }

        if input.starts_with(ERC20_TRANSFER_SELECTOR) {
            if let Some(recipient) = transfer_recipient(input) {
                extracted.accounts.insert(recipient);
            }
            extracted.tokens.insert(to.clone());
        }
        extracted.contract_candidates.insert(to);

        extracted
    }
}

/// The address argument of a `transfer` call, from its left padded 32 byte word.
fn transfer_recipient(input: &str) -> Option<String> {
    let word = input.get(10..74)?;
    let address = word.get(24..)?;
    if address.chars().all(|c| c.is_ascii_hexdigit()) {
        Some(format!("0x{}", address.to_lowercase()))
    } else {
        None
    }
}
