use std::collections::{BTreeMap, BTreeSet};

use chain_tunnel_runner::prelude::{DiscoveredState, Mergeable};
use serde_json::Value;

/// Which API surface a piece of discovered data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    Cosmos,
    Evm,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct BlockSummary {
    pub height: u64,
    pub hash: Option<String>,
    pub time: Option<String>,
    pub tx_count: usize,
}

/// A transaction fetched during block discovery, kept for the analysis stage.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredTransaction {
    pub dialect: Dialect,
    pub body: Value,
}

/// What is known about the EVM side of the chain.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EvmState {
    pub latest_block: Option<u64>,
    pub chain_id: Option<u64>,
    pub blocks: BTreeMap<u64, BlockSummary>,
    pub accounts: BTreeSet<String>,
    /// Confirmed to have code.
    pub contracts: BTreeSet<String>,
    /// ERC-20 contracts seen in `transfer` calls.
    pub tokens: BTreeSet<String>,
    /// Called with input data but not yet checked for code.
    pub contract_candidates: BTreeSet<String>,
}

/// Live chain state that requests are generated from.
///
/// Built up by the discovery stages and read only once load starts. Merging is write once: a
/// height, once known, is never replaced or fetched again during the run.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChainState {
    pub latest_height: Option<u64>,
    pub network_id: Option<String>,
    pub blocks: BTreeMap<u64, BlockSummary>,
    pub accounts: BTreeSet<String>,
    pub contracts: BTreeSet<String>,
    /// Coin denominations.
    pub tokens: BTreeSet<String>,
    pub code_ids: BTreeSet<u64>,
    pub transactions: Vec<DiscoveredTransaction>,
    pub evm: EvmState,
}

impl ChainState {
    /// Nothing has been discovered on either dialect.
    pub fn is_empty(&self) -> bool {
        self.latest_height.is_none() && self.evm.latest_block.is_none()
    }

    pub fn transactions_for(&self, dialect: Dialect) -> impl Iterator<Item = &Value> {
        self.transactions
            .iter()
            .filter(move |tx| tx.dialect == dialect)
            .map(|tx| &tx.body)
    }
}

impl Mergeable for ChainState {
    fn merge(&mut self, other: Self) {
        if self.latest_height.is_none() {
            self.latest_height = other.latest_height;
        }
        if self.network_id.is_none() {
            self.network_id = other.network_id;
        }
        merge_blocks(&mut self.blocks, other.blocks);
        self.accounts.extend(other.accounts);
        self.contracts.extend(other.contracts);
        self.tokens.extend(other.tokens);
        self.code_ids.extend(other.code_ids);
        self.transactions.extend(other.transactions);
        self.evm.merge(other.evm);
    }
}

impl Mergeable for EvmState {
    fn merge(&mut self, other: Self) {
        if self.latest_block.is_none() {
            self.latest_block = other.latest_block;
        }
        if self.chain_id.is_none() {
            self.chain_id = other.chain_id;
        }
        merge_blocks(&mut self.blocks, other.blocks);
        self.accounts.extend(other.accounts);
        self.contracts.extend(other.contracts);
        self.tokens.extend(other.tokens);
        self.contract_candidates.extend(other.contract_candidates);
    }
}

impl DiscoveredState for ChainState {}

fn merge_blocks(known: &mut BTreeMap<u64, BlockSummary>, found: BTreeMap<u64, BlockSummary>) {
    for (height, block) in found {
        known.entry(height).or_insert(block);
    }
}

/// Parse a `0x` prefixed quantity.
pub(crate) fn parse_hex_u64(value: &str) -> Option<u64> {
    u64::from_str_radix(value.strip_prefix("0x")?, 16).ok()
}

pub(crate) fn to_hex(value: u64) -> String {
    format!("{value:#x}")
}

/// Cosmos APIs return integers as strings, accept both.
pub(crate) fn parse_u64(value: &Value) -> Option<u64> {
    match value {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_u64(),
        _ => None,
    }
}
