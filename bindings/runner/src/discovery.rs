use std::collections::BTreeMap;

use async_trait::async_trait;
use chain_tunnel_runner::prelude::{
    ChainTunnelCli, DiscoveryFailure, DiscoveryRunner, DiscoveryStage, RequestDescriptor,
    Requester,
};
use futures::future::{join, join_all};
use serde_json::Value;

use crate::extract::{CosmosExtractor, EvmExtractor, Extracted, TransactionExtractor};
use crate::requests::{self, method, rpc_result};
use crate::state::{
    parse_hex_u64, parse_u64, BlockSummary, ChainState, Dialect, DiscoveredTransaction,
};

pub const DEFAULT_BLOCK_WINDOW: usize = 10;
const DEFAULT_MAX_CODES: usize = 10;
const DEFAULT_MAX_CANDIDATES: usize = 20;

/// The discovery pipeline for a chain exposing the Cosmos REST API, an EVM JSON-RPC API or both.
pub fn chain_discovery(cli: &ChainTunnelCli) -> DiscoveryRunner<ChainState> {
    DiscoveryRunner::new()
        .with_stage(ChainInfoStage)
        .with_stage(BlockWindowStage::new(cli.block_window))
        .with_stage(TransactionAnalysisStage::default())
        .with_stage(ContractDiscoveryStage::default())
}

async fn fetch_json(
    stage: &str,
    requester: &dyn Requester,
    descriptor: &RequestDescriptor,
) -> Result<Value, DiscoveryFailure> {
    let response = requester
        .send(descriptor)
        .await
        .map_err(|e| DiscoveryFailure::from_request(stage, &e))?;

    response.json().map_err(|e| {
        DiscoveryFailure::new(
            stage,
            format!("invalid JSON from [{}]: {}", descriptor.method(), e),
        )
    })
}

async fn fetch_rpc(
    stage: &str,
    requester: &dyn Requester,
    descriptor: &RequestDescriptor,
) -> Result<Value, DiscoveryFailure> {
    let body = fetch_json(stage, requester, descriptor).await?;
    rpc_result(&body).cloned().map_err(|message| {
        DiscoveryFailure::new(
            stage,
            format!("[{}] returned an error: {}", descriptor.method(), message),
        )
    })
}

/// Tracks per request outcomes for stages that query both dialects, failing the stage only when
/// nothing worked.
#[derive(Default)]
struct Attempts {
    succeeded: usize,
    failures: Vec<DiscoveryFailure>,
}

impl Attempts {
    fn record<T>(&mut self, result: Result<T, DiscoveryFailure>) -> Option<T> {
        match result {
            Ok(value) => {
                self.succeeded += 1;
                Some(value)
            }
            Err(e) => {
                log::debug!("{}", e);
                self.failures.push(e);
                None
            }
        }
    }

    fn finish(mut self, found: ChainState) -> Result<ChainState, DiscoveryFailure> {
        if self.succeeded == 0 && !self.failures.is_empty() {
            return Err(self.failures.swap_remove(0));
        }
        Ok(found)
    }
}

/// Latest height and network identity of each dialect the node serves.
#[derive(Debug, Default)]
pub struct ChainInfoStage;

#[async_trait]
impl DiscoveryStage<ChainState> for ChainInfoStage {
    fn name(&self) -> &str {
        "chain_info"
    }

    async fn discover(
        &self,
        _: &ChainState,
        requester: &dyn Requester,
    ) -> Result<ChainState, DiscoveryFailure> {
        let mut found = ChainState::default();
        let mut attempts = Attempts::default();

        let latest = requests::rest(method::LATEST_BLOCK, requests::latest_block());
        if let Some(body) = attempts.record(fetch_json(self.name(), requester, &latest).await) {
            // Newer SDKs also return `sdk_block`, the header is the same in both.
            let header = body
                .pointer("/block/header")
                .or_else(|| body.pointer("/sdk_block/header"));
            found.latest_height = header.and_then(|h| h.get("height")).and_then(parse_u64);
            found.network_id = header
                .and_then(|h| h.get("chain_id"))
                .and_then(Value::as_str)
                .map(str::to_string);
        }

        let block_number = requests::rpc(method::ETH_BLOCK_NUMBER, requests::eth_block_number());
        if let Some(result) =
            attempts.record(fetch_rpc(self.name(), requester, &block_number).await)
        {
            found.evm.latest_block = result.as_str().and_then(parse_hex_u64);

            let chain_id = requests::rpc(method::ETH_CHAIN_ID, requests::eth_chain_id());
            if let Some(result) =
                attempts.record(fetch_rpc(self.name(), requester, &chain_id).await)
            {
                found.evm.chain_id = result.as_str().and_then(parse_hex_u64);
            }
        }

        let found = attempts.finish(found)?;
        if found.is_empty() {
            return Err(DiscoveryFailure::new(
                self.name(),
                "no latest block reported by either API",
            ));
        }

        log::info!(
            "Chain [{}] at height {:?}, EVM chain id {:?} at block {:?}",
            found.network_id.as_deref().unwrap_or("unknown"),
            found.latest_height,
            found.evm.chain_id,
            found.evm.latest_block,
        );

        Ok(found)
    }
}

/// Fetches the most recent blocks that are not known yet, with their transactions.
#[derive(Debug)]
pub struct BlockWindowStage {
    window: usize,
}

impl BlockWindowStage {
    pub fn new(window: usize) -> Self {
        Self { window }
    }
}

impl Default for BlockWindowStage {
    fn default() -> Self {
        Self::new(DEFAULT_BLOCK_WINDOW)
    }
}

/// The `window` highest heights at or below `latest` that are not in `known`.
fn unknown_heights(latest: u64, known: &BTreeMap<u64, BlockSummary>, window: usize) -> Vec<u64> {
    (1..=latest)
        .rev()
        .filter(|h| !known.contains_key(h))
        .take(window)
        .collect()
}

type FetchedBlock = (BlockSummary, Vec<Value>);

async fn fetch_cosmos_block(
    stage: &str,
    requester: &dyn Requester,
    height: u64,
) -> Result<FetchedBlock, DiscoveryFailure> {
    let descriptor = requests::rest(method::TXS_BY_BLOCK, requests::txs_by_block(height));
    let body = fetch_json(stage, requester, &descriptor).await?;

    let txs = body
        .get("txs")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let summary = BlockSummary {
        height,
        hash: body
            .pointer("/block_id/hash")
            .and_then(Value::as_str)
            .map(str::to_string),
        time: body
            .pointer("/block/header/time")
            .and_then(Value::as_str)
            .map(str::to_string),
        tx_count: txs.len(),
    };

    Ok((summary, txs))
}

async fn fetch_evm_block(
    stage: &str,
    requester: &dyn Requester,
    number: u64,
) -> Result<FetchedBlock, DiscoveryFailure> {
    let descriptor = requests::rpc(
        method::ETH_GET_BLOCK_BY_NUMBER,
        requests::eth_get_block_by_number(number, true),
    );
    let block = fetch_rpc(stage, requester, &descriptor).await?;
    if block.is_null() {
        return Err(DiscoveryFailure::new(stage, format!("EVM block {number} not found")));
    }

    // Only full transaction objects can be analysed, hashes are skipped.
    let txs = block
        .get("transactions")
        .and_then(Value::as_array)
        .map(|txs| txs.iter().filter(|tx| tx.is_object()).cloned().collect::<Vec<_>>())
        .unwrap_or_default();
    let summary = BlockSummary {
        height: number,
        hash: block.get("hash").and_then(Value::as_str).map(str::to_string),
        time: block
            .get("timestamp")
            .and_then(Value::as_str)
            .and_then(parse_hex_u64)
            .map(|t| t.to_string()),
        tx_count: txs.len(),
    };

    Ok((summary, txs))
}

#[async_trait]
impl DiscoveryStage<ChainState> for BlockWindowStage {
    fn name(&self) -> &str {
        "block_window"
    }

    async fn discover(
        &self,
        state: &ChainState,
        requester: &dyn Requester,
    ) -> Result<ChainState, DiscoveryFailure> {
        if state.is_empty() {
            return Err(DiscoveryFailure::new(self.name(), "no latest height known"));
        }

        let cosmos_heights = state
            .latest_height
            .map(|latest| unknown_heights(latest, &state.blocks, self.window))
            .unwrap_or_default();
        let evm_numbers = state
            .evm
            .latest_block
            .map(|latest| unknown_heights(latest, &state.evm.blocks, self.window))
            .unwrap_or_default();

        let (cosmos, evm) = join(
            join_all(
                cosmos_heights
                    .iter()
                    .map(|h| fetch_cosmos_block(self.name(), requester, *h)),
            ),
            join_all(
                evm_numbers
                    .iter()
                    .map(|n| fetch_evm_block(self.name(), requester, *n)),
            ),
        )
        .await;

        let mut found = ChainState::default();
        let mut attempts = Attempts::default();

        for result in cosmos {
            if let Some((summary, txs)) = attempts.record(result) {
                found.blocks.insert(summary.height, summary);
                found
                    .transactions
                    .extend(txs.into_iter().map(|body| DiscoveredTransaction {
                        dialect: Dialect::Cosmos,
                        body,
                    }));
            }
        }
        for result in evm {
            if let Some((summary, txs)) = attempts.record(result) {
                found.evm.blocks.insert(summary.height, summary);
                found
                    .transactions
                    .extend(txs.into_iter().map(|body| DiscoveredTransaction {
                        dialect: Dialect::Evm,
                        body,
                    }));
            }
        }

        log::info!(
            "Fetched {} blocks and {} EVM blocks holding {} transactions",
            found.blocks.len(),
            found.evm.blocks.len(),
            found.transactions.len()
        );

        attempts.finish(found)
    }
}

/// Decodes the transactions found in the block window with one extractor per dialect.
pub struct TransactionAnalysisStage {
    extractors: Vec<Box<dyn TransactionExtractor>>,
}

impl TransactionAnalysisStage {
    /// A stage with no extractors, every transaction is ignored until one is added.
    pub fn empty() -> Self {
        Self {
            extractors: Vec::new(),
        }
    }

    pub fn with_extractor(mut self, extractor: impl TransactionExtractor + 'static) -> Self {
        self.extractors.push(Box::new(extractor));
        self
    }
}

impl Default for TransactionAnalysisStage {
    fn default() -> Self {
        Self::empty()
            .with_extractor(CosmosExtractor)
            .with_extractor(EvmExtractor)
    }
}

impl std::fmt::Debug for TransactionAnalysisStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionAnalysisStage")
            .field(
                "dialects",
                &self.extractors.iter().map(|e| e.dialect()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[async_trait]
impl DiscoveryStage<ChainState> for TransactionAnalysisStage {
    fn name(&self) -> &str {
        "transaction_analysis"
    }

    async fn discover(
        &self,
        state: &ChainState,
        _: &dyn Requester,
    ) -> Result<ChainState, DiscoveryFailure> {
        let mut found = ChainState::default();

        for extractor in &self.extractors {
            let mut extracted = Extracted::default();
            for tx in state.transactions_for(extractor.dialect()) {
                extracted.merge(extractor.extract(tx));
            }

            match extractor.dialect() {
                Dialect::Cosmos => {
                    found.accounts.extend(extracted.accounts);
                    found.contracts.extend(extracted.contracts);
                    found.tokens.extend(extracted.tokens);
                }
                Dialect::Evm => {
                    found.evm.accounts.extend(extracted.accounts);
                    found.evm.tokens.extend(extracted.tokens);
                    found.evm.contract_candidates.extend(
                        extracted
                            .contract_candidates
                            .into_iter()
                            .filter(|c| !state.evm.contracts.contains(c)),
                    );
                }
            }
        }

        log::info!(
            "Found {} accounts, {} contracts and {} tokens, {} EVM accounts and {} EVM contract candidates",
            found.accounts.len(),
            found.contracts.len(),
            found.tokens.len(),
            found.evm.accounts.len(),
            found.evm.contract_candidates.len(),
        );

        Ok(found)
    }
}

/// Lists CosmWasm contracts by code id and confirms EVM contract candidates by their code.
#[derive(Debug)]
pub struct ContractDiscoveryStage {
    max_codes: usize,
    max_candidates: usize,
}

impl ContractDiscoveryStage {
    pub fn new(max_codes: usize, max_candidates: usize) -> Self {
        Self {
            max_codes,
            max_candidates,
        }
    }
}

impl Default for ContractDiscoveryStage {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CODES, DEFAULT_MAX_CANDIDATES)
    }
}

async fn fetch_code_contracts(
    stage: &str,
    requester: &dyn Requester,
    code_id: u64,
) -> Result<Vec<String>, DiscoveryFailure> {
    let descriptor = requests::rest(
        method::WASM_CODE_CONTRACTS,
        requests::wasm_code_contracts(code_id),
    );
    let body = fetch_json(stage, requester, &descriptor).await?;

    Ok(body
        .get("contracts")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect())
}

/// `Some(address)` when the address holds code.
async fn confirm_contract(
    stage: &str,
    requester: &dyn Requester,
    address: &str,
) -> Result<Option<String>, DiscoveryFailure> {
    let descriptor = requests::rpc(method::ETH_GET_CODE, requests::eth_get_code(address));
    let code = fetch_rpc(stage, requester, &descriptor).await?;

    Ok(code
        .as_str()
        .filter(|code| code.len() > 2)
        .map(|_| address.to_string()))
}

#[async_trait]
impl DiscoveryStage<ChainState> for ContractDiscoveryStage {
    fn name(&self) -> &str {
        "contract_discovery"
    }

    async fn discover(
        &self,
        state: &ChainState,
        requester: &dyn Requester,
    ) -> Result<ChainState, DiscoveryFailure> {
        let mut found = ChainState::default();
        let mut attempts = Attempts::default();

        if state.latest_height.is_some() {
            let codes = requests::rest(method::WASM_CODES, requests::wasm_codes());
            if let Some(body) = attempts.record(fetch_json(self.name(), requester, &codes).await)
            {
                let code_ids = body
                    .get("code_infos")
                    .and_then(Value::as_array)
                    .into_iter()
                    .flatten()
                    .filter_map(|info| info.get("code_id").and_then(parse_u64))
                    .filter(|id| !state.code_ids.contains(id))
                    .collect::<Vec<_>>();

                // Most recent uploads first
                let code_ids = code_ids
                    .into_iter()
                    .rev()
                    .take(self.max_codes)
                    .collect::<Vec<_>>();

                let contracts = join_all(
                    code_ids
                        .iter()
                        .map(|id| fetch_code_contracts(self.name(), requester, *id)),
                )
                .await;

                found.code_ids.extend(code_ids);
                for result in contracts {
                    if let Some(contracts) = attempts.record(result) {
                        found.contracts.extend(contracts);
                    }
                }
            }
        }

        let candidates = state
            .evm
            .contract_candidates
            .iter()
            .filter(|c| !state.evm.contracts.contains(*c))
            .take(self.max_candidates)
            .collect::<Vec<_>>();
        let confirmed = join_all(
            candidates
                .iter()
                .map(|c| confirm_contract(self.name(), requester, c)),
        )
        .await;
        for result in confirmed {
            if let Some(Some(contract)) = attempts.record(result) {
                found.evm.contracts.insert(contract);
            }
        }

        log::info!(
            "Found {} contracts across {} code ids and confirmed {} of {} EVM contract candidates",
            found.contracts.len(),
            found.code_ids.len(),
            found.evm.contracts.len(),
            candidates.len(),
        );

        attempts.finish(found)
    }
}
