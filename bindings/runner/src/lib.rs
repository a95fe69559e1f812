mod catalog;
mod discovery;
mod extract;
mod requester;
pub mod requests;
mod scenarios;
mod state;

pub mod prelude {
    pub use crate::catalog::default_catalog;
    pub use crate::discovery::{
        chain_discovery, BlockWindowStage, ChainInfoStage, ContractDiscoveryStage,
        TransactionAnalysisStage, DEFAULT_BLOCK_WINDOW,
    };
    pub use crate::extract::{
        CosmosExtractor, EvmExtractor, Extracted, TransactionExtractor, ERC20_TRANSFER_SELECTOR,
    };
    pub use crate::requester::http_requester;
    pub use crate::scenarios::progressive_scenarios;
    pub use crate::state::{BlockSummary, ChainState, Dialect, DiscoveredTransaction, EvmState};

    /// Request targets and logical method names for the chain query APIs.
    pub use crate::requests;

    /// Re-export of the `chain_tunnel_runner` prelude.
    ///
    /// This is for convenience so that you can depend on a single crate for the runner in your scenarios.
    pub use chain_tunnel_runner::prelude::*;

    /// Re-export of the HTTP client for convenience.
    pub use chain_api_client::prelude::*;
}
