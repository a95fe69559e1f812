use crate::cli::ChainTunnelCli;
use clap::Parser;

/// Initialise the CLI and logging for the chain tunnel runner.
pub fn init() -> ChainTunnelCli {
    env_logger::init();

    ChainTunnelCli::parse()
}
