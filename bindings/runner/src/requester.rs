use std::sync::Arc;

use chain_api_client::prelude::{HttpRequester, HttpRequesterConfig};
use chain_tunnel_runner::prelude::{EngineConfig, Requester};

/// Requester factory for the load test definition, sharing one HTTP connection pool between
/// discovery and every worker.
pub fn http_requester(config: &EngineConfig) -> anyhow::Result<Arc<dyn Requester>> {
    let mut client_config = HttpRequesterConfig::new(config.base_endpoint.clone())
        .with_rpc_endpoint(config.rpc_endpoint.clone())
        .with_timeout(config.request_timeout);
    if let Some(token) = &config.auth_token {
        client_config = client_config.with_auth_token(token.clone());
    }

    log::debug!("Connecting with {:?}", client_config);

    let requester: Arc<dyn Requester> = Arc::new(HttpRequester::new(client_config)?);
    Ok(requester)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain_tunnel_runner::prelude::ChainTunnelCli;

    #[test]
    fn builds_from_engine_config() {
        let mut cli = ChainTunnelCli::for_endpoint("http://localhost:1317");
        cli.rpc_endpoint = Some("http://localhost:8545".to_string());
        cli.auth_token = Some("token".to_string());

        let config = EngineConfig::from_cli(&cli).unwrap();
        assert!(http_requester(&config).is_ok());
    }
}
