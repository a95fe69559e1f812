use std::time::Duration;

use url::Url;

/// Connection settings for an [crate::prelude::HttpRequester].
#[derive(Clone)]
pub struct HttpRequesterConfig {
    /// REST paths are appended to this URL, keeping any path prefix it has.
    pub base_endpoint: Url,
    /// JSON-RPC calls are posted here.
    pub rpc_endpoint: Url,
    /// Sent as a bearer token with every request.
    pub auth_token: Option<String>,
    pub timeout: Duration,
}

impl HttpRequesterConfig {
    pub fn new(base_endpoint: Url) -> Self {
        Self {
            rpc_endpoint: base_endpoint.clone(),
            base_endpoint,
            auth_token: None,
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_rpc_endpoint(mut self, rpc_endpoint: Url) -> Self {
        self.rpc_endpoint = rpc_endpoint;
        self
    }

    pub fn with_auth_token(mut self, auth_token: impl Into<String>) -> Self {
        self.auth_token = Some(auth_token.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl std::fmt::Debug for HttpRequesterConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRequesterConfig")
            .field("base_endpoint", &self.base_endpoint.as_str())
            .field("rpc_endpoint", &self.rpc_endpoint.as_str())
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .finish()
    }
}
