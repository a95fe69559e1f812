use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Context;
use async_trait::async_trait;
use chain_tunnel_core::prelude::{RequestDescriptor, RequestFailure, Requester, Response, Transport};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use serde_json::{json, Value};
use tokio::time::Instant;
use url::Url;

use crate::config::HttpRequesterConfig;
use crate::error::{request_failure, status_failure};

/// Sends [RequestDescriptor]s over HTTP.
///
/// REST requests go to the base endpoint, JSON-RPC calls are wrapped in a JSON-RPC 2.0 envelope
/// and posted to the RPC endpoint. One connection pool is shared by every worker.
pub struct HttpRequester {
    client: reqwest::Client,
    base_endpoint: Url,
    rpc_endpoint: Url,
    next_id: AtomicU64,
}

impl HttpRequester {
    pub fn new(config: HttpRequesterConfig) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(token) = &config.auth_token {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                .context("Auth token is not a valid header value")?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("chain-tunnel/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_endpoint: config.base_endpoint,
            rpc_endpoint: config.rpc_endpoint,
            next_id: AtomicU64::new(1),
        })
    }

    /// The URL for a REST path, with object params as the query string.
    pub(crate) fn rest_url(&self, path: &str, params: &Value) -> Result<Url, RequestFailure> {
        let base = self.base_endpoint.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        let mut url = Url::parse(&format!("{base}/{path}"))
            .map_err(|e| RequestFailure::connection(format!("invalid url for [{path}]: {e}")))?;

        if let Value::Object(params) = params {
            let mut query = url.query_pairs_mut();
            for (key, value) in params {
                match value {
                    Value::Null => {}
                    Value::String(s) => {
                        query.append_pair(key, s);
                    }
                    other => {
                        query.append_pair(key, &other.to_string());
                    }
                }
            }
        }

        Ok(url)
    }

    pub(crate) fn rpc_body(&self, method: &str, params: &Value) -> Value {
        let params = match params {
            Value::Null => json!([]),
            other => other.clone(),
        };
        json!({
            "jsonrpc": "2.0",
            "id": self.next_id.fetch_add(1, Ordering::Relaxed),
            "method": method,
            "params": params,
        })
    }
}

#[async_trait]
impl Requester for HttpRequester {
    async fn send(&self, descriptor: &RequestDescriptor) -> Result<Response, RequestFailure> {
        let request = match descriptor.transport() {
            Transport::RestGet => self
                .client
                .get(self.rest_url(descriptor.target(), descriptor.params())?),
            Transport::RestPost => self
                .client
                .post(self.rest_url(descriptor.target(), &Value::Null)?)
                .json(descriptor.params()),
            Transport::JsonRpc => self
                .client
                .post(self.rpc_endpoint.clone())
                .json(&self.rpc_body(descriptor.target(), descriptor.params())),
        };

        let start = Instant::now();
        let response = request.send().await.map_err(request_failure)?;

        let status = response.status();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.to_string(), v.to_string()))
            })
            .collect::<Vec<_>>();
        let body = response.text().await.map_err(request_failure)?;
        let duration = start.elapsed();

        log::trace!(
            "[{}] {} in {:?}",
            descriptor.method(),
            status.as_u16(),
            duration
        );

        if !status.is_success() {
            return Err(status_failure(status, &body));
        }

        Ok(Response {
            status: status.as_u16(),
            headers,
            body,
            duration,
        })
    }
}

impl std::fmt::Debug for HttpRequester {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRequester")
            .field("base_endpoint", &self.base_endpoint.as_str())
            .field("rpc_endpoint", &self.rpc_endpoint.as_str())
            .finish_non_exhaustive()
    }
}
