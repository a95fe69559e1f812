use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How a [RequestDescriptor] is put on the wire.
///
/// The two REST variants target a path relative to the base endpoint. A JSON-RPC call targets
/// an RPC method name and is posted to the RPC endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    RestGet,
    RestPost,
    JsonRpc,
}

impl Transport {
    pub fn is_rest(&self) -> bool {
        !matches!(self, Self::JsonRpc)
    }
}

/// A single request to issue against the target API.
///
/// Immutable once constructed. The `method` is the logical name that metrics and response
/// patterns are grouped by, so several descriptors with different parameters share it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestDescriptor {
    method: String,
    transport: Transport,
    target: String,
    params: Value,
    weight: f64,
}

impl RequestDescriptor {
    pub fn new(
        method: impl Into<String>,
        transport: Transport,
        target: impl Into<String>,
        params: Value,
    ) -> Self {
        Self {
            method: method.into(),
            transport,
            target: target.into(),
            params,
            weight: 1.0,
        }
    }

    /// A REST query. `params` are sent as the query string when they are an object.
    pub fn rest_get(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(method, Transport::RestGet, path, Value::Null)
    }

    pub fn rest_post(method: impl Into<String>, path: impl Into<String>, body: Value) -> Self {
        Self::new(method, Transport::RestPost, path, body)
    }

    /// A JSON-RPC call. The logical method defaults to the RPC method name.
    pub fn json_rpc(rpc_method: impl Into<String>, params: Value) -> Self {
        let rpc_method = rpc_method.into();
        Self::new(rpc_method.clone(), Transport::JsonRpc, rpc_method, params)
    }

    pub fn with_params(self, params: Value) -> Self {
        Self { params, ..self }
    }

    /// Relative weight, used for sampling and to scale scenario concurrency.
    ///
    /// Non-positive or non-finite weights are ignored and the previous weight is kept.
    pub fn with_weight(self, weight: f64) -> Self {
        if weight.is_finite() && weight > 0.0 {
            Self { weight, ..self }
        } else {
            log::warn!(
                "Ignoring invalid weight {} for request [{}]",
                weight,
                self.method
            );
            self
        }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    /// The REST path or the JSON-RPC method name.
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn params(&self) -> &Value {
        &self.params
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }
}
