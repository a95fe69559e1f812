use std::time::Duration;

use crate::error::RequestFailure;
use crate::request::RequestDescriptor;

/// A successful exchange with the target API.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
    pub duration: Duration,
}

impl Response {
    pub fn new(status: u16, body: impl Into<String>, duration: Duration) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
            duration,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::from_str(&self.body)
    }
}

/// Issues one request against the target API.
///
/// Implementations own the transport concerns: connection reuse, authentication and the
/// per-request timeout. Any non-success status must be returned as [RequestFailure::Http] so
/// that a 429 can be told apart by the caller.
#[async_trait::async_trait]
pub trait Requester: Send + Sync {
    async fn send(&self, descriptor: &RequestDescriptor) -> Result<Response, RequestFailure>;
}
