#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chain_tunnel_runner::prelude::{
    Mergeable, DiscoveredState, RequestDescriptor, RequestFailure, Requester, Response,
};

/// Answers by target path:
/// - `/rate-limited` gives a 429
/// - `/fail` gives a connection error
/// - `/slow` takes 100ms
/// - `/odd` gives a differently shaped body
///
/// Anything else succeeds immediately with `{"height": "1"}`.
#[derive(Debug, Default)]
pub struct MockRequester {
    pub sent: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl MockRequester {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sent(&self) -> usize {
        self.sent.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Requester for MockRequester {
    async fn send(&self, descriptor: &RequestDescriptor) -> Result<Response, RequestFailure> {
        self.sent.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        // Lets other workers start before this one completes
        tokio::task::yield_now().await;

        let result = match descriptor.target() {
            "/rate-limited" => Err(RequestFailure::http(429, "Too Many Requests")),
            "/fail" => Err(RequestFailure::connection("connection refused")),
            "/slow" => {
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok(Response::new(200, r#"{"height":"1"}"#, Duration::from_millis(100)))
            }
            "/odd" => Ok(Response::new(200, r#"{"error":{"code":-32000}}"#, Duration::from_millis(1))),
            _ => Ok(Response::new(200, r#"{"height":"1"}"#, Duration::from_millis(1))),
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct TestState {
    pub heights: Vec<u64>,
}

impl Mergeable for TestState {
    fn merge(&mut self, other: Self) {
        for height in other.heights {
            if !self.heights.contains(&height) {
                self.heights.push(height);
            }
        }
    }
}

impl DiscoveredState for TestState {}

pub fn descriptors(target: &str, n: usize) -> Vec<RequestDescriptor> {
    (0..n)
        .map(|_| RequestDescriptor::rest_get("block", target))
        .collect()
}
