use std::time::Duration;

use chain_api_client::prelude::{HttpRequester, HttpRequesterConfig};
use chain_tunnel_core::prelude::{RequestDescriptor, RequestFailure, Requester};
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn requester(server: &MockServer) -> HttpRequester {
    HttpRequester::new(HttpRequesterConfig::new(Url::parse(&server.uri()).unwrap())).unwrap()
}

#[tokio::test]
async fn rest_get_with_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cosmos/bank/v1beta1/balances/cosmos1abc"))
        .and(query_param("pagination.limit", "10"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"balances": []})))
        .expect(1)
        .mount(&server)
        .await;

    let response = requester(&server)
        .send(
            &RequestDescriptor::rest_get("balances", "/cosmos/bank/v1beta1/balances/cosmos1abc")
                .with_params(json!({"pagination.limit": 10})),
        )
        .await
        .unwrap();

    assert_eq!(200, response.status);
    assert_eq!(json!({"balances": []}), response.json().unwrap());
}

#[tokio::test]
async fn json_rpc_call_is_wrapped() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/"))
        .and(body_partial_json(json!({"jsonrpc": "2.0", "method": "eth_blockNumber"})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"jsonrpc": "2.0", "id": 1, "result": "0x10"})),
        )
        .mount(&server)
        .await;

    let response = requester(&server)
        .send(&RequestDescriptor::json_rpc("eth_blockNumber", json!([])))
        .await
        .unwrap();

    assert_eq!("0x10", response.json().unwrap()["result"]);
}

#[tokio::test]
async fn bearer_token_is_sent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(header("authorization", "Bearer token-123"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .mount(&server)
        .await;

    let requester = HttpRequester::new(
        HttpRequesterConfig::new(Url::parse(&server.uri()).unwrap()).with_auth_token("token-123"),
    )
    .unwrap();

    let response = requester
        .send(&RequestDescriptor::rest_get("node_info", "/node_info"))
        .await;
    assert!(response.is_ok());
}

#[tokio::test]
async fn too_many_requests_is_rate_limited() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .mount(&server)
        .await;

    let failure = requester(&server)
        .send(&RequestDescriptor::rest_get("latest_block", "/blocks/latest"))
        .await
        .unwrap_err();

    assert!(failure.is_rate_limited());
    assert_eq!("rate_limited", failure.kind());
}

#[tokio::test]
async fn server_error_is_http_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let failure = requester(&server)
        .send(&RequestDescriptor::rest_get("latest_block", "/blocks/latest"))
        .await
        .unwrap_err();

    assert!(matches!(failure, RequestFailure::Http { status: 503, .. }));
}

#[tokio::test]
async fn slow_response_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;

    let requester = HttpRequester::new(
        HttpRequesterConfig::new(Url::parse(&server.uri()).unwrap())
            .with_timeout(Duration::from_millis(50)),
    )
    .unwrap();

    let failure = requester
        .send(&RequestDescriptor::rest_get("latest_block", "/blocks/latest"))
        .await
        .unwrap_err();

    assert_eq!("timeout", failure.kind());
}

#[tokio::test]
async fn refused_connection() {
    let requester =
        HttpRequester::new(HttpRequesterConfig::new(Url::parse("http://127.0.0.1:1").unwrap()))
            .unwrap();

    let failure = requester
        .send(&RequestDescriptor::rest_get("latest_block", "/blocks/latest"))
        .await
        .unwrap_err();

    assert_eq!("connection", failure.kind());
}
