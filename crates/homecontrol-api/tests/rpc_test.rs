#![allow(clippy::unwrap_used)]
// Integration tests for `RpcClient` using wiremock.

use std::sync::Arc;

use arc_swap::ArcSwap;
use reqwest::cookie::Jar;
use secrecy::SecretString;
use serde_json::{Value, json};
use url::Url;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use homecontrol_api::{
    DirectoryClient, Error, GatewayDescriptor, InvokeStatus, RpcClient, Session,
};

// ── Helpers ─────────────────────────────────────────────────────────

fn gateway() -> Arc<GatewayDescriptor> {
    let directory = Arc::new(DirectoryClient::with_client(
        reqwest::Client::new(),
        Url::parse("http://127.0.0.1:1").unwrap(),
        "user@example.com".into(),
        SecretString::from("secret".to_string()),
    ));
    let details = serde_json::from_value(json!({
        "gatewayId": "1409301750000598",
        "status": "devolo.hc_gateway.status.online"
    }))
    .unwrap();
    Arc::new(GatewayDescriptor::from_details(details, directory))
}

fn client_for(base: &str) -> (RpcClient, Arc<GatewayDescriptor>) {
    let session = Session::from_parts(
        reqwest::Client::new(),
        Url::parse(base).unwrap(),
        Arc::new(Jar::default()),
        true,
    );
    let gw = gateway();
    let rpc = RpcClient::new(Arc::new(ArcSwap::from_pointee(session)), Arc::clone(&gw));
    (rpc, gw)
}

async fn setup() -> (MockServer, RpcClient, Arc<GatewayDescriptor>) {
    let server = MockServer::start().await;
    let (rpc, gw) = client_for(&server.uri());
    (server, rpc, gw)
}

/// Respond with the request's id and `result`.
fn echo(result: Value) -> impl Fn(&Request) -> ResponseTemplate + Send + Sync + 'static {
    move |req: &Request| {
        let body: Value = serde_json::from_slice(&req.body).unwrap();
        ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": body["id"],
            "result": result,
        }))
    }
}

// ── Envelope & ids ──────────────────────────────────────────────────

#[tokio::test]
async fn test_ids_increase_by_one() {
    let (server, rpc, _) = setup().await;

    Mock::given(method("POST"))
        .and(path("/remote/json-rpc"))
        .and(header("content-type", "application/json"))
        .and(body_partial_json(json!({ "jsonrpc": "2.0", "method": "FIM/getFunctionalItems" })))
        .respond_with(|req: &Request| {
            let body: Value = serde_json::from_slice(&req.body).unwrap();
            ResponseTemplate::new(200).set_body_json(json!({
                "id": body["id"],
                "result": { "seen": body["id"] }
            }))
        })
        .expect(3)
        .mount(&server)
        .await;

    for expected in 1..=3_u64 {
        let result = rpc
            .call("FIM/getFunctionalItems", json!([["devolo.DevicesPage"], 0]))
            .await
            .unwrap();
        assert_eq!(result["seen"], expected);
    }
}

#[tokio::test]
async fn test_id_mismatch_is_protocol_violation() {
    let (server, rpc, _) = setup().await;

    Mock::given(method("POST"))
        .and(path("/remote/json-rpc"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "id": 42, "result": {} })),
        )
        .mount(&server)
        .await;

    let result = rpc.call("FIM/getFunctionalItems", json!([[], 0])).await;
    assert!(
        matches!(result, Err(Error::ProtocolViolation { expected: 1, got: 42 })),
        "expected ProtocolViolation, got: {result:?}"
    );
}

#[tokio::test]
async fn test_rpc_error_member() {
    let (server, rpc, _) = setup().await;

    Mock::given(method("POST"))
        .and(path("/remote/json-rpc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 1,
            "error": { "code": -32601, "message": "method not found" }
        })))
        .mount(&server)
        .await;

    let result = rpc.call("FIM/unknown", json!([])).await;
    assert!(
        matches!(result, Err(Error::Rpc { ref message }) if message.contains("method not found")),
        "expected Rpc error, got: {result:?}"
    );
}

// ── Offline handling ────────────────────────────────────────────────

#[tokio::test]
async fn test_unreachable_gateway_goes_offline() {
    let (rpc, gw) = client_for("http://127.0.0.1:1");
    assert!(gw.state().online);

    let result = rpc.call("FIM/getFunctionalItems", json!([[], 0])).await;
    assert!(
        matches!(result, Err(Error::GatewayOffline { .. })),
        "expected GatewayOffline, got: {result:?}"
    );
    assert!(!gw.state().online);
}

// ── Typed calls ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_fetch_items() {
    let (server, rpc, _) = setup().await;

    Mock::given(method("POST"))
        .and(path("/remote/json-rpc"))
        .and(body_partial_json(json!({
            "method": "FIM/getFunctionalItems",
            "params": [["devolo.DevicesPage"], 0]
        })))
        .respond_with(echo(json!({
            "items": [{
                "UID": "devolo.DevicesPage",
                "properties": { "deviceUIDs": ["hdm:ZWave:F6BF9812/2"] }
            }]
        })))
        .mount(&server)
        .await;

    let items = rpc.fetch_items(&["devolo.DevicesPage".to_string()]).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].uid, "devolo.DevicesPage");
    assert_eq!(
        items[0].properties["deviceUIDs"],
        json!(["hdm:ZWave:F6BF9812/2"])
    );
}

#[tokio::test]
async fn test_invoke_accepted() {
    let (server, rpc, _) = setup().await;

    Mock::given(method("POST"))
        .and(path("/remote/json-rpc"))
        .and(body_partial_json(json!({
            "method": "FIM/invokeOperation",
            "params": ["devolo.BinarySwitch:hdm:ZWave:F6BF9812/2", "turnOn", []]
        })))
        .respond_with(echo(json!({ "status": 1 })))
        .mount(&server)
        .await;

    let status = rpc
        .invoke("devolo.BinarySwitch:hdm:ZWave:F6BF9812/2", "turnOn", Vec::new())
        .await
        .unwrap();
    assert_eq!(status, InvokeStatus::Accepted);
    assert!(status.changed());
}

#[tokio::test]
async fn test_invoke_unchanged_and_failed() {
    let (server, rpc, _) = setup().await;

    Mock::given(method("POST"))
        .and(path("/remote/json-rpc"))
        .and(body_partial_json(json!({ "params": ["sw", "turnOn", []] })))
        .respond_with(echo(json!({ "status": 2 })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/remote/json-rpc"))
        .and(body_partial_json(json!({ "params": ["sw", "turnOff", []] })))
        .respond_with(echo(json!({ "status": 0 })))
        .mount(&server)
        .await;

    let unchanged = rpc.invoke("sw", "turnOn", Vec::new()).await.unwrap();
    assert_eq!(unchanged, InvokeStatus::Unchanged);
    assert!(!unchanged.changed());

    let failed = rpc.invoke("sw", "turnOff", Vec::new()).await.unwrap();
    assert_eq!(failed, InvokeStatus::Failed(0));
    assert!(!failed.changed());
}

#[tokio::test]
async fn test_refresh_session() {
    let (server, rpc, _) = setup().await;

    Mock::given(method("POST"))
        .and(path("/remote/json-rpc"))
        .and(body_partial_json(json!({
            "method": "FIM/invokeOperation",
            "params": ["devolo.UserPrefs", "resetSessionTimeout", []]
        })))
        .respond_with(echo(json!({ "status": 1 })))
        .expect(1)
        .mount(&server)
        .await;

    rpc.refresh_session().await.unwrap();
}
