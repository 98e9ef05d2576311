#![allow(clippy::unwrap_used)]
// Candidate probing tests for `LocalDiscovery` using wiremock.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use serde_json::json;
use tokio::sync::mpsc;
use url::Url;
use wiremock::matchers::{basic_auth, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use homecontrol_api::{DirectoryClient, DiscoveryConfig, GatewayDescriptor, LocalDiscovery};

fn discovery() -> LocalDiscovery {
    let directory = Arc::new(DirectoryClient::with_client(
        reqwest::Client::new(),
        Url::parse("http://127.0.0.1:1").unwrap(),
        "user@example.com".into(),
        SecretString::from("secret".to_string()),
    ));
    let details = serde_json::from_value(json!({
        "gatewayId": "1409301750000598",
        "localUser": "local",
        "localPasskey": "pass"
    }))
    .unwrap();
    let gw = GatewayDescriptor::from_details(details, directory);
    LocalDiscovery::new(
        &gw,
        DiscoveryConfig {
            scan_timeout: Duration::from_secs(2),
            probe_timeout: Duration::from_millis(500),
        },
    )
    .unwrap()
}

async fn gateway_server(status: u16) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/dhlp/port/full"))
        .and(basic_auth("local", "pass"))
        .respond_with(ResponseTemplate::new(status))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn test_first_answering_candidate_wins() {
    let impostor = gateway_server(401).await;
    let gateway = gateway_server(200).await;

    let (tx, rx) = mpsc::channel(4);
    tx.send(*impostor.address()).await.unwrap();
    tx.send(*gateway.address()).await.unwrap();

    let found = discovery().probe_candidates(rx).await;
    let SocketAddr::V4(expected) = *gateway.address() else {
        panic!("mock server bound to IPv6");
    };
    assert_eq!(found, Some(expected));
}

#[tokio::test]
async fn test_unreachable_candidates_yield_none() {
    let (tx, rx) = mpsc::channel(4);
    tx.send("127.0.0.1:1".parse().unwrap()).await.unwrap();
    drop(tx);

    assert!(discovery().probe_candidates(rx).await.is_none());
}
