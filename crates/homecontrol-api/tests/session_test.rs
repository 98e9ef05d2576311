#![allow(clippy::unwrap_used)]
// Integration tests for `SessionEstablisher` using wiremock.

use std::net::{SocketAddr, SocketAddrV4};
use std::sync::Arc;

use secrecy::SecretString;
use serde_json::json;
use url::Url;
use wiremock::matchers::{basic_auth, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use homecontrol_api::{
    DirectoryClient, Error, GatewayDescriptor, HandshakeTimeouts, SessionEstablisher,
    TransportConfig,
};

// ── Helpers ─────────────────────────────────────────────────────────

fn descriptor(server: &MockServer, external_access: bool) -> GatewayDescriptor {
    let directory = Arc::new(DirectoryClient::with_client(
        reqwest::Client::new(),
        Url::parse(&server.uri()).unwrap(),
        "user@example.com".into(),
        SecretString::from("secret".to_string()),
    ));
    let details = serde_json::from_value(json!({
        "gatewayId": "1409301750000598",
        "localUser": "local",
        "localPasskey": "pass",
        "externalAccess": external_access
    }))
    .unwrap();
    GatewayDescriptor::from_details(details, directory)
}

fn gateway(server: &MockServer, external_access: bool) -> Arc<GatewayDescriptor> {
    Arc::new(descriptor(server, external_access))
}

fn establisher(gateway: Arc<GatewayDescriptor>) -> SessionEstablisher {
    SessionEstablisher::new(
        gateway,
        TransportConfig::default(),
        HandshakeTimeouts::default(),
    )
}

fn local_addr(server: &MockServer) -> SocketAddrV4 {
    match server.address() {
        SocketAddr::V4(addr) => *addr,
        SocketAddr::V6(addr) => panic!("mock server bound to IPv6: {addr}"),
    }
}

// ── Local handshake ─────────────────────────────────────────────────

#[tokio::test]
async fn test_local_session() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/dhlp/portal/full"))
        .and(basic_auth("local", "pass"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "link": "/dhlp/portal/light/?token=54e8c82fc921ee7e" })),
        )
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/dhlp/portal/light/"))
        .respond_with(
            ResponseTemplate::new(200).insert_header("set-cookie", "JSESSIONID=abc123; Path=/"),
        )
        .mount(&server)
        .await;

    let gw = gateway(&server, false);
    let session = establisher(Arc::clone(&gw))
        .establish(Some(local_addr(&server)))
        .await
        .unwrap();

    assert!(session.is_local());
    assert_eq!(session.cookie_header().as_deref(), Some("JSESSIONID=abc123"));
    assert_eq!(session.base_url().as_str(), format!("{}/", server.uri()));

    let state = gw.state();
    assert!(state.online);
    assert!(state.local_connection);
}

#[tokio::test]
async fn test_local_bootstrap_garbage_means_offline() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/dhlp/portal/full"))
        .respond_with(ResponseTemplate::new(200).set_body_string("gateway booting"))
        .mount(&server)
        .await;

    let result = establisher(gateway(&server, false))
        .establish(Some(local_addr(&server)))
        .await;
    assert!(
        matches!(result, Err(Error::GatewayOffline { .. })),
        "expected GatewayOffline, got: {result:?}"
    );
}

// ── Remote handshake ────────────────────────────────────────────────

#[tokio::test]
async fn test_remote_session() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/hc/maintenance"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "state": "on" })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/dhp/portal/fullLogin/"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "GW_ID=1409301750000598; Path=/")
                .set_body_json(json!({})),
        )
        .mount(&server)
        .await;

    let full_url = Url::parse(&format!("{}/dhp/portal/fullLogin/?token=abc", server.uri())).unwrap();
    let gw = Arc::new(descriptor(&server, true).with_full_url(full_url));

    let session = establisher(Arc::clone(&gw)).establish(None).await.unwrap();

    assert!(!session.is_local());
    assert_eq!(session.base_url().as_str(), format!("{}/", server.uri()));
    assert!(session.cookie_header().unwrap().contains("GW_ID=1409301750000598"));
    assert!(gw.state().online);
    assert!(!gw.state().local_connection);
}

#[tokio::test]
async fn test_remote_blocked_by_maintenance() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/hc/maintenance"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "state": "off" })))
        .mount(&server)
        .await;

    let result = establisher(gateway(&server, true)).establish(None).await;
    assert!(
        matches!(result, Err(Error::ConnectionImpossible)),
        "expected ConnectionImpossible, got: {result:?}"
    );
}

#[tokio::test]
async fn test_no_local_address_and_no_external_access() {
    let server = MockServer::start().await;

    let result = establisher(gateway(&server, false)).establish(None).await;
    assert!(
        matches!(result, Err(Error::ConnectionImpossible)),
        "expected ConnectionImpossible, got: {result:?}"
    );
}
