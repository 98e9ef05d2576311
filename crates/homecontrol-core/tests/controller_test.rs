#![allow(clippy::unwrap_used)]
// Integration tests for `HomeControl` using wiremock.
//
// One mock server plays directory, cloud relay and gateway. The push
// channel cannot open against it and stays in its reconnect loop.

use std::collections::HashMap;
use std::sync::Arc;

use secrecy::SecretString;
use serde_json::{Value, json};
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use homecontrol_api::DirectoryClient;
use homecontrol_core::{
    Command, ConnectionState, CoreError, HomeControl, HomeControlConfig, SettingChange,
};

const UUID: &str = "535512AB-165D-11E7-A4E2-000C29D76CCA";
const GATEWAY_ID: &str = "1409301750000598";
const DEV: &str = "hdm:ZWave:F6BF9812/2";
const SWITCH: &str = "devolo.BinarySwitch:hdm:ZWave:F6BF9812/2";
const DIMMER: &str = "devolo.Dimmer:hdm:ZWave:F6BF9812/2#2";
const MOTION: &str = "mss.hdm:ZWave:F6BF9812/2";

// ── Fake gateway ────────────────────────────────────────────────────

/// Answers `getFunctionalItems` from a fixture table and every
/// `invokeOperation` with a fixed status.
struct FakeGateway {
    items: HashMap<String, Value>,
    invoke_status: i64,
}

impl FakeGateway {
    fn new(invoke_status: i64) -> Self {
        let fixtures = [
            json!({"UID": "devolo.DevicesPage", "properties": {"deviceUIDs": [DEV]}}),
            json!({"UID": "devolo.Grouping", "properties": {
                "zones": [{"id": "hz_1", "name": "Kitchen"}]
            }}),
            json!({"UID": DEV, "properties": {
                "itemName": "Kitchen lamp",
                "zoneId": "hz_1",
                "status": 2,
                "batteryLevel": -1,
                "manID": "0x0175",
                "prodTypeID": "0x0001",
                "prodID": "0x0011",
                "elementUIDs": [SWITCH, DIMMER],
                "settingUIDs": [MOTION],
                "icon": "light-bulb"
            }}),
            json!({"UID": SWITCH, "properties": {"state": 0, "guiEnabled": true}}),
            json!({"UID": DIMMER, "properties": {
                "value": 10, "min": 0, "max": 99, "switchType": "dimmer"
            }}),
            json!({"UID": MOTION, "properties": {"value": 50}}),
        ];
        let items = fixtures
            .into_iter()
            .map(|item| (item["UID"].as_str().unwrap().to_owned(), item))
            .collect();
        Self {
            items,
            invoke_status,
        }
    }
}

impl Respond for FakeGateway {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = serde_json::from_slice(&request.body).unwrap();
        let result = match body["method"].as_str() {
            Some("FIM/getFunctionalItems") => {
                let items: Vec<Value> = body["params"][0]
                    .as_array()
                    .unwrap()
                    .iter()
                    .filter_map(|uid| self.items.get(uid.as_str()?).cloned())
                    .collect();
                json!({ "items": items })
            }
            Some("FIM/invokeOperation") => json!({ "status": self.invoke_status }),
            _ => Value::Null,
        };
        ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": body["id"],
            "result": result,
        }))
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

async fn mount_directory(server: &MockServer, gateways: Value) {
    Mock::given(method("GET"))
        .and(path("/v1/users/uuid"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "uuid": UUID })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/v1/users/{UUID}/hc/gateways/status")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "items": gateways })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/v1/users/{UUID}/hc/gateways/{GATEWAY_ID}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "gatewayId": GATEWAY_ID,
            "status": "devolo.hc_gateway.status.online",
            "state": "devolo.hc_gateway.state.idle",
            "localUser": "local",
            "localPasskey": "pass",
            "externalAccess": true
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/v1/users/{UUID}/hc/gateways/{GATEWAY_ID}/fullURL")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "url": format!("{}/dhp/portal/fullLogin/?token=abc", server.uri())
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/hc/maintenance"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "state": "on" })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/dhp/portal/fullLogin/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(server)
        .await;
}

async fn setup(invoke_status: i64) -> (MockServer, HomeControl) {
    let server = MockServer::start().await;
    mount_directory(&server, json!([{ "gatewayId": GATEWAY_ID }])).await;
    Mock::given(method("POST"))
        .and(path("/remote/json-rpc"))
        .respond_with(FakeGateway::new(invoke_status))
        .mount(&server)
        .await;

    let hc = tokio_test::assert_ok!(HomeControl::connect(config(), directory(&server)).await);
    (server, hc)
}

fn config() -> HomeControlConfig {
    let mut config =
        HomeControlConfig::new("user@example.com", SecretString::from("secret".to_string()));
    config.zeroconf = false;
    config
}

fn directory(server: &MockServer) -> Arc<DirectoryClient> {
    Arc::new(DirectoryClient::with_client(
        reqwest::Client::new(),
        Url::parse(&server.uri()).unwrap(),
        "user@example.com".into(),
        SecretString::from("secret".to_string()),
    ))
}

async fn invocations(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| {
            serde_json::from_slice::<Value>(&r.body)
                .is_ok_and(|b| b["method"] == "FIM/invokeOperation")
        })
        .count()
}

fn switch_state(hc: &HomeControl) -> bool {
    hc.device(DEV).unwrap().binary_switches[SWITCH].state
}

// ── Connect / inventory ─────────────────────────────────────────────

#[tokio::test]
async fn test_connect_loads_inventory() {
    let (_server, hc) = setup(1).await;

    assert_eq!(hc.gateway().id(), GATEWAY_ID);
    assert_eq!(hc.devices().len(), 1);

    let device = hc.device(DEV).unwrap();
    assert_eq!(device.name, "Kitchen lamp");
    assert_eq!(device.zone, "Kitchen");
    assert!(device.online);
    assert_eq!(device.extra.get("icon"), Some(&json!("light-bulb")));
    assert!(!device.binary_switches[SWITCH].state);
    assert!((device.multi_level_switches[DIMMER].max - 99.0).abs() < f64::EPSILON);
    assert_eq!(device.settings.len(), 1);
    assert!(hc.publisher().has_event(DEV));

    hc.disconnect().await;
    assert_eq!(hc.connection_state(), ConnectionState::Closed);
}

#[tokio::test]
async fn test_no_gateway_on_account() {
    let server = MockServer::start().await;
    mount_directory(&server, json!([])).await;

    let err = tokio_test::assert_err!(HomeControl::connect(config(), directory(&server)).await);
    assert!(matches!(err, CoreError::NoGateway));
}

// ── Commands ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_switch_accepted_updates_local_state() {
    let (_server, hc) = setup(1).await;

    let changed = hc
        .execute(Command::SetBinarySwitch {
            uid: SWITCH.into(),
            state: true,
        })
        .await
        .unwrap();

    assert!(changed);
    assert!(switch_state(&hc));
    hc.disconnect().await;
}

#[tokio::test]
async fn test_switch_unchanged_leaves_local_state() {
    let (_server, hc) = setup(2).await;

    let changed = hc
        .execute(Command::SetBinarySwitch {
            uid: SWITCH.into(),
            state: true,
        })
        .await
        .unwrap();

    assert!(!changed);
    assert!(!switch_state(&hc));
    hc.disconnect().await;
}

#[tokio::test]
async fn test_out_of_range_value_is_rejected_before_sending() {
    let (server, hc) = setup(1).await;

    let result = hc
        .execute(Command::SetMultiLevelSwitch {
            uid: DIMMER.into(),
            value: 100.0,
        })
        .await;

    assert!(matches!(result, Err(CoreError::ValidationFailed { .. })));
    assert_eq!(invocations(&server).await, 0);
    hc.disconnect().await;
}

#[tokio::test]
async fn test_setting_change() {
    let (_server, hc) = setup(1).await;

    let wrong_kind = hc
        .execute(Command::ChangeSetting {
            uid: MOTION.into(),
            change: SettingChange::Tone(2),
        })
        .await;
    assert!(matches!(wrong_kind, Err(CoreError::WrongElement { .. })));

    let too_high = hc
        .execute(Command::ChangeSetting {
            uid: MOTION.into(),
            change: SettingChange::MotionSensitivity(101),
        })
        .await;
    assert!(matches!(too_high, Err(CoreError::ValidationFailed { .. })));

    let changed = hc
        .execute(Command::ChangeSetting {
            uid: MOTION.into(),
            change: SettingChange::MotionSensitivity(80),
        })
        .await
        .unwrap();
    assert!(changed);
    assert_eq!(
        hc.device(DEV).unwrap().settings[MOTION].value,
        homecontrol_core::SettingValue::MotionSensitivity { value: 80 }
    );
    hc.disconnect().await;
}

#[tokio::test]
async fn test_unknown_targets() {
    let (_server, hc) = setup(1).await;

    let missing_device = hc
        .execute(Command::SetBinarySwitch {
            uid: "devolo.BinarySwitch:hdm:ZWave:F6BF9812/9".into(),
            state: true,
        })
        .await;
    assert!(matches!(missing_device, Err(CoreError::DeviceNotFound { .. })));

    let missing_property = hc
        .execute(Command::PressKey {
            uid: "devolo.RemoteControl:hdm:ZWave:F6BF9812/2".into(),
            key: 1,
        })
        .await;
    assert!(matches!(missing_property, Err(CoreError::PropertyNotFound { .. })));
    hc.disconnect().await;
}

#[tokio::test]
async fn test_unknown_product_yields_placeholder() {
    let (_server, hc) = setup(1).await;

    let product = hc.product_info(DEV).await.unwrap();
    assert_eq!(product.name, "Unknown device");
    assert_eq!(product.manufacturer_id, "0x0175");
    hc.disconnect().await;
}
