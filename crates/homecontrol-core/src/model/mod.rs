//! Typed view of the gateway's devices and their properties.

pub mod device;
pub mod property;
pub mod setting;
pub mod uid;
pub(crate) mod value;

use chrono::{DateTime, Utc};
use serde::Serialize;

pub use device::{Device, ElementKind};
pub use property::{
    BinarySensor, BinarySwitch, Consumption, HumidityBar, MultiLevelSensor, MultiLevelSwitch,
    Property, RemoteControl, Voltage,
};
pub use setting::{Setting, SettingChange, SettingKind, SettingValue};

/// A single observed change, as delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "change", content = "value", rename_all = "snake_case")]
pub enum Change {
    SwitchState(bool),
    SwitchEnabled(bool),
    CurrentConsumption(f64),
    TotalConsumption(f64),
    TotalSince(DateTime<Utc>),
    SensorValue(f64),
    SwitchValue(f64),
    SensorState(bool),
    KeyPressed(u32),
    Voltage(f64),
    HumidityZone(u8),
    HumidityValue(f64),
    LastActivity(DateTime<Utc>),
    Setting(SettingValue),

    // Device level
    DeviceOnline(bool),
    PendingOperations(bool),
    BatteryLevel(i32),
    BatteryLow(bool),
    DeviceAdded(String),
    DeviceRemoved(String),

    GatewayAccessible { accessible: bool, online_sync: bool },
}
