// homecontrol-core: Device model, property store and live update dispatch on top of homecontrol-api.

pub mod command;
pub mod config;
pub mod controller;
pub mod dispatch;
pub mod error;
pub mod inventory;
pub mod model;
pub mod store;

// ── Primary re-exports ──────────────────────────────────────────────
pub use command::Command;
pub use config::HomeControlConfig;
pub use controller::HomeControl;
pub use dispatch::{Dispatcher, Outcome};
pub use error::CoreError;
pub use inventory::Inventory;
pub use store::{Callback, Message, PropertyStore, Publisher};

pub use homecontrol_api::{ConnectionState, GatewayDescriptor, GatewayState};

// Re-export model types at the crate root for ergonomics.
pub use model::{
    // Devices
    Change, Device, ElementKind,
    // Properties
    BinarySensor, BinarySwitch, Consumption, HumidityBar, MultiLevelSensor, MultiLevelSwitch,
    Property, RemoteControl, Voltage,
    // Settings
    Setting, SettingChange, SettingKind, SettingValue,
};
