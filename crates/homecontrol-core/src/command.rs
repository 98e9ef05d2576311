// ── Command API ──
//
// Every write goes through `Command`. The controller validates against
// the stored property, invokes the operation on the gateway and only
// updates the local value when the gateway reports status 1.

use serde_json::{Value, json};

use crate::model::SettingChange;

/// All write operations against a gateway.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Turn a binary switch on or off.
    SetBinarySwitch { uid: String, state: bool },
    /// Send a value to a dimmer, shutter or other multi-level switch.
    SetMultiLevelSwitch { uid: String, value: f64 },
    /// Press a key of a remote control.
    PressKey { uid: String, key: u32 },
    /// Change a device setting.
    ChangeSetting { uid: String, change: SettingChange },
}

impl Command {
    /// Uid of the element or setting the command targets.
    pub fn uid(&self) -> &str {
        match self {
            Self::SetBinarySwitch { uid, .. }
            | Self::SetMultiLevelSwitch { uid, .. }
            | Self::PressKey { uid, .. }
            | Self::ChangeSetting { uid, .. } => uid,
        }
    }

    /// Operation name and its arguments.
    pub(crate) fn operation(&self) -> (&'static str, Vec<Value>) {
        match self {
            Self::SetBinarySwitch { state: true, .. } => ("turnOn", Vec::new()),
            Self::SetBinarySwitch { state: false, .. } => ("turnOff", Vec::new()),
            Self::SetMultiLevelSwitch { value, .. } => ("sendValue", vec![json!(value)]),
            Self::PressKey { key, .. } => ("pressKey", vec![json!(key)]),
            Self::ChangeSetting { change, .. } => ("save", change.save_args()),
        }
    }
}
