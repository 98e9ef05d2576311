// ── Device settings ──
//
// Settings live under `<tag>.<deviceUid>[#N]`. Reading goes through
// `Setting::apply`, writing through the closed `SettingChange` enum which
// validates its argument and renders the `save` parameters.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Value, json};
use strum::{Display, EnumString, IntoStaticStr};

use super::Change;
use super::uid::setting_tag;
use super::value::{as_bool, as_string, as_u8};
use crate::error::CoreError;

/// Setting kinds by uid tag.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Display, EnumString,
    IntoStaticStr,
)]
pub enum SettingKind {
    #[strum(serialize = "lis")]
    Led,
    #[strum(serialize = "gds")]
    General,
    #[strum(serialize = "cps")]
    Parameter,
    #[strum(serialize = "ps")]
    Protection,
    #[strum(serialize = "trs")]
    TemperatureReport,
    #[strum(serialize = "acs")]
    AutomaticCalibration,
    #[strum(serialize = "mss")]
    MotionSensitivity,
    #[strum(serialize = "bss")]
    BinarySync,
    #[strum(serialize = "stmss")]
    SwitchType,
    #[strum(serialize = "mas")]
    Tone,
}

impl SettingKind {
    /// Kind of a setting uid, `None` for unknown tags.
    pub fn of(setting_uid: &str) -> Option<Self> {
        setting_tag(setting_uid).parse().ok()
    }

    pub fn tag(self) -> &'static str {
        self.into()
    }
}

/// Current value of a setting.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SettingValue {
    Led {
        enabled: bool,
    },
    General {
        events_enabled: bool,
        name: String,
        icon: String,
        zone_id: String,
    },
    Parameter {
        changed: bool,
    },
    Protection {
        local_switch: bool,
        remote_switch: bool,
    },
    TemperatureReport {
        enabled: bool,
    },
    AutomaticCalibration {
        status: bool,
    },
    MotionSensitivity {
        value: u8,
    },
    BinarySync {
        inverted: bool,
    },
    SwitchType {
        value: u8,
    },
    Tone {
        value: u8,
    },
}

impl SettingValue {
    fn empty(kind: SettingKind) -> Self {
        match kind {
            SettingKind::Led => Self::Led { enabled: false },
            SettingKind::General => Self::General {
                events_enabled: false,
                name: String::new(),
                icon: String::new(),
                zone_id: String::new(),
            },
            SettingKind::Parameter => Self::Parameter { changed: false },
            SettingKind::Protection => Self::Protection {
                local_switch: false,
                remote_switch: false,
            },
            SettingKind::TemperatureReport => Self::TemperatureReport { enabled: false },
            SettingKind::AutomaticCalibration => Self::AutomaticCalibration { status: false },
            SettingKind::MotionSensitivity => Self::MotionSensitivity { value: 0 },
            SettingKind::BinarySync => Self::BinarySync { inverted: false },
            SettingKind::SwitchType => Self::SwitchType { value: 1 },
            SettingKind::Tone => Self::Tone { value: 0 },
        }
    }
}

/// A device setting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Setting {
    pub uid: String,
    pub kind: SettingKind,
    pub value: SettingValue,
    pub last_update: DateTime<Utc>,
}

impl Setting {
    /// Create an empty setting. Fails for unknown tags.
    pub fn new(uid: String) -> Result<Self, CoreError> {
        let kind = SettingKind::of(&uid).ok_or_else(|| CoreError::WrongElement {
            uid: uid.clone(),
            kind: "setting".into(),
        })?;
        Ok(Self {
            uid,
            kind,
            value: SettingValue::empty(kind),
            last_update: Utc::now(),
        })
    }

    /// Apply one field. Returns the full new value when the field was known.
    pub fn apply(&mut self, field: &str, value: &Value) -> Option<Change> {
        let applied = match (&mut self.value, field) {
            (SettingValue::Led { enabled }, "led") => set(enabled, as_bool(value)),
            (SettingValue::General { events_enabled, .. }, "eventsEnabled") => {
                set(events_enabled, as_bool(value))
            }
            (SettingValue::General { name, .. }, "name") => set(name, as_string(value)),
            (SettingValue::General { icon, .. }, "icon") => set(icon, as_string(value)),
            (SettingValue::General { zone_id, .. }, "zoneID") => set(zone_id, as_string(value)),
            (SettingValue::Parameter { changed }, "paramChanged") => set(changed, as_bool(value)),
            (SettingValue::Protection { local_switch, .. }, "localSwitch") => {
                set(local_switch, as_bool(value))
            }
            (SettingValue::Protection { remote_switch, .. }, "remoteSwitch") => {
                set(remote_switch, as_bool(value))
            }
            (SettingValue::TemperatureReport { enabled }, "tempReport") => {
                set(enabled, as_bool(value))
            }
            (SettingValue::AutomaticCalibration { status }, "calibrationStatus") => {
                set(status, as_bool(value))
            }
            (SettingValue::BinarySync { inverted }, "value") => set(inverted, as_bool(value)),
            (
                SettingValue::MotionSensitivity { value: v }
                | SettingValue::SwitchType { value: v }
                | SettingValue::Tone { value: v },
                "value",
            ) => set(v, as_u8(value)),
            _ => false,
        };
        if !applied {
            return None;
        }
        self.last_update = Utc::now();
        Some(Change::Setting(self.value.clone()))
    }

    /// Store a value accepted by the gateway.
    pub(crate) fn commit(&mut self, change: &SettingChange) {
        self.value = change.to_value();
        self.last_update = Utc::now();
    }
}

fn set<T>(slot: &mut T, value: Option<T>) -> bool {
    match value {
        Some(value) => {
            *slot = value;
            true
        }
        None => false,
    }
}

// ── Writes ───────────────────────────────────────────────────────────

/// New value for a setting, one variant per writable kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingChange {
    Led(bool),
    General {
        events_enabled: bool,
        name: String,
        icon: String,
        zone_id: String,
    },
    Protection {
        local_switch: bool,
        remote_switch: bool,
    },
    TemperatureReport(bool),
    AutomaticCalibration(bool),
    /// 0..=100
    MotionSensitivity(u8),
    BinarySync(bool),
    /// 1 single or 2 double switch
    SwitchType(u8),
    /// 0..=6
    Tone(u8),
}

impl SettingChange {
    pub fn kind(&self) -> SettingKind {
        match self {
            Self::Led(_) => SettingKind::Led,
            Self::General { .. } => SettingKind::General,
            Self::Protection { .. } => SettingKind::Protection,
            Self::TemperatureReport(_) => SettingKind::TemperatureReport,
            Self::AutomaticCalibration(_) => SettingKind::AutomaticCalibration,
            Self::MotionSensitivity(_) => SettingKind::MotionSensitivity,
            Self::BinarySync(_) => SettingKind::BinarySync,
            Self::SwitchType(_) => SettingKind::SwitchType,
            Self::Tone(_) => SettingKind::Tone,
        }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        match *self {
            Self::MotionSensitivity(v) if v > 100 => Err(CoreError::validation(format!(
                "motion sensitivity {v} is outside 0..=100"
            ))),
            Self::SwitchType(v) if v != 1 && v != 2 => Err(CoreError::validation(format!(
                "switch type {v} must be 1 or 2"
            ))),
            Self::Tone(v) if v > 6 => Err(CoreError::validation(format!(
                "tone {v} is outside 0..=6"
            ))),
            _ => Ok(()),
        }
    }

    /// Parameters of the `save` operation.
    pub fn save_args(&self) -> Vec<Value> {
        match self {
            Self::Led(on)
            | Self::TemperatureReport(on)
            | Self::AutomaticCalibration(on) => vec![json!(on)],
            Self::General {
                events_enabled,
                name,
                icon,
                zone_id,
            } => vec![json!({
                "eventsEnabled": events_enabled,
                "name": name,
                "icon": icon,
                "zoneID": zone_id,
            })],
            Self::Protection {
                local_switch,
                remote_switch,
            } => vec![json!({
                "localSwitch": local_switch,
                "remoteSwitch": remote_switch,
            })],
            Self::MotionSensitivity(v) | Self::SwitchType(v) | Self::Tone(v) => vec![json!(v)],
            Self::BinarySync(inverted) => vec![json!(u8::from(*inverted))],
        }
    }

    fn to_value(&self) -> SettingValue {
        match self.clone() {
            Self::Led(enabled) => SettingValue::Led { enabled },
            Self::General {
                events_enabled,
                name,
                icon,
                zone_id,
            } => SettingValue::General {
                events_enabled,
                name,
                icon,
                zone_id,
            },
            Self::Protection {
                local_switch,
                remote_switch,
            } => SettingValue::Protection {
                local_switch,
                remote_switch,
            },
            Self::TemperatureReport(enabled) => SettingValue::TemperatureReport { enabled },
            Self::AutomaticCalibration(status) => SettingValue::AutomaticCalibration { status },
            Self::MotionSensitivity(value) => SettingValue::MotionSensitivity { value },
            Self::BinarySync(inverted) => SettingValue::BinarySync { inverted },
            Self::SwitchType(value) => SettingValue::SwitchType { value },
            Self::Tone(value) => SettingValue::Tone { value },
        }
    }
}
