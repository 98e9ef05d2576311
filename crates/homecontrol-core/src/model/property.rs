// ── Element properties ──
//
// One struct per property kind. Every kind knows the uid prefixes it
// accepts and how to apply a single named field from a functional item
// or a push notification. The same `apply` runs for the initial
// inventory and for live updates.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use super::Change;
use super::value::{as_bool, as_f64, as_string, as_timestamp_ms, as_u32};
use crate::error::CoreError;

/// Common behaviour of every property kind.
pub trait Property: Sized {
    /// Human-readable kind name used in errors.
    const KIND: &'static str;
    /// Uid prefixes this kind accepts.
    const PREFIXES: &'static [&'static str];

    /// Create an empty property. Fails when `uid` belongs to another kind.
    fn new(uid: String) -> Result<Self, CoreError>;

    fn uid(&self) -> &str;

    /// Apply one field without touching the timestamp.
    fn apply(&mut self, field: &str, value: &Value) -> Option<Change>;

    fn touch(&mut self, at: DateTime<Utc>);

    /// Apply one field and stamp the update time when it was recognised.
    fn update(&mut self, field: &str, value: &Value) -> Option<Change> {
        let change = self.apply(field, value)?;
        self.touch(Utc::now());
        Some(change)
    }

    fn accepts(uid: &str) -> bool {
        Self::PREFIXES.iter().any(|prefix| uid.starts_with(prefix))
    }
}

fn check<P: Property>(uid: &str) -> Result<(), CoreError> {
    if P::accepts(uid) {
        Ok(())
    } else {
        Err(CoreError::WrongElement {
            uid: uid.to_owned(),
            kind: P::KIND.to_owned(),
        })
    }
}

macro_rules! property_basics {
    () => {
        fn uid(&self) -> &str {
            &self.uid
        }

        fn touch(&mut self, at: DateTime<Utc>) {
            self.last_update = at;
        }
    };
}

// ── BinarySwitch ─────────────────────────────────────────────────────

/// On/off switch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BinarySwitch {
    pub uid: String,
    pub state: bool,
    /// Whether the switch may be operated from the UI.
    pub enabled: bool,
    pub last_update: DateTime<Utc>,
}

impl Property for BinarySwitch {
    const KIND: &'static str = "binary switch";
    const PREFIXES: &'static [&'static str] = &["devolo.BinarySwitch:"];

    fn new(uid: String) -> Result<Self, CoreError> {
        check::<Self>(&uid)?;
        Ok(Self {
            uid,
            state: false,
            enabled: true,
            last_update: Utc::now(),
        })
    }

    fn apply(&mut self, field: &str, value: &Value) -> Option<Change> {
        match field {
            "state" => {
                self.state = as_bool(value)?;
                Some(Change::SwitchState(self.state))
            }
            "guiEnabled" => {
                self.enabled = as_bool(value)?;
                Some(Change::SwitchEnabled(self.enabled))
            }
            _ => None,
        }
    }

    property_basics!();
}

// ── Consumption ──────────────────────────────────────────────────────

/// Power meter readings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Consumption {
    pub uid: String,
    /// Current draw.
    pub current: f64,
    pub current_unit: String,
    /// Energy consumed since `total_since`.
    pub total: f64,
    pub total_unit: String,
    pub total_since: Option<DateTime<Utc>>,
    pub last_update: DateTime<Utc>,
}

impl Property for Consumption {
    const KIND: &'static str = "consumption";
    const PREFIXES: &'static [&'static str] = &["devolo.Meter:"];

    fn new(uid: String) -> Result<Self, CoreError> {
        check::<Self>(&uid)?;
        Ok(Self {
            uid,
            current: 0.0,
            current_unit: "W".into(),
            total: 0.0,
            total_unit: "kWh".into(),
            total_since: None,
            last_update: Utc::now(),
        })
    }

    fn apply(&mut self, field: &str, value: &Value) -> Option<Change> {
        match field {
            "currentValue" => {
                self.current = as_f64(value)?;
                Some(Change::CurrentConsumption(self.current))
            }
            "totalValue" => {
                self.total = as_f64(value)?;
                Some(Change::TotalConsumption(self.total))
            }
            "sinceTime" => {
                let since = as_timestamp_ms(value)?;
                self.total_since = Some(since);
                Some(Change::TotalSince(since))
            }
            _ => None,
        }
    }

    property_basics!();
}

// ── MultiLevelSensor ─────────────────────────────────────────────────

/// Numeric sensor such as temperature, light or humidity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MultiLevelSensor {
    pub uid: String,
    pub value: f64,
    pub unit: String,
    pub sensor_type: String,
    pub last_update: DateTime<Utc>,
}

impl Property for MultiLevelSensor {
    const KIND: &'static str = "multi level sensor";
    const PREFIXES: &'static [&'static str] = &["devolo.MultiLevelSensor:"];

    fn new(uid: String) -> Result<Self, CoreError> {
        check::<Self>(&uid)?;
        Ok(Self {
            uid,
            value: 0.0,
            unit: String::new(),
            sensor_type: String::new(),
            last_update: Utc::now(),
        })
    }

    fn apply(&mut self, field: &str, value: &Value) -> Option<Change> {
        match field {
            "value" => {
                self.value = as_f64(value)?;
                Some(Change::SensorValue(self.value))
            }
            "unit" => {
                self.unit = as_string(value)?;
                None
            }
            "sensorType" => {
                self.sensor_type = as_string(value)?;
                None
            }
            _ => None,
        }
    }

    property_basics!();
}

// ── Voltage ──────────────────────────────────────────────────────────

/// Mains voltage reading.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Voltage {
    pub uid: String,
    pub value: f64,
    pub last_update: DateTime<Utc>,
}

impl Property for Voltage {
    const KIND: &'static str = "voltage";
    const PREFIXES: &'static [&'static str] = &["devolo.VoltageMultiLevelSensor:"];

    fn new(uid: String) -> Result<Self, CoreError> {
        check::<Self>(&uid)?;
        Ok(Self {
            uid,
            value: 0.0,
            last_update: Utc::now(),
        })
    }

    fn apply(&mut self, field: &str, value: &Value) -> Option<Change> {
        if field != "value" {
            return None;
        }
        self.value = as_f64(value)?;
        Some(Change::Voltage(self.value))
    }

    property_basics!();
}

// ── MultiLevelSwitch ─────────────────────────────────────────────────

/// Dimmers, shutters and other switches with a value range.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MultiLevelSwitch {
    pub uid: String,
    pub value: f64,
    pub min: f64,
    pub max: f64,
    pub switch_type: String,
    pub last_update: DateTime<Utc>,
}

impl MultiLevelSwitch {
    /// Reject values outside `min..=max`.
    pub fn check_range(&self, value: f64) -> Result<(), CoreError> {
        if value < self.min || value > self.max {
            return Err(CoreError::validation(format!(
                "value {value} is outside {}..={} for {}",
                self.min, self.max, self.uid
            )));
        }
        Ok(())
    }
}

impl Property for MultiLevelSwitch {
    const KIND: &'static str = "multi level switch";
    const PREFIXES: &'static [&'static str] = &[
        "devolo.Blinds:",
        "devolo.Dimmer:",
        "devolo.MultiLevelSwitch:",
        "devolo.SirenMultiLevelSwitch:",
    ];

    fn new(uid: String) -> Result<Self, CoreError> {
        check::<Self>(&uid)?;
        Ok(Self {
            uid,
            value: 0.0,
            min: 0.0,
            max: 100.0,
            switch_type: String::new(),
            last_update: Utc::now(),
        })
    }

    fn apply(&mut self, field: &str, value: &Value) -> Option<Change> {
        match field {
            "value" => {
                self.value = as_f64(value)?;
                Some(Change::SwitchValue(self.value))
            }
            "min" => {
                self.min = as_f64(value)?;
                None
            }
            "max" => {
                self.max = as_f64(value)?;
                None
            }
            "switchType" => {
                self.switch_type = as_string(value)?;
                None
            }
            _ => None,
        }
    }

    property_basics!();
}

// ── BinarySensor ─────────────────────────────────────────────────────

/// Door/window contacts, motion detectors, siren and warning states.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BinarySensor {
    pub uid: String,
    pub state: bool,
    pub sensor_type: String,
    pub sub_type: String,
    pub last_activity: Option<DateTime<Utc>>,
    pub last_update: DateTime<Utc>,
}

impl Property for BinarySensor {
    const KIND: &'static str = "binary sensor";
    const PREFIXES: &'static [&'static str] = &[
        "devolo.BinarySensor:",
        "devolo.SirenBinarySensor:",
        "devolo.WarningBinaryFI:",
    ];

    fn new(uid: String) -> Result<Self, CoreError> {
        check::<Self>(&uid)?;
        Ok(Self {
            uid,
            state: false,
            sensor_type: String::new(),
            sub_type: String::new(),
            last_activity: None,
            last_update: Utc::now(),
        })
    }

    fn apply(&mut self, field: &str, value: &Value) -> Option<Change> {
        match field {
            "state" => {
                self.state = as_bool(value)?;
                Some(Change::SensorState(self.state))
            }
            "type" => {
                self.sensor_type = as_string(value)?;
                None
            }
            "subType" => {
                self.sub_type = as_string(value)?;
                None
            }
            "lastActivityTime" => {
                let at = as_timestamp_ms(value)?;
                self.last_activity = Some(at);
                Some(Change::LastActivity(at))
            }
            _ => None,
        }
    }

    property_basics!();
}

// ── RemoteControl ────────────────────────────────────────────────────

/// Wall switch or key fob with numbered keys.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemoteControl {
    pub uid: String,
    pub key_count: u32,
    /// Last pressed key, `0` when released.
    pub key_pressed: u32,
    pub last_update: DateTime<Utc>,
}

impl RemoteControl {
    /// Reject keys outside `1..=key_count`.
    pub fn check_key(&self, key: u32) -> Result<(), CoreError> {
        if key == 0 || key > self.key_count {
            return Err(CoreError::validation(format!(
                "key {key} is outside 1..={} for {}",
                self.key_count, self.uid
            )));
        }
        Ok(())
    }
}

impl Property for RemoteControl {
    const KIND: &'static str = "remote control";
    const PREFIXES: &'static [&'static str] = &["devolo.RemoteControl:"];

    fn new(uid: String) -> Result<Self, CoreError> {
        check::<Self>(&uid)?;
        Ok(Self {
            uid,
            key_count: 0,
            key_pressed: 0,
            last_update: Utc::now(),
        })
    }

    fn apply(&mut self, field: &str, value: &Value) -> Option<Change> {
        match field {
            "keyCount" => {
                self.key_count = as_u32(value)?;
                None
            }
            "keyPressed" => {
                self.key_pressed = as_u32(value)?;
                Some(Change::KeyPressed(self.key_pressed))
            }
            _ => None,
        }
    }

    property_basics!();
}

// ── HumidityBar ──────────────────────────────────────────────────────

/// Comfort indicator merged from the `HumidityBarZone` and
/// `HumidityBarValue` items of one device under
/// `devolo.HumidityBar:<deviceUid>`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HumidityBar {
    pub uid: String,
    /// 0 dry, 1 comfortable, 2 humid.
    pub zone: u8,
    pub value: f64,
    pub last_update: DateTime<Utc>,
}

impl HumidityBar {
    pub const ZONE_PREFIX: &'static str = "devolo.HumidityBarZone:";
    pub const VALUE_PREFIX: &'static str = "devolo.HumidityBarValue:";

    /// Synthetic uid of the bar belonging to `device_uid`.
    pub fn uid_for(device_uid: &str) -> String {
        format!("devolo.HumidityBar:{device_uid}")
    }
}

impl Property for HumidityBar {
    const KIND: &'static str = "humidity bar";
    const PREFIXES: &'static [&'static str] = &["devolo.HumidityBar:"];

    fn new(uid: String) -> Result<Self, CoreError> {
        check::<Self>(&uid)?;
        Ok(Self {
            uid,
            zone: 0,
            value: 0.0,
            last_update: Utc::now(),
        })
    }

    fn apply(&mut self, field: &str, value: &Value) -> Option<Change> {
        match field {
            "zone" => {
                self.zone = super::value::as_u8(value)?;
                Some(Change::HumidityZone(self.zone))
            }
            "value" => {
                self.value = as_f64(value)?;
                Some(Change::HumidityValue(self.value))
            }
            _ => None,
        }
    }

    property_basics!();
}
