// ── Device ──
//
// A device owns its properties in one map per kind. `apply_element` is the
// single entry point for element and setting fields; the inventory and the
// push dispatcher both go through it.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use serde::Serialize;
use serde_json::{Map, Value};
use strum::Display;
use tracing::debug;

use super::property::{
    BinarySensor, BinarySwitch, Consumption, HumidityBar, MultiLevelSensor, MultiLevelSwitch,
    Property, RemoteControl, Voltage,
};
use super::setting::{Setting, SettingKind};
use super::uid::{device_uid, type_tag};
use super::value::{as_bool, as_i64, as_string, as_string_list, truthy};
use super::Change;
use crate::error::CoreError;

const LAST_ACTIVITY_TAG: &str = "devolo.LastActivity";

/// Which collection an element or setting uid routes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ElementKind {
    BinarySwitch,
    Consumption,
    MultiLevelSensor,
    Voltage,
    MultiLevelSwitch,
    BinarySensor,
    RemoteControl,
    HumidityZone,
    HumidityValue,
    LastActivity,
    Setting,
}

impl ElementKind {
    /// Classify a uid. First matching prefix wins.
    pub fn of(uid: &str) -> Option<Self> {
        let table: [(&[&str], Self); 7] = [
            (BinarySwitch::PREFIXES, Self::BinarySwitch),
            (Consumption::PREFIXES, Self::Consumption),
            (MultiLevelSensor::PREFIXES, Self::MultiLevelSensor),
            (Voltage::PREFIXES, Self::Voltage),
            (MultiLevelSwitch::PREFIXES, Self::MultiLevelSwitch),
            (BinarySensor::PREFIXES, Self::BinarySensor),
            (RemoteControl::PREFIXES, Self::RemoteControl),
        ];
        if let Some((_, kind)) = table
            .iter()
            .find(|(prefixes, _)| prefixes.iter().any(|p| uid.starts_with(p)))
        {
            return Some(*kind);
        }
        if uid.starts_with(HumidityBar::ZONE_PREFIX) {
            return Some(Self::HumidityZone);
        }
        if uid.starts_with(HumidityBar::VALUE_PREFIX) {
            return Some(Self::HumidityValue);
        }
        if type_tag(uid) == LAST_ACTIVITY_TAG {
            return Some(Self::LastActivity);
        }
        SettingKind::of(uid).map(|_| Self::Setting)
    }
}

/// Fields of the device item itself.
const DEVICE_FIELDS: &[&str] = &[
    "itemName",
    "zoneId",
    "batteryLevel",
    "batteryLow",
    "status",
    "pendingOperations",
    "manID",
    "prodID",
    "prodTypeID",
    "elementUIDs",
    "settingUIDs",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Device {
    pub uid: String,
    pub name: String,
    pub zone_id: String,
    /// Zone name resolved from the grouping item.
    pub zone: String,
    /// Percent, `-1` for mains powered devices.
    pub battery_level: i32,
    pub battery_low: bool,
    pub online: bool,
    pub pending_operations: bool,
    pub manufacturer_id: String,
    pub product_id: String,
    pub product_type_id: String,
    pub element_uids: Vec<String>,
    pub setting_uids: Vec<String>,

    pub binary_switches: BTreeMap<String, BinarySwitch>,
    pub consumptions: BTreeMap<String, Consumption>,
    pub multi_level_sensors: BTreeMap<String, MultiLevelSensor>,
    pub voltages: BTreeMap<String, Voltage>,
    pub multi_level_switches: BTreeMap<String, MultiLevelSwitch>,
    pub binary_sensors: BTreeMap<String, BinarySensor>,
    pub remote_controls: BTreeMap<String, RemoteControl>,
    pub humidity_bars: BTreeMap<String, HumidityBar>,
    pub settings: BTreeMap<String, Setting>,

    /// Item fields this client does not model.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Device {
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            name: String::new(),
            zone_id: String::new(),
            zone: String::new(),
            battery_level: -1,
            battery_low: false,
            online: false,
            pending_operations: false,
            manufacturer_id: String::new(),
            product_id: String::new(),
            product_type_id: String::new(),
            element_uids: Vec::new(),
            setting_uids: Vec::new(),
            binary_switches: BTreeMap::new(),
            consumptions: BTreeMap::new(),
            multi_level_sensors: BTreeMap::new(),
            voltages: BTreeMap::new(),
            multi_level_switches: BTreeMap::new(),
            binary_sensors: BTreeMap::new(),
            remote_controls: BTreeMap::new(),
            humidity_bars: BTreeMap::new(),
            settings: BTreeMap::new(),
            extra: Map::new(),
        }
    }

    /// Build a device from the `properties` of its functional item.
    pub fn from_item(uid: impl Into<String>, properties: &Map<String, Value>) -> Self {
        let mut device = Self::new(uid);
        for (field, value) in properties {
            if DEVICE_FIELDS.contains(&field.as_str()) {
                device.set_field(field, value);
            } else {
                device.extra.insert(field.clone(), value.clone());
            }
        }
        device
    }

    /// Apply one device-level field. Returns a change for the fields
    /// subscribers care about.
    pub fn set_field(&mut self, field: &str, value: &Value) -> Option<Change> {
        match field {
            "itemName" => self.name = as_string(value)?,
            "zoneId" => self.zone_id = as_string(value)?,
            "batteryLevel" => {
                self.battery_level = as_i64(value).and_then(|v| i32::try_from(v).ok())?;
                return Some(Change::BatteryLevel(self.battery_level));
            }
            "batteryLow" => {
                self.battery_low = as_bool(value)?;
                return Some(Change::BatteryLow(self.battery_low));
            }
            "status" => {
                self.online = as_i64(value)? == 2;
                return Some(Change::DeviceOnline(self.online));
            }
            "pendingOperations" => {
                self.pending_operations = truthy(value);
                return Some(Change::PendingOperations(self.pending_operations));
            }
            "manID" => self.manufacturer_id = as_string(value)?,
            "prodID" => self.product_id = as_string(value)?,
            "prodTypeID" => self.product_type_id = as_string(value)?,
            "elementUIDs" => self.element_uids = as_string_list(value)?,
            "settingUIDs" => self.setting_uids = as_string_list(value)?,
            _ => {}
        }
        None
    }

    /// Apply one field of an element or setting owned by this device,
    /// creating the property on first sight.
    ///
    /// Returns the uid the change is published under together with the
    /// change, or `None` when the field is not modelled.
    pub fn apply_element(
        &mut self,
        uid: &str,
        field: &str,
        value: &Value,
    ) -> Result<Option<(String, Change)>, CoreError> {
        let kind = ElementKind::of(uid).ok_or_else(|| CoreError::PropertyNotFound {
            uid: uid.to_owned(),
        })?;

        let (published, change) = match kind {
            ElementKind::BinarySwitch => {
                (uid.to_owned(), entry(&mut self.binary_switches, uid)?.update(field, value))
            }
            ElementKind::Consumption => {
                (uid.to_owned(), entry(&mut self.consumptions, uid)?.update(field, value))
            }
            ElementKind::MultiLevelSensor => (
                uid.to_owned(),
                entry(&mut self.multi_level_sensors, uid)?.update(field, value),
            ),
            ElementKind::Voltage => {
                (uid.to_owned(), entry(&mut self.voltages, uid)?.update(field, value))
            }
            ElementKind::MultiLevelSwitch => (
                uid.to_owned(),
                entry(&mut self.multi_level_switches, uid)?.update(field, value),
            ),
            ElementKind::BinarySensor => {
                (uid.to_owned(), entry(&mut self.binary_sensors, uid)?.update(field, value))
            }
            ElementKind::RemoteControl => {
                (uid.to_owned(), entry(&mut self.remote_controls, uid)?.update(field, value))
            }
            ElementKind::HumidityZone | ElementKind::HumidityValue => {
                if field != "value" {
                    return Ok(None);
                }
                let bar_uid = HumidityBar::uid_for(device_uid(uid));
                let bar_field = if kind == ElementKind::HumidityZone {
                    "zone"
                } else {
                    "value"
                };
                let change = entry(&mut self.humidity_bars, &bar_uid)?.update(bar_field, value);
                (bar_uid, change)
            }
            ElementKind::LastActivity => {
                let sensor_uid = self.last_activity_target(uid);
                let change = entry(&mut self.binary_sensors, &sensor_uid)?
                    .update("lastActivityTime", value);
                (sensor_uid, change)
            }
            ElementKind::Setting => {
                let setting = match self.settings.entry(uid.to_owned()) {
                    Entry::Occupied(e) => e.into_mut(),
                    Entry::Vacant(e) => {
                        e.insert(Setting::new(uid.to_owned())?)
                    }
                };
                (uid.to_owned(), setting.apply(field, value))
            }
        };

        if change.is_none() {
            debug!(uid, field, "field not modelled");
        }
        Ok(change.map(|change| (published, change)))
    }

    /// Binary sensor a `LastActivity` element belongs to: the plain binary
    /// sensor sibling, else the siren sibling, else a new binary sensor.
    fn last_activity_target(&self, uid: &str) -> String {
        let rest = uid.strip_prefix(LAST_ACTIVITY_TAG).unwrap_or(uid);
        let sensor = format!("devolo.BinarySensor{rest}");
        if self.binary_sensors.contains_key(&sensor) {
            return sensor;
        }
        let siren = format!("devolo.SirenBinarySensor{rest}");
        if self.binary_sensors.contains_key(&siren) {
            return siren;
        }
        sensor
    }

    /// Number of modelled properties across every kind.
    pub fn property_count(&self) -> usize {
        self.binary_switches.len()
            + self.consumptions.len()
            + self.multi_level_sensors.len()
            + self.voltages.len()
            + self.multi_level_switches.len()
            + self.binary_sensors.len()
            + self.remote_controls.len()
            + self.humidity_bars.len()
            + self.settings.len()
    }
}

fn entry<'a, P: Property>(
    map: &'a mut BTreeMap<String, P>,
    uid: &str,
) -> Result<&'a mut P, CoreError> {
    match map.entry(uid.to_owned()) {
        Entry::Occupied(e) => Ok(e.into_mut()),
        Entry::Vacant(e) => Ok(e.insert(P::new(uid.to_owned())?)),
    }
}
