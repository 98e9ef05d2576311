// ── Update dispatcher ──
//
// Routes push notifications to the owning device by uid prefix, mutates
// the store and then publishes. Runs on one task so notifications are
// applied in arrival order.

use std::collections::HashSet;
use std::sync::Arc;

use homecontrol_api::{GatewayDescriptor, PushNotification};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::inventory::DEVICES_PAGE;
use crate::model::uid::{device_uid, setting_device_uid};
use crate::model::value::{as_bool, as_string_list};
use crate::model::{Change, ElementKind};
use crate::store::{Message, PropertyStore, Publisher};

pub const GATEWAY_ACCESSIBILITY: &str = "devolo.mprm.gw.GatewayAccessibilityFI";
const DEVICE_PREFIX: &str = "hdm:";

/// What handling a notification did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A change was stored and published.
    Applied,
    /// Nothing recognised; logged and dropped.
    Ignored,
    /// A placeholder for a new device was stored. Its items still need to
    /// be fetched.
    DeviceAdded(String),
    DeviceRemoved(String),
}

pub struct Dispatcher {
    store: Arc<PropertyStore>,
    publisher: Arc<Publisher>,
    gateway: Arc<GatewayDescriptor>,
}

impl Dispatcher {
    pub fn new(
        store: Arc<PropertyStore>,
        publisher: Arc<Publisher>,
        gateway: Arc<GatewayDescriptor>,
    ) -> Self {
        Self {
            store,
            publisher,
            gateway,
        }
    }

    /// Apply one notification.
    pub fn handle(&self, notification: &PushNotification) -> Outcome {
        let (Some(uid), Some(field), Some(value)) = (
            notification.uid(),
            notification.property_name(),
            notification.new_value(),
        ) else {
            debug!("notification without uid, property name or value");
            return Outcome::Ignored;
        };

        if uid == DEVICES_PAGE {
            if field == "deviceUIDs" {
                return self.device_count_changed(value);
            }
            return Outcome::Ignored;
        }
        if uid == GATEWAY_ACCESSIBILITY {
            if field == "gatewayAccessible" {
                return self.gateway_accessibility(value);
            }
            return Outcome::Ignored;
        }
        if uid.starts_with(DEVICE_PREFIX) {
            return self.device_field(uid, field, value);
        }
        match ElementKind::of(uid) {
            Some(kind) => self.element_field(kind, uid, field, value),
            None => {
                debug!(uid, field, "no handler for notification");
                Outcome::Ignored
            }
        }
    }

    // ── Handlers ─────────────────────────────────────────────────────

    fn device_count_changed(&self, value: &Value) -> Outcome {
        let Some(remote) = as_string_list(value) else {
            warn!("deviceUIDs is not a list");
            return Outcome::Ignored;
        };
        let local = self.store.device_uids();

        if remote.len() > local.len() {
            let known: HashSet<&str> = local.iter().map(String::as_str).collect();
            let Some(added) = remote.into_iter().find(|uid| !known.contains(uid.as_str())) else {
                return Outcome::Ignored;
            };
            info!(uid = %added, "device added");
            self.store.upsert(crate::model::Device::new(added.clone()));
            self.publisher.add_event(&added);
            self.publish(DEVICES_PAGE, &added, Change::DeviceAdded(added.clone()));
            return Outcome::DeviceAdded(added);
        }

        if remote.len() < local.len() {
            let remaining: HashSet<&str> = remote.iter().map(String::as_str).collect();
            let Some(removed) = local.into_iter().find(|uid| !remaining.contains(uid.as_str()))
            else {
                warn!("device list shrank but no local device is missing from it");
                return Outcome::Ignored;
            };
            info!(uid = %removed, "device removed");
            self.store.remove(&removed);
            self.publish(DEVICES_PAGE, &removed, Change::DeviceRemoved(removed.clone()));
            self.publisher.delete_event(&removed);
            return Outcome::DeviceRemoved(removed);
        }

        Outcome::Ignored
    }

    fn gateway_accessibility(&self, value: &Value) -> Outcome {
        let accessible = value.get("accessible").and_then(as_bool);
        let online_sync = value.get("onlineSync").and_then(as_bool);
        let (Some(accessible), Some(online_sync)) = (accessible, online_sync) else {
            warn!(%value, "malformed gateway accessibility");
            return Outcome::Ignored;
        };

        self.gateway.set_online(accessible);
        self.gateway.set_sync(online_sync);
        let id = self.gateway.id().to_owned();
        self.publish(
            &id,
            &id,
            Change::GatewayAccessible {
                accessible,
                online_sync,
            },
        );
        Outcome::Applied
    }

    fn device_field(&self, uid: &str, field: &str, value: &Value) -> Outcome {
        match self.store.with_device_mut(uid, |device| device.set_field(field, value)) {
            Some(Some(change)) => {
                self.publish(uid, uid, change);
                Outcome::Applied
            }
            Some(None) => Outcome::Ignored,
            None => {
                debug!(uid, field, "notification for unknown device");
                Outcome::Ignored
            }
        }
    }

    fn element_field(&self, kind: ElementKind, uid: &str, field: &str, value: &Value) -> Outcome {
        let owner = if kind == ElementKind::Setting {
            setting_device_uid(uid)
        } else {
            device_uid(uid)
        };

        match self
            .store
            .with_device_mut(owner, |device| device.apply_element(uid, field, value))
        {
            Some(Ok(Some((published, change)))) => {
                self.publish(owner, &published, change);
                Outcome::Applied
            }
            Some(Ok(None)) => Outcome::Ignored,
            Some(Err(e)) => {
                warn!(uid, error = %e, "could not apply notification");
                Outcome::Ignored
            }
            None => {
                debug!(uid, owner, "notification for unknown device");
                Outcome::Ignored
            }
        }
    }

    fn publish(&self, event: &str, uid: &str, change: Change) {
        let message = Message {
            uid: uid.to_owned(),
            change,
        };
        self.publisher.dispatch(event, &message);
    }
}
