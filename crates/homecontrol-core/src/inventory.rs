// ── Inventory ──
//
// Pulls the device list, zones and every element/setting item over RPC
// and fills the store. Runs once after connecting and again for each
// device the dispatcher reports as added.

use std::collections::HashMap;
use std::sync::Arc;

use homecontrol_api::{FunctionalItem, RpcClient};
use tracing::{debug, info};

use crate::error::CoreError;
use crate::model::value::{as_string, as_string_list};
use crate::model::{Device, ElementKind};
use crate::store::{PropertyStore, Publisher};

pub const DEVICES_PAGE: &str = "devolo.DevicesPage";
pub const GROUPING: &str = "devolo.Grouping";

pub struct Inventory {
    rpc: RpcClient,
    store: Arc<PropertyStore>,
    publisher: Arc<Publisher>,
}

impl Inventory {
    pub fn new(rpc: RpcClient, store: Arc<PropertyStore>, publisher: Arc<Publisher>) -> Self {
        Self {
            rpc,
            store,
            publisher,
        }
    }

    /// Populate the store with every device of the gateway.
    /// Returns the number of devices loaded.
    pub async fn load_all(&self) -> Result<usize, CoreError> {
        let page = self.rpc.fetch_items(&[DEVICES_PAGE.to_owned()]).await?;
        let uids = page
            .iter()
            .find(|item| item.uid == DEVICES_PAGE)
            .and_then(|item| item.properties.get("deviceUIDs"))
            .and_then(as_string_list)
            .ok_or_else(|| CoreError::ProtocolViolation {
                message: format!("{DEVICES_PAGE} carries no deviceUIDs"),
            })?;

        let zones = self.zones().await?;
        let devices = self.fetch_devices(&uids, &zones).await?;
        let count = devices.len();
        for device in devices {
            self.publisher.add_event(&device.uid);
            self.store.upsert(device);
        }
        info!(devices = count, "inventory loaded");
        Ok(count)
    }

    /// Fetch one device with all its properties and store it, replacing
    /// any placeholder.
    pub async fn load_device(&self, uid: &str) -> Result<(), CoreError> {
        let zones = self.zones().await?;
        let mut devices = self.fetch_devices(&[uid.to_owned()], &zones).await?;
        let device = devices
            .pop()
            .ok_or_else(|| CoreError::DeviceNotFound { uid: uid.to_owned() })?;
        self.publisher.add_event(&device.uid);
        self.store.upsert(device);
        debug!(uid, "device loaded");
        Ok(())
    }

    /// Zone id to zone name.
    async fn zones(&self) -> Result<HashMap<String, String>, CoreError> {
        let items = self.rpc.fetch_items(&[GROUPING.to_owned()]).await?;
        let zones = items
            .iter()
            .filter_map(|item| item.properties.get("zones"))
            .filter_map(serde_json::Value::as_array)
            .flatten()
            .filter_map(|zone| {
                let id = zone.get("id").and_then(as_string)?;
                let name = zone.get("name").and_then(as_string)?;
                Some((id, name))
            })
            .collect();
        Ok(zones)
    }

    async fn fetch_devices(
        &self,
        uids: &[String],
        zones: &HashMap<String, String>,
    ) -> Result<Vec<Device>, CoreError> {
        if uids.is_empty() {
            return Ok(Vec::new());
        }

        let items = self.rpc.fetch_items(uids).await?;
        let mut devices = Vec::with_capacity(items.len());
        for item in items {
            let mut device = Device::from_item(item.uid, &item.properties);
            if let Some(zone) = zones.get(&device.zone_id) {
                device.zone.clone_from(zone);
            }

            let children: Vec<String> = device
                .element_uids
                .iter()
                .chain(&device.setting_uids)
                .cloned()
                .collect();
            if !children.is_empty() {
                let items = self.rpc.fetch_items(&children).await?;
                apply_items(&mut device, &items);
            }
            debug!(uid = %device.uid, properties = device.property_count(), "device fetched");
            devices.push(device);
        }
        Ok(devices)
    }
}

/// Apply every field of the given element and setting items.
///
/// `LastActivity` items go last so they find their binary sensor sibling
/// whatever order the gateway listed them in.
pub(crate) fn apply_items(device: &mut Device, items: &[FunctionalItem]) {
    let (deferred, direct): (Vec<_>, Vec<_>) = items
        .iter()
        .filter(|item| {
            let known = ElementKind::of(&item.uid).is_some();
            if !known {
                debug!(uid = %item.uid, device = %device.uid, "unsupported element");
            }
            known
        })
        .partition(|item| ElementKind::of(&item.uid) == Some(ElementKind::LastActivity));

    for item in direct.into_iter().chain(deferred) {
        for (field, value) in &item.properties {
            if let Err(e) = device.apply_element(&item.uid, field, value) {
                debug!(uid = %item.uid, error = %e, "element not applied");
            }
        }
    }
}
