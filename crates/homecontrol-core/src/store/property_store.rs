// ── Property store ──
//
// Devices keyed by uid. Only the dispatcher and the inventory mutate;
// readers receive clones so no shard lock outlives a call.

use dashmap::DashMap;
use tokio::sync::watch;

use crate::model::Device;

/// Concurrent map of device uid to device.
pub struct PropertyStore {
    devices: DashMap<String, Device>,
    /// Bumped on every mutation.
    version: watch::Sender<u64>,
}

impl Default for PropertyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PropertyStore {
    pub fn new() -> Self {
        let (version, _) = watch::channel(0u64);
        Self {
            devices: DashMap::new(),
            version,
        }
    }

    // ── Reads ────────────────────────────────────────────────────────

    pub fn device(&self, uid: &str) -> Option<Device> {
        self.devices.get(uid).map(|d| d.value().clone())
    }

    /// All devices ordered by uid.
    pub fn devices(&self) -> Vec<Device> {
        let mut devices: Vec<Device> = self.devices.iter().map(|d| d.value().clone()).collect();
        devices.sort_by(|a, b| a.uid.cmp(&b.uid));
        devices
    }

    pub fn device_uids(&self) -> Vec<String> {
        self.devices.iter().map(|d| d.key().clone()).collect()
    }

    pub fn contains(&self, uid: &str) -> bool {
        self.devices.contains_key(uid)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Watch the mutation counter.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    // ── Writes ───────────────────────────────────────────────────────

    /// Insert or replace a device. Returns `true` when the uid was new.
    pub fn upsert(&self, device: Device) -> bool {
        let is_new = self.devices.insert(device.uid.clone(), device).is_none();
        self.bump_version();
        is_new
    }

    /// Remove a device with all its properties.
    pub fn remove(&self, uid: &str) -> Option<Device> {
        let removed = self.devices.remove(uid).map(|(_, d)| d);
        if removed.is_some() {
            self.bump_version();
        }
        removed
    }

    /// Run `f` against the stored device, if present.
    pub fn with_device_mut<R>(&self, uid: &str, f: impl FnOnce(&mut Device) -> R) -> Option<R> {
        let result = self.devices.get_mut(uid).map(|mut d| f(d.value_mut()))?;
        self.bump_version();
        Some(result)
    }

    fn bump_version(&self) {
        self.version.send_modify(|v| *v = v.wrapping_add(1));
    }
}
