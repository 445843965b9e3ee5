//! Registry of tracking devices and their asset association
//!
//! Supplies the asset tag set used for candidate fence resolution. A device
//! belongs to exactly one asset; re-registering under another asset moves it.

use crate::domain::error::{EngineError, Result};
use crate::domain::fence::validate_label;
use crate::domain::types::{AssetId, DeviceId, TrackingDevice};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::collections::BTreeSet;
use tracing::{debug, info};

#[derive(Default)]
struct RegistryInner {
    devices: FxHashMap<DeviceId, TrackingDevice>,
    by_asset: FxHashMap<AssetId, BTreeSet<DeviceId>>,
}

impl RegistryInner {
    fn unlink(&mut self, device: &TrackingDevice) {
        if let Some(ids) = self.by_asset.get_mut(&device.asset_id) {
            ids.remove(&device.id);
            if ids.is_empty() {
                self.by_asset.remove(&device.asset_id);
            }
        }
    }
}

/// Device registry (read-mostly, consistent read-after-write)
#[derive(Default)]
pub struct DeviceRegistry {
    inner: RwLock<RegistryInner>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a device. Returns the previous registration.
    pub fn register(&self, device: TrackingDevice) -> Result<Option<TrackingDevice>> {
        let device = normalize(device)?;
        let mut inner = self.inner.write();

        let previous = inner.devices.remove(&device.id);
        if let Some(ref prev) = previous {
            inner.unlink(prev);
            if prev.asset_id != device.asset_id {
                info!(
                    device_id = %device.id,
                    from_asset = %prev.asset_id,
                    to_asset = %device.asset_id,
                    "device_reassigned"
                );
            }
        } else {
            debug!(device_id = %device.id, asset_id = %device.asset_id, "device_registered");
        }

        inner.by_asset.entry(device.asset_id.clone()).or_default().insert(device.id.clone());
        inner.devices.insert(device.id.clone(), device);
        Ok(previous)
    }

    pub fn get(&self, id: &DeviceId) -> Option<TrackingDevice> {
        self.inner.read().devices.get(id).cloned()
    }

    /// Remove a device, returning its last registration
    pub fn remove(&self, id: &DeviceId) -> Result<TrackingDevice> {
        let mut inner = self.inner.write();
        let device = inner.devices.remove(id).ok_or_else(|| EngineError::device_not_found(id))?;
        inner.unlink(&device);
        info!(device_id = %id, asset_id = %device.asset_id, "device_removed");
        Ok(device)
    }

    /// All devices, ordered by id
    pub fn list_all(&self) -> Vec<TrackingDevice> {
        let mut devices: Vec<_> = self.inner.read().devices.values().cloned().collect();
        devices.sort_by(|a, b| a.id.cmp(&b.id));
        devices
    }

    pub fn asset_of(&self, id: &DeviceId) -> Option<AssetId> {
        self.inner.read().devices.get(id).map(|d| d.asset_id.clone())
    }

    /// Devices owned by an asset, ordered by id
    pub fn devices_for_asset(&self, asset_id: &AssetId) -> Vec<TrackingDevice> {
        let inner = self.inner.read();
        inner
            .by_asset
            .get(asset_id)
            .map(|ids| ids.iter().filter_map(|id| inner.devices.get(id).cloned()).collect())
            .unwrap_or_default()
    }

    /// Union of the tags of every device owned by the asset
    pub fn asset_tags(&self, asset_id: &AssetId) -> BTreeSet<String> {
        let inner = self.inner.read();
        let mut tags = BTreeSet::new();
        if let Some(ids) = inner.by_asset.get(asset_id) {
            for device in ids.iter().filter_map(|id| inner.devices.get(id)) {
                tags.extend(device.tags.iter().cloned());
            }
        }
        tags
    }

    /// Devices carrying at least one of the given tags, ordered by id
    pub fn find_containing_any_tags(&self, tags: &[String]) -> Vec<TrackingDevice> {
        let mut devices: Vec<_> = self
            .inner
            .read()
            .devices
            .values()
            .filter(|d| tags.iter().any(|t| d.tags.contains(t)))
            .cloned()
            .collect();
        devices.sort_by(|a, b| a.id.cmp(&b.id));
        devices
    }

    pub fn len(&self) -> usize {
        self.inner.read().devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn normalize(device: TrackingDevice) -> Result<TrackingDevice> {
    let id = validate_label("device id", device.id.as_str())?;
    let asset = validate_label("asset id", device.asset_id.as_str())?;
    let name = validate_label("device name", &device.name)?;
    let mut tags = BTreeSet::new();
    for tag in &device.tags {
        let tag = validate_label("tag", tag)?;
        // Trimming can collapse two distinct raw tags
        if !tags.insert(tag.clone()) {
            return Err(EngineError::Validation(format!("duplicate tag: {tag}")));
        }
    }
    Ok(TrackingDevice { id: DeviceId(id), name, asset_id: AssetId(asset), tags })
}
