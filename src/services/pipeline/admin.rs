//! Fence and device administration
//!
//! CRUD against the Fence Index and Device Registry. Deletions also drop the
//! containment state (and for devices, the latest position) they own.

use super::Pipeline;
use crate::domain::error::{EngineError, Result};
use crate::domain::fence::{FenceDraft, GeoFence};
use crate::domain::types::{AssetId, ContainmentState, DeviceId, FenceId, TrackingDevice};
use std::sync::Arc;
use tracing::info;

impl Pipeline {
    pub fn create_fence(&self, draft: FenceDraft) -> Result<Arc<GeoFence>> {
        self.fences.create(draft)
    }

    /// Insert a fence loaded from storage, keeping its id
    pub fn restore_fence(&self, fence: GeoFence) -> Result<Arc<GeoFence>> {
        let fence = self.fences.restore(fence)?;
        self.containment.revive_fence(fence.id);
        Ok(fence)
    }

    /// Replace a fence definition. Existing containment state is kept, so a
    /// reshaped fence produces transitions relative to the old verdict.
    pub fn update_fence(&self, id: FenceId, draft: FenceDraft) -> Result<Arc<GeoFence>> {
        self.fences.update(id, draft)
    }

    pub fn delete_fence(&self, id: FenceId) -> Result<Arc<GeoFence>> {
        let fence = self.fences.delete(id)?;
        let states = self.containment.forget_fence(id);
        info!(fence_id = %id, states_dropped = %states, "fence_state_collected");
        Ok(fence)
    }

    pub fn fence(&self, id: FenceId) -> Result<Arc<GeoFence>> {
        self.fences.get(id).ok_or_else(|| EngineError::fence_not_found(id))
    }

    pub fn fence_by_name(&self, name: &str) -> Result<Arc<GeoFence>> {
        self.fences.find_by_name(name).ok_or_else(|| EngineError::NotFound {
            kind: "fence",
            id: name.to_string(),
        })
    }

    pub fn fences_with_any_tags(&self, tags: &[String]) -> Vec<Arc<GeoFence>> {
        self.fences.find_containing_any_tags(tags)
    }

    pub fn fences_with_all_tags(&self, tags: &[String]) -> Vec<Arc<GeoFence>> {
        self.fences.find_containing_all_tags(tags)
    }

    pub fn list_fences(&self) -> Vec<Arc<GeoFence>> {
        self.fences.list_all()
    }

    /// Fences evaluated for an asset's points, in evaluation order
    pub fn candidates_for_asset(&self, asset_id: &AssetId) -> Vec<Arc<GeoFence>> {
        self.fences.candidates_for_asset(asset_id)
    }

    /// Register or update a device. Returns the previous registration.
    pub fn register_device(&self, device: TrackingDevice) -> Result<Option<TrackingDevice>> {
        self.devices.register(device)
    }

    pub fn remove_device(&self, id: &DeviceId) -> Result<TrackingDevice> {
        let device = self.devices.remove(id)?;
        let states = self.containment.forget_device(id);
        self.positions.remove(id);
        info!(device_id = %id, states_dropped = %states, "device_state_collected");
        Ok(device)
    }

    pub fn device(&self, id: &DeviceId) -> Result<TrackingDevice> {
        self.devices.get(id).ok_or_else(|| EngineError::device_not_found(id))
    }

    pub fn list_devices(&self) -> Vec<TrackingDevice> {
        self.devices.list_all()
    }

    pub fn devices_for_asset(&self, asset_id: &AssetId) -> Vec<TrackingDevice> {
        self.devices.devices_for_asset(asset_id)
    }

    pub fn devices_with_any_tags(&self, tags: &[String]) -> Vec<TrackingDevice> {
        self.devices.find_containing_any_tags(tags)
    }

    /// Stored containment for a pair, if it has been evaluated
    pub fn containment(&self, device_id: &DeviceId, fence_id: FenceId) -> Option<ContainmentState> {
        self.containment.get(device_id, fence_id)
    }

    /// Fences the device is currently recorded inside
    pub fn fences_containing(&self, device_id: &DeviceId) -> Vec<FenceId> {
        self.containment.fences_containing(device_id)
    }
}
