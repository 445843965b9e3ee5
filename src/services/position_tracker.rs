//! Position tracker - latest accepted point per device
//!
//! A point replaces the stored one only if its timestamp is strictly later.
//! Stale, duplicate and out-of-order resends are a silent no-op.

use crate::domain::types::{DeviceId, TrackingPoint};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashMap;
use tracing::debug;

#[derive(Default)]
pub struct PositionTracker {
    latest: DashMap<DeviceId, TrackingPoint>,
}

impl PositionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `point` for `device_id` if newer than the current one
    ///
    /// Returns true if accepted.
    pub fn update_if_newer(&self, device_id: &DeviceId, point: &TrackingPoint) -> bool {
        match self.latest.entry(device_id.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(point.clone());
                true
            }
            Entry::Occupied(mut slot) => {
                if slot.get().timestamp < point.timestamp {
                    slot.insert(point.clone());
                    true
                } else {
                    debug!(
                        device_id = %device_id,
                        stored_ts = %slot.get().timestamp,
                        point_ts = %point.timestamp,
                        "position_stale"
                    );
                    false
                }
            }
        }
    }

    pub fn latest(&self, device_id: &DeviceId) -> Option<TrackingPoint> {
        self.latest.get(device_id).map(|p| p.value().clone())
    }

    /// Snapshot of every device's latest point
    pub fn latest_all(&self) -> HashMap<DeviceId, TrackingPoint> {
        self.latest.iter().map(|e| (e.key().clone(), e.value().clone())).collect()
    }

    pub fn remove(&self, device_id: &DeviceId) -> Option<TrackingPoint> {
        self.latest.remove(device_id).map(|(_, p)| p)
    }

    pub fn len(&self) -> usize {
        self.latest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.latest.is_empty()
    }
}
