//! Containment state store - per (device, fence) inside/outside state machine
//!
//! Each pair owns its own mutex, so evaluations for one pair are serialized
//! while different pairs proceed in parallel. The slot map lock is held only
//! long enough to fetch or create a slot, never while a pair lock is held.
//!
//! Deleted fences are remembered as retired. An evaluation that raced the
//! deletion sees the mark under the pair lock and drops the slot instead of
//! recreating state for a fence that no longer exists.

use crate::domain::error::{EngineError, Result};
use crate::domain::fence::GeoFence;
use crate::domain::types::{ContainmentState, DeviceId, FenceId, TrackingPoint, TransitionEvent, TransitionKind};
use crate::services::geometry;
use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Default bound on waiting for a pair lock
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

type PairKey = (DeviceId, FenceId);
type Slot = Arc<Mutex<Option<ContainmentState>>>;

pub struct ContainmentStore {
    slots: DashMap<PairKey, Slot>,
    retired: DashSet<FenceId>,
    lock_timeout: Duration,
}

impl ContainmentStore {
    pub fn new() -> Self {
        Self::with_lock_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self { slots: DashMap::new(), retired: DashSet::new(), lock_timeout }
    }

    fn slot(&self, key: PairKey) -> Slot {
        self.slots.entry(key).or_default().clone()
    }

    /// Evaluate a point against a fence for the point's device
    ///
    /// Returns `Entered`/`Exited` on a state change. The first evaluation of a
    /// pair emits `Entered` if the device is already inside. A point not newer
    /// than the pair's last evaluation leaves the state untouched.
    pub fn evaluate(&self, fence: &GeoFence, point: &TrackingPoint) -> Result<Option<TransitionEvent>> {
        let device_id = &point.device_id;
        let key = (device_id.clone(), fence.id);
        let slot = self.slot(key.clone());
        let Some(mut state) = slot.try_lock_for(self.lock_timeout) else {
            error!(
                device_id = %device_id,
                fence_id = %fence.id,
                timeout_ms = %self.lock_timeout.as_millis(),
                "containment_lock_timeout"
            );
            return Err(EngineError::ConcurrencyConflict { device_id: device_id.clone(), fence_id: fence.id });
        };

        if self.retired.contains(&fence.id) {
            drop(state);
            self.slots.remove_if(&key, |_, existing| Arc::ptr_eq(existing, &slot));
            debug!(device_id = %device_id, fence_id = %fence.id, "containment_fence_retired");
            return Ok(None);
        }

        if let Some(ref current) = *state {
            if point.timestamp <= current.last_evaluated_at {
                debug!(
                    device_id = %device_id,
                    fence_id = %fence.id,
                    point_ts = %point.timestamp,
                    last_evaluated_at = %current.last_evaluated_at,
                    "containment_point_not_newer"
                );
                return Ok(None);
            }
        }

        // Geometry errors leave the stored state untouched
        let inside = geometry::contains(&fence.shape, &point.coordinate())?;

        let kind = match state.as_mut() {
            None => {
                *state = Some(ContainmentState {
                    device_id: device_id.clone(),
                    fence_id: fence.id,
                    is_inside: inside,
                    last_evaluated_at: point.timestamp,
                });
                inside.then_some(TransitionKind::Entered)
            }
            Some(current) => {
                let was_inside = current.is_inside;
                current.is_inside = inside;
                current.last_evaluated_at = point.timestamp;
                match (was_inside, inside) {
                    (false, true) => Some(TransitionKind::Entered),
                    (true, false) => Some(TransitionKind::Exited),
                    _ => None,
                }
            }
        };

        Ok(kind.map(|kind| {
            info!(
                device_id = %device_id,
                fence_id = %fence.id,
                fence = %fence.name,
                kind = %kind,
                ts = %point.timestamp,
                "fence_transition"
            );
            TransitionEvent::new(fence.id, kind, point.clone())
        }))
    }

    /// Stored state for a pair, if it has ever been evaluated
    pub fn get(&self, device_id: &DeviceId, fence_id: FenceId) -> Option<ContainmentState> {
        let slot = self.slots.get(&(device_id.clone(), fence_id))?.value().clone();
        let state = slot.lock().clone();
        state
    }

    /// Fences the device is currently recorded inside, ascending id
    pub fn fences_containing(&self, device_id: &DeviceId) -> Vec<FenceId> {
        let slots: Vec<(FenceId, Slot)> = self
            .slots
            .iter()
            .filter(|entry| &entry.key().0 == device_id)
            .map(|entry| (entry.key().1, entry.value().clone()))
            .collect();

        let mut inside: Vec<FenceId> = slots
            .into_iter()
            .filter(|(_, slot)| slot.lock().as_ref().is_some_and(|s| s.is_inside))
            .map(|(id, _)| id)
            .collect();
        inside.sort();
        inside
    }

    /// Drop every state for a device. Returns the number removed.
    pub fn forget_device(&self, device_id: &DeviceId) -> usize {
        let before = self.slots.len();
        self.slots.retain(|(d, _), _| d != device_id);
        let removed = before.saturating_sub(self.slots.len());
        debug!(device_id = %device_id, removed = %removed, "containment_device_forgotten");
        removed
    }

    /// Drop every state for a deleted fence and retire its id so in-flight
    /// evaluations cannot recreate it. Returns the number removed.
    pub fn forget_fence(&self, fence_id: FenceId) -> usize {
        self.retired.insert(fence_id);
        let before = self.slots.len();
        self.slots.retain(|(_, f), _| *f != fence_id);
        let removed = before.saturating_sub(self.slots.len());
        debug!(fence_id = %fence_id, removed = %removed, "containment_fence_forgotten");
        removed
    }

    /// Accept evaluations for a fence id again (a deleted fence restored from storage)
    pub fn revive_fence(&self, fence_id: FenceId) {
        self.retired.remove(&fence_id);
    }

    /// Number of tracked (device, fence) pairs
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl Default for ContainmentStore {
    fn default() -> Self {
        Self::new()
    }
}
