//! Point ingestion pipeline and registry administration
//!
//! The Pipeline owns the shared registries and state stores and is the
//! single entry point for collaborators:
//! - `ingest` / `ingest_for_device` - evaluate a batch, return transitions
//! - `latest_positions` - last accepted point per device
//! - fence and device administration (see `admin`)
//!
//! All methods take `&self`; share a Pipeline across tasks with `Arc`.

mod admin;
mod ingest;

pub use ingest::{IngestReport, PointError};

use crate::domain::types::{DeviceId, TrackingPoint};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::services::containment::ContainmentStore;
use crate::services::device_registry::DeviceRegistry;
use crate::services::fence_index::FenceIndex;
use crate::services::position_tracker::PositionTracker;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Geofence evaluation and position tracking engine
pub struct Pipeline {
    /// Registered devices and their assets
    pub(crate) devices: Arc<DeviceRegistry>,
    /// Fence definitions and candidate resolution
    pub(crate) fences: Arc<FenceIndex>,
    /// Latest accepted point per device
    pub(crate) positions: PositionTracker,
    /// Inside/outside state per (device, fence)
    pub(crate) containment: ContainmentStore,
    pub(crate) metrics: Arc<Metrics>,
    max_batch_points: usize,
}

impl Pipeline {
    /// Create an empty engine (no fences, no devices)
    pub fn new(config: &Config, metrics: Arc<Metrics>) -> Self {
        let devices = Arc::new(DeviceRegistry::new());
        let fences = Arc::new(FenceIndex::new(devices.clone(), config.candidate_policy()));
        info!(
            candidate_policy = %config.candidate_policy().as_str(),
            lock_timeout_ms = %config.lock_timeout_ms(),
            max_batch_points = %config.max_batch_points(),
            "pipeline_initialized"
        );
        Self {
            devices,
            fences,
            positions: PositionTracker::new(),
            containment: ContainmentStore::with_lock_timeout(Duration::from_millis(
                config.lock_timeout_ms(),
            )),
            metrics,
            max_batch_points: config.max_batch_points(),
        }
    }

    /// Last accepted point for every device
    pub fn latest_positions(&self) -> HashMap<DeviceId, TrackingPoint> {
        self.positions.latest_all()
    }

    pub fn latest_position(&self, device_id: &DeviceId) -> Option<TrackingPoint> {
        self.positions.latest(device_id)
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Number of devices with a latest position
    pub fn tracked_devices(&self) -> usize {
        self.positions.len()
    }

    pub fn fence_count(&self) -> usize {
        self.fences.len()
    }
}
