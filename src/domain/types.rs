//! Shared types for the geofence gateway

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Newtype wrapper for device IDs (assigned by the device itself)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Newtype wrapper for asset IDs
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(pub String);

impl AssetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AssetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Newtype wrapper for geofence IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct FenceId(pub u64);

impl std::fmt::Display for FenceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// WGS84 coordinate in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    #[inline]
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Finite and within [-90, 90] x [-180, 180]
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// A single geolocation report from a device. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingPoint {
    pub device_id: DeviceId,
    /// Overwritten with the batch's asset on ingestion
    #[serde(default = "unassigned_asset")]
    pub asset_id: AssetId,
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: DateTime<Utc>,
    /// Device-side sequence number, used only to order equal timestamps
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,
    /// Reported horizontal accuracy in metres
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy_m: Option<f64>,
}

fn unassigned_asset() -> AssetId {
    AssetId(String::new())
}

impl TrackingPoint {
    pub fn new(
        device_id: DeviceId,
        asset_id: AssetId,
        latitude: f64,
        longitude: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self { device_id, asset_id, latitude, longitude, timestamp, sequence: None, accuracy_m: None }
    }

    #[inline]
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }

    /// Sort key for batch ordering: timestamp first, sequence as tie-break
    #[inline]
    pub(crate) fn order_key(&self) -> (DateTime<Utc>, u64) {
        (self.timestamp, self.sequence.unwrap_or(0))
    }
}

/// A registered tracking device. Maps to exactly one asset at a time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingDevice {
    pub id: DeviceId,
    pub name: String,
    pub asset_id: AssetId,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

/// Direction of a containment change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    Entered,
    Exited,
}

impl TransitionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionKind::Entered => "entered",
            TransitionKind::Exited => "exited",
        }
    }
}

impl std::fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Emitted once per genuine containment change for a (device, fence) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionEvent {
    /// Time-ordered id so downstream consumers can dedupe
    pub event_id: Uuid,
    pub device_id: DeviceId,
    pub fence_id: FenceId,
    pub asset_id: AssetId,
    pub kind: TransitionKind,
    pub point: TrackingPoint,
    pub occurred_at: DateTime<Utc>,
}

impl TransitionEvent {
    pub fn new(fence_id: FenceId, kind: TransitionKind, point: TrackingPoint) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            device_id: point.device_id.clone(),
            fence_id,
            asset_id: point.asset_id.clone(),
            kind,
            occurred_at: point.timestamp,
            point,
        }
    }

    /// Serialize as a single JSON line for egress
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Last known containment of a device in a fence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainmentState {
    pub device_id: DeviceId,
    pub fence_id: FenceId,
    pub is_inside: bool,
    pub last_evaluated_at: DateTime<Utc>,
}
