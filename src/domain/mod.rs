//! Domain models - core geofencing types
//!
//! This module contains the canonical data types used throughout the system:
//! - `TrackingPoint` - a geolocation report from a device
//! - `GeoFence` / `FenceShape` - administrator-defined regions
//! - `TrackingDevice` - registered device and its asset association
//! - `TransitionEvent` - Entered/Exited output of the pipeline
//! - `EngineError` - error taxonomy

pub mod error;
pub mod fence;
pub mod types;

// Re-export commonly used types at module level
pub use error::EngineError;
pub use fence::{FenceDraft, FenceShape, GeoFence};
pub use types::{
    AssetId, ContainmentState, Coordinate, DeviceId, FenceId, TrackingDevice, TrackingPoint,
    TransitionEvent, TransitionKind,
};
