//! Services - geofence evaluation and state management
//!
//! - `geometry` - Containment and distance math for fence shapes
//! - `device_registry` - Devices and their asset assignment
//! - `fence_index` - Fence definitions and candidate resolution
//! - `position_tracker` - Latest accepted point per device
//! - `containment` - Inside/outside state per (device, fence)
//! - `pipeline` - Batch ingestion over all of the above

pub mod containment;
pub mod device_registry;
pub mod fence_index;
pub mod geometry;
pub mod pipeline;
pub mod position_tracker;

pub use containment::ContainmentStore;
pub use device_registry::DeviceRegistry;
pub use fence_index::{CandidatePolicy, FenceIndex};
pub use pipeline::{IngestReport, Pipeline, PointError};
pub use position_tracker::PositionTracker;
