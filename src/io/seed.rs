//! Startup seed - populates fences and devices from a JSON file
//!
//! Stands in for persistent storage: fences keep their ids so transitions
//! in the egress file stay meaningful across restarts.
//!
//! ```json
//! {
//!   "devices": [{"id": "gps-1", "name": "Cab tracker", "asset_id": "truck-7", "tags": ["fleet"]}],
//!   "fences": [{"id": 1, "name": "Depot", "tags": ["fleet"],
//!               "shape": {"type": "circle", "center": {"latitude": 0.0, "longitude": 0.0}, "radius_m": 100.0}}]
//! }
//! ```

use crate::domain::fence::GeoFence;
use crate::domain::types::TrackingDevice;
use crate::services::Pipeline;
use anyhow::Context;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::info;

#[derive(Debug, Default, Deserialize)]
pub struct SeedFile {
    #[serde(default)]
    pub devices: Vec<TrackingDevice>,
    #[serde(default)]
    pub fences: Vec<GeoFence>,
}

/// Counts of what a seed load inserted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedSummary {
    pub devices: usize,
    pub fences: usize,
}

impl SeedFile {
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        serde_json::from_str(content).context("Failed to parse seed JSON")
    }

    /// Insert everything into the pipeline; the first rejected entry aborts
    pub fn apply(self, pipeline: &Pipeline) -> anyhow::Result<SeedSummary> {
        let devices = self.devices.len();
        let fences = self.fences.len();

        for device in self.devices {
            let id = device.id.clone();
            pipeline.register_device(device).with_context(|| format!("Seed device {id}"))?;
        }
        for fence in self.fences {
            let id = fence.id;
            pipeline.restore_fence(fence).with_context(|| format!("Seed fence {id}"))?;
        }

        Ok(SeedSummary { devices, fences })
    }
}

/// Load a seed file into the pipeline
pub fn load_seed<P: AsRef<Path>>(path: P, pipeline: &Pipeline) -> anyhow::Result<SeedSummary> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read seed file {}", path.display()))?;
    let summary = SeedFile::parse(&content)
        .with_context(|| format!("Invalid seed file {}", path.display()))?
        .apply(pipeline)?;

    info!(
        file = %path.display(),
        devices = %summary.devices,
        fences = %summary.fences,
        "seed_loaded"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{AssetId, FenceId};
    use crate::infra::config::Config;
    use crate::infra::metrics::Metrics;
    use std::sync::Arc;
    use tempfile::tempdir;

    const SEED: &str = r#"{
        "devices": [
            {"id": "gps-1", "name": "Cab tracker", "asset_id": "truck-7", "tags": ["fleet"]}
        ],
        "fences": [
            {"id": 4, "name": "Depot", "tags": ["fleet"],
             "shape": {"type": "circle", "center": {"latitude": 0.0, "longitude": 0.0}, "radius_m": 100.0}},
            {"id": 9, "name": "Yard",
             "shape": {"type": "polygon", "vertices": [
                {"latitude": 0.0, "longitude": 0.0},
                {"latitude": 0.0, "longitude": 0.01},
                {"latitude": 0.01, "longitude": 0.01}
             ]}}
        ]
    }"#;

    fn pipeline() -> Pipeline {
        Pipeline::new(&Config::default(), Arc::new(Metrics::new()))
    }

    #[test]
    fn test_load_seed_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("seed.json");
        fs::write(&path, SEED).unwrap();

        let pipeline = pipeline();
        let summary = load_seed(&path, &pipeline).unwrap();

        assert_eq!(summary, SeedSummary { devices: 1, fences: 2 });
        assert_eq!(pipeline.fence(FenceId(4)).unwrap().name, "Depot");
        assert_eq!(pipeline.devices_for_asset(&AssetId::new("truck-7")).len(), 1);
        assert_eq!(pipeline.candidates_for_asset(&AssetId::new("truck-7")).len(), 1);
    }

    #[test]
    fn test_created_fences_continue_after_seeded_ids() {
        let pipeline = pipeline();
        SeedFile::parse(SEED).unwrap().apply(&pipeline).unwrap();

        let draft = crate::domain::fence::FenceDraft::new(
            "New",
            crate::domain::fence::FenceShape::Circle {
                center: crate::domain::types::Coordinate::new(1.0, 1.0),
                radius_m: 10.0,
            },
        );
        assert_eq!(pipeline.create_fence(draft).unwrap().id, FenceId(10));
    }

    #[test]
    fn test_empty_seed_is_valid() {
        let seed = SeedFile::parse("{}").unwrap();
        assert_eq!(seed.apply(&pipeline()).unwrap(), SeedSummary { devices: 0, fences: 0 });
    }

    #[test]
    fn test_duplicate_fence_name_fails_load() {
        let seed = r#"{"fences": [
            {"id": 1, "name": "Depot", "shape": {"type": "circle", "center": {"latitude": 0.0, "longitude": 0.0}, "radius_m": 1.0}},
            {"id": 2, "name": "Depot", "shape": {"type": "circle", "center": {"latitude": 1.0, "longitude": 1.0}, "radius_m": 1.0}}
        ]}"#;
        let err = SeedFile::parse(seed).unwrap().apply(&pipeline()).unwrap_err();
        assert!(format!("{err:#}").contains("Seed fence 2"));
    }

    #[test]
    fn test_missing_file() {
        let err = load_seed("/nonexistent/seed.json", &pipeline()).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to read seed file"));
    }
}
