//! Batch replay - feeds JSONL batches through the pipeline
//!
//! Each input line is one batch addressed either to an asset or to a
//! registered device:
//!
//! ```text
//! {"asset_id": "truck-7", "points": [{"device_id": "gps-1", "latitude": 0.0, "longitude": 0.0, "timestamp": "2024-05-01T08:00:00Z"}]}
//! {"device_id": "gps-1", "points": [{"device_id": "gps-1", "latitude": 0.01, "longitude": 0.0, "timestamp": "2024-05-01T08:01:00Z"}]}
//! ```
//!
//! Malformed lines and rejected batches are logged and skipped. Every
//! produced transition is appended to the egress file.

use crate::domain::types::{AssetId, DeviceId, TrackingPoint};
use crate::io::egress::Egress;
use crate::services::{IngestReport, Pipeline};
use anyhow::Context;
use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// One input line
#[derive(Debug, Clone, Deserialize)]
pub struct BatchRecord {
    #[serde(default)]
    pub asset_id: Option<AssetId>,
    #[serde(default)]
    pub device_id: Option<DeviceId>,
    pub points: Vec<TrackingPoint>,
}

impl BatchRecord {
    pub fn parse(line: &str) -> anyhow::Result<Self> {
        let record: Self = serde_json::from_str(line).context("Invalid batch JSON")?;
        if record.asset_id.is_none() && record.device_id.is_none() {
            anyhow::bail!("Batch needs asset_id or device_id");
        }
        Ok(record)
    }

    fn ingest(self, pipeline: &Pipeline) -> anyhow::Result<IngestReport> {
        let report = match (self.asset_id, self.device_id) {
            (Some(asset_id), _) => pipeline.ingest(&asset_id, self.points),
            (None, Some(device_id)) => pipeline.ingest_for_device(&device_id, self.points),
            (None, None) => anyhow::bail!("Batch needs asset_id or device_id"),
        };
        Ok(report?)
    }
}

/// Totals over one replay run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub lines: u64,
    pub batches: u64,
    pub failed_batches: u64,
    pub events: u64,
    pub point_errors: u64,
    pub egress_failures: u64,
}

/// Read batches until EOF or shutdown
pub async fn run_replay<R>(
    reader: R,
    pipeline: &Pipeline,
    egress: &Egress,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<ReplayStats>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut stats = ReplayStats::default();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read batch input")?,
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!(lines = %stats.lines, "replay_interrupted");
                    break;
                }
                continue;
            }
        };
        let Some(line) = line else {
            break;
        };
        stats.lines += 1;

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let result = BatchRecord::parse(line).and_then(|record| record.ingest(pipeline));
        match result {
            Ok(report) => {
                stats.batches += 1;
                stats.events += report.events.len() as u64;
                stats.point_errors += report.errors.len() as u64;
                for failure in &report.errors {
                    debug!(
                        line = %stats.lines,
                        device_id = %failure.device_id,
                        fence_id = ?failure.fence_id.map(|id| id.0),
                        error = %failure.error,
                        "replay_point_failed"
                    );
                }
                let written = egress.write_events(&report.events);
                stats.egress_failures += (report.events.len() - written) as u64;
            }
            Err(e) => {
                stats.failed_batches += 1;
                warn!(line = %stats.lines, error = %format!("{e:#}"), "replay_batch_failed");
            }
        }
    }

    info!(
        lines = %stats.lines,
        batches = %stats.batches,
        failed_batches = %stats.failed_batches,
        events = %stats.events,
        point_errors = %stats.point_errors,
        "replay_finished"
    );
    Ok(stats)
}
