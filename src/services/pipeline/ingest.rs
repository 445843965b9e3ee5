//! Batch ingestion
//!
//! A batch is applied as an explicit sort-then-fold: points are sorted by
//! timestamp (sequence breaks ties, the sort is stable) and then folded one
//! by one through the Position Tracker and every candidate fence. Arrival
//! order never reaches the state stores.
//!
//! Failures for one point or one fence are collected in the report and the
//! batch continues. Only batch-level problems (empty, oversized, unknown
//! device) fail the call.

use super::Pipeline;
use crate::domain::error::{EngineError, Result};
use crate::domain::types::{AssetId, DeviceId, FenceId, TrackingPoint, TransitionEvent, TransitionKind};
use chrono::{DateTime, Utc};
use std::time::Instant;
use tracing::{debug, info, warn};

/// A failure contained to one point (and optionally one fence)
#[derive(Debug, Clone, PartialEq)]
pub struct PointError {
    pub device_id: DeviceId,
    pub fence_id: Option<FenceId>,
    pub timestamp: DateTime<Utc>,
    pub error: EngineError,
}

/// Outcome of one `ingest` call
#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    /// Transitions in production order: point timestamp, then ascending fence id
    pub events: Vec<TransitionEvent>,
    /// Per-point and per-fence failures that did not abort the batch
    pub errors: Vec<PointError>,
    /// Points stored as their device's latest position
    pub accepted: usize,
    /// Points not newer than the stored latest position
    pub stale: usize,
    /// Points dropped by validation
    pub rejected: usize,
}

impl IngestReport {
    /// No per-point or per-fence failures
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn count(&self, kind: TransitionKind) -> usize {
        self.events.iter().filter(|e| e.kind == kind).count()
    }
}

fn validate_point(point: &TrackingPoint) -> Result<()> {
    if point.device_id.as_str().trim().is_empty() {
        return Err(EngineError::InvalidPoint("missing device id".to_string()));
    }
    if !point.coordinate().is_valid() {
        return Err(EngineError::InvalidPoint(format!(
            "coordinate out of range: ({}, {})",
            point.latitude, point.longitude
        )));
    }
    if let Some(acc) = point.accuracy_m {
        if !acc.is_finite() || acc < 0.0 {
            return Err(EngineError::InvalidPoint(format!("accuracy {acc} m")));
        }
    }
    Ok(())
}

impl Pipeline {
    /// Ingest a batch of device-stamped points for one asset
    ///
    /// Every point is re-stamped with `asset_id`. Points rejected as stale by
    /// the Position Tracker are still evaluated; the Containment State Store
    /// ignores them if a newer point was already evaluated for the pair, so
    /// resubmitting a batch yields no new events.
    pub fn ingest(&self, asset_id: &AssetId, points: Vec<TrackingPoint>) -> Result<IngestReport> {
        let started = Instant::now();

        if points.is_empty() {
            self.metrics.record_batch_rejected();
            warn!(asset_id = %asset_id, "batch_rejected_empty");
            return Err(EngineError::EmptyBatch);
        }
        if points.len() > self.max_batch_points {
            self.metrics.record_batch_rejected();
            warn!(asset_id = %asset_id, len = %points.len(), max = %self.max_batch_points, "batch_rejected_too_large");
            return Err(EngineError::BatchTooLarge { len: points.len(), max: self.max_batch_points });
        }

        let mut batch = points;
        for point in &mut batch {
            point.asset_id = asset_id.clone();
        }
        batch.sort_by_key(TrackingPoint::order_key);

        let mut report = IngestReport::default();
        for point in &batch {
            self.apply_point(asset_id, point, &mut report);
        }

        let latency_us = started.elapsed().as_micros() as u64;
        self.metrics.record_batch(batch.len(), latency_us);

        if report.is_clean() {
            debug!(
                asset_id = %asset_id,
                points = %batch.len(),
                accepted = %report.accepted,
                stale = %report.stale,
                events = %report.events.len(),
                latency_us = %latency_us,
                "batch_ingested"
            );
        } else {
            info!(
                asset_id = %asset_id,
                points = %batch.len(),
                events = %report.events.len(),
                errors = %report.errors.len(),
                rejected = %report.rejected,
                "batch_ingested_with_errors"
            );
        }
        Ok(report)
    }

    /// Ingest points reported by one device, resolving its asset
    ///
    /// Every point is stamped with `device_id`.
    pub fn ingest_for_device(
        &self,
        device_id: &DeviceId,
        points: Vec<TrackingPoint>,
    ) -> Result<IngestReport> {
        let asset_id =
            self.devices.asset_of(device_id).ok_or_else(|| EngineError::device_not_found(device_id))?;
        let points = points
            .into_iter()
            .map(|mut p| {
                p.device_id = device_id.clone();
                p
            })
            .collect();
        self.ingest(&asset_id, points)
    }

    /// Fold one point into the tracker and every candidate fence
    fn apply_point(&self, asset_id: &AssetId, point: &TrackingPoint, report: &mut IngestReport) {
        if let Err(error) = validate_point(point) {
            self.metrics.record_point_rejected();
            warn!(device_id = %point.device_id, ts = %point.timestamp, error = %error, "point_rejected");
            report.rejected += 1;
            report.errors.push(PointError {
                device_id: point.device_id.clone(),
                fence_id: None,
                timestamp: point.timestamp,
                error,
            });
            return;
        }

        let accepted = self.positions.update_if_newer(&point.device_id, point);
        self.metrics.record_point(accepted);
        if accepted {
            report.accepted += 1;
        } else {
            report.stale += 1;
        }

        // Looked up per point: a concurrent fence edit is picked up by the next point
        for fence in self.fences.candidates_for_asset(asset_id) {
            match self.containment.evaluate(&fence, point) {
                Ok(Some(event)) => {
                    self.metrics.record_transition(event.kind);
                    report.events.push(event);
                }
                Ok(None) => {}
                Err(error) => {
                    self.metrics.record_fence_error();
                    warn!(
                        device_id = %point.device_id,
                        fence_id = %fence.id,
                        fence = %fence.name,
                        error = %error,
                        "fence_evaluation_failed"
                    );
                    report.errors.push(PointError {
                        device_id: point.device_id.clone(),
                        fence_id: Some(fence.id),
                        timestamp: point.timestamp,
                        error,
                    });
                }
            }
        }
    }
}
