//! Error taxonomy for the evaluation engine

use super::types::{DeviceId, FenceId};
use thiserror::Error;

/// Errors surfaced by the fence index, registries and ingestion pipeline
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Batch contained zero points
    #[error("empty batch")]
    EmptyBatch,

    #[error("batch of {len} points exceeds limit of {max}")]
    BatchTooLarge { len: usize, max: usize },

    /// Malformed fence geometry
    #[error("invalid shape: {0}")]
    InvalidShape(String),

    /// Point with unusable coordinates or identity
    #[error("invalid point: {0}")]
    InvalidPoint(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("fence name already in use: {0}")]
    DuplicateName(String),

    #[error("validation failed: {0}")]
    Validation(String),

    /// A per-pair lock could not be acquired in time. Indicates a locking bug.
    #[error("concurrency conflict on device {device_id} fence {fence_id}")]
    ConcurrencyConflict { device_id: DeviceId, fence_id: FenceId },
}

impl EngineError {
    pub fn fence_not_found(id: FenceId) -> Self {
        Self::NotFound { kind: "fence", id: id.to_string() }
    }

    pub fn device_not_found(id: &DeviceId) -> Self {
        Self::NotFound { kind: "device", id: id.to_string() }
    }

    /// Short label for logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineError::EmptyBatch => "empty_batch",
            EngineError::BatchTooLarge { .. } => "batch_too_large",
            EngineError::InvalidShape(_) => "invalid_shape",
            EngineError::InvalidPoint(_) => "invalid_point",
            EngineError::NotFound { .. } => "not_found",
            EngineError::DuplicateName(_) => "duplicate_name",
            EngineError::Validation(_) => "validation",
            EngineError::ConcurrencyConflict { .. } => "concurrency_conflict",
        }
    }
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
