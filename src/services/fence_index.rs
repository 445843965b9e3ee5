//! Fence index - name/tag lookups and candidate resolution
//!
//! Writes take the index lock exclusively, so a fence created, updated or
//! deleted is visible to every read that starts after the write returns.
//! Shapes are not rejected here: a malformed shape is stored and surfaces as
//! `InvalidShape` when the pipeline evaluates it.

use crate::domain::error::{EngineError, Result};
use crate::domain::fence::{FenceDraft, GeoFence};
use crate::domain::types::{AssetId, FenceId};
use crate::services::device_registry::DeviceRegistry;
use crate::services::geometry;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How fences are selected for an asset's points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidatePolicy {
    /// Fence shares at least one tag with the asset's devices
    #[default]
    TagMatch,
    /// Every fence is evaluated against every point
    AllFences,
}

impl CandidatePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            CandidatePolicy::TagMatch => "tag_match",
            CandidatePolicy::AllFences => "all_fences",
        }
    }
}

#[derive(Default)]
struct IndexInner {
    fences: BTreeMap<FenceId, Arc<GeoFence>>,
    by_name: FxHashMap<String, FenceId>,
    by_tag: FxHashMap<String, BTreeSet<FenceId>>,
    next_id: u64,
}

impl IndexInner {
    fn insert(&mut self, fence: GeoFence) -> Arc<GeoFence> {
        if let Err(e) = geometry::validate_shape(&fence.shape) {
            warn!(fence_id = %fence.id, name = %fence.name, error = %e, "fence_shape_invalid");
        }
        self.next_id = self.next_id.max(fence.id.0 + 1);
        self.by_name.insert(fence.name.clone(), fence.id);
        for tag in &fence.tags {
            self.by_tag.entry(tag.clone()).or_default().insert(fence.id);
        }
        let fence = Arc::new(fence);
        self.fences.insert(fence.id, fence.clone());
        fence
    }

    fn unlink(&mut self, fence: &GeoFence) {
        self.by_name.remove(&fence.name);
        for tag in &fence.tags {
            if let Some(ids) = self.by_tag.get_mut(tag) {
                ids.remove(&fence.id);
                if ids.is_empty() {
                    self.by_tag.remove(tag);
                }
            }
        }
    }

    fn ensure_name_free(&self, name: &str, owner: Option<FenceId>) -> Result<()> {
        match self.by_name.get(name) {
            Some(id) if Some(*id) != owner => Err(EngineError::DuplicateName(name.to_string())),
            _ => Ok(()),
        }
    }

    fn collect(&self, ids: impl IntoIterator<Item = FenceId>) -> Vec<Arc<GeoFence>> {
        ids.into_iter().filter_map(|id| self.fences.get(&id).cloned()).collect()
    }
}

/// Shared fence index (read-mostly, write-rare)
pub struct FenceIndex {
    inner: RwLock<IndexInner>,
    registry: Arc<DeviceRegistry>,
    policy: CandidatePolicy,
}

impl FenceIndex {
    pub fn new(registry: Arc<DeviceRegistry>, policy: CandidatePolicy) -> Self {
        Self { inner: RwLock::new(IndexInner { next_id: 1, ..Default::default() }), registry, policy }
    }

    pub fn policy(&self) -> CandidatePolicy {
        self.policy
    }

    /// Create a fence with the next free id
    pub fn create(&self, draft: FenceDraft) -> Result<Arc<GeoFence>> {
        let mut inner = self.inner.write();
        let fence = draft.into_fence(FenceId(inner.next_id))?;
        inner.ensure_name_free(&fence.name, None)?;
        info!(fence_id = %fence.id, name = %fence.name, shape = %fence.shape.kind(), "fence_created");
        Ok(inner.insert(fence))
    }

    /// Insert a fence with a known id (startup population from storage)
    pub fn restore(&self, fence: GeoFence) -> Result<Arc<GeoFence>> {
        let draft = FenceDraft {
            name: fence.name,
            shape: fence.shape,
            tags: fence.tags.into_iter().collect(),
        };
        let mut inner = self.inner.write();
        if inner.fences.contains_key(&fence.id) {
            return Err(EngineError::Validation(format!("fence id {} already exists", fence.id)));
        }
        let fence = draft.into_fence(fence.id)?;
        inner.ensure_name_free(&fence.name, None)?;
        debug!(fence_id = %fence.id, name = %fence.name, "fence_restored");
        Ok(inner.insert(fence))
    }

    /// Replace name, shape and tags of an existing fence
    pub fn update(&self, id: FenceId, draft: FenceDraft) -> Result<Arc<GeoFence>> {
        let mut inner = self.inner.write();
        let current = inner.fences.get(&id).cloned().ok_or_else(|| EngineError::fence_not_found(id))?;
        let fence = draft.into_fence(id)?;
        inner.ensure_name_free(&fence.name, Some(id))?;
        inner.unlink(&current);
        info!(fence_id = %id, name = %fence.name, "fence_updated");
        Ok(inner.insert(fence))
    }

    pub fn delete(&self, id: FenceId) -> Result<Arc<GeoFence>> {
        let mut inner = self.inner.write();
        let fence = inner.fences.remove(&id).ok_or_else(|| EngineError::fence_not_found(id))?;
        inner.unlink(&fence);
        info!(fence_id = %id, name = %fence.name, "fence_deleted");
        Ok(fence)
    }

    pub fn get(&self, id: FenceId) -> Option<Arc<GeoFence>> {
        self.inner.read().fences.get(&id).cloned()
    }

    pub fn find_by_name(&self, name: &str) -> Option<Arc<GeoFence>> {
        let inner = self.inner.read();
        inner.by_name.get(name.trim()).and_then(|id| inner.fences.get(id).cloned())
    }

    /// Fences carrying at least one of `tags`, ascending id
    pub fn find_containing_any_tags(&self, tags: &[String]) -> Vec<Arc<GeoFence>> {
        let inner = self.inner.read();
        let ids: BTreeSet<FenceId> = tags
            .iter()
            .filter_map(|t| inner.by_tag.get(t.trim()))
            .flat_map(|ids| ids.iter().copied())
            .collect();
        inner.collect(ids)
    }

    /// Fences carrying every one of `tags`, ascending id. Empty `tags` matches all.
    pub fn find_containing_all_tags(&self, tags: &[String]) -> Vec<Arc<GeoFence>> {
        let inner = self.inner.read();
        inner
            .fences
            .values()
            .filter(|f| tags.iter().all(|t| f.tags.contains(t.trim())))
            .cloned()
            .collect()
    }

    /// All fences, ascending id
    pub fn list_all(&self) -> Vec<Arc<GeoFence>> {
        self.inner.read().fences.values().cloned().collect()
    }

    /// Fences to evaluate for an asset's points, ascending id
    pub fn candidates_for_asset(&self, asset_id: &AssetId) -> Vec<Arc<GeoFence>> {
        match self.policy {
            CandidatePolicy::AllFences => self.list_all(),
            CandidatePolicy::TagMatch => {
                let tags = self.registry.asset_tags(asset_id);
                let inner = self.inner.read();
                let ids: BTreeSet<FenceId> = tags
                    .iter()
                    .filter_map(|t| inner.by_tag.get(t))
                    .flat_map(|ids| ids.iter().copied())
                    .collect();
                inner.collect(ids)
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().fences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
