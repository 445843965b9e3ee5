//! Geofence definitions and administrator input validation

use super::error::{EngineError, Result};
use super::types::{Coordinate, FenceId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Maximum length of fence names, device names and tags
pub const MAX_LABEL_LEN: usize = 250;

/// Region covered by a geofence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FenceShape {
    Circle { center: Coordinate, radius_m: f64 },
    /// Vertex ring; a closing vertex equal to the first is optional
    Polygon { vertices: Vec<Coordinate> },
}

impl FenceShape {
    pub fn kind(&self) -> &'static str {
        match self {
            FenceShape::Circle { .. } => "circle",
            FenceShape::Polygon { .. } => "polygon",
        }
    }
}

/// An administrator-defined region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoFence {
    pub id: FenceId,
    pub name: String,
    pub shape: FenceShape,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl GeoFence {
    pub fn has_any_tag<'a, I>(&self, tags: I) -> bool
    where
        I: IntoIterator<Item = &'a String>,
    {
        tags.into_iter().any(|t| self.tags.contains(t))
    }
}

/// Create/update request for a fence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FenceDraft {
    pub name: String,
    pub shape: FenceShape,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl FenceDraft {
    pub fn new(name: impl Into<String>, shape: FenceShape) -> Self {
        Self { name: name.into(), shape, tags: Vec::new() }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Validate name and tags, producing the fence with the given id
    pub fn into_fence(self, id: FenceId) -> Result<GeoFence> {
        let name = validate_label("fence name", &self.name)?;
        let tags = collect_tags(self.tags)?;
        Ok(GeoFence { id, name, shape: self.shape, tags })
    }
}

/// Trim and check a name or tag: non-empty and at most MAX_LABEL_LEN chars
pub fn validate_label(what: &str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(EngineError::Validation(format!("{what} must not be empty")));
    }
    if trimmed.chars().count() > MAX_LABEL_LEN {
        return Err(EngineError::Validation(format!(
            "{what} exceeds {MAX_LABEL_LEN} characters"
        )));
    }
    Ok(trimmed.to_string())
}

/// Validate each tag and reject duplicates
pub fn collect_tags<I, S>(tags: I) -> Result<BTreeSet<String>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut set = BTreeSet::new();
    for tag in tags {
        let tag = validate_label("tag", tag.as_ref())?;
        if !set.insert(tag.clone()) {
            return Err(EngineError::Validation(format!("duplicate tag: {tag}")));
        }
    }
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn circle() -> FenceShape {
        FenceShape::Circle { center: Coordinate::new(0.0, 0.0), radius_m: 100.0 }
    }

    #[test]
    fn test_draft_into_fence_trims() {
        let fence = FenceDraft::new("  Depot  ", circle())
            .with_tags(["north", " fleet "])
            .into_fence(FenceId(1))
            .unwrap();
        assert_eq!(fence.name, "Depot");
        assert!(fence.tags.contains("fleet"));
        assert!(fence.tags.contains("north"));
    }

    #[test]
    fn test_name_too_long() {
        let name = "x".repeat(MAX_LABEL_LEN + 1);
        let err = FenceDraft::new(name, circle()).into_fence(FenceId(1)).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        let name = "x".repeat(MAX_LABEL_LEN);
        assert!(FenceDraft::new(name, circle()).into_fence(FenceId(1)).is_ok());
    }

    #[test]
    fn test_duplicate_tags_rejected() {
        let err = FenceDraft::new("Yard", circle())
            .with_tags(["a", "a "])
            .into_fence(FenceId(1))
            .unwrap_err();
        assert_eq!(err, EngineError::Validation("duplicate tag: a".to_string()));
    }

    #[test]
    fn test_empty_tag_rejected() {
        assert!(collect_tags(["ok", "   "]).is_err());
    }

    #[test]
    fn test_shape_serde_tagged() {
        let json = r#"{"type":"polygon","vertices":[{"latitude":0.0,"longitude":0.0},{"latitude":1.0,"longitude":0.0},{"latitude":1.0,"longitude":1.0}]}"#;
        let shape: FenceShape = serde_json::from_str(json).unwrap();
        assert_eq!(shape.kind(), "polygon");
    }
}
