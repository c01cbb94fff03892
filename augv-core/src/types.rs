//! Agent data model shared by the eye and server crates

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Maximum accepted agent id length
pub const MAX_AGENT_ID_LEN: usize = 128;

/// Opaque identifier of one vehicle
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
    /// Validate and wrap an agent id taken from a connection path
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(Error::InvalidAgentId("agent id cannot be empty".to_string()));
        }
        if id.len() > MAX_AGENT_ID_LEN {
            return Err(Error::InvalidAgentId(format!(
                "agent id too long (max {} characters)",
                MAX_AGENT_ID_LEN
            )));
        }
        if id.chars().any(|c| c.is_control()) {
            return Err(Error::InvalidAgentId(
                "agent id contains control characters".to_string(),
            ));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File-system safe stem used for per-agent artifacts
    pub fn file_stem(&self) -> String {
        self.0
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Agent-relative discrete ground cell, serialized as `[dx, dy]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "[i32; 2]", into = "[i32; 2]")]
pub struct GridOffset {
    /// Lateral cells, positive to the agent's right
    pub dx: i32,
    /// Forward cells, positive ahead of the agent
    pub dy: i32,
}

impl GridOffset {
    pub const fn new(dx: i32, dy: i32) -> Self {
        Self { dx, dy }
    }
}

impl From<[i32; 2]> for GridOffset {
    fn from([dx, dy]: [i32; 2]) -> Self {
        Self { dx, dy }
    }
}

impl From<GridOffset> for [i32; 2] {
    fn from(offset: GridOffset) -> Self {
        [offset.dx, offset.dy]
    }
}

/// Deduplicated offsets that block an agent, recomputed on every frame
pub type BlockedOffsetSet = BTreeSet<GridOffset>;

/// Polygon outline in image pixels, serialized as `[[x, y], ...]`
pub type RoadOutline = Vec<[i32; 2]>;

/// Center-based bounding box in image pixels, serialized as `[cx, cy, w, h]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct BoundingBox {
    pub cx: f32,
    pub cy: f32,
    pub w: f32,
    pub h: f32,
}

impl BoundingBox {
    pub const fn new(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        Self { cx, cy, w, h }
    }

    /// Bottom-center point, where the object touches the ground
    pub fn feet(&self) -> (f32, f32) {
        (self.cx, self.cy + self.h / 2.0)
    }

    /// `(left, top, right, bottom)` corners
    pub fn corners(&self) -> (f32, f32, f32, f32) {
        (
            self.cx - self.w / 2.0,
            self.cy - self.h / 2.0,
            self.cx + self.w / 2.0,
            self.cy + self.h / 2.0,
        )
    }

    pub fn is_finite(&self) -> bool {
        self.cx.is_finite() && self.cy.is_finite() && self.w.is_finite() && self.h.is_finite()
    }
}

impl From<[f32; 4]> for BoundingBox {
    fn from([cx, cy, w, h]: [f32; 4]) -> Self {
        Self { cx, cy, w, h }
    }
}

impl From<BoundingBox> for [f32; 4] {
    fn from(bbox: BoundingBox) -> Self {
        [bbox.cx, bbox.cy, bbox.w, bbox.h]
    }
}

/// One labeled detection as reported to monitors and status queries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
    /// Feet point, only for blocking-class detections
    pub feet: Option<[f32; 2]>,
    /// Projected grid offset, only for blocking-class detections
    pub offset: Option<GridOffset>,
}

/// Current per-agent status; overwritten on every processed frame
#[derive(Debug, Clone, PartialEq, Default)]
pub enum AgentStatus {
    /// No frame processed yet
    #[default]
    Waiting,
    /// Processed, nothing blocking
    Safe,
    /// Processed, at least one blocking detection inside the forward band
    Blocked(BlockedOffsetSet),
    /// Detector or decode failure for the last frame
    Error(String),
}

impl AgentStatus {
    /// Derive the status from a fully recomputed offset set
    pub fn from_offsets(offsets: BlockedOffsetSet) -> Self {
        if offsets.is_empty() {
            AgentStatus::Safe
        } else {
            AgentStatus::Blocked(offsets)
        }
    }

    pub fn kind(&self) -> StatusKind {
        match self {
            AgentStatus::Waiting => StatusKind::Waiting,
            AgentStatus::Safe => StatusKind::Safe,
            AgentStatus::Blocked(_) => StatusKind::Blocked,
            AgentStatus::Error(_) => StatusKind::Error,
        }
    }

    pub fn blocked_offsets(&self) -> Vec<GridOffset> {
        match self {
            AgentStatus::Blocked(offsets) => offsets.iter().copied().collect(),
            _ => Vec::new(),
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            AgentStatus::Error(msg) => Some(msg.as_str()),
            _ => None,
        }
    }
}

/// Wire name of an [`AgentStatus`], plus `unknown` for agents never seen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    Waiting,
    Safe,
    Blocked,
    Error,
    Unknown,
}

/// Read model returned by status queries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentView {
    pub agent_id: AgentId,
    pub status: StatusKind,
    #[serde(default)]
    pub detections: Vec<Detection>,
    #[serde(default)]
    pub road_outline: RoadOutline,
    #[serde(default)]
    pub blocked_offsets: Vec<GridOffset>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Milliseconds since the last inbound frame
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen_ms: Option<u64>,
}

impl AgentView {
    /// Explicit result for an agent the registry has never seen
    pub fn unknown(agent_id: AgentId) -> Self {
        Self {
            agent_id,
            status: StatusKind::Unknown,
            detections: Vec::new(),
            road_outline: Vec::new(),
            blocked_offsets: Vec::new(),
            error: None,
            last_seen_ms: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_id_validation() {
        assert!(AgentId::new("AUGV_1").is_ok());
        assert!(AgentId::new("").is_err());
        assert!(AgentId::new("a".repeat(MAX_AGENT_ID_LEN + 1)).is_err());
        assert!(AgentId::new("bad\nid").is_err());
    }

    #[test]
    fn test_agent_id_file_stem() {
        let id = AgentId::new("../AUGV 1").unwrap();
        assert_eq!(id.file_stem(), "___AUGV_1");
    }

    #[test]
    fn test_grid_offset_serializes_as_pair() {
        let json = serde_json::to_string(&GridOffset::new(-1, 3)).unwrap();
        assert_eq!(json, "[-1,3]");
        let back: GridOffset = serde_json::from_str("[2,5]").unwrap();
        assert_eq!(back, GridOffset::new(2, 5));
    }

    #[test]
    fn test_bbox_feet_is_bottom_center() {
        let bbox = BoundingBox::new(80.0, 80.0, 20.0, 40.0);
        assert_eq!(bbox.feet(), (80.0, 100.0));
        assert_eq!(bbox.corners(), (70.0, 60.0, 90.0, 100.0));
    }

    #[test]
    fn test_status_from_offsets() {
        assert_eq!(AgentStatus::from_offsets(BTreeSet::new()), AgentStatus::Safe);

        let mut offsets = BTreeSet::new();
        offsets.insert(GridOffset::new(0, 1));
        offsets.insert(GridOffset::new(0, 1));
        let status = AgentStatus::from_offsets(offsets);
        assert_eq!(status.kind(), StatusKind::Blocked);
        assert_eq!(status.blocked_offsets(), vec![GridOffset::new(0, 1)]);
    }

    #[test]
    fn test_status_kind_wire_names() {
        assert_eq!(serde_json::to_string(&StatusKind::Blocked).unwrap(), "\"blocked\"");
        assert_eq!(serde_json::to_string(&StatusKind::Unknown).unwrap(), "\"unknown\"");
    }

    #[test]
    fn test_unknown_view_has_no_error_field() {
        let view = AgentView::unknown(AgentId::new("ghost").unwrap());
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["status"], "unknown");
        assert!(json.get("error").is_none());
        assert_eq!(json["blocked_offsets"], serde_json::json!([]));
    }
}
