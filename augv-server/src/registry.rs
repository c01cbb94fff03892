// Agent registry
// Process-wide table of every agent seen since startup

use crate::inbox::Inbox;
use augv_core::{AgentId, AgentStatus, AgentView, Detection, RoadOutline};
use augv_eye::Frame;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

/// Result of the last processed frame
#[derive(Debug, Clone, Default)]
pub struct AgentState {
    pub status: AgentStatus,
    pub detections: Vec<Detection>,
    pub road_outline: RoadOutline,
    pub processed_frames: u64,
}

/// Per-agent entry. State is written only by the agent's own worker;
/// any number of readers may take snapshots concurrently.
pub struct AgentRecord {
    id: AgentId,
    state: RwLock<AgentState>,
    last_seen: Mutex<Instant>,
    inbox: RwLock<Option<Arc<Inbox<Frame>>>>,
}

impl AgentRecord {
    fn new(id: AgentId, now: Instant) -> Self {
        Self {
            id,
            state: RwLock::new(AgentState::default()),
            last_seen: Mutex::new(now),
            inbox: RwLock::new(None),
        }
    }

    pub fn id(&self) -> &AgentId {
        &self.id
    }

    pub fn state(&self) -> AgentState {
        self.state.read().clone()
    }

    pub fn status(&self) -> AgentStatus {
        self.state.read().status.clone()
    }

    pub fn detections(&self) -> Vec<Detection> {
        self.state.read().detections.clone()
    }

    pub fn road_outline(&self) -> RoadOutline {
        self.state.read().road_outline.clone()
    }

    /// Replace the result of the previous frame wholesale
    pub fn publish(&self, status: AgentStatus, detections: Vec<Detection>, road_outline: RoadOutline) {
        let mut state = self.state.write();
        state.status = status;
        state.detections = detections;
        state.road_outline = road_outline;
        state.processed_frames += 1;
    }

    /// Record a per-frame failure; nothing from the previous frame describes the scene
    pub fn publish_error(&self, message: impl Into<String>) {
        let mut state = self.state.write();
        state.status = AgentStatus::Error(message.into());
        state.detections.clear();
        state.road_outline.clear();
        state.processed_frames += 1;
    }

    pub fn last_seen(&self) -> Instant {
        *self.last_seen.lock()
    }

    pub fn mark_seen(&self, at: Instant) {
        *self.last_seen.lock() = at;
    }

    pub fn inbox(&self) -> Option<Arc<Inbox<Frame>>> {
        self.inbox.read().clone()
    }

    pub(crate) fn set_inbox(&self, inbox: Option<Arc<Inbox<Frame>>>) {
        *self.inbox.write() = inbox;
    }

    pub fn view(&self, now: Instant) -> AgentView {
        let state = self.state.read();
        AgentView {
            agent_id: self.id.clone(),
            status: state.status.kind(),
            detections: state.detections.clone(),
            road_outline: state.road_outline.clone(),
            blocked_offsets: state.status.blocked_offsets(),
            error: state.status.error_message().map(str::to_string),
            last_seen_ms: Some(now.saturating_duration_since(self.last_seen()).as_millis() as u64),
        }
    }
}

/// Agent table plus the latest raw frame of every connected stream
#[derive(Default)]
pub struct AgentRegistry {
    agents: RwLock<HashMap<AgentId, Arc<AgentRecord>>>,
    latest_frames: RwLock<HashMap<AgentId, Bytes>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, agent_id: &AgentId) -> Option<Arc<AgentRecord>> {
        self.agents.read().get(agent_id).cloned()
    }

    /// Record for `agent_id`, created on first contact
    pub fn get_or_create(&self, agent_id: &AgentId) -> Arc<AgentRecord> {
        if let Some(record) = self.get(agent_id) {
            return record;
        }
        let mut agents = self.agents.write();
        agents
            .entry(agent_id.clone())
            .or_insert_with(|| {
                info!("[AUGV {}] Registered", agent_id);
                Arc::new(AgentRecord::new(agent_id.clone(), Instant::now()))
            })
            .clone()
    }

    /// Mark an inbound frame for `agent_id` now
    pub fn touch(&self, agent_id: &AgentId) -> Arc<AgentRecord> {
        self.touch_at(agent_id, Instant::now())
    }

    pub fn touch_at(&self, agent_id: &AgentId, at: Instant) -> Arc<AgentRecord> {
        let record = self.get_or_create(agent_id);
        record.mark_seen(at);
        record
    }

    /// Agents seen within `window`, sorted by id
    pub fn active_agents(&self, window: Duration) -> Vec<AgentId> {
        let now = Instant::now();
        let mut active: Vec<AgentId> = self
            .agents
            .read()
            .values()
            .filter(|r| now.saturating_duration_since(r.last_seen()) <= window)
            .map(|r| r.id().clone())
            .collect();
        active.sort();
        active
    }

    pub fn view(&self, agent_id: &AgentId) -> Option<AgentView> {
        self.get(agent_id).map(|r| r.view(Instant::now()))
    }

    /// Views of every known agent, sorted by id
    pub fn views(&self) -> Vec<AgentView> {
        let now = Instant::now();
        let records: Vec<Arc<AgentRecord>> = self.agents.read().values().cloned().collect();
        let mut views: Vec<AgentView> = records.iter().map(|r| r.view(now)).collect();
        views.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        views
    }

    pub fn len(&self) -> usize {
        self.agents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.read().is_empty()
    }

    pub fn set_latest_frame(&self, agent_id: &AgentId, frame: Bytes) {
        self.latest_frames.write().insert(agent_id.clone(), frame);
    }

    pub fn clear_latest_frame(&self, agent_id: &AgentId) {
        self.latest_frames.write().remove(agent_id);
    }

    pub fn latest_frame(&self, agent_id: &AgentId) -> Option<Bytes> {
        self.latest_frames.read().get(agent_id).cloned()
    }

    /// Latest raw frame of every connected stream, sorted by agent id
    pub fn latest_frames(&self) -> Vec<(AgentId, Bytes)> {
        let mut frames: Vec<(AgentId, Bytes)> = self
            .latest_frames
            .read()
            .iter()
            .map(|(id, frame)| (id.clone(), frame.clone()))
            .collect();
        frames.sort_by(|a, b| a.0.cmp(&b.0));
        frames
    }

    /// Agents with a stream that has delivered at least one frame and is still open
    pub fn connected_streams(&self) -> Vec<AgentId> {
        self.latest_frames().into_iter().map(|(id, _)| id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use augv_core::{BlockedOffsetSet, GridOffset, StatusKind};

    fn id(s: &str) -> AgentId {
        AgentId::new(s).unwrap()
    }

    #[test]
    fn test_record_created_once() {
        let registry = AgentRegistry::new();
        let a = registry.get_or_create(&id("A1"));
        let b = registry.get_or_create(&id("A1"));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
        assert_eq!(a.status(), AgentStatus::Waiting);
    }

    #[test]
    fn test_publish_overwrites_previous_result() {
        let registry = AgentRegistry::new();
        let record = registry.get_or_create(&id("A1"));

        let offsets: BlockedOffsetSet = [GridOffset::new(0, 1)].into_iter().collect();
        record.publish(AgentStatus::from_offsets(offsets), Vec::new(), vec![[0, 0], [5, 5]]);
        let view = registry.view(&id("A1")).unwrap();
        assert_eq!(view.status, StatusKind::Blocked);
        assert_eq!(view.blocked_offsets, vec![GridOffset::new(0, 1)]);

        record.publish(AgentStatus::Safe, Vec::new(), Vec::new());
        let view = registry.view(&id("A1")).unwrap();
        assert_eq!(view.status, StatusKind::Safe);
        assert!(view.blocked_offsets.is_empty());
        assert!(view.road_outline.is_empty());
        assert_eq!(record.state().processed_frames, 2);
    }

    #[test]
    fn test_error_view_carries_message() {
        let registry = AgentRegistry::new();
        registry.get_or_create(&id("A2")).publish_error("detector offline");
        let view = registry.view(&id("A2")).unwrap();
        assert_eq!(view.status, StatusKind::Error);
        assert_eq!(view.error.as_deref(), Some("detector offline"));
    }

    #[test]
    fn test_error_clears_previous_frame_result() {
        let registry = AgentRegistry::new();
        let record = registry.get_or_create(&id("A3"));
        let detection = Detection {
            label: "person".to_string(),
            confidence: 0.9,
            bbox: augv_core::BoundingBox::new(10.0, 10.0, 4.0, 8.0),
            feet: Some([10.0, 14.0]),
            offset: Some(GridOffset::new(0, 1)),
        };
        let offsets: BlockedOffsetSet = [GridOffset::new(0, 1)].into_iter().collect();
        record.publish(
            AgentStatus::from_offsets(offsets),
            vec![detection],
            vec![[0, 0], [8, 0], [8, 8]],
        );

        record.publish_error("detector offline");
        let view = registry.view(&id("A3")).unwrap();
        assert_eq!(view.status, StatusKind::Error);
        assert!(view.detections.is_empty());
        assert!(view.road_outline.is_empty());
        assert!(view.blocked_offsets.is_empty());
        assert!(record.road_outline().is_empty());
    }

    #[test]
    fn test_unknown_agent_has_no_view() {
        let registry = AgentRegistry::new();
        assert!(registry.view(&id("ghost")).is_none());
    }

    #[test]
    fn test_liveness_window() {
        let registry = AgentRegistry::new();
        registry.touch(&id("fresh"));
        let stale = Instant::now()
            .checked_sub(Duration::from_secs(30))
            .unwrap_or_else(Instant::now);
        registry.touch_at(&id("stale"), stale);

        let active = registry.active_agents(Duration::from_secs(10));
        assert_eq!(active, vec![id("fresh")]);
        // stale record is still queryable
        assert!(registry.view(&id("stale")).is_some());
        assert_eq!(registry.views().len(), 2);
    }

    #[test]
    fn test_latest_frames() {
        let registry = AgentRegistry::new();
        registry.set_latest_frame(&id("B"), Bytes::from_static(b"b"));
        registry.set_latest_frame(&id("A"), Bytes::from_static(b"a"));
        assert_eq!(registry.connected_streams(), vec![id("A"), id("B")]);

        registry.clear_latest_frame(&id("A"));
        assert!(registry.latest_frame(&id("A")).is_none());
        assert_eq!(registry.connected_streams(), vec![id("B")]);
    }
}
