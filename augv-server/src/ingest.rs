// Frame ingestion
// Decode inbound frames, hand them to the agent's worker, forward them to monitors

use crate::broadcast::{encode_payload, BroadcastReport, MonitorHeader, MonitorHub};
use crate::inbox::Offer;
use crate::registry::AgentRegistry;
use crate::worker::WorkerPool;
use augv_core::AgentId;
use augv_eye::{Frame, VisionError};
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// What happened to one accepted frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestOutcome {
    pub offer: Offer,
    pub broadcast: BroadcastReport,
}

pub struct Ingestor {
    pool: Arc<WorkerPool>,
    hub: Arc<MonitorHub>,
}

impl Ingestor {
    pub fn new(pool: Arc<WorkerPool>, hub: Arc<MonitorHub>) -> Self {
        Self { pool, hub }
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    pub fn hub(&self) -> &Arc<MonitorHub> {
        &self.hub
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        self.pool.registry()
    }

    /// Stream opened: make sure the agent has a record and a running worker
    pub fn connect(&self, agent_id: &AgentId) {
        self.pool.ensure_started(agent_id);
        info!("[AUGV {}] connected", agent_id);
    }

    /// Stream closed: forget the latest frame, keep the record
    pub fn disconnect(&self, agent_id: &AgentId) {
        self.registry().clear_latest_frame(agent_id);
        info!("[AUGV {}] connection closed", agent_id);
    }

    /// Encoded frame from an agent stream.
    ///
    /// Decode failures are returned to the caller and leave all state untouched.
    pub async fn ingest_encoded(
        &self,
        agent_id: &AgentId,
        data: Bytes,
    ) -> Result<IngestOutcome, VisionError> {
        let encoded = data.clone();
        let frame = tokio::task::spawn_blocking(move || Frame::decode(&encoded))
            .await
            .map_err(|e| VisionError::Processing(format!("decode task failed: {}", e)))?
            .map_err(|e| {
                self.pool.metrics().record_decode_error();
                e
            })?;

        self.registry().set_latest_frame(agent_id, data.clone());
        let offer = self.accept(agent_id, frame);

        let broadcast = match encode_payload(&self.header(agent_id), &data) {
            Ok(payload) => self.hub.broadcast(payload).await,
            Err(e) => {
                error!("[AUGV {}] Failed to encode monitor header: {}", agent_id, e);
                BroadcastReport::default()
            }
        };

        Ok(IngestOutcome { offer, broadcast })
    }

    /// Raw BGR upload from the HTTP path; not forwarded to monitors
    pub fn ingest_raw(
        &self,
        agent_id: &AgentId,
        data: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Offer, VisionError> {
        let frame = Frame::from_bgr(data, width, height).map_err(|e| {
            self.pool.metrics().record_decode_error();
            e
        })?;
        Ok(self.accept(agent_id, frame))
    }

    fn accept(&self, agent_id: &AgentId, frame: Frame) -> Offer {
        self.registry().touch(agent_id);
        let offer = self.pool.ensure_started(agent_id).offer(frame);
        match offer {
            Offer::Accepted => {}
            Offer::Replaced => debug!("[AUGV {}] Undelivered frame replaced", agent_id),
            Offer::Closed => warn!("[AUGV {}] Worker inbox closed, frame dropped", agent_id),
        }
        self.pool.metrics().record_frame(offer == Offer::Replaced);
        offer
    }

    /// Current detections and road outline of an agent
    pub fn header(&self, agent_id: &AgentId) -> MonitorHeader {
        match self.registry().get(agent_id) {
            Some(record) => {
                let state = record.state();
                MonitorHeader {
                    agent_id: agent_id.clone(),
                    detections: state.detections,
                    road_outline: state.road_outline,
                }
            }
            None => MonitorHeader {
                agent_id: agent_id.clone(),
                detections: Vec::new(),
                road_outline: Vec::new(),
            },
        }
    }

    /// One payload per connected agent, for a monitor that just subscribed
    pub fn initial_payloads(&self) -> Vec<Bytes> {
        self.registry()
            .latest_frames()
            .into_iter()
            .filter_map(|(agent_id, frame)| match encode_payload(&self.header(&agent_id), &frame) {
                Ok(payload) => Some(payload),
                Err(e) => {
                    warn!("[MONITOR] failed to build initial frame for {}: {}", agent_id, e);
                    None
                }
            })
            .collect()
    }
}
