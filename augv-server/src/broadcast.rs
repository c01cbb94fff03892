// Monitor broadcast
// Fans annotated frames out to every subscribed monitor connection

use crate::metrics::Metrics;
use async_trait::async_trait;
use augv_core::{AgentId, Detection, RoadOutline};
use bytes::Bytes;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

pub type SubscriberId = Uuid;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeliveryError {
    #[error("Subscriber closed")]
    Closed,

    #[error("Send timed out after {0:?}")]
    Timeout(Duration),
}

/// JSON line preceding the raw frame bytes in every monitor payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorHeader {
    pub agent_id: AgentId,
    #[serde(default)]
    pub detections: Vec<Detection>,
    #[serde(default)]
    pub road_outline: RoadOutline,
}

/// `<header json>\n<frame bytes>`
pub fn encode_payload(header: &MonitorHeader, frame: &[u8]) -> Result<Bytes, serde_json::Error> {
    let mut buf = serde_json::to_vec(header)?;
    buf.reserve(frame.len() + 1);
    buf.push(b'\n');
    buf.extend_from_slice(frame);
    Ok(Bytes::from(buf))
}

/// Split a monitor payload back into header and frame bytes
pub fn decode_payload(payload: &[u8]) -> Option<(MonitorHeader, &[u8])> {
    let split = payload.iter().position(|b| *b == b'\n')?;
    let header = serde_json::from_slice(&payload[..split]).ok()?;
    Some((header, &payload[split + 1..]))
}

/// Delivery endpoint of one monitor subscriber
#[async_trait]
pub trait MonitorSink: Send + Sync {
    async fn deliver(&self, payload: Bytes) -> Result<(), DeliveryError>;
}

/// Sink feeding a connection's writer task through a bounded queue.
/// A writer that stays full for `timeout` counts as failed.
pub struct ChannelSink {
    tx: mpsc::Sender<Bytes>,
    timeout: Duration,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<Bytes>, timeout: Duration) -> Self {
        Self { tx, timeout }
    }
}

#[async_trait]
impl MonitorSink for ChannelSink {
    async fn deliver(&self, payload: Bytes) -> Result<(), DeliveryError> {
        tokio::time::timeout(self.timeout, self.tx.send(payload))
            .await
            .map_err(|_| DeliveryError::Timeout(self.timeout))?
            .map_err(|_| DeliveryError::Closed)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub dropped: usize,
}

/// Subscriber set shared by every ingestion and monitor connection
pub struct MonitorHub {
    subscribers: RwLock<HashMap<SubscriberId, Arc<dyn MonitorSink>>>,
    max_subscribers: usize,
    metrics: Arc<Metrics>,
}

impl MonitorHub {
    pub fn new(max_subscribers: usize, metrics: Arc<Metrics>) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            max_subscribers,
            metrics,
        }
    }

    pub fn subscribe(&self, sink: Arc<dyn MonitorSink>) -> Result<SubscriberId, String> {
        let mut subscribers = self.subscribers.write();
        if subscribers.len() >= self.max_subscribers {
            return Err(format!(
                "Maximum monitor subscribers ({}) reached",
                self.max_subscribers
            ));
        }
        let id = Uuid::new_v4();
        subscribers.insert(id, sink);
        let total = subscribers.len();
        drop(subscribers);

        self.metrics.set_monitor_subscribers(total);
        info!("[MONITOR] client connected (total: {})", total);
        Ok(id)
    }

    pub fn unsubscribe(&self, id: &SubscriberId) -> bool {
        let mut subscribers = self.subscribers.write();
        let removed = subscribers.remove(id).is_some();
        let total = subscribers.len();
        drop(subscribers);

        if removed {
            self.metrics.set_monitor_subscribers(total);
            info!("[MONITOR] client removed (total: {})", total);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.subscribers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.read().is_empty()
    }

    pub fn contains(&self, id: &SubscriberId) -> bool {
        self.subscribers.read().contains_key(id)
    }

    /// Send to every subscriber concurrently; any that fails is removed
    pub async fn broadcast(&self, payload: Bytes) -> BroadcastReport {
        let targets: Vec<(SubscriberId, Arc<dyn MonitorSink>)> = {
            let subscribers = self.subscribers.read();
            subscribers.iter().map(|(id, s)| (*id, s.clone())).collect()
        };
        if targets.is_empty() {
            return BroadcastReport::default();
        }

        let sends = targets.iter().map(|(id, sink)| {
            let payload = payload.clone();
            async move { (*id, sink.deliver(payload).await) }
        });
        let results = futures_util::future::join_all(sends).await;

        let mut report = BroadcastReport::default();
        let mut dead = Vec::new();
        for (id, result) in results {
            match result {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!("[MONITOR] Client send failed: {}", e);
                    dead.push(id);
                }
            }
        }

        // Clean up dead subscribers after all sends completed
        for id in &dead {
            if self.unsubscribe(id) {
                report.dropped += 1;
            }
        }
        self.metrics.record_monitor_dropped(report.dropped);
        report
    }
}
