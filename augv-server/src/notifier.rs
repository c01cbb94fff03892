// Control channel to the simulation
// One short-lived TCP connection per JSON message

use async_trait::async_trait;
use augv_core::{AgentId, BlockedOffsetSet, ControlConfig, GridOffset};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::debug;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Connect error: {0}")]
    Connect(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObstacleReport {
    pub agent_id: AgentId,
    pub blocked_offsets: Vec<GridOffset>,
}

/// `{"action": "obstacle", "data": {"agent_id": .., "blocked_offsets": [[dx, dy], ..]}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlMessage {
    pub action: String,
    pub data: ObstacleReport,
}

impl ControlMessage {
    pub fn obstacle(agent_id: &AgentId, offsets: &BlockedOffsetSet) -> Self {
        Self {
            action: "obstacle".to_string(),
            data: ObstacleReport {
                agent_id: agent_id.clone(),
                blocked_offsets: offsets.iter().copied().collect(),
            },
        }
    }
}

/// Outbound obstacle notifications
#[async_trait]
pub trait ControlNotifier: Send + Sync {
    async fn notify(&self, agent_id: &AgentId, offsets: &BlockedOffsetSet) -> Result<(), NotifyError>;
}

pub struct TcpControlNotifier {
    address: String,
    timeout: Duration,
}

impl TcpControlNotifier {
    pub fn new(address: impl Into<String>, timeout: Duration) -> Self {
        Self {
            address: address.into(),
            timeout,
        }
    }

    pub fn from_config(config: &ControlConfig) -> Self {
        Self::new(config.address(), config.connect_timeout())
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Send any JSON document: connect, write, close
    pub async fn send_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<(), NotifyError> {
        let payload = serde_json::to_vec(value)?;

        let mut stream = tokio::time::timeout(self.timeout, TcpStream::connect(&self.address))
            .await
            .map_err(|_| NotifyError::Timeout(self.timeout))?
            .map_err(|e| NotifyError::Connect(format!("{}: {}", self.address, e)))?;

        tokio::time::timeout(self.timeout, async {
            stream.write_all(&payload).await?;
            stream.shutdown().await
        })
        .await
        .map_err(|_| NotifyError::Timeout(self.timeout))??;

        debug!("Sent {} bytes to {}", payload.len(), self.address);
        Ok(())
    }
}

#[async_trait]
impl ControlNotifier for TcpControlNotifier {
    async fn notify(&self, agent_id: &AgentId, offsets: &BlockedOffsetSet) -> Result<(), NotifyError> {
        self.send_json(&ControlMessage::obstacle(agent_id, offsets)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[test]
    fn test_message_shape() {
        let offsets: BlockedOffsetSet = [GridOffset::new(1, 2), GridOffset::new(0, 1)]
            .into_iter()
            .collect();
        let msg = ControlMessage::obstacle(&AgentId::new("A1").unwrap(), &offsets);
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "action": "obstacle",
                "data": {"agent_id": "A1", "blocked_offsets": [[0, 1], [1, 2]]}
            })
        );
    }

    #[tokio::test]
    async fn test_send_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            socket.read_to_end(&mut buf).await.unwrap();
            buf
        });

        let notifier = TcpControlNotifier::new(addr.to_string(), Duration::from_secs(1));
        let offsets: BlockedOffsetSet = [GridOffset::new(0, 3)].into_iter().collect();
        notifier
            .notify(&AgentId::new("A1").unwrap(), &offsets)
            .await
            .unwrap();

        let received: ControlMessage = serde_json::from_slice(&server.await.unwrap()).unwrap();
        assert_eq!(received.action, "obstacle");
        assert_eq!(received.data.blocked_offsets, vec![GridOffset::new(0, 3)]);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_error() {
        // bind then drop to get a port nothing listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let notifier = TcpControlNotifier::new(addr.to_string(), Duration::from_millis(500));
        let result = notifier.send_json(&serde_json::json!({"ping": true})).await;
        assert!(matches!(
            result,
            Err(NotifyError::Connect(_)) | Err(NotifyError::Timeout(_))
        ));
    }
}
