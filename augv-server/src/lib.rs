//! augv-server: multi-agent frame ingestion and obstacle reporting
//!
//! Agents stream camera frames over WebSocket (or raw HTTP uploads). Each
//! agent gets a worker that runs detection, projects blocking detections onto
//! the ground grid and notifies the simulation's control endpoint. Every
//! frame is forwarded with its latest annotations to monitor clients.

pub mod broadcast;
pub mod debounce;
pub mod http;
pub mod inbox;
pub mod ingest;
pub mod metrics;
pub mod notifier;
pub mod registry;
pub mod websocket;
pub mod worker;

use augv_core::{AugvConfig, DetectorConfig};
use augv_eye::{Detector, NullDetector, RemoteDetector, VisionError};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub use broadcast::{MonitorHeader, MonitorHub};
pub use http::{create_router, AppState};
pub use ingest::Ingestor;
pub use metrics::Metrics;
pub use notifier::{ControlNotifier, NotifyError, TcpControlNotifier};
pub use registry::AgentRegistry;
pub use worker::{WorkerContext, WorkerPool};

/// Detector selected by configuration: remote when an endpoint is set, otherwise null
pub fn detector_from_config(config: &DetectorConfig) -> Result<Arc<dyn Detector>, VisionError> {
    match &config.endpoint {
        Some(endpoint) => {
            let detector = RemoteDetector::new(endpoint.clone(), Duration::from_millis(config.timeout_ms))?;
            info!("Using {} detector at {}", detector.name(), detector.endpoint());
            Ok(Arc::new(detector))
        }
        None => {
            info!(
                "No detector endpoint configured; {} detector reports no detections",
                NullDetector.name()
            );
            Ok(Arc::new(NullDetector))
        }
    }
}

/// Wire registry, workers, monitor hub and ingestion into the router state
pub fn build_state(
    config: AugvConfig,
    detector: Arc<dyn Detector>,
    notifier: Arc<dyn ControlNotifier>,
) -> AppState {
    let config = Arc::new(config);
    let metrics = Arc::new(Metrics::new());
    let registry = Arc::new(AgentRegistry::new());

    let pool = Arc::new(WorkerPool::new(WorkerContext {
        registry,
        detector,
        notifier,
        metrics: metrics.clone(),
        config: config.clone(),
    }));
    let hub = Arc::new(MonitorHub::new(config.monitor.max_subscribers, metrics.clone()));

    AppState {
        ingestor: Arc::new(Ingestor::new(pool, hub)),
        config,
        metrics,
    }
}
