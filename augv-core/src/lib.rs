//! augv-core: shared building blocks for the AUGV vision pipeline
//!
//! Provides:
//! - The agent data model (detections, grid offsets, per-agent status)
//! - The camera-to-ground projector that turns image points into grid offsets
//! - Layered configuration (defaults, TOML file, environment)

pub mod config;
pub mod error;
pub mod geometry;
pub mod types;

pub use config::{
    AugvConfig, ConfigError, ControlConfig, DetectorConfig, MonitorConfig, RegistryConfig,
    RoadConfig, ServerConfig, WorkerConfig,
};
pub use error::{Error, Result};
pub use geometry::{project, CameraModel};
pub use types::{
    AgentId, AgentStatus, AgentView, BlockedOffsetSet, BoundingBox, Detection, GridOffset,
    RoadOutline, StatusKind,
};
