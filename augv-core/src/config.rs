// Layered configuration for the AUGV vision service
// defaults -> config file (TOML or JSON) -> environment -> CLI flags

use crate::geometry::CameraModel;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// HTTP / WebSocket listener settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub log_level: String,
    pub resource_log_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8000,
            log_level: "info".to_string(),
            resource_log_interval_secs: 10,
        }
    }
}

/// Per-agent worker settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Minimum detector confidence
    pub confidence_threshold: f32,
    /// Labels that can block an agent
    pub blocking_classes: Vec<String>,
    /// Forward band `(0, max_forward_cells]` that counts as blocking
    pub max_forward_cells: i32,
    /// Write an annotated snapshot per processed frame
    pub debug_snapshots: bool,
    pub debug_dir: PathBuf,
    /// Stop a worker whose agent has been silent this long
    pub idle_timeout_secs: u64,
    /// Frame size assumed for raw HTTP uploads without size headers
    pub raw_default_width: u32,
    pub raw_default_height: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.4,
            blocking_classes: vec!["person".to_string()],
            max_forward_cells: 5,
            debug_snapshots: true,
            debug_dir: PathBuf::from("debug_yolo_images"),
            idle_timeout_secs: 300,
            raw_default_width: 160,
            raw_default_height: 160,
        }
    }
}

impl WorkerConfig {
    pub fn is_blocking_class(&self, label: &str) -> bool {
        self.blocking_classes.iter().any(|c| c == label)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Agents silent for longer than this are not listed as active
    pub liveness_window_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            liveness_window_secs: 10,
        }
    }
}

impl RegistryConfig {
    pub fn liveness_window(&self) -> Duration {
        Duration::from_secs(self.liveness_window_secs)
    }
}

/// Outbound control channel to the simulation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    pub host: String,
    pub port: u16,
    /// Minimum spacing between repeated identical notifications
    pub min_interval_ms: u64,
    pub connect_timeout_ms: u64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8051,
            min_interval_ms: 500,
            connect_timeout_ms: 1000,
        }
    }
}

impl ControlConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Monitor fan-out settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub heartbeat_interval_secs: u64,
    pub send_timeout_ms: u64,
    /// Payloads buffered per subscriber before it counts as stalled
    pub queue_depth: usize,
    pub max_subscribers: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: 20,
            send_timeout_ms: 2000,
            queue_depth: 8,
            max_subscribers: 256,
        }
    }
}

impl MonitorConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// HTTP inference endpoint; `None` runs a detector that reports nothing
    pub endpoint: Option<String>,
    pub timeout_ms: u64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_ms: 2000,
        }
    }
}

/// RGB band the simulation paints roads with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoadConfig {
    pub lower_rgb: [u8; 3],
    pub upper_rgb: [u8; 3],
}

impl Default for RoadConfig {
    fn default() -> Self {
        Self {
            lower_rgb: [0, 40, 240],
            upper_rgb: [30, 70, 255],
        }
    }
}

/// Complete service configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AugvConfig {
    pub server: ServerConfig,
    pub camera: CameraModel,
    pub worker: WorkerConfig,
    pub registry: RegistryConfig,
    pub control: ControlConfig,
    pub monitor: MonitorConfig,
    pub detector: DetectorConfig,
    pub road: RoadConfig,
}

impl AugvConfig {
    /// Load configuration from a TOML or JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(format!("{}: {}", path.display(), e)))?;
        Self::parse_str(&content)
    }

    /// Parse configuration text, JSON first then TOML
    pub fn parse_str(content: &str) -> Result<Self, ConfigError> {
        if let Ok(config) = serde_json::from_str::<AugvConfig>(content) {
            return Ok(config);
        }
        toml::from_str::<AugvConfig>(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Apply `AUGV_*` overrides from an arbitrary lookup
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(host) = lookup("AUGV_HOST") {
            self.server.bind_address = host;
        }
        if let Some(port) = lookup("AUGV_PORT").and_then(|p| p.parse::<u16>().ok()) {
            self.server.port = port;
        }
        if let Some(level) = lookup("AUGV_LOG_LEVEL") {
            self.server.log_level = level;
        }
        if let Some(host) = lookup("AUGV_CONTROL_HOST") {
            self.control.host = host;
        }
        if let Some(port) = lookup("AUGV_CONTROL_PORT").and_then(|p| p.parse::<u16>().ok()) {
            self.control.port = port;
        }
        if let Some(url) = lookup("AUGV_DETECTOR_URL") {
            self.detector.endpoint = if url.is_empty() { None } else { Some(url) };
        }
        if let Some(dir) = lookup("AUGV_DEBUG_DIR") {
            self.worker.debug_dir = PathBuf::from(dir);
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.camera.validate().map_err(ConfigError::ValidationError)?;

        if !(0.0..=1.0).contains(&self.worker.confidence_threshold) {
            return Err(ConfigError::ValidationError(
                "worker.confidence_threshold must be within [0, 1]".to_string(),
            ));
        }
        if self.worker.max_forward_cells <= 0 {
            return Err(ConfigError::ValidationError(
                "worker.max_forward_cells must be > 0".to_string(),
            ));
        }
        if self.worker.raw_default_width == 0 || self.worker.raw_default_height == 0 {
            return Err(ConfigError::ValidationError(
                "worker raw default size must be non-zero".to_string(),
            ));
        }
        if self.registry.liveness_window_secs == 0 {
            return Err(ConfigError::ValidationError(
                "registry.liveness_window_secs must be > 0".to_string(),
            ));
        }
        if self.control.host.is_empty() || self.control.port == 0 {
            return Err(ConfigError::ValidationError(
                "control.host and control.port are required".to_string(),
            ));
        }
        if self.monitor.queue_depth == 0 || self.monitor.max_subscribers == 0 {
            return Err(ConfigError::ValidationError(
                "monitor.queue_depth and monitor.max_subscribers must be > 0".to_string(),
            ));
        }
        if self.monitor.heartbeat_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "monitor.heartbeat_interval_secs must be > 0".to_string(),
            ));
        }
        for (lo, hi) in self.road.lower_rgb.iter().zip(self.road.upper_rgb.iter()) {
            if lo > hi {
                return Err(ConfigError::ValidationError(
                    "road.lower_rgb must not exceed road.upper_rgb".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_config_default() {
        let config = AugvConfig::default();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.worker.confidence_threshold, 0.4);
        assert_eq!(config.worker.max_forward_cells, 5);
        assert_eq!(config.registry.liveness_window_secs, 10);
        assert_eq!(config.control.port, 8051);
        assert_eq!(config.control.min_interval(), Duration::from_millis(500));
        assert!(config.worker.is_blocking_class("person"));
        assert!(!config.worker.is_blocking_class("car"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = AugvConfig::parse_str(
            r#"
            [server]
            port = 9100

            [control]
            host = "sim.local"
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.bind_address, "0.0.0.0");
        assert_eq!(config.control.host, "sim.local");
        assert_eq!(config.control.port, 8051);
        assert_eq!(config.camera, CameraModel::default());
    }

    #[test]
    fn test_json_config() {
        let config = AugvConfig::parse_str(r#"{"worker": {"max_forward_cells": 3}}"#).unwrap();
        assert_eq!(config.worker.max_forward_cells, 3);
    }

    #[test]
    fn test_garbage_config_is_parse_error() {
        match AugvConfig::parse_str("this is [not config") {
            Err(ConfigError::ParseError(_)) => {}
            other => panic!("Expected ParseError, got {:?}", other),
        }
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[registry]\nliveness_window_secs = 30").unwrap();
        let config = AugvConfig::from_file(file.path()).unwrap();
        assert_eq!(config.registry.liveness_window_secs, 30);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        match AugvConfig::from_file("/definitely/not/here.toml") {
            Err(ConfigError::IoError(_)) => {}
            other => panic!("Expected IoError, got {:?}", other),
        }
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("AUGV_PORT", "9001"),
            ("AUGV_CONTROL_HOST", "unity"),
            ("AUGV_CONTROL_PORT", "not-a-port"),
            ("AUGV_DETECTOR_URL", "http://yolo:9000/detect"),
        ]
        .into_iter()
        .collect();

        let mut config = AugvConfig::default();
        config.apply_env_with(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.server.port, 9001);
        assert_eq!(config.control.host, "unity");
        assert_eq!(config.control.port, 8051);
        assert_eq!(config.detector.endpoint.as_deref(), Some("http://yolo:9000/detect"));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = AugvConfig::default();
        config.worker.confidence_threshold = 1.5;
        assert!(config.validate().is_err());

        let mut config = AugvConfig::default();
        config.worker.max_forward_cells = 0;
        assert!(config.validate().is_err());

        let mut config = AugvConfig::default();
        config.road.lower_rgb = [255, 0, 0];
        config.road.upper_rgb = [0, 0, 0];
        assert!(config.validate().is_err());

        let mut config = AugvConfig::default();
        config.monitor.queue_depth = 0;
        assert!(config.validate().is_err());
    }
}
