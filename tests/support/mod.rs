// Shared fixtures for the end-to-end tests
#![allow(dead_code)]

use async_trait::async_trait;
use augv_core::{AgentId, AugvConfig, BlockedOffsetSet, BoundingBox};
use augv_eye::{DetectedObject, Detector, Frame, VisionError};
use augv_server::{build_state, AppState, ControlNotifier, NotifyError};
use image::{Rgb, RgbImage};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Top-left pixel color that makes [`FakeDetector`] fail
pub const FAIL_MARKER: [u8; 3] = [255, 0, 255];

pub fn agent(id: &str) -> AgentId {
    AgentId::new(id).unwrap()
}

/// Person whose feet (bottom-center of the box) are at `(fx, fy)`
pub fn person_with_feet(fx: f32, fy: f32) -> DetectedObject {
    DetectedObject::new("person", 0.9, BoundingBox::new(fx, fy - 20.0, 20.0, 40.0))
}

pub fn frame_image(width: u32, height: u32, color: [u8; 3]) -> RgbImage {
    RgbImage::from_pixel(width, height, Rgb(color))
}

pub fn png_frame(width: u32, height: u32) -> Vec<u8> {
    png_of(frame_image(width, height, [40, 40, 40]))
}

/// Frame the fake detector rejects
pub fn failing_png_frame(width: u32, height: u32) -> Vec<u8> {
    let mut image = frame_image(width, height, [40, 40, 40]);
    image.put_pixel(0, 0, Rgb(FAIL_MARKER));
    png_of(image)
}

pub fn png_of(image: RgbImage) -> Vec<u8> {
    Frame::from_rgb(image).unwrap().to_png().unwrap()
}

/// Deterministic detector: reports a fixed set of objects for every frame,
/// fails for frames whose top-left pixel is [`FAIL_MARKER`].
#[derive(Default)]
pub struct FakeDetector {
    objects: Mutex<Vec<DetectedObject>>,
    widths: Mutex<Vec<u32>>,
    calls: AtomicUsize,
}

impl FakeDetector {
    pub fn reporting(objects: Vec<DetectedObject>) -> Arc<Self> {
        Arc::new(Self {
            objects: Mutex::new(objects),
            ..Self::default()
        })
    }

    pub fn set_objects(&self, objects: Vec<DetectedObject>) {
        *self.objects.lock() = objects;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn widths(&self) -> Vec<u32> {
        self.widths.lock().clone()
    }
}

#[async_trait]
impl Detector for FakeDetector {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn detect(&self, frame: &Frame, threshold: f32) -> Result<Vec<DetectedObject>, VisionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.widths.lock().push(frame.width());
        if frame.as_rgb().get_pixel(0, 0).0 == FAIL_MARKER {
            return Err(VisionError::Detector("simulated detector failure".to_string()));
        }
        Ok(self
            .objects
            .lock()
            .iter()
            .filter(|o| o.confidence >= threshold)
            .cloned()
            .collect())
    }
}

/// Detector that parks every call until a permit is released
pub struct GatedDetector {
    pub gate: Semaphore,
    pub entered: Semaphore,
    widths: Mutex<Vec<u32>>,
}

impl GatedDetector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            gate: Semaphore::new(0),
            entered: Semaphore::new(0),
            widths: Mutex::new(Vec::new()),
        })
    }

    pub fn widths(&self) -> Vec<u32> {
        self.widths.lock().clone()
    }
}

#[async_trait]
impl Detector for GatedDetector {
    fn name(&self) -> &'static str {
        "gated"
    }

    async fn detect(&self, frame: &Frame, _threshold: f32) -> Result<Vec<DetectedObject>, VisionError> {
        self.widths.lock().push(frame.width());
        self.entered.add_permits(1);
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| VisionError::Detector(e.to_string()))?;
        permit.forget();
        Ok(Vec::new())
    }
}

/// Notifier that records every call
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(AgentId, BlockedOffsetSet)>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Self::default()
        })
    }

    pub fn sent(&self) -> Vec<(AgentId, BlockedOffsetSet)> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl ControlNotifier for RecordingNotifier {
    async fn notify(&self, agent_id: &AgentId, offsets: &BlockedOffsetSet) -> Result<(), NotifyError> {
        self.sent.lock().push((agent_id.clone(), offsets.clone()));
        if self.fail {
            return Err(NotifyError::Connect("simulation offline".to_string()));
        }
        Ok(())
    }
}

/// Config for tests: no snapshots, long debounce interval
pub fn test_config() -> AugvConfig {
    let mut config = AugvConfig::default();
    config.worker.debug_snapshots = false;
    config.control.min_interval_ms = 60_000;
    config.monitor.send_timeout_ms = 200;
    config
}

pub fn state_with(
    config: AugvConfig,
    detector: Arc<dyn Detector>,
    notifier: Arc<dyn ControlNotifier>,
) -> AppState {
    build_state(config, detector, notifier)
}

/// Poll `check` until it holds or `timeout` elapses
pub async fn eventually(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Wait until the agent's worker has processed at least `count` frames
pub async fn processed(state: &AppState, agent_id: &AgentId, count: u64) -> bool {
    eventually(Duration::from_secs(5), || {
        state
            .ingestor
            .registry()
            .get(agent_id)
            .map(|r| r.state().processed_frames >= count)
            .unwrap_or(false)
    })
    .await
}

/// Serve the full router on an ephemeral port
pub async fn spawn_server(state: AppState) -> std::net::SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = augv_server::create_router(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}
