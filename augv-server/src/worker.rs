// Agent workers
// One supervised task per agent: detect, project, publish, notify

use crate::debounce::Debouncer;
use crate::inbox::Inbox;
use crate::metrics::Metrics;
use crate::notifier::ControlNotifier;
use crate::registry::{AgentRecord, AgentRegistry};
use augv_core::{
    AgentId, AgentStatus, AugvConfig, BlockedOffsetSet, CameraModel, Detection, WorkerConfig,
};
use augv_eye::annotate::{annotate, write_snapshot};
use augv_eye::detector::retain_confident;
use augv_eye::{extract_outline, DetectedObject, Detector, Frame};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Grace period for workers to finish their current frame on shutdown
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Detections of one frame plus the offsets that block the agent
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameAnalysis {
    pub detections: Vec<Detection>,
    pub blocked: BlockedOffsetSet,
}

/// Turn raw detector output into reportable detections and a blocked set.
///
/// Every object is reported. Blocking-class objects also get a feet point and
/// a projected offset; only offsets with `0 < dy <= max_forward_cells` block.
pub fn analyze(
    objects: &[DetectedObject],
    width: u32,
    height: u32,
    camera: &CameraModel,
    policy: &WorkerConfig,
) -> FrameAnalysis {
    let mut analysis = FrameAnalysis::default();

    for object in objects {
        let mut detection = Detection {
            label: object.label.clone(),
            confidence: object.confidence,
            bbox: object.bbox,
            feet: None,
            offset: None,
        };

        if policy.is_blocking_class(&object.label) {
            let (fx, fy) = object.bbox.feet();
            let offset = camera.project(fx as f64, fy as f64, width as f64, height as f64);
            if offset.dy > 0 && offset.dy <= policy.max_forward_cells {
                analysis.blocked.insert(offset);
            }
            detection.feet = Some([fx, fy]);
            detection.offset = Some(offset);
        }

        analysis.detections.push(detection);
    }

    analysis
}

/// Everything a worker needs, shared by all workers
pub struct WorkerContext {
    pub registry: Arc<AgentRegistry>,
    pub detector: Arc<dyn Detector>,
    pub notifier: Arc<dyn ControlNotifier>,
    pub metrics: Arc<Metrics>,
    pub config: Arc<AugvConfig>,
}

/// A worker task and the inbox it drains
struct WorkerSlot {
    handle: JoinHandle<()>,
    inbox: Arc<Inbox<Frame>>,
}

impl WorkerSlot {
    fn is_live(&self) -> bool {
        !self.handle.is_finished() && !self.inbox.is_closed()
    }
}

/// Supervises one worker task per agent
pub struct WorkerPool {
    ctx: Arc<WorkerContext>,
    tasks: Mutex<HashMap<AgentId, WorkerSlot>>,
}

impl WorkerPool {
    pub fn new(ctx: WorkerContext) -> Self {
        Self {
            ctx: Arc::new(ctx),
            tasks: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.ctx.registry
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.ctx.metrics
    }

    pub fn config(&self) -> &Arc<AugvConfig> {
        &self.ctx.config
    }

    /// Inbox of the agent's worker, starting the worker if none is running.
    /// A live worker is never started twice, and a replacement only begins
    /// once the stopped worker has finished its last frame.
    pub fn ensure_started(&self, agent_id: &AgentId) -> Arc<Inbox<Frame>> {
        let record = self.ctx.registry.get_or_create(agent_id);
        let mut tasks = self.tasks.lock();

        if let Some(slot) = tasks.get(agent_id) {
            if slot.is_live() {
                return slot.inbox.clone();
            }
        }

        let previous = tasks
            .remove(agent_id)
            .map(|slot| slot.handle)
            .filter(|handle| !handle.is_finished());
        let inbox = Arc::new(Inbox::new());
        record.set_inbox(Some(inbox.clone()));
        let handle = tokio::spawn(run_worker(self.ctx.clone(), record, inbox.clone(), previous));
        tasks.insert(
            agent_id.clone(),
            WorkerSlot {
                handle,
                inbox: inbox.clone(),
            },
        );
        info!("[AUGV {}] Worker started", agent_id);
        inbox
    }

    /// Close the agent's inbox; the worker finishes its current frame and exits
    pub fn stop(&self, agent_id: &AgentId) -> bool {
        let tasks = self.tasks.lock();
        self.close_slot(&tasks, agent_id)
    }

    // Caller holds the tasks lock, so the slot's inbox is the one the worker drains
    fn close_slot(&self, tasks: &HashMap<AgentId, WorkerSlot>, agent_id: &AgentId) -> bool {
        let Some(slot) = tasks.get(agent_id) else {
            return false;
        };
        if slot.inbox.is_closed() {
            return false;
        }
        slot.inbox.close();
        if let Some(record) = self.ctx.registry.get(agent_id) {
            if record.inbox().is_some_and(|current| Arc::ptr_eq(&current, &slot.inbox)) {
                record.set_inbox(None);
            }
        }
        true
    }

    pub fn is_running(&self, agent_id: &AgentId) -> bool {
        self.tasks
            .lock()
            .get(agent_id)
            .map(WorkerSlot::is_live)
            .unwrap_or(false)
    }

    pub fn running(&self) -> Vec<AgentId> {
        let mut ids: Vec<AgentId> = self
            .tasks
            .lock()
            .iter()
            .filter(|(_, slot)| slot.is_live())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Stop workers whose agent has not sent a frame within `idle_timeout`.
    /// Records and their last status are kept; the next frame restarts the worker.
    pub fn reap_idle(&self, idle_timeout: Duration) -> Vec<AgentId> {
        let now = Instant::now();
        let mut tasks = self.tasks.lock();
        tasks.retain(|_, slot| !(slot.inbox.is_closed() && slot.handle.is_finished()));

        let mut idle: Vec<AgentId> = tasks
            .iter()
            .filter(|(_, slot)| slot.is_live())
            .map(|(id, _)| id.clone())
            .filter(|id| {
                self.ctx
                    .registry
                    .get(id)
                    .map(|r| now.saturating_duration_since(r.last_seen()) > idle_timeout)
                    .unwrap_or(true)
            })
            .collect();
        idle.sort();

        for id in &idle {
            if self.close_slot(&tasks, id) {
                info!("[AUGV {}] Worker stopped after {:?} idle", id, idle_timeout);
            }
        }
        idle
    }

    /// Periodically reap idle workers until the task is aborted
    pub fn spawn_reaper(self: &Arc<Self>, idle_timeout: Duration) -> JoinHandle<()> {
        let pool = Arc::downgrade(self);
        let period = (idle_timeout / 4).max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(pool) = pool.upgrade() else { break };
                pool.reap_idle(idle_timeout);
            }
        })
    }

    /// Stop every worker and wait briefly for them to exit
    pub async fn shutdown(&self) {
        let slots: Vec<WorkerSlot> = self.tasks.lock().drain().map(|(_, slot)| slot).collect();
        for slot in &slots {
            slot.inbox.close();
        }

        let count = slots.len();
        let joined = futures_util::future::join_all(slots.into_iter().map(|slot| slot.handle));
        if tokio::time::timeout(SHUTDOWN_GRACE, joined).await.is_err() {
            warn!("Workers did not stop within {:?}", SHUTDOWN_GRACE);
        } else {
            info!("Stopped {} workers", count);
        }
    }
}

async fn run_worker(
    ctx: Arc<WorkerContext>,
    record: Arc<AgentRecord>,
    inbox: Arc<Inbox<Frame>>,
    previous: Option<JoinHandle<()>>,
) {
    // Single writer per record: wait out the worker this one replaces
    if let Some(previous) = previous {
        if let Err(e) = previous.await {
            warn!("[AUGV {}] Previous worker ended abnormally: {}", record.id(), e);
        }
    }

    let mut debouncer = Debouncer::new(ctx.config.control.min_interval());
    while let Some(frame) = inbox.recv().await {
        process_frame(&ctx, &record, &mut debouncer, frame).await;
    }
    debug!("[AUGV {}] Worker loop ended", record.id());
}

async fn process_frame(
    ctx: &WorkerContext,
    record: &AgentRecord,
    debouncer: &mut Debouncer,
    frame: Frame,
) {
    let agent_id = record.id();
    let (width, height) = (frame.width(), frame.height());
    let threshold = ctx.config.worker.confidence_threshold;
    debug!("[AUGV {}] Frame received. Size: {}x{}", agent_id, width, height);

    let objects = match ctx.detector.detect(&frame, threshold).await {
        Ok(objects) => retain_confident(objects, threshold),
        Err(e) => {
            warn!("[AUGV {}] Detector failed: {}", agent_id, e);
            ctx.metrics.record_detector_error();
            record.publish_error(e.to_string());
            return;
        }
    };

    let analysis = analyze(&objects, width, height, &ctx.config.camera, &ctx.config.worker);

    let road = ctx.config.road.clone();
    let (frame, road_outline) = match tokio::task::spawn_blocking(move || {
        let outline = extract_outline(frame.as_rgb(), &road);
        (frame, outline)
    })
    .await
    {
        Ok(result) => result,
        Err(e) => {
            error!("[AUGV {}] Road extraction task failed: {}", agent_id, e);
            record.publish_error(format!("road extraction failed: {}", e));
            return;
        }
    };

    let FrameAnalysis { detections, blocked } = analysis;
    record.publish(
        AgentStatus::from_offsets(blocked.clone()),
        detections.clone(),
        road_outline.clone(),
    );

    let now = Instant::now();
    if debouncer.should_send(&blocked, now) {
        match ctx.notifier.notify(agent_id, &blocked).await {
            Ok(()) => {
                info!("[AUGV {}] Blocked offsets sent: {:?}", agent_id, blocked);
                ctx.metrics.record_notification(true);
            }
            Err(e) => {
                warn!("[AUGV {}] Obstacle notification failed: {}", agent_id, e);
                ctx.metrics.record_notification(false);
            }
        }
        debouncer.record(&blocked, now);
    }

    if ctx.config.worker.debug_snapshots {
        let dir = ctx.config.worker.debug_dir.clone();
        let id = agent_id.clone();
        let worker = ctx.config.worker.clone();
        let written = tokio::task::spawn_blocking(move || {
            let image = annotate(&frame, &detections, &road_outline, |l| worker.is_blocking_class(l));
            write_snapshot(&dir, &id, &image)
        })
        .await;
        match written {
            Ok(Ok(path)) => debug!("[AUGV {}] Snapshot written to {}", agent_id, path.display()),
            Ok(Err(e)) => warn!("[AUGV {}] Snapshot failed: {}", agent_id, e),
            Err(e) => warn!("[AUGV {}] Snapshot task failed: {}", agent_id, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use augv_core::{BoundingBox, GridOffset};

    fn person_at_feet(fx: f32, fy: f32) -> DetectedObject {
        // 20x40 box whose bottom-center is (fx, fy)
        DetectedObject::new("person", 0.9, BoundingBox::new(fx, fy - 20.0, 20.0, 40.0))
    }

    #[test]
    fn test_person_ahead_blocks() {
        let analysis = analyze(
            &[person_at_feet(80.0, 100.0)],
            160,
            120,
            &CameraModel::default(),
            &WorkerConfig::default(),
        );
        assert_eq!(analysis.detections.len(), 1);
        let detection = &analysis.detections[0];
        assert_eq!(detection.feet, Some([80.0, 100.0]));
        assert_eq!(detection.offset, Some(GridOffset::new(0, 1)));
        assert!(analysis.blocked.contains(&GridOffset::new(0, 1)));
    }

    #[test]
    fn test_other_classes_reported_but_not_projected() {
        let car = DetectedObject::new("car", 0.8, BoundingBox::new(80.0, 80.0, 20.0, 40.0));
        let analysis = analyze(&[car], 160, 120, &CameraModel::default(), &WorkerConfig::default());
        assert_eq!(analysis.detections.len(), 1);
        assert!(analysis.detections[0].offset.is_none());
        assert!(analysis.blocked.is_empty());
    }

    #[test]
    fn test_out_of_band_offsets_excluded() {
        let policy = WorkerConfig {
            max_forward_cells: 1,
            ..WorkerConfig::default()
        };
        // feet close to the horizon project far ahead
        let analysis = analyze(
            &[person_at_feet(80.0, 70.0)],
            160,
            120,
            &CameraModel::default(),
            &policy,
        );
        let offset = analysis.detections[0].offset.unwrap();
        assert!(offset.dy > 1, "{:?}", offset);
        assert!(analysis.blocked.is_empty());
    }

    #[test]
    fn test_duplicate_offsets_deduplicated() {
        let analysis = analyze(
            &[person_at_feet(80.0, 100.0), person_at_feet(81.0, 100.0)],
            160,
            120,
            &CameraModel::default(),
            &WorkerConfig::default(),
        );
        assert_eq!(analysis.detections.len(), 2);
        assert_eq!(analysis.blocked.len(), 1);
    }
}
