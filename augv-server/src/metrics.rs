use metrics::{counter, gauge};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Pipeline counters.
///
/// Every event is reported to the `metrics` facade and mirrored in local
/// atomics so `/metrics` and `/health` work without an installed recorder.
#[derive(Debug, Default)]
pub struct Metrics {
    frames_received: AtomicU64,
    frames_replaced: AtomicU64,
    decode_errors: AtomicU64,
    detector_errors: AtomicU64,
    notifications_sent: AtomicU64,
    notifications_failed: AtomicU64,
    monitor_dropped: AtomicU64,
    monitor_subscribers: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub frames_received: u64,
    pub frames_replaced: u64,
    pub decode_errors: u64,
    pub detector_errors: u64,
    pub notifications_sent: u64,
    pub notifications_failed: u64,
    pub monitor_dropped: u64,
    pub monitor_subscribers: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_frame(&self, replaced: bool) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
        counter!("augv_frames_received_total").increment(1);
        if replaced {
            self.frames_replaced.fetch_add(1, Ordering::Relaxed);
            counter!("augv_frames_replaced_total").increment(1);
        }
    }

    pub fn record_decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
        counter!("augv_decode_errors_total").increment(1);
    }

    pub fn record_detector_error(&self) {
        self.detector_errors.fetch_add(1, Ordering::Relaxed);
        counter!("augv_detector_errors_total").increment(1);
    }

    pub fn record_notification(&self, delivered: bool) {
        if delivered {
            self.notifications_sent.fetch_add(1, Ordering::Relaxed);
            counter!("augv_notifications_sent_total").increment(1);
        } else {
            self.notifications_failed.fetch_add(1, Ordering::Relaxed);
            counter!("augv_notifications_failed_total").increment(1);
        }
    }

    pub fn record_monitor_dropped(&self, count: usize) {
        if count == 0 {
            return;
        }
        self.monitor_dropped.fetch_add(count as u64, Ordering::Relaxed);
        counter!("augv_monitor_dropped_total").increment(count as u64);
    }

    pub fn set_monitor_subscribers(&self, count: usize) {
        self.monitor_subscribers.store(count as u64, Ordering::Relaxed);
        gauge!("augv_monitor_subscribers").set(count as f64);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_replaced: self.frames_replaced.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            detector_errors: self.detector_errors.load(Ordering::Relaxed),
            notifications_sent: self.notifications_sent.load(Ordering::Relaxed),
            notifications_failed: self.notifications_failed.load(Ordering::Relaxed),
            monitor_dropped: self.monitor_dropped.load(Ordering::Relaxed),
            monitor_subscribers: self.monitor_subscribers.load(Ordering::Relaxed),
        }
    }

    /// Prometheus text exposition of the local counters
    pub fn render_prometheus(&self) -> String {
        let s = self.snapshot();
        let counters = [
            ("augv_frames_received_total", "Frames accepted from agent streams", s.frames_received),
            ("augv_frames_replaced_total", "Undelivered frames replaced by a newer one", s.frames_replaced),
            ("augv_decode_errors_total", "Inbound frames that failed to decode", s.decode_errors),
            ("augv_detector_errors_total", "Detector failures", s.detector_errors),
            ("augv_notifications_sent_total", "Obstacle notifications delivered", s.notifications_sent),
            ("augv_notifications_failed_total", "Obstacle notifications that failed", s.notifications_failed),
            ("augv_monitor_dropped_total", "Monitor subscribers dropped after a failed send", s.monitor_dropped),
        ];

        let mut out = String::new();
        for (name, help, value) in counters {
            out.push_str(&format!(
                "# HELP {name} {help}\n# TYPE {name} counter\n{name} {value}\n"
            ));
        }
        out.push_str(&format!(
            "# HELP augv_monitor_subscribers Connected monitor subscribers\n\
             # TYPE augv_monitor_subscribers gauge\n\
             augv_monitor_subscribers {}\n",
            s.monitor_subscribers
        ));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let metrics = Metrics::new();
        metrics.record_frame(false);
        metrics.record_frame(true);
        metrics.record_notification(true);
        metrics.record_notification(false);
        metrics.record_monitor_dropped(0);
        metrics.record_monitor_dropped(2);
        metrics.set_monitor_subscribers(3);

        let s = metrics.snapshot();
        assert_eq!(s.frames_received, 2);
        assert_eq!(s.frames_replaced, 1);
        assert_eq!(s.notifications_sent, 1);
        assert_eq!(s.notifications_failed, 1);
        assert_eq!(s.monitor_dropped, 2);
        assert_eq!(s.monitor_subscribers, 3);
    }

    #[test]
    fn test_prometheus_text() {
        let metrics = Metrics::new();
        metrics.record_decode_error();
        let text = metrics.render_prometheus();
        assert!(text.contains("augv_decode_errors_total 1\n"));
        assert!(text.contains("# TYPE augv_monitor_subscribers gauge"));
    }
}
