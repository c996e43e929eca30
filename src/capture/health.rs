//! Capture health state
//!
//! The capture loop is the only writer; it owns the `HealthReporter`. HTTP
//! handlers hold cheap `HealthMonitor` clones and only ever read snapshots,
//! so a health query never contends with the capture path.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;

/// Which kind of source is producing frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Physical capture device
    Device,
    /// Procedurally generated frames
    Synthetic,
    /// Repeated capture failures; frames are not being produced
    Degraded,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SourceKind::Device => "device",
            SourceKind::Synthetic => "synthetic",
            SourceKind::Degraded => "degraded",
        };
        f.write_str(name)
    }
}

/// Point-in-time view of capture health
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthSnapshot {
    /// Current source state
    pub source: SourceKind,
    /// Source selected at startup (never `Degraded`)
    pub active_source: SourceKind,
    /// Capture time of the last successfully produced frame
    pub last_frame_at: Option<DateTime<Utc>>,
    /// Failures since the last successful capture
    pub consecutive_failures: u32,
    /// Frames produced since startup
    pub frames_captured: u64,
}

impl HealthSnapshot {
    fn new(active_source: SourceKind) -> Self {
        Self {
            source: active_source,
            active_source,
            last_frame_at: None,
            consecutive_failures: 0,
            frames_captured: 0,
        }
    }

    /// Healthy unless capture has degraded
    pub fn is_healthy(&self) -> bool {
        self.source != SourceKind::Degraded
    }
}

/// Create the health channel for a source of the given kind
///
/// The reporter marks the source degraded once `failure_threshold`
/// consecutive failures have been recorded.
pub fn health_channel(
    active_source: SourceKind,
    failure_threshold: u32,
) -> (HealthReporter, HealthMonitor) {
    let (tx, rx) = watch::channel(HealthSnapshot::new(active_source));
    (
        HealthReporter {
            tx,
            failure_threshold: failure_threshold.max(1),
        },
        HealthMonitor { rx },
    )
}

/// Write side, owned by the capture loop
#[derive(Debug)]
pub struct HealthReporter {
    tx: watch::Sender<HealthSnapshot>,
    failure_threshold: u32,
}

impl HealthReporter {
    /// Record a successful capture
    ///
    /// Resets the failure count and restores the active source kind.
    pub fn record_success(&self, captured_at: DateTime<Utc>) {
        self.tx.send_modify(|health| {
            health.source = health.active_source;
            health.last_frame_at = Some(captured_at);
            health.consecutive_failures = 0;
            health.frames_captured += 1;
        });
    }

    /// Record a failed capture
    ///
    /// Returns `true` when this failure moved the source into `Degraded`.
    pub fn record_failure(&self, device_lost: bool) -> bool {
        let threshold = self.failure_threshold;
        let mut degraded_now = false;

        self.tx.send_modify(|health| {
            health.consecutive_failures = health.consecutive_failures.saturating_add(1);
            let over = device_lost || health.consecutive_failures >= threshold;
            if over && health.source != SourceKind::Degraded {
                health.source = SourceKind::Degraded;
                degraded_now = true;
            }
        });

        degraded_now
    }

    /// Current snapshot
    pub fn snapshot(&self) -> HealthSnapshot {
        self.tx.borrow().clone()
    }

    /// Create another read handle
    pub fn monitor(&self) -> HealthMonitor {
        HealthMonitor {
            rx: self.tx.subscribe(),
        }
    }
}

/// Read side, shared with HTTP handlers
#[derive(Debug, Clone)]
pub struct HealthMonitor {
    rx: watch::Receiver<HealthSnapshot>,
}

impl HealthMonitor {
    /// Current snapshot
    pub fn snapshot(&self) -> HealthSnapshot {
        self.rx.borrow().clone()
    }

    /// Whether capture is currently healthy
    pub fn is_healthy(&self) -> bool {
        self.rx.borrow().is_healthy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_snapshot() {
        let (_reporter, monitor) = health_channel(SourceKind::Synthetic, 5);
        let health = monitor.snapshot();

        assert_eq!(health.source, SourceKind::Synthetic);
        assert_eq!(health.active_source, SourceKind::Synthetic);
        assert!(health.last_frame_at.is_none());
        assert_eq!(health.consecutive_failures, 0);
        assert!(monitor.is_healthy());
    }

    #[test]
    fn test_degrades_at_threshold() {
        let (reporter, monitor) = health_channel(SourceKind::Device, 3);

        assert!(!reporter.record_failure(false));
        assert!(!reporter.record_failure(false));
        assert!(monitor.is_healthy());

        assert!(reporter.record_failure(false));
        assert!(!monitor.is_healthy());
        assert_eq!(monitor.snapshot().source, SourceKind::Degraded);

        // Already degraded, no second transition
        assert!(!reporter.record_failure(false));
        assert_eq!(monitor.snapshot().consecutive_failures, 4);
    }

    #[test]
    fn test_success_recovers_immediately() {
        let (reporter, monitor) = health_channel(SourceKind::Device, 2);
        reporter.record_failure(false);
        reporter.record_failure(false);
        assert!(!monitor.is_healthy());

        let now = Utc::now();
        reporter.record_success(now);

        let health = monitor.snapshot();
        assert!(health.is_healthy());
        assert_eq!(health.source, SourceKind::Device);
        assert_eq!(health.consecutive_failures, 0);
        assert_eq!(health.last_frame_at, Some(now));
        assert_eq!(health.frames_captured, 1);
    }

    #[test]
    fn test_device_lost_degrades_at_once() {
        let (reporter, monitor) = health_channel(SourceKind::Device, 10);

        assert!(reporter.record_failure(true));
        assert!(!monitor.is_healthy());
        assert_eq!(monitor.snapshot().consecutive_failures, 1);
    }

    #[test]
    fn test_serialized_kind() {
        let (reporter, _) = health_channel(SourceKind::Synthetic, 1);
        let json = serde_json::to_value(reporter.snapshot()).unwrap();

        assert_eq!(json["source"], "synthetic");
        assert!(json["last_frame_at"].is_null());
    }
}
