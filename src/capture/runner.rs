//! Rate-governed capture loop
//!
//! One long-running task owns the frame source. Each tick it asks the
//! source for a frame, publishes it, and sleeps for whatever remains of the
//! frame interval. A tick that overruns is followed immediately by the next
//! one; missed ticks are never made up, so only the latest frame is current.

use std::future::Future;
use std::time::Duration;

use tokio::time::{self, Instant};

use crate::broadcast::Broadcaster;
use crate::config::Config;
use crate::error::CaptureError;
use crate::source::FrameSource;

use super::frame::Frame;
use super::health::{health_channel, HealthMonitor, HealthReporter};

/// Totals reported when the loop stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    /// Loop iterations executed
    pub ticks: u64,
    /// Frames published to the broadcaster
    pub frames_published: u64,
    /// Failed capture attempts
    pub failures: u64,
    /// Device reopen attempts
    pub reopen_attempts: u64,
}

/// Drives a frame source at the configured rate
pub struct CaptureLoop<S: FrameSource> {
    source: S,
    broadcaster: Broadcaster,
    health: HealthReporter,
    interval: Duration,
    reopen_interval: Duration,
    next_sequence: u64,
    last_reopen: Option<Instant>,
    stats: CaptureStats,
}

impl<S: FrameSource> CaptureLoop<S> {
    /// Create a capture loop and the health monitor it publishes to
    pub fn new(source: S, broadcaster: Broadcaster, config: &Config) -> (Self, HealthMonitor) {
        let (health, monitor) = health_channel(source.kind(), config.failure_threshold);

        let capture = Self {
            source,
            broadcaster,
            health,
            interval: config.frame_interval(),
            reopen_interval: config.reopen_interval,
            next_sequence: 1,
            last_reopen: None,
            stats: CaptureStats::default(),
        };

        (capture, monitor)
    }

    /// Target time between ticks
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run until `shutdown` resolves, then close the source
    pub async fn run_until<F>(mut self, shutdown: F) -> CaptureStats
    where
        F: Future<Output = ()>,
    {
        tracing::info!(
            source = %self.source.kind(),
            interval_ms = self.interval.as_millis() as u64,
            "Capture loop started"
        );

        tokio::pin!(shutdown);

        // Absolute deadlines, so timer latency never accumulates
        let mut deadline = Instant::now();

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                _ = self.tick() => {}
            }

            deadline += self.interval;
            let now = Instant::now();
            if deadline <= now {
                // Overran: start the next tick now and drop the missed ones
                deadline = now;
                continue;
            }

            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                _ = time::sleep_until(deadline) => {}
            }
        }

        self.source.close();

        tracing::info!(
            ticks = self.stats.ticks,
            frames = self.stats.frames_published,
            failures = self.stats.failures,
            "Capture loop stopped"
        );

        self.stats
    }

    /// One capture attempt: produce, publish, and record health
    async fn tick(&mut self) {
        self.stats.ticks += 1;

        if !self.health.snapshot().is_healthy() {
            self.maybe_reopen().await;
        }

        match self.source.next_frame().await {
            Ok(data) => {
                let frame = Frame::new(self.next_sequence, data);
                self.next_sequence += 1;

                self.health.record_success(frame.captured_at);
                let receivers = self.broadcaster.publish(frame);
                self.stats.frames_published += 1;

                tracing::trace!(receivers, "Frame published");
            }
            Err(e) => {
                self.stats.failures += 1;
                let degraded = self.health.record_failure(e.is_device_lost());
                let failures = self.health.snapshot().consecutive_failures;

                if degraded {
                    let lost = match e {
                        CaptureError::DeviceLost(reason) => CaptureError::DeviceLost(reason),
                        CaptureError::ReadFailed(reason) => CaptureError::DeviceLost(format!(
                            "{} consecutive failures, last: {}",
                            failures, reason
                        )),
                    };
                    tracing::warn!(error = %lost, "Capture degraded");
                } else {
                    tracing::error!(error = %e, failures, "Frame capture failed");
                }
            }
        }
    }

    async fn maybe_reopen(&mut self) {
        let due = self
            .last_reopen
            .map_or(true, |at| at.elapsed() >= self.reopen_interval);
        if !due {
            return;
        }

        self.last_reopen = Some(Instant::now());
        self.stats.reopen_attempts += 1;

        if let Err(e) = self.source.reopen().await {
            tracing::warn!(error = %e, "Source reopen failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;

    use bytes::Bytes;
    use parking_lot::Mutex;

    use super::*;
    use crate::capture::SourceKind;
    use crate::error::OpenError;

    /// Outcome of one scripted capture
    #[derive(Clone)]
    enum Step {
        Frame,
        Fail,
        Lost,
        Slow(Duration),
    }

    /// Source that follows a script and records when it was polled
    struct ScriptedSource {
        script: VecDeque<Step>,
        calls: Arc<Mutex<Vec<Instant>>>,
        reopens: Arc<Mutex<u32>>,
        closed: Arc<Mutex<bool>>,
    }

    impl ScriptedSource {
        fn new(script: impl IntoIterator<Item = Step>) -> Self {
            Self {
                script: script.into_iter().collect(),
                calls: Arc::new(Mutex::new(Vec::new())),
                reopens: Arc::new(Mutex::new(0)),
                closed: Arc::new(Mutex::new(false)),
            }
        }
    }

    impl FrameSource for ScriptedSource {
        fn kind(&self) -> SourceKind {
            SourceKind::Device
        }

        async fn next_frame(&mut self) -> Result<Bytes, CaptureError> {
            self.calls.lock().push(Instant::now());
            match self.script.pop_front().unwrap_or(Step::Frame) {
                Step::Frame => Ok(Bytes::from_static(b"\xFF\xD8jpeg\xFF\xD9")),
                Step::Fail => Err(CaptureError::ReadFailed("timeout".into())),
                Step::Lost => Err(CaptureError::DeviceLost("unplugged".into())),
                Step::Slow(delay) => {
                    time::sleep(delay).await;
                    Ok(Bytes::from_static(b"slow"))
                }
            }
        }

        async fn reopen(&mut self) -> Result<(), OpenError> {
            *self.reopens.lock() += 1;
            Ok(())
        }

        fn close(&mut self) {
            *self.closed.lock() = true;
        }
    }

    fn config(rate: f32, threshold: u32) -> Config {
        Config::default()
            .frame_rate(rate)
            .failure_threshold(threshold)
            .reopen_interval(Duration::from_secs(1))
    }

    #[tokio::test(start_paused = true)]
    async fn test_cadence_without_drift() {
        const TICKS: u32 = 600;

        for rate in [1.0, 12.0, 30.0, 60.0] {
            let config = config(rate, 5);
            let source = ScriptedSource::new([]);
            let calls = source.calls.clone();
            let (capture, _health) = CaptureLoop::new(source, Broadcaster::new(4), &config);
            let interval = capture.interval();

            let stats = capture.run_until(time::sleep(interval * TICKS)).await;

            // Rounding each timer up to the next millisecond must not cost ticks
            let calls = calls.lock();
            let ticks = calls.len() as u32;
            assert!(
                (TICKS - 1..=TICKS + 1).contains(&ticks),
                "rate {} ran {} ticks, expected {}",
                rate,
                ticks,
                TICKS
            );

            let span = *calls.last().unwrap() - calls[0];
            let expected = interval * (ticks - 1);
            let drift = if span > expected {
                span - expected
            } else {
                expected - span
            };
            assert!(
                drift <= Duration::from_millis(2),
                "rate {} spent {:?} over {} intervals of {:?}",
                rate,
                span,
                ticks - 1,
                interval
            );
            assert_eq!(stats.frames_published, calls.len() as u64);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_overrun_does_not_catch_up() {
        let config = config(10.0, 5);
        let interval = config.frame_interval();
        let source = ScriptedSource::new([Step::Frame, Step::Slow(interval * 3), Step::Frame]);
        let calls = source.calls.clone();
        let (capture, _health) = CaptureLoop::new(source, Broadcaster::new(4), &config);

        capture.run_until(time::sleep(interval * 10)).await;

        let calls = calls.lock();
        // Slow tick starts at 1 interval and ends at 4; the next starts right away
        assert_eq!(calls[2] - calls[1], interval * 3);
        // Then regular cadence resumes, one tick per interval
        assert_eq!(calls[3] - calls[2], interval);
        assert!(calls.len() <= 8);
    }

    #[tokio::test(start_paused = true)]
    async fn test_publishes_ordered_frames() {
        let config = config(20.0, 5);
        let broadcaster = Broadcaster::new(16);
        let mut subscription = broadcaster.subscribe();
        let (capture, health) =
            CaptureLoop::new(ScriptedSource::new([]), broadcaster.clone(), &config);

        let stats = capture
            .run_until(time::sleep(config.frame_interval() * 5))
            .await;

        let mut expected = 1;
        while let Some(frame) = subscription.try_recv() {
            assert_eq!(frame.sequence, expected);
            expected += 1;
        }
        assert_eq!(expected - 1, stats.frames_published);
        assert_eq!(health.snapshot().frames_captured, stats.frames_published);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_degrade_and_recover() {
        let config = config(10.0, 3);
        let interval = config.frame_interval();
        let source = ScriptedSource::new([Step::Frame, Step::Fail, Step::Fail, Step::Fail, Step::Frame]);
        let reopens = source.reopens.clone();
        let broadcaster = Broadcaster::new(16);
        let mut subscription = broadcaster.subscribe();
        let (capture, health) = CaptureLoop::new(source, broadcaster.clone(), &config);

        let task = tokio::spawn(capture.run_until(time::sleep(interval * 10)));

        // After tick 4 (three failures) the source is degraded
        time::sleep(interval * 3 + interval / 2).await;
        let snapshot = health.snapshot();
        assert_eq!(snapshot.source, SourceKind::Degraded);
        assert_eq!(snapshot.consecutive_failures, 3);
        assert!(!health.is_healthy());

        // Tick 5 succeeds and restores health at once
        time::sleep(interval).await;
        let snapshot = health.snapshot();
        assert!(snapshot.is_healthy());
        assert_eq!(snapshot.source, SourceKind::Device);
        assert_eq!(snapshot.consecutive_failures, 0);
        assert_eq!(*reopens.lock(), 1);

        let stats = task.await.unwrap();
        assert_eq!(stats.failures, 3);

        // Failed ticks publish nothing; sequences stay gapless
        assert_eq!(subscription.try_recv().unwrap().sequence, 1);
        assert_eq!(subscription.try_recv().unwrap().sequence, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_device_lost_degrades_immediately() {
        let config = config(10.0, 5);
        let source = ScriptedSource::new([Step::Lost]);
        let (capture, health) = CaptureLoop::new(source, Broadcaster::new(4), &config);

        let task = tokio::spawn(capture.run_until(time::sleep(config.frame_interval() * 3)));
        time::sleep(config.frame_interval() / 2).await;

        assert_eq!(health.snapshot().source, SourceKind::Degraded);
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_reopen_is_rate_limited() {
        let config = config(10.0, 1);
        let source = ScriptedSource::new(std::iter::repeat(Step::Fail).take(100));
        let reopens = source.reopens.clone();
        let (capture, _health) = CaptureLoop::new(source, Broadcaster::new(4), &config);

        // 3 seconds of failures at 10 fps with a 1s reopen interval
        let stats = capture.run_until(time::sleep(Duration::from_millis(3050))).await;

        assert!(stats.failures >= 30);
        assert_eq!(*reopens.lock(), 3);
        assert_eq!(stats.reopen_attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_closes_source() {
        let config = config(10.0, 5);
        let source = ScriptedSource::new([]);
        let closed = source.closed.clone();
        let (capture, _health) = CaptureLoop::new(source, Broadcaster::new(4), &config);

        capture.run_until(async {}).await;

        assert!(*closed.lock());
    }
}
