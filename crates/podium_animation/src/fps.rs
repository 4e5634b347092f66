//! FPS source
//!
//! The single frame-rate measurement shared by every consumer, so that no two
//! displays ever disagree. The source runs its own frame loop, independent
//! of the [`FrameScheduler`](crate::scheduler::FrameScheduler), because it
//! must measure even before any task exists.
//!
//! Frames arriving faster than the target interval are dropped at the
//! source. Accepted frames are counted over one-second windows; the window's
//! rate is clamped to the target and published to subscribers whenever it
//! changes.

use crate::clock::{frame_period, FrameClock, MonotonicClock, Timestamp};
use crate::history::SampleRing;
use crate::scheduler::panic_message;
use serde::Deserialize;
use slotmap::{new_key_type, SlotMap};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Lowest accepted target frame rate
pub const MIN_TARGET_FPS: u32 = 30;
/// Highest accepted target frame rate
pub const MAX_TARGET_FPS: u32 = 120;

const WINDOW: Duration = Duration::from_secs(1);

static GLOBAL_FPS_SOURCE: OnceLock<FpsSource> = OnceLock::new();

/// Get the process-wide FPS source, creating a default one if needed
pub fn global_fps_source() -> &'static FpsSource {
    GLOBAL_FPS_SOURCE.get_or_init(|| FpsSource::new(FpsConfig::default()))
}

/// Install the process-wide FPS source; returns `false` if one exists
pub fn set_global_fps_source(source: FpsSource) -> bool {
    GLOBAL_FPS_SOURCE.set(source).is_ok()
}

/// Clamp a requested frame rate into the supported band
pub fn clamp_target_fps(fps: u32) -> u32 {
    fps.clamp(MIN_TARGET_FPS, MAX_TARGET_FPS)
}

/// FPS source configuration
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct FpsConfig {
    /// Frame-rate ceiling; clamped into `[30, 120]`
    pub target_fps: u32,
    /// Rate at which the built-in driver offers frames (the display rate)
    pub refresh_rate: u32,
    /// Number of published values kept for aggregates
    pub history_len: usize,
    /// Reported until the first window completes, and forever when the clock
    /// is unavailable
    pub default_fps: u32,
    /// Frames arriving this much earlier than the target interval still count
    pub jitter_tolerance_us: u64,
    /// Start the built-in driver on first subscription
    pub auto_drive: bool,
}

impl Default for FpsConfig {
    fn default() -> Self {
        Self {
            target_fps: 60,
            refresh_rate: 120,
            history_len: 30,
            default_fps: 60,
            jitter_tolerance_us: 1_000,
            auto_drive: true,
        }
    }
}

impl FpsConfig {
    /// Configuration for hosts that deliver frames through `record_frame()`
    pub fn manual() -> Self {
        Self {
            auto_drive: false,
            ..Self::default()
        }
    }
}

new_key_type! {
    /// Handle to a registered FPS subscriber
    pub struct SubscriberId;
}

/// Subscriber callback, invoked with each published FPS value
pub type FpsCallback = Arc<dyn Fn(u32) + Send + Sync>;

struct FpsInner {
    target_fps: u32,
    frame_interval: Duration,
    last_frame: Option<Timestamp>,
    window_start: Option<Timestamp>,
    window_frames: u32,
    current: u32,
    history: SampleRing,
    subscribers: SlotMap<SubscriberId, FpsCallback>,
    driver: Option<JoinHandle<()>>,
}

struct FpsShared {
    inner: Mutex<FpsInner>,
    config: FpsConfig,
    clock: Arc<dyn FrameClock>,
}

impl FpsShared {
    fn lock(&self) -> MutexGuard<'_, FpsInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Shared frame-rate measurement
///
/// Cloning yields another reference to the same measurement.
#[derive(Clone)]
pub struct FpsSource {
    shared: Arc<FpsShared>,
}

impl FpsSource {
    pub fn new(config: FpsConfig) -> Self {
        Self::with_clock(config, Arc::new(MonotonicClock::new()))
    }

    pub fn with_clock(config: FpsConfig, clock: Arc<dyn FrameClock>) -> Self {
        let target_fps = clamp_target_fps(config.target_fps);
        Self {
            shared: Arc::new(FpsShared {
                inner: Mutex::new(FpsInner {
                    target_fps,
                    frame_interval: frame_period(target_fps),
                    last_frame: None,
                    window_start: None,
                    window_frames: 0,
                    current: config.default_fps.min(target_fps),
                    history: SampleRing::new(config.history_len),
                    subscribers: SlotMap::with_key(),
                    driver: None,
                }),
                config,
                clock,
            }),
        }
    }

    /// Subscribe to FPS changes
    ///
    /// The callback runs immediately with the last known value, then once per
    /// distinct new value. Dropping the returned subscription unsubscribes.
    pub fn subscribe<F>(&self, callback: F) -> FpsSubscription
    where
        F: Fn(u32) + Send + Sync + 'static,
    {
        let callback: FpsCallback = Arc::new(callback);
        let (id, current, first) = {
            let mut inner = self.shared.lock();
            let first = inner.subscribers.is_empty();
            let id = inner.subscribers.insert(Arc::clone(&callback));
            (id, inner.current, first)
        };
        notify(&callback, current);

        if first && self.shared.config.auto_drive {
            self.start();
        }

        FpsSubscription {
            source: Arc::downgrade(&self.shared),
            id: Some(id),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.lock().subscribers.len()
    }

    /// Set the frame-rate ceiling, clamped into `[30, 120]`
    ///
    /// Measurement of later frames uses the new ceiling; a current value
    /// above it is lowered at once and republished. History is kept. Returns
    /// the applied value.
    pub fn set_target_fps(&self, fps: u32) -> u32 {
        let target = clamp_target_fps(fps);
        if target != fps {
            tracing::debug!("FpsSource: target {} clamped to {}", fps, target);
        }
        let lowered = {
            let mut inner = self.shared.lock();
            inner.target_fps = target;
            inner.frame_interval = frame_period(target);
            if inner.current > target {
                inner.current = target;
                Some(inner.subscribers.values().cloned().collect::<Vec<FpsCallback>>())
            } else {
                None
            }
        };
        if let Some(subscribers) = lowered {
            for callback in &subscribers {
                notify(callback, target);
            }
        }
        target
    }

    pub fn target_fps(&self) -> u32 {
        self.shared.lock().target_fps
    }

    pub fn current_fps(&self) -> u32 {
        self.shared.lock().current
    }

    /// Rounded mean of recent published values (current value if none)
    pub fn average_fps(&self) -> u32 {
        let inner = self.shared.lock();
        inner.history.average().unwrap_or(inner.current)
    }

    pub fn min_fps(&self) -> u32 {
        let inner = self.shared.lock();
        inner.history.min().unwrap_or(inner.current)
    }

    pub fn max_fps(&self) -> u32 {
        let inner = self.shared.lock();
        inner.history.max().unwrap_or(inner.current)
    }

    /// Recent published values, oldest first
    pub fn history(&self) -> Vec<u32> {
        self.shared.lock().history.to_vec()
    }

    /// Offer a frame at the clock's current time
    ///
    /// Without a clock reading the measurement is left untouched and the
    /// current value (initially the configured default) stays published.
    pub fn record_now(&self) -> Option<u32> {
        match self.shared.clock.now() {
            Some(now) => self.record_frame(now),
            None => None,
        }
    }

    /// Offer a frame delivered at `timestamp`
    ///
    /// Returns the newly published value when this frame closed a window
    /// with a different rate.
    pub fn record_frame(&self, timestamp: Timestamp) -> Option<u32> {
        let tolerance = Duration::from_micros(self.shared.config.jitter_tolerance_us);
        let (value, subscribers) = {
            let mut inner = self.shared.lock();
            let Some(last) = inner.last_frame else {
                inner.last_frame = Some(timestamp);
                inner.window_start = Some(timestamp);
                return None;
            };

            // Rate limiting at the source
            if timestamp.saturating_sub(last) + tolerance < inner.frame_interval {
                return None;
            }
            inner.last_frame = Some(timestamp);
            inner.window_frames += 1;

            let start = inner.window_start.unwrap_or(timestamp);
            let elapsed = timestamp.saturating_sub(start);
            if elapsed < WINDOW {
                return None;
            }

            let measured = (f64::from(inner.window_frames) / elapsed.as_secs_f64()).round() as u32;
            let limited = measured.min(inner.target_fps);
            inner.window_frames = 0;
            inner.window_start = Some(timestamp);

            if limited == inner.current {
                return None;
            }
            inner.current = limited;
            inner.history.push(limited);
            let subscribers: Vec<FpsCallback> = inner.subscribers.values().cloned().collect();
            (limited, subscribers)
        };

        tracing::trace!("FpsSource: {} fps", value);
        for callback in &subscribers {
            notify(callback, value);
        }
        Some(value)
    }

    /// Start the built-in frame driver on the current tokio runtime
    ///
    /// Returns `false` if it is already running or no runtime is available.
    pub fn start(&self) -> bool {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                tracing::debug!("FpsSource: no tokio runtime, frames must be recorded manually");
                return false;
            }
        };
        let mut inner = self.shared.lock();
        if inner.driver.is_some() {
            return false;
        }
        let period = frame_period(self.shared.config.refresh_rate);
        inner.driver = Some(runtime.spawn(drive_measurement(
            Arc::downgrade(&self.shared),
            period,
        )));
        tracing::debug!("FpsSource: measurement started");
        true
    }

    /// Stop the built-in frame driver
    pub fn stop(&self) {
        let driver = self.shared.lock().driver.take();
        if let Some(driver) = driver {
            driver.abort();
            tracing::debug!("FpsSource: measurement stopped");
        }
    }

    pub fn is_measuring(&self) -> bool {
        self.shared.lock().driver.is_some()
    }

    /// Forget all measurement state; subscribers are kept
    pub fn reset(&self) {
        let mut inner = self.shared.lock();
        inner.last_frame = None;
        inner.window_start = None;
        inner.window_frames = 0;
        inner.current = self.shared.config.default_fps.min(inner.target_fps);
        inner.history.clear();
    }

    fn unsubscribe(shared: &FpsShared, id: SubscriberId) {
        shared.lock().subscribers.remove(id);
    }
}

impl Default for FpsSource {
    fn default() -> Self {
        Self::new(FpsConfig::default())
    }
}

fn notify(callback: &FpsCallback, value: u32) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| callback(value))) {
        tracing::error!(
            "FpsSource: subscriber panicked: {}",
            panic_message(payload.as_ref())
        );
    }
}

async fn drive_measurement(shared: Weak<FpsShared>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        interval.tick().await;
        let Some(shared) = shared.upgrade() else {
            break;
        };
        FpsSource { shared }.record_now();
    }
}

/// Live FPS subscription; unsubscribes when dropped
pub struct FpsSubscription {
    source: Weak<FpsShared>,
    id: Option<SubscriberId>,
}

impl FpsSubscription {
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let (Some(id), Some(shared)) = (self.id.take(), self.source.upgrade()) {
            FpsSource::unsubscribe(&shared, id);
        }
    }
}

impl Drop for FpsSubscription {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn micros(value: u64) -> Duration {
        Duration::from_micros(value)
    }

    /// Deliver `count` evenly spaced frames after an origin frame at zero
    fn deliver(source: &FpsSource, count: u64, spacing_us: u64) {
        for k in 0..=count {
            source.record_frame(micros(k * spacing_us));
        }
    }

    fn collector() -> (Arc<Mutex<Vec<u32>>>, impl Fn(u32) + Send + Sync + 'static) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, move |fps| sink.lock().unwrap().push(fps))
    }

    #[test]
    fn test_shared_value_for_all_subscribers() {
        let source = FpsSource::new(FpsConfig::manual());
        assert_eq!(source.set_target_fps(30), 30);

        let (a, cb_a) = collector();
        let (b, cb_b) = collector();
        let (c, cb_c) = collector();
        let _sa = source.subscribe(cb_a);
        let _sb = source.subscribe(cb_b);
        let _sc = source.subscribe(cb_c);

        // 60 frames evenly across one second at a 30 fps ceiling
        deliver(&source, 60, 16_667);

        for seen in [a, b, c] {
            assert_eq!(*seen.lock().unwrap(), vec![30]);
        }
        assert_eq!(source.current_fps(), 30);
    }

    #[test]
    fn test_unchanged_value_not_republished() {
        let source = FpsSource::new(FpsConfig::manual());
        source.set_target_fps(30);
        let (seen, cb) = collector();
        let _sub = source.subscribe(cb);

        // Three full seconds at the same rate
        for k in 0..=180u64 {
            source.record_frame(micros(k * 16_667));
        }
        assert_eq!(*seen.lock().unwrap(), vec![30]);
        assert_eq!(source.average_fps(), 30);
    }

    #[test]
    fn test_target_is_clamped() {
        let source = FpsSource::new(FpsConfig::manual());
        assert_eq!(source.set_target_fps(5), MIN_TARGET_FPS);
        assert_eq!(source.set_target_fps(500), MAX_TARGET_FPS);
        assert_eq!(source.target_fps(), MAX_TARGET_FPS);
        assert_eq!(source.set_target_fps(75), 75);
    }

    #[test]
    fn test_reported_fps_never_exceeds_target() {
        let source = FpsSource::new(FpsConfig::manual());
        let applied = source.set_target_fps(10);
        let (seen, cb) = collector();
        let _sub = source.subscribe(cb);

        // A 240 Hz display for two seconds
        for k in 0..=480u64 {
            source.record_frame(micros(k * 4_167));
        }
        let seen = seen.lock().unwrap();
        assert!(!seen.is_empty());
        assert!(seen.iter().all(|&fps| fps <= applied));
        assert!(source.current_fps() <= applied);
    }

    #[test]
    fn test_default_value_respects_configured_target() {
        let source = FpsSource::new(FpsConfig {
            target_fps: 30,
            ..FpsConfig::manual()
        });
        let (seen, cb) = collector();
        let _sub = source.subscribe(cb);
        assert_eq!(*seen.lock().unwrap(), vec![30]);
        assert_eq!(source.current_fps(), 30);

        source.reset();
        assert_eq!(source.current_fps(), 30);
    }

    #[test]
    fn test_slow_frames_report_actual_rate() {
        let source = FpsSource::new(FpsConfig::manual());
        // 40 fps delivery under a 60 fps target
        deliver(&source, 40, 25_000);
        assert_eq!(source.current_fps(), 40);
    }

    #[test]
    fn test_lowered_target_caps_reported_value() {
        let source = FpsSource::new(FpsConfig::manual());
        let (early, cb) = collector();
        let _early = source.subscribe(cb);
        deliver(&source, 60, 16_667);
        assert_eq!(source.current_fps(), 60);

        source.set_target_fps(30);
        assert_eq!(source.current_fps(), 30);
        assert_eq!(*early.lock().unwrap(), vec![60, 30]);

        let (late, cb) = collector();
        let _late = source.subscribe(cb);
        assert_eq!(*late.lock().unwrap(), vec![30]);
        assert!(source.history().is_empty());

        // Raising the ceiling does not raise the value until it is measured
        source.set_target_fps(120);
        assert_eq!(source.current_fps(), 30);
    }

    #[test]
    fn test_aggregates_over_history() {
        let source = FpsSource::new(FpsConfig::manual());
        assert_eq!(source.average_fps(), 60);

        let mut t = 0u64;
        source.record_frame(micros(t));
        // One second at 40 fps, then one at 50 fps
        for spacing in [25_000u64, 20_000] {
            let frames = 1_000_000 / spacing;
            for _ in 0..frames {
                t += spacing;
                source.record_frame(micros(t));
            }
        }
        assert_eq!(source.history(), vec![40, 50]);
        assert_eq!(source.average_fps(), 45);
        assert_eq!(source.min_fps(), 40);
        assert_eq!(source.max_fps(), 50);
    }

    #[test]
    fn test_unsubscribe_on_drop() {
        let source = FpsSource::new(FpsConfig::manual());
        let (seen, cb) = collector();
        let sub = source.subscribe(cb);
        assert_eq!(source.subscriber_count(), 1);
        drop(sub);
        assert_eq!(source.subscriber_count(), 0);

        source.set_target_fps(30);
        deliver(&source, 60, 16_667);
        assert_eq!(*seen.lock().unwrap(), vec![60]);
    }

    #[test]
    fn test_unavailable_clock_keeps_default() {
        let clock = ManualClock::new();
        let source = FpsSource::with_clock(FpsConfig::manual(), Arc::new(clock.clone()));
        for _ in 0..100 {
            assert_eq!(source.record_now(), None);
        }
        assert_eq!(source.current_fps(), 60);

        clock.set(Duration::ZERO);
        assert_eq!(source.record_now(), None);
    }

    #[test]
    fn test_panicking_subscriber_does_not_break_measurement() {
        let source = FpsSource::new(FpsConfig::manual());
        let _bad = source.subscribe(|fps| {
            if fps == 30 {
                panic!("display detached");
            }
        });
        let (seen, cb) = collector();
        let _good = source.subscribe(cb);

        // 30 fps delivery under the default 60 fps target
        deliver(&source, 31, 33_333);
        assert_eq!(*seen.lock().unwrap(), vec![60, 30]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_driver_measures_once_for_many_subscribers() {
        let source = FpsSource::new(FpsConfig {
            target_fps: 60,
            refresh_rate: 60,
            ..FpsConfig::default()
        });
        let _a = source.subscribe(|_| {});
        let _b = source.subscribe(|_| {});
        assert!(source.is_measuring());
        assert!(!source.start());

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        assert_eq!(source.current_fps(), 60);

        source.stop();
        assert!(!source.is_measuring());
    }
}
