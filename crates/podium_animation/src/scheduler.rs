//! Frame scheduler
//!
//! One cooperative frame loop shared by every animated effect, so that N
//! effects never start N independent frame loops. Effects register named
//! recurring tasks; the loop starts when the first task arrives and stops as
//! soon as the task set is empty.
//!
//! - Tasks run in descending priority order (registration order breaks ties)
//! - A task runs only when `min_interval` has elapsed since its last run
//! - Returning `false` from a callback unregisters the task
//! - A panicking callback is logged and evicted; the loop keeps going
//! - The task set is bounded; overflow evicts the oldest registration
//!
//! Callbacks may register or unregister tasks (including themselves) while
//! they run. Each frame works on a snapshot and re-validates every task
//! before invoking it.

use crate::clock::{frame_period, FrameClock, MonotonicClock, Timestamp};
use indexmap::IndexMap;
use serde::Deserialize;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

// ============================================================================
// Global Frame Scheduler
// ============================================================================

static GLOBAL_SCHEDULER: OnceLock<FrameScheduler> = OnceLock::new();

/// Install the process-wide frame scheduler
///
/// Returns `false` if a global scheduler was already installed (either by an
/// earlier call or lazily by [`global_scheduler`]).
pub fn set_global_scheduler(scheduler: FrameScheduler) -> bool {
    GLOBAL_SCHEDULER.set(scheduler).is_ok()
}

/// Get the process-wide frame scheduler, creating a default one if needed
///
/// Components that can be handed a scheduler explicitly should prefer that;
/// the global exists for effects that live outside any injection path.
pub fn global_scheduler() -> &'static FrameScheduler {
    GLOBAL_SCHEDULER.get_or_init(|| FrameScheduler::new(SchedulerConfig::default()))
}

/// Get the process-wide scheduler if one exists
pub fn try_global_scheduler() -> Option<&'static FrameScheduler> {
    GLOBAL_SCHEDULER.get()
}

// ============================================================================
// Configuration
// ============================================================================

/// Frame scheduler configuration
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Maximum number of concurrently registered tasks
    pub max_tasks: usize,
    /// Rate of the built-in frame driver, in frames per second
    pub refresh_rate: u32,
    /// Spawn a frame driver on the current tokio runtime when tasks exist.
    /// When disabled (or outside a runtime) the host calls `tick()`.
    pub auto_drive: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_tasks: 20,
            refresh_rate: 120,
            auto_drive: true,
        }
    }
}

impl SchedulerConfig {
    /// Configuration for hosts that deliver frames through `tick()`
    pub fn manual() -> Self {
        Self {
            auto_drive: false,
            ..Self::default()
        }
    }
}

/// Per-task scheduling options
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TaskOptions {
    /// Higher priorities run first within a frame
    pub priority: i32,
    /// Minimum time between two runs of the task
    pub min_interval: Duration,
}

impl TaskOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn min_interval(mut self, min_interval: Duration) -> Self {
        self.min_interval = min_interval;
        self
    }
}

impl Default for TaskOptions {
    fn default() -> Self {
        Self {
            priority: 5,
            min_interval: Duration::ZERO,
        }
    }
}

// ============================================================================
// Frame State
// ============================================================================

/// Information handed to every task callback
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameInfo {
    /// Timestamp of this frame
    pub timestamp: Timestamp,
    /// Time since the previous frame (zero on the first frame after a start)
    pub delta: Duration,
    /// Frame counter since the scheduler was created
    pub frame: u64,
}

/// Frame loop state, driven purely by task-set cardinality
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchedulerState {
    Stopped,
    Running,
}

/// Snapshot of scheduler health
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SchedulerStats {
    pub task_count: usize,
    pub state: SchedulerState,
    pub frames: u64,
    /// Frames delivered over the last completed one-second window
    pub fps: u32,
}

/// Task callback: receives the frame, returns whether to keep running
pub type TaskCallback = Box<dyn FnMut(&FrameInfo) -> bool + Send>;

struct TaskEntry {
    /// Registration serial; a re-registration under the same id gets a new one
    serial: u64,
    priority: i32,
    min_interval: Duration,
    last_run: Option<Timestamp>,
    callback: Arc<Mutex<TaskCallback>>,
}

impl TaskEntry {
    fn is_due(&self, now: Timestamp) -> bool {
        self.last_run
            .map_or(true, |last| now.saturating_sub(last) >= self.min_interval)
    }
}

/// A task selected to run in the current frame
struct DueTask {
    id: String,
    serial: u64,
    priority: i32,
    callback: Arc<Mutex<TaskCallback>>,
}

struct SchedulerInner {
    /// Insertion-ordered, so index 0 is the oldest registration
    tasks: IndexMap<String, TaskEntry>,
    next_serial: u64,
    state: SchedulerState,
    last_tick: Option<Timestamp>,
    frames: u64,
    fps_window_start: Option<Timestamp>,
    fps_window_frames: u32,
    fps: u32,
    driver: Option<JoinHandle<()>>,
}

struct Shared {
    inner: Mutex<SchedulerInner>,
    config: SchedulerConfig,
    clock: Arc<dyn FrameClock>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SchedulerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ============================================================================
// Frame Scheduler
// ============================================================================

/// Shared cooperative frame scheduler
///
/// Cloning yields another reference to the same scheduler. Pass instances
/// explicitly to the components that animate; use [`global_scheduler`] only
/// where no injection path exists.
///
/// ```ignore
/// let scheduler = FrameScheduler::new(SchedulerConfig::default());
/// scheduler.register_task("glow", TaskOptions::new().priority(8), |frame| {
///     pulse(frame.delta);
///     true
/// });
/// ```
#[derive(Clone)]
pub struct FrameScheduler {
    shared: Arc<Shared>,
}

impl FrameScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self::with_clock(config, Arc::new(MonotonicClock::new()))
    }

    pub fn with_clock(config: SchedulerConfig, clock: Arc<dyn FrameClock>) -> Self {
        let config = SchedulerConfig {
            max_tasks: config.max_tasks.max(1),
            refresh_rate: config.refresh_rate.max(1),
            ..config
        };
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(SchedulerInner {
                    tasks: IndexMap::new(),
                    next_serial: 0,
                    state: SchedulerState::Stopped,
                    last_tick: None,
                    frames: 0,
                    fps_window_start: None,
                    fps_window_frames: 0,
                    fps: 0,
                    driver: None,
                }),
                config,
                clock,
            }),
        }
    }

    /// Get a weak handle that does not keep the scheduler alive
    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            shared: Arc::downgrade(&self.shared),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.shared.config
    }

    /// Register a recurring task, replacing any task with the same id
    ///
    /// The replacement counts as the newest registration. If the task set
    /// exceeds `max_tasks`, the oldest registrations are evicted.
    pub fn register_task<F>(&self, id: impl Into<String>, options: TaskOptions, callback: F)
    where
        F: FnMut(&FrameInfo) -> bool + Send + 'static,
    {
        let id = id.into();
        let (replaced, evicted, started) = {
            let mut inner = self.shared.lock();
            inner.next_serial += 1;
            let entry = TaskEntry {
                serial: inner.next_serial,
                priority: options.priority,
                min_interval: options.min_interval,
                last_run: None,
                callback: Arc::new(Mutex::new(Box::new(callback))),
            };
            let replaced = inner.tasks.shift_remove(&id).is_some();
            inner.tasks.insert(id.clone(), entry);

            let mut evicted = Vec::new();
            while inner.tasks.len() > self.shared.config.max_tasks {
                match inner.tasks.shift_remove_index(0) {
                    Some((old_id, _)) => evicted.push(old_id),
                    None => break,
                }
            }

            let started = inner.state == SchedulerState::Stopped;
            if started {
                inner.state = SchedulerState::Running;
                inner.last_tick = None;
                inner.fps_window_start = None;
                inner.fps_window_frames = 0;
            }
            (replaced, evicted, started)
        };

        if replaced {
            tracing::debug!("FrameScheduler: replaced task '{}'", id);
        } else {
            tracing::debug!("FrameScheduler: registered task '{}'", id);
        }
        for old_id in evicted {
            tracing::warn!(
                "FrameScheduler: task limit ({}) reached, evicted oldest task '{}'",
                self.shared.config.max_tasks,
                old_id
            );
        }
        if started {
            tracing::debug!("FrameScheduler: started");
            self.start_driver();
        }
    }

    /// Remove a task; stops the frame loop when no tasks remain
    ///
    /// Returns whether a task with that id existed.
    pub fn unregister_task(&self, id: &str) -> bool {
        let removed = self.shared.lock().tasks.shift_remove(id).is_some();
        if removed {
            tracing::debug!("FrameScheduler: unregistered task '{}'", id);
        }
        self.stop_if_idle();
        removed
    }

    /// Remove every task and stop the frame loop
    pub fn clear(&self) {
        let count = {
            let mut inner = self.shared.lock();
            let count = inner.tasks.len();
            inner.tasks.clear();
            count
        };
        if count > 0 {
            tracing::debug!("FrameScheduler: cleared {} tasks", count);
        }
        self.stop_if_idle();
    }

    pub fn contains_task(&self, id: &str) -> bool {
        self.shared.lock().tasks.contains_key(id)
    }

    pub fn task_count(&self) -> usize {
        self.shared.lock().tasks.len()
    }

    /// Task ids, oldest registration first
    pub fn task_ids(&self) -> Vec<String> {
        self.shared.lock().tasks.keys().cloned().collect()
    }

    pub fn state(&self) -> SchedulerState {
        self.shared.lock().state
    }

    pub fn is_running(&self) -> bool {
        self.state() == SchedulerState::Running
    }

    pub fn stats(&self) -> SchedulerStats {
        let inner = self.shared.lock();
        SchedulerStats {
            task_count: inner.tasks.len(),
            state: inner.state,
            frames: inner.frames,
            fps: inner.fps,
        }
    }

    /// Run one frame at the clock's current time
    ///
    /// Returns `true` while tasks remain. Without a clock reading the frame
    /// is placed one refresh period after the previous one.
    pub fn tick(&self) -> bool {
        let now = match self.shared.clock.now() {
            Some(now) => now,
            None => {
                let last = self.shared.lock().last_tick.unwrap_or_default();
                last + frame_period(self.shared.config.refresh_rate)
            }
        };
        self.tick_at(now)
    }

    /// Run one frame at an explicit timestamp
    ///
    /// Returns `true` while tasks remain.
    pub fn tick_at(&self, now: Timestamp) -> bool {
        let (frame, due) = {
            let mut inner = self.shared.lock();
            if inner.tasks.is_empty() {
                drop(inner);
                return self.stop_if_idle();
            }

            let delta = inner
                .last_tick
                .map(|last| now.saturating_sub(last))
                .unwrap_or_default();
            inner.last_tick = Some(now);
            inner.frames += 1;
            measure_fps(&mut inner, now);

            let frame = FrameInfo {
                timestamp: now,
                delta,
                frame: inner.frames,
            };

            let mut due: Vec<DueTask> = inner
                .tasks
                .iter()
                .filter(|(_, task)| task.is_due(now))
                .map(|(id, task)| DueTask {
                    id: id.clone(),
                    serial: task.serial,
                    priority: task.priority,
                    callback: Arc::clone(&task.callback),
                })
                .collect();
            // Stable sort keeps registration order among equal priorities
            due.sort_by(|a, b| b.priority.cmp(&a.priority));
            (frame, due)
        };

        for task in due {
            // An earlier callback this frame may have removed or replaced it
            if !self.is_current(&task.id, task.serial) {
                continue;
            }

            let outcome = {
                let mut guard = task.callback.lock().unwrap_or_else(PoisonError::into_inner);
                let callback: &mut TaskCallback = &mut guard;
                panic::catch_unwind(AssertUnwindSafe(|| callback(&frame)))
            };

            let mut inner = self.shared.lock();
            let still_current = inner
                .tasks
                .get(&task.id)
                .is_some_and(|entry| entry.serial == task.serial);
            if !still_current {
                continue;
            }
            match outcome {
                Ok(true) => {
                    if let Some(entry) = inner.tasks.get_mut(&task.id) {
                        entry.last_run = Some(now);
                    }
                }
                Ok(false) => {
                    inner.tasks.shift_remove(&task.id);
                    drop(inner);
                    tracing::debug!("FrameScheduler: task '{}' finished", task.id);
                }
                Err(payload) => {
                    inner.tasks.shift_remove(&task.id);
                    drop(inner);
                    tracing::error!(
                        "FrameScheduler: task '{}' panicked and was evicted: {}",
                        task.id,
                        panic_message(payload.as_ref())
                    );
                }
            }
        }

        self.stop_if_idle()
    }

    fn is_current(&self, id: &str, serial: u64) -> bool {
        self.shared
            .lock()
            .tasks
            .get(id)
            .is_some_and(|entry| entry.serial == serial)
    }

    /// Transition to `Stopped` when the task set is empty
    ///
    /// Returns `true` while the scheduler keeps running.
    fn stop_if_idle(&self) -> bool {
        let driver = {
            let mut inner = self.shared.lock();
            if !inner.tasks.is_empty() {
                return true;
            }
            if inner.state == SchedulerState::Stopped {
                return false;
            }
            inner.state = SchedulerState::Stopped;
            inner.last_tick = None;
            inner.driver.take()
        };
        if let Some(driver) = driver {
            driver.abort();
        }
        tracing::debug!("FrameScheduler: stopped (no tasks)");
        false
    }

    fn start_driver(&self) {
        if !self.shared.config.auto_drive {
            return;
        }
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                tracing::debug!("FrameScheduler: no tokio runtime, frames must be driven by tick()");
                return;
            }
        };

        let period = frame_period(self.shared.config.refresh_rate);
        let driver = runtime.spawn(drive_frames(Arc::downgrade(&self.shared), period));
        let previous = self.shared.lock().driver.replace(driver);
        if let Some(previous) = previous {
            previous.abort();
        }
    }
}

/// Frame driver loop; exits when the scheduler stops or is dropped
async fn drive_frames(shared: Weak<Shared>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        interval.tick().await;
        let Some(shared) = shared.upgrade() else {
            break;
        };
        if !(FrameScheduler { shared }).tick() {
            break;
        }
    }
}

fn measure_fps(inner: &mut SchedulerInner, now: Timestamp) {
    let Some(start) = inner.fps_window_start else {
        inner.fps_window_start = Some(now);
        return;
    };
    inner.fps_window_frames += 1;
    let elapsed = now.saturating_sub(start);
    if elapsed >= Duration::from_secs(1) {
        inner.fps = (f64::from(inner.fps_window_frames) / elapsed.as_secs_f64()).round() as u32;
        inner.fps_window_frames = 0;
        inner.fps_window_start = Some(now);
    }
}

/// Best-effort text of a caught panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

impl Default for FrameScheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

// ============================================================================
// Scheduler Handle
// ============================================================================

/// A weak handle to a frame scheduler
///
/// Handed to long-lived effects so that they never keep the scheduler alive
/// on their own.
#[derive(Clone)]
pub struct SchedulerHandle {
    shared: Weak<Shared>,
}

impl SchedulerHandle {
    /// Upgrade to a strong reference if the scheduler still exists
    pub fn upgrade(&self) -> Option<FrameScheduler> {
        self.shared.upgrade().map(|shared| FrameScheduler { shared })
    }

    /// Register a task; returns `false` if the scheduler is gone
    pub fn register_task<F>(&self, id: impl Into<String>, options: TaskOptions, callback: F) -> bool
    where
        F: FnMut(&FrameInfo) -> bool + Send + 'static,
    {
        match self.upgrade() {
            Some(scheduler) => {
                scheduler.register_task(id, options, callback);
                true
            }
            None => false,
        }
    }

    pub fn unregister_task(&self, id: &str) -> bool {
        self.upgrade()
            .is_some_and(|scheduler| scheduler.unregister_task(id))
    }

    pub fn contains_task(&self, id: &str) -> bool {
        self.upgrade()
            .is_some_and(|scheduler| scheduler.contains_task(id))
    }

    pub fn is_alive(&self) -> bool {
        self.shared.strong_count() > 0
    }
}
