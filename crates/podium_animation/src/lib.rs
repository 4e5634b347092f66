//! Podium Animation Runtime
//!
//! The shared frame machinery under the podium reveal.
//!
//! # Features
//!
//! - **FrameScheduler**: one cooperative frame loop multiplexing named, prioritised tasks
//! - **FpsSource**: a single frame-rate measurement shared by every display
//! - **TimerSet**: cancellable delays and deferred callbacks for async sequences
//! - **Tweens**: eased scalar interpolation played as scheduler tasks
//! - **PerformanceMonitor**: FPS/memory health checks and quality hints
//!
//! Everything runs on a tokio runtime; a paused runtime (`test-util`) makes
//! all timing exact.

pub mod clock;
pub mod easing;
pub mod fps;
pub mod history;
pub mod monitor;
pub mod scheduler;
pub mod timers;
pub mod tween;

pub use clock::{FrameClock, ManualClock, MonotonicClock, Timestamp};
pub use easing::Easing;
pub use fps::{
    clamp_target_fps, global_fps_source, set_global_fps_source, FpsConfig, FpsSource,
    FpsSubscription, MAX_TARGET_FPS, MIN_TARGET_FPS,
};
pub use history::SampleRing;
pub use monitor::{
    MonitorConfig, PerformanceIssue, PerformanceMonitor, PerformanceStats, QualityHints,
    QualityLevel,
};
pub use scheduler::{
    global_scheduler, set_global_scheduler, try_global_scheduler, FrameInfo, FrameScheduler,
    SchedulerConfig, SchedulerHandle, SchedulerState, SchedulerStats, TaskCallback, TaskOptions,
};
pub use timers::{CancelToken, Cancelled, TimerId, TimerSet};
pub use tween::{play, Tween, TweenHandle};
