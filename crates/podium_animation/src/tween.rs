//! Scalar tweens
//!
//! A [`Tween`] interpolates one number over time. [`play`] runs it as a
//! frame-scheduler task, so tweens share the single frame loop with every
//! other effect and finish (or are evicted) like any other task.

use crate::clock::Timestamp;
use crate::easing::Easing;
use crate::scheduler::{FrameInfo, FrameScheduler, SchedulerHandle, TaskOptions};
use std::time::Duration;
use tokio::sync::oneshot;

/// Interpolation of a scalar from `from` to `to`
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Tween {
    pub from: f64,
    pub to: f64,
    pub duration: Duration,
    pub easing: Easing,
}

impl Tween {
    pub fn new(from: f64, to: f64, duration: Duration) -> Self {
        Self {
            from,
            to,
            duration,
            easing: Easing::Linear,
        }
    }

    pub fn with_easing(mut self, easing: Easing) -> Self {
        self.easing = easing;
        self
    }

    /// Linear progress in `[0, 1]` after `elapsed`
    pub fn progress(&self, elapsed: Duration) -> f64 {
        if self.duration.is_zero() {
            return 1.0;
        }
        (elapsed.as_secs_f64() / self.duration.as_secs_f64()).min(1.0)
    }

    /// Eased value after `elapsed`
    pub fn value_at(&self, elapsed: Duration) -> f64 {
        let t = self.easing.apply(self.progress(elapsed));
        self.from + (self.to - self.from) * t
    }

    pub fn is_complete(&self, elapsed: Duration) -> bool {
        elapsed >= self.duration
    }
}

/// Play `tween` as scheduler task `id`, calling `on_update` every frame
///
/// Time starts at the first frame the task runs. The last update always
/// carries the exact end value.
pub fn play<F>(
    scheduler: &FrameScheduler,
    id: impl Into<String>,
    options: TaskOptions,
    tween: Tween,
    mut on_update: F,
) -> TweenHandle
where
    F: FnMut(f64) + Send + 'static,
{
    let id = id.into();
    let (done_tx, done_rx) = oneshot::channel();
    let mut done = Some(done_tx);
    let mut started: Option<Timestamp> = None;

    scheduler.register_task(id.clone(), options, move |frame: &FrameInfo| {
        let start = *started.get_or_insert(frame.timestamp);
        let elapsed = frame.timestamp.saturating_sub(start);
        on_update(tween.value_at(elapsed));

        if tween.is_complete(elapsed) {
            if let Some(done) = done.take() {
                let _ = done.send(());
            }
            return false;
        }
        true
    });

    TweenHandle {
        id,
        scheduler: scheduler.handle(),
        done: done_rx,
    }
}

/// Handle to a playing tween
pub struct TweenHandle {
    id: String,
    scheduler: SchedulerHandle,
    done: oneshot::Receiver<()>,
}

impl TweenHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether the tween's task is still registered
    pub fn is_active(&self) -> bool {
        self.scheduler.contains_task(&self.id)
    }

    /// Stop the tween without completing it
    pub fn cancel(&self) -> bool {
        self.scheduler.unregister_task(&self.id)
    }

    /// Wait for the tween to end
    ///
    /// Returns `true` when it reached its end value, `false` when its task was
    /// removed first (cancelled, evicted, or replaced).
    pub async fn finished(self) -> bool {
        self.done.await.is_ok()
    }
}
