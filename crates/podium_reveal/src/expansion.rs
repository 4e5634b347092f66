//! Gold card expansion
//!
//! Runs once the reveal authorizes it:
//!
//! 1. wait for the hero image and fonts, then a short settle delay
//! 2. shift the card up, reveal the outline, slide in the detail panel
//! 3. wait for the detail panel's slide-in animation to end
//! 4. count the score up from zero
//! 5. fire three staggered particle bursts at the card
//!
//! Step 3 is the one event-driven synchronization point: only an
//! [`ExpansionSequence::animation_end`] carrying the configured animation
//! name, received while the panel is sliding in, lets the sequence continue.
//! Every delay goes through the run's [`TimerSet`].

use crate::config::{ExpansionTimings, ReadinessConfig};
use crate::events::{EventBus, PodiumEvent};
use crate::readiness::ResourceReadinessGate;
use crate::sequencer::{Halt, RunOutcome};
use crate::stage::ExpansionStage;
use podium_animation::{global_scheduler, tween, FrameScheduler, TaskOptions, TimerSet, Tween};
use smallvec::SmallVec;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

/// Prefix of each sequence's score count-up task id
pub const SCORE_TASK_PREFIX: &str = "podium-score-count";

static NEXT_SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// Data shown on the expanded gold card
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExpansionData {
    pub name: String,
    pub score: u64,
    pub rank: u32,
    pub avatar: String,
}

/// Screen-space rectangle in pixels
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn center(&self) -> Point {
        Point {
            x: self.x + self.width / 2.0,
            y: self.y + self.height / 2.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// Presentation side of the expansion
///
/// Replaces direct element lookups: the view reports the expanded card's
/// geometry and receives stage changes and the score text.
pub trait ExpansionView: Send + Sync {
    fn set_stage(&self, stage: ExpansionStage);
    fn set_score_text(&self, text: &str);
    /// Bounds of the expanded card, if it is currently laid out
    fn card_bounds(&self) -> Option<Rect>;
    /// Viewport size in pixels
    fn viewport(&self) -> (f64, f64);
}

/// One particle burst; `origin` is normalised to the viewport
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Burst {
    pub particles: u32,
    pub spread: f64,
    pub origin: Point,
}

pub trait BurstEmitter: Send + Sync {
    fn fire(&self, burst: &Burst);
}

/// The three celebratory bursts around `anchor`, in firing order
pub fn burst_plan(anchor: Point) -> SmallVec<[Burst; 3]> {
    let mut plan = SmallVec::new();
    plan.push(Burst {
        particles: 100,
        spread: 70.0,
        origin: anchor,
    });
    plan.push(Burst {
        particles: 50,
        spread: 60.0,
        origin: Point {
            x: anchor.x - 0.1,
            y: anchor.y,
        },
    });
    plan.push(Burst {
        particles: 50,
        spread: 60.0,
        origin: Point {
            x: anchor.x + 0.1,
            y: anchor.y,
        },
    });
    plan
}

/// Format an integer with `,` thousands separators
pub fn format_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

// ============================================================================
// Sequence
// ============================================================================

struct ExpansionState {
    stage: ExpansionStage,
    generation: u64,
    running: bool,
    timers: TimerSet,
    detail_done: Arc<Notify>,
    announced: bool,
}

struct ExpansionShared {
    data: ExpansionData,
    score_task: String,
    timings: ExpansionTimings,
    scheduler: FrameScheduler,
    gate: ResourceReadinessGate,
    view: Arc<dyn ExpansionView>,
    emitter: Arc<dyn BurstEmitter>,
    events: EventBus,
    state: Mutex<ExpansionState>,
}

impl ExpansionShared {
    fn lock(&self) -> MutexGuard<'_, ExpansionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Clone)]
struct Run {
    generation: u64,
    timers: TimerSet,
    detail_done: Arc<Notify>,
}

/// Releases a run's claim on the sequence, also when its future is dropped
///
/// An abandoned run stops its timers and its score count.
struct RunGuard<'a> {
    shared: &'a ExpansionShared,
    run: &'a Run,
    finished: bool,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        let current = {
            let mut state = self.shared.lock();
            let current = state.generation == self.run.generation;
            if current {
                state.running = false;
            }
            current
        };
        if current && !self.finished {
            self.run.timers.cancel_all();
            self.shared.scheduler.unregister_task(&self.shared.score_task);
            tracing::debug!("ExpansionSequence: run {} abandoned", self.run.generation);
        }
    }
}

/// Builder for [`ExpansionSequence`]
pub struct ExpansionBuilder {
    data: ExpansionData,
    view: Arc<dyn ExpansionView>,
    emitter: Arc<dyn BurstEmitter>,
    timings: ExpansionTimings,
    scheduler: Option<FrameScheduler>,
    gate: Option<ResourceReadinessGate>,
    events: Option<EventBus>,
}

impl ExpansionBuilder {
    pub fn timings(mut self, timings: ExpansionTimings) -> Self {
        self.timings = timings;
        self
    }

    /// Scheduler driving the score count (defaults to the global one)
    pub fn scheduler(mut self, scheduler: FrameScheduler) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn gate(mut self, gate: ResourceReadinessGate) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn build(self) -> ExpansionSequence {
        ExpansionSequence {
            shared: Arc::new(ExpansionShared {
                data: self.data,
                score_task: format!(
                    "{}-{}",
                    SCORE_TASK_PREFIX,
                    NEXT_SEQUENCE.fetch_add(1, Ordering::Relaxed)
                ),
                timings: self.timings,
                scheduler: self
                    .scheduler
                    .unwrap_or_else(|| global_scheduler().clone()),
                gate: self
                    .gate
                    .unwrap_or_else(|| ResourceReadinessGate::from_config(&ReadinessConfig::default())),
                view: self.view,
                emitter: self.emitter,
                events: self.events.unwrap_or_default(),
                state: Mutex::new(ExpansionState {
                    stage: ExpansionStage::Collapsed,
                    generation: 0,
                    running: false,
                    timers: TimerSet::new(),
                    detail_done: Arc::new(Notify::new()),
                    announced: false,
                }),
            }),
        }
    }
}

/// The gold card's expansion finale
///
/// Cloning yields another handle to the same sequence.
#[derive(Clone)]
pub struct ExpansionSequence {
    shared: Arc<ExpansionShared>,
}

impl ExpansionSequence {
    pub fn builder(
        data: ExpansionData,
        view: Arc<dyn ExpansionView>,
        emitter: Arc<dyn BurstEmitter>,
    ) -> ExpansionBuilder {
        ExpansionBuilder {
            data,
            view,
            emitter,
            timings: ExpansionTimings::default(),
            scheduler: None,
            gate: None,
            events: None,
        }
    }

    pub fn data(&self) -> &ExpansionData {
        &self.shared.data
    }

    /// Scheduler task id of this sequence's score count-up
    pub fn score_task_id(&self) -> &str {
        &self.shared.score_task
    }

    pub fn stage(&self) -> ExpansionStage {
        self.shared.lock().stage
    }

    pub fn is_running(&self) -> bool {
        self.shared.lock().running
    }

    pub fn pending_timers(&self) -> usize {
        self.shared.lock().timers.pending()
    }

    /// Report that a CSS-style animation ended on the detail panel
    ///
    /// Only the configured animation, while the panel is sliding in, is
    /// accepted; anything else is ignored. Returns whether it was accepted.
    pub fn animation_end(&self, name: &str) -> bool {
        let state = self.shared.lock();
        if state.stage != ExpansionStage::DetailSliding || name != self.shared.timings.detail_animation {
            tracing::trace!(
                "ExpansionSequence: ignoring animation end '{}' in {}",
                name,
                state.stage
            );
            return false;
        }
        state.detail_done.notify_one();
        tracing::debug!("ExpansionSequence: detail panel in place");
        true
    }

    /// Start the expansion on the current tokio runtime
    pub fn start(&self) -> bool {
        if tokio::runtime::Handle::try_current().is_err() {
            tracing::warn!("ExpansionSequence: no tokio runtime, expansion not started");
            return false;
        }
        let Some(run) = self.begin() else {
            return false;
        };
        let sequence = self.clone();
        tokio::spawn(async move { sequence.execute(run).await });
        true
    }

    /// Run the whole expansion, resolving when it settles or is cancelled
    pub async fn run(&self) -> RunOutcome {
        match self.begin() {
            Some(run) => self.execute(run).await,
            None => RunOutcome::AlreadyRunning,
        }
    }

    /// Cancel pending timers and the score count; announce the collapse
    pub fn unmount(&self) {
        let (timers, announced) = {
            let mut state = self.shared.lock();
            state.generation += 1;
            state.running = false;
            state.stage = ExpansionStage::Collapsed;
            let announced = std::mem::replace(&mut state.announced, false);
            (state.timers.clone(), announced)
        };
        timers.cancel_all();
        self.shared.scheduler.unregister_task(&self.shared.score_task);
        if announced {
            self.shared.events.emit(PodiumEvent::GoldCardCollapsed {
                at: self.shared.events.now(),
            });
        }
        tracing::debug!("ExpansionSequence: unmounted");
    }

    fn begin(&self) -> Option<Run> {
        let (run, previous) = {
            let mut state = self.shared.lock();
            if state.running {
                tracing::debug!("ExpansionSequence: already expanding, ignoring start");
                return None;
            }
            state.generation += 1;
            state.running = true;
            state.stage = ExpansionStage::Collapsed;
            state.detail_done = Arc::new(Notify::new());
            let previous = std::mem::replace(&mut state.timers, TimerSet::new());
            (
                Run {
                    generation: state.generation,
                    timers: state.timers.clone(),
                    detail_done: Arc::clone(&state.detail_done),
                },
                previous,
            )
        };
        previous.cancel_all();
        Some(run)
    }

    async fn execute(&self, run: Run) -> RunOutcome {
        let mut guard = RunGuard {
            shared: &self.shared,
            run: &run,
            finished: false,
        };
        let outcome = match self.steps(&run).await {
            Ok(()) => RunOutcome::Completed,
            Err(halt) => halt.outcome(),
        };
        guard.finished = true;
        drop(guard);
        tracing::debug!("ExpansionSequence: run {} ended: {:?}", run.generation, outcome);
        outcome
    }

    async fn steps(&self, run: &Run) -> Result<(), Halt> {
        let shared = &self.shared;
        let timings = &shared.timings;

        tracing::debug!("ExpansionSequence: checking resources");
        run.timers.guard(shared.gate.check_ready(&shared.data.avatar)).await?;
        run.timers.delay(timings.dom_settle()).await?;
        self.advance(run, ExpansionStage::PositionShifted)?;

        run.timers.delay(timings.outline()).await?;
        self.advance(run, ExpansionStage::OutlineRevealing)?;
        self.advance(run, ExpansionStage::DetailSliding)?;

        run.timers.guard(run.detail_done.notified()).await?;
        run.timers.delay(timings.count_delay()).await?;
        self.advance(run, ExpansionStage::ScoreCounting)?;
        self.announce(run);
        self.count_score(run).await?;

        self.fire_bursts(run).await
    }

    async fn count_score(&self, run: &Run) -> Result<(), Halt> {
        let shared = &self.shared;
        let timings = &shared.timings;
        let score = shared.data.score;
        let view = Arc::clone(&shared.view);
        let counter = Tween::new(0.0, score as f64, timings.count_duration())
            .with_easing(timings.count_easing);

        let handle = tween::play(
            &shared.scheduler,
            shared.score_task.clone(),
            TaskOptions::new().priority(timings.count_priority),
            counter,
            move |value| view.set_score_text(&format_thousands(value.max(0.0).floor() as u64)),
        );

        match run.timers.guard(handle.finished()).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!("ExpansionSequence: score count was interrupted, showing final score");
                shared.view.set_score_text(&format_thousands(score));
            }
            Err(cancelled) => {
                shared.scheduler.unregister_task(&shared.score_task);
                return Err(cancelled.into());
            }
        }
        self.ensure_current(run)
    }

    async fn fire_bursts(&self, run: &Run) -> Result<(), Halt> {
        let shared = &self.shared;
        let (width, height) = shared.view.viewport();
        let anchor = match shared.view.card_bounds() {
            Some(bounds) if width > 0.0 && height > 0.0 => {
                let center = bounds.center();
                Point {
                    x: center.x / width,
                    y: center.y / height,
                }
            }
            _ => {
                tracing::debug!("ExpansionSequence: no card bounds, skipping bursts");
                return self.advance(run, ExpansionStage::Settled);
            }
        };

        for (i, burst) in burst_plan(anchor).iter().enumerate() {
            if i > 0 {
                run.timers.delay(shared.timings.burst_stagger()).await?;
            }
            self.ensure_current(run)?;
            shared.emitter.fire(burst);
            if i == 0 {
                self.advance(run, ExpansionStage::BurstFired)?;
            }
        }
        self.advance(run, ExpansionStage::Settled)
    }

    fn announce(&self, run: &Run) {
        {
            let mut state = self.shared.lock();
            if state.generation != run.generation || state.announced {
                return;
            }
            state.announced = true;
        }
        self.shared.events.emit(PodiumEvent::GoldCardExpanded {
            at: self.shared.events.now(),
        });
    }

    fn ensure_current(&self, run: &Run) -> Result<(), Halt> {
        if self.shared.lock().generation == run.generation {
            Ok(())
        } else {
            Err(Halt::Cancelled)
        }
    }

    fn advance(&self, run: &Run, stage: ExpansionStage) -> Result<(), Halt> {
        {
            let mut state = self.shared.lock();
            if state.generation != run.generation {
                return Err(Halt::Cancelled);
            }
            if stage <= state.stage {
                return Ok(());
            }
            state.stage = stage;
        }
        tracing::debug!("ExpansionSequence: {}", stage);
        self.shared.view.set_stage(stage);
        Ok(())
    }
}
