//! Reveal sequencer
//!
//! Reveals the three podium cards in a fixed order once the document is
//! loaded, then authorizes the gold card expansion:
//!
//! ```text
//! document complete -> yield -> settle -> silver -> bronze -> gold
//!                   -> values -> expansion authorized (-> backdrop)
//! ```
//!
//! Every delay belongs to the run's [`TimerSet`]. Unmounting cancels the set
//! and bumps the generation counter, so a run that wakes up afterwards finds
//! itself stale and stops without touching any state.

use crate::config::RevealTimings;
use crate::document::DocumentReadiness;
use crate::stage::RevealStage;
use podium_animation::scheduler::panic_message;
use podium_animation::{Cancelled, TimerSet};
use slotmap::{new_key_type, SlotMap};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

/// What the presentation layer sees of the reveal
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RevealSnapshot {
    pub stage: RevealStage,
    /// Warp background behind the podium
    pub backdrop_enabled: bool,
}

impl RevealSnapshot {
    pub fn show_silver(&self) -> bool {
        self.stage >= RevealStage::SilverVisible
    }

    pub fn show_bronze(&self) -> bool {
        self.stage >= RevealStage::BronzeVisible
    }

    pub fn show_gold(&self) -> bool {
        self.stage >= RevealStage::GoldVisible
    }

    /// Silver and bronze move up and show their value boxes
    pub fn values_revealed(&self) -> bool {
        self.stage >= RevealStage::ValuesRevealed
    }

    pub fn gold_can_expand(&self) -> bool {
        self.stage >= RevealStage::ExpansionAuthorized
    }
}

/// How a run ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every stage was applied
    Completed,
    /// The sequence was unmounted (or superseded) mid-run
    Cancelled,
    /// Another run was already in flight; nothing was started
    AlreadyRunning,
    /// A stage side effect panicked; the sequence stopped advancing
    Failed,
}

/// Why a run stopped early
#[derive(Debug)]
pub(crate) enum Halt {
    Cancelled,
    Failed,
}

impl From<Cancelled> for Halt {
    fn from(_: Cancelled) -> Self {
        Halt::Cancelled
    }
}

impl Halt {
    pub(crate) fn outcome(self) -> RunOutcome {
        match self {
            Halt::Cancelled => RunOutcome::Cancelled,
            Halt::Failed => RunOutcome::Failed,
        }
    }
}

new_key_type! {
    /// Handle to a stage listener
    pub struct StageListenerId;
}

type StageListener = Arc<dyn Fn(RevealStage) + Send + Sync>;

/// Identity of one run: stale once the generation moves on
#[derive(Clone)]
struct Run {
    generation: u64,
    timers: TimerSet,
}

struct SequencerState {
    generation: u64,
    running: bool,
    timers: TimerSet,
}

struct SequencerShared {
    timings: RevealTimings,
    document: DocumentReadiness,
    state: Mutex<SequencerState>,
    snapshot: watch::Sender<RevealSnapshot>,
    listeners: Mutex<SlotMap<StageListenerId, StageListener>>,
}

impl SequencerShared {
    fn lock(&self) -> MutexGuard<'_, SequencerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn enable_backdrop(&self, generation: u64) {
        let state = self.lock();
        if state.generation != generation {
            return;
        }
        self.snapshot
            .send_modify(|snapshot| snapshot.backdrop_enabled = true);
        tracing::debug!("RevealSequencer: backdrop enabled");
    }
}

/// Releases a run's claim on the sequencer, also when its future is dropped
///
/// An abandoned run (future dropped before it finished) takes its pending
/// timers with it.
struct RunGuard<'a> {
    shared: &'a SequencerShared,
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
            let cancelled = self.run.timers.cancel_all();
            tracing::debug!(
                "RevealSequencer: run {} abandoned ({} timers cancelled)",
                self.run.generation,
                cancelled
            );
        }
    }
}

/// Cancellable, ordered reveal of the podium cards
///
/// Cloning yields another handle to the same sequencer.
#[derive(Clone)]
pub struct RevealSequencer {
    shared: Arc<SequencerShared>,
}

impl RevealSequencer {
    pub fn new(timings: RevealTimings, document: DocumentReadiness) -> Self {
        let (snapshot, _) = watch::channel(RevealSnapshot::default());
        Self {
            shared: Arc::new(SequencerShared {
                timings,
                document,
                state: Mutex::new(SequencerState {
                    generation: 0,
                    running: false,
                    timers: TimerSet::new(),
                }),
                snapshot,
                listeners: Mutex::new(SlotMap::with_key()),
            }),
        }
    }

    pub fn timings(&self) -> &RevealTimings {
        &self.shared.timings
    }

    pub fn stage(&self) -> RevealStage {
        self.shared.snapshot.borrow().stage
    }

    pub fn snapshot(&self) -> RevealSnapshot {
        *self.shared.snapshot.borrow()
    }

    /// Observe snapshot changes
    pub fn subscribe(&self) -> watch::Receiver<RevealSnapshot> {
        self.shared.snapshot.subscribe()
    }

    /// Call `listener` with every stage the reveal advances to
    pub fn on_stage<F>(&self, listener: F) -> StageListenerId
    where
        F: Fn(RevealStage) + Send + Sync + 'static,
    {
        self.shared
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(Arc::new(listener))
    }

    pub fn remove_listener(&self, id: StageListenerId) -> bool {
        self.shared
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
            .is_some()
    }

    pub fn is_running(&self) -> bool {
        self.shared.lock().running
    }

    /// Timers still outstanding in the current run
    pub fn pending_timers(&self) -> usize {
        self.shared.lock().timers.pending()
    }

    /// Start a run on the current tokio runtime
    ///
    /// Returns `false` if a run is already in flight or no runtime exists.
    pub fn start(&self) -> bool {
        if tokio::runtime::Handle::try_current().is_err() {
            tracing::warn!("RevealSequencer: no tokio runtime, reveal not started");
            return false;
        }
        let Some(run) = self.begin() else {
            return false;
        };
        let sequencer = self.clone();
        tokio::spawn(async move { sequencer.execute(run).await });
        true
    }

    /// Mount and run the whole reveal, resolving when it ends
    pub async fn run(&self) -> RunOutcome {
        match self.begin() {
            Some(run) => self.execute(run).await,
            None => RunOutcome::AlreadyRunning,
        }
    }

    /// Cancel every pending timer and abandon the current run
    pub fn unmount(&self) {
        let timers = {
            let mut state = self.shared.lock();
            state.generation += 1;
            state.running = false;
            state.timers.clone()
        };
        let cancelled = timers.cancel_all();
        tracing::debug!(
            "RevealSequencer: unmounted ({} timers cancelled)",
            cancelled
        );
    }

    fn begin(&self) -> Option<Run> {
        let (run, previous) = {
            let mut state = self.shared.lock();
            if state.running {
                tracing::debug!("RevealSequencer: run already in flight, ignoring start");
                return None;
            }
            state.generation += 1;
            state.running = true;
            let previous = std::mem::replace(&mut state.timers, TimerSet::new());
            // Full reset on (re)mount
            self.shared.snapshot.send_replace(RevealSnapshot::default());
            (
                Run {
                    generation: state.generation,
                    timers: state.timers.clone(),
                },
                previous,
            )
        };
        previous.cancel_all();
        tracing::info!("RevealSequencer: mounted (run {})", run.generation);
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

        match outcome {
            RunOutcome::Completed => tracing::info!("RevealSequencer: expansion authorized"),
            RunOutcome::Failed => tracing::error!("RevealSequencer: reveal stopped after a failure"),
            _ => tracing::debug!("RevealSequencer: run {} ended: {:?}", run.generation, outcome),
        }
        outcome
    }

    async fn steps(&self, run: &Run) -> Result<(), Halt> {
        let timings = &self.shared.timings;

        if !self.shared.document.is_complete() {
            tracing::debug!("RevealSequencer: waiting for document load");
        }
        run.timers.guard(self.shared.document.wait_complete()).await?;
        tokio::task::yield_now().await;
        run.timers.delay(timings.settle()).await?;
        self.ensure_current(run)?;

        let steps = [
            (timings.silver(), RevealStage::SilverVisible),
            (timings.bronze(), RevealStage::BronzeVisible),
            (timings.gold(), RevealStage::GoldVisible),
            (timings.values(), RevealStage::ValuesRevealed),
            (timings.authorize(), RevealStage::ExpansionAuthorized),
        ];
        for (delay, stage) in steps {
            run.timers.delay(delay).await?;
            self.advance(run, stage)?;
        }

        let shared = Arc::clone(&self.shared);
        let generation = run.generation;
        run.timers.schedule(timings.backdrop(), move || {
            shared.enable_backdrop(generation);
        });
        Ok(())
    }

    fn ensure_current(&self, run: &Run) -> Result<(), Halt> {
        if self.shared.lock().generation == run.generation {
            Ok(())
        } else {
            Err(Halt::Cancelled)
        }
    }

    /// Apply `stage` if the run is still current, then notify listeners
    fn advance(&self, run: &Run, stage: RevealStage) -> Result<(), Halt> {
        {
            let state = self.shared.lock();
            if state.generation != run.generation {
                return Err(Halt::Cancelled);
            }
            self.shared.snapshot.send_if_modified(|snapshot| {
                if stage > snapshot.stage {
                    snapshot.stage = stage;
                    true
                } else {
                    false
                }
            });
        }
        tracing::debug!("RevealSequencer: {}", stage);

        let listeners: Vec<StageListener> = self
            .shared
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        for listener in listeners {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| listener(stage))) {
                tracing::error!(
                    "RevealSequencer: stage listener panicked at {}: {}",
                    stage,
                    panic_message(payload.as_ref())
                );
                return Err(Halt::Failed);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn test_snapshot_flags() {
        let snapshot = RevealSnapshot {
            stage: RevealStage::BronzeVisible,
            backdrop_enabled: false,
        };
        assert!(snapshot.show_silver());
        assert!(snapshot.show_bronze());
        assert!(!snapshot.show_gold());
        assert!(!snapshot.gold_can_expand());
    }

    #[tokio::test(start_paused = true)]
    async fn test_backdrop_follows_authorization() {
        let sequencer = RevealSequencer::new(RevealTimings::default(), DocumentReadiness::complete());
        assert_eq!(sequencer.run().await, RunOutcome::Completed);
        assert!(sequencer.snapshot().gold_can_expand());
        assert!(!sequencer.snapshot().backdrop_enabled);
        assert_eq!(sequencer.pending_timers(), 1);

        tokio::time::sleep(ms(1_001)).await;
        assert!(sequencer.snapshot().backdrop_enabled);
        assert_eq!(sequencer.pending_timers(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_document() {
        let document = DocumentReadiness::default();
        let sequencer = RevealSequencer::new(RevealTimings::default(), document.clone());
        assert!(sequencer.start());

        tokio::time::sleep(ms(5_000)).await;
        assert_eq!(sequencer.stage(), RevealStage::Idle);

        document.mark_complete();
        tokio::time::sleep(ms(501)).await;
        assert_eq!(sequencer.stage(), RevealStage::SilverVisible);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unmount_while_waiting_for_document() {
        let sequencer = RevealSequencer::new(RevealTimings::default(), DocumentReadiness::default());
        let run = {
            let sequencer = sequencer.clone();
            tokio::spawn(async move { sequencer.run().await })
        };
        tokio::task::yield_now().await;
        sequencer.unmount();
        assert_eq!(run.await.unwrap(), RunOutcome::Cancelled);
        assert!(!sequencer.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_listener_stops_sequence() {
        let sequencer = RevealSequencer::new(RevealTimings::default(), DocumentReadiness::complete());
        sequencer.on_stage(|stage| {
            if stage == RevealStage::BronzeVisible {
                panic!("card renderer failed");
            }
        });

        assert_eq!(sequencer.run().await, RunOutcome::Failed);
        assert_eq!(sequencer.stage(), RevealStage::BronzeVisible);
        assert!(!sequencer.is_running());

        tokio::time::sleep(ms(5_000)).await;
        assert_eq!(sequencer.stage(), RevealStage::BronzeVisible);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remount_resets_stages() {
        let sequencer = RevealSequencer::new(RevealTimings::default(), DocumentReadiness::complete());
        assert_eq!(sequencer.run().await, RunOutcome::Completed);
        sequencer.unmount();

        assert!(sequencer.start());
        assert_eq!(sequencer.stage(), RevealStage::Idle);
        assert!(!sequencer.snapshot().backdrop_enabled);
    }
}
