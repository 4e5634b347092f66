//! Podium coordinator
//!
//! Ties the reveal to the expansion: the expansion starts as soon as the
//! reveal authorizes it, and unmounting the podium tears both down. Also
//! tracks the wiggle state the other cards follow through the event bus.

use crate::config::PodiumConfig;
use crate::document::DocumentReadiness;
use crate::events::{EventBus, EventSubscription, PodiumEvent};
use crate::expansion::{BurstEmitter, ExpansionSequence, ExpansionView};
use crate::ranking::PodiumData;
use crate::readiness::ResourceReadinessGate;
use crate::sequencer::{RevealSequencer, RevealSnapshot, RunOutcome};
use crate::stage::ExpansionStage;
use podium_animation::FrameScheduler;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;

/// How far a podium run got
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PodiumOutcome {
    pub reveal: RunOutcome,
    /// `None` when the reveal never authorized the expansion
    pub expansion: Option<RunOutcome>,
}

struct PodiumInner {
    data: PodiumData,
    reveal: RevealSequencer,
    expansion: ExpansionSequence,
    events: EventBus,
    wiggle: Arc<AtomicBool>,
    _wiggle_listener: EventSubscription,
    task: Mutex<Option<JoinHandle<PodiumOutcome>>>,
}

/// The mounted podium
///
/// Cloning yields another handle to the same podium.
#[derive(Clone)]
pub struct Podium {
    inner: Arc<PodiumInner>,
}

impl Podium {
    /// Assemble a podium from configuration
    pub fn from_config(
        config: &PodiumConfig,
        data: PodiumData,
        document: DocumentReadiness,
        scheduler: FrameScheduler,
        view: Arc<dyn ExpansionView>,
        emitter: Arc<dyn BurstEmitter>,
    ) -> Self {
        let gate = ResourceReadinessGate::from_config(&config.readiness);
        Self::with_gate(config, data, document, scheduler, gate, view, emitter)
    }

    /// Assemble a podium with an explicit readiness gate
    pub fn with_gate(
        config: &PodiumConfig,
        data: PodiumData,
        document: DocumentReadiness,
        scheduler: FrameScheduler,
        gate: ResourceReadinessGate,
        view: Arc<dyn ExpansionView>,
        emitter: Arc<dyn BurstEmitter>,
    ) -> Self {
        let events = EventBus::new();
        let reveal = RevealSequencer::new(config.reveal.clone(), document);
        let expansion = ExpansionSequence::builder(data.expansion.clone(), view, emitter)
            .timings(config.expansion.clone())
            .scheduler(scheduler)
            .gate(gate)
            .events(events.clone())
            .build();
        Self::new(data, reveal, expansion, events)
    }

    /// Combine existing sequences; `events` must be the expansion's bus
    pub fn new(
        data: PodiumData,
        reveal: RevealSequencer,
        expansion: ExpansionSequence,
        events: EventBus,
    ) -> Self {
        let wiggle = Arc::new(AtomicBool::new(false));
        let listener = {
            let wiggle = Arc::clone(&wiggle);
            events.subscribe(move |event| match event {
                PodiumEvent::GoldCardExpanded { .. } => {
                    tracing::debug!("Podium: gold card expanded, starting wiggle");
                    wiggle.store(true, Ordering::SeqCst);
                }
                PodiumEvent::GoldCardCollapsed { .. } => {
                    tracing::debug!("Podium: gold card collapsed, stopping wiggle");
                    wiggle.store(false, Ordering::SeqCst);
                }
            })
        };
        Self {
            inner: Arc::new(PodiumInner {
                data,
                reveal,
                expansion,
                events,
                wiggle,
                _wiggle_listener: listener,
                task: Mutex::new(None),
            }),
        }
    }

    pub fn data(&self) -> &PodiumData {
        &self.inner.data
    }

    pub fn reveal(&self) -> &RevealSequencer {
        &self.inner.reveal
    }

    pub fn expansion(&self) -> &ExpansionSequence {
        &self.inner.expansion
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    pub fn snapshot(&self) -> RevealSnapshot {
        self.inner.reveal.snapshot()
    }

    pub fn expansion_stage(&self) -> ExpansionStage {
        self.inner.expansion.stage()
    }

    /// Whether the side cards should wiggle
    pub fn wiggle(&self) -> bool {
        self.inner.wiggle.load(Ordering::SeqCst)
    }

    /// Forward an animation end from the detail panel
    pub fn animation_end(&self, name: &str) -> bool {
        self.inner.expansion.animation_end(name)
    }

    /// Reveal the podium, then expand the gold card
    pub async fn run(&self) -> PodiumOutcome {
        let reveal = self.inner.reveal.run().await;
        if reveal != RunOutcome::Completed {
            return PodiumOutcome {
                reveal,
                expansion: None,
            };
        }
        tracing::info!("Podium: starting gold card expansion");
        let expansion = self.inner.expansion.run().await;
        PodiumOutcome {
            reveal,
            expansion: Some(expansion),
        }
    }

    /// Run the podium in the background on the current tokio runtime
    ///
    /// Returns `false` if it is already mounted or no runtime exists.
    pub fn mount(&self) -> bool {
        if tokio::runtime::Handle::try_current().is_err() {
            tracing::warn!("Podium: no tokio runtime, not mounted");
            return false;
        }
        let mut task = self.inner.task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.as_ref().is_some_and(|task| !task.is_finished()) {
            tracing::debug!("Podium: already mounted");
            return false;
        }
        let podium = self.clone();
        *task = Some(tokio::spawn(async move { podium.run().await }));
        true
    }

    /// Wait for a background run started by [`mount`](Self::mount)
    ///
    /// Returns `None` if nothing was mounted or the run was torn down.
    pub async fn join(&self) -> Option<PodiumOutcome> {
        let task = self
            .inner
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()?;
        task.await.ok()
    }

    /// Tear down both sequences and any background run
    pub fn unmount(&self) {
        let task = self
            .inner
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.inner.reveal.unmount();
        self.inner.expansion.unmount();
        if let Some(task) = task {
            task.abort();
        }
        tracing::info!("Podium: unmounted");
    }

    /// Timers still outstanding across both sequences
    pub fn pending_timers(&self) -> usize {
        self.inner.reveal.pending_timers() + self.inner.expansion.pending_timers()
    }
}
