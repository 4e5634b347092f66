//! Document readiness
//!
//! Stands in for the page load state. The host moves it forward; sequences
//! wait on it before revealing anything.

use std::sync::Arc;
use tokio::sync::watch;

/// Load state of the hosting document
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReadyState {
    #[default]
    Loading,
    Interactive,
    Complete,
}

/// Shared, observable document load state
///
/// Cloning yields another handle to the same state.
#[derive(Clone, Debug)]
pub struct DocumentReadiness {
    state: Arc<watch::Sender<ReadyState>>,
}

impl DocumentReadiness {
    pub fn new(initial: ReadyState) -> Self {
        let (state, _) = watch::channel(initial);
        Self {
            state: Arc::new(state),
        }
    }

    /// A document that has already finished loading
    pub fn complete() -> Self {
        Self::new(ReadyState::Complete)
    }

    pub fn state(&self) -> ReadyState {
        *self.state.borrow()
    }

    pub fn is_complete(&self) -> bool {
        self.state() == ReadyState::Complete
    }

    /// Advance the load state; going backwards is ignored
    pub fn set(&self, next: ReadyState) {
        self.state.send_if_modified(|state| {
            if next > *state {
                tracing::debug!("Document: {:?} -> {:?}", *state, next);
                *state = next;
                true
            } else {
                false
            }
        });
    }

    /// Fire the load event
    pub fn mark_complete(&self) {
        self.set(ReadyState::Complete);
    }

    /// Resolve once the document is complete (immediately if it already is)
    pub async fn wait_complete(&self) {
        let mut receiver = self.state.subscribe();
        // The sender lives in `self`, so the channel cannot close while waiting
        let _ = receiver.wait_for(|state| *state == ReadyState::Complete).await;
    }
}

impl Default for DocumentReadiness {
    fn default() -> Self {
        Self::new(ReadyState::Loading)
    }
}
