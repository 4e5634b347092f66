//! Terminal rendering of the expansion

use podium_reveal::{Burst, BurstEmitter, ExpansionStage, ExpansionView, Rect};
use std::sync::{Mutex, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Logical viewport the card is laid out in
const VIEWPORT: (f64, f64) = (1280.0, 720.0);

/// Expanded gold card, centred horizontally in the upper half
const CARD: Rect = Rect {
    x: 490.0,
    y: 160.0,
    width: 300.0,
    height: 400.0,
};

/// Logs the expansion and forwards stage changes to the driver
pub struct ConsoleView {
    stages: mpsc::UnboundedSender<ExpansionStage>,
    last_text: Mutex<String>,
}

impl ConsoleView {
    pub fn new(stages: mpsc::UnboundedSender<ExpansionStage>) -> Self {
        Self {
            stages,
            last_text: Mutex::new(String::new()),
        }
    }

    /// Last score text shown on the card
    pub fn score_text(&self) -> String {
        self.last_text
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ExpansionView for ConsoleView {
    fn set_stage(&self, stage: ExpansionStage) {
        info!("Gold card: {}", stage);
        // Receiver gone means the driver already shut down
        let _ = self.stages.send(stage);
    }

    fn set_score_text(&self, text: &str) {
        let mut last = self.last_text.lock().unwrap_or_else(PoisonError::into_inner);
        if *last != text {
            debug!("Score: {}", text);
            last.clear();
            last.push_str(text);
        }
    }

    fn card_bounds(&self) -> Option<Rect> {
        Some(CARD)
    }

    fn viewport(&self) -> (f64, f64) {
        VIEWPORT
    }
}

pub struct ConsoleEmitter;

impl BurstEmitter for ConsoleEmitter {
    fn fire(&self, burst: &Burst) {
        info!(
            "Burst: {} particles, spread {} at ({:.2}, {:.2})",
            burst.particles, burst.spread, burst.origin.x, burst.origin.y
        );
    }
}
