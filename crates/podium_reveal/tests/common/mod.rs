//! Shared test doubles for the presentation layer

#![allow(dead_code)]

use podium_reveal::{
    Burst, BurstEmitter, ExpansionStage, ExpansionView, FontsReady, ImageProbe, ProbeFuture, Rect,
    ResourceReadinessGate,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

pub fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

/// View that records everything it is told
pub struct RecordingView {
    pub stages: Mutex<Vec<ExpansionStage>>,
    pub texts: Mutex<Vec<String>>,
    pub bounds: Option<Rect>,
    pub viewport: (f64, f64),
}

impl RecordingView {
    pub fn with_card() -> Arc<Self> {
        Arc::new(Self {
            stages: Mutex::new(Vec::new()),
            texts: Mutex::new(Vec::new()),
            bounds: Some(Rect {
                x: 400.0,
                y: 300.0,
                width: 200.0,
                height: 200.0,
            }),
            viewport: (1000.0, 800.0),
        })
    }

    pub fn without_card() -> Arc<Self> {
        Arc::new(Self {
            stages: Mutex::new(Vec::new()),
            texts: Mutex::new(Vec::new()),
            bounds: None,
            viewport: (1000.0, 800.0),
        })
    }

    pub fn stages(&self) -> Vec<ExpansionStage> {
        self.stages.lock().unwrap().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().unwrap().clone()
    }
}

impl ExpansionView for RecordingView {
    fn set_stage(&self, stage: ExpansionStage) {
        self.stages.lock().unwrap().push(stage);
    }

    fn set_score_text(&self, text: &str) {
        self.texts.lock().unwrap().push(text.to_string());
    }

    fn card_bounds(&self) -> Option<Rect> {
        self.bounds
    }

    fn viewport(&self) -> (f64, f64) {
        self.viewport
    }
}

/// Emitter that records bursts with their firing time
pub struct RecordingEmitter {
    pub bursts: Mutex<Vec<(Burst, Instant)>>,
}

impl RecordingEmitter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            bursts: Mutex::new(Vec::new()),
        })
    }

    pub fn bursts(&self) -> Vec<(Burst, Instant)> {
        self.bursts.lock().unwrap().clone()
    }
}

impl BurstEmitter for RecordingEmitter {
    fn fire(&self, burst: &Burst) {
        self.bursts.lock().unwrap().push((*burst, Instant::now()));
    }
}

struct ReadyImage;

impl ImageProbe for ReadyImage {
    fn probe(&self, _url: &str) -> ProbeFuture {
        Box::pin(async { Ok(true) })
    }
}

/// Gate whose resources are ready immediately
pub fn instant_gate() -> ResourceReadinessGate {
    ResourceReadinessGate::new(Arc::new(ReadyImage), Arc::new(FontsReady::loaded()))
}
