//! Podium Reveal
//!
//! Choreography for an animated leaderboard podium.
//!
//! # Features
//!
//! - **RevealSequencer**: cancellable, ordered reveal of the silver, bronze, and gold cards
//! - **ResourceReadinessGate**: image and font readiness with a fail-open timeout
//! - **ExpansionSequence**: gold card expansion, score count-up, and particle bursts
//! - **EventBus**: typed gold card events for sibling components
//! - **Podium**: coordinator mounting the whole choreography
//! - **Ranking data**: monthly ranking files and the podium projection
//!
//! Frame scheduling, FPS measurement, and timers come from `podium_animation`.

pub mod config;
pub mod document;
pub mod error;
pub mod events;
pub mod expansion;
pub mod podium;
pub mod ranking;
pub mod readiness;
pub mod sequencer;
pub mod stage;

pub use config::{DataConfig, ExpansionTimings, PodiumConfig, ReadinessConfig, RevealTimings};
pub use document::{DocumentReadiness, ReadyState};
pub use error::{PodiumError, ProbeError, Result};
pub use events::{EventBus, EventSubscription, ListenerId, PodiumEvent};
pub use expansion::{
    burst_plan, format_thousands, Burst, BurstEmitter, ExpansionBuilder, ExpansionData,
    ExpansionSequence, ExpansionView, Point, Rect, SCORE_TASK_PREFIX,
};
pub use podium::{Podium, PodiumOutcome};
pub use ranking::{
    load_ranking, load_ranking_file, load_ranking_or_empty, ranking_path, total_coins,
    total_count, CardGiftValue, PodiumData, RankingEntry,
};
pub use readiness::{
    FileFontProbe, FileImageProbe, FontProbe, FontsReady, ImageProbe, ProbeFuture,
    ResourceReadinessGate,
};
pub use sequencer::{RevealSequencer, RevealSnapshot, RunOutcome, StageListenerId};
pub use stage::{ExpansionStage, RevealStage};
