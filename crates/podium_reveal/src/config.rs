//! Podium configuration
//!
//! One TOML file configures every component. All sections and fields are
//! optional; anything left out keeps its default.
//!
//! ```toml
//! [scheduler]
//! max_tasks = 20
//!
//! [fps]
//! target_fps = 60
//!
//! [reveal]
//! silver_ms = 300
//!
//! [readiness]
//! timeout_ms = 5000
//! ```

use crate::error::{PodiumError, Result};
use podium_animation::{Easing, FpsConfig, MonitorConfig, SchedulerConfig};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct PodiumConfig {
    pub scheduler: SchedulerConfig,
    pub fps: FpsConfig,
    pub reveal: RevealTimings,
    pub expansion: ExpansionTimings,
    pub readiness: ReadinessConfig,
    pub monitor: MonitorConfig,
    pub data: DataConfig,
}

impl PodiumConfig {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        Ok(toml::from_str(source)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|source| PodiumError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&source)?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }
}

// =============================================================================
// Reveal
// =============================================================================

/// Delays of the card reveal, in milliseconds
///
/// Each delay starts when the previous stage has been applied.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct RevealTimings {
    /// Layout settle time after the document completes
    pub settle_ms: u64,
    pub silver_ms: u64,
    pub bronze_ms: u64,
    pub gold_ms: u64,
    pub values_ms: u64,
    pub authorize_ms: u64,
    /// Delay between authorization and enabling the backdrop
    pub backdrop_ms: u64,
}

impl Default for RevealTimings {
    fn default() -> Self {
        Self {
            settle_ms: 200,
            silver_ms: 300,
            bronze_ms: 500,
            gold_ms: 500,
            values_ms: 500,
            authorize_ms: 200,
            backdrop_ms: 1_000,
        }
    }
}

impl RevealTimings {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn silver(&self) -> Duration {
        Duration::from_millis(self.silver_ms)
    }

    pub fn bronze(&self) -> Duration {
        Duration::from_millis(self.bronze_ms)
    }

    pub fn gold(&self) -> Duration {
        Duration::from_millis(self.gold_ms)
    }

    pub fn values(&self) -> Duration {
        Duration::from_millis(self.values_ms)
    }

    pub fn authorize(&self) -> Duration {
        Duration::from_millis(self.authorize_ms)
    }

    pub fn backdrop(&self) -> Duration {
        Duration::from_millis(self.backdrop_ms)
    }
}

// =============================================================================
// Expansion
// =============================================================================

/// Timing of the gold card expansion
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ExpansionTimings {
    /// Delay after readiness before the card shifts
    pub dom_settle_ms: u64,
    /// Delay between the shift and the detail panel
    pub outline_ms: u64,
    /// Animation whose end starts the score count
    pub detail_animation: String,
    /// Delay between the detail panel's animation end and the count
    pub count_delay_ms: u64,
    pub count_duration_ms: u64,
    pub count_easing: Easing,
    /// Spacing between the three bursts
    pub burst_stagger_ms: u64,
    /// Priority of the count-up scheduler task
    pub count_priority: i32,
}

impl Default for ExpansionTimings {
    fn default() -> Self {
        Self {
            dom_settle_ms: 100,
            outline_ms: 300,
            detail_animation: "slide-in-bottom".to_string(),
            count_delay_ms: 80,
            count_duration_ms: 2_000,
            count_easing: Easing::EaseOutCubic,
            burst_stagger_ms: 200,
            count_priority: 8,
        }
    }
}

impl ExpansionTimings {
    pub fn dom_settle(&self) -> Duration {
        Duration::from_millis(self.dom_settle_ms)
    }

    pub fn outline(&self) -> Duration {
        Duration::from_millis(self.outline_ms)
    }

    pub fn count_delay(&self) -> Duration {
        Duration::from_millis(self.count_delay_ms)
    }

    pub fn count_duration(&self) -> Duration {
        Duration::from_millis(self.count_duration_ms)
    }

    pub fn burst_stagger(&self) -> Duration {
        Duration::from_millis(self.burst_stagger_ms)
    }
}

// =============================================================================
// Readiness and data
// =============================================================================

/// Resource readiness gate settings
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ReadinessConfig {
    /// Upper bound on the whole check; `None` waits indefinitely
    pub timeout_ms: Option<u64>,
    /// Directory image and font paths are resolved against
    pub asset_root: PathBuf,
    /// Font files that must parse before the expansion starts
    pub fonts: Vec<PathBuf>,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            timeout_ms: Some(5_000),
            asset_root: PathBuf::from("public"),
            fonts: Vec::new(),
        }
    }
}

impl ReadinessConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// Where ranking data lives
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub data_dir: PathBuf,
    pub month: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("public/data"),
            month: "july".to_string(),
        }
    }
}
