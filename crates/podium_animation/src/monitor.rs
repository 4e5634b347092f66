//! Performance monitor
//!
//! Periodic health checks over FPS and memory samples, plus quality hints
//! that effects use to scale down under load.

use crate::history::SampleRing;
use serde::Deserialize;
use std::fmt;

/// Performance monitor configuration
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// FPS the page aims for
    pub target_fps: u32,
    /// Below this average, quality drops to [`QualityLevel::Low`]
    pub min_fps: u32,
    /// Samples kept for FPS and memory checks
    pub window: usize,
    /// Interval between two samples, in milliseconds
    pub report_interval_ms: u64,
    /// Consecutive samples under 80 % of target before low FPS is reported
    pub low_fps_streak: u32,
    pub instability_range: u32,
    pub memory_spike_mb: u32,
    pub leak_growth_mb: u32,
    pub high_memory_mb: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            target_fps: 60,
            min_fps: 30,
            window: 10,
            report_interval_ms: 3_000,
            low_fps_streak: 3,
            instability_range: 30,
            memory_spike_mb: 20,
            leak_growth_mb: 10,
            high_memory_mb: 200,
        }
    }
}

/// Minimum samples before instability or leaks are judged
const MIN_TREND_SAMPLES: usize = 5;

/// A problem found by [`PerformanceMonitor::sample`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PerformanceIssue {
    LowFps { fps: u32, target: u32 },
    Instability { min: u32, max: u32, average: u32 },
    MemorySpike { from: u32, to: u32 },
    MemoryLeak { growth: u32, samples: usize },
    HighMemory { memory: u32 },
    ExcessiveRendering { fps: u32, target: u32 },
}

impl fmt::Display for PerformanceIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LowFps { fps, target } => {
                write!(f, "low FPS: {} (target: {})", fps, target)
            }
            Self::Instability { min, max, average } => {
                write!(f, "FPS instability: {}-{} (avg: {})", min, max, average)
            }
            Self::MemorySpike { from, to } => {
                write!(f, "memory spike: +{}MB ({}MB -> {}MB)", to - from, from, to)
            }
            Self::MemoryLeak { growth, samples } => {
                write!(f, "potential memory leak: +{}MB over {} samples", growth, samples)
            }
            Self::HighMemory { memory } => write!(f, "high memory usage: {}MB", memory),
            Self::ExcessiveRendering { fps, target } => {
                write!(f, "excessive rendering: {} FPS (target: {})", fps, target)
            }
        }
    }
}

/// Aggregates over the monitor's sample window
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PerformanceStats {
    pub avg_fps: u32,
    /// Zero when memory was never reported
    pub avg_memory: u32,
    pub is_stable: bool,
}

/// Rolling performance checks
#[derive(Debug)]
pub struct PerformanceMonitor {
    config: MonitorConfig,
    fps: SampleRing,
    memory: SampleRing,
    last_memory: Option<u32>,
    consecutive_low: u32,
    leak_reported: bool,
}

impl PerformanceMonitor {
    pub fn new(config: MonitorConfig) -> Self {
        Self {
            fps: SampleRing::new(config.window),
            memory: SampleRing::new(config.window),
            last_memory: None,
            consecutive_low: 0,
            leak_reported: false,
            config,
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Record one sample and return the issues it reveals
    ///
    /// `memory_mb` is `None` on hosts that cannot measure memory; memory
    /// checks are then skipped.
    pub fn sample(&mut self, fps: u32, memory_mb: Option<u32>) -> Vec<PerformanceIssue> {
        let target = self.config.target_fps;
        let mut issues = Vec::new();

        self.fps.push(fps);
        if f64::from(fps) < f64::from(target) * 0.8 {
            self.consecutive_low += 1;
            if self.consecutive_low >= self.config.low_fps_streak {
                issues.push(PerformanceIssue::LowFps { fps, target });
            }
        } else {
            self.consecutive_low = 0;
        }

        if self.fps.len() >= MIN_TREND_SAMPLES {
            if let (Some(min), Some(max), Some(average)) =
                (self.fps.min(), self.fps.max(), self.fps.average())
            {
                if max - min > self.config.instability_range {
                    issues.push(PerformanceIssue::Instability { min, max, average });
                }
            }
        }

        if let Some(memory) = memory_mb {
            self.check_memory(memory, &mut issues);
        }

        if f64::from(fps) > f64::from(target) * 1.5 {
            issues.push(PerformanceIssue::ExcessiveRendering { fps, target });
        }
        issues
    }

    fn check_memory(&mut self, memory: u32, issues: &mut Vec<PerformanceIssue>) {
        self.memory.push(memory);

        if let Some(last) = self.last_memory.filter(|&last| last > 0) {
            if memory > last && memory - last > self.config.memory_spike_mb {
                issues.push(PerformanceIssue::MemorySpike { from: last, to: memory });
            }
        }

        if self.memory.len() >= MIN_TREND_SAMPLES {
            if self.memory.is_non_decreasing() {
                let growth = self.memory.growth();
                if !self.leak_reported && growth > self.config.leak_growth_mb {
                    issues.push(PerformanceIssue::MemoryLeak {
                        growth,
                        samples: self.memory.len(),
                    });
                    self.leak_reported = true;
                }
            } else {
                self.leak_reported = false;
            }
        }

        if memory > self.config.high_memory_mb {
            issues.push(PerformanceIssue::HighMemory { memory });
        }
        self.last_memory = Some(memory);
    }

    /// Sample, then log a report of the result
    pub fn report(&mut self, fps: u32, memory_mb: Option<u32>) -> Vec<PerformanceIssue> {
        let issues = self.sample(fps, memory_mb);
        let stats = self.stats();
        match memory_mb {
            Some(memory) => tracing::info!(
                "Performance: {} fps (target {}, avg {}) | memory {}MB",
                fps,
                self.config.target_fps,
                stats.avg_fps,
                memory
            ),
            None => tracing::info!(
                "Performance: {} fps (target {}, avg {})",
                fps,
                self.config.target_fps,
                stats.avg_fps
            ),
        }
        for issue in &issues {
            tracing::warn!("Performance issue: {}", issue);
        }
        issues
    }

    pub fn stats(&self) -> PerformanceStats {
        PerformanceStats {
            avg_fps: self.fps.average().unwrap_or(0),
            avg_memory: self.memory.average().unwrap_or(0),
            is_stable: self.consecutive_low == 0 && !self.leak_reported,
        }
    }

    /// Quality hints for the current FPS average
    pub fn quality(&self) -> QualityHints {
        QualityHints::from_average(self.fps.average().unwrap_or(self.config.target_fps), &self.config)
    }
}

// ============================================================================
// Quality Hints
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QualityLevel {
    High,
    Medium,
    Low,
}

/// Rendering hints derived from the measured FPS average
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QualityHints {
    pub level: QualityLevel,
    /// Resolution multiplier for canvases
    pub render_scale: f32,
    pub reduce_particles: bool,
    pub reduce_animations: bool,
}

impl QualityHints {
    pub fn from_average(average_fps: u32, config: &MonitorConfig) -> Self {
        let (level, render_scale) = if average_fps < config.min_fps {
            (QualityLevel::Low, 0.5)
        } else if f64::from(average_fps) < f64::from(config.target_fps) * 0.8 {
            (QualityLevel::Medium, 0.75)
        } else {
            (QualityLevel::High, 1.0)
        };
        Self {
            level,
            render_scale,
            reduce_particles: level == QualityLevel::Low,
            reduce_animations: level != QualityLevel::High,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor() -> PerformanceMonitor {
        PerformanceMonitor::new(MonitorConfig::default())
    }

    #[test]
    fn test_low_fps_needs_a_streak() {
        let mut monitor = monitor();
        assert!(monitor.sample(40, None).is_empty());
        assert!(monitor.sample(40, None).is_empty());
        assert_eq!(
            monitor.sample(40, None),
            vec![PerformanceIssue::LowFps { fps: 40, target: 60 }]
        );
        assert!(!monitor.stats().is_stable);

        assert!(monitor.sample(60, None).is_empty());
        assert!(monitor.stats().is_stable);
    }

    #[test]
    fn test_instability() {
        let mut monitor = monitor();
        for fps in [60, 60, 60, 60] {
            assert!(monitor.sample(fps, None).is_empty());
        }
        let issues = monitor.sample(25, None);
        assert!(issues.contains(&PerformanceIssue::Instability {
            min: 25,
            max: 60,
            average: 53
        }));
    }

    #[test]
    fn test_memory_spike_and_high_memory() {
        let mut monitor = monitor();
        assert!(monitor.sample(60, Some(180)).is_empty());
        let issues = monitor.sample(60, Some(205));
        assert_eq!(
            issues,
            vec![
                PerformanceIssue::MemorySpike { from: 180, to: 205 },
                PerformanceIssue::HighMemory { memory: 205 },
            ]
        );
    }

    #[test]
    fn test_leak_reported_once_until_growth_stops() {
        let mut monitor = monitor();
        let mut leaks = 0;
        for memory in [50, 53, 56, 59, 62, 65, 68] {
            leaks += monitor
                .sample(60, Some(memory))
                .iter()
                .filter(|issue| matches!(issue, PerformanceIssue::MemoryLeak { .. }))
                .count();
        }
        assert_eq!(leaks, 1);
        assert!(!monitor.stats().is_stable);

        monitor.sample(60, Some(60));
        assert!(monitor.stats().is_stable);
    }

    #[test]
    fn test_excessive_rendering() {
        let mut monitor = monitor();
        assert_eq!(
            monitor.sample(120, None),
            vec![PerformanceIssue::ExcessiveRendering { fps: 120, target: 60 }]
        );
    }

    #[test]
    fn test_quality_levels() {
        let config = MonitorConfig::default();
        assert_eq!(QualityHints::from_average(60, &config).level, QualityLevel::High);

        let medium = QualityHints::from_average(45, &config);
        assert_eq!(medium.level, QualityLevel::Medium);
        assert_eq!(medium.render_scale, 0.75);
        assert!(!medium.reduce_particles);

        let low = QualityHints::from_average(20, &config);
        assert_eq!(low.level, QualityLevel::Low);
        assert_eq!(low.render_scale, 0.5);
        assert!(low.reduce_particles);
    }

    #[test]
    fn test_issue_display() {
        let issue = PerformanceIssue::MemorySpike { from: 100, to: 130 };
        assert_eq!(issue.to_string(), "memory spike: +30MB (100MB -> 130MB)");
    }
}
