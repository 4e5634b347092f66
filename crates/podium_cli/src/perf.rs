//! Periodic performance reporting

use podium_animation::{FpsSource, MonitorConfig, PerformanceMonitor, QualityLevel};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::info;

/// Report FPS and memory every `report_interval_ms` until aborted
pub fn spawn_reporter(fps: FpsSource, config: MonitorConfig) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut monitor = PerformanceMonitor::new(config);
        let mut interval = tokio::time::interval(Duration::from_millis(
            monitor.config().report_interval_ms.max(1),
        ));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately
        interval.tick().await;

        let mut level = QualityLevel::High;
        loop {
            interval.tick().await;
            monitor.report(fps.current_fps(), resident_memory_mb());
            let hints = monitor.quality();
            if hints.level != level {
                info!(
                    "Quality: {:?} (render scale {}, reduce particles: {})",
                    hints.level, hints.render_scale, hints.reduce_particles
                );
                level = hints.level;
            }
        }
    })
}

/// Resident set size of this process, where the platform exposes it
pub fn resident_memory_mb() -> Option<u32> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    parse_vm_rss(&status)
}

fn parse_vm_rss(status: &str) -> Option<u32> {
    let line = status.lines().find(|line| line.starts_with("VmRSS:"))?;
    let kb: u64 = line.split_whitespace().nth(1)?.parse().ok()?;
    u32::try_from(kb / 1024).ok()
}
