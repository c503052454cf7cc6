//! Scheduler timing configuration.

use std::time::Duration;

/// Timings for the three scheduler timers and the manual-refresh window.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Quiet period after the last edit before the debounced save fires.
    /// Re-armed on every edit.
    pub debounce: Duration,
    /// Fixed interval between auto-save ticks.
    pub autosave_interval: Duration,
    /// Fixed interval between sync-poll cycles.
    pub poll_interval: Duration,
    /// Minimum visual feedback window for a manual refresh; the finished
    /// event is withheld until it has elapsed.
    pub refresh_feedback: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(500),
            autosave_interval: Duration::from_secs(5),
            poll_interval: Duration::from_secs(10),
            refresh_feedback: Duration::from_millis(500),
        }
    }
}
