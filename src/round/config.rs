//! Round-end pacing.

use std::time::Duration;

/// Lowest accepted restart delay, in seconds.
pub const MIN_RESTART_SECS: u32 = 5;

/// Highest accepted restart delay, in seconds.
pub const MAX_RESTART_SECS: u32 = 1000;

/// Timing of the round-end sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundConfig {
    /// Interval between end-condition polls (default: 2.5 s).
    pub poll_interval: Duration,

    /// No poll evaluates before the round is this old (default: 15 s).
    pub minimum_round_time: Duration,

    /// Delay between the end decision and the summary (default: 1.5 s).
    pub summary_delay: Duration,

    /// Configured restart delay in seconds, before clamping (default: 10).
    pub restart_time: u32,

    /// How long before the restart the screen dims (default: 1 s).
    pub dim_lead: Duration,
}

impl Default for RoundConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(2500),
            minimum_round_time: Duration::from_secs(15),
            summary_delay: Duration::from_millis(1500),
            restart_time: 10,
            dim_lead: Duration::from_secs(1),
        }
    }
}

impl RoundConfig {
    /// Creates a new configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The restart delay clamped to `MIN_RESTART_SECS..=MAX_RESTART_SECS`.
    #[must_use]
    pub fn clamped_restart_time(&self) -> Duration {
        Duration::from_secs(u64::from(
            self.restart_time.clamp(MIN_RESTART_SECS, MAX_RESTART_SECS),
        ))
    }

    /// Sets the poll interval.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the minimum round time before polls evaluate.
    #[must_use]
    pub fn with_minimum_round_time(mut self, minimum: Duration) -> Self {
        self.minimum_round_time = minimum;
        self
    }

    /// Sets the delay before the summary is shown.
    #[must_use]
    pub fn with_summary_delay(mut self, delay: Duration) -> Self {
        self.summary_delay = delay;
        self
    }

    /// Sets the restart delay in seconds; it is clamped when used.
    #[must_use]
    pub fn with_restart_time(mut self, seconds: u32) -> Self {
        self.restart_time = seconds;
        self
    }

    /// Sets how long before the restart the screen dims.
    #[must_use]
    pub fn with_dim_lead(mut self, lead: Duration) -> Self {
        self.dim_lead = lead;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restart_time_is_clamped() {
        let config = RoundConfig::new();
        assert_eq!(config.clamped_restart_time(), Duration::from_secs(10));
        assert_eq!(
            config.clone().with_restart_time(0).clamped_restart_time(),
            Duration::from_secs(5)
        );
        assert_eq!(
            config.with_restart_time(5000).clamped_restart_time(),
            Duration::from_secs(1000)
        );
    }
}
