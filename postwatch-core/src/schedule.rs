use std::time::Duration;

/// Jitter policy shared by every account worker.
///
/// All sleeps in the monitoring loop come from here: the normal poll
/// interval (base +/- jitter), the short backoff after a failed extraction,
/// the long cooldown after an unclassified failure, and the stagger between
/// worker launches.
#[derive(Debug, Clone, PartialEq)]
pub struct PollSchedule {
    pub base_interval: Duration,
    pub interval_jitter: Duration,
    pub failure_backoff: Duration,
    pub cooldown: Duration,
    pub stagger_min: Duration,
    pub stagger_max: Duration,
}

impl PollSchedule {
    pub fn new(base_interval: Duration) -> Self {
        Self {
            base_interval,
            interval_jitter: Duration::from_secs(20),
            failure_backoff: Duration::from_secs(60),
            cooldown: Duration::from_secs(60),
            stagger_min: Duration::from_secs(1),
            stagger_max: Duration::from_secs(3),
        }
    }

    /// Delay before the next regular poll, uniform in
    /// `[base - jitter, base + jitter]`.
    pub fn next_poll_delay(&self) -> Duration {
        let low = self.base_interval.saturating_sub(self.interval_jitter);
        let high = self.base_interval + self.interval_jitter;
        uniform(low, high)
    }

    pub fn failure_delay(&self) -> Duration {
        self.failure_backoff
    }

    pub fn cooldown_delay(&self) -> Duration {
        self.cooldown
    }

    /// Delay between two successive worker launches.
    pub fn stagger_delay(&self) -> Duration {
        uniform(self.stagger_min, self.stagger_max)
    }
}

impl Default for PollSchedule {
    fn default() -> Self {
        Self::new(Duration::from_secs(300))
    }
}

fn uniform(low: Duration, high: Duration) -> Duration {
    if high <= low {
        return low;
    }
    let low_ms = low.as_millis() as u64;
    let high_ms = high.as_millis() as u64;
    Duration::from_millis(fastrand::u64(low_ms..=high_ms))
}
