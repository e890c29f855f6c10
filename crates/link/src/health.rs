//! Activity tracking and the non-cooperative staleness check.
//!
//! The health check does not trust the transport's own close signalling:
//! a half-open TCP connection may never surface a close event, so the
//! link is judged purely on how long ago anything was seen.

use std::time::Duration;

use tokio::time::Instant;

/// Shared "last activity" clock plus the intervals derived from it.
#[derive(Debug, Clone)]
pub struct Heartbeat {
    last_activity: Instant,
    ping_interval: Duration,
    /// Health-check period, in multiples of `ping_interval`.
    check_multiplier: u32,
    /// Idle threshold, in multiples of `ping_interval`.
    stale_multiplier: u32,
}

impl Heartbeat {
    pub fn new(ping_interval: Duration, check_multiplier: u32, stale_multiplier: u32) -> Self {
        Self {
            last_activity: Instant::now(),
            ping_interval,
            check_multiplier: check_multiplier.max(1),
            stale_multiplier: stale_multiplier.max(1),
        }
    }

    /// Record activity now.
    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    pub fn ping_interval(&self) -> Duration {
        self.ping_interval
    }

    pub fn check_period(&self) -> Duration {
        self.ping_interval * self.check_multiplier
    }

    pub fn stale_after(&self) -> Duration {
        self.ping_interval * self.stale_multiplier
    }

    pub fn idle(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_activity)
    }
}

/// Result of a single health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Fresh { idle: Duration },
    Stale { idle: Duration },
}

impl Liveness {
    pub fn is_stale(&self) -> bool {
        matches!(self, Liveness::Stale { .. })
    }
}

/// Judges a [`Heartbeat`] against its stale threshold.
#[derive(Debug, Clone, Copy, Default)]
pub struct HealthMonitor;

impl HealthMonitor {
    /// Stale when idle time strictly exceeds the threshold.
    pub fn check(&self, heartbeat: &Heartbeat, now: Instant) -> Liveness {
        let idle = heartbeat.idle(now);
        if idle > heartbeat.stale_after() {
            Liveness::Stale { idle }
        } else {
            Liveness::Fresh { idle }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heartbeat() -> Heartbeat {
        Heartbeat::new(Duration::from_secs(30), 2, 3)
    }

    #[test]
    fn derived_periods() {
        let hb = heartbeat();
        assert_eq!(hb.check_period(), Duration::from_secs(60));
        assert_eq!(hb.stale_after(), Duration::from_secs(90));
    }

    #[test]
    fn zero_multipliers_clamped() {
        let hb = Heartbeat::new(Duration::from_secs(10), 0, 0);
        assert_eq!(hb.check_period(), Duration::from_secs(10));
        assert_eq!(hb.stale_after(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_until_threshold_exceeded() {
        let hb = heartbeat();
        let monitor = HealthMonitor;

        tokio::time::advance(Duration::from_secs(90)).await;
        assert_eq!(
            monitor.check(&hb, Instant::now()),
            Liveness::Fresh {
                idle: Duration::from_secs(90)
            }
        );

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(monitor.check(&hb, Instant::now()).is_stale());
    }

    #[tokio::test(start_paused = true)]
    async fn touch_resets_idle() {
        let mut hb = heartbeat();
        tokio::time::advance(Duration::from_secs(120)).await;
        assert!(HealthMonitor.check(&hb, Instant::now()).is_stale());

        hb.touch();
        assert_eq!(hb.idle(Instant::now()), Duration::ZERO);
        assert!(!HealthMonitor.check(&hb, Instant::now()).is_stale());
    }
}
