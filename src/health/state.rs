//! Health state machine with hysteresis.
//!
//! # State Transitions
//! ```text
//! Unknown/Healthy → Unhealthy: consecutive failures >= unhealthy_threshold
//! Unknown/Unhealthy → Healthy: consecutive successes >= healthy_threshold
//! ```
//!
//! Counters reset on the opposite outcome. Transitions are logged.

use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};

use serde::Serialize;

/// Health State enum.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Unknown = 0,
    Healthy = 1,
    Unhealthy = 2,
}

impl From<u8> for HealthState {
    fn from(val: u8) -> Self {
        match val {
            1 => HealthState::Healthy,
            2 => HealthState::Unhealthy,
            _ => HealthState::Unknown,
        }
    }
}

/// Tracks consecutive outcomes of some dependency (the node, in practice).
#[derive(Debug)]
pub struct HealthTracker {
    name: &'static str,
    state: AtomicU8,
    consecutive_failures: AtomicU32,
    consecutive_successes: AtomicU32,
    unhealthy_threshold: u32,
    healthy_threshold: u32,
}

impl HealthTracker {
    pub fn new(name: &'static str, unhealthy_threshold: u32, healthy_threshold: u32) -> Self {
        Self {
            name,
            state: AtomicU8::new(HealthState::Unknown as u8),
            consecutive_failures: AtomicU32::new(0),
            consecutive_successes: AtomicU32::new(0),
            unhealthy_threshold: unhealthy_threshold.max(1),
            healthy_threshold: healthy_threshold.max(1),
        }
    }

    pub fn state(&self) -> HealthState {
        HealthState::from(self.state.load(Ordering::Relaxed))
    }

    /// Healthy or not yet known.
    pub fn is_healthy(&self) -> bool {
        self.state() != HealthState::Unhealthy
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    /// Report a successful call. Returns the new state if it changed.
    pub fn mark_success(&self) -> Option<HealthState> {
        self.consecutive_failures.store(0, Ordering::Relaxed);

        if self.state() == HealthState::Healthy {
            return None;
        }

        let successes = self.consecutive_successes.fetch_add(1, Ordering::Relaxed) + 1;
        if successes >= self.healthy_threshold {
            self.transition(HealthState::Healthy)
        } else {
            None
        }
    }

    /// Report a failed call. Returns the new state if it changed.
    pub fn mark_failure(&self) -> Option<HealthState> {
        self.consecutive_successes.store(0, Ordering::Relaxed);
        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;

        if self.state() == HealthState::Unhealthy {
            return None;
        }

        if failures >= self.unhealthy_threshold {
            self.transition(HealthState::Unhealthy)
        } else {
            None
        }
    }

    fn transition(&self, next: HealthState) -> Option<HealthState> {
        let previous = HealthState::from(self.state.swap(next as u8, Ordering::Relaxed));
        if previous == next {
            return None;
        }
        self.consecutive_successes.store(0, Ordering::Relaxed);

        match next {
            HealthState::Unhealthy => tracing::warn!(
                dependency = self.name,
                failures = self.consecutive_failures(),
                "Dependency marked unhealthy"
            ),
            _ => tracing::info!(dependency = self.name, from = ?previous, "Dependency healthy"),
        }
        Some(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unhealthy_after_threshold() {
        let tracker = HealthTracker::new("node", 3, 1);
        assert!(tracker.is_healthy());
        assert_eq!(tracker.mark_failure(), None);
        assert_eq!(tracker.mark_failure(), None);
        assert_eq!(tracker.mark_failure(), Some(HealthState::Unhealthy));
        assert!(!tracker.is_healthy());
        assert_eq!(tracker.consecutive_failures(), 3);
        assert_eq!(tracker.mark_failure(), None);
    }

    #[test]
    fn test_success_resets_failures() {
        let tracker = HealthTracker::new("node", 2, 1);
        tracker.mark_failure();
        tracker.mark_success();
        tracker.mark_failure();
        assert!(tracker.is_healthy());
    }

    #[test]
    fn test_recovery_needs_consecutive_successes() {
        let tracker = HealthTracker::new("node", 1, 2);
        tracker.mark_failure();
        assert_eq!(tracker.state(), HealthState::Unhealthy);

        assert_eq!(tracker.mark_success(), None);
        assert_eq!(tracker.mark_success(), Some(HealthState::Healthy));
        assert_eq!(tracker.consecutive_failures(), 0);
    }
}
