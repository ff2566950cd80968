//! Per-second and per-day call budget.
//!
//! Two independent fixed windows. A call that would overflow either window
//! waits cooperatively for the window to roll over; if that wait would pass
//! the caller's deadline the call fails as rate limited instead.

use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::blockchain::types::{RpcError, RpcResult};
use crate::observability::metrics;

const SECOND: Duration = Duration::from_secs(1);
const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Which window refused a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetWindow {
    Second,
    Day,
}

impl BudgetWindow {
    pub fn as_str(&self) -> &'static str {
        match self {
            BudgetWindow::Second => "per-second",
            BudgetWindow::Day => "per-day",
        }
    }
}

/// Read-only view of the current windows.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BudgetUsage {
    pub calls_this_second: u32,
    pub calls_this_day: u32,
    pub max_per_second: u32,
    pub max_per_day: u32,
    pub day_usage_percent: f64,
}

struct Windows {
    second_start: Instant,
    calls_this_second: u32,
    day_start: Instant,
    calls_this_day: u32,
}

impl Windows {
    fn roll(&mut self, now: Instant) {
        if now.duration_since(self.second_start) >= SECOND {
            self.second_start = now;
            self.calls_this_second = 0;
        }
        if now.duration_since(self.day_start) >= DAY {
            self.day_start = now;
            self.calls_this_day = 0;
        }
    }
}

/// Call budget shared by every request the access layer makes.
pub struct CallBudget {
    max_per_second: u32,
    max_per_day: u32,
    windows: Mutex<Windows>,
}

impl CallBudget {
    pub fn new(max_per_second: u32, max_per_day: u32) -> Self {
        let now = Instant::now();
        Self {
            max_per_second,
            max_per_day,
            windows: Mutex::new(Windows {
                second_start: now,
                calls_this_second: 0,
                day_start: now,
                calls_this_day: 0,
            }),
        }
    }

    /// Take one unit now, or report which window is full and how long until it resets.
    pub fn try_acquire(&self) -> Result<(), (BudgetWindow, Duration)> {
        let now = Instant::now();
        let mut w = self.windows.lock().expect("call budget mutex poisoned");
        w.roll(now);

        if w.calls_this_day >= self.max_per_day {
            let wait = DAY.saturating_sub(now.duration_since(w.day_start));
            return Err((BudgetWindow::Day, wait));
        }
        if w.calls_this_second >= self.max_per_second {
            let wait = SECOND.saturating_sub(now.duration_since(w.second_start));
            return Err((BudgetWindow::Second, wait));
        }

        w.calls_this_second += 1;
        w.calls_this_day += 1;
        Ok(())
    }

    /// Take one unit, sleeping until budget frees up but never past `max_wait`.
    pub async fn acquire(&self, max_wait: Duration) -> RpcResult<()> {
        let deadline = Instant::now() + max_wait;

        loop {
            let (window, wait) = match self.try_acquire() {
                Ok(()) => return Ok(()),
                Err(refused) => refused,
            };

            if Instant::now() + wait > deadline {
                metrics::record_rate_limited(window.as_str());
                return Err(RpcError::RateLimited(format!(
                    "{} budget exhausted, resets in {}ms",
                    window.as_str(),
                    wait.as_millis()
                )));
            }

            tracing::trace!(window = window.as_str(), wait_ms = wait.as_millis() as u64, "Waiting for call budget");
            tokio::time::sleep(wait).await;
        }
    }

    pub fn usage(&self) -> BudgetUsage {
        let mut w = self.windows.lock().expect("call budget mutex poisoned");
        w.roll(Instant::now());
        BudgetUsage {
            calls_this_second: w.calls_this_second,
            calls_this_day: w.calls_this_day,
            max_per_second: self.max_per_second,
            max_per_day: self.max_per_day,
            day_usage_percent: w.calls_this_day as f64 * 100.0 / self.max_per_day.max(1) as f64,
        }
    }
}

impl std::fmt::Debug for CallBudget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallBudget")
            .field("max_per_second", &self.max_per_second)
            .field("max_per_day", &self.max_per_day)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_second_window_enforced() {
        let budget = CallBudget::new(2, 100);
        assert!(budget.try_acquire().is_ok());
        assert!(budget.try_acquire().is_ok());

        let (window, wait) = budget.try_acquire().unwrap_err();
        assert_eq!(window, BudgetWindow::Second);
        assert!(wait <= SECOND);

        tokio::time::advance(SECOND).await;
        assert!(budget.try_acquire().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_waits_for_next_second() {
        let budget = CallBudget::new(1, 100);
        budget.acquire(Duration::ZERO).await.unwrap();

        let started = Instant::now();
        budget.acquire(Duration::from_secs(2)).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(999));
        assert_eq!(budget.usage().calls_this_day, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_fails_past_max_wait() {
        let budget = CallBudget::new(1, 100);
        budget.acquire(Duration::ZERO).await.unwrap();

        let err = budget.acquire(Duration::from_millis(100)).await.unwrap_err();
        assert!(matches!(err, RpcError::RateLimited(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_day_window_rejects_immediately() {
        let budget = CallBudget::new(10, 3);
        for _ in 0..3 {
            budget.acquire(Duration::ZERO).await.unwrap();
            tokio::time::advance(SECOND).await;
        }

        let err = budget.acquire(Duration::from_secs(60)).await.unwrap_err();
        assert!(err.to_string().contains("per-day"));
        assert_eq!(budget.usage().day_usage_percent, 100.0);
    }
}
