//! Exponential backoff for a failing collaborator

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Tracks consecutive failures and when the next attempt is allowed
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
    consecutive_failures: u32,
    retry_at: Option<DateTime<Utc>>,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max: max.max(initial),
            current: initial,
            consecutive_failures: 0,
            retry_at: None,
        }
    }

    /// Whether a call may be attempted at `now`
    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        self.retry_at.map_or(true, |at| now >= at)
    }

    /// Record a failure and return the delay before the next attempt
    pub fn record_failure(&mut self, now: DateTime<Utc>) -> Duration {
        let delay = self.current;
        self.consecutive_failures += 1;
        self.retry_at = Some(now + chrono::Duration::milliseconds(delay.as_millis() as i64));
        self.current = (self.current * 2).min(self.max);
        delay
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.current = self.initial;
        self.retry_at = None;
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }
}
