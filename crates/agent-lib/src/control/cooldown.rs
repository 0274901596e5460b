//! Wall-clock gate between actions

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Gate that opens again a fixed interval after it was last armed
///
/// A fresh timer is open. The action cooldown and the power telemetry
/// cadence each use their own instance.
#[derive(Debug, Clone)]
pub struct CooldownTimer {
    interval: chrono::Duration,
    next_eligible: Option<DateTime<Utc>>,
}

impl CooldownTimer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: chrono::Duration::seconds(interval.as_secs() as i64),
            next_eligible: None,
        }
    }

    /// True when `now` has reached the next eligible time
    pub fn is_elapsed(&self, now: DateTime<Utc>) -> bool {
        match self.next_eligible {
            None => true,
            Some(next) => now >= next,
        }
    }

    /// Close the gate until `now + interval`
    pub fn arm(&mut self, now: DateTime<Utc>) {
        self.next_eligible = Some(now + self.interval);
    }

    /// Time left until the gate opens, zero when already open
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        self.next_eligible
            .and_then(|next| (next - now).to_std().ok())
            .unwrap_or_default()
    }
}
