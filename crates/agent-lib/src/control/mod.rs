//! Hysteresis-based power control
//!
//! This module holds the decision core and the loop that drives it:
//! trailing boolean windows, the cooldown gate between actions, the
//! trigger/state transition table, and the per-cycle orchestration of
//! provider, engine, executor and recorders.

mod backoff;
mod cooldown;
mod decision;
mod r#loop;
mod window;


pub use backoff::Backoff;
pub use cooldown::CooldownTimer;
pub use decision::{Decision, DecisionConfig, DecisionEngine, HysteresisWindows, Trigger};
pub use r#loop::{ControlConfig, ControlLoop, ControlLoopBuilder, CycleReport};
pub use window::SlidingWindow;

use chrono::{DateTime, Utc};

/// Source of wall-clock time for cooldowns and records
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Clock backed by the system time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
