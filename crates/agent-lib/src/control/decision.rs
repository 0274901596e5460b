//! Trigger evaluation and power transition table
//!
//! Each cycle the engine folds the latest `Sample` into four hysteresis
//! windows and then checks, in priority order:
//!
//! 1. high worker CPU in more than half of the recent samples
//! 2. a GPU job waiting in more than half of the recent samples
//! 3. worker CPU low for the whole long window and the GPUs idle for the
//!    whole short window
//!
//! The first trigger that fires is resolved against the observed
//! `ClusterState` into an `ActionCode`.

use super::SlidingWindow;
use crate::models::{ActionCode, ClusterState, Sample};
use serde::Serialize;
use std::fmt;

/// Thresholds and window sizes for the decision engine
#[derive(Debug, Clone)]
pub struct DecisionConfig {
    /// Worker CPU percentage above which a sample counts as high load
    pub high_cpu_percent: f64,
    /// Worker CPU percentage below which a sample counts as idle
    pub low_cpu_percent: f64,
    /// A short window fires when more than this many samples are `true`
    pub majority_threshold: usize,
    /// Capacity of the CPU-exceed, GPU-wait and GPU-unused windows
    pub short_window: usize,
    /// Capacity of the CPU-under window
    pub long_window: usize,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            high_cpu_percent: 70.0,
            low_cpu_percent: 20.0,
            majority_threshold: 6,
            short_window: 12, // 1 minute at 5s
            long_window: 60, // 5 minutes at 5s
        }
    }
}

/// The four trailing windows the triggers read
#[derive(Debug, Clone)]
pub struct HysteresisWindows {
    pub cpu_exceed: SlidingWindow,
    pub gpu_wait_exceed: SlidingWindow,
    pub gpu_unused: SlidingWindow,
    pub cpu_under: SlidingWindow,
}

impl HysteresisWindows {
    pub fn new(config: &DecisionConfig) -> Self {
        Self {
            cpu_exceed: SlidingWindow::new(config.short_window),
            gpu_wait_exceed: SlidingWindow::new(config.short_window),
            gpu_unused: SlidingWindow::new(config.short_window),
            cpu_under: SlidingWindow::new(config.long_window),
        }
    }
}

/// Condition that caused a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    HighCpu,
    GpuWait,
    LowUtilization,
}

impl Trigger {
    /// Map the trigger and observed state to a power transition
    ///
    /// High load brings up the next missing node, A first. Low load powers
    /// down A when both are up, so B is the node kept running.
    pub fn resolve(&self, state: ClusterState) -> ActionCode {
        match self {
            Trigger::HighCpu | Trigger::GpuWait => match state {
                ClusterState::Neither | ClusterState::OnlyB => ActionCode::PowerOnA,
                ClusterState::OnlyA => ActionCode::PowerOnB,
                ClusterState::Both => ActionCode::NoOp,
            },
            Trigger::LowUtilization => match state {
                ClusterState::OnlyB => ActionCode::PowerOffB,
                ClusterState::OnlyA | ClusterState::Both => ActionCode::PowerOffA,
                ClusterState::Neither => ActionCode::NoOp,
            },
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Trigger::HighCpu => "high_cpu",
            Trigger::GpuWait => "gpu_wait",
            Trigger::LowUtilization => "low_utilization",
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub trigger: Option<Trigger>,
    pub action: ActionCode,
}

impl Decision {
    pub fn none() -> Self {
        Self {
            trigger: None,
            action: ActionCode::NoOp,
        }
    }
}

/// Hysteresis decision engine
///
/// Owns the trailing windows; holds no other state between cycles.
#[derive(Debug, Clone)]
pub struct DecisionEngine {
    config: DecisionConfig,
    windows: HysteresisWindows,
}

impl DecisionEngine {
    pub fn new(config: DecisionConfig) -> Self {
        let windows = HysteresisWindows::new(&config);
        Self { config, windows }
    }

    /// Push the sample's derived conditions into every window
    pub fn observe(&mut self, sample: &Sample) {
        let windows = &mut self.windows;
        windows
            .cpu_exceed
            .push(sample.cpu_worker_avg > self.config.high_cpu_percent);
        windows.gpu_wait_exceed.push(sample.gpu_pending);
        windows.gpu_unused.push(sample.gpu_worker_avg <= 0.0);
        windows
            .cpu_under
            .push(sample.cpu_worker_avg < self.config.low_cpu_percent);
    }

    /// First trigger that fires on the current windows, if any
    pub fn active_trigger(&self) -> Option<Trigger> {
        let w = &self.windows;
        let majority = |window: &SlidingWindow| {
            window.is_full() && window.sum() > self.config.majority_threshold
        };

        if majority(&w.cpu_exceed) {
            Some(Trigger::HighCpu)
        } else if majority(&w.gpu_wait_exceed) {
            Some(Trigger::GpuWait)
        } else if w.cpu_under.is_full() && w.cpu_under.all() && w.gpu_unused.all() {
            Some(Trigger::LowUtilization)
        } else {
            None
        }
    }

    /// Decide the action for the observed cluster state
    pub fn evaluate(&self, state: ClusterState) -> Decision {
        match self.active_trigger() {
            Some(trigger) => Decision {
                trigger: Some(trigger),
                action: trigger.resolve(state),
            },
            None => Decision::none(),
        }
    }

    pub fn windows(&self) -> &HysteresisWindows {
        &self.windows
    }

    #[cfg(test)]
    pub(crate) fn windows_mut(&mut self) -> &mut HysteresisWindows {
        &mut self.windows
    }
}

impl Default for DecisionEngine {
    fn default() -> Self {
        Self::new(DecisionConfig::default())
    }
}
