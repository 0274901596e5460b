//! Observability infrastructure for the power agent
//!
//! Provides:
//! - Prometheus metrics (cycle latency, observed load, window fill, actions, failures)
//! - Structured JSON logging with tracing

use crate::control::{Decision, HysteresisWindows};
use crate::error::CollaboratorError;
use crate::models::{ActionCode, ClusterState, Sample};
use prometheus::{
    register_gauge, register_histogram, register_int_counter, register_int_counter_vec,
    register_int_gauge, register_int_gauge_vec, Gauge, Histogram, IntCounter, IntCounterVec,
    IntGauge, IntGaugeVec,
};
use std::sync::OnceLock;
use tracing::{error, info, warn};

/// Histogram buckets for cycle duration (in seconds); a dispatch includes the settle delay
const CYCLE_BUCKETS: &[f64] = &[
    0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0,
];

/// Collaborator names used in metric labels and health components
pub mod collaborators {
    pub const METRICS_PROVIDER: &str = "metrics_provider";
    pub const ACTION_EXECUTOR: &str = "action_executor";
    pub const POWER_METER: &str = "power_meter";
    pub const STATE_LOG: &str = "state_log";
    pub const POWER_LOG: &str = "power_log";
}

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<AgentMetricsInner> = OnceLock::new();

/// Inner metrics structure that holds the actual Prometheus metrics
struct AgentMetricsInner {
    cycle_duration_seconds: Histogram,
    cluster_state: IntGauge,
    cpu_worker_avg: Gauge,
    gpu_worker_avg: Gauge,
    power_watts: Gauge,
    window_true_count: IntGaugeVec,
    actions_dispatched: IntCounterVec,
    actions_suppressed: IntCounter,
    action_failures: IntCounter,
    collaborator_errors: IntCounterVec,
}

impl AgentMetricsInner {
    fn new() -> Self {
        Self {
            cycle_duration_seconds: register_histogram!(
                "power_agent_cycle_duration_seconds",
                "Time spent in one control loop cycle",
                CYCLE_BUCKETS.to_vec()
            )
            .expect("Failed to register cycle_duration_seconds"),

            cluster_state: register_int_gauge!(
                "power_agent_cluster_state",
                "Active node bitmask (2 = cillium3, 1 = cillium4)"
            )
            .expect("Failed to register cluster_state"),

            cpu_worker_avg: register_gauge!(
                "power_agent_cpu_worker_avg_percent",
                "Mean CPU utilization across reporting workers"
            )
            .expect("Failed to register cpu_worker_avg"),

            gpu_worker_avg: register_gauge!(
                "power_agent_gpu_worker_avg_percent",
                "Mean GPU utilization across reporting GPU nodes, -1 when none report"
            )
            .expect("Failed to register gpu_worker_avg"),

            power_watts: register_gauge!(
                "power_agent_power_watts",
                "Last power draw reported by the PDU"
            )
            .expect("Failed to register power_watts"),

            window_true_count: register_int_gauge_vec!(
                "power_agent_window_true_count",
                "Number of true observations held in each hysteresis window",
                &["window"]
            )
            .expect("Failed to register window_true_count"),

            actions_dispatched: register_int_counter_vec!(
                "power_agent_actions_dispatched_total",
                "Power actions handed to the executor",
                &["action"]
            )
            .expect("Failed to register actions_dispatched"),

            actions_suppressed: register_int_counter!(
                "power_agent_actions_suppressed_total",
                "Triggered actions held back by the cooldown"
            )
            .expect("Failed to register actions_suppressed"),

            action_failures: register_int_counter!(
                "power_agent_action_failures_total",
                "Dispatched actions whose execution reported an error"
            )
            .expect("Failed to register action_failures"),

            collaborator_errors: register_int_counter_vec!(
                "power_agent_collaborator_errors_total",
                "Collaborator call failures by collaborator and failure kind",
                &["collaborator", "kind"]
            )
            .expect("Failed to register collaborator_errors"),
        }
    }
}

/// Agent metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct AgentMetrics {
    _private: (),
}

impl Default for AgentMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(AgentMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &AgentMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    pub fn observe_cycle_duration(&self, duration_secs: f64) {
        self.inner().cycle_duration_seconds.observe(duration_secs);
    }

    /// Record the aggregated sample of the current cycle
    pub fn set_sample(&self, sample: &Sample) {
        let inner = self.inner();
        inner.cluster_state.set(i64::from(sample.state.bits()));
        inner.cpu_worker_avg.set(sample.cpu_worker_avg);
        inner.gpu_worker_avg.set(sample.gpu_worker_avg);
    }

    pub fn set_windows(&self, windows: &HysteresisWindows) {
        let gauge = &self.inner().window_true_count;
        for (name, window) in [
            ("cpu_exceed", &windows.cpu_exceed),
            ("gpu_wait_exceed", &windows.gpu_wait_exceed),
            ("gpu_unused", &windows.gpu_unused),
            ("cpu_under", &windows.cpu_under),
        ] {
            gauge.with_label_values(&[name]).set(window.sum() as i64);
        }
    }

    pub fn set_power_watts(&self, watts: f64) {
        self.inner().power_watts.set(watts);
    }

    pub fn inc_actions_dispatched(&self, action: ActionCode) {
        self.inner()
            .actions_dispatched
            .with_label_values(&[action.as_str()])
            .inc();
    }

    pub fn inc_actions_suppressed(&self) {
        self.inner().actions_suppressed.inc();
    }

    pub fn inc_action_failures(&self) {
        self.inner().action_failures.inc();
    }

    pub fn inc_collaborator_error(&self, collaborator: &str, err: &CollaboratorError) {
        self.inner()
            .collaborator_errors
            .with_label_values(&[collaborator, err.kind().as_str()])
            .inc();
    }
}

/// Structured logger for control plane events
///
/// Provides consistent JSON-formatted logging for decisions, dispatches,
/// power readings and collaborator failures.
#[derive(Clone)]
pub struct StructuredLogger {
    cluster: String,
}

impl StructuredLogger {
    pub fn new(cluster: impl Into<String>) -> Self {
        Self {
            cluster: cluster.into(),
        }
    }

    /// Log agent startup
    pub fn log_startup(&self, version: &str) {
        info!(
            event = "agent_started",
            cluster = %self.cluster,
            agent_version = %version,
            "Power agent started"
        );
    }

    /// Log agent shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "agent_shutdown",
            cluster = %self.cluster,
            reason = %reason,
            "Power agent shutting down"
        );
    }

    /// Log a trigger that fired this cycle
    pub fn log_decision(&self, sample: &Sample, decision: &Decision) {
        let trigger = decision.trigger.map(|t| t.as_str()).unwrap_or("none");
        info!(
            event = "decision",
            cluster = %self.cluster,
            state = %sample.state,
            cpu_worker_avg = sample.cpu_worker_avg,
            gpu_worker_avg = sample.gpu_worker_avg,
            gpu_pending = sample.gpu_pending,
            trigger = %trigger,
            action = %decision.action,
            "Trigger fired"
        );
    }

    pub fn log_dispatch(&self, state: ClusterState, action: ActionCode) {
        info!(
            event = "action_dispatched",
            cluster = %self.cluster,
            state = %state,
            action = %action,
            "Dispatching power action"
        );
    }

    /// Log an action held back by the cooldown
    pub fn log_suppressed(&self, action: ActionCode, remaining_secs: u64) {
        info!(
            event = "action_suppressed",
            cluster = %self.cluster,
            action = %action,
            cooldown_remaining_secs = remaining_secs,
            "Cooldown active, no action this cycle"
        );
    }

    pub fn log_action_failed(&self, action: ActionCode, err: &CollaboratorError) {
        error!(
            event = "action_failed",
            cluster = %self.cluster,
            action = %action,
            kind = %err.kind(),
            error = %err,
            "Power action failed"
        );
    }

    pub fn log_power(&self, watts: f64) {
        info!(
            event = "power_reading",
            cluster = %self.cluster,
            watts = watts,
            "Actual power"
        );
    }

    /// Log a failed call to a metrics, telemetry or record collaborator
    pub fn log_collaborator_failure(
        &self,
        collaborator: &str,
        err: &CollaboratorError,
        consecutive_failures: u32,
    ) {
        warn!(
            event = "collaborator_failed",
            cluster = %self.cluster,
            collaborator = %collaborator,
            kind = %err.kind(),
            consecutive_failures = consecutive_failures,
            error = %err,
            "Collaborator call failed, continuing"
        );
    }
}
