//! Power control loop
//!
//! One task owns every window, timer and counter. Each cycle it pulls a
//! snapshot, updates the windows, records the snapshot, evaluates the
//! triggers and dispatches at most one action, then reads the power meter
//! when its own cadence is due. The loop sleeps a fixed period after each
//! cycle, so the cadence drifts by the time the cycle itself took.

use super::{Backoff, Clock, CooldownTimer, Decision, DecisionConfig, DecisionEngine, SystemClock};
use crate::collector::{MetricsProvider, PowerMeter};
use crate::error::CollaboratorError;
use crate::executor::ActionExecutor;
use crate::health::HealthRegistry;
use crate::models::{ActionCode, ClusterSnapshot, ClusterState, Sample};
use crate::observability::{collaborators, AgentMetrics, StructuredLogger};
use crate::record::Recorder;
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Timing configuration for the control loop
#[derive(Debug, Clone)]
pub struct ControlConfig {
    /// Sleep between cycles (default: 5 seconds)
    pub check_interval: Duration,
    /// Minimum time between two dispatched actions (default: 10 minutes)
    pub action_cooldown: Duration,
    /// Time between power meter readings (default: 10 minutes)
    pub power_log_interval: Duration,
    /// First delay after a failed metrics fetch
    pub initial_backoff: Duration,
    /// Upper bound for the metrics fetch delay
    pub max_backoff: Duration,
    /// Trigger thresholds and window sizes
    pub decision: DecisionConfig,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(5),
            action_cooldown: Duration::from_secs(600),
            power_log_interval: Duration::from_secs(600),
            initial_backoff: Duration::from_secs(5),
            max_backoff: Duration::from_secs(60),
            decision: DecisionConfig::default(),
        }
    }
}

/// What happened during one cycle
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub at: DateTime<Utc>,
    /// `None` when the metrics fetch failed or was held back by backoff
    pub sample: Option<Sample>,
    pub decision: Option<Decision>,
    pub dispatched: Option<ActionCode>,
    /// A non-noop decision was held back by the cooldown
    pub suppressed: bool,
    /// Set on cycles where the power meter was read successfully
    pub power_watts: Option<f64>,
}

impl CycleReport {
    fn new(at: DateTime<Utc>) -> Self {
        Self {
            at,
            sample: None,
            decision: None,
            dispatched: None,
            suppressed: false,
            power_watts: None,
        }
    }
}

/// Control loop that owns the decision state and drives the collaborators
pub struct ControlLoop {
    provider: Arc<dyn MetricsProvider>,
    executor: Arc<dyn ActionExecutor>,
    power_meter: Arc<dyn PowerMeter>,
    recorder: Arc<dyn Recorder>,
    clock: Arc<dyn Clock>,
    health: HealthRegistry,
    metrics: AgentMetrics,
    logger: StructuredLogger,
    config: ControlConfig,
    engine: DecisionEngine,
    action_cooldown: CooldownTimer,
    power_schedule: CooldownTimer,
    metrics_backoff: Backoff,
    /// Consecutive failures per collaborator other than the metrics provider
    failures: HashMap<&'static str, u32>,
}

impl ControlLoop {
    /// Run until a shutdown signal arrives
    ///
    /// Collaborator failures never end the loop.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.check_interval.as_secs(),
            cooldown_secs = self.config.action_cooldown.as_secs(),
            "Starting power control loop"
        );

        loop {
            self.run_cycle().await;

            tokio::select! {
                _ = tokio::time::sleep(self.config.check_interval) => {}
                _ = shutdown.recv() => {
                    info!("Shutting down power control loop");
                    break;
                }
            }
        }
    }

    /// Execute one cycle: sample, windows, record, decide, dispatch, telemetry
    pub async fn run_cycle(&mut self) -> CycleReport {
        let started = Instant::now();
        let now = self.clock.now();
        let mut report = CycleReport::new(now);

        if let Some(snapshot) = self.fetch_snapshot(now).await {
            let sample = Sample::from_snapshot(&snapshot);

            self.engine.observe(&sample);
            self.metrics.set_sample(&sample);
            self.metrics.set_windows(self.engine.windows());
            self.record_snapshot(now, &snapshot).await;

            let decision = self.engine.evaluate(sample.state);
            if decision.trigger.is_some() {
                self.logger.log_decision(&sample, &decision);
            }

            if !decision.action.is_noop() {
                if self.action_cooldown.is_elapsed(now) {
                    self.dispatch(sample.state, decision.action).await;
                    self.action_cooldown.arm(now);
                    report.dispatched = Some(decision.action);
                } else {
                    let remaining = self.action_cooldown.remaining(now);
                    self.logger
                        .log_suppressed(decision.action, remaining.as_secs());
                    self.metrics.inc_actions_suppressed();
                    report.suppressed = true;
                }
            }

            report.sample = Some(sample);
            report.decision = Some(decision);
        }

        if self.power_schedule.is_elapsed(now) {
            report.power_watts = self.read_power(now).await;
            self.power_schedule.arm(now);
        }

        self.metrics
            .observe_cycle_duration(started.elapsed().as_secs_f64());
        report
    }

    pub fn engine(&self) -> &DecisionEngine {
        &self.engine
    }

    async fn fetch_snapshot(&mut self, now: DateTime<Utc>) -> Option<ClusterSnapshot> {
        if !self.metrics_backoff.is_ready(now) {
            debug!("Metrics provider in backoff, skipping sample");
            return None;
        }

        match self.provider.snapshot().await {
            Ok(snapshot) => {
                if self.metrics_backoff.consecutive_failures() > 0 {
                    info!(
                        failures = self.metrics_backoff.consecutive_failures(),
                        "Metrics provider recovered"
                    );
                }
                self.metrics_backoff.record_success();
                self.health
                    .record_outcome(collaborators::METRICS_PROVIDER, 0, None)
                    .await;
                Some(snapshot)
            }
            Err(e) => {
                let delay = self.metrics_backoff.record_failure(now);
                let failures = self.metrics_backoff.consecutive_failures();
                debug!(retry_in_ms = delay.as_millis() as u64, "Backing off metrics provider");
                self.report_failure(collaborators::METRICS_PROVIDER, &e, failures)
                    .await;
                None
            }
        }
    }

    async fn record_snapshot(&mut self, now: DateTime<Utc>, snapshot: &ClusterSnapshot) {
        let result = self.recorder.record_snapshot(now, snapshot);
        self.settle(collaborators::STATE_LOG, result).await;
    }

    async fn dispatch(&mut self, state: ClusterState, action: ActionCode) {
        self.logger.log_dispatch(state, action);
        self.metrics.inc_actions_dispatched(action);

        let result = self.executor.execute(action).await;
        if let Err(e) = &result {
            self.logger.log_action_failed(action, e);
            self.metrics.inc_action_failures();
        }
        self.settle(collaborators::ACTION_EXECUTOR, result).await;
    }

    async fn read_power(&mut self, now: DateTime<Utc>) -> Option<f64> {
        let watts = match self.power_meter.read_watts().await {
            Ok(watts) => watts,
            Err(e) => {
                self.settle(collaborators::POWER_METER, Err(e)).await;
                return None;
            }
        };
        self.settle(collaborators::POWER_METER, Ok(())).await;

        self.logger.log_power(watts);
        self.metrics.set_power_watts(watts);
        let result = self.recorder.record_power(now, watts);
        self.settle(collaborators::POWER_LOG, result).await;
        Some(watts)
    }

    /// Fold a collaborator outcome into failure counters, health and metrics
    async fn settle(&mut self, name: &'static str, result: crate::error::Result<()>) {
        match result {
            Ok(()) => {
                self.failures.insert(name, 0);
                self.health.record_outcome(name, 0, None).await;
            }
            Err(e) => {
                let failures = self.failures.entry(name).or_insert(0);
                *failures += 1;
                let failures = *failures;
                self.report_failure(name, &e, failures).await;
            }
        }
    }

    async fn report_failure(&self, name: &'static str, err: &CollaboratorError, failures: u32) {
        self.logger.log_collaborator_failure(name, err, failures);
        self.metrics.inc_collaborator_error(name, err);
        self.health
            .record_outcome(name, failures, Some(err.to_string()))
            .await;
    }
}

/// Builder for creating the control loop
pub struct ControlLoopBuilder {
    provider: Option<Arc<dyn MetricsProvider>>,
    executor: Option<Arc<dyn ActionExecutor>>,
    power_meter: Option<Arc<dyn PowerMeter>>,
    recorder: Option<Arc<dyn Recorder>>,
    clock: Arc<dyn Clock>,
    health: Option<HealthRegistry>,
    metrics: Option<AgentMetrics>,
    logger: Option<StructuredLogger>,
    config: ControlConfig,
}

impl ControlLoopBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            provider: None,
            executor: None,
            power_meter: None,
            recorder: None,
            clock: Arc::new(SystemClock),
            health: None,
            metrics: None,
            logger: None,
            config: ControlConfig::default(),
        }
    }

    /// Set the metrics provider
    pub fn provider(mut self, provider: Arc<dyn MetricsProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Set the action executor
    pub fn executor(mut self, executor: Arc<dyn ActionExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Set the power meter
    pub fn power_meter(mut self, power_meter: Arc<dyn PowerMeter>) -> Self {
        self.power_meter = Some(power_meter);
        self
    }

    /// Set the state and power recorder
    pub fn recorder(mut self, recorder: Arc<dyn Recorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Replace the system clock
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn metrics(mut self, metrics: AgentMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Replace the whole timing configuration
    pub fn config(mut self, config: ControlConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the sleep between cycles
    pub fn check_interval(mut self, interval: Duration) -> Self {
        self.config.check_interval = interval;
        self
    }

    /// Set the minimum time between dispatched actions
    pub fn action_cooldown(mut self, cooldown: Duration) -> Self {
        self.config.action_cooldown = cooldown;
        self
    }

    /// Set the power meter cadence
    pub fn power_log_interval(mut self, interval: Duration) -> Self {
        self.config.power_log_interval = interval;
        self
    }

    /// Build the control loop
    pub fn build(self) -> Result<ControlLoop> {
        let provider = self
            .provider
            .ok_or_else(|| anyhow::anyhow!("Metrics provider is required"))?;
        let executor = self
            .executor
            .ok_or_else(|| anyhow::anyhow!("Action executor is required"))?;
        let power_meter = self
            .power_meter
            .ok_or_else(|| anyhow::anyhow!("Power meter is required"))?;
        let recorder = self
            .recorder
            .ok_or_else(|| anyhow::anyhow!("Recorder is required"))?;

        let config = self.config;
        Ok(ControlLoop {
            provider,
            executor,
            power_meter,
            recorder,
            clock: self.clock,
            health: self.health.unwrap_or_default(),
            metrics: self.metrics.unwrap_or_default(),
            logger: self
                .logger
                .unwrap_or_else(|| StructuredLogger::new("default")),
            engine: DecisionEngine::new(config.decision.clone()),
            action_cooldown: CooldownTimer::new(config.action_cooldown),
            power_schedule: CooldownTimer::new(config.power_log_interval),
            metrics_backoff: Backoff::new(config.initial_backoff, config.max_backoff),
            failures: HashMap::new(),
            config,
        })
    }
}

impl Default for ControlLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}
