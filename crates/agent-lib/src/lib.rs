//! Agent library for hysteresis-based cluster power control
//!
//! This crate provides the core functionality for:
//! - Cluster metrics collection from Prometheus
//! - Sliding-window trigger evaluation with an action cooldown
//! - Node power actions through the cleanup service and IPMI
//! - PDU power telemetry and CSV state records
//! - Health checks and observability

pub mod collector;
pub mod control;
pub mod error;
pub mod executor;
pub mod health;
pub mod models;
pub mod observability;
pub mod record;

pub use control::{ControlConfig, ControlLoop, ControlLoopBuilder, CycleReport};
pub use error::{CollaboratorError, FailureKind};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{AgentMetrics, StructuredLogger};
pub use record::{CsvRecorder, Recorder};
