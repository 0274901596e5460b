//! Metric acquisition for the control loop
//!
//! This module provides the sources the control loop reads each cycle:
//! a cluster snapshot from the monitoring backend and the current power
//! draw from the rack PDU.

mod power_meter;
mod prometheus;

#[cfg(test)]
mod tests;

pub use power_meter::{parse_reading, SnmpConfig, SnmpPowerMeter};
pub use prometheus::{PrometheusProvider, QuerySet};

use crate::error::Result;
use crate::models::ClusterSnapshot;

pub use async_trait::async_trait;

/// Source of per-cycle cluster observations
#[async_trait]
pub trait MetricsProvider: Send + Sync {
    /// Query every metric and assemble one snapshot
    async fn snapshot(&self) -> Result<ClusterSnapshot>;
}

/// Source of the cluster's current power draw
#[async_trait]
pub trait PowerMeter: Send + Sync {
    /// Current draw in watts
    async fn read_watts(&self) -> Result<f64>;
}
