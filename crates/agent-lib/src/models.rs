//! Core data models for the power agent

use serde::{Deserialize, Serialize};
use std::fmt;

/// Value reported for a node that returned no series for a metric
pub const MISSING: f64 = -1.0;

/// Nodes whose CPU and memory are recorded, in column order
pub const CLUSTER_NODES: [&str; 4] = ["cillium1", "cillium2", "cillium3", "cillium4"];

/// Nodes carrying GPUs, in column order
pub const GPU_NODES: [&str; 2] = ["cillium3", "cillium4"];

/// Indexes into `CLUSTER_NODES` of the nodes counted as workers
const WORKER_RANGE: std::ops::Range<usize> = 1..4;

/// CPU average reported when no worker returns data
const UNKNOWN_CPU_AVERAGE: f64 = 100.0;

/// One of the two nodes whose power the agent controls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ManagedNode {
    /// `cillium3`
    A,
    /// `cillium4`
    B,
}

impl ManagedNode {
    pub fn name(&self) -> &'static str {
        match self {
            ManagedNode::A => "cillium3",
            ManagedNode::B => "cillium4",
        }
    }

    /// Bit this node occupies in `ClusterState`
    fn bit(&self) -> u8 {
        match self {
            ManagedNode::A => 2,
            ManagedNode::B => 1,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "cillium3" => Some(ManagedNode::A),
            "cillium4" => Some(ManagedNode::B),
            _ => None,
        }
    }
}

impl fmt::Display for ManagedNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which managed nodes currently report as powered and schedulable
///
/// Encoded as a bitmask: 2 for node A, 1 for node B.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClusterState {
    Neither = 0,
    OnlyB = 1,
    OnlyA = 2,
    Both = 3,
}

impl ClusterState {
    pub const ALL: [ClusterState; 4] = [
        ClusterState::Neither,
        ClusterState::OnlyB,
        ClusterState::OnlyA,
        ClusterState::Both,
    ];

    /// Decode from the low two bits of a status value
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0 => ClusterState::Neither,
            1 => ClusterState::OnlyB,
            2 => ClusterState::OnlyA,
            _ => ClusterState::Both,
        }
    }

    pub fn bits(&self) -> u8 {
        *self as u8
    }

    /// Build the state from the set of nodes that reported metrics
    pub fn from_reporting<'a>(nodes: impl IntoIterator<Item = &'a str>) -> Self {
        let bits = nodes
            .into_iter()
            .filter_map(ManagedNode::from_name)
            .fold(0u8, |acc, node| acc | node.bit());
        Self::from_bits(bits)
    }
}

impl fmt::Display for ClusterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ClusterState::Neither => "neither",
            ClusterState::OnlyB => "only_b",
            ClusterState::OnlyA => "only_a",
            ClusterState::Both => "both",
        };
        f.write_str(name)
    }
}

/// Desired power state of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerState {
    On,
    Off,
}

impl PowerState {
    /// Argument passed to `chassis power`
    pub fn as_str(&self) -> &'static str {
        match self {
            PowerState::On => "on",
            PowerState::Off => "off",
        }
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Power transition chosen by the decision engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionCode {
    NoOp = 0,
    PowerOnA = 1,
    PowerOffA = 2,
    PowerOnB = 3,
    PowerOffB = 4,
}

impl ActionCode {
    /// Node and power state this action drives, `None` for `NoOp`
    pub fn target(&self) -> Option<(ManagedNode, PowerState)> {
        match self {
            ActionCode::NoOp => None,
            ActionCode::PowerOnA => Some((ManagedNode::A, PowerState::On)),
            ActionCode::PowerOffA => Some((ManagedNode::A, PowerState::Off)),
            ActionCode::PowerOnB => Some((ManagedNode::B, PowerState::On)),
            ActionCode::PowerOffB => Some((ManagedNode::B, PowerState::Off)),
        }
    }

    pub fn is_noop(&self) -> bool {
        matches!(self, ActionCode::NoOp)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionCode::NoOp => "noop",
            ActionCode::PowerOnA => "power_on_a",
            ActionCode::PowerOffA => "power_off_a",
            ActionCode::PowerOnB => "power_on_b",
            ActionCode::PowerOffB => "power_off_b",
        }
    }
}

impl fmt::Display for ActionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Job queue counters scraped from kube-state-metrics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounts {
    pub completed_batch: u64,
    pub running_batch: u64,
    pub pending_batch: u64,
    pub total_batch: u64,
    pub running_long: u64,
    pub pending_long: u64,
}

/// Raw per-node observation of the cluster for one cycle
///
/// Per-node arrays follow `CLUSTER_NODES` and `GPU_NODES` order; `MISSING`
/// marks a node that reported no series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSnapshot {
    pub active_nodes: ClusterState,
    pub cpu_usage: [f64; 4],
    pub mem_usage: [f64; 4],
    pub gpu_usage: [f64; 2],
    pub gpu_temp: [f64; 2],
    pub jobs: JobCounts,
}

impl ClusterSnapshot {
    /// Snapshot where no node reports anything
    pub fn empty() -> Self {
        Self {
            active_nodes: ClusterState::Neither,
            cpu_usage: [MISSING; 4],
            mem_usage: [MISSING; 4],
            gpu_usage: [MISSING; 2],
            gpu_temp: [MISSING; 2],
            jobs: JobCounts::default(),
        }
    }
}

/// Aggregated observation consumed by the decision engine
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub state: ClusterState,
    /// Mean CPU utilization across reporting workers, 100 when none report
    pub cpu_worker_avg: f64,
    /// Mean GPU utilization across reporting GPU nodes, -1 when none report
    pub gpu_worker_avg: f64,
    /// A long-running GPU job is waiting to be scheduled
    pub gpu_pending: bool,
}

impl Sample {
    pub fn from_snapshot(snapshot: &ClusterSnapshot) -> Self {
        let cpu_worker_avg =
            mean_reported(&snapshot.cpu_usage[WORKER_RANGE]).unwrap_or(UNKNOWN_CPU_AVERAGE);
        let gpu_worker_avg = mean_reported(&snapshot.gpu_usage).unwrap_or(MISSING);

        Self {
            state: snapshot.active_nodes,
            cpu_worker_avg,
            gpu_worker_avg,
            gpu_pending: snapshot.jobs.pending_long > 0,
        }
    }
}

/// Mean of the values that are not the `MISSING` sentinel
fn mean_reported(values: &[f64]) -> Option<f64> {
    let reported: Vec<f64> = values.iter().copied().filter(|v| *v != MISSING).collect();
    if reported.is_empty() {
        None
    } else {
        Some(reported.iter().sum::<f64>() / reported.len() as f64)
    }
}
