//! Prometheus instant-query metrics provider

use super::{async_trait, MetricsProvider};
use crate::error::{CollaboratorError, Result};
use crate::models::{ClusterSnapshot, ClusterState, JobCounts, CLUSTER_NODES, GPU_NODES, MISSING};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// PromQL expressions for every snapshot field
#[derive(Debug, Clone)]
pub struct QuerySet {
    pub cpu_usage: String,
    pub mem_usage: String,
    pub gpu_usage: String,
    pub gpu_temp: String,
    pub completed_batch: String,
    pub running_batch: String,
    pub total_batch: String,
    pub pending_batch: String,
    pub running_long: String,
    pub pending_long: String,
}

impl Default for QuerySet {
    fn default() -> Self {
        Self {
            cpu_usage: r#"100 - (avg by (node) (rate(node_cpu_seconds_total{mode="idle"}[15s])) * 100)"#.to_string(),
            mem_usage: "100 - ((node_memory_MemAvailable_bytes / node_memory_MemTotal_bytes) * 100)".to_string(),
            gpu_usage: "sum by (node) (DCGM_FI_DEV_GPU_UTIL)".to_string(),
            gpu_temp: "sum by (node) (DCGM_FI_DEV_GPU_TEMP)".to_string(),
            completed_batch: r#"sum(kube_pod_status_phase{phase="Succeeded",namespace="batch-job"})"#.to_string(),
            running_batch: r#"sum(kube_pod_status_phase{phase="Running",namespace="batch-job"})"#.to_string(),
            total_batch: r#"count by (created_by_name) (kube_pod_info{namespace="batch-job"})"#.to_string(),
            pending_batch: r#"sum(kube_pod_status_phase{phase="Pending", namespace="batch-job"})"#.to_string(),
            running_long: r#"sum(kube_pod_status_phase{phase="Running", namespace="gpu-job"})"#.to_string(),
            pending_long: r#"sum(kube_pod_status_phase{phase="Pending", namespace="gpu-job"})"#.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    data: QueryData,
}

#[derive(Debug, Deserialize)]
struct QueryData {
    result: Vec<VectorSample>,
}

#[derive(Debug, Deserialize)]
struct VectorSample {
    #[serde(default)]
    metric: HashMap<String, String>,
    /// `[unix_ts, "value"]`
    value: (f64, String),
}

impl VectorSample {
    fn parse_value(&self) -> Result<f64> {
        self.value.1.parse::<f64>().map_err(|_| {
            CollaboratorError::data_shape(format!("non-numeric sample value {:?}", self.value.1))
        })
    }
}

/// Metrics provider backed by the Prometheus HTTP API
pub struct PrometheusProvider {
    client: Client,
    query_url: Url,
    queries: QuerySet,
}

impl PrometheusProvider {
    /// Create a provider for the given `/api/v1/query` endpoint
    pub fn new(query_url: &str) -> anyhow::Result<Self> {
        Self::with_queries(query_url, QuerySet::default())
    }

    pub fn with_queries(query_url: &str, queries: QuerySet) -> anyhow::Result<Self> {
        use anyhow::Context;

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;
        let query_url = Url::parse(query_url).context("Invalid Prometheus URL")?;

        Ok(Self {
            client,
            query_url,
            queries,
        })
    }

    /// Run one instant query and return its result vector
    async fn query(&self, promql: &str) -> Result<Vec<VectorSample>> {
        let response = self
            .client
            .get(self.query_url.clone())
            .query(&[("query", promql)])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(CollaboratorError::Status { status, body });
        }

        let parsed: QueryResponse = response.json().await?;
        Ok(parsed.data.result)
    }

    /// Per-node values keyed by the `node` label
    async fn per_node(&self, promql: &str) -> Result<HashMap<String, f64>> {
        let mut values = HashMap::new();
        for sample in self.query(promql).await? {
            let node = sample.metric.get("node").cloned().ok_or_else(|| {
                CollaboratorError::data_shape("series without a node label")
            })?;
            values.insert(node, round2(sample.parse_value()?));
        }
        Ok(values)
    }

    /// First scalar of a counting query, 0 when no series is returned
    async fn count(&self, promql: &str) -> Result<u64> {
        match self.query(promql).await?.first() {
            Some(sample) => Ok(sample.parse_value()?.max(0.0) as u64),
            None => Ok(0),
        }
    }
}

#[async_trait]
impl MetricsProvider for PrometheusProvider {
    async fn snapshot(&self) -> Result<ClusterSnapshot> {
        let q = &self.queries;

        let cpu = self.per_node(&q.cpu_usage).await?;
        let active_nodes = ClusterState::from_reporting(cpu.keys().map(String::as_str));
        debug!(active_nodes = %active_nodes, "Queried CPU utilization");

        let mem = self.per_node(&q.mem_usage).await?;
        let gpu_usage = self.per_node(&q.gpu_usage).await?;
        let gpu_temp = self.per_node(&q.gpu_temp).await?;

        let jobs = JobCounts {
            completed_batch: self.count(&q.completed_batch).await?,
            running_batch: self.count(&q.running_batch).await?,
            pending_batch: self.count(&q.pending_batch).await?,
            total_batch: self.count(&q.total_batch).await?,
            running_long: self.count(&q.running_long).await?,
            pending_long: self.count(&q.pending_long).await?,
        };

        Ok(ClusterSnapshot {
            active_nodes,
            cpu_usage: by_node(&cpu, CLUSTER_NODES),
            mem_usage: by_node(&mem, CLUSTER_NODES),
            gpu_usage: by_node(&gpu_usage, GPU_NODES),
            gpu_temp: by_node(&gpu_temp, GPU_NODES),
            jobs,
        })
    }
}

/// Lay out values in node order, `MISSING` for absent nodes
fn by_node<const N: usize>(values: &HashMap<String, f64>, nodes: [&str; N]) -> [f64; N] {
    nodes.map(|node| values.get(node).copied().unwrap_or(MISSING))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
