//! Append-only CSV records of cluster state and power draw
//!
//! Each file gets its header row once, when it is first created; later
//! runs append to the existing file.

use crate::error::Result;
use crate::models::ClusterSnapshot;
use chrono::{DateTime, Local, Utc};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

/// Timestamp format used in both record files
const TIMESTAMP_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

pub const STATE_HEADER: [&str; 20] = [
    "timestamp",
    "active_node_status",
    "cpu_usage_cillium1",
    "cpu_usage_cillium2",
    "cpu_usage_cillium3",
    "cpu_usage_cillium4",
    "mem_usage_cillium1",
    "mem_usage_cillium2",
    "mem_usage_cillium3",
    "mem_usage_cillium4",
    "gpu_usage_cillium3",
    "gpu_usage_cillium4",
    "gpu_temp_cillium3",
    "gpu_temp_cillium4",
    "completed_batch_job",
    "running_batch_job",
    "pending_batch_job",
    "total_batch_job",
    "long_running_job",
    "pending_long_running_job",
];

pub const POWER_HEADER: [&str; 2] = ["timestamp", "power_usage"];

/// Sink for per-cycle records
pub trait Recorder: Send + Sync {
    fn record_snapshot(&self, at: DateTime<Utc>, snapshot: &ClusterSnapshot) -> Result<()>;

    fn record_power(&self, at: DateTime<Utc>, watts: f64) -> Result<()>;
}

/// Recorder writing `state.csv` and `power_estimation.csv` into a directory
#[derive(Debug, Clone)]
pub struct CsvRecorder {
    state_path: PathBuf,
    power_path: PathBuf,
}

impl CsvRecorder {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            state_path: dir.join("state.csv"),
            power_path: dir.join("power_estimation.csv"),
        }
    }

    /// Create the record directory if needed
    pub fn ensure_dir(&self) -> Result<()> {
        if let Some(parent) = self.state_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    pub fn power_path(&self) -> &Path {
        &self.power_path
    }
}

impl Recorder for CsvRecorder {
    fn record_snapshot(&self, at: DateTime<Utc>, snapshot: &ClusterSnapshot) -> Result<()> {
        append_row(&self.state_path, &STATE_HEADER, &state_row(at, snapshot))
    }

    fn record_power(&self, at: DateTime<Utc>, watts: f64) -> Result<()> {
        append_row(
            &self.power_path,
            &POWER_HEADER,
            &[format_timestamp(at), watts.to_string()],
        )
    }
}

fn append_row(path: &Path, header: &[&str], row: &[String]) -> Result<()> {
    let exists = path.exists();
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut writer = csv::Writer::from_writer(file);

    if !exists {
        writer.write_record(header)?;
    }
    writer.write_record(row)?;
    writer.flush()?;
    Ok(())
}

fn state_row(at: DateTime<Utc>, snapshot: &ClusterSnapshot) -> Vec<String> {
    let jobs = &snapshot.jobs;
    let mut row = Vec::with_capacity(STATE_HEADER.len());

    row.push(format_timestamp(at));
    row.push(snapshot.active_nodes.bits().to_string());
    row.extend(snapshot.cpu_usage.iter().map(f64::to_string));
    row.extend(snapshot.mem_usage.iter().map(f64::to_string));
    row.extend(snapshot.gpu_usage.iter().map(f64::to_string));
    row.extend(snapshot.gpu_temp.iter().map(f64::to_string));
    row.extend(
        [
            jobs.completed_batch,
            jobs.running_batch,
            jobs.pending_batch,
            jobs.total_batch,
            jobs.running_long,
            jobs.pending_long,
        ]
        .iter()
        .map(u64::to_string),
    );
    row
}

fn format_timestamp(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format(TIMESTAMP_FORMAT).to_string()
}
