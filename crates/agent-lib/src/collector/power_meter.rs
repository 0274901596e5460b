//! PDU power reading via net-snmp's `snmpget`

use super::{async_trait, PowerMeter};
use crate::error::{CollaboratorError, Result};
use std::path::PathBuf;
use tokio::process::Command;
use tracing::debug;

/// Connection details for the rack PDU
#[derive(Debug, Clone)]
pub struct SnmpConfig {
    /// Path or name of the `snmpget` binary
    pub snmpget_path: PathBuf,
    pub host: String,
    pub community: String,
    /// OID of the active power object
    pub power_oid: String,
    /// Multiplier from the raw reading to watts
    pub scale: f64,
}

impl SnmpConfig {
    pub fn new(
        host: impl Into<String>,
        community: impl Into<String>,
        power_oid: impl Into<String>,
    ) -> Self {
        Self {
            snmpget_path: PathBuf::from("snmpget"),
            host: host.into(),
            community: community.into(),
            power_oid: power_oid.into(),
            // The PDU reports in tens of watts
            scale: 10.0,
        }
    }
}

/// Power meter that shells out to `snmpget` (SNMPv1)
pub struct SnmpPowerMeter {
    config: SnmpConfig,
}

impl SnmpPowerMeter {
    pub fn new(config: SnmpConfig) -> Self {
        Self { config }
    }

    fn args(&self) -> Vec<String> {
        vec![
            "-v1".to_string(),
            "-c".to_string(),
            self.config.community.clone(),
            "-Oqv".to_string(),
            self.config.host.clone(),
            self.config.power_oid.clone(),
        ]
    }
}

#[async_trait]
impl PowerMeter for SnmpPowerMeter {
    async fn read_watts(&self) -> Result<f64> {
        let program = self.config.snmpget_path.display().to_string();
        let output = Command::new(&self.config.snmpget_path)
            .args(self.args())
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => CollaboratorError::MissingTool(program.clone()),
                _ => CollaboratorError::Io(e),
            })?;

        if !output.status.success() {
            return Err(CollaboratorError::Command {
                program,
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        debug!(host = %self.config.host, raw = %stdout.trim(), "PDU reading");
        parse_reading(&stdout, self.config.scale)
    }
}

/// Parse `snmpget -Oqv` output into watts
pub fn parse_reading(raw: &str, scale: f64) -> Result<f64> {
    let value = raw.trim().trim_matches('"');
    value
        .parse::<i64>()
        .map(|v| v as f64 * scale)
        .map_err(|_| CollaboratorError::data_shape(format!("unexpected SNMP value {:?}", value)))
}
