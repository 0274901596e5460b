//! Agent configuration
//!
//! Loaded from an optional `power-agent.{toml,yaml,json}` file, then from
//! `POWER_AGENT_*` environment variables. Endpoints and credentials have no
//! defaults and must be supplied.

use agent_lib::collector::SnmpConfig;
use agent_lib::control::ControlConfig;
use agent_lib::executor::{BmcCredentials, IpmiConfig};
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Agent configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Prometheus instant-query endpoint, e.g. `http://prometheus:9090/api/v1/query`
    #[serde(default)]
    pub prometheus_url: String,

    /// Cleanup service exposing `/drain` and `/uncordon`
    #[serde(default)]
    pub cleanup_url: String,

    /// BMC address of cillium3
    #[serde(default)]
    pub bmc_node_a: String,

    /// BMC address of cillium4
    #[serde(default)]
    pub bmc_node_b: String,

    #[serde(default)]
    pub ipmi_username: String,

    #[serde(default)]
    pub ipmi_password_node_a: String,

    #[serde(default)]
    pub ipmi_password_node_b: String,

    #[serde(default = "default_ipmitool_path")]
    pub ipmitool_path: PathBuf,

    /// PDU address for power telemetry
    #[serde(default)]
    pub pdu_host: String,

    #[serde(default)]
    pub snmp_community: String,

    /// OID of the PDU power reading
    #[serde(default)]
    pub power_oid: String,

    #[serde(default = "default_snmpget_path")]
    pub snmpget_path: PathBuf,

    /// Directory holding `state.csv` and `power_estimation.csv`
    #[serde(default = "default_record_dir")]
    pub record_dir: PathBuf,

    /// API server port for health/metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Sleep between control cycles in seconds
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,

    /// Minimum time between power actions in seconds
    #[serde(default = "default_action_cooldown")]
    pub action_cooldown_secs: u64,

    /// Power meter cadence in seconds
    #[serde(default = "default_power_log_interval")]
    pub power_log_interval_secs: u64,

    /// Wait after drain/uncordon before the power command, in seconds
    #[serde(default = "default_settle_delay")]
    pub settle_delay_secs: u64,
}

fn default_ipmitool_path() -> PathBuf {
    PathBuf::from("ipmitool")
}

fn default_snmpget_path() -> PathBuf {
    PathBuf::from("snmpget")
}

fn default_record_dir() -> PathBuf {
    PathBuf::from("./record")
}

fn default_api_port() -> u16 {
    8080
}

fn default_check_interval() -> u64 {
    5
}

fn default_action_cooldown() -> u64 {
    600
}

fn default_power_log_interval() -> u64 {
    600
}

fn default_settle_delay() -> u64 {
    90
}

/// `POWER_AGENT_*` variables; values stay strings until deserialized
fn environment() -> config::Environment {
    config::Environment::with_prefix("POWER_AGENT")
}

impl AgentConfig {
    /// Load configuration from config file and environment
    pub fn load() -> Result<Self> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("power-agent").required(false))
            .add_source(environment());

        Self::from_builder(builder)
    }

    fn from_builder(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self> {
        builder
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")
    }

    /// Reject a configuration missing any endpoint or credential
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("prometheus_url", &self.prometheus_url),
            ("cleanup_url", &self.cleanup_url),
            ("bmc_node_a", &self.bmc_node_a),
            ("bmc_node_b", &self.bmc_node_b),
            ("ipmi_username", &self.ipmi_username),
            ("ipmi_password_node_a", &self.ipmi_password_node_a),
            ("ipmi_password_node_b", &self.ipmi_password_node_b),
            ("pdu_host", &self.pdu_host),
            ("snmp_community", &self.snmp_community),
            ("power_oid", &self.power_oid),
        ];

        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| *name)
            .collect();
        if !missing.is_empty() {
            bail!("Missing required configuration: {}", missing.join(", "));
        }

        if self.check_interval_secs == 0 {
            bail!("check_interval_secs must be greater than zero");
        }
        Ok(())
    }

    pub fn control_config(&self) -> ControlConfig {
        ControlConfig {
            check_interval: Duration::from_secs(self.check_interval_secs),
            action_cooldown: Duration::from_secs(self.action_cooldown_secs),
            power_log_interval: Duration::from_secs(self.power_log_interval_secs),
            ..ControlConfig::default()
        }
    }

    pub fn ipmi_config(&self) -> IpmiConfig {
        IpmiConfig {
            ipmitool_path: self.ipmitool_path.clone(),
            username: self.ipmi_username.clone(),
            node_a: BmcCredentials {
                host: self.bmc_node_a.clone(),
                password: self.ipmi_password_node_a.clone(),
            },
            node_b: BmcCredentials {
                host: self.bmc_node_b.clone(),
                password: self.ipmi_password_node_b.clone(),
            },
            settle_delay: Duration::from_secs(self.settle_delay_secs),
        }
    }

    pub fn snmp_config(&self) -> SnmpConfig {
        SnmpConfig {
            snmpget_path: self.snmpget_path.clone(),
            ..SnmpConfig::new(&self.pdu_host, &self.snmp_community, &self.power_oid)
        }
    }
}
