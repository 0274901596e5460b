//! Out-of-band power control through `ipmitool`

use super::{async_trait, ActionExecutor, SchedulerClient};
use crate::error::{CollaboratorError, Result};
use crate::models::{ActionCode, ManagedNode, PowerState};
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;
use tracing::{error, info};

/// Default wait between the scheduler step and the power command
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(90);

/// BMC address and password of one node
#[derive(Debug, Clone)]
pub struct BmcCredentials {
    pub host: String,
    pub password: String,
}

/// Configuration for the IPMI executor
#[derive(Debug, Clone)]
pub struct IpmiConfig {
    /// Path or name of the `ipmitool` binary
    pub ipmitool_path: PathBuf,
    pub username: String,
    pub node_a: BmcCredentials,
    pub node_b: BmcCredentials,
    pub settle_delay: Duration,
}

impl IpmiConfig {
    fn credentials(&self, node: ManagedNode) -> &BmcCredentials {
        match node {
            ManagedNode::A => &self.node_a,
            ManagedNode::B => &self.node_b,
        }
    }
}

/// Executor that drives the cleanup service and the node BMCs
pub struct IpmiExecutor {
    scheduler: SchedulerClient,
    config: IpmiConfig,
}

impl IpmiExecutor {
    pub fn new(scheduler: SchedulerClient, config: IpmiConfig) -> Self {
        Self { scheduler, config }
    }

    /// `ipmitool` arguments for a chassis power command
    fn power_args(&self, node: ManagedNode, power: PowerState) -> Vec<String> {
        let bmc = self.config.credentials(node);
        vec![
            "-I".to_string(),
            "lanplus".to_string(),
            "-H".to_string(),
            bmc.host.clone(),
            "-U".to_string(),
            self.config.username.clone(),
            "-P".to_string(),
            bmc.password.clone(),
            "chassis".to_string(),
            "power".to_string(),
            power.as_str().to_string(),
        ]
    }

    /// Command line for logs, with the password masked
    fn redacted_command(&self, node: ManagedNode, power: PowerState) -> String {
        let mut args = self.power_args(node, power);
        if let Some(i) = args.iter().position(|a| a == "-P") {
            if let Some(password) = args.get_mut(i + 1) {
                *password = "****".to_string();
            }
        }
        format!("{} {}", self.config.ipmitool_path.display(), args.join(" "))
    }

    /// Drain or uncordon ahead of the power command
    ///
    /// The settle delay is only awaited when the scheduler call succeeded.
    async fn prepare_scheduler(&self, node: ManagedNode, power: PowerState) {
        let result = match power {
            PowerState::On => self.scheduler.uncordon(node).await,
            PowerState::Off => self.scheduler.drain(node).await,
        };
        let operation = match power {
            PowerState::On => "uncordon",
            PowerState::Off => "drain",
        };

        match result {
            Ok(response) => {
                info!(
                    node = %node,
                    operation = operation,
                    response = %response,
                    "Scheduler accepted node operation"
                );
                tokio::time::sleep(self.config.settle_delay).await;
            }
            Err(e) => {
                error!(
                    node = %node,
                    operation = operation,
                    error = %e,
                    "Scheduler node operation failed, issuing power command anyway"
                );
            }
        }
    }

    async fn power_command(&self, node: ManagedNode, power: PowerState) -> Result<()> {
        let program = self.config.ipmitool_path.display().to_string();
        info!(command = %self.redacted_command(node, power), "Running power command");

        let output = Command::new(&self.config.ipmitool_path)
            .args(self.power_args(node, power))
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

        info!(
            node = %node,
            output = %String::from_utf8_lossy(&output.stdout).trim(),
            "Power command completed"
        );
        Ok(())
    }
}

#[async_trait]
impl ActionExecutor for IpmiExecutor {
    async fn execute(&self, action: ActionCode) -> Result<()> {
        let Some((node, power)) = action.target() else {
            return Ok(());
        };

        self.prepare_scheduler(node, power).await;
        self.power_command(node, power).await
    }
}
