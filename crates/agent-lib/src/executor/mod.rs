//! Power transitions for the managed nodes
//!
//! A transition is a scheduler step followed, after a settle delay, by an
//! out-of-band chassis power command:
//! - power on: uncordon, wait, `chassis power on`
//! - power off: drain, wait, `chassis power off`
//!
//! The uncordon happens while the node is still powered off. The scheduler
//! is expected to accept a schedulable-but-unreachable node until it boots.

mod ipmi;
mod scheduler;

pub use ipmi::{BmcCredentials, IpmiConfig, IpmiExecutor};
pub use scheduler::SchedulerClient;

use crate::error::Result;
use crate::models::ActionCode;

pub use async_trait::async_trait;

/// Carries out a power transition chosen by the decision engine
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    /// Execute `action`; `NoOp` returns immediately
    async fn execute(&self, action: ActionCode) -> Result<()>;
}
