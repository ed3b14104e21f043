//! Single-IP reachability checks and inventory sweeps.

use async_graphql::{Enum, SimpleObject};
use serde::{Deserialize, Serialize};

use super::reconcile::VmMaster;
use super::wire::null_as_default;

/// Reply of the ping API for one address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, SimpleObject)]
pub struct PingReply {
    #[serde(default, deserialize_with = "null_as_default")]
    pub ip: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub reachable: bool,
}

/// Outcome of pinging one inventory entry during a sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, SimpleObject)]
pub struct PingCheck {
    pub vm_name: String,
    pub ip: String,
    pub project: String,
    /// False when the check itself failed (transport or API error).
    pub checked: bool,
    pub reachable: bool,
    pub error: Option<String>,
}

impl PingCheck {
    pub fn completed(vm: &VmMaster, reachable: bool) -> Self {
        Self {
            vm_name: vm.vm_name.clone(),
            ip: vm.ip.clone(),
            project: vm.project_name.clone(),
            checked: true,
            reachable,
            error: None,
        }
    }

    pub fn failed(vm: &VmMaster, error: impl Into<String>) -> Self {
        Self {
            vm_name: vm.vm_name.clone(),
            ip: vm.ip.clone(),
            project: vm.project_name.clone(),
            checked: false,
            reachable: false,
            error: Some(error.into()),
        }
    }

    pub fn outcome(&self) -> PingOutcome {
        match (self.checked, self.reachable) {
            (false, _) => PingOutcome::Failed,
            (true, true) => PingOutcome::Reachable,
            (true, false) => PingOutcome::Unreachable,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Enum)]
#[serde(rename_all = "lowercase")]
pub enum PingOutcome {
    Reachable,
    Unreachable,
    Failed,
}

impl std::str::FromStr for PingOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reachable" | "up" => Ok(Self::Reachable),
            "unreachable" | "down" => Ok(Self::Unreachable),
            "failed" | "error" => Ok(Self::Failed),
            other => Err(format!("unknown ping outcome '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, SimpleObject)]
pub struct SweepSummary {
    pub total: usize,
    pub reachable: usize,
    pub unreachable: usize,
    pub failed: usize,
}

impl SweepSummary {
    pub fn of(checks: &[PingCheck]) -> Self {
        let mut summary = Self {
            total: checks.len(),
            ..Self::default()
        };
        for check in checks {
            match check.outcome() {
                PingOutcome::Reachable => summary.reachable += 1,
                PingOutcome::Unreachable => summary.unreachable += 1,
                PingOutcome::Failed => summary.failed += 1,
            }
        }
        summary
    }
}
