//! Compound predicates over the reconciled view and sweep results.
//!
//! Filters borrow their input and return references to the elements that pass
//! every active predicate. Nothing is copied or mutated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ping::{PingCheck, PingOutcome};
use super::reconcile::{latest_status, LivePing, UnifiedVmView};
use super::severity::{severity, Severity, SeverityThresholds};
use super::status::HistoryIndex;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnlineFilter {
    #[default]
    All,
    Online,
    Offline,
}

impl std::str::FromStr for OnlineFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" | "" => Ok(Self::All),
            "online" | "up" => Ok(Self::Online),
            "offline" | "down" => Ok(Self::Offline),
            other => Err(format!("unknown online filter '{other}'")),
        }
    }
}

/// Predicates on the VM view. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmFilter {
    /// Case-insensitive substring of IP or VM name.
    #[serde(default)]
    pub search: Option<String>,
    /// Exact project name.
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub online: OnlineFilter,
    #[serde(default)]
    pub severity: Option<Severity>,
}

/// Inputs the derived predicates need besides the view itself.
pub struct FilterContext<'a> {
    pub live: &'a [LivePing],
    pub history: &'a HistoryIndex<'a>,
    pub thresholds: SeverityThresholds,
    pub now: DateTime<Utc>,
}

impl VmFilter {
    pub fn is_empty(&self) -> bool {
        self.search.as_deref().map_or(true, str::is_empty)
            && self.project.as_deref().map_or(true, str::is_empty)
            && self.online == OnlineFilter::All
            && self.severity.is_none()
    }

    pub fn matches(&self, vm: &UnifiedVmView, ctx: &FilterContext<'_>) -> bool {
        if let Some(needle) = self.search.as_deref().filter(|s| !s.is_empty()) {
            let needle = needle.to_lowercase();
            if !vm.ip.to_lowercase().contains(&needle)
                && !vm.vm_name.to_lowercase().contains(&needle)
            {
                return false;
            }
        }
        if let Some(project) = self.project.as_deref().filter(|p| !p.is_empty()) {
            if vm.project != project {
                return false;
            }
        }
        match self.online {
            OnlineFilter::All => {}
            OnlineFilter::Online | OnlineFilter::Offline => {
                let up = latest_status(vm, ctx.live, ctx.history).is_reachable();
                if up != (self.online == OnlineFilter::Online) {
                    return false;
                }
            }
        }
        if let Some(wanted) = self.severity {
            let got = severity(ctx.history, &vm.ip, &vm.vm_name, &ctx.thresholds, ctx.now);
            if got != wanted {
                return false;
            }
        }
        true
    }

    pub fn apply<'v>(
        &self,
        vms: impl IntoIterator<Item = &'v UnifiedVmView>,
        ctx: &FilterContext<'_>,
    ) -> Vec<&'v UnifiedVmView> {
        vms.into_iter().filter(|vm| self.matches(vm, ctx)).collect()
    }
}

/// Predicates on sweep results.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepFilter {
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub outcome: Option<PingOutcome>,
}

impl SweepFilter {
    pub fn matches(&self, check: &PingCheck) -> bool {
        if let Some(needle) = self.search.as_deref().filter(|s| !s.is_empty()) {
            let needle = needle.to_lowercase();
            if !check.ip.to_lowercase().contains(&needle)
                && !check.vm_name.to_lowercase().contains(&needle)
            {
                return false;
            }
        }
        if let Some(project) = self.project.as_deref().filter(|p| !p.is_empty()) {
            if check.project != project {
                return false;
            }
        }
        self.outcome.map_or(true, |o| check.outcome() == o)
    }

    pub fn apply<'v>(&self, checks: &'v [PingCheck]) -> Vec<&'v PingCheck> {
        checks.iter().filter(|c| self.matches(c)).collect()
    }
}
