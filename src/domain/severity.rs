//! Health tier from time since a VM was last reachable.

use std::fmt;

use async_graphql::Enum;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::status::{HistoryIndex, LinkStatus};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Enum,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Healthy,
    Warning,
    Sensitive,
    Hazardous,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Healthy => "healthy",
            Self::Warning => "warning",
            Self::Sensitive => "sensitive",
            Self::Hazardous => "hazardous",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "healthy" => Ok(Self::Healthy),
            "warning" => Ok(Self::Warning),
            "sensitive" => Ok(Self::Sensitive),
            "hazardous" => Ok(Self::Hazardous),
            other => Err(format!("unknown severity '{other}'")),
        }
    }
}

/// Day thresholds separating the unhealthy tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityThresholds {
    pub warning_days: i64,
    pub sensitive_days: i64,
}

impl Default for SeverityThresholds {
    fn default() -> Self {
        Self {
            warning_days: 1,
            sensitive_days: 3,
        }
    }
}

impl SeverityThresholds {
    /// Tier for a VM that is down, given when it was last reachable.
    pub fn classify_down(
        &self,
        last_reachable: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Severity {
        let Some(at) = last_reachable else {
            return Severity::Hazardous;
        };
        let elapsed = now.signed_duration_since(at);
        if elapsed <= Duration::days(self.warning_days) {
            Severity::Warning
        } else if elapsed <= Duration::days(self.sensitive_days) {
            Severity::Sensitive
        } else {
            Severity::Hazardous
        }
    }
}

/// Severity of one VM from its status history.
///
/// A VM with no history at all is treated as healthy: there is nothing to be
/// alarmed about yet. A VM whose newest sample is down and which was never
/// reachable is hazardous.
pub fn severity(
    history: &HistoryIndex<'_>,
    ip: &str,
    vm_name: &str,
    thresholds: &SeverityThresholds,
    now: DateTime<Utc>,
) -> Severity {
    let Some(latest) = history.latest(ip, vm_name) else {
        return Severity::Healthy;
    };
    if latest.current_status == LinkStatus::Reachable {
        return Severity::Healthy;
    }
    let last_reachable = history.last_reachable(ip, vm_name).map(|t| t.current_time);
    thresholds.classify_down(last_reachable, now)
}
