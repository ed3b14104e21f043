use std::collections::BTreeMap;

use async_graphql::SimpleObject;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::backup_report::{DateStats, DayCell, GroupMonthStats, OverallStats};
use super::grouping::VmBackupSummary;
use super::ping::{PingCheck, SweepSummary};
use super::reconcile::{FleetStats, UnifiedVmView};
use super::severity::Severity;
use super::snapshot::SourceError;
use super::status::{HourBlock, LinkStatus, StatusChange};

#[derive(Debug, Clone, Serialize, Deserialize, SimpleObject)]
pub struct DaemonHealth {
    pub version: String,
    pub uptime_secs: u64,
    /// False until the first snapshot is published.
    pub ready: bool,
    pub generation: Option<u64>,
    pub checksum: Option<String>,
    pub snapshot_age_secs: Option<i64>,
    pub source_errors: Vec<SourceError>,
}

/// A unified VM with its derived status and health tier.
#[derive(Debug, Clone, Serialize, Deserialize, SimpleObject)]
pub struct VmRow {
    pub vm: UnifiedVmView,
    pub latest_status: LinkStatus,
    pub severity: Severity,
}

#[derive(Debug, Clone, Serialize, Deserialize, SimpleObject)]
pub struct VmList {
    /// Computed over the filtered rows.
    pub stats: FleetStats,
    pub vms: Vec<VmRow>,
}

/// One hour of a VM's row in the monitoring grid.
#[derive(Debug, Clone, Serialize, Deserialize, SimpleObject)]
pub struct GridCell {
    pub hour: u32,
    pub label: String,
    /// Newest transition in the hour, if any.
    pub status: Option<LinkStatus>,
    pub status_change: Option<StatusChange>,
    pub samples: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, SimpleObject)]
pub struct GridRow {
    pub ip: String,
    pub vm_name: String,
    pub cells: Vec<GridCell>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupStats {
    pub overall: OverallStats,
    pub date: Option<NaiveDate>,
    pub date_stats: Option<DateStats>,
    pub month: Option<String>,
    pub groups: Vec<GroupMonthStats>,
}

#[derive(Debug, Clone, Serialize, Deserialize, SimpleObject)]
pub struct SweepReport {
    pub summary: SweepSummary,
    pub checks: Vec<PingCheck>,
}

/// One date of the daily backup index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyView {
    /// Every date present, newest first.
    pub dates: Vec<NaiveDate>,
    pub date: Option<NaiveDate>,
    pub groups: BTreeMap<String, Vec<VmBackupSummary>>,
    pub stats: Option<DateStats>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonthRowView {
    pub unique_name: String,
    /// Days 1 to 31.
    pub cells: Vec<DayCell>,
    pub last_modified: Option<DateTime<Utc>>,
}

/// One month of the monthly backup index, rendered as calendar rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonthlyView {
    pub months: Vec<String>,
    pub month: Option<String>,
    pub groups: BTreeMap<String, Vec<MonthRowView>>,
    pub stats: Vec<GroupMonthStats>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryView {
    pub dates: Vec<NaiveDate>,
    pub date: Option<NaiveDate>,
    pub total: usize,
    pub hours: Vec<HourBlock>,
}
