//! Read-only reports over the grouped backup indexes.

use std::collections::{BTreeMap, BTreeSet};

use async_graphql::SimpleObject;
use chrono::{Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::backup::{BackupFlags, BackupKind};
use super::grouping::{DailyIndex, DayBucket, MonthlyIndex, VmMonthRow};
use super::timestamp::parse_month_key;

/// Totals across every date in the daily index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, SimpleObject)]
pub struct OverallStats {
    pub total_dates: usize,
    /// Backup files seen (back-filled placeholders contribute none).
    pub total_backups: usize,
    /// Files flagged as full backups.
    pub full_backups: usize,
}

pub fn overall_stats(index: &DailyIndex) -> OverallStats {
    let mut stats = OverallStats {
        total_dates: index.dates.len(),
        ..OverallStats::default()
    };
    for vm in index.dates.values().flat_map(|g| g.values()).flatten() {
        stats.total_backups += vm.bucket.files.len();
        stats.full_backups += vm
            .bucket
            .files
            .iter()
            .filter(|f| f.flags.full_backup)
            .count();
    }
    stats
}

/// Counts for one date. VM counts, not file counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, SimpleObject)]
pub struct DateStats {
    pub total_groups: usize,
    pub total_vms: usize,
    pub full_backups: usize,
    pub incremental_backups: usize,
    pub metadata_files: usize,
}

pub fn date_stats(index: &DailyIndex, date: NaiveDate) -> DateStats {
    let Some(groups) = index.dates.get(&date) else {
        return DateStats::default();
    };
    let mut stats = DateStats {
        total_groups: groups.len(),
        ..DateStats::default()
    };
    for vm in groups.values().flatten() {
        stats.total_vms += 1;
        stats.full_backups += usize::from(vm.bucket.flags.full_backup);
        stats.incremental_backups += usize::from(vm.bucket.flags.incremental_backup);
        stats.metadata_files += usize::from(vm.bucket.flags.metadata);
    }
    stats
}

/// Per-group counts for the month calendar header.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, SimpleObject)]
pub struct GroupMonthStats {
    pub group: String,
    pub total_vms: usize,
    pub incremental: usize,
    pub full: usize,
    pub metadata: usize,
    /// VMs with metadata but no full/incremental backup inside the recent window.
    pub failed: usize,
}

pub fn group_month_stats(
    index: &MonthlyIndex,
    month: &str,
    today: NaiveDate,
    recent_window_days: i64,
) -> Vec<GroupMonthStats> {
    let Some(groups) = index.months.get(month) else {
        return Vec::new();
    };
    let window = RecentWindow::new(today, recent_window_days);

    groups
        .iter()
        .map(|(group, vms)| {
            let mut stats = GroupMonthStats {
                group: group.clone(),
                total_vms: vms.len(),
                ..GroupMonthStats::default()
            };
            for vm in vms {
                let flags = vm.month_flags();
                let recent = has_recent_data_backup(month, vm, &window);
                stats.incremental += usize::from(flags.incremental_backup);
                stats.full += usize::from(flags.full_backup);
                stats.metadata += usize::from(flags.metadata);
                if flags.metadata && !recent {
                    stats.failed += 1;
                }
            }
            stats
        })
        .collect()
}

/// Calendar cell for one VM on one day of the month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DayCell {
    /// No bucket for that day.
    NoData,
    /// A bucket exists but carries no flag.
    NoBackup,
    Backed {
        full: bool,
        incremental: bool,
        metadata: bool,
    },
}

impl DayCell {
    pub fn of(bucket: Option<&DayBucket>) -> Self {
        match bucket {
            None => Self::NoData,
            Some(b) if b.flags.is_empty() => Self::NoBackup,
            Some(b) => Self::Backed {
                full: b.flags.full_backup,
                incremental: b.flags.incremental_backup,
                metadata: b.flags.metadata,
            },
        }
    }
}

/// All 31 cells for a VM row. Days past the end of a short month are `NoData`.
pub fn month_cells(row: &VmMonthRow) -> Vec<DayCell> {
    (1..=31).map(|day| DayCell::of(row.days.get(&day))).collect()
}

/// Working vs stopped classification of one VM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, SimpleObject)]
pub struct VmBackupStatus {
    pub unique_name: String,
    pub group: String,
    pub last_backup_date: Option<NaiveDate>,
    pub last_backup_type: Option<BackupKind>,
    /// Days with a bucket in the selected month.
    pub total_backups: usize,
    pub has_full_backup: bool,
    pub has_incremental_backup: bool,
    pub has_metadata: bool,
}

/// Working/stopped split for a month, keyed by group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupStatusSummary {
    pub month: String,
    pub working: BTreeMap<String, Vec<VmBackupStatus>>,
    pub stopped: BTreeMap<String, Vec<VmBackupStatus>>,
}

impl BackupStatusSummary {
    pub fn total_working(&self) -> usize {
        self.working.values().map(Vec::len).sum()
    }

    pub fn total_stopped(&self) -> usize {
        self.stopped.values().map(Vec::len).sum()
    }
}

/// Split the VMs of `month` into working (a full or incremental backup inside
/// the recent window) and stopped. A stopped VM's last backup is looked up
/// across every month of the index, not just the selected one.
pub fn backup_status_summary(
    index: &MonthlyIndex,
    month: &str,
    today: NaiveDate,
    recent_window_days: i64,
) -> BackupStatusSummary {
    let mut summary = BackupStatusSummary {
        month: month.to_string(),
        ..BackupStatusSummary::default()
    };
    let Some(groups) = index.months.get(month) else {
        return summary;
    };
    let window = RecentWindow::new(today, recent_window_days);

    for (group, vms) in groups {
        for vm in vms {
            let flags = vm.month_flags();
            let mut status = VmBackupStatus {
                unique_name: vm.unique_name.clone(),
                group: group.clone(),
                last_backup_date: None,
                last_backup_type: None,
                total_backups: vm.days.len(),
                has_full_backup: flags.full_backup,
                has_incremental_backup: flags.incremental_backup,
                has_metadata: flags.metadata,
            };

            if has_recent_data_backup(month, vm, &window) {
                if let Some((date, kind)) = last_data_backup(month, vm) {
                    status.last_backup_date = Some(date);
                    status.last_backup_type = Some(kind);
                }
                summary.working.entry(group.clone()).or_default().push(status);
            } else {
                if let Some((date, kind)) = latest_data_backup_anywhere(index, group, &vm.unique_name) {
                    status.last_backup_date = Some(date);
                    status.last_backup_type = Some(kind);
                }
                summary.stopped.entry(group.clone()).or_default().push(status);
            }
        }
    }

    summary
}

/// A group and the VM identities it has catalog metadata for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, SimpleObject)]
pub struct GroupOverview {
    pub name: String,
    pub vms: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, SimpleObject)]
pub struct GroupsOverview {
    pub groups: Vec<GroupOverview>,
    pub total_vms: usize,
    pub average_vms_per_group: f64,
}

/// Every group with the sorted, de-duplicated identities of VMs that have at
/// least one metadata file anywhere in the index.
pub fn groups_overview(index: &DailyIndex) -> GroupsOverview {
    let mut map: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for groups in index.dates.values() {
        for (group, vms) in groups {
            for vm in vms {
                if vm.bucket.files.iter().any(|f| f.flags.metadata) {
                    map.entry(group.as_str())
                        .or_default()
                        .insert(vm.unique_name.as_str());
                }
            }
        }
    }

    let groups: Vec<GroupOverview> = map
        .into_iter()
        .map(|(name, vms)| GroupOverview {
            name: name.to_string(),
            vms: vms.into_iter().map(str::to_string).collect(),
        })
        .collect();
    let total_vms: usize = groups.iter().map(|g| g.vms.len()).sum();
    let average_vms_per_group = if groups.is_empty() {
        0.0
    } else {
        (total_vms as f64 / groups.len() as f64).round()
    };

    GroupsOverview {
        groups,
        total_vms,
        average_vms_per_group,
    }
}

/// `[today - days, today]`, inclusive.
struct RecentWindow {
    start: NaiveDate,
    end: NaiveDate,
}

impl RecentWindow {
    fn new(today: NaiveDate, days: i64) -> Self {
        Self {
            start: today - Duration::days(days),
            end: today,
        }
    }

    fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

/// Today's date in UTC, for callers that do not pin the clock.
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

fn day_date(month: &str, day: u32) -> Option<NaiveDate> {
    parse_month_key(month)?.with_day0(day.checked_sub(1)?)
}

fn data_backup_days<'a>(
    month: &'a str,
    vm: &'a VmMonthRow,
) -> impl Iterator<Item = (NaiveDate, BackupFlags)> + 'a {
    vm.days.iter().filter_map(move |(day, bucket)| {
        if !bucket.flags.has_data_backup() {
            return None;
        }
        Some((day_date(month, *day)?, bucket.flags))
    })
}

fn has_recent_data_backup(month: &str, vm: &VmMonthRow, window: &RecentWindow) -> bool {
    data_backup_days(month, vm).any(|(date, _)| window.contains(date))
}

fn last_data_backup(month: &str, vm: &VmMonthRow) -> Option<(NaiveDate, BackupKind)> {
    data_backup_days(month, vm)
        .max_by_key(|(date, _)| *date)
        .and_then(|(date, flags)| BackupKind::of(flags).map(|kind| (date, kind)))
}

fn latest_data_backup_anywhere(
    index: &MonthlyIndex,
    group: &str,
    unique_name: &str,
) -> Option<(NaiveDate, BackupKind)> {
    index
        .months
        .iter()
        .filter_map(|(month, groups)| {
            let vm = groups.get(group)?.iter().find(|v| v.unique_name == unique_name)?;
            last_data_backup(month, vm)
        })
        .max_by_key(|(date, _)| *date)
}
