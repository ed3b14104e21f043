//! Read-side projections of a snapshot, shared by REST, GraphQL and the CLI.

use chrono::{DateTime, NaiveDate, Utc};

use super::backup_report::{date_stats, group_month_stats, month_cells, overall_stats};
use super::filter::{FilterContext, VmFilter};
use super::monitor_service::MonitorSettings;
use super::reconcile::{fleet_stats, latest_status};
use super::severity::severity;
use super::snapshot::Snapshot;
use super::status::{
    history_by_hour, history_dates, hour_label, hourly_slots, latest_in_slot, HalfDay,
    HistoryIndex, StatusChange,
};
use super::types::{
    BackupStats, DailyView, GridCell, GridRow, HistoryView, MonthRowView, MonthlyView, VmList,
    VmRow,
};

/// Filtered VM rows with stats over the result.
pub fn vm_list(
    snapshot: &Snapshot,
    filter: &VmFilter,
    settings: &MonitorSettings,
    now: DateTime<Utc>,
) -> VmList {
    let index = HistoryIndex::new(&snapshot.history);
    let ctx = FilterContext {
        live: &snapshot.live,
        history: &index,
        thresholds: settings.thresholds,
        now,
    };
    let selected = filter.apply(&snapshot.vms, &ctx);
    let stats = fleet_stats(selected.iter().copied(), ctx.live, ctx.history);
    let vms = selected
        .into_iter()
        .map(|vm| VmRow {
            latest_status: latest_status(vm, ctx.live, ctx.history),
            severity: severity(ctx.history, &vm.ip, &vm.vm_name, &ctx.thresholds, now),
            vm: vm.clone(),
        })
        .collect();
    VmList { stats, vms }
}

/// Hour-by-hour grid for `date`, one row per VM selected by `filter`.
///
/// `filter` picks the rows the same way [`vm_list`] does. `change` only
/// narrows which transitions fill the cells; a selected VM keeps its row.
pub fn status_grid(
    snapshot: &Snapshot,
    date: NaiveDate,
    half: Option<HalfDay>,
    change: Option<StatusChange>,
    filter: &VmFilter,
    settings: &MonitorSettings,
    now: DateTime<Utc>,
) -> Vec<GridRow> {
    let index = HistoryIndex::new(&snapshot.history);
    let ctx = FilterContext {
        live: &snapshot.live,
        history: &index,
        thresholds: settings.thresholds,
        now,
    };
    let slots = hourly_slots(&snapshot.history, date, change);
    let hours: Vec<u32> = (0..24).filter(|h| half.map_or(true, |half| half.contains(*h))).collect();

    filter
        .apply(&snapshot.vms, &ctx)
        .into_iter()
        .map(|vm| {
            let row = slots.get(&(vm.ip.clone(), vm.vm_name.clone()));
            let cells = hours
                .iter()
                .map(|&hour| {
                    let slot = row.and_then(|r| r.get(&hour));
                    let newest = slot.and_then(|s| latest_in_slot(s));
                    GridCell {
                        hour,
                        label: hour_label(hour),
                        status: newest.map(|t| t.current_status.clone()),
                        status_change: newest.map(|t| t.status_change),
                        samples: slot.map_or(0, Vec::len),
                    }
                })
                .collect();
            GridRow {
                ip: vm.ip.clone(),
                vm_name: vm.vm_name.clone(),
                cells,
            }
        })
        .collect()
}

/// Overall stats, plus per-date stats for `date` (default: latest date) and
/// per-group stats for `month` (default: latest month).
pub fn backup_stats(
    snapshot: &Snapshot,
    date: Option<NaiveDate>,
    month: Option<&str>,
    today: NaiveDate,
    settings: &MonitorSettings,
) -> BackupStats {
    let date = date.or_else(|| snapshot.daily.latest_date());
    let month = month
        .map(str::to_string)
        .or_else(|| snapshot.monthly.latest_month().map(str::to_string));
    BackupStats {
        overall: overall_stats(&snapshot.daily),
        date,
        date_stats: date.map(|d| date_stats(&snapshot.daily, d)),
        groups: month
            .as_deref()
            .map(|m| group_month_stats(&snapshot.monthly, m, today, settings.recent_window_days))
            .unwrap_or_default(),
        month,
    }
}

/// The daily index at `date`, or at the newest date when unset.
pub fn daily_view(snapshot: &Snapshot, date: Option<NaiveDate>) -> DailyView {
    let date = date.or_else(|| snapshot.daily.latest_date());
    let groups = date
        .and_then(|d| snapshot.daily.dates.get(&d))
        .cloned()
        .unwrap_or_default();
    DailyView {
        dates: snapshot.daily.dates_desc(),
        date,
        groups,
        stats: date.map(|d| date_stats(&snapshot.daily, d)),
    }
}

/// The monthly index at `month`, or at the newest month when unset.
pub fn monthly_view(
    snapshot: &Snapshot,
    month: Option<&str>,
    today: NaiveDate,
    settings: &MonitorSettings,
) -> MonthlyView {
    let month = month
        .map(str::to_string)
        .or_else(|| snapshot.monthly.latest_month().map(str::to_string));
    let groups = month
        .as_deref()
        .and_then(|m| snapshot.monthly.months.get(m))
        .map(|groups| {
            groups
                .iter()
                .map(|(group, rows)| {
                    let rows = rows
                        .iter()
                        .map(|row| MonthRowView {
                            unique_name: row.unique_name.clone(),
                            cells: month_cells(row),
                            last_modified: row.last_modified,
                        })
                        .collect();
                    (group.clone(), rows)
                })
                .collect()
        })
        .unwrap_or_default();
    let stats = month
        .as_deref()
        .map(|m| group_month_stats(&snapshot.monthly, m, today, settings.recent_window_days))
        .unwrap_or_default();
    MonthlyView {
        months: snapshot.monthly.months.keys().rev().cloned().collect(),
        month,
        groups,
        stats,
    }
}

/// Transitions of `date` (default: newest date with history) by hour.
pub fn history_view(
    snapshot: &Snapshot,
    date: Option<NaiveDate>,
    search: Option<&str>,
    change: Option<StatusChange>,
) -> HistoryView {
    let dates = history_dates(&snapshot.history);
    let date = date.or_else(|| dates.first().copied());
    let hours = date
        .map(|d| history_by_hour(&snapshot.history, d, search, change))
        .unwrap_or_default();
    HistoryView {
        total: hours.iter().map(|h| h.total).sum(),
        dates,
        date,
        hours,
    }
}
