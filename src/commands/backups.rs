//! `vmwatch backups`: daily, monthly and status views over the backup inventory.

use anyhow::{bail, Result};
use chrono::NaiveDate;
use clap::Subcommand;
use colored::Colorize;

use super::output::{cell, init_tracing, is_json, print_output};
use super::source::{load_snapshot, warn_source_errors};
use crate::config;
use crate::domain::backup::BackupTag;
use crate::domain::backup_report::{backup_status_summary, groups_overview, today, DayCell, VmBackupStatus};
use crate::domain::types::{DailyView, MonthlyView};
use crate::domain::views;

#[derive(Subcommand)]
pub enum BackupsCommands {
    /// Per-VM backup activity on one date, grouped by backup job
    Daily {
        /// Date to show (YYYY-MM-DD, default: newest)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Month calendar of backup activity per VM
    Monthly {
        /// Month to show (YYYY-MM, default: newest)
        #[arg(long)]
        month: Option<String>,
    },
    /// Working vs stopped VMs for a month
    Summary {
        #[arg(long)]
        month: Option<String>,
    },
    /// VMs with catalog metadata, per backup job
    Groups,
    /// Overall, per-date and per-group counts
    Stats {
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        month: Option<String>,
    },
}

pub fn run(
    config_path: Option<&str>,
    format: &str,
    direct: bool,
    command: &BackupsCommands,
) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async { run_async(config_path, format, direct, command).await })
}

async fn run_async(
    config_path: Option<&str>,
    format: &str,
    direct: bool,
    command: &BackupsCommands,
) -> Result<()> {
    let cfg = config::load(config_path)?;
    init_tracing("warn");
    let snapshot = load_snapshot(&cfg, direct).await?;
    warn_source_errors(&snapshot);
    let settings = cfg.monitor_settings();

    match command {
        BackupsCommands::Daily { date } => {
            let view = views::daily_view(&snapshot, *date);
            if is_json(format) {
                return print_output(format, &view);
            }
            print_daily(&view);
        }
        BackupsCommands::Monthly { month } => {
            let view = views::monthly_view(&snapshot, month.as_deref(), today(), &settings);
            if is_json(format) {
                return print_output(format, &view);
            }
            print_monthly(&view);
        }
        BackupsCommands::Summary { month } => {
            let Some(month) = month
                .clone()
                .or_else(|| snapshot.monthly.latest_month().map(str::to_string))
            else {
                bail!("no backup months available");
            };
            let summary = backup_status_summary(
                &snapshot.monthly,
                &month,
                today(),
                settings.recent_window_days,
            );
            if is_json(format) {
                return print_output(format, &summary);
            }
            println!("{}", format!("═══ Backup Status: {} ═══", summary.month).cyan().bold());
            println!(
                "  {} {}   {} {}",
                "Working:".dimmed(),
                summary.total_working().to_string().green(),
                "Stopped:".dimmed(),
                summary.total_stopped().to_string().red()
            );
            println!();
            println!("{}", "── Working ──".yellow());
            for (group, rows) in &summary.working {
                print_status_rows(group, rows);
            }
            println!();
            println!("{}", "── Stopped ──".yellow());
            for (group, rows) in &summary.stopped {
                print_status_rows(group, rows);
            }
        }
        BackupsCommands::Groups => {
            let overview = groups_overview(&snapshot.daily);
            if is_json(format) {
                return print_output(format, &overview);
            }
            println!("{}", "═══ Backup Groups ═══".cyan().bold());
            for group in &overview.groups {
                println!(
                    "{} {}",
                    group.name.bold(),
                    format!("({} VMs)", group.vms.len()).dimmed()
                );
                for vm in &group.vms {
                    println!("    {}", vm);
                }
            }
            println!();
            println!(
                "  {} {}  {} {:.1}",
                "Total VMs:".dimmed(),
                overview.total_vms,
                "Avg per group:".dimmed(),
                overview.average_vms_per_group
            );
        }
        BackupsCommands::Stats { date, month } => {
            let stats =
                views::backup_stats(&snapshot, *date, month.as_deref(), today(), &settings);
            print_output(format, &stats)?;
        }
    }
    Ok(())
}

fn print_daily(view: &DailyView) {
    let Some(date) = view.date else {
        println!("{}", "no backup data".dimmed());
        return;
    };
    println!("{}", format!("═══ Backups on {} ═══", date).cyan().bold());
    for (group, vms) in &view.groups {
        println!();
        println!("{}", format!("── {} ──", group).yellow());
        for vm in vms {
            let flags = vm.bucket.flags;
            let tag = match vm.bucket.tag() {
                BackupTag::Backed => cell("backed up", 14).green(),
                BackupTag::NoFullOrIncremental => cell("metadata only", 14).yellow(),
                BackupTag::NoBackup => cell("no backup", 14).red(),
            };
            println!(
                "  {} {} {}{}{}",
                cell(&vm.unique_name, 40),
                tag,
                if flags.full_backup { "F" } else { "-" },
                if flags.incremental_backup { "I" } else { "-" },
                if flags.metadata { "M" } else { "-" },
            );
        }
    }
    if let Some(stats) = &view.stats {
        println!();
        println!(
            "  {} {}  {} {}  {} {}  {} {}",
            "VMs:".dimmed(),
            stats.total_vms,
            "Full:".dimmed(),
            stats.full_backups,
            "Incremental:".dimmed(),
            stats.incremental_backups,
            "Metadata:".dimmed(),
            stats.metadata_files
        );
    }
}

fn print_monthly(view: &MonthlyView) {
    let Some(month) = &view.month else {
        println!("{}", "no backup data".dimmed());
        return;
    };
    println!("{}", format!("═══ Backups in {} ═══", month).cyan().bold());
    let header: String = (1..=31).map(|d| format!("{}", d % 10)).collect();
    for (group, rows) in &view.groups {
        println!();
        println!("{}", format!("── {} ──", group).yellow());
        println!("  {} {}", cell("", 40), header.dimmed());
        for row in rows {
            let days: String = row.cells.iter().map(|c| render_day(*c).to_string()).collect();
            println!("  {} {}", cell(&row.unique_name, 40), days);
        }
    }
    if !view.stats.is_empty() {
        println!();
        for stats in &view.stats {
            println!(
                "  {} {} VMs, {} full, {} incremental, {} metadata, {} failed",
                cell(&stats.group, 30).bold(),
                stats.total_vms,
                stats.full,
                stats.incremental,
                stats.metadata,
                if stats.failed > 0 {
                    stats.failed.to_string().red()
                } else {
                    stats.failed.to_string().green()
                }
            );
        }
    }
}

fn render_day(cell: DayCell) -> colored::ColoredString {
    match cell {
        DayCell::NoData => " ".normal(),
        DayCell::NoBackup => "·".red(),
        DayCell::Backed { full: true, .. } => "F".green(),
        DayCell::Backed {
            incremental: true, ..
        } => "I".cyan(),
        DayCell::Backed { .. } => "M".yellow(),
    }
}

fn print_status_rows(group: &str, rows: &[VmBackupStatus]) {
    println!("  {}", group.bold());
    for row in rows {
        let last = match (row.last_backup_date, row.last_backup_type) {
            (Some(date), Some(kind)) => format!("{} ({:?})", date, kind),
            _ => "never".to_string(),
        };
        println!("    {} {}", cell(&row.unique_name, 40), last.dimmed());
    }
}
