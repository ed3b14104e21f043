//! `vmwatch history`: status transitions of one day, by hour or as a grid.

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use colored::Colorize;

use super::output::{cell, init_tracing, is_json, print_output};
use super::source::{load_snapshot, warn_source_errors};
use crate::config;
use crate::domain::filter::{OnlineFilter, VmFilter};
use crate::domain::severity::Severity;
use crate::domain::status::{HalfDay, StatusChange};
use crate::domain::types::GridRow;
use crate::domain::views;

#[derive(clap::Args)]
pub struct HistoryArgs {
    /// Day to show (YYYY-MM-DD, default: newest day with history)
    #[arg(long)]
    pub date: Option<NaiveDate>,
    /// Case-insensitive match on IP or VM name
    #[arg(long)]
    pub search: Option<String>,
    /// Keep one status change: new, no-change, still-down, came-back, went-down, changed
    #[arg(long)]
    pub change: Option<StatusChange>,
    /// Show the hour-by-hour grid instead of the transition list
    #[arg(long)]
    pub grid: bool,
    /// Grid half of the day (AM or PM, default: whole day)
    #[arg(long, requires = "grid")]
    pub half: Option<HalfDay>,
    /// Grid rows: exact project name
    #[arg(long, requires = "grid")]
    pub project: Option<String>,
    /// Grid rows: all, online or offline
    #[arg(long, default_value = "all")]
    pub online: OnlineFilter,
    /// Grid rows: healthy, warning, sensitive or hazardous
    #[arg(long, requires = "grid")]
    pub severity: Option<Severity>,
}

pub fn run(config_path: Option<&str>, format: &str, direct: bool, args: &HistoryArgs) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async { run_async(config_path, format, direct, args).await })
}

async fn run_async(
    config_path: Option<&str>,
    format: &str,
    direct: bool,
    args: &HistoryArgs,
) -> Result<()> {
    let cfg = config::load(config_path)?;
    init_tracing("warn");
    let snapshot = load_snapshot(&cfg, direct).await?;
    warn_source_errors(&snapshot);

    let view = views::history_view(&snapshot, args.date, args.search.as_deref(), args.change);

    if args.grid {
        let Some(date) = view.date else {
            println!("{}", "no history".dimmed());
            return Ok(());
        };
        let filter = VmFilter {
            search: args.search.clone(),
            project: args.project.clone(),
            online: args.online,
            severity: args.severity,
        };
        let rows = views::status_grid(
            &snapshot,
            date,
            args.half,
            args.change,
            &filter,
            &cfg.monitor_settings(),
            Utc::now(),
        );
        if is_json(format) {
            return print_output(format, &rows);
        }
        println!("{}", format!("═══ Monitoring grid {} ═══", date).cyan().bold());
        print_grid(&rows);
        return Ok(());
    }

    if is_json(format) {
        return print_output(format, &view);
    }

    let Some(date) = view.date else {
        println!("{}", "no history".dimmed());
        return Ok(());
    };
    println!(
        "{} {}",
        format!("═══ History {} ═══", date).cyan().bold(),
        format!("({} transitions)", view.total).dimmed()
    );
    for block in &view.hours {
        let counts: Vec<String> = block
            .counts
            .iter()
            .map(|(tag, n)| format!("{tag}: {n}"))
            .collect();
        println!();
        println!(
            "{} {}",
            format!("── {} ──", block.hour).yellow(),
            counts.join(", ").dimmed()
        );
        for t in &block.items {
            let change = cell(t.status_change.label(), 11);
            let change = match t.status_change {
                StatusChange::WentDown | StatusChange::StillDown => change.red(),
                StatusChange::CameBack => change.green(),
                _ => change.normal(),
            };
            println!(
                "  {} {} {} {} {}",
                t.current_time.format("%H:%M:%S").to_string().dimmed(),
                cell(&t.ip, 16),
                cell(&t.vm_name, 28),
                change,
                t.current_status
            );
        }
    }
    Ok(())
}

fn print_grid(rows: &[GridRow]) {
    let Some(first) = rows.first() else {
        return;
    };
    let header: String = first.cells.iter().map(|c| format!("{:>3}", c.hour)).collect();
    println!("{} {}", cell("", 44), header.dimmed());
    for row in rows {
        let cells: String = row
            .cells
            .iter()
            .map(|c| {
                let mark = match &c.status {
                    None => "  ·".dimmed(),
                    Some(s) if s.is_reachable() => "  ●".green(),
                    Some(_) => "  ●".red(),
                };
                mark.to_string()
            })
            .collect();
        println!("{} {} {}", cell(&row.ip, 15), cell(&row.vm_name, 28), cells);
    }
}
