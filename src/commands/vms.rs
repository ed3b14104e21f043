//! `vmwatch vms`: the reconciled VM view with status and severity.

use anyhow::Result;
use chrono::Utc;
use colored::Colorize;

use super::output::{cell, init_tracing, is_json, print_output};
use super::source::{load_snapshot, warn_source_errors};
use crate::config;
use crate::domain::filter::{OnlineFilter, VmFilter};
use crate::domain::reconcile::projects;
use crate::domain::severity::Severity;
use crate::domain::views;

#[derive(clap::Args)]
pub struct VmsArgs {
    /// Case-insensitive match on IP or VM name
    #[arg(long)]
    pub search: Option<String>,
    /// Exact project name
    #[arg(long)]
    pub project: Option<String>,
    /// all, online or offline
    #[arg(long, default_value = "all")]
    pub online: OnlineFilter,
    /// healthy, warning, sensitive or hazardous
    #[arg(long)]
    pub severity: Option<Severity>,
    /// Only print the reachability counts
    #[arg(long)]
    pub stats: bool,
    /// Only print the distinct project names
    #[arg(long, conflicts_with = "stats")]
    pub projects: bool,
}

pub fn run(config_path: Option<&str>, format: &str, direct: bool, args: &VmsArgs) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async { run_async(config_path, format, direct, args).await })
}

async fn run_async(
    config_path: Option<&str>,
    format: &str,
    direct: bool,
    args: &VmsArgs,
) -> Result<()> {
    let cfg = config::load(config_path)?;
    init_tracing("warn");
    let snapshot = load_snapshot(&cfg, direct).await?;
    warn_source_errors(&snapshot);

    if args.projects {
        return print_output(format, &projects(&snapshot.vms));
    }

    let filter = VmFilter {
        search: args.search.clone(),
        project: args.project.clone(),
        online: args.online,
        severity: args.severity,
    };
    let list = views::vm_list(&snapshot, &filter, &cfg.monitor_settings(), Utc::now());

    if args.stats {
        return print_output(format, &list.stats);
    }
    if is_json(format) {
        return print_output(format, &list);
    }

    println!(
        "{} {} {} {} {} {}",
        cell("IP", 16).bold(),
        cell("VM", 28).bold(),
        cell("PROJECT", 18).bold(),
        cell("CLUSTER", 14).bold(),
        cell("STATUS", 14).bold(),
        "SEVERITY".bold()
    );
    for row in &list.vms {
        let status = cell(row.latest_status.as_str(), 14);
        let status = if row.latest_status.is_reachable() {
            status.green()
        } else {
            status.red()
        };
        let severity = match row.severity {
            Severity::Healthy => row.severity.to_string().green(),
            Severity::Warning => row.severity.to_string().yellow(),
            Severity::Sensitive => row.severity.to_string().magenta(),
            Severity::Hazardous => row.severity.to_string().red().bold(),
        };
        println!(
            "{} {} {} {} {} {}",
            cell(&row.vm.ip, 16),
            cell(&row.vm.vm_name, 28),
            cell(&row.vm.project, 18),
            cell(&row.vm.cluster, 14),
            status,
            severity
        );
    }
    println!();
    println!(
        "  {} {}  {} {}  {} {}",
        "Total:".dimmed(),
        list.stats.total,
        "Reachable:".dimmed(),
        list.stats.reachable.to_string().green(),
        "Unreachable:".dimmed(),
        list.stats.unreachable.to_string().red()
    );
    Ok(())
}
