//! `vmwatch sweep`: ping every inventory VM and report the outcomes.

use anyhow::{Context, Result};
use colored::Colorize;
use tracing::info;

use super::output::{cell, init_tracing, is_json, print_output};
use crate::config;
use crate::domain::filter::SweepFilter;
use crate::domain::ping::{PingOutcome, SweepSummary};
use crate::domain::types::SweepReport;
use crate::upstream::{Sources, UpstreamClient};

#[derive(clap::Args)]
pub struct SweepArgs {
    /// Case-insensitive match on IP or VM name
    #[arg(long)]
    pub search: Option<String>,
    /// Exact project name
    #[arg(long)]
    pub project: Option<String>,
    /// reachable, unreachable or failed
    #[arg(long)]
    pub outcome: Option<PingOutcome>,
}

pub fn run(config_path: Option<&str>, format: &str, args: &SweepArgs) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async { run_async(config_path, format, args).await })
}

async fn run_async(config_path: Option<&str>, format: &str, args: &SweepArgs) -> Result<()> {
    let cfg = config::load(config_path)?;
    init_tracing("warn");
    let upstream = UpstreamClient::new(&cfg.upstream)?;
    let inventory = upstream
        .master()
        .await
        .context("fetching VM inventory")?;
    info!(vms = inventory.len(), "sweeping inventory");

    let checks = upstream.sweep(inventory).await;
    let summary = SweepSummary::of(&checks);
    let filter = SweepFilter {
        search: args.search.clone(),
        project: args.project.clone(),
        outcome: args.outcome,
    };
    let checks = filter.apply(&checks).into_iter().cloned().collect();
    let report = SweepReport { summary, checks };

    if is_json(format) {
        return print_output(format, &report);
    }

    for check in &report.checks {
        let outcome = match check.outcome() {
            PingOutcome::Reachable => "reachable".green(),
            PingOutcome::Unreachable => "unreachable".red(),
            PingOutcome::Failed => "failed".yellow(),
        };
        println!(
            "{} {} {} {} {}",
            cell(&check.ip, 16),
            cell(&check.vm_name, 28),
            cell(&check.project, 18),
            outcome,
            check.error.as_deref().unwrap_or_default().dimmed()
        );
    }
    println!();
    println!(
        "  {} {}  {} {}  {} {}  {} {}",
        "Checked:".dimmed(),
        report.summary.total,
        "Reachable:".dimmed(),
        report.summary.reachable.to_string().green(),
        "Unreachable:".dimmed(),
        report.summary.unreachable.to_string().red(),
        "Failed:".dimmed(),
        report.summary.failed.to_string().yellow()
    );
    Ok(())
}
