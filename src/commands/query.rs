//! `vmwatch query`: query a vmwatch daemon via its REST API.

use anyhow::Result;
use chrono::NaiveDate;
use clap::Subcommand;

use super::output::print_output;
use crate::client::VmwatchClient;
use crate::config;
use crate::domain::filter::{OnlineFilter, VmFilter};
use crate::domain::severity::Severity;

#[derive(Subcommand)]
pub enum QueryCommands {
    /// Daemon health and snapshot freshness
    Health,
    /// The full current snapshot
    Snapshot,
    /// Trigger a full refresh and print the new snapshot
    Refresh,
    /// Daily backup view
    Daily {
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Monthly backup view
    Monthly {
        #[arg(long)]
        month: Option<String>,
    },
    /// Backup statistics
    BackupStats {
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        month: Option<String>,
    },
    /// Working vs stopped VMs
    BackupSummary {
        #[arg(long)]
        month: Option<String>,
    },
    /// Backup groups overview
    BackupGroups,
    /// Filtered VM rows
    Vms {
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        project: Option<String>,
        #[arg(long, default_value = "all")]
        online: OnlineFilter,
        #[arg(long)]
        severity: Option<Severity>,
    },
    /// Reachability counts
    VmStats,
    /// Transition history for a day
    History {
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        change: Option<String>,
    },
    /// Distinct project names
    Projects,
    /// Ping one address through the daemon
    Ping { ip: String },
    /// Ping every inventory VM through the daemon
    Sweep,
}

pub fn run(
    config_path: Option<&str>,
    node: Option<&str>,
    format: &str,
    command: &QueryCommands,
) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run_async(config_path, node, format, command))
}

async fn run_async(
    config_path: Option<&str>,
    node: Option<&str>,
    format: &str,
    command: &QueryCommands,
) -> Result<()> {
    let cfg = config::load(config_path)?;
    let client = VmwatchClient::from_node(node, &cfg.nodes)?;

    match command {
        QueryCommands::Health => print_output(format, &client.health().await?),
        QueryCommands::Snapshot => print_output(format, &client.snapshot().await?),
        QueryCommands::Refresh => print_output(format, &client.refresh().await?),
        QueryCommands::Daily { date } => {
            let date = date.map(|d| d.to_string());
            print_output(format, &client.daily(date.as_deref()).await?)
        }
        QueryCommands::Monthly { month } => {
            print_output(format, &client.monthly(month.as_deref()).await?)
        }
        QueryCommands::BackupStats { date, month } => {
            let date = date.map(|d| d.to_string());
            let data = client
                .backup_stats(date.as_deref(), month.as_deref())
                .await?;
            print_output(format, &data)
        }
        QueryCommands::BackupSummary { month } => {
            print_output(format, &client.backup_summary(month.as_deref()).await?)
        }
        QueryCommands::BackupGroups => print_output(format, &client.backup_groups().await?),
        QueryCommands::Vms {
            search,
            project,
            online,
            severity,
        } => {
            let filter = VmFilter {
                search: search.clone(),
                project: project.clone(),
                online: *online,
                severity: *severity,
            };
            print_output(format, &client.vms(&filter).await?)
        }
        QueryCommands::VmStats => print_output(format, &client.vm_stats().await?),
        QueryCommands::History { date, change } => {
            let date = date.map(|d| d.to_string());
            let data = client.history(date.as_deref(), change.as_deref()).await?;
            print_output(format, &data)
        }
        QueryCommands::Projects => print_output(format, &client.projects().await?),
        QueryCommands::Ping { ip } => print_output(format, &client.ping(ip).await?),
        QueryCommands::Sweep => print_output(format, &client.sweep().await?),
    }
}
