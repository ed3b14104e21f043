//! `vmwatch inventory`: manage VM master records in the monitoring API.

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;

use super::output::{cell, init_tracing, is_json, print_output};
use crate::config;
use crate::domain::reconcile::VmMaster;
use crate::upstream::{Sources, UpstreamClient, VmMasterInput};

/// Editable fields. On `update`, unset fields keep their current value.
#[derive(clap::Args, Debug, Default)]
pub struct VmFields {
    #[arg(long)]
    pub vm_name: Option<String>,
    #[arg(long)]
    pub ip: Option<String>,
    #[arg(long)]
    pub username: Option<String>,
    #[arg(long)]
    pub password: Option<String>,
    #[arg(long)]
    pub project: Option<String>,
    #[arg(long)]
    pub cluster: Option<String>,
    #[arg(long)]
    pub node: Option<String>,
    #[arg(long)]
    pub remarks: Option<String>,
}

impl VmFields {
    /// Overlay the given fields onto `base`.
    fn apply(&self, base: VmMasterInput) -> VmMasterInput {
        let pick = |new: &Option<String>, old: String| new.clone().unwrap_or(old);
        VmMasterInput {
            vm_name: pick(&self.vm_name, base.vm_name),
            ip: pick(&self.ip, base.ip),
            username: pick(&self.username, base.username),
            password: pick(&self.password, base.password),
            project_name: pick(&self.project, base.project_name),
            cluster: pick(&self.cluster, base.cluster),
            node: pick(&self.node, base.node),
            remarks: pick(&self.remarks, base.remarks),
        }
    }
}

impl From<&VmMaster> for VmMasterInput {
    fn from(vm: &VmMaster) -> Self {
        Self {
            vm_name: vm.vm_name.clone(),
            ip: vm.ip.clone(),
            username: vm.username.clone(),
            password: vm.password.clone(),
            project_name: vm.project_name.clone(),
            cluster: vm.cluster.clone(),
            node: vm.node.clone(),
            remarks: vm.remarks.clone(),
        }
    }
}

#[derive(Subcommand)]
pub enum InventoryCommands {
    /// List every VM master record
    List,
    /// Create a record (requires --vm-name and --ip)
    Add {
        #[command(flatten)]
        fields: VmFields,
    },
    /// Change fields of an existing record
    Update {
        /// Record id
        id: i64,
        #[command(flatten)]
        fields: VmFields,
    },
    /// Delete a record
    Delete {
        /// Record id
        id: i64,
    },
}

pub fn run(config_path: Option<&str>, format: &str, command: &InventoryCommands) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async { run_async(config_path, format, command).await })
}

async fn run_async(
    config_path: Option<&str>,
    format: &str,
    command: &InventoryCommands,
) -> Result<()> {
    let cfg = config::load(config_path)?;
    init_tracing("warn");
    let upstream = UpstreamClient::new(&cfg.upstream)?;

    match command {
        InventoryCommands::List => {
            let vms = upstream.master().await.context("fetching VM inventory")?;
            if is_json(format) {
                return print_output(format, &vms);
            }
            println!(
                "{} {} {} {} {} {}",
                cell("ID", 6).bold(),
                cell("IP", 16).bold(),
                cell("VM", 28).bold(),
                cell("PROJECT", 18).bold(),
                cell("CLUSTER", 14).bold(),
                "NODE".bold()
            );
            for vm in &vms {
                let id = vm.id.map(|id| id.to_string()).unwrap_or_default();
                println!(
                    "{} {} {} {} {} {}",
                    cell(&id, 6),
                    cell(&vm.ip, 16),
                    cell(&vm.vm_name, 28),
                    cell(&vm.project_name, 18),
                    cell(&vm.cluster, 14),
                    vm.node
                );
            }
            println!();
            println!("  {} {}", "Total:".dimmed(), vms.len());
        }
        InventoryCommands::Add { fields } => {
            let input = validate(fields.apply(VmMasterInput::default()))?;
            let created = upstream.create_vm(&input).await?;
            report(format, "created", &created)?;
        }
        InventoryCommands::Update { id, fields } => {
            let vms = upstream.master().await.context("fetching VM inventory")?;
            let current = vms
                .iter()
                .find(|vm| vm.id == Some(*id))
                .with_context(|| format!("no inventory record with id {}", id))?;
            let input = validate(fields.apply(VmMasterInput::from(current)))?;
            let updated = upstream.update_vm(*id, &input).await?;
            report(format, "updated", &updated)?;
        }
        InventoryCommands::Delete { id } => {
            upstream.delete_vm(*id).await?;
            if is_json(format) {
                return print_output(format, &serde_json::json!({ "deleted": id }));
            }
            println!("{} record {}", "deleted".red(), id);
        }
    }
    Ok(())
}

fn validate(input: VmMasterInput) -> Result<VmMasterInput> {
    if input.vm_name.trim().is_empty() {
        anyhow::bail!("--vm-name is required");
    }
    if input.ip.trim().is_empty() {
        anyhow::bail!("--ip is required");
    }
    Ok(input)
}

fn report(format: &str, action: &str, vm: &VmMaster) -> Result<()> {
    if is_json(format) {
        return print_output(format, vm);
    }
    println!(
        "{} {} ({})",
        action.green(),
        vm.vm_name.bold(),
        vm.ip
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_keeps_unset_fields() {
        let current = VmMaster {
            id: Some(4),
            vm_name: "db".into(),
            ip: "10.0.0.1".into(),
            password: "secret".into(),
            project_name: "Finance".into(),
            ..Default::default()
        };
        let fields = VmFields {
            cluster: Some("c2".into()),
            ..Default::default()
        };
        let input = fields.apply(VmMasterInput::from(&current));
        assert_eq!(input.vm_name, "db");
        assert_eq!(input.password, "secret");
        assert_eq!(input.project_name, "Finance");
        assert_eq!(input.cluster, "c2");
    }

    #[test]
    fn add_requires_name_and_ip() {
        let fields = VmFields {
            vm_name: Some("db".into()),
            ..Default::default()
        };
        let err = validate(fields.apply(VmMasterInput::default())).unwrap_err();
        assert!(err.to_string().contains("--ip"));
    }
}
