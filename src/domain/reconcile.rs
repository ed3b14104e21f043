//! Merge inventory, status history and live pings into one view per VM.

use std::collections::{BTreeMap, BTreeSet};

use async_graphql::SimpleObject;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::status::{HistoryIndex, LinkStatus, StatusTransition, NOT_AVAILABLE};
use super::wire::null_as_default;

/// A VM is identified by the exact `(ip, vm_name)` pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VmKey {
    pub ip: String,
    pub vm_name: String,
}

impl VmKey {
    pub fn new(ip: impl Into<String>, vm_name: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            vm_name: vm_name.into(),
        }
    }
}

/// Inventory entry as stored by the VM master API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, SimpleObject)]
pub struct VmMaster {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub vm_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub ip: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub username: String,
    #[serde(default, deserialize_with = "null_as_default", skip_serializing)]
    #[graphql(skip)]
    pub password: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub project_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub cluster: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub node: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub remarks: String,
}

impl VmMaster {
    pub fn key(&self) -> VmKey {
        VmKey::new(&self.ip, &self.vm_name)
    }
}

/// One entry of the bulk live ping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LivePing {
    #[serde(default, deserialize_with = "null_as_default")]
    pub vm_ip: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub vm_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub reachable: bool,
}

impl LivePing {
    pub fn key(&self) -> VmKey {
        VmKey::new(&self.vm_ip, &self.vm_name)
    }
}

/// Everything known about one VM, with a flag per contributing source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, SimpleObject)]
pub struct UnifiedVmView {
    pub ip: String,
    pub vm_name: String,
    pub project: String,
    pub cluster: String,
    pub node: Option<String>,
    pub remarks: Option<String>,
    /// From the newest history sample, overwritten by the live ping.
    pub current_status: Option<LinkStatus>,
    pub last_seen: Option<DateTime<Utc>>,
    pub has_master_data: bool,
    pub has_status_data: bool,
    pub has_current_data: bool,
}

impl UnifiedVmView {
    fn empty(key: &VmKey) -> Self {
        Self {
            ip: key.ip.clone(),
            vm_name: key.vm_name.clone(),
            project: NOT_AVAILABLE.to_string(),
            cluster: NOT_AVAILABLE.to_string(),
            node: None,
            remarks: None,
            current_status: None,
            last_seen: None,
            has_master_data: false,
            has_status_data: false,
            has_current_data: false,
        }
    }

    pub fn key(&self) -> VmKey {
        VmKey::new(&self.ip, &self.vm_name)
    }
}

/// The reconciled fleet, ordered by key.
pub type ReconciledView = BTreeMap<VmKey, UnifiedVmView>;

/// Merge the three sources. Master seeds, history updates, live overwrites;
/// the key set is the union of all three.
pub fn reconcile(
    master: &[VmMaster],
    history: &[StatusTransition],
    live: &[LivePing],
) -> ReconciledView {
    let mut view = ReconciledView::new();

    for vm in master {
        let key = vm.key();
        let entry = view
            .entry(key.clone())
            .or_insert_with(|| UnifiedVmView::empty(&key));
        entry.project = non_empty_or_na(&vm.project_name);
        entry.cluster = non_empty_or_na(&vm.cluster);
        entry.node = Some(vm.node.clone()).filter(|n| !n.is_empty());
        entry.remarks = Some(vm.remarks.clone()).filter(|r| !r.is_empty());
        entry.has_master_data = true;
    }

    // Walk oldest first so the newest sample ends up applied.
    let mut ordered: Vec<&StatusTransition> = history.iter().collect();
    ordered.sort_by_key(|t| t.current_time);
    for t in ordered {
        let key = VmKey::new(&t.ip, &t.vm_name);
        let entry = view
            .entry(key.clone())
            .or_insert_with(|| UnifiedVmView::empty(&key));
        if !entry.has_master_data {
            entry.project = t.project.clone();
            entry.cluster = t.cluster.clone();
        }
        entry.current_status = Some(t.current_status.clone());
        entry.last_seen = Some(t.current_time);
        entry.has_status_data = true;
    }

    for ping in live {
        let key = ping.key();
        let entry = view
            .entry(key.clone())
            .or_insert_with(|| UnifiedVmView::empty(&key));
        entry.current_status = Some(LinkStatus::from_reachable(ping.reachable));
        entry.has_current_data = true;
    }

    view
}

fn non_empty_or_na(value: &str) -> String {
    if value.trim().is_empty() {
        NOT_AVAILABLE.to_string()
    } else {
        value.to_string()
    }
}

/// Latest status of one VM: live ping, else newest history sample, else unknown.
pub fn latest_status(
    vm: &UnifiedVmView,
    live: &[LivePing],
    history: &HistoryIndex<'_>,
) -> LinkStatus {
    if let Some(ping) = live
        .iter()
        .find(|p| p.vm_ip == vm.ip && p.vm_name == vm.vm_name)
    {
        return LinkStatus::from_reachable(ping.reachable);
    }
    history
        .latest(&vm.ip, &vm.vm_name)
        .map(|t| t.current_status.clone())
        .unwrap_or(LinkStatus::Unknown)
}

/// Reachability counts over the view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, SimpleObject)]
pub struct FleetStats {
    pub total: usize,
    pub reachable: usize,
    pub unreachable: usize,
}

pub fn fleet_stats<'a>(
    vms: impl IntoIterator<Item = &'a UnifiedVmView>,
    live: &[LivePing],
    history: &HistoryIndex<'_>,
) -> FleetStats {
    let mut stats = FleetStats::default();
    for vm in vms {
        stats.total += 1;
        if latest_status(vm, live, history).is_reachable() {
            stats.reachable += 1;
        } else {
            stats.unreachable += 1;
        }
    }
    stats
}

/// Distinct project names, sorted, without blanks or `N/A`.
pub fn projects<'a>(vms: impl IntoIterator<Item = &'a UnifiedVmView>) -> Vec<String> {
    vms.into_iter()
        .map(|vm| vm.project.as_str())
        .filter(|p| !p.trim().is_empty() && *p != NOT_AVAILABLE)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect()
}
