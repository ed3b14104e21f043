//! Immutable derived snapshot and the generation-guarded slot that holds it.
//!
//! Every fetch takes a ticket from a monotonic counter before it goes out.
//! When its data arrives, the store applies it only if no newer ticket of the
//! same kind was applied in the meantime. Readers always get a whole `Arc`,
//! never a partially updated snapshot.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_graphql::SimpleObject;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

use super::backup::BackupRecord;
use super::grouping::{group_by_date, group_by_month, DailyIndex, MonthlyIndex};
use super::reconcile::{reconcile, LivePing, UnifiedVmView, VmMaster};
use super::status::{derive_transitions, StatusSample, StatusTransition};

/// A collaborator that could not be read during a fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, SimpleObject)]
pub struct SourceError {
    pub source: String,
    pub message: String,
}

/// Raw data of one full fetch. A failed source is an empty list plus an error.
#[derive(Debug, Clone, Default)]
pub struct SourceData {
    pub backups: Vec<BackupRecord>,
    pub master: Vec<VmMaster>,
    pub samples: Vec<StatusSample>,
    pub live: Vec<LivePing>,
    pub errors: Vec<SourceError>,
}

/// Everything the API serves, derived from one set of sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Ticket of the fetch whose data was last applied.
    pub generation: u64,
    pub generated_at: DateTime<Utc>,
    /// "sha256:<hex>" over the derived data, stable across identical fetches.
    pub checksum: String,
    pub daily: DailyIndex,
    pub monthly: MonthlyIndex,
    pub master: Vec<VmMaster>,
    pub history: Vec<StatusTransition>,
    pub live: Vec<LivePing>,
    pub vms: Vec<UnifiedVmView>,
    /// Monitoring samples dropped for an unparseable time.
    pub dropped_samples: usize,
    pub errors: Vec<SourceError>,
}

#[derive(Serialize)]
struct Digestible<'a> {
    daily: &'a DailyIndex,
    monthly: &'a MonthlyIndex,
    master: &'a [VmMaster],
    history: &'a [StatusTransition],
    live: &'a [LivePing],
}

impl Snapshot {
    pub fn build(generation: u64, sources: SourceData) -> Self {
        let daily = group_by_date(&sources.backups);
        let monthly = group_by_month(&sources.backups);
        let (history, dropped_samples) = derive_transitions(&sources.samples);
        Self::assemble(
            generation,
            daily,
            monthly,
            sources.master,
            history,
            sources.live,
            dropped_samples,
            sources.errors,
        )
    }

    /// Same inventory and history, new live results.
    pub fn with_live(&self, generation: u64, live: Vec<LivePing>) -> Self {
        let errors = self
            .errors
            .iter()
            .filter(|e| e.source != "live")
            .cloned()
            .collect();
        Self::assemble(
            generation,
            self.daily.clone(),
            self.monthly.clone(),
            self.master.clone(),
            self.history.clone(),
            live,
            self.dropped_samples,
            errors,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        generation: u64,
        daily: DailyIndex,
        monthly: MonthlyIndex,
        master: Vec<VmMaster>,
        history: Vec<StatusTransition>,
        live: Vec<LivePing>,
        dropped_samples: usize,
        errors: Vec<SourceError>,
    ) -> Self {
        let vms = reconcile(&master, &history, &live).into_values().collect();
        let checksum = checksum(&Digestible {
            daily: &daily,
            monthly: &monthly,
            master: &master,
            history: &history,
            live: &live,
        });
        Self {
            generation,
            generated_at: Utc::now(),
            checksum,
            daily,
            monthly,
            master,
            history,
            live,
            vms,
            dropped_samples,
            errors,
        }
    }

    pub fn age_secs(&self) -> i64 {
        Utc::now()
            .signed_duration_since(self.generated_at)
            .num_seconds()
    }
}

fn checksum<T: Serialize>(value: &T) -> String {
    let serialized = serde_json::to_string(value).unwrap_or_default();
    let hash = Sha256::digest(serialized.as_bytes());
    format!("sha256:{:x}", hash)
}

/// Proof that a fetch was started at a given point in the sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Ticket(u64);

impl Ticket {
    pub fn generation(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Default)]
struct Slot {
    current: Option<Arc<Snapshot>>,
    refresh_applied: u64,
    live_applied: u64,
}

/// Holder of the current snapshot.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    counter: AtomicU64,
    slot: RwLock<Slot>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a ticket before issuing a fetch.
    pub fn begin(&self) -> Ticket {
        Ticket(self.counter.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub async fn current(&self) -> Option<Arc<Snapshot>> {
        self.slot.read().await.current.clone()
    }

    /// Apply a full fetch. Returns `None` when a newer full fetch already won.
    ///
    /// If a live poll started after this fetch has already been applied, its
    /// live results are kept over the (older) ones in `sources`.
    pub async fn apply_refresh(&self, ticket: Ticket, mut sources: SourceData) -> Option<Arc<Snapshot>> {
        let mut slot = self.slot.write().await;
        if ticket.0 <= slot.refresh_applied {
            return None;
        }
        if slot.live_applied > ticket.0 {
            if let Some(current) = &slot.current {
                sources.live = current.live.clone();
                sources.errors.retain(|e| e.source != "live");
            }
        } else {
            slot.live_applied = ticket.0;
        }
        slot.refresh_applied = ticket.0;
        let snapshot = Arc::new(Snapshot::build(ticket.0, sources));
        slot.current = Some(snapshot.clone());
        Some(snapshot)
    }

    /// Apply a live poll on top of the current snapshot. Returns `None` when
    /// there is nothing to merge into yet or a newer live result already won.
    pub async fn apply_live(&self, ticket: Ticket, live: Vec<LivePing>) -> Option<Arc<Snapshot>> {
        let mut slot = self.slot.write().await;
        if ticket.0 <= slot.live_applied {
            return None;
        }
        let next = Arc::new(slot.current.as_ref()?.with_live(ticket.0, live));
        slot.live_applied = ticket.0;
        slot.current = Some(next.clone());
        Some(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backup(vm: &str, at: &str) -> BackupRecord {
        BackupRecord {
            vm: vm.into(),
            parent_directory: "Finance".into(),
            last_modified: at.into(),
            metadata: false,
            full_backup: true,
            incremental_backup: false,
        }
    }

    fn master(name: &str) -> VmMaster {
        VmMaster {
            vm_name: name.into(),
            ip: "10.0.0.1".into(),
            ..Default::default()
        }
    }

    fn live(reachable: bool) -> Vec<LivePing> {
        vec![LivePing {
            vm_ip: "10.0.0.1".into(),
            vm_name: "db".into(),
            reachable,
        }]
    }

    fn sources() -> SourceData {
        SourceData {
            backups: vec![backup("DB1.vbk", "2024-03-01 10:00:00")],
            master: vec![master("db")],
            live: live(false),
            ..Default::default()
        }
    }

    #[test]
    fn checksum_is_stable_for_identical_data() {
        let a = Snapshot::build(1, sources());
        let b = Snapshot::build(2, sources());
        assert_eq!(a.checksum, b.checksum);
        assert!(a.checksum.starts_with("sha256:"));

        let c = a.with_live(3, live(true));
        assert_ne!(a.checksum, c.checksum);
        assert_eq!(c.daily, a.daily);
    }

    #[test]
    fn failed_sources_still_build() {
        let snapshot = Snapshot::build(
            1,
            SourceData {
                errors: vec![SourceError {
                    source: "backups".into(),
                    message: "503".into(),
                }],
                ..Default::default()
            },
        );
        assert!(snapshot.daily.dates.is_empty());
        assert!(snapshot.vms.is_empty());
        assert_eq!(snapshot.errors.len(), 1);
    }

    #[tokio::test]
    async fn stale_refresh_is_discarded() {
        let store = SnapshotStore::new();
        let older = store.begin();
        let newer = store.begin();

        assert!(store.apply_refresh(newer, sources()).await.is_some());
        assert!(store.apply_refresh(older, SourceData::default()).await.is_none());

        let current = store.current().await.unwrap();
        assert_eq!(current.generation, newer.generation());
        assert_eq!(current.master.len(), 1);
    }

    #[tokio::test]
    async fn live_poll_needs_a_snapshot() {
        let store = SnapshotStore::new();
        let ticket = store.begin();
        assert!(store.apply_live(ticket, live(true)).await.is_none());
        assert!(store.current().await.is_none());
    }

    #[tokio::test]
    async fn newer_live_survives_an_older_refresh() {
        let store = SnapshotStore::new();
        let first = store.begin();
        store.apply_refresh(first, sources()).await;

        let slow_refresh = store.begin();
        let poll = store.begin();
        store.apply_live(poll, live(true)).await;

        let applied = store.apply_refresh(slow_refresh, sources()).await.unwrap();
        assert_eq!(applied.live, live(true));

        let stale_poll = store.begin();
        let fresh_poll = store.begin();
        assert!(store.apply_live(fresh_poll, live(false)).await.is_some());
        assert!(store.apply_live(stale_poll, live(true)).await.is_none());
        assert_eq!(store.current().await.unwrap().live, live(false));
    }
}
