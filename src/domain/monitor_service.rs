//! Monitor service: fetches the sources and publishes snapshots.
//!
//! Implements the one-way pipeline:
//!   collaborators → SourceData → Snapshot (pure derivation) → SnapshotStore → API
//!
//! API handlers read ONLY from the store and never trigger a fetch, except the
//! explicit refresh endpoint and the live ping/sweep passthroughs.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::upstream::{Sources, UpstreamResult};

use super::reconcile::LivePing;
use super::severity::SeverityThresholds;
use super::snapshot::{Snapshot, SnapshotStore, SourceData, SourceError};
use super::types::DaemonHealth;

/// Tunables the derived views need at read time.
#[derive(Debug, Clone, Copy)]
pub struct MonitorSettings {
    pub thresholds: SeverityThresholds,
    pub recent_window_days: i64,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            thresholds: SeverityThresholds::default(),
            recent_window_days: 3,
        }
    }
}

pub struct MonitorService<S> {
    sources: S,
    store: SnapshotStore,
    settings: MonitorSettings,
    started: Instant,
}

impl<S: Sources> MonitorService<S> {
    pub fn new(sources: S, settings: MonitorSettings) -> Self {
        Self {
            sources,
            store: SnapshotStore::new(),
            settings,
            started: Instant::now(),
        }
    }

    /// Fetch all four sources concurrently and publish a new snapshot.
    ///
    /// A failing source contributes an empty list and a `SourceError`. Returns
    /// `None` when a newer refresh was applied while this one was in flight.
    pub async fn refresh(&self) -> Option<Arc<Snapshot>> {
        let ticket = self.store.begin();
        debug!(generation = ticket.generation(), "refresh started");

        let (backups, master, samples, live) = tokio::join!(
            self.sources.backups(),
            self.sources.master(),
            self.sources.status_samples(),
            self.sources.live(),
        );

        let mut errors = Vec::new();
        let sources = SourceData {
            backups: or_empty("backups", backups, &mut errors),
            master: or_empty("master", master, &mut errors),
            samples: or_empty("status", samples, &mut errors),
            live: or_empty("live", live, &mut errors),
            errors,
        };

        match self.store.apply_refresh(ticket, sources).await {
            Some(snapshot) => {
                info!(
                    generation = snapshot.generation,
                    checksum = %snapshot.checksum,
                    vms = snapshot.vms.len(),
                    backup_dates = snapshot.daily.dates.len(),
                    rejected_backups = snapshot.daily.rejected,
                    dropped_samples = snapshot.dropped_samples,
                    source_errors = snapshot.errors.len(),
                    "snapshot refreshed"
                );
                Some(snapshot)
            }
            None => {
                debug!(generation = ticket.generation(), "discarding stale refresh");
                None
            }
        }
    }

    /// Re-fetch only the live source and rebuild the unified view.
    pub async fn poll_live(&self) -> Option<Arc<Snapshot>> {
        let ticket = self.store.begin();
        let live: Vec<LivePing> = match self.sources.live().await {
            Ok(live) => live,
            Err(e) => {
                warn!(error = %e, "live poll failed, keeping previous live data");
                return None;
            }
        };
        let applied = self.store.apply_live(ticket, live).await;
        if applied.is_none() {
            debug!(generation = ticket.generation(), "live poll not applied");
        }
        applied
    }

    /// Current snapshot from memory. Never triggers a fetch.
    pub async fn current(&self) -> Option<Arc<Snapshot>> {
        self.store.current().await
    }

    pub async fn health(&self) -> DaemonHealth {
        let current = self.store.current().await;
        DaemonHealth {
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_secs: self.started.elapsed().as_secs(),
            ready: current.is_some(),
            generation: current.as_ref().map(|s| s.generation),
            checksum: current.as_ref().map(|s| s.checksum.clone()),
            snapshot_age_secs: current.as_ref().map(|s| s.age_secs()),
            source_errors: current.map(|s| s.errors.clone()).unwrap_or_default(),
        }
    }

    pub fn settings(&self) -> &MonitorSettings {
        &self.settings
    }

    pub fn sources(&self) -> &S {
        &self.sources
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }
}

fn or_empty<T>(source: &str, result: UpstreamResult<Vec<T>>, errors: &mut Vec<SourceError>) -> Vec<T> {
    match result {
        Ok(items) => items,
        Err(e) => {
            warn!(source, error = %e, "source unavailable, treating as empty");
            errors.push(SourceError {
                source: source.to_string(),
                message: e.to_string(),
            });
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::backup::BackupRecord;
    use crate::domain::reconcile::VmMaster;
    use crate::domain::status::{LinkStatus, SampleVm, StatusSample};
    use crate::upstream::UpstreamError;
    use reqwest::StatusCode;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct FakeSources {
        backups_down: bool,
        live_reachable: AtomicBool,
    }

    impl Sources for FakeSources {
        async fn backups(&self) -> UpstreamResult<Vec<BackupRecord>> {
            if self.backups_down {
                return Err(UpstreamError::Status {
                    url: "http://backups/veeam".into(),
                    status: StatusCode::BAD_GATEWAY,
                    body: String::new(),
                });
            }
            Ok(vec![BackupRecord {
                vm: "DB1.vbk".into(),
                parent_directory: "Finance".into(),
                last_modified: "2024-03-01 10:00:00".into(),
                metadata: false,
                full_backup: true,
                incremental_backup: false,
            }])
        }

        async fn master(&self) -> UpstreamResult<Vec<VmMaster>> {
            Ok(vec![VmMaster {
                vm_name: "db".into(),
                ip: "10.0.0.1".into(),
                project_name: "Finance".into(),
                ..Default::default()
            }])
        }

        async fn status_samples(&self) -> UpstreamResult<Vec<StatusSample>> {
            Ok(vec![StatusSample {
                ip: "10.0.0.1".into(),
                status: LinkStatus::NotReachable,
                created_at: "2024-03-01T10:00:00".into(),
                vm_master: Some(SampleVm {
                    vm_name: Some("db".into()),
                    ..Default::default()
                }),
            }])
        }

        async fn live(&self) -> UpstreamResult<Vec<LivePing>> {
            Ok(vec![LivePing {
                vm_ip: "10.0.0.1".into(),
                vm_name: "db".into(),
                reachable: self.live_reachable.load(Ordering::SeqCst),
            }])
        }
    }

    #[tokio::test]
    async fn refresh_publishes_a_snapshot() {
        let service = MonitorService::new(FakeSources::default(), MonitorSettings::default());
        assert!(service.current().await.is_none());
        assert!(!service.health().await.ready);

        let snapshot = service.refresh().await.unwrap();
        assert_eq!(snapshot.vms.len(), 1);
        assert_eq!(snapshot.history.len(), 1);
        assert_eq!(snapshot.daily.dates.len(), 1);
        assert!(snapshot.errors.is_empty());

        let health = service.health().await;
        assert!(health.ready);
        assert_eq!(health.generation, Some(snapshot.generation));
    }

    #[tokio::test]
    async fn failing_source_does_not_block_the_others() {
        let service = MonitorService::new(
            FakeSources {
                backups_down: true,
                ..Default::default()
            },
            MonitorSettings::default(),
        );
        let snapshot = service.refresh().await.unwrap();
        assert!(snapshot.daily.dates.is_empty());
        assert_eq!(snapshot.vms.len(), 1);
        assert_eq!(snapshot.errors[0].source, "backups");
    }

    #[tokio::test]
    async fn live_poll_replaces_only_live_data() {
        let service = MonitorService::new(FakeSources::default(), MonitorSettings::default());
        assert!(service.poll_live().await.is_none());

        let first = service.refresh().await.unwrap();
        assert_eq!(first.vms[0].current_status, Some(LinkStatus::NotReachable));

        service.sources().live_reachable.store(true, Ordering::SeqCst);
        let polled = service.poll_live().await.unwrap();
        assert!(polled.generation > first.generation);
        assert_eq!(polled.vms[0].current_status, Some(LinkStatus::Reachable));
        assert_eq!(polled.history, first.history);
        assert_ne!(polled.checksum, first.checksum);
    }
}
