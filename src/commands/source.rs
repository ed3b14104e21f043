//! Where one-shot commands get their snapshot from.
//!
//! By default a running local daemon is asked first; when it is unreachable
//! (or `--direct` is given) every upstream source is fetched in-process.

use std::sync::Arc;

use anyhow::{Context, Result};
use colored::Colorize;
use tracing::{debug, info};

use crate::client::VmwatchClient;
use crate::config::Config;
use crate::domain::monitor_service::MonitorService;
use crate::domain::snapshot::Snapshot;
use crate::upstream::UpstreamClient;

pub async fn load_snapshot(cfg: &Config, direct: bool) -> Result<Arc<Snapshot>> {
    if !direct {
        match try_daemon_snapshot(cfg).await {
            Ok(snapshot) => {
                debug!(generation = snapshot.generation, "using daemon snapshot");
                return Ok(Arc::new(snapshot));
            }
            Err(e) => debug!(error = %e, "daemon unavailable, fetching upstream directly"),
        }
    }
    fetch_direct(cfg).await
}

async fn try_daemon_snapshot(cfg: &Config) -> Result<Snapshot> {
    let client = VmwatchClient::new(&format!("http://{}", cfg.daemon.http_addr))?;
    client.snapshot().await
}

async fn fetch_direct(cfg: &Config) -> Result<Arc<Snapshot>> {
    let upstream = UpstreamClient::new(&cfg.upstream)?;
    let monitor = MonitorService::new(upstream, cfg.monitor_settings());
    let snapshot = monitor
        .refresh()
        .await
        .context("refresh produced no snapshot")?;
    info!(
        generation = snapshot.generation,
        vms = snapshot.vms.len(),
        "fetched upstream sources"
    );
    Ok(snapshot)
}

/// Surface partial results on stderr so table output is never silently incomplete.
pub fn warn_source_errors(snapshot: &Snapshot) {
    for err in &snapshot.errors {
        eprintln!(
            "{} {} source unavailable: {}",
            "warning:".yellow().bold(),
            err.source,
            err.message.dimmed()
        );
    }
}
