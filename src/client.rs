//! Typed HTTP client for the vmwatch daemon REST API.

use std::collections::HashMap;

use anyhow::{bail, Context, Result};
use reqwest::Client;
use serde::Serialize;

use crate::config::NodeTarget;
use crate::domain::backup_report::{BackupStatusSummary, GroupsOverview};
use crate::domain::filter::VmFilter;
use crate::domain::ping::PingReply;
use crate::domain::reconcile::FleetStats;
use crate::domain::snapshot::Snapshot;
use crate::domain::types::{BackupStats, DaemonHealth, DailyView, HistoryView, MonthlyView, SweepReport, VmList};

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:9300";
const NO_QUERY: &[(&str, &str)] = &[];

pub struct VmwatchClient {
    base_url: String,
    http: Client,
}

impl VmwatchClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    /// Resolve a client from the nodes map.
    /// `None` name → localhost default. `Some(name)` → look up in nodes map.
    pub fn from_node(name: Option<&str>, nodes: &HashMap<String, NodeTarget>) -> Result<Self> {
        match name {
            None => Self::new(DEFAULT_BASE_URL),
            Some(n) => match nodes.get(n) {
                Some(target) => Self::new(&target.url),
                None => bail!(
                    "node '{}' not found in config. Available nodes: {}",
                    n,
                    if nodes.is_empty() {
                        "(none configured)".to_string()
                    } else {
                        let mut names: Vec<_> = nodes.keys().cloned().collect();
                        names.sort();
                        names.join(", ")
                    }
                ),
            },
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn health(&self) -> Result<DaemonHealth> {
        self.get("/health", NO_QUERY).await
    }

    pub async fn snapshot(&self) -> Result<Snapshot> {
        self.get("/api/v1/snapshot", NO_QUERY).await
    }

    pub async fn refresh(&self) -> Result<Snapshot> {
        self.post("/api/v1/refresh", &serde_json::json!({})).await
    }

    pub async fn daily(&self, date: Option<&str>) -> Result<DailyView> {
        self.get("/api/v1/backups/daily", &[("date", date)]).await
    }

    pub async fn monthly(&self, month: Option<&str>) -> Result<MonthlyView> {
        self.get("/api/v1/backups/monthly", &[("month", month)]).await
    }

    pub async fn backup_stats(&self, date: Option<&str>, month: Option<&str>) -> Result<BackupStats> {
        self.get("/api/v1/backups/stats", &[("date", date), ("month", month)])
            .await
    }

    pub async fn backup_summary(&self, month: Option<&str>) -> Result<BackupStatusSummary> {
        self.get("/api/v1/backups/summary", &[("month", month)]).await
    }

    pub async fn backup_groups(&self) -> Result<GroupsOverview> {
        self.get("/api/v1/backups/groups", NO_QUERY).await
    }

    pub async fn vms(&self, filter: &VmFilter) -> Result<VmList> {
        self.get("/api/v1/vms", filter).await
    }

    pub async fn vm_stats(&self) -> Result<FleetStats> {
        self.get("/api/v1/vms/stats", NO_QUERY).await
    }

    pub async fn history(&self, date: Option<&str>, change: Option<&str>) -> Result<HistoryView> {
        self.get("/api/v1/history", &[("date", date), ("change", change)])
            .await
    }

    pub async fn projects(&self) -> Result<Vec<String>> {
        self.get("/api/v1/projects", NO_QUERY).await
    }

    pub async fn ping(&self, ip: &str) -> Result<PingReply> {
        self.post("/api/v1/ping", &serde_json::json!({ "ip": ip }))
            .await
    }

    pub async fn sweep(&self) -> Result<SweepReport> {
        self.get("/api/v1/ping/sweep", NO_QUERY).await
    }

    // ── Internal helpers ───────────────────────────────────

    async fn get<T, Q>(&self, path: &str, query: &Q) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .http
            .get(&url)
            .query(query)
            .send()
            .await
            .with_context(|| format!("GET {}", url))?;

        if !resp.status().is_success() {
            bail!("{} returned {}", url, resp.status());
        }

        resp.json()
            .await
            .with_context(|| format!("parsing response from {}", url))
    }

    async fn post<T, B>(&self, path: &str, body: &B) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .with_context(|| format!("POST {}", url))?;

        if !resp.status().is_success() {
            bail!("{} returned {}", url, resp.status());
        }

        resp.json()
            .await
            .with_context(|| format!("parsing response from {}", url))
    }
}
