//! Typed client for the external APIs the daemon reads from.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::config::UpstreamConfig;
use crate::domain::backup::BackupRecord;
use crate::domain::ping::{PingCheck, PingReply};
use crate::domain::reconcile::{LivePing, VmMaster};
use crate::domain::status::StatusSample;

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("{url} rejected the credentials ({status})")]
    Unauthorized { url: String, status: StatusCode },

    #[error("{url} returned {status}: {body}")]
    Status {
        url: String,
        status: StatusCode,
        body: String,
    },

    #[error("decoding response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

pub type UpstreamResult<T> = Result<T, UpstreamError>;

/// Fields accepted when creating or updating an inventory entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmMasterInput {
    pub vm_name: String,
    pub ip: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub project_name: String,
    #[serde(default)]
    pub cluster: String,
    #[serde(default)]
    pub node: String,
    #[serde(default)]
    pub remarks: String,
}

/// The four read-only sources a snapshot is built from.
pub trait Sources: Send + Sync {
    fn backups(&self) -> impl std::future::Future<Output = UpstreamResult<Vec<BackupRecord>>> + Send;

    fn master(&self) -> impl std::future::Future<Output = UpstreamResult<Vec<VmMaster>>> + Send;

    fn status_samples(
        &self,
    ) -> impl std::future::Future<Output = UpstreamResult<Vec<StatusSample>>> + Send;

    fn live(&self) -> impl std::future::Future<Output = UpstreamResult<Vec<LivePing>>> + Send;
}

#[derive(Clone)]
pub struct UpstreamClient {
    http: Client,
    backups_url: String,
    monitor_url: String,
    ping_url: String,
    auth_token: Option<String>,
    sweep_concurrency: usize,
}

impl UpstreamClient {
    pub fn new(config: &UpstreamConfig) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("building upstream HTTP client")?;
        Ok(Self {
            http,
            backups_url: config.backups_url.trim_end_matches('/').to_string(),
            monitor_url: config.monitor_url.trim_end_matches('/').to_string(),
            ping_url: config.ping_url.trim_end_matches('/').to_string(),
            auth_token: config.auth_token.clone().filter(|t| !t.is_empty()),
            sweep_concurrency: config.sweep_concurrency.max(1),
        })
    }

    /// Ping one address.
    pub async fn ping(&self, ip: &str) -> UpstreamResult<PingReply> {
        let url = format!("{}/ping-status", self.ping_url);
        let body = serde_json::json!({ "ip": ip });
        let mut reply: PingReply = self
            .send(self.request(Method::POST, &url).json(&body), &url)
            .await?;
        if reply.ip.is_empty() {
            reply.ip = ip.to_string();
        }
        Ok(reply)
    }

    /// Ping every inventory entry. A failed check is recorded, not returned.
    pub async fn sweep(&self, vms: Vec<VmMaster>) -> Vec<PingCheck> {
        let permits = Arc::new(Semaphore::new(self.sweep_concurrency));
        let mut tasks = JoinSet::new();
        for (index, vm) in vms.into_iter().enumerate() {
            let client = self.clone();
            let permits = permits.clone();
            tasks.spawn(async move {
                let check = match permits.acquire_owned().await {
                    Ok(_permit) => match client.ping(&vm.ip).await {
                        Ok(reply) => PingCheck::completed(&vm, reply.reachable),
                        Err(e) => {
                            warn!(ip = %vm.ip, vm = %vm.vm_name, error = %e, "ping check failed");
                            PingCheck::failed(&vm, e.to_string())
                        }
                    },
                    Err(e) => PingCheck::failed(&vm, e.to_string()),
                };
                (index, check)
            });
        }

        let mut results = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => warn!(error = %e, "sweep task aborted"),
            }
        }
        results.sort_by_key(|(index, _)| *index);
        results.into_iter().map(|(_, check)| check).collect()
    }

    pub async fn create_vm(&self, vm: &VmMasterInput) -> UpstreamResult<VmMaster> {
        let url = format!("{}/vm", self.monitor_url);
        self.send(self.request(Method::POST, &url).json(vm), &url)
            .await
    }

    pub async fn update_vm(&self, id: i64, vm: &VmMasterInput) -> UpstreamResult<VmMaster> {
        let url = format!("{}/vm/{}", self.monitor_url, id);
        self.send(self.request(Method::PUT, &url).json(vm), &url)
            .await
    }

    pub async fn delete_vm(&self, id: i64) -> UpstreamResult<()> {
        let url = format!("{}/vm/{}", self.monitor_url, id);
        let resp = self.dispatch(self.request(Method::DELETE, &url), &url).await?;
        debug!(url = %url, status = %resp.status(), "inventory entry deleted");
        Ok(())
    }

    // ── Internal helpers ───────────────────────────────────

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let req = self.http.request(method, url);
        match &self.auth_token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// Fetch a JSON array, decoding each element on its own. Elements that
    /// do not fit `T` are logged and skipped instead of failing the batch.
    async fn get_list<T: DeserializeOwned>(&self, url: &str) -> UpstreamResult<Vec<T>> {
        let raw: Vec<serde_json::Value> = self.send(self.request(Method::GET, url), url).await?;
        Ok(decode_each(url, raw))
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder, url: &str) -> UpstreamResult<T> {
        let resp = self.dispatch(req, url).await?;
        resp.json().await.map_err(|source| UpstreamError::Decode {
            url: url.to_string(),
            source,
        })
    }

    async fn dispatch(&self, req: RequestBuilder, url: &str) -> UpstreamResult<reqwest::Response> {
        let resp = req.send().await.map_err(|source| UpstreamError::Transport {
            url: url.to_string(),
            source,
        })?;
        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(UpstreamError::Unauthorized {
                url: url.to_string(),
                status,
            });
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(UpstreamError::Status {
                url: url.to_string(),
                status,
                body: body.chars().take(200).collect(),
            });
        }
        Ok(resp)
    }
}

impl Sources for UpstreamClient {
    async fn backups(&self) -> UpstreamResult<Vec<BackupRecord>> {
        self.get_list(&format!("{}/veeam", self.backups_url)).await
    }

    async fn master(&self) -> UpstreamResult<Vec<VmMaster>> {
        self.get_list(&format!("{}/vm", self.monitor_url)).await
    }

    async fn status_samples(&self) -> UpstreamResult<Vec<StatusSample>> {
        self.get_list(&format!("{}/status", self.monitor_url)).await
    }

    async fn live(&self) -> UpstreamResult<Vec<LivePing>> {
        self.get_list(&format!("{}/monitor/ping", self.monitor_url)).await
    }
}

fn decode_each<T: DeserializeOwned>(url: &str, raw: Vec<serde_json::Value>) -> Vec<T> {
    let total = raw.len();
    let items: Vec<T> = raw
        .into_iter()
        .enumerate()
        .filter_map(|(index, value)| match serde_json::from_value(value) {
            Ok(item) => Some(item),
            Err(e) => {
                debug!(url = %url, index, error = %e, "skipping undecodable record");
                None
            }
        })
        .collect();
    if items.len() < total {
        warn!(
            url = %url,
            skipped = total - items.len(),
            total,
            "skipped records that did not decode"
        );
    }
    items
}
