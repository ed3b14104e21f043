use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use tracing::warn;

use crate::domain::backup_report::{backup_status_summary, groups_overview, today, BackupStatusSummary, GroupsOverview};
use crate::domain::filter::{OnlineFilter, SweepFilter, VmFilter};
use crate::domain::monitor_service::MonitorService;
use crate::domain::ping::{PingOutcome, PingReply, SweepSummary};
use crate::domain::reconcile::{fleet_stats, projects, FleetStats};
use crate::domain::severity::Severity;
use crate::domain::snapshot::Snapshot;
use crate::domain::status::{HalfDay, HistoryIndex, StatusChange};
use crate::domain::types::*;
use crate::domain::views;
use crate::upstream::{UpstreamClient, UpstreamError};

pub type Monitor = MonitorService<UpstreamClient>;

type ApiError = (StatusCode, String);

/// Shared application state for all API handlers.
#[derive(Clone)]
pub struct AppState {
    pub monitor: Arc<Monitor>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/snapshot", get(snapshot))
        .route("/api/v1/refresh", post(refresh))
        .route("/api/v1/backups/daily", get(backups_daily))
        .route("/api/v1/backups/monthly", get(backups_monthly))
        .route("/api/v1/backups/stats", get(backups_stats))
        .route("/api/v1/backups/summary", get(backups_summary))
        .route("/api/v1/backups/groups", get(backups_groups))
        .route("/api/v1/vms", get(vms))
        .route("/api/v1/vms/stats", get(vm_stats))
        .route("/api/v1/vms/grid", get(vm_grid))
        .route("/api/v1/history", get(history))
        .route("/api/v1/projects", get(project_list))
        .route("/api/v1/ping", post(ping))
        .route("/api/v1/ping/sweep", get(sweep))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<DaemonHealth> {
    Json(state.monitor.health().await)
}

/// Serve the current snapshot from memory. Never triggers a fetch.
/// Returns 503 until the first refresh has completed.
async fn current(state: &AppState) -> Result<Arc<Snapshot>, ApiError> {
    state.monitor.current().await.ok_or_else(|| {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            "snapshot not yet available (initial refresh in progress)".to_string(),
        )
    })
}

fn bad_request(message: impl Into<String>) -> ApiError {
    (StatusCode::BAD_REQUEST, message.into())
}

fn parse_date(raw: Option<&str>) -> Result<Option<NaiveDate>, ApiError> {
    raw.filter(|s| !s.is_empty())
        .map(|s| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map_err(|_| bad_request(format!("invalid date '{s}', expected YYYY-MM-DD")))
        })
        .transpose()
}

fn parse_change(raw: Option<&str>) -> Result<Option<StatusChange>, ApiError> {
    raw.filter(|s| !s.is_empty())
        .map(|s| s.parse::<StatusChange>().map_err(bad_request))
        .transpose()
}

async fn snapshot(State(state): State<AppState>) -> Result<Json<Snapshot>, ApiError> {
    let snap = current(&state).await?;
    Ok(Json(Snapshot::clone(&snap)))
}

/// Run a full fetch and return whatever snapshot is current afterwards.
async fn refresh(State(state): State<AppState>) -> Result<Json<Snapshot>, ApiError> {
    if state.monitor.refresh().await.is_none() {
        warn!("manual refresh superseded by a newer one");
    }
    let snap = current(&state).await?;
    Ok(Json(Snapshot::clone(&snap)))
}

#[derive(Debug, Default, Deserialize)]
struct DateQuery {
    date: Option<String>,
}

async fn backups_daily(
    State(state): State<AppState>,
    Query(q): Query<DateQuery>,
) -> Result<Json<DailyView>, ApiError> {
    let snap = current(&state).await?;
    let date = parse_date(q.date.as_deref())?;
    Ok(Json(views::daily_view(&snap, date)))
}

#[derive(Debug, Default, Deserialize)]
struct MonthQuery {
    month: Option<String>,
}

async fn backups_monthly(
    State(state): State<AppState>,
    Query(q): Query<MonthQuery>,
) -> Result<Json<MonthlyView>, ApiError> {
    let snap = current(&state).await?;
    Ok(Json(views::monthly_view(
        &snap,
        q.month.as_deref().filter(|m| !m.is_empty()),
        today(),
        state.monitor.settings(),
    )))
}

#[derive(Debug, Default, Deserialize)]
struct StatsQuery {
    date: Option<String>,
    month: Option<String>,
}

async fn backups_stats(
    State(state): State<AppState>,
    Query(q): Query<StatsQuery>,
) -> Result<Json<BackupStats>, ApiError> {
    let snap = current(&state).await?;
    let date = parse_date(q.date.as_deref())?;
    Ok(Json(views::backup_stats(
        &snap,
        date,
        q.month.as_deref().filter(|m| !m.is_empty()),
        today(),
        state.monitor.settings(),
    )))
}

async fn backups_summary(
    State(state): State<AppState>,
    Query(q): Query<MonthQuery>,
) -> Result<Json<BackupStatusSummary>, ApiError> {
    let snap = current(&state).await?;
    let month = q
        .month
        .filter(|m| !m.is_empty())
        .or_else(|| snap.monthly.latest_month().map(str::to_string))
        .unwrap_or_default();
    Ok(Json(backup_status_summary(
        &snap.monthly,
        &month,
        today(),
        state.monitor.settings().recent_window_days,
    )))
}

async fn backups_groups(State(state): State<AppState>) -> Result<Json<GroupsOverview>, ApiError> {
    let snap = current(&state).await?;
    Ok(Json(groups_overview(&snap.daily)))
}

async fn vms(
    State(state): State<AppState>,
    Query(filter): Query<VmFilter>,
) -> Result<Json<VmList>, ApiError> {
    let snap = current(&state).await?;
    Ok(Json(views::vm_list(
        &snap,
        &filter,
        state.monitor.settings(),
        Utc::now(),
    )))
}

async fn vm_stats(State(state): State<AppState>) -> Result<Json<FleetStats>, ApiError> {
    let snap = current(&state).await?;
    let index = HistoryIndex::new(&snap.history);
    Ok(Json(fleet_stats(&snap.vms, &snap.live, &index)))
}

#[derive(Debug, Default, Deserialize)]
struct GridQuery {
    date: Option<String>,
    half: Option<HalfDay>,
    change: Option<String>,
    search: Option<String>,
    project: Option<String>,
    #[serde(default)]
    online: OnlineFilter,
    severity: Option<Severity>,
}

impl GridQuery {
    fn filter(&self) -> VmFilter {
        VmFilter {
            search: self.search.clone(),
            project: self.project.clone(),
            online: self.online,
            severity: self.severity,
        }
    }
}

async fn vm_grid(
    State(state): State<AppState>,
    Query(q): Query<GridQuery>,
) -> Result<Json<Vec<GridRow>>, ApiError> {
    let snap = current(&state).await?;
    let date = parse_date(q.date.as_deref())?.unwrap_or_else(|| Utc::now().date_naive());
    let change = parse_change(q.change.as_deref())?;
    Ok(Json(views::status_grid(
        &snap,
        date,
        q.half,
        change,
        &q.filter(),
        state.monitor.settings(),
        Utc::now(),
    )))
}

#[derive(Debug, Default, Deserialize)]
struct HistoryQuery {
    date: Option<String>,
    search: Option<String>,
    change: Option<String>,
}

async fn history(
    State(state): State<AppState>,
    Query(q): Query<HistoryQuery>,
) -> Result<Json<HistoryView>, ApiError> {
    let snap = current(&state).await?;
    let date = parse_date(q.date.as_deref())?;
    let change = parse_change(q.change.as_deref())?;
    Ok(Json(views::history_view(&snap, date, q.search.as_deref(), change)))
}

async fn project_list(State(state): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    let snap = current(&state).await?;
    Ok(Json(projects(&snap.vms)))
}

#[derive(Debug, Deserialize)]
struct PingRequest {
    ip: String,
}

fn upstream_failure(e: UpstreamError) -> ApiError {
    let status = match e {
        UpstreamError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
        _ => StatusCode::BAD_GATEWAY,
    };
    (status, e.to_string())
}

async fn ping(
    State(state): State<AppState>,
    Json(req): Json<PingRequest>,
) -> Result<Json<PingReply>, ApiError> {
    let ip = req.ip.trim();
    if ip.is_empty() {
        return Err(bad_request("ip must not be empty"));
    }
    state
        .monitor
        .sources()
        .ping(ip)
        .await
        .map(Json)
        .map_err(upstream_failure)
}

#[derive(Debug, Default, Deserialize)]
struct SweepQuery {
    search: Option<String>,
    project: Option<String>,
    outcome: Option<PingOutcome>,
}

/// Ping every inventory VM of the current snapshot.
async fn sweep(
    State(state): State<AppState>,
    Query(q): Query<SweepQuery>,
) -> Result<Json<SweepReport>, ApiError> {
    let snap = current(&state).await?;
    let checks = state.monitor.sources().sweep(snap.master.clone()).await;
    let summary = SweepSummary::of(&checks);
    let filter = SweepFilter {
        search: q.search,
        project: q.project,
        outcome: q.outcome,
    };
    let checks = filter.apply(&checks).into_iter().cloned().collect();
    Ok(Json(SweepReport { summary, checks }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UpstreamConfig;
    use crate::domain::backup::BackupRecord;
    use crate::domain::monitor_service::MonitorSettings;
    use crate::domain::reconcile::{LivePing, VmMaster};
    use crate::domain::snapshot::SourceData;
    use crate::domain::status::{LinkStatus, SampleVm, StatusSample};
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn monitor() -> Arc<Monitor> {
        let upstream = UpstreamClient::new(&UpstreamConfig {
            backups_url: "http://127.0.0.1:1".into(),
            monitor_url: "http://127.0.0.1:1".into(),
            ping_url: "http://127.0.0.1:1".into(),
            timeout_secs: 2,
            ..Default::default()
        })
        .unwrap();
        Arc::new(MonitorService::new(upstream, MonitorSettings::default()))
    }

    async fn seeded() -> AppState {
        let monitor = monitor();
        let sources = SourceData {
            backups: vec![BackupRecord {
                vm: "DB1.vbk".into(),
                parent_directory: "Finance".into(),
                last_modified: "2024-03-01 10:00:00".into(),
                metadata: true,
                full_backup: true,
                incremental_backup: false,
            }],
            master: vec![
                VmMaster {
                    vm_name: "db".into(),
                    ip: "10.0.0.1".into(),
                    project_name: "Finance".into(),
                    ..Default::default()
                },
                VmMaster {
                    vm_name: "web".into(),
                    ip: "10.0.0.2".into(),
                    project_name: "Retail".into(),
                    ..Default::default()
                },
            ],
            samples: vec![StatusSample {
                ip: "10.0.0.1".into(),
                status: LinkStatus::NotReachable,
                created_at: "2024-03-01T09:00:00".into(),
                vm_master: Some(SampleVm {
                    vm_name: Some("db".into()),
                    ..Default::default()
                }),
            }],
            live: vec![LivePing {
                vm_ip: "10.0.0.2".into(),
                vm_name: "web".into(),
                reachable: true,
            }],
            errors: Vec::new(),
        };
        let ticket = monitor.store().begin();
        monitor.store().apply_refresh(ticket, sources).await;
        AppState { monitor }
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let value = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn reads_are_unavailable_before_the_first_snapshot() {
        let app = router(AppState { monitor: monitor() });
        let (status, _) = get_json(app.clone(), "/api/v1/vms").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let (status, body) = get_json(app, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ready"], false);
    }

    #[tokio::test]
    async fn vms_endpoint_applies_filters() {
        let app = router(seeded().await);
        let (status, body) = get_json(app.clone(), "/api/v1/vms").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["stats"]["total"], 2);
        assert_eq!(body["stats"]["reachable"], 1);

        let (_, body) = get_json(app.clone(), "/api/v1/vms?online=offline").await;
        assert_eq!(body["vms"].as_array().unwrap().len(), 1);
        assert_eq!(body["vms"][0]["vm"]["vm_name"], "db");
        assert_eq!(body["vms"][0]["latest_status"], "not reachable");

        let (_, body) = get_json(app.clone(), "/api/v1/vms?project=Retail&search=WEB").await;
        assert_eq!(body["vms"][0]["vm"]["vm_name"], "web");

        let (status, _) = get_json(app, "/api/v1/vms?severity=catastrophic").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn backup_endpoints_serve_the_indexes() {
        let app = router(seeded().await);
        let (status, body) = get_json(app.clone(), "/api/v1/backups/daily").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["date"], "2024-03-01");
        assert_eq!(body["groups"]["Finance"][0]["unique_name"], "DB1");
        assert_eq!(body["groups"]["Finance"][0]["full_backup"], true);

        let (_, body) = get_json(app.clone(), "/api/v1/backups/monthly?month=2024-03").await;
        assert_eq!(body["groups"]["Finance"][0]["cells"][0]["state"], "backed");

        let (_, body) = get_json(app.clone(), "/api/v1/backups/groups").await;
        assert_eq!(body["groups"][0]["name"], "Finance");

        let (status, _) = get_json(app, "/api/v1/backups/daily?date=yesterday").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn history_and_projects() {
        let app = router(seeded().await);
        let (_, body) = get_json(app.clone(), "/api/v1/history?change=new").await;
        assert_eq!(body["total"], 1);
        assert_eq!(body["hours"][0]["hour"], "09:00");

        let (status, _) = get_json(app.clone(), "/api/v1/history?change=sideways").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, body) = get_json(app.clone(), "/api/v1/vms/grid?date=2024-03-01&half=AM").await;
        assert_eq!(body[0]["cells"].as_array().unwrap().len(), 12);
        assert_eq!(body[0]["cells"][9]["status_change"], "new");

        let (_, body) = get_json(app, "/api/v1/projects").await;
        assert_eq!(body, serde_json::json!(["Finance", "Retail"]));
    }

    #[tokio::test]
    async fn grid_rows_follow_vm_filters() {
        let app = router(seeded().await);
        let (status, body) = get_json(app.clone(), "/api/v1/vms/grid?date=2024-03-01&half=pm").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 2);
        assert_eq!(body[0]["cells"][0]["hour"], 12);

        let (_, body) = get_json(app.clone(), "/api/v1/vms/grid?date=2024-03-01&project=Finance").await;
        let rows = body.as_array().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["vm_name"], "db");
        assert_eq!(rows[0]["cells"][9]["status_change"], "new");

        let (_, body) = get_json(
            app.clone(),
            "/api/v1/vms/grid?date=2024-03-01&online=online&change=went_down",
        )
        .await;
        let rows = body.as_array().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["vm_name"], "web");
        assert!(rows[0]["cells"]
            .as_array()
            .unwrap()
            .iter()
            .all(|c| c["samples"] == 0));

        let (status, _) = get_json(app, "/api/v1/vms/grid?half=noon").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn ping_reports_upstream_failure() {
        let app = router(seeded().await);
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/ping")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"ip":"10.0.0.1"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn sweep_records_failures_per_vm() {
        let app = router(seeded().await);
        let (status, body) = get_json(app, "/api/v1/ping/sweep?outcome=failed").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["summary"]["total"], 2);
        assert_eq!(body["summary"]["failed"], 2);
        assert_eq!(body["checks"].as_array().unwrap().len(), 2);
    }
}
