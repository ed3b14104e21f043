use async_graphql::{Context, EmptySubscription, Object, Schema};
use chrono::{NaiveDate, Utc};
use std::sync::Arc;

use crate::domain::backup_report::{groups_overview, GroupsOverview};
use crate::domain::filter::{OnlineFilter, VmFilter};
use crate::domain::reconcile::{fleet_stats, projects, FleetStats};
use crate::domain::severity::Severity;
use crate::domain::snapshot::Snapshot;
use crate::domain::status::{HalfDay, HistoryIndex, StatusChange, StatusTransition};
use crate::domain::types::*;
use crate::domain::views;

use super::rest::Monitor;

pub type VmwatchSchema = Schema<QueryRoot, MutationRoot, EmptySubscription>;

async fn snapshot(ctx: &Context<'_>) -> async_graphql::Result<Arc<Snapshot>> {
    let monitor = ctx.data::<Arc<Monitor>>()?;
    monitor
        .current()
        .await
        .ok_or_else(|| async_graphql::Error::new("snapshot not yet available"))
}

fn vm_filter(
    search: Option<String>,
    project: Option<String>,
    online: Option<bool>,
    severity: Option<Severity>,
) -> VmFilter {
    VmFilter {
        search,
        project,
        online: match online {
            None => OnlineFilter::All,
            Some(true) => OnlineFilter::Online,
            Some(false) => OnlineFilter::Offline,
        },
        severity,
    }
}

pub struct QueryRoot;

#[Object]
impl QueryRoot {
    async fn health(&self, ctx: &Context<'_>) -> async_graphql::Result<DaemonHealth> {
        let monitor = ctx.data::<Arc<Monitor>>()?;
        Ok(monitor.health().await)
    }

    /// Unified VMs matching every given filter.
    async fn vms(
        &self,
        ctx: &Context<'_>,
        search: Option<String>,
        project: Option<String>,
        online: Option<bool>,
        severity: Option<Severity>,
    ) -> async_graphql::Result<VmList> {
        let monitor = ctx.data::<Arc<Monitor>>()?;
        let snap = snapshot(ctx).await?;
        let filter = vm_filter(search, project, online, severity);
        Ok(views::vm_list(&snap, &filter, monitor.settings(), Utc::now()))
    }

    async fn vm_stats(&self, ctx: &Context<'_>) -> async_graphql::Result<FleetStats> {
        let snap = snapshot(ctx).await?;
        let index = HistoryIndex::new(&snap.history);
        Ok(fleet_stats(&snap.vms, &snap.live, &index))
    }

    async fn projects(&self, ctx: &Context<'_>) -> async_graphql::Result<Vec<String>> {
        let snap = snapshot(ctx).await?;
        Ok(projects(&snap.vms))
    }

    /// Status transitions, newest first.
    async fn history(
        &self,
        ctx: &Context<'_>,
        date: Option<NaiveDate>,
        change: Option<StatusChange>,
        #[graphql(default = 200)] limit: usize,
    ) -> async_graphql::Result<Vec<StatusTransition>> {
        let snap = snapshot(ctx).await?;
        Ok(snap
            .history
            .iter()
            .filter(|t| date.map_or(true, |d| t.current_time.date_naive() == d))
            .filter(|t| change.map_or(true, |c| t.status_change == c))
            .take(limit)
            .cloned()
            .collect())
    }

    /// Hourly grid rows for the VMs matching every given filter.
    #[allow(clippy::too_many_arguments)]
    async fn grid(
        &self,
        ctx: &Context<'_>,
        date: NaiveDate,
        half: Option<HalfDay>,
        change: Option<StatusChange>,
        search: Option<String>,
        project: Option<String>,
        online: Option<bool>,
        severity: Option<Severity>,
    ) -> async_graphql::Result<Vec<GridRow>> {
        let monitor = ctx.data::<Arc<Monitor>>()?;
        let snap = snapshot(ctx).await?;
        let filter = vm_filter(search, project, online, severity);
        Ok(views::status_grid(
            &snap,
            date,
            half,
            change,
            &filter,
            monitor.settings(),
            Utc::now(),
        ))
    }

    async fn backup_groups(&self, ctx: &Context<'_>) -> async_graphql::Result<GroupsOverview> {
        let snap = snapshot(ctx).await?;
        Ok(groups_overview(&snap.daily))
    }
}

pub struct MutationRoot;

#[Object]
impl MutationRoot {
    /// Fetch every source and return the health of the resulting snapshot.
    async fn refresh(&self, ctx: &Context<'_>) -> async_graphql::Result<DaemonHealth> {
        let monitor = ctx.data::<Arc<Monitor>>()?;
        monitor.refresh().await;
        Ok(monitor.health().await)
    }
}

pub fn build_schema(monitor: Arc<Monitor>) -> VmwatchSchema {
    Schema::build(QueryRoot, MutationRoot, EmptySubscription)
        .data(monitor)
        .finish()
}
