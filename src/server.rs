use anyhow::{Context, Result};
use async_graphql_axum::{GraphQLRequest, GraphQLResponse};
use axum::extract::State;
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::api::graphql::{self, VmwatchSchema};
use crate::api::rest::{self, AppState};
use crate::config::{Config, DaemonConfig};
use crate::domain::monitor_service::MonitorService;
use crate::upstream::UpstreamClient;

pub async fn run(config: Config) -> Result<()> {
    let daemon = config.daemon.clone();

    // Init tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&daemon.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "vmwatch daemon starting");

    let upstream = UpstreamClient::new(&config.upstream)?;
    let monitor = Arc::new(MonitorService::new(upstream, config.monitor_settings()));

    let app_state = AppState {
        monitor: monitor.clone(),
    };

    // Build GraphQL schema
    let schema = graphql::build_schema(monitor.clone());

    // Build GraphQL sub-router with its own state
    let graphql_router = Router::new()
        .route("/graphql", get(graphql_playground).post(graphql_handler))
        .with_state(schema);

    // Build Axum router: REST (with AppState) + GraphQL (with schema state)
    let app = rest::router(app_state)
        .merge(graphql_router)
        .layer(build_cors_layer(&daemon))
        .layer(TraceLayer::new_for_http());

    // Bind HTTP listener
    let http_addr = &daemon.http_addr;
    let listener = TcpListener::bind(http_addr)
        .await
        .with_context(|| format!("binding to {}", http_addr))?;

    info!(addr = %http_addr, "HTTP server listening");

    // Full refresh: immediately, then every refresh_interval_secs.
    // Serving starts before the first one lands; reads return 503 until then.
    {
        let monitor = monitor.clone();
        let interval_secs = daemon.refresh_interval_secs;
        tokio::spawn(async move {
            info!("running initial refresh");
            monitor.refresh().await;
            if interval_secs == 0 {
                return;
            }
            let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
            // Skip the first tick, the initial refresh already handled it
            interval.tick().await;
            loop {
                interval.tick().await;
                monitor.refresh().await;
            }
        });
    }

    // Live poll: only the live source, merged into the current snapshot
    if daemon.live_poll_secs > 0 {
        let monitor = monitor.clone();
        let poll_secs = daemon.live_poll_secs;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(poll_secs));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                if let Some(snapshot) = monitor.poll_live().await {
                    debug!(
                        generation = snapshot.generation,
                        live = snapshot.live.len(),
                        "live poll applied"
                    );
                }
            }
        });
    }

    // Run HTTP server with graceful shutdown
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("vmwatch daemon stopped");
    Ok(())
}

/// Any origin when none are configured.
fn build_cors_layer(config: &DaemonConfig) -> CorsLayer {
    if config.cors_origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

async fn graphql_playground() -> Html<String> {
    Html(
        async_graphql::http::playground_source(
            async_graphql::http::GraphQLPlaygroundConfig::new("/graphql"),
        ),
    )
}

async fn graphql_handler(
    State(schema): State<VmwatchSchema>,
    req: GraphQLRequest,
) -> GraphQLResponse {
    schema.execute(req.into_inner()).await.into()
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { info!("Received Ctrl+C, shutting down"); },
        _ = terminate => { info!("Received SIGTERM, shutting down"); },
    }
}
