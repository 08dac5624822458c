use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde::Serialize;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::http_layers::log_requests;
use super::metrics::metrics_handler;
use super::state::ServerState;
use super::ServerConfig;
use crate::jobs::DispatcherHandle;

#[derive(Serialize)]
struct ServerStats {
    pub uptime: String,
    pub dispatcher: String,
    pub queued_jobs: usize,
    pub running_jobs: usize,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

async fn home(State(state): State<ServerState>) -> impl IntoResponse {
    let stats = ServerStats {
        uptime: format_uptime(state.start_time.elapsed()),
        dispatcher: state.dispatcher.state().to_string(),
        queued_jobs: state.dispatcher.queued(),
        running_jobs: state.dispatcher.in_flight(),
    };
    Json(stats)
}

async fn health() -> &'static str {
    "OK"
}

/// Ready while the dispatcher still accepts refresh jobs.
async fn readiness(State(dispatcher): State<DispatcherHandle>) -> impl IntoResponse {
    if dispatcher.is_accepting() {
        (StatusCode::OK, "OK")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "Not Ready")
    }
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Not Found")
}

pub fn make_app(config: ServerConfig, dispatcher: DispatcherHandle) -> Router {
    let state = ServerState {
        config,
        start_time: Instant::now(),
        dispatcher,
    };

    Router::new()
        .route("/", get(home))
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health))
        .route("/readiness", get(readiness))
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(state.clone(), log_requests))
        .with_state(state)
}

/// Serve HTTP until `shutdown` is cancelled.
pub async fn run_server(
    config: ServerConfig,
    dispatcher: DispatcherHandle,
    shutdown: CancellationToken,
) -> Result<()> {
    let address = format!("{}:{}", config.host, config.port);
    let app = make_app(config, dispatcher);

    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;
    info!("Listening on {}", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("HTTP server failed")
}
