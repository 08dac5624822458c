//! Request logging middleware

use super::super::state::ServerState;
use crate::server::metrics::record_http_request;
use axum::extract::State;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    middleware::Next,
    response::IntoResponse,
};
use std::time::Instant;
use tracing::{error, info, warn};

#[derive(PartialEq, PartialOrd, Clone, Copy, Debug, Default, clap::ValueEnum)]
pub enum RequestsLoggingLevel {
    None,
    #[default]
    Path,
    Headers,
}

impl std::fmt::Display for RequestsLoggingLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Label used for the path in HTTP metrics. Unknown paths are collapsed so a
/// scanner cannot blow up the series count.
fn metrics_path(path: &str, status: StatusCode) -> &str {
    if status == StatusCode::NOT_FOUND {
        "unmatched"
    } else {
        path
    }
}

pub async fn log_requests(
    State(state): State<ServerState>,
    request: Request<Body>,
    next: Next,
) -> impl IntoResponse {
    let level = state.config.requests_logging_level;
    let start = Instant::now();

    let method = request.method().to_string();
    let uri = request.uri().to_string();
    let path = request.uri().path().to_string();

    if level > RequestsLoggingLevel::None {
        info!(">>> {} {}", method, uri);
    }

    if level >= RequestsLoggingLevel::Headers {
        info!("  Req Headers:");
        for header in request.headers().iter() {
            info!("    {:?}: {:?}", header.0, header.1);
        }
    }

    let response = next.run(request).await;

    if level >= RequestsLoggingLevel::Headers {
        info!("  Resp Headers:");
        for header in response.headers().iter() {
            info!("    {:?}: {:?}", header.0, header.1);
        }
    }

    let status = response.status();
    let duration = start.elapsed();

    if level > RequestsLoggingLevel::None {
        if status.is_server_error() {
            error!("<<< {} {} {} ({}ms)", method, uri, status.as_u16(), duration.as_millis());
        } else if status.is_client_error() {
            warn!("<<< {} {} {} ({}ms)", method, uri, status.as_u16(), duration.as_millis());
        } else {
            info!("<<< {} ({}ms)", status.as_u16(), duration.as_millis());
        }
    }

    record_http_request(
        &method,
        metrics_path(&path, status),
        status.as_u16(),
        duration,
    );

    response
}
