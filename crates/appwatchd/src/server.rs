//! HTTP endpoints: Prometheus scrape target and liveness.
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/metrics` | Prometheus text exposition of every workload's metrics |
//! | GET | `/health` | Liveness, always `200 OK` |

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use prometheus::Registry;
use tracing::error;

/// Shared state for the handlers.
#[derive(Clone)]
pub struct ServerState {
    pub registry: Registry,
}

/// Build the router over the shared registry.
pub fn build_router(registry: Registry) -> Router {
    Router::new()
        .route("/metrics", get(prometheus_metrics))
        .route("/health", get(health))
        .with_state(ServerState { registry })
}

pub async fn prometheus_metrics(State(state): State<ServerState>) -> Response {
    match appwatch_metrics::render(&state.registry) {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, appwatch_metrics::content_type())],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "failed to render metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}
